use std::path::PathBuf;

use clap::{Parser, Subcommand};
use netshim::event::{CLOSE, DATA, MESSAGE, OPEN, PING};
use netshim::{
    level_from_verbosity, listener, pipeline, setup_local_tracing, AppResult, Duplex,
    EmulatedSocket, EmulatedStream, EmulatorConfig, EventLoop, EventTarget, EventValue,
    WebSocketLike,
};
use tokio::runtime;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info};

#[derive(Parser)]
#[command(version)]
pub struct CommandLine {
    /// path to config file
    #[arg(short, long)]
    pub conf: Option<String>,
    #[command(subcommand)]
    pub command: Option<Command>,
    /// log level (v: info, vv: debug, vvv: trace)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
    pub verbose: u8,
}

#[derive(Subcommand)]
pub enum Command {
    /// print the effective configuration as json
    PrintConfig,
    /// open an emulated socket, send one message and close it
    Socket {
        #[arg(long, default_value = "wss://test")]
        url: String,
        #[arg(long, default_value = "ping")]
        message: String,
        #[arg(long)]
        protocol: Vec<String>,
    },
    /// push chunks through a pipeline of two emulated streams
    Pipe { chunks: Vec<String> },
}

fn load_config(conf: Option<&str>) -> AppResult<EmulatorConfig> {
    match conf {
        Some(path) => EmulatorConfig::set_up_config(path),
        None => {
            let default_path = PathBuf::from("./conf.toml");
            if default_path.exists() {
                EmulatorConfig::set_up_config(default_path)
            } else {
                debug!("no conf.toml found, using defaults");
                Ok(EmulatorConfig::default())
            }
        }
    }
}

async fn run_socket(
    config: &EmulatorConfig,
    url: String,
    message: String,
    protocols: Vec<String>,
) -> AppResult<()> {
    let event_loop = EventLoop::start()?;
    let socket =
        EmulatedSocket::connect_with_config(&event_loop.handle(), url, protocols, config.socket.clone());
    info!("socket created, ready state {:?}", socket.ready_state());

    let (tx, mut rx) = mpsc::unbounded_channel::<(&'static str, Vec<EventValue>)>();
    for event in [OPEN, MESSAGE, PING, CLOSE] {
        let tx = tx.clone();
        socket.on(
            event,
            listener(move |args| {
                let _ = tx.send((event, args.to_vec()));
            }),
        );
    }
    drop(tx);

    while let Some((event, args)) = rx.recv().await {
        match event {
            OPEN => {
                println!("open");
                socket.send(message.as_str());
            }
            MESSAGE => {
                if let Some(msg) = args.first().and_then(EventValue::as_message) {
                    println!("message {}", msg.data);
                }
                socket.close();
            }
            PING => println!("ping"),
            CLOSE => {
                let code = args.first().and_then(EventValue::as_code).unwrap_or_default();
                let reason = args.get(1).and_then(EventValue::as_text).unwrap_or_default();
                println!("close {} {}", code, reason);
                break;
            }
            _ => {}
        }
    }
    event_loop.shutdown().await
}

async fn run_pipe(config: &EmulatorConfig, chunks: Vec<String>) -> AppResult<()> {
    let event_loop = EventLoop::start()?;
    let handle = event_loop.handle();
    let streams = [
        EmulatedStream::with_config(&handle, config.stream.clone()),
        EmulatedStream::with_config(&handle, config.stream.clone()),
    ];
    streams[1].on(
        DATA,
        listener(|args| {
            if let Some(chunk) = args.first().and_then(EventValue::as_chunk) {
                println!("data {} ({} bytes)", chunk, chunk.len());
            }
        }),
    );

    let (done_tx, done_rx) = oneshot::channel();
    pipeline(&streams, move |result| {
        let _ = done_tx.send(result);
    })?;
    for chunk in chunks {
        streams[0].write(chunk);
    }
    streams[0].end();

    if let Ok(result) = done_rx.await {
        result?;
        println!("pipeline finished");
    }
    event_loop.shutdown().await
}

fn main() -> AppResult<()> {
    let commandline: CommandLine = CommandLine::parse();
    setup_local_tracing(level_from_verbosity(commandline.verbose));

    // one thread: every emulated object shares a single logical loop
    let rt = runtime::Builder::new_current_thread().enable_all().build()?;
    let config = load_config(commandline.conf.as_deref())?;

    match commandline.command {
        None | Some(Command::PrintConfig) => {
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
        Some(Command::Socket {
            url,
            message,
            protocol,
        }) => rt.block_on(run_socket(&config, url, message, protocol))?,
        Some(Command::Pipe { chunks }) => rt.block_on(run_pipe(&config, chunks))?,
    }
    Ok(())
}
