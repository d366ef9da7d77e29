// Copyright 2025 jonefeewang@gmail.com
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tracing::debug;

use super::duplex::WeakStream;
use super::{Duplex, EmulatedStream};
use crate::event::{listener, EventTarget, EventValue, END, ERROR};
use crate::{AppError, AppResult};

/// Pipes every stream into the next one and reports completion on the next tick.
///
/// Returns the last stream. Errors raised by individual streams are not collected.
pub fn pipeline<F>(streams: &[EmulatedStream], callback: F) -> AppResult<EmulatedStream>
where
    F: FnOnce(AppResult<()>) + Send + 'static,
{
    let (first, rest) = streams.split_first().ok_or_else(|| {
        AppError::InvalidArgument("pipeline needs at least one stream".to_string())
    })?;
    let last = rest
        .iter()
        .fold(first.clone(), |source, destination| source.pipe(destination.clone()));
    debug!("pipeline of {} stream(s) established", streams.len());

    first.loop_handle().defer(move || callback(Ok(())));
    Ok(last)
}

type WeakListener = Weak<dyn Fn(&[EventValue]) + Send + Sync>;

/// Callback of a pending [`finished`] plus the listener still registered for the
/// outcome that did not happen.
struct Completion<F> {
    callback: Option<F>,
    on_end: Option<WeakListener>,
    on_error: Option<WeakListener>,
}

impl<F> Completion<F>
where
    F: FnOnce(AppResult<()>),
{
    fn complete(slot: &Mutex<Self>, stream: &WeakStream, result: AppResult<()>) {
        let (callback, leftover) = {
            let mut completion = slot.lock();
            let on_end = completion.on_end.take();
            let on_error = completion.on_error.take();
            let leftover = if result.is_ok() {
                on_error.map(|weak| (ERROR, weak))
            } else {
                on_end.map(|weak| (END, weak))
            };
            (completion.callback.take(), leftover)
        };
        if let (Some((event, weak)), Some(stream)) = (leftover, stream.upgrade()) {
            if let Some(registered) = weak.upgrade() {
                stream.remove_listener(event, &registered);
            }
        }
        if let Some(callback) = callback {
            callback(result);
        }
    }
}

/// Calls `callback` once the stream has ended, or with the error it reported.
///
/// An already ended stream completes on the next tick. The callback runs at most once,
/// and whichever listener did not fire is removed again.
pub fn finished<F>(stream: &EmulatedStream, callback: F)
where
    F: FnOnce(AppResult<()>) + Send + 'static,
{
    if stream.is_ended() {
        stream.loop_handle().defer(move || callback(Ok(())));
        return;
    }

    let slot = Arc::new(Mutex::new(Completion {
        callback: Some(callback),
        on_end: None,
        on_error: None,
    }));

    let (end_slot, end_stream) = (slot.clone(), stream.weak());
    let on_end = listener(move |_| Completion::complete(&end_slot, &end_stream, Ok(())));

    let (error_slot, error_stream) = (slot.clone(), stream.weak());
    let on_error = listener(move |args| {
        let reason = args
            .first()
            .and_then(EventValue::as_error)
            .unwrap_or("unknown stream error")
            .to_string();
        Completion::complete(
            &error_slot,
            &error_stream,
            Err(AppError::StreamFailed(reason)),
        );
    });

    {
        let mut completion = slot.lock();
        completion.on_end = Some(Arc::downgrade(&on_end));
        completion.on_error = Some(Arc::downgrade(&on_error));
    }
    stream.once(END, on_end).once(ERROR, on_error);
}
