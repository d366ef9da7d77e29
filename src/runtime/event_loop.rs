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

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Duration, Instant};
use tracing::{debug, error, trace, warn};

use crate::service::Shutdown;
use crate::{AppError, AppResult};

/// Shortest period a repeating timer may have.
const MIN_PERIOD: Duration = Duration::from_millis(1);
/// Only used to build a sleep future for a disabled select branch.
const IDLE_PARK: Duration = Duration::from_secs(3600);

type Task = Box<dyn FnOnce() + Send>;
type RepeatingTask = Box<dyn FnMut() + Send>;

enum Job {
    Once(Task),
    Repeating { period: Duration, task: RepeatingTask },
}

enum TimerOp {
    Insert {
        id: TimerId,
        deadline: Instant,
        job: Job,
    },
    Cancel(TimerId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerId(u64);

/// Pending timers ordered by deadline, then by insertion.
#[derive(Default)]
struct TimerQueue {
    entries: BTreeMap<(Instant, u64), (TimerId, Job)>,
    keys: HashMap<TimerId, (Instant, u64)>,
    seq: u64,
}

impl TimerQueue {
    fn apply(&mut self, op: TimerOp) {
        match op {
            TimerOp::Insert { id, deadline, job } => self.insert(id, deadline, job),
            TimerOp::Cancel(id) => {
                if self.cancel(id) {
                    trace!("timer {:?} cancelled", id);
                }
            }
        }
    }

    fn insert(&mut self, id: TimerId, deadline: Instant, job: Job) {
        let key = (deadline, self.seq);
        self.seq += 1;
        self.entries.insert(key, (id, job));
        self.keys.insert(id, key);
    }

    fn cancel(&mut self, id: TimerId) -> bool {
        match self.keys.remove(&id) {
            Some(key) => self.entries.remove(&key).is_some(),
            None => false,
        }
    }

    fn next_deadline(&self) -> Option<Instant> {
        self.entries.keys().next().map(|(deadline, _)| *deadline)
    }

    fn pop_due(&mut self, now: Instant) -> Option<(Instant, TimerId, Job)> {
        let (&(deadline, seq), _) = self.entries.iter().next()?;
        if deadline > now {
            return None;
        }
        let (id, job) = self.entries.remove(&(deadline, seq))?;
        self.keys.remove(&id);
        Some((deadline, id, job))
    }

    fn len(&self) -> usize {
        self.entries.len()
    }

    fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Cloneable access to a running [`EventLoop`].
///
/// Scheduling never blocks; callbacks run later on the loop's driver task.
#[derive(Clone)]
pub struct LoopHandle {
    ops_tx: mpsc::UnboundedSender<TimerOp>,
    next_id: Arc<AtomicU64>,
}

impl fmt::Debug for LoopHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoopHandle")
            .field("closed", &self.ops_tx.is_closed())
            .finish()
    }
}

impl LoopHandle {
    fn next_id(&self) -> TimerId {
        TimerId(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    fn send(&self, op: TimerOp) {
        if self.ops_tx.send(op).is_err() {
            warn!("event loop stopped, timer operation dropped");
        }
    }

    /// Runs `task` once after `delay`.
    pub fn schedule<F>(&self, delay: Duration, task: F) -> TimerId
    where
        F: FnOnce() + Send + 'static,
    {
        let id = self.next_id();
        trace!("schedule timer {:?} in {:?}", id, delay);
        self.send(TimerOp::Insert {
            id,
            deadline: Instant::now() + delay,
            job: Job::Once(Box::new(task)),
        });
        id
    }

    /// Runs `task` on the next tick, after everything already due.
    pub fn defer<F>(&self, task: F) -> TimerId
    where
        F: FnOnce() + Send + 'static,
    {
        self.schedule(Duration::ZERO, task)
    }

    /// Runs `task` every `period` until the returned guard is cancelled or dropped.
    pub fn schedule_repeating<F>(&self, period: Duration, task: F) -> TimerGuard
    where
        F: FnMut() + Send + 'static,
    {
        let id = self.next_id();
        let period = period.max(MIN_PERIOD);
        debug!("schedule repeating timer {:?} every {:?}", id, period);
        self.send(TimerOp::Insert {
            id,
            deadline: Instant::now() + period,
            job: Job::Repeating {
                period,
                task: Box::new(task),
            },
        });
        TimerGuard {
            id,
            handle: self.clone(),
            cancelled: AtomicBool::new(false),
        }
    }

    pub fn cancel(&self, id: TimerId) {
        self.send(TimerOp::Cancel(id));
    }

    pub fn is_closed(&self) -> bool {
        self.ops_tx.is_closed()
    }
}

/// Owns a scheduled timer and cancels it when dropped.
#[derive(Debug)]
pub struct TimerGuard {
    id: TimerId,
    handle: LoopHandle,
    cancelled: AtomicBool,
}

impl TimerGuard {
    pub fn id(&self) -> TimerId {
        self.id
    }

    /// Cancels the timer. Only the first call does anything; returns whether it was it.
    pub fn cancel(&self) -> bool {
        if self.cancelled.swap(true, Ordering::AcqRel) {
            return false;
        }
        self.handle.cancel(self.id);
        true
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

impl Drop for TimerGuard {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// The single logical loop every emulated object schedules on.
///
/// One driver task owns the timer queue. Timers fire by deadline, and timers with the
/// same deadline fire in the order they were scheduled.
pub struct EventLoop {
    handle: LoopHandle,
    notify_shutdown: broadcast::Sender<()>,
    driver: JoinHandle<()>,
}

impl EventLoop {
    /// Spawns the driver on the current tokio runtime.
    pub fn start() -> AppResult<EventLoop> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| AppError::IllegalState(format!("no tokio runtime: {}", e)))?;
        let (ops_tx, ops_rx) = mpsc::unbounded_channel();
        let (notify_shutdown, _) = broadcast::channel(1);
        let shutdown = Shutdown::new(notify_shutdown.subscribe());

        let driver = runtime.spawn(run_driver(ops_rx, shutdown));
        debug!("event loop started");

        Ok(EventLoop {
            handle: LoopHandle {
                ops_tx,
                next_id: Arc::new(AtomicU64::new(0)),
            },
            notify_shutdown,
            driver,
        })
    }

    pub fn handle(&self) -> LoopHandle {
        self.handle.clone()
    }

    /// Stops the driver and waits for it. Pending timers are discarded.
    pub async fn shutdown(self) -> AppResult<()> {
        let _ = self.notify_shutdown.send(());
        self.driver
            .await
            .map_err(|e| AppError::IllegalState(format!("event loop driver failed: {}", e)))?;
        debug!("event loop stopped");
        Ok(())
    }
}

impl fmt::Debug for EventLoop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventLoop")
            .field("handle", &self.handle)
            .field("finished", &self.driver.is_finished())
            .finish()
    }
}

async fn run_driver(mut ops_rx: mpsc::UnboundedReceiver<TimerOp>, mut shutdown: Shutdown) {
    let mut queue = TimerQueue::default();
    let mut ops_open = true;

    loop {
        if !ops_open && queue.is_empty() {
            break;
        }
        let next = queue.next_deadline();
        let wake_at = next.unwrap_or_else(|| Instant::now() + IDLE_PARK);

        tokio::select! {
            biased;
            _ = shutdown.recv() => break,
            op = ops_rx.recv(), if ops_open => match op {
                Some(op) => queue.apply(op),
                None => ops_open = false,
            },
            _ = sleep_until(wake_at), if next.is_some() => {
                fire_due(&mut queue, &mut ops_rx);
            }
        }
    }
    trace!("event loop driver exits with {} pending timer(s)", queue.len());
}

fn fire_due(queue: &mut TimerQueue, ops_rx: &mut mpsc::UnboundedReceiver<TimerOp>) {
    let now = Instant::now();
    while let Some((deadline, id, job)) = queue.pop_due(now) {
        match job {
            Job::Once(task) => {
                if catch_unwind(AssertUnwindSafe(task)).is_err() {
                    error!("timer {:?} panicked", id);
                }
            }
            Job::Repeating { period, mut task } => {
                if catch_unwind(AssertUnwindSafe(&mut task)).is_err() {
                    error!("repeating timer {:?} panicked", id);
                }
                queue.insert(id, deadline + period, Job::Repeating { period, task });
            }
        }
        // a task may have cancelled or added timers due in this same pass
        while let Ok(op) = ops_rx.try_recv() {
            queue.apply(op);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use tokio::time::sleep;

    fn recorder() -> (Arc<Mutex<Vec<&'static str>>>, impl Fn(&'static str) -> Task) {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let calls_clone = calls.clone();
        let make = move |name: &'static str| -> Task {
            let calls = calls_clone.clone();
            Box::new(move || calls.lock().push(name))
        };
        (calls, make)
    }

    #[tokio::test(start_paused = true)]
    async fn test_fires_by_deadline() -> AppResult<()> {
        let event_loop = EventLoop::start()?;
        let handle = event_loop.handle();
        let (calls, make) = recorder();

        handle.schedule(Duration::from_millis(50), make("late"));
        handle.schedule(Duration::from_millis(10), make("early"));
        sleep(Duration::from_millis(100)).await;

        assert_eq!(*calls.lock(), vec!["early", "late"]);
        event_loop.shutdown().await
    }

    #[tokio::test(start_paused = true)]
    async fn test_equal_deadlines_keep_schedule_order() -> AppResult<()> {
        let event_loop = EventLoop::start()?;
        let handle = event_loop.handle();
        let (calls, make) = recorder();

        handle.schedule(Duration::from_millis(20), make("a"));
        handle.schedule(Duration::from_millis(20), make("b"));
        handle.defer(make("now"));
        handle.schedule(Duration::from_millis(20), make("c"));
        sleep(Duration::from_millis(30)).await;

        assert_eq!(*calls.lock(), vec!["now", "a", "b", "c"]);
        event_loop.shutdown().await
    }

    #[tokio::test(start_paused = true)]
    async fn test_nothing_fires_early() -> AppResult<()> {
        let event_loop = EventLoop::start()?;
        let handle = event_loop.handle();
        let (calls, make) = recorder();

        handle.schedule(Duration::from_millis(100), make("a"));
        sleep(Duration::from_millis(99)).await;
        assert!(calls.lock().is_empty());
        sleep(Duration::from_millis(2)).await;
        assert_eq!(*calls.lock(), vec!["a"]);
        event_loop.shutdown().await
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_one_shot() -> AppResult<()> {
        let event_loop = EventLoop::start()?;
        let handle = event_loop.handle();
        let (calls, make) = recorder();

        let id = handle.schedule(Duration::from_millis(10), make("a"));
        handle.cancel(id);
        sleep(Duration::from_millis(20)).await;

        assert!(calls.lock().is_empty());
        event_loop.shutdown().await
    }

    #[tokio::test(start_paused = true)]
    async fn test_repeating_until_guard_dropped() -> AppResult<()> {
        let event_loop = EventLoop::start()?;
        let handle = event_loop.handle();
        let ticks = Arc::new(AtomicU64::new(0));
        let ticks_clone = ticks.clone();

        let guard = handle.schedule_repeating(Duration::from_millis(10), move || {
            ticks_clone.fetch_add(1, Ordering::SeqCst);
        });
        sleep(Duration::from_millis(35)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), 3);

        drop(guard);
        sleep(Duration::from_millis(50)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), 3);
        event_loop.shutdown().await
    }

    #[tokio::test(start_paused = true)]
    async fn test_guard_cancel_is_idempotent() -> AppResult<()> {
        let event_loop = EventLoop::start()?;
        let guard = event_loop
            .handle()
            .schedule_repeating(Duration::from_millis(10), || {});
        assert!(guard.cancel());
        assert!(!guard.cancel());
        assert!(guard.is_cancelled());
        event_loop.shutdown().await
    }

    #[tokio::test(start_paused = true)]
    async fn test_task_can_cancel_timer_due_in_same_pass() -> AppResult<()> {
        let event_loop = EventLoop::start()?;
        let handle = event_loop.handle();
        let (calls, make) = recorder();

        let victim = Arc::new(Mutex::new(None));
        let victim_clone = victim.clone();
        let handle_clone = handle.clone();
        handle.schedule(Duration::from_millis(10), move || {
            if let Some(id) = victim_clone.lock().take() {
                handle_clone.cancel(id);
            }
        });
        *victim.lock() = Some(handle.schedule(Duration::from_millis(10), make("victim")));
        sleep(Duration::from_millis(20)).await;

        assert!(calls.lock().is_empty());
        event_loop.shutdown().await
    }

    #[tokio::test(start_paused = true)]
    async fn test_panicking_task_does_not_stop_loop() -> AppResult<()> {
        let event_loop = EventLoop::start()?;
        let handle = event_loop.handle();
        let (calls, make) = recorder();

        handle.schedule(Duration::from_millis(5), || panic!("listener bug"));
        handle.schedule(Duration::from_millis(10), make("after"));
        sleep(Duration::from_millis(20)).await;

        assert_eq!(*calls.lock(), vec!["after"]);
        event_loop.shutdown().await
    }

    #[tokio::test(start_paused = true)]
    async fn test_schedule_after_shutdown_is_dropped() -> AppResult<()> {
        let event_loop = EventLoop::start()?;
        let handle = event_loop.handle();
        event_loop.shutdown().await?;

        let (calls, make) = recorder();
        handle.schedule(Duration::from_millis(1), make("never"));
        sleep(Duration::from_millis(5)).await;
        assert!(calls.lock().is_empty());
        assert!(handle.is_closed());
        Ok(())
    }

    #[test]
    fn test_start_outside_runtime() {
        assert!(matches!(EventLoop::start(), Err(AppError::IllegalState(_))));
    }
}
