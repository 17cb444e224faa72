//! Background task tracking so a spawned RPC handler isn't silently
//! dropped or its panic lost -- a tokio generalization of the teacher's
//! `worker::SpawnExecutor` join-set pattern, simplified to plain
//! fire-and-forget futures since no work result needs routing back to a
//! caller (every engine mutation already happened under the state lock
//! before the task was spawned).

use std::future::Future;
use std::pin::Pin;

use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinSet;
use tracing::error;

type BoxedTask = Pin<Box<dyn Future<Output = ()> + Send>>;

#[derive(Clone)]
pub struct TaskTracker {
    sender: UnboundedSender<BoxedTask>,
}

impl TaskTracker {
    pub fn new() -> (Self, TaskReaper) {
        let (sender, receiver) = unbounded_channel();
        (
            Self { sender },
            TaskReaper {
                receiver,
                handles: JoinSet::new(),
            },
        )
    }

    /// Enqueue `fut` to run in the background. Returns immediately so the
    /// calling HTTP handler can reply 202 Accepted per spec §6.
    pub fn spawn(&self, fut: impl Future<Output = ()> + Send + 'static) {
        if self.sender.send(Box::pin(fut)).is_err() {
            error!("task reaper is gone, dropping background work");
        }
    }
}

pub struct TaskReaper {
    receiver: UnboundedReceiver<BoxedTask>,
    handles: JoinSet<()>,
}

impl TaskReaper {
    pub async fn run(mut self) {
        loop {
            tokio::select! {
                Some(result) = self.handles.join_next(), if !self.handles.is_empty() => {
                    if let Err(err) = result {
                        error!("background task panicked: {err}");
                    }
                }
                work = self.receiver.recv() => {
                    match work {
                        Some(fut) => { self.handles.spawn(fut); }
                        None => break,
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn spawned_work_runs_to_completion() {
        let (tracker, reaper) = TaskTracker::new();
        tokio::spawn(reaper.run());

        let done = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&done);
        tracker.spawn(async move { flag.store(true, Ordering::SeqCst) });

        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        assert!(done.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn a_panicking_task_does_not_take_down_the_reaper() {
        let (tracker, reaper) = TaskTracker::new();
        tokio::spawn(reaper.run());

        tracker.spawn(async { panic!("boom") });

        let done = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&done);
        tracker.spawn(async move { flag.store(true, Ordering::SeqCst) });

        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        assert!(done.load(Ordering::SeqCst));
    }
}
