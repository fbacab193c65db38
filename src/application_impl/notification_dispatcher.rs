use crate::domain_port::NotifyError;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio_util::task::TaskTracker;

#[derive(Debug, Clone, Copy)]
pub struct DispatcherConfig {
    pub capacity: usize,
    pub send_timeout: Duration,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            capacity: 50,
            send_timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum DispatchOutcome {
    Accepted,
    /// No free slot, or the dispatcher is shutting down. The send is dropped.
    Shed,
}

/// Bounded fire-and-forget sender. Accepted sends run on their own task, so
/// dropping the calling request does not cancel them; each is capped by
/// `send_timeout` so its slot always comes back.
pub struct NotificationDispatcher {
    slots: Arc<Semaphore>,
    capacity: usize,
    send_timeout: Duration,
    tracker: TaskTracker,
}

impl NotificationDispatcher {
    pub fn new(config: DispatcherConfig) -> Self {
        Self {
            slots: Arc::new(Semaphore::new(config.capacity)),
            capacity: config.capacity,
            send_timeout: config.send_timeout,
            tracker: TaskTracker::new(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn available(&self) -> usize {
        self.slots.available_permits()
    }

    pub fn in_flight(&self) -> usize {
        self.capacity - self.available()
    }

    pub fn dispatch<F>(&self, kind: &'static str, send: F) -> DispatchOutcome
    where
        F: Future<Output = Result<(), NotifyError>> + Send + 'static,
    {
        if self.tracker.is_closed() {
            tracing::warn!(target: "audit", kind, "notification shed: dispatcher closed");
            return DispatchOutcome::Shed;
        }

        let permit = match self.slots.clone().try_acquire_owned() {
            Ok(p) => p,
            Err(_) => {
                tracing::warn!(
                    target: "audit",
                    kind,
                    capacity = self.capacity,
                    "notification shed: dispatcher at capacity"
                );
                return DispatchOutcome::Shed;
            }
        };

        let send_timeout = self.send_timeout;
        self.tracker.spawn(async move {
            let _permit_guard = permit;
            match tokio::time::timeout(send_timeout, send).await {
                Ok(Ok(())) => tracing::debug!(kind, "notification sent"),
                Ok(Err(e)) => {
                    tracing::warn!(target: "audit", kind, error = %e, "notification failed")
                }
                Err(_) => tracing::warn!(
                    target: "audit",
                    kind,
                    timeout_secs = send_timeout.as_secs(),
                    "notification timed out"
                ),
            }
        });

        DispatchOutcome::Accepted
    }

    /// Stops accepting sends and waits up to `grace` for in-flight ones.
    pub async fn shutdown(&self, grace: Duration) -> bool {
        self.tracker.close();
        match tokio::time::timeout(grace, self.tracker.wait()).await {
            Ok(()) => true,
            Err(_) => {
                tracing::warn!(in_flight = self.in_flight(), "dispatcher shutdown timed out");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::oneshot;

    fn dispatcher(capacity: usize, secs: u64) -> NotificationDispatcher {
        NotificationDispatcher::new(DispatcherConfig {
            capacity,
            send_timeout: Duration::from_secs(secs),
        })
    }

    #[tokio::test]
    async fn sheds_when_every_slot_is_busy() {
        let d = dispatcher(2, 30);
        let (tx1, rx1) = oneshot::channel::<()>();
        let (tx2, rx2) = oneshot::channel::<()>();

        let hold = |rx: oneshot::Receiver<()>| async move {
            let _ = rx.await;
            Ok::<(), NotifyError>(())
        };
        assert_eq!(d.dispatch("test", hold(rx1)), DispatchOutcome::Accepted);
        assert_eq!(d.dispatch("test", hold(rx2)), DispatchOutcome::Accepted);
        assert_eq!(d.in_flight(), 2);

        let ran = Arc::new(AtomicUsize::new(0));
        let ran2 = ran.clone();
        let outcome = d.dispatch("test", async move {
            ran2.fetch_add(1, Ordering::SeqCst);
            Ok::<(), NotifyError>(())
        });
        assert_eq!(outcome, DispatchOutcome::Shed);

        tx1.send(()).unwrap();
        tx2.send(()).unwrap();
        assert!(d.shutdown(Duration::from_secs(1)).await);
        assert_eq!(ran.load(Ordering::SeqCst), 0);
        assert_eq!(d.available(), 2);
    }

    #[tokio::test]
    async fn slot_is_released_after_a_send_finishes() {
        let d = dispatcher(1, 30);
        let (done_tx, done_rx) = oneshot::channel();
        assert_eq!(
            d.dispatch("test", async move {
                let _ = done_tx.send(());
                Ok::<(), NotifyError>(())
            }),
            DispatchOutcome::Accepted
        );
        done_rx.await.unwrap();
        tokio::task::yield_now().await;
        while d.available() == 0 {
            tokio::task::yield_now().await;
        }
        let outcome = d.dispatch("test", async { Ok::<(), NotifyError>(()) });
        assert_eq!(outcome, DispatchOutcome::Accepted);
    }

    #[tokio::test(start_paused = true)]
    async fn hung_send_is_cut_off_by_timeout() {
        let d = dispatcher(1, 30);
        d.dispatch("test", std::future::pending::<Result<(), NotifyError>>());
        assert_eq!(d.available(), 0);

        tokio::time::sleep(Duration::from_secs(31)).await;
        assert!(d.shutdown(Duration::from_secs(1)).await);
        assert_eq!(d.available(), 1);
    }

    #[tokio::test]
    async fn failed_send_does_not_leak_a_slot() {
        let d = dispatcher(1, 30);
        d.dispatch("test", async {
            Err::<(), _>(NotifyError::Delivery("smtp down".into()))
        });
        assert!(d.shutdown(Duration::from_secs(1)).await);
        assert_eq!(d.available(), 1);
    }

    #[tokio::test]
    async fn send_survives_the_caller_being_dropped() {
        let d = Arc::new(dispatcher(4, 30));
        let (done_tx, done_rx) = oneshot::channel();
        let (dispatched_tx, dispatched_rx) = oneshot::channel();

        let caller = {
            let d = d.clone();
            tokio::spawn(async move {
                d.dispatch("test", async move {
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    let _ = done_tx.send(());
                    Ok::<(), NotifyError>(())
                });
                let _ = dispatched_tx.send(());
                std::future::pending::<()>().await;
            })
        };
        dispatched_rx.await.unwrap();
        caller.abort();

        done_rx.await.unwrap();
    }

    #[tokio::test]
    async fn closed_dispatcher_sheds() {
        let d = dispatcher(4, 30);
        assert!(d.shutdown(Duration::from_secs(1)).await);
        let outcome = d.dispatch("test", async { Ok::<(), NotifyError>(()) });
        assert_eq!(outcome, DispatchOutcome::Shed);
    }
}
