// argus/src/hub/mod.rs
//
// Live anomaly fan-out.
//
// EventHub is an actor: a single task owns the subscriber map and processes
// Register / Unregister / Publish commands off one channel, so membership
// changes are totally ordered with respect to publishes. Nothing else ever
// touches the map.
//
// Delivery is try_send onto each subscriber's bounded queue. A full queue
// means the subscriber cannot keep up: it is evicted on the spot and its
// queue closed (the sender is dropped). Publishing is a synchronous enqueue
// onto the command channel and never waits on any subscriber.

pub mod session;

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::HubConfig;
use crate::telemetry::Telemetry;

pub type SubscriberId = u64;

/// One serialized event. Shared by every subscriber queue it lands in.
pub type Frame = Arc<str>;

enum Command {
    Register { id: SubscriberId, queue: mpsc::Sender<Frame> },
    Unregister(SubscriberId),
    Publish(Frame),
}

// ── Actor ─────────────────────────────────────────────────────────────────────

pub struct EventHub {
    commands:    mpsc::UnboundedReceiver<Command>,
    subscribers: HashMap<SubscriberId, mpsc::Sender<Frame>>,
    telemetry:   Arc<Telemetry>,
}

impl EventHub {
    pub fn new(config: &HubConfig, telemetry: Arc<Telemetry>) -> (Self, HubHandle) {
        let (tx, rx) = mpsc::unbounded_channel();
        let hub = Self {
            commands:    rx,
            subscribers: HashMap::new(),
            telemetry:   Arc::clone(&telemetry),
        };
        let handle = HubHandle {
            commands:    tx,
            next_id:     Arc::new(AtomicU64::new(1)),
            queue_depth: config.queue_depth.max(1),
            telemetry,
        };
        (hub, handle)
    }

    /// Runs until `cancel` fires. Pending commands are not drained.
    pub async fn run(mut self, cancel: CancellationToken) {
        info!("event hub started");
        loop {
            let command = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                cmd = self.commands.recv() => match cmd {
                    Some(cmd) => cmd,
                    None      => break,
                },
            };
            self.apply(command);
        }
        info!(subscribers = self.subscribers.len(), "event hub stopped");
    }

    fn apply(&mut self, command: Command) {
        match command {
            Command::Register { id, queue } => {
                self.subscribers.insert(id, queue);
                self.telemetry.set_subscribers(self.subscribers.len());
                info!(subscriber = id, subscribers = self.subscribers.len(), "subscriber connected");
            }
            Command::Unregister(id) => {
                // Dropping the sender closes the queue; the write pump sees None.
                if self.subscribers.remove(&id).is_some() {
                    Telemetry::incr(&self.telemetry.subscribers_disconnected);
                    self.telemetry.set_subscribers(self.subscribers.len());
                    info!(subscriber = id, subscribers = self.subscribers.len(), "subscriber disconnected");
                }
            }
            Command::Publish(frame) => self.broadcast(frame),
        }
    }

    fn broadcast(&mut self, frame: Frame) {
        let before    = self.subscribers.len();
        let telemetry = &self.telemetry;

        self.subscribers.retain(|id, queue| match queue.try_send(Arc::clone(&frame)) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                warn!(subscriber = *id, "subscriber queue saturated, disconnecting");
                Telemetry::incr(&telemetry.subscribers_dropped);
                false
            }
            Err(TrySendError::Closed(_)) => {
                debug!(subscriber = *id, "subscriber queue already closed");
                Telemetry::incr(&telemetry.subscribers_disconnected);
                false
            }
        });

        if self.subscribers.len() != before {
            self.telemetry.set_subscribers(self.subscribers.len());
            info!(subscribers = self.subscribers.len(), "subscriber set shrank during broadcast");
        }
    }
}

// ── Handle ────────────────────────────────────────────────────────────────────

/// Cheap, cloneable front door to the hub. All operations are non-blocking.
#[derive(Clone)]
pub struct HubHandle {
    commands:    mpsc::UnboundedSender<Command>,
    next_id:     Arc<AtomicU64>,
    queue_depth: usize,
    telemetry:   Arc<Telemetry>,
}

impl HubHandle {
    /// Register a new subscriber. Dropping the returned Registration
    /// unregisters it; the receiver yields frames in publish order.
    pub fn subscribe(&self) -> (Registration, mpsc::Receiver<Frame>) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(self.queue_depth);
        if self.commands.send(Command::Register { id, queue: tx }).is_err() {
            debug!(subscriber = id, "hub stopped, registration ignored");
        }
        let registration = Registration { id, hub: self.commands.downgrade() };
        (registration, rx)
    }

    /// Idempotent: unknown or already-removed ids are ignored by the hub.
    pub fn unregister(&self, id: SubscriberId) {
        let _ = self.commands.send(Command::Unregister(id));
    }

    /// Serialize once and queue for fan-out. Returns false if the event could
    /// not be serialized or the hub has stopped.
    pub fn publish<T: Serialize>(&self, event: &T) -> bool {
        let frame: Frame = match serde_json::to_string(event) {
            Ok(json) => json.into(),
            Err(e) => {
                warn!("failed to serialize event: {}", e);
                return false;
            }
        };
        if self.commands.send(Command::Publish(frame)).is_err() {
            debug!("hub stopped, event dropped");
            return false;
        }
        Telemetry::incr(&self.telemetry.events_published);
        true
    }
}

/// Membership token for one subscriber. Holds only a weak reference to the
/// hub's command channel; dropping it unregisters exactly once.
pub struct Registration {
    id:  SubscriberId,
    hub: mpsc::WeakUnboundedSender<Command>,
}

impl Registration {
    pub fn id(&self) -> SubscriberId {
        self.id
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        if let Some(hub) = self.hub.upgrade() {
            let _ = hub.send(Command::Unregister(self.id));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::task::JoinHandle;
    use tokio::time::timeout;

    fn start(depth: usize) -> (HubHandle, Arc<Telemetry>, CancellationToken, JoinHandle<()>) {
        let telemetry     = Telemetry::new();
        let (hub, handle) = EventHub::new(&HubConfig { queue_depth: depth }, Arc::clone(&telemetry));
        let cancel        = CancellationToken::new();
        let task          = tokio::spawn(hub.run(cancel.clone()));
        (handle, telemetry, cancel, task)
    }

    async fn next(rx: &mut mpsc::Receiver<Frame>) -> Option<Frame> {
        timeout(Duration::from_secs(1), rx.recv()).await.expect("hub did not respond")
    }

    #[tokio::test]
    async fn delivers_in_publish_order() {
        let (hub, _, _cancel, _task) = start(16);
        let (_reg, mut rx) = hub.subscribe();

        assert!(hub.publish(&"E1"));
        assert!(hub.publish(&"E2"));

        assert_eq!(&*next(&mut rx).await.unwrap(), "\"E1\"");
        assert_eq!(&*next(&mut rx).await.unwrap(), "\"E2\"");
    }

    #[tokio::test]
    async fn saturated_subscriber_is_evicted_without_blocking_the_publisher() {
        let (hub, telemetry, _cancel, _task) = start(1);
        let (_slow_reg, mut slow) = hub.subscribe();
        let (_fast_reg, mut fast) = hub.subscribe();

        // `slow` never reads until all three are queued; depth 1 overflows on E2.
        let published = timeout(Duration::from_millis(50), async {
            hub.publish(&"E1");
            // keep `fast` drained so only `slow` saturates
            let e1 = next(&mut fast).await;
            hub.publish(&"E2");
            let e2 = next(&mut fast).await;
            hub.publish(&"E3");
            let e3 = next(&mut fast).await;
            (e1, e2, e3)
        })
        .await
        .expect("publisher blocked");
        assert!(published.0.is_some() && published.1.is_some() && published.2.is_some());

        assert_eq!(&*next(&mut slow).await.unwrap(), "\"E1\"");
        assert!(next(&mut slow).await.is_none(), "evicted queue must be closed");
        assert_eq!(telemetry.subscribers_dropped.load(Ordering::Relaxed), 1);
        assert_eq!(telemetry.subscribers.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn unregister_is_idempotent() {
        let (hub, telemetry, _cancel, _task) = start(8);
        let (reg, mut rx) = hub.subscribe();
        let id = reg.id();

        hub.unregister(id);
        drop(reg); // second Unregister for the same id
        hub.unregister(id);
        assert!(next(&mut rx).await.is_none());
        assert_eq!(telemetry.subscribers_disconnected.load(Ordering::Relaxed), 1);

        // hub is still healthy and serving new subscribers
        let (_fresh_reg, mut fresh) = hub.subscribe();
        hub.publish(&"after");
        assert_eq!(&*next(&mut fresh).await.unwrap(), "\"after\"");
        assert_eq!(telemetry.subscribers.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn late_subscriber_misses_earlier_events() {
        let (hub, _, _cancel, _task) = start(8);
        let (_early_reg, mut early) = hub.subscribe();
        hub.publish(&"before");
        assert!(next(&mut early).await.is_some());

        let (_late_reg, mut late) = hub.subscribe();
        hub.publish(&"after");
        assert_eq!(&*next(&mut late).await.unwrap(), "\"after\"");
    }

    #[tokio::test]
    async fn cancellation_stops_the_loop_and_closes_queues() {
        let (hub, _, cancel, task) = start(8);
        let (_reg, mut rx) = hub.subscribe();
        hub.publish(&"x");
        assert!(next(&mut rx).await.is_some());

        cancel.cancel();
        timeout(Duration::from_secs(1), task).await.unwrap().unwrap();

        assert!(next(&mut rx).await.is_none());
        assert!(!hub.publish(&"y"));
    }
}
