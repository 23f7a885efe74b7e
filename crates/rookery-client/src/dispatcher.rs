//! Event dispatcher.
//!
//! A single worker task drains a bounded FIFO queue and invokes handlers
//! serially, so every watcher observes events in the order the server (or
//! the session engine, for synthetic state events) emitted them.
//!
//! State events go to the default watcher. Node events are resolved against
//! the watch registry: the matching one-shot registrations are consumed and
//! fired; an event nobody registered for falls through to the default
//! watcher.

use std::sync::{Arc, Mutex, RwLock};

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use rookery_common::protocol::records::WatcherEvent;

use crate::paths::Chroot;
use crate::watch::{EventType, KeeperState, WatchRegistry, WatchedEvent, Watcher};

/// Queue depth before the session engine back-pressures on event delivery.
const EVENT_QUEUE_DEPTH: usize = 256;

/// An event travelling from the session engine to the dispatcher worker.
#[derive(Debug)]
pub(crate) enum DispatchEvent {
    /// Synthetic session state transition. The engine blocks on `ack` so
    /// the default watcher observes the transition before any response
    /// callback that depends on the new state can complete.
    State {
        state: KeeperState,
        ack: oneshot::Sender<()>,
    },
    /// Raw server notification, path still in the server's namespace.
    Node(WatcherEvent),
}

/// Sender half handed to the session engine.
#[derive(Clone)]
pub(crate) struct EventDispatcher {
    tx: mpsc::Sender<DispatchEvent>,
}

impl EventDispatcher {
    /// Spawns the worker task and returns the sender plus its join handle.
    pub fn spawn(
        registry: Arc<Mutex<WatchRegistry>>,
        default_watcher: Arc<RwLock<Option<Arc<dyn Watcher>>>>,
        chroot: Chroot,
    ) -> (EventDispatcher, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(EVENT_QUEUE_DEPTH);
        let worker = tokio::spawn(run_worker(rx, registry, default_watcher, chroot));
        (EventDispatcher { tx }, worker)
    }

    /// Enqueues an event, waiting if the queue is full.
    ///
    /// A gone worker means the client is tearing down; the event is dropped.
    pub async fn send(&self, event: DispatchEvent) {
        if self.tx.send(event).await.is_err() {
            tracing::debug!("event dispatcher is gone; dropping event");
        }
    }
}

async fn run_worker(
    mut rx: mpsc::Receiver<DispatchEvent>,
    registry: Arc<Mutex<WatchRegistry>>,
    default_watcher: Arc<RwLock<Option<Arc<dyn Watcher>>>>,
    chroot: Chroot,
) {
    while let Some(event) = rx.recv().await {
        match event {
            DispatchEvent::State { state, ack } => {
                deliver_default(&default_watcher, WatchedEvent::state_event(state));
                let _ = ack.send(());
            }
            DispatchEvent::Node(raw) => {
                let event_type = EventType::from_i32(raw.event_type).unwrap_or(EventType::None);
                if event_type == EventType::None {
                    // A typeless notification carries only a state change.
                    let state = KeeperState::from_i32(raw.state)
                        .unwrap_or(KeeperState::SyncConnected);
                    deliver_default(&default_watcher, WatchedEvent::state_event(state));
                    continue;
                }

                let client_path = chroot.to_client(&raw.path);
                let handlers = {
                    let mut registry = registry
                        .lock()
                        .unwrap_or_else(|poisoned| poisoned.into_inner());
                    registry.take_for_event(event_type, &client_path)
                };
                let event = WatchedEvent::node_event(&raw, client_path);

                tracing::debug!(
                    event_type = ?event_type,
                    path = %event.path.as_deref().unwrap_or(""),
                    handlers = handlers.len(),
                    "dispatching node event"
                );

                if handlers.is_empty() {
                    deliver_default(&default_watcher, event);
                } else {
                    for handler in handlers {
                        handler.process(event.clone());
                    }
                }
            }
        }
    }
}

fn deliver_default(
    slot: &Arc<RwLock<Option<Arc<dyn Watcher>>>>,
    event: WatchedEvent,
) {
    let watcher = slot
        .read()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
        .clone();
    if let Some(watcher) = watcher {
        watcher.process(event);
    }
}
