//! Watches and watch bookkeeping.
//!
//! A watch is a one-shot server-side subscription installed by a successful
//! read operation. The client keeps three maps (data, exist, child) from
//! client path to pending handlers; a server notification consumes the
//! matching entries, so every handler fires at most once.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use rookery_common::protocol::records::WatcherEvent;
use rookery_common::ErrorCode;

/// Receives watch notifications and session state changes.
///
/// Handlers run serially on the client's dispatcher; a slow handler delays
/// every later event, so hand off heavy work to your own executor.
pub trait Watcher: Send + Sync {
    fn process(&self, event: WatchedEvent);
}

impl<F> Watcher for F
where
    F: Fn(WatchedEvent) + Send + Sync,
{
    fn process(&self, event: WatchedEvent) {
        self(event)
    }
}

/// What happened on the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventType {
    /// Not a node event; carries a session state change.
    None,
    NodeCreated,
    NodeDeleted,
    NodeDataChanged,
    NodeChildrenChanged,
}

impl EventType {
    pub fn from_i32(value: i32) -> Option<EventType> {
        Some(match value {
            -1 => EventType::None,
            1 => EventType::NodeCreated,
            2 => EventType::NodeDeleted,
            3 => EventType::NodeDataChanged,
            4 => EventType::NodeChildrenChanged,
            _ => return None,
        })
    }

    pub fn as_i32(self) -> i32 {
        match self {
            EventType::None => -1,
            EventType::NodeCreated => 1,
            EventType::NodeDeleted => 2,
            EventType::NodeDataChanged => 3,
            EventType::NodeChildrenChanged => 4,
        }
    }
}

/// Session state as seen by watchers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeeperState {
    Disconnected,
    SyncConnected,
    AuthFailed,
    Expired,
}

impl KeeperState {
    pub fn from_i32(value: i32) -> Option<KeeperState> {
        Some(match value {
            0 => KeeperState::Disconnected,
            3 => KeeperState::SyncConnected,
            4 => KeeperState::AuthFailed,
            -112 => KeeperState::Expired,
            _ => return None,
        })
    }

    pub fn as_i32(self) -> i32 {
        match self {
            KeeperState::Disconnected => 0,
            KeeperState::SyncConnected => 3,
            KeeperState::AuthFailed => 4,
            KeeperState::Expired => -112,
        }
    }
}

/// The event handed to a [`Watcher`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchedEvent {
    pub event_type: EventType,
    pub keeper_state: KeeperState,
    /// Client-namespace path; `None` for session state events.
    pub path: Option<String>,
}

impl WatchedEvent {
    pub fn state_event(state: KeeperState) -> WatchedEvent {
        WatchedEvent {
            event_type: EventType::None,
            keeper_state: state,
            path: None,
        }
    }

    /// Builds a node event from a wire notification with the chroot already
    /// stripped from `client_path`.
    pub fn node_event(raw: &WatcherEvent, client_path: String) -> WatchedEvent {
        WatchedEvent {
            event_type: EventType::from_i32(raw.event_type).unwrap_or(EventType::None),
            keeper_state: KeeperState::from_i32(raw.state).unwrap_or(KeeperState::SyncConnected),
            path: Some(client_path),
        }
    }
}

/// Which map a pending watch lands in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchKind {
    Data,
    Exist,
    Child,
}

/// A watch waiting for the operation that requested it to succeed.
#[derive(Clone)]
pub struct WatchRegistration {
    pub kind: WatchKind,
    pub client_path: String,
    pub watcher: Arc<dyn Watcher>,
}

impl WatchRegistration {
    pub fn new(kind: WatchKind, client_path: impl Into<String>, watcher: Arc<dyn Watcher>) -> Self {
        WatchRegistration {
            kind,
            client_path: client_path.into(),
            watcher,
        }
    }

    /// Whether a reply with this error code installs the watch.
    ///
    /// Exist watches install on `NoNode` too: the caller is waiting for the
    /// node to appear.
    pub fn installs_on(&self, code: ErrorCode) -> bool {
        match self.kind {
            WatchKind::Exist => matches!(code, ErrorCode::Ok | ErrorCode::NoNode),
            WatchKind::Data | WatchKind::Child => code == ErrorCode::Ok,
        }
    }
}

impl std::fmt::Debug for WatchRegistration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatchRegistration")
            .field("kind", &self.kind)
            .field("client_path", &self.client_path)
            .finish()
    }
}

/// The three one-shot watch maps, keyed by client path.
#[derive(Default)]
pub struct WatchRegistry {
    data: HashMap<String, Vec<Arc<dyn Watcher>>>,
    exist: HashMap<String, Vec<Arc<dyn Watcher>>>,
    child: HashMap<String, Vec<Arc<dyn Watcher>>>,
}

impl WatchRegistry {
    pub fn new() -> WatchRegistry {
        WatchRegistry::default()
    }

    /// Installs a watch once its requesting operation has succeeded.
    pub fn install(&mut self, registration: WatchRegistration) {
        let map = match registration.kind {
            WatchKind::Data => &mut self.data,
            WatchKind::Exist => &mut self.exist,
            WatchKind::Child => &mut self.child,
        };
        map.entry(registration.client_path)
            .or_default()
            .push(registration.watcher);
    }

    /// Removes and returns every handler a node event targets.
    ///
    /// Which maps are consumed depends on the event type: creation and data
    /// changes consume data and exist watches, deletion consumes all three,
    /// child changes consume only child watches.
    pub fn take_for_event(&mut self, event_type: EventType, path: &str) -> Vec<Arc<dyn Watcher>> {
        let mut handlers = Vec::new();
        let mut drain = |map: &mut HashMap<String, Vec<Arc<dyn Watcher>>>| {
            if let Some(found) = map.remove(path) {
                handlers.extend(found);
            }
        };

        match event_type {
            EventType::NodeCreated | EventType::NodeDataChanged => {
                drain(&mut self.data);
                drain(&mut self.exist);
            }
            EventType::NodeDeleted => {
                drain(&mut self.data);
                drain(&mut self.exist);
                drain(&mut self.child);
            }
            EventType::NodeChildrenChanged => {
                drain(&mut self.child);
            }
            EventType::None => {}
        }
        handlers
    }

    /// Drops every registration. Used when the session expires: the server
    /// has forgotten the watches, so the client must too.
    pub fn clear(&mut self) {
        self.data.clear();
        self.exist.clear();
        self.child.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty() && self.exist.is_empty() && self.child.is_empty()
    }

    #[cfg(test)]
    pub fn counts(&self) -> (usize, usize, usize) {
        (self.data.len(), self.exist.len(), self.child.len())
    }
}

/// Forwards to whatever watcher currently occupies the default slot.
///
/// Operations that take `watch: bool` register this proxy rather than a
/// snapshot of the default watcher, so swapping the default watcher also
/// redirects watches that are already pending.
pub struct DefaultWatcherProxy {
    slot: Arc<RwLock<Option<Arc<dyn Watcher>>>>,
}

impl DefaultWatcherProxy {
    pub fn new(slot: Arc<RwLock<Option<Arc<dyn Watcher>>>>) -> Self {
        DefaultWatcherProxy { slot }
    }
}

impl Watcher for DefaultWatcherProxy {
    fn process(&self, event: WatchedEvent) {
        let watcher = self
            .slot
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone();
        if let Some(watcher) = watcher {
            watcher.process(event);
        }
    }
}
