//! The user-facing client.
//!
//! [`Rookery`] is a cheap-to-clone handle over the session engine: it
//! validates paths, rewrites them through the chroot, marshals operation
//! bodies, and hands submissions to the engine's channel. All clones share
//! one session and one TCP connection.
//!
//! # Usage
//!
//! ```rust,no_run
//! use rookery_client::{CreateMode, Rookery};
//! use rookery_common::protocol::records::Acl;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = Rookery::connect("127.0.0.1:2181/app").await?;
//!
//!     let path = client
//!         .create("/task", b"payload".to_vec(), Acl::open_unsafe(), CreateMode::Persistent)
//!         .await?;
//!     let (data, _stat) = client.get_data(&path, false).await?;
//!     assert_eq!(data, b"payload");
//!
//!     client.close().await;
//!     Ok(())
//! }
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use rookery_common::protocol::records::{
    Acl, AuthPacket, CreateRequest, CreateResponse, DeleteRequest, ExistsRequest, GetAclRequest,
    GetAclResponse, GetChildren2Request, GetChildren2Response, GetDataRequest, GetDataResponse,
    SetAclRequest, SetDataRequest, Stat, StatResponse, SyncRequest, SyncResponse,
};
use rookery_common::{ErrorCode, OpCode, Result, RookeryError};

use crate::config::ClientConfig;
use crate::dispatcher::EventDispatcher;
use crate::hosts::{parse_connect_string, HostList};
use crate::paths::{validate_path, Chroot};
use crate::pending::{PendingQueue, RequestSubmission};
use crate::sasl::SaslClient;
use crate::session::{Session, SessionEngine, SessionState, StateCell, Submission};
use crate::watch::{
    DefaultWatcherProxy, WatchKind, WatchRegistration, WatchRegistry, Watcher,
};

/// Submissions queued ahead of the writer before callers back-pressure.
const SUBMIT_QUEUE_DEPTH: usize = 1024;

/// Disposition of a node created by [`Rookery::create`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateMode {
    /// Survives the session.
    Persistent,
    /// Deleted by the server when the creating session ends.
    Ephemeral,
    /// Persistent, with a server-appended monotonic suffix.
    PersistentSequential,
    /// Ephemeral, with a server-appended monotonic suffix.
    EphemeralSequential,
}

impl CreateMode {
    /// The `flags` field of the create body.
    pub fn flags(self) -> i32 {
        match self {
            CreateMode::Persistent => 0,
            CreateMode::Ephemeral => 1,
            CreateMode::PersistentSequential => 2,
            CreateMode::EphemeralSequential => 3,
        }
    }

    pub fn is_ephemeral(self) -> bool {
        matches!(self, CreateMode::Ephemeral | CreateMode::EphemeralSequential)
    }

    pub fn is_sequential(self) -> bool {
        matches!(
            self,
            CreateMode::PersistentSequential | CreateMode::EphemeralSequential
        )
    }
}

/// Optional collaborators supplied at construction.
#[derive(Default)]
pub struct ConnectOptions {
    default_watcher: Option<Arc<dyn Watcher>>,
    sasl: Option<Arc<dyn SaslClient>>,
    session: Option<(i64, Vec<u8>)>,
}

impl ConnectOptions {
    pub fn new() -> ConnectOptions {
        ConnectOptions::default()
    }

    /// Sets the default watcher that receives state events and unclaimed
    /// node events.
    pub fn with_default_watcher(mut self, watcher: Arc<dyn Watcher>) -> Self {
        self.default_watcher = Some(watcher);
        self
    }

    /// Injects a SASL capability, run after every successful handshake.
    pub fn with_sasl(mut self, sasl: Arc<dyn SaslClient>) -> Self {
        self.sasl = Some(sasl);
        self
    }

    /// Resumes an existing session instead of asking for a fresh one.
    pub fn with_session(mut self, session_id: i64, password: Vec<u8>) -> Self {
        self.session = Some((session_id, password));
        self
    }
}

struct ClientInner {
    submit_tx: mpsc::Sender<Submission>,
    state: Arc<StateCell>,
    session: Arc<Mutex<Session>>,
    default_watcher: Arc<RwLock<Option<Arc<dyn Watcher>>>>,
    chroot: Chroot,
    close_requested: Arc<AtomicBool>,
    engine_task: Mutex<Option<JoinHandle<()>>>,
    dispatcher_task: Mutex<Option<JoinHandle<()>>>,
}

/// Handle to one client instance.
///
/// Cloning is cheap; every clone shares the session, the watch registry,
/// and the connection. The last handle to go away tears the session down.
#[derive(Clone)]
pub struct Rookery {
    inner: Arc<ClientInner>,
}

impl Rookery {
    /// Connects with the default configuration and no default watcher.
    ///
    /// Returns as soon as the engine is spawned; the session is established
    /// in the background and early operations queue until it is up.
    pub async fn connect(connect_string: &str) -> Result<Rookery> {
        Self::connect_with(connect_string, ClientConfig::default(), ConnectOptions::new()).await
    }

    /// Connects with an explicit configuration.
    pub async fn connect_with_config(
        connect_string: &str,
        config: ClientConfig,
    ) -> Result<Rookery> {
        Self::connect_with(connect_string, config, ConnectOptions::new()).await
    }

    /// Connects with a default watcher for state and unclaimed node events.
    pub async fn connect_with_watcher(
        connect_string: &str,
        config: ClientConfig,
        watcher: Arc<dyn Watcher>,
    ) -> Result<Rookery> {
        Self::connect_with(
            connect_string,
            config,
            ConnectOptions::new().with_default_watcher(watcher),
        )
        .await
    }

    /// Connects with the full set of optional collaborators.
    pub async fn connect_with(
        connect_string: &str,
        config: ClientConfig,
        options: ConnectOptions,
    ) -> Result<Rookery> {
        let (hosts, chroot) = parse_connect_string(connect_string)?;
        let chroot = Chroot::new(chroot)?;
        let hosts = HostList::new(hosts, config.connect_backoff_max)?;

        let registry = Arc::new(Mutex::new(WatchRegistry::new()));
        let default_watcher = Arc::new(RwLock::new(options.default_watcher));
        let (events, dispatcher_task) =
            EventDispatcher::spawn(registry.clone(), default_watcher.clone(), chroot.clone());

        let (session_id, password) = options.session.unwrap_or((0, Vec::new()));
        let session = Arc::new(Mutex::new(Session::new(session_id, password)));
        let state = Arc::new(StateCell::new(SessionState::Connecting));
        let close_requested = Arc::new(AtomicBool::new(false));
        let (submit_tx, submit_rx) = mpsc::channel(SUBMIT_QUEUE_DEPTH);

        let engine = SessionEngine {
            config,
            hosts,
            state: state.clone(),
            session: session.clone(),
            submit_rx,
            pending: PendingQueue::new(),
            auth_backlog: Vec::new(),
            events,
            registry,
            sasl: options.sasl,
            close_requested: close_requested.clone(),
        };
        let engine_task = tokio::spawn(engine.run());

        Ok(Rookery {
            inner: Arc::new(ClientInner {
                submit_tx,
                state,
                session,
                default_watcher,
                chroot,
                close_requested,
                engine_task: Mutex::new(Some(engine_task)),
                dispatcher_task: Mutex::new(Some(dispatcher_task)),
            }),
        })
    }

    /// Current connection lifecycle state.
    pub fn state(&self) -> SessionState {
        self.inner.state.load()
    }

    /// Server-assigned session id; zero until the first handshake succeeds.
    pub fn session_id(&self) -> i64 {
        self.lock_session().id
    }

    /// Session password, for resuming the session from another client.
    pub fn session_password(&self) -> Vec<u8> {
        self.lock_session().password.clone()
    }

    /// Timeout the server actually granted.
    pub fn negotiated_timeout(&self) -> Duration {
        self.lock_session().negotiated_timeout
    }

    /// Replaces the default watcher. Watches already registered through the
    /// default slot follow the new watcher.
    pub fn set_default_watcher(&self, watcher: Option<Arc<dyn Watcher>>) {
        *self
            .inner
            .default_watcher
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = watcher;
    }

    /// Creates a node.
    ///
    /// Returns the created path (meaningful for sequential modes, where the
    /// server appends a suffix). The ACL list must not be empty; an empty
    /// list fails locally without touching the wire.
    pub async fn create(
        &self,
        path: &str,
        data: Vec<u8>,
        acl: Vec<Acl>,
        mode: CreateMode,
    ) -> Result<String> {
        validate_path(path)?;
        if acl.is_empty() {
            return Err(RookeryError::InvalidAcl);
        }
        let request = CreateRequest {
            path: self.inner.chroot.to_server(path),
            data,
            acl,
            flags: mode.flags(),
        };
        let body = self
            .submit(OpCode::Create, Some(path.to_string()), request.to_bytes(), None)
            .await?;
        let response = CreateResponse::from_bytes(&body)?;
        Ok(self.inner.chroot.to_client(&response.path))
    }

    /// Deletes a node. A `version` of `-1` matches any version.
    pub async fn delete(&self, path: &str, version: i32) -> Result<()> {
        validate_path(path)?;
        // The root is never rewritten through the chroot for deletion; the
        // chroot node itself is deleted through a non-chrooted client.
        let server_path = if path == "/" {
            path.to_string()
        } else {
            self.inner.chroot.to_server(path)
        };
        let request = DeleteRequest {
            path: server_path,
            version,
        };
        self.submit(OpCode::Delete, Some(path.to_string()), request.to_bytes(), None)
            .await?;
        Ok(())
    }

    /// Checks whether a node exists, optionally leaving a watch through the
    /// default watcher.
    ///
    /// Returns `None` instead of a `NoNode` error; with `watch` set, the
    /// watch is installed either way, so the caller learns when the node
    /// appears.
    pub async fn exists(&self, path: &str, watch: bool) -> Result<Option<Stat>> {
        validate_path(path)?;
        let registration = watch.then(|| self.default_registration(WatchKind::Exist, path));
        self.exists_inner(path, registration).await
    }

    /// Like [`exists`](Self::exists) with an explicit watcher.
    pub async fn exists_w(&self, path: &str, watcher: Arc<dyn Watcher>) -> Result<Option<Stat>> {
        validate_path(path)?;
        let registration = WatchRegistration::new(WatchKind::Exist, path, watcher);
        self.exists_inner(path, Some(registration)).await
    }

    async fn exists_inner(
        &self,
        path: &str,
        watch: Option<WatchRegistration>,
    ) -> Result<Option<Stat>> {
        let request = ExistsRequest {
            path: self.inner.chroot.to_server(path),
            watch: watch.is_some(),
        };
        let result = self
            .submit(OpCode::Exists, Some(path.to_string()), request.to_bytes(), watch)
            .await;
        match result {
            Ok(body) => Ok(Some(StatResponse::from_bytes(&body)?.stat)),
            Err(RookeryError::Server {
                code: ErrorCode::NoNode,
                ..
            }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Reads a node's data, optionally leaving a data watch through the
    /// default watcher.
    pub async fn get_data(&self, path: &str, watch: bool) -> Result<(Vec<u8>, Stat)> {
        validate_path(path)?;
        let registration = watch.then(|| self.default_registration(WatchKind::Data, path));
        self.get_data_inner(path, registration).await
    }

    /// Like [`get_data`](Self::get_data) with an explicit watcher.
    pub async fn get_data_w(
        &self,
        path: &str,
        watcher: Arc<dyn Watcher>,
    ) -> Result<(Vec<u8>, Stat)> {
        validate_path(path)?;
        let registration = WatchRegistration::new(WatchKind::Data, path, watcher);
        self.get_data_inner(path, Some(registration)).await
    }

    async fn get_data_inner(
        &self,
        path: &str,
        watch: Option<WatchRegistration>,
    ) -> Result<(Vec<u8>, Stat)> {
        let request = GetDataRequest {
            path: self.inner.chroot.to_server(path),
            watch: watch.is_some(),
        };
        let body = self
            .submit(OpCode::GetData, Some(path.to_string()), request.to_bytes(), watch)
            .await?;
        let response = GetDataResponse::from_bytes(&body)?;
        Ok((response.data, response.stat))
    }

    /// Writes a node's data. A `version` of `-1` matches any version.
    pub async fn set_data(&self, path: &str, data: Vec<u8>, version: i32) -> Result<Stat> {
        validate_path(path)?;
        let request = SetDataRequest {
            path: self.inner.chroot.to_server(path),
            data,
            version,
        };
        let body = self
            .submit(OpCode::SetData, Some(path.to_string()), request.to_bytes(), None)
            .await?;
        Ok(StatResponse::from_bytes(&body)?.stat)
    }

    /// Reads a node's ACL.
    pub async fn get_acl(&self, path: &str) -> Result<(Vec<Acl>, Stat)> {
        validate_path(path)?;
        let request = GetAclRequest {
            path: self.inner.chroot.to_server(path),
        };
        let body = self
            .submit(OpCode::GetAcl, Some(path.to_string()), request.to_bytes(), None)
            .await?;
        let response = GetAclResponse::from_bytes(&body)?;
        Ok((response.acl, response.stat))
    }

    /// Replaces a node's ACL. The list must not be empty.
    pub async fn set_acl(&self, path: &str, acl: Vec<Acl>, version: i32) -> Result<Stat> {
        validate_path(path)?;
        if acl.is_empty() {
            return Err(RookeryError::InvalidAcl);
        }
        let request = SetAclRequest {
            path: self.inner.chroot.to_server(path),
            acl,
            version,
        };
        let body = self
            .submit(OpCode::SetAcl, Some(path.to_string()), request.to_bytes(), None)
            .await?;
        Ok(StatResponse::from_bytes(&body)?.stat)
    }

    /// Lists a node's children (names only, unordered), optionally leaving
    /// a child watch through the default watcher.
    pub async fn get_children(&self, path: &str, watch: bool) -> Result<Vec<String>> {
        Ok(self.get_children_with_stat(path, watch).await?.0)
    }

    /// Like [`get_children`](Self::get_children), also returning the
    /// parent's stat.
    pub async fn get_children_with_stat(
        &self,
        path: &str,
        watch: bool,
    ) -> Result<(Vec<String>, Stat)> {
        validate_path(path)?;
        let registration = watch.then(|| self.default_registration(WatchKind::Child, path));
        self.get_children_inner(path, registration).await
    }

    /// Like [`get_children`](Self::get_children) with an explicit watcher.
    pub async fn get_children_w(
        &self,
        path: &str,
        watcher: Arc<dyn Watcher>,
    ) -> Result<Vec<String>> {
        validate_path(path)?;
        let registration = WatchRegistration::new(WatchKind::Child, path, watcher);
        Ok(self.get_children_inner(path, Some(registration)).await?.0)
    }

    async fn get_children_inner(
        &self,
        path: &str,
        watch: Option<WatchRegistration>,
    ) -> Result<(Vec<String>, Stat)> {
        let request = GetChildren2Request {
            path: self.inner.chroot.to_server(path),
            watch: watch.is_some(),
        };
        let body = self
            .submit(
                OpCode::GetChildren2,
                Some(path.to_string()),
                request.to_bytes(),
                watch,
            )
            .await?;
        let response = GetChildren2Response::from_bytes(&body)?;
        Ok((response.children, response.stat))
    }

    /// Flushes the server's pipeline for a path, so a subsequent read sees
    /// every write that committed before this call.
    pub async fn sync(&self, path: &str) -> Result<String> {
        validate_path(path)?;
        let request = SyncRequest {
            path: self.inner.chroot.to_server(path),
        };
        let body = self
            .submit(OpCode::Sync, Some(path.to_string()), request.to_bytes(), None)
            .await?;
        let response = SyncResponse::from_bytes(&body)?;
        Ok(self.inner.chroot.to_client(&response.path))
    }

    /// Adds authentication credentials to the session.
    ///
    /// Fire-and-forget: credentials are queued, sent ahead of user traffic
    /// on the current and every future connection, and a server rejection
    /// surfaces as the terminal auth-failed state rather than an error here.
    pub async fn add_auth(&self, scheme: &str, auth: Vec<u8>) -> Result<()> {
        let state = self.inner.state.load();
        if state.is_terminal() {
            return Err(self.terminal_error());
        }
        self.inner
            .submit_tx
            .send(Submission::AddAuth(AuthPacket::new(scheme, auth)))
            .await
            .map_err(|_| self.terminal_error())
    }

    /// Closes the session.
    ///
    /// Idempotent and safe to call from several handles concurrently; the
    /// first call performs the teardown, the rest return once it is done.
    /// Dropping the last handle converges on the same internal teardown.
    pub async fn close(&self) {
        self.inner.close_requested.store(true, Ordering::SeqCst);
        let _ = self.inner.submit_tx.send(Submission::Close).await;

        let engine = self
            .inner
            .engine_task
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some(task) = engine {
            let _ = task.await;
        }
        let dispatcher = self
            .inner
            .dispatcher_task
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some(task) = dispatcher {
            let _ = task.await;
        }
    }

    async fn submit(
        &self,
        op: OpCode,
        client_path: Option<String>,
        body: Vec<u8>,
        watch: Option<WatchRegistration>,
    ) -> Result<Vec<u8>> {
        match self.inner.state.load() {
            SessionState::Closed => return Err(RookeryError::SessionExpired),
            SessionState::AuthFailed => return Err(RookeryError::AuthFailed),
            // Fail fast rather than queue into a session that is not even
            // trying to connect yet.
            SessionState::NotConnected => return Err(RookeryError::ConnectionLoss),
            SessionState::Connecting | SessionState::Associating | SessionState::Connected => {}
        }

        let (tx, rx) = oneshot::channel();
        let submission = Submission::Request(RequestSubmission {
            op,
            client_path,
            body,
            watch,
            tx,
        });
        self.inner
            .submit_tx
            .send(submission)
            .await
            .map_err(|_| self.terminal_error())?;

        match rx.await {
            Ok(result) => result,
            // The engine dropped the completion handle without answering;
            // it can only be shutting down.
            Err(_) => Err(self.terminal_error()),
        }
    }

    fn terminal_error(&self) -> RookeryError {
        match self.inner.state.load() {
            SessionState::AuthFailed => RookeryError::AuthFailed,
            SessionState::Closed => RookeryError::SessionExpired,
            _ => RookeryError::ConnectionLoss,
        }
    }

    fn default_registration(&self, kind: WatchKind, path: &str) -> WatchRegistration {
        WatchRegistration::new(
            kind,
            path,
            Arc::new(DefaultWatcherProxy::new(self.inner.default_watcher.clone())),
        )
    }

    fn lock_session(&self) -> std::sync::MutexGuard<'_, Session> {
        self.inner
            .session
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
