//! Blocking façade.
//!
//! A thin synchronous wrapper deriving every operation from the async form:
//! the wrapper owns a small runtime and blocks on the async client. The
//! session engine keeps running on the runtime's worker threads between
//! calls, so heartbeats and reconnects behave exactly as they do for the
//! async client.
//!
//! Must not be used from inside an async context; blocking a runtime
//! thread on another runtime panics by design.

use std::sync::Arc;
use std::time::Duration;

use rookery_common::protocol::records::{Acl, Stat};
use rookery_common::Result;

use crate::client::{ConnectOptions, CreateMode, Rookery};
use crate::config::ClientConfig;
use crate::session::SessionState;
use crate::watch::Watcher;

/// Synchronous client handle.
///
/// # Example
///
/// ```rust,no_run
/// use rookery_client::blocking::Client;
/// use rookery_client::CreateMode;
/// use rookery_common::protocol::records::Acl;
///
/// fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let client = Client::connect("127.0.0.1:2181")?;
///     client.create("/job", b"payload".to_vec(), Acl::open_unsafe(), CreateMode::Ephemeral)?;
///     client.close();
///     Ok(())
/// }
/// ```
pub struct Client {
    runtime: tokio::runtime::Runtime,
    client: Rookery,
}

impl Client {
    /// Connects with the default configuration.
    pub fn connect(connect_string: &str) -> Result<Client> {
        Self::connect_with(connect_string, ClientConfig::default(), ConnectOptions::new())
    }

    /// Connects with the full set of options; see
    /// [`Rookery::connect_with`].
    pub fn connect_with(
        connect_string: &str,
        config: ClientConfig,
        options: ConnectOptions,
    ) -> Result<Client> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .enable_all()
            .build()?;
        let client = runtime.block_on(Rookery::connect_with(connect_string, config, options))?;
        Ok(Client { runtime, client })
    }

    pub fn create(
        &self,
        path: &str,
        data: Vec<u8>,
        acl: Vec<Acl>,
        mode: CreateMode,
    ) -> Result<String> {
        self.runtime.block_on(self.client.create(path, data, acl, mode))
    }

    pub fn delete(&self, path: &str, version: i32) -> Result<()> {
        self.runtime.block_on(self.client.delete(path, version))
    }

    pub fn exists(&self, path: &str, watch: bool) -> Result<Option<Stat>> {
        self.runtime.block_on(self.client.exists(path, watch))
    }

    pub fn exists_w(&self, path: &str, watcher: Arc<dyn Watcher>) -> Result<Option<Stat>> {
        self.runtime.block_on(self.client.exists_w(path, watcher))
    }

    pub fn get_data(&self, path: &str, watch: bool) -> Result<(Vec<u8>, Stat)> {
        self.runtime.block_on(self.client.get_data(path, watch))
    }

    pub fn get_data_w(&self, path: &str, watcher: Arc<dyn Watcher>) -> Result<(Vec<u8>, Stat)> {
        self.runtime.block_on(self.client.get_data_w(path, watcher))
    }

    pub fn set_data(&self, path: &str, data: Vec<u8>, version: i32) -> Result<Stat> {
        self.runtime.block_on(self.client.set_data(path, data, version))
    }

    pub fn get_acl(&self, path: &str) -> Result<(Vec<Acl>, Stat)> {
        self.runtime.block_on(self.client.get_acl(path))
    }

    pub fn set_acl(&self, path: &str, acl: Vec<Acl>, version: i32) -> Result<Stat> {
        self.runtime.block_on(self.client.set_acl(path, acl, version))
    }

    pub fn get_children(&self, path: &str, watch: bool) -> Result<Vec<String>> {
        self.runtime.block_on(self.client.get_children(path, watch))
    }

    pub fn get_children_w(&self, path: &str, watcher: Arc<dyn Watcher>) -> Result<Vec<String>> {
        self.runtime.block_on(self.client.get_children_w(path, watcher))
    }

    pub fn sync(&self, path: &str) -> Result<String> {
        self.runtime.block_on(self.client.sync(path))
    }

    pub fn add_auth(&self, scheme: &str, auth: Vec<u8>) -> Result<()> {
        self.runtime.block_on(self.client.add_auth(scheme, auth))
    }

    pub fn state(&self) -> SessionState {
        self.client.state()
    }

    pub fn session_id(&self) -> i64 {
        self.client.session_id()
    }

    pub fn negotiated_timeout(&self) -> Duration {
        self.client.negotiated_timeout()
    }

    pub fn set_default_watcher(&self, watcher: Option<Arc<dyn Watcher>>) {
        self.client.set_default_watcher(watcher)
    }

    /// Closes the session and waits for the engine to finish.
    pub fn close(self) {
        self.runtime.block_on(self.client.close());
    }
}
