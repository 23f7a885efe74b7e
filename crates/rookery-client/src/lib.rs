//! Rookery Client
//!
//! This crate provides the session engine and the user-facing client for
//! the rookery coordination service.
//!
//! # Overview
//!
//! A [`Rookery`] handle fronts a server-assigned logical *session* that
//! outlives individual TCP connections. Behind the handle, a single engine
//! task owns the socket: it establishes and re-establishes connections
//! across endpoint failures, multiplexes concurrent requests over one
//! stream in strict submission order, drives heartbeats, and feeds watch
//! notifications to a serial event dispatcher.
//!
//! # Key Properties
//!
//! - **Session continuity**: on connection loss the engine reconnects to
//!   the next endpoint and resumes the same session; callers only observe
//!   an error for requests that were in flight when the socket died
//! - **Total order**: requests complete in the order they were submitted;
//!   replies are matched FIFO against the outbound queue
//! - **One-shot watches**: a watch fires at most once, and handlers run
//!   serially in server order on a dedicated dispatcher task
//! - **Terminal states**: session expiry and authentication failure end the
//!   client; a fresh client must be constructed afterwards
//!
//! # Usage
//!
//! ```rust,no_run
//! use rookery_client::{ClientConfig, ConnectOptions, CreateMode, Rookery, WatchedEvent};
//! use rookery_common::protocol::records::Acl;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let watcher = Arc::new(|event: WatchedEvent| {
//!         println!("event: {event:?}");
//!     });
//!     let client = Rookery::connect_with(
//!         "srv1:2181,srv2:2181,srv3:2181/app",
//!         ClientConfig::default(),
//!         ConnectOptions::new().with_default_watcher(watcher),
//!     )
//!     .await?;
//!
//!     client
//!         .create("/workers", Vec::new(), Acl::open_unsafe(), CreateMode::Persistent)
//!         .await?;
//!     let children = client.get_children("/workers", true).await?;
//!     println!("workers: {children:?}");
//!
//!     client.close().await;
//!     Ok(())
//! }
//! ```
//!
//! # Blocking Form
//!
//! [`blocking::Client`] derives a synchronous API from the async one by
//! owning a small runtime; see the module docs for the rules.

pub mod blocking;

mod client;
mod config;
mod dispatcher;
mod hosts;
mod paths;
mod pending;
mod sasl;
mod session;
mod watch;

pub use client::{ConnectOptions, CreateMode, Rookery};
pub use config::ClientConfig;
pub use paths::validate_path;
pub use sasl::SaslClient;
pub use session::SessionState;
pub use watch::{EventType, KeeperState, WatchedEvent, Watcher};

pub use rookery_common::{ErrorCode, Result, RookeryError};
