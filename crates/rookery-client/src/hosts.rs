//! Host list management.
//!
//! Parses the connect string, shuffles the server list once at construction
//! so a fleet of clients does not stampede the same server, and cycles
//! through the endpoints. After a full pass without a successful session
//! the caller is told to back off for a bounded random interval before the
//! next attempt.

use std::time::Duration;

use rand::seq::SliceRandom;
use rand::Rng;

use rookery_common::{Result, RookeryError};

/// Splits a connect string into its endpoint list and optional chroot
/// suffix.
///
/// Format: `host1:port1,host2:port2,.../chroot/path`. The chroot starts at
/// the first `/` and applies to the whole string, not one endpoint.
pub fn parse_connect_string(connect: &str) -> Result<(Vec<String>, Option<String>)> {
    let connect = connect.trim();
    if connect.is_empty() {
        return Err(RookeryError::BadConnectString(
            "connect string must not be empty".into(),
        ));
    }

    let (hosts_part, chroot) = match connect.find('/') {
        Some(idx) => (&connect[..idx], Some(connect[idx..].to_string())),
        None => (connect, None),
    };

    let mut hosts = Vec::new();
    for entry in hosts_part.split(',') {
        let entry = entry.trim();
        if entry.is_empty() {
            return Err(RookeryError::BadConnectString(format!(
                "empty endpoint in {connect:?}"
            )));
        }
        let (host, port) = entry.rsplit_once(':').ok_or_else(|| {
            RookeryError::BadConnectString(format!("endpoint {entry:?} is missing a port"))
        })?;
        if host.is_empty() {
            return Err(RookeryError::BadConnectString(format!(
                "endpoint {entry:?} is missing a host"
            )));
        }
        port.parse::<u16>().map_err(|_| {
            RookeryError::BadConnectString(format!("endpoint {entry:?} has an invalid port"))
        })?;
        hosts.push(entry.to_string());
    }

    Ok((hosts, chroot))
}

/// A shuffled, cycling view of the configured endpoints.
pub struct HostList {
    hosts: Vec<String>,
    next: usize,
    attempts_since_success: usize,
    backoff_max: Duration,
}

impl HostList {
    /// Builds a host list, shuffling the endpoints once.
    pub fn new(mut hosts: Vec<String>, backoff_max: Duration) -> Result<Self> {
        if hosts.is_empty() {
            return Err(RookeryError::BadConnectString(
                "connect string contains no endpoints".into(),
            ));
        }
        hosts.shuffle(&mut rand::thread_rng());
        Ok(HostList {
            hosts,
            next: 0,
            attempts_since_success: 0,
            backoff_max,
        })
    }

    pub fn len(&self) -> usize {
        self.hosts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hosts.is_empty()
    }

    /// Yields the next endpoint in the cycle.
    pub fn next_server(&mut self) -> String {
        let host = self.hosts[self.next].clone();
        self.next = (self.next + 1) % self.hosts.len();
        self.attempts_since_success += 1;
        host
    }

    /// Records a successful session establishment, resetting the backoff.
    pub fn record_success(&mut self) {
        self.attempts_since_success = 0;
    }

    /// Returns how long to sleep before the next attempt.
    ///
    /// `None` until a whole pass over the list has failed; after that, a
    /// random interval in `0..=backoff_max` per attempt.
    pub fn backoff(&self) -> Option<Duration> {
        if self.attempts_since_success < self.hosts.len() {
            return None;
        }
        if self.backoff_max.is_zero() {
            return Some(Duration::ZERO);
        }
        let max_ms = self.backoff_max.as_millis() as u64;
        Some(Duration::from_millis(
            rand::thread_rng().gen_range(0..=max_ms),
        ))
    }
}
