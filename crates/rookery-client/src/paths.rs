//! Path validation and chroot rewriting.
//!
//! The server only ever sees absolute paths with the chroot prefix applied;
//! callers only ever see paths with the prefix stripped. Validation happens
//! before anything touches the wire.

use rookery_common::{Result, RookeryError};

/// Validates a client-supplied node path.
///
/// Rules: non-empty, starts with `/`, no trailing `/` (except the root
/// itself), no empty segments, no `.` or `..` segments, no NUL bytes.
pub fn validate_path(path: &str) -> Result<()> {
    if path.is_empty() {
        return Err(RookeryError::BadPath("path must not be empty".into()));
    }
    if !path.starts_with('/') {
        return Err(RookeryError::BadPath(format!(
            "path {path:?} must start with '/'"
        )));
    }
    if path == "/" {
        return Ok(());
    }
    if path.ends_with('/') {
        return Err(RookeryError::BadPath(format!(
            "path {path:?} must not end with '/'"
        )));
    }
    if path.contains('\0') {
        return Err(RookeryError::BadPath(format!(
            "path {path:?} must not contain NUL"
        )));
    }
    for segment in path[1..].split('/') {
        if segment.is_empty() {
            return Err(RookeryError::BadPath(format!(
                "path {path:?} contains an empty segment"
            )));
        }
        if segment == "." || segment == ".." {
            return Err(RookeryError::BadPath(format!(
                "path {path:?} contains a relative segment"
            )));
        }
    }
    Ok(())
}

/// The optional path prefix parsed out of the connect string.
///
/// Prepending and stripping are inverses for every valid client path, so
/// neither side of the connection ever observes the other side's notion of
/// a path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chroot {
    prefix: Option<String>,
}

impl Chroot {
    /// Builds a chroot from the suffix of a connect string.
    ///
    /// `None` means no rewriting. A present prefix must itself be a valid
    /// path and must not be the bare root (which would be a no-op spelled
    /// confusingly).
    pub fn new(prefix: Option<String>) -> Result<Self> {
        if let Some(ref p) = prefix {
            validate_path(p)
                .map_err(|_| RookeryError::BadConnectString(format!("invalid chroot {p:?}")))?;
            if p == "/" {
                return Ok(Chroot { prefix: None });
            }
        }
        Ok(Chroot { prefix })
    }

    /// No rewriting.
    pub fn none() -> Self {
        Chroot { prefix: None }
    }

    pub fn is_some(&self) -> bool {
        self.prefix.is_some()
    }

    /// Rewrites a client path into the server's namespace.
    pub fn to_server(&self, client_path: &str) -> String {
        match &self.prefix {
            None => client_path.to_string(),
            Some(prefix) if client_path == "/" => prefix.clone(),
            Some(prefix) => format!("{prefix}{client_path}"),
        }
    }

    /// Rewrites a server path back into the client's namespace.
    ///
    /// Paths outside the chroot are returned unchanged; the server should
    /// never produce them, but a notification must not panic the dispatcher.
    pub fn to_client(&self, server_path: &str) -> String {
        match &self.prefix {
            None => server_path.to_string(),
            Some(prefix) => {
                if server_path == prefix.as_str() {
                    "/".to_string()
                } else if let Some(rest) = server_path.strip_prefix(prefix.as_str()) {
                    if rest.starts_with('/') {
                        rest.to_string()
                    } else {
                        server_path.to_string()
                    }
                } else {
                    server_path.to_string()
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_paths() {
        for path in ["/", "/a", "/a/b", "/deeply/nested/node-1.2_3"] {
            assert!(validate_path(path).is_ok(), "expected {path:?} to be valid");
        }
    }

    #[test]
    fn test_invalid_paths() {
        for path in ["", "relative", "/a/", "/a//b", "/a/./b", "/a/../b", "/a\0b"] {
            assert!(
                validate_path(path).is_err(),
                "expected {path:?} to be invalid"
            );
        }
    }

    #[test]
    fn test_chroot_round_trip() {
        let chroot = Chroot::new(Some("/app/env".to_string())).unwrap();
        for path in ["/", "/a", "/a/b"] {
            let server = chroot.to_server(path);
            assert!(server.starts_with("/app/env"));
            assert_eq!(chroot.to_client(&server), path);
        }
    }

    #[test]
    fn test_chroot_none_passthrough() {
        let chroot = Chroot::none();
        assert_eq!(chroot.to_server("/a"), "/a");
        assert_eq!(chroot.to_client("/a"), "/a");
    }

    #[test]
    fn test_root_chroot_collapses_to_none() {
        let chroot = Chroot::new(Some("/".to_string())).unwrap();
        assert!(!chroot.is_some());
    }

    #[test]
    fn test_invalid_chroot_rejected() {
        assert!(Chroot::new(Some("app".to_string())).is_err());
        assert!(Chroot::new(Some("/app/".to_string())).is_err());
    }

    #[test]
    fn test_foreign_server_path_left_alone() {
        let chroot = Chroot::new(Some("/app".to_string())).unwrap();
        assert_eq!(chroot.to_client("/elsewhere/x"), "/elsewhere/x");
        // Prefix match must respect segment boundaries.
        assert_eq!(chroot.to_client("/apple/x"), "/apple/x");
    }
}
