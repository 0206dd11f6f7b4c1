//! Path matching for registered request handlers.
//!
//! A [`Route`] pairs a registration path with a [`MatchMode`]. Incoming
//! request paths arrive URL-decoded with leading slashes removed, and may
//! still carry their query string.
//!
//! # Matching
//!
//! - **Prefix**: both paths are split on `/`, `\` and `?`. Every segment of
//!   the registration must equal the corresponding request segment
//!   (ASCII case-insensitive), and the request needs at least as many
//!   segments as the registration.
//! - **Exact**: case-insensitive equality against the whole registration
//!   path.
//!
//! # Example
//!
//! ```
//! use vigate_common::route::{MatchMode, Route};
//!
//! let route = Route::new("a/b", MatchMode::Prefix);
//! assert!(route.matches("a/b?x=1"));
//! assert!(!route.matches("a/bc"));
//! ```

use serde::{Deserialize, Serialize};

const SEPARATORS: [char; 3] = ['/', '\\', '?'];

/// How a registration path is compared against request paths.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchMode {
    /// The whole request target must equal the registration path.
    Exact,
    /// Registration segments must lead the request path.
    #[default]
    Prefix,
}

/// A matchable registration path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    path: String,
    mode: MatchMode,
    segments: Vec<String>,
}

impl Route {
    /// Creates a route. Leading slashes are dropped so `/greet` and `greet`
    /// register the same path.
    pub fn new(path: impl AsRef<str>, mode: MatchMode) -> Self {
        let path = path.as_ref().trim_start_matches('/').to_string();
        let segments = path.split(SEPARATORS).map(str::to_string).collect();
        Self {
            path,
            mode,
            segments,
        }
    }

    /// Registration path without leading slashes.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// How [`Route::matches`] compares paths.
    pub fn mode(&self) -> MatchMode {
        self.mode
    }

    /// Returns true when `request_path` is served by this route.
    ///
    /// # Arguments
    ///
    /// * `request_path` - Decoded request target with leading slashes
    ///   removed, possibly including the query string
    pub fn matches(&self, request_path: &str) -> bool {
        match self.mode {
            MatchMode::Exact => self.path.eq_ignore_ascii_case(request_path),
            MatchMode::Prefix => {
                let mut incoming = request_path.split(SEPARATORS);
                self.segments.iter().all(|expected| {
                    incoming
                        .next()
                        .is_some_and(|segment| segment.eq_ignore_ascii_case(expected))
                })
            }
        }
    }
}
