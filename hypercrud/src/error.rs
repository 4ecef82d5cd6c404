//! Error types for paging, navigation and editing
//!
//! Errors fall into three groups:
//!
//! 1. **Precondition violations** ([`CrudError::NoPageLoaded`],
//!    [`CrudError::NavigationUnavailable`]) raised when a caller navigates
//!    before anything is loaded, or follows a link the current page does not
//!    offer. These are never retried.
//! 2. **Upstream failures** ([`CrudError::Upstream`]) coming from the page
//!    source. They are passed through untouched.
//! 3. Lifecycle failures of the service itself (cancelled loads, schema wait
//!    timeouts, configuration).
//!
//! A missing capability (add/update/delete not offered) is *not* an error and
//! never produces a `CrudError`.
//!
//! # Example
//!
//! ```rust
//! use hypercrud::error::{CrudError, NavLink};
//!
//! let err = CrudError::NavigationUnavailable { link: NavLink::Next };
//! assert!(err.is_precondition());
//! assert_eq!(err.to_string(), "navigation link unavailable: next");
//! ```

use std::fmt;
use std::sync::Arc;

use thiserror::Error;

/// Result type alias using [`CrudError`]
pub type Result<T> = std::result::Result<T, CrudError>;

/// Navigation link offered by a hypermedia collection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NavLink {
    /// Jump to the first page
    First,
    /// Step back one page
    Previous,
    /// Step forward one page
    Next,
    /// Jump to the last page
    Last,
    /// Reload the current page
    Refresh,
}

impl fmt::Display for NavLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::First => write!(f, "first"),
            Self::Previous => write!(f, "previous"),
            Self::Next => write!(f, "next"),
            Self::Last => write!(f, "last"),
            Self::Refresh => write!(f, "refresh"),
        }
    }
}

/// Main error type
#[derive(Error, Debug, Clone)]
pub enum CrudError {
    /// A navigation call was made before the first page finished loading
    #[error("no page loaded yet: cannot {operation}")]
    NoPageLoaded {
        /// Operation that was attempted
        operation: NavLink,
    },

    /// The current page does not offer the requested link
    #[error("navigation link unavailable: {link}")]
    NavigationUnavailable {
        /// Link that was requested
        link: NavLink,
    },

    /// The page source does not permit listing at all
    #[error("listing is not permitted by this page source")]
    ListingNotPermitted,

    /// No item matched an id taken from a deep link
    #[error("item not found: {id}")]
    ItemNotFound {
        /// Id that was looked up
        id: String,
    },

    /// Failure reported by the page source or the transport behind it
    #[error("upstream error: {0}")]
    Upstream(Arc<dyn std::error::Error + Send + Sync>),

    /// The load was dropped before it produced a result
    #[error("page load was cancelled before completing")]
    LoadCancelled,

    /// A schema query gave up waiting for the first successful load
    #[error("timed out after {waited_ms}ms waiting for the initial page load")]
    InitialLoadTimeout {
        /// Time spent waiting in milliseconds
        waited_ms: u64,
    },

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(Arc<figment::Error>),
}

impl CrudError {
    /// Wrap an arbitrary page-source failure
    pub fn upstream<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Upstream(Arc::new(err))
    }

    /// Whether this error is a caller precondition violation
    #[must_use]
    pub fn is_precondition(&self) -> bool {
        matches!(
            self,
            Self::NoPageLoaded { .. } | Self::NavigationUnavailable { .. }
        )
    }

    /// Whether this error originated in the page source
    #[must_use]
    pub fn is_upstream(&self) -> bool {
        matches!(self, Self::Upstream(_))
    }
}

impl From<figment::Error> for CrudError {
    fn from(err: figment::Error) -> Self {
        CrudError::Config(Arc::new(err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Error)]
    #[error("connection reset")]
    struct Reset;

    #[test]
    fn test_nav_link_display() {
        assert_eq!(NavLink::First.to_string(), "first");
        assert_eq!(NavLink::Previous.to_string(), "previous");
        assert_eq!(NavLink::Next.to_string(), "next");
        assert_eq!(NavLink::Last.to_string(), "last");
        assert_eq!(NavLink::Refresh.to_string(), "refresh");
    }

    #[test]
    fn test_precondition_classification() {
        assert!(CrudError::NoPageLoaded {
            operation: NavLink::Next
        }
        .is_precondition());
        assert!(CrudError::NavigationUnavailable {
            link: NavLink::Last
        }
        .is_precondition());
        assert!(!CrudError::LoadCancelled.is_precondition());
    }

    #[test]
    fn test_upstream_keeps_message() {
        let err = CrudError::upstream(Reset);
        assert!(err.is_upstream());
        assert_eq!(err.to_string(), "upstream error: connection reset");

        let cloned = err.clone();
        assert_eq!(cloned.to_string(), err.to_string());
    }

    #[test]
    fn test_no_page_loaded_message() {
        let err = CrudError::NoPageLoaded {
            operation: NavLink::Refresh,
        };
        assert_eq!(err.to_string(), "no page loaded yet: cannot refresh");
    }
}
