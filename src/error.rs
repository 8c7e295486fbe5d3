//! Error taxonomy for the harvesting pipeline
//!
//! Each type maps to one failure class and the level that absorbs it:
//! session start, reconciliation and landing-page failures end a cycle,
//! navigation and persistence failures end a page (or a category on page 1),
//! parse failures are reserved for structurally broken input.

use std::time::Duration;

/// The rendering session could not be launched or connected
#[derive(Debug, thiserror::Error)]
#[error("failed to start browser session: {reason}")]
pub struct FetchInitError {
    pub reason: String,
}

/// A single page could not be loaded
#[derive(Debug, thiserror::Error)]
pub enum NavigationError {
    #[error("navigation to {url} timed out after {timeout:?}")]
    Timeout { url: String, timeout: Duration },

    #[error("navigation to {url} was cancelled")]
    Cancelled { url: String },

    #[error("browser error while loading {url}: {reason}")]
    Browser { url: String, reason: String },

    #[error("request to {url} failed")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{url} returned status {status}")]
    Status { url: String, status: u16 },

    #[error("browser session is not started")]
    NotStarted,
}

impl NavigationError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }
}

/// Markup could not be interpreted
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("product count {text:?} is not a number")]
    InvalidCount {
        text: String,
        #[source]
        error: std::num::ParseIntError,
    },
}

/// Storage-level failure reported by a store implementation
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error")]
    Database(#[from] sqlx::Error),

    #[error("migration failed")]
    Migrate(#[from] sqlx::migrate::MigrateError),
}

/// Category upsert or read-back failed
#[derive(Debug, thiserror::Error)]
pub enum ReconcileError {
    #[error("failed to upsert {count} categories")]
    Upsert {
        count: usize,
        #[source]
        source: StoreError,
    },

    #[error("failed to read back persisted categories")]
    ReadBack {
        #[source]
        source: StoreError,
    },
}

/// Product upsert for one page failed
#[derive(Debug, thiserror::Error)]
#[error("failed to persist {count} products")]
pub struct PersistenceError {
    pub count: usize,
    #[source]
    pub source: StoreError,
}

/// Failure of a single listing page after the first
#[derive(Debug, thiserror::Error)]
pub enum PageError {
    #[error(transparent)]
    Navigation(#[from] NavigationError),

    #[error(transparent)]
    Persistence(#[from] PersistenceError),
}

/// Failures that abort a whole scrape cycle
#[derive(Debug, thiserror::Error)]
pub enum CycleError {
    #[error(transparent)]
    FetchInit(#[from] FetchInitError),

    #[error("failed to fetch landing page")]
    LandingPage(#[source] NavigationError),

    #[error(transparent)]
    Reconcile(#[from] ReconcileError),
}

/// Renders an error followed by its chain of sources, `outer: inner: root`.
pub fn report(error: &(dyn std::error::Error + 'static)) -> String {
    let mut message = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}
