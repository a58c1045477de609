//! Change discovery
//!
//! Cursor-driven polling of the origin store's instance listing.

mod backoff;
mod cursor;
mod feed;

pub use backoff::{BackoffHandle, BackoffSchedule};
pub use cursor::{Cursor, SortOrder};
pub use feed::{ChangeCursorStreamer, StreamMode};

/// Which slice of the listing to traverse
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamScope {
    pub org: String,
    pub app_id: Option<String>,
    pub party_id: Option<String>,
}

impl StreamScope {
    pub fn organization(org: impl Into<String>) -> Self {
        Self {
            org: org.into(),
            app_id: None,
            party_id: None,
        }
    }

    pub fn with_app(mut self, app_id: Option<String>) -> Self {
        self.app_id = app_id;
        self
    }

    pub fn with_party(mut self, party_id: Option<String>) -> Self {
        self.party_id = party_id;
        self
    }
}
