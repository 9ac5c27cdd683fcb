//! Channel-scoped filtering for IPTV feeds.
//!
//! Both engines are pure: they take the raw upstream payload and return the
//! reduced document for a single channel.

pub mod error;
pub mod guide;
pub mod playlist;

pub use error::GuideError;

/// The channel identity that filtered feeds are scoped to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelTarget {
    /// Value forced into `tvg-id` and matched against guide `id`/`channel` attributes.
    pub id: String,
    /// Value forced into `tvg-name` and used as the synthesized guide display name.
    pub name: String,
}

impl ChannelTarget {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}
