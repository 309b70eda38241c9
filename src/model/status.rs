//! Registry entry lifecycle.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Lifecycle state carried by webhooks, topics and functions.
///
/// `Deactivated -> Activated -> Suspended -> Deleted` is the intended order,
/// but any transition may be written. `Deleted` is the tombstone marker: a
/// document observed with it is removed from the view rather than stored.
///
/// Encoded on the wire as its ordinal (0..=3).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum Status {
    /// Starting state.
    #[default]
    Deactivated,
    /// The only active state.
    Activated,
    /// Paused between Activated and Deleted.
    Suspended,
    /// Terminal; signals removal.
    Deleted,
}

impl Status {
    /// Lenient name lookup. Unknown names fall back to `Deactivated`.
    pub fn from_name(name: &str) -> Self {
        match name.to_lowercase().as_str() {
            "activated" => Status::Activated,
            "suspended" => Status::Suspended,
            "deleted" => Status::Deleted,
            _ => Status::Deactivated,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Deactivated => "deactivated",
            Status::Activated => "activated",
            Status::Suspended => "suspended",
            Status::Deleted => "deleted",
        }
    }

    pub fn is_tombstone(&self) -> bool {
        matches!(self, Status::Deleted)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<Status> for u8 {
    fn from(status: Status) -> Self {
        match status {
            Status::Deactivated => 0,
            Status::Activated => 1,
            Status::Suspended => 2,
            Status::Deleted => 3,
        }
    }
}

impl TryFrom<u8> for Status {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Status::Deactivated),
            1 => Ok(Status::Activated),
            2 => Ok(Status::Suspended),
            3 => Ok(Status::Deleted),
            other => Err(format!("unknown status ordinal {}", other)),
        }
    }
}
