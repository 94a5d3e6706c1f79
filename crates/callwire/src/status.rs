//! Request status as recorded in the state tree.

use std::fmt;

/// Lifecycle state of a submitted update.
///
/// `Replied`, `Rejected` and `Done` are terminal; every other status means
/// the call may still make progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestStatus {
    Pending,
    Received,
    Processing,
    Replied,
    Rejected,
    Done,
    Unknown,
}

impl RequestStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Received => "received",
            Self::Processing => "processing",
            Self::Replied => "replied",
            Self::Rejected => "rejected",
            Self::Done => "done",
            Self::Unknown => "unknown",
        }
    }

    /// Parse the raw `status` leaf. Unrecognized values map to `Unknown`.
    pub fn from_leaf(bytes: &[u8]) -> Self {
        match bytes {
            b"pending" => Self::Pending,
            b"received" => Self::Received,
            b"processing" => Self::Processing,
            b"replied" => Self::Replied,
            b"rejected" => Self::Rejected,
            b"done" => Self::Done,
            _ => Self::Unknown,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Replied | Self::Rejected | Self::Done)
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
