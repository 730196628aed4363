//! Identity, lifecycle state and progress reporting types.

use std::fmt;

use uuid::Uuid;

/// Unique identifier generated when a request starts.
///
/// Used as the registry key, for correlating progress events, and as the
/// file name of downloads without an explicit destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    /// Generates a fresh random identifier.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// The underlying UUID.
    #[must_use]
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Lifecycle state of a request.
///
/// `Idle → Active → {Completed | Cancelled | Failed}`; terminal states are final.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum RequestState {
    /// Created, not started.
    #[default]
    Idle,
    /// Started and waiting on the transport.
    Active,
    /// Finished with a result.
    Completed,
    /// Aborted by `cancel()`.
    Cancelled,
    /// Finished with an error.
    Failed,
}

impl RequestState {
    /// Returns true for `Completed`, `Cancelled` and `Failed`.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled | Self::Failed)
    }
}

impl fmt::Display for RequestState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Active => "active",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// A progress notification.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Progress {
    /// Request the event belongs to.
    pub id: ConnectionId,
    /// Body bytes received so far.
    pub bytes_received: u64,
    /// Declared body length; `None` for chunked or unknown lengths.
    pub bytes_expected: Option<u64>,
}

impl Progress {
    /// Completed fraction in `0.0..=1.0`, or `None` when the total is unknown.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn fraction(&self) -> Option<f64> {
        match self.bytes_expected {
            Some(expected) if expected > 0 => {
                Some((self.bytes_received as f64 / expected as f64).min(1.0))
            }
            _ => None,
        }
    }
}
