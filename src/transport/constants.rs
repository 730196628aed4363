//! Constants for the transport layer (timeouts, channel sizing).

/// Default HTTP connect timeout (30 seconds).
pub const CONNECT_TIMEOUT_SECS: u64 = 30;

/// Default HTTP read timeout (5 minutes for large downloads).
pub const READ_TIMEOUT_SECS: u64 = 300;

/// Upper bound accepted for either timeout (1 hour).
pub const MAX_TIMEOUT_SECS: u64 = 3600;

/// Number of transport events buffered between a transport task and its engine.
pub const EVENT_CHANNEL_CAPACITY: usize = 32;
