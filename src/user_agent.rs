//! Default User-Agent string for outgoing requests.

/// Product token sent when no User-Agent is configured.
const PRODUCT: &str = "connection-request";

/// Default User-Agent for requests sent by the built-in transport.
#[must_use]
pub(crate) fn default_user_agent() -> String {
    let version = env!("CARGO_PKG_VERSION");
    format!("{PRODUCT}/{version}")
}
