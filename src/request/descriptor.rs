//! Declarative description of a single HTTP call.

use std::collections::HashMap;
use std::fmt;

use bytes::Bytes;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde::Serialize;
use url::Url;

use super::RequestError;
use crate::transport::TransportRequest;

/// HTTP methods supported by request descriptors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum HttpMethod {
    /// `GET`
    #[default]
    Get,
    /// `POST`
    Post,
    /// `PUT`
    Put,
    /// `DELETE`
    Delete,
}

impl HttpMethod {
    /// Canonical upper-case method name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Delete => "DELETE",
        }
    }

    /// Whether a request body is sent for this method.
    #[must_use]
    pub fn carries_body(self) -> bool {
        matches!(self, Self::Post | Self::Put)
    }

    /// Converts to the reqwest method type.
    #[must_use]
    pub fn to_reqwest(self) -> reqwest::Method {
        match self {
            Self::Get => reqwest::Method::GET,
            Self::Post => reqwest::Method::POST,
            Self::Put => reqwest::Method::PUT,
            Self::Delete => reqwest::Method::DELETE,
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for HttpMethod {
    type Err = RequestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "GET" => Ok(Self::Get),
            "POST" => Ok(Self::Post),
            "PUT" => Ok(Self::Put),
            "DELETE" => Ok(Self::Delete),
            other => Err(RequestError::configuration(format!(
                "unsupported HTTP method `{other}`"
            ))),
        }
    }
}

/// Target, method, headers and body of one call.
///
/// A descriptor is plain data: nothing is validated until the request is
/// started, at which point the engine takes its own validated copy. Changing
/// the caller's descriptor afterwards has no effect on the running call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestDescriptor {
    url: String,
    method: HttpMethod,
    headers: HashMap<String, String>,
    body: Option<Bytes>,
}

impl RequestDescriptor {
    /// Creates a `GET` descriptor for `url`.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    /// Creates a `GET` descriptor.
    pub fn get(url: impl Into<String>) -> Self {
        Self::new(url)
    }

    /// Creates a `POST` descriptor with a body.
    pub fn post(url: impl Into<String>, body: impl Into<Bytes>) -> Self {
        Self::new(url).with_method(HttpMethod::Post).with_body(body)
    }

    /// Creates a `PUT` descriptor with a body.
    pub fn put(url: impl Into<String>, body: impl Into<Bytes>) -> Self {
        Self::new(url).with_method(HttpMethod::Put).with_body(body)
    }

    /// Creates a `DELETE` descriptor.
    pub fn delete(url: impl Into<String>) -> Self {
        Self::new(url).with_method(HttpMethod::Delete)
    }

    /// Sets the HTTP method.
    #[must_use]
    pub fn with_method(mut self, method: HttpMethod) -> Self {
        self.method = method;
        self
    }

    /// Adds or replaces one header.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Adds or replaces several headers.
    #[must_use]
    pub fn with_headers<I, K, V>(mut self, headers: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.headers
            .extend(headers.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    /// Sets the raw body.
    #[must_use]
    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Serializes `value` as the JSON body and sets `Content-Type`.
    ///
    /// # Errors
    ///
    /// Returns [`RequestError::Configuration`] if `value` cannot be serialized.
    pub fn with_json_body<S: Serialize + ?Sized>(self, value: &S) -> Result<Self, RequestError> {
        let body = serde_json::to_vec(value).map_err(|e| {
            RequestError::configuration(format!("request body is not serializable: {e}"))
        })?;
        Ok(self
            .with_header("content-type", "application/json")
            .with_body(body))
    }

    /// Target URL as supplied.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// HTTP method.
    #[must_use]
    pub fn method(&self) -> HttpMethod {
        self.method
    }

    /// Header map as supplied.
    #[must_use]
    pub fn headers(&self) -> &HashMap<String, String> {
        &self.headers
    }

    /// Body, if any.
    #[must_use]
    pub fn body(&self) -> Option<&Bytes> {
        self.body.as_ref()
    }

    /// Validates the descriptor and converts it into a transport request.
    ///
    /// The body is dropped for methods that do not carry one.
    ///
    /// # Errors
    ///
    /// Returns [`RequestError::Configuration`] if the URL is missing, not
    /// absolute, or a header name/value is not valid HTTP.
    pub fn validate(&self) -> Result<TransportRequest, RequestError> {
        if self.url.trim().is_empty() {
            return Err(RequestError::configuration("request URL is required"));
        }
        let url = Url::parse(self.url.trim()).map_err(|e| {
            RequestError::configuration(format!("invalid URL `{}`: {e}", self.url))
        })?;
        if url.cannot_be_a_base() || url.host_str().is_none() {
            return Err(RequestError::configuration(format!(
                "URL `{}` is not an absolute network address",
                self.url
            )));
        }

        let mut headers = HeaderMap::with_capacity(self.headers.len());
        for (name, value) in &self.headers {
            let header_name = HeaderName::from_bytes(name.as_bytes()).map_err(|_| {
                RequestError::configuration(format!("invalid header name `{name}`"))
            })?;
            let header_value = HeaderValue::from_str(value).map_err(|_| {
                RequestError::configuration(format!("invalid value for header `{name}`"))
            })?;
            headers.insert(header_name, header_value);
        }

        let body = if self.method.carries_body() {
            self.body.clone()
        } else {
            None
        };

        Ok(TransportRequest {
            method: self.method,
            url,
            headers,
            body,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_method_parse_is_case_insensitive() {
        assert_eq!("get".parse::<HttpMethod>().unwrap(), HttpMethod::Get);
        assert_eq!("Delete".parse::<HttpMethod>().unwrap(), HttpMethod::Delete);
        assert!("PATCH".parse::<HttpMethod>().is_err());
    }

    #[test]
    fn test_validate_builds_transport_request() {
        let descriptor = RequestDescriptor::post("https://api.example.com/items", "payload")
            .with_header("X-Trace", "abc");
        let request = descriptor.validate().unwrap();
        assert_eq!(request.method, HttpMethod::Post);
        assert_eq!(request.url.as_str(), "https://api.example.com/items");
        assert_eq!(request.headers.get("x-trace").unwrap(), "abc");
        assert_eq!(request.body.unwrap(), Bytes::from_static(b"payload"));
    }

    #[test]
    fn test_validate_missing_url_is_configuration_error() {
        let err = RequestDescriptor::new("  ").validate().unwrap_err();
        assert!(matches!(err, RequestError::Configuration { .. }));
        assert!(err.to_string().contains("URL is required"));
    }

    #[test]
    fn test_validate_relative_url_is_configuration_error() {
        let err = RequestDescriptor::new("/users/1").validate().unwrap_err();
        assert!(matches!(err, RequestError::Configuration { .. }));
    }

    #[test]
    fn test_validate_rejects_non_network_url() {
        let err = RequestDescriptor::new("mailto:someone@example.com")
            .validate()
            .unwrap_err();
        assert!(err.to_string().contains("absolute network address"));
    }

    #[test]
    fn test_validate_rejects_bad_header() {
        let err = RequestDescriptor::new("https://api.example.com")
            .with_header("bad header", "x")
            .validate()
            .unwrap_err();
        assert!(err.to_string().contains("invalid header name"));
    }

    #[test]
    fn test_validate_drops_body_for_get() {
        let request = RequestDescriptor::get("https://api.example.com")
            .with_body("ignored")
            .validate()
            .unwrap();
        assert!(request.body.is_none());
    }

    #[test]
    fn test_with_json_body_sets_content_type() {
        let descriptor = RequestDescriptor::new("https://api.example.com")
            .with_method(HttpMethod::Put)
            .with_json_body(&serde_json::json!({"a": 1}))
            .unwrap();
        assert_eq!(
            descriptor.headers().get("content-type").map(String::as_str),
            Some("application/json")
        );
        assert_eq!(descriptor.body().unwrap(), &Bytes::from_static(b"{\"a\":1}"));
    }
}
