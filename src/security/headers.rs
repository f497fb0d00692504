//! Security response headers for TLS deployments.
//!
//! # Responsibilities
//! - `Strict-Transport-Security` so browsers stay on HTTPS
//! - `alt-svc` advertising HTTP/3 on the UDP side of the listen port
//!
//! # Design Decisions
//! - Values are computed once at startup
//! - Advertised whenever TLS is configured, whether or not the QUIC
//!   listener actually came up
//! - A header the application already set is left alone

use axum::http::header::{InvalidHeaderValue, ALT_SVC, STRICT_TRANSPORT_SECURITY};
use axum::http::{HeaderMap, HeaderValue};

pub const HSTS_VALUE: &str = "max-age=31536000; includeSubDomains; preload";

/// How long clients may remember the alternative service, in seconds.
const ALT_SVC_MAX_AGE: u32 = 2_592_000;

/// Headers added to every response while TLS is configured.
#[derive(Debug, Clone)]
pub struct SecurityHeaders {
    headers: HeaderMap,
}

impl SecurityHeaders {
    /// Build the header set advertising HTTP/3 on `port`.
    pub fn for_port(port: u16) -> Result<Self, InvalidHeaderValue> {
        let alt_svc = HeaderValue::try_from(format!("h3=\":{port}\"; ma={ALT_SVC_MAX_AGE}"))?;

        let mut headers = HeaderMap::with_capacity(2);
        headers.insert(STRICT_TRANSPORT_SECURITY, HeaderValue::from_static(HSTS_VALUE));
        headers.insert(ALT_SVC, alt_svc);
        Ok(Self { headers })
    }

    /// Add every header the response does not already carry.
    pub fn apply(&self, target: &mut HeaderMap) {
        for (name, value) in &self.headers {
            if !target.contains_key(name) {
                target.insert(name.clone(), value.clone());
            }
        }
    }

    pub fn as_map(&self) -> &HeaderMap {
        &self.headers
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn advertises_listen_port() {
        let headers = SecurityHeaders::for_port(8443).unwrap();
        assert_eq!(
            headers.as_map()[ALT_SVC],
            "h3=\":8443\"; ma=2592000"
        );
        assert_eq!(headers.as_map()[STRICT_TRANSPORT_SECURITY], HSTS_VALUE);
        assert_eq!(headers.as_map().len(), 2);
    }

    #[test]
    fn handler_values_win() {
        let headers = SecurityHeaders::for_port(443).unwrap();
        let mut response = HeaderMap::new();
        response.insert(STRICT_TRANSPORT_SECURITY, HeaderValue::from_static("max-age=60"));

        headers.apply(&mut response);

        assert_eq!(response[STRICT_TRANSPORT_SECURITY], "max-age=60");
        assert_eq!(response[ALT_SVC], "h3=\":443\"; ma=2592000");
    }

    #[test]
    fn every_port_yields_a_valid_advertisement() {
        for port in [1, 80, 8080, u16::MAX] {
            let headers = SecurityHeaders::for_port(port).unwrap();
            assert_eq!(
                headers.as_map()[ALT_SVC].to_str().unwrap(),
                format!("h3=\":{port}\"; ma=2592000")
            );
        }
    }
}
