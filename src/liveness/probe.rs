//! Liveness Probe
//!
//! One reachability check of a URL under a hard timeout. A HEAD request is
//! tried first; when the server or transport rejects HEAD outright the check
//! is retried once with GET in a fresh timeout window. A timed-out HEAD is
//! never retried, so a hanging endpoint costs at most one timeout.

use std::error::Error as StdError;
use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::redirect::Policy;
use reqwest::{Client, Method, StatusCode, Url};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::error::{Error, Result};

/// Why a probe failed to obtain a response
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProbeErrorKind {
    /// No response within the timeout
    Timeout,
    /// Host name did not resolve
    Dns,
    /// TCP/TLS connection could not be established
    Connect,
    /// URL could not be parsed
    InvalidUrl,
    /// Any other transport or protocol failure
    Request,
}

impl fmt::Display for ProbeErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ProbeErrorKind::Timeout => "timeout",
            ProbeErrorKind::Dns => "dns",
            ProbeErrorKind::Connect => "connect",
            ProbeErrorKind::InvalidUrl => "invalid_url",
            ProbeErrorKind::Request => "request",
        };
        f.write_str(s)
    }
}

/// Result of one reachability check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeOutcome {
    /// A response with status in `[200, 400)` was received
    pub reachable: bool,
    pub status_code: Option<u16>,
    pub error: Option<ProbeErrorKind>,
}

impl ProbeOutcome {
    /// Outcome for a received response
    pub fn status(code: u16) -> Self {
        Self {
            reachable: (200..400).contains(&code),
            status_code: Some(code),
            error: None,
        }
    }

    /// Outcome for a request that got no response
    pub fn failed(kind: ProbeErrorKind) -> Self {
        Self {
            reachable: false,
            status_code: None,
            error: Some(kind),
        }
    }
}

/// A single reachability check. Implementations never fail: every problem is
/// folded into the returned [`ProbeOutcome`].
#[async_trait]
pub trait LivenessProbe: Send + Sync {
    async fn check(&self, url: &str, timeout: Duration) -> ProbeOutcome;
}

// =============================================================================
// HTTP Probe
// =============================================================================

/// Outcome of one HTTP attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Attempt {
    Responded(StatusCode),
    Failed(ProbeErrorKind),
}

/// Probe over HTTP(S) using HEAD with GET fallback
#[derive(Debug, Clone)]
pub struct HttpProbe {
    client: Client,
}

impl HttpProbe {
    /// Create a probe with its own connection pool. Targets are LAN services,
    /// so proxy settings from the environment are ignored.
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .redirect(Policy::limited(10))
            .no_proxy()
            .user_agent(concat!("homepulse/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(Error::HttpClient)?;
        Ok(Self { client })
    }

    async fn attempt(&self, method: Method, url: &Url, timeout: Duration) -> Attempt {
        let request = self
            .client
            .request(method, url.clone())
            .timeout(timeout)
            .send();

        match tokio::time::timeout(timeout, request).await {
            Err(_) => Attempt::Failed(ProbeErrorKind::Timeout),
            Ok(Ok(response)) => Attempt::Responded(response.status()),
            Ok(Err(e)) => Attempt::Failed(classify(&e)),
        }
    }
}

#[async_trait]
impl LivenessProbe for HttpProbe {
    #[instrument(skip(self))]
    async fn check(&self, url: &str, timeout: Duration) -> ProbeOutcome {
        let url = match Url::parse(url) {
            Ok(url) => url,
            Err(_) => return ProbeOutcome::failed(ProbeErrorKind::InvalidUrl),
        };

        let attempt = match self.attempt(Method::HEAD, &url, timeout).await {
            Attempt::Responded(status) if head_rejected(status) => {
                debug!("HEAD rejected with {}, retrying with GET", status);
                self.attempt(Method::GET, &url, timeout).await
            }
            Attempt::Failed(ProbeErrorKind::Request) => {
                debug!("HEAD failed at the protocol level, retrying with GET");
                self.attempt(Method::GET, &url, timeout).await
            }
            other => other,
        };

        match attempt {
            Attempt::Responded(status) => ProbeOutcome::status(status.as_u16()),
            Attempt::Failed(kind) => ProbeOutcome::failed(kind),
        }
    }
}

/// Statuses meaning "this server does not do HEAD"
fn head_rejected(status: StatusCode) -> bool {
    status == StatusCode::METHOD_NOT_ALLOWED || status == StatusCode::NOT_IMPLEMENTED
}

fn classify(e: &reqwest::Error) -> ProbeErrorKind {
    if e.is_timeout() {
        ProbeErrorKind::Timeout
    } else if e.is_builder() {
        ProbeErrorKind::InvalidUrl
    } else if e.is_connect() {
        if source_chain_mentions(e, "dns error") || source_chain_mentions(e, "failed to lookup") {
            ProbeErrorKind::Dns
        } else {
            ProbeErrorKind::Connect
        }
    } else {
        ProbeErrorKind::Request
    }
}

fn source_chain_mentions(e: &reqwest::Error, needle: &str) -> bool {
    let mut current: Option<&(dyn StdError + 'static)> = Some(e);
    while let Some(err) = current {
        if err.to_string().to_lowercase().contains(needle) {
            return true;
        }
        current = err.source();
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_status_range() {
        assert!(ProbeOutcome::status(200).reachable);
        assert!(ProbeOutcome::status(204).reachable);
        assert!(ProbeOutcome::status(301).reachable);
        assert!(ProbeOutcome::status(399).reachable);
        assert!(!ProbeOutcome::status(199).reachable);
        assert!(!ProbeOutcome::status(400).reachable);
        assert!(!ProbeOutcome::status(503).reachable);
    }

    #[test]
    fn test_outcome_failed() {
        let outcome = ProbeOutcome::failed(ProbeErrorKind::Dns);
        assert!(!outcome.reachable);
        assert_eq!(outcome.status_code, None);
        assert_eq!(outcome.error, Some(ProbeErrorKind::Dns));
    }

    #[test]
    fn test_head_rejected() {
        assert!(head_rejected(StatusCode::METHOD_NOT_ALLOWED));
        assert!(head_rejected(StatusCode::NOT_IMPLEMENTED));
        assert!(!head_rejected(StatusCode::NOT_FOUND));
        assert!(!head_rejected(StatusCode::OK));
    }

    #[test]
    fn test_error_kind_serialization() {
        assert_eq!(
            serde_json::to_string(&ProbeErrorKind::InvalidUrl).unwrap(),
            "\"invalid_url\""
        );
        assert_eq!(ProbeErrorKind::Timeout.to_string(), "timeout");
    }

    #[tokio::test]
    async fn test_invalid_url_never_panics() {
        let probe = HttpProbe::new().unwrap();
        let outcome = probe.check("not a url", Duration::from_millis(500)).await;
        assert_eq!(outcome, ProbeOutcome::failed(ProbeErrorKind::InvalidUrl));
    }

    #[tokio::test]
    async fn test_connection_refused_is_offline() {
        // Bind then drop to get a port with nothing listening
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };

        let probe = HttpProbe::new().unwrap();
        let outcome = probe
            .check(&format!("http://127.0.0.1:{}/", port), Duration::from_secs(2))
            .await;
        assert!(!outcome.reachable);
        assert_eq!(outcome.error, Some(ProbeErrorKind::Connect));
    }
}
