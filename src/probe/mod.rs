//! Liveness probe for a single endpoint.
//!
//! One GET to `/api/tags` with a client-side timeout. No retries.
//!
//!   2xx               -> Reachable
//!   other status      -> RespondedWithError { status, body }
//!   transport failure -> Unreachable(cause)

use std::fmt;
use std::io;
use std::time::Duration;
use tracing::debug;
use url::Url;

use crate::registry::Endpoint;

/// Path queried on the endpoint.
pub const STATUS_PATH: &str = "/api/tags";

/// Probe timeout (seconds).
pub const PROBE_TIMEOUT_SECS: u64 = 5;

#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    #[error("invalid server address '{address}': {source}")]
    InvalidAddress {
        address: String,
        #[source]
        source: url::ParseError,
    },

    #[error("failed to create HTTP client: {0}")]
    Client(#[source] reqwest::Error),

    #[error("failed to create runtime: {0}")]
    Runtime(#[source] io::Error),
}

/// Classified probe outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PingResult {
    Reachable,
    Unreachable(String),
    RespondedWithError { status: u16, body: String },
}

impl PingResult {
    pub fn is_reachable(&self) -> bool {
        matches!(self, PingResult::Reachable)
    }
}

impl fmt::Display for PingResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PingResult::Reachable => f.write_str("reachable"),
            PingResult::Unreachable(cause) => write!(f, "unreachable: {cause}"),
            PingResult::RespondedWithError { status, body } => {
                write!(f, "returned status: {status} ({body})")
            }
        }
    }
}

/// Build the probe URL for an address.
///
/// `host:port` gets an `http://` prefix; an address that already is an
/// http(s) URL is used as the base.
pub fn probe_url(address: &str) -> Result<Url, ProbeError> {
    let invalid = |source| ProbeError::InvalidAddress {
        address: address.to_string(),
        source,
    };
    let base = match Url::parse(address) {
        Ok(url) if matches!(url.scheme(), "http" | "https") => url,
        _ => Url::parse(&format!("http://{address}")).map_err(invalid)?,
    };
    base.join(STATUS_PATH).map_err(invalid)
}

/// Issues liveness probes.
#[derive(Debug, Clone)]
pub struct LivenessChecker {
    client: reqwest::Client,
}

impl LivenessChecker {
    pub fn new() -> Result<Self, ProbeError> {
        Self::with_timeout(Duration::from_secs(PROBE_TIMEOUT_SECS))
    }

    pub fn with_timeout(timeout: Duration) -> Result<Self, ProbeError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(ProbeError::Client)?;
        Ok(Self { client })
    }

    /// Blocking probe: runs [`Self::probe`] on a temporary runtime.
    pub fn ping(&self, endpoint: &Endpoint) -> Result<PingResult, ProbeError> {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(ProbeError::Runtime)?;
        Ok(rt.block_on(self.probe(endpoint)))
    }

    pub async fn probe(&self, endpoint: &Endpoint) -> PingResult {
        let url = match probe_url(&endpoint.address) {
            Ok(url) => url,
            Err(e) => return PingResult::Unreachable(e.to_string()),
        };
        debug!(server = %endpoint.name, %url, "probing");

        let resp = match self.client.get(url).send().await {
            Ok(resp) => resp,
            Err(e) => return PingResult::Unreachable(describe(&e)),
        };

        let status = resp.status();
        if status.is_success() {
            return PingResult::Reachable;
        }
        let body = resp.text().await.unwrap_or_default();
        PingResult::RespondedWithError {
            status: status.as_u16(),
            body,
        }
    }
}

/// Flatten a reqwest error and its sources into one line.
fn describe(err: &reqwest::Error) -> String {
    let mut out = if err.is_timeout() {
        "timed out".to_string()
    } else if err.is_connect() {
        "connection failed".to_string()
    } else {
        "request failed".to_string()
    };
    let mut source = std::error::Error::source(err);
    while let Some(s) = source {
        out.push_str(": ");
        out.push_str(&s.to_string());
        source = s.source();
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn endpoint_for(server: &MockServer) -> Endpoint {
        let addr = server.address();
        Endpoint::new("mock", format!("{}:{}", addr.ip(), addr.port()))
    }

    #[test]
    fn probe_url_forms() {
        assert_eq!(
            probe_url("10.0.0.1:11434").unwrap().as_str(),
            "http://10.0.0.1:11434/api/tags"
        );
        assert_eq!(
            probe_url("https://ollama.example:443").unwrap().as_str(),
            "https://ollama.example/api/tags"
        );
        assert!(matches!(
            probe_url("bad host:1"),
            Err(ProbeError::InvalidAddress { .. })
        ));
    }

    #[tokio::test]
    async fn ok_status_is_reachable() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(STATUS_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"models":[]}"#))
            .expect(1)
            .mount(&server)
            .await;

        let checker = LivenessChecker::new().unwrap();
        assert_eq!(checker.probe(&endpoint_for(&server)).await, PingResult::Reachable);
    }

    #[tokio::test]
    async fn error_status_carries_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(STATUS_PATH))
            .respond_with(ResponseTemplate::new(503).set_body_string("loading"))
            .mount(&server)
            .await;

        let checker = LivenessChecker::new().unwrap();
        let result = checker.probe(&endpoint_for(&server)).await;
        assert_eq!(
            result,
            PingResult::RespondedWithError {
                status: 503,
                body: "loading".into()
            }
        );
        assert_eq!(result.to_string(), "returned status: 503 (loading)");
    }

    #[tokio::test]
    async fn closed_port_is_unreachable() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let checker = LivenessChecker::with_timeout(Duration::from_secs(2)).unwrap();
        let result = checker
            .probe(&Endpoint::new("gone", format!("127.0.0.1:{port}")))
            .await;
        assert!(matches!(result, PingResult::Unreachable(_)), "{result:?}");
        assert!(!result.is_reachable());
    }

    #[tokio::test]
    async fn slow_server_times_out_as_unreachable() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(STATUS_PATH))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(5)))
            .mount(&server)
            .await;

        let checker = LivenessChecker::with_timeout(Duration::from_millis(300)).unwrap();
        let started = std::time::Instant::now();
        let result = checker.probe(&endpoint_for(&server)).await;
        assert!(
            matches!(&result, PingResult::Unreachable(cause) if cause.starts_with("timed out")),
            "{result:?}"
        );
        assert!(started.elapsed() < Duration::from_secs(4));
    }

    #[test]
    fn blocking_ping_reports_unreachable() {
        let checker = LivenessChecker::with_timeout(Duration::from_secs(1)).unwrap();
        let result = checker
            .ping(&Endpoint::new("bad", "bad host:1"))
            .unwrap();
        assert!(matches!(result, PingResult::Unreachable(_)));
    }
}
