//! reqwest-backed [`Upstream`] speaking Hoppie's `connect.html` GET API.

use std::fmt;
use std::time::Duration;

use reqwest::{Client, Url};
use thiserror::Error;

use acarsmux_core::error::AcarsError;
use acarsmux_core::wire::{HoppieRequest, UpstreamReply, classify_reply, extract_messages};
use acarsmux_fanout::upstream::Upstream;

/// Public Hoppie endpoint.
pub const DEFAULT_UPSTREAM: &str = "https://www.hoppie.nl/acars/system/connect.html";

/// Longest slice of an unexpected reply quoted back in errors.
const MAX_QUOTED_REPLY: usize = 120;

#[derive(Debug, Error)]
pub enum RelayBuildError {
    #[error("invalid upstream url {url}: {reason}")]
    InvalidUrl { url: String, reason: String },
    #[error("shared upstream logon is empty")]
    EmptyLogon,
    #[error("failed to build http client: {0}")]
    Client(#[from] reqwest::Error),
}

/// Upstream reached over HTTP with the shared account logon.
///
/// Every request carries the client-level timeout, so a stalled upstream
/// resolves as [`AcarsError::UpstreamUnreachable`].
pub struct HttpUpstream {
    client: Client,
    url: Url,
    logon: String,
}

impl HttpUpstream {
    pub fn new(url: &str, logon: &str, timeout: Duration) -> Result<Self, RelayBuildError> {
        if logon.trim().is_empty() {
            return Err(RelayBuildError::EmptyLogon);
        }
        let url = Url::parse(url).map_err(|e| RelayBuildError::InvalidUrl {
            url: url.to_owned(),
            reason: e.to_string(),
        })?;
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("acarsmux/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            url,
            logon: logon.to_owned(),
        })
    }

    /// Upstream URL with any embedded credentials masked, for logs.
    pub fn redacted_url(&self) -> String {
        let mut url = self.url.clone();
        if url.password().is_some() || !url.username().is_empty() {
            let _ = url.set_username("**REDACTED**");
            let _ = url.set_password(None);
        }
        url.to_string()
    }

    async fn get(&self, request: &HoppieRequest) -> Result<String, AcarsError> {
        let upstream_request = request.with_logon(&self.logon);
        let response = self
            .client
            .get(self.url.clone())
            .query(&upstream_request.query_pairs())
            .send()
            .await
            .map_err(|e| {
                let err = describe(e);
                tracing::debug!(url = %self.redacted_url(), error = %err, "upstream request failed");
                err
            })?;

        let status = response.status();
        tracing::debug!(
            url = %self.redacted_url(),
            packet_type = ?request.packet_type,
            status = status.as_u16(),
            "upstream replied"
        );
        if !status.is_success() {
            return Err(AcarsError::unreachable(format!(
                "upstream returned HTTP {}",
                status.as_u16()
            )));
        }
        response.text().await.map_err(describe)
    }
}

impl Upstream for HttpUpstream {
    async fn poll(&self, callsign: &str) -> Result<Vec<String>, AcarsError> {
        let text = self.get(&HoppieRequest::poll(callsign, &self.logon)).await?;
        match classify_reply(&text) {
            UpstreamReply::Ok(body) => Ok(extract_messages(body)),
            UpstreamReply::Error(body) => Err(AcarsError::UpstreamError(body.to_owned())),
            UpstreamReply::Unexpected(body) => Err(AcarsError::unreachable(format!(
                "unexpected reply: {}",
                quote(body)
            ))),
        }
    }

    async fn forward(&self, request: &HoppieRequest) -> Result<String, AcarsError> {
        let text = self.get(request).await?;
        match classify_reply(&text) {
            UpstreamReply::Error(body) => Err(AcarsError::UpstreamError(body.to_owned())),
            UpstreamReply::Ok(_) | UpstreamReply::Unexpected(_) => Ok(text),
        }
    }
}

impl fmt::Debug for HttpUpstream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpUpstream")
            .field("url", &self.redacted_url())
            .finish_non_exhaustive()
    }
}

fn describe(err: reqwest::Error) -> AcarsError {
    if err.is_timeout() {
        AcarsError::unreachable("request timed out")
    } else if err.is_connect() {
        AcarsError::unreachable(format!("connect failed: {err}"))
    } else {
        AcarsError::unreachable(err.to_string())
    }
}

fn quote(body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.chars().count() <= MAX_QUOTED_REPLY {
        trimmed.to_owned()
    } else {
        let head: String = trimmed.chars().take(MAX_QUOTED_REPLY).collect();
        format!("{head}...")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    use axum::Router;
    use axum::extract::Query;
    use axum::http::StatusCode;
    use axum::routing::get;

    const PATH: &str = "/acars/system/connect.html";

    type Seen = Arc<Mutex<Vec<HashMap<String, String>>>>;

    async fn spawn_upstream(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind");
        let addr = listener.local_addr().expect("local addr");
        tokio::spawn(async move {
            axum::serve(listener, router).await.expect("serve");
        });
        format!("http://{addr}{PATH}")
    }

    fn recording(reply: &'static str, seen: Seen) -> Router {
        Router::new().route(
            PATH,
            get(move |Query(params): Query<HashMap<String, String>>| {
                let seen = Arc::clone(&seen);
                async move {
                    seen.lock().expect("lock").push(params);
                    reply
                }
            }),
        )
    }

    fn relay(url: &str) -> HttpUpstream {
        HttpUpstream::new(url, "SHARED-LOGON", Duration::from_secs(2)).expect("relay")
    }

    #[tokio::test]
    async fn poll_uses_shared_logon_and_extracts_records() {
        let seen = Seen::default();
        let url = spawn_upstream(recording(
            "ok {REQ123 telex {hello}} {DLH4 cpdlc {/data2/1//NE/LOGON}} ",
            Arc::clone(&seen),
        ))
        .await;

        let records = relay(&url).poll("ABC123").await.expect("poll");
        assert_eq!(
            records,
            vec![
                "{REQ123 telex {hello}}".to_string(),
                "{DLH4 cpdlc {/data2/1//NE/LOGON}}".to_string(),
            ]
        );

        let seen = seen.lock().expect("lock");
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0]["logon"], "SHARED-LOGON");
        assert_eq!(seen[0]["from"], "ABC123");
        assert_eq!(seen[0]["to"], "SERVER");
        assert_eq!(seen[0]["type"], "poll");
    }

    #[tokio::test]
    async fn poll_error_reply_is_upstream_error() {
        let url = spawn_upstream(recording("error {illegal logon code}", Seen::default())).await;
        let err = relay(&url).poll("ABC123").await.unwrap_err();
        assert_eq!(
            err,
            AcarsError::UpstreamError("error {illegal logon code}".into())
        );
    }

    #[tokio::test]
    async fn poll_garbage_reply_is_unreachable() {
        let url = spawn_upstream(recording("<html>maintenance</html>", Seen::default())).await;
        let err = relay(&url).poll("ABC123").await.unwrap_err();
        assert!(matches!(err, AcarsError::UpstreamUnreachable(ref r) if r.contains("maintenance")));
    }

    #[tokio::test]
    async fn non_200_status_is_unreachable() {
        let router = Router::new().route(
            PATH,
            get(|| async { (StatusCode::BAD_GATEWAY, "upstream down") }),
        );
        let url = spawn_upstream(router).await;
        let err = relay(&url).poll("ABC123").await.unwrap_err();
        assert_eq!(err, AcarsError::unreachable("upstream returned HTTP 502"));
    }

    #[tokio::test]
    async fn slow_upstream_times_out() {
        let router = Router::new().route(
            PATH,
            get(|| async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                "ok"
            }),
        );
        let url = spawn_upstream(router).await;
        let relay = HttpUpstream::new(&url, "SHARED", Duration::from_millis(100)).expect("relay");
        let err = relay.poll("ABC123").await.unwrap_err();
        assert_eq!(err, AcarsError::unreachable("request timed out"));
    }

    #[tokio::test]
    async fn closed_port_is_unreachable() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind");
        let addr = listener.local_addr().expect("local addr");
        drop(listener);

        let err = relay(&format!("http://{addr}{PATH}"))
            .poll("ABC123")
            .await
            .unwrap_err();
        assert!(matches!(err, AcarsError::UpstreamUnreachable(_)));
    }

    #[tokio::test]
    async fn forward_rewrites_logon_and_returns_reply_verbatim() {
        let seen = Seen::default();
        let url = spawn_upstream(recording("ok", Arc::clone(&seen))).await;

        let request = HoppieRequest {
            logon: Some("pilot1".into()),
            from: Some("ABC123".into()),
            to: Some("EDDF".into()),
            packet_type: Some("telex".into()),
            packet: Some("REQUEST {CLEARANCE}".into()),
        };
        assert_eq!(relay(&url).forward(&request).await.expect("sent"), "ok");

        let seen = seen.lock().expect("lock");
        assert_eq!(seen[0]["logon"], "SHARED-LOGON");
        assert_eq!(seen[0]["packet"], "REQUEST {CLEARANCE}");
        assert_eq!(seen[0]["type"], "telex");
    }

    #[tokio::test]
    async fn forward_error_reply_is_upstream_error() {
        let url = spawn_upstream(recording("error {unknown station}", Seen::default())).await;
        let request = HoppieRequest {
            logon: Some("pilot1".into()),
            packet_type: Some("ping".into()),
            ..Default::default()
        };
        let err = relay(&url).forward(&request).await.unwrap_err();
        assert_eq!(err.to_reply(), "error {unknown station}");
    }

    #[derive(Clone, Default)]
    struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

    impl std::io::Write for CapturedLogs {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().expect("lock").extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for CapturedLogs {
        type Writer = CapturedLogs;

        fn make_writer(&'a self) -> Self::Writer {
            self.clone()
        }
    }

    impl CapturedLogs {
        fn text(&self) -> String {
            String::from_utf8_lossy(&self.0.lock().expect("lock")).into_owned()
        }
    }

    #[tokio::test]
    async fn upstream_exchange_is_logged_without_logon() {
        let logs = CapturedLogs::default();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(logs.clone())
            .with_ansi(false)
            .with_max_level(tracing::Level::DEBUG)
            .finish();
        let _default = tracing::subscriber::set_default(subscriber);

        let url = spawn_upstream(recording("ok", Seen::default())).await;
        relay(&url).poll("ABC123").await.expect("poll");

        let text = logs.text();
        assert!(text.contains("upstream replied"), "{text}");
        assert!(text.contains("status=200"), "{text}");
        assert!(!text.contains("SHARED-LOGON"), "{text}");
    }

    #[test]
    fn construction_validates_inputs() {
        assert!(matches!(
            HttpUpstream::new(DEFAULT_UPSTREAM, "  ", Duration::from_secs(1)),
            Err(RelayBuildError::EmptyLogon)
        ));
        assert!(matches!(
            HttpUpstream::new("not a url", "SHARED", Duration::from_secs(1)),
            Err(RelayBuildError::InvalidUrl { .. })
        ));
    }

    #[test]
    fn debug_and_redacted_url_hide_credentials() {
        let relay = HttpUpstream::new(
            "https://user:pw@example.com/acars/system/connect.html",
            "SHARED-SECRET",
            Duration::from_secs(1),
        )
        .expect("relay");
        let redacted = relay.redacted_url();
        assert!(!redacted.contains("pw"));
        assert!(redacted.contains("REDACTED"));
        assert!(!format!("{relay:?}").contains("SHARED-SECRET"));
    }
}
