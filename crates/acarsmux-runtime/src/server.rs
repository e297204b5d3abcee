//! HTTP front: a drop-in `connect.html` endpoint plus a JSON status view.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use axum::extract::rejection::QueryRejection;
use axum::extract::{Form, Query, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use tokio::net::TcpListener;

use acarsmux_core::error::AcarsError;
use acarsmux_core::logon_gate::LogonGate;
use acarsmux_core::wire::HoppieRequest;
use acarsmux_fanout::engine::{EngineConfig, FanoutEngine};
use acarsmux_fanout::passthrough::Passthrough;
use acarsmux_fanout::send_dedup::SendDedup;
use acarsmux_fanout::session::SessionSnapshot;
use acarsmux_fanout::upstream::Upstream;

use crate::dispatch;

/// Path clients already use against upstream.
pub const CONNECT_PATH: &str = "/acars/system/connect.html";

/// Shared handler state. The engine owns the callsign session table.
pub struct AppState<U> {
    pub gate: Arc<LogonGate>,
    pub engine: Arc<FanoutEngine<U>>,
    pub passthrough: Arc<Passthrough<U>>,
}

impl<U> Clone for AppState<U> {
    fn clone(&self) -> Self {
        Self {
            gate: Arc::clone(&self.gate),
            engine: Arc::clone(&self.engine),
            passthrough: Arc::clone(&self.passthrough),
        }
    }
}

impl<U: Upstream> AppState<U> {
    pub fn new(
        gate: LogonGate,
        upstream: Arc<U>,
        engine_config: EngineConfig,
        send_dedup: Option<SendDedup>,
        relay_timeout: Duration,
    ) -> Self {
        let gate = Arc::new(gate);
        let engine = FanoutEngine::new(Arc::clone(&gate), Arc::clone(&upstream), engine_config);
        let mut passthrough = Passthrough::new(Arc::clone(&gate), upstream).with_timeout(relay_timeout);
        if let Some(dedup) = send_dedup {
            passthrough = passthrough.with_dedup(dedup);
        }
        Self {
            gate,
            engine: Arc::new(engine),
            passthrough: Arc::new(passthrough),
        }
    }
}

pub fn router<U: Upstream>(state: AppState<U>) -> Router {
    Router::new()
        .route(CONNECT_PATH, get(connect::<U>).post(connect::<U>))
        .route("/status", get(status::<U>))
        .with_state(state)
}

/// Bind `addr` and serve until Ctrl-C.
pub async fn run_server<U: Upstream>(addr: SocketAddr, state: AppState<U>) -> anyhow::Result<()> {
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    tracing::info!(addr = %listener.local_addr()?, "acarsmux listening");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("acarsmux stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown requested");
}

// ─── Handlers ────────────────────────────────────────────────────────

/// Fields come from the query string; a form-encoded POST body overrides
/// them field by field. An unparsable query is answered in wire format,
/// never with an HTTP error.
async fn connect<U: Upstream>(
    State(state): State<AppState<U>>,
    query: Result<Query<HoppieRequest>, QueryRejection>,
    form: Option<Form<HoppieRequest>>,
) -> Response {
    let query = match query {
        Ok(Query(query)) => query,
        Err(rejection) => {
            tracing::debug!(reason = %rejection.body_text(), "unparsable query string");
            let err = AcarsError::malformed(format!("invalid query string: {}", rejection.body_text()));
            return hoppie_response(err.to_reply());
        }
    };
    let request = match form {
        Some(Form(body)) => query.overlay(body),
        None => query,
    };
    let reply = dispatch::handle(&state, request).await;
    hoppie_response(reply)
}

/// Errors are still HTTP 200: clients only look at the body.
fn hoppie_response(body: String) -> Response {
    ([(header::CONTENT_TYPE, "text/html; charset=utf-8")], body).into_response()
}

#[derive(Debug, Serialize)]
struct StatusReport {
    allowed_logons: usize,
    sessions: Vec<SessionSnapshot>,
}

async fn status<U: Upstream>(State(state): State<AppState<U>>) -> Json<StatusReport> {
    Json(StatusReport {
        allowed_logons: state.gate.len(),
        sessions: state.engine.snapshot().await,
    })
}

// ─── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use acarsmux_fanout::testing::ScriptedUpstream;

    async fn spawn(upstream: ScriptedUpstream) -> String {
        let gate = LogonGate::from_csv("pilot1,pilot2").expect("non-empty");
        let state = AppState::new(
            gate,
            Arc::new(upstream),
            EngineConfig::default(),
            Some(SendDedup::default()),
            Duration::from_secs(2),
        );
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("local addr");
        tokio::spawn(async move {
            axum::serve(listener, router(state)).await.expect("serve");
        });
        format!("http://{addr}")
    }

    #[tokio::test]
    async fn get_poll_round_trip() {
        let upstream = ScriptedUpstream::new();
        upstream.push_batch(&["{REQ123 telex {hello}}"]);
        let base = spawn(upstream).await;

        let resp = reqwest::Client::new()
            .get(format!("{base}{CONNECT_PATH}"))
            .query(&[("logon", "pilot1"), ("from", "ABC123"), ("to", "SERVER"), ("type", "poll")])
            .send()
            .await
            .expect("request");
        assert_eq!(resp.status(), reqwest::StatusCode::OK);
        let content_type = resp
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        assert!(content_type.starts_with("text/html"));
        assert_eq!(resp.text().await.expect("body"), "ok {REQ123 telex {hello}} ");
    }

    #[tokio::test]
    async fn post_form_body_is_accepted() {
        let upstream = ScriptedUpstream::new();
        upstream.push_batch(&["{m1}"]);
        let base = spawn(upstream).await;

        let body = reqwest::Client::new()
            .post(format!("{base}{CONNECT_PATH}"))
            .form(&[("logon", "pilot2"), ("from", "ABC123"), ("type", "poll")])
            .send()
            .await
            .expect("request")
            .text()
            .await
            .expect("body");
        assert_eq!(body, "ok {m1} ");
    }

    #[tokio::test]
    async fn invalid_logon_is_a_200_with_error_body() {
        let base = spawn(ScriptedUpstream::new()).await;
        let resp = reqwest::Client::new()
            .get(format!("{base}{CONNECT_PATH}"))
            .query(&[("logon", "evil"), ("from", "ABC123"), ("type", "poll")])
            .send()
            .await
            .expect("request");
        assert_eq!(resp.status(), reqwest::StatusCode::OK);
        assert_eq!(resp.text().await.expect("body"), "error {invalid logon code}");
    }

    #[tokio::test]
    async fn repeated_query_field_is_a_200_with_error_body() {
        let upstream = ScriptedUpstream::new();
        let base = spawn(upstream).await;
        let resp = reqwest::Client::new()
            .get(format!(
                "{base}{CONNECT_PATH}?logon=pilot1&logon=pilot2&from=ABC123&type=poll"
            ))
            .send()
            .await
            .expect("request");
        assert_eq!(resp.status(), reqwest::StatusCode::OK);
        let body = resp.text().await.expect("body");
        assert!(body.starts_with("error {invalid query string"), "{body}");
        assert!(body.ends_with('}'), "{body}");
    }

    #[tokio::test]
    async fn status_reports_sessions_without_logons() {
        let upstream = ScriptedUpstream::new();
        upstream.push_batch(&["{m1}"]);
        let base = spawn(upstream).await;
        let client = reqwest::Client::new();

        client
            .get(format!("{base}{CONNECT_PATH}"))
            .query(&[("logon", "pilot1"), ("from", "ABC123"), ("type", "poll")])
            .send()
            .await
            .expect("poll");

        let text = client
            .get(format!("{base}/status"))
            .send()
            .await
            .expect("status")
            .text()
            .await
            .expect("body");
        let status: serde_json::Value = serde_json::from_str(&text).expect("json");
        assert_eq!(status["allowed_logons"], 2);
        assert_eq!(status["sessions"][0]["callsign"], "ABC123");
        assert_eq!(status["sessions"][0]["next_seq"], 2);
        assert_eq!(status["sessions"][0]["last_outcome"]["status"], "delivered");
        assert!(!text.contains("pilot1"));
    }
}
