//! Minimal HTTP/1.1 boundary over a raw TcpStream: one request per connection.
//!
//! Routes:
//!   GET  /             banner
//!   GET  /health       {"status":"healthy","model_loaded":bool}
//!   POST /api/predict  MatchRequest → PredictionResponse

use anyhow::{Context, Result};
use logger::{now_iso, EventLogger, PredictionFailedEvent, PredictionServedEvent};
use prediction_engine::{MatchRequest, PredictionResponse, PredictionService};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, error, warn};

const MAX_HEAD: usize = 16 * 1024;
const MAX_BODY: usize = 64 * 1024;
/// Whole request (head and body) must arrive within this window.
pub const READ_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<PredictionService>,
    pub events: Arc<EventLogger>,
    pub cors_origin: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    pub method: String,
    pub path: String,
    pub body: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn json(status: u16, value: &serde_json::Value) -> Self {
        Self {
            status,
            body: value.to_string(),
        }
    }

    fn detail(status: u16, detail: impl Into<String>) -> Self {
        let detail: String = detail.into();
        Self::json(status, &json!({ "detail": detail }))
    }

    fn reason(&self) -> &'static str {
        match self.status {
            200 => "OK",
            204 => "No Content",
            400 => "Bad Request",
            404 => "Not Found",
            405 => "Method Not Allowed",
            408 => "Request Timeout",
            413 => "Payload Too Large",
            422 => "Unprocessable Entity",
            _ => "Internal Server Error",
        }
    }

    pub fn to_wire(&self, cors_origin: &str) -> String {
        let cors = format!(
            "Access-Control-Allow-Origin: {cors_origin}\r\nAccess-Control-Allow-Methods: GET, POST, OPTIONS\r\n\
             Access-Control-Allow-Headers: *\r\n"
        );
        // 204 carries neither a body nor its framing headers.
        if self.status == 204 {
            return format!("HTTP/1.1 204 {}\r\n{cors}Connection: close\r\n\r\n", self.reason());
        }
        format!(
            "HTTP/1.1 {} {}\r\nContent-Type: application/json; charset=utf-8\r\nContent-Length: {}\r\n\
             {cors}Connection: close\r\n\r\n{}",
            self.status,
            self.reason(),
            self.body.len(),
            self.body
        )
    }
}

pub enum ReadOutcome {
    Request(HttpRequest),
    /// Peer closed before sending anything.
    Closed,
    /// Unusable request; answer with this and close.
    Rejected(HttpResponse),
}

/// [`read_request`] bounded by `limit`; a stalled peer gets a 408.
pub async fn read_request_within<R: AsyncRead + Unpin>(stream: &mut R, limit: Duration) -> Result<ReadOutcome> {
    match tokio::time::timeout(limit, read_request(stream)).await {
        Ok(outcome) => outcome,
        Err(_) => Ok(ReadOutcome::Rejected(HttpResponse::detail(408, "Request timeout"))),
    }
}

/// Reads the head and a `Content-Length` delimited body.
pub async fn read_request<R: AsyncRead + Unpin>(stream: &mut R) -> Result<ReadOutcome> {
    let mut buf = Vec::with_capacity(4096);
    let mut chunk = [0u8; 4096];

    let head_end = loop {
        if let Some(pos) = find_head_end(&buf) {
            break pos;
        }
        if buf.len() > MAX_HEAD {
            return Ok(ReadOutcome::Rejected(HttpResponse::detail(400, "Request head too large")));
        }
        let n = stream.read(&mut chunk).await.context("http read")?;
        if n == 0 {
            if buf.is_empty() {
                return Ok(ReadOutcome::Closed);
            }
            return Ok(ReadOutcome::Rejected(HttpResponse::detail(400, "Incomplete request")));
        }
        buf.extend_from_slice(&chunk[..n]);
    };

    let head = String::from_utf8_lossy(&buf[..head_end]).into_owned();
    let mut lines = head.split("\r\n");
    let first_line = lines.next().unwrap_or_default();
    let mut parts = first_line.split_whitespace();
    let (Some(method), Some(target)) = (parts.next(), parts.next()) else {
        return Ok(ReadOutcome::Rejected(HttpResponse::detail(400, "Malformed request line")));
    };
    let path = target.split('?').next().unwrap_or_default().to_string();
    let method = method.to_string();

    let mut content_length = 0usize;
    for line in lines {
        let Some((name, value)) = line.split_once(':') else { continue };
        if name.trim().eq_ignore_ascii_case("content-length") {
            match value.trim().parse() {
                Ok(n) => content_length = n,
                Err(_) => {
                    return Ok(ReadOutcome::Rejected(HttpResponse::detail(400, "Invalid Content-Length")))
                }
            }
        }
    }
    if content_length > MAX_BODY {
        return Ok(ReadOutcome::Rejected(HttpResponse::detail(413, "Request body too large")));
    }

    let mut body = buf.split_off(head_end + 4);
    while body.len() < content_length {
        let n = stream.read(&mut chunk).await.context("http read body")?;
        if n == 0 {
            return Ok(ReadOutcome::Rejected(HttpResponse::detail(400, "Incomplete request body")));
        }
        body.extend_from_slice(&chunk[..n]);
    }
    body.truncate(content_length);

    Ok(ReadOutcome::Request(HttpRequest { method, path, body }))
}

fn find_head_end(buf: &[u8]) -> Option<usize> {
    buf.windows(4).position(|w| w == b"\r\n\r\n")
}

pub async fn route(req: HttpRequest, state: &AppState) -> HttpResponse {
    match (req.method.as_str(), req.path.as_str()) {
        ("OPTIONS", _) => HttpResponse {
            status: 204,
            body: String::new(),
        },
        ("GET", "/") => HttpResponse::json(200, &json!({ "message": "Win Wise Cricket Insight API" })),
        ("GET", "/health") => HttpResponse::json(
            200,
            &json!({ "status": "healthy", "model_loaded": state.service.model_loaded() }),
        ),
        ("POST", "/api/predict") => predict(&req.body, state).await,
        (_, "/" | "/health" | "/api/predict") => HttpResponse::detail(405, "Method Not Allowed"),
        _ => HttpResponse::detail(404, "Not Found"),
    }
}

async fn predict(body: &[u8], state: &AppState) -> HttpResponse {
    let request: MatchRequest = match serde_json::from_slice(body) {
        Ok(r) => r,
        Err(e) => {
            debug!("rejecting predict body: {}", e);
            return HttpResponse::detail(422, e.to_string());
        }
    };

    // Inference is CPU bound and the first call may load the model from disk.
    let service = Arc::clone(&state.service);
    let req = request.clone();
    let result = tokio::task::spawn_blocking(move || service.predict(&req)).await;

    match result {
        Ok(Ok(resp)) => {
            state.events.log_quiet(&served_event(&request, &resp, state.service.model_loaded()));
            match serde_json::to_value(&resp) {
                Ok(v) => HttpResponse::json(200, &v),
                Err(e) => internal_error(state, &request, &e.to_string()),
            }
        }
        Ok(Err(e)) => internal_error(state, &request, &e.to_string()),
        Err(e) => internal_error(state, &request, &format!("prediction task failed: {e}")),
    }
}

fn internal_error(state: &AppState, request: &MatchRequest, cause: &str) -> HttpResponse {
    error!(team1 = %request.team1, team2 = %request.team2, "Prediction failed: {}", cause);
    state.events.log_quiet(&PredictionFailedEvent {
        ts: now_iso(),
        event: "PREDICTION_FAILED",
        batting: request.team1.clone(),
        bowling: request.team2.clone(),
        error: cause.to_string(),
    });
    HttpResponse::detail(500, "Internal server error")
}

fn served_event(request: &MatchRequest, resp: &PredictionResponse, model_loaded: bool) -> PredictionServedEvent {
    PredictionServedEvent {
        ts: now_iso(),
        event: "PREDICTION_SERVED",
        batting: request.team1.clone(),
        bowling: request.team2.clone(),
        venue: request.venue.clone(),
        winner: resp.winner.clone(),
        probability: resp.probability,
        confidence: serde_json::to_value(resp.confidence)
            .ok()
            .and_then(|v| v.as_str().map(str::to_string))
            .unwrap_or_default(),
        top_factor: resp.shap_explanation.first().map(|f| f.feature.clone()),
        model_loaded,
    }
}

/// Serves a single connection; errors end up in the debug log only.
pub async fn handle_connection<S: AsyncRead + AsyncWrite + Unpin>(mut stream: S, state: AppState) -> Result<()> {
    let resp = match read_request_within(&mut stream, READ_TIMEOUT).await? {
        ReadOutcome::Closed => return Ok(()),
        ReadOutcome::Rejected(resp) => {
            warn!("rejected request: {}", resp.body);
            resp
        }
        ReadOutcome::Request(req) => {
            debug!("{} {}", req.method, req.path);
            route(req, &state).await
        }
    };
    stream
        .write_all(resp.to_wire(&state.cors_origin).as_bytes())
        .await
        .context("http write")?;
    stream.shutdown().await.ok();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use prediction_engine::{ModelHandle, ServiceOptions};
    use serde_json::Value;

    fn state(dir: &std::path::Path) -> AppState {
        AppState {
            service: Arc::new(PredictionService::new(ModelHandle::absent(), ServiceOptions::default())),
            events: Arc::new(EventLogger::new(dir)),
            cors_origin: "*".to_string(),
        }
    }

    fn req(method: &str, path: &str, body: &str) -> HttpRequest {
        HttpRequest {
            method: method.to_string(),
            path: path.to_string(),
            body: body.as_bytes().to_vec(),
        }
    }

    fn body(resp: &HttpResponse) -> Value {
        serde_json::from_str(&resp.body).unwrap()
    }

    #[tokio::test]
    async fn health_reports_model_state() {
        let dir = tempfile::tempdir().unwrap();
        let resp = route(req("GET", "/health", ""), &state(dir.path())).await;
        assert_eq!(resp.status, 200);
        assert_eq!(body(&resp), json!({"status": "healthy", "model_loaded": false}));
    }

    #[tokio::test]
    async fn degraded_prediction_over_http() {
        let dir = tempfile::tempdir().unwrap();
        let st = state(dir.path());
        let payload = r#"{"team1":"India","team2":"Australia","venue":"MCG","toss_winner":"India","toss_decision":"bat"}"#;
        let resp = route(req("POST", "/api/predict", payload), &st).await;
        assert_eq!(resp.status, 200);
        let v = body(&resp);
        assert_eq!(v["winner"], "India");
        assert_eq!(v["probability"], 0.5);
        assert_eq!(v["confidence"], "low");
        assert_eq!(v["shap_explanation"].as_array().unwrap().len(), 5);
        assert_eq!(v["factors"]["match_type"], "ODI");

        let logged = std::fs::read_to_string(st.events.current_path()).unwrap();
        assert!(logged.contains("PREDICTION_SERVED"));
    }

    #[tokio::test]
    async fn malformed_body_is_unprocessable() {
        let dir = tempfile::tempdir().unwrap();
        let st = state(dir.path());
        let resp = route(req("POST", "/api/predict", r#"{"team1":"India"}"#), &st).await;
        assert_eq!(resp.status, 422);
        assert!(body(&resp)["detail"].is_string());
        let resp = route(req("POST", "/api/predict", "not json"), &st).await;
        assert_eq!(resp.status, 422);
    }

    #[tokio::test]
    async fn unknown_routes_and_methods() {
        let dir = tempfile::tempdir().unwrap();
        let st = state(dir.path());
        assert_eq!(route(req("GET", "/nope", ""), &st).await.status, 404);
        assert_eq!(route(req("GET", "/api/predict", ""), &st).await.status, 405);
        assert_eq!(route(req("OPTIONS", "/api/predict", ""), &st).await.status, 204);
    }

    #[tokio::test]
    async fn reads_head_and_body_across_chunks() {
        let raw: &[u8] = b"POST /api/predict?x=1 HTTP/1.1\r\nHost: a\r\ncontent-length: 4\r\n\r\nabcdEXTRA";
        let mut stream = raw;
        match read_request(&mut stream).await.unwrap() {
            ReadOutcome::Request(r) => {
                assert_eq!(r.method, "POST");
                assert_eq!(r.path, "/api/predict");
                assert_eq!(r.body, b"abcd");
            }
            _ => panic!("expected a request"),
        }
    }

    #[tokio::test]
    async fn truncated_or_oversized_requests_are_rejected() {
        let mut empty: &[u8] = b"";
        assert!(matches!(read_request(&mut empty).await.unwrap(), ReadOutcome::Closed));

        let mut short: &[u8] = b"POST / HTTP/1.1\r\nContent-Length: 10\r\n\r\nabc";
        assert!(matches!(
            read_request(&mut short).await.unwrap(),
            ReadOutcome::Rejected(HttpResponse { status: 400, .. })
        ));

        let big = format!("POST / HTTP/1.1\r\nContent-Length: {}\r\n\r\n", MAX_BODY + 1);
        let mut big = big.as_bytes();
        assert!(matches!(
            read_request(&mut big).await.unwrap(),
            ReadOutcome::Rejected(HttpResponse { status: 413, .. })
        ));
    }

    #[tokio::test]
    async fn silent_peer_times_out() {
        // Keep the client half open but never write to it.
        let (_client, mut server) = tokio::io::duplex(64);
        let outcome = read_request_within(&mut server, Duration::from_millis(20)).await.unwrap();
        assert!(matches!(outcome, ReadOutcome::Rejected(HttpResponse { status: 408, .. })));
    }

    #[tokio::test]
    async fn complete_request_beats_the_deadline() {
        let mut raw: &[u8] = b"GET /health HTTP/1.1\r\n\r\n";
        let outcome = read_request_within(&mut raw, Duration::from_secs(1)).await.unwrap();
        assert!(matches!(outcome, ReadOutcome::Request(HttpRequest { ref path, .. }) if path == "/health"));
    }

    #[test]
    fn no_content_has_no_framing_headers() {
        let wire = HttpResponse { status: 204, body: String::new() }.to_wire("*");
        assert!(wire.starts_with("HTTP/1.1 204 No Content\r\n"));
        assert!(!wire.contains("Content-Length"));
        assert!(!wire.contains("Content-Type"));
        assert!(wire.contains("Access-Control-Allow-Origin: *\r\n"));
        assert!(wire.ends_with("\r\n\r\n"));
    }

    #[test]
    fn wire_format_has_length_and_cors() {
        let wire = HttpResponse::json(200, &json!({"ok": true})).to_wire("*");
        assert!(wire.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(wire.contains("Content-Length: 11\r\n"));
        assert!(wire.contains("Access-Control-Allow-Origin: *\r\n"));
        assert!(wire.ends_with("\r\n\r\n{\"ok\":true}"));
    }
}
