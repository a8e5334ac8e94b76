// =============================================================================
// api.rs — THE SAME ANSWERS, OVER HTTP
// =============================================================================
//
// A deliberately small HTTP/1.1 server on a bare TcpListener. One task per
// connection, one request per connection, one engine call per request. It
// keeps no state between requests.
//
//   GET  /health                      liveness
//   GET  /api                         what lives here
//   POST /search/cnr                  {"cnr": "...", "date": "today"}
//   POST /search/case                 {"case_type", "case_number", "case_year", "date"}
//   GET  /causelist?date=tomorrow     the full day's cause list
//
// 400 when the caller got it wrong, 408 when the caller took too long to say
// it, 502 when the portal got it wrong, 200 otherwise.
// The body is always JSON, and for searches it is the resolution report.
// =============================================================================

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use serde::Deserialize;
use serde_json::{json, Value};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::engine::{Engine, Resolution, ResolveRequest};
use crate::models::{DaySelector, RawIdentifier, ReportStatus};

/// Requests larger than this are refused unread.
const MAX_BODY_BYTES: usize = 64 * 1024;

/// A parsed HTTP/1.1 request.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: String,
    /// Path plus query string.
    pub path: String,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl HttpRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Path without the query string.
    pub fn route(&self) -> &str {
        self.path.split('?').next().unwrap_or_default()
    }

    /// Query parameters as a map.
    pub fn query(&self) -> HashMap<String, String> {
        match self.path.split_once('?') {
            Some((_, query)) => url::form_urlencoded::parse(query.as_bytes())
                .into_owned()
                .collect(),
            None => HashMap::new(),
        }
    }
}

/// Why a request could not be read off the socket.
#[derive(Debug, thiserror::Error)]
pub enum RequestError {
    #[error("connection closed before a full request arrived")]
    Closed,
    #[error("malformed request line")]
    Malformed,
    #[error("request larger than {} bytes", MAX_BODY_BYTES)]
    TooLarge,
    #[error("chunked request bodies are not supported, send Content-Length")]
    Chunked,
    #[error("body ended after {received} of {expected} bytes")]
    ShortBody { received: usize, expected: usize },
    #[error("read failed: {0}")]
    Io(#[from] std::io::Error),
}

impl RequestError {
    fn status(&self) -> u16 {
        match self {
            RequestError::TooLarge => 413,
            _ => 400,
        }
    }
}

/// Read one request off the stream.
pub async fn read_request<S>(stream: &mut S) -> Result<HttpRequest, RequestError>
where
    S: AsyncRead + Unpin,
{
    let mut buf = Vec::with_capacity(4096);
    let mut chunk = [0u8; 4096];

    let head_end = loop {
        if let Some(pos) = memchr::memmem::find(&buf, b"\r\n\r\n") {
            break pos;
        }
        if buf.len() > MAX_BODY_BYTES {
            return Err(RequestError::TooLarge);
        }
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            return Err(RequestError::Closed);
        }
        buf.extend_from_slice(&chunk[..n]);
    };

    let head = String::from_utf8_lossy(&buf[..head_end]).into_owned();
    let mut lines = head.split("\r\n");
    let mut request_line = lines.next().ok_or(RequestError::Malformed)?.split_whitespace();
    let method = request_line.next().ok_or(RequestError::Malformed)?.to_string();
    let path = request_line.next().ok_or(RequestError::Malformed)?.to_string();
    let headers: Vec<(String, String)> = lines
        .filter_map(|line| line.split_once(':'))
        .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
        .collect();
    let header = |name: &str| {
        headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    };

    if header("transfer-encoding").is_some_and(|v| v.to_ascii_lowercase().contains("chunked")) {
        return Err(RequestError::Chunked);
    }
    let content_length: usize = match header("content-length") {
        Some(value) => value.parse().map_err(|_| RequestError::Malformed)?,
        None => 0,
    };
    if content_length > MAX_BODY_BYTES {
        return Err(RequestError::TooLarge);
    }

    let mut body = buf[head_end + 4..].to_vec();
    while body.len() < content_length {
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            return Err(RequestError::ShortBody {
                received: body.len(),
                expected: content_length,
            });
        }
        body.extend_from_slice(&chunk[..n]);
    }
    body.truncate(content_length);

    Ok(HttpRequest {
        method,
        path,
        headers,
        body: String::from_utf8_lossy(&body).into_owned(),
    })
}

struct ApiResponse {
    status: u16,
    body: Value,
}

impl ApiResponse {
    fn ok(body: Value) -> Self {
        ApiResponse { status: 200, body }
    }

    fn error(status: u16, message: impl Into<String>) -> Self {
        ApiResponse {
            status,
            body: json!({ "error": message.into() }),
        }
    }

    fn from_resolution(resolution: &Resolution) -> Self {
        let status = match (resolution.report.status, resolution.error_kind()) {
            (ReportStatus::Error, Some("InvalidIdentifier")) => 400,
            (ReportStatus::Error, _) => 502,
            _ => 200,
        };
        let body = serde_json::to_value(&resolution.report)
            .unwrap_or_else(|e| json!({ "error": format!("could not serialize report: {}", e) }));
        ApiResponse { status, body }
    }
}

fn reason_phrase(status: u16) -> &'static str {
    match status {
        200 => "OK",
        400 => "Bad Request",
        404 => "Not Found",
        405 => "Method Not Allowed",
        408 => "Request Timeout",
        413 => "Payload Too Large",
        502 => "Bad Gateway",
        _ => "Internal Server Error",
    }
}

#[derive(Debug, Deserialize)]
struct CnrSearch {
    cnr: Option<String>,
    #[serde(default)]
    date: Option<String>,
    #[serde(default)]
    cause_list: bool,
    #[serde(default)]
    case_pdf: bool,
}

#[derive(Debug, Deserialize)]
struct CaseSearch {
    case_type: Option<String>,
    case_number: Option<Value>,
    case_year: Option<Value>,
    #[serde(default)]
    date: Option<String>,
    #[serde(default)]
    cause_list: bool,
    #[serde(default)]
    case_pdf: bool,
}

/// Bind `addr` and serve until `shutdown` flips.
pub async fn run_api_server(
    engine: Arc<Engine>,
    addr: &str,
    shutdown: watch::Receiver<bool>,
) -> std::io::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    info!(addr = %listener.local_addr()?, "api server listening");
    serve(engine, listener, shutdown).await;
    Ok(())
}

/// Accept loop on an already bound listener.
pub async fn serve(engine: Arc<Engine>, listener: TcpListener, mut shutdown: watch::Receiver<bool>) {
    loop {
        tokio::select! {
            accepted = listener.accept() => {
                match accepted {
                    Ok((stream, peer)) => {
                        let engine = Arc::clone(&engine);
                        tokio::spawn(async move {
                            handle_connection(engine, stream, peer).await;
                        });
                    }
                    Err(e) => {
                        error!(error = %e, "api accept failed");
                    }
                }
            }
            _ = shutdown.changed() => {
                info!("api server shutting down");
                break;
            }
        }
    }
}

async fn handle_connection<S>(engine: Arc<Engine>, mut stream: S, peer: SocketAddr)
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let deadline = engine.config().api_read_timeout;
    let response = match tokio::time::timeout(deadline, read_request(&mut stream)).await {
        Ok(Ok(request)) => {
            debug!(%peer, method = request.method.as_str(), path = request.path.as_str(), "api request");
            let response = route(&engine, &request).await;
            info!(
                %peer,
                method = request.method.as_str(),
                path = request.route(),
                status = response.status,
                "api request served"
            );
            response
        }
        Ok(Err(RequestError::Closed)) => {
            debug!(%peer, "client went away before sending a request");
            return;
        }
        Ok(Err(e)) => {
            info!(%peer, error = %e, "api request rejected");
            ApiResponse::error(e.status(), e.to_string())
        }
        Err(_) => {
            info!(%peer, timeout_ms = deadline.as_millis() as u64, "api request timed out");
            ApiResponse::error(408, "request not received in time")
        }
    };

    let body = response.body.to_string();
    let head = format!(
        "HTTP/1.1 {} {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        response.status,
        reason_phrase(response.status),
        body.len()
    );
    if let Err(e) = stream.write_all(head.as_bytes()).await {
        warn!(%peer, error = %e, "api write failed");
        return;
    }
    let _ = stream.write_all(body.as_bytes()).await;
    let _ = stream.shutdown().await;
}

async fn route(engine: &Engine, request: &HttpRequest) -> ApiResponse {
    match (request.method.as_str(), request.route()) {
        ("GET", "/health") => ApiResponse::ok(json!({
            "status": "healthy",
            "timestamp": chrono::Utc::now().to_rfc3339(),
        })),
        ("GET", "/api") => ApiResponse::ok(json!({
            "name": env!("CARGO_PKG_NAME"),
            "version": env!("CARGO_PKG_VERSION"),
            "endpoints": {
                "GET /health": "liveness",
                "POST /search/cnr": "{cnr, date}",
                "POST /search/case": "{case_type, case_number, case_year, date}",
                "GET /causelist?date=today|tomorrow": "full cause list for the day",
            },
        })),
        ("POST", "/search/cnr") => search_cnr(engine, &request.body).await,
        ("POST", "/search/case") => search_case(engine, &request.body).await,
        ("GET", "/causelist") => {
            let date = request.query().get("date").cloned();
            match parse_day(date.as_deref()) {
                Ok(day) => ApiResponse::from_resolution(&engine.cause_list(day).await),
                Err(response) => response,
            }
        }
        (_, "/health" | "/api" | "/search/cnr" | "/search/case" | "/causelist") => {
            ApiResponse::error(405, format!("{} not allowed here", request.method))
        }
        (_, other) => ApiResponse::error(404, format!("no route for {}", other)),
    }
}

async fn search_cnr(engine: &Engine, body: &str) -> ApiResponse {
    let search: CnrSearch = match serde_json::from_str(body) {
        Ok(search) => search,
        Err(e) => return ApiResponse::error(400, format!("invalid JSON body: {}", e)),
    };
    let Some(cnr) = search.cnr else {
        return ApiResponse::error(400, "cnr is required");
    };
    let day = match parse_day(search.date.as_deref()) {
        Ok(day) => day,
        Err(response) => return response,
    };

    let mut request = ResolveRequest::new(RawIdentifier::Cnr { cnr }, day);
    request.cause_list = search.cause_list;
    request.want_case_pdf = search.case_pdf;
    ApiResponse::from_resolution(&engine.resolve(&request).await)
}

async fn search_case(engine: &Engine, body: &str) -> ApiResponse {
    let search: CaseSearch = match serde_json::from_str(body) {
        Ok(search) => search,
        Err(e) => return ApiResponse::error(400, format!("invalid JSON body: {}", e)),
    };
    let day = match parse_day(search.date.as_deref()) {
        Ok(day) => day,
        Err(response) => return response,
    };

    let identifier = match RawIdentifier::from_parts(
        None,
        search.case_type,
        search.case_number.as_ref().map(field_text),
        search.case_year.as_ref().map(field_text),
    ) {
        Ok(identifier) => identifier,
        Err(e) => return ApiResponse::error(400, e.to_string()),
    };

    let mut request = ResolveRequest::new(identifier, day);
    request.cause_list = search.cause_list;
    request.want_case_pdf = search.case_pdf;
    ApiResponse::from_resolution(&engine.resolve(&request).await)
}

/// Numbers and years arrive as JSON strings or JSON numbers.
fn field_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn parse_day(raw: Option<&str>) -> Result<DaySelector, ApiResponse> {
    match raw {
        None => Ok(DaySelector::Today),
        Some(raw) => raw.parse().map_err(|e: String| ApiResponse::error(400, e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ParseFailure;
    use crate::parser::tests::StubTextLayer;
    use crate::test_support::{config_for, MockPortal, MockResponse};
    use std::time::Duration;
    use tokio::net::TcpStream;

    const LISTING: &str = r#"
        <table>
          <tr><th>Sr No</th><th>Case Number</th><th>Party Name</th></tr>
          <tr><td colspan="3">Court Room 3</td></tr>
          <tr><td>7</td><td>CRL/45/2022<br>MH01-001234-2023</td><td>Ramesh vs State</td></tr>
        </table>"#;

    struct TestServer {
        base: String,
        shutdown: watch::Sender<bool>,
        _portal: MockPortal,
    }

    impl Drop for TestServer {
        fn drop(&mut self) {
            let _ = self.shutdown.send(true);
        }
    }

    async fn start(portal: MockPortal) -> TestServer {
        start_with_read_timeout(portal, Duration::from_secs(10)).await
    }

    async fn start_with_read_timeout(portal: MockPortal, read_timeout: Duration) -> TestServer {
        let mut config = config_for(&portal);
        config.api_read_timeout = read_timeout;
        let engine = Engine::new(config)
            .unwrap()
            .with_pdf_layer(Arc::new(StubTextLayer(Err(ParseFailure::PdfText(
                "no pdf expected".into(),
            )))));
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        let (shutdown, rx) = watch::channel(false);
        tokio::spawn(serve(Arc::new(engine), listener, rx));
        TestServer {
            base,
            shutdown,
            _portal: portal,
        }
    }

    async fn listing_portal() -> MockPortal {
        MockPortal::start(|req| {
            if req.method == "POST" {
                MockResponse::html(LISTING)
            } else {
                MockResponse::pdf(b"%PDF-1.4 full list")
            }
        })
        .await
    }

    async fn post(server: &TestServer, path: &str, body: &str) -> (u16, Value) {
        let response = reqwest::Client::new()
            .post(format!("{}{}", server.base, path))
            .header("Content-Type", "application/json")
            .body(body.to_string())
            .send()
            .await
            .unwrap();
        let status = response.status().as_u16();
        (status, response.json().await.unwrap())
    }

    async fn get(server: &TestServer, path: &str) -> (u16, Value) {
        let response = reqwest::get(format!("{}{}", server.base, path)).await.unwrap();
        let status = response.status().as_u16();
        (status, response.json().await.unwrap())
    }

    #[tokio::test]
    async fn test_health() {
        let server = start(listing_portal().await).await;
        let (status, body) = get(&server, "/health").await;
        assert_eq!(status, 200);
        assert_eq!(body["status"], "healthy");
    }

    #[tokio::test]
    async fn test_search_cnr_listed() {
        let server = start(listing_portal().await).await;
        let (status, body) =
            post(&server, "/search/cnr", r#"{"cnr": "MH010012342023", "date": "today"}"#).await;
        assert_eq!(status, 200);
        assert_eq!(body["status"], "Listed");
        assert_eq!(body["serialNumber"], 7);
        assert_eq!(body["courtName"], "Court Room 3");
    }

    #[tokio::test]
    async fn test_search_case_accepts_numeric_fields() {
        let server = start(listing_portal().await).await;
        let (status, body) = post(
            &server,
            "/search/case",
            r#"{"case_type": "Crl.", "case_number": 45, "case_year": 2022}"#,
        )
        .await;
        assert_eq!(status, 200);
        assert_eq!(body["status"], "Listed");
    }

    #[tokio::test]
    async fn test_bad_input_is_400() {
        let server = start(listing_portal().await).await;

        let (status, _) = post(&server, "/search/cnr", "{not json").await;
        assert_eq!(status, 400);

        let (status, _) = post(&server, "/search/cnr", r#"{"date": "today"}"#).await;
        assert_eq!(status, 400);

        let (status, body) = post(&server, "/search/cnr", r#"{"cnr": "XX"}"#).await;
        assert_eq!(status, 400);
        assert_eq!(body["errorDetail"]["kind"], "InvalidIdentifier");

        let (status, _) = get(&server, "/causelist?date=yesterday").await;
        assert_eq!(status, 400);
    }

    #[tokio::test]
    async fn test_portal_outage_is_502() {
        let server = start(MockPortal::start(|_| MockResponse::status(503)).await).await;
        let (status, body) = post(&server, "/search/cnr", r#"{"cnr": "MH010012342023"}"#).await;
        assert_eq!(status, 502);
        assert_eq!(body["errorDetail"]["kind"], "NetworkFailure");
    }

    #[tokio::test]
    async fn test_causelist_endpoint() {
        let server = start(listing_portal().await).await;
        let (status, body) = get(&server, "/causelist?date=tomorrow").await;
        assert_eq!(status, 200);
        assert_eq!(body["causeListReference"]["isFullCauseList"], true);
        assert!(body.get("case").is_none());
    }

    /// Write raw bytes, half-close when asked, and read whatever comes back.
    async fn raw_exchange(server: &TestServer, request: &[u8], close_write: bool) -> String {
        let addr = server.base.trim_start_matches("http://");
        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream.write_all(request).await.unwrap();
        if close_write {
            stream.shutdown().await.unwrap();
        }
        let mut response = Vec::new();
        stream.read_to_end(&mut response).await.unwrap();
        String::from_utf8_lossy(&response).into_owned()
    }

    #[tokio::test]
    async fn test_silent_client_gets_408() {
        let server =
            start_with_read_timeout(listing_portal().await, Duration::from_millis(50)).await;

        let response = raw_exchange(&server, b"", false).await;
        assert!(response.starts_with("HTTP/1.1 408 Request Timeout"), "{}", response);

        let half_sent = b"POST /search/cnr HTTP/1.1\r\nContent-Length: 40\r\n\r\n{\"cnr\"";
        let response = raw_exchange(&server, half_sent, false).await;
        assert!(response.starts_with("HTTP/1.1 408"), "{}", response);
    }

    #[tokio::test]
    async fn test_short_and_chunked_bodies_are_400() {
        let server = start(listing_portal().await).await;

        let short = b"POST /search/cnr HTTP/1.1\r\nContent-Length: 40\r\n\r\n{\"cnr\": \"MH010012342023\"}";
        let response = raw_exchange(&server, short, true).await;
        assert!(response.starts_with("HTTP/1.1 400"), "{}", response);
        assert!(response.contains("of 40 bytes"), "{}", response);

        let chunked = b"POST /search/cnr HTTP/1.1\r\nTransfer-Encoding: chunked\r\n\r\n";
        let response = raw_exchange(&server, chunked, false).await;
        assert!(response.starts_with("HTTP/1.1 400"), "{}", response);
        assert!(response.contains("chunked"), "{}", response);
        assert_eq!(server._portal.hits(), 0);
    }

    #[tokio::test]
    async fn test_read_request_errors() {
        let mut closed: &[u8] = b"GET /health HTTP/1.1\r\n";
        assert!(matches!(read_request(&mut closed).await, Err(RequestError::Closed)));

        let mut garbage: &[u8] = b"\r\n\r\n";
        assert!(matches!(read_request(&mut garbage).await, Err(RequestError::Malformed)));

        let mut huge: &[u8] = b"POST / HTTP/1.1\r\nContent-Length: 999999\r\n\r\n";
        let err = read_request(&mut huge).await.unwrap_err();
        assert_eq!(err.status(), 413);

        let mut complete: &[u8] = b"POST /x?a=1 HTTP/1.1\r\nContent-Length: 2\r\n\r\nhi!";
        let request = read_request(&mut complete).await.unwrap();
        assert_eq!(request.route(), "/x");
        assert_eq!(request.body, "hi");
    }

    #[tokio::test]
    async fn test_unknown_routes() {
        let server = start(listing_portal().await).await;
        let (status, _) = get(&server, "/nope").await;
        assert_eq!(status, 404);
        let (status, _) = get(&server, "/search/cnr").await;
        assert_eq!(status, 405);
    }
}
