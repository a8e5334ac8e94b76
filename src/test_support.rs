// =============================================================================
// test_support.rs — A PORTAL THAT ALWAYS ANSWERS THE SAME WAY
// =============================================================================
//
// A throwaway HTTP/1.1 server on a random localhost port. Each test hands it
// either a handler closure or a fixed sequence of responses, then inspects
// what the engine actually sent. One request per connection, no keep-alive.
// =============================================================================

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

use crate::api::{read_request, HttpRequest};
use crate::config::Config;
use crate::models::ListCategory;

/// Requests the mock saw, parsed by the same reader the API server uses.
pub type RecordedRequest = HttpRequest;

impl HttpRequest {
    /// The urlencoded form body as a map.
    pub fn form(&self) -> HashMap<String, String> {
        url::form_urlencoded::parse(self.body.as_bytes())
            .into_owned()
            .collect()
    }
}

#[derive(Debug, Clone)]
pub struct MockResponse {
    pub status: u16,
    pub content_type: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl MockResponse {
    pub fn status(status: u16) -> Self {
        MockResponse {
            status,
            content_type: "text/plain".into(),
            headers: Vec::new(),
            body: format!("status {}", status).into_bytes(),
        }
    }

    pub fn html(body: &str) -> Self {
        MockResponse {
            status: 200,
            content_type: "text/html; charset=UTF-8".into(),
            headers: Vec::new(),
            body: body.as_bytes().to_vec(),
        }
    }

    pub fn json(value: serde_json::Value) -> Self {
        MockResponse {
            status: 200,
            content_type: "application/json".into(),
            headers: Vec::new(),
            body: value.to_string().into_bytes(),
        }
    }

    pub fn pdf(bytes: &[u8]) -> Self {
        MockResponse {
            status: 200,
            content_type: "application/pdf".into(),
            headers: Vec::new(),
            body: bytes.to_vec(),
        }
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }
}

type Handler = dyn Fn(&RecordedRequest) -> MockResponse + Send + Sync;

pub struct MockPortal {
    addr: SocketAddr,
    hits: Arc<AtomicUsize>,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
    task: JoinHandle<()>,
}

impl MockPortal {
    pub async fn start<F>(handler: F) -> Self
    where
        F: Fn(&RecordedRequest) -> MockResponse + Send + Sync + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind mock portal");
        let addr = listener.local_addr().expect("mock portal address");
        let hits = Arc::new(AtomicUsize::new(0));
        let requests = Arc::new(Mutex::new(Vec::new()));
        let handler: Arc<Handler> = Arc::new(handler);

        let task = {
            let hits = Arc::clone(&hits);
            let requests = Arc::clone(&requests);
            tokio::spawn(async move {
                while let Ok((stream, _)) = listener.accept().await {
                    let hits = Arc::clone(&hits);
                    let requests = Arc::clone(&requests);
                    let handler = Arc::clone(&handler);
                    tokio::spawn(async move {
                        serve_one(stream, hits, requests, handler).await;
                    });
                }
            })
        };

        MockPortal {
            addr,
            hits,
            requests,
            task,
        }
    }

    /// Answer with each response in turn, repeating the last one forever.
    pub async fn start_sequence(responses: Vec<MockResponse>) -> Self {
        let counter = AtomicUsize::new(0);
        Self::start(move |_| {
            let index = counter.fetch_add(1, Ordering::SeqCst);
            responses
                .get(index)
                .or_else(|| responses.last())
                .cloned()
                .unwrap_or_else(|| MockResponse::status(500))
        })
        .await
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url(), path)
    }

    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().expect("request log").clone()
    }
}

impl Drop for MockPortal {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Config pointed at the mock portal: no session bootstrap, one category,
/// millisecond backoff.
pub fn config_for(portal: &MockPortal) -> Config {
    let mut config = Config::default();
    config.portal_base_url = portal.base_url();
    config.request_timeout = Duration::from_secs(5);
    config.retry_base_delay = Duration::from_millis(1);
    config.retry_max_delay = Duration::from_millis(5);
    config.session_bootstrap = false;
    config.court_numbers = Vec::new();
    config.categories = vec![ListCategory::Criminal];
    config
}

async fn serve_one(
    mut stream: TcpStream,
    hits: Arc<AtomicUsize>,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
    handler: Arc<Handler>,
) {
    let Ok(request) = read_request(&mut stream).await else {
        return;
    };
    hits.fetch_add(1, Ordering::SeqCst);
    let response = (*handler)(&request);
    requests.lock().expect("request log").push(request);

    let mut head = format!(
        "HTTP/1.1 {} Mock\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n",
        response.status,
        response.content_type,
        response.body.len()
    );
    for (name, value) in &response.headers {
        head.push_str(&format!("{}: {}\r\n", name, value));
    }
    head.push_str("\r\n");

    let _ = stream.write_all(head.as_bytes()).await;
    let _ = stream.write_all(&response.body).await;
    let _ = stream.shutdown().await;
}
