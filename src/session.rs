// =============================================================================
// session.rs — THE COOKIE AND THE TOKEN
// =============================================================================
//
// The portal wants two things before it will tell anyone what is listed
// today: the session cookie it set on the landing page, and the hidden
// `app_token` input that page carried. Without them the cause list endpoint
// answers with a polite error page and a 200.
//
// A session belongs to exactly one resolution request. It is opened at the
// start of the pipeline, passed down by reference, and dropped at the end.
// Two concurrent requests never see each other's cookies.
// =============================================================================

use std::sync::LazyLock;

use reqwest::header::COOKIE;
use scraper::{Html, Selector};
use tracing::{debug, info};

use crate::config::Config;
use crate::error::{EngineError, Stage};
use crate::retry::send_with_retry;

static TOKEN_INPUT: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse(r#"input[name="app_token"]"#).expect("valid token selector")
});

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PortalSession {
    /// `name=value` pairs, in the order the portal set them.
    cookies: Vec<(String, String)>,
    token: Option<String>,
}

impl PortalSession {
    /// A session with no cookies and no token. Used when bootstrap is off.
    pub fn anonymous() -> Self {
        Self::default()
    }

    /// GET the landing page and keep whatever it hands out.
    pub async fn open(client: &reqwest::Client, config: &Config) -> Result<Self, EngineError> {
        if !config.session_bootstrap {
            debug!("session bootstrap disabled, continuing without cookies");
            return Ok(Self::anonymous());
        }

        let url = config.url(&config.landing_path);
        let response = send_with_retry(&config.retry_policy(), "landing", || client.get(&url))
            .await
            .map_err(|e| EngineError::NetworkFailure {
                stage: Stage::Fetching,
                attempts: e.attempts,
                condition: e.condition,
            })?;

        let html = String::from_utf8_lossy(&response.body);
        let session = Self::from_landing(&response.set_cookies, &html);
        info!(
            url = url.as_str(),
            cookies = session.cookies.len(),
            token = session.token.is_some(),
            "portal session opened"
        );
        Ok(session)
    }

    /// Build a session from raw `Set-Cookie` values and the landing HTML.
    pub fn from_landing(set_cookies: &[String], html: &str) -> Self {
        let mut session = Self::anonymous();
        for raw in set_cookies {
            session.absorb_cookie(raw);
        }

        let document = Html::parse_document(html);
        session.token = document
            .select(&TOKEN_INPUT)
            .filter_map(|input| input.value().attr("value"))
            .map(str::trim)
            .find(|v| !v.is_empty())
            .map(str::to_string);

        session
    }

    /// Later cookies with the same name replace earlier ones.
    fn absorb_cookie(&mut self, raw: &str) {
        let Some(pair) = raw.split(';').next() else {
            return;
        };
        let Some((name, value)) = pair.split_once('=') else {
            return;
        };
        let name = name.trim();
        if name.is_empty() {
            return;
        }
        let value = value.trim().to_string();
        match self.cookies.iter_mut().find(|(n, _)| n == name) {
            Some(existing) => existing.1 = value,
            None => self.cookies.push((name.to_string(), value)),
        }
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    /// `a=1; b=2`, or None when the portal set nothing.
    pub fn cookie_header(&self) -> Option<String> {
        if self.cookies.is_empty() {
            return None;
        }
        Some(
            self.cookies
                .iter()
                .map(|(n, v)| format!("{}={}", n, v))
                .collect::<Vec<_>>()
                .join("; "),
        )
    }

    /// Attach the session cookie to an outgoing request.
    pub fn apply(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.cookie_header() {
            Some(header) => request.header(COOKIE, header),
            None => request,
        }
    }
}
