// =============================================================================
// config.rs — WHERE THE PORTAL LIVES AND HOW POLITELY WE ASK IT THINGS
// =============================================================================
//
// The eCourts portal has moved URLs more than once, renamed its form fields
// at least twice, and serves a different court complex to every district.
// None of that belongs in code. Everything here can be overridden with a
// CAUSELIST_* environment variable (or a .env file next to the binary).
//
// Defaults work out of the box against the public portal with a sample
// court complex, which is enough to see the pipeline do something.
// =============================================================================

use chrono::{FixedOffset, Offset, Utc};
use std::env;
use url::Url;
use std::path::PathBuf;
use std::time::Duration;

use crate::models::{JurisdictionScope, ListCategory};
use crate::retry::RetryPolicy;

#[derive(Debug, Clone)]
pub struct Config {
    // =========================================================================
    // PORTAL ENDPOINTS
    // Paths are joined onto the base URL, so pointing the whole engine at a
    // mirror (or a test server) is one variable.
    // =========================================================================

    /// Default: https://services.ecourts.gov.in/ecourtindia_v6
    pub portal_base_url: String,

    /// Fetched once per request to pick up cookies and the form token.
    pub landing_path: String,

    /// The cause list search form posts here.
    pub cause_list_path: String,

    /// Full-day cause list as a PDF.
    pub cause_list_pdf_path: String,

    /// Single-case document, used when a listing row has no link of its own.
    pub case_document_path: String,

    pub user_agent: String,

    // =========================================================================
    // NETWORK BEHAVIOUR
    // =========================================================================

    /// Per-attempt timeout. Default: 30 seconds.
    pub request_timeout: Duration,

    /// Total attempts per upstream call, first try included. Default: 3.
    pub max_attempts: u32,

    /// First backoff delay; doubles every retry. Default: 1 second.
    pub retry_base_delay: Duration,

    /// Backoff never waits longer than this. Default: 8 seconds.
    pub retry_max_delay: Duration,

    /// GET the landing page before querying. Turn off for mirrors that
    /// don't hand out tokens.
    pub session_bootstrap: bool,

    // =========================================================================
    // PORTAL CALENDAR
    // "Today" is a date in the portal's timezone, not the server's.
    // =========================================================================

    /// Minutes east of UTC. Default: 330 (IST).
    pub portal_utc_offset_minutes: i32,

    // =========================================================================
    // JURISDICTION SCOPE
    // =========================================================================

    pub state_code: String,
    pub district_code: String,
    pub court_complex_code: String,
    pub establishment_code: Option<String>,
    /// Comma separated. Empty means "the whole complex in one request".
    pub court_numbers: Vec<String>,
    /// Comma separated list of civ/cri. Default: both.
    pub categories: Vec<ListCategory>,

    // =========================================================================
    // PDF, OUTPUT, API
    // =========================================================================

    /// Poppler's pdftotext. Default: whatever is on PATH.
    pub pdftotext_bin: String,

    /// Where the CLI writes reports and documents. Default: ./output
    pub output_dir: PathBuf,

    pub api_host: String,
    /// Default: 5000
    pub api_port: u16,

    /// How long a client gets to send its whole request. Default: 10 seconds.
    pub api_read_timeout: Duration,

    /// Emit JSON log lines instead of the human format.
    pub log_json: bool,
}

impl Config {
    /// Load configuration from the environment, reading `.env` first if one
    /// is lying around.
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build a config from any key lookup. `from_env` uses the process
    /// environment; tests hand in a map.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str, default: &str| env_or_default(&lookup, key, default);

        Config {
            portal_base_url: get(
                "CAUSELIST_PORTAL_BASE_URL",
                "https://services.ecourts.gov.in/ecourtindia_v6",
            )
            .trim_end_matches('/')
            .to_string(),
            landing_path: get("CAUSELIST_LANDING_PATH", "/"),
            cause_list_path: get("CAUSELIST_CAUSE_LIST_PATH", "/?p=cause_list/submitCauseList"),
            cause_list_pdf_path: get(
                "CAUSELIST_CAUSE_LIST_PDF_PATH",
                "/?p=cause_list/causeListPdf",
            ),
            case_document_path: get("CAUSELIST_CASE_DOCUMENT_PATH", "/?p=home/display_pdf"),
            user_agent: get(
                "CAUSELIST_USER_AGENT",
                concat!("causelist-engine/", env!("CARGO_PKG_VERSION")),
            ),

            request_timeout: Duration::from_secs(
                get("CAUSELIST_REQUEST_TIMEOUT_SECS", "30").parse().unwrap_or(30),
            ),
            max_attempts: get("CAUSELIST_MAX_ATTEMPTS", "3")
                .parse()
                .unwrap_or(3u32)
                .max(1),
            retry_base_delay: Duration::from_millis(
                get("CAUSELIST_RETRY_BASE_DELAY_MS", "1000").parse().unwrap_or(1000),
            ),
            retry_max_delay: Duration::from_millis(
                get("CAUSELIST_RETRY_MAX_DELAY_MS", "8000").parse().unwrap_or(8000),
            ),
            session_bootstrap: parse_flag(&get("CAUSELIST_SESSION_BOOTSTRAP", "true"), true),

            portal_utc_offset_minutes: get("CAUSELIST_PORTAL_UTC_OFFSET_MINUTES", "330")
                .parse()
                .unwrap_or(330),

            state_code: get("CAUSELIST_STATE_CODE", "1"),
            district_code: get("CAUSELIST_DISTRICT_CODE", "1"),
            court_complex_code: get("CAUSELIST_COURT_COMPLEX_CODE", "1010001"),
            establishment_code: lookup("CAUSELIST_ESTABLISHMENT_CODE")
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty()),
            court_numbers: split_list(&get("CAUSELIST_COURT_NUMBERS", "")),
            categories: parse_categories(&get("CAUSELIST_CATEGORIES", "civ,cri")),

            pdftotext_bin: get("CAUSELIST_PDFTOTEXT_BIN", "pdftotext"),
            output_dir: PathBuf::from(get("CAUSELIST_OUTPUT_DIR", "output")),
            api_host: get("CAUSELIST_API_HOST", "0.0.0.0"),
            api_port: get("CAUSELIST_API_PORT", "5000").parse().unwrap_or(5000),
            api_read_timeout: Duration::from_secs(
                get("CAUSELIST_API_READ_TIMEOUT_SECS", "10").parse().unwrap_or(10),
            ),
            log_json: parse_flag(&get("CAUSELIST_LOG_JSON", "false"), false),
        }
    }

    /// Absolute URL for a configured path. Paths that are already absolute
    /// URLs are used as-is.
    pub fn url(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            return path.to_string();
        }
        if path.is_empty() {
            return self.portal_base_url.clone();
        }
        if path.starts_with('/') {
            format!("{}{}", self.portal_base_url, path)
        } else {
            format!("{}/{}", self.portal_base_url, path)
        }
    }

    /// Whether `url` points at the portal itself: same scheme, host and port
    /// as the base URL. Session cookies go nowhere else.
    pub fn is_portal_url(&self, url: &str) -> bool {
        let (Ok(portal), Ok(target)) = (Url::parse(&self.portal_base_url), Url::parse(url)) else {
            return false;
        };
        portal.scheme() == target.scheme()
            && portal.host_str() == target.host_str()
            && portal.port_or_known_default() == target.port_or_known_default()
    }

    /// The portal's fixed UTC offset. An out-of-range setting falls back to
    /// UTC rather than refusing to start.
    pub fn portal_offset(&self) -> FixedOffset {
        self.portal_utc_offset_minutes
            .checked_mul(60)
            .and_then(FixedOffset::east_opt)
            .unwrap_or_else(|| Utc.fix())
    }

    pub fn scope(&self) -> JurisdictionScope {
        JurisdictionScope {
            state_code: self.state_code.clone(),
            district_code: self.district_code.clone(),
            court_complex_code: self.court_complex_code.clone(),
            establishment_code: self.establishment_code.clone(),
            court_numbers: self.court_numbers.clone(),
            categories: self.categories.clone(),
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            base_delay: self.retry_base_delay,
            max_delay: self.retry_max_delay,
        }
    }

    pub fn api_addr(&self) -> String {
        format!("{}:{}", self.api_host, self.api_port)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::from_lookup(|_| None)
    }
}

/// Read a key with a default fallback. Blank values count as unset.
fn env_or_default<F>(lookup: &F, key: &str, default: &str) -> String
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn parse_flag(value: &str, default: bool) -> bool {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => true,
        "0" | "false" | "no" | "off" => false,
        _ => default,
    }
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .collect()
}

/// Unknown category names are dropped. An empty result means both lists.
fn parse_categories(value: &str) -> Vec<ListCategory> {
    let mut categories: Vec<ListCategory> = Vec::new();
    for name in split_list(value) {
        if let Ok(category) = name.parse::<ListCategory>() {
            if !categories.contains(&category) {
                categories.push(category);
            }
        }
    }
    if categories.is_empty() {
        vec![ListCategory::Civil, ListCategory::Criminal]
    } else {
        categories
    }
}
