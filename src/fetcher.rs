// =============================================================================
// fetcher.rs — ASKING THE PORTAL WHAT IS ON TODAY
// =============================================================================
//
// The cause list form wants one court room and one category at a time, so
// a complex with four court rooms and both civil and criminal lists costs
// eight POSTs. They go out one after another. A single resolution request is
// a sequential pipeline and the portal does not reward impatience.
//
// What comes back is whatever the portal felt like sending:
//
//   - an HTML fragment with a table in it
//   - a JSON object with that same HTML fragment tucked inside a field
//   - a PDF, on days when the district uploads scans instead
//
// This module does not try to read any of it. It labels the payload and
// hands it to the parser.
// =============================================================================

use tracing::{debug, info};

use crate::config::Config;
use crate::error::{EngineError, Stage};
use crate::models::{ListCategory, ListingQuery, PayloadBody, RawPayload};
use crate::retry::send_with_retry;
use crate::session::PortalSession;

/// Only the start of the body is sniffed for the PDF signature.
const PDF_SNIFF_WINDOW: usize = 1024;

pub struct ListingFetcher<'a> {
    client: &'a reqwest::Client,
    config: &'a Config,
    session: &'a PortalSession,
}

impl<'a> ListingFetcher<'a> {
    pub fn new(client: &'a reqwest::Client, config: &'a Config, session: &'a PortalSession) -> Self {
        ListingFetcher {
            client,
            config,
            session,
        }
    }

    /// Fetch every listing payload the query covers, in court-then-category
    /// order. The first request that fails for good fails the whole fetch.
    pub async fn fetch(&self, query: &ListingQuery) -> Result<Vec<RawPayload>, EngineError> {
        let url = self.config.url(&self.config.cause_list_path);
        let plan = request_plan(query);
        let policy = self.config.retry_policy();
        let mut payloads = Vec::with_capacity(plan.len());

        for (court_number, category) in plan {
            let fields = self.form_fields(query, court_number.as_deref(), category);
            debug!(
                url = url.as_str(),
                court = court_number.as_deref().unwrap_or("all"),
                category = category.form_value(),
                date = query.portal_date().as_str(),
                "requesting cause list"
            );

            let response = send_with_retry(&policy, "cause_list", || {
                self.session
                    .apply(self.client.post(&url))
                    .header("X-Requested-With", "XMLHttpRequest")
                    .form(&fields)
            })
            .await
            .map_err(|e| EngineError::NetworkFailure {
                stage: Stage::Fetching,
                attempts: e.attempts,
                condition: e.condition,
            })?;

            let body = classify_payload(response.body, response.content_type.as_deref());
            info!(
                court = court_number.as_deref().unwrap_or("all"),
                category = category.form_value(),
                kind = body.kind_name(),
                status = response.status,
                "cause list payload received"
            );

            payloads.push(RawPayload {
                body,
                source_url: response.url,
                status: response.status,
                content_type: response.content_type,
                court_hint: court_number.as_deref().map(court_hint),
            });
        }

        Ok(payloads)
    }

    fn form_fields(
        &self,
        query: &ListingQuery,
        court_number: Option<&str>,
        category: ListCategory,
    ) -> Vec<(&'static str, String)> {
        let scope = query.scope();
        let mut fields = vec![
            ("state_code", scope.state_code.clone()),
            ("dist_code", scope.district_code.clone()),
            ("court_complex_code", scope.court_complex_code.clone()),
            (
                "est_code",
                scope.establishment_code.clone().unwrap_or_default(),
            ),
            ("CL_court_no", court_number.unwrap_or_default().to_string()),
            ("causelist_date", query.portal_date()),
            ("cicri", category.form_value().to_string()),
            ("selprevdays", "0".to_string()),
            ("ajax_req", "true".to_string()),
        ];
        if let Some(token) = self.session.token() {
            fields.push(("app_token", token.to_string()));
        }
        fields
    }
}

/// One entry per (court number, category). No court numbers means a single
/// complex-wide request per category.
fn request_plan(query: &ListingQuery) -> Vec<(Option<String>, ListCategory)> {
    let scope = query.scope();
    let categories: Vec<ListCategory> = if scope.categories.is_empty() {
        vec![ListCategory::Civil, ListCategory::Criminal]
    } else {
        scope.categories.clone()
    };

    if scope.court_numbers.is_empty() {
        return categories.into_iter().map(|c| (None, c)).collect();
    }

    scope
        .court_numbers
        .iter()
        .flat_map(|court| categories.iter().map(move |c| (Some(court.clone()), *c)))
        .collect()
}

fn court_hint(court_number: &str) -> String {
    format!("Court {}", court_number)
}

/// Label a body for the parser. A PDF signature or a PDF content type makes
/// it a PDF; then a body that parses as a JSON object is an envelope, whatever
/// the header says; everything else is treated as HTML.
pub fn classify_payload(body: Vec<u8>, content_type: Option<&str>) -> PayloadBody {
    let declared_pdf = content_type
        .map(|ct| ct.to_ascii_lowercase().contains("application/pdf"))
        .unwrap_or(false);
    if declared_pdf || has_pdf_signature(&body) {
        return PayloadBody::Pdf(body);
    }

    let text = String::from_utf8_lossy(&body).into_owned();
    if text.trim_start().starts_with('{') {
        if let Ok(serde_json::Value::Object(_)) = serde_json::from_str::<serde_json::Value>(&text) {
            return PayloadBody::JsonEnvelope(text);
        }
    }
    PayloadBody::Html(text)
}

/// `%PDF` somewhere in the first KiB. Some servers prepend whitespace or a
/// BOM, so the signature is not required at offset zero.
pub fn has_pdf_signature(body: &[u8]) -> bool {
    let window = &body[..body.len().min(PDF_SNIFF_WINDOW)];
    memchr::memmem::find(window, b"%PDF").is_some()
}
