// =============================================================================
// retriever.rs — THE PAPERWORK
// =============================================================================
//
// Once we know where a case is listed, the user may also want the paper: the
// case PDF, or the whole day's cause list. The portal has these for some
// cases and not for others. A missing document is an ordinary outcome and
// goes in the report as such. Only a portal we cannot reach is a failure.
//
// We never make up a document. If the bytes that come back don't start like
// a PDF, there is no document.
// =============================================================================

use chrono::NaiveDate;
use tracing::{debug, info, warn};
use url::Url;

use crate::config::Config;
use crate::error::{EngineError, FetchCondition};
use crate::fetcher::has_pdf_signature;
use crate::models::{
    CaseIdentifier, DocumentKind, DocumentOutcome, ListingQuery, ListingRow, RetrievedDocument,
    PORTAL_DATE_FORMAT,
};
use crate::retry::send_with_retry;
use crate::session::PortalSession;

pub struct DocumentRetriever<'a> {
    client: &'a reqwest::Client,
    config: &'a Config,
    session: &'a PortalSession,
}

impl<'a> DocumentRetriever<'a> {
    pub fn new(client: &'a reqwest::Client, config: &'a Config, session: &'a PortalSession) -> Self {
        DocumentRetriever {
            client,
            config,
            session,
        }
    }

    /// The single-case PDF for a matched row. The row's own link wins;
    /// otherwise the URL is derived from the case document endpoint.
    pub async fn case_pdf(
        &self,
        target: &CaseIdentifier,
        row: &ListingRow,
        date: NaiveDate,
    ) -> Result<DocumentOutcome, EngineError> {
        let url = match row.document_url.as_deref() {
            Some(link) => link.to_string(),
            None => self.case_document_url(target, date)?,
        };
        self.download(&url, DocumentKind::CasePdf).await
    }

    /// The full cause list for the query's complex and date.
    pub async fn full_cause_list(&self, query: &ListingQuery) -> Result<DocumentOutcome, EngineError> {
        let scope = query.scope();
        let mut params = vec![
            ("state_code", scope.state_code.clone()),
            ("dist_code", scope.district_code.clone()),
            ("court_complex_code", scope.court_complex_code.clone()),
            ("causelist_date", query.portal_date()),
        ];
        if let Some(est) = &scope.establishment_code {
            params.push(("est_code", est.clone()));
        }
        let url = self.endpoint(&self.config.cause_list_pdf_path, &params)?;
        self.download(&url, DocumentKind::FullCauseList).await
    }

    fn case_document_url(&self, target: &CaseIdentifier, date: NaiveDate) -> Result<String, EngineError> {
        let mut params = match target {
            CaseIdentifier::Cnr { cnr } => vec![("cino", cnr.to_string())],
            CaseIdentifier::Case(case) => vec![
                ("case_type", case.case_type.clone()),
                ("case_no", case.number.to_string()),
                ("case_year", case.year.to_string()),
            ],
        };
        params.push(("state_code", self.config.state_code.clone()));
        params.push(("dist_code", self.config.district_code.clone()));
        params.push(("court_complex_code", self.config.court_complex_code.clone()));
        params.push(("causelist_date", date.format(PORTAL_DATE_FORMAT).to_string()));
        self.endpoint(&self.config.case_document_path, &params)
    }

    fn endpoint(&self, path: &str, params: &[(&str, String)]) -> Result<String, EngineError> {
        let base = self.config.url(path);
        Url::parse_with_params(&base, params)
            .map(|u| u.to_string())
            .map_err(|e| EngineError::RetrievalFailed {
                attempts: 0,
                condition: FetchCondition::Unavailable(format!("bad document URL {}: {}", base, e)),
            })
    }

    async fn download(&self, url: &str, kind: DocumentKind) -> Result<DocumentOutcome, EngineError> {
        let on_portal = self.config.is_portal_url(url);
        if !on_portal {
            debug!(url, kind = %kind, "document link is off the portal, sending no session cookies");
        }
        let result = send_with_retry(&self.config.retry_policy(), "document", || {
            let request = self.client.get(url);
            if on_portal {
                self.session.apply(request)
            } else {
                request
            }
        })
        .await;

        let response = match result {
            Ok(response) => response,
            Err(e) => {
                return match e.condition {
                    FetchCondition::HttpStatus(code @ (404 | 410)) => {
                        Ok(unavailable(url, kind, format!("portal has no {} (HTTP {})", kind, code)))
                    }
                    FetchCondition::EmptyBody => {
                        Ok(unavailable(url, kind, format!("portal returned an empty {}", kind)))
                    }
                    condition => Err(EngineError::RetrievalFailed {
                        attempts: e.attempts,
                        condition,
                    }),
                };
            }
        };

        if !has_pdf_signature(&response.body) {
            let declared = response.content_type.as_deref().unwrap_or("no content type");
            return Ok(unavailable(
                url,
                kind,
                format!("portal answered with {} instead of a PDF", declared),
            ));
        }

        info!(
            url = response.url.as_str(),
            kind = %kind,
            bytes = response.body.len(),
            "document retrieved"
        );
        Ok(DocumentOutcome::Retrieved(RetrievedDocument {
            content_type: response
                .content_type
                .unwrap_or_else(|| "application/pdf".to_string()),
            source_url: response.url,
            bytes: response.body,
            kind,
        }))
    }
}

fn unavailable(url: &str, kind: DocumentKind, reason: String) -> DocumentOutcome {
    warn!(url, kind = %kind, reason = reason.as_str(), "document unavailable");
    DocumentOutcome::Unavailable { kind, reason }
}
