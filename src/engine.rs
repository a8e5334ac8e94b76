// =============================================================================
// engine.rs — ONE REQUEST, ONE PIPELINE
// =============================================================================
//
//   Normalizing ─▶ Fetching ─▶ Parsing ─▶ Matching ─▶ (Retrieving) ─▶ Assembled
//        │             │           │           │             │
//        └─────────────┴───────────┴───────────┴─────────────┴──▶ Failed
//
// Every request gets its own session, its own request id and its own span.
// The only thing two requests share is the reqwest connection pool. No
// listing is cached, so asking twice asks the portal twice.
//
// Whatever goes wrong, `resolve` returns a `Resolution`. Failures are
// reports with status `Error`, never panics and never a process exit.
// =============================================================================

use std::sync::Arc;

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, info_span, warn, Instrument, Span};
use uuid::Uuid;

use crate::assembler::{assemble, assemble_failure};
use crate::config::Config;
use crate::error::{EngineError, ParseFailure, Stage};
use crate::fetcher::ListingFetcher;
use crate::matcher::match_case;
use crate::models::{
    CaseIdentifier, DaySelector, DocumentOutcome, Listing, ListingQuery, MatchResult,
    RawIdentifier, RawPayload, ResolutionReport, RetrievedDocument,
};
use crate::normalizer::normalize;
use crate::parser::{ListingParser, PdfTextLayer, PopplerTextLayer};
use crate::retriever::DocumentRetriever;
use crate::session::PortalSession;

/// What the caller wants to know.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolveRequest {
    pub identifier: RawIdentifier,
    #[serde(default)]
    pub day: DaySelector,
    /// Also fetch the full day's cause list PDF.
    #[serde(default)]
    pub cause_list: bool,
    /// Also fetch the case PDF when the case is listed.
    #[serde(default)]
    pub want_case_pdf: bool,
}

impl ResolveRequest {
    pub fn new(identifier: RawIdentifier, day: DaySelector) -> Self {
        ResolveRequest {
            identifier,
            day,
            cause_list: false,
            want_case_pdf: false,
        }
    }
}

/// The report plus whatever documents came back with it.
#[derive(Debug, Clone)]
pub struct Resolution {
    pub report: ResolutionReport,
    pub documents: Vec<RetrievedDocument>,
}

impl Resolution {
    fn failed(target: Option<&CaseIdentifier>, date: Option<NaiveDate>, error: EngineError) -> Self {
        warn!(
            kind = error.kind(),
            stage = %error.stage(),
            error = %error,
            "resolution failed"
        );
        Resolution {
            report: assemble_failure(target, date, &error),
            documents: Vec::new(),
        }
    }

    /// Stable kind of the failure, if this resolution failed.
    pub fn error_kind(&self) -> Option<&str> {
        self.report.error_detail.as_ref().map(|d| d.kind.as_str())
    }
}

pub struct Engine {
    config: Arc<Config>,
    client: reqwest::Client,
    pdf: Arc<dyn PdfTextLayer>,
}

impl Engine {
    pub fn new(config: Config) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .user_agent(config.user_agent.as_str())
            .build()?;
        let pdf = Arc::new(PopplerTextLayer::new(config.pdftotext_bin.as_str()));
        Ok(Engine {
            config: Arc::new(config),
            client,
            pdf,
        })
    }

    /// Swap the PDF text extractor.
    pub fn with_pdf_layer(mut self, pdf: Arc<dyn PdfTextLayer>) -> Self {
        self.pdf = pdf;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub async fn resolve(&self, request: &ResolveRequest) -> Resolution {
        self.resolve_at(request, Utc::now()).await
    }

    /// Resolve against an explicit clock. "Today" is today on the portal's
    /// wall clock at `now`.
    pub async fn resolve_at(&self, request: &ResolveRequest, now: DateTime<Utc>) -> Resolution {
        let request_id = Uuid::new_v4();
        let span = info_span!("resolve", %request_id, day = %request.day);
        self.pipeline(request, now).instrument(span).await
    }

    /// Independent requests, run concurrently. Results come back in request
    /// order.
    pub async fn resolve_many(&self, requests: &[ResolveRequest]) -> Vec<Resolution> {
        join_all(requests.iter().map(|r| self.resolve(r))).await
    }

    /// Just the full cause list for a day, no case involved.
    pub async fn cause_list(&self, day: DaySelector) -> Resolution {
        self.cause_list_at(day, Utc::now()).await
    }

    pub async fn cause_list_at(&self, day: DaySelector, now: DateTime<Utc>) -> Resolution {
        let request_id = Uuid::new_v4();
        let span = info_span!("cause_list", %request_id, day = %day);
        async {
            let query = self.query_for(day, now);
            let date = query.date();
            info!(stage = %Stage::Retrieving, date = %date, "fetching full cause list");

            let outcome = match self.full_cause_list(&query).await {
                Ok(outcome) => outcome,
                Err(e) => return Resolution::failed(None, Some(date), e),
            };
            let (report, documents) = assemble(None, date, MatchResult::NotListed, vec![outcome]);
            info!(
                stage = %Stage::Assembled,
                documents = documents.len(),
                "cause list request complete"
            );
            Resolution { report, documents }
        }
        .instrument(span)
        .await
    }

    async fn pipeline(&self, request: &ResolveRequest, now: DateTime<Utc>) -> Resolution {
        let query = self.query_for(request.day, now);
        let date = query.date();
        let current_year = now.with_timezone(&self.config.portal_offset()).year();

        info!(stage = %Stage::Normalizing, date = %date, "resolution started");
        let target = match normalize(&request.identifier, current_year) {
            Ok(target) => target,
            Err(e) => return Resolution::failed(None, Some(date), e),
        };

        match self.run(&target, &query, current_year, request).await {
            Ok(resolution) => resolution,
            Err(e) => Resolution::failed(Some(&target), Some(date), e),
        }
    }

    /// Parsing can shell out to pdftotext, so it runs on the blocking pool
    /// instead of a runtime worker.
    async fn parse(
        &self,
        payloads: Vec<RawPayload>,
        current_year: i32,
    ) -> Result<Listing, EngineError> {
        let pdf = Arc::clone(&self.pdf);
        let span = Span::current();
        tokio::task::spawn_blocking(move || {
            span.in_scope(|| ListingParser::new(pdf.as_ref(), current_year).parse(&payloads))
        })
        .await
        .map_err(|e| {
            EngineError::from(ParseFailure::PdfText(format!("parser task failed: {}", e)))
        })?
    }

    async fn run(
        &self,
        target: &CaseIdentifier,
        query: &ListingQuery,
        current_year: i32,
        request: &ResolveRequest,
    ) -> Result<Resolution, EngineError> {
        info!(stage = %Stage::Fetching, case = %target, "fetching cause list");
        let session = PortalSession::open(&self.client, &self.config).await?;
        let payloads = ListingFetcher::new(&self.client, &self.config, &session)
            .fetch(query)
            .await?;

        info!(stage = %Stage::Parsing, payloads = payloads.len(), "parsing cause list");
        let listing = self.parse(payloads, current_year).await?;

        info!(stage = %Stage::Matching, rows = listing.len(), "matching case");
        let result = match_case(target, &listing.rows, current_year);

        let mut outcomes = Vec::new();
        if request.want_case_pdf || request.cause_list {
            info!(stage = %Stage::Retrieving, "retrieving documents");
            let retriever = DocumentRetriever::new(&self.client, &self.config, &session);
            if request.want_case_pdf {
                match &result {
                    MatchResult::Listed { row, .. } => {
                        outcomes.push(retriever.case_pdf(target, row, query.date()).await?);
                    }
                    _ => debug!("case not uniquely listed, skipping case PDF"),
                }
            }
            if request.cause_list {
                outcomes.push(retriever.full_cause_list(query).await?);
            }
        }

        let (report, documents) = assemble(Some(target), query.date(), result, outcomes);
        info!(
            stage = %Stage::Assembled,
            status = %report.status,
            serial = report.serial_number,
            court = report.court_name.as_deref(),
            documents = documents.len(),
            "resolution complete"
        );
        Ok(Resolution { report, documents })
    }

    async fn full_cause_list(&self, query: &ListingQuery) -> Result<DocumentOutcome, EngineError> {
        let session = PortalSession::open(&self.client, &self.config).await?;
        DocumentRetriever::new(&self.client, &self.config, &session)
            .full_cause_list(query)
            .await
    }

    fn query_for(&self, day: DaySelector, now: DateTime<Utc>) -> ListingQuery {
        ListingQuery::for_day(day, now, self.config.portal_offset(), self.config.scope())
    }
}
