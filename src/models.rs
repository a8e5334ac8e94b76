// =============================================================================
// models.rs — THE NOUNS OF THE CAUSE LIST
// =============================================================================
//
// Everything the pipeline passes from one stage to the next lives here. Each
// stage takes one of these by value and gives back a new one. Nothing in here
// is shared between requests, and nothing in here survives past the request
// that created it. Yesterday's cause list is yesterday's problem.
// =============================================================================

use chrono::{DateTime, Datelike, Duration as ChronoDuration, FixedOffset, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{EngineError, IdentifierField};

/// Date format the portal uses in forms and file names.
pub const PORTAL_DATE_FORMAT: &str = "%d-%m-%Y";

// =============================================================================
// Identifiers
// =============================================================================

/// A validated, canonical CNR: uppercase, no separators, 14 or 16 chars.
/// Deserializing goes through the same validation as user input.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct Cnr(String);

impl Cnr {
    /// Only the normalizer builds these; it has already checked the shape.
    pub(crate) fn new_unchecked(canonical: String) -> Self {
        Cnr(canonical)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Two-letter state code the CNR starts with.
    pub fn state_code(&self) -> &str {
        &self.0[..2]
    }

    /// Filing year, the trailing four digits.
    pub fn filing_year(&self) -> u16 {
        self.0[self.0.len() - 4..].parse().unwrap_or(0)
    }
}

impl TryFrom<String> for Cnr {
    type Error = EngineError;

    fn try_from(raw: String) -> Result<Self, Self::Error> {
        crate::normalizer::normalize_cnr(&raw, Utc::now().year())
    }
}

impl From<Cnr> for String {
    fn from(cnr: Cnr) -> Self {
        cnr.0
    }
}

impl fmt::Display for Cnr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Canonical case-type/number/year triple. Built only by the normalizer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct CaseNumber {
    /// Uppercase, alphanumerics only: "Crl. A." becomes "CRLA".
    pub case_type: String,
    pub number: u64,
    pub year: u16,
}

impl fmt::Display for CaseNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.case_type, self.number, self.year)
    }
}

/// The case being looked for. Exactly one representation, by construction.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "form", rename_all = "snake_case")]
pub enum CaseIdentifier {
    Cnr { cnr: Cnr },
    Case(CaseNumber),
}

impl CaseIdentifier {
    /// Comparable key; equal keys mean the same case as far as we can tell.
    pub fn canonical_key(&self) -> String {
        match self {
            CaseIdentifier::Cnr { cnr } => format!("CNR:{}", cnr),
            CaseIdentifier::Case(case) => format!("CASE:{}", case),
        }
    }

    /// Filesystem-friendly rendering, used by the output writer.
    pub fn file_stem(&self) -> String {
        match self {
            CaseIdentifier::Cnr { cnr } => cnr.to_string(),
            CaseIdentifier::Case(case) => {
                format!("{}_{}_{}", case.case_type, case.number, case.year)
            }
        }
    }
}

impl fmt::Display for CaseIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CaseIdentifier::Cnr { cnr } => write!(f, "{}", cnr),
            CaseIdentifier::Case(case) => write!(f, "{}", case),
        }
    }
}

/// What the user typed, before anyone has checked it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawIdentifier {
    Cnr {
        cnr: String,
    },
    Case {
        case_type: String,
        case_number: String,
        case_year: String,
    },
}

impl RawIdentifier {
    /// Build from optional CLI/API fields. Either a CNR or all three case
    /// fields, never both and never neither.
    pub fn from_parts(
        cnr: Option<String>,
        case_type: Option<String>,
        case_number: Option<String>,
        case_year: Option<String>,
    ) -> Result<Self, EngineError> {
        let any_case_field = case_type.is_some() || case_number.is_some() || case_year.is_some();
        match (cnr, any_case_field) {
            (Some(_), true) => Err(EngineError::invalid(
                IdentifierField::Identifier,
                "give either a CNR or case type/number/year, not both",
            )),
            (Some(cnr), false) => Ok(RawIdentifier::Cnr { cnr }),
            (None, true) => Ok(RawIdentifier::Case {
                case_type: case_type.unwrap_or_default(),
                case_number: case_number.unwrap_or_default(),
                case_year: case_year.unwrap_or_default(),
            }),
            (None, false) => Err(EngineError::invalid(
                IdentifierField::Identifier,
                "a CNR or case type/number/year is required",
            )),
        }
    }
}

// =============================================================================
// Queries
// =============================================================================

/// Which day's list to look at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DaySelector {
    #[default]
    Today,
    Tomorrow,
}

impl DaySelector {
    /// The calendar date this selector means on the portal's wall clock.
    pub fn resolve(self, now: DateTime<Utc>, portal_offset: FixedOffset) -> NaiveDate {
        let today = now.with_timezone(&portal_offset).date_naive();
        match self {
            DaySelector::Today => today,
            DaySelector::Tomorrow => today + ChronoDuration::days(1),
        }
    }
}

impl FromStr for DaySelector {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "today" => Ok(DaySelector::Today),
            "tomorrow" => Ok(DaySelector::Tomorrow),
            other => Err(format!("unknown day '{}', expected today or tomorrow", other)),
        }
    }
}

impl fmt::Display for DaySelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DaySelector::Today => write!(f, "today"),
            DaySelector::Tomorrow => write!(f, "tomorrow"),
        }
    }
}

/// The portal publishes civil and criminal lists separately.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ListCategory {
    Civil,
    Criminal,
}

impl ListCategory {
    /// Value of the portal's `cicri` form field.
    pub fn form_value(self) -> &'static str {
        match self {
            ListCategory::Civil => "civ",
            ListCategory::Criminal => "cri",
        }
    }
}

impl FromStr for ListCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "civ" | "civil" => Ok(ListCategory::Civil),
            "cri" | "criminal" => Ok(ListCategory::Criminal),
            other => Err(format!("unknown list category '{}'", other)),
        }
    }
}

/// The court complex/bench codes that pick which listing endpoint to ask.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JurisdictionScope {
    pub state_code: String,
    pub district_code: String,
    pub court_complex_code: String,
    pub establishment_code: Option<String>,
    /// Court rooms to query. Empty means the whole complex in one go.
    pub court_numbers: Vec<String>,
    pub categories: Vec<ListCategory>,
}

/// One day, one jurisdiction. Fields are private so nobody edits a query
/// halfway through a pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ListingQuery {
    date: NaiveDate,
    scope: JurisdictionScope,
}

impl ListingQuery {
    pub fn new(date: NaiveDate, scope: JurisdictionScope) -> Self {
        Self { date, scope }
    }

    pub fn for_day(
        day: DaySelector,
        now: DateTime<Utc>,
        portal_offset: FixedOffset,
        scope: JurisdictionScope,
    ) -> Self {
        Self::new(day.resolve(now, portal_offset), scope)
    }

    pub fn date(&self) -> NaiveDate {
        self.date
    }

    pub fn scope(&self) -> &JurisdictionScope {
        &self.scope
    }

    /// The date the way the portal wants it: DD-MM-YYYY.
    pub fn portal_date(&self) -> String {
        self.date.format(PORTAL_DATE_FORMAT).to_string()
    }
}

// =============================================================================
// Raw payloads
// =============================================================================

/// The body of one listing response, tagged by what it turned out to be.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PayloadBody {
    Html(String),
    /// JSON object with the HTML fragment somewhere inside it.
    JsonEnvelope(String),
    Pdf(Vec<u8>),
}

impl PayloadBody {
    pub fn kind_name(&self) -> &'static str {
        match self {
            PayloadBody::Html(_) => "html",
            PayloadBody::JsonEnvelope(_) => "json",
            PayloadBody::Pdf(_) => "pdf",
        }
    }
}

/// One listing response plus where it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawPayload {
    pub body: PayloadBody,
    pub source_url: String,
    pub status: u16,
    pub content_type: Option<String>,
    /// The court the request was issued for, if the request named one.
    pub court_hint: Option<String>,
}

// =============================================================================
// Listing rows
// =============================================================================

/// One case on one court's list, fields as the portal printed them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListingRow {
    /// 1-based position in that court's list for the day.
    pub serial_number: u32,
    pub court_name: String,
    /// The case cell/line text exactly as rendered.
    pub case_text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub case_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub case_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub case_year: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cnr: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parties: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document_url: Option<String>,
}

/// All rows for one query, in published order.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Listing {
    pub rows: Vec<ListingRow>,
}

impl Listing {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

// =============================================================================
// Outcomes
// =============================================================================

/// What the matcher found.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome")]
pub enum MatchResult {
    NotListed,
    Listed {
        serial_number: u32,
        court_name: String,
        row: ListingRow,
    },
    /// More than one row canonicalized to the target. All of them, in order.
    Ambiguous { candidates: Vec<ListingRow> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DocumentKind {
    CasePdf,
    FullCauseList,
}

impl fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DocumentKind::CasePdf => write!(f, "case PDF"),
            DocumentKind::FullCauseList => write!(f, "full cause list"),
        }
    }
}

/// A document the portal actually gave us.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetrievedDocument {
    pub bytes: Vec<u8>,
    pub content_type: String,
    pub source_url: String,
    pub kind: DocumentKind,
}

impl RetrievedDocument {
    pub fn is_full_cause_list(&self) -> bool {
        self.kind == DocumentKind::FullCauseList
    }
}

/// A document request either produced a document or the portal had none.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocumentOutcome {
    Retrieved(RetrievedDocument),
    Unavailable { kind: DocumentKind, reason: String },
}

// =============================================================================
// The report handed to the outside world
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReportStatus {
    Listed,
    NotListed,
    Ambiguous,
    Error,
}

impl fmt::Display for ReportStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReportStatus::Listed => write!(f, "Listed"),
            ReportStatus::NotListed => write!(f, "NotListed"),
            ReportStatus::Ambiguous => write!(f, "Ambiguous"),
            ReportStatus::Error => write!(f, "Error"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentReference {
    pub source_url: String,
    pub content_type: String,
    pub size_bytes: usize,
    pub is_full_cause_list: bool,
    /// Filled in by whoever writes the bytes somewhere.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub saved_to: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnavailableDocument {
    pub kind: DocumentKind,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CandidateSummary {
    pub serial_number: u32,
    pub court_name: String,
    pub case_text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorDetail {
    pub kind: String,
    pub stage: String,
    pub message: String,
}

/// The structured result of one resolution request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolutionReport {
    pub status: ReportStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub case: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub serial_number: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub court_name: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub candidates: Vec<CandidateSummary>,
    /// The single-case PDF, when one was asked for and found.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document_reference: Option<DocumentReference>,
    /// The full day's cause list, when one was asked for and found.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cause_list_reference: Option<DocumentReference>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub unavailable_documents: Vec<UnavailableDocument>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_detail: Option<ErrorDetail>,
}

impl fmt::Display for ResolutionReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let case = self.case.as_deref().unwrap_or("<unknown case>");
        match self.status {
            ReportStatus::Listed => write!(
                f,
                "{} is LISTED at serial {} in {}",
                case,
                self.serial_number.unwrap_or_default(),
                self.court_name.as_deref().unwrap_or("an unnamed court")
            ),
            ReportStatus::NotListed => write!(f, "{} is not listed", case),
            ReportStatus::Ambiguous => write!(
                f,
                "{} matches {} rows; pick one",
                case,
                self.candidates.len()
            ),
            ReportStatus::Error => write!(
                f,
                "{} could not be resolved: {}",
                case,
                self.error_detail
                    .as_ref()
                    .map(|d| d.message.as_str())
                    .unwrap_or("unknown error")
            ),
        }
    }
}
