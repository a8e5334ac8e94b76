// =============================================================================
// error.rs — EVERYTHING THAT CAN GO WRONG BETWEEN "IS MY CASE LISTED?" AND
//            AN ANSWER
// =============================================================================
//
// Every stage of the pipeline either hands the next stage a typed value or
// hands the caller one of these. Nothing gets quietly turned into an empty
// listing. A portal that is down, a portal that answers 503, and a portal that
// answers 200 with an error page are three different stories, and each one
// gets told separately.
//
// Ambiguous matches and missing documents are not errors. They live in
// models.rs as ordinary result values.
// =============================================================================

use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// Where in the pipeline a request currently is (or died).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Stage {
    Normalizing,
    Fetching,
    Parsing,
    Matching,
    Retrieving,
    Assembled,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Normalizing => write!(f, "normalizing"),
            Stage::Fetching => write!(f, "fetching"),
            Stage::Parsing => write!(f, "parsing"),
            Stage::Matching => write!(f, "matching"),
            Stage::Retrieving => write!(f, "retrieving"),
            Stage::Assembled => write!(f, "assembled"),
        }
    }
}

/// Which part of the user's identifier failed validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentifierField {
    /// The input was neither a CNR nor a complete type/number/year triple.
    Identifier,
    Cnr,
    CaseType,
    CaseNumber,
    CaseYear,
}

impl fmt::Display for IdentifierField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IdentifierField::Identifier => write!(f, "identifier"),
            IdentifierField::Cnr => write!(f, "cnr"),
            IdentifierField::CaseType => write!(f, "case_type"),
            IdentifierField::CaseNumber => write!(f, "case_number"),
            IdentifierField::CaseYear => write!(f, "case_year"),
        }
    }
}

/// What the portal did to us on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Error)]
#[serde(tag = "condition", content = "detail")]
pub enum FetchCondition {
    /// Connect failure, timeout, or the body never finished arriving.
    #[error("portal unreachable: {0}")]
    Unavailable(String),

    #[error("portal answered HTTP {0}")]
    HttpStatus(u16),

    /// A 2xx with nothing in it.
    #[error("portal answered with an empty body")]
    EmptyBody,
}

impl FetchCondition {
    /// Timeouts, connection trouble, 5xx and 429 are worth another attempt.
    /// Any other 4xx means we built the query wrong and asking again will
    /// not change the answer.
    pub fn is_transient(&self) -> bool {
        match self {
            FetchCondition::Unavailable(_) => true,
            FetchCondition::HttpStatus(code) => *code >= 500 || *code == 429,
            FetchCondition::EmptyBody => false,
        }
    }
}

/// Why a listing payload could not be turned into rows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Error)]
#[serde(tag = "reason", content = "detail")]
pub enum ParseFailure {
    #[error("payload is empty")]
    EmptyPayload,

    #[error("portal served an error page: {0}")]
    ErrorPage(String),

    #[error("no recognizable cause list structure")]
    UnrecognizedStructure,

    #[error("partial page: {0}")]
    PartialPage(String),

    #[error("pdf text layer unavailable: {0}")]
    PdfText(String),
}

/// The terminal failures of a single resolution request.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    #[error("invalid {field}: {reason}")]
    InvalidIdentifier {
        field: IdentifierField,
        reason: String,
    },

    #[error("network failure while {stage} after {attempts} attempt(s): {condition}")]
    NetworkFailure {
        stage: Stage,
        attempts: u32,
        condition: FetchCondition,
    },

    #[error("unparseable listing: {reason}")]
    UnparseableListing { reason: ParseFailure },

    #[error("document retrieval failed after {attempts} attempt(s): {condition}")]
    RetrievalFailed {
        attempts: u32,
        condition: FetchCondition,
    },
}

impl EngineError {
    pub fn invalid(field: IdentifierField, reason: impl Into<String>) -> Self {
        EngineError::InvalidIdentifier {
            field,
            reason: reason.into(),
        }
    }

    /// Stable name used in JSON output and for CLI exit codes.
    pub fn kind(&self) -> &'static str {
        match self {
            EngineError::InvalidIdentifier { .. } => "InvalidIdentifier",
            EngineError::NetworkFailure { .. } => "NetworkFailure",
            EngineError::UnparseableListing { .. } => "UnparseableListing",
            EngineError::RetrievalFailed { .. } => "RetrievalFailed",
        }
    }

    /// The stage that produced the failure.
    pub fn stage(&self) -> Stage {
        match self {
            EngineError::InvalidIdentifier { .. } => Stage::Normalizing,
            EngineError::NetworkFailure { stage, .. } => *stage,
            EngineError::UnparseableListing { .. } => Stage::Parsing,
            EngineError::RetrievalFailed { .. } => Stage::Retrieving,
        }
    }
}

impl From<ParseFailure> for EngineError {
    fn from(reason: ParseFailure) -> Self {
        EngineError::UnparseableListing { reason }
    }
}
