// =============================================================================
// assembler.rs — ONE ANSWER, ONE SHAPE
// =============================================================================
//
// Whatever happened upstream, the caller gets a `ResolutionReport`. Listed,
// not listed, ambiguous, or failed with a reason. Retrieved documents are
// described in the report and handed back separately as bytes, so the report
// stays small enough to print.
// =============================================================================

use chrono::NaiveDate;

use crate::error::EngineError;
use crate::models::{
    CandidateSummary, CaseIdentifier, DocumentKind, DocumentOutcome, DocumentReference,
    ErrorDetail, MatchResult, ReportStatus, ResolutionReport, RetrievedDocument,
    UnavailableDocument,
};

/// Build the report for a pipeline that ran to the end.
pub fn assemble(
    target: Option<&CaseIdentifier>,
    date: NaiveDate,
    result: MatchResult,
    outcomes: Vec<DocumentOutcome>,
) -> (ResolutionReport, Vec<RetrievedDocument>) {
    let mut report = empty_report(target, Some(date));

    match result {
        MatchResult::NotListed => report.status = ReportStatus::NotListed,
        MatchResult::Listed {
            serial_number,
            court_name,
            ..
        } => {
            report.status = ReportStatus::Listed;
            report.serial_number = Some(serial_number);
            report.court_name = Some(court_name);
        }
        MatchResult::Ambiguous { candidates } => {
            report.status = ReportStatus::Ambiguous;
            report.candidates = candidates
                .into_iter()
                .map(|row| CandidateSummary {
                    serial_number: row.serial_number,
                    court_name: row.court_name,
                    case_text: row.case_text,
                })
                .collect();
        }
    }

    let mut documents = Vec::new();
    for outcome in outcomes {
        match outcome {
            DocumentOutcome::Retrieved(doc) => {
                let reference = reference_for(&doc);
                match doc.kind {
                    DocumentKind::CasePdf => report.document_reference = Some(reference),
                    DocumentKind::FullCauseList => report.cause_list_reference = Some(reference),
                }
                documents.push(doc);
            }
            DocumentOutcome::Unavailable { kind, reason } => {
                report.unavailable_documents.push(UnavailableDocument { kind, reason });
            }
        }
    }

    (report, documents)
}

/// Turn a terminal error into an `Error` report.
pub fn assemble_failure(
    target: Option<&CaseIdentifier>,
    date: Option<NaiveDate>,
    error: &EngineError,
) -> ResolutionReport {
    let mut report = empty_report(target, date);
    report.status = ReportStatus::Error;
    report.error_detail = Some(ErrorDetail {
        kind: error.kind().to_string(),
        stage: error.stage().to_string(),
        message: error.to_string(),
    });
    report
}

pub fn reference_for(doc: &RetrievedDocument) -> DocumentReference {
    DocumentReference {
        source_url: doc.source_url.clone(),
        content_type: doc.content_type.clone(),
        size_bytes: doc.bytes.len(),
        is_full_cause_list: doc.is_full_cause_list(),
        saved_to: None,
    }
}

fn empty_report(target: Option<&CaseIdentifier>, date: Option<NaiveDate>) -> ResolutionReport {
    ResolutionReport {
        status: ReportStatus::NotListed,
        case: target.map(|t| t.to_string()),
        date,
        serial_number: None,
        court_name: None,
        candidates: Vec::new(),
        document_reference: None,
        cause_list_reference: None,
        unavailable_documents: Vec::new(),
        error_detail: None,
    }
}
