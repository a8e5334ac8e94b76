// =============================================================================
// output.rs — LEAVING A PAPER TRAIL
// =============================================================================
//
// The CLI writes every answer to disk, next to whatever PDFs came with it:
//
//   output/case_result_MH010012342023_16-10-2026.json
//   output/case_result_CRL_45_2022_17-10-2026.txt
//   output/case_result_MH010012342023_16-10-2026_case.pdf
//   output/causelist_16-10-2026.pdf
//
// Documents are written first so the report can say where they went.
// =============================================================================

use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::ValueEnum;
use serde_json::Value;

use crate::models::{DocumentKind, ResolutionReport, RetrievedDocument, PORTAL_DATE_FORMAT};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Json,
    Text,
}

impl OutputFormat {
    fn extension(self) -> &'static str {
        match self {
            OutputFormat::Json => "json",
            OutputFormat::Text => "txt",
        }
    }
}

/// Paths of everything one `save` call wrote.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SavedFiles {
    pub report: PathBuf,
    pub documents: Vec<PathBuf>,
}

/// Write the documents and then the report into `dir`, creating it if needed.
/// The report's references are updated with the saved paths.
pub fn save(
    report: &mut ResolutionReport,
    documents: &[RetrievedDocument],
    dir: &Path,
    format: OutputFormat,
) -> Result<SavedFiles> {
    fs::create_dir_all(dir)
        .with_context(|| format!("creating output directory {}", dir.display()))?;

    let stem = file_stem(report);
    let mut saved = Vec::with_capacity(documents.len());
    for doc in documents {
        let path = save_document(doc, &stem, report_date(report).as_deref(), dir)?;
        let reference = match doc.kind {
            DocumentKind::CasePdf => report.document_reference.as_mut(),
            DocumentKind::FullCauseList => report.cause_list_reference.as_mut(),
        };
        if let Some(reference) = reference {
            reference.saved_to = Some(path.display().to_string());
        }
        saved.push(path);
    }

    let path = dir.join(format!("{}.{}", stem, format.extension()));
    let body = render(report, format)?;
    fs::write(&path, body).with_context(|| format!("writing report {}", path.display()))?;

    Ok(SavedFiles {
        report: path,
        documents: saved,
    })
}

/// Write one PDF. The full cause list is named by date alone.
pub fn save_document(
    doc: &RetrievedDocument,
    report_stem: &str,
    date: Option<&str>,
    dir: &Path,
) -> Result<PathBuf> {
    let name = match doc.kind {
        DocumentKind::CasePdf => format!("{}_case.pdf", report_stem),
        DocumentKind::FullCauseList => match date {
            Some(date) => format!("causelist_{}.pdf", date),
            None => "causelist.pdf".to_string(),
        },
    };
    let path = dir.join(name);
    fs::write(&path, &doc.bytes).with_context(|| format!("writing {}", path.display()))?;
    Ok(path)
}

/// The report as it would be written to disk.
pub fn render(report: &ResolutionReport, format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Json => {
            serde_json::to_string_pretty(report).context("serializing report")
        }
        OutputFormat::Text => format_text(report),
    }
}

/// A readable key/value rendering. Nested objects are indented, lists are
/// numbered.
pub fn format_text(report: &ResolutionReport) -> Result<String> {
    let value = serde_json::to_value(report).context("serializing report")?;
    let mut out = String::new();
    let _ = writeln!(out, "Cause List Resolution");
    let _ = writeln!(out, "=====================");
    let _ = writeln!(out, "{}", report);
    let _ = writeln!(out);

    if let Value::Object(fields) = value {
        for (key, value) in fields {
            match value {
                Value::Object(inner) => {
                    let _ = writeln!(out, "{}:", key);
                    for (k, v) in inner {
                        let _ = writeln!(out, "  {}: {}", k, scalar(&v));
                    }
                }
                Value::Array(items) => {
                    let _ = writeln!(out, "{}:", key);
                    for (i, item) in items.iter().enumerate() {
                        let _ = writeln!(out, "  {}. {}", i + 1, inline(item));
                    }
                }
                other => {
                    let _ = writeln!(out, "{}: {}", key, scalar(&other));
                }
            }
        }
    }
    Ok(out)
}

fn scalar(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn inline(value: &Value) -> String {
    match value {
        Value::Object(fields) => fields
            .iter()
            .map(|(k, v)| format!("{}={}", k, scalar(v)))
            .collect::<Vec<_>>()
            .join(", "),
        other => scalar(other),
    }
}

fn report_date(report: &ResolutionReport) -> Option<String> {
    report
        .date
        .map(|d| d.format(PORTAL_DATE_FORMAT).to_string())
}

/// `case_result_<case>_<date>`, or `causelist_<date>` when there is no case.
fn file_stem(report: &ResolutionReport) -> String {
    let date = report_date(report).unwrap_or_else(|| "undated".to_string());
    match report.case.as_deref() {
        Some(case) => {
            let key: String = case
                .chars()
                .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
                .collect();
            format!("case_result_{}_{}", key, date)
        }
        None => format!("causelist_{}", date),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DocumentReference, ReportStatus};
    use chrono::NaiveDate;

    fn report(case: Option<&str>) -> ResolutionReport {
        ResolutionReport {
            status: ReportStatus::Listed,
            case: case.map(str::to_string),
            date: NaiveDate::from_ymd_opt(2026, 10, 16),
            serial_number: Some(7),
            court_name: Some("Court Room 3".into()),
            candidates: vec![],
            document_reference: None,
            cause_list_reference: None,
            unavailable_documents: vec![],
            error_detail: None,
        }
    }

    fn pdf(kind: DocumentKind) -> RetrievedDocument {
        RetrievedDocument {
            bytes: b"%PDF-1.4".to_vec(),
            content_type: "application/pdf".into(),
            source_url: "https://portal.test/doc".into(),
            kind,
        }
    }

    fn reference() -> DocumentReference {
        DocumentReference {
            source_url: "https://portal.test/doc".into(),
            content_type: "application/pdf".into(),
            size_bytes: 8,
            is_full_cause_list: false,
            saved_to: None,
        }
    }

    #[test]
    fn test_json_report_file_name_and_content() {
        let dir = tempfile::tempdir().unwrap();
        let mut report = report(Some("MH010012342023"));

        let saved = save(&mut report, &[], dir.path(), OutputFormat::Json).unwrap();

        assert_eq!(
            saved.report.file_name().unwrap(),
            "case_result_MH010012342023_16-10-2026.json"
        );
        let written: ResolutionReport =
            serde_json::from_str(&fs::read_to_string(&saved.report).unwrap()).unwrap();
        assert_eq!(written, report);
    }

    #[test]
    fn test_triple_text_report() {
        let dir = tempfile::tempdir().unwrap();
        let mut report = report(Some("CRL/45/2022"));

        let saved = save(&mut report, &[], dir.path(), OutputFormat::Text).unwrap();

        assert_eq!(
            saved.report.file_name().unwrap(),
            "case_result_CRL_45_2022_16-10-2026.txt"
        );
        let text = fs::read_to_string(&saved.report).unwrap();
        assert!(text.contains("CRL/45/2022 is LISTED at serial 7 in Court Room 3"));
        assert!(text.contains("serialNumber: 7"));
        assert!(text.contains("courtName: Court Room 3"));
    }

    #[test]
    fn test_documents_are_saved_and_referenced() {
        let dir = tempfile::tempdir().unwrap();
        let mut report = report(Some("MH010012342023"));
        report.document_reference = Some(reference());
        report.cause_list_reference = Some(DocumentReference {
            is_full_cause_list: true,
            ..reference()
        });

        let saved = save(
            &mut report,
            &[pdf(DocumentKind::CasePdf), pdf(DocumentKind::FullCauseList)],
            dir.path(),
            OutputFormat::Json,
        )
        .unwrap();

        let names: Vec<String> = saved
            .documents
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(
            names,
            vec![
                "case_result_MH010012342023_16-10-2026_case.pdf",
                "causelist_16-10-2026.pdf"
            ]
        );
        assert!(report.document_reference.unwrap().saved_to.is_some());
        assert!(report.cause_list_reference.unwrap().saved_to.is_some());
        assert_eq!(fs::read(&saved.documents[1]).unwrap(), b"%PDF-1.4");
    }

    #[test]
    fn test_cause_list_only_report_name() {
        let dir = tempfile::tempdir().unwrap();
        let mut report = report(None);
        report.status = ReportStatus::NotListed;

        let saved = save(&mut report, &[], dir.path().join("nested").as_path(), OutputFormat::Json)
            .unwrap();

        assert_eq!(saved.report.file_name().unwrap(), "causelist_16-10-2026.json");
    }
}
