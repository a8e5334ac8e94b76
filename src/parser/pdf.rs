// =============================================================================
// parser/pdf.rs — CAUSE LISTS AS PRINTED PAGES
// =============================================================================
//
// Some districts skip the HTML table and upload the cause list as a PDF.
// We don't parse PDF ourselves. Poppler's `pdftotext -layout` turns it into
// text with the columns still lined up, and from there it's line work:
//
//     COURT ROOM NO. 3  (Shri A. B. Judge)
//       1    CRL/45/2022     Ramesh vs State          Evidence
//       2    CS/12/2021      Sita vs Gita             Arguments
//
// A line naming a court starts a new section. A line that starts with a
// number and carries something that looks like a case number is a row.
// Everything else (page headers, footers, advocate names) is ignored.
//
// Scanned PDFs with no text layer come out blank and are reported as such.
// =============================================================================

use std::io::Write;
use std::process::Command;

use tracing::debug;

use super::{
    collapse_whitespace, header_role, is_no_records_notice, leading_serial,
    looks_like_court_heading, resolve_court_name, ColumnRole,
};
use crate::error::ParseFailure;
use crate::models::ListingRow;
use crate::normalizer::parse_rendered_case;

/// Turns PDF bytes into plain text. The engine ships a Poppler-backed
/// implementation; tests substitute canned text.
pub trait PdfTextLayer: Send + Sync {
    fn extract_text(&self, pdf: &[u8]) -> Result<String, ParseFailure>;
}

/// Runs `pdftotext -layout -q <tmpfile> -` and reads stdout.
#[derive(Debug, Clone)]
pub struct PopplerTextLayer {
    binary: String,
}

impl PopplerTextLayer {
    pub fn new(binary: impl Into<String>) -> Self {
        PopplerTextLayer {
            binary: binary.into(),
        }
    }
}

impl Default for PopplerTextLayer {
    fn default() -> Self {
        Self::new("pdftotext")
    }
}

impl PdfTextLayer for PopplerTextLayer {
    fn extract_text(&self, pdf: &[u8]) -> Result<String, ParseFailure> {
        let staged = stage_pdf(pdf)
            .map_err(|e| ParseFailure::PdfText(format!("could not stage pdf: {}", e)))?;

        let output = Command::new(&self.binary)
            .arg("-layout")
            .arg("-q")
            .arg(staged.path())
            .arg("-")
            .output()
            .map_err(|e| ParseFailure::PdfText(format!("could not run {}: {}", self.binary, e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ParseFailure::PdfText(format!(
                "{} exited with {}: {}",
                self.binary,
                output.status,
                stderr.trim()
            )));
        }

        let text = String::from_utf8_lossy(&output.stdout).into_owned();
        debug!(bytes = pdf.len(), chars = text.len(), "pdf text extracted");
        Ok(text)
    }
}

/// pdftotext wants a path. The file is removed when the handle drops.
fn stage_pdf(bytes: &[u8]) -> std::io::Result<tempfile::NamedTempFile> {
    let mut file = tempfile::Builder::new()
        .prefix("causelist-")
        .suffix(".pdf")
        .tempfile()?;
    file.write_all(bytes)?;
    file.flush()?;
    Ok(file)
}

/// Extract rows from the text layer of a PDF cause list.
pub fn parse_pdf_text(
    text: &str,
    court_hint: Option<&str>,
    current_year: i32,
) -> Result<Vec<ListingRow>, ParseFailure> {
    if text.trim().is_empty() {
        return Err(ParseFailure::PdfText("document has no text layer".into()));
    }

    let mut rows = Vec::new();
    let mut heading: Option<String> = None;
    let mut saw_header = false;
    let mut saw_notice = false;

    // pdftotext separates pages with form feeds.
    for raw_line in text.split(['\n', '\u{c}']) {
        let line = raw_line.trim();
        if line.is_empty() {
            continue;
        }

        if let Some(row) = serial_row(line, heading.as_deref(), court_hint, current_year) {
            rows.push(row);
            continue;
        }

        if is_no_records_notice(line) {
            saw_notice = true;
            continue;
        }
        if is_column_header(line) {
            saw_header = true;
            continue;
        }
        if looks_like_court_heading(line) {
            heading = Some(collapse_whitespace(line));
        }
    }

    if rows.is_empty() && !saw_header && !saw_notice {
        return Err(ParseFailure::UnrecognizedStructure);
    }
    Ok(rows)
}

/// A numbered line carrying a case number. "2ND ADDITIONAL SESSIONS JUDGE"
/// starts with a digit too and must fall through to the heading check.
fn serial_row(
    line: &str,
    heading: Option<&str>,
    court_hint: Option<&str>,
    current_year: i32,
) -> Option<ListingRow> {
    let serial_number = leading_serial(line)?;
    let rest = line.trim_start_matches(|c: char| c.is_ascii_digit());
    let rest = rest.trim_start_matches(['.', ')']).trim_start();
    let rendered = parse_rendered_case(rest, current_year)?;
    let parties = collapse_whitespace(rest.get(rendered.end..).unwrap_or_default());
    Some(ListingRow {
        serial_number,
        court_name: resolve_court_name(None, heading, court_hint),
        case_text: rendered.text.clone(),
        case_type: rendered.case_type,
        case_number: rendered.case_number,
        case_year: rendered.case_year,
        cnr: rendered.cnr,
        parties: (!parties.is_empty()).then_some(parties),
        document_url: None,
    })
}

/// "Sr. No.   Case Number   Parties" and friends.
fn is_column_header(line: &str) -> bool {
    let mut serial = false;
    let mut case = false;
    for cell in line.split("  ").map(str::trim).filter(|c| !c.is_empty()) {
        match header_role(cell) {
            ColumnRole::Serial => serial = true,
            ColumnRole::Case | ColumnRole::Cnr => case = true,
            _ => {}
        }
    }
    serial && case
}

#[cfg(test)]
mod tests {
    use super::*;

    const LIST: &str = "\
        DISTRICT AND SESSIONS COURT, PUNE\n\
        Cause List for 16-10-2026\n\
        Sr. No.   Case Number         Parties                 Purpose\n\
        COURT ROOM NO. 3  (Shri A. B. Judge)\n\
          1    CRL/45/2022     Ramesh vs State          Evidence\n\
          2.   Crl.A. No. 9 of 2021   Sita vs Gita\n\
        \u{c}Page 2\n\
        COURT ROOM NO. 4\n\
          1    MH01-001234-2023\n\
          2    Adjourned matters\n";

    #[test]
    fn test_rows_and_headings() {
        let rows = parse_pdf_text(LIST, Some("Court 3"), 2026).unwrap();
        assert_eq!(rows.len(), 3);

        assert_eq!(rows[0].serial_number, 1);
        assert_eq!(rows[0].court_name, "COURT ROOM NO. 3 (Shri A. B. Judge)");
        assert_eq!(rows[0].case_text, "CRL/45/2022");
        assert_eq!(rows[0].parties.as_deref(), Some("Ramesh vs State Evidence"));

        assert_eq!(rows[1].serial_number, 2);
        assert_eq!(rows[1].case_number.as_deref(), Some("9"));

        assert_eq!(rows[2].court_name, "COURT ROOM NO. 4");
        assert_eq!(rows[2].cnr.as_deref(), Some("MH010012342023"));
        assert_eq!(rows[2].parties, None);
    }

    #[test]
    fn test_hint_when_no_heading() {
        let rows = parse_pdf_text("1  CS/12/2021  A vs B", Some("Court 7"), 2026).unwrap();
        assert_eq!(rows[0].court_name, "Court 7");
    }

    #[test]
    fn test_empty_and_unrecognized() {
        assert!(matches!(
            parse_pdf_text(" \n\u{c}\n", None, 2026),
            Err(ParseFailure::PdfText(_))
        ));
        assert_eq!(
            parse_pdf_text("Annual report\nNothing to see here", None, 2026),
            Err(ParseFailure::UnrecognizedStructure)
        );
    }

    #[test]
    fn test_header_or_notice_without_rows_is_empty_listing() {
        let header_only = "Sr. No.   Case Number   Parties\n";
        assert_eq!(parse_pdf_text(header_only, None, 2026), Ok(Vec::new()));
        let notice = "COURT ROOM NO. 3\nNo cases listed for the day\n";
        assert_eq!(parse_pdf_text(notice, None, 2026), Ok(Vec::new()));
    }

    #[test]
    fn test_ordinal_heading_starts_a_new_court() {
        let text = "COURT ROOM NO. 1\n 1 CRL/45/2022 A vs B\n\
                    2ND ADDITIONAL SESSIONS JUDGE\n 1 CS/12/2021 C vs D\n\
                    3rd Civil Judge Junior Division\n 1 RCA/3/2020";
        let rows = parse_pdf_text(text, None, 2026).unwrap();
        let courts: Vec<(u32, &str)> = rows
            .iter()
            .map(|r| (r.serial_number, r.court_name.as_str()))
            .collect();
        assert_eq!(
            courts,
            vec![
                (1, "COURT ROOM NO. 1"),
                (1, "2ND ADDITIONAL SESSIONS JUDGE"),
                (1, "3rd Civil Judge Junior Division"),
            ]
        );
    }

    #[test]
    fn test_serial_zero_is_not_a_row() {
        assert_eq!(
            parse_pdf_text("0  CRL/45/2022  A vs B", None, 2026),
            Err(ParseFailure::UnrecognizedStructure)
        );
        let rows = parse_pdf_text("Sr. No.   Case Number\n0  CRL/45/2022\n1  CS/12/2021", None, 2026)
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].serial_number, 1);
        assert_eq!(rows[0].case_type.as_deref(), Some("CS"));
    }

    #[test]
    fn test_missing_poppler_binary_is_pdf_text_failure() {
        let layer = PopplerTextLayer::new("definitely-not-pdftotext-on-this-box");
        assert!(matches!(
            layer.extract_text(b"%PDF-1.4"),
            Err(ParseFailure::PdfText(_))
        ));
    }

    #[test]
    fn test_staged_pdf_is_removed_on_drop() {
        let staged = stage_pdf(b"%PDF-1.4 body").unwrap();
        let path = staged.path().to_path_buf();
        assert_eq!(std::fs::read(&path).unwrap(), b"%PDF-1.4 body");
        let name = path.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("causelist-") && name.ends_with(".pdf"));
        drop(staged);
        assert!(!path.exists());
    }
}
