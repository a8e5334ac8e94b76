// =============================================================================
// parser/html.rs — TABLE SOUP
// =============================================================================
//
// The HTML cause list is a table. Sometimes it has <th> headers, sometimes
// the header is just the first <tr>. Court names arrive as full-width rows
// in the middle of the table ("Court Room 3 : Shri A. B. Judge"), or as a
// column, or not at all. Half the cells carry trailing &nbsp;.
//
// We find the table whose header row mentions a serial column and a case
// column, map the columns by role, then walk the rows top to bottom keeping
// track of the most recent court heading.
// =============================================================================

use std::sync::LazyLock;

use scraper::{ElementRef, Html, Selector};
use url::Url;

use super::{
    collapse_whitespace, error_phrase, header_role, is_no_records_notice, leading_serial,
    looks_like_court_heading, resolve_court_name, ColumnRole,
};
use crate::error::ParseFailure;
use crate::models::ListingRow;
use crate::normalizer::{compact_cnr, parse_rendered_case};

static TABLE: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("table").expect("table selector"));
static ROW: LazyLock<Selector> = LazyLock::new(|| Selector::parse("tr").expect("row selector"));
static CELL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("th, td").expect("cell selector"));
static HEADER_CELL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("th").expect("header cell selector"));
static LINK: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("a[href]").expect("link selector"));

/// Keys the portal has used for the HTML fragment inside a JSON response.
const ENVELOPE_FRAGMENT_KEYS: &[&str] = &["case_data", "cause_list", "html"];
const ENVELOPE_ERROR_KEYS: &[&str] = &["errormsg", "error", "error_msg"];

/// Pull the HTML fragment out of a JSON envelope.
pub fn unwrap_envelope(json: &str) -> Result<String, ParseFailure> {
    if json.trim().is_empty() {
        return Err(ParseFailure::EmptyPayload);
    }
    let value: serde_json::Value =
        serde_json::from_str(json).map_err(|_| ParseFailure::UnrecognizedStructure)?;
    let Some(object) = value.as_object() else {
        return Err(ParseFailure::UnrecognizedStructure);
    };

    for key in ENVELOPE_FRAGMENT_KEYS {
        if let Some(fragment) = object.get(*key).and_then(|v| v.as_str()) {
            if !fragment.trim().is_empty() {
                return Ok(fragment.to_string());
            }
        }
    }

    for key in ENVELOPE_ERROR_KEYS {
        match object.get(*key) {
            Some(serde_json::Value::String(message)) if !message.trim().is_empty() => {
                return Err(ParseFailure::ErrorPage(collapse_whitespace(message)));
            }
            Some(serde_json::Value::Bool(true)) => {
                return Err(ParseFailure::ErrorPage(format!("portal flagged '{}'", key)));
            }
            _ => {}
        }
    }

    // A fragment key that is present but blank: the portal answered with
    // nothing.
    if ENVELOPE_FRAGMENT_KEYS.iter().any(|k| object.contains_key(*k)) {
        return Err(ParseFailure::EmptyPayload);
    }
    Err(ParseFailure::UnrecognizedStructure)
}

/// Column index per role, from a header row.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
struct ColumnMap {
    serial: Option<usize>,
    case: Option<usize>,
    cnr: Option<usize>,
    court: Option<usize>,
    parties: Option<usize>,
}

impl ColumnMap {
    fn from_headers(headers: &[String]) -> Self {
        let mut map = ColumnMap::default();
        for (index, text) in headers.iter().enumerate() {
            let slot = match header_role(text) {
                ColumnRole::Serial => &mut map.serial,
                ColumnRole::Case => &mut map.case,
                ColumnRole::Cnr => &mut map.cnr,
                ColumnRole::Court => &mut map.court,
                ColumnRole::Parties => &mut map.parties,
                ColumnRole::Other => continue,
            };
            if slot.is_none() {
                *slot = Some(index);
            }
        }
        map
    }

    fn is_listing(&self) -> bool {
        self.serial.is_some() && (self.case.is_some() || self.cnr.is_some())
    }
}

/// Extract rows from an HTML cause list.
pub fn parse_html(
    markup: &str,
    source_url: &str,
    court_hint: Option<&str>,
    current_year: i32,
) -> Result<Vec<ListingRow>, ParseFailure> {
    if markup.trim().is_empty() {
        return Err(ParseFailure::EmptyPayload);
    }
    check_complete(markup)?;

    let document = Html::parse_document(markup);
    let base = Url::parse(source_url).ok();
    let mut rows = Vec::new();
    let mut recognized = false;

    for table in document.select(&TABLE) {
        // Nested layout tables contain the real one; let the inner one win.
        if table.select(&TABLE).next().is_some() {
            continue;
        }
        let table_rows: Vec<ElementRef> = table.select(&ROW).collect();
        let Some(header_index) = header_row_index(&table_rows) else {
            continue;
        };
        let columns = ColumnMap::from_headers(&cell_texts(table_rows[header_index]));
        if !columns.is_listing() {
            continue;
        }
        recognized = true;

        let mut heading: Option<String> = None;
        let mut last_serial: Option<u32> = None;
        for (offset, tr) in table_rows[header_index + 1..].iter().enumerate() {
            let cells: Vec<ElementRef> = tr.select(&CELL).collect();
            let texts: Vec<String> = cells.iter().map(|c| element_text(*c)).collect();
            if texts.iter().all(|t| t.is_empty()) {
                continue;
            }

            if let Some(text) = heading_text(&cells, &texts) {
                if !is_no_records_notice(text) {
                    heading = Some(text.to_string());
                }
                continue;
            }

            let serial_number = row_serial(&texts, &columns, last_serial, current_year)
                .ok_or_else(|| {
                    ParseFailure::PartialPage(format!(
                        "row {} after the header has no readable serial number",
                        offset + 1
                    ))
                })?;
            last_serial = Some(serial_number);
            rows.push(build_row(
                tr,
                serial_number,
                &texts,
                &columns,
                heading.as_deref(),
                court_hint,
                base.as_ref(),
                current_year,
            ));
        }
    }

    if recognized {
        return Ok(rows);
    }

    let text = element_text(document.root_element());
    if is_no_records_notice(&text) {
        return Ok(Vec::new());
    }
    if let Some(phrase) = error_phrase(&text) {
        return Err(ParseFailure::ErrorPage(snippet_around(&text, phrase)));
    }
    Err(ParseFailure::UnrecognizedStructure)
}

/// More opened tables than closed ones means the body was cut off.
fn check_complete(markup: &str) -> Result<(), ParseFailure> {
    let lower = markup.to_ascii_lowercase();
    let opened = memchr::memmem::find_iter(lower.as_bytes(), b"<table").count();
    let closed = memchr::memmem::find_iter(lower.as_bytes(), b"</table").count();
    if opened > closed {
        return Err(ParseFailure::PartialPage(format!(
            "{} table(s) opened, {} closed",
            opened, closed
        )));
    }
    Ok(())
}

/// The first row made of <th> cells, else the first row with any text.
fn header_row_index(rows: &[ElementRef]) -> Option<usize> {
    rows.iter()
        .position(|tr| tr.select(&HEADER_CELL).next().is_some())
        .or_else(|| {
            rows.iter()
                .position(|tr| cell_texts(*tr).iter().any(|t| !t.is_empty()))
        })
}

/// The text of a row that names a court instead of listing a case: one
/// filled cell that spans columns, or that reads like a court heading.
fn heading_text<'t>(cells: &[ElementRef], texts: &'t [String]) -> Option<&'t str> {
    let mut filled = texts.iter().filter(|t| !t.is_empty());
    let text = filled.next()?;
    if filled.next().is_some() {
        return None;
    }
    let spans = cells.iter().any(|c| {
        c.value()
            .attr("colspan")
            .and_then(|v| v.trim().parse::<usize>().ok())
            .map(|n| n > 1)
            .unwrap_or(false)
    });
    let reads_as_heading = looks_like_court_heading(text) || is_no_records_notice(text);
    (spans || reads_as_heading).then_some(text.as_str())
}

/// Serial for a listing row. A connected matter ("with CRL/46/2022") sits in
/// its own row with the serial cell blank and shares the previous serial.
fn row_serial(
    texts: &[String],
    columns: &ColumnMap,
    last_serial: Option<u32>,
    current_year: i32,
) -> Option<u32> {
    let serial_text = columns
        .serial
        .and_then(|i| texts.get(i))
        .map(String::as_str)
        .unwrap_or_default();
    if !serial_text.is_empty() {
        return leading_serial(serial_text);
    }
    let mut filled = texts.iter().filter(|t| !t.is_empty());
    let lone = filled.next()?;
    if filled.next().is_some() {
        return None;
    }
    parse_rendered_case(lone, current_year).and(last_serial)
}

#[allow(clippy::too_many_arguments)]
fn build_row(
    tr: &ElementRef,
    serial_number: u32,
    texts: &[String],
    columns: &ColumnMap,
    heading: Option<&str>,
    court_hint: Option<&str>,
    base: Option<&Url>,
    current_year: i32,
) -> ListingRow {
    let cell = |index: Option<usize>| -> Option<&str> {
        index
            .and_then(|i| texts.get(i))
            .map(String::as_str)
            .filter(|t| !t.is_empty())
    };

    // A continuation row may carry its case outside the case column.
    let continuation = cell(columns.serial).is_none();
    let case_text = cell(columns.case)
        .or_else(|| {
            continuation
                .then(|| texts.iter().find(|t| !t.is_empty()).map(String::as_str))
                .flatten()
        })
        .unwrap_or_default()
        .to_string();
    let rendered = parse_rendered_case(&case_text, current_year);

    let cnr = cell(columns.cnr)
        .map(compact_cnr)
        .filter(|c| !c.is_empty())
        .or_else(|| rendered.as_ref().and_then(|r| r.cnr.clone()));

    // Without a party column, whatever follows the case number in its cell
    // is usually the party names.
    let parties = cell(columns.parties).map(str::to_string).or_else(|| {
        rendered.as_ref().and_then(|r| {
            let rest = collapse_whitespace(case_text.get(r.end..).unwrap_or_default());
            (!rest.is_empty()).then_some(rest)
        })
    });

    let document_url = tr
        .select(&LINK)
        .filter_map(|a| a.value().attr("href"))
        .map(str::trim)
        .filter(|href| !href.is_empty() && !href.starts_with('#') && !href.starts_with("javascript:"))
        .find_map(|href| resolve_link(base, href));

    let case_text = if case_text.is_empty() {
        cnr.clone().unwrap_or_default()
    } else {
        case_text
    };

    ListingRow {
        serial_number,
        court_name: resolve_court_name(cell(columns.court), heading, court_hint),
        case_type: rendered.as_ref().and_then(|r| r.case_type.clone()),
        case_number: rendered.as_ref().and_then(|r| r.case_number.clone()),
        case_year: rendered.as_ref().and_then(|r| r.case_year.clone()),
        case_text,
        cnr,
        parties,
        document_url,
    }
}

fn resolve_link(base: Option<&Url>, href: &str) -> Option<String> {
    match base {
        Some(base) => base.join(href).ok().map(|u| u.to_string()),
        None => Url::parse(href).ok().map(|u| u.to_string()),
    }
}

fn cell_texts(tr: ElementRef) -> Vec<String> {
    tr.select(&CELL).map(element_text).collect()
}

/// Text nodes are joined with a space so `CRL/45/2022<br>MH01...` stays two
/// tokens.
fn element_text(element: ElementRef) -> String {
    collapse_whitespace(&element.text().collect::<Vec<_>>().join(" "))
}

/// A short window of page text around the phrase that gave the error away.
fn snippet_around(text: &str, phrase: &str) -> String {
    let lower = text.to_ascii_lowercase();
    let Some(start) = lower.find(phrase) else {
        return phrase.to_string();
    };
    let end = text[start..]
        .char_indices()
        .nth(120)
        .map(|(i, _)| start + i)
        .unwrap_or(text.len());
    text[start..end].trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    const URL: &str = "https://portal.test/ecourtindia_v6/?p=cause_list/submitCauseList";

    fn parse(markup: &str) -> Result<Vec<ListingRow>, ParseFailure> {
        parse_html(markup, URL, Some("Court 3"), 2026)
    }

    #[test]
    fn test_headings_columns_and_links() {
        let markup = r#"
          <div id="res">
          <table class="table">
            <thead>
              <tr><th>Sr No</th><th>Cases</th><th>Party Name</th><th>Advocate</th></tr>
            </thead>
            <tbody>
              <tr><td colspan="4">Court Room 3 : Shri A. B. Judge</td></tr>
              <tr>
                <td>7</td>
                <td><a href="display_pdf?cino=MH010012342023">CRL/45/2022<br>MH01-001234-2023</a></td>
                <td>Ramesh&nbsp;vs&nbsp;State</td>
                <td>Adv. X</td>
              </tr>
              <tr><td>8</td><td>Crl.A. No. 9 of 2021</td><td>A vs B</td><td></td></tr>
              <tr><td colspan="4">Court Room 4</td></tr>
              <tr><td>1</td><td>CS 0045/22</td><td></td><td></td></tr>
            </tbody>
          </table>
          </div>"#;

        let rows = parse(markup).unwrap();
        assert_eq!(rows.len(), 3);

        assert_eq!(rows[0].serial_number, 7);
        assert_eq!(rows[0].court_name, "Court Room 3 : Shri A. B. Judge");
        assert_eq!(rows[0].cnr.as_deref(), Some("MH010012342023"));
        assert_eq!(rows[0].case_type.as_deref(), Some("CRL"));
        assert_eq!(rows[0].parties.as_deref(), Some("Ramesh vs State"));
        assert_eq!(
            rows[0].document_url.as_deref(),
            Some("https://portal.test/ecourtindia_v6/display_pdf?cino=MH010012342023")
        );

        assert_eq!(rows[1].serial_number, 8);
        assert_eq!(rows[1].case_number.as_deref(), Some("9"));
        assert_eq!(rows[1].document_url, None);

        assert_eq!(rows[2].court_name, "Court Room 4");
        assert_eq!(rows[2].case_year.as_deref(), Some("22"));
        assert_eq!(rows[2].parties, None);
    }

    #[test]
    fn test_court_column_and_hint() {
        let with_column = r#"
          <table>
            <tr><td>S.No</td><td>CNR Number</td><td>Court No</td></tr>
            <tr><td>1</td><td>mh01-001234-2023</td><td>Court Room 9</td></tr>
          </table>"#;
        let rows = parse(with_column).unwrap();
        assert_eq!(rows[0].court_name, "Court Room 9");
        assert_eq!(rows[0].cnr.as_deref(), Some("MH010012342023"));
        assert_eq!(rows[0].case_text, "MH010012342023");

        let bare = r#"
          <table>
            <tr><th>Sr. No.</th><th>Case No</th></tr>
            <tr><td>2</td><td>RCA-12-2019</td></tr>
          </table>"#;
        let rows = parse(bare).unwrap();
        assert_eq!(rows[0].court_name, "Court 3");

        let rows = parse_html(bare, URL, None, 2026).unwrap();
        assert_eq!(rows[0].court_name, super::super::UNSPECIFIED_COURT);
    }

    #[test]
    fn test_party_names_from_case_cell() {
        let markup = r#"
          <table>
            <tr><th>Sr No</th><th>Case Number / Parties</th></tr>
            <tr><td>3</td><td>CRL/45/2022 Ramesh vs State</td></tr>
          </table>"#;
        let rows = parse(markup).unwrap();
        assert_eq!(rows[0].parties.as_deref(), Some("Ramesh vs State"));
    }

    #[test]
    fn test_header_without_rows_is_empty_listing() {
        let markup = "<table><tr><th>Sr No</th><th>Case Number</th></tr></table>";
        assert_eq!(parse(markup).unwrap(), Vec::new());
    }

    #[test]
    fn test_no_records_notice_is_empty_listing() {
        assert!(parse("<div class='alert'>No Records Found</div>").unwrap().is_empty());
        let in_table = r#"
          <table>
            <tr><th>Sr No</th><th>Case Number</th></tr>
            <tr><td colspan="2">No records found</td></tr>
          </table>"#;
        assert!(parse(in_table).unwrap().is_empty());
    }

    #[test]
    fn test_failures() {
        assert_eq!(parse("   "), Err(ParseFailure::EmptyPayload));
        assert_eq!(
            parse("<html><body><h1>Welcome</h1></body></html>"),
            Err(ParseFailure::UnrecognizedStructure)
        );
        match parse("<html><body><p>Invalid Request. Please reload.</p></body></html>") {
            Err(ParseFailure::ErrorPage(message)) => assert!(message.starts_with("Invalid Request")),
            other => panic!("expected error page, got {:?}", other),
        }
        assert!(matches!(
            parse("<table><tr><th>Sr No</th><th>Case No</th></tr><tr><td>1</td><td>CS/1/2"),
            Err(ParseFailure::PartialPage(_))
        ));
        assert!(matches!(
            parse(
                "<table><tr><th>Sr No</th><th>Case No</th></tr>\
                 <tr><td>??</td><td>CS/1/2020</td></tr></table>"
            ),
            Err(ParseFailure::PartialPage(_))
        ));
    }

    #[test]
    fn test_connected_matter_row_shares_the_previous_serial() {
        let markup = r#"
          <table>
            <tr><th>Sr No</th><th>Case Number</th><th>Party Name</th></tr>
            <tr><td colspan="3">Court Room 3</td></tr>
            <tr><td>1</td><td>CRL/45/2022</td><td>A vs B</td></tr>
            <tr><td></td><td>with CRL/46/2022</td><td></td></tr>
            <tr><td>2</td><td>CS/12/2021</td><td>C vs D</td></tr>
          </table>"#;
        let rows = parse(markup).unwrap();
        let summary: Vec<(u32, &str, Option<&str>)> = rows
            .iter()
            .map(|r| (r.serial_number, r.court_name.as_str(), r.case_number.as_deref()))
            .collect();
        assert_eq!(
            summary,
            vec![
                (1, "Court Room 3", Some("45")),
                (1, "Court Room 3", Some("46")),
                (2, "Court Room 3", Some("12")),
            ]
        );
        assert_eq!(rows[1].case_type.as_deref(), Some("CRL"));
        assert_eq!(rows[1].case_year.as_deref(), Some("2022"));
    }

    #[test]
    fn test_lone_cells_that_are_neither_heading_nor_case_fail() {
        let orphan = r#"
          <table>
            <tr><th>Sr No</th><th>Case Number</th></tr>
            <tr><td></td><td>with CRL/46/2022</td></tr>
          </table>"#;
        assert!(matches!(parse(orphan), Err(ParseFailure::PartialPage(_))));

        let stray = r#"
          <table>
            <tr><th>Sr No</th><th>Case Number</th></tr>
            <tr><td>1</td><td>CS/12/2021</td></tr>
            <tr><td></td><td>Adjourned</td></tr>
          </table>"#;
        assert!(matches!(parse(stray), Err(ParseFailure::PartialPage(_))));

        let heading_without_colspan = r#"
          <table>
            <tr><th>Sr No</th><th>Case Number</th></tr>
            <tr><td>Court Room 5</td><td></td></tr>
            <tr><td>1</td><td>CS/12/2021</td></tr>
          </table>"#;
        assert_eq!(parse(heading_without_colspan).unwrap()[0].court_name, "Court Room 5");
    }

    #[test]
    fn test_serial_zero_is_a_partial_page() {
        let markup = r#"
          <table>
            <tr><th>Sr No</th><th>Case Number</th></tr>
            <tr><td>0</td><td>CS/12/2021</td></tr>
          </table>"#;
        assert!(matches!(parse(markup), Err(ParseFailure::PartialPage(_))));
    }

    #[test]
    fn test_unwrap_envelope() {
        assert_eq!(
            unwrap_envelope(r#"{"case_data": "<table></table>", "status": 1}"#).unwrap(),
            "<table></table>"
        );
        assert_eq!(
            unwrap_envelope(r#"{"cause_list": "", "html": "<p>x</p>"}"#).unwrap(),
            "<p>x</p>"
        );
        assert_eq!(
            unwrap_envelope(r#"{"errormsg": "Invalid  Captcha"}"#),
            Err(ParseFailure::ErrorPage("Invalid Captcha".into()))
        );
        assert_eq!(
            unwrap_envelope(r#"{"case_data": "  "}"#),
            Err(ParseFailure::EmptyPayload)
        );
        assert_eq!(
            unwrap_envelope(r#"{"status": 1}"#),
            Err(ParseFailure::UnrecognizedStructure)
        );
        assert_eq!(unwrap_envelope("[1,2]"), Err(ParseFailure::UnrecognizedStructure));
    }
}
