// =============================================================================
// parser/mod.rs — THREE FORMATS, ONE KIND OF ROW
// =============================================================================
//
// The portal answers a cause list query with an HTML table, with that same
// table wrapped in a JSON envelope, or with a PDF. Whoever calls the parser
// gets back an ordered list of `ListingRow` and never finds out which one it
// was.
//
// Recognition leans on small keyword automata (Aho-Corasick, ASCII case
// insensitive) rather than exact markup. Column headers, court headings and
// error notices all get spelled slightly differently from district to
// district, so we look for the words and ignore the tags around them.
//
// Failure is loud. An error page is an error, a half-downloaded table is an
// error, and a page we can't make sense of is an error. Zero rows is only an
// answer when the page clearly says so.
// =============================================================================

pub mod html;
pub mod pdf;

use aho_corasick::{AhoCorasick, MatchKind};
use std::sync::LazyLock;
use tracing::{debug, info};

use crate::error::{EngineError, ParseFailure};
use crate::models::{Listing, ListingRow, PayloadBody, RawPayload};

pub use pdf::{PdfTextLayer, PopplerTextLayer};

/// Court name used when neither the payload nor the request names one.
pub const UNSPECIFIED_COURT: &str = "unspecified";

// =============================================================================
// Anchor automata
// =============================================================================

/// What a listing column holds, judged from its header text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnRole {
    Serial,
    Case,
    Cnr,
    Court,
    Parties,
    Other,
}

static HEADER_ANCHORS: LazyLock<Vec<(&str, ColumnRole)>> = LazyLock::new(|| {
    vec![
        ("sr no", ColumnRole::Serial),
        ("sr. no", ColumnRole::Serial),
        ("sr.no", ColumnRole::Serial),
        ("s.no", ColumnRole::Serial),
        ("s. no", ColumnRole::Serial),
        ("sl no", ColumnRole::Serial),
        ("sl. no", ColumnRole::Serial),
        ("sl.no", ColumnRole::Serial),
        ("serial", ColumnRole::Serial),
        ("item no", ColumnRole::Serial),
        ("cnr", ColumnRole::Cnr),
        ("case number", ColumnRole::Case),
        ("case no", ColumnRole::Case),
        ("case type", ColumnRole::Case),
        ("case", ColumnRole::Case),
        ("court room", ColumnRole::Court),
        ("court no", ColumnRole::Court),
        ("court name", ColumnRole::Court),
        ("court", ColumnRole::Court),
        ("bench", ColumnRole::Court),
        ("party name", ColumnRole::Parties),
        ("parties", ColumnRole::Parties),
        ("party", ColumnRole::Parties),
        ("petitioner", ColumnRole::Parties),
        ("versus", ColumnRole::Parties),
        ("advocate", ColumnRole::Other),
        ("purpose", ColumnRole::Other),
        ("stage", ColumnRole::Other),
        ("next date", ColumnRole::Other),
        ("remarks", ColumnRole::Other),
    ]
});

static HEADER_AUTOMATON: LazyLock<AhoCorasick> = LazyLock::new(|| {
    AhoCorasick::builder()
        .ascii_case_insensitive(true)
        .match_kind(MatchKind::LeftmostLongest)
        .build(HEADER_ANCHORS.iter().map(|(p, _)| *p))
        .expect("header anchor automaton")
});

static NO_RECORD_PHRASES: LazyLock<Vec<&str>> = LazyLock::new(|| {
    vec![
        "no record found",
        "no records found",
        "record not found",
        "records not found",
        "no cases listed",
        "no case listed",
        "no cases found",
        "no data found",
        "no matters listed",
        "cause list is not available",
        "cause list not available",
    ]
});

static NO_RECORD_AUTOMATON: LazyLock<AhoCorasick> = LazyLock::new(|| {
    AhoCorasick::builder()
        .ascii_case_insensitive(true)
        .build(&*NO_RECORD_PHRASES)
        .expect("no-record automaton")
});

static ERROR_PHRASES: LazyLock<Vec<&str>> = LazyLock::new(|| {
    vec![
        "invalid request",
        "invalid token",
        "invalid captcha",
        "session expired",
        "session has expired",
        "something went wrong",
        "error occurred",
        "an error has occurred",
        "access denied",
        "service unavailable",
        "internal server error",
        "under maintenance",
        "please try again",
    ]
});

static ERROR_AUTOMATON: LazyLock<AhoCorasick> = LazyLock::new(|| {
    AhoCorasick::builder()
        .ascii_case_insensitive(true)
        .build(&*ERROR_PHRASES)
        .expect("error phrase automaton")
});

static COURT_HEADING_ANCHORS: LazyLock<Vec<&str>> = LazyLock::new(|| {
    vec![
        "court room",
        "court no",
        "courtroom",
        "in the court of",
        "hon'ble",
        "honourable",
        "judge",
        "magistrate",
        "bench",
        "court of",
    ]
});

static COURT_HEADING_AUTOMATON: LazyLock<AhoCorasick> = LazyLock::new(|| {
    AhoCorasick::builder()
        .ascii_case_insensitive(true)
        .build(&*COURT_HEADING_ANCHORS)
        .expect("court heading automaton")
});

/// Role of a column from its header text. Blank headers are `Other`.
pub fn header_role(text: &str) -> ColumnRole {
    HEADER_AUTOMATON
        .find(text)
        .map(|m| HEADER_ANCHORS[m.pattern().as_usize()].1)
        .unwrap_or(ColumnRole::Other)
}

pub fn is_no_records_notice(text: &str) -> bool {
    NO_RECORD_AUTOMATON.is_match(text)
}

/// The matched error phrase, if the text reads like an error page.
pub fn error_phrase(text: &str) -> Option<&'static str> {
    ERROR_AUTOMATON
        .find(text)
        .map(|m| ERROR_PHRASES[m.pattern().as_usize()])
}

pub fn looks_like_court_heading(text: &str) -> bool {
    COURT_HEADING_AUTOMATON.is_match(text)
}

/// Runs of whitespace (including non-breaking spaces) become one space.
pub fn collapse_whitespace(text: &str) -> String {
    text.split(|c: char| c.is_whitespace() || c == '\u{a0}')
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Leading digits of "7", "7.", "7)", " 12 ". Serial numbers start at 1,
/// so none and zero are both None.
pub fn leading_serial(text: &str) -> Option<u32> {
    let trimmed = text.trim_start();
    let end = trimmed
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(trimmed.len());
    if end == 0 {
        return None;
    }
    trimmed[..end].parse::<u32>().ok().filter(|serial| *serial > 0)
}

/// Court name for a row: explicit column, then the current heading, then the
/// request's hint, then a fixed placeholder.
pub fn resolve_court_name(
    column: Option<&str>,
    heading: Option<&str>,
    hint: Option<&str>,
) -> String {
    [column, heading, hint]
        .into_iter()
        .flatten()
        .map(str::trim)
        .find(|s| !s.is_empty())
        .unwrap_or(UNSPECIFIED_COURT)
        .to_string()
}

// =============================================================================
// The parser
// =============================================================================

pub struct ListingParser<'a> {
    pdf: &'a dyn PdfTextLayer,
    current_year: i32,
}

impl<'a> ListingParser<'a> {
    pub fn new(pdf: &'a dyn PdfTextLayer, current_year: i32) -> Self {
        ListingParser { pdf, current_year }
    }

    /// Parse every payload in order and concatenate the rows. Any payload
    /// that fails fails the whole listing.
    pub fn parse(&self, payloads: &[RawPayload]) -> Result<Listing, EngineError> {
        if payloads.is_empty() {
            return Err(ParseFailure::EmptyPayload.into());
        }

        let mut rows = Vec::new();
        for payload in payloads {
            let parsed = self.parse_payload(payload).map_err(|reason| {
                info!(
                    url = payload.source_url.as_str(),
                    kind = payload.body.kind_name(),
                    reason = %reason,
                    "cause list payload rejected"
                );
                EngineError::from(reason)
            })?;
            debug!(
                url = payload.source_url.as_str(),
                kind = payload.body.kind_name(),
                rows = parsed.len(),
                "payload parsed"
            );
            rows.extend(parsed);
        }

        Ok(Listing { rows })
    }

    pub fn parse_payload(&self, payload: &RawPayload) -> Result<Vec<ListingRow>, ParseFailure> {
        let hint = payload.court_hint.as_deref();
        match &payload.body {
            PayloadBody::Html(markup) => {
                html::parse_html(markup, &payload.source_url, hint, self.current_year)
            }
            PayloadBody::JsonEnvelope(json) => {
                let fragment = html::unwrap_envelope(json)?;
                html::parse_html(&fragment, &payload.source_url, hint, self.current_year)
            }
            PayloadBody::Pdf(bytes) => {
                if bytes.is_empty() {
                    return Err(ParseFailure::EmptyPayload);
                }
                let text = self.pdf.extract_text(bytes)?;
                pdf::parse_pdf_text(&text, hint, self.current_year)
            }
        }
    }
}
