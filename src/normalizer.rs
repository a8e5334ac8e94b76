// =============================================================================
// normalizer.rs — ONE CASE, NINE SPELLINGS
// =============================================================================
//
// The same case shows up as "CRL/45/2022", "Crl. No. 45 of 2022",
// "CRL 0045/22" and, on a good day, as a CNR like "MH01-001234-2023". Users
// type it one way, the portal prints it another way, and the matcher needs
// both to collapse into the same key.
//
// Everything in this module is pure. No network, no clock: the caller passes
// the current year in, so validation of "plausible year" is deterministic.
//
// CNR shape (after stripping separators and uppercasing):
//
//   MH 01      001234 2023      14 chars: state, district, serial, year
//   DL CT01    123456 2023      16 chars: state, district+establishment, ...
//
// The last ten characters are always digits: a six-digit serial and the
// four-digit filing year.
// =============================================================================

use regex::Regex;
use std::sync::LazyLock;

use crate::error::{EngineError, IdentifierField};
use crate::models::{CaseIdentifier, CaseNumber, Cnr, RawIdentifier};

/// Nothing older than this is on anybody's cause list.
pub const MIN_CASE_YEAR: i32 = 1950;

static CNR_COMPACT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Z]{2}[A-Z0-9]{2}(?:[A-Z0-9]{2})?[0-9]{10}$").expect("valid CNR regex")
});

/// A CNR embedded in free text, separators allowed between the blocks.
static CNR_IN_TEXT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b([A-Z]{2}[A-Z0-9]{2}(?:[A-Z0-9]{2})?)[-/ ]?([0-9]{6})[-/ ]?([0-9]{4})\b")
        .expect("valid embedded CNR regex")
});

/// "CRL/45/2022", "Crl.A. No. 45 of 2022", "CS 0045/22", "RCA-12-2019".
static RENDERED_CASE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b([A-Z][A-Z.()&\- ]{0,24}?)\s*(?:NO\.?\s*)?[/\-\s]?\s*([0-9]{1,7})\s*(?:/|-|\bOF\b|\s)\s*([0-9]{4}|[0-9]{2})\b",
    )
    .expect("valid rendered case regex")
});

/// Turn whatever the user gave us into a canonical identifier.
pub fn normalize(raw: &RawIdentifier, current_year: i32) -> Result<CaseIdentifier, EngineError> {
    match raw {
        RawIdentifier::Cnr { cnr } => Ok(CaseIdentifier::Cnr {
            cnr: normalize_cnr(cnr, current_year)?,
        }),
        RawIdentifier::Case {
            case_type,
            case_number,
            case_year,
        } => Ok(CaseIdentifier::Case(normalize_case(
            case_type,
            case_number,
            case_year,
            current_year,
        )?)),
    }
}

/// Validate and canonicalize a CNR string.
pub fn normalize_cnr(raw: &str, current_year: i32) -> Result<Cnr, EngineError> {
    let compact = compact_cnr(raw);
    if compact.is_empty() {
        return Err(EngineError::invalid(IdentifierField::Cnr, "CNR is empty"));
    }
    if compact.len() != 14 && compact.len() != 16 {
        return Err(EngineError::invalid(
            IdentifierField::Cnr,
            format!(
                "CNR must be 14 or 16 characters without separators, got {}",
                compact.len()
            ),
        ));
    }
    if !CNR_COMPACT.is_match(&compact) {
        return Err(EngineError::invalid(
            IdentifierField::Cnr,
            "CNR must be a state code, court code, six-digit serial and four-digit year",
        ));
    }

    let year: i32 = compact[compact.len() - 4..].parse().unwrap_or(0);
    if !year_in_range(year, current_year) {
        return Err(EngineError::invalid(
            IdentifierField::Cnr,
            format!(
                "filing year {} is outside {}..={}",
                year,
                MIN_CASE_YEAR,
                current_year + 1
            ),
        ));
    }

    Ok(Cnr::new_unchecked(compact))
}

/// Validate and canonicalize a type/number/year triple.
pub fn normalize_case(
    case_type: &str,
    case_number: &str,
    case_year: &str,
    current_year: i32,
) -> Result<CaseNumber, EngineError> {
    let canonical_type = canonical_case_type(case_type);
    if canonical_type.is_empty() {
        return Err(EngineError::invalid(
            IdentifierField::CaseType,
            "case type is empty",
        ));
    }

    let number_text = case_number.trim();
    if number_text.is_empty() {
        return Err(EngineError::invalid(
            IdentifierField::CaseNumber,
            "case number is empty",
        ));
    }
    let number = canonical_number(number_text).ok_or_else(|| {
        EngineError::invalid(
            IdentifierField::CaseNumber,
            format!("case number '{}' is not numeric", number_text),
        )
    })?;
    if number == 0 {
        return Err(EngineError::invalid(
            IdentifierField::CaseNumber,
            "case number must be positive",
        ));
    }

    let year_text = case_year.trim();
    if year_text.is_empty() {
        return Err(EngineError::invalid(
            IdentifierField::CaseYear,
            "case year is empty",
        ));
    }
    if !year_text.bytes().all(|b| b.is_ascii_digit()) {
        return Err(EngineError::invalid(
            IdentifierField::CaseYear,
            format!("case year '{}' is not numeric", year_text),
        ));
    }
    let year = canonical_year(year_text, current_year).ok_or_else(|| {
        EngineError::invalid(
            IdentifierField::CaseYear,
            format!(
                "case year '{}' is outside {}..={}",
                year_text,
                MIN_CASE_YEAR,
                current_year + 1
            ),
        )
    })?;

    Ok(CaseNumber {
        case_type: canonical_type,
        number,
        year,
    })
}

/// Uppercase and strip separators. Does not validate.
pub fn compact_cnr(raw: &str) -> String {
    raw.chars()
        .filter(|c| !matches!(c, '-' | '/' | '.' | '_') && !c.is_whitespace())
        .map(|c| c.to_ascii_uppercase())
        .collect()
}

/// "Crl. A." -> "CRLA", "m.a.c.p" -> "MACP".
pub fn canonical_case_type(raw: &str) -> String {
    raw.chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_uppercase())
        .collect()
}

/// "0045" -> 45. Anything that isn't all digits is rejected.
pub fn canonical_number(raw: &str) -> Option<u64> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || !trimmed.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let significant = trimmed.trim_start_matches('0');
    if significant.is_empty() {
        return Some(0);
    }
    significant.parse().ok()
}

/// Four-digit years pass through, two-digit years pick the century that keeps
/// them no later than next year. Out-of-range years are rejected.
pub fn canonical_year(raw: &str, current_year: i32) -> Option<u16> {
    let trimmed = raw.trim();
    if !trimmed.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let year: i32 = match trimmed.len() {
        4 => trimmed.parse().ok()?,
        2 => {
            let yy: i32 = trimmed.parse().ok()?;
            let century = (current_year + 1) / 100 * 100;
            if century + yy <= current_year + 1 {
                century + yy
            } else {
                century - 100 + yy
            }
        }
        _ => return None,
    };
    if year_in_range(year, current_year) {
        u16::try_from(year).ok()
    } else {
        None
    }
}

fn year_in_range(year: i32, current_year: i32) -> bool {
    (MIN_CASE_YEAR..=current_year + 1).contains(&year)
}

// =============================================================================
// Identifiers as the portal renders them
// =============================================================================

/// A case reference pulled out of a listing cell or PDF line. Fields are kept
/// as printed; the matcher canonicalizes them.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RenderedCase {
    /// The matched text, trimmed.
    pub text: String,
    pub case_type: Option<String>,
    pub case_number: Option<String>,
    /// None when the year was missing or implausible.
    pub case_year: Option<String>,
    pub cnr: Option<String>,
    /// Byte offset just past the rendered case in the input.
    pub end: usize,
}

/// Find the first case reference (triple and/or CNR) in a piece of text.
pub fn parse_rendered_case(text: &str, current_year: i32) -> Option<RenderedCase> {
    let mut rendered = RenderedCase::default();

    // ASCII uppercasing keeps byte offsets identical to the input.
    let upper = text.to_ascii_uppercase();
    let mut cnr_span = None;
    if let Some(caps) = CNR_IN_TEXT.captures(&upper) {
        let candidate = format!("{}{}{}", &caps[1], &caps[2], &caps[3]);
        if normalize_cnr(&candidate, current_year).is_ok() {
            if let Some(whole) = caps.get(0) {
                rendered.text = text[whole.range()].trim().to_string();
                rendered.end = whole.end();
                cnr_span = Some(whole.range());
            }
            rendered.cnr = Some(candidate);
        }
    }

    for caps in RENDERED_CASE.captures_iter(text) {
        let (Some(whole), Some(kind), Some(number), Some(year)) =
            (caps.get(0), caps.get(1), caps.get(2), caps.get(3))
        else {
            continue;
        };
        if let Some(span) = &cnr_span {
            if whole.start() < span.end && span.start < whole.end() {
                continue;
            }
        }
        let kind_offset = case_type_start(kind.as_str());
        let kind_text = kind.as_str()[kind_offset..].trim();
        let canonical = canonical_case_type(kind_text);
        // "No. 45 of 2022" on its own has no case type worth the name.
        if canonical.is_empty() || canonical == "NO" || canonical == "OF" {
            continue;
        }
        rendered.case_type = Some(kind_text.to_string());
        rendered.case_number = Some(number.as_str().to_string());
        rendered.case_year = canonical_year(year.as_str(), current_year)
            .map(|_| year.as_str().to_string());
        if rendered.cnr.is_none() {
            rendered.text = text[kind.start() + kind_offset..whole.end()].trim().to_string();
        }
        rendered.end = rendered.end.max(whole.end());
        break;
    }

    if rendered.cnr.is_none() && rendered.case_type.is_none() {
        None
    } else {
        Some(rendered)
    }
}

/// The regex is leftmost, so "Ramesh vs State CRL/45/2022" hands us the
/// whole run of words as the case type. Keep only the trailing tokens that
/// look like an abbreviation (dotted, or no lowercase letters).
fn case_type_start(kind: &str) -> usize {
    let trimmed = kind.trim_end();
    let mut start = trimmed.len();
    let mut rest = trimmed;
    loop {
        let token_start = rest.rfind(' ').map(|i| i + 1).unwrap_or(0);
        let token = &rest[token_start..];
        if !looks_like_case_type(token) {
            break;
        }
        start = token_start;
        if token_start == 0 {
            break;
        }
        rest = rest[..token_start].trim_end();
    }
    if start == trimmed.len() {
        start = trimmed.rfind(' ').map(|i| i + 1).unwrap_or(0);
    }
    start
}

fn looks_like_case_type(token: &str) -> bool {
    token.chars().any(|c| c.is_ascii_alphabetic())
        && (token.contains('.') || !token.chars().any(|c| c.is_ascii_lowercase()))
}
