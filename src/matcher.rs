// =============================================================================
// matcher.rs — IS IT THERE?
// =============================================================================
//
// One pass over the rows, comparing canonical forms. A CNR target only ever
// matches a row that printed a CNR. A type/number/year target matches rows
// whose type and number agree, and whose year agrees or was never printed.
//
// Two matching rows is not something we get to decide between. The caller
// gets every candidate, in listing order, and a human picks.
// =============================================================================

use tracing::debug;

use crate::models::{CaseIdentifier, CaseNumber, Cnr, ListingRow, MatchResult};
use crate::normalizer::{canonical_case_type, canonical_number, canonical_year, compact_cnr};

/// Find the target in the listing.
pub fn match_case(target: &CaseIdentifier, rows: &[ListingRow], current_year: i32) -> MatchResult {
    let mut matches: Vec<&ListingRow> = Vec::new();
    for row in rows {
        let hit = match target {
            CaseIdentifier::Cnr { cnr } => row_has_cnr(row, cnr),
            CaseIdentifier::Case(case) => row_has_case(row, case, current_year),
        };
        if hit {
            matches.push(row);
        }
    }

    debug!(
        target = %target,
        rows = rows.len(),
        matches = matches.len(),
        "listing matched"
    );

    match matches.as_slice() {
        [] => MatchResult::NotListed,
        [row] => MatchResult::Listed {
            serial_number: row.serial_number,
            court_name: row.court_name.clone(),
            row: (*row).clone(),
        },
        _ => MatchResult::Ambiguous {
            candidates: matches.into_iter().cloned().collect(),
        },
    }
}

fn row_has_cnr(row: &ListingRow, target: &Cnr) -> bool {
    row.cnr
        .as_deref()
        .map(|cnr| compact_cnr(cnr) == target.as_str())
        .unwrap_or(false)
}

fn row_has_case(row: &ListingRow, target: &CaseNumber, current_year: i32) -> bool {
    let (Some(case_type), Some(number)) = (row.case_type.as_deref(), row.case_number.as_deref())
    else {
        return false;
    };
    if canonical_case_type(case_type) != target.case_type {
        return false;
    }
    if canonical_number(number) != Some(target.number) {
        return false;
    }
    match row.case_year.as_deref() {
        None => true,
        Some(year) => canonical_year(year, current_year) == Some(target.year),
    }
}
