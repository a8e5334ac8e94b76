// =============================================================================
// causelist_engine — IS MY CASE ON TODAY?
// =============================================================================
//
// Takes a case identifier (a CNR, or a case type/number/year), asks the
// eCourts portal for today's or tomorrow's cause list, and answers with the
// serial number and court the case is listed in. Optionally brings back the
// case PDF and the full day's cause list.
//
// The portal is slow, inconsistent and occasionally lying. The engine is
// none of those things on purpose: it retries a little, parses strictly,
// and when it can't tell, it says so.
// =============================================================================

pub mod api;
pub mod assembler;
pub mod config;
pub mod engine;
pub mod error;
pub mod fetcher;
pub mod matcher;
pub mod models;
pub mod normalizer;
pub mod output;
pub mod parser;
pub mod retriever;
pub mod retry;
pub mod session;

#[cfg(test)]
mod test_support;

pub use config::Config;
pub use engine::{Engine, Resolution, ResolveRequest};
pub use error::EngineError;
pub use models::{DaySelector, RawIdentifier, ReportStatus, ResolutionReport};
