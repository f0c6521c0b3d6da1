pub mod aggregator;
pub mod amount;
pub mod categorize;
pub mod csv;
pub mod dedup;
pub mod ofx;
pub mod outcome;
pub mod text;
pub mod transfers;

pub use aggregator::{AggregatorSnapshot, ProviderAccount, ProviderBoleto, ProviderTransaction};
pub use categorize::{categorize, Categorizer, KeywordDictionary, Suggestion};
pub use dedup::{dedup_window, detect_duplicates, DuplicateSplit};
pub use outcome::{ParseError, ParseOutcome, ParseSummary};
pub use transfers::pair_transfers;

pub mod import {
    use saldo_core::config::{DelimitedConfig, Limits};
    use saldo_core::StatementFormat;

    use crate::outcome::{check_size, ParseError, ParseOutcome};

    /// Parses a text statement in one of the synchronously handled formats.
    /// External extraction is a separate async path.
    pub fn parse_statement(
        bytes: &[u8],
        format: StatementFormat,
        delimited: &DelimitedConfig,
        limits: &Limits,
    ) -> Result<ParseOutcome, ParseError> {
        match format {
            StatementFormat::DelimitedText => {
                check_size(bytes, limits.delimited_max_bytes)?;
                crate::csv::parse(bytes, delimited)
            }
            StatementFormat::OfxTags => {
                check_size(bytes, limits.ofx_max_bytes)?;
                crate::ofx::parse(bytes)
            }
            StatementFormat::ExternalExtraction => {
                Err(ParseError::UnsupportedFormat(format.as_str().to_string()))
            }
        }
    }
}
