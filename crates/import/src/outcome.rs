use saldo_core::{Direction, Money, ParsedRecord};
use serde::Serialize;
use thiserror::Error;

/// Failures that abort a whole file. Per-row problems never end up here.
#[derive(Error, Debug)]
pub enum ParseError {
    #[error("File is empty")]
    Empty,
    #[error("File encoding is unreadable")]
    Unreadable,
    #[error("File is {size} bytes, limit is {limit}")]
    TooLarge { size: usize, limit: usize },
    #[error("Delimiter must be a single ASCII character, got {0:?}")]
    InvalidDelimiter(char),
    #[error("Unsupported statement format: {0}")]
    UnsupportedFormat(String),
}

/// Records a parser produced plus everything it had to skip.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ParseOutcome {
    pub records: Vec<ParsedRecord>,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ParseSummary {
    pub total: usize,
    pub inflows: usize,
    pub outflows: usize,
    pub net: Money,
}

impl ParseOutcome {
    pub fn summary(&self) -> ParseSummary {
        let inflows = self
            .records
            .iter()
            .filter(|r| r.direction == Direction::Inflow)
            .count();
        ParseSummary {
            total: self.records.len(),
            inflows,
            outflows: self.records.len() - inflows,
            net: self.records.iter().map(ParsedRecord::signed_amount).sum(),
        }
    }

    pub fn is_clean(&self) -> bool {
        self.errors.is_empty() && self.warnings.is_empty()
    }
}

/// Rejects input over `limit` bytes before any parsing work.
pub fn check_size(bytes: &[u8], limit: usize) -> Result<(), ParseError> {
    if bytes.len() > limit {
        return Err(ParseError::TooLarge { size: bytes.len(), limit });
    }
    Ok(())
}
