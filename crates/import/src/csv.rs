use saldo_core::config::{ColumnMap, DelimitedConfig};
use saldo_core::validate::parse_iso_date;
use saldo_core::{Direction, HeaderMode, ParsedRecord};

use crate::amount::{direction_from_kind, parse_amount};
use crate::outcome::{ParseError, ParseOutcome};
use crate::text;

/// Parses a delimited bank export.
///
/// Malformed rows become warnings naming their 1-based line; only an empty
/// or undecodable file fails outright.
pub fn parse(bytes: &[u8], config: &DelimitedConfig) -> Result<ParseOutcome, ParseError> {
    if !config.delimiter.is_ascii() {
        return Err(ParseError::InvalidDelimiter(config.delimiter));
    }
    let (content, encoding_warning) = text::decode(bytes)?;

    let mut outcome = ParseOutcome::default();
    outcome.warnings.extend(encoding_warning);

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .delimiter(config.delimiter as u8)
        .from_reader(content.as_bytes());

    for (index, result) in reader.records().enumerate() {
        let row = match result {
            Ok(row) => row,
            Err(e) => {
                let line = e.position().map_or(index as u64 + 1, |p| p.line());
                outcome.warnings.push(format!("Line {line} skipped: {e}"));
                continue;
            }
        };
        let line = row.position().map_or(index as u64 + 1, |p| p.line());

        if index == 0 && is_header(&row, config) {
            continue;
        }
        if row.iter().all(|f| f.is_empty()) {
            continue;
        }

        match parse_row(&row, &config.columns) {
            Ok(record) => outcome.records.push(record),
            Err(reason) => outcome.warnings.push(format!("Line {line} skipped: {reason}")),
        }
    }

    Ok(outcome)
}

fn is_header(row: &csv::StringRecord, config: &DelimitedConfig) -> bool {
    match config.header {
        HeaderMode::Present => true,
        HeaderMode::Absent => false,
        HeaderMode::Auto => row
            .get(config.columns.date)
            .map(|f| parse_iso_date(&normalize_date(clean(f))).is_none())
            .unwrap_or(true),
    }
}

fn parse_row(row: &csv::StringRecord, columns: &ColumnMap) -> Result<ParsedRecord, String> {
    let field = |col: usize| row.get(col).map(clean).filter(|s| !s.is_empty());

    let date = field(columns.date).ok_or("missing date")?;
    let description = field(columns.description).ok_or("missing description")?;
    let amount_text = field(columns.amount).ok_or("missing amount")?;
    let signed = parse_amount(amount_text).ok_or_else(|| format!("invalid amount '{amount_text}'"))?;

    let direction = columns
        .kind
        .and_then(field)
        .map(direction_from_kind)
        .unwrap_or_else(|| Direction::from_signed(signed));

    let mut record = ParsedRecord::new(normalize_date(date), description, signed);
    record.direction = direction;
    record.source_balance = columns.balance.and_then(field).and_then(parse_amount);
    Ok(record)
}

fn clean(field: &str) -> &str {
    field.trim().trim_matches('"').trim()
}

/// `DD/MM/YYYY` becomes `YYYY-MM-DD`; anything else passes through for the
/// validator to judge.
pub fn normalize_date(raw: &str) -> String {
    let parts: Vec<&str> = raw.split('/').map(str::trim).collect();
    match parts.as_slice() {
        [day, month, year] => format!("{year}-{month:0>2}-{day:0>2}"),
        _ => raw.trim().to_string(),
    }
}
