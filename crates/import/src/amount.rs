use rust_decimal::Decimal;
use saldo_core::{Direction, Money};
use std::str::FromStr;

/// Parses a signed amount as banks print it.
///
/// Currency symbols and whitespace are ignored and `(12.50)` is negative.
/// When both separators appear, the last one is the decimal mark
/// (`1.234,56` and `1,234.56` are the same value). A lone comma is always
/// decimal (`150,00`).
pub fn parse_amount(raw: &str) -> Option<Money> {
    let compact: String = raw.chars().filter(|c| !c.is_whitespace()).collect();
    let compact = compact.replace("R$", "").replace(['$', '€', '£'], "");

    let (negative, body) = match compact.strip_prefix('(').and_then(|s| s.strip_suffix(')')) {
        Some(inner) => (true, inner),
        None => (false, compact.as_str()),
    };
    let body = body.strip_prefix('+').unwrap_or(body);
    if body.is_empty() {
        return None;
    }

    let normalized = match (body.rfind(','), body.rfind('.')) {
        (Some(comma), Some(dot)) if dot > comma => body.replace(',', ""),
        (Some(_), _) => body.replace('.', "").replace(',', "."),
        (None, _) => body.to_string(),
    };

    let value = Decimal::from_str(&normalized).ok()?;
    let money = Money::from_decimal(value);
    Some(if negative { -money } else { money })
}

/// Direction from a free-text type column. Anything that does not read as
/// a credit is an outflow.
pub fn direction_from_kind(kind: &str) -> Direction {
    let kind = kind.trim().to_lowercase();
    const INFLOW_WORDS: &[&str] = &["credit", "crédito", "credito", "receita", "entrada"];
    if INFLOW_WORDS.iter().any(|w| kind.contains(w)) {
        Direction::Inflow
    } else {
        Direction::Outflow
    }
}
