use regex::Regex;
use std::sync::OnceLock;

use saldo_core::ParsedRecord;

use crate::amount::parse_amount;
use crate::outcome::{ParseError, ParseOutcome};
use crate::text;

macro_rules! re {
    ($name:ident, $pat:expr) => {
        fn $name() -> &'static Regex {
            static R: OnceLock<Regex> = OnceLock::new();
            R.get_or_init(|| Regex::new($pat).expect("invalid regex"))
        }
    };
}

re!(re_block, r"(?is)<STMTTRN>(.*?)</STMTTRN>");
re!(re_field, r"(?i)<(TRNTYPE|DTPOSTED|TRNAMT|FITID|MEMO|NAME)>([^<\r\n]*)");

/// Fields of one `<STMTTRN>` block. Later duplicates of a tag are ignored.
#[derive(Debug, Default)]
struct Block {
    posted: Option<String>,
    amount: Option<String>,
    fit_id: Option<String>,
    memo: Option<String>,
    name: Option<String>,
}

impl Block {
    fn scan(body: &str) -> Self {
        let mut block = Block::default();
        for cap in re_field().captures_iter(body) {
            let value = cap[2].trim();
            if value.is_empty() {
                continue;
            }
            let slot = match cap[1].to_ascii_uppercase().as_str() {
                "DTPOSTED" => &mut block.posted,
                "TRNAMT" => &mut block.amount,
                "FITID" => &mut block.fit_id,
                "MEMO" => &mut block.memo,
                "NAME" => &mut block.name,
                _ => continue,
            };
            slot.get_or_insert_with(|| value.to_string());
        }
        block
    }
}

/// Parses an OFX statement (SGML or XML flavoured) by scanning tags.
///
/// A block missing its date, amount or description is skipped with a
/// warning. A block whose date or amount is present but malformed is an
/// error for that block only.
pub fn parse(bytes: &[u8]) -> Result<ParseOutcome, ParseError> {
    let (content, encoding_warning) = text::decode(bytes)?;

    let mut outcome = ParseOutcome::default();
    outcome.warnings.extend(encoding_warning);

    let mut seen = 0usize;
    for (index, cap) in re_block().captures_iter(&content).enumerate() {
        seen += 1;
        let number = index + 1;
        let block = Block::scan(&cap[1]);

        let description = block.memo.clone().or_else(|| block.name.clone());
        let (Some(posted), Some(amount), Some(description)) =
            (block.posted.as_deref(), block.amount.as_deref(), description)
        else {
            outcome
                .warnings
                .push(format!("Transaction {number} skipped: incomplete <STMTTRN> block"));
            continue;
        };

        let Some(date) = ofx_date(posted) else {
            outcome
                .errors
                .push(format!("Transaction {number}: invalid DTPOSTED '{posted}'"));
            continue;
        };
        let Some(signed) = parse_amount(amount) else {
            outcome
                .errors
                .push(format!("Transaction {number}: invalid TRNAMT '{amount}'"));
            continue;
        };

        let mut record = ParsedRecord::new(date, description, signed);
        record.external_document_id = block.fit_id;
        outcome.records.push(record);
    }

    if seen == 0 {
        outcome
            .warnings
            .push("No <STMTTRN> transactions found".to_string());
    }

    Ok(outcome)
}

/// `YYYYMMDD[hhmmss[.xxx][tz]]` to `YYYY-MM-DD`. Only the digits are checked
/// here; calendar validity is left to the validator.
fn ofx_date(raw: &str) -> Option<String> {
    let digits = raw.get(..8)?;
    if !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    Some(format!("{}-{}-{}", &digits[..4], &digits[4..6], &digits[6..8]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use saldo_core::{Direction, Money};

    const SAMPLE: &str = "OFXHEADER:100\nDATA:OFXSGML\n<OFX>\n<BANKTRANLIST>\n\
<STMTTRN>\n<TRNTYPE>DEBIT\n<DTPOSTED>20240115\n<TRNAMT>-45.90\n<FITID>ABC123\n<MEMO>PADARIA PAO QUENTE\n</STMTTRN>\n\
<STMTTRN>\n<TRNTYPE>CREDIT\n<DTPOSTED>20240116120000[-3:BRT]\n<TRNAMT>1500.00\n<FITID>ABC124\n<NAME>PIX RECEBIDO\n</STMTTRN>\n\
</BANKTRANLIST>\n</OFX>\n";

    // ── dates ────────────────────────────────────────────────────────────────

    #[test]
    fn ofx_date_keeps_first_eight_digits() {
        assert_eq!(ofx_date("20240115").as_deref(), Some("2024-01-15"));
        assert_eq!(ofx_date("20240115120000[-5:EST]").as_deref(), Some("2024-01-15"));
        assert_eq!(ofx_date("2024-01-15"), None);
        assert_eq!(ofx_date("2024"), None);
    }

    // ── whole documents ──────────────────────────────────────────────────────

    #[test]
    fn parses_sgml_statement() {
        let outcome = parse(SAMPLE.as_bytes()).unwrap();
        assert!(outcome.is_clean(), "{outcome:?}");
        assert_eq!(outcome.records.len(), 2);

        let debit = &outcome.records[0];
        assert_eq!(debit.date, "2024-01-15");
        assert_eq!(debit.amount, Money::from_cents(4590));
        assert_eq!(debit.direction, Direction::Outflow);
        assert_eq!(debit.description, "PADARIA PAO QUENTE");
        assert_eq!(debit.external_document_id.as_deref(), Some("ABC123"));

        let credit = &outcome.records[1];
        assert_eq!(credit.date, "2024-01-16");
        assert_eq!(credit.direction, Direction::Inflow);
        assert_eq!(credit.description, "PIX RECEBIDO");
    }

    #[test]
    fn xml_closing_tags_are_tolerated() {
        let doc = "<OFX><STMTTRN><DTPOSTED>20240201</DTPOSTED><TRNAMT>-10.00</TRNAMT>\
<MEMO>Farmacia</MEMO></STMTTRN></OFX>";
        let outcome = parse(doc.as_bytes()).unwrap();
        assert_eq!(outcome.records.len(), 1);
        assert_eq!(outcome.records[0].description, "Farmacia");
    }

    #[test]
    fn memo_wins_over_name() {
        let doc = "<STMTTRN><DTPOSTED>20240201<TRNAMT>-10.00<NAME>Nome<MEMO>Memo</STMTTRN>";
        let outcome = parse(doc.as_bytes()).unwrap();
        assert_eq!(outcome.records[0].description, "Memo");
    }

    #[test]
    fn incomplete_block_warns_and_malformed_block_errors() {
        let doc = "<STMTTRN><DTPOSTED>20240201<MEMO>Sem valor</STMTTRN>\
<STMTTRN><DTPOSTED>ontem<TRNAMT>-1.00<MEMO>Data ruim</STMTTRN>\
<STMTTRN><DTPOSTED>20240203<TRNAMT>dez<MEMO>Valor ruim</STMTTRN>\
<STMTTRN><DTPOSTED>20240204<TRNAMT>-2.00<MEMO>Tudo certo</STMTTRN>";
        let outcome = parse(doc.as_bytes()).unwrap();
        assert_eq!(outcome.records.len(), 1);
        assert_eq!(outcome.warnings.len(), 1);
        assert!(outcome.warnings[0].starts_with("Transaction 1"));
        assert_eq!(outcome.errors.len(), 2);
        assert!(outcome.errors[0].contains("DTPOSTED"));
        assert!(outcome.errors[1].contains("TRNAMT"));
    }

    #[test]
    fn no_blocks_is_a_warning_not_an_error() {
        let outcome = parse(b"<OFX></OFX>").unwrap();
        assert!(outcome.records.is_empty());
        assert_eq!(outcome.warnings.len(), 1);
    }
}
