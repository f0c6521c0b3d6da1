use chrono::NaiveDate;

use saldo_core::{AccountId, CategorizedRecord, DateRange, Money, StoredTransaction, TransactionId};

/// Leading characters of a description that must appear in the other one.
pub const PREFIX_CHARS: usize = 20;
pub const AMOUNT_TOLERANCE_CENTS: i64 = 1;

/// The fields duplicate detection looks at.
#[derive(Debug, Clone, Copy)]
pub struct MatchKey<'a> {
    pub account_id: AccountId,
    pub date: NaiveDate,
    pub description: &'a str,
    pub amount: Money,
}

impl<'a> MatchKey<'a> {
    pub fn of_stored(tx: &'a StoredTransaction) -> Self {
        MatchKey {
            account_id: tx.account_id,
            date: tx.date,
            description: &tx.description,
            amount: tx.amount,
        }
    }

    pub fn of_record(account_id: AccountId, record: &'a CategorizedRecord) -> Self {
        MatchKey {
            account_id,
            date: record.record.date,
            description: record.record.description(),
            amount: record.record.amount(),
        }
    }
}

/// Symmetric likely-same-transaction check: same account and date, amounts
/// within a cent, and either description's 20-character prefix contained in
/// the other, ignoring case.
pub fn is_likely_duplicate(a: &MatchKey<'_>, b: &MatchKey<'_>) -> bool {
    if a.account_id != b.account_id || a.date != b.date {
        return false;
    }
    if (a.amount.to_cents() - b.amount.to_cents()).abs() > AMOUNT_TOLERANCE_CENTS {
        return false;
    }
    let a_text = a.description.trim().to_lowercase();
    let b_text = b.description.trim().to_lowercase();
    b_text.contains(prefix(&a_text)) || a_text.contains(prefix(&b_text))
}

fn prefix(text: &str) -> &str {
    match text.char_indices().nth(PREFIX_CHARS) {
        Some((end, _)) => &text[..end],
        None => text,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DuplicateDecision {
    Unique,
    DuplicateOf(TransactionId),
}

#[derive(Debug, Default)]
pub struct DuplicateSplit {
    pub unique: Vec<CategorizedRecord>,
    pub duplicates: Vec<(CategorizedRecord, TransactionId)>,
}

/// Splits incoming records for `account_id` into new and already stored.
///
/// Only stored transactions are compared against; two near-identical
/// records inside the same batch are both kept.
pub fn detect_duplicates(
    account_id: AccountId,
    incoming: Vec<CategorizedRecord>,
    existing: &[StoredTransaction],
) -> DuplicateSplit {
    let mut split = DuplicateSplit::default();
    for record in incoming {
        match decide(account_id, &record, existing) {
            DuplicateDecision::Unique => split.unique.push(record),
            DuplicateDecision::DuplicateOf(id) => split.duplicates.push((record, id)),
        }
    }
    split
}

pub fn decide(
    account_id: AccountId,
    record: &CategorizedRecord,
    existing: &[StoredTransaction],
) -> DuplicateDecision {
    let key = MatchKey::of_record(account_id, record);
    existing
        .iter()
        .find(|tx| is_likely_duplicate(&key, &MatchKey::of_stored(tx)))
        .map_or(DuplicateDecision::Unique, |tx| DuplicateDecision::DuplicateOf(tx.id))
}

/// Date range of stored transactions worth fetching for a batch: the
/// batch's own span widened by one day each side.
pub fn dedup_window(records: &[CategorizedRecord]) -> Option<DateRange> {
    DateRange::spanning(records.iter().map(|r| r.record.date)).map(|r| r.expand(1))
}

#[cfg(test)]
mod tests {
    use super::*;
    use saldo_core::{
        Confidence, Direction, ParsedRecord, ReconciliationStatus, SourceTag, ValidRecord,
    };

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, d).unwrap()
    }

    fn key(account: i64, day: u32, desc: &str, cents: i64) -> MatchKey<'_> {
        MatchKey {
            account_id: AccountId(account),
            date: date(day),
            description: desc,
            amount: Money::from_cents(cents),
        }
    }

    fn stored(id: i64, day: u32, desc: &str, cents: i64) -> StoredTransaction {
        StoredTransaction {
            id: TransactionId(id),
            account_id: AccountId(1),
            date: date(day),
            description: desc.to_string(),
            amount: Money::from_cents(cents),
            direction: Direction::Outflow,
            category_id: None,
            reconciliation_status: ReconciliationStatus::Pending,
            settlement_date: None,
            settlement_account_id: None,
            source: SourceTag::DelimitedFile,
            origin_external_id: None,
            transfer_link_id: None,
        }
    }

    fn incoming(day: u32, desc: &str, cents: i64) -> CategorizedRecord {
        let record = ParsedRecord::new(format!("2024-01-{day:02}"), desc, Money::from_cents(-cents));
        CategorizedRecord {
            record: ValidRecord { date: date(day), record },
            category_id: None,
            confidence: Confidence::None,
            suggested_category: None,
        }
    }

    // ── pairwise ─────────────────────────────────────────────────────────────

    #[test]
    fn long_prefix_contained_in_shorter_stored_text() {
        let a = key(1, 15, "PAG*MERCADO CENTRAL LTDA", 15000);
        let b = key(1, 15, "pag*mercado central lt", 15000);
        assert!(is_likely_duplicate(&a, &b));
        assert!(is_likely_duplicate(&b, &a));
    }

    #[test]
    fn one_cent_tolerance() {
        let a = key(1, 15, "Padaria", 1000);
        assert!(is_likely_duplicate(&a, &key(1, 15, "Padaria", 1001)));
        assert!(!is_likely_duplicate(&a, &key(1, 15, "Padaria", 1002)));
    }

    #[test]
    fn different_account_or_date_never_matches() {
        let a = key(1, 15, "Padaria", 1000);
        assert!(!is_likely_duplicate(&a, &key(2, 15, "Padaria", 1000)));
        assert!(!is_likely_duplicate(&a, &key(1, 16, "Padaria", 1000)));
    }

    #[test]
    fn unrelated_descriptions_do_not_match() {
        let a = key(1, 15, "Padaria Pao Bom", 1000);
        assert!(!is_likely_duplicate(&a, &key(1, 15, "Farmacia", 1000)));
    }

    #[test]
    fn prefix_counts_characters_not_bytes() {
        assert_eq!(prefix("ação ação ação ação ação"), "ação ação ação ação ");
        assert_eq!(prefix("curto"), "curto");
    }

    // ── batches ──────────────────────────────────────────────────────────────

    #[test]
    fn splits_batch_against_stored() {
        let existing = vec![stored(7, 15, "Mercado Central", 15000)];
        let split = detect_duplicates(
            AccountId(1),
            vec![
                incoming(15, "MERCADO CENTRAL", 15000),
                incoming(16, "Salario", 300000),
            ],
            &existing,
        );
        assert_eq!(split.unique.len(), 1);
        assert_eq!(split.duplicates.len(), 1);
        assert_eq!(split.duplicates[0].1, TransactionId(7));
    }

    #[test]
    fn in_batch_twins_are_both_kept() {
        let split = detect_duplicates(
            AccountId(1),
            vec![incoming(15, "Cafe", 500), incoming(15, "Cafe", 500)],
            &[],
        );
        assert_eq!(split.unique.len(), 2);
    }

    #[test]
    fn window_widens_batch_span_by_one_day() {
        let batch = vec![incoming(10, "a b c", 1), incoming(3, "a b c", 1)];
        let window = dedup_window(&batch).unwrap();
        assert_eq!(window.start, date(2));
        assert_eq!(window.end, date(11));
        assert!(dedup_window(&[]).is_none());
    }
}
