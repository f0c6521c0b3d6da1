use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use saldo_core::validate::{parse_iso_date, MAX_AMOUNT_CENTS};
use saldo_core::{AccountId, DdaStatus, Direction, Money, NewDdaInstrument, ParsedRecord, UserId};

use crate::outcome::ParseOutcome;

/// Account as reported by the aggregator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderAccount {
    pub id: String,
    pub balance: f64,
    #[serde(default)]
    pub name: Option<String>,
    /// `BANK` or `CREDIT`.
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
}

impl ProviderAccount {
    pub fn is_credit_card(&self) -> bool {
        self.kind
            .as_deref()
            .is_some_and(|k| k.eq_ignore_ascii_case("CREDIT"))
    }
}

/// Transaction as reported by the aggregator. `amount` is signed, negative
/// for money leaving the account, unless `kind` says otherwise.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderTransaction {
    pub id: String,
    #[serde(default)]
    pub account_id: Option<String>,
    /// ISO date, possibly with a time part.
    pub date: String,
    pub description: String,
    pub amount: f64,
    #[serde(default)]
    pub balance: Option<f64>,
    /// `POSTED` or `PENDING`. Absent means posted.
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    /// `DEBIT` or `CREDIT`; wins over the amount's sign when present.
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
}

impl ProviderTransaction {
    pub fn is_posted(&self) -> bool {
        self.status
            .as_deref()
            .map_or(true, |s| s.eq_ignore_ascii_case("POSTED"))
    }
}

/// Direct-debit boleto as reported by the aggregator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderBoleto {
    pub id: String,
    #[serde(default)]
    pub account_id: Option<String>,
    #[serde(default)]
    pub beneficiary_name: Option<String>,
    #[serde(default)]
    pub payer_name: Option<String>,
    pub amount: f64,
    pub due_date: String,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub digitable_line: Option<String>,
}

/// One account's worth of aggregator data, already fetched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AggregatorSnapshot {
    /// Authoritative current balance, when the provider reported one.
    pub balance: Option<Money>,
    pub transactions: Vec<ProviderTransaction>,
    /// Card accounts get their credit/debit signs corrected.
    #[serde(default)]
    pub credit_card: bool,
}

pub fn money_from_f64(value: f64) -> Option<Money> {
    Decimal::from_f64(value).map(Money::from_decimal)
}

// ── credit card sign correction ──────────────────────────────────────────────

const EXPENSE_CATEGORIES: &[&str] = &[
    "transport", "transporte", "food", "alimentação", "restaurantes", "shopping", "compras",
    "vestuário", "health", "saúde", "education", "educação", "services", "serviços",
    "entertainment", "lazer", "entretenimento", "travel", "viagem", "home", "moradia", "casa",
    "taxes", "impostos", "pets", "animais", "personal care", "cuidados pessoais", "loans",
    "empréstimos", "investments", "investimentos", "others", "outros",
];

const PAYMENT_OR_REFUND: &[&str] = &["pagamento", "payment", "estorno", "refund", "credito", "crédito"];

/// Card issuers sometimes report purchases as credits. A credit on a card
/// account whose category reads as an expense, and whose description is
/// not a payment or refund, is turned into a debit. Two description
/// overrides apply to every account.
pub fn corrected_direction(tx: &ProviderTransaction, direction: Direction, credit_card: bool) -> Direction {
    let description = tx.description.to_lowercase();
    if description.contains("renegociação de pendências") {
        return Direction::Outflow;
    }
    if description.contains("crédito de parcelamento") {
        return Direction::Inflow;
    }
    if !credit_card || direction != Direction::Inflow {
        return direction;
    }

    let category = tx.category.as_deref().unwrap_or_default().to_lowercase();
    let expense = EXPENSE_CATEGORIES.iter().any(|c| category.contains(c));
    let payment = PAYMENT_OR_REFUND.iter().any(|w| description.contains(w));
    if expense && !payment {
        Direction::Outflow
    } else {
        direction
    }
}

pub fn to_record(tx: &ProviderTransaction, credit_card: bool) -> Result<ParsedRecord, String> {
    let signed = money_from_f64(tx.amount)
        .ok_or_else(|| format!("transaction {}: amount {} is not a number", tx.id, tx.amount))?;
    let date = tx.date.get(..10).unwrap_or(&tx.date);

    let mut record = ParsedRecord::new(date, tx.description.trim(), signed);
    let reported = match tx.kind.as_deref() {
        Some(k) if k.eq_ignore_ascii_case("DEBIT") => Direction::Outflow,
        Some(k) if k.eq_ignore_ascii_case("CREDIT") => Direction::Inflow,
        _ => record.direction,
    };
    record.direction = corrected_direction(tx, reported, credit_card);
    record.external_document_id = Some(tx.id.clone());
    record.source_balance = tx.balance.and_then(money_from_f64);
    record.category_label = tx.category.clone().filter(|c| !c.trim().is_empty());
    record.cleared = tx.is_posted();
    Ok(record)
}

/// Maps a snapshot into the common parse result. Transactions that cannot
/// be represented become errors; the rest flow on to validation.
pub fn parse_snapshot(snapshot: &AggregatorSnapshot) -> ParseOutcome {
    let mut outcome = ParseOutcome::default();
    for tx in &snapshot.transactions {
        match to_record(tx, snapshot.credit_card) {
            Ok(record) => outcome.records.push(record),
            Err(e) => outcome.errors.push(e),
        }
    }
    outcome
}

// ── DDA boletos ──────────────────────────────────────────────────────────────

/// Checks and maps one boleto. Anything `PAID` is paid; every other status
/// is still pending.
pub fn boleto_to_dda(
    boleto: &ProviderBoleto,
    user: UserId,
    account: Option<AccountId>,
) -> Result<NewDdaInstrument, String> {
    let amount = money_from_f64(boleto.amount)
        .filter(|m| m.is_positive() && m.as_decimal() <= Decimal::new(MAX_AMOUNT_CENTS, 2))
        .ok_or_else(|| format!("boleto {}: invalid amount {}", boleto.id, boleto.amount))?;
    let due_date = boleto
        .due_date
        .get(..10)
        .and_then(parse_iso_date)
        .ok_or_else(|| format!("boleto {}: invalid due date '{}'", boleto.id, boleto.due_date))?;
    let status = match boleto.status.as_deref() {
        Some(s) if s.eq_ignore_ascii_case("PAID") => DdaStatus::Paid,
        _ => DdaStatus::Pending,
    };
    let description = [&boleto.beneficiary_name, &boleto.payer_name]
        .into_iter()
        .flatten()
        .map(|n| n.trim())
        .find(|n| !n.is_empty())
        .unwrap_or("Desconhecido");

    Ok(NewDdaInstrument {
        user_id: user,
        external_id: boleto.id.clone(),
        account_id: account,
        description: description.to_string(),
        amount,
        due_date,
        status,
        digitable_line: boleto.digitable_line.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn tx(json: &str) -> ProviderTransaction {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn deserializes_provider_payload() {
        let t = tx(r#"{"id":"tx-1","accountId":"acc-9","date":"2024-01-15T03:00:00.000Z",
            "description":"UBER *TRIP","amount":-23.4,"status":"POSTED","category":"Transport"}"#);
        assert_eq!(t.account_id.as_deref(), Some("acc-9"));
        assert!(t.is_posted());

        let record = to_record(&t, false).unwrap();
        assert_eq!(record.date, "2024-01-15");
        assert_eq!(record.amount, Money::from_cents(2340));
        assert_eq!(record.direction, Direction::Outflow);
        assert_eq!(record.external_document_id.as_deref(), Some("tx-1"));
        assert_eq!(record.category_label.as_deref(), Some("Transport"));
        assert!(record.cleared);
    }

    #[test]
    fn pending_status_is_not_cleared() {
        let t = tx(r#"{"id":"tx-2","date":"2024-01-15","description":"PIX","amount":10,"status":"PENDING"}"#);
        assert!(!to_record(&t, false).unwrap().cleared);
    }

    #[test]
    fn missing_status_counts_as_posted() {
        let t = tx(r#"{"id":"tx-3","date":"2024-01-15","description":"PIX","amount":10}"#);
        assert!(t.is_posted());
    }

    #[test]
    fn reported_type_wins_over_sign() {
        let t = tx(r#"{"id":"tx-4","date":"2024-01-15","description":"TARIFA","amount":9.9,"type":"DEBIT"}"#);
        let record = to_record(&t, false).unwrap();
        assert_eq!(record.direction, Direction::Outflow);
        assert_eq!(record.amount, Money::from_cents(990));
    }

    #[test]
    fn non_finite_amount_is_an_error() {
        let mut broken = tx(r#"{"id":"bad","date":"2024-01-15","description":"Broken","amount":0}"#);
        broken.amount = f64::NAN;
        let snapshot = AggregatorSnapshot {
            balance: None,
            transactions: vec![broken],
            credit_card: false,
        };
        let outcome = parse_snapshot(&snapshot);
        assert!(outcome.records.is_empty());
        assert_eq!(outcome.errors.len(), 1);
    }

    // ── card sign correction ──────────────────────────────────────────────────

    #[test]
    fn card_credit_in_expense_category_becomes_debit() {
        let t = tx(r#"{"id":"c-1","date":"2024-01-15","description":"IFOOD *RESTAURANTE",
            "amount":45.0,"type":"CREDIT","category":"Food and drinks"}"#);
        assert_eq!(to_record(&t, true).unwrap().direction, Direction::Outflow);
        assert_eq!(to_record(&t, false).unwrap().direction, Direction::Inflow);
    }

    #[test]
    fn card_payments_and_refunds_keep_their_credit() {
        for desc in ["PAGAMENTO RECEBIDO", "Estorno IFOOD"] {
            let mut t = tx(r#"{"id":"c-2","date":"2024-01-15","description":"x",
                "amount":45.0,"type":"CREDIT","category":"Shopping"}"#);
            t.description = desc.to_string();
            assert_eq!(to_record(&t, true).unwrap().direction, Direction::Inflow, "{desc}");
        }
        let uncategorized = tx(r#"{"id":"c-3","date":"2024-01-15","description":"AJUSTE","amount":5.0}"#);
        assert_eq!(to_record(&uncategorized, true).unwrap().direction, Direction::Inflow);
    }

    #[test]
    fn description_overrides_apply_to_every_account() {
        let reneg = tx(r#"{"id":"o-1","date":"2024-01-15","description":"Renegociação de Pendências","amount":300.0}"#);
        assert_eq!(to_record(&reneg, false).unwrap().direction, Direction::Outflow);
        let parcel = tx(r#"{"id":"o-2","date":"2024-01-15","description":"CRÉDITO DE PARCELAMENTO","amount":-300.0}"#);
        assert_eq!(to_record(&parcel, true).unwrap().direction, Direction::Inflow);
    }

    // ── boletos ───────────────────────────────────────────────────────────────

    fn boleto(json: &str) -> ProviderBoleto {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn boleto_maps_to_instrument() {
        let b = boleto(r#"{"id":"b-1","accountId":"acc-1","beneficiaryName":" ENEL SP ",
            "amount":189.9,"dueDate":"2024-04-10T00:00:00.000Z","status":"OPEN","digitableLine":"8364"}"#);
        let dda = boleto_to_dda(&b, UserId(1), Some(AccountId(3))).unwrap();
        assert_eq!(dda.external_id, "b-1");
        assert_eq!(dda.description, "ENEL SP");
        assert_eq!(dda.amount, Money::from_cents(18990));
        assert_eq!(dda.due_date, NaiveDate::from_ymd_opt(2024, 4, 10).unwrap());
        assert_eq!(dda.status, DdaStatus::Pending);
        assert_eq!(dda.account_id, Some(AccountId(3)));
        assert_eq!(dda.digitable_line.as_deref(), Some("8364"));
    }

    #[test]
    fn boleto_name_falls_back_and_paid_is_recognised() {
        let b = boleto(r#"{"id":"b-2","payerName":"Fulano","amount":10,"dueDate":"2024-04-10","status":"paid"}"#);
        let dda = boleto_to_dda(&b, UserId(1), None).unwrap();
        assert_eq!(dda.description, "Fulano");
        assert_eq!(dda.status, DdaStatus::Paid);

        let anonymous = boleto(r#"{"id":"b-3","amount":10,"dueDate":"2024-04-10"}"#);
        assert_eq!(boleto_to_dda(&anonymous, UserId(1), None).unwrap().description, "Desconhecido");
    }

    #[test]
    fn bad_boletos_are_rejected() {
        for json in [
            r#"{"id":"b-4","amount":0,"dueDate":"2024-04-10"}"#,
            r#"{"id":"b-5","amount":1e28,"dueDate":"2024-04-10"}"#,
            r#"{"id":"b-6","amount":10,"dueDate":"10/04/2024"}"#,
        ] {
            assert!(boleto_to_dda(&boleto(json), UserId(1), None).is_err(), "{json}");
        }
    }
}
