use saldo_core::{StoredTransaction, TransactionId};

/// Greedily pairs movements that look like one transfer between two of the
/// user's accounts: opposite directions, identical amounts, different
/// accounts, dates at most `window_days` apart. Already linked transactions
/// are left alone and each transaction joins at most one pair.
pub fn pair_transfers(
    candidates: &[StoredTransaction],
    window_days: u64,
) -> Vec<(TransactionId, TransactionId)> {
    let mut taken = vec![false; candidates.len()];
    let mut pairs = Vec::new();

    for (i, left) in candidates.iter().enumerate() {
        if taken[i] || left.transfer_link_id.is_some() {
            continue;
        }
        let partner = candidates.iter().enumerate().skip(i + 1).find(|(j, right)| {
            !taken[*j]
                && right.transfer_link_id.is_none()
                && right.account_id != left.account_id
                && right.direction == left.direction.opposite()
                && right.amount == left.amount
                && (right.date - left.date).num_days().unsigned_abs() <= window_days
        });
        if let Some((j, right)) = partner {
            taken[i] = true;
            taken[j] = true;
            pairs.push((left.id, right.id));
        }
    }

    pairs
}
