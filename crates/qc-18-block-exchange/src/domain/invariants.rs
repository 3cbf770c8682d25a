//! Accounting and scheduling invariants for block exchange.

use super::{FairnessPolicy, Ledger, WantEntry};

/// INVARIANT-1: Debt Ratio Consistency
/// The reported debt ratio is always `bytes_sent / max(bytes_received, 1)`.
pub fn invariant_debt_ratio_consistent(ledger: &Ledger, reported: f64) -> bool {
    let expected = ledger.bytes_sent as f64 / ledger.bytes_received.max(1) as f64;
    reported == expected
}

/// INVARIANT-2: Monotonic Counters
/// Ledger counters never decrease between two observations of the same peer.
pub fn invariant_ledger_monotonic(before: &Ledger, after: &Ledger) -> bool {
    before.peer == after.peer
        && after.bytes_sent >= before.bytes_sent
        && after.bytes_received >= before.bytes_received
        && after.exchange_count >= before.exchange_count
}

/// INVARIANT-3: Unique Wants
/// A wantlist never holds two entries for the same (owner, key).
pub fn invariant_unique_wants(entries: &[WantEntry]) -> bool {
    let mut seen = std::collections::HashSet::with_capacity(entries.len());
    entries.iter().all(|e| seen.insert((e.owner, e.key)))
}

/// INVARIANT-4: Fairness Monotonicity
/// A higher debt ratio never yields a higher weight or a shorter delay.
pub fn invariant_fairness_monotonic(policy: &FairnessPolicy, lower: f64, higher: f64) -> bool {
    if lower > higher {
        return invariant_fairness_monotonic(policy, higher, lower);
    }
    policy.weight(higher) <= policy.weight(lower) && policy.delay(higher) >= policy.delay(lower)
}

/// Invariant check result.
#[derive(Debug, PartialEq, Eq)]
pub enum InvariantViolation {
    CounterDecreased,
    PeerMismatch,
    ExchangeCountSkipped,
}

/// Checks a single ledger update: same peer, no counter went down, and
/// exactly one exchange was recorded.
pub fn check_ledger_transition(before: &Ledger, after: &Ledger) -> Result<(), InvariantViolation> {
    if before.peer != after.peer {
        return Err(InvariantViolation::PeerMismatch);
    }

    if !invariant_ledger_monotonic(before, after) {
        return Err(InvariantViolation::CounterDecreased);
    }

    if after.exchange_count != before.exchange_count.saturating_add(1) {
        return Err(InvariantViolation::ExchangeCountSkipped);
    }

    Ok(())
}
