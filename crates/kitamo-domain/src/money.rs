//! Fixed-point money helpers. Amounts are kept at two fractional digits.

use rust_decimal::{Decimal, RoundingStrategy};

use crate::common::TransactionKind;

/// Number of fractional digits persisted for every amount.
pub const CENT_SCALE: u32 = 2;

/// Rounds to whole cents, halves away from zero.
pub fn round_cents(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(CENT_SCALE, RoundingStrategy::MidpointAwayFromZero)
}

/// Signed effect of an entry on its account: income adds, expense subtracts.
pub fn signed(kind: TransactionKind, amount: Decimal) -> Decimal {
    match kind {
        TransactionKind::Income => amount,
        TransactionKind::Expense => -amount,
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;

    use super::*;

    #[test]
    fn rounds_half_away_from_zero() {
        assert_eq!(round_cents(dec!(33.335)), dec!(33.34));
        assert_eq!(round_cents(dec!(-0.005)), dec!(-0.01));
        assert_eq!(round_cents(dec!(10)), dec!(10));
    }

    #[test]
    fn expense_is_negative() {
        assert_eq!(signed(TransactionKind::Expense, dec!(12.50)), dec!(-12.50));
        assert_eq!(signed(TransactionKind::Income, dec!(12.50)), dec!(12.50));
    }
}
