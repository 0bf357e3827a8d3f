use rust_decimal::Decimal;
use voyage_core::{Currency, ReservationError};

/// Render an amount the way the provider signs it: no decimal point for
/// currencies without minor units, exactly two decimals otherwise.
pub fn format_amount(amount: Decimal, currency: Currency) -> Result<String, ReservationError> {
    if amount <= Decimal::ZERO {
        return Err(ReservationError::Validation(format!(
            "amount must be positive, got {}",
            amount
        )));
    }

    // Never rounds: the signed amount is the stored amount.
    let dp = currency.minor_units();
    if amount.round_dp(dp) != amount {
        return Err(ReservationError::Validation(format!(
            "{} {} has more than {} decimal places",
            amount, currency, dp
        )));
    }

    let mut canonical = amount;
    canonical.rescale(dp);
    Ok(canonical.to_string())
}
