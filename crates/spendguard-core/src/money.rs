//! Money unit conversion.
//!
//! The guard ledger records realized cost in microcents (10⁻⁸ USD) while
//! provider exports report USD as decimals. Every comparison in the audit
//! tooling happens in integer microcents; USD strings are produced only for
//! display.
//!
//! 1 USD = 100 cents = 10⁸ microcents.
//!
//! ## Rounding bound
//!
//! [`usd_to_microcents`] rounds each value independently, so converting N
//! amounts and summing the integers can differ from converting their
//! floating-point sum by up to N/2 microcents (about N × 5×10⁻⁹ USD).
//! Importers therefore always sum converted integers and never re-derive a
//! total from summed floats.

/// Microcents in one cent.
pub const MICROCENTS_PER_CENT: i64 = 1_000_000;

/// Microcents in one US dollar.
pub const MICROCENTS_PER_USD: i64 = 100 * MICROCENTS_PER_CENT;

/// Microcents in one displayed unit of the 6th USD decimal.
const MICROCENTS_PER_MICRO_USD: u64 = 100;

/// Convert a USD amount to microcents, rounding half away from zero.
///
/// Non-finite inputs saturate the way `f64 as i64` does (`NaN` becomes 0).
pub fn usd_to_microcents(usd: f64) -> i64 {
    (usd * MICROCENTS_PER_USD as f64).round() as i64
}

/// Format microcents as USD with exactly 6 fractional digits.
///
/// Uses integer arithmetic only. The two sub-micro-dollar digits are rounded
/// half away from zero and the sign is kept for negative amounts, except when
/// the rounded value is zero.
pub fn microcents_to_usd_string(microcents: i64) -> String {
    let magnitude = microcents.unsigned_abs();
    let micro_usd = magnitude / MICROCENTS_PER_MICRO_USD
        + u64::from(magnitude % MICROCENTS_PER_MICRO_USD >= MICROCENTS_PER_MICRO_USD / 2);

    let whole = micro_usd / 1_000_000;
    let fraction = micro_usd % 1_000_000;
    let sign = if microcents < 0 && micro_usd != 0 { "-" } else { "" };

    format!("{sign}{whole}.{fraction:06}")
}

/// Convert whole cents to microcents.
pub fn cents_to_microcents(cents: i64) -> i64 {
    cents.saturating_mul(MICROCENTS_PER_CENT)
}

/// Convert microcents to whole cents, rounding half away from zero.
pub fn microcents_to_cents(microcents: i64) -> i64 {
    let quotient = microcents / MICROCENTS_PER_CENT;
    let remainder = microcents % MICROCENTS_PER_CENT;
    if remainder.unsigned_abs() * 2 >= MICROCENTS_PER_CENT as u64 {
        quotient + microcents.signum()
    } else {
        quotient
    }
}
