//! Payout arithmetic.
//!
//! Amounts are integers in token-native units and prices are 1e18
//! fixed-point integers. Everything stays in `U256`.

use crate::SettlementError;
use alloy::primitives::U256;
use solver_types::PricingParams;

/// Decimals of the fixed-point price encoding.
const PRICE_DECIMALS: i32 = 18;

fn pow10(exp: u32) -> Result<U256, SettlementError> {
	U256::from(10u64)
		.checked_pow(U256::from(exp))
		.ok_or_else(|| SettlementError::Arithmetic(format!("10^{} overflows", exp)))
}

/// Quote-leg amount owed to the user, in quote-token units.
///
/// Uses the ledger's `quoteAmount` when set. Otherwise converts the base
/// amount at `price_e18`:
/// `baseAmount * price_e18 / 10^(baseDecimals + 18 - quoteDecimals)`.
pub fn derive_quote_amount(
	pricing: &PricingParams,
	base_decimals: u8,
	quote_decimals: u8,
) -> Result<U256, SettlementError> {
	if !pricing.quote_amount.is_zero() {
		return Ok(pricing.quote_amount);
	}

	let product = pricing
		.base_amount
		.checked_mul(pricing.price_e18)
		.ok_or_else(|| {
			SettlementError::Arithmetic(format!(
				"{} * {} overflows",
				pricing.base_amount, pricing.price_e18
			))
		})?;

	let exp = i32::from(base_decimals) + PRICE_DECIMALS - i32::from(quote_decimals);
	if exp >= 0 {
		Ok(product / pow10(exp.unsigned_abs())?)
	} else {
		product
			.checked_mul(pow10(exp.unsigned_abs())?)
			.ok_or_else(|| SettlementError::Arithmetic("scaled payout overflows".to_string()))
	}
}

/// Renders a token-unit amount as a decimal string at `decimals` precision.
///
/// Trailing fractional zeros are dropped: `2_000_000` at 6 decimals is
/// `"2"`, `1_500_000` is `"1.5"`.
pub fn format_amount(amount: U256, decimals: u8) -> String {
	let digits = amount.to_string();
	let decimals = usize::from(decimals);
	if decimals == 0 {
		return digits;
	}

	let (int_part, frac_part) = if digits.len() <= decimals {
		(
			"0".to_string(),
			format!("{:0>width$}", digits, width = decimals),
		)
	} else {
		let split = digits.len() - decimals;
		(digits[..split].to_string(), digits[split..].to_string())
	};

	let frac_part = frac_part.trim_end_matches('0');
	if frac_part.is_empty() {
		int_part
	} else {
		format!("{}.{}", int_part, frac_part)
	}
}
