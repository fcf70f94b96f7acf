//! Input checks applied before any statement reaches the store.
//!
//! Fields arrive as the raw text a user typed, so parsing failures are
//! reported with the same wording regardless of which surface produced them.

use std::str::FromStr;

use rust_decimal::{ Decimal, RoundingStrategy };

use crate::error::{ ShopError, ShopResult };
use crate::models::ProductDraft;

/// Upper bound (exclusive) of a `DECIMAL(10,2)` column.
const MAX_PRICE_UNITS: i64 = 100_000_000;

pub fn require_credentials(username: &str, password: &str) -> ShopResult<()> {
	if username.trim().is_empty() || password.is_empty() {
		return Err(ShopError::validation("please enter both username and password"));
	}
	Ok(())
}

pub fn parse_price(text: &str) -> ShopResult<Decimal> {
	let text = text.trim();
	let price = Decimal::from_str(text)
		.or_else(|_| Decimal::from_scientific(text))
		.map_err(|_| ShopError::validation("price must be a number"))?;

	if price.is_sign_negative() && !price.is_zero() {
		return Err(ShopError::validation("price must not be negative"));
	}

	let price = price.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
	if price >= Decimal::new(MAX_PRICE_UNITS, 0) {
		return Err(ShopError::validation("price is too large"));
	}
	Ok(price)
}

pub fn parse_quantity(text: &str) -> ShopResult<u32> {
	let text = text.trim();
	if text.is_empty() {
		return Err(ShopError::validation("please enter quantity"));
	}

	match text.parse::<i64>() {
		Ok(quantity) if quantity > 0 => {
			u32::try_from(quantity).map_err(|_| ShopError::validation("quantity is too large"))
		}
		_ => Err(ShopError::validation("quantity must be a positive integer")),
	}
}

pub fn product_draft(name: &str, price: &str) -> ShopResult<ProductDraft> {
	let name = name.trim();
	if name.is_empty() || price.trim().is_empty() {
		return Err(ShopError::validation("please enter both name and price"));
	}

	Ok(ProductDraft {
		name: name.to_string(),
		price: parse_price(price)?,
	})
}

/// Escapes `LIKE` wildcards so a search term only ever matches literally.
pub fn like_pattern(term: &str) -> String {
	let mut pattern = String::with_capacity(term.len() + 2);
	pattern.push('%');
	for c in term.chars() {
		if matches!(c, '%' | '_' | '\\') {
			pattern.push('\\');
		}
		pattern.push(c);
	}
	pattern.push('%');
	pattern
}

#[cfg(test)]
mod tests {
	use super::*;

	fn message(err: ShopError) -> String {
		match err {
			ShopError::Validation(message) => message,
			other => panic!("expected validation error, got {other:?}"),
		}
	}

	#[test]
	fn price_rejects_text() {
		assert_eq!(message(parse_price("ten").unwrap_err()), "price must be a number");
		assert_eq!(message(parse_price("").unwrap_err()), "price must be a number");
	}

	#[test]
	fn price_rounds_to_cents() {
		assert_eq!(parse_price("19.999").unwrap(), Decimal::new(2000, 2));
		assert_eq!(parse_price(" 4.125 ").unwrap(), Decimal::new(413, 2));
		assert_eq!(parse_price("1e2").unwrap(), Decimal::new(100, 0));
	}

	#[test]
	fn price_bounds() {
		assert!(parse_price("-1").is_err());
		assert!(parse_price("0").is_ok());
		assert!(parse_price("99999999.99").is_ok());
		assert!(parse_price("100000000").is_err());
	}

	#[test]
	fn quantity_must_be_positive_integer() {
		assert_eq!(parse_quantity("3").unwrap(), 3);
		assert_eq!(parse_quantity(" 12 ").unwrap(), 12);

		for bad in ["0", "-2", "1.5", "two"] {
			assert_eq!(
				message(parse_quantity(bad).unwrap_err()),
				"quantity must be a positive integer",
				"input {bad:?}"
			);
		}
		assert_eq!(message(parse_quantity("").unwrap_err()), "please enter quantity");
		assert!(parse_quantity("5000000000").is_err());
	}

	#[test]
	fn credentials_must_be_present() {
		assert!(require_credentials("alice", "pw").is_ok());
		assert!(require_credentials("", "pw").is_err());
		assert!(require_credentials("   ", "pw").is_err());
		assert!(require_credentials("alice", "").is_err());
	}

	#[test]
	fn draft_trims_name() {
		let draft = product_draft("  Desk lamp ", "12.5").unwrap();
		assert_eq!(draft.name, "Desk lamp");
		assert_eq!(draft.price, Decimal::new(1250, 2));

		assert!(product_draft("", "1").is_err());
		assert!(product_draft("Desk", " ").is_err());
	}

	#[test]
	fn like_pattern_escapes_wildcards() {
		assert_eq!(like_pattern("lamp"), "%lamp%");
		assert_eq!(like_pattern("50%_off"), "%50\\%\\_off%");
	}
}
