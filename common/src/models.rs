use std::fmt;

use chrono::{ DateTime, Utc };
use rust_decimal::Decimal;
use serde::{ Deserialize, Serialize };

pub type UserId = i64;
pub type ProductId = i64;
pub type OrderId = i64;

#[derive(Clone, Serialize, Deserialize)]
pub struct User {
	pub id: UserId,
	pub username: String,
	/// Stored and compared as entered.
	#[serde(skip_serializing)]
	pub password: String,
	pub created_at: DateTime<Utc>,
}

impl fmt::Debug for User {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("User")
			.field("id", &self.id)
			.field("username", &self.username)
			.field("password", &"[redacted]")
			.field("created_at", &self.created_at)
			.finish()
	}
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
	pub id: ProductId,
	pub name: String,
	pub price: Decimal,
	pub created_at: DateTime<Utc>,
}

impl fmt::Display for Product {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "ID: {} | {} - ${:.2}", self.id, self.name, self.price)
	}
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
	pub id: OrderId,
	pub user_id: UserId,
	pub product_id: ProductId,
	pub quantity: u32,
	pub order_date: DateTime<Utc>,
}

/// Product fields as accepted by add/update, after validation.
#[derive(Debug, Clone, PartialEq)]
pub struct ProductDraft {
	pub name: String,
	pub price: Decimal,
}

/// One row of a user's order history, joined with its product.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderLine {
	pub id: OrderId,
	pub product_name: String,
	pub quantity: u32,
	pub unit_price: Decimal,
	pub total: Decimal,
	pub order_date: DateTime<Utc>,
}

impl OrderLine {
	pub fn new(
		id: OrderId,
		product_name: String,
		quantity: u32,
		unit_price: Decimal,
		order_date: DateTime<Utc>
	) -> Self {
		Self {
			id,
			product_name,
			quantity,
			unit_price,
			total: line_total(unit_price, quantity),
			order_date,
		}
	}
}

impl fmt::Display for OrderLine {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(
			f,
			"Order #{} | {} x{} = ${:.2} ({})",
			self.id,
			self.product_name,
			self.quantity,
			self.total,
			self.order_date.format("%Y-%m-%d %H:%M")
		)
	}
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderReceipt {
	pub order_id: OrderId,
	pub product_id: ProductId,
	pub product_name: String,
	pub quantity: u32,
	pub total: Decimal,
}

impl fmt::Display for OrderReceipt {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(
			f,
			"Order placed successfully! Product: {} - {} Quantity: {} Total: ${:.2}",
			self.product_id,
			self.product_name,
			self.quantity,
			self.total
		)
	}
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Profile {
	pub username: String,
	pub registered_at: DateTime<Utc>,
	pub total_orders: u64,
}

pub fn line_total(unit_price: Decimal, quantity: u32) -> Decimal {
	unit_price * Decimal::from(quantity)
}

#[cfg(test)]
mod tests {
	use super::*;
	use chrono::TimeZone;

	#[test]
	fn order_line_total_is_price_times_quantity() {
		let date = Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 0).unwrap();
		let line = OrderLine::new(7, "Lamp".into(), 3, Decimal::new(1999, 2), date);

		assert_eq!(line.total, Decimal::new(5997, 2));
		assert_eq!(line.to_string(), "Order #7 | Lamp x3 = $59.97 (2024-03-01 12:30)");
	}

	#[test]
	fn product_display_matches_listing_format() {
		let product = Product {
			id: 4,
			name: "Kettle".into(),
			price: Decimal::new(25, 0),
			created_at: Utc::now(),
		};

		assert_eq!(product.to_string(), "ID: 4 | Kettle - $25.00");
	}

	#[test]
	fn user_debug_hides_password() {
		let user = User {
			id: 1,
			username: "alice".into(),
			password: "hunter2".into(),
			created_at: Utc::now(),
		};

		let debug = format!("{user:?}");
		assert!(!debug.contains("hunter2"));

		let json = serde_json::to_value(&user).unwrap();
		assert!(json.get("password").is_none());
	}
}
