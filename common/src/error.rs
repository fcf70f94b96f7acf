use thiserror::Error;

use crate::models::{ ProductId, UserId };

pub type ShopResult<T> = std::result::Result<T, ShopError>;

/// Every way a shop operation can fail. Callers surface these to the user
/// as-is; nothing is retried.
#[derive(Debug, Error)]
pub enum ShopError {
	#[error("{0}")]
	Validation(String),

	#[error("invalid credentials")]
	InvalidCredentials,

	#[error("username already exists")]
	UsernameTaken,

	#[error("please login first")]
	NotLoggedIn,

	#[error("user {0} not found")]
	UserNotFound(UserId),

	#[error("product {0} not found")]
	ProductNotFound(ProductId),

	#[error("cannot delete - product {product_id} has {orders} existing order(s)")]
	ProductHasOrders {
		product_id: ProductId,
		orders: u64,
	},

	#[error(transparent)]
	Storage(#[from] anyhow::Error),
}

impl ShopError {
	pub fn validation(message: impl Into<String>) -> Self {
		Self::Validation(message.into())
	}

	/// Input problems the user can fix, as opposed to storage failures.
	pub fn is_rejection(&self) -> bool {
		!matches!(self, Self::Storage(_))
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn storage_errors_are_not_rejections() {
		let err = ShopError::from(anyhow::anyhow!("disk I/O error"));
		assert!(!err.is_rejection());
		assert_eq!(err.to_string(), "disk I/O error");

		assert!(ShopError::UsernameTaken.is_rejection());
	}

	#[test]
	fn product_has_orders_message() {
		let err = ShopError::ProductHasOrders { product_id: 3, orders: 2 };
		assert_eq!(err.to_string(), "cannot delete - product 3 has 2 existing order(s)");
	}
}
