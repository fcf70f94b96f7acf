use std::sync::Arc;

use chrono::Utc;
use tracing::{ info, warn };

use crate::error::{ ShopError, ShopResult };
use crate::models::{
	line_total,
	OrderLine,
	OrderReceipt,
	Product,
	ProductId,
	Profile,
	User,
	UserId,
};
use crate::store::ShopStore;
use crate::validation;

/// The shop's operations: validate the raw input, issue the statement, log
/// the outcome.
pub struct Shop<S: ShopStore> {
	store: Arc<S>,
}

impl<S: ShopStore> Clone for Shop<S> {
	fn clone(&self) -> Self {
		Self { store: Arc::clone(&self.store) }
	}
}

impl<S: ShopStore> Shop<S> {
	pub fn new(store: S) -> Self {
		Self { store: Arc::new(store) }
	}

	pub fn store(&self) -> &Arc<S> {
		&self.store
	}

	pub async fn register(&self, username: &str, password: &str) -> ShopResult<User> {
		validation::require_credentials(username, password)?;
		let username = username.trim();

		if self.store.username_exists(username).await? {
			warn!(username, "registration rejected: username already exists");
			return Err(ShopError::UsernameTaken);
		}

		let user = self.store.create_user(username, password).await?;
		info!(user_id = user.id, username, "user registered");
		Ok(user)
	}

	pub async fn login(&self, username: &str, password: &str) -> ShopResult<User> {
		validation::require_credentials(username, password)?;

		match self.store.find_user_by_credentials(username.trim(), password).await? {
			Some(user) => {
				info!(user_id = user.id, username = %user.username, "user logged in");
				Ok(user)
			}
			None => {
				warn!(username, "login rejected: invalid credentials");
				Err(ShopError::InvalidCredentials)
			}
		}
	}

	/// All products, or those whose name contains `search` when it is not blank.
	pub async fn products(&self, search: Option<&str>) -> ShopResult<Vec<Product>> {
		match search.map(str::trim).filter(|term| !term.is_empty()) {
			Some(term) => self.store.search_products(&validation::like_pattern(term)).await,
			None => self.store.list_products().await,
		}
	}

	pub async fn add_product(&self, name: &str, price: &str) -> ShopResult<Product> {
		let draft = validation::product_draft(name, price)?;
		let product = self.store.add_product(&draft).await?;
		info!(product_id = product.id, name = %product.name, price = %product.price, "product added");
		Ok(product)
	}

	pub async fn update_product(
		&self,
		product_id: ProductId,
		name: &str,
		price: &str
	) -> ShopResult<Product> {
		let draft = validation::product_draft(name, price)?;
		let product = self.store
			.update_product(product_id, &draft).await?
			.ok_or(ShopError::ProductNotFound(product_id))?;
		info!(product_id, name = %product.name, price = %product.price, "product updated");
		Ok(product)
	}

	pub async fn delete_product(&self, product_id: ProductId) -> ShopResult<()> {
		if let Err(err) = self.store.delete_product(product_id).await {
			warn!(product_id, error = %err, "product not deleted");
			return Err(err);
		}
		info!(product_id, "product deleted");
		Ok(())
	}

	pub async fn place_order(
		&self,
		user_id: UserId,
		product_id: ProductId,
		quantity: &str
	) -> ShopResult<OrderReceipt> {
		let quantity = validation::parse_quantity(quantity)?;
		let product = self.store
			.get_product(product_id).await?
			.ok_or(ShopError::ProductNotFound(product_id))?;

		let order = self.store.insert_order(user_id, product_id, quantity, Utc::now()).await?;
		let receipt = OrderReceipt {
			order_id: order.id,
			product_id,
			product_name: product.name,
			quantity,
			total: line_total(product.price, quantity),
		};
		info!(order_id = order.id, user_id, product_id, quantity, total = %receipt.total, "order placed");
		Ok(receipt)
	}

	pub async fn orders(&self, user_id: UserId) -> ShopResult<Vec<OrderLine>> {
		self.store.list_order_lines(user_id).await
	}

	pub async fn profile(&self, user_id: UserId) -> ShopResult<Profile> {
		let user = self.store.get_user(user_id).await?.ok_or(ShopError::UserNotFound(user_id))?;
		let total_orders = self.store.count_orders(user_id).await?;

		Ok(Profile {
			username: user.username,
			registered_at: user.created_at,
			total_orders,
		})
	}
}
