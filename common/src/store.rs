use async_trait::async_trait;
use chrono::{ DateTime, Utc };

use crate::error::ShopResult;
use crate::models::{
	Order,
	OrderLine,
	Product,
	ProductDraft,
	ProductId,
	User,
	UserId,
};

/// The relational store behind the shop. Each method is a single
/// parameterized round trip (or one short transaction); input has already
/// been validated by the caller.
#[async_trait]
pub trait ShopStore: Send + Sync {
	/// Create tables if they do not exist yet
	async fn init(&self) -> ShopResult<()>;

	/// Backend name, for logs
	fn database_name(&self) -> String;

	async fn username_exists(&self, username: &str) -> ShopResult<bool>;

	/// Insert a user. A username collision maps to `ShopError::UsernameTaken`.
	async fn create_user(&self, username: &str, password: &str) -> ShopResult<User>;

	/// Exact username and password match.
	async fn find_user_by_credentials(
		&self,
		username: &str,
		password: &str
	) -> ShopResult<Option<User>>;

	async fn get_user(&self, user_id: UserId) -> ShopResult<Option<User>>;

	/// All products, ordered by id
	async fn list_products(&self) -> ShopResult<Vec<Product>>;

	/// Products whose name matches the given `LIKE` pattern (escaped with `\`)
	async fn search_products(&self, pattern: &str) -> ShopResult<Vec<Product>>;

	async fn get_product(&self, product_id: ProductId) -> ShopResult<Option<Product>>;

	async fn add_product(&self, draft: &ProductDraft) -> ShopResult<Product>;

	/// Returns `None` when no product has this id.
	async fn update_product(
		&self,
		product_id: ProductId,
		draft: &ProductDraft
	) -> ShopResult<Option<Product>>;

	/// Delete a product that no order references. Fails with
	/// `ProductNotFound` or `ProductHasOrders`; the check and the delete
	/// share one transaction.
	async fn delete_product(&self, product_id: ProductId) -> ShopResult<()>;

	async fn insert_order(
		&self,
		user_id: UserId,
		product_id: ProductId,
		quantity: u32,
		order_date: DateTime<Utc>
	) -> ShopResult<Order>;

	/// The user's orders joined with their products, newest first
	async fn list_order_lines(&self, user_id: UserId) -> ShopResult<Vec<OrderLine>>;

	async fn count_orders(&self, user_id: UserId) -> ShopResult<u64>;

	/// Products created in `(since, until]`, or up to `until` when `since`
	/// is `None`
	async fn count_products_since(
		&self,
		since: Option<DateTime<Utc>>,
		until: DateTime<Utc>
	) -> ShopResult<u64>;

	/// The user's orders placed in `(since, until]`
	async fn count_orders_since(
		&self,
		user_id: UserId,
		since: DateTime<Utc>,
		until: DateTime<Utc>
	) -> ShopResult<u64>;
}
