use anyhow::Result;
use async_trait::async_trait;
use chrono::{ DateTime, SecondsFormat, SubsecRound, Utc };
use rusqlite::{ params, ErrorCode, OptionalExtension, Row };
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use shop_common::{
	error::{ ShopError, ShopResult },
	models::{ Order, OrderLine, Product, ProductDraft, ProductId, User, UserId },
	store::ShopStore,
};
use std::path::{ Path, PathBuf };
use std::time::Duration;
use tokio_rusqlite::Connection as AsyncConnection;
use tracing::info;

const PRODUCT_COLUMNS: &str = "id, name, price_cents, created_at";
const USER_COLUMNS: &str = "id, username, password, created_at";

pub struct SqliteStore {
	conn: AsyncConnection,
	location: String,
}

enum DeleteOutcome {
	Deleted,
	NotFound,
	HasOrders(i64),
}

impl SqliteStore {
	/// Open (creating if needed) the database file and its tables.
	pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
		let path: PathBuf = path.as_ref().to_path_buf();

		// Create data directory if it doesn't exist
		if let Some(data_dir) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
			if !data_dir.exists() {
				std::fs::create_dir_all(data_dir)?;
			}
		}

		let conn = AsyncConnection::open(&path).await?;
		conn.call(|conn| {
			let mode: String = conn.query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))?;
			info!("SQLite journal mode: {}", mode);
			conn.execute("PRAGMA synchronous = NORMAL", [])?;
			Ok(())
		}).await?;

		Self::with_connection(conn, path.display().to_string()).await
	}

	/// A private database that lives as long as the store. Used by tests.
	pub async fn open_in_memory() -> Result<Self> {
		let conn = AsyncConnection::open_in_memory().await?;
		Self::with_connection(conn, ":memory:".to_string()).await
	}

	async fn with_connection(conn: AsyncConnection, location: String) -> Result<Self> {
		conn.call(|conn| {
			conn.busy_timeout(Duration::from_secs(5))?;
			conn.execute_batch("PRAGMA foreign_keys = ON")?;
			Ok(())
		}).await?;

		let store = Self { conn, location };
		store.init().await?;
		Ok(store)
	}

	pub fn location(&self) -> &str {
		&self.location
	}

	// Run a closure on the connection thread
	async fn call<F, R>(&self, function: F) -> ShopResult<R>
		where
			F: FnOnce(&mut rusqlite::Connection) -> Result<R, tokio_rusqlite::Error> + Send + 'static,
			R: Send + 'static
	{
		self.conn.call(function).await.map_err(|err| ShopError::Storage(anyhow::Error::from(err)))
	}
}

/// Fixed-width UTC text, so string order is time order.
fn timestamp(at: &DateTime<Utc>) -> String {
	at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn now() -> DateTime<Utc> {
	Utc::now().trunc_subsecs(6)
}

fn to_cents(price: Decimal) -> ShopResult<i64> {
	(price.round_dp(2) * Decimal::ONE_HUNDRED)
		.to_i64()
		.ok_or_else(|| ShopError::validation("price is too large"))
}

fn from_cents(cents: i64) -> Decimal {
	Decimal::new(cents, 2)
}

fn count(value: i64) -> u64 {
	u64::try_from(value).unwrap_or_default()
}

fn is_constraint_violation(err: &rusqlite::Error) -> bool {
	matches!(
		err,
		rusqlite::Error::SqliteFailure(failure, _) if failure.code == ErrorCode::ConstraintViolation
	)
}

fn timestamp_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
	let text: String = row.get(idx)?;
	DateTime::parse_from_rfc3339(&text)
		.map(|at| at.with_timezone(&Utc))
		.map_err(|err| {
			rusqlite::Error::FromSqlConversionFailure(
				idx,
				rusqlite::types::Type::Text,
				Box::new(err)
			)
		})
}

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<User> {
	Ok(User {
		id: row.get(0)?,
		username: row.get(1)?,
		password: row.get(2)?,
		created_at: timestamp_column(row, 3)?,
	})
}

fn product_from_row(row: &Row<'_>) -> rusqlite::Result<Product> {
	Ok(Product {
		id: row.get(0)?,
		name: row.get(1)?,
		price: from_cents(row.get(2)?),
		created_at: timestamp_column(row, 3)?,
	})
}

#[async_trait]
impl ShopStore for SqliteStore {
	async fn init(&self) -> ShopResult<()> {
		self.call(|conn| {
			// Create users table
			conn.execute(
				"CREATE TABLE IF NOT EXISTS users (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    username TEXT NOT NULL UNIQUE,
                    password TEXT NOT NULL,
                    created_at TEXT NOT NULL
                )",
				[]
			)?;

			// Create products table
			conn.execute(
				"CREATE TABLE IF NOT EXISTS products (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    name TEXT NOT NULL,
                    price_cents INTEGER NOT NULL CHECK (price_cents >= 0),
                    created_at TEXT NOT NULL
                )",
				[]
			)?;

			// Create orders table with foreign keys
			conn.execute(
				"CREATE TABLE IF NOT EXISTS orders (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    user_id INTEGER NOT NULL,
                    product_id INTEGER NOT NULL,
                    quantity INTEGER NOT NULL CHECK (quantity > 0),
                    order_date TEXT NOT NULL,
                    FOREIGN KEY (user_id) REFERENCES users (id),
                    FOREIGN KEY (product_id) REFERENCES products (id)
                )",
				[]
			)?;

			// Create indexes
			conn.execute(
				"CREATE INDEX IF NOT EXISTS idx_products_created_at ON products (created_at)",
				[]
			)?;
			conn.execute(
				"CREATE INDEX IF NOT EXISTS idx_orders_user_id ON orders (user_id, order_date)",
				[]
			)?;
			conn.execute(
				"CREATE INDEX IF NOT EXISTS idx_orders_product_id ON orders (product_id)",
				[]
			)?;

			Ok(())
		}).await
	}

	fn database_name(&self) -> String {
		"SQLite".to_string()
	}

	async fn username_exists(&self, username: &str) -> ShopResult<bool> {
		let username = username.to_string();

		self.call(move |conn| {
			let exists = conn.query_row(
				"SELECT EXISTS(SELECT 1 FROM users WHERE username = ?1)",
				[username],
				|row| row.get(0)
			)?;
			Ok(exists)
		}).await
	}

	async fn create_user(&self, username: &str, password: &str) -> ShopResult<User> {
		let mut user = User {
			id: 0,
			username: username.to_string(),
			password: password.to_string(),
			created_at: now(),
		};
		let row = (user.username.clone(), user.password.clone(), timestamp(&user.created_at));

		let id = self.call(move |conn| {
			let (username, password, created_at) = row;
			let inserted = conn.execute(
				"INSERT INTO users (username, password, created_at) VALUES (?1, ?2, ?3)",
				params![username, password, created_at]
			);
			match inserted {
				Ok(_) => Ok(Some(conn.last_insert_rowid())),
				Err(err) if is_constraint_violation(&err) => Ok(None),
				Err(err) => Err(err.into()),
			}
		}).await?;

		user.id = id.ok_or(ShopError::UsernameTaken)?;
		Ok(user)
	}

	async fn find_user_by_credentials(
		&self,
		username: &str,
		password: &str
	) -> ShopResult<Option<User>> {
		let username = username.to_string();
		let password = password.to_string();

		self.call(move |conn| {
			let user = conn
				.query_row(
					&format!("SELECT {USER_COLUMNS} FROM users WHERE username = ?1 AND password = ?2"),
					params![username, password],
					user_from_row
				)
				.optional()?;
			Ok(user)
		}).await
	}

	async fn get_user(&self, user_id: UserId) -> ShopResult<Option<User>> {
		self.call(move |conn| {
			let user = conn
				.query_row(
					&format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"),
					[user_id],
					user_from_row
				)
				.optional()?;
			Ok(user)
		}).await
	}

	async fn list_products(&self) -> ShopResult<Vec<Product>> {
		self.call(|conn| {
			let mut stmt = conn.prepare(
				&format!("SELECT {PRODUCT_COLUMNS} FROM products ORDER BY id")
			)?;
			let products = stmt
				.query_map([], product_from_row)?
				.collect::<Result<Vec<_>, _>>()?;
			Ok(products)
		}).await
	}

	async fn search_products(&self, pattern: &str) -> ShopResult<Vec<Product>> {
		let pattern = pattern.to_string();

		self.call(move |conn| {
			let mut stmt = conn.prepare(
				&format!(
					"SELECT {PRODUCT_COLUMNS} FROM products WHERE name LIKE ?1 ESCAPE '\\' ORDER BY id"
				)
			)?;
			let products = stmt
				.query_map([pattern], product_from_row)?
				.collect::<Result<Vec<_>, _>>()?;
			Ok(products)
		}).await
	}

	async fn get_product(&self, product_id: ProductId) -> ShopResult<Option<Product>> {
		self.call(move |conn| {
			let product = conn
				.query_row(
					&format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE id = ?1"),
					[product_id],
					product_from_row
				)
				.optional()?;
			Ok(product)
		}).await
	}

	async fn add_product(&self, draft: &ProductDraft) -> ShopResult<Product> {
		let mut product = Product {
			id: 0,
			name: draft.name.clone(),
			price: from_cents(to_cents(draft.price)?),
			created_at: now(),
		};
		let row = (product.name.clone(), to_cents(product.price)?, timestamp(&product.created_at));

		product.id = self.call(move |conn| {
			let (name, price_cents, created_at) = row;
			conn.execute(
				"INSERT INTO products (name, price_cents, created_at) VALUES (?1, ?2, ?3)",
				params![name, price_cents, created_at]
			)?;
			Ok(conn.last_insert_rowid())
		}).await?;

		Ok(product)
	}

	async fn update_product(
		&self,
		product_id: ProductId,
		draft: &ProductDraft
	) -> ShopResult<Option<Product>> {
		let name = draft.name.clone();
		let price_cents = to_cents(draft.price)?;

		self.call(move |conn| {
			let updated = conn.execute(
				"UPDATE products SET name = ?1, price_cents = ?2 WHERE id = ?3",
				params![name, price_cents, product_id]
			)?;
			if updated == 0 {
				return Ok(None);
			}

			let product = conn.query_row(
				&format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE id = ?1"),
				[product_id],
				product_from_row
			)?;
			Ok(Some(product))
		}).await
	}

	async fn delete_product(&self, product_id: ProductId) -> ShopResult<()> {
		let outcome = self.call(move |conn| {
			let tx = conn.transaction()?;

			let exists: bool = tx.query_row(
				"SELECT EXISTS(SELECT 1 FROM products WHERE id = ?1)",
				[product_id],
				|row| row.get(0)
			)?;
			if !exists {
				return Ok(DeleteOutcome::NotFound);
			}

			// Check if product has orders
			let orders: i64 = tx.query_row(
				"SELECT COUNT(*) FROM orders WHERE product_id = ?1",
				[product_id],
				|row| row.get(0)
			)?;
			if orders > 0 {
				return Ok(DeleteOutcome::HasOrders(orders));
			}

			tx.execute("DELETE FROM products WHERE id = ?1", [product_id])?;
			tx.commit()?;

			Ok(DeleteOutcome::Deleted)
		}).await?;

		match outcome {
			DeleteOutcome::Deleted => Ok(()),
			DeleteOutcome::NotFound => Err(ShopError::ProductNotFound(product_id)),
			DeleteOutcome::HasOrders(orders) =>
				Err(ShopError::ProductHasOrders {
					product_id,
					orders: count(orders),
				}),
		}
	}

	async fn insert_order(
		&self,
		user_id: UserId,
		product_id: ProductId,
		quantity: u32,
		order_date: DateTime<Utc>
	) -> ShopResult<Order> {
		let order_date = order_date.trunc_subsecs(6);
		let stamp = timestamp(&order_date);

		let id = self.call(move |conn| {
			let inserted = conn.execute(
				"INSERT INTO orders (user_id, product_id, quantity, order_date) VALUES (?1, ?2, ?3, ?4)",
				params![user_id, product_id, quantity, stamp]
			);
			match inserted {
				Ok(_) => Ok(Some(conn.last_insert_rowid())),
				// The product was deleted after it was looked up
				Err(err) if is_constraint_violation(&err) => Ok(None),
				Err(err) => Err(err.into()),
			}
		}).await?;

		Ok(Order {
			id: id.ok_or(ShopError::ProductNotFound(product_id))?,
			user_id,
			product_id,
			quantity,
			order_date,
		})
	}

	async fn list_order_lines(&self, user_id: UserId) -> ShopResult<Vec<OrderLine>> {
		self.call(move |conn| {
			let mut stmt = conn.prepare(
				"SELECT o.id, p.name, o.quantity, p.price_cents, o.order_date
				FROM orders o
				JOIN products p ON o.product_id = p.id
				WHERE o.user_id = ?1
				ORDER BY o.order_date DESC, o.id DESC"
			)?;

			let lines = stmt
				.query_map([user_id], |row| {
					Ok(
						OrderLine::new(
							row.get(0)?,
							row.get(1)?,
							row.get(2)?,
							from_cents(row.get(3)?),
							timestamp_column(row, 4)?
						)
					)
				})?
				.collect::<Result<Vec<_>, _>>()?;
			Ok(lines)
		}).await
	}

	async fn count_orders(&self, user_id: UserId) -> ShopResult<u64> {
		self.call(move |conn| {
			let orders: i64 = conn.query_row(
				"SELECT COUNT(*) FROM orders WHERE user_id = ?1",
				[user_id],
				|row| row.get(0)
			)?;
			Ok(count(orders))
		}).await
	}

	async fn count_products_since(
		&self,
		since: Option<DateTime<Utc>>,
		until: DateTime<Utc>
	) -> ShopResult<u64> {
		let since = since.map(|at| timestamp(&at));
		let until = timestamp(&until);

		self.call(move |conn| {
			let products: i64 = match since {
				Some(since) =>
					conn.query_row(
						"SELECT COUNT(*) FROM products WHERE created_at > ?1 AND created_at <= ?2",
						[since, until],
						|row| row.get(0)
					)?,
				None =>
					conn.query_row(
						"SELECT COUNT(*) FROM products WHERE created_at <= ?1",
						[until],
						|row| row.get(0)
					)?,
			};
			Ok(count(products))
		}).await
	}

	async fn count_orders_since(
		&self,
		user_id: UserId,
		since: DateTime<Utc>,
		until: DateTime<Utc>
	) -> ShopResult<u64> {
		let since = timestamp(&since);
		let until = timestamp(&until);

		self.call(move |conn| {
			let orders: i64 = conn.query_row(
				"SELECT COUNT(*) FROM orders
				WHERE user_id = ?1 AND order_date > ?2 AND order_date <= ?3",
				params![user_id, since, until],
				|row| row.get(0)
			)?;
			Ok(count(orders))
		}).await
	}
}
