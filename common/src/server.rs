use axum::{
	extract::{ Path, Query, State },
	http::{ HeaderMap, StatusCode },
	response::{ IntoResponse, Response },
	routing::{ get, post, put },
	Json,
	Router,
};
use chrono::Utc;
use serde::{ Deserialize, Deserializer, Serialize };
use serde_json::json;
use std::sync::Arc;
use tokio::net::TcpListener;
use anyhow::Result;
use tracing::{ info, error };

use crate::{
	config::ShopConfig,
	error::{ ShopError, ShopResult },
	models::{ OrderLine, OrderReceipt, Product, ProductId, Profile, User, UserId },
	notifier::Notification,
	session::{ SessionId, SessionRegistry, SessionUser },
	shop::Shop,
	store::ShopStore,
};

pub const SESSION_HEADER: &str = "x-session-id";

// Shared state for the API
pub struct AppState<S: ShopStore + 'static> {
	pub shop: Shop<S>,
	pub sessions: Arc<SessionRegistry>,
}

impl<S: ShopStore + 'static> AppState<S> {
	pub fn new(shop: Shop<S>, config: &ShopConfig) -> Self {
		Self {
			shop,
			sessions: Arc::new(
				SessionRegistry::new(config.poll_interval, config.notification_ttl, config.session_idle)
			),
		}
	}
}

#[derive(Debug, Deserialize)]
pub struct Credentials {
	pub username: String,
	pub password: String,
}

/// Product form fields. The price is taken as typed, so both `"9.99"` and
/// `9.99` are accepted and validated the same way.
#[derive(Debug, Deserialize)]
pub struct ProductForm {
	pub name: String,
	#[serde(deserialize_with = "text_or_number")]
	pub price: String,
}

#[derive(Debug, Deserialize)]
pub struct OrderForm {
	pub product_id: ProductId,
	#[serde(deserialize_with = "text_or_number")]
	pub quantity: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct SearchQuery {
	pub search: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LoginResponse {
	pub session_id: SessionId,
	pub user_id: UserId,
	pub username: String,
	pub message: String,
}

fn text_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
	where D: Deserializer<'de>
{
	#[derive(Deserialize)]
	#[serde(untagged)]
	enum TextOrNumber {
		Text(String),
		Number(serde_json::Number),
	}

	Ok(match TextOrNumber::deserialize(deserializer)? {
		TextOrNumber::Text(text) => text,
		TextOrNumber::Number(number) => number.to_string(),
	})
}

impl IntoResponse for ShopError {
	fn into_response(self) -> Response {
		let status = match &self {
			ShopError::Validation(_) => StatusCode::BAD_REQUEST,
			ShopError::InvalidCredentials | ShopError::NotLoggedIn => StatusCode::UNAUTHORIZED,
			ShopError::UserNotFound(_) | ShopError::ProductNotFound(_) => StatusCode::NOT_FOUND,
			ShopError::UsernameTaken | ShopError::ProductHasOrders { .. } => StatusCode::CONFLICT,
			ShopError::Storage(err) => {
				error!("Database error: {:?}", err);
				StatusCode::INTERNAL_SERVER_ERROR
			}
		};

		(status, Json(json!({ "error": self.to_string() }))).into_response()
	}
}

pub fn router<S: ShopStore + 'static>(state: Arc<AppState<S>>) -> Router {
	Router::new()
		.route("/", get(root_handler))
		.route("/register", post(register_handler::<S>))
		.route("/login", post(login_handler::<S>))
		.route("/logout", post(logout_handler::<S>))
		.route("/products", get(products_handler::<S>).post(add_product_handler::<S>))
		.route(
			"/products/:id",
			put(update_product_handler::<S>).delete(delete_product_handler::<S>)
		)
		.route("/orders", get(orders_handler::<S>).post(place_order_handler::<S>))
		.route("/profile", get(profile_handler::<S>))
		.route("/notifications", get(notifications_handler::<S>))
		.with_state(state)
}

// Run the API server for the given store
pub async fn run_server<S: ShopStore + 'static>(store: S, config: &ShopConfig) -> Result<()> {
	let state = Arc::new(AppState::new(Shop::new(store), config));
	let sweeper = state.sessions.spawn_sweeper(config.session_idle);
	let app = router(state);

	let addr = config.bind_address();
	info!("Server listening on {}", addr);

	let listener = TcpListener::bind(addr).await?;
	axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await?;
	sweeper.abort();

	info!("Server stopped");
	Ok(())
}

async fn shutdown_signal() {
	if let Err(err) = tokio::signal::ctrl_c().await {
		error!("Failed to listen for shutdown signal: {:?}", err);
		std::future::pending::<()>().await;
	}
}

fn session_id(headers: &HeaderMap) -> ShopResult<SessionId> {
	headers
		.get(SESSION_HEADER)
		.and_then(|value| value.to_str().ok())
		.and_then(|value| SessionId::parse_str(value.trim()).ok())
		.ok_or(ShopError::NotLoggedIn)
}

async fn current_user<S: ShopStore + 'static>(
	state: &AppState<S>,
	headers: &HeaderMap
) -> ShopResult<SessionUser> {
	state.sessions.user(session_id(headers)?).await
}

// Root handler
async fn root_handler() -> &'static str {
	"Shop API. Register or login, then browse /products and place /orders."
}

async fn register_handler<S: ShopStore + 'static>(
	State(state): State<Arc<AppState<S>>>,
	Json(form): Json<Credentials>
) -> ShopResult<(StatusCode, Json<User>)> {
	let user = state.shop.register(&form.username, &form.password).await?;
	Ok((StatusCode::CREATED, Json(user)))
}

async fn login_handler<S: ShopStore + 'static>(
	State(state): State<Arc<AppState<S>>>,
	Json(form): Json<Credentials>
) -> ShopResult<Json<LoginResponse>> {
	let user = state.shop.login(&form.username, &form.password).await?;
	let session_id = state.sessions.open(Arc::clone(state.shop.store()), &user).await;

	Ok(
		Json(LoginResponse {
			session_id,
			user_id: user.id,
			message: format!("Welcome, {}!", user.username),
			username: user.username,
		})
	)
}

async fn logout_handler<S: ShopStore + 'static>(
	State(state): State<Arc<AppState<S>>>,
	headers: HeaderMap
) -> ShopResult<StatusCode> {
	state.sessions.close(session_id(&headers)?).await?;
	Ok(StatusCode::NO_CONTENT)
}

async fn products_handler<S: ShopStore + 'static>(
	State(state): State<Arc<AppState<S>>>,
	headers: HeaderMap,
	Query(query): Query<SearchQuery>
) -> ShopResult<Json<Vec<Product>>> {
	current_user(&state, &headers).await?;
	Ok(Json(state.shop.products(query.search.as_deref()).await?))
}

async fn add_product_handler<S: ShopStore + 'static>(
	State(state): State<Arc<AppState<S>>>,
	headers: HeaderMap,
	Json(form): Json<ProductForm>
) -> ShopResult<(StatusCode, Json<Product>)> {
	current_user(&state, &headers).await?;
	let product = state.shop.add_product(&form.name, &form.price).await?;
	Ok((StatusCode::CREATED, Json(product)))
}

async fn update_product_handler<S: ShopStore + 'static>(
	State(state): State<Arc<AppState<S>>>,
	headers: HeaderMap,
	Path(product_id): Path<ProductId>,
	Json(form): Json<ProductForm>
) -> ShopResult<Json<Product>> {
	current_user(&state, &headers).await?;
	Ok(Json(state.shop.update_product(product_id, &form.name, &form.price).await?))
}

async fn delete_product_handler<S: ShopStore + 'static>(
	State(state): State<Arc<AppState<S>>>,
	headers: HeaderMap,
	Path(product_id): Path<ProductId>
) -> ShopResult<StatusCode> {
	current_user(&state, &headers).await?;
	state.shop.delete_product(product_id).await?;
	Ok(StatusCode::NO_CONTENT)
}

async fn orders_handler<S: ShopStore + 'static>(
	State(state): State<Arc<AppState<S>>>,
	headers: HeaderMap
) -> ShopResult<Json<Vec<OrderLine>>> {
	let user = current_user(&state, &headers).await?;
	Ok(Json(state.shop.orders(user.user_id).await?))
}

async fn place_order_handler<S: ShopStore + 'static>(
	State(state): State<Arc<AppState<S>>>,
	headers: HeaderMap,
	Json(form): Json<OrderForm>
) -> ShopResult<(StatusCode, Json<OrderReceipt>)> {
	let user = current_user(&state, &headers).await?;
	let receipt = state.shop.place_order(user.user_id, form.product_id, &form.quantity).await?;
	Ok((StatusCode::CREATED, Json(receipt)))
}

async fn profile_handler<S: ShopStore + 'static>(
	State(state): State<Arc<AppState<S>>>,
	headers: HeaderMap
) -> ShopResult<Json<Profile>> {
	let user = current_user(&state, &headers).await?;
	Ok(Json(state.shop.profile(user.user_id).await?))
}

async fn notifications_handler<S: ShopStore + 'static>(
	State(state): State<Arc<AppState<S>>>,
	headers: HeaderMap
) -> ShopResult<Json<Option<Notification>>> {
	let id = session_id(&headers)?;
	Ok(Json(state.sessions.notification(id, Utc::now()).await?))
}
