//! Polling notifier.
//!
//! While a user is logged in, a background task samples the store every
//! poll interval, compares row timestamps against the last-seen watermarks
//! and sends a notification to the user's session when something is new.
//! The session shows the latest notification until it expires.

use std::sync::Arc;
use std::time::Duration;

use chrono::{ DateTime, Utc };
use serde::{ Deserialize, Serialize };
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{ interval_at, Instant, MissedTickBehavior };
use tracing::{ debug, warn };

use crate::error::ShopResult;
use crate::models::UserId;
use crate::store::ShopStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
	/// The product list should be reloaded
	NewProducts,
	/// The user's order list should be reloaded
	NewOrders,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
	pub kind: NotificationKind,
	pub count: u64,
	pub message: String,
	pub raised_at: DateTime<Utc>,
}

impl Notification {
	pub fn new_products(count: u64, raised_at: DateTime<Utc>) -> Self {
		Self {
			kind: NotificationKind::NewProducts,
			count,
			message: format!("New products available! {count} new item(s)"),
			raised_at,
		}
	}

	pub fn new_orders(count: u64, raised_at: DateTime<Utc>) -> Self {
		Self {
			kind: NotificationKind::NewOrders,
			count,
			message: format!("You have {count} new order(s)"),
			raised_at,
		}
	}
}

/// Watermarks for one logged-in user.
#[derive(Debug, Clone)]
pub struct UpdateWatcher {
	user_id: UserId,
	last_product_update: Option<DateTime<Utc>>,
	last_order_check: Option<DateTime<Utc>>,
}

impl UpdateWatcher {
	/// A watcher that has seen nothing yet: its first check reports every
	/// product in the store.
	pub fn new(user_id: UserId) -> Self {
		Self {
			user_id,
			last_product_update: None,
			last_order_check: None,
		}
	}

	/// A watcher primed at login time, so only later rows are reported.
	pub fn since(user_id: UserId, at: DateTime<Utc>) -> Self {
		Self {
			user_id,
			last_product_update: Some(at),
			last_order_check: Some(at),
		}
	}

	pub fn last_product_update(&self) -> Option<DateTime<Utc>> {
		self.last_product_update
	}

	pub fn last_order_check(&self) -> Option<DateTime<Utc>> {
		self.last_order_check
	}

	/// Runs one poll over the window `(watermark, now]`. Rows committed after
	/// `now` fall outside the window and are reported by the next poll, so
	/// each row is reported once. Watermarks only move when both counts
	/// succeed.
	pub async fn check<S: ShopStore + ?Sized>(
		&mut self,
		store: &S,
		now: DateTime<Utc>
	) -> ShopResult<Vec<Notification>> {
		let new_products = store.count_products_since(self.last_product_update, now).await?;
		let new_orders = match self.last_order_check {
			Some(since) => store.count_orders_since(self.user_id, since, now).await?,
			None => 0,
		};

		let mut raised = Vec::new();
		if new_products > 0 {
			raised.push(Notification::new_products(new_products, now));
			self.last_product_update = Some(now);
		}
		if new_orders > 0 {
			raised.push(Notification::new_orders(new_orders, now));
		}
		self.last_order_check = Some(now);

		Ok(raised)
	}
}

/// Spawns the polling loop for one session. Each notification replaces the
/// previous one in `sender`. The loop ends when the receiving side is
/// dropped; a failed poll is logged and retried on the next tick.
pub fn spawn_poller<S: ShopStore + 'static>(
	store: Arc<S>,
	mut watcher: UpdateWatcher,
	period: Duration,
	sender: watch::Sender<Option<Notification>>
) -> JoinHandle<()> {
	tokio::spawn(async move {
		let mut ticker = interval_at(Instant::now() + period, period);
		ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

		loop {
			ticker.tick().await;
			if sender.is_closed() {
				break;
			}

			match watcher.check(store.as_ref(), Utc::now()).await {
				Ok(raised) => {
					for notification in raised {
						debug!(user_id = watcher.user_id, message = %notification.message, "update found");
						if sender.send(Some(notification)).is_err() {
							return;
						}
					}
				}
				Err(err) => {
					warn!(user_id = watcher.user_id, error = %err, "update check failed");
				}
			}
		}
	})
}

/// The notification area of a session: holds the latest notification and
/// hides it once `ttl` has passed.
#[derive(Debug, Clone)]
pub struct NotificationBoard {
	current: Option<Notification>,
	ttl: Duration,
}

impl NotificationBoard {
	pub fn new(ttl: Duration) -> Self {
		Self {
			current: None,
			ttl,
		}
	}

	pub fn post(&mut self, notification: Notification) {
		self.current = Some(notification);
	}

	/// The latest notification, if it has not expired at `now`.
	pub fn active(&mut self, now: DateTime<Utc>) -> Option<&Notification> {
		let expired = self.current.as_ref().is_some_and(|n| {
			now.signed_duration_since(n.raised_at)
				.to_std()
				.is_ok_and(|elapsed| elapsed >= self.ttl)
		});
		if expired {
			self.current = None;
		}
		self.current.as_ref()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn messages() {
		let now = Utc::now();
		assert_eq!(Notification::new_products(2, now).message, "New products available! 2 new item(s)");
		assert_eq!(Notification::new_orders(1, now).message, "You have 1 new order(s)");
	}

	#[test]
	fn board_hides_expired_notification() {
		let mut board = NotificationBoard::new(Duration::from_secs(5));
		let raised_at = Utc::now();
		board.post(Notification::new_orders(1, raised_at));

		assert!(board.active(raised_at + chrono::Duration::seconds(4)).is_some());
		assert!(board.active(raised_at + chrono::Duration::seconds(5)).is_none());
		assert!(board.active(raised_at).is_none());
	}

	#[test]
	fn newer_notification_replaces_older() {
		let mut board = NotificationBoard::new(Duration::from_secs(5));
		let now = Utc::now();
		board.post(Notification::new_products(3, now));
		board.post(Notification::new_orders(1, now));

		assert_eq!(board.active(now).map(|n| n.kind), Some(NotificationKind::NewOrders));
	}

	#[test]
	fn primed_watcher_has_both_watermarks() {
		let at = Utc::now();
		let watcher = UpdateWatcher::since(9, at);
		assert_eq!(watcher.last_product_update(), Some(at));
		assert_eq!(watcher.last_order_check(), Some(at));

		let fresh = UpdateWatcher::new(9);
		assert!(fresh.last_product_update().is_none());
		assert!(fresh.last_order_check().is_none());
	}
}
