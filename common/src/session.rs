use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{ DateTime, Utc };
use serde::Serialize;
use tokio::sync::{ watch, Mutex };
use tokio::task::{ AbortHandle, JoinHandle };
use tokio::time::{ interval_at, Instant, MissedTickBehavior };
use tracing::info;
use uuid::Uuid;

use crate::error::{ ShopError, ShopResult };
use crate::models::{ User, UserId };
use crate::notifier::{ spawn_poller, Notification, NotificationBoard, UpdateWatcher };
use crate::store::ShopStore;

pub type SessionId = Uuid;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionUser {
	pub user_id: UserId,
	pub username: String,
}

struct Session {
	user: SessionUser,
	inbox: watch::Receiver<Option<Notification>>,
	board: NotificationBoard,
	poller: JoinHandle<()>,
	last_seen: Instant,
}

impl Session {
	fn notification(&mut self, now: DateTime<Utc>) -> Option<Notification> {
		if self.inbox.has_changed().unwrap_or(false) {
			if let Some(notification) = self.inbox.borrow_and_update().clone() {
				self.board.post(notification);
			}
		}
		self.board.active(now).cloned()
	}

	fn is_idle(&self, at: Instant, idle_timeout: Duration) -> bool {
		at.saturating_duration_since(self.last_seen) >= idle_timeout
	}
}

impl Drop for Session {
	fn drop(&mut self) {
		self.poller.abort();
	}
}

/// Logged-in users, each with its own update poller. A session that is not
/// used for `idle_timeout` is closed like a logout.
pub struct SessionRegistry {
	sessions: Mutex<HashMap<SessionId, Session>>,
	poll_interval: Duration,
	notification_ttl: Duration,
	idle_timeout: Duration,
}

impl SessionRegistry {
	pub fn new(poll_interval: Duration, notification_ttl: Duration, idle_timeout: Duration) -> Self {
		Self {
			sessions: Mutex::new(HashMap::new()),
			poll_interval,
			notification_ttl,
			idle_timeout,
		}
	}

	/// Open a session for `user` and start polling for updates on its behalf.
	/// Must be called from within a tokio runtime.
	pub async fn open<S: ShopStore + 'static>(&self, store: Arc<S>, user: &User) -> SessionId {
		let id = Uuid::new_v4();
		let (sender, inbox) = watch::channel(None);
		let watcher = UpdateWatcher::since(user.id, Utc::now());
		let poller = spawn_poller(store, watcher, self.poll_interval, sender);

		let session = Session {
			user: SessionUser {
				user_id: user.id,
				username: user.username.clone(),
			},
			inbox,
			board: NotificationBoard::new(self.notification_ttl),
			poller,
			last_seen: Instant::now(),
		};
		self.sessions.lock().await.insert(id, session);

		info!(user_id = user.id, "session opened");
		id
	}

	/// Close a session; its poller stops.
	pub async fn close(&self, id: SessionId) -> ShopResult<SessionUser> {
		let session = self.sessions.lock().await.remove(&id).ok_or(ShopError::NotLoggedIn)?;
		info!(user_id = session.user.user_id, "session closed");
		Ok(session.user.clone())
	}

	pub async fn user(&self, id: SessionId) -> ShopResult<SessionUser> {
		let mut sessions = self.sessions.lock().await;
		let session = self.touch(&mut sessions, id)?;
		Ok(session.user.clone())
	}

	/// The session's current notification, if one is still visible at `now`.
	pub async fn notification(
		&self,
		id: SessionId,
		now: DateTime<Utc>
	) -> ShopResult<Option<Notification>> {
		let mut sessions = self.sessions.lock().await;
		let session = self.touch(&mut sessions, id)?;
		Ok(session.notification(now))
	}

	/// Handle to the session's update poller
	pub async fn poller(&self, id: SessionId) -> Option<AbortHandle> {
		self.sessions
			.lock().await
			.get(&id)
			.map(|session| session.poller.abort_handle())
	}

	/// Close every session idle for longer than the idle timeout. Returns
	/// once their pollers have stopped.
	pub async fn sweep_idle(&self) -> Vec<SessionUser> {
		let now = Instant::now();
		let expired: Vec<Session> = {
			let mut sessions = self.sessions.lock().await;
			let ids: Vec<SessionId> = sessions
				.iter()
				.filter(|(_, session)| session.is_idle(now, self.idle_timeout))
				.map(|(id, _)| *id)
				.collect();
			ids.iter()
				.filter_map(|id| sessions.remove(id))
				.collect()
		};

		let mut users = Vec::with_capacity(expired.len());
		for mut session in expired {
			session.poller.abort();
			let _ = (&mut session.poller).await;
			info!(user_id = session.user.user_id, "idle session expired");
			users.push(session.user.clone());
		}
		users
	}

	/// Sweep idle sessions every `period` until the registry is dropped.
	pub fn spawn_sweeper(self: &Arc<Self>, period: Duration) -> JoinHandle<()> {
		let registry = Arc::downgrade(self);
		tokio::spawn(async move {
			let mut ticker = interval_at(Instant::now() + period, period);
			ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

			loop {
				ticker.tick().await;
				let Some(registry) = registry.upgrade() else {
					break;
				};
				registry.sweep_idle().await;
			}
		})
	}

	// Looks up a live session and marks it as used. An idle one is removed,
	// which stops its poller.
	fn touch<'a>(
		&self,
		sessions: &'a mut HashMap<SessionId, Session>,
		id: SessionId
	) -> ShopResult<&'a mut Session> {
		let now = Instant::now();
		if sessions.get(&id).is_some_and(|session| session.is_idle(now, self.idle_timeout)) {
			if let Some(session) = sessions.remove(&id) {
				info!(user_id = session.user.user_id, "idle session expired");
			}
			return Err(ShopError::NotLoggedIn);
		}

		let session = sessions.get_mut(&id).ok_or(ShopError::NotLoggedIn)?;
		session.last_seen = now;
		Ok(session)
	}

	pub async fn len(&self) -> usize {
		self.sessions.lock().await.len()
	}

	pub async fn is_empty(&self) -> bool {
		self.len().await == 0
	}
}
