//! In-memory token cache cell.
//!
//! The cell is the broker's only shared mutable state. The current record is replaced
//! wholesale behind an [`Arc`] (copy-on-write), which is what makes the lock-free fast-path
//! read in the flows safe: readers always see either the previous complete record or the
//! next one, never a half-written token. Nothing here persists across restarts.

// std
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
// self
use crate::{_prelude::*, auth::TokenRecord};

/// Process-local cache slot holding the current token snapshot.
#[derive(Debug, Default)]
pub struct TokenCell {
	current: RwLock<Option<Arc<TokenRecord>>>,
	generation: AtomicU64,
	refresh_in_progress: AtomicBool,
}
impl TokenCell {
	/// Creates an empty cell.
	pub fn new() -> Self {
		Self::default()
	}

	/// Returns the current token snapshot, if any.
	pub fn snapshot(&self) -> Option<Arc<TokenRecord>> {
		self.current.read().clone()
	}

	/// Replaces the cached record wholesale and returns the stored snapshot.
	pub fn replace(&self, record: TokenRecord) -> Arc<TokenRecord> {
		let record = Arc::new(record);

		*self.current.write() = Some(record.clone());

		self.generation.fetch_add(1, Ordering::Release);

		record
	}

	/// Clears the cached record. Not required for correctness; used by shutdown paths.
	pub fn clear(&self) {
		*self.current.write() = None;

		self.generation.fetch_add(1, Ordering::Release);
	}

	/// Monotonic counter bumped on every replacement; lets a queued refresher detect that
	/// someone else completed a refresh while it waited for the lock.
	pub fn generation(&self) -> u64 {
		self.generation.load(Ordering::Acquire)
	}

	/// Whether a refresh currently holds the refresh lock.
	pub fn refresh_in_progress(&self) -> bool {
		self.refresh_in_progress.load(Ordering::Acquire)
	}

	pub(crate) fn set_refresh_in_progress(&self, value: bool) {
		self.refresh_in_progress.store(value, Ordering::Release);
	}
}

/// Immutable cache status snapshot returned by the broker facade.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStatus {
	/// Whether any record is cached.
	pub cached: bool,
	/// Whether the cached record passes the validity predicate right now.
	pub usable: bool,
	/// Anonymity flag of the cached record, when one exists.
	pub is_anonymous: Option<bool>,
	/// Expiry of the cached record in epoch milliseconds, when one exists.
	pub expires_at_ms: Option<i64>,
	/// Whether a refresh is currently in flight.
	pub refresh_in_progress: bool,
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::auth::TokenSecret;

	fn record(token: &str) -> TokenRecord {
		TokenRecord {
			access_token: TokenSecret::new(token),
			expires_at: OffsetDateTime::now_utc() + Duration::minutes(10),
			client_id: None,
			is_anonymous: true,
			fetched_at: OffsetDateTime::now_utc(),
		}
	}

	#[test]
	fn replacement_is_wholesale_and_bumps_the_generation() {
		let cell = TokenCell::new();

		assert!(cell.snapshot().is_none());
		assert_eq!(cell.generation(), 0);

		let first = cell.replace(record("first"));

		assert_eq!(cell.generation(), 1);
		assert!(Arc::ptr_eq(&cell.snapshot().expect("Snapshot should exist."), &first));

		let second = cell.replace(record("second"));

		assert_eq!(cell.generation(), 2);
		assert!(Arc::ptr_eq(&cell.snapshot().expect("Snapshot should exist."), &second));
		// The first snapshot stays intact for readers that still hold it.
		assert_eq!(first.access_token.expose(), "first");
	}

	#[test]
	fn clear_is_idempotent() {
		let cell = TokenCell::new();

		cell.replace(record("token"));
		cell.clear();
		cell.clear();

		assert!(cell.snapshot().is_none());
	}
}
