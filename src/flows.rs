//! High-level token flows composed on the broker facade.

pub mod acquire;
pub mod common;
pub mod refresh;
pub mod retry;

pub use common::*;
pub use refresh::*;
pub use retry::*;

// self
use crate::{
	_prelude::*,
	browser::BrowserEngine,
	provider::SiteDescriptor,
	store::{CacheStatus, TokenCell},
};

/// Coordinates token acquisition against a single site descriptor.
///
/// The broker owns the browser engine handle, the cache cell, and the refresh lock, so the
/// individual flows can focus on acquisition semantics. All mutation of the cache happens
/// while holding the refresh lock; the only unsynchronized access is the read-only fast
/// path in [`Broker::try_token`], which is safe because records are replaced wholesale
/// behind an [`Arc`].
pub struct Broker<E>
where
	E: ?Sized + BrowserEngine,
{
	/// Browser engine used for every acquisition attempt.
	pub engine: Arc<E>,
	/// Descriptor of the site being driven.
	pub descriptor: SiteDescriptor,
	/// Validity and scheduling policy applied to cached records.
	pub freshness: FreshnessPolicy,
	/// Retry policy wrapped around single acquisition attempts.
	pub retry: RetryPolicy,
	/// Shared counters for refresh flow outcomes.
	pub refresh_metrics: Arc<RefreshMetrics>,
	cell: Arc<TokenCell>,
	refresh_guard: Arc<AsyncMutex<()>>,
}
impl<E> Broker<E>
where
	E: ?Sized + BrowserEngine,
{
	/// Creates a broker for the provided engine + site descriptor with default policies.
	pub fn new(engine: impl Into<Arc<E>>, descriptor: SiteDescriptor) -> Self {
		Self {
			engine: engine.into(),
			descriptor,
			freshness: FreshnessPolicy::default(),
			retry: RetryPolicy::default(),
			refresh_metrics: Default::default(),
			cell: Default::default(),
			refresh_guard: Default::default(),
		}
	}

	/// Overrides the freshness policy.
	pub fn with_freshness(mut self, freshness: FreshnessPolicy) -> Self {
		self.freshness = freshness;

		self
	}

	/// Overrides the retry policy.
	pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
		self.retry = retry;

		self
	}

	/// Read access to the cache cell.
	pub fn cache(&self) -> &TokenCell {
		&self.cell
	}

	/// Immutable status snapshot of the cache.
	pub fn status(&self) -> CacheStatus {
		let snapshot = self.cell.snapshot();
		let now = OffsetDateTime::now_utc();

		CacheStatus {
			cached: snapshot.is_some(),
			usable: snapshot
				.as_ref()
				.is_some_and(|record| self.freshness.is_usable(record, now)),
			is_anonymous: snapshot.as_ref().map(|record| record.is_anonymous),
			expires_at_ms: snapshot.as_ref().map(|record| record.expires_at_ms()),
			refresh_in_progress: self.cell.refresh_in_progress(),
		}
	}

	pub(crate) fn cell_handle(&self) -> &Arc<TokenCell> {
		&self.cell
	}

	pub(crate) fn refresh_guard(&self) -> &AsyncMutex<()> {
		&self.refresh_guard
	}
}
impl<E> Clone for Broker<E>
where
	E: ?Sized + BrowserEngine,
{
	fn clone(&self) -> Self {
		Self {
			engine: self.engine.clone(),
			descriptor: self.descriptor.clone(),
			freshness: self.freshness,
			retry: self.retry,
			refresh_metrics: self.refresh_metrics.clone(),
			cell: self.cell.clone(),
			refresh_guard: self.refresh_guard.clone(),
		}
	}
}
impl<E> Debug for Broker<E>
where
	E: ?Sized + BrowserEngine,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("Broker")
			.field("descriptor", &self.descriptor)
			.field("freshness", &self.freshness)
			.field("retry", &self.retry)
			.finish()
	}
}
