//! Caller-driven token lookups with singleflight refresh.
//!
//! [`Broker::try_token`] serves the cached record through a lock-free fast path whenever the
//! validity predicate holds, and otherwise serializes refreshes behind the broker's fair
//! FIFO refresh lock. Once a queued caller finally owns the lock it re-checks the cache
//! (double-checked pattern): whoever held the lock before it may already have stored a fresh
//! record, in which case no second acquisition is spent. A failed refresh propagates as an
//! error; the stale cached record is deliberately not served, since a forced or necessary
//! refresh implies the caller wants freshness guarantees.

mod metrics;

pub use metrics::RefreshMetrics;

// self
use crate::{
	_prelude::*,
	auth::{CookieSet, TokenRecord},
	browser::BrowserEngine,
	flows::{Broker, TokenRequest},
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
};

/// Outcome of a successful token lookup.
#[derive(Clone, Debug)]
pub struct TokenGrant {
	/// The served token snapshot.
	pub record: Arc<TokenRecord>,
	/// Whether the record came from cache (`true`) or a fresh acquisition (`false`).
	pub cached: bool,
}

impl<E> Broker<E>
where
	E: ?Sized + BrowserEngine,
{
	/// Returns a usable token, refreshing through the browser when the cache cannot serve
	/// the request.
	pub async fn try_token(&self, request: TokenRequest) -> Result<TokenGrant> {
		const KIND: FlowKind = FlowKind::Refresh;

		let span = FlowSpan::new(KIND, "try_token");

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);

		let result = span.instrument(self.token_inner(request)).await;

		match &result {
			Ok(_) => obs::record_flow_outcome(KIND, FlowOutcome::Success),
			Err(_) => obs::record_flow_outcome(KIND, FlowOutcome::Failure),
		}

		result
	}

	/// Facade variant of [`Broker::try_token`] that absorbs errors into `None`, so HTTP
	/// callers always get a structured response instead of a propagated fault.
	pub async fn token(&self, request: TokenRequest) -> Option<TokenGrant> {
		match self.try_token(request).await {
			Ok(grant) => Some(grant),
			Err(error) => {
				#[cfg(feature = "tracing")]
				tracing::warn!(%error, "token request failed");
				#[cfg(not(feature = "tracing"))]
				let _ = error;

				None
			},
		}
	}

	async fn token_inner(&self, request: TokenRequest) -> Result<TokenGrant> {
		if !request.force {
			if let Some(current) = self.cell_handle().snapshot() {
				if self.freshness.is_usable(&current, OffsetDateTime::now_utc())
					&& cookie_constraint_met(&request.cookies, &current)
				{
					self.refresh_metrics.record_cache_hit();

					return Ok(TokenGrant { record: current, cached: true });
				}
			}
		}

		let observed_generation = self.cell_handle().generation();
		let _owner = self.refresh_guard().lock().await;

		if let Some(current) = self.cell_handle().snapshot() {
			let refreshed_while_queued =
				self.cell_handle().generation() != observed_generation;

			// Double-checked: the previous lock holder may have refreshed already. A forced
			// request only accepts that result when it actually happened while queueing.
			if self.freshness.is_usable(&current, OffsetDateTime::now_utc())
				&& cookie_constraint_met(&request.cookies, &current)
				&& (!request.force || refreshed_while_queued)
			{
				self.refresh_metrics.record_cache_hit();

				return Ok(TokenGrant { record: current, cached: true });
			}
		}

		self.refresh_metrics.record_attempt();
		self.cell_handle().set_refresh_in_progress(true);

		let outcome = self.acquire_with_retry(&request.cookies).await;

		self.cell_handle().set_refresh_in_progress(false);

		match outcome {
			Ok(record) => {
				self.refresh_metrics.record_success();

				Ok(TokenGrant { record: self.cell_handle().replace(record), cached: false })
			},
			Err(error) => {
				self.refresh_metrics.record_failure();

				Err(error)
			},
		}
	}

	/// Scheduler-driven proactive refresh; always targets the anonymous credential and
	/// always acquires, without consulting the validity predicate.
	pub(crate) async fn refresh_scheduled(&self) -> Result<Arc<TokenRecord>> {
		const KIND: FlowKind = FlowKind::Scheduled;

		let span = FlowSpan::new(KIND, "refresh_scheduled");

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);

		let result = span
			.instrument(async move {
				let _owner = self.refresh_guard().lock().await;

				self.refresh_metrics.record_attempt();
				self.cell_handle().set_refresh_in_progress(true);

				let outcome = self.acquire_with_retry(&CookieSet::new()).await;

				self.cell_handle().set_refresh_in_progress(false);

				match outcome {
					Ok(record) => {
						self.refresh_metrics.record_success();

						Ok(self.cell_handle().replace(record))
					},
					Err(error) => {
						self.refresh_metrics.record_failure();

						Err(error)
					},
				}
			})
			.await;

		match &result {
			Ok(_) => obs::record_flow_outcome(KIND, FlowOutcome::Success),
			Err(_) => obs::record_flow_outcome(KIND, FlowOutcome::Failure),
		}

		result
	}
}

/// Whether the cached record satisfies what the request's cookie set implies.
///
/// An empty cookie set imposes no constraint; a non-empty set must find a record whose
/// anonymity matches the authenticated-browsing capability flag.
fn cookie_constraint_met(cookies: &CookieSet, record: &TokenRecord) -> bool {
	cookies.is_empty() || record.is_anonymous != cookies.wants_authenticated()
}
