//! Shared flow parameters: token requests and the freshness policy.

// std
use std::time::Duration as StdDuration;
// self
use crate::{_prelude::*, auth::{CookieSet, TokenRecord}};

/// Request parameters for caller-driven token lookups.
#[derive(Clone, Debug, Default)]
pub struct TokenRequest {
	/// Authentication cookies forwarded into the browsing context on a refresh.
	pub cookies: CookieSet,
	/// Forces cache bypass when true.
	pub force: bool,
}
impl TokenRequest {
	/// Creates an anonymous, non-forced request.
	pub fn new() -> Self {
		Self::default()
	}

	/// Attaches authentication cookies to the request.
	pub fn with_cookies(mut self, cookies: CookieSet) -> Self {
		self.cookies = cookies;

		self
	}

	/// Forces the broker to bypass cache checks.
	pub fn force_refresh(mut self) -> Self {
		self.force = true;

		self
	}

	/// Overrides the force flag.
	pub fn with_force(mut self, force: bool) -> Self {
		self.force = force;

		self
	}
}

/// Validity and scheduling policy applied to cached records.
///
/// A record is usable while more than `buffer` of its lifetime remains, so a token is never
/// served that could expire mid-flight to the caller; the same buffer anchors the proactive
/// refresh schedule.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FreshnessPolicy {
	/// Safety margin subtracted from the server-assigned expiry.
	pub buffer: Duration,
	/// Floor for the proactive refresh delay, against near-expiry token loops.
	pub min_refresh_interval: Duration,
	/// Delay before the scheduler re-arms after a failed proactive refresh.
	pub failure_rearm_delay: Duration,
}
impl FreshnessPolicy {
	/// Whether the record passes the validity predicate at the provided instant:
	/// strictly more than `buffer` remaining.
	pub fn is_usable(&self, record: &TokenRecord, now: OffsetDateTime) -> bool {
		record.remaining_at(now) > self.buffer
	}

	/// Delay until the next proactive refresh for the record, floored at
	/// `min_refresh_interval`.
	pub fn refresh_delay(&self, record: &TokenRecord, now: OffsetDateTime) -> StdDuration {
		let ahead_of_expiry = record.remaining_at(now) - self.buffer;
		let delay = ahead_of_expiry.max(self.min_refresh_interval);

		delay.unsigned_abs()
	}

	/// Scheduler re-arm delay after a failed proactive refresh.
	pub fn failure_rearm(&self) -> StdDuration {
		self.failure_rearm_delay.unsigned_abs()
	}
}
impl Default for FreshnessPolicy {
	fn default() -> Self {
		Self {
			buffer: Duration::seconds(120),
			min_refresh_interval: Duration::seconds(30),
			failure_rearm_delay: Duration::seconds(60),
		}
	}
}
