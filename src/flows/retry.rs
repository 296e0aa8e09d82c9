//! Bounded exponential retry around single acquisition attempts.
//!
//! Retries wrap only the network-facing boundary: cache-hit paths never pass through here.
//! Non-final failures are logged and swallowed; only the final attempt's error propagates,
//! wrapped in [`Error::Exhausted`].

// std
use std::time::Duration as StdDuration;
// self
use crate::{
	_prelude::*,
	auth::{CookieSet, TokenRecord},
	browser::BrowserEngine,
	flows::Broker,
};

/// Retry policy for acquisition attempts: a fixed attempt budget with exponential delays
/// between attempts (base, base×multiplier, base×multiplier², …) and no delay after the
/// final failure.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
	/// Maximum number of attempts, including the first.
	pub max_attempts: u32,
	/// Delay before the first retry.
	pub base_delay: StdDuration,
	/// Factor applied to the delay after each further failure.
	pub multiplier: u32,
}
impl RetryPolicy {
	/// Delay inserted after `failed_attempts` consecutive failures (1-based).
	pub fn delay_after(&self, failed_attempts: u32) -> StdDuration {
		self.base_delay.saturating_mul(self.multiplier.saturating_pow(failed_attempts.saturating_sub(1)))
	}
}
impl Default for RetryPolicy {
	fn default() -> Self {
		Self { max_attempts: 3, base_delay: StdDuration::from_millis(1_000), multiplier: 2 }
	}
}

impl<E> Broker<E>
where
	E: ?Sized + BrowserEngine,
{
	/// Runs acquisition attempts until one succeeds or the attempt budget is spent.
	pub(crate) async fn acquire_with_retry(&self, cookies: &CookieSet) -> Result<TokenRecord> {
		let attempts = self.retry.max_attempts.max(1);
		let mut attempt = 1;

		loop {
			match self.acquire_once(cookies).await {
				Ok(record) => return Ok(record),
				Err(source) if attempt < attempts => {
					let delay = self.retry.delay_after(attempt);

					#[cfg(feature = "tracing")]
					tracing::warn!(
						attempt,
						error = %source,
						delay_ms = delay.as_millis() as u64,
						"acquisition attempt failed; backing off",
					);
					#[cfg(not(feature = "tracing"))]
					let _ = &source;

					tokio::time::sleep(delay).await;

					attempt += 1;
				},
				Err(source) => return Err(Error::Exhausted { attempts, source }),
			}
		}
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn delays_follow_the_exponential_schedule() {
		let policy = RetryPolicy::default();

		assert_eq!(policy.delay_after(1), StdDuration::from_millis(1_000));
		assert_eq!(policy.delay_after(2), StdDuration::from_millis(2_000));
		assert_eq!(policy.delay_after(3), StdDuration::from_millis(4_000));
	}

	#[test]
	fn extreme_failure_counts_saturate_instead_of_overflowing() {
		let policy = RetryPolicy::default();

		assert_eq!(policy.delay_after(0), StdDuration::from_millis(1_000));
		assert!(policy.delay_after(u32::MAX) >= policy.delay_after(64));
	}
}
