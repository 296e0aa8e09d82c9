//! Proactive refresh scheduling.
//!
//! The scheduler is a self-rearming loop: after every successful refresh it computes the
//! next delay from the new record's expiry (`remaining - buffer`, floored at the policy's
//! minimum interval) and sleeps until then. A failed proactive refresh is logged and the
//! loop re-arms with a fixed fallback delay instead of crashing; no error ever escapes the
//! background task.

// std
use std::time::Duration as StdDuration;
// crates.io
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
// self
use crate::{_prelude::*, browser::BrowserEngine, flows::Broker};

/// Handle to the background proactive-refresh loop.
///
/// Shutdown is idempotent and also runs on drop, so a scheduler can never outlive the
/// scope that spawned it.
#[derive(Debug)]
pub struct RefreshScheduler {
	cancel: CancellationToken,
	task: Mutex<Option<JoinHandle<()>>>,
}
impl RefreshScheduler {
	/// Spawns the proactive refresh loop for the provided broker.
	///
	/// When the cache is empty the first refresh runs immediately (this is how a serving
	/// process primes its cache at startup); otherwise the first delay is computed from the
	/// cached record's expiry.
	pub fn spawn<E>(broker: Broker<E>) -> Self
	where
		E: ?Sized + BrowserEngine,
	{
		let cancel = CancellationToken::new();
		let loop_cancel = cancel.clone();
		let task = tokio::spawn(async move {
			let mut delay = match broker.cache().snapshot() {
				Some(record) =>
					broker.freshness.refresh_delay(&record, OffsetDateTime::now_utc()),
				None => StdDuration::ZERO,
			};

			loop {
				tokio::select! {
					_ = loop_cancel.cancelled() => break,
					_ = tokio::time::sleep(delay) => {},
				}

				match broker.refresh_scheduled().await {
					Ok(record) =>
						delay = broker.freshness.refresh_delay(&record, OffsetDateTime::now_utc()),
					Err(error) => {
						#[cfg(feature = "tracing")]
						tracing::warn!(%error, "proactive refresh failed; re-arming");
						#[cfg(not(feature = "tracing"))]
						let _ = error;

						delay = broker.freshness.failure_rearm();
					},
				}
			}
		});

		Self { cancel, task: Mutex::new(Some(task)) }
	}

	/// Cancels the pending timer. Idempotent; a refresh already holding the lock finishes
	/// first, then the loop exits.
	pub fn shutdown(&self) {
		self.cancel.cancel();
	}

	/// Shuts down and waits for the loop to exit.
	pub async fn shutdown_and_wait(&self) {
		self.shutdown();

		let task = self.task.lock().take();

		if let Some(task) = task {
			let _ = task.await;
		}
	}
}
impl Drop for RefreshScheduler {
	fn drop(&mut self) {
		self.cancel.cancel();
	}
}
