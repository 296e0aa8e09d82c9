// self
use webtoken_broker::{_preludet::*, flows::TokenRequest};

#[tokio::test]
async fn queued_forced_refresh_reuses_the_winners_token() {
	let (broker, engine) = build_scripted_broker([
		ScriptedCall::Respond { status: 200, body: payload_body("winner", 600_000, true) },
		ScriptedCall::Respond { status: 200, body: payload_body("never-used", 600_000, true) },
	]);
	let (first, second) = tokio::join!(
		broker.try_token(TokenRequest::new().force_refresh()),
		broker.try_token(TokenRequest::new().force_refresh()),
	);
	let first = first.expect("First forced lookup should succeed.");
	let second = second.expect("Second forced lookup should succeed.");

	// One of the two performed the acquisition; the other observed the finished refresh
	// under the lock and reused it without a second browser launch.
	assert!(Arc::ptr_eq(&first.record, &second.record));
	assert_eq!(engine.launches(), 1);
	assert_eq!(engine.max_in_flight(), 1);
	assert_eq!(broker.refresh_metrics.attempts(), 1);
	assert_eq!(broker.refresh_metrics.cache_hits(), 1);
}

#[tokio::test]
async fn refreshes_that_both_run_are_still_strictly_serialized() {
	// Tokens whose remaining lifetime is below the freshness buffer are never usable, so the
	// queued caller's double-check fails and it performs its own acquisition - serially.
	let (broker, engine) = build_scripted_broker([
		ScriptedCall::Respond { status: 200, body: payload_body("short-lived-a", 60_000, true) },
		ScriptedCall::Respond { status: 200, body: payload_body("short-lived-b", 60_000, true) },
	]);
	let (first, second) = tokio::join!(
		broker.try_token(TokenRequest::new().force_refresh()),
		broker.try_token(TokenRequest::new().force_refresh()),
	);

	first.expect("First forced lookup should succeed.");
	second.expect("Second forced lookup should succeed.");

	assert_eq!(engine.launches(), 2);
	assert_eq!(engine.max_in_flight(), 1, "Acquisitions must never overlap.");
	assert_eq!(engine.closes(), 2);
}
