// std
use std::time::Duration as StdDuration;
// self
use webtoken_broker::{
	_preludet::*,
	flows::{Broker, RetryPolicy},
	scheduler::RefreshScheduler,
};

#[tokio::test(start_paused = true)]
async fn scheduler_primes_the_cache_and_rearms_ahead_of_expiry() {
	let (broker, engine) = build_scripted_broker([
		ScriptedCall::Respond { status: 200, body: payload_body("primed", 600_000, true) },
		ScriptedCall::Respond { status: 200, body: payload_body("rearmed", 600_000, true) },
	]);
	let scheduler = RefreshScheduler::spawn(broker.clone());

	// Empty cache: the first proactive refresh runs immediately.
	tokio::time::sleep(StdDuration::from_secs(1)).await;

	assert_eq!(engine.launches(), 1);
	assert_eq!(
		broker.cache().snapshot().expect("Scheduler should have primed the cache.").access_token.expose(),
		"primed",
	);

	// Next refresh is due `remaining - buffer` later: 10 min lifetime, 2 min buffer.
	tokio::time::sleep(StdDuration::from_secs(9 * 60)).await;

	assert_eq!(engine.launches(), 2);
	assert_eq!(
		broker.cache().snapshot().expect("Cache should hold the rearmed record.").access_token.expose(),
		"rearmed",
	);

	scheduler.shutdown_and_wait().await;
}

#[tokio::test(start_paused = true)]
async fn scheduler_survives_failures_and_rearms_with_the_fallback_delay() {
	let engine = ScriptedEngine::always(ScriptedCall::NavigationFailure);
	let broker: Broker<ScriptedEngine> = Broker::new(engine.clone(), test_site_descriptor())
		.with_retry(RetryPolicy { max_attempts: 1, ..RetryPolicy::default() });
	let scheduler = RefreshScheduler::spawn(broker.clone());

	tokio::time::sleep(StdDuration::from_secs(1)).await;

	assert_eq!(engine.launches(), 1);
	assert!(broker.cache().snapshot().is_none());

	// Failure re-arm delay is 60 s; two more cycles fit into the next two minutes and the
	// loop is still alive afterwards.
	tokio::time::sleep(StdDuration::from_secs(125)).await;

	assert!(engine.launches() >= 3);

	scheduler.shutdown_and_wait().await;

	// Shutdown is idempotent and actually stops the loop.
	scheduler.shutdown();

	let stopped_at = engine.launches();

	tokio::time::sleep(StdDuration::from_secs(600)).await;

	assert_eq!(engine.launches(), stopped_at);
}

#[tokio::test(start_paused = true)]
async fn scheduler_starts_from_the_cached_expiry_when_one_exists() {
	let (broker, engine) = build_scripted_broker([
		ScriptedCall::Respond { status: 200, body: payload_body("caller-fetched", 600_000, true) },
		ScriptedCall::Respond { status: 200, body: payload_body("scheduled", 600_000, true) },
	]);

	broker
		.try_token(webtoken_broker::flows::TokenRequest::new())
		.await
		.expect("Caller-driven priming should succeed.");

	let scheduler = RefreshScheduler::spawn(broker.clone());

	// Well before `remaining - buffer` nothing happens.
	tokio::time::sleep(StdDuration::from_secs(60)).await;

	assert_eq!(engine.launches(), 1);

	tokio::time::sleep(StdDuration::from_secs(8 * 60)).await;

	assert_eq!(engine.launches(), 2);

	scheduler.shutdown_and_wait().await;
}
