// std
use std::time::Duration as StdDuration;
// self
use webtoken_broker::{
	_preludet::*,
	error::AcquisitionError,
	flows::{Broker, TokenRequest},
};

#[tokio::test(start_paused = true)]
async fn always_failing_acquisitions_exhaust_the_budget_on_the_exponential_schedule() {
	let engine = ScriptedEngine::always(ScriptedCall::NavigationFailure);
	let broker: Broker<ScriptedEngine> = Broker::new(engine.clone(), test_site_descriptor());
	let started = tokio::time::Instant::now();
	let err = broker
		.try_token(TokenRequest::new())
		.await
		.expect_err("A lookup whose every attempt fails must propagate a failure.");

	assert!(matches!(
		err,
		Error::Exhausted { attempts: 3, source: AcquisitionError::Navigation { .. } },
	));
	assert_eq!(engine.launches(), 3);
	assert_eq!(engine.closes(), 3, "Every attempt tears its session down.");
	// Delays run only between attempts: 1000 ms + 2000 ms, nothing after the last failure.
	assert_eq!(started.elapsed(), StdDuration::from_millis(3_000));
}

#[tokio::test(start_paused = true)]
async fn one_good_attempt_recovers_from_earlier_failures() {
	let (broker, engine) = build_scripted_broker([
		ScriptedCall::NavigationFailure,
		ScriptedCall::Respond { status: 200, body: payload_body("recovered", 600_000, true) },
	]);
	let grant = broker
		.try_token(TokenRequest::new())
		.await
		.expect("The second attempt should recover the lookup.");

	assert_eq!(grant.record.access_token.expose(), "recovered");
	assert_eq!(engine.launches(), 2);
	assert_eq!(broker.refresh_metrics.successes(), 1);
	assert_eq!(broker.refresh_metrics.failures(), 0, "Swallowed attempts are not failures.");
}
