// self
use webtoken_broker::{
	_preludet::*,
	auth::{AUTH_STATE_COOKIE, AuthCookie, CookieSet, TokenPayload},
	error::AcquisitionError,
	flows::{RetryPolicy, TokenRequest},
};

#[tokio::test]
async fn cold_lookup_acquires_then_serves_from_cache() {
	let (broker, engine) = build_scripted_broker([ScriptedCall::Respond {
		status: 200,
		body: payload_body("abc", 600_000, true),
	}]);
	let grant = broker
		.try_token(TokenRequest::new())
		.await
		.expect("Cold lookup should acquire a token.");

	assert_eq!(grant.record.access_token.expose(), "abc");
	assert!(grant.record.is_anonymous);
	assert!(!grant.cached);
	assert_eq!(engine.launches(), 1);
	assert_eq!(engine.closes(), 1);

	let cached = broker
		.try_token(TokenRequest::new())
		.await
		.expect("Warm lookup should serve from cache.");

	assert!(cached.cached);
	assert!(Arc::ptr_eq(&grant.record, &cached.record));
	assert_eq!(engine.launches(), 1, "A cache hit must not launch a browser.");
}

#[tokio::test]
async fn fast_path_is_idempotent_while_the_record_stays_valid() {
	let (broker, engine) = build_scripted_broker([ScriptedCall::Respond {
		status: 200,
		body: payload_body("abc", 600_000, true),
	}]);

	broker.try_token(TokenRequest::new()).await.expect("Priming lookup should succeed.");

	for _ in 0..16 {
		let grant = broker
			.token(TokenRequest::new())
			.await
			.expect("Fast-path lookup should keep succeeding.");

		assert!(grant.cached);
	}

	assert_eq!(engine.launches(), 1);
	assert_eq!(broker.refresh_metrics.cache_hits(), 16);
	assert_eq!(broker.refresh_metrics.attempts(), 1);
}

#[tokio::test]
async fn upstream_notes_field_is_stripped_from_the_token() {
	let expires_at_ms =
		(OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000) as i64 + 600_000;
	let body = format!(
		"{{\"accessToken\":\"abc\",\"expiresAtMs\":{expires_at_ms},\"isAnonymous\":true,\
		\"_notes\":\"internal diagnostic\"}}"
	);
	let (broker, _engine) = build_scripted_broker([ScriptedCall::Respond { status: 200, body }]);
	let grant = broker
		.try_token(TokenRequest::new())
		.await
		.expect("Payload carrying `_notes` should still yield a token.");
	let serialized = serde_json::to_value(TokenPayload::from(grant.record.as_ref()))
		.expect("Token payload should serialize.");

	assert_eq!(serialized.get("accessToken").and_then(serde_json::Value::as_str), Some("abc"));
	assert!(serialized.get("_notes").is_none());
}

#[tokio::test]
async fn non_success_endpoint_status_fails_the_lookup() {
	let (broker, engine) = build_scripted_broker([ScriptedCall::Respond {
		status: 503,
		body: "upstream is unwell".into(),
	}]);
	let broker = broker.with_retry(RetryPolicy { max_attempts: 1, ..RetryPolicy::default() });
	let err = broker
		.try_token(TokenRequest::new())
		.await
		.expect_err("A non-success endpoint status should fail the lookup.");

	assert!(matches!(
		err,
		Error::Exhausted { attempts: 1, source: AcquisitionError::EndpointStatus { status: 503 } },
	));
	assert_eq!(engine.closes(), 1, "Teardown must run on the failure path too.");
}

#[tokio::test(start_paused = true)]
async fn forced_refresh_failure_is_not_papered_over_with_stale_cache() {
	let (broker, engine) = build_scripted_broker([
		ScriptedCall::Respond { status: 200, body: payload_body("stale-but-valid", 600_000, true) },
		ScriptedCall::NavigationFailure,
		ScriptedCall::NavigationFailure,
		ScriptedCall::NavigationFailure,
	]);
	let primed = broker
		.try_token(TokenRequest::new())
		.await
		.expect("Priming lookup should succeed.");

	broker
		.try_token(TokenRequest::new().force_refresh())
		.await
		.expect_err("A forced refresh whose acquisitions all fail must propagate the failure.");

	assert_eq!(engine.launches(), 4);

	// The cache itself is untouched; a later non-forced lookup still serves the old record.
	let warm = broker
		.try_token(TokenRequest::new())
		.await
		.expect("Non-forced lookup should still serve the cached record.");

	assert!(warm.cached);
	assert!(Arc::ptr_eq(&primed.record, &warm.record));
}

#[tokio::test]
async fn authenticated_cookies_bypass_an_anonymous_cache_entry() {
	let (broker, engine) = build_scripted_broker([
		ScriptedCall::Respond { status: 200, body: payload_body("anon", 600_000, true) },
		ScriptedCall::Respond { status: 200, body: payload_body("authed", 600_000, false) },
	]);

	broker.try_token(TokenRequest::new()).await.expect("Anonymous priming should succeed.");

	let authenticated_cookies =
		CookieSet::from_iter([AuthCookie::new(AUTH_STATE_COOKIE, "opaque-session")]);
	let authed = broker
		.try_token(TokenRequest::new().with_cookies(authenticated_cookies.clone()))
		.await
		.expect("Authenticated lookup should acquire a new token.");

	assert!(!authed.cached);
	assert!(!authed.record.is_anonymous);
	assert_eq!(engine.launches(), 2);
	assert_eq!(engine.cookie_batches(), vec![1]);

	// Same cookies again: the cached record now matches the capability flag.
	let warm = broker
		.try_token(TokenRequest::new().with_cookies(authenticated_cookies))
		.await
		.expect("Repeated authenticated lookup should hit the cache.");

	assert!(warm.cached);
	assert_eq!(engine.launches(), 2);

	// No cookies imposes no constraint; the authenticated record is still served.
	let unconstrained = broker
		.try_token(TokenRequest::new())
		.await
		.expect("Cookie-less lookup should hit the cache.");

	assert!(unconstrained.cached);
	assert_eq!(engine.launches(), 2);
}
