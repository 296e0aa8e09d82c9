//! Authentication cookie model and the authenticated-browsing capability flag.

// self
use crate::_prelude::*;

/// Cookie name whose presence switches the target page onto its authenticated code path.
pub const AUTH_STATE_COOKIE: &str = "sp_dc";

/// Single authentication cookie forwarded into the browsing context.
///
/// The value is credential material; formatters redact it and the browser seam only ever
/// logs cookie counts, never values.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthCookie {
	name: String,
	value: String,
}
impl AuthCookie {
	/// Creates a cookie from a name/value pair.
	pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
		Self { name: name.into(), value: value.into() }
	}

	/// Cookie name.
	pub fn name(&self) -> &str {
		&self.name
	}

	/// Cookie value. Callers must avoid logging this string.
	pub fn value(&self) -> &str {
		&self.value
	}
}
impl Debug for AuthCookie {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("AuthCookie").field("name", &self.name).field("value", &"<redacted>").finish()
	}
}

/// Set of authentication cookies, unique by name; insertion order is irrelevant and a later
/// insert replaces an earlier cookie of the same name.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CookieSet(Vec<AuthCookie>);
impl CookieSet {
	/// Creates an empty cookie set.
	pub fn new() -> Self {
		Self::default()
	}

	/// Parses a `Cookie` request header into a set, skipping malformed pairs.
	pub fn from_cookie_header(header: &str) -> Self {
		let mut set = Self::new();

		for pair in header.split(';') {
			if let Some((name, value)) = pair.split_once('=') {
				let name = name.trim();

				if !name.is_empty() {
					set.insert(AuthCookie::new(name, value.trim()));
				}
			}
		}

		set
	}

	/// Inserts a cookie, replacing any existing cookie with the same name.
	pub fn insert(&mut self, cookie: AuthCookie) {
		self.0.retain(|existing| existing.name != cookie.name);
		self.0.push(cookie);
	}

	/// Returns `true` when the set contains no cookies.
	pub fn is_empty(&self) -> bool {
		self.0.is_empty()
	}

	/// Number of cookies in the set.
	pub fn len(&self) -> usize {
		self.0.len()
	}

	/// Iterates the cookies in the set.
	pub fn iter(&self) -> impl Iterator<Item = &AuthCookie> {
		self.0.iter()
	}

	/// Whether the caller wants a token derived from authenticated browsing state.
	///
	/// Computed once here at the boundary instead of re-derived per component: the set is
	/// authenticated exactly when it carries a cookie named [`AUTH_STATE_COOKIE`].
	pub fn wants_authenticated(&self) -> bool {
		self.0.iter().any(|cookie| cookie.name == AUTH_STATE_COOKIE)
	}
}
impl FromIterator<AuthCookie> for CookieSet {
	fn from_iter<I: IntoIterator<Item = AuthCookie>>(iter: I) -> Self {
		let mut set = Self::new();

		for cookie in iter {
			set.insert(cookie);
		}

		set
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn insert_is_unique_by_name_with_last_write_winning() {
		let set = CookieSet::from_iter([
			AuthCookie::new("a", "1"),
			AuthCookie::new("b", "2"),
			AuthCookie::new("a", "3"),
		]);

		assert_eq!(set.len(), 2);
		assert_eq!(
			set.iter().find(|cookie| cookie.name() == "a").map(AuthCookie::value),
			Some("3"),
		);
	}

	#[test]
	fn auth_state_cookie_flips_the_capability_flag() {
		let anonymous = CookieSet::from_iter([AuthCookie::new("theme", "dark")]);

		assert!(!anonymous.wants_authenticated());

		let authenticated = CookieSet::from_iter([
			AuthCookie::new("theme", "dark"),
			AuthCookie::new(AUTH_STATE_COOKIE, "opaque-session-material"),
		]);

		assert!(authenticated.wants_authenticated());
	}

	#[test]
	fn header_parsing_skips_malformed_pairs() {
		let set = CookieSet::from_cookie_header("a=1; malformed; =orphan; sp_dc=xyz ; b=2");

		assert_eq!(set.len(), 3);
		assert!(set.wants_authenticated());
	}

	#[test]
	fn debug_redacts_cookie_values() {
		let rendered = format!("{:?}", AuthCookie::new(AUTH_STATE_COOKIE, "opaque-session"));

		assert!(rendered.contains("sp_dc"));
		assert!(!rendered.contains("opaque-session"));
	}
}
