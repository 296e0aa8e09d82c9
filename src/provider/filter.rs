//! Request filtering expressed as a configuration table.
//!
//! The table exists purely to cut page-load latency: heavyweight asset classes and tracking
//! hosts are aborted before they reach the network, requests to the target site (and with it
//! the token exchange) pass through, and anything off-site is dropped. It must never change
//! which response the acquisition flow observes.

// self
use crate::_prelude::*;

/// Resource classes reported by the browser for each outbound request.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
	/// Top-level or frame document.
	Document,
	/// Script resources.
	Script,
	/// XHR or fetch exchanges.
	Xhr,
	/// Image resources.
	Image,
	/// Stylesheet resources.
	Stylesheet,
	/// Font resources.
	Font,
	/// Audio/video resources.
	Media,
	/// Everything the browser does not classify further.
	Other,
}
impl ResourceKind {
	/// Maps a DevTools `resourceType` label onto a resource kind.
	pub fn from_protocol(label: &str) -> Self {
		match label {
			"Document" => Self::Document,
			"Script" => Self::Script,
			"XHR" | "Fetch" | "EventSource" => Self::Xhr,
			"Image" => Self::Image,
			"Stylesheet" => Self::Stylesheet,
			"Font" => Self::Font,
			"Media" | "TextTrack" => Self::Media,
			_ => Self::Other,
		}
	}
}

/// Outcome of evaluating one request against the filter table.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FilterDecision {
	/// Let the request reach the network.
	Allow,
	/// Abort the request before it leaves the browser.
	Abort,
}

/// Filter table evaluated for every outbound page request.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceFilter {
	/// Resource classes aborted outright.
	pub blocked_kinds: Vec<ResourceKind>,
	/// URL substrings aborted outright (tracking hosts, CDN prefixes).
	pub blocked_url_fragments: Vec<String>,
	/// Host suffixes allowed through; everything else off-table is aborted.
	pub allowed_host_suffixes: Vec<String>,
}
impl ResourceFilter {
	/// Builds the recommended table for a target host: heavyweight assets and common
	/// tracking hosts blocked, the target domain allowed.
	pub fn recommended(target_host: impl Into<String>) -> Self {
		Self {
			blocked_kinds: vec![
				ResourceKind::Image,
				ResourceKind::Stylesheet,
				ResourceKind::Font,
				ResourceKind::Media,
			],
			blocked_url_fragments: [
				"doubleclick.net",
				"google-analytics.com",
				"googletagmanager.com",
				"googlesyndication.com",
				"adservice.google.com",
				"connect.facebook.net",
				"platform.twitter.com",
				"hotjar.com",
				"branch.io",
				"cdn.cookielaw.org",
			]
			.into_iter()
			.map(str::to_owned)
			.collect(),
			allowed_host_suffixes: vec![target_host.into()],
		}
	}

	/// Adds another allowed host suffix (e.g. an asset or API subdomain on another zone).
	pub fn allow_host_suffix(mut self, suffix: impl Into<String>) -> Self {
		self.allowed_host_suffixes.push(suffix.into());

		self
	}

	/// Adds another blocked URL substring.
	pub fn block_url_fragment(mut self, fragment: impl Into<String>) -> Self {
		self.blocked_url_fragments.push(fragment.into());

		self
	}

	/// Whether a host matches one of the allowed suffixes.
	pub fn is_host_allowed(&self, host: &str) -> bool {
		self.allowed_host_suffixes.iter().any(|suffix| {
			host == suffix || host.ends_with(&format!(".{}", suffix.trim_start_matches('.')))
		})
	}

	/// Evaluates one request against the table.
	pub fn decide(&self, kind: ResourceKind, url: &str) -> FilterDecision {
		if self.blocked_kinds.contains(&kind) {
			return FilterDecision::Abort;
		}
		if self.blocked_url_fragments.iter().any(|fragment| url.contains(fragment.as_str())) {
			return FilterDecision::Abort;
		}

		let host = Url::parse(url).ok().and_then(|url| url.host_str().map(str::to_owned));

		match host {
			Some(host) if self.is_host_allowed(&host) => FilterDecision::Allow,
			_ => FilterDecision::Abort,
		}
	}
}
