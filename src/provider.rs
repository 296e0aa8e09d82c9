//! Target-site descriptor data structures and helpers shared by all flows.
//!
//! The module exposes validated metadata about the page being driven (root URL, the path
//! fragment identifying the token exchange, cookie scoping) plus the request-filter table,
//! so the acquisition flow stays free of site-specific literals.

/// Request filtering table installed per page.
pub mod filter;

pub use filter::*;

// self
use crate::_prelude::*;

const DEFAULT_ACQUISITION_DEADLINE: Duration = Duration::seconds(45);

/// Errors raised while constructing or validating site descriptors.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum SiteDescriptorError {
	/// Root URL must use HTTPS.
	#[error("The root URL must use HTTPS: {url}.")]
	InsecureRootUrl {
		/// Root URL that failed validation.
		url: String,
	},
	/// The token endpoint fragment is required to identify the intercepted exchange.
	#[error("The token endpoint fragment cannot be empty.")]
	EmptyTokenEndpointFragment,
	/// Cookies need a parent domain to be scoped to.
	#[error("The cookie domain cannot be empty.")]
	EmptyCookieDomain,
	/// The acquisition deadline must be a positive duration.
	#[error("The acquisition deadline must be positive.")]
	NonPositiveDeadline,
}

/// Immutable descriptor of the target site consumed by flows.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SiteDescriptor {
	/// Root page navigated to trigger the token exchange.
	pub root_url: Url,
	/// Substring identifying the token endpoint among captured response URLs.
	pub token_endpoint_fragment: String,
	/// Parent domain cookies are scoped to before navigation.
	pub cookie_domain: String,
	/// Overall deadline for one acquisition attempt.
	pub acquisition_deadline: Duration,
	/// Request filtering table installed on every page.
	pub filter: ResourceFilter,
}
impl SiteDescriptor {
	/// Creates a new builder seeded with the provided root URL.
	pub fn builder(root_url: Url) -> SiteDescriptorBuilder {
		SiteDescriptorBuilder::new(root_url)
	}
}

/// Builder for [`SiteDescriptor`] values.
#[derive(Debug)]
pub struct SiteDescriptorBuilder {
	/// Root page navigated to trigger the token exchange.
	pub root_url: Url,
	/// Substring identifying the token endpoint among captured response URLs.
	pub token_endpoint_fragment: Option<String>,
	/// Parent domain cookies are scoped to before navigation.
	pub cookie_domain: Option<String>,
	/// Overall deadline for one acquisition attempt.
	pub acquisition_deadline: Duration,
	/// Request filtering table; defaults to [`ResourceFilter::recommended`] for the root host.
	pub filter: Option<ResourceFilter>,
}
impl SiteDescriptorBuilder {
	/// Creates a new builder seeded with the provided root URL.
	pub fn new(root_url: Url) -> Self {
		Self {
			root_url,
			token_endpoint_fragment: None,
			cookie_domain: None,
			acquisition_deadline: DEFAULT_ACQUISITION_DEADLINE,
			filter: None,
		}
	}

	/// Sets the token endpoint fragment.
	pub fn token_endpoint_fragment(mut self, fragment: impl Into<String>) -> Self {
		self.token_endpoint_fragment = Some(fragment.into());

		self
	}

	/// Sets the cookie parent domain.
	pub fn cookie_domain(mut self, domain: impl Into<String>) -> Self {
		self.cookie_domain = Some(domain.into());

		self
	}

	/// Overrides the overall acquisition deadline (defaults to 45 seconds).
	pub fn acquisition_deadline(mut self, deadline: Duration) -> Self {
		self.acquisition_deadline = deadline;

		self
	}

	/// Overrides the request filtering table.
	pub fn filter(mut self, filter: ResourceFilter) -> Self {
		self.filter = Some(filter);

		self
	}

	/// Consumes the builder and validates the resulting descriptor.
	pub fn build(self) -> Result<SiteDescriptor, SiteDescriptorError> {
		if self.root_url.scheme() != "https" {
			return Err(SiteDescriptorError::InsecureRootUrl { url: self.root_url.to_string() });
		}

		let token_endpoint_fragment = self
			.token_endpoint_fragment
			.filter(|fragment| !fragment.is_empty())
			.ok_or(SiteDescriptorError::EmptyTokenEndpointFragment)?;
		let cookie_domain = self
			.cookie_domain
			.filter(|domain| !domain.is_empty())
			.ok_or(SiteDescriptorError::EmptyCookieDomain)?;

		if !self.acquisition_deadline.is_positive() {
			return Err(SiteDescriptorError::NonPositiveDeadline);
		}

		let filter = self.filter.unwrap_or_else(|| {
			ResourceFilter::recommended(self.root_url.host_str().unwrap_or_default())
		});

		Ok(SiteDescriptor {
			root_url: self.root_url,
			token_endpoint_fragment,
			cookie_domain,
			acquisition_deadline: self.acquisition_deadline,
			filter,
		})
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	fn url(value: &str) -> Url {
		Url::parse(value).expect("Failed to parse descriptor URL fixture.")
	}

	#[test]
	fn builder_rejects_insecure_and_incomplete_descriptors() {
		let err = SiteDescriptor::builder(url("http://site.test/"))
			.token_endpoint_fragment("/api/token")
			.cookie_domain(".site.test")
			.build()
			.expect_err("Insecure root URL should be rejected.");

		assert!(matches!(err, SiteDescriptorError::InsecureRootUrl { .. }));

		let err = SiteDescriptor::builder(url("https://site.test/"))
			.cookie_domain(".site.test")
			.build()
			.expect_err("Missing token endpoint fragment should be rejected.");

		assert!(matches!(err, SiteDescriptorError::EmptyTokenEndpointFragment));

		let err = SiteDescriptor::builder(url("https://site.test/"))
			.token_endpoint_fragment("/api/token")
			.build()
			.expect_err("Missing cookie domain should be rejected.");

		assert!(matches!(err, SiteDescriptorError::EmptyCookieDomain));

		let err = SiteDescriptor::builder(url("https://site.test/"))
			.token_endpoint_fragment("/api/token")
			.cookie_domain(".site.test")
			.acquisition_deadline(Duration::ZERO)
			.build()
			.expect_err("Non-positive deadline should be rejected.");

		assert!(matches!(err, SiteDescriptorError::NonPositiveDeadline));
	}

	#[test]
	fn builder_seeds_the_recommended_filter_with_the_root_host() {
		let descriptor = SiteDescriptor::builder(url("https://site.test/"))
			.token_endpoint_fragment("/api/token")
			.cookie_domain(".site.test")
			.build()
			.expect("Valid descriptor should build.");

		assert!(descriptor.filter.is_host_allowed("site.test"));
		assert!(descriptor.filter.is_host_allowed("open.site.test"));
	}
}
