//! Runtime settings shared by every broker flow.

// std
use std::num::NonZeroUsize;
// self
use crate::{_prelude::*, auth::ScopeSet, error::ConfigError};

/// Tunables for authorization, provider calls, and batch joins.
///
/// Deserializes from any serde format with every field optional, so a config file only needs
/// to name what it overrides.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrokerSettings {
	/// Scopes requested when starting authorization.
	pub scopes: ScopeSet,
	/// OAuth callback URL registered with the provider.
	pub redirect_uri: Option<Url>,
	/// Timeout applied to every provider call (`request_timeout_secs` in config files).
	#[serde(rename = "request_timeout_secs", with = "secs")]
	pub request_timeout: Duration,
	/// Cool-down applied when a rate-limit signal carries no duration
	/// (`default_retry_after_secs` in config files).
	#[serde(rename = "default_retry_after_secs", with = "secs")]
	pub default_retry_after: Duration,
	/// Upper bound on simultaneous join calls within one batch; `None` means unbounded.
	pub max_concurrent_joins: Option<NonZeroUsize>,
}
impl BrokerSettings {
	const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::seconds(10);
	const DEFAULT_RETRY_AFTER: Duration = Duration::seconds(5);

	/// Sets the OAuth callback URL.
	pub fn with_redirect_uri(mut self, uri: Url) -> Self {
		self.redirect_uri = Some(uri);

		self
	}

	/// Overrides the requested scopes.
	pub fn with_scopes(mut self, scopes: ScopeSet) -> Self {
		self.scopes = scopes;

		self
	}

	/// Overrides the per-call timeout.
	pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
		self.request_timeout = timeout;

		self
	}

	/// Overrides the fallback cool-down.
	pub fn with_default_retry_after(mut self, retry_after: Duration) -> Self {
		self.default_retry_after = retry_after;

		self
	}

	/// Bounds per-batch concurrency; `0` removes the bound.
	pub fn with_max_concurrent_joins(mut self, limit: usize) -> Self {
		self.max_concurrent_joins = NonZeroUsize::new(limit);

		self
	}

	/// Per-call timeout as a [`std::time::Duration`] for transport builders.
	pub fn request_timeout_std(&self) -> std::time::Duration {
		self.request_timeout.try_into().unwrap_or(std::time::Duration::ZERO)
	}

	/// Redirect URI, or [`ConfigError::InvalidRedirect`] when none was configured.
	pub fn require_redirect_uri(&self) -> Result<&Url, ConfigError> {
		self.redirect_uri.as_ref().ok_or(ConfigError::InvalidRedirect { source: None })
	}
}
impl Default for BrokerSettings {
	fn default() -> Self {
		Self {
			scopes: ScopeSet::guild_join(),
			redirect_uri: None,
			request_timeout: Self::DEFAULT_REQUEST_TIMEOUT,
			default_retry_after: Self::DEFAULT_RETRY_AFTER,
			max_concurrent_joins: None,
		}
	}
}

mod secs {
	// crates.io
	use serde::{Deserializer, Serializer};
	// self
	use crate::_prelude::*;

	pub(super) fn serialize<S>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error>
	where
		S: Serializer,
	{
		serializer.serialize_f64(value.as_seconds_f64())
	}

	pub(super) fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
	where
		D: Deserializer<'de>,
	{
		let secs = f64::deserialize(deserializer)?;

		if !secs.is_finite() || secs < 0.0 {
			return Err(serde::de::Error::custom("duration must be a non-negative number of seconds"));
		}

		Ok(Duration::seconds_f64(secs))
	}
}
