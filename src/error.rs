//! Broker-level error types shared across flows, providers, stores, and the throttle tracker.

// self
use crate::{_prelude::*, throttle::ThrottleScope};

/// Broker-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Canonical broker error exposed by public APIs.
#[derive(Debug, ThisError)]
pub enum Error {
	/// Storage-layer failure.
	#[error("{0}")]
	Storage(
		#[from]
		#[source]
		crate::store::StoreError,
	),
	/// Local configuration problem.
	#[error(transparent)]
	Config(#[from] ConfigError),
	/// Temporary upstream failure; retry with backoff.
	#[error(transparent)]
	Transient(#[from] TransientError),
	/// Transport failure (DNS, TCP, TLS).
	#[error(transparent)]
	Transport(#[from] TransportError),
	/// Caller supplied a malformed identifier (missing target, blank user id, ...).
	#[error("Invalid input: {0}")]
	InvalidInput(#[from] crate::auth::IdentifierError),

	/// Provider rejected the grant (expired or reused code, dead refresh token).
	///
	/// Never retried; the end user must restart the authorization flow.
	#[error("Provider rejected the grant: {reason}.")]
	InvalidGrant {
		/// Provider- or broker-supplied reason string.
		reason: String,
	},
	/// Client authentication failed or credentials are malformed.
	#[error("Client authentication failed: {reason}.")]
	InvalidClient {
		/// Provider- or broker-supplied reason string.
		reason: String,
	},
	/// No usable credential pair exists (absent, or the refresh failed).
	#[error("No usable credentials; please log in again.")]
	Unauthenticated,
	/// Provider-imposed rate limit is active for the scope; try again shortly.
	#[error("Rate limited ({scope}); try again after {retry_at}.")]
	Throttled {
		/// Scope that is currently blocked.
		scope: ThrottleScope,
		/// Instant after which the block clears.
		retry_at: OffsetDateTime,
	},
	/// Any other rejection returned by the provider API.
	#[error("Provider API rejected the request: {message}.")]
	Provider {
		/// HTTP status code, when available.
		status: Option<u16>,
		/// Provider- or broker-supplied message.
		message: String,
	},
}
impl Error {
	/// Returns `true` for the distinguished backpressure outcome.
	pub fn is_throttled(&self) -> bool {
		matches!(self, Self::Throttled { .. })
	}
}

/// Configuration and validation failures raised by the broker.
#[derive(Debug, ThisError)]
pub enum ConfigError {
	/// HTTP client could not be constructed.
	#[error("HTTP client could not be constructed.")]
	HttpClientBuild {
		/// Underlying transport builder failure.
		#[source]
		source: BoxError,
	},
	/// HTTP request construction failed.
	#[error(transparent)]
	HttpRequest(#[from] oauth2::http::Error),
	/// Provider descriptor contains an invalid URL.
	#[error("Descriptor contains an invalid URL.")]
	InvalidDescriptor {
		/// Underlying parsing failure.
		#[source]
		source: oauth2::url::ParseError,
	},
	/// Redirect URI is missing or cannot be parsed.
	#[error("Redirect URI is missing or invalid.")]
	InvalidRedirect {
		/// Underlying parsing failure, if any.
		#[source]
		source: Option<oauth2::url::ParseError>,
	},
	/// The add-member call needs an application bot token.
	#[error("A bot token is required to add members to a target.")]
	MissingBotToken,
	/// Token endpoint response omitted a refresh token.
	#[error("Token endpoint response is missing a refresh token.")]
	MissingRefreshToken,
	/// Requested scopes cannot be normalized.
	#[error("Requested scopes are invalid.")]
	InvalidScope(#[from] crate::auth::ScopeValidationError),
	/// Token endpoint returned an excessively large `expires_in`.
	#[error("The expires_in value exceeds the supported range.")]
	ExpiresInOutOfRange,
	/// Token endpoint returned a non-positive duration.
	#[error("The expires_in value must be positive.")]
	NonPositiveExpiresIn,
}
impl ConfigError {
	/// Wraps a transport's builder failure inside [`ConfigError`].
	pub fn http_client_build(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::HttpClientBuild { source: Box::new(src) }
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for ConfigError {
	fn from(e: ReqwestError) -> Self {
		Self::http_client_build(e)
	}
}

/// Temporary failure variants (safe to retry).
#[derive(Debug, ThisError)]
pub enum TransientError {
	/// Provider returned an unexpected but non-fatal response.
	#[error("Provider endpoint returned an unexpected response: {message}.")]
	Endpoint {
		/// Provider- or broker-supplied message summarizing the failure.
		message: String,
		/// HTTP status code, when available.
		status: Option<u16>,
		/// Retry-After hint from upstream, if supplied.
		retry_after: Option<Duration>,
	},
	/// Provider answered with a rate-limit signal.
	#[error("Provider rate limited the {call} call.")]
	RateLimited {
		/// Call that was rate limited.
		call: crate::provider::ProviderCall,
		/// Provider-supplied cool-down, if any.
		retry_after: Option<Duration>,
		/// Whether the limit applies to every target.
		global: bool,
	},
	/// Provider responded with malformed JSON that could not be parsed.
	#[error("Provider endpoint returned malformed JSON.")]
	ResponseParse {
		/// Structured parsing failure.
		#[source]
		source: serde_path_to_error::Error<serde_json::error::Error>,
		/// HTTP status code, when available.
		status: Option<u16>,
	},
}
impl TransientError {
	/// Retry-After hint carried by the failure, if any.
	pub fn retry_after(&self) -> Option<Duration> {
		match self {
			Self::Endpoint { retry_after, .. } | Self::RateLimited { retry_after, .. } => *retry_after,
			Self::ResponseParse { .. } => None,
		}
	}

	/// HTTP status carried by the failure, if any.
	pub fn status(&self) -> Option<u16> {
		match self {
			Self::Endpoint { status, .. } | Self::ResponseParse { status, .. } => *status,
			Self::RateLimited { .. } => Some(429),
		}
	}
}

/// Transport-level failures (network, IO, timeouts).
#[derive(Debug, ThisError)]
pub enum TransportError {
	/// Underlying HTTP client reported a network failure.
	#[error("Network error occurred while calling the provider.")]
	Network {
		/// Transport-specific network error.
		#[source]
		source: BoxError,
	},
	/// Underlying IO failure surfaced during transport.
	#[error("I/O error occurred while calling the provider.")]
	Io(#[from] std::io::Error),
}
impl TransportError {
	/// Wraps a transport-specific network error.
	pub fn network(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::Network { source: Box::new(src) }
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for TransportError {
	fn from(e: ReqwestError) -> Self {
		Self::network(e)
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::auth::TargetId;

	#[test]
	fn throttled_error_names_scope() {
		let target = TargetId::new("900").expect("Target fixture should be valid.");
		let err = Error::Throttled {
			scope: ThrottleScope::Target(target),
			retry_at: time::macros::datetime!(2025-01-01 00:00 UTC),
		};

		assert!(err.is_throttled());
		assert!(err.to_string().contains("target 900"));
	}

	#[test]
	fn transient_error_exposes_hints() {
		let err = TransientError::Endpoint {
			message: "slow down".into(),
			status: Some(429),
			retry_after: Some(Duration::seconds(3)),
		};

		assert_eq!(err.status(), Some(429));
		assert_eq!(err.retry_after(), Some(Duration::seconds(3)));
	}
}
