//! Transport primitives for provider calls (token grants and REST requests alike).
//!
//! The module exposes [`ProviderHttpClient`] alongside [`ResponseMetadata`] and
//! [`ResponseMetadataSlot`] so downstream crates can plug in custom HTTP clients without losing
//! the broker's rate-limit bookkeeping. Implementations call [`ResponseMetadataSlot::take`]
//! before dispatching a request and [`ResponseMetadataSlot::store`] once the status and
//! rate-limit headers are known.

// std
use std::ops::Deref;
// crates.io
use oauth2::{AsyncHttpClient, HttpClientError, HttpRequest, HttpResponse};
#[cfg(feature = "reqwest")] use reqwest::header::{HeaderMap, RETRY_AFTER};
#[cfg(feature = "reqwest")] use time::format_description::well_known::Rfc2822;
// self
use crate::{_prelude::*, provider::RateLimitHints};
#[cfg(feature = "reqwest")] use crate::throttle::{MAX_RETRY_AFTER, retry_after_from_secs};

/// Abstraction over HTTP transports used for every provider call.
///
/// The broker requests short-lived [`AsyncHttpClient`] handles that each carry a clone of a
/// [`ResponseMetadataSlot`]. Implementations must be `Send + Sync + 'static` so they can be
/// shared across concurrent joins, and the request futures their handles return must be
/// `Send`.
pub trait ProviderHttpClient
where
	Self: 'static + Send + Sync,
{
	/// Concrete error emitted by the underlying transport.
	type TransportError: 'static + Send + Sync + StdError;

	/// [`AsyncHttpClient`] handle tied to a [`ResponseMetadataSlot`].
	type Handle: for<'c> AsyncHttpClient<
			'c,
			Error = HttpClientError<Self::TransportError>,
			Future: 'c + Send,
		>
		+ 'static
		+ Send
		+ Sync;

	/// Builds an [`AsyncHttpClient`] handle that records outcomes in `slot`.
	///
	/// # Metadata Contract
	///
	/// - Call [`ResponseMetadataSlot::take`] before submitting the HTTP request so stale
	///   information never leaks across retries.
	/// - Once a response (successful or erroneous) arrives, save its status and rate-limit headers
	///   with [`ResponseMetadataSlot::store`].
	fn with_metadata(&self, slot: ResponseMetadataSlot) -> Self::Handle;
}

/// Captures metadata from the most recent HTTP response for downstream error mapping.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ResponseMetadata {
	/// HTTP status code, if a response arrived.
	pub status: Option<u16>,
	/// `Retry-After` hint expressed as a relative duration.
	pub retry_after: Option<Duration>,
	/// Response declared a global rate limit through its headers.
	pub global: bool,
}
impl ResponseMetadata {
	/// Header-level rate-limit hints for [`ProviderStrategy::rate_limit_signal`].
	///
	/// [`ProviderStrategy::rate_limit_signal`]: crate::provider::ProviderStrategy::rate_limit_signal
	pub fn rate_limit_hints(&self) -> RateLimitHints {
		RateLimitHints { retry_after: self.retry_after, global: self.global }
	}
}

/// Thread-safe slot for sharing [`ResponseMetadata`] between transport and error layers.
///
/// The broker creates a fresh slot for each request and reads the captured metadata right
/// after the call resolves.
#[derive(Clone, Debug, Default)]
pub struct ResponseMetadataSlot(Arc<Mutex<Option<ResponseMetadata>>>);
impl ResponseMetadataSlot {
	/// Stores new metadata for the current request.
	pub fn store(&self, meta: ResponseMetadata) {
		*self.0.lock() = Some(meta);
	}

	/// Returns the captured metadata, if any, consuming it from the slot.
	pub fn take(&self) -> Option<ResponseMetadata> {
		self.0.lock().take()
	}
}

/// Thin wrapper around [`ReqwestClient`] so shared HTTP behavior lives in one place.
///
/// Provider calls must not follow redirects and must carry a per-call timeout; configure any
/// custom [`ReqwestClient`] accordingly ([`Broker::new`](crate::flows::Broker::new) does).
#[cfg(feature = "reqwest")]
#[derive(Clone, Default)]
pub struct ReqwestHttpClient(pub ReqwestClient);
#[cfg(feature = "reqwest")]
impl ReqwestHttpClient {
	/// Wraps an existing reqwest [`ReqwestClient`].
	pub fn with_client(client: ReqwestClient) -> Self {
		Self(client)
	}

	/// Builds a client with the given per-call timeout and redirects disabled.
	pub fn with_timeout(timeout: std::time::Duration) -> Result<Self, ReqwestError> {
		ReqwestClient::builder()
			.timeout(timeout)
			.redirect(reqwest::redirect::Policy::none())
			.build()
			.map(Self)
	}
}
#[cfg(feature = "reqwest")]
impl AsRef<ReqwestClient> for ReqwestHttpClient {
	fn as_ref(&self) -> &ReqwestClient {
		&self.0
	}
}
#[cfg(feature = "reqwest")]
impl Deref for ReqwestHttpClient {
	type Target = ReqwestClient;

	fn deref(&self) -> &Self::Target {
		&self.0
	}
}
#[cfg(feature = "reqwest")]
impl ProviderHttpClient for ReqwestHttpClient {
	type Handle = InstrumentedHandle;
	type TransportError = ReqwestError;

	fn with_metadata(&self, slot: ResponseMetadataSlot) -> Self::Handle {
		InstrumentedHandle(Arc::new(InstrumentedHttpClient { client: self.0.clone(), slot }))
	}
}

#[cfg(feature = "reqwest")]
struct InstrumentedHttpClient {
	client: ReqwestClient,
	slot: ResponseMetadataSlot,
}

/// Handle returned by [`ReqwestHttpClient`] that records response metadata.
#[cfg(feature = "reqwest")]
#[derive(Clone)]
pub struct InstrumentedHandle(Arc<InstrumentedHttpClient>);
#[cfg(feature = "reqwest")]
impl<'c> AsyncHttpClient<'c> for InstrumentedHandle {
	type Error = HttpClientError<ReqwestError>;
	type Future =
		Pin<Box<dyn Future<Output = Result<HttpResponse, Self::Error>> + 'c + Send + Sync>>;

	fn call(&'c self, request: HttpRequest) -> Self::Future {
		let client = Arc::clone(&self.0);

		Box::pin(async move {
			client.slot.take();

			let response = client
				.client
				.execute(request.try_into().map_err(Box::new)?)
				.await
				.map_err(Box::new)?;
			let status = response.status();
			let headers = response.headers().to_owned();

			client.slot.store(ResponseMetadata {
				status: Some(status.as_u16()),
				retry_after: parse_retry_after(&headers, OffsetDateTime::now_utc()),
				global: is_global_limit(&headers),
			});

			let mut response_new =
				HttpResponse::new(response.bytes().await.map_err(Box::new)?.to_vec());

			*response_new.status_mut() = status;
			*response_new.headers_mut() = headers;

			Ok(response_new)
		})
	}
}

#[cfg(feature = "reqwest")]
fn parse_retry_after(headers: &HeaderMap, now: OffsetDateTime) -> Option<Duration> {
	let raw = headers.get(RETRY_AFTER)?.to_str().ok()?.trim();

	if let Ok(secs) = raw.parse::<f64>() {
		return retry_after_from_secs(secs);
	}
	if let Ok(moment) = OffsetDateTime::parse(raw, &Rfc2822) {
		let delta = moment - now;

		if delta.is_positive() {
			return Some(delta.min(MAX_RETRY_AFTER));
		}
	}

	None
}

#[cfg(feature = "reqwest")]
fn is_global_limit(headers: &HeaderMap) -> bool {
	let header_is = |name: &str, expected: &str| {
		headers
			.get(name)
			.and_then(|value| value.to_str().ok())
			.is_some_and(|value| value.trim().eq_ignore_ascii_case(expected))
	};

	header_is("x-ratelimit-global", "true") || header_is("x-ratelimit-scope", "global")
}

#[cfg(all(test, feature = "reqwest"))]
mod tests {
	// crates.io
	use reqwest::header::HeaderValue;
	use time::macros;
	// self
	use super::*;

	const NOW: OffsetDateTime = macros::datetime!(2025-01-01 00:00 UTC);

	fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
		let mut map = HeaderMap::new();

		for (name, value) in pairs {
			map.insert(*name, HeaderValue::from_static(value));
		}

		map
	}

	#[test]
	fn retry_after_accepts_seconds_and_http_dates() {
		assert_eq!(
			parse_retry_after(&headers(&[("retry-after", "3")]), NOW),
			Some(Duration::seconds(3))
		);
		assert_eq!(
			parse_retry_after(&headers(&[("retry-after", "0.25")]), NOW),
			Some(Duration::milliseconds(250))
		);
		assert_eq!(
			parse_retry_after(&headers(&[("retry-after", "Wed, 01 Jan 2025 00:00:30 +0000")]), NOW),
			Some(Duration::seconds(30))
		);
		assert_eq!(parse_retry_after(&headers(&[("retry-after", "-1")]), NOW), None);
		assert_eq!(
			parse_retry_after(&headers(&[("retry-after", "1e300")]), NOW),
			Some(MAX_RETRY_AFTER)
		);
		assert_eq!(
			parse_retry_after(&headers(&[("retry-after", "Fri, 31 Dec 2100 00:00:00 +0000")]), NOW),
			Some(MAX_RETRY_AFTER)
		);
		assert_eq!(parse_retry_after(&headers(&[]), NOW), None);
	}

	#[test]
	fn global_limit_headers_are_recognized() {
		assert!(is_global_limit(&headers(&[("x-ratelimit-global", "true")])));
		assert!(is_global_limit(&headers(&[("x-ratelimit-scope", "global")])));
		assert!(!is_global_limit(&headers(&[("x-ratelimit-scope", "user")])));
		assert!(!is_global_limit(&headers(&[])));
	}

	#[test]
	fn metadata_slot_is_consumed_on_take() {
		let slot = ResponseMetadataSlot::default();

		slot.store(ResponseMetadata { status: Some(429), retry_after: None, global: true });

		assert_eq!(
			slot.take().map(|meta| meta.rate_limit_hints()),
			Some(RateLimitHints { retry_after: None, global: true })
		);
		assert_eq!(slot.take(), None);
	}
}
