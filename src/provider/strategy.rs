//! Provider strategy hooks that classify failures and read rate-limit signals.
//!
//! Implementations normalize error mapping without tying flows to any particular HTTP client.

// self
use crate::{_prelude::*, throttle::retry_after_from_secs};

/// Strategy hook that allows providers to classify errors and interpret rate limits.
///
/// Implementors are required to be `Send + Sync`; the hooks use crate-owned data types so
/// downstream crates never depend on reqwest-specific structures.
pub trait ProviderStrategy: Send + Sync {
	/// Maps a failed provider response into the broker taxonomy.
	fn classify_error(&self, ctx: &ProviderErrorContext) -> ProviderErrorKind;

	/// Extracts the duration and scope of a rate-limit response.
	///
	/// The default implementation reads the JSON body shape
	/// `{"retry_after": <seconds>, "global": <bool>}` and falls back to header hints.
	fn rate_limit_signal(&self, hints: &RateLimitHints, body: &[u8]) -> RateLimitSignal {
		RateLimitSignal::from_parts(hints, body)
	}
}

/// Provider call a failure originated from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderCall {
	/// `authorization_code` grant exchange.
	AuthorizationCode,
	/// `refresh_token` grant exchange.
	RefreshToken,
	/// Identity lookup with the user's bearer token.
	Identify,
	/// Add-member call into a target.
	AddMember,
}
impl ProviderCall {
	/// Stable label used in logs and metrics.
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::AuthorizationCode => "authorization_code",
			Self::RefreshToken => "refresh_token",
			Self::Identify => "identify",
			Self::AddMember => "add_member",
		}
	}

	/// Returns `true` for calls against the token endpoint.
	pub const fn is_token_grant(self) -> bool {
		matches!(self, Self::AuthorizationCode | Self::RefreshToken)
	}
}
impl Display for ProviderCall {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Canonical provider error categories used by strategies.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProviderErrorKind {
	/// Provider rejected the authorization grant (bad code or refresh token).
	InvalidGrant,
	/// Client authentication failed.
	InvalidClient,
	/// The user's access token was rejected by an API call.
	Unauthorized,
	/// Provider signalled a rate limit.
	RateLimited,
	/// Failure is temporary and may be retried later.
	Transient,
	/// Any other rejection (permission denial, malformed request, unknown target).
	Rejected,
}

/// Context passed to provider strategies when classifying errors.
///
/// Only primitive data (status codes, OAuth fields, provider codes, body preview) is kept so
/// strategies stay decoupled from any HTTP client.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProviderErrorContext {
	/// Call associated with the failing request.
	pub call: ProviderCall,
	/// HTTP status code returned by the provider, when available.
	pub http_status: Option<u16>,
	/// Provider-supplied OAuth `error` field.
	pub oauth_error: Option<String>,
	/// Provider-supplied OAuth `error_description` field.
	pub error_description: Option<String>,
	/// Numeric error code from a REST error body.
	pub provider_code: Option<u64>,
	/// Code meaning "user access token rejected" for this provider, if any.
	pub invalid_user_token_code: Option<u64>,
	/// Preview of the response body.
	pub body_preview: Option<String>,
	/// Indicates whether the failure originated from the network/transport layer.
	pub network_error: bool,
}
impl ProviderErrorContext {
	const BODY_PREVIEW_LIMIT: usize = 256;

	/// Creates a new context scoped to the provided call.
	pub fn new(call: ProviderCall) -> Self {
		Self {
			call,
			http_status: None,
			oauth_error: None,
			error_description: None,
			provider_code: None,
			invalid_user_token_code: None,
			body_preview: None,
			network_error: false,
		}
	}

	/// Convenience constructor for transport-level/network failures.
	pub fn network_failure(call: ProviderCall) -> Self {
		let mut ctx = Self::new(call);

		ctx.network_error = true;

		ctx
	}

	/// Adds an HTTP status code.
	pub fn with_http_status(mut self, status: u16) -> Self {
		self.http_status = Some(status);

		self
	}

	/// Adds the OAuth error code string returned by the provider.
	pub fn with_oauth_error(mut self, error: impl Into<String>) -> Self {
		self.oauth_error = Some(error.into());

		self
	}

	/// Adds the OAuth `error_description` field.
	pub fn with_error_description(mut self, description: impl Into<String>) -> Self {
		self.error_description = Some(description.into());

		self
	}

	/// Adds the numeric provider code from a REST error body.
	pub fn with_provider_code(mut self, code: u64) -> Self {
		self.provider_code = Some(code);

		self
	}

	/// Declares which provider code means "user token rejected".
	pub fn with_invalid_user_token_code(mut self, code: Option<u64>) -> Self {
		self.invalid_user_token_code = code;

		self
	}

	/// Adds a body preview, truncated to a fixed length.
	pub fn with_body_preview(mut self, body: impl Into<String>) -> Self {
		self.body_preview = Some(truncate_preview(body.into()));

		self
	}

	/// Human-readable summary used in error messages.
	pub fn summary(&self) -> String {
		self.error_description
			.clone()
			.or_else(|| self.oauth_error.clone())
			.or_else(|| self.body_preview.clone().filter(|body| !body.is_empty()))
			.unwrap_or_else(|| match self.http_status {
				Some(status) => format!("{} call failed with HTTP {status}", self.call),
				None => format!("{} call failed", self.call),
			})
	}
}

/// Header-level hints captured by the transport for a rate-limited response.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RateLimitHints {
	/// Parsed `Retry-After` header.
	pub retry_after: Option<Duration>,
	/// `X-RateLimit-Global: true` or `X-RateLimit-Scope: global` was present.
	pub global: bool,
}

/// Interpreted rate-limit signal.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RateLimitSignal {
	/// Provider-supplied cool-down, if any.
	pub retry_after: Option<Duration>,
	/// Whether the limit applies to every target.
	pub global: bool,
}
impl RateLimitSignal {
	/// Combines header hints with a JSON body; body values take precedence for the duration.
	pub fn from_parts(hints: &RateLimitHints, body: &[u8]) -> Self {
		#[derive(Deserialize)]
		struct RateLimitBody {
			#[serde(default)]
			retry_after: Option<f64>,
			#[serde(default)]
			global: bool,
		}

		let parsed = serde_json::from_slice::<RateLimitBody>(body).ok();
		let body_retry = parsed
			.as_ref()
			.and_then(|body| body.retry_after)
			.and_then(retry_after_from_secs);

		Self {
			retry_after: body_retry.or(hints.retry_after),
			global: hints.global || parsed.is_some_and(|body| body.global),
		}
	}
}

/// Default strategy that applies RFC-guided heuristics plus REST status handling.
///
/// It prioritizes structured OAuth fields (`error`, `error_description`), then provider codes,
/// then body text hints, and finally the HTTP status code. Network failures are always
/// transient.
#[derive(Debug, Default)]
pub struct DefaultProviderStrategy;
impl Display for DefaultProviderStrategy {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str("default-provider-strategy")
	}
}
impl ProviderStrategy for DefaultProviderStrategy {
	fn classify_error(&self, ctx: &ProviderErrorContext) -> ProviderErrorKind {
		if ctx.network_error {
			return ProviderErrorKind::Transient;
		}
		if ctx.http_status == Some(429) {
			return ProviderErrorKind::RateLimited;
		}

		if let Some(kind) =
			classify_oauth_error(ctx.oauth_error.as_deref(), ctx.error_description.as_deref())
		{
			return kind;
		}
		if ctx.provider_code.is_some() && ctx.provider_code == ctx.invalid_user_token_code {
			return ProviderErrorKind::Unauthorized;
		}
		if ctx.call.is_token_grant()
			&& let Some(kind) = classify_body(ctx.body_preview.as_deref())
		{
			return kind;
		}

		classify_status(ctx.call, ctx.http_status)
	}
}

fn truncate_preview(body: String) -> String {
	if body.chars().count() <= ProviderErrorContext::BODY_PREVIEW_LIMIT {
		return body;
	}

	let mut buf = body.chars().take(ProviderErrorContext::BODY_PREVIEW_LIMIT).collect::<String>();

	buf.push('…');

	buf
}

fn classify_oauth_error(
	oauth_error: Option<&str>,
	error_description: Option<&str>,
) -> Option<ProviderErrorKind> {
	oauth_error.and_then(match_exact_value).or_else(|| error_description.and_then(match_exact_value))
}

fn match_exact_value(value: &str) -> Option<ProviderErrorKind> {
	if value.eq_ignore_ascii_case("invalid_grant") || value.eq_ignore_ascii_case("access_denied") {
		Some(ProviderErrorKind::InvalidGrant)
	} else if value.eq_ignore_ascii_case("invalid_client")
		|| value.eq_ignore_ascii_case("unauthorized_client")
	{
		Some(ProviderErrorKind::InvalidClient)
	} else if value.eq_ignore_ascii_case("invalid_token") {
		Some(ProviderErrorKind::Unauthorized)
	} else if value.eq_ignore_ascii_case("temporarily_unavailable")
		|| value.eq_ignore_ascii_case("server_error")
	{
		Some(ProviderErrorKind::Transient)
	} else {
		None
	}
}

fn classify_body(body: Option<&str>) -> Option<ProviderErrorKind> {
	let lowered = body?.to_ascii_lowercase();

	match lowered.as_str() {
		text if text.contains("invalid_grant") => Some(ProviderErrorKind::InvalidGrant),
		text if text.contains("invalid_client") => Some(ProviderErrorKind::InvalidClient),
		text if text.contains("temporarily_unavailable") => Some(ProviderErrorKind::Transient),
		_ => None,
	}
}

fn classify_status(call: ProviderCall, status: Option<u16>) -> ProviderErrorKind {
	match (call.is_token_grant(), status) {
		(_, Some(429)) => ProviderErrorKind::RateLimited,
		(_, Some(code)) if code >= 500 => ProviderErrorKind::Transient,
		(true, Some(400 | 404 | 410)) => ProviderErrorKind::InvalidGrant,
		(true, Some(401)) => ProviderErrorKind::InvalidClient,
		(false, Some(401)) => ProviderErrorKind::Unauthorized,
		(_, Some(_)) => ProviderErrorKind::Rejected,
		(_, None) => ProviderErrorKind::Transient,
	}
}
