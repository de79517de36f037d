//! High-level flows powered by the broker: authorization, refresh, identity, and joins.

pub mod authorize;
pub mod batch;
pub mod identify;
pub mod join;
pub mod refresh;

mod common;

pub use authorize::*;
pub use batch::*;
pub use identify::*;
pub use join::*;
pub use refresh::*;

// self
use crate::{
	_prelude::*,
	auth::{TokenSecret, UserId},
	config::BrokerSettings,
	http::ProviderHttpClient,
	oauth::TransportErrorMapper,
	provider::{ProviderDescriptor, ProviderStrategy},
	store::CredentialStore,
	throttle::ThrottleTracker,
};
#[cfg(feature = "reqwest")]
use crate::{error::ConfigError, http::ReqwestHttpClient, oauth::ReqwestTransportErrorMapper};

#[cfg(feature = "reqwest")]
/// Broker specialized for the crate's default reqwest transport stack.
pub type ReqwestBroker = Broker<ReqwestHttpClient, ReqwestTransportErrorMapper>;

/// Credential client and batch-join orchestrator for a single provider descriptor.
///
/// The broker owns the HTTP client, credential store, provider descriptor, strategy, and the
/// shared [`ThrottleTracker`], so individual flows only carry call-specific logic. Cloning a
/// broker shares all of them, including throttle state and metrics.
#[derive(Clone)]
pub struct Broker<C, M>
where
	C: ?Sized + ProviderHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// HTTP client wrapper used for every outbound provider request.
	pub http_client: Arc<C>,
	/// Mapper applied to transport-layer errors before surfacing them to callers.
	pub transport_mapper: Arc<M>,
	/// Credential store consulted for joins and updated after exchanges and refreshes.
	pub store: Arc<dyn CredentialStore>,
	/// Provider descriptor that defines endpoints and quirks.
	pub descriptor: ProviderDescriptor,
	/// Strategy responsible for error classification and rate-limit parsing.
	pub strategy: Arc<dyn ProviderStrategy>,
	/// OAuth 2.0 client identifier used in every grant.
	pub client_id: String,
	/// Optional client secret for confidential authentication methods.
	pub client_secret: Option<String>,
	/// Application credential authorizing add-member calls.
	pub bot_token: Option<TokenSecret>,
	/// Runtime settings.
	pub settings: BrokerSettings,
	/// Rate-limit state shared by every join attempt.
	pub throttle: Arc<ThrottleTracker>,
	/// Counters for join attempts and outcomes.
	pub join_metrics: Arc<JoinMetrics>,
	/// Counters for refresh attempts and outcomes.
	pub refresh_metrics: Arc<RefreshMetrics>,
	flow_guards: Arc<Mutex<HashMap<UserId, Arc<AsyncMutex<()>>>>>,
}
impl<C, M> Broker<C, M>
where
	C: ?Sized + ProviderHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// Creates a broker that reuses the caller-provided transport + mapper pair.
	///
	/// The transport is expected to enforce `settings.request_timeout` itself.
	pub fn with_http_client(
		store: Arc<dyn CredentialStore>,
		descriptor: ProviderDescriptor,
		strategy: Arc<dyn ProviderStrategy>,
		client_id: impl Into<String>,
		settings: BrokerSettings,
		http_client: impl Into<Arc<C>>,
		mapper: impl Into<Arc<M>>,
	) -> Self {
		Self {
			http_client: http_client.into(),
			transport_mapper: mapper.into(),
			store,
			descriptor,
			strategy,
			client_id: client_id.into(),
			client_secret: None,
			bot_token: None,
			settings,
			throttle: Default::default(),
			join_metrics: Default::default(),
			refresh_metrics: Default::default(),
			flow_guards: Default::default(),
		}
	}

	/// Sets or replaces the client secret used for confidential client auth modes.
	pub fn with_client_secret(mut self, secret: impl Into<String>) -> Self {
		self.client_secret = Some(secret.into());

		self
	}

	/// Sets or replaces the bot token used for add-member calls.
	pub fn with_bot_token(mut self, token: impl Into<TokenSecret>) -> Self {
		self.bot_token = Some(token.into());

		self
	}

	/// Shares an existing tracker, so several brokers observe the same rate limits.
	pub fn with_throttle(mut self, throttle: Arc<ThrottleTracker>) -> Self {
		self.throttle = throttle;

		self
	}
}
#[cfg(feature = "reqwest")]
impl Broker<ReqwestHttpClient, ReqwestTransportErrorMapper> {
	/// Creates a new broker for the provided descriptor and client identifier.
	///
	/// The broker provisions its own reqwest-backed transport with `settings.request_timeout`
	/// applied to every call and redirects disabled. Use [`Broker::with_client_secret`] and
	/// [`Broker::with_bot_token`] to attach the application credentials.
	pub fn new(
		store: Arc<dyn CredentialStore>,
		descriptor: ProviderDescriptor,
		strategy: Arc<dyn ProviderStrategy>,
		client_id: impl Into<String>,
		settings: BrokerSettings,
	) -> Result<Self> {
		let http_client =
			ReqwestHttpClient::with_timeout(settings.request_timeout_std()).map_err(ConfigError::from)?;

		Ok(Self::with_http_client(
			store,
			descriptor,
			strategy,
			client_id,
			settings,
			http_client,
			Arc::new(ReqwestTransportErrorMapper),
		))
	}
}
impl<C, M> Debug for Broker<C, M>
where
	C: ?Sized + ProviderHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("Broker")
			.field("descriptor", &self.descriptor)
			.field("client_id", &self.client_id)
			.field("client_secret_set", &self.client_secret.is_some())
			.field("bot_token_set", &self.bot_token.is_some())
			.field("settings", &self.settings)
			.finish()
	}
}
