//! Bearer- and bot-authenticated REST calls: identity lookup and add-member.
//!
//! Both calls go through the same [`ProviderHttpClient`] handles as the token grants, so
//! response metadata (status, `Retry-After`, global flag) is captured the same way and failures
//! are classified by the same [`ProviderStrategy`].

// crates.io
use oauth2::{
	AsyncHttpClient, HttpRequest, HttpResponse,
	http::{
		Method, Request,
		header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE},
	},
};
// self
use crate::{
	_prelude::*,
	auth::{Identity, TargetId, TokenSecret, UserId},
	error::{ConfigError, TransientError},
	http::{ProviderHttpClient, ResponseMetadata, ResponseMetadataSlot},
	oauth::{self, TransportErrorMapper},
	provider::{ProviderCall, ProviderDescriptor, ProviderErrorContext, ProviderStrategy},
};

const JSON: &str = "application/json";

/// Successful outcome of an add-member call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MemberAddition {
	/// The user was added to the target.
	Added,
	/// The user already belonged to the target (HTTP 204).
	AlreadyMember,
}

/// REST client view borrowed from a broker for the duration of one call.
pub(crate) struct ApiClient<'a, C, M>
where
	C: ?Sized + ProviderHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	pub(crate) descriptor: &'a ProviderDescriptor,
	pub(crate) strategy: &'a dyn ProviderStrategy,
	pub(crate) http_client: &'a C,
	pub(crate) mapper: &'a M,
}
impl<C, M> ApiClient<'_, C, M>
where
	C: ?Sized + ProviderHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// `GET users/@me` with the user's bearer token.
	pub(crate) async fn fetch_identity(&self, access_token: &TokenSecret) -> Result<Identity> {
		const CALL: ProviderCall = ProviderCall::Identify;

		let url = self.url("users/@me")?;
		let request = Request::builder()
			.method(Method::GET)
			.uri(url.as_str())
			.header(AUTHORIZATION, access_token.authorization("Bearer"))
			.header(ACCEPT, JSON)
			.body(Vec::new())
			.map_err(ConfigError::from)?;
		let (response, meta) = self.send(CALL, request).await?;
		let status = response.status().as_u16();

		if !response.status().is_success() {
			return Err(self.failure(CALL, status, response.body(), meta.as_ref()));
		}

		let mut deserializer = serde_json::Deserializer::from_slice(response.body());

		serde_path_to_error::deserialize(&mut deserializer)
			.map_err(|source| TransientError::ResponseParse { source, status: Some(status) }.into())
	}

	/// `PUT guilds/{target}/members/{user}` with the application bot token, carrying the user's
	/// access token in the body.
	pub(crate) async fn add_member(
		&self,
		target: &TargetId,
		user: &UserId,
		bot_token: &TokenSecret,
		access_token: &TokenSecret,
	) -> Result<MemberAddition> {
		const CALL: ProviderCall = ProviderCall::AddMember;

		let url = self.url(&format!("guilds/{target}/members/{user}"))?;
		let body = serde_json::to_vec(&serde_json::json!({ "access_token": access_token.expose() }))
			.map_err(|e| Error::Provider {
				status: None,
				message: format!("Failed to encode the add-member body: {e}"),
			})?;
		let request = Request::builder()
			.method(Method::PUT)
			.uri(url.as_str())
			.header(AUTHORIZATION, bot_token.authorization("Bot"))
			.header(CONTENT_TYPE, JSON)
			.header(ACCEPT, JSON)
			.body(body)
			.map_err(ConfigError::from)?;
		let (response, meta) = self.send(CALL, request).await?;
		let status = response.status().as_u16();

		match status {
			204 => Ok(MemberAddition::AlreadyMember),
			_ if response.status().is_success() => Ok(MemberAddition::Added),
			_ => Err(self.failure(CALL, status, response.body(), meta.as_ref())),
		}
	}

	fn url(&self, path: &str) -> Result<Url> {
		self.descriptor
			.api_url(path)
			.map_err(|source| ConfigError::InvalidDescriptor { source }.into())
	}

	async fn send(
		&self,
		call: ProviderCall,
		request: HttpRequest,
	) -> Result<(HttpResponse, Option<ResponseMetadata>)> {
		let slot = ResponseMetadataSlot::default();
		let handle = self.http_client.with_metadata(slot.clone());

		match handle.call(request).await {
			Ok(response) => Ok((response, slot.take())),
			Err(err) =>
				Err(self.mapper.map_transport_error(self.strategy, call, slot.take().as_ref(), err)),
		}
	}

	fn failure(
		&self,
		call: ProviderCall,
		status: u16,
		body: &[u8],
		meta: Option<&ResponseMetadata>,
	) -> Error {
		#[derive(Deserialize)]
		struct ApiErrorBody {
			#[serde(default)]
			code: Option<u64>,
			#[serde(default)]
			message: Option<String>,
		}

		let mut ctx = ProviderErrorContext::new(call)
			.with_http_status(status)
			.with_invalid_user_token_code(self.descriptor.quirks.invalid_user_token_code);

		match serde_json::from_slice::<ApiErrorBody>(body) {
			Ok(parsed) => {
				if let Some(code) = parsed.code {
					ctx = ctx.with_provider_code(code);
				}
				if let Some(message) = parsed.message {
					ctx = ctx.with_body_preview(message);
				}
			},
			Err(_) if !body.is_empty() => {
				ctx = ctx.with_body_preview(String::from_utf8_lossy(body));
			},
			Err(_) => {},
		}

		oauth::classified_error(self.strategy, &ctx, meta, body)
	}
}
