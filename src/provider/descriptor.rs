//! Provider descriptor data structures shared by all flows.
//!
//! A descriptor names the OAuth endpoints, the REST API base used for identity lookups and
//! member additions, and the client authentication mode the token endpoint expects.

/// Builder API for assembling provider descriptors.
pub mod builder;
/// Provider-specific quirk toggles.
pub mod quirks;

pub use builder::*;
pub use quirks::*;

// self
use crate::{_prelude::*, auth::ProviderId};

/// Preferred client authentication modes for token endpoint calls.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClientAuthMethod {
	#[default]
	/// HTTP Basic with `client_id`/`client_secret`.
	ClientSecretBasic,
	/// Form POST body parameters for `client_id`/`client_secret`.
	ClientSecretPost,
}

/// Endpoint set declared by a provider descriptor.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderEndpoints {
	/// Authorization endpoint end users are redirected to.
	pub authorization: Url,
	/// Token endpoint used for code exchanges and refreshes.
	pub token: Url,
	/// Base URL of the REST API (identity lookup, add-member).
	pub api: Url,
}

/// Immutable provider descriptor consumed by flows.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderDescriptor {
	/// Descriptor identifier.
	pub id: ProviderId,
	/// Endpoint definitions exposed by the provider.
	pub endpoints: ProviderEndpoints,
	/// Preferred client authentication mechanism.
	pub preferred_client_auth_method: ClientAuthMethod,
	/// Provider-specific quirks.
	pub quirks: ProviderQuirks,
}
impl ProviderDescriptor {
	/// Creates a new builder for the provided identifier.
	pub fn builder(id: ProviderId) -> ProviderDescriptorBuilder {
		ProviderDescriptorBuilder::new(id)
	}

	/// Descriptor for Discord's OAuth2 + v10 REST API.
	pub fn discord() -> Result<Self, ProviderDescriptorError> {
		let id = ProviderId::new("discord")
			.map_err(|_| ProviderDescriptorError::InvalidUrl { endpoint: "id" })?;

		Self::builder(id)
			.authorization_endpoint(parse_fixed("authorization", "https://discord.com/oauth2/authorize")?)
			.token_endpoint(parse_fixed("token", "https://discord.com/api/oauth2/token")?)
			.api_base(parse_fixed("api", "https://discord.com/api/v10/")?)
			.preferred_client_auth_method(ClientAuthMethod::ClientSecretPost)
			.build()
	}

	/// Resolves `path` against the API base URL; a leading slash is ignored.
	pub fn api_url(&self, path: &str) -> Result<Url, url::ParseError> {
		self.endpoints.api.join(path.trim_start_matches('/'))
	}
}

fn parse_fixed(endpoint: &'static str, raw: &str) -> Result<Url, ProviderDescriptorError> {
	Url::parse(raw).map_err(|_| ProviderDescriptorError::InvalidUrl { endpoint })
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn discord_preset_resolves_api_paths() {
		let descriptor = ProviderDescriptor::discord().expect("Discord preset should build.");

		assert_eq!(descriptor.preferred_client_auth_method, ClientAuthMethod::ClientSecretPost);
		assert_eq!(
			descriptor.api_url("/users/@me").expect("API path should resolve.").as_str(),
			"https://discord.com/api/v10/users/@me"
		);
		assert_eq!(
			descriptor
				.api_url("guilds/1/members/2")
				.expect("API path should resolve.")
				.as_str(),
			"https://discord.com/api/v10/guilds/1/members/2"
		);
	}
}
