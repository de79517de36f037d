// self
use crate::_prelude::*;

/// Provider-specific quirks that influence how flows behave.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderQuirks {
	/// Character used to join scopes when constructing `scope` parameters.
	pub scope_delimiter: char,
	/// Provider error code meaning "the user's access token was rejected" on API calls that
	/// otherwise answer with a generic status (Discord answers `50025` with HTTP 403).
	pub invalid_user_token_code: Option<u64>,
}
impl Default for ProviderQuirks {
	fn default() -> Self {
		Self { scope_delimiter: ' ', invalid_user_token_code: Some(50025) }
	}
}
