//! Identity payload returned by the provider's current-user endpoint.

// self
use crate::{_prelude::*, auth::UserId};

/// External identity resolved from a credential pair.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
	/// Stable user identifier.
	pub id: UserId,
	/// Account username.
	pub username: String,
	/// Legacy discriminator (`"0"` for migrated accounts).
	#[serde(default)]
	pub discriminator: Option<String>,
	/// Display name chosen by the user.
	#[serde(default)]
	pub global_name: Option<String>,
	/// Avatar hash.
	#[serde(default)]
	pub avatar: Option<String>,
}
impl Identity {
	/// Display label: the global name, else `username#discriminator`, else the username.
	pub fn display_name(&self) -> String {
		if let Some(name) = &self.global_name {
			return name.clone();
		}

		match self.discriminator.as_deref() {
			Some(tag) if tag != "0" => format!("{}#{tag}", self.username),
			_ => self.username.clone(),
		}
	}
}
