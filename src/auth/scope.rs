//! Scope modeling helpers used when building authorize URLs and grant requests.

// std
use std::slice::Iter;
// self
use crate::_prelude::*;

/// Scopes the join flow needs: identity lookup, guild listing, and `guilds.join`.
pub const DEFAULT_SCOPES: [&str; 3] = ["identify", "guilds", "guilds.join"];

/// Errors emitted when validating scopes.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum ScopeValidationError {
	/// Empty scope entries are not allowed.
	#[error("Scope entries cannot be empty.")]
	Empty,
	/// Scopes cannot contain embedded whitespace characters.
	#[error("Scope contains whitespace: {scope}.")]
	ContainsWhitespace {
		/// The offending scope string.
		scope: String,
	},
}

/// Ordered, duplicate-free set of OAuth scopes.
///
/// Order of first appearance is kept so authorize URLs stay readable; equality ignores order.
/// Serialized as a single space-delimited string, the same shape token endpoints return.
#[derive(Clone, Default, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ScopeSet(Vec<String>);
impl ScopeSet {
	/// Creates a scope set from any iterator, dropping duplicates.
	pub fn new<I, S>(scopes: I) -> Result<Self, ScopeValidationError>
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		let mut out = Vec::new();

		for scope in scopes {
			let scope = scope.into();

			if scope.is_empty() {
				return Err(ScopeValidationError::Empty);
			}
			if scope.chars().any(char::is_whitespace) {
				return Err(ScopeValidationError::ContainsWhitespace { scope });
			}
			if !out.contains(&scope) {
				out.push(scope);
			}
		}

		Ok(Self(out))
	}

	/// Parses a provider-style delimited scope string.
	pub fn parse(raw: &str, delimiter: char) -> Result<Self, ScopeValidationError> {
		Self::new(raw.split(delimiter).map(str::trim).filter(|s| !s.is_empty()))
	}

	/// Scope set requested by default ([`DEFAULT_SCOPES`]).
	pub fn guild_join() -> Self {
		Self(DEFAULT_SCOPES.iter().map(|s| (*s).to_owned()).collect())
	}

	/// Number of distinct scopes.
	pub fn len(&self) -> usize {
		self.0.len()
	}

	/// Returns true if no scopes are defined.
	pub fn is_empty(&self) -> bool {
		self.0.is_empty()
	}

	/// Returns true if the set contains the provided scope.
	pub fn contains(&self, scope: &str) -> bool {
		self.0.iter().any(|s| s == scope)
	}

	/// Iterator over scopes in insertion order.
	pub fn iter(&self) -> Iter<'_, String> {
		self.0.iter()
	}

	/// Joins the scopes with `delimiter`, returning `None` for an empty set.
	pub fn join(&self, delimiter: char) -> Option<String> {
		if self.is_empty() {
			return None;
		}

		let mut buf = String::new();

		for (idx, value) in self.0.iter().enumerate() {
			if idx > 0 {
				buf.push(delimiter);
			}

			buf.push_str(value);
		}

		Some(buf)
	}
}
impl PartialEq for ScopeSet {
	fn eq(&self, other: &Self) -> bool {
		self.len() == other.len() && self.0.iter().all(|s| other.contains(s))
	}
}
impl Debug for ScopeSet {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_tuple("ScopeSet").field(&self.0).finish()
	}
}
impl Display for ScopeSet {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(&self.0.join(" "))
	}
}
impl TryFrom<String> for ScopeSet {
	type Error = ScopeValidationError;

	fn try_from(value: String) -> Result<Self, Self::Error> {
		Self::parse(&value, ' ')
	}
}
impl From<ScopeSet> for String {
	fn from(value: ScopeSet) -> Self {
		value.to_string()
	}
}
impl FromStr for ScopeSet {
	type Err = ScopeValidationError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		Self::parse(s, ' ')
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn duplicates_collapse_and_order_is_ignored_for_equality() {
		let a = ScopeSet::new(["identify", "guilds.join", "identify"])
			.expect("Scope fixture should be valid.");
		let b = ScopeSet::new(["guilds.join", "identify"]).expect("Scope fixture should be valid.");

		assert_eq!(a.len(), 2);
		assert_eq!(a, b);
		assert_eq!(a.join(','), Some("identify,guilds.join".into()));
	}

	#[test]
	fn rejects_whitespace_and_empty_entries() {
		assert_eq!(ScopeSet::new([""]), Err(ScopeValidationError::Empty));
		assert!(matches!(
			ScopeSet::new(["guilds join"]),
			Err(ScopeValidationError::ContainsWhitespace { .. })
		));
	}

	#[test]
	fn parses_provider_scope_strings() {
		let parsed: ScopeSet = "identify  guilds guilds.join".parse().expect("Scope string should parse.");

		assert_eq!(parsed, ScopeSet::guild_join());
		assert!(ScopeSet::default().join(' ').is_none());
		assert_eq!(
			serde_json::to_string(&parsed).expect("Scope set should serialize."),
			"\"identify guilds guilds.join\""
		);
	}
}
