//! Auth-domain identifiers, scope sets, secrets, credential pairs, and identities.

pub mod credential;
pub mod id;
pub mod identity;
pub mod scope;
pub mod secret;

pub use credential::*;
pub use id::*;
pub use identity::*;
pub use scope::*;
pub use secret::*;
