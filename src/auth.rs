//! Auth-domain models: scope sets, redacted secrets, and the stored credential.

pub mod credential;
pub mod scope;
pub mod secret;

pub use credential::*;
pub use scope::*;
pub use secret::*;
