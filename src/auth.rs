//! Auth-domain identifiers, scope sets, and the OAuth credential model.

pub mod credential;
pub mod id;
pub mod scope;

pub use credential::*;
pub use id::*;
pub use scope::*;
