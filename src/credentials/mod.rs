//! Credential keys, secret stores and the resolution facade

pub mod key;
pub mod mode;
pub mod resolve;
pub mod store;

pub use key::CredentialKey;
pub use mode::{Mode, SecretKind, Slot};
pub use resolve::{Layer, Resolution, ResolveScope, Resolver};
pub use store::{KeyringStore, MemoryStore, SecretStore};
