//! RPC access with per-call timeouts, opt-in retries and fallback endpoints.

pub mod builder;
pub mod error;
pub mod provider;

pub use builder::RobustProviderBuilder;
pub use error::Error;
pub use provider::RobustProvider;
