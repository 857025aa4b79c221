//! Salt transport: runs CMDB queries on the master through salt-api and
//! publishes outcome events on the master's event bus via its webhook.

#[cfg(feature = "http")]
pub mod http;

#[cfg(feature = "http")]
pub use http::{Credentials, SaltApiClient, SaltError};
