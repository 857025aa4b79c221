//! Core of the minion authorizer: identifiers, master configuration, CMDB
//! record matching, outcome events, and the authorization check itself.

pub mod authorize;
pub mod config;
pub mod error;
pub mod event;
pub mod inventory;
pub mod minion;

pub use authorize::{Decision, RejectCause, authorize};
pub use config::{DEFAULT_MASTER_CONFIG, MasterConfig, RestSettings};
pub use error::{AuthError, ConfigError, InvalidMinionId, SinkError};
pub use event::{EventSink, EventTag, JsonLinesSink, MemorySink, OutcomeEvent};
pub use inventory::{InventoryQuery, InventoryRequest, RecordMatch, find_match};
pub use minion::{AuthorityId, MinionId};
