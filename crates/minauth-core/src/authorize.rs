//! The minion authorization check.
//!
//! One lookup, one decision, one event. Every failure ends in the same
//! `RejectMinion` event as an unknown minion; [`RejectCause`] keeps the
//! distinction for logs and for the caller.

use tracing::{info, warn};

use crate::error::{AuthError, InvalidMinionId};
use crate::event::{EventSink, EventTag, OutcomeEvent};
use crate::inventory::{InventoryQuery, InventoryRequest, RecordMatch, find_match};
use crate::minion::{AuthorityId, MinionId};

#[derive(Debug)]
pub enum RejectCause {
    /// The CMDB answered and no server record names this minion.
    NotRegistered,
    /// The id has no usable lookup key; nothing was queried.
    InvalidMinionId(InvalidMinionId),
    /// The query failed or returned something unreadable.
    LookupFailed(AuthError),
}

#[derive(Debug)]
pub enum Decision {
    Accept { matched: RecordMatch },
    Reject { cause: RejectCause },
}

impl Decision {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accept { .. })
    }

    /// Tag of the event this decision emits.
    pub fn tag(&self) -> EventTag {
        match self {
            Self::Accept { .. } => EventTag::Accept,
            Self::Reject { .. } => EventTag::Reject,
        }
    }
}

/// Decide whether `minion_id` is a registered server and fire the outcome.
///
/// Queries `inventory` once on `authority` for `cmdb_ci_server` records named
/// after the minion's short hostname, then emits exactly one event to `sink`:
/// `AcceptMinion` with the original id on a match, `RejectMinion` otherwise.
/// A sink failure is logged and does not change the decision.
pub async fn authorize<Q, S>(
    minion_id: &str,
    authority: &AuthorityId,
    inventory: &Q,
    sink: &S,
) -> Decision
where
    Q: InventoryQuery + ?Sized,
    S: EventSink + ?Sized,
{
    let decision = check(minion_id, authority, inventory).await;

    let event = match &decision {
        Decision::Accept { matched } => {
            info!(
                minion = %minion_id,
                responder = %matched.responder,
                field = %matched.field,
                value = %matched.value,
                "minion found in CMDB"
            );
            OutcomeEvent::accept(minion_id)
        }
        Decision::Reject { cause } => {
            match cause {
                RejectCause::NotRegistered => {
                    info!(minion = %minion_id, "no CMDB server record")
                }
                RejectCause::InvalidMinionId(err) => {
                    warn!(minion = %minion_id, error = %err, "rejecting invalid minion id")
                }
                RejectCause::LookupFailed(err) => {
                    warn!(minion = %minion_id, error = %err, "CMDB lookup failed")
                }
            }
            OutcomeEvent::reject(minion_id)
        }
    };

    if let Err(err) = sink.fire(&event).await {
        warn!(tag = %event.tag, error = %err, "failed to fire outcome event");
    }

    decision
}

async fn check<Q>(minion_id: &str, authority: &AuthorityId, inventory: &Q) -> Decision
where
    Q: InventoryQuery + ?Sized,
{
    let minion = match MinionId::parse(minion_id) {
        Ok(minion) => minion,
        Err(err) => {
            return Decision::Reject {
                cause: RejectCause::InvalidMinionId(err),
            };
        }
    };

    let request = InventoryRequest::servers_named(authority, minion.short());
    info!(
        minion = %minion,
        key = minion.short(),
        target = %request.target,
        "querying CMDB"
    );

    let response = match inventory.query(&request).await {
        Ok(response) => response,
        Err(err) => {
            return Decision::Reject {
                cause: RejectCause::LookupFailed(AuthError::Query(Box::new(err))),
            };
        }
    };

    match find_match(&response, minion.short()) {
        Ok(Some(matched)) => Decision::Accept { matched },
        Ok(None) => Decision::Reject {
            cause: RejectCause::NotRegistered,
        },
        Err(err) => Decision::Reject {
            cause: RejectCause::LookupFailed(err),
        },
    }
}
