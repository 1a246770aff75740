//! Inbound message addressing.

use crate::identity::PdpIdentity;
use crate::model::Envelope;

/// Decide whether `msg` is meant for this PDP.
///
/// A non-empty name is direct addressing and overrides the group fields.
/// Otherwise the message is a group broadcast, which an unassigned PDP (no
/// subgroup yet) always ignores. An empty subgroup on a matching group
/// addresses the whole group.
pub fn route_target(msg: &Envelope, identity: &PdpIdentity, configured_group: &str) -> bool {
    if !msg.name().is_empty() {
        return msg.name() == identity.name();
    }

    if msg.pdp_group().is_empty() {
        return false;
    }

    let Some(subgroup) = identity.subgroup() else {
        return false;
    };

    if msg.pdp_group() != configured_group {
        return false;
    }

    msg.pdp_subgroup().is_empty() || msg.pdp_subgroup() == subgroup
}
