//! Quorum counting, priority and admin-block conversion for fault claims.

use std::collections::HashSet;

use quorum_messages::{FaultCore, FullServerFault};
use quorum_types::{FullSignature, Timestamp};

use crate::admin::AdminEntry;
use crate::state::ChainState;

/// Claims older than this stop competing for priority.
pub const FAULT_PRIORITY_WINDOW_MS: u64 = 20_000;

/// Signatures needed to act on a fault with `fed_count` federated servers:
/// strictly more than half.
pub fn quorum_threshold(fed_count: usize) -> usize {
    fed_count / 2 + 1
}

/// Distinct federated signers at the core's height whose signature over the
/// core bytes verifies.
pub fn sig_tally<S: ChainState + ?Sized>(
    core: &FaultCore,
    signatures: &[FullSignature],
    state: &S,
) -> usize {
    let data = core.to_bytes();
    let mut signers = HashSet::new();
    for sig in signatures {
        if signers.contains(&sig.public_key) {
            continue;
        }
        if state
            .verify_authority_signature(&data, sig, core.db_height)
            .is_federated()
        {
            signers.insert(sig.public_key);
        }
    }
    signers.len()
}

pub fn has_enough_sigs<S: ChainState + ?Sized>(fault: &FullServerFault, state: &S) -> bool {
    let fed_count = state.fed_servers(fault.core.db_height).len();
    sig_tally(&fault.core, &fault.signature_list, state) >= quorum_threshold(fed_count)
}

/// Ordering weight among competing claims: zero once stale, otherwise
/// larger for older timestamps, then for lower VM indexes.
pub fn priority(core: &FaultCore, now: Timestamp) -> u64 {
    if core.timestamp.elapsed_since(now) >= FAULT_PRIORITY_WINDOW_MS {
        return 0;
    }
    let age_rank = Timestamp::MAX_WIRE.saturating_sub(core.timestamp.as_millis()) + 1;
    (age_rank << 8) | u64::from(255 - core.vm_index)
}

pub fn to_admin_block_entry(fault: &FullServerFault) -> AdminEntry {
    AdminEntry::ServerFault {
        core: fault.core,
        signatures: fault.signature_list.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quorum_types::Hash;

    fn core(ts_ms: u64, vm: u8) -> FaultCore {
        FaultCore {
            server_id: Hash::new([1; 32]),
            audit_server_id: Hash::new([2; 32]),
            vm_index: vm,
            db_height: 4,
            height: 0,
            system_height: 0,
            timestamp: Timestamp::from_millis(ts_ms),
        }
    }

    #[test]
    fn threshold_is_strict_majority() {
        assert_eq!(quorum_threshold(1), 1);
        assert_eq!(quorum_threshold(2), 2);
        assert_eq!(quorum_threshold(3), 2);
        assert_eq!(quorum_threshold(4), 3);
        assert_eq!(quorum_threshold(5), 3);
    }

    #[test]
    fn stale_claims_have_zero_priority() {
        let now = Timestamp::from_millis(100_000);
        assert_eq!(priority(&core(80_000, 0), now), 0);
        assert!(priority(&core(80_001, 0), now) > 0);
    }

    #[test]
    fn older_claims_win_then_lower_vm() {
        let now = Timestamp::from_millis(100_000);
        assert!(priority(&core(90_000, 5), now) > priority(&core(95_000, 0), now));
        assert!(priority(&core(90_000, 0), now) > priority(&core(90_000, 1), now));
    }
}
