//! Freshness and auto-promotion eligibility checks.

use epc_common::{EnvironmentState, EnvironmentStatus, StateStack};

/// Whether `candidate` references materials not yet recorded anywhere in
/// the status. Both stacks count: a state that was promoted and has since
/// diverged only in health is still not new.
pub fn is_new_state(status: &EnvironmentStatus, candidate: &EnvironmentState) -> bool {
    !status.available_states.contains_materials(candidate)
        && !status.states.contains_materials(candidate)
}

/// Whether upstream-resolved availability permits auto-promotion: exactly
/// one unambiguous state. Zero means nothing to promote; several means the
/// upstreams have diverged and a human has to pick.
pub fn upstream_eligible(available: &StateStack) -> bool {
    available.len() == 1
}
