//! Drift classification between the observed and desired run state.
//!
//! Only the Running and Stopped pair is handled. Intermediate remote states
//! (starting, stopping, draining, ...) never count as up to date and never
//! trigger a transition; they are re-evaluated on the next cycle.

use crate::api::RemoteInstanceState;
use crate::instance::InstanceState;

/// Corrective call needed to converge the run state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Start,
    Stop,
}

/// Returns true if the observed state already is the desired state.
pub fn is_up_to_date(observed: RemoteInstanceState, desired: InstanceState) -> bool {
    observed.desired_equivalent() == Some(desired)
}

/// The transition that moves `observed` to `desired`, if one is defined.
pub fn transition(observed: RemoteInstanceState, desired: InstanceState) -> Option<Transition> {
    match (observed.desired_equivalent()?, desired) {
        (InstanceState::Running, InstanceState::Stopped) => Some(Transition::Stop),
        (InstanceState::Stopped, InstanceState::Running) => Some(Transition::Start),
        (InstanceState::Running, InstanceState::Running)
        | (InstanceState::Stopped, InstanceState::Stopped) => None,
    }
}
