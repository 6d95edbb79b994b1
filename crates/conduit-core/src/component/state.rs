//! Component lifecycle state machine.
//!
//! ```text
//! INIT ──reset──▶ READY ──prepare──▶ PREPARE ──start──▶ ACTIVE ◀──release── PAUSED
//!                   ▲                   ▲                  │ pause ──────────▲
//!                   │                   └──────stop────────┴─────────────────┘
//!                   └──────────── reset / xrun (from any state)
//! ```
//!
//! Asking for the state a node is already in yields
//! [`Transition::AlreadySet`]. Graph walks treat that as "stop this branch,
//! report success", so sub-graphs shared by several walks are triggered only
//! once.

use core::fmt;

use crate::error::ComponentError;

/// Lifecycle state of a component or pipeline.
///
/// Variants are ordered by how far the node is from running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum ComponentState {
    /// Created, not yet reset.
    #[default]
    Init,
    /// Idle and ready to be configured.
    Ready,
    /// Configured and prepared, not running.
    Prepare,
    /// Stopped mid-stream, resumable with RELEASE.
    Paused,
    /// Running.
    Active,
}

impl fmt::Display for ComponentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ComponentState::Init => "INIT",
            ComponentState::Ready => "READY",
            ComponentState::Prepare => "PREPARE",
            ComponentState::Paused => "PAUSED",
            ComponentState::Active => "ACTIVE",
        };
        f.write_str(name)
    }
}

/// Trigger command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TriggerCmd {
    /// READY to PREPARE.
    Prepare,
    /// PREPARE to ACTIVE.
    Start,
    /// PAUSED to ACTIVE.
    Release,
    /// ACTIVE to PAUSED.
    Pause,
    /// ACTIVE or PAUSED to PREPARE.
    Stop,
    /// Back to READY.
    Reset,
    /// Forced back to READY after an overrun or underrun.
    Xrun,
}

impl TriggerCmd {
    /// Every command, in table order.
    pub const ALL: [TriggerCmd; 7] = [
        TriggerCmd::Prepare,
        TriggerCmd::Start,
        TriggerCmd::Release,
        TriggerCmd::Pause,
        TriggerCmd::Stop,
        TriggerCmd::Reset,
        TriggerCmd::Xrun,
    ];

    /// State the command leads to.
    pub fn target(self) -> ComponentState {
        match self {
            TriggerCmd::Prepare | TriggerCmd::Stop => ComponentState::Prepare,
            TriggerCmd::Start | TriggerCmd::Release => ComponentState::Active,
            TriggerCmd::Pause => ComponentState::Paused,
            TriggerCmd::Reset | TriggerCmd::Xrun => ComponentState::Ready,
        }
    }
}

/// Result of a permitted state change request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// The node moves to this state.
    To(ComponentState),
    /// The node is already in the requested state.
    AlreadySet,
}

/// Validates `cmd` against `state`.
///
/// # Errors
///
/// [`ComponentError::InvalidState`] when the command is not allowed from
/// `state`. The caller must leave the state unchanged in that case.
pub fn transition(state: ComponentState, cmd: TriggerCmd) -> Result<Transition, ComponentError> {
    use ComponentState as S;

    let target = cmd.target();
    if state == target {
        return Ok(Transition::AlreadySet);
    }

    let allowed = match cmd {
        TriggerCmd::Prepare => state == S::Ready,
        TriggerCmd::Start => state == S::Prepare,
        TriggerCmd::Release => state == S::Paused,
        TriggerCmd::Pause => state == S::Active,
        TriggerCmd::Stop => matches!(state, S::Active | S::Paused),
        TriggerCmd::Reset => {
            if matches!(state, S::Active | S::Paused) {
                tracing::warn!("reset while {state}: stream was not stopped");
            }
            true
        }
        TriggerCmd::Xrun => true,
    };

    if allowed {
        Ok(Transition::To(target))
    } else {
        Err(ComponentError::InvalidState { state, cmd })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ComponentState as S;

    fn apply(state: &mut ComponentState, cmd: TriggerCmd) -> Result<Transition, ComponentError> {
        let t = transition(*state, cmd)?;
        if let Transition::To(next) = t {
            *state = next;
        }
        Ok(t)
    }

    #[test]
    fn test_full_trigger_sequence() {
        let mut state = S::Ready;
        for (cmd, expected) in [
            (TriggerCmd::Prepare, S::Prepare),
            (TriggerCmd::Start, S::Active),
            (TriggerCmd::Pause, S::Paused),
            (TriggerCmd::Release, S::Active),
            (TriggerCmd::Stop, S::Prepare),
            (TriggerCmd::Reset, S::Ready),
        ] {
            assert_eq!(apply(&mut state, cmd), Ok(Transition::To(expected)));
            assert_eq!(state, expected);
        }
    }

    #[test]
    fn test_start_from_ready_rejected() {
        assert_eq!(
            transition(S::Ready, TriggerCmd::Start),
            Err(ComponentError::InvalidState {
                state: S::Ready,
                cmd: TriggerCmd::Start
            })
        );
    }

    #[test]
    fn test_already_set() {
        assert_eq!(transition(S::Active, TriggerCmd::Start), Ok(Transition::AlreadySet));
        assert_eq!(transition(S::Active, TriggerCmd::Release), Ok(Transition::AlreadySet));
        assert_eq!(transition(S::Prepare, TriggerCmd::Prepare), Ok(Transition::AlreadySet));
        assert_eq!(transition(S::Ready, TriggerCmd::Reset), Ok(Transition::AlreadySet));
        assert_eq!(transition(S::Ready, TriggerCmd::Xrun), Ok(Transition::AlreadySet));
    }

    #[test]
    fn test_xrun_from_anywhere() {
        for state in [S::Init, S::Prepare, S::Paused, S::Active] {
            assert_eq!(transition(state, TriggerCmd::Xrun), Ok(Transition::To(S::Ready)));
        }
    }

    #[test]
    fn test_stop_from_paused() {
        assert_eq!(transition(S::Paused, TriggerCmd::Stop), Ok(Transition::To(S::Prepare)));
    }

    #[test]
    fn test_init_only_leaves_by_reset() {
        for cmd in [TriggerCmd::Prepare, TriggerCmd::Start, TriggerCmd::Release, TriggerCmd::Pause, TriggerCmd::Stop] {
            assert!(transition(S::Init, cmd).is_err(), "{cmd:?} from INIT");
        }
        assert_eq!(transition(S::Init, TriggerCmd::Reset), Ok(Transition::To(S::Ready)));
    }
}
