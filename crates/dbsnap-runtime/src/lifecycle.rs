use crate::RuntimeError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle of the single instance a controller may own at a time.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum InstanceState {
    Idle,
    Running,
    Frozen,
    Stopped,
}

impl InstanceState {
    /// Whether a backing instance currently exists.
    pub fn is_live(self) -> bool {
        matches!(self, Self::Running | Self::Frozen)
    }
}

impl fmt::Display for InstanceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Running => write!(f, "running"),
            Self::Frozen => write!(f, "frozen"),
            Self::Stopped => write!(f, "stopped"),
        }
    }
}

/// Validate a lifecycle step for the instance built from `image`.
///
/// A fresh start is allowed from `Idle` or `Stopped`; a live instance yields
/// `AlreadyRunning`. Stop and freeze require a live instance and yield
/// `NotRunning` otherwise. A frozen instance can only be stopped.
pub fn validate_transition(
    image: &str,
    from: InstanceState,
    to: InstanceState,
) -> Result<(), RuntimeError> {
    use InstanceState::{Frozen, Idle, Running, Stopped};

    match (from, to) {
        (Idle | Stopped, Running) | (Running, Frozen) | (Running | Frozen, Stopped) => Ok(()),
        (Running | Frozen, Running) => Err(RuntimeError::AlreadyRunning(image.to_owned())),
        (Idle | Stopped, Frozen | Stopped) => Err(RuntimeError::NotRunning(image.to_owned())),
        _ => Err(RuntimeError::InvalidTransition {
            from: from.to_string(),
            to: to.to_string(),
        }),
    }
}
