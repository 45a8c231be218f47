//! Valve capability

use serde_json::Value;

use crate::config::ConfigValue;

/// Position a valve should move to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TargetState {
    Open,
    Closed,
}

impl TargetState {
    pub fn as_str(self) -> &'static str {
        match self {
            TargetState::Open => "open",
            TargetState::Closed => "closed",
        }
    }
}

/// Loads from `"open"` or `"closed"`, case-insensitively
impl ConfigValue for TargetState {
    fn from_json(value: &Value) -> Option<Self> {
        let name = value.as_str()?;
        if name.eq_ignore_ascii_case("open") {
            Some(TargetState::Open)
        } else if name.eq_ignore_ascii_case("closed") {
            Some(TargetState::Closed)
        } else {
            None
        }
    }

    fn to_json(&self) -> Value {
        Value::from(self.as_str())
    }
}

/// A peripheral that opens and closes
///
/// Methods take `&self`: valves are shared between the functions that
/// drive them.
pub trait Valve {
    /// Move to `target`; `None` returns to the valve's own default
    fn transition_to(&self, target: Option<TargetState>);

    /// Last position moved to, `None` before the first transition
    fn state(&self) -> Option<TargetState>;
}
