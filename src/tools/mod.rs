//! Actuation tool dispatch
//!
//! The remote agent controls the rig through named tool calls. The
//! [`ActuationGateway`] executes one call and returns a human-readable result
//! string the agent can fold into its reply. Dispatch is in-process state
//! manipulation — it must stay bounded and never perform network I/O.

mod rig;

pub use rig::{BrewRig, Unit, UnitState};

use serde_json::{Map, Value};

use crate::{Error, Result};

/// Turn a named unit on or off
pub const TOGGLE_UNIT: &str = "toggle_unit";

/// Set a heating unit's efficiency percentage
pub const SET_EFFICIENCY: &str = "set_efficiency";

/// Set a unit's regulation temperature setpoint
pub const SET_TARGET_TEMPERATURE: &str = "set_target_temperature";

/// Explicitly end the conversation session
pub const END_CONVERSATION: &str = "end_conversation";

/// Executes device commands named by agent tool calls
///
/// Implementations must tolerate repeated dispatch of the same call and
/// return promptly — the dialogue session calls this inline between run
/// polls.
pub trait ActuationGateway: Send + Sync {
    /// Execute one tool call and describe the outcome
    ///
    /// # Errors
    ///
    /// Returns error if arguments are missing or invalid, or the command
    /// cannot be applied. The caller converts errors into textual tool
    /// results so the agent can react in natural language.
    fn dispatch(&self, name: &str, args: &Map<String, Value>) -> Result<String>;
}

/// Extract a required string argument
pub(crate) fn str_arg<'a>(args: &'a Map<String, Value>, key: &str) -> Result<&'a str> {
    args.get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| Error::Tool(format!("missing string argument '{key}'")))
}

/// Extract a required numeric argument
pub(crate) fn f64_arg(args: &Map<String, Value>, key: &str) -> Result<f64> {
    args.get(key)
        .and_then(Value::as_f64)
        .ok_or_else(|| Error::Tool(format!("missing numeric argument '{key}'")))
}

/// Parse an on/off state argument — accepts `"on"`/`"off"` and booleans
pub(crate) fn state_arg(args: &Map<String, Value>, key: &str) -> Result<bool> {
    match args.get(key) {
        Some(Value::Bool(b)) => Ok(*b),
        Some(Value::String(s)) => match s.to_lowercase().as_str() {
            "on" | "true" => Ok(true),
            "off" | "false" => Ok(false),
            other => Err(Error::Tool(format!("invalid state '{other}'"))),
        },
        _ => Err(Error::Tool(format!("missing state argument '{key}'"))),
    }
}
