//! Brewing rig actuation gateway
//!
//! Holds the rig's control state — which units are on, heating efficiency,
//! and regulation temperature setpoints — and applies agent tool calls to it.
//! The physical I/O layer (PWM, relays, sensor polling) consumes this state
//! elsewhere; the gateway itself never touches hardware.

use std::fmt;
use std::str::FromStr;
use std::sync::Mutex;

use serde_json::{Map, Value};

use crate::{Error, Result};

use super::{
    ActuationGateway, END_CONVERSATION, SET_EFFICIENCY, SET_TARGET_TEMPERATURE, TOGGLE_UNIT,
    f64_arg, state_arg, str_arg,
};

/// A controllable unit of the rig
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Unit {
    /// Boil kettle
    Bk,
    /// Hot liquor tank
    Hlt,
    /// Pump 1
    P1,
    /// Pump 2
    P2,
}

impl Unit {
    /// Whether the unit is a heating element with a temperature setpoint
    #[must_use]
    pub const fn is_heater(self) -> bool {
        matches!(self, Self::Bk | Self::Hlt)
    }

    /// Default regulation setpoint in °C, if the unit has one
    const fn default_setpoint(self) -> Option<f64> {
        match self {
            Self::Bk => Some(85.0),
            Self::Hlt => Some(70.0),
            Self::P1 | Self::P2 => None,
        }
    }
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Bk => "BK",
            Self::Hlt => "HLT",
            Self::P1 => "P1",
            Self::P2 => "P2",
        };
        write!(f, "{name}")
    }
}

impl FromStr for Unit {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_uppercase().as_str() {
            "BK" => Ok(Self::Bk),
            "HLT" => Ok(Self::Hlt),
            "P1" => Ok(Self::P1),
            "P2" => Ok(Self::P2),
            other => Err(Error::Tool(format!("unknown unit '{other}'"))),
        }
    }
}

/// Control state of one unit
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UnitState {
    /// Whether the unit is switched on
    pub on: bool,
    /// Heating efficiency percentage (0–100)
    pub efficiency: u8,
    /// Regulation temperature setpoint in °C (heaters only)
    pub target_temp: Option<f64>,
}

#[derive(Debug)]
struct RigState {
    bk: UnitState,
    hlt: UnitState,
    p1: UnitState,
    p2: UnitState,
}

impl RigState {
    fn unit_mut(&mut self, unit: Unit) -> &mut UnitState {
        match unit {
            Unit::Bk => &mut self.bk,
            Unit::Hlt => &mut self.hlt,
            Unit::P1 => &mut self.p1,
            Unit::P2 => &mut self.p2,
        }
    }

    fn unit(&self, unit: Unit) -> UnitState {
        match unit {
            Unit::Bk => self.bk,
            Unit::Hlt => self.hlt,
            Unit::P1 => self.p1,
            Unit::P2 => self.p2,
        }
    }
}

impl Default for RigState {
    fn default() -> Self {
        let initial = |unit: Unit| UnitState {
            on: false,
            efficiency: 100,
            target_temp: unit.default_setpoint(),
        };

        Self {
            bk: initial(Unit::Bk),
            hlt: initial(Unit::Hlt),
            p1: initial(Unit::P1),
            p2: initial(Unit::P2),
        }
    }
}

/// In-process actuation gateway for the brewing rig
#[derive(Debug, Default)]
pub struct BrewRig {
    state: Mutex<RigState>,
}

impl BrewRig {
    /// Create a rig with all units off and default setpoints
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot a unit's current control state
    #[must_use]
    pub fn unit(&self, unit: Unit) -> UnitState {
        self.state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .unit(unit)
    }

    fn toggle(&self, args: &Map<String, Value>) -> Result<String> {
        let unit: Unit = str_arg(args, "unit")?.parse()?;
        let on = state_arg(args, "state")?;

        let mut state = self.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        state.unit_mut(unit).on = on;
        drop(state);

        let word = if on { "on" } else { "off" };
        tracing::info!(%unit, state = word, "unit toggled");
        Ok(format!("Successfully toggled {unit} {word}."))
    }

    fn set_efficiency(&self, args: &Map<String, Value>) -> Result<String> {
        let unit: Unit = str_arg(args, "unit")?.parse()?;
        if !unit.is_heater() {
            return Err(Error::Tool(format!("{unit} has no efficiency control")));
        }

        let percent = f64_arg(args, "percent")?;
        if !(0.0..=100.0).contains(&percent) {
            return Err(Error::Tool(format!("efficiency {percent} out of range 0-100")));
        }

        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let percent = percent.round() as u8;

        let mut state = self.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        state.unit_mut(unit).efficiency = percent;
        drop(state);

        tracing::info!(%unit, percent, "efficiency set");
        Ok(format!("Efficiency for {unit} set to {percent}%."))
    }

    fn set_target_temperature(&self, args: &Map<String, Value>) -> Result<String> {
        let unit: Unit = str_arg(args, "unit")?.parse()?;
        if !unit.is_heater() {
            return Err(Error::Tool(format!("{unit} has no temperature setpoint")));
        }

        let temperature = f64_arg(args, "temperature")?;

        let mut state = self.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        state.unit_mut(unit).target_temp = Some(temperature);
        drop(state);

        tracing::info!(%unit, temperature, "setpoint changed");
        Ok(format!("Regulation temperature for {unit} set to {temperature}°C."))
    }
}

impl ActuationGateway for BrewRig {
    fn dispatch(&self, name: &str, args: &Map<String, Value>) -> Result<String> {
        match name {
            TOGGLE_UNIT => self.toggle(args),
            SET_EFFICIENCY => self.set_efficiency(args),
            SET_TARGET_TEMPERATURE => self.set_target_temperature(args),
            END_CONVERSATION => Ok("Ending the conversation.".to_string()),
            other => {
                tracing::warn!(tool = other, "unimplemented tool requested");
                Ok(format!("Function '{other}' is not implemented."))
            }
        }
    }
}
