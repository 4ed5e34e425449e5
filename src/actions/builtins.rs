//! Built-in vehicle actions.

use super::{ActionError, ActionHandler, Args};
use crate::vehicle::{VehicleState, Window};
use serde_json::{Value, json};
use std::sync::Arc;

/// Placeholder arrival estimate; the simulator has no routing.
const FIXED_ETA_MINUTES: u32 = 28;

/// All built-in handlers, in prompt order.
pub fn all() -> Vec<Arc<dyn ActionHandler>> {
    vec![
        Arc::new(SetAc),
        Arc::new(NavigateTo),
        Arc::new(StopNavigation),
        Arc::new(ToggleLights),
        Arc::new(ToggleWipers),
        Arc::new(ControlWindow),
    ]
}

fn switch_schema(description: &str) -> Value {
    json!({"type": "string", "enum": ["on", "off"], "description": description})
}

/// Air conditioning on/off with optional target temperature.
pub struct SetAc;

impl ActionHandler for SetAc {
    fn name(&self) -> &'static str {
        "set_ac"
    }

    fn aliases(&self) -> &'static [&'static str] {
        &["ac", "climate", "air_conditioning"]
    }

    fn description(&self) -> &'static str {
        "Control the air conditioning"
    }

    fn schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "on": switch_schema("Turn the AC on or off"),
                "temperature": {"type": "integer", "description": "Target temperature in Celsius (16-30)"}
            },
            "required": ["on"]
        })
    }

    fn execute(&self, args: &Args<'_>, state: &mut VehicleState) -> Result<String, ActionError> {
        let on = args.switch("on")?;
        let temperature = args.optional_integer(&["temperature", "temp"])?;

        state.ac_on = on;
        if let Some(celsius) = temperature {
            state.set_ac_temp(celsius);
        }

        if on {
            Ok(format!("AC turned on at {}°C", state.ac_temp))
        } else {
            Ok("AC turned off".to_owned())
        }
    }
}

/// Set the navigation destination.
pub struct NavigateTo;

impl ActionHandler for NavigateTo {
    fn name(&self) -> &'static str {
        "navigate_to"
    }

    fn aliases(&self) -> &'static [&'static str] {
        &["nav", "navigate", "navigation"]
    }

    fn description(&self) -> &'static str {
        "Set the navigation destination"
    }

    fn schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "destination": {"type": "string", "description": "The destination address or name"}
            },
            "required": ["destination"]
        })
    }

    fn execute(&self, args: &Args<'_>, state: &mut VehicleState) -> Result<String, ActionError> {
        let destination = args.text("destination")?;
        state.destination = Some(destination.to_owned());
        Ok(format!(
            "Navigating to {destination}. ETA {FIXED_ETA_MINUTES} minutes."
        ))
    }
}

/// Clear the navigation destination.
pub struct StopNavigation;

impl ActionHandler for StopNavigation {
    fn name(&self) -> &'static str {
        "stop_navigation"
    }

    fn aliases(&self) -> &'static [&'static str] {
        &["stop_nav", "cancel_navigation", "cancel_nav"]
    }

    fn description(&self) -> &'static str {
        "Cancel the current navigation"
    }

    fn schema(&self) -> Value {
        json!({"type": "object", "properties": {}})
    }

    fn execute(&self, _args: &Args<'_>, state: &mut VehicleState) -> Result<String, ActionError> {
        state.destination = None;
        Ok("Navigation cancelled.".to_owned())
    }
}

/// Headlights on/off.
pub struct ToggleLights;

impl ActionHandler for ToggleLights {
    fn name(&self) -> &'static str {
        "toggle_lights"
    }

    fn aliases(&self) -> &'static [&'static str] {
        &["lights", "headlights"]
    }

    fn description(&self) -> &'static str {
        "Turn the headlights on or off"
    }

    fn schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {"on": switch_schema("Headlights on or off")},
            "required": ["on"]
        })
    }

    fn execute(&self, args: &Args<'_>, state: &mut VehicleState) -> Result<String, ActionError> {
        state.lights_on = args.switch("on")?;
        Ok(format!(
            "Headlights {}.",
            if state.lights_on { "on" } else { "off" }
        ))
    }
}

/// Windshield wipers on/off.
pub struct ToggleWipers;

impl ActionHandler for ToggleWipers {
    fn name(&self) -> &'static str {
        "toggle_wipers"
    }

    fn aliases(&self) -> &'static [&'static str] {
        &["wipers", "wiper"]
    }

    fn description(&self) -> &'static str {
        "Turn the wipers on or off"
    }

    fn schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {"on": switch_schema("Wipers on or off")},
            "required": ["on"]
        })
    }

    fn execute(&self, args: &Args<'_>, state: &mut VehicleState) -> Result<String, ActionError> {
        state.wipers_on = args.switch("on")?;
        Ok(format!(
            "Wipers {}.",
            if state.wipers_on { "activated" } else { "stopped" }
        ))
    }
}

/// Open or close one or both side windows.
pub struct ControlWindow;

impl ControlWindow {
    const WINDOWS: &'static [&'static str] = &["driver", "passenger", "all"];
    const MOVES: &'static [&'static str] = &["open", "close"];
}

impl ActionHandler for ControlWindow {
    fn name(&self) -> &'static str {
        "control_window"
    }

    fn aliases(&self) -> &'static [&'static str] {
        &["window", "windows"]
    }

    fn description(&self) -> &'static str {
        "Open or close the side windows"
    }

    fn schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "window": {"type": "string", "enum": Self::WINDOWS},
                "action": {"type": "string", "enum": Self::MOVES}
            },
            "required": ["window", "action"]
        })
    }

    fn execute(&self, args: &Args<'_>, state: &mut VehicleState) -> Result<String, ActionError> {
        let window = args.choice("window", Self::WINDOWS, "driver, passenger or all")?;
        let open = args.choice("action", Self::MOVES, "open or close")? == "open";

        let targets: &[Window] = match window {
            "driver" => &[Window::Driver],
            "passenger" => &[Window::Passenger],
            _ => &[Window::Driver, Window::Passenger],
        };
        for target in targets {
            state.windows.set(*target, open);
        }

        Ok(format!(
            "{} window(s) {}.",
            capitalize(window),
            if open { "opened" } else { "closed" }
        ))
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) => {
            let mut result = c.to_uppercase().to_string();
            result.push_str(chars.as_str());
            result
        }
        None => String::new(),
    }
}
