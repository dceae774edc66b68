use crate::device::DeviceChannel;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Tank levels and on/off flags of the water system.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HydraulicState {
    pub underground_level: f64,
    pub overhead_level: f64,
    pub pump_on: bool,
    pub washbasin1_on: bool,
    pub washbasin2_on: bool,
    pub kitchen_sink_on: bool,
    pub shower_on: bool,
}

impl HydraulicState {
    pub fn with_levels(underground_level: f64, overhead_level: f64) -> Self {
        Self {
            underground_level,
            overhead_level,
            pump_on: false,
            washbasin1_on: false,
            washbasin2_on: false,
            kitchen_sink_on: false,
            shower_on: false,
        }
    }

    pub fn is_on(&self, control: Control) -> bool {
        match control {
            Control::Pump => self.pump_on,
            Control::Washbasin1 => self.washbasin1_on,
            Control::Washbasin2 => self.washbasin2_on,
            Control::KitchenSink => self.kitchen_sink_on,
            Control::Shower => self.shower_on,
        }
    }

    pub(crate) fn flag_mut(&mut self, control: Control) -> &mut bool {
        match control {
            Control::Pump => &mut self.pump_on,
            Control::Washbasin1 => &mut self.washbasin1_on,
            Control::Washbasin2 => &mut self.washbasin2_on,
            Control::KitchenSink => &mut self.kitchen_sink_on,
            Control::Shower => &mut self.shower_on,
        }
    }
}

/// Operator-switchable elements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Control {
    Pump,
    Washbasin1,
    Washbasin2,
    KitchenSink,
    Shower,
}

impl Control {
    pub const ALL: [Control; 5] = [
        Control::Pump,
        Control::Washbasin1,
        Control::Washbasin2,
        Control::KitchenSink,
        Control::Shower,
    ];

    /// Consumers in evaluation order.
    pub const CONSUMERS: [Control; 4] = [
        Control::Washbasin1,
        Control::Washbasin2,
        Control::KitchenSink,
        Control::Shower,
    ];

    /// Device that receives commands for this control.
    pub fn channel(self) -> DeviceChannel {
        match self {
            Control::Pump => DeviceChannel::WaterPump,
            Control::Washbasin1 => DeviceChannel::Washbasin1,
            Control::Washbasin2 => DeviceChannel::Washbasin2,
            Control::KitchenSink => DeviceChannel::KitchenSink,
            Control::Shower => DeviceChannel::Shower,
        }
    }
}

impl fmt::Display for Control {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Control::Pump => "pump",
            Control::Washbasin1 => "washbasin1",
            Control::Washbasin2 => "washbasin2",
            Control::KitchenSink => "kitchenSink",
            Control::Shower => "shower",
        };
        f.write_str(name)
    }
}

impl FromStr for Control {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pump" | "waterpump" => Ok(Control::Pump),
            "washbasin1" | "wb1" => Ok(Control::Washbasin1),
            "washbasin2" | "wb2" => Ok(Control::Washbasin2),
            "kitchensink" | "kitchen" | "sink" => Ok(Control::KitchenSink),
            "shower" => Ok(Control::Shower),
            other => Err(format!("unknown control: {}", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_control_parsing() {
        assert_eq!("Pump".parse::<Control>(), Ok(Control::Pump));
        assert_eq!("kitchenSink".parse::<Control>(), Ok(Control::KitchenSink));
        assert_eq!("kitchen".parse::<Control>(), Ok(Control::KitchenSink));
        assert!("bathtub".parse::<Control>().is_err());
    }

    #[test]
    fn test_flag_mut_targets_one_flag() {
        let mut state = HydraulicState::with_levels(0.0, 0.0);
        *state.flag_mut(Control::Shower) = true;
        for control in Control::ALL {
            assert_eq!(state.is_on(control), control == Control::Shower);
        }
    }
}
