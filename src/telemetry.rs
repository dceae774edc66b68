use crate::device::DeviceChannel;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Status and nominal flow reported for one consumer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConsumerReading {
    pub status: bool,
    pub flow: f64,
}

impl ConsumerReading {
    pub const OFF: ConsumerReading = ConsumerReading { status: false, flow: 0.0 };

    pub fn flowing(rate: f64) -> Self {
        Self { status: true, flow: rate }
    }
}

/// Everything one tick reports.
///
/// `inflow_rate` and the consumer flows are nominal rates; the volumes
/// actually moved are in `pumped` and `consumed`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TickTelemetry {
    pub tick: u64,
    pub underground_level: i64,
    pub overhead_level: i64,
    pub pump_on: bool,
    pub inflow_rate: f64,
    pub outflow_rate: f64,
    pub washbasin1: ConsumerReading,
    pub washbasin2: ConsumerReading,
    pub kitchen_sink: ConsumerReading,
    pub shower: ConsumerReading,
    pub pumped: f64,
    pub consumed: f64,
}

/// One outbound telemetry publish.
#[derive(Debug, Clone, PartialEq)]
pub struct TelemetryUpdate {
    pub channel: DeviceChannel,
    pub payload: Map<String, Value>,
}

impl TelemetryUpdate {
    fn new(channel: DeviceChannel, fields: &[(&str, Value)]) -> Self {
        let payload = fields
            .iter()
            .map(|(key, value)| ((*key).to_string(), value.clone()))
            .collect();
        Self { channel, payload }
    }
}

impl TickTelemetry {
    /// Per-channel payloads in publish order: consumers, tanks, pump, flows.
    pub fn updates(&self) -> Vec<TelemetryUpdate> {
        let consumer = |channel, reading: &ConsumerReading| {
            TelemetryUpdate::new(
                channel,
                &[("status", Value::Bool(reading.status)), ("flow", number(reading.flow))],
            )
        };

        vec![
            consumer(DeviceChannel::Washbasin1, &self.washbasin1),
            consumer(DeviceChannel::Washbasin2, &self.washbasin2),
            consumer(DeviceChannel::KitchenSink, &self.kitchen_sink),
            consumer(DeviceChannel::Shower, &self.shower),
            TelemetryUpdate::new(DeviceChannel::UndergroundTank, &[("level", Value::from(self.underground_level))]),
            TelemetryUpdate::new(DeviceChannel::OverheadTank, &[("level", Value::from(self.overhead_level))]),
            TelemetryUpdate::new(DeviceChannel::WaterPump, &[("status", Value::Bool(self.pump_on))]),
            TelemetryUpdate::new(DeviceChannel::Inflow, &[("flow", number(self.inflow_rate))]),
            TelemetryUpdate::new(DeviceChannel::Outflow, &[("flow", number(self.outflow_rate))]),
        ]
    }
}

pub fn round_to_unit(value: f64) -> i64 {
    value.round() as i64
}

pub fn round_to_hundredths(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Whole numbers go out as JSON integers.
fn number(value: f64) -> Value {
    if value.is_finite() && value.fract() == 0.0 {
        Value::from(value as i64)
    } else {
        Value::from(value)
    }
}
