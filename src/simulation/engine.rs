use super::state::{Control, HydraulicState};
use crate::config::SimulationConfig;
use crate::telemetry::{round_to_hundredths, round_to_unit, ConsumerReading, TickTelemetry};
use tracing::trace;

/// Fixed-step model of an underground tank feeding an overhead tank
/// through a pump, drained by four consumers.
#[derive(Debug, Clone)]
pub struct SimulationEngine {
    config: SimulationConfig,
    state: HydraulicState,
    tick_count: u64,
    last_telemetry: Option<TickTelemetry>,
}

impl SimulationEngine {
    pub fn new(config: SimulationConfig) -> Self {
        let state = HydraulicState::with_levels(config.initial_underground_level, config.initial_overhead_level);
        Self::with_state(config, state)
    }

    /// Starts from an explicit state; levels are clamped into capacity.
    pub fn with_state(config: SimulationConfig, mut state: HydraulicState) -> Self {
        state.underground_level = state.underground_level.clamp(0.0, config.underground_capacity);
        state.overhead_level = state.overhead_level.clamp(0.0, config.overhead_capacity);

        Self {
            config,
            state,
            tick_count: 0,
            last_telemetry: None,
        }
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    pub fn state(&self) -> &HydraulicState {
        &self.state
    }

    pub fn tick_count(&self) -> u64 {
        self.tick_count
    }

    pub fn last_telemetry(&self) -> Option<&TickTelemetry> {
        self.last_telemetry.as_ref()
    }

    /// Flips one control and returns its new position. Takes effect on the
    /// next tick.
    pub fn toggle(&mut self, control: Control) -> bool {
        let flag = self.state.flag_mut(control);
        *flag = !*flag;
        *flag
    }

    pub fn set(&mut self, control: Control, on: bool) {
        *self.state.flag_mut(control) = on;
    }

    fn consumer_rate(&self, control: Control) -> f64 {
        match control {
            Control::Washbasin1 | Control::Washbasin2 => self.config.washbasin_rate,
            Control::KitchenSink => self.config.kitchen_sink_rate,
            Control::Shower => self.config.shower_rate,
            Control::Pump => 0.0,
        }
    }

    fn run_pump(&mut self) -> (f64, f64) {
        let state = &mut self.state;
        let capacity = self.config.overhead_capacity;

        if !(state.pump_on && state.underground_level > 0.0 && state.overhead_level < capacity) {
            return (0.0, 0.0);
        }

        let amount = self
            .config
            .per_tick(self.config.pump_rate)
            .min(state.underground_level)
            .min(capacity - state.overhead_level);

        state.underground_level -= amount;
        state.overhead_level += amount;

        (amount, self.config.pump_rate)
    }

    /// Each consumer draws from whatever the earlier ones left behind.
    fn run_consumer(&mut self, control: Control) -> (f64, ConsumerReading) {
        if !(self.state.is_on(control) && self.state.overhead_level > 0.0) {
            return (0.0, ConsumerReading::OFF);
        }

        let rate = self.consumer_rate(control);
        let amount = self.config.per_tick(rate).min(self.state.overhead_level);
        self.state.overhead_level -= amount;

        (amount, ConsumerReading::flowing(rate))
    }

    /// Advances the model by one tick.
    pub fn tick(&mut self) -> TickTelemetry {
        let (pumped, inflow_rate) = self.run_pump();

        let mut consumed = 0.0;
        let mut outflow_rate = 0.0;
        let mut readings = [ConsumerReading::OFF; 4];
        for (slot, control) in readings.iter_mut().zip(Control::CONSUMERS) {
            let (amount, reading) = self.run_consumer(control);
            consumed += amount;
            outflow_rate += reading.flow;
            *slot = reading;
        }

        debug_assert!(
            (0.0..=self.config.underground_capacity).contains(&self.state.underground_level),
            "Underground level {} outside [0, {}]",
            self.state.underground_level,
            self.config.underground_capacity
        );
        debug_assert!(
            (0.0..=self.config.overhead_capacity).contains(&self.state.overhead_level),
            "Overhead level {} outside [0, {}]",
            self.state.overhead_level,
            self.config.overhead_capacity
        );

        self.tick_count += 1;
        let [washbasin1, washbasin2, kitchen_sink, shower] = readings;

        let telemetry = TickTelemetry {
            tick: self.tick_count,
            underground_level: round_to_unit(self.state.underground_level),
            overhead_level: round_to_unit(self.state.overhead_level),
            pump_on: self.state.pump_on,
            inflow_rate: round_to_hundredths(inflow_rate),
            outflow_rate: round_to_hundredths(outflow_rate),
            washbasin1,
            washbasin2,
            kitchen_sink,
            shower,
            pumped,
            consumed,
        };

        trace!(
            "tick {}: underground={:.3} overhead={:.3} in={} out={}",
            self.tick_count,
            self.state.underground_level,
            self.state.overhead_level,
            telemetry.inflow_rate,
            telemetry.outflow_rate
        );

        self.last_telemetry = Some(telemetry.clone());
        telemetry
    }
}

impl Default for SimulationEngine {
    fn default() -> Self {
        Self::new(SimulationConfig::default())
    }
}
