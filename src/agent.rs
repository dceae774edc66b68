use crate::config::SimulationConfig;
use crate::device::{DeviceChannel, DeviceState};
use crate::link::TelemetryLink;
use crate::scheduler::{Clock, MonotonicClock, SchedulerStats, TickScheduler};
use crate::simulation::{Control, HydraulicState, SimulationEngine};
use crate::telemetry::TickTelemetry;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info};

/// Operator intents accepted by the agent loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OperatorCommand {
    Connect,
    Disconnect,
    Start,
    Stop,
    Toggle(Control),
    Shutdown,
}

/// Read-only view of everything the agent owns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub running: bool,
    pub connected: bool,
    pub tick_count: u64,
    pub hydraulic: HydraulicState,
    pub devices: BTreeMap<DeviceChannel, DeviceState>,
    pub last_telemetry: Option<TickTelemetry>,
}

/// Cloneable remote control for a running [`Waterworks`].
#[derive(Debug, Clone)]
pub struct AgentHandle {
    commands: mpsc::UnboundedSender<OperatorCommand>,
    snapshots: watch::Receiver<Snapshot>,
}

impl AgentHandle {
    /// Returns `false` once the agent has shut down.
    pub fn send(&self, command: OperatorCommand) -> bool {
        self.commands.send(command).is_ok()
    }

    pub fn snapshot(&self) -> Snapshot {
        self.snapshots.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Snapshot> {
        self.snapshots.clone()
    }
}

/// Owns the broker link, the hydraulic model and its tick scheduler.
///
/// All three are only touched from the agent's own loop, so none of them
/// needs locking.
pub struct Waterworks<C: Clock = MonotonicClock> {
    link: TelemetryLink,
    engine: SimulationEngine,
    scheduler: TickScheduler,
    clock: C,
    command_tx: mpsc::UnboundedSender<OperatorCommand>,
    command_rx: Option<mpsc::UnboundedReceiver<OperatorCommand>>,
    snapshots: watch::Sender<Snapshot>,
}

impl Waterworks<MonotonicClock> {
    pub fn new(link: TelemetryLink, config: SimulationConfig) -> Self {
        Self::with_clock(link, config, MonotonicClock::new())
    }
}

impl<C: Clock> Waterworks<C> {
    pub fn with_clock(link: TelemetryLink, config: SimulationConfig, clock: C) -> Self {
        let scheduler = TickScheduler::new(config.tick_period);
        let engine = SimulationEngine::new(config);
        Self::from_parts(link, engine, scheduler, clock)
    }

    pub fn from_parts(link: TelemetryLink, engine: SimulationEngine, scheduler: TickScheduler, clock: C) -> Self {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let initial = Self::build_snapshot(&link, &engine, &scheduler);
        let (snapshots, _) = watch::channel(initial);

        Self {
            link,
            engine,
            scheduler,
            clock,
            command_tx,
            command_rx: Some(command_rx),
            snapshots,
        }
    }

    pub fn handle(&self) -> AgentHandle {
        AgentHandle {
            commands: self.command_tx.clone(),
            snapshots: self.snapshots.subscribe(),
        }
    }

    pub fn connect(&mut self) {
        self.link.connect();
        self.publish_snapshot();
    }

    pub fn disconnect(&mut self) {
        info!("Disconnecting from broker");
        self.link.close();
        self.publish_snapshot();
    }

    /// Returns `false` if the simulation was already running.
    pub fn start_simulation(&mut self) -> bool {
        let started = self.scheduler.start(self.clock.now());
        if started {
            info!("Simulation started ({:?} per tick)", self.scheduler.period());
            self.publish_snapshot();
        }
        started
    }

    /// Returns `false` if the simulation was not running.
    pub fn stop_simulation(&mut self) -> bool {
        let stopped = self.scheduler.stop();
        if stopped {
            info!("Simulation stopped after {} ticks", self.engine.tick_count());
            self.publish_snapshot();
        }
        stopped
    }

    /// Flips one control and tells the matching device about it.
    ///
    /// Tank levels and telemetry only change on the next tick.
    pub fn toggle(&mut self, control: Control) -> bool {
        let on = self.engine.toggle(control);
        debug!("{} -> {}", control, if on { "on" } else { "off" });

        let mut params = Map::new();
        params.insert("status".to_string(), Value::Bool(on));
        self.link.publish_command(control.channel(), params);

        self.publish_snapshot();
        on
    }

    /// Runs every tick that is due on the clock. Returns how many ran.
    pub fn update(&mut self) -> u32 {
        let due = self.scheduler.poll(self.clock.now());
        for _ in 0..due {
            self.run_tick();
        }
        if due > 0 {
            self.publish_snapshot();
        }
        due
    }

    /// Advances the model once and publishes one update per channel.
    pub fn run_tick(&mut self) -> TickTelemetry {
        let telemetry = self.engine.tick();
        for update in telemetry.updates() {
            self.link.publish_telemetry(update.channel, update.payload);
        }
        telemetry
    }

    /// Applies one operator command. Returns `false` on shutdown.
    pub fn apply(&mut self, command: OperatorCommand) -> bool {
        match command {
            OperatorCommand::Connect => self.connect(),
            OperatorCommand::Disconnect => self.disconnect(),
            OperatorCommand::Start => {
                self.start_simulation();
            }
            OperatorCommand::Stop => {
                self.stop_simulation();
            }
            OperatorCommand::Toggle(control) => {
                self.toggle(control);
            }
            OperatorCommand::Shutdown => return false,
        }
        true
    }

    /// Single consuming loop over broker events, tick deadlines and
    /// operator commands. Returns after [`OperatorCommand::Shutdown`].
    ///
    /// Ticks are measured on the agent's clock but waited for on tokio's
    /// timer, so the clock must advance with tokio time.
    pub async fn run(&mut self) {
        let Some(mut commands) = self.command_rx.take() else {
            return;
        };

        loop {
            let delay = self.scheduler.time_until_next(self.clock.now());

            tokio::select! {
                event = self.link.next_event() => {
                    self.link.handle_event(event);
                    self.publish_snapshot();
                }
                _ = wait_for(delay) => {
                    self.update();
                }
                command = commands.recv() => match command {
                    Some(command) => {
                        if !self.apply(command) {
                            break;
                        }
                    }
                    None => break,
                },
            }
        }

        self.stop_simulation();
        self.disconnect();
        self.command_rx = Some(commands);
        info!("Agent loop finished");
    }

    pub fn hydraulic_state(&self) -> &HydraulicState {
        self.engine.state()
    }

    pub fn device_state(&self, channel: DeviceChannel) -> &DeviceState {
        self.link.device_state(channel)
    }

    pub fn devices(&self) -> &BTreeMap<DeviceChannel, DeviceState> {
        self.link.devices()
    }

    pub fn is_running(&self) -> bool {
        self.scheduler.is_running()
    }

    pub fn engine(&self) -> &SimulationEngine {
        &self.engine
    }

    pub fn link(&self) -> &TelemetryLink {
        &self.link
    }

    pub fn link_mut(&mut self) -> &mut TelemetryLink {
        &mut self.link
    }

    pub fn scheduler(&self) -> &TickScheduler {
        &self.scheduler
    }

    pub fn get_scheduler_stats(&self) -> &SchedulerStats {
        self.scheduler.get_stats()
    }

    pub fn snapshot(&self) -> Snapshot {
        Self::build_snapshot(&self.link, &self.engine, &self.scheduler)
    }

    fn build_snapshot(link: &TelemetryLink, engine: &SimulationEngine, scheduler: &TickScheduler) -> Snapshot {
        Snapshot {
            running: scheduler.is_running(),
            connected: link.is_connected(),
            tick_count: engine.tick_count(),
            hydraulic: engine.state().clone(),
            devices: link.devices().clone(),
            last_telemetry: engine.last_telemetry().cloned(),
        }
    }

    fn publish_snapshot(&self) {
        self.snapshots.send_replace(self.snapshot());
    }
}

async fn wait_for(delay: Option<Duration>) {
    match delay {
        Some(delay) => tokio::time::sleep(delay).await,
        None => std::future::pending().await,
    }
}
