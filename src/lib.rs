//! # Aquabus
//!
//! A telemetry bridge for a small water-distribution system together with a
//! fixed-tick simulation of the same system.
//!
//! ## Features
//!
//! - **Broker link**: one WebSocket connection, one latest-telemetry
//!   subscription per configured device, inbound frames demultiplexed by
//!   subscription id
//! - **Fire-and-forget publishing**: device commands and telemetry posted to
//!   the broker's HTTP API without waiting on the result
//! - **Hydraulic simulation**: underground and overhead tanks, a pump and four
//!   consumers, advanced once per second with clamped transfers
//! - **Deterministic scheduling**: ticks driven from an injectable clock
//!
//! ## Quick Start
//!
//! ```rust
//! use aquabus::{Control, SimulationEngine};
//!
//! let mut engine = SimulationEngine::default();
//! engine.toggle(Control::Pump);
//!
//! let telemetry = engine.tick();
//! assert_eq!(telemetry.inflow_rate, 50.0);
//! assert_eq!(telemetry.updates().len(), 9);
//! ```
//!
//! ## Architecture
//!
//! - [`agent`] - Owns link, engine and scheduler; runs the event loop
//! - [`link`] - Broker connection, subscriptions and publishing
//! - [`device`] - Device channels, entity ids and observed state
//! - [`protocol`] - Wire frames
//! - [`transport`] - WebSocket, HTTP and in-memory transports
//! - [`simulation`] - Tank and pump model
//! - [`telemetry`] - Per-tick telemetry records
//! - [`scheduler`] - Fixed-period tick scheduling
//! - [`config`] - Broker and simulation settings

#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]

pub mod agent;
pub mod config;
pub mod device;
pub mod error;
pub mod link;
pub mod protocol;
pub mod scheduler;
pub mod simulation;
pub mod telemetry;
pub mod transport;

// Re-export main public types for convenience
pub use agent::{AgentHandle, OperatorCommand, Snapshot, Waterworks};
pub use config::{LinkConfig, SimulationConfig};
pub use device::{DeviceChannel, DeviceRegistry, DeviceState, EntityId};
pub use link::TelemetryLink;
pub use protocol::SubscriptionId;
pub use scheduler::{Clock, ManualClock, MonotonicClock, TickScheduler};
pub use simulation::{Control, HydraulicState, SimulationEngine};
pub use telemetry::TickTelemetry;
