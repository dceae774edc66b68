pub mod engine;
pub mod state;

pub use engine::SimulationEngine;
pub use state::{Control, HydraulicState};
