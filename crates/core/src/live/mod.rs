pub mod clock;
pub mod controller;
pub mod runner;

pub use clock::{Clock, SystemClock};
pub use controller::{
    LiveInterestController, LivePhase, LiveState, LiveView, RefreshTrigger, TickOutcome,
};
pub use runner::{run_live_controller, spawn_live_controller, LiveHandle};
