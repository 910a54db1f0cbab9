pub mod clock;
pub mod state;

pub use clock::{ClockEvent, PhaseClock, DEFAULT_TICK_INTERVAL};
pub use state::{
    validate_duration, CountdownState, Phase, PhaseConfig, DEFAULT_BREAK_MS, DEFAULT_WORK_MS,
    MIN_PHASE_MS,
};
