//! Error taxonomy of the simulation kernel.

use thiserror::Error;

/// Failures that propagate out of the simulator facade or out of a model
/// transition. Programming errors (duplicate couplings, unknown components,
/// negative time advances) are not represented here: they panic, or assert
/// in debug builds.
#[derive(Debug, Error)]
pub enum SimulationError {
    /// Input was staged past the next scheduled event; accepting it would
    /// silently skip pending events.
    #[error("input staged at t = {t} is past the next event time {t_next}")]
    InputPastNextEvent { t: String, t_next: String },

    /// The staged time precedes the current simulation clock.
    #[error("time {t} precedes the current simulation time {t_now}")]
    ClockRegression { t: String, t_now: String },

    /// The ODE solver could not meet its error tolerance even at the
    /// minimum step size.
    #[error("integration step {h:e} cannot meet the error tolerance {tol:e}")]
    IntegrationFailure { h: f64, tol: f64 },

    /// The event locator lost its bracket or exhausted its iteration bound.
    #[error("state event location failed: {reason}")]
    EventLocationFailure { reason: String },

    /// A model-defined failure raised from a transition function.
    #[error("model {model}: {reason}")]
    Model { model: String, reason: String },
}
