use crate::modeling::{Bag, PinValue};

/// A continuous system with optional state and time events, integrated by a
/// [`super::Hybrid`] adapter between discrete events.
///
/// The state is a dense `f64` vector of [`OdeSystem::num_state_variables`]
/// entries. Event flags passed to the event handlers have
/// `num_state_events() + 1` entries: one per state-event indicator, plus a
/// final flag that is set when the transition was triggered by the time
/// event returned from [`OdeSystem::time_event_func`].
pub trait OdeSystem<X> {
    /// Number of continuous state variables.
    fn num_state_variables(&self) -> usize;

    /// Number of state-event indicator functions.
    fn num_state_events(&self) -> usize;

    /// Writes the initial state into `q`.
    fn init(&mut self, q: &mut [f64]);

    /// Writes the state derivatives at `q` into `dq`. Must be free of side
    /// effects; solvers evaluate it at trial states that are never adopted.
    fn der_func(&self, q: &[f64], dq: &mut [f64]);

    /// Writes the state-event indicators at `q` into `z`. A state event
    /// occurs where an indicator crosses zero. By default, does nothing.
    fn state_event_func(&self, q: &[f64], z: &mut [f64]) {
        let _ = (q, z);
    }

    /// Time remaining until the next scheduled time event, or
    /// [`f64::INFINITY`] for none. By default, there are no time events.
    fn time_event_func(&self, q: &[f64]) -> f64 {
        let _ = q;
        f64::INFINITY
    }

    /// Discrete action at a state or time event. `events[i]` tells which
    /// indicators fired; the last entry is the time-event flag.
    fn internal_event(&mut self, q: &mut [f64], events: &[bool]) {
        let _ = (q, events);
    }

    /// Discrete action on external input after `e` units of continuous time
    /// since the last discrete action.
    fn external_event(&mut self, q: &mut [f64], e: f64, xb: &[PinValue<X>]) {
        let _ = (q, e, xb);
    }

    /// Discrete action when an internal event and external input coincide.
    /// By default, the internal action runs first and the external action
    /// sees zero elapsed time.
    fn confluent_event(&mut self, q: &mut [f64], events: &[bool], xb: &[PinValue<X>]) {
        self.internal_event(q, events);
        self.external_event(q, 0.0, xb);
    }

    /// Output produced at an internal or confluent event, given the state
    /// at the event and the event flags. By default, produces nothing.
    fn output_func(&self, q: &[f64], events: &[bool], yb: &mut Bag<X>) {
        let _ = (q, events, yb);
    }

    /// Hook invoked after every committed integration step, e.g. for
    /// trajectory recording. By default, does nothing.
    fn post_step(&mut self, q: &[f64]) {
        let _ = q;
    }
}
