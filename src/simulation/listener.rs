use crate::modeling::{Atomic, PinValue};
use crate::time::Time;

/// Observation callbacks, registered on the simulator and invoked
/// synchronously during the step: outputs as they are generated, inputs
/// alongside the delivery that caused them, and state changes after the
/// step's transitions. Among listeners, the invocation order is the
/// registration order.
///
/// Listeners may read model state but must not mutate it, and must not call
/// back into the simulator.
pub trait EventListener<X, T: Time = f64> {
    /// An imminent model produced `y` at time `t`.
    fn output_event(&mut self, model: &dyn Atomic<X, T>, y: &PinValue<X>, t: T) {
        let _ = (model, y, t);
    }

    /// `x` was delivered to an input of `model` at time `t`.
    fn input_event(&mut self, model: &dyn Atomic<X, T>, x: &PinValue<X>, t: T) {
        let _ = (model, x, t);
    }

    /// `model` completed a state transition at time `t`.
    fn state_change(&mut self, model: &dyn Atomic<X, T>, t: T) {
        let _ = (model, t);
    }
}
