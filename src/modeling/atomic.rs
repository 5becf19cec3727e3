use super::{Bag, Component, PinValue};
use crate::error::SimulationError;
use crate::time::Time;

/// Interface for atomic DEVS models.
///
/// Implementers embed a [`Component`] and expose it through
/// [`Atomic::component`]; the simulator drives the protocol and keeps the
/// component's transition times up to date.
pub trait Atomic<X, T: Time = f64> {
    /// Returns a reference to the inner component.
    fn component(&self) -> &Component<X, T>;

    /// Returns a mutable reference to the inner component.
    fn component_mut(&mut self) -> &mut Component<X, T>;

    /// Method for performing any operation when the model joins a
    /// simulation. By default, it does nothing.
    fn start(&mut self) {}

    /// Method for performing any operation when the model leaves a
    /// simulation. By default, it does nothing.
    fn stop(&mut self) {}

    /// Time advance function of the atomic DEVS model: the duration until
    /// the next internal transition, or [`Time::infinity`] for a passive
    /// model. Must be a pure query; the scheduler caches its value once per
    /// transition and asserts in debug builds that it is non-negative.
    fn ta(&self) -> T;

    /// Output function of the atomic DEVS model, called once just before an
    /// internal or confluent transition. Appends to `yb`; must not mutate
    /// the model state (enforced by the `&self` receiver).
    fn lambda(&self, yb: &mut Bag<X>);

    /// Internal transition function of the atomic DEVS model.
    fn delta_int(&mut self) -> Result<(), SimulationError>;

    /// External transition function of the atomic DEVS model.
    /// `e` is the elapsed time since the last state transition
    /// (`0 <= e < ta()`), and `xb` is the non-empty input bag.
    fn delta_ext(&mut self, e: T, xb: &[PinValue<X>]) -> Result<(), SimulationError>;

    /// Confluent transition function of the atomic DEVS model, fired when
    /// input arrives exactly as the time advance expires.
    /// By default, it triggers [`Atomic::delta_int`] and then
    /// [`Atomic::delta_ext`] with the elapsed time set to zero (the full
    /// time advance has been consumed by the internal event). Models may
    /// override it with a custom ordering.
    fn delta_conf(&mut self, xb: &[PinValue<X>]) -> Result<(), SimulationError> {
        self.delta_int()?;
        self.delta_ext(T::zero(), xb)
    }

    /// Requests a structural change after this step completes. A model
    /// returning `true` causes its enclosing [`super::Network`]'s
    /// `model_transition` to run in the quiescent phase between steps.
    /// By default, it requests nothing.
    fn model_transition(&mut self) -> bool {
        false
    }
}
