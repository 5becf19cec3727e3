pub mod atomic;
pub mod coupled;
pub mod network;
pub mod pin;

pub use atomic::Atomic;
pub use coupled::Coupled;
pub use network::{Network, NetworkDelivery, Origin};
pub use pin::{Bag, Pin, PinValue};

use crate::time::Time;
use std::fmt::{Display, Formatter, Result};

/// Simulation bookkeeping embedded in every atomic model: the component
/// name, the times of the last and next state transitions, the schedule
/// slot, and the per-step input and output bags.
///
/// Models own a `Component` and hand references to it through
/// [`Atomic::component`]; everything the scheduler tracks per model lives
/// here, so the schedule can re-key a model in place.
pub struct Component<X, T: Time = f64> {
    /// Name of the DEVS component. Used for diagnostics only.
    name: String,
    /// Time of the last component state transition.
    t_last: T,
    /// Time for the next component state transition.
    t_next: T,
    /// Slot in the event schedule (0 when not queued).
    slot: usize,
    /// True while the component belongs to the current step's imminent set.
    imminent: bool,
    /// Input bag for the current step.
    input: Bag<X>,
    /// Output bag for the current step.
    output: Bag<X>,
}

impl<X, T: Time> Component<X, T> {
    /// It creates a new component with the provided name.
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            t_last: T::zero(),
            t_next: T::infinity(),
            slot: 0,
            imminent: false,
            input: Bag::new(),
            output: Bag::new(),
        }
    }

    /// Returns name of the component.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the time of the last component state transition.
    pub fn t_last(&self) -> T {
        self.t_last
    }

    /// Returns the time for the next component state transition.
    pub fn t_next(&self) -> T {
        self.t_next
    }

    /// Returns true if the input bag of the component is empty.
    pub fn is_input_empty(&self) -> bool {
        self.input.is_empty()
    }

    /// Sets the times for the last and next component state transitions.
    pub(crate) fn set_sim_t(&mut self, t_last: T, t_next: T) {
        self.t_last = t_last;
        self.t_next = t_next;
    }

    pub(crate) fn slot(&self) -> usize {
        self.slot
    }

    pub(crate) fn set_slot(&mut self, slot: usize) {
        self.slot = slot;
    }

    pub(crate) fn is_imminent(&self) -> bool {
        self.imminent
    }

    pub(crate) fn set_imminent(&mut self, imminent: bool) {
        self.imminent = imminent;
    }

    pub(crate) fn input(&self) -> &Bag<X> {
        &self.input
    }

    pub(crate) fn push_input(&mut self, x: PinValue<X>) {
        self.input.push(x);
    }

    pub(crate) fn take_input(&mut self) -> Bag<X> {
        std::mem::take(&mut self.input)
    }

    pub(crate) fn restore_input(&mut self, bag: Bag<X>) {
        debug_assert!(self.input.is_empty());
        self.input = bag;
    }

    pub(crate) fn output(&self) -> &Bag<X> {
        &self.output
    }

    pub(crate) fn take_output(&mut self) -> Bag<X> {
        std::mem::take(&mut self.output)
    }

    pub(crate) fn restore_output(&mut self, bag: Bag<X>) {
        debug_assert!(self.output.is_empty());
        self.output = bag;
    }

    /// Removes all the messages from both bags, keeping their capacity.
    pub(crate) fn clear_bags(&mut self) {
        self.input.clear();
        self.output.clear();
    }
}

impl<X, T: Time> Display for Component<X, T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        write!(f, "{}", self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_component() {
        let mut c = Component::<i32>::new("component_a");
        assert_eq!("component_a", c.name());
        assert_eq!(0.0, c.t_last());
        assert!(c.t_next().is_infinite());
        assert!(c.is_input_empty());

        c.push_input(PinValue::new(Pin::new(), 1));
        assert!(!c.is_input_empty());

        c.set_sim_t(1.0, 3.0);
        assert_eq!(1.0, c.t_last());
        assert_eq!(3.0, c.t_next());

        c.clear_bags();
        assert!(c.is_input_empty());
    }

    #[test]
    fn test_bag_take_restore() {
        let mut c = Component::<i32>::new("component_a");
        c.push_input(PinValue::new(Pin::new(), 7));
        let bag = c.take_input();
        assert_eq!(1, bag.len());
        assert!(c.is_input_empty());
        c.restore_input(bag);
        assert!(!c.is_input_empty());
    }
}
