use super::network::Network;
use super::{Atomic, Pin};
use crate::time::Time;
use crate::{same, Shared};
use std::collections::HashMap;
use std::fmt::{Display, Formatter, Result};

/// A component a pin may terminate at.
pub(crate) enum Endpoint<X: 'static, T: Time> {
    Atomic(Shared<dyn Atomic<X, T>>),
    Network(Shared<dyn Network<X, T>>),
}

impl<X: 'static, T: Time> Clone for Endpoint<X, T> {
    fn clone(&self) -> Self {
        match self {
            Self::Atomic(m) => Self::Atomic(m.clone()),
            Self::Network(n) => Self::Network(n.clone()),
        }
    }
}

impl<X: 'static, T: Time> Endpoint<X, T> {
    pub(crate) fn is(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Atomic(a), Self::Atomic(b)) => same(a, b),
            (Self::Network(a), Self::Network(b)) => same(a, b),
            _ => false,
        }
    }
}

/// Coupled DEVS model: a set of child components plus a static coupling
/// graph over pins.
///
/// Couplings go from pin to pin; a pin is declared as a component's input
/// with [`Coupled::connect`]. A value produced on a pin is delivered to
/// every component input reachable through the transitive closure of the
/// couplings, across nested coupled models (pins are globally unique, so
/// closure flattens through model boundaries).
///
/// The child set and the couplings may be changed while a simulation runs,
/// from the host or from a model transition; the simulator picks the changes
/// up in the quiescent phase between steps, never mid-step.
pub struct Coupled<X: 'static, T: Time = f64> {
    /// Name of the coupled model.
    name: String,
    /// Atomic children.
    pub(crate) atomics: Vec<Shared<dyn Atomic<X, T>>>,
    /// Nested coupled children.
    pub(crate) coupled: Vec<Shared<Coupled<X, T>>>,
    /// Nested network children.
    pub(crate) networks: Vec<Shared<dyn Network<X, T>>>,
    /// Couplings declared by this model (origin pin to destination pins).
    pub(crate) couplings: HashMap<Pin, Vec<Pin>>,
    /// Pins that terminate at a child input.
    pub(crate) terminals: Vec<(Pin, Endpoint<X, T>)>,
    /// Set by every mutation; cleared when the simulator re-synchronizes.
    dirty: bool,
}

impl<X: 'static, T: Time> Coupled<X, T> {
    /// Creates a new coupled DEVS model.
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            atomics: Vec::new(),
            coupled: Vec::new(),
            networks: Vec::new(),
            couplings: HashMap::new(),
            terminals: Vec::new(),
            dirty: true,
        }
    }

    /// Returns the name of the coupled model.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Adds an atomic child to the coupled model.
    pub fn add_atomic(&mut self, model: Shared<dyn Atomic<X, T>>) {
        self.atomics.push(model);
        self.dirty = true;
    }

    /// Adds a nested coupled model.
    pub fn add_coupled_model(&mut self, model: Shared<Coupled<X, T>>) {
        self.coupled.push(model);
        self.dirty = true;
    }

    /// Adds a nested network model.
    pub fn add_network(&mut self, model: Shared<dyn Network<X, T>>) {
        self.networks.push(model);
        self.dirty = true;
    }

    /// Removes an atomic child. The component keeps existing until every
    /// in-flight reference is dropped at the end of the current step.
    /// It panics if the coupled model does not contain the component.
    pub fn remove_atomic(&mut self, model: &Shared<dyn Atomic<X, T>>) {
        let n = self.atomics.len();
        self.atomics.retain(|m| !same(m, model));
        if self.atomics.len() == n {
            panic!("coupled model does not contain the component provided");
        }
        self.terminals
            .retain(|(_, ep)| !ep.is(&Endpoint::Atomic(model.clone())));
        self.dirty = true;
    }

    /// Removes a nested coupled model together with its whole subtree.
    /// It panics if the coupled model does not contain the component.
    pub fn remove_coupled_model(&mut self, model: &Shared<Coupled<X, T>>) {
        let n = self.coupled.len();
        self.coupled.retain(|m| !same(m, model));
        if self.coupled.len() == n {
            panic!("coupled model does not contain the component provided");
        }
        self.dirty = true;
    }

    /// Removes a nested network model.
    /// It panics if the coupled model does not contain the component.
    pub fn remove_network(&mut self, model: &Shared<dyn Network<X, T>>) {
        let n = self.networks.len();
        self.networks.retain(|m| !same(m, model));
        if self.networks.len() == n {
            panic!("coupled model does not contain the component provided");
        }
        self.terminals
            .retain(|(_, ep)| !ep.is(&Endpoint::Network(model.clone())));
        self.dirty = true;
    }

    /// Adds a new coupling between two pins.
    /// It panics if the coupling already exists.
    pub fn create_coupling(&mut self, from: Pin, to: Pin) {
        let dst = self.couplings.entry(from).or_default();
        if dst.contains(&to) {
            panic!("duplicate coupling");
        }
        dst.push(to);
        self.dirty = true;
    }

    /// Removes a coupling between two pins.
    /// It panics if the coupling does not exist.
    pub fn remove_coupling(&mut self, from: Pin, to: Pin) {
        let found = match self.couplings.get_mut(&from) {
            Some(dst) => {
                let n = dst.len();
                dst.retain(|p| *p != to);
                dst.len() < n
            }
            None => false,
        };
        if !found {
            panic!("coupled model does not contain the coupling provided");
        }
        self.dirty = true;
    }

    /// Declares `pin` as an input of an atomic child: every value routed to
    /// the pin is delivered to the component.
    /// It panics if the connection already exists.
    pub fn connect(&mut self, pin: Pin, model: Shared<dyn Atomic<X, T>>) {
        let ep = Endpoint::Atomic(model);
        self.push_terminal(pin, ep);
    }

    /// Declares `pin` as an input of a network child: every value routed to
    /// the pin is handed to the network's routing function.
    /// It panics if the connection already exists.
    pub fn connect_network(&mut self, pin: Pin, model: Shared<dyn Network<X, T>>) {
        let ep = Endpoint::Network(model);
        self.push_terminal(pin, ep);
    }

    fn push_terminal(&mut self, pin: Pin, ep: Endpoint<X, T>) {
        if self.terminals.iter().any(|(p, e)| *p == pin && e.is(&ep)) {
            panic!("duplicate connection");
        }
        self.terminals.push((pin, ep));
        self.dirty = true;
    }

    /// Number of couplings declared by this model (not counting terminal
    /// connections).
    pub fn n_couplings(&self) -> usize {
        self.couplings.values().map(Vec::len).sum()
    }

    pub(crate) fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub(crate) fn take_dirty(&mut self) -> bool {
        std::mem::replace(&mut self.dirty, false)
    }
}

impl<X: 'static, T: Time> Display for Coupled<X, T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        write!(f, "{}", self.name)
    }
}
