use crate::modeling::coupled::Endpoint;
use crate::modeling::Pin;
use crate::time::Time;
use log::trace;
use std::collections::{HashMap, HashSet};
use std::rc::Rc;

/// The route computer: the union of every alive coupled model's couplings
/// and terminal connections, with a memoized transitive closure per origin
/// pin.
///
/// `fanout(p)` is the set of `(component, pin)` input deliveries reachable
/// from `p`, flattened through nested coupled models (pins are globally
/// unique, so the closure is a plain graph walk). Cycles in the coupling
/// graph are permitted; the visited set terminates the walk. The table is
/// rebuilt once per structural-mutation epoch and the closure cache fills
/// back in on demand, so routing a step never touches the model tree.
pub(crate) struct Router<X: 'static, T: Time> {
    /// Pin-to-pin coupling edges.
    edges: HashMap<Pin, Vec<Pin>>,
    /// Pins that terminate at a component input.
    terminals: HashMap<Pin, Vec<Endpoint<X, T>>>,
    /// Memoized closures, shared so a delivery pass holds no borrow.
    cache: HashMap<Pin, Rc<Vec<(Endpoint<X, T>, Pin)>>>,
}

impl<X: 'static, T: Time> Router<X, T> {
    pub(crate) fn new() -> Self {
        Self {
            edges: HashMap::new(),
            terminals: HashMap::new(),
            cache: HashMap::new(),
        }
    }

    /// Drops the whole table at the start of a rebuild.
    pub(crate) fn clear(&mut self) {
        self.edges.clear();
        self.terminals.clear();
        self.cache.clear();
    }

    /// Merges one coupled model's coupling declarations into the table.
    pub(crate) fn add_couplings(&mut self, couplings: &HashMap<Pin, Vec<Pin>>) {
        for (from, to) in couplings {
            self.edges.entry(*from).or_default().extend(to.iter().copied());
        }
    }

    /// Merges one terminal connection into the table.
    pub(crate) fn add_terminal(&mut self, pin: Pin, ep: Endpoint<X, T>) {
        self.terminals.entry(pin).or_default().push(ep);
    }

    /// The closure of `pin`, computed on first use.
    pub(crate) fn fanout(&mut self, pin: Pin) -> Rc<Vec<(Endpoint<X, T>, Pin)>> {
        if let Some(fan) = self.cache.get(&pin) {
            return fan.clone();
        }
        let mut out = Vec::new();
        let mut visited = HashSet::new();
        let mut frontier = vec![pin];
        visited.insert(pin);
        while let Some(p) = frontier.pop() {
            if let Some(eps) = self.terminals.get(&p) {
                out.extend(eps.iter().map(|ep| (ep.clone(), p)));
            }
            if let Some(next) = self.edges.get(&p) {
                for q in next {
                    if visited.insert(*q) {
                        frontier.push(*q);
                    }
                }
            }
        }
        trace!("fanout of {pin:?}: {} deliveries", out.len());
        let fan = Rc::new(out);
        self.cache.insert(pin, fan.clone());
        fan
    }
}
