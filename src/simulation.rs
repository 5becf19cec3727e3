pub mod listener;
pub(crate) mod router;
pub(crate) mod schedule;

pub use listener::EventListener;

use crate::error::SimulationError;
use crate::modeling::coupled::Endpoint;
use crate::modeling::{Atomic, Bag, Coupled, Network, NetworkDelivery, Origin, PinValue};
use crate::time::Time;
use crate::{same, RcHash, Shared};
use log::{debug, trace};
use router::Router;
use schedule::Schedule;
use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::mem;
use std::rc::Rc;

type AtomicKey<X, T> = RcHash<RefCell<dyn Atomic<X, T>>>;

/// Thin address of a model handle, used to index side tables.
fn thin<X: 'static, T: Time>(model: &Shared<dyn Atomic<X, T>>) -> usize {
    Rc::as_ptr(model) as *const () as usize
}

enum Root<X: 'static, T: Time> {
    Atomic(Shared<dyn Atomic<X, T>>),
    Coupled(Shared<Coupled<X, T>>),
}

impl<X: 'static, T: Time> Clone for Root<X, T> {
    fn clone(&self) -> Self {
        match self {
            Self::Atomic(a) => Self::Atomic(a.clone()),
            Self::Coupled(c) => Self::Coupled(c.clone()),
        }
    }
}

/// Discrete-event simulator for a DEVS model tree.
///
/// The simulator flattens the tree into a registry of atomic leaves, keeps
/// their next events in an event schedule, and executes one step per event
/// time: outputs of the imminent set, routing along the coupling closure
/// (or through [`Network::route`]), exactly one of the internal, external,
/// or confluent transitions per affected model, re-keying, listener
/// notification, and finally the structural-mutation phase.
///
/// The simulator is single-threaded and does not block; it holds shared
/// (non-owning) handles to the models for the duration of a call. Several
/// simulators may coexist in one process.
pub struct Simulator<X: 'static, T: Time = f64> {
    root: Root<X, T>,
    schedule: Schedule<X, T>,
    router: Router<X, T>,
    /// Atomic leaves currently part of the simulation.
    registry: HashSet<AtomicKey<X, T>>,
    /// Enclosing network (and child index) of every network child.
    parents: HashMap<usize, (Shared<dyn Network<X, T>>, usize)>,
    /// Flattened lists of containers, for dirty checks and re-flattening.
    coupleds: Vec<Shared<Coupled<X, T>>>,
    networks: Vec<Shared<dyn Network<X, T>>>,
    listeners: Vec<Shared<dyn EventListener<X, T>>>,
    /// Time of the last executed step.
    t_now: T,
    /// Time staged with [`Simulator::set_next_time`].
    staged_t: Option<T>,
    /// Input staged with [`Simulator::inject_input`].
    staged_input: Bag<X>,
    /// The imminent set of the upcoming step (valid while `output_ready`).
    imminent: Vec<Shared<dyn Atomic<X, T>>>,
    /// Models that received input during the current step.
    activated: Vec<Shared<dyn Atomic<X, T>>>,
    /// True when the imminent outputs have been generated and notified.
    output_ready: bool,
}

impl<X: Clone + 'static, T: Time> Simulator<X, T> {
    /// Creates a simulator for a coupled root model. Every atomic leaf is
    /// started, stamped with `t_last = zero`, and scheduled at its first
    /// time advance.
    pub fn new(root: Shared<Coupled<X, T>>) -> Self {
        Self::with_root(Root::Coupled(root))
    }

    /// Creates a simulator whose root is a single atomic model.
    pub fn from_atomic(root: Shared<dyn Atomic<X, T>>) -> Self {
        Self::with_root(Root::Atomic(root))
    }

    fn with_root(root: Root<X, T>) -> Self {
        let mut sim = Self {
            root,
            schedule: Schedule::new(),
            router: Router::new(),
            registry: HashSet::new(),
            parents: HashMap::new(),
            coupleds: Vec::new(),
            networks: Vec::new(),
            listeners: Vec::new(),
            t_now: T::zero(),
            staged_t: None,
            staged_input: Bag::new(),
            imminent: Vec::new(),
            activated: Vec::new(),
            output_ready: false,
        };
        sim.rebuild(T::zero());
        sim
    }

    /// The time of the last executed step.
    pub fn time(&self) -> T {
        self.t_now
    }

    /// The minimum next-event time over all alive atomic leaves, or
    /// infinity if none is scheduled. Structure changes made by the host
    /// since the last call to an executing operation are not reflected
    /// until that operation runs again.
    pub fn next_event_time(&self) -> T {
        self.schedule.min_time()
    }

    /// Registers a listener. Listeners are notified in registration order.
    pub fn add_event_listener(&mut self, listener: Shared<dyn EventListener<X, T>>) {
        self.listeners.push(listener);
    }

    /// Unregisters a previously added listener.
    pub fn remove_event_listener(&mut self, listener: &Shared<dyn EventListener<X, T>>) {
        self.listeners.retain(|l| !same(l, listener));
    }

    /// Advances the clock to [`Simulator::next_event_time`] and executes one
    /// step. Does nothing when no event is pending. Returns the new clock.
    pub fn exec_next_event(&mut self) -> Result<T, SimulationError> {
        self.resync();
        let t = self.schedule.min_time();
        if t.is_infinite() {
            return Ok(self.t_now);
        }
        self.step(t, false)?;
        Ok(t)
    }

    /// Executes events until the next one would be past `t_stop`. Returns
    /// after the last event with `t <= t_stop` completes; no step is
    /// aborted mid-flight.
    pub fn exec_until(&mut self, t_stop: T) -> Result<T, SimulationError> {
        loop {
            self.resync();
            let t = self.schedule.min_time();
            if t.is_infinite() || t > t_stop {
                return Ok(self.t_now);
            }
            self.step(t, false)?;
        }
    }

    /// Runs only the output phase of the upcoming step: generates the
    /// imminent models' outputs and notifies output listeners, without
    /// committing any transition. Idempotent until the next committed step.
    pub fn compute_next_output(&mut self) {
        self.resync();
        if !self.schedule.min_time().is_infinite() {
            self.ensure_output();
        }
    }

    /// Stages an externally injected value for the next
    /// [`Simulator::compute_next_state`]. The value is routed through the
    /// coupling closure of its pin.
    pub fn inject_input(&mut self, x: PinValue<X>) {
        self.staged_input.push(x);
    }

    /// Stages the time of the next [`Simulator::compute_next_state`].
    /// Staging past the next event time or before the current clock is an
    /// error.
    pub fn set_next_time(&mut self, t: T) -> Result<(), SimulationError> {
        self.resync();
        self.check_time(t)?;
        self.staged_t = Some(t);
        Ok(())
    }

    /// Executes a step at the staged time (the next event time if none was
    /// staged), treating the staged input bag as external input: receivers
    /// fire external or confluent transitions at that time. Returns the new
    /// clock.
    pub fn compute_next_state(&mut self) -> Result<T, SimulationError> {
        self.resync();
        let t = match self.staged_t.take() {
            Some(t) => t,
            None => self.schedule.min_time(),
        };
        if t.is_infinite() {
            return Ok(self.t_now);
        }
        self.check_time(t)?;
        self.step(t, true)?;
        Ok(t)
    }

    /// Convenience wrapper: stages `input` and `t`, then computes the next
    /// state.
    pub fn compute_next_state_at(
        &mut self,
        input: impl IntoIterator<Item = PinValue<X>>,
        t: T,
    ) -> Result<T, SimulationError> {
        for x in input {
            self.inject_input(x);
        }
        self.set_next_time(t)?;
        self.compute_next_state()
    }

    fn check_time(&self, t: T) -> Result<(), SimulationError> {
        let t_next = self.schedule.min_time();
        if t > t_next {
            return Err(SimulationError::InputPastNextEvent {
                t: format!("{t:?}"),
                t_next: format!("{t_next:?}"),
            });
        }
        if t < self.t_now {
            return Err(SimulationError::ClockRegression {
                t: format!("{t:?}"),
                t_now: format!("{:?}", self.t_now),
            });
        }
        Ok(())
    }

    /// Picks up structure changes made by the host since the last step.
    fn resync(&mut self) {
        if self.coupleds.iter().any(|c| c.borrow().is_dirty()) {
            self.invalidate_output();
            self.rebuild(self.t_now);
        }
    }

    /// Generates and caches the outputs of the upcoming step's imminent
    /// set, notifying output listeners exactly once.
    fn ensure_output(&mut self) {
        if self.output_ready {
            return;
        }
        debug_assert!(self.imminent.is_empty());
        let t = self.schedule.min_time();
        let mut imminent = mem::take(&mut self.imminent);
        self.schedule.collect_imminent(t, &mut imminent);
        trace!("t = {t:?}: {} imminent models", imminent.len());
        for m in &imminent {
            let mut mb = m.borrow_mut();
            mb.component_mut().set_imminent(true);
            let mut yb = mb.component_mut().take_output();
            mb.lambda(&mut yb);
            mb.component_mut().restore_output(yb);
        }
        if !self.listeners.is_empty() {
            for m in &imminent {
                let mb = m.borrow();
                for y in mb.component().output() {
                    for l in &self.listeners {
                        l.borrow_mut().output_event(&*mb, y, t);
                    }
                }
            }
        }
        self.imminent = imminent;
        self.output_ready = true;
    }

    /// Drops the cached output phase, clearing imminent flags and bags.
    fn invalidate_output(&mut self) {
        let mut imminent = mem::take(&mut self.imminent);
        for m in &imminent {
            let mut mb = m.borrow_mut();
            mb.component_mut().set_imminent(false);
            mb.component_mut().clear_bags();
        }
        imminent.clear();
        self.imminent = imminent;
        self.output_ready = false;
    }

    /// Executes one step at time `t` (`t <= next_event_time`). Implements
    /// the full protocol: outputs, routing, transitions, re-keying,
    /// listener notification, and the structural-mutation phase.
    fn step(&mut self, t: T, use_staged: bool) -> Result<(), SimulationError> {
        let t_min = self.schedule.min_time();
        debug_assert!(!(t > t_min), "step past the next event time");
        let imminent_step = !t_min.is_infinite() && t == t_min;

        if imminent_step {
            self.ensure_output();
        } else if use_staged && !self.staged_input.is_empty() {
            // the cached output phase (if any) predates this input
            self.invalidate_output();
        }

        // route the imminent outputs along the coupling closure; outputs of
        // network children go through their parent's routing function
        if imminent_step {
            let imminent = mem::take(&mut self.imminent);
            for m in &imminent {
                let parent = self.parents.get(&thin(m)).cloned();
                let yb = m.borrow_mut().component_mut().take_output();
                match &parent {
                    Some((net, index)) => {
                        for y in &yb {
                            self.route_network(net, Origin::Child(*index), y, t);
                        }
                    }
                    None => {
                        for y in &yb {
                            self.deliver_closure(y, t);
                        }
                    }
                }
                m.borrow_mut().component_mut().restore_output(yb);
            }
            self.imminent = imminent;
        }

        // externally injected input
        if use_staged && !self.staged_input.is_empty() {
            let mut staged = mem::take(&mut self.staged_input);
            for x in &staged {
                self.deliver_closure(x, t);
            }
            staged.clear();
            self.staged_input = staged;
        }

        if !imminent_step && self.activated.is_empty() {
            // nothing fires at this time; the clock still advances
            self.t_now = t;
            return Ok(());
        }

        let imminent = mem::take(&mut self.imminent);
        let activated = mem::take(&mut self.activated);
        debug!(
            "t = {t:?}: {} imminent, {} externally activated",
            imminent.len(),
            activated.len()
        );

        // dispatch exactly one transition per affected model
        let mut failure = None;
        if imminent_step {
            for m in &imminent {
                let mut mb = m.borrow_mut();
                let xb = mb.component_mut().take_input();
                let res = if xb.is_empty() {
                    mb.delta_int()
                } else {
                    mb.delta_conf(&xb)
                };
                mb.component_mut().restore_input(xb);
                drop(mb);
                if let Err(e) = res {
                    failure = Some(e);
                    break;
                }
            }
        }
        if failure.is_none() {
            for m in &activated {
                let mut mb = m.borrow_mut();
                let elapsed = t - mb.component().t_last();
                debug_assert!(!(elapsed < T::zero()), "elapsed time went negative");
                let xb = mb.component_mut().take_input();
                debug_assert!(!xb.is_empty());
                let res = mb.delta_ext(elapsed, &xb);
                mb.component_mut().restore_input(xb);
                drop(mb);
                if let Err(e) = res {
                    failure = Some(e);
                    break;
                }
            }
        }

        if failure.is_none() {
            // re-key the schedule from each model's new time advance; the
            // time type decides how a zero advance is keyed (superdense
            // steps its micro-index, scalar clocks re-fire at the same t)
            for m in imminent.iter().chain(activated.iter()) {
                let mut mb = m.borrow_mut();
                let ta = mb.ta();
                debug_assert!(
                    !(ta < T::zero()),
                    "negative time advance from model {}",
                    mb.component().name()
                );
                let t_next = t.next_instant(ta);
                mb.component_mut().set_sim_t(t, t_next);
                drop(mb);
                self.schedule.schedule(m, t_next);
            }

            if !self.listeners.is_empty() {
                for m in imminent.iter().chain(activated.iter()) {
                    let mb = m.borrow();
                    for l in &self.listeners {
                        l.borrow_mut().state_change(&*mb, t);
                    }
                }
            }

            // structural-mutation phase, applied while no transition is in
            // flight: transitioned models may request it, and parents of the
            // requesters run their own structural transition bottom-up
            let mut mutated = false;
            let mut nets: Vec<Shared<dyn Network<X, T>>> = Vec::new();
            for m in imminent.iter().chain(activated.iter()) {
                if m.borrow_mut().model_transition() {
                    mutated = true;
                    if let Some((net, _)) = self.parents.get(&thin(m)) {
                        if !nets.iter().any(|n| same(n, net)) {
                            nets.push(net.clone());
                        }
                    }
                }
            }
            for net in nets {
                net.borrow_mut().model_transition();
            }
            for c in &self.coupleds {
                if c.borrow().is_dirty() {
                    mutated = true;
                }
            }
            if mutated {
                self.rebuild(t);
            }
        }

        // end of step: bags are cleared (not reallocated) and flags reset
        for m in imminent.iter().chain(activated.iter()) {
            let mut mb = m.borrow_mut();
            mb.component_mut().clear_bags();
            mb.component_mut().set_imminent(false);
        }
        let mut imminent = imminent;
        let mut activated = activated;
        imminent.clear();
        activated.clear();
        self.imminent = imminent;
        self.activated = activated;
        self.output_ready = false;
        self.t_now = t;
        match failure {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Delivers `x` to every destination in the coupling closure of its pin.
    fn deliver_closure(&mut self, x: &PinValue<X>, t: T) {
        let fan = self.router.fanout(x.pin);
        for (ep, pin) in fan.iter() {
            let pv = PinValue::new(*pin, x.value.clone());
            match ep {
                Endpoint::Atomic(m) => self.deliver_to(m, pv, t),
                Endpoint::Network(n) => self.route_network(n, Origin::External, &pv, t),
            }
        }
    }

    /// Routes `x` through a network's routing function.
    fn route_network(
        &mut self,
        net: &Shared<dyn Network<X, T>>,
        src: Origin,
        x: &PinValue<X>,
        t: T,
    ) {
        let mut deliveries = Vec::new();
        net.borrow().route(x, src, &mut deliveries);
        for d in deliveries {
            match d {
                NetworkDelivery::Deliver { model, x } => self.deliver_to(&model, x, t),
                NetworkDelivery::EmitOutward(y) => self.deliver_closure(&y, t),
            }
        }
    }

    /// Appends one value to a model's input bag, tracks the activation, and
    /// notifies input listeners.
    fn deliver_to(&mut self, model: &Shared<dyn Atomic<X, T>>, x: PinValue<X>, t: T) {
        let (first, imminent) = {
            let mut mb = model.borrow_mut();
            let comp = mb.component_mut();
            let first = comp.is_input_empty();
            comp.push_input(x);
            (first, comp.is_imminent())
        };
        if first && !imminent {
            self.activated.push(model.clone());
        }
        if !self.listeners.is_empty() {
            let mb = model.borrow();
            let x = mb
                .component()
                .input()
                .last()
                .expect("delivered input bag cannot be empty");
            for l in &self.listeners {
                l.borrow_mut().input_event(&*mb, x, t);
            }
        }
    }

    /// Re-flattens the model tree: rebuilds the routing table, initializes
    /// components that joined since the last epoch (`t_last = t`, queued at
    /// `t + ta`), and purges components that left. Runs at construction and
    /// once per structural-mutation epoch, never mid-step.
    fn rebuild(&mut self, t: T) {
        self.router.clear();
        self.coupleds.clear();
        self.networks.clear();
        self.parents.clear();
        let mut alive = HashSet::new();
        match self.root.clone() {
            Root::Atomic(a) => self.visit_atomic(a, &mut alive, t),
            Root::Coupled(c) => self.visit_coupled(c, &mut alive, t),
        }
        let dead: Vec<AtomicKey<X, T>> = self.registry.difference(&alive).cloned().collect();
        for key in dead {
            let model: Shared<dyn Atomic<X, T>> = key.0;
            self.schedule.remove(&model);
            let mut mb = model.borrow_mut();
            mb.component_mut().clear_bags();
            mb.component_mut().set_imminent(false);
            mb.stop();
        }
        debug!(
            "t = {t:?}: structure epoch with {} atomic leaves",
            alive.len()
        );
        self.registry = alive;
    }

    fn visit_coupled(&mut self, c: Shared<Coupled<X, T>>, alive: &mut HashSet<AtomicKey<X, T>>, t: T) {
        if self.coupleds.iter().any(|known| same(known, &c)) {
            return;
        }
        let (atomics, coupleds, networks) = {
            let mut cb = c.borrow_mut();
            cb.take_dirty();
            (cb.atomics.clone(), cb.coupled.clone(), cb.networks.clone())
        };
        {
            let cb = c.borrow();
            self.router.add_couplings(&cb.couplings);
            for (pin, ep) in &cb.terminals {
                self.router.add_terminal(*pin, ep.clone());
            }
        }
        self.coupleds.push(c);
        for a in atomics {
            self.visit_atomic(a, alive, t);
        }
        for n in networks {
            self.visit_network(n, alive, t);
        }
        for cc in coupleds {
            self.visit_coupled(cc, alive, t);
        }
    }

    fn visit_network(
        &mut self,
        n: Shared<dyn Network<X, T>>,
        alive: &mut HashSet<AtomicKey<X, T>>,
        t: T,
    ) {
        if self.networks.iter().any(|known| same(known, &n)) {
            return;
        }
        let mut children = Vec::new();
        n.borrow().components(&mut children);
        for (index, a) in children.into_iter().enumerate() {
            self.parents.insert(thin(&a), (n.clone(), index));
            self.visit_atomic(a, alive, t);
        }
        self.networks.push(n);
    }

    fn visit_atomic(
        &mut self,
        a: Shared<dyn Atomic<X, T>>,
        alive: &mut HashSet<AtomicKey<X, T>>,
        t: T,
    ) {
        let key = RcHash(a.clone());
        if !alive.insert(key.clone()) {
            return;
        }
        if !self.registry.contains(&key) {
            let mut ab = a.borrow_mut();
            ab.start();
            let ta = ab.ta();
            debug_assert!(
                !(ta < T::zero()),
                "negative time advance from model {}",
                ab.component().name()
            );
            let t_next = t.next_instant(ta);
            ab.component_mut().set_sim_t(t, t_next);
            drop(ab);
            self.schedule.schedule(&a, t_next);
        }
    }
}
