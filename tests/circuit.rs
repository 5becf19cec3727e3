//! Switched RC circuit with an implicit diode, driven by both solvers. The
//! diode must toggle exactly where the capacitor voltage crosses its
//! threshold; opening the switch at t = 1 restarts the transient, while
//! opening it exactly on the crossing collapses both events into a single
//! confluent transition of the hybrid adapter.

use devsim::error::SimulationError;
use devsim::hybrid::{
    BisectionEventLocator, CorrectedEuler, EventLocator, Hybrid, LinearEventLocator, OdeSolver,
    OdeSystem, Rk45,
};
use devsim::modeling::{Atomic, Bag, Component, Coupled, Pin, PinValue};
use devsim::simulation::{EventListener, Simulator};
use devsim::time::{Fcmp, FloatTime, Time};
use devsim::{shared, Shared};

const VS: f64 = 1.0;
const C: f64 = 1.0;
const RS: f64 = 1.0;
const RL: f64 = 1.0;
const V_OP: f64 = 0.5;
const V_CL: f64 = 0.25;

/// One capacitor behind a source switch and a diode into the load. The
/// diode event is written in implicit form: the indicator tracks the
/// opening threshold while the diode conducts nothing, and the closing
/// threshold otherwise.
struct Circuit {
    toggled: Pin,
    s: bool,
    d: bool,
    confluences: usize,
}

impl OdeSystem<bool> for Circuit {
    fn num_state_variables(&self) -> usize {
        1
    }

    fn num_state_events(&self) -> usize {
        1
    }

    fn init(&mut self, q: &mut [f64]) {
        q[0] = 0.0;
    }

    fn der_func(&self, q: &[f64], dq: &mut [f64]) {
        dq[0] = match (self.s, self.d) {
            (false, false) => 0.0,
            (false, true) => -q[0] / (C * RL),
            (true, false) => (VS - q[0]) / (C * RS),
            (true, true) => ((VS - q[0]) / RS - q[0] / RL) / C,
        };
    }

    fn state_event_func(&self, q: &[f64], z: &mut [f64]) {
        z[0] = if self.d { q[0] - V_CL } else { q[0] - V_OP };
    }

    fn internal_event(&mut self, _q: &mut [f64], events: &[bool]) {
        assert!(events[0]);
        self.d = !self.d;
    }

    fn external_event(&mut self, _q: &mut [f64], _e: f64, xb: &[PinValue<bool>]) {
        self.s = xb[0].value;
    }

    fn confluent_event(&mut self, q: &mut [f64], events: &[bool], xb: &[PinValue<bool>]) {
        self.confluences += 1;
        self.internal_event(q, events);
        self.external_event(q, 0.0, xb);
    }

    fn output_func(&self, _q: &[f64], events: &[bool], yb: &mut Bag<bool>) {
        assert!(events[0]);
        yb.push(PinValue::new(self.toggled, !self.d));
    }
}

/// Opens (emits `false`) at the configured time, once.
struct OpenSwitch<T: Time = f64> {
    component: Component<bool, T>,
    output: Pin,
    t_open: T,
}

impl<T: Time> Atomic<bool, T> for OpenSwitch<T> {
    fn component(&self) -> &Component<bool, T> {
        &self.component
    }

    fn component_mut(&mut self) -> &mut Component<bool, T> {
        &mut self.component
    }

    fn ta(&self) -> T {
        self.t_open
    }

    fn lambda(&self, yb: &mut Bag<bool>) {
        yb.push(PinValue::new(self.output, false));
    }

    fn delta_int(&mut self) -> Result<(), SimulationError> {
        self.t_open = T::infinity();
        Ok(())
    }

    fn delta_ext(&mut self, _e: T, _xb: &[PinValue<bool>]) -> Result<(), SimulationError> {
        Ok(())
    }
}

struct Toggles {
    watched: Pin,
    observed: Vec<(f64, bool)>,
}

impl<T: FloatTime> EventListener<bool, T> for Toggles {
    fn output_event(&mut self, _model: &dyn Atomic<bool, T>, y: &PinValue<bool>, t: T) {
        if y.pin == self.watched {
            self.observed.push((t.as_f64(), y.value));
        }
    }
}

fn run(solver: Box<dyn OdeSolver<bool>>, locator: Box<dyn EventLocator<bool>>) -> Vec<(f64, bool)> {
    let toggled = Pin::new();
    let sys = shared(Circuit {
        toggled,
        s: true,
        d: false,
        confluences: 0,
    });
    let hybrid = shared(
        Hybrid::<bool>::new(
            "circuit",
            sys.clone() as Shared<dyn OdeSystem<bool>>,
            solver,
            locator,
        )
        .unwrap(),
    );
    let switch = shared(OpenSwitch {
        component: Component::new("switch"),
        output: Pin::new(),
        t_open: 1.0,
    });
    let circuit_in = Pin::new();
    let top = shared(Coupled::new("top"));
    {
        let mut c = top.borrow_mut();
        let switch_out = switch.borrow().output;
        c.add_atomic(hybrid.clone() as Shared<dyn Atomic<bool>>);
        c.add_atomic(switch.clone() as Shared<dyn Atomic<bool>>);
        c.create_coupling(switch_out, circuit_in);
        c.connect(circuit_in, hybrid.clone() as Shared<dyn Atomic<bool>>);
    }
    let toggles = shared(Toggles {
        watched: toggled,
        observed: Vec::new(),
    });
    let mut sim = Simulator::new(top);
    sim.add_event_listener(toggles.clone() as Shared<dyn EventListener<bool>>);
    sim.exec_until(4.0).unwrap();

    // steady state after the second toggle: open switch, open diode
    let sys = sys.borrow();
    assert!(!sys.s);
    assert!(!sys.d);
    // the switch opens well clear of both crossings
    assert_eq!(0, sys.confluences);
    assert!((hybrid.borrow().state(0) - V_CL).abs() < 1e-3);
    let observed = toggles.borrow().observed.clone();
    observed
}

fn check(observed: &[(f64, bool)]) {
    let ln2 = 2.0_f64.ln();
    assert_eq!(2, observed.len());
    // charging from zero, v crosses the opening threshold at ln 2 ...
    let (t_open, opening) = observed[0];
    assert!(opening);
    assert!((t_open - ln2).abs() < 1e-3);
    // ... and after the switch opens at t = 1, the capacitor drains past
    // the closing threshold at 1 + ln 2
    let (t_close, opening) = observed[1];
    assert!(!opening);
    assert!((t_close - (1.0 + ln2)).abs() < 1e-3);
}

#[test_log::test]
fn test_diode_events_with_corrected_euler() {
    let observed = run(
        Box::new(CorrectedEuler::new(1e-5, 0.01)),
        Box::new(LinearEventLocator::new(1e-6)),
    );
    check(&observed);
}

#[test_log::test]
fn test_diode_events_with_rk45() {
    let observed = run(
        Box::new(Rk45::new(1e-7, 0.05)),
        Box::new(BisectionEventLocator::new(1e-6)),
    );
    check(&observed);
}

#[test_log::test]
fn test_simultaneous_switch_and_diode_is_confluent() {
    let ln2 = 2.0_f64.ln();
    let toggled = Pin::new();
    let sys = shared(Circuit {
        toggled,
        s: true,
        d: false,
        confluences: 0,
    });
    let hybrid = shared(
        Hybrid::<bool, Fcmp>::new(
            "circuit",
            sys.clone() as Shared<dyn OdeSystem<bool>>,
            Box::new(CorrectedEuler::new(1e-5, 0.01)),
            Box::new(LinearEventLocator::new(1e-6)),
        )
        .unwrap(),
    );
    // the switch opens exactly as v crosses the opening threshold; the
    // comparator tolerance absorbs the located crossing's error
    let switch = shared(OpenSwitch {
        component: Component::new("switch"),
        output: Pin::new(),
        t_open: Fcmp::with_epsilon(ln2, 1e-4),
    });
    let circuit_in = Pin::new();
    let top = shared(Coupled::new("top"));
    {
        let mut c = top.borrow_mut();
        let switch_out = switch.borrow().output;
        c.add_atomic(hybrid.clone() as Shared<dyn Atomic<bool, Fcmp>>);
        c.add_atomic(switch.clone() as Shared<dyn Atomic<bool, Fcmp>>);
        c.create_coupling(switch_out, circuit_in);
        c.connect(circuit_in, hybrid.clone() as Shared<dyn Atomic<bool, Fcmp>>);
    }
    let toggles = shared(Toggles {
        watched: toggled,
        observed: Vec::new(),
    });
    let mut sim = Simulator::new(top);
    sim.add_event_listener(toggles.clone() as Shared<dyn EventListener<bool, Fcmp>>);
    sim.exec_until(Fcmp::new(4.0)).unwrap();

    // the switch input and the diode state event arrive as one confluent
    // transition: the diode opens and the source is cut in the same step
    let sys = sys.borrow();
    assert_eq!(1, sys.confluences);
    assert!(!sys.s);
    assert!(!sys.d);
    let observed = toggles.borrow();
    assert_eq!(2, observed.observed.len());
    let (t_first, opening) = observed.observed[0];
    assert!(opening);
    assert!((t_first - ln2).abs() < 1e-3);
    // with the source cut at the toggle, the capacitor drains from the
    // opening threshold to the closing one in another ln 2
    let (t_second, opening) = observed.observed[1];
    assert!(!opening);
    assert!((t_second - 2.0 * ln2).abs() < 5e-3);
    assert!((hybrid.borrow().state(0) - V_CL).abs() < 1e-3);
}
