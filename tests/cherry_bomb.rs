//! Hybrid models around the falling cherry bomb. The first scenario forces
//! an external input to coincide with a located state event under the
//! tolerant clock and demands a single confluent transition; the second runs
//! the classic three-state bomb (bounce events plus an explosion time
//! event).

use devsim::error::SimulationError;
use devsim::hybrid::{CorrectedEuler, Hybrid, LinearEventLocator, OdeSystem};
use devsim::modeling::{Atomic, Bag, Component, Coupled, Pin, PinValue};
use devsim::simulation::{EventListener, Simulator};
use devsim::time::{Fcmp, Time};
use devsim::{shared, Shared};

/// Falls from one at a constant rate; the only state event is the zero
/// crossing at t = 1/9.8. Counts which discrete handlers run.
struct Douse {
    bang: Pin,
    doused: bool,
    internal_alone: usize,
    external_alone: usize,
    confluent: usize,
}

impl OdeSystem<&'static str> for Douse {
    fn num_state_variables(&self) -> usize {
        1
    }

    fn num_state_events(&self) -> usize {
        1
    }

    fn init(&mut self, q: &mut [f64]) {
        q[0] = 1.0;
    }

    fn der_func(&self, _q: &[f64], dq: &mut [f64]) {
        dq[0] = -9.8;
    }

    fn state_event_func(&self, q: &[f64], z: &mut [f64]) {
        z[0] = q[0];
    }

    fn internal_event(&mut self, _q: &mut [f64], _events: &[bool]) {
        self.internal_alone += 1;
    }

    fn external_event(&mut self, _q: &mut [f64], _e: f64, _xb: &[PinValue<&'static str>]) {
        self.external_alone += 1;
        self.doused = true;
    }

    fn confluent_event(
        &mut self,
        _q: &mut [f64],
        events: &[bool],
        xb: &[PinValue<&'static str>],
    ) {
        assert!(events[0], "the state event must be part of the confluence");
        assert_eq!(1, xb.len());
        self.confluent += 1;
        self.doused = true;
    }

    fn output_func(&self, _q: &[f64], events: &[bool], yb: &mut Bag<&'static str>) {
        if events[0] {
            yb.push(PinValue::new(self.bang, "boom"));
        }
    }
}

/// Emits one douse signal at the configured moment, then goes passive.
struct Emitter {
    component: Component<&'static str, Fcmp>,
    output: Pin,
    sigma: Fcmp,
}

impl Atomic<&'static str, Fcmp> for Emitter {
    fn component(&self) -> &Component<&'static str, Fcmp> {
        &self.component
    }

    fn component_mut(&mut self) -> &mut Component<&'static str, Fcmp> {
        &mut self.component
    }

    fn ta(&self) -> Fcmp {
        self.sigma
    }

    fn lambda(&self, yb: &mut Bag<&'static str>) {
        yb.push(PinValue::new(self.output, "douse"));
    }

    fn delta_int(&mut self) -> Result<(), SimulationError> {
        self.sigma = Fcmp::infinity();
        Ok(())
    }

    fn delta_ext(
        &mut self,
        _e: Fcmp,
        _xb: &[PinValue<&'static str>],
    ) -> Result<(), SimulationError> {
        Ok(())
    }
}

struct Boom {
    watched: Pin,
    observed: Vec<f64>,
}

impl<T: devsim::time::FloatTime> EventListener<&'static str, T> for Boom {
    fn output_event(&mut self, _model: &dyn Atomic<&'static str, T>, y: &PinValue<&'static str>, t: T) {
        if y.pin == self.watched {
            assert_eq!("boom", y.value);
            self.observed.push(t.as_f64());
        }
    }
}

#[test_log::test]
fn test_douse_at_the_crossing_is_confluent() {
    let t_cross = 1.0 / 9.8;
    let bang = Pin::new();
    let sys = shared(Douse {
        bang,
        doused: false,
        internal_alone: 0,
        external_alone: 0,
        confluent: 0,
    });
    let bomb = shared(
        Hybrid::<&'static str, Fcmp>::new(
            "bomb",
            sys.clone() as Shared<dyn OdeSystem<&'static str>>,
            Box::new(CorrectedEuler::new(1e-6, 0.01)),
            Box::new(LinearEventLocator::new(1e-7)),
        )
        .unwrap(),
    );
    let emitter = shared(Emitter {
        component: Component::new("emitter"),
        output: Pin::new(),
        sigma: Fcmp::with_epsilon(t_cross, 1e-5),
    });
    let bomb_in = Pin::new();
    let top = shared(Coupled::new("top"));
    {
        let mut c = top.borrow_mut();
        let emitter_out = emitter.borrow().output;
        c.add_atomic(bomb.clone() as Shared<dyn Atomic<&'static str, Fcmp>>);
        c.add_atomic(emitter.clone() as Shared<dyn Atomic<&'static str, Fcmp>>);
        c.create_coupling(emitter_out, bomb_in);
        c.connect(bomb_in, bomb.clone() as Shared<dyn Atomic<&'static str, Fcmp>>);
    }
    let boom = shared(Boom {
        watched: bang,
        observed: Vec::new(),
    });
    let mut sim = Simulator::new(top);
    sim.add_event_listener(boom.clone() as Shared<dyn EventListener<&'static str, Fcmp>>);
    while !sys.borrow().doused {
        sim.exec_next_event().unwrap();
    }

    let sys = sys.borrow();
    assert_eq!(1, sys.confluent, "the douse must arrive as a confluence");
    assert_eq!(0, sys.internal_alone);
    assert_eq!(0, sys.external_alone);
    // the output of the confluent step reflects the state event
    let boom = boom.borrow();
    assert_eq!(1, boom.observed.len());
    assert!((boom.observed[0] - t_cross).abs() <= 1e-5);
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum Phase {
    FuseLit,
    Exploded,
}

const H: usize = 0;
const V: usize = 1;
const T: usize = 2;

/// Ball dropped from one meter with an elastic bounce at the ground and an
/// explosion scheduled at t = 2.
struct CherryBomb {
    bang: Pin,
    phase: Phase,
    bounces: Vec<f64>,
}

impl OdeSystem<&'static str> for CherryBomb {
    fn num_state_variables(&self) -> usize {
        3
    }

    fn num_state_events(&self) -> usize {
        1
    }

    fn init(&mut self, q: &mut [f64]) {
        q[H] = 1.0;
        q[V] = 0.0;
        q[T] = 0.0;
    }

    fn der_func(&self, q: &[f64], dq: &mut [f64]) {
        dq[V] = -9.8;
        dq[H] = q[V];
        dq[T] = 1.0;
    }

    fn state_event_func(&self, q: &[f64], z: &mut [f64]) {
        // the ground only stops a falling ball
        z[0] = if q[V] < 0.0 { q[H] } else { 1.0 };
    }

    fn time_event_func(&self, q: &[f64]) -> f64 {
        if q[T] < 2.0 {
            2.0 - q[T]
        } else {
            f64::INFINITY
        }
    }

    fn internal_event(&mut self, q: &mut [f64], events: &[bool]) {
        if events[0] {
            q[V] = -q[V];
            self.bounces.push(q[T]);
        }
        if events[1] {
            self.phase = Phase::Exploded;
        }
    }

    fn output_func(&self, _q: &[f64], events: &[bool], yb: &mut Bag<&'static str>) {
        if events[1] && self.phase == Phase::FuseLit {
            yb.push(PinValue::new(self.bang, "boom"));
        }
    }
}

#[test_log::test]
fn test_bounces_then_explodes_on_time() {
    let bang = Pin::new();
    let sys = shared(CherryBomb {
        bang,
        phase: Phase::FuseLit,
        bounces: Vec::new(),
    });
    let bomb = shared(
        Hybrid::<&'static str>::new(
            "bomb",
            sys.clone() as Shared<dyn OdeSystem<&'static str>>,
            Box::new(CorrectedEuler::new(1e-4, 0.01)),
            Box::new(LinearEventLocator::new(1e-8)),
        )
        .unwrap(),
    );
    let boom = shared(Boom {
        watched: bang,
        observed: Vec::new(),
    });
    let mut sim = Simulator::from_atomic(bomb.clone() as Shared<dyn Atomic<&'static str>>);
    sim.add_event_listener(boom.clone() as Shared<dyn EventListener<&'static str>>);
    while sys.borrow().phase == Phase::FuseLit {
        sim.exec_next_event().unwrap();
    }

    // two elastic bounces before the fuse runs out
    let t_bounce = (1.0_f64 / 4.9).sqrt();
    let sys = sys.borrow();
    assert_eq!(2, sys.bounces.len());
    assert!((sys.bounces[0] - t_bounce).abs() <= 1e-6);
    assert!((sys.bounces[1] - 3.0 * t_bounce).abs() <= 1e-5);
    // the explosion is a time event at exactly t = 2
    assert!((sim.time() - 2.0).abs() <= 1e-9);
    let boom = boom.borrow();
    assert_eq!(1, boom.observed.len());
    assert!((boom.observed[0] - 2.0).abs() <= 1e-9);
}
