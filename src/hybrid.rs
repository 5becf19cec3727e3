pub mod locator;
pub mod ode;
pub mod solver;

pub use locator::{BisectionEventLocator, EventLocator, LinearEventLocator};
pub use ode::OdeSystem;
pub use solver::{CorrectedEuler, OdeSolver, Rk45};

use crate::error::SimulationError;
use crate::modeling::{Atomic, Bag, Component, PinValue};
use crate::time::FloatTime;
use crate::Shared;
use log::trace;

/// Wraps a continuous system into an ordinary atomic DEVS model.
///
/// Between discrete events the adapter advances the system with its ODE
/// solver. After every accepted trial step it asks the event locator for
/// zero crossings inside the step, so the reported time advance is never
/// greater than the true time to the nearest of: the integration step
/// completing, a time event, or a state event. The time advance is cached
/// by the trial step; `ta()` is a pure read and never re-integrates.
///
/// The adapter works for any [`FloatTime`] clock. Running it under
/// [`crate::time::Fcmp`] lets external inputs scheduled at a located event
/// time coincide with it under the comparator's tolerance, which turns the
/// pair into a single confluent transition.
pub struct Hybrid<X: 'static, T: FloatTime = f64> {
    component: Component<X, T>,
    sys: Shared<dyn OdeSystem<X>>,
    solver: Box<dyn OdeSolver<X>>,
    locator: Box<dyn EventLocator<X>>,
    /// Committed state.
    q: Vec<f64>,
    /// Trial state at the end of the pending step.
    q_trial: Vec<f64>,
    /// Pending event flags; the last entry is the time-event flag.
    events: Vec<bool>,
    /// Cached time advance of the pending step.
    sigma: f64,
    /// True when the pending step ends in a state or time event.
    has_event: bool,
}

impl<X: 'static, T: FloatTime> Hybrid<X, T> {
    /// Initializes the continuous system and computes its first trial step.
    pub fn new(
        name: &str,
        sys: Shared<dyn OdeSystem<X>>,
        solver: Box<dyn OdeSolver<X>>,
        locator: Box<dyn EventLocator<X>>,
    ) -> Result<Self, SimulationError> {
        let (nx, nz) = {
            let s = sys.borrow();
            (s.num_state_variables(), s.num_state_events())
        };
        let mut q = vec![0.0; nx];
        sys.borrow_mut().init(&mut q);
        let mut hybrid = Self {
            component: Component::new(name),
            sys,
            solver,
            locator,
            q_trial: q.clone(),
            q,
            events: vec![false; nz + 1],
            sigma: 0.0,
            has_event: false,
        };
        hybrid.tentative_step()?;
        Ok(hybrid)
    }

    /// The committed value of state variable `i`.
    pub fn state(&self, i: usize) -> f64 {
        self.q[i]
    }

    /// Trial-integrates from the committed state up to the time-event
    /// horizon, locates the first state event inside the accepted step, and
    /// caches the resulting time advance and event flags.
    fn tentative_step(&mut self) -> Result<(), SimulationError> {
        let sys = self.sys.clone();
        let sysb = sys.borrow();
        let h_lim = sysb.time_event_func(&self.q);
        debug_assert!(h_lim >= 0.0, "negative time to the next time event");
        self.q_trial.copy_from_slice(&self.q);
        for flag in self.events.iter_mut() {
            *flag = false;
        }
        let mut h = self.solver.integrate(&*sysb, &mut self.q_trial, h_lim)?;
        let nz = self.events.len() - 1;
        let mut located = false;
        if nz > 0 && h > 0.0 {
            if let Some(h_event) = self.locator.find_events(
                &*sysb,
                &mut self.events[..nz],
                &self.q,
                &mut self.q_trial,
                &mut *self.solver,
                h,
            )? {
                h = h_event;
                located = true;
            }
        }
        let time_event = !h_lim.is_infinite() && h >= h_lim;
        self.events[nz] = time_event;
        self.has_event = located || time_event;
        self.sigma = h;
        trace!(
            "{}: trial step h = {h:e}, state event: {located}, time event: {time_event}",
            self.component.name()
        );
        Ok(())
    }
}

impl<X: 'static, T: FloatTime> Atomic<X, T> for Hybrid<X, T> {
    fn component(&self) -> &Component<X, T> {
        &self.component
    }

    fn component_mut(&mut self) -> &mut Component<X, T> {
        &mut self.component
    }

    fn ta(&self) -> T {
        T::from_f64(self.sigma)
    }

    fn lambda(&self, yb: &mut Bag<X>) {
        // plain integration steps are silent
        if self.has_event {
            self.sys.borrow().output_func(&self.q_trial, &self.events, yb);
        }
    }

    fn delta_int(&mut self) -> Result<(), SimulationError> {
        self.q.copy_from_slice(&self.q_trial);
        if self.has_event {
            self.sys.borrow_mut().internal_event(&mut self.q, &self.events);
        }
        self.sys.borrow_mut().post_step(&self.q);
        self.tentative_step()
    }

    fn delta_ext(&mut self, e: T, xb: &[PinValue<X>]) -> Result<(), SimulationError> {
        let e = e.as_f64();
        debug_assert!(e >= 0.0, "elapsed time went negative");
        if e > 0.0 {
            let sys = self.sys.clone();
            let sysb = sys.borrow();
            self.solver.advance(&*sysb, &mut self.q, e)?;
        }
        self.sys.borrow_mut().external_event(&mut self.q, e, xb);
        self.sys.borrow_mut().post_step(&self.q);
        self.tentative_step()
    }

    fn delta_conf(&mut self, xb: &[PinValue<X>]) -> Result<(), SimulationError> {
        self.q.copy_from_slice(&self.q_trial);
        self.sys
            .borrow_mut()
            .confluent_event(&mut self.q, &self.events, xb);
        self.sys.borrow_mut().post_step(&self.q);
        self.tentative_step()
    }
}
