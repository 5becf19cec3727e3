use super::{OdeSolver, OdeSystem};
use crate::error::SimulationError;

const MAX_ITERATIONS: usize = 200;

/// Root finder for state events: brackets the first zero crossing of any
/// indicator inside an accepted integration step.
pub trait EventLocator<X> {
    /// Scans `(0, h]` for the first crossing of the indicators between
    /// `q_start` and `q_end`. When a crossing is found, narrows the bracket
    /// until its width is within the locator's time tolerance, leaves
    /// `q_end` at the crossing, sets `events[i]` for each indicator that
    /// crossed, and returns the located step. Returns `None` when no
    /// indicator changed sign.
    fn find_events(
        &mut self,
        sys: &dyn OdeSystem<X>,
        events: &mut [bool],
        q_start: &[f64],
        q_end: &mut [f64],
        solver: &mut dyn OdeSolver<X>,
        h: f64,
    ) -> Result<Option<f64>, SimulationError>;
}

fn sign_change(a: &[f64], b: &[f64]) -> bool {
    a.iter().zip(b).any(|(za, zb)| za * zb < 0.0)
}

/// Bracket-narrowing shared by the locators: `linear` probes by false
/// position on the earliest crossing, otherwise by bisection.
#[allow(clippy::too_many_arguments)]
fn locate<X>(
    linear: bool,
    tol: f64,
    ws: &mut Workspace,
    sys: &dyn OdeSystem<X>,
    events: &mut [bool],
    q_start: &[f64],
    q_end: &mut [f64],
    solver: &mut dyn OdeSolver<X>,
    h: f64,
) -> Result<Option<f64>, SimulationError> {
    let nz = events.len();
    ws.resize(nz);
    sys.state_event_func(q_start, &mut ws.z0);
    sys.state_event_func(q_end, &mut ws.z_hi);
    if !sign_change(&ws.z0, &ws.z_hi) {
        return Ok(None);
    }
    ws.z_lo.copy_from_slice(&ws.z0);
    let mut lo = 0.0;
    let mut hi = h;
    let mut iterations = 0;
    while hi - lo > tol {
        iterations += 1;
        if iterations > MAX_ITERATIONS {
            return Err(SimulationError::EventLocationFailure {
                reason: format!("bracket not within {tol:e} after {MAX_ITERATIONS} iterations"),
            });
        }
        // interpolation stalls when one bracket side stagnates; a bisection
        // probe every other iteration keeps the shrink rate geometric
        let mut probe = if linear && iterations % 2 == 1 {
            let mut earliest = hi;
            for i in 0..nz {
                if ws.z_lo[i] * ws.z_hi[i] < 0.0 {
                    let frac = ws.z_lo[i] / (ws.z_lo[i] - ws.z_hi[i]);
                    earliest = earliest.min(lo + frac * (hi - lo));
                }
            }
            earliest
        } else {
            0.5 * (lo + hi)
        };
        // keep the probe strictly inside the bracket so it always shrinks
        let margin = 0.05 * (hi - lo);
        probe = probe.clamp(lo + margin, hi - margin);
        q_end.copy_from_slice(q_start);
        solver.advance(sys, q_end, probe)?;
        sys.state_event_func(q_end, &mut ws.z_probe);
        if sign_change(&ws.z_lo, &ws.z_probe) {
            hi = probe;
            ws.z_hi.copy_from_slice(&ws.z_probe);
        } else {
            lo = probe;
            ws.z_lo.copy_from_slice(&ws.z_probe);
        }
    }
    for i in 0..nz {
        events[i] = ws.z0[i] * ws.z_hi[i] < 0.0;
    }
    debug_assert!(events.iter().any(|e| *e));
    q_end.copy_from_slice(q_start);
    solver.advance(sys, q_end, hi)?;
    Ok(Some(hi))
}

struct Workspace {
    z0: Vec<f64>,
    z_lo: Vec<f64>,
    z_hi: Vec<f64>,
    z_probe: Vec<f64>,
}

impl Workspace {
    fn new() -> Self {
        Self {
            z0: Vec::new(),
            z_lo: Vec::new(),
            z_hi: Vec::new(),
            z_probe: Vec::new(),
        }
    }

    fn resize(&mut self, n: usize) {
        if self.z0.len() != n {
            self.z0.resize(n, 0.0);
            self.z_lo.resize(n, 0.0);
            self.z_hi.resize(n, 0.0);
            self.z_probe.resize(n, 0.0);
        }
    }
}

/// Narrows the bracket by linear interpolation (false position) between the
/// indicator samples.
pub struct LinearEventLocator {
    tol: f64,
    ws: Workspace,
}

impl LinearEventLocator {
    /// `event_tol` bounds the time error of a located crossing.
    pub fn new(event_tol: f64) -> Self {
        assert!(event_tol > 0.0, "tolerances must be positive");
        Self {
            tol: event_tol,
            ws: Workspace::new(),
        }
    }
}

impl<X> EventLocator<X> for LinearEventLocator {
    fn find_events(
        &mut self,
        sys: &dyn OdeSystem<X>,
        events: &mut [bool],
        q_start: &[f64],
        q_end: &mut [f64],
        solver: &mut dyn OdeSolver<X>,
        h: f64,
    ) -> Result<Option<f64>, SimulationError> {
        locate(
            true, self.tol, &mut self.ws, sys, events, q_start, q_end, solver, h,
        )
    }
}

/// Narrows the bracket by plain bisection.
pub struct BisectionEventLocator {
    tol: f64,
    ws: Workspace,
}

impl BisectionEventLocator {
    /// `event_tol` bounds the time error of a located crossing.
    pub fn new(event_tol: f64) -> Self {
        assert!(event_tol > 0.0, "tolerances must be positive");
        Self {
            tol: event_tol,
            ws: Workspace::new(),
        }
    }
}

impl<X> EventLocator<X> for BisectionEventLocator {
    fn find_events(
        &mut self,
        sys: &dyn OdeSystem<X>,
        events: &mut [bool],
        q_start: &[f64],
        q_end: &mut [f64],
        solver: &mut dyn OdeSolver<X>,
        h: f64,
    ) -> Result<Option<f64>, SimulationError> {
        locate(
            false, self.tol, &mut self.ws, sys, events, q_start, q_end, solver, h,
        )
    }
}
