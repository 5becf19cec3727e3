use super::OdeSystem;
use crate::error::SimulationError;

/// Steps smaller than this cannot make progress in `f64`; a solver that
/// still fails its tolerance here reports an integration failure.
pub(crate) const MIN_STEP: f64 = 1e-12;

/// Single-step ODE advancer with a fixed per-step error tolerance.
///
/// Both methods mutate nothing on the system beyond `der_func` evaluations.
pub trait OdeSolver<X> {
    /// Advances `q` by some `h <= h_lim` (also bounded by the solver's
    /// maximum step), keeping the estimated local error within the
    /// tolerance. Returns the step actually taken; `h_lim <= 0` is a no-op
    /// returning zero.
    fn integrate(
        &mut self,
        sys: &dyn OdeSystem<X>,
        q: &mut [f64],
        h_lim: f64,
    ) -> Result<f64, SimulationError>;

    /// Advances `q` by exactly `h`, splitting into as many bounded steps as
    /// needed.
    fn advance(
        &mut self,
        sys: &dyn OdeSystem<X>,
        q: &mut [f64],
        h: f64,
    ) -> Result<(), SimulationError> {
        let mut remaining = h;
        while remaining > 0.0 {
            let taken = self.integrate(sys, q, remaining)?;
            debug_assert!(taken > 0.0, "solver made no progress");
            if taken <= 0.0 {
                break;
            }
            remaining -= taken;
        }
        Ok(())
    }
}

/// Explicit-Euler predictor with a trapezoidal corrector (order 2). The
/// distance between predictor and corrector estimates the local error; the
/// step is halved until the estimate meets the tolerance.
pub struct CorrectedEuler {
    tol: f64,
    h_max: f64,
    dq0: Vec<f64>,
    dq1: Vec<f64>,
    qp: Vec<f64>,
}

impl CorrectedEuler {
    /// `step_tol` bounds the per-step local error; `max_step` bounds a
    /// single integration attempt.
    pub fn new(step_tol: f64, max_step: f64) -> Self {
        assert!(
            step_tol > 0.0 && max_step > 0.0,
            "tolerances must be positive"
        );
        Self {
            tol: step_tol,
            h_max: max_step,
            dq0: Vec::new(),
            dq1: Vec::new(),
            qp: Vec::new(),
        }
    }

    fn resize(&mut self, n: usize) {
        if self.dq0.len() != n {
            self.dq0.resize(n, 0.0);
            self.dq1.resize(n, 0.0);
            self.qp.resize(n, 0.0);
        }
    }
}

impl<X> OdeSolver<X> for CorrectedEuler {
    fn integrate(
        &mut self,
        sys: &dyn OdeSystem<X>,
        q: &mut [f64],
        h_lim: f64,
    ) -> Result<f64, SimulationError> {
        if h_lim <= 0.0 {
            return Ok(0.0);
        }
        self.resize(q.len());
        let mut h = self.h_max.min(h_lim);
        sys.der_func(q, &mut self.dq0);
        loop {
            for i in 0..q.len() {
                self.qp[i] = q[i] + h * self.dq0[i];
            }
            sys.der_func(&self.qp, &mut self.dq1);
            let mut err: f64 = 0.0;
            for i in 0..q.len() {
                let qc = q[i] + 0.5 * h * (self.dq0[i] + self.dq1[i]);
                err = err.max((qc - self.qp[i]).abs());
                self.qp[i] = qc;
            }
            if err <= self.tol {
                q.copy_from_slice(&self.qp);
                return Ok(h);
            }
            if h <= MIN_STEP {
                return Err(SimulationError::IntegrationFailure { h, tol: self.tol });
            }
            h *= 0.5;
        }
    }
}

/// Runge-Kutta-Fehlberg 4(5) embedded pair. The step is accepted when the
/// embedded error estimate meets the tolerance, halved on rejection, and the
/// stored step size adapts between calls (never past the maximum step).
pub struct Rk45 {
    tol: f64,
    h_max: f64,
    h_cur: f64,
    k: [Vec<f64>; 6],
    tmp: Vec<f64>,
}

impl Rk45 {
    /// `step_tol` bounds the per-step local error; `max_step` bounds a
    /// single integration attempt.
    pub fn new(step_tol: f64, max_step: f64) -> Self {
        assert!(
            step_tol > 0.0 && max_step > 0.0,
            "tolerances must be positive"
        );
        Self {
            tol: step_tol,
            h_max: max_step,
            h_cur: max_step,
            k: Default::default(),
            tmp: Vec::new(),
        }
    }

    fn resize(&mut self, n: usize) {
        if self.tmp.len() != n {
            for k in self.k.iter_mut() {
                k.resize(n, 0.0);
            }
            self.tmp.resize(n, 0.0);
        }
    }
}

impl<X> OdeSolver<X> for Rk45 {
    fn integrate(
        &mut self,
        sys: &dyn OdeSystem<X>,
        q: &mut [f64],
        h_lim: f64,
    ) -> Result<f64, SimulationError> {
        if h_lim <= 0.0 {
            return Ok(0.0);
        }
        let n = q.len();
        self.resize(n);
        let mut h = self.h_cur.min(h_lim);
        loop {
            sys.der_func(q, &mut self.k[0]);
            for i in 0..n {
                self.tmp[i] = q[i] + h * 0.25 * self.k[0][i];
            }
            sys.der_func(&self.tmp, &mut self.k[1]);
            for i in 0..n {
                self.tmp[i] =
                    q[i] + h * (3.0 / 32.0 * self.k[0][i] + 9.0 / 32.0 * self.k[1][i]);
            }
            sys.der_func(&self.tmp, &mut self.k[2]);
            for i in 0..n {
                self.tmp[i] = q[i]
                    + h * (1932.0 / 2197.0 * self.k[0][i] - 7200.0 / 2197.0 * self.k[1][i]
                        + 7296.0 / 2197.0 * self.k[2][i]);
            }
            sys.der_func(&self.tmp, &mut self.k[3]);
            for i in 0..n {
                self.tmp[i] = q[i]
                    + h * (439.0 / 216.0 * self.k[0][i] - 8.0 * self.k[1][i]
                        + 3680.0 / 513.0 * self.k[2][i]
                        - 845.0 / 4104.0 * self.k[3][i]);
            }
            sys.der_func(&self.tmp, &mut self.k[4]);
            for i in 0..n {
                self.tmp[i] = q[i]
                    + h * (-8.0 / 27.0 * self.k[0][i] + 2.0 * self.k[1][i]
                        - 3544.0 / 2565.0 * self.k[2][i]
                        + 1859.0 / 4104.0 * self.k[3][i]
                        - 11.0 / 40.0 * self.k[4][i]);
            }
            sys.der_func(&self.tmp, &mut self.k[5]);
            let mut err: f64 = 0.0;
            for i in 0..n {
                let e = h * (1.0 / 360.0 * self.k[0][i] - 128.0 / 4275.0 * self.k[2][i]
                    - 2197.0 / 75240.0 * self.k[3][i]
                    + 1.0 / 50.0 * self.k[4][i]
                    + 2.0 / 55.0 * self.k[5][i]);
                err = err.max(e.abs());
            }
            if err <= self.tol {
                for i in 0..n {
                    q[i] += h
                        * (16.0 / 135.0 * self.k[0][i] + 6656.0 / 12825.0 * self.k[2][i]
                            + 28561.0 / 56430.0 * self.k[3][i]
                            - 9.0 / 50.0 * self.k[4][i]
                            + 2.0 / 55.0 * self.k[5][i]);
                }
                let grow = if err == 0.0 {
                    2.0
                } else {
                    (0.9 * (self.tol / err).powf(0.2)).clamp(0.2, 2.0)
                };
                self.h_cur = (h * grow).clamp(MIN_STEP, self.h_max);
                return Ok(h);
            }
            if h <= MIN_STEP {
                return Err(SimulationError::IntegrationFailure { h, tol: self.tol });
            }
            h *= 0.5;
            self.h_cur = h;
        }
    }
}
