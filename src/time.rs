//! Simulation time as a small algebra: an ordered, additive domain with
//! designated zero, infinity, and epsilon values. The kernel is generic over
//! it, so the same scheduler runs over real, integer, tolerant-comparison,
//! and superdense clocks.

use std::fmt::Debug;
use std::ops::{Add, Sub};

/// Contract for simulation time values.
///
/// `infinity` absorbs addition (`advance` saturates, so `i64::MAX` never
/// overflows), and `epsilon` is the smallest representable positive
/// increment of the domain.
pub trait Time:
    Copy + PartialOrd + Add<Output = Self> + Sub<Output = Self> + Debug + 'static
{
    fn zero() -> Self;

    fn infinity() -> Self;

    fn epsilon() -> Self;

    fn is_infinite(&self) -> bool {
        *self >= Self::infinity()
    }

    /// `self + duration`, saturating at infinity.
    fn advance(self, duration: Self) -> Self {
        if self.is_infinite() || duration.is_infinite() {
            Self::infinity()
        } else {
            self + duration
        }
    }

    /// Schedule key for the next internal event after a transition at
    /// `self` with time advance `ta`. The default is plain
    /// [`Time::advance`], so `t_next = t_last + ta` holds literally and a
    /// zero advance re-fires at the same instant; [`SuperDense`] overrides
    /// it to step the micro-index forward by `epsilon` instead.
    fn next_instant(self, ta: Self) -> Self {
        self.advance(ta)
    }
}

impl Time for f64 {
    fn zero() -> Self {
        0.0
    }

    fn infinity() -> Self {
        f64::INFINITY
    }

    fn epsilon() -> Self {
        0.0
    }
}

impl Time for i64 {
    fn zero() -> Self {
        0
    }

    fn infinity() -> Self {
        i64::MAX
    }

    fn epsilon() -> Self {
        1
    }
}

/// Time values that embed the real line. Required by the hybrid adapter,
/// which integrates over `f64` internally whatever the outer clock is.
pub trait FloatTime: Time {
    fn from_f64(t: f64) -> Self;

    fn as_f64(&self) -> f64;
}

impl FloatTime for f64 {
    fn from_f64(t: f64) -> Self {
        t
    }

    fn as_f64(&self) -> f64 {
        *self
    }
}

/// `f64` time with a tolerant comparator: two values are equal when they
/// differ by no more than the larger of their epsilons. The tolerance is
/// carried per value (and combined by max through arithmetic) rather than
/// held in process-wide state, so simulators with different tolerances can
/// coexist in one process.
#[derive(Clone, Copy, Debug)]
pub struct Fcmp {
    t: f64,
    eps: f64,
}

impl Fcmp {
    /// A value with the default tolerance of [`f64::EPSILON`].
    pub fn new(t: f64) -> Self {
        Self {
            t,
            eps: f64::EPSILON,
        }
    }

    /// A value whose comparisons tolerate differences up to `eps`.
    pub fn with_epsilon(t: f64, eps: f64) -> Self {
        Self { t, eps }
    }

    pub fn value(&self) -> f64 {
        self.t
    }

    fn tol(&self, other: &Self) -> f64 {
        self.eps.max(other.eps)
    }
}

impl From<f64> for Fcmp {
    fn from(t: f64) -> Self {
        Self::new(t)
    }
}

impl PartialEq for Fcmp {
    fn eq(&self, other: &Self) -> bool {
        self.t == other.t || (self.t - other.t).abs() <= self.tol(other)
    }
}

impl PartialOrd for Fcmp {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        if self == other {
            Some(std::cmp::Ordering::Equal)
        } else {
            self.t.partial_cmp(&other.t)
        }
    }
}

impl Add for Fcmp {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self {
            t: self.t + rhs.t,
            eps: self.eps.max(rhs.eps),
        }
    }
}

impl Sub for Fcmp {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        Self {
            t: self.t - rhs.t,
            eps: self.eps.max(rhs.eps),
        }
    }
}

impl Time for Fcmp {
    fn zero() -> Self {
        Self::new(0.0)
    }

    fn infinity() -> Self {
        Self::new(f64::INFINITY)
    }

    fn epsilon() -> Self {
        Self::new(0.0)
    }

    fn is_infinite(&self) -> bool {
        self.t.is_infinite() && self.t > 0.0
    }
}

impl FloatTime for Fcmp {
    fn from_f64(t: f64) -> Self {
        Self::new(t)
    }

    fn as_f64(&self) -> f64 {
        self.t
    }
}

/// Superdense time: a real instant plus an integer micro-step index, ordered
/// lexicographically. The index disambiguates zero-duration cascades: adding
/// a duration with a positive real part resets the index to the duration's,
/// while a zero real part accumulates indices.
#[derive(Clone, Copy, Debug, PartialEq, PartialOrd)]
pub struct SuperDense<R: Time = f64> {
    pub real: R,
    pub index: i64,
}

impl<R: Time> SuperDense<R> {
    pub fn new(real: R, index: i64) -> Self {
        Self { real, index }
    }
}

impl<R: Time> Add for SuperDense<R> {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        if rhs.real > R::zero() {
            Self::new(self.real + rhs.real, rhs.index)
        } else {
            Self::new(self.real, self.index + rhs.index)
        }
    }
}

impl<R: Time> Sub for SuperDense<R> {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        if self.real > rhs.real {
            Self::new(self.real - rhs.real, self.index)
        } else {
            Self::new(R::zero(), self.index - rhs.index)
        }
    }
}

impl<R: Time> Time for SuperDense<R> {
    fn zero() -> Self {
        Self::new(R::zero(), 0)
    }

    fn infinity() -> Self {
        Self::new(R::infinity(), 0)
    }

    fn epsilon() -> Self {
        Self::new(R::zero(), 1)
    }

    fn is_infinite(&self) -> bool {
        self.real.is_infinite()
    }

    /// A zero advance still moves forward by one micro-step, so
    /// zero-duration cascades terminate in finite superdense instants.
    fn next_instant(self, ta: Self) -> Self {
        if ta == Self::zero() {
            self.advance(Self::epsilon())
        } else {
            self.advance(ta)
        }
    }
}
