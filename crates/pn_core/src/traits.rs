use crate::symbolic::Constant;
use crate::system::PNSystem;
use num_traits::{Float, FromPrimitive};
use std::fmt::Debug;
use std::ops::{Add, Div, Mul, Neg, Sub};

/// A trait for types that can be used as scalars by the numerical integrators.
/// Must support basic arithmetic, debug printing, and conversion from f64.
pub trait Scalar: Float + FromPrimitive + Debug + 'static {}

impl<T: Float + FromPrimitive + Debug + 'static> Scalar for T {}

/// Represents a system of ordinary differential equations.
pub trait DynamicalSystem<T: Scalar> {
    /// Returns the dimension of the state space.
    fn dimension(&self) -> usize;

    /// Evaluates the vector field.
    /// x: current state
    /// t: current time
    /// out: buffer to write dx/dt into
    fn apply(&self, t: T, x: &[T], out: &mut [T]);
}

/// A trait for solvers that can step a system forward.
pub trait Steppable<T: Scalar> {
    /// Performs one step of size dt.
    /// t: current time (updated after step)
    /// state: current state (updated after step)
    /// dt: step size
    fn step(&mut self, system: &impl DynamicalSystem<T>, t: &mut T, state: &mut [T], dt: T);
}

/// The representation a `PNSystem` stores its state in.
///
/// Every accessor and formula in the crate is written once against this trait.
/// Numeric representations (`f64`, `Dual`) evaluate to numbers; the symbolic
/// representation (`Expr`) evaluates to expression trees.
pub trait Representation:
    Clone
    + Debug
    + Send
    + Sync
    + 'static
    + Add<Output = Self>
    + Sub<Output = Self>
    + Mul<Output = Self>
    + Div<Output = Self>
    + Neg<Output = Self>
{
    /// Lifts a floating-point literal.
    fn from_f64(value: f64) -> Self;

    /// Lifts the exact rational `numer / denom`.
    fn ratio(numer: i128, denom: i128) -> Self;

    /// Lifts a named constant. Symbolic representations wrap it in an opaque
    /// marker so the simplifier keeps it exact.
    fn held(constant: Constant) -> Self;

    fn powi(&self, n: i32) -> Self;

    fn sqrt(&self) -> Self;

    fn ln(&self) -> Self;

    /// Evaluates a derived variable. Numeric representations run `compute`;
    /// symbolic ones return the bare placeholder `name` without running it.
    fn derived<F: FnOnce() -> Self>(name: &'static str, compute: F) -> Self;

    /// Flags states outside the regime of validity of the PN approximation.
    /// On `true` the derivative buffer has been poisoned with NaN.
    fn causes_domain_error<const PN_ORDER: u32>(
        derivative: &mut [Self],
        pnsystem: &PNSystem<Self, PN_ORDER>,
    ) -> bool;

    fn zero() -> Self {
        Self::ratio(0, 1)
    }

    fn one() -> Self {
        Self::ratio(1, 1)
    }
}

impl Representation for f64 {
    fn from_f64(value: f64) -> Self {
        value
    }

    fn ratio(numer: i128, denom: i128) -> Self {
        numer as f64 / denom as f64
    }

    fn held(constant: Constant) -> Self {
        constant.value()
    }

    fn powi(&self, n: i32) -> Self {
        f64::powi(*self, n)
    }

    fn sqrt(&self) -> Self {
        f64::sqrt(*self)
    }

    fn ln(&self) -> Self {
        f64::ln(*self)
    }

    fn derived<F: FnOnce() -> Self>(_name: &'static str, compute: F) -> Self {
        compute()
    }

    fn causes_domain_error<const PN_ORDER: u32>(
        derivative: &mut [Self],
        pnsystem: &PNSystem<Self, PN_ORDER>,
    ) -> bool {
        let out_of_domain = crate::termination::numeric_domain_error(pnsystem.state(), |x| *x);
        if out_of_domain {
            derivative.fill(f64::NAN);
        }
        out_of_domain
    }
}
