//! A small computer-algebra core for post-Newtonian formulas.
//!
//! Coefficients are exact rationals, exponents are small rationals and the only
//! transcendental function is the natural logarithm, which is all the PN
//! formulas need. Named irrationals (`Constant`) behave like numbers: combining
//! them with other numbers folds the result to a float. Wrapping a constant in
//! `Expr::Held` makes it opaque to folding while keeping its value, and
//! differentiation treats the wrapper as the identity.

mod calculus;
mod simplify;

pub(crate) use simplify::{simplify_product, simplify_sum, terms_of};

use num_bigint::BigInt;
use num_rational::{BigRational, Rational64};
use num_traits::{One, Signed, ToPrimitive, Zero};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::ops::{Add, Div, Mul, Neg, Sub};

use crate::system::PNSystem;
use crate::traits::Representation;

/// Named irrational constants appearing in PN coefficients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Constant {
    Pi,
    EulerGamma,
    /// Apéry's constant ζ(3).
    Zeta3,
}

impl Constant {
    pub fn value(self) -> f64 {
        match self {
            Constant::Pi => std::f64::consts::PI,
            Constant::EulerGamma => 0.577_215_664_901_532_9,
            Constant::Zeta3 => 1.202_056_903_159_594_3,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Constant::Pi => "π",
            Constant::EulerGamma => "γ_E",
            Constant::Zeta3 => "ζ(3)",
        }
    }
}

/// An `f64` with total ordering and bitwise equality so it can live inside a
/// hashable, ordered expression tree.
#[derive(Debug, Clone, Copy)]
pub struct Real(pub f64);

impl PartialEq for Real {
    fn eq(&self, other: &Self) -> bool {
        self.0.to_bits() == other.0.to_bits()
    }
}

impl Eq for Real {}

impl Hash for Real {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.to_bits().hash(state);
    }
}

impl PartialOrd for Real {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Real {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

/// Symbolic expression tree.
///
/// Subtraction and division have no nodes of their own: `a - b` is
/// `a + (-1)*b` and `a / b` is `a * b^-1`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Expr {
    Num(BigRational),
    Float(Real),
    Constant(Constant),
    Symbol(&'static str),
    Add(Vec<Expr>),
    Mul(Vec<Expr>),
    Pow(Box<Expr>, Rational64),
    Ln(Box<Expr>),
    /// Opaque identity wrapper; never folded by the simplifier.
    Held(Box<Expr>),
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SymbolicError {
    #[error("unknown symbol `{0}`")]
    UnknownSymbol(String),
    #[error("`{variable}` appears non-polynomially in term `{term}`")]
    NonPolynomial { variable: String, term: String },
    #[error("`{variable}` appears with non-integer power {power} in term `{term}`")]
    NonIntegerPower {
        variable: String,
        power: String,
        term: String,
    },
    #[error("series in `{0}` has a vanishing leading coefficient and cannot be inverted")]
    ZeroLeadingTerm(String),
}

impl Expr {
    pub fn int(n: i64) -> Self {
        Expr::Num(BigRational::from_integer(BigInt::from(n)))
    }

    pub fn rational(numer: i64, denom: i64) -> Self {
        Expr::Num(BigRational::new(BigInt::from(numer), BigInt::from(denom)))
    }

    pub fn float(value: f64) -> Self {
        Expr::Float(Real(value))
    }

    pub fn symbol(name: &'static str) -> Self {
        Expr::Symbol(name)
    }

    pub fn constant(constant: Constant) -> Self {
        Expr::Constant(constant)
    }

    pub fn held(inner: Expr) -> Self {
        Expr::Held(Box::new(inner))
    }

    pub fn pow(base: Expr, exponent: Rational64) -> Self {
        Expr::Pow(Box::new(base), exponent)
    }

    pub fn powi(base: Expr, exponent: i64) -> Self {
        Expr::Pow(Box::new(base), Rational64::from_integer(exponent))
    }

    pub fn log(arg: Expr) -> Self {
        Expr::Ln(Box::new(arg))
    }

    pub fn zero() -> Self {
        Expr::Num(BigRational::zero())
    }

    pub fn one() -> Self {
        Expr::Num(BigRational::one())
    }

    /// True only for the exact rational zero (what the simplifier produces for
    /// a vanishing expression).
    pub fn is_zero(&self) -> bool {
        matches!(self, Expr::Num(r) if r.is_zero())
    }

    pub fn is_one(&self) -> bool {
        matches!(self, Expr::Num(r) if r.is_one())
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, Expr::Num(_) | Expr::Float(_))
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Expr::Num(r) => Some(rational_to_f64(r)),
            Expr::Float(x) => Some(x.0),
            Expr::Constant(c) => Some(c.value()),
            _ => None,
        }
    }

    /// Number of nodes in the tree.
    pub fn size(&self) -> usize {
        match self {
            Expr::Add(items) | Expr::Mul(items) => 1 + items.iter().map(Expr::size).sum::<usize>(),
            Expr::Pow(inner, _) | Expr::Ln(inner) | Expr::Held(inner) => 1 + inner.size(),
            _ => 1,
        }
    }
}

pub(crate) fn rational_to_f64(r: &BigRational) -> f64 {
    r.to_f64().unwrap_or_else(|| {
        let numer = r.numer().to_f64().unwrap_or(f64::NAN);
        let denom = r.denom().to_f64().unwrap_or(f64::NAN);
        numer / denom
    })
}

impl From<i64> for Expr {
    fn from(n: i64) -> Self {
        Expr::int(n)
    }
}

impl Add for Expr {
    type Output = Expr;
    fn add(self, rhs: Expr) -> Expr {
        Expr::Add(vec![self, rhs])
    }
}

impl Sub for Expr {
    type Output = Expr;
    fn sub(self, rhs: Expr) -> Expr {
        Expr::Add(vec![self, Expr::Mul(vec![Expr::int(-1), rhs])])
    }
}

impl Mul for Expr {
    type Output = Expr;
    fn mul(self, rhs: Expr) -> Expr {
        Expr::Mul(vec![self, rhs])
    }
}

impl Div for Expr {
    type Output = Expr;
    fn div(self, rhs: Expr) -> Expr {
        Expr::Mul(vec![self, Expr::powi(rhs, -1)])
    }
}

impl Neg for Expr {
    type Output = Expr;
    fn neg(self) -> Expr {
        Expr::Mul(vec![Expr::int(-1), self])
    }
}

impl Representation for Expr {
    fn from_f64(value: f64) -> Self {
        if value.is_finite() && value.fract() == 0.0 && value.abs() < 9.0e15 {
            Expr::int(value as i64)
        } else {
            Expr::float(value)
        }
    }

    fn ratio(numer: i128, denom: i128) -> Self {
        Expr::Num(BigRational::new(BigInt::from(numer), BigInt::from(denom)))
    }

    fn held(constant: Constant) -> Self {
        Expr::held(Expr::Constant(constant))
    }

    fn powi(&self, n: i32) -> Self {
        Expr::powi(self.clone(), n as i64)
    }

    fn sqrt(&self) -> Self {
        Expr::pow(self.clone(), Rational64::new(1, 2))
    }

    fn ln(&self) -> Self {
        Expr::log(self.clone())
    }

    fn derived<F: FnOnce() -> Self>(name: &'static str, _compute: F) -> Self {
        Expr::Symbol(name)
    }

    fn causes_domain_error<const PN_ORDER: u32>(
        _derivative: &mut [Self],
        _pnsystem: &PNSystem<Self, PN_ORDER>,
    ) -> bool {
        false
    }
}

fn fmt_exponent(exponent: &Rational64) -> String {
    if exponent.is_integer() {
        format!("{}", exponent.to_integer())
    } else {
        format!("({}/{})", exponent.numer(), exponent.denom())
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Num(r) => {
                if r.is_integer() {
                    write!(f, "{}", r.to_integer())
                } else if r.is_negative() {
                    write!(f, "(-{}/{})", r.numer().abs(), r.denom())
                } else {
                    write!(f, "({}/{})", r.numer(), r.denom())
                }
            }
            Expr::Float(x) => write!(f, "{:?}", x.0),
            Expr::Constant(c) => write!(f, "{}", c.name()),
            Expr::Symbol(name) => write!(f, "{}", name),
            Expr::Add(terms) => {
                write!(f, "(")?;
                for (i, term) in terms.iter().enumerate() {
                    if i > 0 {
                        write!(f, " + ")?;
                    }
                    write!(f, "{}", term)?;
                }
                write!(f, ")")
            }
            Expr::Mul(factors) => {
                for (i, factor) in factors.iter().enumerate() {
                    if i > 0 {
                        write!(f, "*")?;
                    }
                    write!(f, "{}", factor)?;
                }
                Ok(())
            }
            Expr::Pow(base, exponent) => match base.as_ref() {
                Expr::Symbol(_) | Expr::Constant(_) | Expr::Held(_) | Expr::Ln(_) => {
                    write!(f, "{}^{}", base, fmt_exponent(exponent))
                }
                _ => write!(f, "({})^{}", base, fmt_exponent(exponent)),
            },
            Expr::Ln(arg) => write!(f, "ln({})", arg),
            Expr::Held(inner) => write!(f, "held({})", inner),
        }
    }
}
