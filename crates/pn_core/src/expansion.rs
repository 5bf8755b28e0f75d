//! PN-order truncation.
//!
//! Two mechanisms live here. Formulas are written against [`PnExpansion`],
//! which drops terms above the system's order before they are even built.
//! Expressions that come out of the symbolic engine are truncated after the
//! fact by [`pn_expansion`] and decomposed by [`collect_by_power`].

use crate::symbolic::{simplify_product, simplify_sum, terms_of, Expr, SymbolicError};
use crate::traits::Representation;
use num_rational::Rational64;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Truncation order counted in half PN orders (the largest relative power of
/// `v` kept).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PnOrder(u32);

impl PnOrder {
    pub const UNBOUNDED: PnOrder = PnOrder(u32::MAX);

    pub const fn from_half_orders(half_orders: u32) -> Self {
        PnOrder(half_orders)
    }

    /// `3.5` -> seven half orders. `None` unless `pn` is a non-negative
    /// multiple of one half.
    pub fn from_pn(pn: f64) -> Option<Self> {
        let doubled = 2.0 * pn;
        if !doubled.is_finite() || doubled < 0.0 || doubled.fract() != 0.0 || doubled >= u32::MAX as f64 {
            return None;
        }
        Some(PnOrder(doubled as u32))
    }

    pub fn half_orders(self) -> u32 {
        self.0
    }

    pub fn is_unbounded(self) -> bool {
        self.0 == u32::MAX
    }

    /// Whether a term at relative power `power` of `v` survives truncation.
    pub fn includes(self, power: i64) -> bool {
        self.is_unbounded() || power <= i64::from(self.0)
    }

    pub fn includes_rational(self, power: Rational64) -> bool {
        self.is_unbounded() || power <= Rational64::from_integer(i64::from(self.0))
    }
}

impl fmt::Display for PnOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_unbounded() {
            write!(f, "unbounded")
        } else if self.0 % 2 == 0 {
            write!(f, "{}PN", self.0 / 2)
        } else {
            write!(f, "{}.5PN", self.0 / 2)
        }
    }
}

/// Builder for a sum of PN terms, each at a known relative power of `v`.
///
/// Coefficients above the order are never evaluated, so they do not appear
/// in the resulting value or expression at all.
pub struct PnExpansion<R> {
    order: PnOrder,
    terms: Vec<R>,
}

impl<R: Representation> PnExpansion<R> {
    pub fn new(order: PnOrder) -> Self {
        Self {
            order,
            terms: Vec::new(),
        }
    }

    pub fn term<F: FnOnce() -> R>(mut self, power: u32, term: F) -> Self {
        if self.order.includes(i64::from(power)) {
            self.terms.push(term());
        }
        self
    }

    /// Left-folded sum of the kept terms; zero when none survive.
    pub fn sum(self) -> R {
        self.terms.into_iter().reduce(|a, b| a + b).unwrap_or_else(R::zero)
    }
}

/// Top-level additive terms of `expr`, with nested sums flattened. Terms are
/// returned as they are, without simplification.
pub fn flatten_terms(expr: &Expr) -> Vec<Expr> {
    let mut terms = Vec::new();
    let mut pending = vec![expr];
    while let Some(e) = pending.pop() {
        match e {
            Expr::Add(inner) => pending.extend(inner.iter().rev()),
            other => terms.push(other.clone()),
        }
    }
    terms
}

/// Rebuilds `expr` with a single flat top-level sum.
pub fn flatten_sum(expr: &Expr) -> Expr {
    let mut terms = flatten_terms(expr);
    match terms.len() {
        0 => Expr::zero(),
        1 => terms.remove(0),
        _ => Expr::Add(terms),
    }
}

/// Power of `var` in a single product term. Logarithms of a power of `var`,
/// and integer powers of such logarithms, count as zero.
pub fn velocity_power(term: &Expr, var: &str) -> Result<Rational64, SymbolicError> {
    let zero = Rational64::from_integer(0);
    if !term.contains_symbol(var) {
        return Ok(zero);
    }
    match term {
        Expr::Symbol(_) => Ok(Rational64::from_integer(1)),
        Expr::Pow(base, exponent) => match base.as_ref() {
            Expr::Symbol(name) if *name == var => Ok(*exponent),
            Expr::Ln(_) if exponent.is_integer() => {
                velocity_power(base, var).map_err(|_| non_polynomial(term, var))
            }
            _ => Err(non_polynomial(term, var)),
        },
        Expr::Mul(factors) => {
            let mut power = zero;
            for factor in factors {
                power += velocity_power(factor, var)?;
            }
            Ok(power)
        }
        Expr::Ln(arg) => {
            velocity_power(arg, var).map_err(|_| non_polynomial(term, var))?;
            Ok(zero)
        }
        Expr::Held(inner) => velocity_power(inner, var),
        _ => Err(non_polynomial(term, var)),
    }
}

/// Like [`velocity_power`] but requires an integer power.
pub fn integer_power(term: &Expr, var: &str) -> Result<i64, SymbolicError> {
    let power = velocity_power(term, var)?;
    if power.is_integer() {
        Ok(power.to_integer())
    } else {
        Err(SymbolicError::NonIntegerPower {
            variable: var.to_string(),
            power: format!("{}/{}", power.numer(), power.denom()),
            term: term.to_string(),
        })
    }
}

fn non_polynomial(term: &Expr, var: &str) -> SymbolicError {
    SymbolicError::NonPolynomial {
        variable: var.to_string(),
        term: term.to_string(),
    }
}

/// Removes the `var^power` factor from a term.
pub(crate) fn strip_power(term: Expr, var: &'static str, power: Rational64) -> Expr {
    if power == Rational64::from_integer(0) {
        return term;
    }
    simplify_product(vec![term, Expr::pow(Expr::Symbol(var), -power)])
}

/// Coefficients `[c0, c1, …, cK]` of `expr` as a polynomial in `var`.
///
/// The expression is fully expanded first. `c0` is the residual: the
/// expansion minus every positive-power term, so terms at negative powers of
/// `var` stay there with their powers. For `i >= 1`, `ci` is the sum of the
/// power-`i` terms with `var^i` divided out; `ln(var)` factors stay in the
/// coefficient.
///
/// Scanning stops at `max_power`, or once `max_gap` consecutive zero
/// coefficients have been seen (`max_gap == 0` never stops early). Trailing
/// zero coefficients are not returned.
pub fn collect_by_power(
    expr: &Expr,
    var: &'static str,
    max_power: u32,
    max_gap: u32,
) -> Result<Vec<Expr>, SymbolicError> {
    let expanded = expr.expand();
    let mut by_power: BTreeMap<i64, Vec<Expr>> = BTreeMap::new();
    let mut positive_terms = Vec::new();
    for term in terms_of(&expanded) {
        let power = integer_power(&term, var)?;
        if power > 0 {
            positive_terms.push(term.clone());
            by_power
                .entry(power)
                .or_default()
                .push(strip_power(term, var, Rational64::from_integer(power)));
        }
    }

    let mut coefficients = Vec::new();
    let mut zero_run = 0usize;
    for i in 1..=i64::from(max_power) {
        let coefficient = simplify_sum(by_power.remove(&i).unwrap_or_default());
        if coefficient.is_zero() {
            zero_run += 1;
        } else {
            zero_run = 0;
        }
        coefficients.push(coefficient);
        if max_gap > 0 && zero_run >= max_gap as usize {
            break;
        }
    }
    coefficients.truncate(coefficients.len() - zero_run);

    let mut residual = terms_of(&expanded);
    residual.extend(
        positive_terms
            .into_iter()
            .map(|t| simplify_product(vec![Expr::int(-1), t])),
    );
    coefficients.insert(0, simplify_sum(residual));
    Ok(coefficients)
}

/// Keeps the top-level terms of `expr` whose power of `var`, shifted by
/// `offset`, is at most `order`. An unbounded order keeps every term.
///
/// The result is always a flat sum; dropped terms are gone, not zeroed.
pub fn pn_expansion(
    expr: &Expr,
    var: &str,
    offset: i64,
    order: PnOrder,
) -> Result<Expr, SymbolicError> {
    if order.is_unbounded() {
        return Ok(flatten_sum(expr));
    }
    let shift = Rational64::from_integer(offset);
    let mut kept = Vec::new();
    for term in flatten_terms(expr) {
        if order.includes_rational(velocity_power(&term, var)? + shift) {
            kept.push(term);
        }
    }
    Ok(match kept.len() {
        0 => Expr::zero(),
        1 => kept.remove(0),
        _ => Expr::Add(kept),
    })
}
