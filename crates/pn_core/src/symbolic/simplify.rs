use super::{rational_to_f64, Constant, Expr, Real};
use num_bigint::BigInt;
use num_rational::{BigRational, Rational64};
use num_traits::{One, Zero};
use std::collections::BTreeMap;

/// A folded numeric value: exact while every contributor is exact.
#[derive(Debug, Clone)]
enum Numeric {
    Exact(BigRational),
    Approx(f64),
}

impl Numeric {
    fn from_expr(expr: &Expr) -> Option<Numeric> {
        match expr {
            Expr::Num(r) => Some(Numeric::Exact(r.clone())),
            Expr::Float(x) => Some(Numeric::Approx(x.0)),
            _ => None,
        }
    }

    fn to_f64(&self) -> f64 {
        match self {
            Numeric::Exact(r) => rational_to_f64(r),
            Numeric::Approx(x) => *x,
        }
    }

    fn add(self, other: Numeric) -> Numeric {
        match (self, other) {
            (Numeric::Exact(a), Numeric::Exact(b)) => Numeric::Exact(a + b),
            (a, b) => Numeric::Approx(a.to_f64() + b.to_f64()),
        }
    }

    fn mul(self, other: Numeric) -> Numeric {
        match (self, other) {
            (Numeric::Exact(a), Numeric::Exact(b)) => Numeric::Exact(a * b),
            (a, b) => Numeric::Approx(a.to_f64() * b.to_f64()),
        }
    }

    fn is_zero(&self) -> bool {
        match self {
            Numeric::Exact(r) => r.is_zero(),
            Numeric::Approx(x) => *x == 0.0,
        }
    }

    fn is_one(&self) -> bool {
        matches!(self, Numeric::Exact(r) if r.is_one())
    }

    fn into_expr(self) -> Expr {
        match self {
            Numeric::Exact(r) => Expr::Num(r),
            Numeric::Approx(x) => Expr::Float(Real(x)),
        }
    }
}

fn rational_powi(base: &BigRational, exponent: i64) -> Option<BigRational> {
    if base.is_zero() && exponent < 0 {
        return None;
    }
    let mut result = BigRational::one();
    for _ in 0..exponent.unsigned_abs() {
        result *= base;
    }
    if exponent < 0 {
        Some(result.recip())
    } else {
        Some(result)
    }
}

fn exponent_to_f64(exponent: Rational64) -> f64 {
    *exponent.numer() as f64 / *exponent.denom() as f64
}

/// Splits a canonical term into its numeric coefficient and the remaining
/// factors.
fn split_coefficient(term: Expr) -> (Numeric, Expr) {
    match term {
        Expr::Mul(mut factors) if factors.first().map_or(false, Expr::is_numeric) => {
            let head = factors.remove(0);
            let coefficient = Numeric::from_expr(&head).unwrap_or(Numeric::Exact(BigRational::one()));
            let rest = if factors.len() == 1 {
                factors.remove(0)
            } else {
                Expr::Mul(factors)
            };
            (coefficient, rest)
        }
        other => (Numeric::Exact(BigRational::one()), other),
    }
}

fn attach_coefficient(coefficient: Numeric, rest: Expr) -> Expr {
    if coefficient.is_one() {
        return rest;
    }
    let mut factors = vec![coefficient.into_expr()];
    match rest {
        Expr::Mul(inner) => factors.extend(inner),
        other => factors.push(other),
    }
    Expr::Mul(factors)
}

/// The additive terms of a canonical expression.
pub(crate) fn terms_of(expr: &Expr) -> Vec<Expr> {
    match expr {
        Expr::Add(terms) => terms.clone(),
        e if e.is_zero() => Vec::new(),
        e => vec![e.clone()],
    }
}

/// Canonical sum of already-simplified terms: nested sums flattened, numbers
/// folded, like terms combined.
pub(crate) fn simplify_sum(terms: Vec<Expr>) -> Expr {
    let mut numeric: Option<Numeric> = None;
    let mut numeric_count = 0usize;
    let mut constants: Vec<Constant> = Vec::new();
    let mut groups: BTreeMap<Expr, Numeric> = BTreeMap::new();

    let mut pending = terms;
    while let Some(term) = pending.pop() {
        match term {
            Expr::Add(inner) => pending.extend(inner),
            Expr::Num(ref r) if r.is_zero() => {}
            Expr::Num(_) | Expr::Float(_) => {
                let value = Numeric::from_expr(&term).unwrap_or(Numeric::Approx(f64::NAN));
                numeric_count += 1;
                numeric = Some(match numeric {
                    Some(acc) => acc.add(value),
                    None => value,
                });
            }
            Expr::Constant(c) => constants.push(c),
            other => {
                let (coefficient, rest) = split_coefficient(other);
                let entry = groups
                    .entry(rest)
                    .or_insert(Numeric::Exact(BigRational::zero()));
                *entry = entry.clone().add(coefficient);
            }
        }
    }

    if constants.len() == 1 && numeric_count == 0 {
        let entry = groups
            .entry(Expr::Constant(constants[0]))
            .or_insert(Numeric::Exact(BigRational::zero()));
        *entry = entry.clone().add(Numeric::Exact(BigRational::one()));
    } else {
        for c in constants {
            let value = Numeric::Approx(c.value());
            numeric = Some(match numeric {
                Some(acc) => acc.add(value),
                None => value,
            });
        }
    }

    let mut result = Vec::with_capacity(groups.len() + 1);
    if let Some(value) = numeric {
        if !value.is_zero() {
            result.push(value.into_expr());
        }
    }
    for (rest, coefficient) in groups {
        if coefficient.is_zero() {
            continue;
        }
        result.push(attach_coefficient(coefficient, rest));
    }

    match result.len() {
        0 => Expr::zero(),
        1 => result.remove(0),
        _ => Expr::Add(result),
    }
}

/// Canonical product of already-simplified factors: numbers folded into a
/// leading coefficient, equal bases merged by adding exponents.
pub(crate) fn simplify_product(factors: Vec<Expr>) -> Expr {
    let mut coefficient = Numeric::Exact(BigRational::one());
    let mut numeric_count = 0usize;
    let mut constants: Vec<Constant> = Vec::new();
    let mut bases: BTreeMap<Expr, Rational64> = BTreeMap::new();

    let mut pending = factors;
    while let Some(factor) = pending.pop() {
        match factor {
            Expr::Mul(inner) => pending.extend(inner),
            Expr::Num(ref r) if r.is_one() => {}
            Expr::Num(_) | Expr::Float(_) => {
                let value = Numeric::from_expr(&factor).unwrap_or(Numeric::Approx(f64::NAN));
                if value.is_zero() {
                    return Expr::zero();
                }
                numeric_count += 1;
                coefficient = coefficient.mul(value);
            }
            Expr::Constant(c) => constants.push(c),
            Expr::Pow(base, exponent) => {
                *bases.entry(*base).or_insert_with(|| Rational64::from_integer(0)) += exponent;
            }
            other => {
                *bases.entry(other).or_insert_with(|| Rational64::from_integer(0)) +=
                    Rational64::from_integer(1);
            }
        }
    }

    if constants.len() == 1 && numeric_count == 0 {
        *bases
            .entry(Expr::Constant(constants[0]))
            .or_insert_with(|| Rational64::from_integer(0)) += Rational64::from_integer(1);
    } else {
        for c in constants {
            coefficient = coefficient.mul(Numeric::Approx(c.value()));
        }
    }

    let mut result = Vec::with_capacity(bases.len() + 1);
    for (base, exponent) in bases {
        if exponent == Rational64::from_integer(0) {
            continue;
        }
        let factor = simplify_pow(base, exponent);
        match Numeric::from_expr(&factor) {
            Some(value) => coefficient = coefficient.mul(value),
            None => match factor {
                Expr::Mul(inner) => {
                    for f in inner {
                        match Numeric::from_expr(&f) {
                            Some(value) => coefficient = coefficient.mul(value),
                            None => result.push(f),
                        }
                    }
                }
                other => result.push(other),
            },
        }
    }

    if coefficient.is_zero() {
        return Expr::zero();
    }
    if result.is_empty() {
        return coefficient.into_expr();
    }
    result.sort();
    if coefficient.is_one() {
        if result.len() == 1 {
            return result.remove(0);
        }
        return Expr::Mul(result);
    }
    result.insert(0, coefficient.into_expr());
    Expr::Mul(result)
}

/// Canonical power of an already-simplified base. Bases are taken to be
/// positive, so `(x*y)^e = x^e*y^e` and `(x^a)^b = x^(a*b)`.
pub(crate) fn simplify_pow(base: Expr, exponent: Rational64) -> Expr {
    if exponent == Rational64::from_integer(0) {
        return Expr::one();
    }
    if exponent == Rational64::from_integer(1) {
        return base;
    }
    match base {
        Expr::Num(r) => {
            if r.is_one() {
                Expr::one()
            } else if exponent.is_integer() {
                match rational_powi(&r, exponent.to_integer()) {
                    Some(value) => Expr::Num(value),
                    None => Expr::Pow(Box::new(Expr::Num(r)), exponent),
                }
            } else {
                Expr::Pow(Box::new(Expr::Num(r)), exponent)
            }
        }
        Expr::Float(x) => Expr::Float(Real(x.0.powf(exponent_to_f64(exponent)))),
        Expr::Constant(c) => Expr::Float(Real(c.value().powf(exponent_to_f64(exponent)))),
        Expr::Pow(inner, inner_exponent) => simplify_pow(*inner, inner_exponent * exponent),
        Expr::Mul(factors) => simplify_product(
            factors
                .into_iter()
                .map(|f| simplify_pow(f, exponent))
                .collect(),
        ),
        other => Expr::Pow(Box::new(other), exponent),
    }
}

fn simplify_ln(arg: Expr) -> Expr {
    match arg {
        Expr::Num(ref r) if r.is_one() => Expr::zero(),
        Expr::Float(x) => Expr::Float(Real(x.0.ln())),
        Expr::Constant(c) => Expr::Float(Real(c.value().ln())),
        other => Expr::Ln(Box::new(other)),
    }
}

fn multiply_terms(left: &[Expr], right: &[Expr]) -> Vec<Expr> {
    let mut products = Vec::with_capacity(left.len() * right.len());
    for a in left {
        for b in right {
            products.push(simplify_product(vec![a.clone(), b.clone()]));
        }
    }
    terms_of(&simplify_sum(products))
}

fn expand_log(arg: &Expr) -> Vec<Expr> {
    match arg {
        Expr::Mul(factors) => factors.iter().flat_map(expand_log).collect(),
        Expr::Pow(base, exponent) => expand_log(base)
            .into_iter()
            .map(|term| {
                let scale = Expr::Num(BigRational::new(
                    BigInt::from(*exponent.numer()),
                    BigInt::from(*exponent.denom()),
                ));
                simplify_product(vec![scale, term])
            })
            .collect(),
        other => match simplify_ln(other.clone()) {
            e if e.is_zero() => Vec::new(),
            e => vec![e],
        },
    }
}

fn expand_terms(expr: &Expr) -> Vec<Expr> {
    match expr {
        Expr::Add(terms) => terms.iter().flat_map(expand_terms).collect(),
        Expr::Mul(factors) => {
            let mut acc = vec![Expr::one()];
            for factor in factors {
                let factor_terms = expand_terms(factor);
                acc = multiply_terms(&acc, &factor_terms);
                if acc.is_empty() {
                    break;
                }
            }
            acc
        }
        Expr::Pow(base, exponent) if exponent.is_integer() && exponent.to_integer() > 0 => {
            let base_terms = expand_terms(base);
            if base_terms.len() <= 1 {
                let single = base_terms.into_iter().next().unwrap_or_else(Expr::zero);
                return vec![simplify_pow(single, *exponent)];
            }
            let mut acc = vec![Expr::one()];
            for _ in 0..exponent.to_integer() {
                acc = multiply_terms(&acc, &base_terms);
            }
            acc
        }
        Expr::Pow(base, exponent) => vec![simplify_pow(base.expand(), *exponent)],
        Expr::Ln(arg) => expand_log(&arg.expand()),
        Expr::Held(inner) => vec![Expr::Held(Box::new(inner.expand()))],
        other => vec![other.simplify()],
    }
}

impl Expr {
    /// Canonical form without distributing products over sums.
    pub fn simplify(&self) -> Expr {
        match self {
            Expr::Num(_) | Expr::Float(_) | Expr::Constant(_) | Expr::Symbol(_) => self.clone(),
            Expr::Add(terms) => simplify_sum(terms.iter().map(Expr::simplify).collect()),
            Expr::Mul(factors) => simplify_product(factors.iter().map(Expr::simplify).collect()),
            Expr::Pow(base, exponent) => simplify_pow(base.simplify(), *exponent),
            Expr::Ln(arg) => simplify_ln(arg.simplify()),
            Expr::Held(inner) => Expr::Held(Box::new(inner.simplify())),
        }
    }

    /// Fully expanded sum of products. Logarithms of products and powers are
    /// split into sums of logarithms.
    pub fn expand(&self) -> Expr {
        simplify_sum(expand_terms(self))
    }
}
