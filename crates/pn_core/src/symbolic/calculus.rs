use super::{rational_to_f64, simplify_product, simplify_sum, Expr, SymbolicError};
use num_rational::Rational64;
use std::collections::HashMap;

impl Expr {
    /// Partial derivative with respect to the symbol `var`, simplified.
    ///
    /// `Held` wrappers are transparent: `d/dx held(u) = du/dx`.
    pub fn diff(&self, var: &str) -> Expr {
        self.derivative(var).simplify()
    }

    fn derivative(&self, var: &str) -> Expr {
        if !self.contains_symbol(var) {
            return Expr::zero();
        }
        match self {
            Expr::Num(_) | Expr::Float(_) | Expr::Constant(_) => Expr::zero(),
            Expr::Symbol(name) => {
                if *name == var {
                    Expr::one()
                } else {
                    Expr::zero()
                }
            }
            Expr::Add(terms) => simplify_sum(terms.iter().map(|t| t.derivative(var)).collect()),
            Expr::Mul(factors) => {
                let mut terms = Vec::with_capacity(factors.len());
                for (i, factor) in factors.iter().enumerate() {
                    let d = factor.derivative(var);
                    if d.is_zero() {
                        continue;
                    }
                    let mut product: Vec<Expr> = factors
                        .iter()
                        .enumerate()
                        .filter(|(j, _)| *j != i)
                        .map(|(_, f)| f.clone())
                        .collect();
                    product.push(d);
                    terms.push(simplify_product(product));
                }
                simplify_sum(terms)
            }
            Expr::Pow(base, exponent) => {
                let d = base.derivative(var);
                let scale = Expr::rational(*exponent.numer(), *exponent.denom());
                let reduced = Expr::pow(
                    base.as_ref().clone(),
                    *exponent - Rational64::from_integer(1),
                );
                simplify_product(vec![scale, reduced, d])
            }
            Expr::Ln(arg) => {
                let d = arg.derivative(var);
                simplify_product(vec![d, Expr::powi(arg.as_ref().clone(), -1)])
            }
            Expr::Held(inner) => inner.derivative(var),
        }
    }

    /// Replaces symbols by the bound expressions. With `fold` the result is
    /// simplified, otherwise the tree keeps its shape.
    pub fn substitute(&self, bindings: &HashMap<&str, Expr>, fold: bool) -> Expr {
        let replaced = self.replace_symbols(bindings);
        if fold {
            replaced.simplify()
        } else {
            replaced
        }
    }

    fn replace_symbols(&self, bindings: &HashMap<&str, Expr>) -> Expr {
        match self {
            Expr::Symbol(name) => bindings.get(*name).cloned().unwrap_or_else(|| self.clone()),
            Expr::Num(_) | Expr::Float(_) | Expr::Constant(_) => self.clone(),
            Expr::Add(terms) => Expr::Add(terms.iter().map(|t| t.replace_symbols(bindings)).collect()),
            Expr::Mul(factors) => {
                Expr::Mul(factors.iter().map(|f| f.replace_symbols(bindings)).collect())
            }
            Expr::Pow(base, exponent) => Expr::pow(base.replace_symbols(bindings), *exponent),
            Expr::Ln(arg) => Expr::log(arg.replace_symbols(bindings)),
            Expr::Held(inner) => Expr::held(inner.replace_symbols(bindings)),
        }
    }

    /// Numerically evaluates the tree. Every symbol must be resolved by
    /// `lookup`.
    pub fn evaluate(&self, lookup: &dyn Fn(&str) -> Option<f64>) -> Result<f64, SymbolicError> {
        match self {
            Expr::Num(r) => Ok(rational_to_f64(r)),
            Expr::Float(x) => Ok(x.0),
            Expr::Constant(c) => Ok(c.value()),
            Expr::Symbol(name) => {
                lookup(name).ok_or_else(|| SymbolicError::UnknownSymbol(name.to_string()))
            }
            Expr::Add(terms) => {
                let mut total = 0.0;
                for term in terms {
                    total += term.evaluate(lookup)?;
                }
                Ok(total)
            }
            Expr::Mul(factors) => {
                let mut total = 1.0;
                for factor in factors {
                    total *= factor.evaluate(lookup)?;
                }
                Ok(total)
            }
            Expr::Pow(base, exponent) => {
                let b = base.evaluate(lookup)?;
                if exponent.is_integer() {
                    let n = exponent.to_integer();
                    match i32::try_from(n) {
                        Ok(n) => Ok(b.powi(n)),
                        Err(_) => Ok(b.powf(n as f64)),
                    }
                } else {
                    Ok(b.powf(*exponent.numer() as f64 / *exponent.denom() as f64))
                }
            }
            Expr::Ln(arg) => Ok(arg.evaluate(lookup)?.ln()),
            Expr::Held(inner) => inner.evaluate(lookup),
        }
    }

    /// Removes every `Held` wrapper and lets the simplifier fold what it
    /// protected.
    pub fn strip_held(&self) -> Expr {
        self.unwrap_held().simplify()
    }

    fn unwrap_held(&self) -> Expr {
        match self {
            Expr::Held(inner) => inner.unwrap_held(),
            Expr::Add(terms) => Expr::Add(terms.iter().map(Expr::unwrap_held).collect()),
            Expr::Mul(factors) => Expr::Mul(factors.iter().map(Expr::unwrap_held).collect()),
            Expr::Pow(base, exponent) => Expr::pow(base.unwrap_held(), *exponent),
            Expr::Ln(arg) => Expr::log(arg.unwrap_held()),
            other => other.clone(),
        }
    }

    pub fn contains_symbol(&self, name: &str) -> bool {
        match self {
            Expr::Symbol(s) => *s == name,
            Expr::Num(_) | Expr::Float(_) | Expr::Constant(_) => false,
            Expr::Add(items) | Expr::Mul(items) => items.iter().any(|e| e.contains_symbol(name)),
            Expr::Pow(inner, _) | Expr::Ln(inner) | Expr::Held(inner) => inner.contains_symbol(name),
        }
    }
}
