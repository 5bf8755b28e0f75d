use crate::symbolic::Constant;
use crate::system::PNSystem;
use crate::traits::Representation;
use crate::variables::FundamentalVariable;
use num_traits::{One, Zero};
use std::ops::{Add, AddAssign, Div, DivAssign, Mul, MulAssign, Neg, Sub, SubAssign};

/// Simple Dual Number for Forward Mode AD
/// val: real part
/// eps: infinitesimal part
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct Dual {
    pub val: f64,
    pub eps: f64,
}

impl Dual {
    pub fn new(val: f64, eps: f64) -> Self {
        Self { val, eps }
    }

    pub fn constant(val: f64) -> Self {
        Self::new(val, 0.0)
    }

    pub fn variable(val: f64) -> Self {
        Self::new(val, 1.0)
    }
}

impl Zero for Dual {
    fn zero() -> Self {
        Self::new(0.0, 0.0)
    }
    fn is_zero(&self) -> bool {
        self.val == 0.0 && self.eps == 0.0
    }
}

impl One for Dual {
    fn one() -> Self {
        Self::new(1.0, 0.0)
    }
}

impl Add for Dual {
    type Output = Self;
    fn add(self, rhs: Self) -> Self {
        Self::new(self.val + rhs.val, self.eps + rhs.eps)
    }
}

impl Sub for Dual {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self {
        Self::new(self.val - rhs.val, self.eps - rhs.eps)
    }
}

impl Mul for Dual {
    type Output = Self;
    fn mul(self, rhs: Self) -> Self {
        Self::new(self.val * rhs.val, self.val * rhs.eps + self.eps * rhs.val)
    }
}

impl Div for Dual {
    type Output = Self;
    fn div(self, rhs: Self) -> Self {
        let denom = rhs.val * rhs.val;
        Self::new(
            self.val / rhs.val,
            (self.eps * rhs.val - self.val * rhs.eps) / denom,
        )
    }
}

impl Neg for Dual {
    type Output = Self;
    fn neg(self) -> Self {
        Self::new(-self.val, -self.eps)
    }
}

impl AddAssign for Dual {
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}
impl SubAssign for Dual {
    fn sub_assign(&mut self, rhs: Self) {
        *self = *self - rhs;
    }
}
impl MulAssign for Dual {
    fn mul_assign(&mut self, rhs: Self) {
        *self = *self * rhs;
    }
}
impl DivAssign for Dual {
    fn div_assign(&mut self, rhs: Self) {
        *self = *self / rhs;
    }
}

impl Representation for Dual {
    fn from_f64(value: f64) -> Self {
        Self::constant(value)
    }

    fn ratio(numer: i128, denom: i128) -> Self {
        Self::constant(numer as f64 / denom as f64)
    }

    fn held(constant: Constant) -> Self {
        Self::constant(constant.value())
    }

    fn powi(&self, n: i32) -> Self {
        if n == 0 {
            return Self::constant(1.0);
        }
        let val_n_minus_1 = self.val.powi(n - 1);
        Self::new(val_n_minus_1 * self.val, n as f64 * val_n_minus_1 * self.eps)
    }

    fn sqrt(&self) -> Self {
        let s = self.val.sqrt();
        Self::new(s, self.eps / (2.0 * s))
    }

    fn ln(&self) -> Self {
        Self::new(self.val.ln(), self.eps / self.val)
    }

    fn derived<F: FnOnce() -> Self>(_name: &'static str, compute: F) -> Self {
        compute()
    }

    fn causes_domain_error<const PN_ORDER: u32>(
        derivative: &mut [Self],
        pnsystem: &PNSystem<Self, PN_ORDER>,
    ) -> bool {
        let out_of_domain = crate::termination::numeric_domain_error(pnsystem.state(), |x| x.val);
        if out_of_domain {
            derivative.fill(Self::new(f64::NAN, f64::NAN));
        }
        out_of_domain
    }
}

/// Value and exact derivative of `formula` with respect to one fundamental
/// variable, everything else held fixed.
pub fn partial_derivative<const PN_ORDER: u32, F>(
    pnsystem: &PNSystem<f64, PN_ORDER>,
    wrt: FundamentalVariable,
    formula: F,
) -> (f64, f64)
where
    F: Fn(&PNSystem<Dual, PN_ORDER>) -> Dual,
{
    let seeded = pnsystem.map(|index, x| {
        if index == wrt.index() {
            Dual::variable(*x)
        } else {
            Dual::constant(*x)
        }
    });
    let result = formula(&seeded);
    (result.val, result.eps)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chain_rule_through_powers_and_logs() {
        let x = Dual::variable(0.3);
        let y = x.powi(3) * x.ln() + x.sqrt();
        let expected = 3.0 * 0.09 * 0.3f64.ln() + 0.09 + 0.5 / 0.3f64.sqrt();
        assert!((y.eps - expected).abs() < 1e-14);
    }

    #[test]
    fn negative_powers() {
        let x = Dual::variable(2.0);
        let y = x.powi(-2);
        assert!((y.val - 0.25).abs() < 1e-15);
        assert!((y.eps + 0.25).abs() < 1e-15);
    }

    #[test]
    fn constants_carry_no_derivative() {
        let c = <Dual as Representation>::held(Constant::Pi);
        assert_eq!(c.eps, 0.0);
        assert_eq!(<Dual as Representation>::ratio(3, 4).val, 0.75);
    }
}
