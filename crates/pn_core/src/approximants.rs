//! Approximant catalog: right-hand sides of the orbital evolution equations.
//!
//! All approximants share the precession equations and differ only in how
//! `dv/dt` is built from the flux and the binding energy.

use crate::derivatives::{binding_energy_deriv, taylor_t4_vdot, GeneratedFunction};
use crate::expansion::PnOrder;
use crate::formulas::{energy_flux, frame_derivative, orbital_frequency, spin_precession};
use crate::system::{PNSystem, STATE_LEN};
use crate::termination::causes_domain_error;
use crate::traits::{DynamicalSystem, Representation};
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ApproximantKind {
    /// `dv/dt = -𝓕 / (d𝓔/dv)`, numerator and denominator truncated separately.
    #[default]
    TaylorT1,
    /// The same ratio re-expanded as one series in `v` and truncated.
    TaylorT4,
}

impl ApproximantKind {
    pub const ALL: [ApproximantKind; 2] = [ApproximantKind::TaylorT1, ApproximantKind::TaylorT4];

    pub fn name(self) -> &'static str {
        match self {
            ApproximantKind::TaylorT1 => "TaylorT1",
            ApproximantKind::TaylorT4 => "TaylorT4",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.name() == name)
    }
}

impl fmt::Display for ApproximantKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Full time derivative of the state given `dv/dt`.
///
/// Masses are constant, spins precess about the orbital angular momentum,
/// the frame rotates with the orbit and `dΦ/dt = v³/M`.
pub fn state_derivative<R: Representation, const PN_ORDER: u32>(
    pnsystem: &PNSystem<R, PN_ORDER>,
    vdot: R,
) -> [R; STATE_LEN] {
    let ([c1x, c1y, c1z], [c2x, c2y, c2z]) = spin_precession(pnsystem);
    let [rw, rx, ry, rz] = frame_derivative(pnsystem);
    [
        R::zero(),
        R::zero(),
        c1x,
        c1y,
        c1z,
        c2x,
        c2y,
        c2z,
        rw,
        rx,
        ry,
        rz,
        vdot,
        orbital_frequency(pnsystem),
    ]
}

/// A numeric approximant with its generated functions resolved.
#[derive(Debug, Clone, Copy)]
pub struct Approximant {
    kind: ApproximantKind,
    energy_deriv: &'static GeneratedFunction,
    series: Option<&'static GeneratedFunction>,
}

impl Approximant {
    /// Builds `kind`, running the symbolic pipeline for it if this is the
    /// first use. TaylorT4 series are built up to `max_order`.
    pub fn new(kind: ApproximantKind, max_order: PnOrder) -> Result<Self> {
        let energy_deriv = binding_energy_deriv()
            .with_context(|| format!("Failed to build the {kind} approximant"))?;
        let series = match kind {
            ApproximantKind::TaylorT1 => None,
            ApproximantKind::TaylorT4 => Some(
                taylor_t4_vdot(max_order)
                    .with_context(|| format!("Failed to build the {kind} approximant"))?,
            ),
        };
        Ok(Self {
            kind,
            energy_deriv,
            series,
        })
    }

    /// Looks an approximant up by name.
    pub fn from_name(name: &str, max_order: PnOrder) -> Result<Self> {
        let Some(kind) = ApproximantKind::from_name(name) else {
            let known: Vec<_> = ApproximantKind::ALL.iter().map(|k| k.name()).collect();
            bail!("Unknown approximant '{}' (expected one of {})", name, known.join(", "));
        };
        Self::new(kind, max_order)
    }

    pub fn kind(&self) -> ApproximantKind {
        self.kind
    }

    /// `dv/dt` at the system's PN order.
    pub fn vdot<const PN_ORDER: u32>(&self, pnsystem: &PNSystem<f64, PN_ORDER>) -> f64 {
        match self.series {
            Some(series) => series.evaluate(pnsystem),
            None => -energy_flux(pnsystem) / self.energy_deriv.evaluate(pnsystem),
        }
    }

    pub fn rhs<const PN_ORDER: u32>(&self, pnsystem: &PNSystem<f64, PN_ORDER>) -> [f64; STATE_LEN] {
        state_derivative(pnsystem, self.vdot(pnsystem))
    }
}

/// Adapts an approximant at a fixed PN order to [`DynamicalSystem`].
#[derive(Debug, Clone, Copy)]
pub struct PnDynamics<const PN_ORDER: u32> {
    approximant: Approximant,
    lambda1: f64,
    lambda2: f64,
}

impl<const PN_ORDER: u32> PnDynamics<PN_ORDER> {
    pub fn new(kind: ApproximantKind, lambda1: f64, lambda2: f64) -> Result<Self> {
        Ok(Self {
            approximant: Approximant::new(kind, PnOrder::from_half_orders(PN_ORDER))?,
            lambda1,
            lambda2,
        })
    }

    pub fn approximant(&self) -> &Approximant {
        &self.approximant
    }

    pub fn pnsystem(&self, x: &[f64]) -> Option<PNSystem<f64, PN_ORDER>> {
        PNSystem::from_slice(x, self.lambda1, self.lambda2)
    }
}

impl<const PN_ORDER: u32> DynamicalSystem<f64> for PnDynamics<PN_ORDER> {
    fn dimension(&self) -> usize {
        STATE_LEN
    }

    fn apply(&self, _t: f64, x: &[f64], out: &mut [f64]) {
        let Some(pnsystem) = self.pnsystem(x) else {
            out.fill(f64::NAN);
            return;
        };
        if causes_domain_error(out, &pnsystem) {
            return;
        }
        out.copy_from_slice(&self.approximant.rhs(&pnsystem));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symbolic::Expr;
    use crate::system::symbolic_pn_system;

    fn state(v: f64) -> [f64; STATE_LEN] {
        [0.6, 0.4, 0.1, 0.2, 0.3, -0.2, 0.1, 0.4, 1.0, 0.0, 0.0, 0.0, v, 0.0]
    }

    fn assert_err_contains<T: fmt::Debug>(result: Result<T>, needle: &str) {
        let err = result.expect_err("expected an error");
        let message = format!("{err:#}");
        assert!(message.contains(needle), "'{message}' does not contain '{needle}'");
    }

    #[test]
    fn catalog_is_keyed_by_name() {
        for kind in ApproximantKind::ALL {
            assert_eq!(ApproximantKind::from_name(kind.name()), Some(kind));
        }
        assert_eq!(ApproximantKind::from_name("TaylorT5"), None);
        let approximant = Approximant::from_name("TaylorT1", PnOrder::from_half_orders(7)).unwrap();
        assert_eq!(approximant.kind(), ApproximantKind::TaylorT1);
        assert_err_contains(
            Approximant::from_name("TaylorT5", PnOrder::from_half_orders(7)),
            "Unknown approximant 'TaylorT5'",
        );
    }

    #[test]
    fn taylor_t1_and_t4_coincide_at_newtonian_order() {
        let pn = PNSystem::<f64, 0>::new(state(0.2));
        let t1 = PnDynamics::<0>::new(ApproximantKind::TaylorT1, 0.0, 0.0).unwrap();
        let t4 = PnDynamics::<0>::new(ApproximantKind::TaylorT4, 0.0, 0.0).unwrap();
        let (a, b) = (t1.approximant().vdot(&pn), t4.approximant().vdot(&pn));
        assert!((a - b).abs() < 1e-12 * a.abs());
    }

    #[test]
    fn taylor_t1_and_t4_agree_at_low_velocity() {
        let pn = PNSystem::<f64, 7>::new(state(0.08));
        let t1 = PnDynamics::<7>::new(ApproximantKind::TaylorT1, 0.0, 0.0).unwrap();
        let t4 = PnDynamics::<7>::new(ApproximantKind::TaylorT4, 0.0, 0.0).unwrap();
        let (a, b) = (t1.approximant().vdot(&pn), t4.approximant().vdot(&pn));
        assert!(a > 0.0 && b > 0.0);
        assert!((a - b).abs() < 1e-4 * a, "{a} vs {b}");
    }

    #[test]
    fn right_hand_side_structure() {
        let dynamics = PnDynamics::<7>::new(ApproximantKind::TaylorT1, 0.0, 0.0).unwrap();
        let x = state(0.3);
        let mut out = [0.0; STATE_LEN];
        dynamics.apply(0.0, &x, &mut out);
        assert_eq!(out[0], 0.0);
        assert_eq!(out[1], 0.0);
        assert!((out[13] - 0.027).abs() < 1e-15);
        assert!(out[12] > 0.0);
        let frame_rate: f64 = x[8..12].iter().zip(&out[8..12]).map(|(r, d)| r * d).sum();
        assert!(frame_rate.abs() < 1e-15);
    }

    #[test]
    fn out_of_domain_states_poison_the_derivative() {
        let dynamics = PnDynamics::<7>::new(ApproximantKind::TaylorT4, 0.0, 0.0).unwrap();
        let mut x = state(0.3);
        x[1] = -0.4;
        let mut out = [0.0; STATE_LEN];
        dynamics.apply(0.0, &x, &mut out);
        assert!(out.iter().all(|d| d.is_nan()));

        let mut out = [0.0; STATE_LEN];
        dynamics.apply(0.0, &x[..5], &mut out);
        assert!(out.iter().all(|d| d.is_nan()));
    }

    #[test]
    fn state_derivative_is_dual_mode() {
        let vdot = Expr::symbol("vdot");
        let derivative = state_derivative(symbolic_pn_system(), vdot.clone());
        assert!(derivative[0].is_zero());
        assert_eq!(derivative[12], vdot);
        let phase_rate = derivative[13].simplify();
        assert!(phase_rate.contains_symbol("v") && phase_rate.contains_symbol("M"));
    }
}
