use super::r;
use crate::expansion::PnExpansion;
use crate::symbolic::Constant;
use crate::system::{convert_for_system, PNSystem};
use crate::traits::Representation;
use crate::variables::{
    chi1_chi2, chi1_ell, chi2_ell, delta, lambda1, lambda2, nu, s_ell, sigma_ell, total_mass, v,
    x1, x2,
};

/// Binding energy `𝓔 = -½ M ν v² (1 + Σ e_k v^k)`.
///
/// Non-spinning terms through 4PN, spin-orbit through 3.5PN, leading
/// spin-spin at 2PN and the leading tidal term at 5PN.
pub fn binding_energy<R: Representation, const PN_ORDER: u32>(pn: &PNSystem<R, PN_ORDER>) -> R {
    let m = total_mass(pn);
    let nu = nu(pn);
    let v = v(pn);
    let delta = delta(pn);
    let s_ell = s_ell(pn);
    let sigma_ell = sigma_ell(pn);
    let pi = convert_for_system(pn, Constant::Pi);
    let gamma_e = convert_for_system(pn, Constant::EulerGamma);
    let pi2 = || pi.clone() * pi.clone();

    let series = PnExpansion::new(pn.pn_order())
        .term(0, || R::one())
        .term(2, || (r::<R>(-3, 4) - nu.clone() / r(12, 1)) * v.powi(2))
        .term(3, || {
            (r::<R>(14, 3) * s_ell.clone() + r::<R>(2, 1) * delta.clone() * sigma_ell.clone())
                * v.powi(3)
        })
        .term(4, || {
            let spin_spin = nu.clone()
                * (chi1_chi2(pn) - r::<R>(3, 1) * chi1_ell(pn) * chi2_ell(pn));
            (r::<R>(-27, 8) + r::<R>(19, 8) * nu.clone() - nu.powi(2) / r(24, 1) + spin_spin)
                * v.powi(4)
        })
        .term(5, || {
            ((r::<R>(11, 1) - r::<R>(61, 9) * nu.clone()) * s_ell.clone()
                + (r::<R>(3, 1) - r::<R>(10, 3) * nu.clone()) * delta.clone() * sigma_ell.clone())
                * v.powi(5)
        })
        .term(6, || {
            (r::<R>(-675, 64)
                + (r::<R>(34445, 576) - r::<R>(205, 96) * pi2()) * nu.clone()
                - r::<R>(155, 96) * nu.powi(2)
                - r::<R>(35, 5184) * nu.powi(3))
                * v.powi(6)
        })
        .term(7, || {
            ((r::<R>(135, 4) - r::<R>(367, 4) * nu.clone() + r::<R>(29, 12) * nu.powi(2))
                * s_ell.clone()
                + (r::<R>(27, 4) - r::<R>(39, 1) * nu.clone() + r::<R>(5, 4) * nu.powi(2))
                    * delta.clone()
                    * sigma_ell.clone())
                * v.powi(7)
        })
        .term(8, || {
            let log_term = (r::<R>(16, 1) * v.powi(2)).ln();
            (r::<R>(-3969, 128)
                + (r::<R>(-123671, 5760)
                    + r::<R>(9037, 1536) * pi2()
                    + r::<R>(896, 15) * gamma_e.clone()
                    + r::<R>(448, 15) * log_term)
                    * nu.clone()
                + (r::<R>(-498449, 3456) + r::<R>(3157, 576) * pi2()) * nu.powi(2)
                + r::<R>(301, 1728) * nu.powi(3)
                + r::<R>(77, 31104) * nu.powi(4))
                * v.powi(8)
        })
        .term(10, || {
            let (x1, x2) = (x1(pn), x2(pn));
            r::<R>(-9, 1)
                * (x2.clone() * x1.powi(4) * lambda1(pn) + x1 * x2.powi(4) * lambda2(pn))
                * v.powi(10)
        })
        .sum();

    r::<R>(-1, 2) * m * nu.clone() * v.powi(2) * series
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symbolic::Expr;
    use crate::system::symbolic_pn_system;

    fn circular(v: f64) -> [f64; crate::system::STATE_LEN] {
        [0.6, 0.4, 0.1, 0.2, 0.3, -0.2, 0.1, 0.4, 1.0, 0.0, 0.0, 0.0, v, 0.0]
    }

    #[test]
    fn newtonian_limit() {
        let pn = PNSystem::<f64, 0>::new(circular(0.1));
        let expected = -0.5 * 0.24 * 0.01;
        assert!((binding_energy(&pn) - expected).abs() < 1e-17);
    }

    #[test]
    fn higher_orders_are_small_corrections() {
        let e0 = binding_energy(&PNSystem::<f64, 0>::new(circular(0.1)));
        let e8 = binding_energy(&PNSystem::<f64, 8>::new(circular(0.1)));
        let relative = (e8 - e0) / e0;
        assert!(relative.abs() < 0.05, "relative correction {relative}");
        assert!(relative.abs() > 1e-4);
    }

    #[test]
    fn truncated_terms_are_absent_from_the_expression() {
        let full = binding_energy(symbolic_pn_system());
        assert!(full.contains_symbol("Lambda1"));
        let low = binding_energy(&symbolic_pn_system().at_order::<4>());
        assert!(!low.contains_symbol("Lambda1"));
        assert!(low.contains_symbol("S_ell"));
        assert!(low.contains_symbol("chi1_chi2"));
        let printed = format!("{}", full.simplify());
        assert!(printed.contains("held(π)"));
        assert_ne!(low.simplify(), Expr::zero());
    }
}
