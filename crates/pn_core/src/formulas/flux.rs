use super::r;
use crate::expansion::PnExpansion;
use crate::symbolic::Constant;
use crate::system::{convert_for_system, PNSystem};
use crate::traits::Representation;
use crate::variables::{
    chi1_chi2, chi1_ell, chi2_ell, delta, lambda1, lambda2, nu, s_ell, sigma_ell, v, x1, x2,
};

/// Gravitational-wave energy flux `𝓕 = (32/5) ν² v^10 (1 + Σ f_k v^k)`.
///
/// Comparable-mass non-spinning terms through 4.5PN, spin-orbit through 4PN,
/// leading spin-spin at 2PN, the leading tidal term at 5PN, and test-mass
/// terms at 5PN, 5.5PN and 6PN. Tidal heating of the horizons is not included.
pub fn energy_flux<R: Representation, const PN_ORDER: u32>(pn: &PNSystem<R, PN_ORDER>) -> R {
    let nu = nu(pn);
    let v = v(pn);
    let delta = delta(pn);
    let s_ell = s_ell(pn);
    let sigma_ell = sigma_ell(pn);
    let pi = convert_for_system(pn, Constant::Pi);
    let gamma_e = convert_for_system(pn, Constant::EulerGamma);
    let pi2 = || pi.clone() * pi.clone();
    let ln2 = || r::<R>(2, 1).ln();
    let ln3 = || r::<R>(3, 1).ln();
    let ln5 = || r::<R>(5, 1).ln();
    let lnv = || v.ln();
    let zeta3 = convert_for_system(pn, Constant::Zeta3);

    let series = PnExpansion::new(pn.pn_order())
        .term(0, || R::one())
        .term(2, || (r::<R>(-1247, 336) - r::<R>(35, 12) * nu.clone()) * v.powi(2))
        .term(3, || {
            (r::<R>(4, 1) * pi.clone()
                - r::<R>(4, 1) * s_ell.clone()
                - r::<R>(5, 4) * delta.clone() * sigma_ell.clone())
                * v.powi(3)
        })
        .term(4, || {
            let spin_spin = nu.clone() / r(48, 1)
                * (r::<R>(-103, 1) * chi1_chi2(pn)
                    + r::<R>(289, 1) * chi1_ell(pn) * chi2_ell(pn));
            (r::<R>(-44711, 9072) + r::<R>(9271, 504) * nu.clone()
                + r::<R>(65, 18) * nu.powi(2)
                + spin_spin)
                * v.powi(4)
        })
        .term(5, || {
            ((r::<R>(-8191, 672) - r::<R>(583, 24) * nu.clone()) * pi.clone()
                + (r::<R>(-9, 2) + r::<R>(272, 9) * nu.clone()) * s_ell.clone()
                + (r::<R>(-13, 16) + r::<R>(43, 4) * nu.clone()) * delta.clone() * sigma_ell.clone())
                * v.powi(5)
        })
        .term(6, || {
            let log_term = (r::<R>(16, 1) * v.powi(2)).ln();
            (r::<R>(6643739519, 69854400) + r::<R>(16, 3) * pi2()
                - r::<R>(1712, 105) * gamma_e.clone()
                - r::<R>(856, 105) * log_term
                + (r::<R>(-134543, 7776) + r::<R>(41, 48) * pi2()) * nu.clone()
                - r::<R>(94403, 3024) * nu.powi(2)
                - r::<R>(775, 324) * nu.powi(3)
                - r::<R>(16, 1) * pi.clone() * s_ell.clone()
                - r::<R>(31, 6) * pi.clone() * delta.clone() * sigma_ell.clone())
                * v.powi(6)
        })
        .term(7, || {
            ((r::<R>(-16285, 504) + r::<R>(214745, 1728) * nu.clone()
                + r::<R>(193385, 3024) * nu.powi(2))
                * pi.clone()
                + (r::<R>(476645, 6804) + r::<R>(6172, 189) * nu.clone()
                    - r::<R>(2810, 27) * nu.powi(2))
                    * s_ell.clone()
                + (r::<R>(9535, 336) + r::<R>(1849, 126) * nu.clone()
                    - r::<R>(1501, 36) * nu.powi(2))
                    * delta.clone()
                    * sigma_ell.clone())
                * v.powi(7)
        })
        .term(8, || {
            let test_mass = r::<R>(-323105549467, 3178375200)
                + r::<R>(232597, 4410) * gamma_e.clone()
                - r::<R>(1369, 126) * pi2()
                + r::<R>(39931, 294) * ln2()
                - r::<R>(47385, 1568) * ln3()
                + r::<R>(232597, 4410) * lnv();
            let comparable = (r::<R>(-1452202403629, 1466942400)
                + r::<R>(41478, 245) * gamma_e.clone()
                - r::<R>(267127, 4608) * pi2()
                + r::<R>(479062, 2205) * ln2()
                + r::<R>(47385, 392) * ln3()
                + r::<R>(41478, 245) * lnv())
                * nu.clone()
                + (r::<R>(1607125, 6804) - r::<R>(3157, 384) * pi2()) * nu.powi(2)
                + r::<R>(6875, 504) * nu.powi(3)
                + r::<R>(5, 2) * nu.powi(4);
            (test_mass
                + comparable
                + (r::<R>(-3485, 96) + r::<R>(13879, 72) * nu.clone()) * pi.clone() * s_ell.clone()
                + (r::<R>(-7163, 672) + r::<R>(130583, 2016) * nu.clone())
                    * pi.clone()
                    * delta.clone()
                    * sigma_ell.clone())
                * v.powi(8)
        })
        .term(9, || {
            (r::<R>(265978667519, 745113600)
                - r::<R>(6848, 105) * gamma_e.clone()
                - r::<R>(13696, 105) * ln2()
                - r::<R>(6848, 105) * lnv()
                + (r::<R>(2062241, 22176) + r::<R>(41, 12) * pi2()) * nu.clone()
                - r::<R>(133112905, 290304) * nu.powi(2)
                - r::<R>(3719141, 38016) * nu.powi(3))
                * pi.clone()
                * v.powi(9)
        })
        .term(10, || {
            let test_mass = r::<R>(-2500861660823683, 2831932303200)
                + r::<R>(916628467, 7858620) * gamma_e.clone()
                - r::<R>(424223, 6804) * pi2()
                - r::<R>(83217611, 1122660) * ln2()
                + r::<R>(47385, 196) * ln3()
                + r::<R>(916628467, 7858620) * lnv();
            let (x1, x2) = (x1(pn), x2(pn));
            let tidal = (r::<R>(18, 1) - r::<R>(12, 1) * x1.clone()) * x1.powi(4) * lambda1(pn)
                + (r::<R>(18, 1) - r::<R>(12, 1) * x2.clone()) * x2.powi(4) * lambda2(pn);
            (test_mass + tidal) * v.powi(10)
        })
        .term(11, || {
            (r::<R>(8399309750401, 101708006400)
                + r::<R>(177293, 1176) * gamma_e.clone()
                + r::<R>(8521283, 17640) * ln2()
                - r::<R>(142155, 784) * ln3()
                + r::<R>(177293, 1176) * lnv())
                * pi.clone()
                * v.powi(11)
        })
        .term(12, || {
            let euler_log = gamma_e.clone() + r::<R>(2, 1) * ln2() + lnv();
            (r::<R>(2067586193789233570693, 602387400044430000)
                - r::<R>(246137536815857, 157329572400) * (gamma_e.clone() + lnv())
                + r::<R>(1465472, 11025) * euler_log.powi(2)
                - r::<R>(3803225263, 10478160) * pi2()
                + r::<R>(27392, 105) * pi2() * euler_log
                + r::<R>(256, 45) * pi2().powi(2)
                - r::<R>(271272899815409, 157329572400) * ln2()
                - r::<R>(437114506833, 789268480) * ln3()
                - r::<R>(37744140625, 260941824) * ln5()
                - r::<R>(27392, 105) * zeta3.clone())
                * v.powi(12)
        })
        .sum();

    r::<R>(32, 5) * nu.powi(2) * v.powi(10) * series
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expansion::velocity_power;
    use crate::symbolic::Expr;
    use crate::system::{symbolic_pn_system, STATE_LEN};
    use num_rational::Rational64;

    fn state(v: f64) -> [f64; STATE_LEN] {
        [0.5, 0.5, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, v, 0.0]
    }

    #[test]
    fn quadrupole_formula() {
        let pn = PNSystem::<f64, 0>::new(state(0.2));
        let expected = 32.0 / 5.0 * 0.0625 * 0.2f64.powi(10);
        assert!((energy_flux(&pn) - expected).abs() < 1e-20);
    }

    #[test]
    fn one_and_a_half_pn_tail() {
        let x: f64 = 0.2;
        let with_tail = energy_flux(&PNSystem::<f64, 3>::new(state(x)));
        let without = energy_flux(&PNSystem::<f64, 2>::new(state(x)));
        let newtonian = energy_flux(&PNSystem::<f64, 0>::new(state(x)));
        let tail = (with_tail - without) / newtonian;
        assert!((tail - 4.0 * std::f64::consts::PI * x.powi(3)).abs() < 1e-12);
    }

    fn relative_correction<const HIGH: u32, const LOW: u32>(x: f64) -> f64 {
        let high = energy_flux(&PNSystem::<f64, HIGH>::new(state(x)));
        let low = energy_flux(&PNSystem::<f64, LOW>::new(state(x)));
        let newtonian = energy_flux(&PNSystem::<f64, 0>::new(state(x)));
        (high - low) / newtonian
    }

    #[test]
    fn four_pn_terms_include_comparable_mass_corrections() {
        use std::f64::consts::{LN_2, PI};
        let (x, nu): (f64, f64) = (0.2, 0.25);
        let gamma = Constant::EulerGamma.value();
        let (ln3, lnv, pi2) = (3f64.ln(), x.ln(), PI * PI);

        let four = -323105549467.0 / 3178375200.0 + 232597.0 / 4410.0 * gamma
            - 1369.0 / 126.0 * pi2
            + 39931.0 / 294.0 * LN_2
            - 47385.0 / 1568.0 * ln3
            + 232597.0 / 4410.0 * lnv
            + (-1452202403629.0 / 1466942400.0 + 41478.0 / 245.0 * gamma
                - 267127.0 / 4608.0 * pi2
                + 479062.0 / 2205.0 * LN_2
                + 47385.0 / 392.0 * ln3
                + 41478.0 / 245.0 * lnv)
                * nu
            + (1607125.0 / 6804.0 - 3157.0 / 384.0 * pi2) * nu * nu
            + 6875.0 / 504.0 * nu.powi(3)
            + 2.5 * nu.powi(4);
        let expected = four * x.powi(8);
        let correction = relative_correction::<8, 7>(x);
        assert!((correction - expected).abs() < 1e-10 * expected.abs());

        let four_and_a_half = (265978667519.0 / 745113600.0 - 6848.0 / 105.0 * gamma
            - 13696.0 / 105.0 * LN_2
            - 6848.0 / 105.0 * lnv
            + (2062241.0 / 22176.0 + 41.0 / 12.0 * pi2) * nu
            - 133112905.0 / 290304.0 * nu * nu
            - 3719141.0 / 38016.0 * nu.powi(3))
            * PI;
        let expected = four_and_a_half * x.powi(9);
        let correction = relative_correction::<9, 8>(x);
        assert!((correction - expected).abs() < 1e-10 * expected.abs());
    }

    #[test]
    fn six_pn_test_mass_term_carries_squared_logs() {
        use std::f64::consts::{LN_2, PI};
        let x: f64 = 0.2;
        let gamma = Constant::EulerGamma.value();
        let euler_log = gamma + 2.0 * LN_2 + x.ln();
        let pi2 = PI * PI;
        let six = 2067586193789233570693.0 / 602387400044430000.0
            - 246137536815857.0 / 157329572400.0 * (gamma + x.ln())
            + 1465472.0 / 11025.0 * euler_log * euler_log
            - 3803225263.0 / 10478160.0 * pi2
            + 27392.0 / 105.0 * pi2 * euler_log
            + 256.0 / 45.0 * pi2 * pi2
            - 271272899815409.0 / 157329572400.0 * LN_2
            - 437114506833.0 / 789268480.0 * 3f64.ln()
            - 37744140625.0 / 260941824.0 * 5f64.ln()
            - 27392.0 / 105.0 * Constant::Zeta3.value();
        let expected = six * x.powi(12);
        let correction = relative_correction::<12, 11>(x);
        assert!((correction - expected).abs() < 1e-9 * expected.abs());

        let flux = energy_flux(symbolic_pn_system()).expand();
        let squared_log = Expr::powi(Expr::log(Expr::symbol("v")), 2);
        let has_squared_log = crate::symbolic::terms_of(&flux).iter().any(|term| match term {
            Expr::Mul(factors) => factors.contains(&squared_log),
            _ => false,
        });
        assert!(has_squared_log);
    }

    #[test]
    fn symbolic_flux_has_a_term_at_every_power() {
        let flux = energy_flux(symbolic_pn_system()).expand();
        let mut powers = std::collections::BTreeSet::new();
        for term in crate::symbolic::terms_of(&flux) {
            let p = velocity_power(&term, "v").unwrap();
            assert!(p.is_integer());
            powers.insert(p.to_integer());
        }
        let expected: std::collections::BTreeSet<i64> =
            [10, 12, 13, 14, 15, 16, 17, 18, 19, 20, 21, 22].into_iter().collect();
        assert_eq!(powers, expected);
        assert!(flux.contains_symbol("Lambda2"));
        assert_ne!(flux, Expr::zero());
        assert_eq!(
            velocity_power(&Expr::log(Expr::symbol("v")), "v").unwrap(),
            Rational64::from_integer(0)
        );
    }
}
