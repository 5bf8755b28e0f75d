use pn_core::derivatives::binding_energy_deriv;
use pn_core::formulas::binding_energy;
use pn_core::symbolic::Expr;
use pn_core::{
    collect_by_power, orbital_evolution, pn_expansion, symbolic_pn_system, ApproximantKind,
    BinaryParameters, EvolutionSettings, PnOrder, Termination,
};

fn parameters() -> BinaryParameters {
    BinaryParameters {
        m1: 0.55,
        m2: 0.45,
        chi1: [0.1, 0.0, 0.3],
        chi2: [0.0, 0.2, -0.1],
        omega_i: 0.3f64.powi(3),
        omega_e: Some(0.32f64.powi(3)),
        ..BinaryParameters::default()
    }
}

fn settings(approximant: ApproximantKind) -> EvolutionSettings {
    EvolutionSettings {
        approximant,
        quiet: true,
        ..EvolutionSettings::default()
    }
}

#[test]
fn taylor_t1_and_t4_evolutions_are_close() {
    let t1 = orbital_evolution::<7>(&parameters(), &settings(ApproximantKind::TaylorT1)).unwrap();
    let t4 = orbital_evolution::<7>(&parameters(), &settings(ApproximantKind::TaylorT4)).unwrap();
    for solution in [&t1, &t4] {
        assert_eq!(solution.termination, Some(Termination::ForwardTargetReached));
        assert!(solution.states.iter().flatten().all(|x| x.is_finite()));
    }

    let duration = |s: &pn_core::Solution| *s.t.last().unwrap();
    let phase = |s: &pn_core::Solution| *s.phase().last().unwrap();
    let relative = |a: f64, b: f64| (a - b).abs() / a.abs();
    assert!(relative(duration(&t1), duration(&t4)) < 0.05);
    assert!(relative(phase(&t1), phase(&t4)) < 0.05);
    assert!(phase(&t1) > 1.0);
}

#[test]
fn higher_order_runs_see_tidal_terms() {
    let point = orbital_evolution::<10>(&parameters(), &settings(ApproximantKind::TaylorT1)).unwrap();
    let tidal = BinaryParameters {
        lambda1: 400.0,
        lambda2: 600.0,
        ..parameters()
    };
    let deformed = orbital_evolution::<10>(&tidal, &settings(ApproximantKind::TaylorT1)).unwrap();
    let end = |s: &pn_core::Solution| *s.t.last().unwrap();
    assert_ne!(end(&point), end(&deformed));
    let system = deformed.pnsystem::<10>(0).unwrap();
    assert_eq!(system.parameters(), &[400.0, 600.0]);
}

#[test]
fn symbolic_queries_through_the_public_api() {
    let energy = binding_energy(symbolic_pn_system());
    let truncated = pn_expansion(
        &energy.expand().strip_held(),
        "v",
        -2,
        PnOrder::from_half_orders(2),
    )
    .unwrap();
    let coefficients = collect_by_power(&truncated, "v", 6, 3).unwrap();
    assert_eq!(coefficients.len(), 5);
    assert!(coefficients[0].is_zero());
    assert!(coefficients[1].is_zero());
    assert!(!coefficients[2].is_zero());
    assert!(coefficients[3].is_zero());
    assert!(!coefficients[4].contains_symbol("S_ell"));

    let derivative = binding_energy_deriv().unwrap();
    assert!(derivative.expression().contains_symbol("v"));
    assert_ne!(*derivative.expression(), Expr::zero());
}
