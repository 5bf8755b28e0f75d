//! Functions generated from symbolic manipulation of the formulas.
//!
//! Each is built once per process: the formula is evaluated against the
//! symbolic system, transformed, compiled into a [`PnExpansionFunction`] and
//! cached. Numeric evaluation afterwards only runs bytecode.

use crate::equation_engine::PnExpansionFunction;
use crate::expansion::{collect_by_power, flatten_sum, pn_expansion, PnOrder};
use crate::formulas::{binding_energy, energy_flux};
use crate::symbolic::{Expr, SymbolicError};
use crate::system::{symbolic_pn_system, PNSystem, SymbolicPNSystem, UNBOUNDED_PN_ORDER};
use std::sync::OnceLock;
use thiserror::Error;
use tracing::debug;

const VELOCITY: &str = "v";

/// Highest relative power of `v` kept in the TaylorT4 quotient.
pub const MAX_TAYLOR_T4_ORDER: u32 = 12;

/// Consecutive zero coefficients after which a series is taken to have ended.
const MAX_GAP: u32 = 3;

/// The symbolic pipeline could not process one of the formulas.
///
/// This is a defect in the formula itself, so it is reported wherever the
/// generated function is first needed and cached thereafter.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("failed to generate `{formula}`")]
pub struct PipelineError {
    pub formula: &'static str,
    #[source]
    pub source: SymbolicError,
}

impl PipelineError {
    fn wrap(formula: &'static str) -> impl Fn(SymbolicError) -> PipelineError {
        move |source| PipelineError { formula, source }
    }
}

/// A compiled function produced by the symbolic pipeline.
#[derive(Debug, Clone)]
pub struct GeneratedFunction {
    name: &'static str,
    expression: Expr,
    function: PnExpansionFunction,
}

impl GeneratedFunction {
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// The flat symbolic sum the function was compiled from.
    pub fn expression(&self) -> &Expr {
        &self.expression
    }

    pub fn function(&self) -> &PnExpansionFunction {
        &self.function
    }

    /// Evaluates the terms kept at the system's PN order.
    pub fn evaluate<const PN_ORDER: u32>(&self, pnsystem: &PNSystem<f64, PN_ORDER>) -> f64 {
        self.function.evaluate(pnsystem)
    }
}

/// Differentiates `formula` with respect to `v`.
///
/// `offset` converts absolute powers of `v` in the result into relative PN
/// powers (the power of the leading term, negated).
pub fn velocity_derivative<F>(
    name: &'static str,
    formula: F,
    offset: i64,
) -> Result<GeneratedFunction, PipelineError>
where
    F: Fn(&SymbolicPNSystem) -> Expr,
{
    let wrap = PipelineError::wrap(name);
    let expression = formula(symbolic_pn_system());
    let derivative = expression.diff(VELOCITY).expand().strip_held();
    let flat = pn_expansion(&flatten_sum(&derivative), VELOCITY, offset, PnOrder::UNBOUNDED)
        .map_err(&wrap)?;
    let function = PnExpansionFunction::compile(&flat, VELOCITY, offset).map_err(&wrap)?;
    debug!(formula = name, terms = function.len(), "generated velocity derivative");
    Ok(GeneratedFunction {
        name,
        expression: flat,
        function,
    })
}

/// `d𝓔/dv`, generated from [`binding_energy`].
pub fn binding_energy_deriv() -> Result<&'static GeneratedFunction, PipelineError> {
    static CACHE: OnceLock<Result<GeneratedFunction, PipelineError>> = OnceLock::new();
    CACHE
        .get_or_init(|| {
            velocity_derivative(
                "binding_energy_deriv",
                binding_energy::<Expr, UNBOUNDED_PN_ORDER>,
                -1,
            )
        })
        .as_ref()
        .map_err(Clone::clone)
}

/// `d𝓔/dv` truncated at the system's PN order.
pub fn binding_energy_deriv_value<const PN_ORDER: u32>(
    pnsystem: &PNSystem<f64, PN_ORDER>,
) -> Result<f64, PipelineError> {
    Ok(binding_energy_deriv()?.evaluate(pnsystem))
}

/// Runs the pipelines whose output every approximant needs, surfacing a
/// broken formula before any integration starts.
pub fn initialize() -> Result<(), PipelineError> {
    binding_energy_deriv().map(|_| ())
}

/// `dv/dt = -𝓕 / (d𝓔/dv)` re-expanded as a single series in `v` and
/// truncated at `order` (capped at [`MAX_TAYLOR_T4_ORDER`]).
///
/// With `𝓕 = F₀ v^10 Σ aₙ vⁿ` and `d𝓔/dv = E₀ v Σ bₙ vⁿ` (`a₀ = b₀ = 1`), the
/// quotient is `-(F₀/E₀) v⁹ Σ cₙ vⁿ` with `cₙ = aₙ - Σₖ bₖ cₙ₋ₖ`.
pub fn taylor_t4_vdot(order: PnOrder) -> Result<&'static GeneratedFunction, PipelineError> {
    const SLOTS: usize = MAX_TAYLOR_T4_ORDER as usize + 1;
    static CACHE: [OnceLock<Result<GeneratedFunction, PipelineError>>; SLOTS] =
        [const { OnceLock::new() }; SLOTS];
    let capped = order.half_orders().min(MAX_TAYLOR_T4_ORDER);
    CACHE[capped as usize]
        .get_or_init(|| taylor_t4_series(capped))
        .as_ref()
        .map_err(Clone::clone)
}

fn taylor_t4_series(order: u32) -> Result<GeneratedFunction, PipelineError> {
    const NAME: &str = "taylor_t4_vdot";
    let wrap = PipelineError::wrap(NAME);
    let v = || Expr::symbol(VELOCITY);

    let flux = energy_flux(symbolic_pn_system());
    let flux = (flux * Expr::powi(v(), -10)).expand().strip_held();
    let energy_deriv = binding_energy_deriv()?.expression().clone();
    let energy_deriv = (energy_deriv * Expr::powi(v(), -1)).expand();

    let a = collect_by_power(&flux, VELOCITY, order, MAX_GAP).map_err(&wrap)?;
    let b = collect_by_power(&energy_deriv, VELOCITY, order, MAX_GAP).map_err(&wrap)?;
    let (a0, b0) = (a[0].clone(), b[0].clone());
    if a0.is_zero() || b0.is_zero() {
        return Err(wrap(SymbolicError::ZeroLeadingTerm(VELOCITY.to_string())));
    }
    let normalized = |series: &[Expr], n: usize, leading: &Expr| -> Expr {
        match series.get(n) {
            Some(term) => (term.clone() / leading.clone()).expand(),
            None => Expr::zero(),
        }
    };

    let mut c: Vec<Expr> = Vec::with_capacity(order as usize + 1);
    c.push(Expr::one());
    for n in 1..=order as usize {
        let mut cn = normalized(&a, n, &a0);
        for k in 1..=n {
            let bk = normalized(&b, k, &b0);
            if bk.is_zero() || c[n - k].is_zero() {
                continue;
            }
            cn = cn - bk * c[n - k].clone();
        }
        c.push(cn.expand());
    }

    let prefactor = -(a0 / b0);
    let terms: Vec<Expr> = c
        .into_iter()
        .enumerate()
        .filter(|(_, cn)| !cn.is_zero())
        .map(|(n, cn)| prefactor.clone() * cn * Expr::powi(v(), 9 + n as i64))
        .collect();
    let expression = flatten_sum(&Expr::Add(terms).expand());
    let function = PnExpansionFunction::compile(&expression, VELOCITY, -9).map_err(&wrap)?;
    debug!(
        formula = NAME,
        order = %PnOrder::from_half_orders(order),
        terms = function.len(),
        "generated TaylorT4 series"
    );
    Ok(GeneratedFunction {
        name: NAME,
        expression,
        function,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::autodiff::{partial_derivative, Dual};
    use crate::system::STATE_LEN;
    use crate::variables::FundamentalVariable;

    fn state(v: f64) -> [f64; STATE_LEN] {
        [0.6, 0.4, 0.1, 0.2, 0.3, -0.2, 0.1, 0.4, 1.0, 0.0, 0.0, 0.0, v, 0.0]
    }

    fn system<const O: u32>(v: f64) -> PNSystem<f64, O> {
        PNSystem::with_tidal(state(v), 300.0, 500.0)
    }

    #[test]
    fn energy_derivative_converges_like_central_differences() {
        let v = 0.3;
        let exact = binding_energy_deriv_value(&system::<UNBOUNDED_PN_ORDER>(v)).unwrap();
        let central = |h: f64| {
            let plus = binding_energy(&system::<UNBOUNDED_PN_ORDER>(v + h));
            let minus = binding_energy(&system::<UNBOUNDED_PN_ORDER>(v - h));
            (plus - minus) / (2.0 * h)
        };
        let coarse = (central(1e-2) - exact).abs();
        let fine = (central(5e-3) - exact).abs();
        let order = (coarse / fine).log2();
        assert!((1.8..=2.2).contains(&order), "convergence order {order}");
        assert!(fine < 1e-3 * exact.abs());
    }

    #[test]
    fn energy_derivative_matches_dual_numbers_at_every_order() {
        fn check<const O: u32>() {
            let pn = system::<O>(0.25);
            let (_, dual) =
                partial_derivative(&pn, FundamentalVariable::V, binding_energy::<Dual, O>);
            let generated = binding_energy_deriv_value(&pn).unwrap();
            assert!(
                (generated - dual).abs() < 1e-12 * dual.abs(),
                "order {}: {generated} vs {dual}",
                pn.pn_order()
            );
        }
        check::<0>();
        check::<2>();
        check::<3>();
        check::<7>();
        check::<8>();
        check::<UNBOUNDED_PN_ORDER>();
    }

    #[test]
    fn energy_derivative_terms_follow_the_energy() {
        let generated = binding_energy_deriv().unwrap();
        assert_eq!(generated.function().powers(), vec![0, 2, 3, 4, 5, 6, 7, 8, 10]);
        assert!(!generated.expression().to_string().contains("held("));
        assert!(generated.expression().contains_symbol("Lambda1"));
        initialize().unwrap();
    }

    #[test]
    fn taylor_t4_at_newtonian_order() {
        let pn = system::<0>(0.2);
        let vdot = taylor_t4_vdot(pn.pn_order()).unwrap().evaluate(&pn);
        let (nu, m) = (0.24, 1.0);
        let expected = 32.0 / 5.0 * nu / m * 0.2f64.powi(9);
        assert!((vdot - expected).abs() < 1e-12 * expected);
    }

    #[test]
    fn taylor_t4_first_order_coefficient() {
        let series = taylor_t4_vdot(PnOrder::from_half_orders(2)).unwrap();
        assert_eq!(series.function().powers(), vec![0, 2]);
        let pn = system::<2>(0.2);
        let nu: f64 = 0.24;
        let x: f64 = 0.2;
        let expected =
            32.0 / 5.0 * nu * x.powi(9) * (1.0 + (-743.0 / 336.0 - 11.0 / 4.0 * nu) * x * x);
        let vdot = series.evaluate(&pn);
        assert!((vdot - expected).abs() < 1e-12 * expected, "{vdot} vs {expected}");
    }

    #[test]
    fn taylor_t4_agrees_with_ratio_up_to_truncation() {
        let pn = system::<7>(0.1);
        let ratio = -crate::formulas::energy_flux(&pn) / binding_energy_deriv_value(&pn).unwrap();
        let series = taylor_t4_vdot(pn.pn_order()).unwrap().evaluate(&pn);
        let relative = (series - ratio).abs() / ratio.abs();
        assert!(relative < 1e-4, "relative difference {relative}");
        assert!(relative > 0.0);
    }
}
