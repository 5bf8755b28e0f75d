//! Domain checks and the events that stop an orbital evolution.

use crate::integrator::{ContinuousEvent, DiscreteEvent, IntegratorState, SavePositions};
use crate::system::{PNSystem, STATE_LEN};
use crate::traits::{Representation, Scalar};
use serde::{Deserialize, Serialize};
use std::marker::PhantomData;
use thiserror::Error;
use tracing::{info, warn, Level};

const M1: usize = 0;
const M2: usize = 1;
const CHI1: std::ops::Range<usize> = 2..5;
const CHI2: std::ops::Range<usize> = 5..8;
const V: usize = 12;

/// Why an integration stopped.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Termination {
    #[error("Terminating evolution because mass M1 has become non-positive, which is unphysical")]
    NonPositiveMass1,
    #[error("Terminating evolution because mass M2 has become non-positive, which is unphysical")]
    NonPositiveMass2,
    #[error("Terminating evolution because spin magnitude |chi1| has exceeded 1, which is super-extremal")]
    SuperExtremalSpin1,
    #[error("Terminating evolution because spin magnitude |chi2| has exceeded 1, which is super-extremal")]
    SuperExtremalSpin2,
    #[error("Terminating forward evolution because the PN parameter v has reached v_end")]
    ForwardTargetReached,
    #[error("Terminating backward evolution because the PN parameter v has reached v_start")]
    BackwardTargetReached,
    #[error(
        "Terminating evolution because the step size has collapsed below sqrt(eps); \
         the PN approximation has probably broken down"
    )]
    StepSizeCollapsed,
    #[error("Terminating evolution because a non-finite value appeared in the state, time or step size")]
    NonFiniteState,
    #[error("Terminating evolution because the maximum number of steps was reached")]
    MaxStepsReached,
}

impl Termination {
    /// Reaching the requested frequency is a clean finish.
    pub fn is_informational(self) -> bool {
        self == Termination::ForwardTargetReached || self == Termination::BackwardTargetReached
    }

    /// Severity used when this termination is reported, or `None` if it is
    /// suppressed.
    pub fn log_level(self, quiet: bool) -> Option<Level> {
        if !self.is_informational() {
            Some(Level::WARN)
        } else if quiet {
            None
        } else {
            Some(Level::INFO)
        }
    }

    pub fn log(self, quiet: bool, t: f64, v: f64) {
        match self.log_level(quiet) {
            Some(level) if level == Level::WARN => warn!(t, v, "{self}"),
            Some(_) => info!(t, v, "{self}"),
            None => {}
        }
    }
}

/// Numeric domain check over a state laid out as in [`PNSystem`].
pub(crate) fn numeric_domain_error<R>(state: &[R; STATE_LEN], value: impl Fn(&R) -> f64) -> bool {
    let squared = |range: std::ops::Range<usize>| -> f64 {
        state[range].iter().map(|x| value(x).powi(2)).sum()
    };
    value(&state[M1]) <= 0.0
        || value(&state[M2]) <= 0.0
        || squared(CHI1) > 1.0
        || squared(CHI2) > 1.0
        || value(&state[V]) <= 0.0
}

/// True when `pnsystem` lies outside the regime where the PN equations make
/// sense (non-positive masses or velocity, super-extremal spins). Numeric
/// representations then fill `derivative` with NaN so the integrator rejects
/// the step; symbolic states are never out of domain.
pub fn causes_domain_error<R: Representation, const PN_ORDER: u32>(
    derivative: &mut [R],
    pnsystem: &PNSystem<R, PN_ORDER>,
) -> bool {
    R::causes_domain_error(derivative, pnsystem)
}

fn physical_conditions(state: &[f64], out: &mut [f64]) {
    out[0] = state[M1];
    out[1] = state[M2];
    out[2] = 1.0 - state[CHI1].iter().map(|x| x * x).sum::<f64>();
    out[3] = 1.0 - state[CHI2].iter().map(|x| x * x).sum::<f64>();
}

const PHYSICAL_REASONS: [Termination; 4] = [
    Termination::NonPositiveMass1,
    Termination::NonPositiveMass2,
    Termination::SuperExtremalSpin1,
    Termination::SuperExtremalSpin2,
];

pub(crate) fn halt(reason: Termination, quiet: bool, integrator: &mut IntegratorState) {
    let v = integrator.state.get(V).copied().unwrap_or(f64::NAN);
    reason.log(quiet, integrator.t, v);
    integrator.terminate(reason);
}

/// Continuous terminator for forward evolution.
///
/// Conditions: `[M1, M2, 1 - |chi1|², 1 - |chi2|², v_end - v]`; each fires
/// when it reaches zero from above.
#[derive(Debug, Clone, Copy)]
pub struct TerminationForwards {
    pub v_end: f64,
    pub quiet: bool,
}

pub fn termination_forwards(v_end: f64, quiet: bool) -> TerminationForwards {
    TerminationForwards { v_end, quiet }
}

impl ContinuousEvent for TerminationForwards {
    fn len(&self) -> usize {
        5
    }

    fn conditions(&self, _t: f64, state: &[f64], out: &mut [f64]) {
        physical_conditions(state, out);
        out[4] = self.v_end - state[V];
    }

    fn affect(&self, index: usize, integrator: &mut IntegratorState) {
        let reason = PHYSICAL_REASONS
            .get(index)
            .copied()
            .unwrap_or(Termination::ForwardTargetReached);
        halt(reason, self.quiet, integrator);
    }

    fn save_positions(&self) -> SavePositions {
        SavePositions {
            before: false,
            after: true,
        }
    }
}

/// Continuous terminator for backward evolution; the last condition is
/// `v - v_start`.
#[derive(Debug, Clone, Copy)]
pub struct TerminationBackwards {
    pub v_start: f64,
    pub quiet: bool,
}

pub fn termination_backwards(v_start: f64, quiet: bool) -> TerminationBackwards {
    TerminationBackwards { v_start, quiet }
}

impl ContinuousEvent for TerminationBackwards {
    fn len(&self) -> usize {
        5
    }

    fn conditions(&self, _t: f64, state: &[f64], out: &mut [f64]) {
        physical_conditions(state, out);
        out[4] = state[V] - self.v_start;
    }

    fn affect(&self, index: usize, integrator: &mut IntegratorState) {
        let reason = PHYSICAL_REASONS
            .get(index)
            .copied()
            .unwrap_or(Termination::BackwardTargetReached);
        halt(reason, self.quiet, integrator);
    }

    fn save_positions(&self) -> SavePositions {
        SavePositions {
            before: false,
            after: true,
        }
    }
}

/// Stops once the proposed step magnitude drops below `sqrt(eps)` of `T`.
///
/// Only useful with `force_min_step`, otherwise the integrator gives up on
/// its own before this fires.
#[derive(Debug, Clone, Copy)]
pub struct DtMinTerminator<T> {
    threshold: f64,
    _scalar: PhantomData<T>,
}

pub fn dtmin_terminator<T: Scalar>() -> DtMinTerminator<T> {
    let threshold = T::epsilon().sqrt().to_f64().unwrap_or(f64::EPSILON.sqrt());
    DtMinTerminator {
        threshold,
        _scalar: PhantomData,
    }
}

impl<T> DtMinTerminator<T> {
    pub fn threshold(&self) -> f64 {
        self.threshold
    }
}

impl<T> DiscreteEvent for DtMinTerminator<T> {
    fn condition(&self, integrator: &IntegratorState) -> bool {
        integrator.dt.abs() < self.threshold
    }

    fn affect(&self, integrator: &mut IntegratorState) {
        halt(Termination::StepSizeCollapsed, false, integrator);
    }
}

/// Stops when the time, the step size or any state component is not finite.
#[derive(Debug, Clone, Copy, Default)]
pub struct NonFiniteTerminator;

pub fn nonfinite_terminator() -> NonFiniteTerminator {
    NonFiniteTerminator
}

impl DiscreteEvent for NonFiniteTerminator {
    fn condition(&self, integrator: &IntegratorState) -> bool {
        !integrator.t.is_finite()
            || !integrator.dt.is_finite()
            || integrator.state.iter().any(|x| !x.is_finite())
    }

    fn affect(&self, integrator: &mut IntegratorState) {
        halt(Termination::NonFiniteState, false, integrator);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symbolic::Expr;
    use crate::system::symbolic_pn_system;

    fn nominal() -> [f64; STATE_LEN] {
        [0.6, 0.4, 0.1, 0.2, 0.3, -0.2, 0.1, 0.4, 1.0, 0.0, 0.0, 0.0, 0.3, 0.0]
    }

    fn forward_conditions(state: &[f64; STATE_LEN], v_end: f64) -> [f64; 5] {
        let mut out = [0.0; 5];
        termination_forwards(v_end, false).conditions(0.0, state, &mut out);
        out
    }

    fn integrator_at(state: [f64; STATE_LEN]) -> IntegratorState {
        IntegratorState {
            t: 10.0,
            state: state.to_vec(),
            dt: 1.0,
            termination: None,
        }
    }

    #[test]
    fn negative_mass_is_out_of_domain() {
        let mut state = nominal();
        state[M1] = -0.1;
        assert!(forward_conditions(&state, 0.5)[0] <= 0.0);

        let pn = PNSystem::<f64, 7>::new(state);
        let mut derivative = [0.0; STATE_LEN];
        assert!(causes_domain_error(&mut derivative[..], &pn));
        assert!(derivative.iter().all(|x| x.is_nan()));
    }

    #[test]
    fn super_extremal_spin_fires_spin_condition() {
        let mut state = nominal();
        state[2] = 1.5;
        state[3] = 0.0;
        state[4] = 0.0;
        let conditions = forward_conditions(&state, 0.5);
        assert!(conditions[2] < 0.0);
        assert!(conditions[0] > 0.0 && conditions[1] > 0.0 && conditions[3] > 0.0);
        let mut derivative = [0.0; STATE_LEN];
        assert!(causes_domain_error(&mut derivative[..], &PNSystem::<f64, 7>::new(state)));
    }

    #[test]
    fn reaching_v_end_is_exactly_zero() {
        let state = nominal();
        assert_eq!(forward_conditions(&state, state[V])[4], 0.0);

        let mut integrator = integrator_at(state);
        termination_forwards(state[V], true).affect(4, &mut integrator);
        assert_eq!(integrator.termination, Some(Termination::ForwardTargetReached));
    }

    #[test]
    fn backward_terminator_watches_v_start() {
        let state = nominal();
        let mut out = [0.0; 5];
        termination_backwards(0.2, false).conditions(0.0, &state, &mut out);
        assert!((out[4] - 0.1).abs() < 1e-15);

        let mut integrator = integrator_at(state);
        termination_backwards(0.2, false).affect(4, &mut integrator);
        assert_eq!(integrator.termination, Some(Termination::BackwardTargetReached));
        let mut integrator = integrator_at(state);
        termination_backwards(0.2, false).affect(3, &mut integrator);
        assert_eq!(integrator.termination, Some(Termination::SuperExtremalSpin2));
    }

    #[test]
    fn valid_state_is_in_domain() {
        let pn = PNSystem::<f64, 7>::new(nominal());
        let mut derivative = [1.0; STATE_LEN];
        assert!(!causes_domain_error(&mut derivative[..], &pn));
        assert!(derivative.iter().all(|x| *x == 1.0));
    }

    #[test]
    fn symbolic_states_are_never_out_of_domain() {
        let mut derivative = vec![Expr::zero(); STATE_LEN];
        assert!(!causes_domain_error(&mut derivative[..], symbolic_pn_system()));
    }

    #[test]
    fn only_target_terminations_are_informational() {
        let target = Termination::ForwardTargetReached;
        assert_eq!(target.log_level(false), Some(Level::INFO));
        assert_eq!(target.log_level(true), None);
        assert_eq!(Termination::BackwardTargetReached.log_level(true), None);
        for reason in [
            Termination::NonPositiveMass1,
            Termination::SuperExtremalSpin2,
            Termination::StepSizeCollapsed,
            Termination::NonFiniteState,
        ] {
            assert_eq!(reason.log_level(true), Some(Level::WARN));
            assert_eq!(reason.log_level(false), Some(Level::WARN));
        }
        assert!(Termination::SuperExtremalSpin1.to_string().contains("chi1"));
    }

    #[test]
    fn discrete_terminators() {
        let dtmin = dtmin_terminator::<f64>();
        assert!((dtmin.threshold() - f64::EPSILON.sqrt()).abs() < 1e-20);
        let mut integrator = integrator_at(nominal());
        assert!(!dtmin.condition(&integrator));
        integrator.dt = -1e-9;
        assert!(dtmin.condition(&integrator));
        dtmin.affect(&mut integrator);
        assert_eq!(integrator.termination, Some(Termination::StepSizeCollapsed));

        let nonfinite = nonfinite_terminator();
        let mut integrator = integrator_at(nominal());
        assert!(!nonfinite.condition(&integrator));
        integrator.state[5] = f64::NAN;
        assert!(nonfinite.condition(&integrator));
        let mut integrator = integrator_at(nominal());
        integrator.dt = f64::INFINITY;
        assert!(nonfinite.condition(&integrator));
        nonfinite.affect(&mut integrator);
        assert_eq!(integrator.termination, Some(Termination::NonFiniteState));
    }
}
