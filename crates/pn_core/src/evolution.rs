//! Orbital evolution of a quasi-circular binary between two frequencies.

use crate::approximants::{ApproximantKind, PnDynamics};
use crate::integrator::{Integrator, IntegratorSettings, Stats, Trajectory};
use crate::system::{PNSystem, STATE_LEN};
use crate::termination::{
    dtmin_terminator, nonfinite_terminator, termination_backwards, termination_forwards,
    Termination,
};
use anyhow::{bail, Result};
use nalgebra::{Quaternion, UnitQuaternion, Vector3};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Physical parameters of the binary and the frequency range to cover.
///
/// Frequencies are orbital angular frequencies in units of the total mass.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BinaryParameters {
    pub m1: f64,
    pub m2: f64,
    pub chi1: [f64; 3],
    pub chi2: [f64; 3],
    /// Frequency at which the initial data are given.
    pub omega_i: f64,
    /// Earliest frequency of the output; when below `omega_i` the system is
    /// also evolved backwards to it.
    pub omega_1: Option<f64>,
    /// Final frequency; `1/M` when unset.
    pub omega_e: Option<f64>,
    /// Initial orbital frame as `[w, x, y, z]`; normalized before use.
    pub frame: [f64; 4],
    pub lambda1: f64,
    pub lambda2: f64,
}

impl Default for BinaryParameters {
    fn default() -> Self {
        Self {
            m1: 0.5,
            m2: 0.5,
            chi1: [0.0; 3],
            chi2: [0.0; 3],
            omega_i: 0.01,
            omega_1: None,
            omega_e: None,
            frame: [1.0, 0.0, 0.0, 0.0],
            lambda1: 0.0,
            lambda2: 0.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EvolutionSettings {
    pub approximant: ApproximantKind,
    pub integrator: IntegratorSettings,
    /// Suppresses the log line for reaching the target frequency.
    pub quiet: bool,
}

/// A time-ordered orbital evolution. The initial data sit at `t = 0`; any
/// backward leg has negative times.
#[derive(Debug, Clone)]
pub struct Solution {
    pub t: Vec<f64>,
    pub states: Vec<[f64; STATE_LEN]>,
    /// Why the forward leg stopped.
    pub termination: Option<Termination>,
    /// Why the backward leg stopped, if there was one.
    pub backward_termination: Option<Termination>,
    pub stats: Stats,
    lambda1: f64,
    lambda2: f64,
}

impl Solution {
    pub fn len(&self) -> usize {
        self.t.len()
    }

    pub fn is_empty(&self) -> bool {
        self.t.is_empty()
    }

    pub fn v(&self) -> Vec<f64> {
        self.states.iter().map(|s| s[12]).collect()
    }

    pub fn phase(&self) -> Vec<f64> {
        self.states.iter().map(|s| s[13]).collect()
    }

    pub fn spin1(&self, i: usize) -> Option<Vector3<f64>> {
        let s = self.states.get(i)?;
        Some(Vector3::new(s[2], s[3], s[4]))
    }

    pub fn spin2(&self, i: usize) -> Option<Vector3<f64>> {
        let s = self.states.get(i)?;
        Some(Vector3::new(s[5], s[6], s[7]))
    }

    pub fn frame(&self, i: usize) -> Option<UnitQuaternion<f64>> {
        let s = self.states.get(i)?;
        Some(UnitQuaternion::from_quaternion(Quaternion::new(
            s[8], s[9], s[10], s[11],
        )))
    }

    pub fn ell_hat(&self, i: usize) -> Option<Vector3<f64>> {
        Some(self.frame(i)? * Vector3::z())
    }

    /// The sample at `i` as a system, for evaluating formulas along the
    /// solution.
    pub fn pnsystem<const PN_ORDER: u32>(&self, i: usize) -> Option<PNSystem<f64, PN_ORDER>> {
        let state = self.states.get(i)?;
        Some(PNSystem::with_tidal(*state, self.lambda1, self.lambda2))
    }
}

fn validate(params: &BinaryParameters) -> Result<(f64, f64, Option<f64>)> {
    let BinaryParameters { m1, m2, chi1, chi2, .. } = *params;
    if !(m1 > 0.0 && m1.is_finite()) {
        bail!("Mass m1 must be positive and finite, got {}", m1);
    }
    if !(m2 > 0.0 && m2.is_finite()) {
        bail!("Mass m2 must be positive and finite, got {}", m2);
    }
    for (name, chi) in [("chi1", chi1), ("chi2", chi2)] {
        let magnitude = Vector3::from(chi).norm();
        if !(magnitude <= 1.0) {
            bail!("Spin {} must have magnitude at most 1, got {}", name, magnitude);
        }
    }
    if params.lambda1 < 0.0 || params.lambda2 < 0.0 {
        bail!("Tidal deformabilities must be non-negative");
    }
    let frame_norm = params.frame.iter().map(|x| x * x).sum::<f64>().sqrt();
    if !(frame_norm > 0.0 && frame_norm.is_finite()) {
        bail!("Frame quaternion must be non-zero and finite");
    }

    let m = m1 + m2;
    let omega_e = params.omega_e.unwrap_or(1.0 / m);
    if !(params.omega_i > 0.0) {
        bail!("Initial frequency omega_i must be positive, got {}", params.omega_i);
    }
    if !(omega_e > params.omega_i) {
        bail!(
            "Final frequency omega_e ({}) must exceed the initial frequency omega_i ({})",
            omega_e,
            params.omega_i
        );
    }
    if let Some(omega_1) = params.omega_1 {
        if !(omega_1 > 0.0 && omega_1 <= params.omega_i) {
            bail!(
                "Earliest frequency omega_1 ({}) must lie in (0, omega_i = {}]",
                omega_1,
                params.omega_i
            );
        }
    }

    let v = |omega: f64| (m * omega).cbrt();
    let v_1 = params.omega_1.filter(|w| *w < params.omega_i).map(v);
    Ok((v(params.omega_i), v(omega_e), v_1))
}

fn to_states(trajectory: &Trajectory) -> Result<Vec<[f64; STATE_LEN]>> {
    Ok(trajectory
        .states
        .iter()
        .map(|s| <[f64; STATE_LEN]>::try_from(s.as_slice()))
        .collect::<Result<Vec<_>, _>>()?)
}

/// Integrates the orbit of a binary at PN order `PN_ORDER` (in half orders)
/// from `omega_i` up to `omega_e`, and down to `omega_1` when requested.
///
/// Breakdown of the PN approximation before `omega_e` is not an error: the
/// solution stops at the last valid state and `termination` records why.
pub fn orbital_evolution<const PN_ORDER: u32>(
    params: &BinaryParameters,
    settings: &EvolutionSettings,
) -> Result<Solution> {
    let (v_i, v_e, v_1) = validate(params)?;
    let norm = params.frame.iter().map(|x| x * x).sum::<f64>().sqrt();
    let [c1x, c1y, c1z] = params.chi1;
    let [c2x, c2y, c2z] = params.chi2;
    let [rw, rx, ry, rz] = params.frame.map(|x| x / norm);
    let initial = [
        params.m1, params.m2, c1x, c1y, c1z, c2x, c2y, c2z, rw, rx, ry, rz, v_i, 0.0,
    ];

    let dynamics =
        PnDynamics::<PN_ORDER>::new(settings.approximant, params.lambda1, params.lambda2)?;
    debug!(
        approximant = %settings.approximant,
        v_i,
        v_e,
        "starting orbital evolution"
    );

    let forward = Integrator::new(&dynamics, settings.integrator)
        .with_continuous(termination_forwards(v_e, settings.quiet))
        .with_discrete(dtmin_terminator::<f64>())
        .with_discrete(nonfinite_terminator())
        .solve(0.0, &initial, f64::INFINITY)?;

    let mut t = Vec::new();
    let mut states = Vec::new();
    let mut stats = forward.stats;
    let mut backward_termination = None;
    if let Some(v_1) = v_1 {
        let backward = Integrator::new(&dynamics, settings.integrator)
            .with_continuous(termination_backwards(v_1, settings.quiet))
            .with_discrete(dtmin_terminator::<f64>())
            .with_discrete(nonfinite_terminator())
            .solve(0.0, &initial, f64::NEG_INFINITY)?;
        backward_termination = backward.termination;
        stats.accepted_steps += backward.stats.accepted_steps;
        stats.rejected_steps += backward.stats.rejected_steps;
        stats.events += backward.stats.events;
        // Skip the shared initial sample; the forward leg supplies it.
        let backward_states = to_states(&backward)?;
        t.extend(backward.t.iter().skip(1).rev());
        states.extend(backward_states.into_iter().skip(1).rev());
    }
    t.extend(forward.t.iter());
    states.extend(to_states(&forward)?);

    Ok(Solution {
        t,
        states,
        termination: forward.termination,
        backward_termination,
        stats,
        lambda1: params.lambda1,
        lambda2: params.lambda2,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::variables;

    fn assert_err_contains<T: std::fmt::Debug>(result: Result<T>, needle: &str) {
        let err = result.expect_err("expected an error");
        let message = format!("{err:#}");
        assert!(message.contains(needle), "'{message}' does not contain '{needle}'");
    }

    /// Orbital frequency giving velocity `v` for unit total mass.
    fn omega(v: f64) -> f64 {
        v.powi(3)
    }

    fn short_run() -> BinaryParameters {
        BinaryParameters {
            omega_i: omega(0.3),
            omega_e: Some(omega(0.33)),
            ..BinaryParameters::default()
        }
    }

    fn quiet() -> EvolutionSettings {
        EvolutionSettings {
            quiet: true,
            ..EvolutionSettings::default()
        }
    }

    #[test]
    fn rejects_invalid_parameters() {
        let settings = quiet();
        let bad_mass = BinaryParameters {
            m1: -0.1,
            ..short_run()
        };
        assert_err_contains(orbital_evolution::<7>(&bad_mass, &settings), "Mass m1");
        let bad_spin = BinaryParameters {
            chi2: [0.0, 0.8, 0.8],
            ..short_run()
        };
        assert_err_contains(orbital_evolution::<7>(&bad_spin, &settings), "Spin chi2");
        let bad_range = BinaryParameters {
            omega_e: Some(omega(0.2)),
            ..short_run()
        };
        assert_err_contains(orbital_evolution::<7>(&bad_range, &settings), "omega_e");
        let bad_start = BinaryParameters {
            omega_1: Some(omega(0.31)),
            ..short_run()
        };
        assert_err_contains(orbital_evolution::<7>(&bad_start, &settings), "omega_1");
        let bad_frame = BinaryParameters {
            frame: [0.0; 4],
            ..short_run()
        };
        assert_err_contains(orbital_evolution::<7>(&bad_frame, &settings), "Frame");
    }

    #[test]
    fn forward_evolution_stops_at_final_frequency() {
        let solution = orbital_evolution::<7>(&short_run(), &quiet()).unwrap();
        assert_eq!(solution.termination, Some(Termination::ForwardTargetReached));
        assert_eq!(solution.backward_termination, None);
        assert_eq!(solution.t[0], 0.0);

        let v = solution.v();
        assert!((v[0] - 0.3).abs() < 1e-14);
        let last = *v.last().unwrap();
        assert!(last <= 0.33 && 0.33 - last < 1e-8, "final v = {last}");
        assert!(v.windows(2).all(|w| w[1] > w[0]));
        assert!(solution.phase().windows(2).all(|w| w[1] > w[0]));
        assert!(solution.t.windows(2).all(|w| w[1] > w[0]));

        let i = solution.len() - 1;
        let frame_norm = solution.states[i][8..12].iter().map(|x| x * x).sum::<f64>().sqrt();
        assert!((frame_norm - 1.0).abs() < 1e-7);
        assert_eq!(solution.spin1(i), Some(Vector3::zeros()));
        assert_eq!(solution.spin1(solution.len()), None);
        assert_eq!(solution.frame(solution.len()), None);
        assert_eq!(solution.ell_hat(solution.len()), None);
        assert!(solution.pnsystem::<7>(solution.len()).is_none());
    }

    #[test]
    fn backward_leg_is_prepended() {
        let params = BinaryParameters {
            omega_1: Some(omega(0.29)),
            ..short_run()
        };
        let solution = orbital_evolution::<7>(&params, &quiet()).unwrap();
        assert_eq!(solution.backward_termination, Some(Termination::BackwardTargetReached));
        assert_eq!(solution.termination, Some(Termination::ForwardTargetReached));
        assert!(solution.t[0] < 0.0);
        assert!(solution.t.windows(2).all(|w| w[1] > w[0]));
        let v = solution.v();
        assert!(v[0] >= 0.29 && v[0] - 0.29 < 1e-8, "first v = {}", v[0]);
        let origin = solution.t.iter().position(|t| *t == 0.0).unwrap();
        assert!((v[origin] - 0.3).abs() < 1e-14);
    }

    #[test]
    fn precessing_binary_conserves_spin_magnitudes() {
        let params = BinaryParameters {
            m1: 0.6,
            m2: 0.4,
            chi1: [0.4, 0.0, 0.3],
            chi2: [0.0, -0.3, 0.2],
            frame: [2.0, 0.0, 0.0, 0.0],
            ..short_run()
        };
        let settings = EvolutionSettings {
            approximant: ApproximantKind::TaylorT4,
            ..quiet()
        };
        let solution = orbital_evolution::<7>(&params, &settings).unwrap();
        assert_eq!(solution.termination, Some(Termination::ForwardTargetReached));
        let i = solution.len() - 1;
        assert!((solution.spin1(i).unwrap().norm() - 0.5).abs() < 1e-6);
        assert!((solution.spin2(i).unwrap().norm() - 0.13f64.sqrt()).abs() < 1e-6);
        assert_ne!(solution.ell_hat(i), Some(Vector3::z()));

        let pn = solution.pnsystem::<7>(i).unwrap();
        let ell = variables::ell_hat(&pn);
        let from_frame = solution.ell_hat(i).unwrap();
        for k in 0..3 {
            assert!((ell[k] - from_frame[k]).abs() < 1e-6);
        }
    }

    #[test]
    fn step_limit_is_reported() {
        let settings = EvolutionSettings {
            integrator: IntegratorSettings {
                max_steps: 3,
                ..IntegratorSettings::default()
            },
            ..quiet()
        };
        let solution = orbital_evolution::<4>(&short_run(), &settings).unwrap();
        assert_eq!(solution.termination, Some(Termination::MaxStepsReached));
        assert_eq!(solution.len(), 4);
    }
}
