//! Adaptive driver around [`Tsit5`] with event handling.
//!
//! Continuous events are vector-valued conditions that fire when a component
//! crosses from positive to non-positive; the crossing is located by
//! re-stepping from the start of the step with a bracketing root finder, and
//! the state handed to the event is the last one on the valid side. Discrete
//! events are boolean checks run after every accepted step.

use crate::solvers::Tsit5;
use crate::termination::{halt, Termination};
use crate::traits::{DynamicalSystem, Steppable};
use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

/// Settings for the adaptive integrator.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IntegratorSettings {
    pub abstol: f64,
    pub reltol: f64,
    /// Magnitude of the first trial step; estimated from the system when unset.
    pub initial_step: Option<f64>,
    pub min_step: f64,
    /// Accept steps at `min_step` even when the error test fails, leaving the
    /// decision to stop to the discrete terminators.
    pub force_min_step: bool,
    pub max_steps: usize,
}

impl Default for IntegratorSettings {
    fn default() -> Self {
        Self {
            abstol: 1e-10,
            reltol: 1e-8,
            initial_step: None,
            min_step: f64::EPSILON,
            force_min_step: true,
            max_steps: 1_000_000,
        }
    }
}

/// Which samples an event records around its `affect`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SavePositions {
    pub before: bool,
    pub after: bool,
}

/// The integrator as seen by event callbacks.
#[derive(Debug, Clone)]
pub struct IntegratorState {
    pub t: f64,
    pub state: Vec<f64>,
    /// Signed size of the next step.
    pub dt: f64,
    pub termination: Option<Termination>,
}

impl IntegratorState {
    pub fn terminate(&mut self, reason: Termination) {
        if self.termination.is_none() {
            self.termination = Some(reason);
        }
    }

    pub fn is_terminated(&self) -> bool {
        self.termination.is_some()
    }
}

/// Vector-valued root-finding event.
pub trait ContinuousEvent {
    /// Number of condition components.
    fn len(&self) -> usize;

    fn conditions(&self, t: f64, state: &[f64], out: &mut [f64]);

    /// Called with the index of the component that crossed zero.
    fn affect(&self, index: usize, integrator: &mut IntegratorState);

    fn save_positions(&self) -> SavePositions {
        SavePositions {
            before: false,
            after: true,
        }
    }
}

/// Post-step boolean event.
pub trait DiscreteEvent {
    fn condition(&self, integrator: &IntegratorState) -> bool;

    fn affect(&self, integrator: &mut IntegratorState);

    fn save_positions(&self) -> SavePositions {
        SavePositions {
            before: false,
            after: false,
        }
    }
}

/// Integration statistics for diagnostics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stats {
    pub accepted_steps: usize,
    pub rejected_steps: usize,
    pub events: usize,
}

/// Recorded samples of one integration.
#[derive(Debug, Clone, Default)]
pub struct Trajectory {
    pub t: Vec<f64>,
    pub states: Vec<Vec<f64>>,
    pub termination: Option<Termination>,
    pub stats: Stats,
}

impl Trajectory {
    fn record(&mut self, t: f64, state: &[f64]) {
        if !t.is_finite() || state.iter().any(|x| !x.is_finite()) {
            return;
        }
        if self.t.last() == Some(&t) {
            if let Some(last) = self.states.last_mut() {
                last.copy_from_slice(state);
            }
            return;
        }
        self.t.push(t);
        self.states.push(state.to_vec());
    }
}

/// Step-size controller using an I-controller
///
/// h_new = safety * h * error^(-1/5)
#[derive(Debug, Clone, Copy)]
struct StepController {
    safety: f64,
    max_factor: f64,
    min_factor: f64,
    exponent: f64,
}

impl Default for StepController {
    fn default() -> Self {
        Self {
            safety: 0.9,
            max_factor: 5.0,
            min_factor: 0.2,
            exponent: 1.0 / 5.0,
        }
    }
}

impl StepController {
    fn factor(&self, error: f64) -> f64 {
        if error == 0.0 {
            return self.max_factor;
        }
        if !error.is_finite() {
            return self.min_factor;
        }
        (self.safety * error.powf(-self.exponent)).clamp(self.min_factor, self.max_factor)
    }
}

const ROOT_TOL: f64 = 1e-12;
const ROOT_MAX_ITER: usize = 100;

pub struct Integrator<'a, S: DynamicalSystem<f64>> {
    system: &'a S,
    settings: IntegratorSettings,
    continuous: Vec<Box<dyn ContinuousEvent + 'a>>,
    discrete: Vec<Box<dyn DiscreteEvent + 'a>>,
    controller: StepController,
}

impl<'a, S: DynamicalSystem<f64>> Integrator<'a, S> {
    pub fn new(system: &'a S, settings: IntegratorSettings) -> Self {
        Self {
            system,
            settings,
            continuous: Vec::new(),
            discrete: Vec::new(),
            controller: StepController::default(),
        }
    }

    pub fn with_continuous(mut self, event: impl ContinuousEvent + 'a) -> Self {
        self.continuous.push(Box::new(event));
        self
    }

    pub fn with_discrete(mut self, event: impl DiscreteEvent + 'a) -> Self {
        self.discrete.push(Box::new(event));
        self
    }

    /// Integrates from `t0` towards `t_end` (which may be infinite) until the
    /// end time is reached or an event terminates the run.
    pub fn solve(&self, t0: f64, y0: &[f64], t_end: f64) -> Result<Trajectory> {
        let n = self.system.dimension();
        if y0.len() != n {
            bail!("Initial state has length {} but the system has dimension {}", y0.len(), n);
        }
        if !t0.is_finite() || t_end.is_nan() || t_end == t0 {
            bail!("Invalid time span [{}, {}]", t0, t_end);
        }
        let s = &self.settings;
        if !(s.abstol > 0.0) || !(s.reltol >= 0.0) {
            bail!("Tolerances must be positive (abstol = {}, reltol = {})", s.abstol, s.reltol);
        }
        if !(s.min_step > 0.0) {
            bail!("min_step must be positive");
        }
        if s.max_steps == 0 {
            bail!("max_steps must be greater than zero");
        }
        if y0.iter().any(|x| !x.is_finite()) {
            bail!("Initial state contains non-finite values");
        }

        let direction = (t_end - t0).signum();
        let mut stepper = Tsit5::new(n);
        let mut trajectory = Trajectory::default();
        let mut integrator = IntegratorState {
            t: t0,
            state: y0.to_vec(),
            dt: direction * self.initial_step(t0, y0),
            termination: None,
        };
        trajectory.record(t0, y0);

        let mut conditions: Vec<Vec<f64>> =
            self.continuous.iter().map(|e| vec![0.0; e.len()]).collect();
        for (event, g) in self.continuous.iter().zip(conditions.iter_mut()) {
            event.conditions(integrator.t, &integrator.state, g);
            if let Some(index) = g.iter().position(|x| *x <= 0.0) {
                trajectory.stats.events += 1;
                event.affect(index, &mut integrator);
                if integrator.is_terminated() {
                    trajectory.termination = integrator.termination;
                    return Ok(trajectory);
                }
            }
        }

        let mut trial = vec![0.0; n];
        let mut steps = 0usize;
        loop {
            if steps >= s.max_steps {
                halt(Termination::MaxStepsReached, false, &mut integrator);
                break;
            }

            let mut dt = integrator.dt;
            let remaining = t_end - integrator.t;
            let reaches_end = remaining.is_finite() && (dt - remaining) * direction >= 0.0;
            if reaches_end {
                dt = remaining;
            }

            let mut t_new = integrator.t;
            trial.copy_from_slice(&integrator.state);
            let err = stepper.try_step(self.system, &mut t_new, &mut trial, dt, s.abstol, s.reltol);
            if reaches_end {
                t_new = t_end;
            }
            let forced = s.force_min_step && dt.abs() <= s.min_step;

            if !(err <= 1.0) && !forced {
                trajectory.stats.rejected_steps += 1;
                let mut next = dt * self.controller.factor(err).min(1.0);
                if s.force_min_step && next.abs() < s.min_step {
                    next = direction * s.min_step;
                } else if next.abs() < s.min_step {
                    integrator.dt = next;
                    halt(Termination::StepSizeCollapsed, false, &mut integrator);
                    break;
                }
                integrator.dt = next;
                continue;
            }

            steps += 1;
            trajectory.stats.accepted_steps += 1;
            let t_start = integrator.t;
            let y_start = integrator.state.clone();

            let mut next = dt * self.controller.factor(err);
            if s.force_min_step && next.abs() < s.min_step {
                next = direction * s.min_step;
            }

            if let Some((event_index, component, left, right)) =
                self.earliest_crossing(&mut stepper, &conditions, t_start, &y_start, dt, &trial)
            {
                let mut t_event = t_start;
                let mut y_event = y_start.clone();
                if left > 0.0 {
                    stepper.step(self.system, &mut t_event, &mut y_event, left * dt);
                }
                integrator.t = t_event;
                integrator.state = y_event;
                integrator.dt = next;
                trajectory.stats.events += 1;

                let event = &self.continuous[event_index];
                let save = event.save_positions();
                if save.before {
                    trajectory.record(integrator.t, &integrator.state);
                }
                event.affect(component, &mut integrator);
                if save.after {
                    trajectory.record(integrator.t, &integrator.state);
                }
                if integrator.is_terminated() {
                    break;
                }
                // Resume past the crossing so the same root is not found again.
                let mut t_resume = t_start;
                integrator.state.copy_from_slice(&y_start);
                stepper.step(self.system, &mut t_resume, &mut integrator.state, right * dt);
                integrator.t = t_resume;
                trajectory.record(integrator.t, &integrator.state);
                for (event, g) in self.continuous.iter().zip(conditions.iter_mut()) {
                    event.conditions(integrator.t, &integrator.state, g);
                }
            } else {
                integrator.t = t_new;
                integrator.state.copy_from_slice(&trial);
                integrator.dt = next;
                trajectory.record(integrator.t, &integrator.state);
                for (event, g) in self.continuous.iter().zip(conditions.iter_mut()) {
                    event.conditions(integrator.t, &integrator.state, g);
                }
            }

            for event in &self.discrete {
                if event.condition(&integrator) {
                    trajectory.stats.events += 1;
                    let save = event.save_positions();
                    if save.before {
                        trajectory.record(integrator.t, &integrator.state);
                    }
                    event.affect(&mut integrator);
                    if save.after {
                        trajectory.record(integrator.t, &integrator.state);
                    }
                }
                if integrator.is_terminated() {
                    break;
                }
            }
            if integrator.is_terminated() {
                break;
            }
            if integrator.t == t_end {
                break;
            }
        }

        trajectory.termination = integrator.termination;
        Ok(trajectory)
    }

    /// Magnitude of the first step: the configured value, or the Hairer–Wanner
    /// estimate from the first two derivative evaluations.
    fn initial_step(&self, t0: f64, y0: &[f64]) -> f64 {
        let s = &self.settings;
        if let Some(h) = s.initial_step {
            return h.abs().max(s.min_step);
        }
        let n = y0.len();
        let scale: Vec<f64> = y0.iter().map(|y| s.abstol + s.reltol * y.abs()).collect();
        let norm = |v: &[f64]| -> f64 {
            let sum: f64 = v.iter().zip(&scale).map(|(x, sc)| (x / sc).powi(2)).sum();
            (sum / n.max(1) as f64).sqrt()
        };

        let mut f0 = vec![0.0; n];
        self.system.apply(t0, y0, &mut f0);
        let d0 = norm(y0);
        let d1 = norm(&f0);
        let h0 = if d0 < 1e-5 || d1 < 1e-5 { 1e-6 } else { 0.01 * d0 / d1 };

        let y1: Vec<f64> = y0.iter().zip(&f0).map(|(y, f)| y + h0 * f).collect();
        let mut f1 = vec![0.0; n];
        self.system.apply(t0 + h0, &y1, &mut f1);
        let diff: Vec<f64> = f1.iter().zip(&f0).map(|(a, b)| a - b).collect();
        let d2 = norm(&diff) / h0;

        let h1 = if d1.max(d2) <= 1e-15 {
            (h0 * 1e-3).max(1e-6)
        } else {
            (0.01 / d1.max(d2)).powf(1.0 / 5.0)
        };
        let h = (100.0 * h0).min(h1);
        if h.is_finite() && h > 0.0 {
            h.max(s.min_step)
        } else {
            1e-6_f64.max(s.min_step)
        }
    }

    /// Finds the earliest component crossing from positive to non-positive
    /// during the step, returning `(event, component, left, right)` where the
    /// state at `t_start + left * dt` is still on the positive side and the one
    /// at `t_start + right * dt` has crossed.
    fn earliest_crossing(
        &self,
        stepper: &mut Tsit5<f64>,
        before: &[Vec<f64>],
        t_start: f64,
        y_start: &[f64],
        dt: f64,
        y_end: &[f64],
    ) -> Option<(usize, usize, f64, f64)> {
        let t_end = t_start + dt;
        let mut best: Option<(usize, usize, f64, f64)> = None;
        for (k, event) in self.continuous.iter().enumerate() {
            let mut after = vec![0.0; event.len()];
            event.conditions(t_end, y_end, &mut after);
            for (i, (g0, g1)) in before[k].iter().zip(&after).enumerate() {
                if !(*g0 > 0.0 && *g1 <= 0.0) {
                    continue;
                }
                let (left, right) =
                    self.locate(stepper, event.as_ref(), i, t_start, y_start, dt, *g0, *g1);
                if best.map_or(true, |(_, _, _, r)| right < r) {
                    best = Some((k, i, left, right));
                }
            }
        }
        best
    }

    /// Illinois bracketing on `theta` in `[0, 1]` for one condition component.
    /// Returns the final `(valid, crossed)` bracket.
    #[allow(clippy::too_many_arguments)]
    fn locate(
        &self,
        stepper: &mut Tsit5<f64>,
        event: &dyn ContinuousEvent,
        component: usize,
        t_start: f64,
        y_start: &[f64],
        dt: f64,
        g_left: f64,
        g_right: f64,
    ) -> (f64, f64) {
        let mut values = vec![0.0; event.len()];
        let mut y = y_start.to_vec();
        let mut condition_at = |theta: f64| -> f64 {
            let mut t = t_start;
            y.copy_from_slice(y_start);
            stepper.step(self.system, &mut t, &mut y, theta * dt);
            event.conditions(t, &y, &mut values);
            values[component]
        };

        let (mut a, mut b) = (0.0_f64, 1.0_f64);
        let (mut fa, mut fb) = (g_left, g_right);
        let mut side = 0i8;
        for _ in 0..ROOT_MAX_ITER {
            if ((b - a) * dt).abs() <= ROOT_TOL * t_start.abs().max(1.0) {
                break;
            }
            let mut theta = if fa != fb { b - fb * (b - a) / (fb - fa) } else { 0.5 * (a + b) };
            if !(theta > a && theta < b) {
                theta = 0.5 * (a + b);
            }
            let g = condition_at(theta);
            if g.is_nan() {
                b = theta;
                fb = -fa.abs();
                continue;
            }
            if g > 0.0 {
                a = theta;
                fa = g;
                if side == -1 {
                    fb *= 0.5;
                }
                side = -1;
            } else {
                b = theta;
                fb = g;
                if side == 1 {
                    fa *= 0.5;
                }
                side = 1;
            }
        }
        (a, b)
    }
}
