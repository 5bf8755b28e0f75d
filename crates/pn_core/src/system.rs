use crate::expansion::PnOrder;
use crate::symbolic::{Constant, Expr};
use crate::traits::Representation;
use crate::variables::FundamentalVariable;
use std::sync::OnceLock;

/// Number of entries in the evolved state vector.
pub const STATE_LEN: usize = 14;

/// Number of fixed (non-evolved) parameters: the two tidal deformabilities.
pub const PARAMETER_LEN: usize = 2;

/// PN order meaning "keep every term".
pub const UNBOUNDED_PN_ORDER: u32 = u32::MAX;

/// State of a binary at one instant, in some representation `R`.
///
/// `PN_ORDER` counts half PN orders: it is the largest power of `v`, relative
/// to the leading term, kept by every formula evaluated against this system
/// (3.5PN is `7`).
///
/// The state layout is fixed:
///
/// | index | entry |
/// |---|---|
/// | 0, 1 | `M1`, `M2` |
/// | 2..5 | `chi1x`, `chi1y`, `chi1z` |
/// | 5..8 | `chi2x`, `chi2y`, `chi2z` |
/// | 8..12 | `Rw`, `Rx`, `Ry`, `Rz` (frame quaternion) |
/// | 12 | `v` |
/// | 13 | `Phi` |
#[derive(Debug, Clone, PartialEq)]
pub struct PNSystem<R, const PN_ORDER: u32> {
    state: [R; STATE_LEN],
    parameters: [R; PARAMETER_LEN],
}

pub type NumericPNSystem<const PN_ORDER: u32> = PNSystem<f64, PN_ORDER>;

pub type SymbolicPNSystem = PNSystem<Expr, UNBOUNDED_PN_ORDER>;

impl<R: Representation, const PN_ORDER: u32> PNSystem<R, PN_ORDER> {
    /// A point-particle system: both tidal deformabilities vanish.
    pub fn new(state: [R; STATE_LEN]) -> Self {
        Self {
            state,
            parameters: [R::zero(), R::zero()],
        }
    }

    pub fn with_tidal(state: [R; STATE_LEN], lambda1: R, lambda2: R) -> Self {
        Self {
            state,
            parameters: [lambda1, lambda2],
        }
    }

    /// Builds a system from an integrator's state slice. Returns `None` when
    /// the slice does not have `STATE_LEN` entries.
    pub fn from_slice(x: &[R], lambda1: R, lambda2: R) -> Option<Self> {
        let state: &[R; STATE_LEN] = x.try_into().ok()?;
        Some(Self::with_tidal(state.clone(), lambda1, lambda2))
    }

    pub fn state(&self) -> &[R; STATE_LEN] {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut [R; STATE_LEN] {
        &mut self.state
    }

    pub fn parameters(&self) -> &[R; PARAMETER_LEN] {
        &self.parameters
    }

    /// Overwrites the state from an integrator's slice, leaving the
    /// parameters untouched. Extra entries are ignored.
    pub fn update(&mut self, x: &[R]) {
        for (dst, src) in self.state.iter_mut().zip(x) {
            *dst = src.clone();
        }
    }

    pub fn value(&self, variable: FundamentalVariable) -> &R {
        let index = variable.index();
        if index < STATE_LEN {
            &self.state[index]
        } else {
            &self.parameters[index - STATE_LEN]
        }
    }

    pub fn pn_order(&self) -> PnOrder {
        PnOrder::from_half_orders(PN_ORDER)
    }

    /// Converts every entry to another representation. `f` receives the
    /// fundamental-variable index (parameters follow the state).
    pub fn map<S: Representation, F>(&self, f: F) -> PNSystem<S, PN_ORDER>
    where
        F: Fn(usize, &R) -> S,
    {
        let state = std::array::from_fn(|i| f(i, &self.state[i]));
        let parameters = std::array::from_fn(|i| f(STATE_LEN + i, &self.parameters[i]));
        PNSystem { state, parameters }
    }

    /// The same state viewed at a different truncation order.
    pub fn at_order<const OTHER: u32>(&self) -> PNSystem<R, OTHER> {
        PNSystem {
            state: self.state.clone(),
            parameters: self.parameters.clone(),
        }
    }
}

/// Lifts a literal constant into the representation of `pnsystem`.
///
/// Numeric systems get the value; the symbolic system gets `held(constant)`,
/// which the simplifier never folds to a decimal.
pub fn convert_for_system<R: Representation, const PN_ORDER: u32>(
    _pnsystem: &PNSystem<R, PN_ORDER>,
    constant: Constant,
) -> R {
    R::held(constant)
}

/// The process-wide symbolic system: every fundamental variable is a
/// placeholder of the same name and every term is kept.
///
/// Built on first use and never mutated afterwards.
pub fn symbolic_pn_system() -> &'static SymbolicPNSystem {
    static SYSTEM: OnceLock<SymbolicPNSystem> = OnceLock::new();
    SYSTEM.get_or_init(|| {
        let state = std::array::from_fn(|i| Expr::Symbol(FundamentalVariable::ALL[i].name()));
        PNSystem::with_tidal(
            state,
            Expr::Symbol(FundamentalVariable::Lambda1.name()),
            Expr::Symbol(FundamentalVariable::Lambda2.name()),
        )
    })
}
