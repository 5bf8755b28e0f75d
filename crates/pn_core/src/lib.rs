//! The `pn_core` crate evolves compact binaries under post-Newtonian dynamics.
//! Every formula is written once and can be evaluated numerically (`f64`),
//! with exact velocity derivatives (`Dual`), or symbolically (`Expr`).
//!
//! Key components:
//! - **Traits**: `Representation` (dual-mode evaluation), `DynamicalSystem` and `Steppable` (integration).
//! - **System**: `PNSystem` state container, variable catalog and the shared symbolic system.
//! - **Expansion**: PN-order truncation, `collect_by_power` and `pn_expansion`.
//! - **Equation Engine**: Compiles symbolic expressions to bytecode for a stack VM.
//! - **Derivatives**: Symbolic pipeline generating `d𝓔/dv` and the TaylorT4 series.
//! - **Approximants**: TaylorT1 and TaylorT4 right-hand sides.
//! - **Termination**: Domain checks and the events that stop an evolution.
//! - **Integration**: Adaptive Tsit5 with event handling, and `orbital_evolution`.
pub mod approximants;
pub mod autodiff;
pub mod derivatives;
pub mod equation_engine;
pub mod evolution;
pub mod expansion;
pub mod formulas;
pub mod integrator;
pub mod solvers;
pub mod symbolic;
pub mod system;
pub mod termination;
pub mod traits;
pub mod variables;

pub use approximants::{Approximant, ApproximantKind, PnDynamics};
pub use evolution::{orbital_evolution, BinaryParameters, EvolutionSettings, Solution};
pub use expansion::{collect_by_power, pn_expansion, PnOrder};
pub use system::{symbolic_pn_system, PNSystem, STATE_LEN, UNBOUNDED_PN_ORDER};
pub use termination::{causes_domain_error, Termination};
