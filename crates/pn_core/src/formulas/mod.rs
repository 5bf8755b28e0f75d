//! Physical formulas, written once against [`Representation`].
//!
//! Every formula truncates itself at the PN order of the system it is given,
//! so evaluating against the symbolic system yields the complete expression.

pub mod energy;
pub mod flux;
pub mod precession;

pub use energy::binding_energy;
pub use flux::energy_flux;
pub use precession::{
    frame_angular_velocity, frame_derivative, orbital_frequency, orbital_precession,
    spin_precession,
};

use crate::traits::Representation;

pub(crate) fn r<R: Representation>(numer: i128, denom: i128) -> R {
    R::ratio(numer, denom)
}
