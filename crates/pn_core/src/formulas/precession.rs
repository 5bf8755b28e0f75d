use super::r;
use crate::system::PNSystem;
use crate::traits::Representation;
use crate::variables::{
    chi1, chi2, cross, delta, dot, ell_hat, frame, m1, m2, nu, scale, total_mass, v,
};

/// Orbital angular frequency `v³/M`, which is also `dΦ/dt`.
pub fn orbital_frequency<R: Representation, const O: u32>(pn: &PNSystem<R, O>) -> R {
    v(pn).powi(3) / total_mass(pn)
}

/// Leading-order spin-orbit precession frequencies `Ω₁`, `Ω₂` about `ell_hat`.
fn spin_orbit_frequencies<R: Representation, const O: u32>(pn: &PNSystem<R, O>) -> (R, R) {
    let prefactor = v(pn).powi(5) / total_mass(pn);
    let common = r::<R>(3, 4) + nu(pn) / r(2, 1);
    let split = r::<R>(3, 4) * delta(pn);
    (
        prefactor.clone() * (common.clone() - split.clone()),
        prefactor * (common + split),
    )
}

/// `dχ₁/dt` and `dχ₂/dt`.
pub fn spin_precession<R: Representation, const O: u32>(pn: &PNSystem<R, O>) -> ([R; 3], [R; 3]) {
    let (omega1, omega2) = spin_orbit_frequencies(pn);
    let ell = ell_hat(pn);
    (
        scale(&omega1, &cross(&ell, &chi1(pn))),
        scale(&omega2, &cross(&ell, &chi2(pn))),
    )
}

/// Precession of the orbital plane, the part of the frame's angular velocity
/// orthogonal to `ell_hat`.
///
/// Follows from conservation of `L + S₁ + S₂` with `|L| = M² ν / v`.
pub fn orbital_precession<R: Representation, const O: u32>(pn: &PNSystem<R, O>) -> [R; 3] {
    let (omega1, omega2) = spin_orbit_frequencies(pn);
    let (m1, m2) = (m1(pn), m2(pn));
    let inverse_l = v(pn) / (total_mass(pn).powi(2) * nu(pn));
    let s1 = scale(&(omega1 * m1.powi(2)), &chi1(pn));
    let s2 = scale(&(omega2 * m2.powi(2)), &chi2(pn));
    let total = [
        s1[0].clone() + s2[0].clone(),
        s1[1].clone() + s2[1].clone(),
        s1[2].clone() + s2[2].clone(),
    ];
    let ell = ell_hat(pn);
    let along = dot(&total, &ell);
    let parallel = scale(&along, &ell);
    let perpendicular = [
        total[0].clone() - parallel[0].clone(),
        total[1].clone() - parallel[1].clone(),
        total[2].clone() - parallel[2].clone(),
    ];
    scale(&inverse_l, &perpendicular)
}

/// Angular velocity of the orbital frame: orbital-plane precession plus the
/// orbital motion `(v³/M) ell_hat`.
pub fn frame_angular_velocity<R: Representation, const O: u32>(pn: &PNSystem<R, O>) -> [R; 3] {
    let precession = orbital_precession(pn);
    let orbit = scale(&orbital_frequency(pn), &ell_hat(pn));
    [
        precession[0].clone() + orbit[0].clone(),
        precession[1].clone() + orbit[1].clone(),
        precession[2].clone() + orbit[2].clone(),
    ]
}

/// `dR/dt = ½ Ω R`, with `Ω` as a pure quaternion.
pub fn frame_derivative<R: Representation, const O: u32>(pn: &PNSystem<R, O>) -> [R; 4] {
    let [ox, oy, oz] = frame_angular_velocity(pn);
    let [w, x, y, z] = frame(pn);
    let half = r::<R>(1, 2);
    [
        half.clone() * -(ox.clone() * x.clone() + oy.clone() * y.clone() + oz.clone() * z.clone()),
        half.clone() * (ox.clone() * w.clone() + oy.clone() * z.clone() - oz.clone() * y.clone()),
        half.clone() * (oy.clone() * w.clone() + oz.clone() * x.clone() - ox.clone() * z),
        half * (oz * w + ox * y - oy * x),
    ]
}
