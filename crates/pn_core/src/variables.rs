//! Variable catalog.
//!
//! Fundamental variables read the state vector directly. Derived scalars go
//! through [`Representation::derived`], so evaluating them against the
//! symbolic system yields a bare placeholder with the variable's name instead
//! of the expanded formula. Derived vectors are always computed component by
//! component.

use crate::system::{PNSystem, STATE_LEN};
use crate::traits::Representation;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FundamentalVariable {
    M1,
    M2,
    Chi1x,
    Chi1y,
    Chi1z,
    Chi2x,
    Chi2y,
    Chi2z,
    Rw,
    Rx,
    Ry,
    Rz,
    V,
    Phi,
    Lambda1,
    Lambda2,
}

impl FundamentalVariable {
    /// State entries in layout order, followed by the tidal parameters.
    pub const ALL: [FundamentalVariable; 16] = [
        FundamentalVariable::M1,
        FundamentalVariable::M2,
        FundamentalVariable::Chi1x,
        FundamentalVariable::Chi1y,
        FundamentalVariable::Chi1z,
        FundamentalVariable::Chi2x,
        FundamentalVariable::Chi2y,
        FundamentalVariable::Chi2z,
        FundamentalVariable::Rw,
        FundamentalVariable::Rx,
        FundamentalVariable::Ry,
        FundamentalVariable::Rz,
        FundamentalVariable::V,
        FundamentalVariable::Phi,
        FundamentalVariable::Lambda1,
        FundamentalVariable::Lambda2,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn name(self) -> &'static str {
        match self {
            FundamentalVariable::M1 => "M1",
            FundamentalVariable::M2 => "M2",
            FundamentalVariable::Chi1x => "chi1x",
            FundamentalVariable::Chi1y => "chi1y",
            FundamentalVariable::Chi1z => "chi1z",
            FundamentalVariable::Chi2x => "chi2x",
            FundamentalVariable::Chi2y => "chi2y",
            FundamentalVariable::Chi2z => "chi2z",
            FundamentalVariable::Rw => "Rw",
            FundamentalVariable::Rx => "Rx",
            FundamentalVariable::Ry => "Ry",
            FundamentalVariable::Rz => "Rz",
            FundamentalVariable::V => "v",
            FundamentalVariable::Phi => "Phi",
            FundamentalVariable::Lambda1 => "Lambda1",
            FundamentalVariable::Lambda2 => "Lambda2",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|v| v.name() == name)
    }

    /// Tidal deformabilities are fixed parameters, not evolved state.
    pub fn is_parameter(self) -> bool {
        self.index() >= STATE_LEN
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum DerivedVariable {
    TotalMass,
    ReducedMass,
    Nu,
    Delta,
    Q,
    X1,
    X2,
    Chi1Squared,
    Chi2Squared,
    Chi1Mag,
    Chi2Mag,
    Chi1Chi2,
    Chi1Ell,
    Chi2Ell,
    ChiSEll,
    ChiAEll,
    SEll,
    SigmaEll,
}

impl DerivedVariable {
    pub const ALL: [DerivedVariable; 18] = [
        DerivedVariable::TotalMass,
        DerivedVariable::ReducedMass,
        DerivedVariable::Nu,
        DerivedVariable::Delta,
        DerivedVariable::Q,
        DerivedVariable::X1,
        DerivedVariable::X2,
        DerivedVariable::Chi1Squared,
        DerivedVariable::Chi2Squared,
        DerivedVariable::Chi1Mag,
        DerivedVariable::Chi2Mag,
        DerivedVariable::Chi1Chi2,
        DerivedVariable::Chi1Ell,
        DerivedVariable::Chi2Ell,
        DerivedVariable::ChiSEll,
        DerivedVariable::ChiAEll,
        DerivedVariable::SEll,
        DerivedVariable::SigmaEll,
    ];

    pub fn name(self) -> &'static str {
        match self {
            DerivedVariable::TotalMass => "M",
            DerivedVariable::ReducedMass => "mu",
            DerivedVariable::Nu => "nu",
            DerivedVariable::Delta => "delta",
            DerivedVariable::Q => "q",
            DerivedVariable::X1 => "X1",
            DerivedVariable::X2 => "X2",
            DerivedVariable::Chi1Squared => "chi1_squared",
            DerivedVariable::Chi2Squared => "chi2_squared",
            DerivedVariable::Chi1Mag => "chi1_mag",
            DerivedVariable::Chi2Mag => "chi2_mag",
            DerivedVariable::Chi1Chi2 => "chi1_chi2",
            DerivedVariable::Chi1Ell => "chi1_ell",
            DerivedVariable::Chi2Ell => "chi2_ell",
            DerivedVariable::ChiSEll => "chi_s_ell",
            DerivedVariable::ChiAEll => "chi_a_ell",
            DerivedVariable::SEll => "S_ell",
            DerivedVariable::SigmaEll => "Sigma_ell",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|v| v.name() == name)
    }

    pub fn evaluate<R: Representation, const PN_ORDER: u32>(self, pn: &PNSystem<R, PN_ORDER>) -> R {
        match self {
            DerivedVariable::TotalMass => total_mass(pn),
            DerivedVariable::ReducedMass => reduced_mass(pn),
            DerivedVariable::Nu => nu(pn),
            DerivedVariable::Delta => delta(pn),
            DerivedVariable::Q => q(pn),
            DerivedVariable::X1 => x1(pn),
            DerivedVariable::X2 => x2(pn),
            DerivedVariable::Chi1Squared => chi1_squared(pn),
            DerivedVariable::Chi2Squared => chi2_squared(pn),
            DerivedVariable::Chi1Mag => chi1_mag(pn),
            DerivedVariable::Chi2Mag => chi2_mag(pn),
            DerivedVariable::Chi1Chi2 => chi1_chi2(pn),
            DerivedVariable::Chi1Ell => chi1_ell(pn),
            DerivedVariable::Chi2Ell => chi2_ell(pn),
            DerivedVariable::ChiSEll => chi_s_ell(pn),
            DerivedVariable::ChiAEll => chi_a_ell(pn),
            DerivedVariable::SEll => s_ell(pn),
            DerivedVariable::SigmaEll => sigma_ell(pn),
        }
    }
}

/// Any catalog entry, resolved by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Variable {
    Fundamental(FundamentalVariable),
    Derived(DerivedVariable),
}

impl Variable {
    pub fn from_name(name: &str) -> Option<Self> {
        FundamentalVariable::from_name(name)
            .map(Variable::Fundamental)
            .or_else(|| DerivedVariable::from_name(name).map(Variable::Derived))
    }

    pub fn name(self) -> &'static str {
        match self {
            Variable::Fundamental(v) => v.name(),
            Variable::Derived(v) => v.name(),
        }
    }

    pub fn evaluate<R: Representation, const PN_ORDER: u32>(self, pn: &PNSystem<R, PN_ORDER>) -> R {
        match self {
            Variable::Fundamental(v) => pn.value(v).clone(),
            Variable::Derived(v) => v.evaluate(pn),
        }
    }
}

// Fundamental variables

pub fn m1<R: Representation, const O: u32>(pn: &PNSystem<R, O>) -> R {
    pn.value(FundamentalVariable::M1).clone()
}

pub fn m2<R: Representation, const O: u32>(pn: &PNSystem<R, O>) -> R {
    pn.value(FundamentalVariable::M2).clone()
}

pub fn chi1<R: Representation, const O: u32>(pn: &PNSystem<R, O>) -> [R; 3] {
    [
        pn.value(FundamentalVariable::Chi1x).clone(),
        pn.value(FundamentalVariable::Chi1y).clone(),
        pn.value(FundamentalVariable::Chi1z).clone(),
    ]
}

pub fn chi2<R: Representation, const O: u32>(pn: &PNSystem<R, O>) -> [R; 3] {
    [
        pn.value(FundamentalVariable::Chi2x).clone(),
        pn.value(FundamentalVariable::Chi2y).clone(),
        pn.value(FundamentalVariable::Chi2z).clone(),
    ]
}

/// Frame quaternion `(w, x, y, z)`.
pub fn frame<R: Representation, const O: u32>(pn: &PNSystem<R, O>) -> [R; 4] {
    [
        pn.value(FundamentalVariable::Rw).clone(),
        pn.value(FundamentalVariable::Rx).clone(),
        pn.value(FundamentalVariable::Ry).clone(),
        pn.value(FundamentalVariable::Rz).clone(),
    ]
}

pub fn v<R: Representation, const O: u32>(pn: &PNSystem<R, O>) -> R {
    pn.value(FundamentalVariable::V).clone()
}

pub fn phi<R: Representation, const O: u32>(pn: &PNSystem<R, O>) -> R {
    pn.value(FundamentalVariable::Phi).clone()
}

pub fn lambda1<R: Representation, const O: u32>(pn: &PNSystem<R, O>) -> R {
    pn.value(FundamentalVariable::Lambda1).clone()
}

pub fn lambda2<R: Representation, const O: u32>(pn: &PNSystem<R, O>) -> R {
    pn.value(FundamentalVariable::Lambda2).clone()
}

// Vector helpers

pub(crate) fn dot<R: Representation>(a: &[R; 3], b: &[R; 3]) -> R {
    a[0].clone() * b[0].clone() + a[1].clone() * b[1].clone() + a[2].clone() * b[2].clone()
}

pub(crate) fn cross<R: Representation>(a: &[R; 3], b: &[R; 3]) -> [R; 3] {
    [
        a[1].clone() * b[2].clone() - a[2].clone() * b[1].clone(),
        a[2].clone() * b[0].clone() - a[0].clone() * b[2].clone(),
        a[0].clone() * b[1].clone() - a[1].clone() * b[0].clone(),
    ]
}

pub(crate) fn scale<R: Representation>(s: &R, a: &[R; 3]) -> [R; 3] {
    [
        s.clone() * a[0].clone(),
        s.clone() * a[1].clone(),
        s.clone() * a[2].clone(),
    ]
}

// Derived vectors

/// Unit vector along the orbital angular velocity: the frame's image of `z`.
pub fn ell_hat<R: Representation, const O: u32>(pn: &PNSystem<R, O>) -> [R; 3] {
    let [w, x, y, z] = frame(pn);
    let two = R::ratio(2, 1);
    [
        two.clone() * (x.clone() * z.clone() + w.clone() * y.clone()),
        two * (y.clone() * z.clone() - w.clone() * x.clone()),
        w.clone() * w - x.clone() * x - y.clone() * y + z.clone() * z,
    ]
}

/// Unit separation vector from body 2 to body 1: the frame's image of `x`.
pub fn n_hat<R: Representation, const O: u32>(pn: &PNSystem<R, O>) -> [R; 3] {
    let [w, x, y, z] = frame(pn);
    let two = R::ratio(2, 1);
    [
        w.clone() * w.clone() + x.clone() * x.clone() - y.clone() * y.clone() - z.clone() * z.clone(),
        two.clone() * (x.clone() * y.clone() + w.clone() * z.clone()),
        two * (x * z - w * y),
    ]
}

/// `ell_hat × n_hat`: the frame's image of `y`.
pub fn lambda_hat<R: Representation, const O: u32>(pn: &PNSystem<R, O>) -> [R; 3] {
    let [w, x, y, z] = frame(pn);
    let two = R::ratio(2, 1);
    [
        two.clone() * (x.clone() * y.clone() - w.clone() * z.clone()),
        w.clone() * w.clone() - x.clone() * x.clone() + y.clone() * y.clone() - z.clone() * z.clone(),
        two * (y * z + w * x),
    ]
}

pub fn s1<R: Representation, const O: u32>(pn: &PNSystem<R, O>) -> [R; 3] {
    scale(&m1(pn).powi(2), &chi1(pn))
}

pub fn s2<R: Representation, const O: u32>(pn: &PNSystem<R, O>) -> [R; 3] {
    scale(&m2(pn).powi(2), &chi2(pn))
}

// Derived scalars

pub fn total_mass<R: Representation, const O: u32>(pn: &PNSystem<R, O>) -> R {
    R::derived("M", || m1(pn) + m2(pn))
}

pub fn reduced_mass<R: Representation, const O: u32>(pn: &PNSystem<R, O>) -> R {
    R::derived("mu", || m1(pn) * m2(pn) / total_mass(pn))
}

/// Symmetric mass ratio.
pub fn nu<R: Representation, const O: u32>(pn: &PNSystem<R, O>) -> R {
    R::derived("nu", || reduced_mass(pn) / total_mass(pn))
}

pub fn delta<R: Representation, const O: u32>(pn: &PNSystem<R, O>) -> R {
    R::derived("delta", || (m1(pn) - m2(pn)) / total_mass(pn))
}

pub fn q<R: Representation, const O: u32>(pn: &PNSystem<R, O>) -> R {
    R::derived("q", || m1(pn) / m2(pn))
}

pub fn x1<R: Representation, const O: u32>(pn: &PNSystem<R, O>) -> R {
    R::derived("X1", || m1(pn) / total_mass(pn))
}

pub fn x2<R: Representation, const O: u32>(pn: &PNSystem<R, O>) -> R {
    R::derived("X2", || m2(pn) / total_mass(pn))
}

pub fn chi1_squared<R: Representation, const O: u32>(pn: &PNSystem<R, O>) -> R {
    R::derived("chi1_squared", || {
        let chi1 = chi1(pn);
        dot(&chi1, &chi1)
    })
}

pub fn chi2_squared<R: Representation, const O: u32>(pn: &PNSystem<R, O>) -> R {
    R::derived("chi2_squared", || {
        let chi2 = chi2(pn);
        dot(&chi2, &chi2)
    })
}

pub fn chi1_mag<R: Representation, const O: u32>(pn: &PNSystem<R, O>) -> R {
    R::derived("chi1_mag", || chi1_squared(pn).sqrt())
}

pub fn chi2_mag<R: Representation, const O: u32>(pn: &PNSystem<R, O>) -> R {
    R::derived("chi2_mag", || chi2_squared(pn).sqrt())
}

pub fn chi1_chi2<R: Representation, const O: u32>(pn: &PNSystem<R, O>) -> R {
    R::derived("chi1_chi2", || dot(&chi1(pn), &chi2(pn)))
}

pub fn chi1_ell<R: Representation, const O: u32>(pn: &PNSystem<R, O>) -> R {
    R::derived("chi1_ell", || dot(&chi1(pn), &ell_hat(pn)))
}

pub fn chi2_ell<R: Representation, const O: u32>(pn: &PNSystem<R, O>) -> R {
    R::derived("chi2_ell", || dot(&chi2(pn), &ell_hat(pn)))
}

pub fn chi_s_ell<R: Representation, const O: u32>(pn: &PNSystem<R, O>) -> R {
    R::derived("chi_s_ell", || (chi1_ell(pn) + chi2_ell(pn)) / R::ratio(2, 1))
}

pub fn chi_a_ell<R: Representation, const O: u32>(pn: &PNSystem<R, O>) -> R {
    R::derived("chi_a_ell", || (chi1_ell(pn) - chi2_ell(pn)) / R::ratio(2, 1))
}

/// Total spin along `ell_hat` in units of `M²`.
pub fn s_ell<R: Representation, const O: u32>(pn: &PNSystem<R, O>) -> R {
    R::derived("S_ell", || {
        (m1(pn).powi(2) * chi1_ell(pn) + m2(pn).powi(2) * chi2_ell(pn)) / total_mass(pn).powi(2)
    })
}

pub fn sigma_ell<R: Representation, const O: u32>(pn: &PNSystem<R, O>) -> R {
    R::derived("Sigma_ell", || {
        (m2(pn) * chi2_ell(pn) - m1(pn) * chi1_ell(pn)) / total_mass(pn)
    })
}
