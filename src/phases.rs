//! Approximation phases of the thermal history.
//!
//! Integration proceeds through seven ordered phases, each ending at a
//! hard redshift boundary. Early phases solve the ionization state
//! analytically (Saha equilibrium) and integrate only the matter
//! temperature; later phases add helium and then hydrogen to the
//! numerically evolved state vector. Recorded samples blend the old and
//! new prescriptions across a smoothing window below each boundary.

use crate::config::Precision;

/// The seven approximation phases, in chronological (decreasing z) order.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    /// Before any recombination: everything fully ionized.
    Brec,
    /// First helium recombination (He III -> He II), Saha.
    HeliumOne,
    /// First helium recombination finished.
    HeliumOneDone,
    /// Second helium recombination (He II -> He I), Saha.
    HeliumTwo,
    /// Hydrogen recombination begins: helium leaves equilibrium.
    Hydrogen,
    /// Full recombination: hydrogen leaves equilibrium too.
    FullRecombination,
    /// Reionization regime.
    Reionization,
}

impl Phase {
    /// All phases in integration order.
    pub const ALL: [Phase; 7] = [
        Phase::Brec,
        Phase::HeliumOne,
        Phase::HeliumOneDone,
        Phase::HeliumTwo,
        Phase::Hydrogen,
        Phase::FullRecombination,
        Phase::Reionization,
    ];

    /// Position in integration order.
    pub fn index(self) -> usize {
        Phase::ALL.iter().position(|&p| p == self).unwrap()
    }

    /// The phase preceding this one, if any.
    pub fn previous(self) -> Option<Phase> {
        match self.index() {
            0 => None,
            i => Some(Phase::ALL[i - 1]),
        }
    }

    /// Is the helium fraction part of the evolved state vector?
    pub fn evolves_helium(self) -> bool {
        matches!(
            self,
            Phase::Hydrogen | Phase::FullRecombination | Phase::Reionization
        )
    }

    /// Is the hydrogen fraction part of the evolved state vector?
    pub fn evolves_hydrogen(self) -> bool {
        matches!(self, Phase::FullRecombination | Phase::Reionization)
    }
}

/// Ending redshift and smoothing width per phase.
#[derive(Clone, Debug)]
pub struct PhaseSchedule {
    z_end: [f64; 7],
    delta: [f64; 7],
}

impl PhaseSchedule {
    /// Build the schedule from the precision settings.
    pub fn new(precision: &Precision) -> Self {
        let mut z_end = [0.0; 7];
        let mut delta = [0.0; 7];

        z_end[Phase::Brec.index()] = precision.z_helium_one + precision.delta_z_helium_one;
        z_end[Phase::HeliumOne.index()] = precision.z_helium_two + precision.delta_z_helium_two;
        z_end[Phase::HeliumOneDone.index()] =
            precision.z_helium_saha_end + precision.delta_z_helium_saha_end;
        z_end[Phase::HeliumTwo.index()] = precision.z_helium_two_end;
        z_end[Phase::Hydrogen.index()] = precision.z_hydrogen_start;
        z_end[Phase::FullRecombination.index()] = precision.reionization_z_start_max;
        z_end[Phase::Reionization.index()] = 0.0;

        delta[Phase::Brec.index()] = 0.0;
        delta[Phase::HeliumOne.index()] = precision.delta_z_helium_one;
        delta[Phase::HeliumOneDone.index()] = precision.delta_z_helium_two;
        delta[Phase::HeliumTwo.index()] = precision.delta_z_helium_saha_end;
        delta[Phase::Hydrogen.index()] = precision.delta_z_hydrogen;
        delta[Phase::FullRecombination.index()] = precision.delta_z_full_recombination;
        delta[Phase::Reionization.index()] = precision.delta_z_reionization;

        Self { z_end, delta }
    }

    /// Redshift at which the phase hands over to the next one.
    pub fn z_end(&self, phase: Phase) -> f64 {
        self.z_end[phase.index()]
    }

    /// Smoothing width applied at the start of the phase.
    pub fn delta(&self, phase: Phase) -> f64 {
        self.delta[phase.index()]
    }

    /// Smoothing weight for a sample at redshift z inside `phase`.
    ///
    /// Returns `Some((weight, previous_phase))` when z lies within the
    /// overlap window `2 * delta` below the previous phase's boundary; the
    /// recorded value should then be `weight * new + (1 - weight) * old`.
    pub fn smoothing(&self, phase: Phase, z: f64) -> Option<(f64, Phase)> {
        let previous = phase.previous()?;
        let boundary = self.z_end(previous);
        let delta = self.delta(phase);
        if delta <= 0.0 || z <= boundary - 2.0 * delta {
            return None;
        }
        let s = ((boundary - z) / (2.0 * delta)).clamp(0.0, 1.0);
        Some((smooth_step(s), previous))
    }
}

/// Sigmoidal interpolation weight: w(0)=0, w(1)=1, w'(0)=w'(1)=0.
pub fn smooth_step(s: f64) -> f64 {
    let s = s.clamp(0.0, 1.0);
    s * s * (3.0 - 2.0 * s)
}
