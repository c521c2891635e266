//! Virtual lock mass detection and m/z drift correction.
//!
//! A virtual lock mass is an m/z position where every spectrum of a training batch has
//! exactly one peak, tightly enough that the tolerance window centered on their mean
//! covers all of them. Once learned, the lock masses are located again in each new
//! spectrum and the ratio between the expected and observed m/z at each of them is
//! interpolated across the spectrum to correct its drift.
use std::fmt::Display;
use std::str::FromStr;

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::filter::PeakThresholdFilter;
use crate::spectrum::{Spectrum, SpectrumError};
use crate::traits::SpectrumTransformer;

pub mod correction;
pub mod grouping;

pub use correction::CorrectionFunction;
pub use grouping::TaggedPeaks;

/// The smallest number of lock masses a correction can be computed from
pub const MIN_LOCK_MASSES: usize = 3;

/// How m/z values outside the outermost matched lock masses are corrected
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(rename_all = "lowercase")
)]
pub enum ExtrapolationMode {
    /// Apply the ratio of the nearest lock mass unchanged
    #[default]
    Flat,
    /// Extend the nearest correction function. Not supported yet.
    Linear,
}

impl Display for ExtrapolationMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Flat => f.write_str("flat"),
            Self::Linear => f.write_str("linear"),
        }
    }
}

impl FromStr for ExtrapolationMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "flat" => Ok(Self::Flat),
            "linear" => Ok(Self::Linear),
            _ => Err(format!("Unknown extrapolation mode {s:?}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum CorrectionError {
    #[error("The corrector must be fitted before it can transform spectra")]
    NotFitted,
    #[error("At least 3 lock masses are required to correct a spectrum, found {0}")]
    TooFewLockMasses(usize),
    #[error("Cannot correct with a zero or negative m/z or ratio: {0}")]
    NonPositiveValue(f64),
    #[error("Correction anchors must be in strictly increasing m/z order: {lower} >= {upper}")]
    NotIncreasing { lower: f64, upper: f64 },
    #[error("Found {observed} observed m/z values for {expected} lock masses")]
    LengthMismatch { expected: usize, observed: usize },
    #[error("None of the lock masses were found in the spectrum")]
    NoLockMassesMatched,
    #[error("A degree {degree} correction needs {required} matched lock masses, found {available}")]
    TooFewAnchors {
        degree: usize,
        required: usize,
        available: usize,
    },
    #[error("The correction polynomial degree must be at least 1, got {0}")]
    InvalidDegree(usize),
    #[error("{skipped} lock masses were not found in the spectrum, at most {max_skipped} may be skipped")]
    TooManySkipped { skipped: usize, max_skipped: usize },
    #[error("Corrected {corrected} m/z values but the spectrum has {original} peaks")]
    PeakCountMismatch { corrected: usize, original: usize },
    #[error("The {0} extrapolation mode is not implemented")]
    NotImplemented(ExtrapolationMode),
}

/// The default half-width of the lock mass window, in ppm
pub const DEFAULT_LOCK_MASS_WINDOW_PPM: f64 = 10.0;

/// Parameters of a [`VirtualLockMassCorrector`]
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LockMassParams {
    /// The half-width of the tolerance window around a lock mass, in ppm
    pub window_ppm: f64,
    /// Peaks at or below this intensity are ignored when finding lock masses
    pub min_intensity: f32,
    /// The number of lock masses that may be missing from a spectrum before its
    /// correction fails. `None` allows any number.
    pub max_skipped_points: Option<usize>,
    pub mode: ExtrapolationMode,
    /// The degree of the interpolating polynomial between lock masses
    pub poly_degree: usize,
}

impl Default for LockMassParams {
    fn default() -> Self {
        Self {
            window_ppm: DEFAULT_LOCK_MASS_WINDOW_PPM,
            min_intensity: 0.0,
            max_skipped_points: None,
            mode: ExtrapolationMode::Flat,
            poly_degree: 1,
        }
    }
}

impl LockMassParams {
    pub fn new(
        window_ppm: f64,
        min_intensity: f32,
        max_skipped_points: Option<usize>,
        mode: ExtrapolationMode,
        poly_degree: usize,
    ) -> Self {
        Self {
            window_ppm,
            min_intensity,
            max_skipped_points,
            mode,
            poly_degree,
        }
    }

    fn peak_filter(&self) -> PeakThresholdFilter {
        PeakThresholdFilter::new(self.min_intensity, true)
    }
}

/// The sorted m/z positions of the learned lock masses
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LockMassSet {
    mz_values: Vec<f64>,
}

impl LockMassSet {
    pub fn new(mut mz_values: Vec<f64>) -> Self {
        mz_values.sort_by(|a, b| a.total_cmp(b));
        Self { mz_values }
    }

    pub fn mz_values(&self) -> &[f64] {
        &self.mz_values
    }

    pub fn len(&self) -> usize {
        self.mz_values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mz_values.is_empty()
    }
}

/// Learn virtual lock masses from a batch of spectra and use them to correct the m/z
/// drift of other spectra.
///
/// During [`fit`](SpectrumTransformer::fit), peaks at or below
/// [`LockMassParams::min_intensity`] are ignored. The remaining peaks of all spectra are
/// pooled and swept in m/z order for groups holding exactly one peak per spectrum,
/// see [`TaggedPeaks::find_peak_groups`]. The mean of a group becomes a lock mass if
/// its window contains the whole group, and lock masses whose windows overlap are
/// discarded in pairs.
///
/// During transformation, each lock mass is matched to the nearest peak above the
/// intensity threshold. The expected over observed ratios are interpolated between
/// matched lock masses and held flat outside of them, and every peak's m/z is
/// multiplied by the ratio at its position. Intensities are left unchanged.
#[derive(Debug, Clone, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct VirtualLockMassCorrector {
    params: LockMassParams,
    lock_masses: Option<LockMassSet>,
}

impl VirtualLockMassCorrector {
    pub fn new(params: LockMassParams) -> Self {
        Self {
            params,
            lock_masses: None,
        }
    }

    pub fn params(&self) -> &LockMassParams {
        &self.params
    }

    pub fn lock_masses(&self) -> Option<&LockMassSet> {
        self.lock_masses.as_ref()
    }

    /// Install lock masses learned elsewhere, replacing any current ones
    pub fn set_lock_masses(&mut self, lock_masses: LockMassSet) {
        self.lock_masses = Some(lock_masses);
    }

    pub fn is_fitted(&self) -> bool {
        self.lock_masses.is_some()
    }

    /// Find the lock masses of `training` without storing them
    pub fn find_lock_masses<M>(&self, training: &[Spectrum<M>]) -> LockMassSet {
        let filter = self.params.peak_filter();
        let filtered: Vec<Vec<f64>> = training
            .iter()
            .map(|s| filter.retained_mz_values(s))
            .collect();
        let peaks = TaggedPeaks::new(&filtered);
        let groups = peaks.find_peak_groups(self.params.window_ppm);
        let candidates = grouping::lock_mass_positions(&groups, self.params.window_ppm);
        let accepted = grouping::discard_ambiguous(candidates.clone(), self.params.window_ppm);
        debug!(
            "Found {} peak groups in {} peaks, {} passed containment and {} were unambiguous",
            groups.len(),
            peaks.len(),
            candidates.len(),
            accepted.len(),
        );
        LockMassSet::new(accepted)
    }
}

impl SpectrumTransformer for VirtualLockMassCorrector {
    type Error = CorrectionError;

    fn fit<M>(&mut self, training: &[Spectrum<M>]) -> Result<(), Self::Error> {
        let lock_masses = self.find_lock_masses(training);
        if lock_masses.len() < MIN_LOCK_MASSES {
            warn!(
                "Only {} lock masses were found in {} spectra, at least {} are needed to correct spectra",
                lock_masses.len(),
                training.len(),
                MIN_LOCK_MASSES
            );
        } else {
            info!(
                "Learned {} lock masses from {} spectra",
                lock_masses.len(),
                training.len()
            );
        }
        self.lock_masses = Some(lock_masses);
        Ok(())
    }

    fn transform_spectrum<M: Clone>(
        &self,
        spectrum: &Spectrum<M>,
    ) -> Result<Spectrum<M>, Self::Error> {
        let lock_masses = self.lock_masses.as_ref().ok_or(CorrectionError::NotFitted)?;
        if lock_masses.len() < MIN_LOCK_MASSES {
            return Err(CorrectionError::TooFewLockMasses(lock_masses.len()));
        }
        let filtered = self.params.peak_filter().apply(spectrum);
        let (expected, observed) = correction::match_lock_masses(
            lock_masses.mz_values(),
            filtered.mz_values(),
            self.params.window_ppm,
            self.params.max_skipped_points,
        )?;
        let ratios = correction::correction_ratios(&expected, &observed)?;
        let corrected = correction::apply_piecewise(
            spectrum.mz_values(),
            &observed,
            &ratios,
            self.params.mode,
            self.params.poly_degree,
        )?;
        spectrum
            .with_mz_values(corrected)
            .map_err(|e| match e {
                SpectrumError::LengthMismatch { mz, intensity } => {
                    CorrectionError::PeakCountMismatch {
                        corrected: mz,
                        original: intensity,
                    }
                }
            })
    }
}
