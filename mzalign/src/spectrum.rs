//! A minimal peak list value shared by the aligner and the lock mass corrector
use std::iter::Zip;
use std::slice::Iter;

#[cfg(feature = "mzpeaks")]
use mzpeaks::{prelude::*, CentroidPeak, IndexType};
use thiserror::Error;

/// The number of decimal places reported by default for m/z values
pub const DEFAULT_MZ_PRECISION: u8 = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SpectrumError {
    #[error("Found {mz} m/z values but {intensity} intensity values")]
    LengthMismatch { mz: usize, intensity: usize },
}

/// A centroided mass spectrum stored as parallel m/z and intensity arrays.
///
/// `M` is arbitrary metadata owned by the caller. Every operation that produces a
/// modified copy of a spectrum clones it, so the copy never shares state with the
/// original.
///
/// The m/z values are expected to be sorted in ascending order. This is not enforced,
/// but every search in this crate relies on it.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Spectrum<M = ()> {
    mz_values: Vec<f64>,
    intensity_values: Vec<f32>,
    mz_precision: u8,
    metadata: M,
}

impl<M> Spectrum<M> {
    pub fn new(
        mz_values: Vec<f64>,
        intensity_values: Vec<f32>,
        mz_precision: u8,
        metadata: M,
    ) -> Result<Self, SpectrumError> {
        if mz_values.len() != intensity_values.len() {
            return Err(SpectrumError::LengthMismatch {
                mz: mz_values.len(),
                intensity: intensity_values.len(),
            });
        }
        Ok(Self {
            mz_values,
            intensity_values,
            mz_precision,
            metadata,
        })
    }

    pub fn mz_values(&self) -> &[f64] {
        &self.mz_values
    }

    pub fn intensity_values(&self) -> &[f32] {
        &self.intensity_values
    }

    pub fn mz_precision(&self) -> u8 {
        self.mz_precision
    }

    pub fn metadata(&self) -> &M {
        &self.metadata
    }

    pub fn len(&self) -> usize {
        self.mz_values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mz_values.is_empty()
    }

    /// Check the ascending m/z precondition
    pub fn is_sorted(&self) -> bool {
        self.mz_values.windows(2).all(|w| w[0] <= w[1])
    }

    /// Iterate over `(mz, intensity)` pairs
    pub fn iter(&self) -> Zip<Iter<'_, f64>, Iter<'_, f32>> {
        self.mz_values.iter().zip(self.intensity_values.iter())
    }

    pub fn into_parts(self) -> (Vec<f64>, Vec<f32>, u8, M) {
        (
            self.mz_values,
            self.intensity_values,
            self.mz_precision,
            self.metadata,
        )
    }
}

impl<M: Clone> Spectrum<M> {
    /// Copy this spectrum, replacing both of its arrays
    pub fn with_peaks(
        &self,
        mz_values: Vec<f64>,
        intensity_values: Vec<f32>,
    ) -> Result<Self, SpectrumError> {
        Self::new(
            mz_values,
            intensity_values,
            self.mz_precision,
            self.metadata.clone(),
        )
    }

    /// Copy this spectrum, replacing its m/z array and keeping its intensities
    pub fn with_mz_values(&self, mz_values: Vec<f64>) -> Result<Self, SpectrumError> {
        self.with_peaks(mz_values, self.intensity_values.clone())
    }

    /// Copy this spectrum, replacing each m/z value with `f(index, mz)`
    pub fn map_mz_values<F: FnMut(usize, f64) -> f64>(&self, mut f: F) -> Self {
        let mz_values = self
            .mz_values
            .iter()
            .enumerate()
            .map(|(i, mz)| f(i, *mz))
            .collect();
        Self {
            mz_values,
            intensity_values: self.intensity_values.clone(),
            mz_precision: self.mz_precision,
            metadata: self.metadata.clone(),
        }
    }

    /// Copy this spectrum, keeping only the peaks for which `keep(mz, intensity)` holds
    pub fn retain_peaks<F: Fn(f64, f32) -> bool>(&self, keep: F) -> Self {
        let (mz_values, intensity_values) = self
            .iter()
            .filter(|(mz, intensity)| keep(**mz, **intensity))
            .map(|(mz, intensity)| (*mz, *intensity))
            .unzip();
        Self {
            mz_values,
            intensity_values,
            mz_precision: self.mz_precision,
            metadata: self.metadata.clone(),
        }
    }

    /// Copy this spectrum, setting the intensity of every peak for which
    /// `erase(mz, intensity)` holds to zero
    pub fn zero_peaks<F: Fn(f64, f32) -> bool>(&self, erase: F) -> Self {
        let intensity_values = self
            .iter()
            .map(|(mz, intensity)| if erase(*mz, *intensity) { 0.0 } else { *intensity })
            .collect();
        Self {
            mz_values: self.mz_values.clone(),
            intensity_values,
            mz_precision: self.mz_precision,
            metadata: self.metadata.clone(),
        }
    }
}

impl Spectrum<()> {
    /// Build a spectrum without metadata at the default precision
    pub fn from_arrays(mz_values: Vec<f64>, intensity_values: Vec<f32>) -> Result<Self, SpectrumError> {
        Self::new(mz_values, intensity_values, DEFAULT_MZ_PRECISION, ())
    }
}

#[cfg(feature = "mzpeaks")]
impl<M> Spectrum<M> {
    /// Build a spectrum from any centroid peak list
    pub fn from_peaks<C: CentroidLike>(peaks: &[C], mz_precision: u8, metadata: M) -> Self {
        let (mz_values, intensity_values) = peaks.iter().map(|p| (p.mz(), p.intensity())).unzip();
        Self {
            mz_values,
            intensity_values,
            mz_precision,
            metadata,
        }
    }

    /// Convert the arrays back into [`CentroidPeak`]s, indexed by position
    pub fn to_centroid_peaks(&self) -> Vec<CentroidPeak> {
        self.iter()
            .enumerate()
            .map(|(i, (mz, intensity))| CentroidPeak::new(*mz, *intensity, i as IndexType))
            .collect()
    }
}
