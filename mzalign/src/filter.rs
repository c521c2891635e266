//! Intensity threshold filtering
use std::convert::Infallible;

use crate::spectrum::Spectrum;
use crate::traits::SpectrumTransformer;

/// Remove or silence every peak whose intensity is less than or equal to `threshold`.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PeakThresholdFilter {
    pub threshold: f32,
    /// When `true`, filtered peaks are dropped from both arrays. Otherwise their
    /// intensity is set to zero and the m/z array is left untouched.
    pub remove_mz_values: bool,
}

impl Default for PeakThresholdFilter {
    fn default() -> Self {
        Self {
            threshold: 1.0,
            remove_mz_values: true,
        }
    }
}

impl PeakThresholdFilter {
    pub fn new(threshold: f32, remove_mz_values: bool) -> Self {
        Self {
            threshold,
            remove_mz_values,
        }
    }

    /// Whether a peak of this intensity passes the filter
    pub fn keeps(&self, intensity: f32) -> bool {
        intensity > self.threshold
    }

    pub fn apply<M: Clone>(&self, spectrum: &Spectrum<M>) -> Spectrum<M> {
        if self.remove_mz_values {
            spectrum.retain_peaks(|_, intensity| self.keeps(intensity))
        } else {
            spectrum.zero_peaks(|_, intensity| !self.keeps(intensity))
        }
    }

    /// The m/z values of the peaks that pass the filter, without copying the metadata
    pub fn retained_mz_values<M>(&self, spectrum: &Spectrum<M>) -> Vec<f64> {
        spectrum
            .iter()
            .filter(|(_, intensity)| self.keeps(**intensity))
            .map(|(mz, _)| *mz)
            .collect()
    }
}

impl SpectrumTransformer for PeakThresholdFilter {
    type Error = Infallible;

    fn fit<M>(&mut self, _training: &[Spectrum<M>]) -> Result<(), Self::Error> {
        Ok(())
    }

    fn transform_spectrum<M: Clone>(&self, spectrum: &Spectrum<M>) -> Result<Spectrum<M>, Self::Error> {
        Ok(self.apply(spectrum))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn spectrum() -> Spectrum {
        Spectrum::from_arrays(vec![100.0, 200.0, 300.0, 400.0], vec![5.0, 1.0, 0.5, 20.0]).unwrap()
    }

    #[test]
    fn test_remove() {
        let filtered = PeakThresholdFilter::new(1.0, true).apply(&spectrum());
        assert_eq!(filtered.mz_values(), &[100.0, 400.0]);
        assert_eq!(filtered.intensity_values(), &[5.0, 20.0]);
    }

    #[test]
    fn test_zero() {
        let filtered = PeakThresholdFilter::new(1.0, false).apply(&spectrum());
        assert_eq!(filtered.mz_values(), spectrum().mz_values());
        assert_eq!(filtered.intensity_values(), &[5.0, 0.0, 0.0, 20.0]);
    }

    #[test]
    fn test_retained_mz_values() {
        let filter = PeakThresholdFilter::new(1.0, false);
        assert!(filter.keeps(1.5));
        assert!(!filter.keeps(1.0));
        assert_eq!(filter.retained_mz_values(&spectrum()), vec![100.0, 400.0]);
    }

    #[test]
    fn test_transform_batch() {
        let batch = vec![spectrum(), spectrum()];
        let mut filter = PeakThresholdFilter::new(4.0, true);
        let out = filter.fit_transform(&batch).unwrap();
        assert_eq!(out.len(), 2);
        assert!(out.iter().all(|s| s.len() == 2));
    }
}
