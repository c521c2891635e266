//! Snap the peaks of each spectrum onto a reference m/z grid learned from a training
//! corpus.
use std::fmt::Display;

use thiserror::Error;
use tracing::{debug, info};

use crate::backend::{round_mz, BackendError, HierarchicalClustering, ReferencePointBackend};
use crate::search::{nearest, ppm_window_slice};
use crate::spectrum::Spectrum;
use crate::traits::SpectrumTransformer;

/// The default lower m/z bound of an aligner
pub const DEFAULT_MIN_MZ: f64 = 50.0;
/// The default upper m/z bound of an aligner
pub const DEFAULT_MAX_MZ: f64 = 1200.0;
/// The default half-width of the alignment window, in ppm
pub const DEFAULT_ALIGNMENT_WINDOW_PPM: f64 = 15.0;

#[derive(Debug, Error)]
pub enum AlignmentError {
    #[error("The aligner must be fitted before it can transform spectra")]
    NotFitted,
    #[error("Failed to compute reference points: {0}")]
    Backend(#[from] BackendError),
}

/// A sorted list of reference m/z values, each rounded to 4 decimal places
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ReferenceSet {
    mz_values: Vec<f64>,
}

impl ReferenceSet {
    pub fn new(mut mz_values: Vec<f64>) -> Self {
        mz_values.iter_mut().for_each(|mz| *mz = round_mz(*mz));
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

    /// Find the reference value `mz` should be moved to, if any lies within `window_ppm`
    /// of it. When several do, the nearest one is chosen.
    pub fn find(&self, mz: f64, window_ppm: f64) -> Option<f64> {
        let hits = ppm_window_slice(&self.mz_values, mz, window_ppm).ok()?;
        match hits {
            [] => None,
            [only] => Some(*only),
            _ => nearest(hits, mz).map(|(value, _)| value),
        }
    }
}

impl From<Vec<f64>> for ReferenceSet {
    fn from(value: Vec<f64>) -> Self {
        Self::new(value)
    }
}

/// A spectrum after alignment, with the indices of the peaks that had no reference
/// value within tolerance and so kept their original m/z.
#[derive(Debug, Clone, PartialEq)]
pub struct AlignedSpectrum<M = ()> {
    pub spectrum: Spectrum<M>,
    pub unmatched: Vec<usize>,
}

/// How well a batch of spectra was covered by the reference set
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AlignmentReport {
    pub n_peaks: usize,
    pub n_unmatched: usize,
    /// The number of unmatched peaks of each spectrum, in input order
    pub unmatched_per_spectrum: Vec<usize>,
}

impl AlignmentReport {
    pub fn n_spectra(&self) -> usize {
        self.unmatched_per_spectrum.len()
    }

    pub fn n_matched(&self) -> usize {
        self.n_peaks - self.n_unmatched
    }

    /// The fraction of peaks that were moved onto a reference value. An empty batch is
    /// considered fully matched.
    pub fn matched_fraction(&self) -> f64 {
        if self.n_peaks == 0 {
            1.0
        } else {
            self.n_matched() as f64 / self.n_peaks as f64
        }
    }

    /// Record the outcome of aligning one more spectrum
    pub fn add(&mut self, n_peaks: usize, n_unmatched: usize) {
        self.n_peaks += n_peaks;
        self.n_unmatched += n_unmatched;
        self.unmatched_per_spectrum.push(n_unmatched);
    }
}

impl Display for AlignmentReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} of {} peaks in {} spectra matched a reference value ({:0.2}%)",
            self.n_matched(),
            self.n_peaks,
            self.n_spectra(),
            self.matched_fraction() * 100.0
        )
    }
}

/// Align spectra onto a shared set of reference m/z values.
///
/// [`SpectrumTransformer::fit`] hands the m/z values of the training spectra to the
/// [`ReferencePointBackend`] `B` and keeps the resulting [`ReferenceSet`]. Each peak of
/// a transformed spectrum is then moved to the reference value within `window_ppm` of
/// it, the nearest one if there are several. Peaks with no reference value in range
/// keep their m/z. Peaks are never dropped or reordered, and intensities are untouched.
///
/// `min_mz` and `max_mz` describe the acquisition range and are carried along for the
/// caller, they do not restrict matching.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ReferenceAligner<B = HierarchicalClustering> {
    pub min_mz: f64,
    pub max_mz: f64,
    pub window_ppm: f64,
    backend: B,
    reference_set: Option<ReferenceSet>,
}

impl Default for ReferenceAligner<HierarchicalClustering> {
    fn default() -> Self {
        Self::new(DEFAULT_MIN_MZ, DEFAULT_MAX_MZ, DEFAULT_ALIGNMENT_WINDOW_PPM)
    }
}

impl ReferenceAligner<HierarchicalClustering> {
    pub fn new(min_mz: f64, max_mz: f64, window_ppm: f64) -> Self {
        Self::with_backend(min_mz, max_mz, window_ppm, HierarchicalClustering::default())
    }
}

impl<B> ReferenceAligner<B> {
    pub fn with_backend(min_mz: f64, max_mz: f64, window_ppm: f64, backend: B) -> Self {
        Self {
            min_mz,
            max_mz,
            window_ppm,
            backend,
            reference_set: None,
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn reference_set(&self) -> Option<&ReferenceSet> {
        self.reference_set.as_ref()
    }

    /// Install a reference set learned elsewhere, replacing any current one
    pub fn set_reference_set(&mut self, reference_set: ReferenceSet) {
        self.reference_set = Some(reference_set);
    }

    pub fn is_fitted(&self) -> bool {
        self.reference_set.is_some()
    }

    /// Align one spectrum, also reporting which peaks were left in place
    pub fn align_spectrum<M: Clone>(
        &self,
        spectrum: &Spectrum<M>,
    ) -> Result<AlignedSpectrum<M>, AlignmentError> {
        let reference_set = self
            .reference_set
            .as_ref()
            .ok_or(AlignmentError::NotFitted)?;
        let mut unmatched = Vec::new();
        let aligned = spectrum.map_mz_values(|i, mz| {
            reference_set.find(mz, self.window_ppm).unwrap_or_else(|| {
                unmatched.push(i);
                mz
            })
        });
        Ok(AlignedSpectrum {
            spectrum: aligned,
            unmatched,
        })
    }

    /// As [`SpectrumTransformer::transform`], also summarizing how many peaks were
    /// matched
    pub fn transform_with_report<M: Clone>(
        &self,
        spectra: &[Spectrum<M>],
    ) -> Result<(Vec<Spectrum<M>>, AlignmentReport), AlignmentError> {
        let mut report = AlignmentReport::default();
        let mut aligned = Vec::with_capacity(spectra.len());
        for spectrum in spectra {
            let result = self.align_spectrum(spectrum)?;
            report.add(spectrum.len(), result.unmatched.len());
            aligned.push(result.spectrum);
        }
        debug!("{report}");
        Ok((aligned, report))
    }
}

impl<B: ReferencePointBackend> SpectrumTransformer for ReferenceAligner<B> {
    type Error = AlignmentError;

    fn fit<M>(&mut self, training: &[Spectrum<M>]) -> Result<(), Self::Error> {
        let mz_lists: Vec<&[f64]> = training.iter().map(|s| s.mz_values()).collect();
        let points = self
            .backend
            .compute_reference_points(&mz_lists, self.window_ppm)?;
        let reference_set = ReferenceSet::new(points);
        info!(
            "Learned {} reference points from {} spectra",
            reference_set.len(),
            training.len()
        );
        self.reference_set = Some(reference_set);
        Ok(())
    }

    fn transform_spectrum<M: Clone>(
        &self,
        spectrum: &Spectrum<M>,
    ) -> Result<Spectrum<M>, Self::Error> {
        self.align_spectrum(spectrum).map(|aligned| aligned.spectrum)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::backend::ActiveSequenceDetection;

    fn training() -> Vec<Spectrum> {
        vec![
            Spectrum::from_arrays(vec![100.0, 300.0, 500.0], vec![10.0, 20.0, 30.0]).unwrap(),
            Spectrum::from_arrays(vec![100.0008, 300.001, 700.0], vec![5.0, 5.0, 5.0]).unwrap(),
            Spectrum::from_arrays(vec![99.9996, 299.998], vec![1.0, 2.0]).unwrap(),
        ]
    }

    struct FixedPoints(Vec<f64>);

    impl ReferencePointBackend for FixedPoints {
        fn compute_reference_points(
            &self,
            _spectra: &[&[f64]],
            _window_ppm: f64,
        ) -> Result<Vec<f64>, BackendError> {
            Ok(self.0.clone())
        }
    }

    #[test]
    fn test_not_fitted() {
        let aligner: ReferenceAligner = ReferenceAligner::default();
        let spectrum = training().remove(0);
        assert!(matches!(
            aligner.transform_spectrum(&spectrum),
            Err(AlignmentError::NotFitted)
        ));
        assert!(!aligner.is_fitted());
    }

    #[test_log::test]
    fn test_fit() {
        let mut aligner: ReferenceAligner = ReferenceAligner::default();
        aligner.fit(&training()).unwrap();
        assert_eq!(
            aligner.reference_set().unwrap().mz_values(),
            &[100.0001, 299.9997, 500.0, 700.0]
        );
    }

    #[test]
    fn test_match_rules() {
        let mut aligner = ReferenceAligner::with_backend(
            50.0,
            1200.0,
            15.0,
            FixedPoints(vec![200.0, 200.002, 400.0]),
        );
        aligner.fit::<()>(&[]).unwrap();
        let spectrum = Spectrum::from_arrays(
            vec![150.0, 200.0015, 399.996, 900.0],
            vec![1.0, 2.0, 3.0, 4.0],
        )
        .unwrap();
        let aligned = aligner.align_spectrum(&spectrum).unwrap();
        // no match, nearest of two, single match, beyond the last reference
        assert_eq!(aligned.spectrum.mz_values(), &[150.0, 200.002, 400.0, 900.0]);
        assert_eq!(aligned.spectrum.intensity_values(), spectrum.intensity_values());
        assert_eq!(aligned.unmatched, vec![0, 3]);
    }

    #[test]
    fn test_idempotent_and_order_preserving() {
        let mut aligner: ReferenceAligner = ReferenceAligner::default();
        let training = training();
        let once = aligner.fit_transform(&training).unwrap();
        let twice = aligner.transform(&once).unwrap();
        assert_eq!(once, twice);
        for (before, after) in training.iter().zip(once.iter()) {
            assert_eq!(before.len(), after.len());
            assert_eq!(before.intensity_values(), after.intensity_values());
        }
    }

    #[test]
    fn test_block_independence() {
        // 100.0 and 100.002 are 20 ppm apart, so no 15 ppm cluster can hold both
        let training = vec![
            Spectrum::from_arrays(vec![100.0, 100.002], vec![1.0, 1.0]).unwrap(),
            Spectrum::from_arrays(vec![100.0, 250.0], vec![1.0, 1.0]).unwrap(),
        ];
        let mut aligner: ReferenceAligner = ReferenceAligner::default();
        let out = aligner.fit_transform(&training).unwrap();
        assert_eq!(out[0].mz_values(), &[100.0, 100.002]);
        assert_ne!(out[0].mz_values()[0], out[0].mz_values()[1]);
    }

    #[test]
    fn test_report() {
        let mut aligner: ReferenceAligner = ReferenceAligner::default();
        aligner.fit(&training()).unwrap();
        let query = vec![
            Spectrum::from_arrays(vec![100.0005, 150.0], vec![1.0, 1.0]).unwrap(),
            Spectrum::from_arrays(vec![], vec![]).unwrap(),
        ];
        let (aligned, report) = aligner.transform_with_report(&query).unwrap();
        assert_eq!(aligned[0].mz_values(), &[100.0001, 150.0]);
        assert!(aligned[1].is_empty());
        assert_eq!(report.n_peaks, 2);
        assert_eq!(report.n_unmatched, 1);
        assert_eq!(report.unmatched_per_spectrum, vec![1, 0]);
        assert_eq!(report.n_spectra(), 2);
        assert!((report.matched_fraction() - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_active_sequence_backend() {
        let mut aligner =
            ReferenceAligner::with_backend(50.0, 1200.0, 15.0, ActiveSequenceDetection);
        aligner.fit(&training()).unwrap();
        let points = aligner.reference_set().unwrap().mz_values();
        assert!(points.windows(2).all(|w| w[0] < w[1]));
        assert!(points.iter().any(|p| (p - 100.0).abs() < 1e-3));
    }

    #[test]
    fn test_shared_across_threads() {
        use rayon::prelude::*;
        let mut aligner: ReferenceAligner = ReferenceAligner::default();
        aligner.fit(&training()).unwrap();
        let batch: Vec<Spectrum> = (0..64).map(|i| training()[i % 3].clone()).collect();
        let parallel: Vec<Spectrum> = batch
            .par_iter()
            .map(|s| aligner.transform_spectrum(s).unwrap())
            .collect();
        let serial = aligner.transform(&batch).unwrap();
        assert_eq!(parallel, serial);
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_serde() {
        let mut aligner: ReferenceAligner = ReferenceAligner::default();
        aligner.fit(&training()).unwrap();
        let text = serde_json::to_string(&aligner).unwrap();
        let restored: ReferenceAligner = serde_json::from_str(&text).unwrap();
        assert_eq!(restored.reference_set(), aligner.reference_set());
        assert_eq!(restored.window_ppm, aligner.window_ppm);
    }
}
