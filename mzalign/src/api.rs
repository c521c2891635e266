//! * High level APIs for one-shot alignment and correction
use crate::aligner::{AlignmentError, ReferenceAligner, DEFAULT_MAX_MZ, DEFAULT_MIN_MZ};
use crate::lock_mass::{CorrectionError, LockMassParams, VirtualLockMassCorrector};
use crate::spectrum::Spectrum;
use crate::traits::SpectrumTransformer;

/// Learn a reference set from `training` and align `spectra` onto it.
///
/// # Arguments
/// - `training`: The spectra to cluster m/z values from
/// - `spectra`: The spectra to align
/// - `window_ppm`: The half-width of the clustering and matching window, in ppm
///
/// # Note
/// If the same reference set will be applied to several batches, create a
/// [`ReferenceAligner`] and keep it instead, so the clustering runs only once.
pub fn align_spectra<M: Clone, N: Clone>(
    training: &[Spectrum<M>],
    spectra: &[Spectrum<N>],
    window_ppm: f64,
) -> Result<Vec<Spectrum<N>>, AlignmentError> {
    let mut aligner = ReferenceAligner::new(DEFAULT_MIN_MZ, DEFAULT_MAX_MZ, window_ppm);
    aligner.fit(training)?;
    aligner.transform(spectra)
}

/// Learn virtual lock masses from `training` and correct the m/z drift of `spectra`.
///
/// # Arguments
/// - `training`: The spectra to find shared peaks in
/// - `spectra`: The spectra to correct
/// - `params`: The window, intensity threshold and interpolation settings
pub fn correct_spectra<M: Clone, N: Clone>(
    training: &[Spectrum<M>],
    spectra: &[Spectrum<N>],
    params: LockMassParams,
) -> Result<Vec<Spectrum<N>>, CorrectionError> {
    let mut corrector = VirtualLockMassCorrector::new(params);
    corrector.fit(training)?;
    corrector.transform(spectra)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_align_spectra() {
        let training = vec![
            Spectrum::from_arrays(vec![150.0, 400.0], vec![1.0, 1.0]).unwrap(),
            Spectrum::from_arrays(vec![150.001, 400.002], vec![1.0, 1.0]).unwrap(),
        ];
        let query =
            Spectrum::new(vec![150.0012, 300.0], vec![3.0, 4.0], 4, "scan=7".to_string()).unwrap();
        let aligned = align_spectra(&training, &[query], 15.0).unwrap();
        assert_eq!(aligned[0].mz_values(), &[150.0005, 300.0]);
        assert_eq!(aligned[0].metadata(), "scan=7");
    }

    #[test]
    fn test_correct_spectra() {
        let training: Vec<Spectrum> = (0..4)
            .map(|i| {
                let drift = 1.0 + i as f64 * 1e-6;
                Spectrum::from_arrays(
                    vec![120.0 * drift, 450.0 * drift, 810.0 * drift],
                    vec![50.0; 3],
                )
                .unwrap()
            })
            .collect();
        let params = LockMassParams {
            window_ppm: 20.0,
            ..Default::default()
        };
        let corrected = correct_spectra(&training, &training, params).unwrap();
        assert_eq!(corrected.len(), 4);
        let targets = [
            training.iter().map(|s| s.mz_values()[0]).sum::<f64>() / 4.0,
            training.iter().map(|s| s.mz_values()[1]).sum::<f64>() / 4.0,
            training.iter().map(|s| s.mz_values()[2]).sum::<f64>() / 4.0,
        ];
        for spectrum in corrected {
            for (mz, target) in spectrum.mz_values().iter().zip(targets) {
                assert!((mz - target).abs() < 1e-9);
            }
        }
    }
}
