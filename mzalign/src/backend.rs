//! Strategies for learning reference m/z positions from a training corpus.
//!
//! A [`ReferencePointBackend`] receives the ascending m/z values of every training
//! spectrum and a ppm tolerance, and returns the sorted reference points that a
//! [`ReferenceAligner`](crate::aligner::ReferenceAligner) snaps peaks onto.
use std::io;

use thiserror::Error;

pub mod active_sequence;
pub mod clustering;
pub mod external;

pub use active_sequence::ActiveSequenceDetection;
pub use clustering::HierarchicalClustering;
pub use external::ExternalProcess;

/// Round an m/z value to the 4 decimal places reference points are reported at
#[inline]
pub fn round_mz(mz: f64) -> f64 {
    (mz * 1e4).round() / 1e4
}

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("An I/O error occurred while exchanging reference points: {0}")]
    Io(#[from] io::Error),
    #[error("Could not parse {value:?} on line {line} as an m/z value: {reason}")]
    MalformedValue {
        line: usize,
        value: String,
        reason: String,
    },
    #[error("{program} failed with {status}: {stderr}")]
    ProcessFailed {
        program: String,
        status: String,
        stderr: String,
    },
}

/// Compute reference points from the m/z values of a set of spectra.
///
/// Each entry of `spectra` must be sorted in ascending order. `window_ppm` is the
/// half-width of the tolerance window around an m/z value. The result is sorted in
/// ascending order and every value is rounded with [`round_mz`].
pub trait ReferencePointBackend {
    fn compute_reference_points(
        &self,
        spectra: &[&[f64]],
        window_ppm: f64,
    ) -> Result<Vec<f64>, BackendError>;
}

impl<T: ReferencePointBackend + ?Sized> ReferencePointBackend for Box<T> {
    fn compute_reference_points(
        &self,
        spectra: &[&[f64]],
        window_ppm: f64,
    ) -> Result<Vec<f64>, BackendError> {
        (**self).compute_reference_points(spectra, window_ppm)
    }
}

impl<T: ReferencePointBackend + ?Sized> ReferencePointBackend for &T {
    fn compute_reference_points(
        &self,
        spectra: &[&[f64]],
        window_ppm: f64,
    ) -> Result<Vec<f64>, BackendError> {
        (**self).compute_reference_points(spectra, window_ppm)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_round_mz() {
        assert_eq!(round_mz(100.123449), 100.1234);
        assert_eq!(round_mz(100.12346), 100.1235);
        assert_eq!(round_mz(250.0), 250.0);
    }

    #[test]
    fn test_dyn_backend() {
        let backends: Vec<Box<dyn ReferencePointBackend>> = vec![
            Box::new(HierarchicalClustering::default()),
            Box::new(ActiveSequenceDetection),
        ];
        let a = [100.0, 200.0];
        let b = [100.0005, 200.001];
        for backend in backends.iter() {
            let points = backend.compute_reference_points(&[&a, &b], 15.0).unwrap();
            assert_eq!(points.len(), 2);
            assert!((points[0] - 100.0002).abs() < 1e-3);
            assert!((points[1] - 200.0005).abs() < 1e-3);
        }
    }
}
