use std::fmt::Display;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use mzalign::{
    ActiveSequenceDetection, BackendError, ExternalProcess, HierarchicalClustering,
    ReferencePointBackend,
};

/// The routine used to learn reference points from the training spectra
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BackendMethod {
    #[default]
    /// Complete-linkage clustering of the pooled m/z values
    Clustering,
    /// Track runs of peaks shared across spectra during a k-way merge
    ActiveSequence,
    /// Delegate to an external program speaking the reference point protocol
    External,
}

impl Display for BackendMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendMethod::Clustering => f.write_str("clustering"),
            BackendMethod::ActiveSequence => f.write_str("active-sequence"),
            BackendMethod::External => f.write_str("external"),
        }
    }
}

/// A reference point backend chosen at run time, which can be saved along with the
/// aligner's learned state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AlignmentBackend {
    Clustering(HierarchicalClustering),
    ActiveSequence(ActiveSequenceDetection),
    External(ExternalProcess),
}

impl Default for AlignmentBackend {
    fn default() -> Self {
        Self::Clustering(HierarchicalClustering::default())
    }
}

impl ReferencePointBackend for AlignmentBackend {
    fn compute_reference_points(
        &self,
        spectra: &[&[f64]],
        window_ppm: f64,
    ) -> Result<Vec<f64>, BackendError> {
        match self {
            AlignmentBackend::Clustering(backend) => {
                backend.compute_reference_points(spectra, window_ppm)
            }
            AlignmentBackend::ActiveSequence(backend) => {
                backend.compute_reference_points(spectra, window_ppm)
            }
            AlignmentBackend::External(backend) => {
                backend.compute_reference_points(spectra, window_ppm)
            }
        }
    }
}

pub(crate) fn positive_float(s: &str) -> Result<f64, String> {
    let value = s.parse::<f64>().map_err(|e| e.to_string())?;
    if value <= 0.0 || !value.is_finite() {
        Err(format!("`{s}` is not a positive number"))
    } else {
        Ok(value)
    }
}

pub(crate) fn non_negative_float_f32(s: &str) -> Result<f32, String> {
    let value = s.parse::<f32>().map_err(|e| e.to_string())?;
    if value < 0.0 {
        Err(format!("`{s}` is less than zero"))
    } else {
        Ok(value)
    }
}
