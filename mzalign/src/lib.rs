//! Align mass spectra onto a shared reference m/z grid and recalibrate them
//! against virtual lock masses, peaks observed in every spectrum of a batch.
//!
//! Both components follow a fit-then-transform protocol through
//! [`SpectrumTransformer`]:
//! - [`ReferenceAligner`] learns a [`ReferenceSet`] by clustering the m/z values of a
//!   training corpus, then snaps peaks onto it within a ppm tolerance.
//! - [`VirtualLockMassCorrector`] learns a [`LockMassSet`] and corrects the m/z drift
//!   of each spectrum by piecewise interpolation of observed-to-expected ratios.
pub mod search;
pub mod spectrum;
pub mod filter;
pub mod traits;
pub mod interchange;
pub mod backend;
pub mod aligner;
pub mod lock_mass;
pub mod api;

pub use crate::aligner::{
    AlignedSpectrum, AlignmentError, AlignmentReport, ReferenceAligner, ReferenceSet,
};
pub use crate::api::{align_spectra, correct_spectra};
pub use crate::backend::{
    ActiveSequenceDetection, BackendError, ExternalProcess, HierarchicalClustering,
    ReferencePointBackend,
};
pub use crate::filter::PeakThresholdFilter;
pub use crate::lock_mass::{
    CorrectionError, ExtrapolationMode, LockMassParams, LockMassSet, VirtualLockMassCorrector,
};
pub use crate::search::SearchError;
pub use crate::spectrum::{Spectrum, SpectrumError};
pub use crate::traits::SpectrumTransformer;
