use mzdata::spectrum::{MultiLayerSpectrum, SpectrumDescription};
use mzpeaks::{CentroidPeak, DeconvolutedPeak};

use mzalign::Spectrum;

pub(crate) type CPeak = CentroidPeak;
pub(crate) type DPeak = DeconvolutedPeak;
pub(crate) type SpectrumType = MultiLayerSpectrum<CPeak, DPeak>;
pub(crate) type PeakList = Spectrum<SpectrumDescription>;
