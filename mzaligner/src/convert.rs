//! Conversion between `mzdata` spectra and the peak lists the alignment components work on
use mzdata::prelude::*;
use mzdata::spectrum::{SignalContinuity, SpectrumConversionError};
use mzpeaks::MZPeakSetType;

use mzalign::spectrum::DEFAULT_MZ_PRECISION;
use mzalign::Spectrum;

use crate::types::{CPeak, PeakList, SpectrumType};

/// Build the centroid peak list of `spectrum`, carrying its description along as metadata.
///
/// Spectra without any signal become empty peak lists. Profile spectra are rejected.
pub(crate) fn to_peak_list(
    mut spectrum: SpectrumType,
) -> Result<PeakList, (String, SpectrumConversionError)> {
    let peaks: Vec<CPeak> = match spectrum.try_build_centroids() {
        Ok(peaks) => peaks.iter().cloned().collect(),
        Err(SpectrumConversionError::NoPeakData) => Vec::new(),
        Err(e) => return Err((spectrum.description.id.clone(), e)),
    };
    Ok(Spectrum::from_peaks(
        &peaks,
        DEFAULT_MZ_PRECISION,
        spectrum.description,
    ))
}

/// Rebuild an `mzdata` spectrum from a transformed peak list
pub(crate) fn from_peak_list(peak_list: PeakList) -> SpectrumType {
    let peaks = MZPeakSetType::new(peak_list.to_centroid_peaks());
    let (_, _, _, mut description) = peak_list.into_parts();
    description.signal_continuity = SignalContinuity::Centroid;
    SpectrumType::new(description, None, Some(peaks), None)
}

#[cfg(test)]
mod test {
    use super::*;

    use mzdata::spectrum::SpectrumDescription;
    use mzpeaks::CentroidPeak;

    fn make_spectrum(peaks: Vec<CentroidPeak>) -> SpectrumType {
        let mut description = SpectrumDescription::default();
        description.id = "scan=1".to_string();
        description.ms_level = 2;
        description.signal_continuity = SignalContinuity::Centroid;
        SpectrumType::new(description, None, Some(MZPeakSetType::new(peaks)), None)
    }

    #[test]
    fn test_round_trip_description() {
        let spectrum = make_spectrum(vec![
            CentroidPeak::new(200.0, 5.0, 0),
            CentroidPeak::new(100.0, 10.0, 1),
        ]);
        let peak_list = to_peak_list(spectrum).unwrap();
        assert_eq!(peak_list.mz_values(), &[100.0, 200.0]);
        assert_eq!(peak_list.intensity_values(), &[10.0, 5.0]);
        assert_eq!(peak_list.metadata().id, "scan=1");

        let shifted = peak_list.map_mz_values(|_, mz| mz + 0.5);
        let rebuilt = from_peak_list(shifted);
        assert_eq!(rebuilt.id(), "scan=1");
        assert_eq!(rebuilt.ms_level(), 2);
        let peaks = rebuilt.peaks.unwrap();
        assert_eq!(peaks.len(), 2);
        assert!((peaks[0].mz - 100.5).abs() < 1e-12);
        assert!((peaks[1].mz - 200.5).abs() < 1e-12);
    }

    #[test]
    fn test_empty_spectrum() {
        let description = SpectrumDescription::default();
        let spectrum = SpectrumType::new(description, None, None, None);
        let peak_list = to_peak_list(spectrum).unwrap();
        assert!(peak_list.is_empty());
    }
}
