/*! The fit-then-transform protocol shared by every spectrum processing step */
use crate::spectrum::Spectrum;

/// A processing step that learns some state from a training set of spectra, then
/// applies it to any number of spectra.
///
/// `fit` is not re-entrant: it replaces the learned state in place, so concurrent
/// training runs need one instance each. Once fitted, the learned state is only read,
/// so `transform_spectrum` may be called from many threads at once.
pub trait SpectrumTransformer {
    type Error;

    /// Learn from `training`, replacing any previously learned state
    fn fit<M>(&mut self, training: &[Spectrum<M>]) -> Result<(), Self::Error>;

    /// Produce a transformed copy of one spectrum. The input is never modified.
    fn transform_spectrum<M: Clone>(&self, spectrum: &Spectrum<M>) -> Result<Spectrum<M>, Self::Error>;

    /// Transform every spectrum in `spectra`, stopping at the first failure
    fn transform<M: Clone>(&self, spectra: &[Spectrum<M>]) -> Result<Vec<Spectrum<M>>, Self::Error> {
        spectra.iter().map(|s| self.transform_spectrum(s)).collect()
    }

    fn fit_transform<M: Clone>(
        &mut self,
        spectra: &[Spectrum<M>],
    ) -> Result<Vec<Spectrum<M>>, Self::Error> {
        self.fit(spectra)?;
        self.transform(spectra)
    }
}
