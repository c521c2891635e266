//! Find groups of peaks shared by every spectrum of a batch
use tracing::trace;

use crate::search::{discard_overlapping, ppm_error_window};

/// The peaks of several spectra pooled into one m/z sorted table, each tagged with the
/// index of the spectrum it came from.
#[derive(Debug, Clone, Default)]
pub struct TaggedPeaks {
    mz_values: Vec<f64>,
    spectrum_ids: Vec<usize>,
    n_spectra: usize,
}

impl TaggedPeaks {
    pub fn new<S: AsRef<[f64]>>(spectra: &[S]) -> Self {
        let mut pairs: Vec<(f64, usize)> = spectra
            .iter()
            .enumerate()
            .flat_map(|(i, mz_values)| mz_values.as_ref().iter().map(move |mz| (*mz, i)))
            .collect();
        pairs.sort_by(|a, b| a.0.total_cmp(&b.0));
        let (mz_values, spectrum_ids) = pairs.into_iter().unzip();
        Self {
            mz_values,
            spectrum_ids,
            n_spectra: spectra.len(),
        }
    }

    pub fn len(&self) -> usize {
        self.mz_values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mz_values.is_empty()
    }

    pub fn n_spectra(&self) -> usize {
        self.n_spectra
    }

    pub fn mz_values(&self) -> &[f64] {
        &self.mz_values
    }

    pub fn spectrum_ids(&self) -> &[usize] {
        &self.spectrum_ids
    }

    /// The index just past the last peak whose m/z equals `self.mz_values[i]`
    fn end_of_run(&self, i: usize) -> usize {
        let mz = self.mz_values[i];
        i + self.mz_values[i..].partition_point(|v| *v <= mz)
    }

    /// Whether the peaks in `start..end` hold exactly one peak from each spectrum
    pub fn is_complete_group(&self, start: usize, end: usize) -> bool {
        if end < start || end - start != self.n_spectra {
            return false;
        }
        let mut seen = vec![false; self.n_spectra];
        for id in self.spectrum_ids[start..end].iter() {
            if seen[*id] {
                return false;
            }
            seen[*id] = true;
        }
        true
    }

    /// Sweep a window over the sorted peaks and collect every position where it holds
    /// exactly one peak from each spectrum.
    ///
    /// The window starts as the run of peaks sharing the smallest m/z. While there is a
    /// peak past its right edge whose own `window_ppm` window could still reach the
    /// window's leftmost peak, the window grows to take in that peak and every peak
    /// with the same m/z. Otherwise the leftmost run of equal m/z peaks is dropped.
    /// Each peak enters and leaves the window once and the window keeps a count of
    /// peaks per spectrum, so the sweep is linear in the number of peaks apart from the
    /// binary searches for equal m/z runs.
    pub fn find_peak_groups(&self, window_ppm: f64) -> Vec<&[f64]> {
        let mut groups = Vec::new();
        let n = self.len();
        if n == 0 {
            return groups;
        }
        let w = window_ppm / 1e6;
        let mut window = WindowCounts::new(self.n_spectra);
        let mut start = 0;
        let mut end = self.end_of_run(0);
        window.enter(&self.spectrum_ids[start..end]);
        while start < n {
            if end - start == self.n_spectra && window.distinct == self.n_spectra {
                groups.push(&self.mz_values[start..end]);
            }
            let first_mz = self.mz_values[start];
            if end < n {
                let outer_mz = self.mz_values[end];
                let outer_window_start = outer_mz / (1.0 + w) * (1.0 - w);
                if outer_window_start <= first_mz {
                    let next_end = self.end_of_run(end);
                    window.enter(&self.spectrum_ids[end..next_end]);
                    end = next_end;
                    continue;
                }
            }
            let next_start = self.end_of_run(start);
            window.leave(&self.spectrum_ids[start..next_start]);
            start = next_start;
        }
        trace!("Found {} complete peak groups", groups.len());
        groups
    }
}

/// Per-spectrum peak counts of the sweep window
#[derive(Debug)]
struct WindowCounts {
    counts: Vec<usize>,
    distinct: usize,
}

impl WindowCounts {
    fn new(n_spectra: usize) -> Self {
        Self {
            counts: vec![0; n_spectra],
            distinct: 0,
        }
    }

    fn enter(&mut self, ids: &[usize]) {
        for id in ids {
            if self.counts[*id] == 0 {
                self.distinct += 1;
            }
            self.counts[*id] += 1;
        }
    }

    fn leave(&mut self, ids: &[usize]) {
        for id in ids {
            self.counts[*id] -= 1;
            if self.counts[*id] == 0 {
                self.distinct -= 1;
            }
        }
    }
}

/// Turn peak groups into lock mass positions, keeping the mean of each group whose
/// span fits inside the `window_ppm` window centered on that mean.
pub fn lock_mass_positions(groups: &[&[f64]], window_ppm: f64) -> Vec<f64> {
    groups
        .iter()
        .filter(|group| !group.is_empty())
        .filter_map(|group| {
            let center = group.iter().sum::<f64>() / group.len() as f64;
            let (lo, hi) = ppm_error_window(center, window_ppm);
            let min = group.iter().copied().fold(f64::INFINITY, f64::min);
            let max = group.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            (lo <= min && hi >= max).then_some(center)
        })
        .collect()
}

/// Sort lock mass positions and drop both members of every pair whose windows overlap
pub fn discard_ambiguous(mut positions: Vec<f64>, window_ppm: f64) -> Vec<f64> {
    positions.sort_by(|a, b| a.total_cmp(b));
    discard_overlapping(&positions, window_ppm)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_tagging() {
        let peaks = TaggedPeaks::new(&[vec![300.0, 100.0], vec![200.0], vec![]]);
        assert_eq!(peaks.mz_values(), &[100.0, 200.0, 300.0]);
        assert_eq!(peaks.spectrum_ids(), &[0, 1, 0]);
        assert_eq!(peaks.n_spectra(), 3);
    }

    #[test]
    fn test_complete_group() {
        let peaks = TaggedPeaks::new(&[vec![100.0, 100.001], vec![100.0005]]);
        // sorted: 100.0 (0), 100.0005 (1), 100.001 (0)
        assert!(peaks.is_complete_group(0, 2));
        assert!(peaks.is_complete_group(1, 3));
        assert!(!peaks.is_complete_group(0, 3));
        assert!(!peaks.is_complete_group(2, 1));
    }

    #[test]
    fn test_identical_spectra() {
        let spectra = vec![vec![100.0, 500.0, 900.0]; 3];
        let peaks = TaggedPeaks::new(&spectra);
        let groups = peaks.find_peak_groups(50.0);
        assert_eq!(groups.len(), 3);
        assert_eq!(groups[1], &[500.0, 500.0, 500.0]);
        assert_eq!(lock_mass_positions(&groups, 50.0), vec![100.0, 500.0, 900.0]);
    }

    #[test]
    fn test_duplicate_spectrum_in_window() {
        // Spectrum 0 has two peaks within the window and spectrum 1 has one, so only
        // the windows pairing one of them with spectrum 1 qualify.
        let peaks = TaggedPeaks::new(&[vec![200.0, 200.002], vec![200.001]]);
        let groups = peaks.find_peak_groups(10.0);
        assert_eq!(groups, vec![&[200.0, 200.001][..], &[200.001, 200.002][..]]);
    }

    #[test]
    fn test_counts_follow_the_window() {
        // sorted: 100.0 (0), 100.0004 (1), 100.0008 (0), 100.0012 (2)
        let peaks = TaggedPeaks::new(&[vec![100.0, 100.0008], vec![100.0004], vec![100.0012]]);
        let groups = peaks.find_peak_groups(20.0);
        assert_eq!(groups, vec![&[100.0004, 100.0008, 100.0012][..]]);
        assert!(!peaks.is_complete_group(0, 3));
        assert!(peaks.is_complete_group(1, 4));
    }

    #[test]
    fn test_missing_spectrum() {
        let peaks = TaggedPeaks::new(&[vec![100.0, 200.0], vec![100.0]]);
        let groups = peaks.find_peak_groups(10.0);
        assert_eq!(groups, vec![&[100.0, 100.0][..]]);
        assert!(TaggedPeaks::new::<Vec<f64>>(&[]).find_peak_groups(10.0).is_empty());
    }

    #[test]
    fn test_containment() {
        // The mean sits too far from the high outlier for the window to cover it
        let peaks = TaggedPeaks::new(&[vec![400.0], vec![400.0], vec![400.039]]);
        let groups = peaks.find_peak_groups(50.0);
        assert_eq!(groups.len(), 1);
        assert!(lock_mass_positions(&groups, 50.0).is_empty());
    }

    #[test]
    fn test_discard_ambiguous() {
        let kept = discard_ambiguous(vec![300.0, 200.005, 200.0], 50.0);
        assert_eq!(kept, vec![300.0]);
    }
}
