//! Reference point detection by sweeping a window of peaks, at most one per spectrum,
//! across a k-way merge of the training spectra.
use std::cmp::{Ordering, Reverse};
use std::collections::{BinaryHeap, VecDeque};

use tracing::debug;

use super::{round_mz, BackendError, ReferencePointBackend};
use crate::search::discard_overlapping;

/// Sweep the merged peaks of all training spectra in m/z order, growing an *active
/// sequence* that holds at most one peak from each spectrum and whose members all lie
/// within the tolerance window of its mean m/z.
///
/// Whenever the sequence can neither grow nor be followed by a peak inside its window,
/// and the last peak evicted from its left edge lies outside the window too, its mean
/// becomes a tentative reference point. Tentative points whose windows overlap are
/// discarded in pairs.
///
/// This runs in `O(n log k)` for `n` peaks over `k` spectra and is suited to very large
/// training sets, but unlike [`HierarchicalClustering`](super::HierarchicalClustering)
/// it never reports a point for a group of peaks that contains two peaks of the same
/// spectrum.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ActiveSequenceDetection;

impl ReferencePointBackend for ActiveSequenceDetection {
    fn compute_reference_points(
        &self,
        spectra: &[&[f64]],
        window_ppm: f64,
    ) -> Result<Vec<f64>, BackendError> {
        let window = window_ppm / 1e6;
        let mut heap = PeakHeap::new(spectra);
        let mut active = ActiveSequence::new(spectra.len(), window);
        let mut tentative = Vec::new();

        let mut found = false;
        while !heap.is_empty() {
            if active.is_valid(&heap) {
                found = true;
            }
            if !active.insert(&mut heap) {
                if found {
                    tentative.push(active.mz_avg);
                    found = false;
                }
                active.advance_lower_bound();
            } else if heap.is_empty() {
                while !active.is_empty() {
                    if active.is_valid(&heap) {
                        tentative.push(active.mz_avg);
                        break;
                    }
                    active.advance_lower_bound();
                }
            }
        }

        let points: Vec<f64> = discard_overlapping(&tentative, window_ppm)
            .into_iter()
            .map(round_mz)
            .collect();
        debug!(
            "Kept {} of {} tentative reference points",
            points.len(),
            tentative.len()
        );
        Ok(points)
    }
}

#[derive(Debug, Clone, Copy)]
struct MergedPeak {
    mz: f64,
    spectrum: usize,
    index: usize,
}

impl PartialEq for MergedPeak {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for MergedPeak {}

impl PartialOrd for MergedPeak {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for MergedPeak {
    fn cmp(&self, other: &Self) -> Ordering {
        self.mz
            .total_cmp(&other.mz)
            .then_with(|| self.spectrum.cmp(&other.spectrum))
            .then_with(|| self.index.cmp(&other.index))
    }
}

/// A min-heap holding the next unvisited peak of every spectrum
struct PeakHeap<'a, 'b> {
    spectra: &'a [&'b [f64]],
    heap: BinaryHeap<Reverse<MergedPeak>>,
}

impl<'a, 'b> PeakHeap<'a, 'b> {
    fn new(spectra: &'a [&'b [f64]]) -> Self {
        let heap = spectra
            .iter()
            .enumerate()
            .filter_map(|(spectrum, mz_values)| {
                mz_values.first().map(|mz| {
                    Reverse(MergedPeak {
                        mz: *mz,
                        spectrum,
                        index: 0,
                    })
                })
            })
            .collect();
        Self { spectra, heap }
    }

    fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    fn top(&self) -> Option<&MergedPeak> {
        self.heap.peek().map(|Reverse(peak)| peak)
    }

    /// Remove the smallest peak and replace it with its successor in the same spectrum
    fn pop_and_feed(&mut self) -> Option<MergedPeak> {
        let Reverse(peak) = self.heap.pop()?;
        let index = peak.index + 1;
        if let Some(mz) = self.spectra[peak.spectrum].get(index) {
            self.heap.push(Reverse(MergedPeak {
                mz: *mz,
                spectrum: peak.spectrum,
                index,
            }));
        }
        Some(peak)
    }
}

struct ActiveSequence {
    peaks: VecDeque<MergedPeak>,
    present: Vec<bool>,
    window: f64,
    mz_avg: f64,
    mz_lower_bound: f64,
}

impl ActiveSequence {
    fn new(n_spectra: usize, window: f64) -> Self {
        Self {
            peaks: VecDeque::new(),
            present: vec![false; n_spectra],
            window,
            mz_avg: 0.0,
            mz_lower_bound: -50.0,
        }
    }

    fn is_empty(&self) -> bool {
        self.peaks.is_empty()
    }

    fn upper_edge(&self) -> f64 {
        self.mz_avg * (1.0 + self.window)
    }

    fn lower_edge(&self) -> f64 {
        self.mz_avg * (1.0 - self.window)
    }

    fn is_valid(&self, heap: &PeakHeap) -> bool {
        let (Some(front), Some(back)) = (self.peaks.front(), self.peaks.back()) else {
            return false;
        };
        if let Some(next) = heap.top() {
            if next.mz <= self.upper_edge() {
                return false;
            }
        }
        back.mz <= self.upper_edge()
            && front.mz >= self.lower_edge()
            && self.mz_lower_bound < self.lower_edge()
    }

    /// Try to move the next heap peak into the sequence
    fn insert(&mut self, heap: &mut PeakHeap) -> bool {
        let Some(next) = heap.top().copied() else {
            return false;
        };
        let Some(front_mz) = self.peaks.front().map(|p| p.mz) else {
            if let Some(peak) = heap.pop_and_feed() {
                self.present[peak.spectrum] = true;
                self.mz_avg = peak.mz;
                self.peaks.push_back(peak);
            }
            return true;
        };
        if self.present[next.spectrum] {
            return false;
        }
        let n = self.peaks.len() as f64;
        let new_avg = (n * self.mz_avg + next.mz) / (n + 1.0);
        if next.mz <= new_avg * (1.0 + self.window) && front_mz >= new_avg * (1.0 - self.window) {
            if let Some(peak) = heap.pop_and_feed() {
                self.present[peak.spectrum] = true;
                self.mz_avg = new_avg;
                self.peaks.push_back(peak);
            }
            true
        } else {
            false
        }
    }

    /// Evict the leftmost peak, which becomes the new lower bound
    fn advance_lower_bound(&mut self) {
        let Some(peak) = self.peaks.pop_front() else {
            return;
        };
        self.present[peak.spectrum] = false;
        self.mz_lower_bound = peak.mz;
        let remaining = self.peaks.len() as f64;
        if self.peaks.is_empty() {
            self.mz_avg = 0.0;
        } else {
            self.mz_avg = ((remaining + 1.0) * self.mz_avg - peak.mz) / remaining;
        }
    }
}
