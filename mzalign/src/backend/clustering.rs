//! In-process reference point detection by complete-linkage agglomerative clustering
use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;

use tracing::{debug, trace};

use super::{round_mz, BackendError, ReferencePointBackend};
use crate::search::ppm_tolerance;

/// The largest number of values clustered together before a block is halved
pub const DEFAULT_MAX_BLOCK_SIZE: usize = 100_000;

/// Cluster the pooled m/z values of the training spectra and use the mean of each
/// cluster as a reference point.
///
/// The sorted values are first split into independent blocks wherever the gap to the
/// next value is wider than the tolerance at the current value. Blocks larger than
/// `max_block_size` are halved until they fit, and merges across those halves are not
/// considered. Each block is then clustered with complete linkage, cut at the mean
/// tolerance of its values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct HierarchicalClustering {
    pub max_block_size: usize,
}

impl Default for HierarchicalClustering {
    fn default() -> Self {
        Self {
            max_block_size: DEFAULT_MAX_BLOCK_SIZE,
        }
    }
}

impl HierarchicalClustering {
    pub fn new(max_block_size: usize) -> Self {
        Self { max_block_size }
    }

    /// Split sorted `values` into runs that can never share a cluster
    pub fn split_blocks<'a>(&self, values: &'a [f64], window_ppm: f64) -> Vec<&'a [f64]> {
        let mut blocks = Vec::new();
        let mut start = 0;
        for (i, pair) in values.windows(2).enumerate() {
            if pair[1] - pair[0] > ppm_tolerance(pair[0], window_ppm) {
                blocks.push(&values[start..=i]);
                start = i + 1;
            }
        }
        if start < values.len() {
            blocks.push(&values[start..]);
        }
        blocks
    }

    fn halve_block<'a>(&self, block: &'a [f64], acc: &mut Vec<&'a [f64]>) {
        if block.len() > self.max_block_size.max(1) {
            let (left, right) = block.split_at(block.len() / 2);
            self.halve_block(left, acc);
            self.halve_block(right, acc);
        } else {
            acc.push(block);
        }
    }

    /// The flat clusters of one block, as the rounded mean of each
    pub fn cluster_block(&self, block: &[f64], window_ppm: f64) -> Vec<f64> {
        if block.len() == 1 {
            return vec![round_mz(block[0])];
        }
        let threshold = block
            .iter()
            .map(|mz| ppm_tolerance(*mz, window_ppm))
            .sum::<f64>()
            / block.len() as f64;
        complete_linkage(block, threshold)
            .into_iter()
            .map(|(start, end)| {
                let members = &block[start..end];
                round_mz(members.iter().sum::<f64>() / members.len() as f64)
            })
            .collect()
    }
}

impl ReferencePointBackend for HierarchicalClustering {
    fn compute_reference_points(
        &self,
        spectra: &[&[f64]],
        window_ppm: f64,
    ) -> Result<Vec<f64>, BackendError> {
        let mut values: Vec<f64> = spectra.iter().flat_map(|s| s.iter().copied()).collect();
        values.sort_by(|a, b| a.total_cmp(b));

        let blocks = self.split_blocks(&values, window_ppm);
        debug!(
            "Split {} m/z values into {} blocks",
            values.len(),
            blocks.len()
        );

        let mut points = Vec::with_capacity(blocks.len());
        let mut sub_blocks = Vec::new();
        for block in blocks {
            sub_blocks.clear();
            self.halve_block(block, &mut sub_blocks);
            if sub_blocks.len() > 1 {
                debug!(
                    "Split a block of {} values into {} sub-blocks",
                    block.len(),
                    sub_blocks.len()
                );
            }
            for sub_block in sub_blocks.iter() {
                points.extend(self.cluster_block(sub_block, window_ppm));
            }
        }
        points.sort_by(|a, b| a.total_cmp(b));
        debug!("Found {} reference points", points.len());
        Ok(points)
    }
}

/// A candidate merge of two adjacent clusters, ordered by the span of their union
#[derive(Debug, Clone, Copy)]
struct MergeCandidate {
    span: f64,
    left: usize,
    right: usize,
}

impl PartialEq for MergeCandidate {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for MergeCandidate {}

impl PartialOrd for MergeCandidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for MergeCandidate {
    fn cmp(&self, other: &Self) -> Ordering {
        self.span
            .total_cmp(&other.span)
            .then_with(|| self.left.cmp(&other.left))
            .then_with(|| self.right.cmp(&other.right))
    }
}

#[derive(Debug, Clone, Copy)]
struct ClusterNode {
    start: usize,
    end: usize,
    prev: Option<usize>,
    next: Option<usize>,
    alive: bool,
}

/// Complete-linkage clustering of sorted one dimensional `values`, cut at `threshold`.
///
/// Returns the half-open index range of each cluster, in ascending order.
///
/// For values on a line, the complete-linkage distance between two clusters is the
/// span of their union, and the closest pair of clusters is always adjacent. So
/// repeatedly merging the adjacent pair with the smallest union span, while that span
/// is within `threshold`, gives the same clusters as cutting the full dendrogram.
fn complete_linkage(values: &[f64], threshold: f64) -> Vec<(usize, usize)> {
    let n = values.len();
    if n == 0 {
        return Vec::new();
    }
    let mut nodes: Vec<ClusterNode> = (0..n)
        .map(|i| ClusterNode {
            start: i,
            end: i + 1,
            prev: i.checked_sub(1),
            next: if i + 1 < n { Some(i + 1) } else { None },
            alive: true,
        })
        .collect();

    let span_of = |nodes: &[ClusterNode], left: usize, right: usize| {
        values[nodes[right].end - 1] - values[nodes[left].start]
    };

    let mut heap = BinaryHeap::with_capacity(n);
    for i in 0..n.saturating_sub(1) {
        heap.push(Reverse(MergeCandidate {
            span: span_of(&nodes, i, i + 1),
            left: i,
            right: i + 1,
        }));
    }

    let mut n_merges = 0usize;
    while let Some(Reverse(candidate)) = heap.pop() {
        if candidate.span > threshold {
            break;
        }
        let (left, right) = (candidate.left, candidate.right);
        if !nodes[left].alive || !nodes[right].alive {
            continue;
        }
        let merged = nodes.len();
        let prev = nodes[left].prev;
        let next = nodes[right].next;
        nodes.push(ClusterNode {
            start: nodes[left].start,
            end: nodes[right].end,
            prev,
            next,
            alive: true,
        });
        nodes[left].alive = false;
        nodes[right].alive = false;
        n_merges += 1;

        if let Some(p) = prev {
            nodes[p].next = Some(merged);
            heap.push(Reverse(MergeCandidate {
                span: span_of(&nodes, p, merged),
                left: p,
                right: merged,
            }));
        }
        if let Some(q) = next {
            nodes[q].prev = Some(merged);
            heap.push(Reverse(MergeCandidate {
                span: span_of(&nodes, merged, q),
                left: merged,
                right: q,
            }));
        }
    }
    trace!(
        "Merged {n} values {n_merges} times with threshold {threshold:0.6}"
    );

    let mut clusters: Vec<(usize, usize)> = nodes
        .iter()
        .filter(|node| node.alive)
        .map(|node| (node.start, node.end))
        .collect();
    clusters.sort_unstable();
    clusters
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_split_blocks() {
        let values = [100.0, 100.001, 100.002, 100.01, 200.0];
        let blocks = HierarchicalClustering::default().split_blocks(&values, 15.0);
        assert_eq!(
            blocks,
            vec![&values[0..3], &values[3..4], &values[4..5]]
        );
        assert!(HierarchicalClustering::default()
            .split_blocks(&[], 15.0)
            .is_empty());
    }

    #[test]
    fn test_complete_linkage_chain() {
        // Single linkage would chain these together, complete linkage must not.
        let values = [100.0, 100.0008, 100.0018, 100.0026];
        let clusters = complete_linkage(&values, 0.0012);
        assert_eq!(clusters, vec![(0, 2), (2, 4)]);
    }

    #[test]
    fn test_complete_linkage_threshold() {
        let values = [10.0, 10.5, 11.0, 20.0];
        assert_eq!(complete_linkage(&values, 1.0), vec![(0, 3), (3, 4)]);
        assert_eq!(complete_linkage(&values, 0.4), vec![(0, 1), (1, 2), (2, 3), (3, 4)]);
        assert_eq!(complete_linkage(&values, 10.0), vec![(0, 4)]);
        assert_eq!(complete_linkage(&[5.0], 1.0), vec![(0, 1)]);
    }

    /// Pairwise complete linkage over every pair of clusters, merging the closest pair
    /// until none is within `threshold`.
    fn pairwise_complete_linkage(values: &[f64], threshold: f64) -> Vec<(usize, usize)> {
        let mut clusters: Vec<Vec<usize>> = (0..values.len()).map(|i| vec![i]).collect();
        let linkage = |a: &[usize], b: &[usize]| {
            a.iter()
                .flat_map(|i| b.iter().map(move |j| (values[*i] - values[*j]).abs()))
                .fold(0.0, f64::max)
        };
        loop {
            let mut best: Option<(f64, usize, usize)> = None;
            for i in 0..clusters.len() {
                for j in (i + 1)..clusters.len() {
                    let d = linkage(&clusters[i], &clusters[j]);
                    if best.map_or(true, |(bd, _, _)| d < bd) {
                        best = Some((d, i, j));
                    }
                }
            }
            match best {
                Some((d, i, j)) if d <= threshold => {
                    let merged = clusters.remove(j);
                    clusters[i].extend(merged);
                }
                _ => break,
            }
        }
        let mut ranges: Vec<(usize, usize)> = clusters
            .iter()
            .map(|c| {
                let start = *c.iter().min().unwrap();
                let end = *c.iter().max().unwrap() + 1;
                assert_eq!(end - start, c.len(), "cluster {c:?} is not contiguous");
                (start, end)
            })
            .collect();
        ranges.sort();
        ranges
    }

    #[test]
    fn test_complete_linkage_matches_pairwise() {
        let mut state: u64 = 0x5eed;
        let mut uniform = || {
            state = state
                .wrapping_mul(6364136223846793005)
                .wrapping_add(1442695040888963407);
            (state >> 11) as f64 / (1u64 << 53) as f64
        };
        for _ in 0..200 {
            let n = 1 + (uniform() * 30.0) as usize;
            let mut values = Vec::with_capacity(n);
            let mut mz = 100.0 + uniform() * 900.0;
            for _ in 0..n {
                mz += uniform() * 0.002;
                values.push(mz);
            }
            let threshold = 0.001 + uniform() * 0.004;
            assert_eq!(
                complete_linkage(&values, threshold),
                pairwise_complete_linkage(&values, threshold),
                "{values:?} at {threshold}"
            );
        }
    }

    #[test]
    fn test_reference_points() {
        let a = [100.0, 300.0, 500.0];
        let b = [100.0008, 300.001, 700.0];
        let c = [99.9996, 299.998];
        let backend = HierarchicalClustering::default();
        let points = backend.compute_reference_points(&[&a, &b, &c], 15.0).unwrap();
        assert_eq!(points, vec![100.0001, 299.9997, 500.0, 700.0]);
    }

    #[test]
    fn test_separated_values_never_merge() {
        // 100.0 and 100.002 are 20 ppm apart, outside a 15 ppm window
        let a = [100.0, 100.002];
        let b = [100.0];
        let backend = HierarchicalClustering::default();
        let points = backend.compute_reference_points(&[&a, &b], 15.0).unwrap();
        assert_eq!(points, vec![100.0, 100.002]);
    }

    #[test]
    fn test_sub_blocks() {
        let values: Vec<f64> = (0..10).map(|i| 100.0 + i as f64 * 1e-4).collect();
        let whole = HierarchicalClustering::default()
            .compute_reference_points(&[&values], 15.0)
            .unwrap();
        assert_eq!(whole.len(), 1);
        let halved = HierarchicalClustering::new(4)
            .compute_reference_points(&[&values], 15.0)
            .unwrap();
        assert_eq!(halved.len(), 4);
        assert!(halved.windows(2).all(|w| w[0] <= w[1]));
    }
}
