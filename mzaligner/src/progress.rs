use std::fmt::Display;
use std::iter::Sum;
use std::ops::{Add, AddAssign};

#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct ProgressRecord {
    pub spectra: usize,
    pub empty_spectra: usize,
    pub peaks: usize,
    pub unmatched_peaks: usize,
    pub failed_spectra: usize,
}

impl ProgressRecord {
    pub fn sum(self, other: Self) -> Self {
        self + other
    }
}

impl Add for ProgressRecord {
    type Output = ProgressRecord;

    fn add(self, rhs: Self) -> Self::Output {
        let mut dup = self;
        dup += rhs;
        dup
    }
}

impl AddAssign for ProgressRecord {
    fn add_assign(&mut self, rhs: Self) {
        self.spectra += rhs.spectra;
        self.empty_spectra += rhs.empty_spectra;
        self.peaks += rhs.peaks;
        self.unmatched_peaks += rhs.unmatched_peaks;
        self.failed_spectra += rhs.failed_spectra;
    }
}

impl Sum for ProgressRecord {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::default(), Self::sum)
    }
}

impl Display for ProgressRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Spectra: {} (empty: {}, failed: {}) | Peaks: {} (unmatched: {})",
            self.spectra, self.empty_spectra, self.failed_spectra, self.peaks, self.unmatched_peaks
        )
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_sum() {
        let a = ProgressRecord {
            spectra: 1,
            peaks: 10,
            unmatched_peaks: 2,
            ..Default::default()
        };
        let b = ProgressRecord {
            spectra: 2,
            empty_spectra: 1,
            peaks: 5,
            ..Default::default()
        };
        let total: ProgressRecord = [a, b].into_iter().sum();
        assert_eq!(total.spectra, 3);
        assert_eq!(total.empty_spectra, 1);
        assert_eq!(total.peaks, 15);
        assert_eq!(total.unmatched_peaks, 2);
        assert_eq!(
            total.to_string(),
            "Spectra: 3 (empty: 1, failed: 0) | Peaks: 15 (unmatched: 2)"
        );
    }
}
