//! Match lock masses in a spectrum and interpolate the correction between them
use tracing::trace;

use super::{CorrectionError, ExtrapolationMode};
use crate::search::{nearest_from, ppm_tolerance};

/// Locate each lock mass in the sorted `mz_values` of one spectrum.
///
/// Returns the lock masses that were found alongside the m/z they were observed at. A
/// lock mass is found when the nearest peak lies within `window_ppm` of it. When
/// `max_skipped` is set and more than that many lock masses are missing, the whole
/// match fails.
pub fn match_lock_masses(
    lock_masses: &[f64],
    mz_values: &[f64],
    window_ppm: f64,
    max_skipped: Option<usize>,
) -> Result<(Vec<f64>, Vec<f64>), CorrectionError> {
    let mut expected = Vec::with_capacity(lock_masses.len());
    let mut observed = Vec::with_capacity(lock_masses.len());
    let mut skipped = 0;
    let mut cursor = 0;
    for lock_mass in lock_masses.iter().copied() {
        match nearest_from(mz_values, lock_mass, cursor) {
            Some((best, index)) if (best - lock_mass).abs() <= ppm_tolerance(lock_mass, window_ppm) => {
                cursor = index;
                expected.push(lock_mass);
                observed.push(best);
            }
            _ => {
                skipped += 1;
                if let Some(max_skipped) = max_skipped {
                    if skipped > max_skipped {
                        return Err(CorrectionError::TooManySkipped {
                            skipped,
                            max_skipped,
                        });
                    }
                }
            }
        }
    }
    trace!("Matched {} of {} lock masses", observed.len(), lock_masses.len());
    Ok((expected, observed))
}

/// The `expected / observed` ratio of each matched lock mass
pub fn correction_ratios(expected: &[f64], observed: &[f64]) -> Result<Vec<f64>, CorrectionError> {
    if expected.is_empty() || observed.is_empty() {
        return Err(CorrectionError::NoLockMassesMatched);
    }
    if expected.len() != observed.len() {
        return Err(CorrectionError::LengthMismatch {
            expected: expected.len(),
            observed: observed.len(),
        });
    }
    expected
        .iter()
        .zip(observed)
        .map(|(e, o)| {
            check_positive(*e)?;
            check_positive(*o)?;
            Ok(e / o)
        })
        .collect()
}

fn check_positive(value: f64) -> Result<f64, CorrectionError> {
    if value > 0.0 {
        Ok(value)
    } else {
        Err(CorrectionError::NonPositiveValue(value))
    }
}

fn check_increasing(mz_values: &[f64]) -> Result<(), CorrectionError> {
    for pair in mz_values.windows(2) {
        if pair[0] >= pair[1] {
            return Err(CorrectionError::NotIncreasing {
                lower: pair[0],
                upper: pair[1],
            });
        }
    }
    Ok(())
}

/// The correction ratio as a function of m/z between two matched lock masses
#[derive(Debug, Clone, PartialEq)]
pub enum CorrectionFunction {
    /// The line `slope * mz + intercept`
    Linear { slope: f64, intercept: f64 },
    /// The Lagrange polynomial through the anchors `(mz_values[i], ratios[i])`
    Polynomial {
        mz_values: Vec<f64>,
        ratios: Vec<f64>,
    },
}

impl CorrectionFunction {
    /// The line through `(mz1, ratio1)` and `(mz2, ratio2)`
    pub fn linear(mz1: f64, mz2: f64, ratio1: f64, ratio2: f64) -> Result<Self, CorrectionError> {
        for value in [mz1, mz2, ratio1, ratio2] {
            check_positive(value)?;
        }
        check_increasing(&[mz1, mz2])?;
        let slope = (ratio2 - ratio1) / (mz2 - mz1);
        let intercept = ratio2 - slope * mz2;
        Ok(Self::Linear { slope, intercept })
    }

    /// The polynomial of degree `mz_values.len() - 1` through every anchor
    pub fn polynomial(mz_values: &[f64], ratios: &[f64]) -> Result<Self, CorrectionError> {
        if mz_values.len() != ratios.len() {
            return Err(CorrectionError::LengthMismatch {
                expected: mz_values.len(),
                observed: ratios.len(),
            });
        }
        for value in mz_values.iter().chain(ratios) {
            check_positive(*value)?;
        }
        check_increasing(mz_values)?;
        Ok(Self::Polynomial {
            mz_values: mz_values.to_vec(),
            ratios: ratios.to_vec(),
        })
    }

    pub fn evaluate(&self, mz: f64) -> f64 {
        match self {
            Self::Linear { slope, intercept } => slope * mz + intercept,
            Self::Polynomial { mz_values, ratios } => {
                let mut acc = 0.0;
                for (j, (xj, yj)) in mz_values.iter().zip(ratios).enumerate() {
                    let mut basis = 1.0;
                    for (k, xk) in mz_values.iter().enumerate() {
                        if k != j {
                            basis *= (mz - xk) / (xj - xk);
                        }
                    }
                    acc += yj * basis;
                }
                acc
            }
        }
    }
}

/// A degree `d` correction needs `d + 1` matched anchors once `d > 1`
fn check_degree(degree: usize, n_anchors: usize) -> Result<(), CorrectionError> {
    if degree == 0 {
        return Err(CorrectionError::InvalidDegree(degree));
    }
    if degree > 1 && n_anchors < degree + 1 {
        return Err(CorrectionError::TooFewAnchors {
            degree,
            required: degree + 1,
            available: n_anchors,
        });
    }
    Ok(())
}

/// Build the correction function for the segment between anchors `i` and `i + 1`.
///
/// A degree `d` polynomial passes through `d + 1` consecutive anchors, chosen to be
/// as centered on the segment as the ends of the anchor list allow.
fn segment_function(
    observed: &[f64],
    ratios: &[f64],
    i: usize,
    degree: usize,
) -> Result<CorrectionFunction, CorrectionError> {
    check_degree(degree, observed.len())?;
    match degree {
        1 => CorrectionFunction::linear(observed[i], observed[i + 1], ratios[i], ratios[i + 1]),
        _ => {
            let n = observed.len();
            let start = i.saturating_sub((degree - 1) / 2).min(n - 1 - degree);
            let stop = start + degree + 1;
            CorrectionFunction::polynomial(&observed[start..stop], &ratios[start..stop])
        }
    }
}

/// Extrapolate the correction to the peaks outside the outermost anchors
fn extrapolate(
    mz_values: &[f64],
    anchor: f64,
    ratio: f64,
    mode: ExtrapolationMode,
) -> Result<Vec<f64>, CorrectionError> {
    check_positive(anchor)?;
    check_positive(ratio)?;
    match mode {
        ExtrapolationMode::Flat => Ok(mz_values.iter().map(|mz| mz * ratio).collect()),
        ExtrapolationMode::Linear => Err(CorrectionError::NotImplemented(mode)),
    }
}

/// Correct every m/z in `mz_values` given the `observed` m/z of the matched lock
/// masses and their correction `ratios`.
///
/// Peaks below the first anchor and from the last anchor onwards are extrapolated
/// according to `mode`. Each peak from anchor `i` up to, but excluding, anchor `i + 1`
/// is multiplied by that segment's [`CorrectionFunction`] evaluated at its own m/z.
pub fn apply_piecewise(
    mz_values: &[f64],
    observed: &[f64],
    ratios: &[f64],
    mode: ExtrapolationMode,
    degree: usize,
) -> Result<Vec<f64>, CorrectionError> {
    let (Some(first), Some(last)) = (observed.first(), observed.last()) else {
        return Err(CorrectionError::NoLockMassesMatched);
    };
    if observed.len() != ratios.len() {
        return Err(CorrectionError::LengthMismatch {
            expected: ratios.len(),
            observed: observed.len(),
        });
    }
    check_degree(degree, observed.len())?;
    let first_at_least = |mz: f64| mz_values.partition_point(|v| *v < mz);

    let head = first_at_least(*first);
    let mut corrected = extrapolate(&mz_values[..head], *first, ratios[0], mode)?;

    for i in 0..observed.len() - 1 {
        let function = segment_function(observed, ratios, i, degree)?;
        let start = first_at_least(observed[i]);
        let end = first_at_least(observed[i + 1]);
        corrected.extend(
            mz_values[start..end]
                .iter()
                .map(|mz| mz * function.evaluate(*mz)),
        );
    }

    let tail = first_at_least(*last);
    corrected.extend(extrapolate(
        &mz_values[tail..],
        *last,
        ratios[ratios.len() - 1],
        mode,
    )?);

    if corrected.len() != mz_values.len() {
        return Err(CorrectionError::PeakCountMismatch {
            corrected: corrected.len(),
            original: mz_values.len(),
        });
    }
    Ok(corrected)
}
