//! The flat text format exchanged with external reference point routines.
//!
//! The input is one line per spectrum holding its ascending m/z values separated by
//! commas. The output is a single line of whitespace-separated reference m/z values.
use std::io::{self, prelude::*};

use itertools::Itertools;

use crate::backend::{round_mz, BackendError};

/// Write one comma-separated line of m/z values per spectrum
pub fn write_spectra_mz<W: Write, S: AsRef<[f64]>>(writer: &mut W, spectra: &[S]) -> io::Result<()> {
    for mz_values in spectra {
        writeln!(writer, "{}", mz_values.as_ref().iter().join(","))?;
    }
    writer.flush()
}

/// Read the m/z values of each spectrum, skipping blank lines
pub fn read_spectra_mz<R: BufRead>(reader: R) -> Result<Vec<Vec<f64>>, BackendError> {
    let mut spectra = Vec::new();
    for (line_number, line) in reader.lines().enumerate() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let mz_values = line
            .split(',')
            .map(|token| parse_value(token.trim(), line_number + 1))
            .collect::<Result<Vec<f64>, BackendError>>()?;
        spectra.push(mz_values);
    }
    Ok(spectra)
}

/// Format reference points as a single whitespace-separated line
pub fn format_reference_points(points: &[f64]) -> String {
    points.iter().join(" ")
}

/// Parse a line of reference points, rounding each to 4 decimals and sorting them
pub fn parse_reference_points(text: &str) -> Result<Vec<f64>, BackendError> {
    let mut points = text
        .split_whitespace()
        .map(|token| parse_value(token, 1).map(round_mz))
        .collect::<Result<Vec<f64>, BackendError>>()?;
    points.sort_by(|a, b| a.total_cmp(b));
    Ok(points)
}

fn parse_value(token: &str, line: usize) -> Result<f64, BackendError> {
    token
        .parse::<f64>()
        .map_err(|e| BackendError::MalformedValue {
            line,
            value: token.to_string(),
            reason: e.to_string(),
        })
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_write_read() -> Result<(), BackendError> {
        let spectra = vec![vec![100.5, 200.25], vec![], vec![300.125]];
        let mut buffer = Vec::new();
        write_spectra_mz(&mut buffer, &spectra)?;
        let text = String::from_utf8(buffer).unwrap();
        assert_eq!(text, "100.5,200.25\n\n300.125\n");
        let read = read_spectra_mz(text.as_bytes())?;
        assert_eq!(read, vec![vec![100.5, 200.25], vec![300.125]]);
        Ok(())
    }

    #[test]
    fn test_malformed() {
        let err = read_spectra_mz("100.0,abc\n".as_bytes()).unwrap_err();
        match err {
            BackendError::MalformedValue { line, value, .. } => {
                assert_eq!(line, 1);
                assert_eq!(value, "abc");
            }
            other => panic!("Unexpected error {other}"),
        }
    }

    #[test]
    fn test_parse_points() -> Result<(), BackendError> {
        let points = parse_reference_points("300.123456 100.00004\t200.5\n")?;
        assert_eq!(points, vec![100.0, 200.5, 300.1235]);
        assert_eq!(format_reference_points(&points), "100 200.5 300.1235");
        assert!(parse_reference_points("").unwrap().is_empty());
        Ok(())
    }
}
