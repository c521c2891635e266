use std::fs;
use std::io::{self, BufReader, Write};
use std::path::PathBuf;

use clap::Parser;
use tracing::debug;

use mzalign::backend::clustering::DEFAULT_MAX_BLOCK_SIZE;
use mzalign::interchange::{format_reference_points, read_spectra_mz};
use mzalign::ReferencePointBackend;

use crate::align::make_backend;
use crate::args::{positive_float, BackendMethod};
use crate::driver::MZAlignerError;

/// Compute reference points the way an external clustering program is expected to.
///
/// Reads one training spectrum per line as comma-separated m/z values and prints the
/// reference points to STDOUT separated by spaces, so `mzaligner reference-points` can
/// serve as the program of the external method. Its arguments come from the command
/// line only, configuration files and `MZALIGNER_` variables are not read.
#[derive(Parser, Debug, Clone)]
pub struct ReferencePointsCommand {
    /// The m/z table to read
    #[arg()]
    pub input_file: PathBuf,

    /// The half-width of the clustering window, in ppm
    #[arg(value_parser = positive_float)]
    pub window_ppm: f64,

    /// The routine used to compute reference points
    #[arg(short = 'm', long = "method", default_value = "clustering")]
    pub method: BackendMethod,

    /// The largest number of pooled m/z values clustered at once
    #[arg(long = "max-block-size", default_value_t = DEFAULT_MAX_BLOCK_SIZE)]
    pub max_block_size: usize,
}

impl ReferencePointsCommand {
    pub fn compute(&self) -> Result<Vec<f64>, MZAlignerError> {
        let handle = BufReader::new(fs::File::open(&self.input_file)?);
        let spectra = read_spectra_mz(handle)?;
        let views: Vec<&[f64]> = spectra.iter().map(|s| s.as_slice()).collect();
        let backend = make_backend(self.method, self.max_block_size, None, &[])?;
        let points = backend.compute_reference_points(&views, self.window_ppm)?;
        debug!(
            "Computed {} reference points from {} spectra",
            points.len(),
            views.len()
        );
        Ok(points)
    }

    pub fn main(&self) -> Result<(), MZAlignerError> {
        let points = self.compute()?;
        let mut stdout = io::stdout().lock();
        writeln!(stdout, "{}", format_reference_points(&points))?;
        stdout.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_compute() {
        let mut handle = tempfile::NamedTempFile::new().unwrap();
        writeln!(handle, "100.0,300.0").unwrap();
        writeln!(handle).unwrap();
        writeln!(handle, "100.001,300.002").unwrap();
        handle.flush().unwrap();

        for method in [BackendMethod::Clustering, BackendMethod::ActiveSequence] {
            let command = ReferencePointsCommand {
                input_file: handle.path().to_path_buf(),
                window_ppm: 15.0,
                method,
                max_block_size: DEFAULT_MAX_BLOCK_SIZE,
            };
            assert_eq!(command.compute().unwrap(), vec![100.0005, 300.001]);
        }

        let command = ReferencePointsCommand {
            input_file: handle.path().to_path_buf(),
            window_ppm: 15.0,
            method: BackendMethod::External,
            max_block_size: DEFAULT_MAX_BLOCK_SIZE,
        };
        assert!(matches!(
            command.compute(),
            Err(MZAlignerError::MissingExternalProgram)
        ));
    }
}
