//! Delegate reference point detection to another program
use std::io::BufWriter;
use std::path::PathBuf;
use std::process::Command;

use tracing::{debug, warn};

use super::{BackendError, ReferencePointBackend};
use crate::interchange::{parse_reference_points, write_spectra_mz};

/// Run an external program that honors the reference point interchange format.
///
/// The training m/z values are written to a temporary file, one comma-separated line
/// per spectrum, and the program is invoked as `program [args...] <file> <window_ppm>`.
/// It must print the reference points to STDOUT as whitespace-separated numbers.
///
/// The call blocks until the program exits. There is no timeout.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ExternalProcess {
    pub program: PathBuf,
    pub args: Vec<String>,
}

impl ExternalProcess {
    pub fn new<P: Into<PathBuf>>(program: P) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }
}

impl ReferencePointBackend for ExternalProcess {
    fn compute_reference_points(
        &self,
        spectra: &[&[f64]],
        window_ppm: f64,
    ) -> Result<Vec<f64>, BackendError> {
        let mut handle = tempfile::Builder::new()
            .prefix("mzalign-")
            .suffix(".txt")
            .tempfile()?;
        {
            let mut writer = BufWriter::new(handle.as_file_mut());
            write_spectra_mz(&mut writer, spectra)?;
        }
        debug!(
            "Running {} on {} spectra written to {}",
            self.program.display(),
            spectra.len(),
            handle.path().display()
        );

        let output = Command::new(&self.program)
            .args(&self.args)
            .arg(handle.path())
            .arg(window_ppm.to_string())
            .output()?;

        let stderr = String::from_utf8_lossy(&output.stderr);
        if !output.status.success() {
            return Err(BackendError::ProcessFailed {
                program: self.program.display().to_string(),
                status: output.status.to_string(),
                stderr: stderr.trim().to_string(),
            });
        }
        if !stderr.trim().is_empty() {
            warn!("{}: {}", self.program.display(), stderr.trim());
        }
        let stdout = String::from_utf8_lossy(&output.stdout);
        parse_reference_points(&stdout)
    }
}
