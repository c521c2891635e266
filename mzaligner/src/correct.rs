use std::path::PathBuf;

use clap::{ArgMatches, Parser};
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use mzalign::lock_mass::DEFAULT_LOCK_MASS_WINDOW_PPM;
use mzalign::{
    CorrectionError, ExtrapolationMode, LockMassParams, SpectrumTransformer,
    VirtualLockMassCorrector,
};

use crate::args::{non_negative_float_f32, positive_float};
use crate::driver::{
    create_threadpool, layer_configuration, load_json, log_configuration, read_peak_lists,
    run_workflow, save_json, MZAlignerError, ProcessingStep,
};
use crate::progress::ProgressRecord;
use crate::types::PeakList;

/// Correct the m/z drift of every spectrum in a file against virtual lock masses, peaks
/// found in every one of the training spectra.
#[derive(Parser, Debug, Clone, Serialize, Deserialize)]
pub struct CorrectCommand {
    /// The path to read the spectra to correct from
    #[arg()]
    pub input_file: PathBuf,

    /// The path to write the output file to, or if '-' is passed, write to STDOUT.
    ///
    /// If a path is specified, the output format is inferred, otherwise mzML is assumed.
    #[arg(short = 'o', long = "output-file", default_value = "-")]
    pub output_file: PathBuf,

    /// The path to read training spectra from. Defaults to the input file.
    #[arg(short = 'T', long = "training-file")]
    pub training_file: Option<PathBuf>,

    /// The half-width of the window around each lock mass, in ppm
    #[arg(short = 'w', long = "window-ppm", default_value_t = DEFAULT_LOCK_MASS_WINDOW_PPM, value_parser = positive_float)]
    pub window_ppm: f64,

    /// Peaks at or below this intensity are ignored when finding and matching lock masses
    #[arg(short = 'i', long = "min-intensity", default_value_t = 0.0, value_parser = non_negative_float_f32)]
    pub min_intensity: f32,

    /// The number of lock masses a spectrum may be missing before its correction fails
    #[arg(short = 'k', long = "max-skipped-points")]
    pub max_skipped_points: Option<usize>,

    /// How to correct peaks outside the range of the matched lock masses
    #[arg(long = "mode", default_value_t = ExtrapolationMode::Flat, value_parser = parse_mode)]
    pub mode: ExtrapolationMode,

    /// The degree of the interpolating polynomial between lock masses
    #[arg(short = 'd', long = "poly-degree", default_value_t = 1, value_parser = clap::value_parser!(u32).range(1..))]
    pub poly_degree: u32,

    /// Write spectra whose correction fails unchanged instead of stopping
    #[arg(long = "keep-uncorrected")]
    #[serde(default)]
    pub keep_uncorrected: bool,

    /// Read previously saved lock masses from this JSON file instead of learning them
    #[arg(long = "load-state")]
    pub load_state: Option<PathBuf>,

    /// Save the learned lock masses to this JSON file
    #[arg(long = "save-state")]
    pub save_state: Option<PathBuf>,

    /// The path to write a log file to, in addition to STDERR
    #[arg(short = 'l', long = "log-file")]
    pub log_file: Option<PathBuf>,

    /// A TOML configuration file to read additional parameters from.
    ///
    /// Configurations are also read from `mzaligner.toml` in the working directory.
    /// Environment variables prefixed with `MZALIGNER_` will be read too.
    #[arg(long = "config-file")]
    pub config_file: Option<PathBuf>,

    /// The number of threads to use, passing a value < 1 to use all available threads
    #[arg(
        short='t',
        long="threads",
        default_value_t=-1,
    )]
    pub threads: i32,
}

fn parse_mode(s: &str) -> Result<ExtrapolationMode, String> {
    s.parse()
}

struct CorrectStep {
    corrector: VirtualLockMassCorrector,
    keep_uncorrected: bool,
}

impl ProcessingStep for CorrectStep {
    fn processing_params(&self) -> Vec<(&'static str, String)> {
        let params = self.corrector.params();
        let mut values = vec![
            ("processing_step", "virtual lock mass correction".to_string()),
            ("window_ppm", params.window_ppm.to_string()),
            ("min_intensity", params.min_intensity.to_string()),
            ("mode", params.mode.to_string()),
            ("poly_degree", params.poly_degree.to_string()),
        ];
        if let Some(max_skipped) = params.max_skipped_points {
            values.push(("max_skipped_points", max_skipped.to_string()));
        }
        if let Some(lock_masses) = self.corrector.lock_masses() {
            values.push(("lock_masses", lock_masses.len().to_string()));
        }
        values
    }

    fn process(&self, peak_list: &PeakList) -> Result<(PeakList, ProgressRecord), MZAlignerError> {
        let mut prog = ProgressRecord {
            spectra: 1,
            peaks: peak_list.len(),
            ..Default::default()
        };
        if peak_list.is_empty() {
            prog.empty_spectra = 1;
            return Ok((peak_list.clone(), prog));
        }
        match self.corrector.transform_spectrum(peak_list) {
            Ok(corrected) => Ok((corrected, prog)),
            Err(
                e @ (CorrectionError::NoLockMassesMatched
                | CorrectionError::TooManySkipped { .. }
                | CorrectionError::TooFewAnchors { .. }),
            ) if self.keep_uncorrected => {
                warn!(
                    "Spectrum {} was left uncorrected: {e}",
                    peak_list.metadata().id
                );
                prog.failed_spectra = 1;
                Ok((peak_list.clone(), prog))
            }
            Err(e) => Err(e.into()),
        }
    }
}

impl CorrectCommand {
    /// Merge these arguments with the configuration files and the environment
    pub fn configure(&self, matches: Option<&ArgMatches>) -> Result<Self, MZAlignerError> {
        layer_configuration(self, matches, self.config_file.as_deref())
    }

    pub fn lock_mass_params(&self) -> LockMassParams {
        LockMassParams::new(
            self.window_ppm,
            self.min_intensity,
            self.max_skipped_points,
            self.mode,
            self.poly_degree as usize,
        )
    }

    fn build_corrector(&self) -> Result<VirtualLockMassCorrector, MZAlignerError> {
        if let Some(path) = self.load_state.as_deref() {
            let corrector: VirtualLockMassCorrector = load_json(path)?;
            if *corrector.params() != self.lock_mass_params() {
                warn!("Using the parameters saved with the lock masses instead of those given");
            }
            return Ok(corrector);
        }
        let mut corrector = VirtualLockMassCorrector::new(self.lock_mass_params());
        let training_file = self
            .training_file
            .as_deref()
            .unwrap_or(self.input_file.as_path());
        let training = read_peak_lists(training_file)?;
        corrector.fit(&training)?;
        Ok(corrector)
    }

    fn run(&self) -> Result<(), MZAlignerError> {
        let corrector = self.build_corrector()?;
        if let Some(path) = self.save_state.as_deref() {
            save_json(&corrector, path)?;
        }
        if let Some(lock_masses) = corrector.lock_masses() {
            info!(
                "Lock masses: {}",
                lock_masses
                    .mz_values()
                    .iter()
                    .map(|mz| format!("{mz:0.4}"))
                    .join(", ")
            );
        }
        let step = CorrectStep {
            corrector,
            keep_uncorrected: self.keep_uncorrected,
        };
        run_workflow(&step, &self.input_file, &self.output_file)?;
        Ok(())
    }

    pub fn main(&self) -> Result<(), MZAlignerError> {
        info!(
            "mzaligner v{}",
            option_env!("CARGO_PKG_VERSION").unwrap_or("unknown")
        );
        info!("Input: {}", self.input_file.display());
        info!("Output: {}", self.output_file.display());
        log_configuration(self);
        create_threadpool(self.threads)?.install(|| self.run())
    }
}
