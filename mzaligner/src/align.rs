use std::path::{Path, PathBuf};

use clap::{ArgMatches, Parser};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use mzalign::aligner::{DEFAULT_ALIGNMENT_WINDOW_PPM, DEFAULT_MAX_MZ, DEFAULT_MIN_MZ};
use mzalign::backend::clustering::DEFAULT_MAX_BLOCK_SIZE;
use mzalign::{
    ActiveSequenceDetection, AlignmentReport, ExternalProcess, HierarchicalClustering,
    ReferenceAligner, SpectrumTransformer,
};

use crate::args::{positive_float, AlignmentBackend, BackendMethod};
use crate::driver::{
    create_threadpool, layer_configuration, load_json, log_configuration, read_peak_lists,
    run_workflow, save_json, MZAlignerError, ProcessingStep,
};
use crate::progress::ProgressRecord;
use crate::types::PeakList;

/// Build the reference point backend named by `method`
pub(crate) fn make_backend(
    method: BackendMethod,
    max_block_size: usize,
    external_program: Option<&Path>,
    external_args: &[String],
) -> Result<AlignmentBackend, MZAlignerError> {
    let backend = match method {
        BackendMethod::Clustering => {
            AlignmentBackend::Clustering(HierarchicalClustering::new(max_block_size))
        }
        BackendMethod::ActiveSequence => AlignmentBackend::ActiveSequence(ActiveSequenceDetection),
        BackendMethod::External => {
            let program = external_program.ok_or(MZAlignerError::MissingExternalProgram)?;
            AlignmentBackend::External(
                ExternalProcess::new(program).with_args(external_args.iter().cloned()),
            )
        }
    };
    Ok(backend)
}

/// Align the peaks of every spectrum in a file onto reference m/z values learned from
/// training spectra.
///
/// Peaks with no reference value within the window keep their m/z.
#[derive(Parser, Debug, Clone, Serialize, Deserialize)]
pub struct AlignCommand {
    /// The path to read the spectra to align from
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

    /// The half-width of the clustering and matching window, in ppm
    #[arg(short = 'w', long = "window-ppm", default_value_t = DEFAULT_ALIGNMENT_WINDOW_PPM, value_parser = positive_float)]
    pub window_ppm: f64,

    /// The lower end of the acquisition m/z range
    #[arg(long = "min-mz", default_value_t = DEFAULT_MIN_MZ)]
    pub min_mz: f64,

    /// The upper end of the acquisition m/z range
    #[arg(long = "max-mz", default_value_t = DEFAULT_MAX_MZ)]
    pub max_mz: f64,

    /// The routine used to learn reference points
    #[arg(short = 'm', long = "method", default_value = "clustering")]
    pub method: BackendMethod,

    /// The largest number of pooled m/z values clustered at once
    #[arg(long = "max-block-size", default_value_t = DEFAULT_MAX_BLOCK_SIZE)]
    pub max_block_size: usize,

    /// The program to run with the external method
    #[arg(long = "external-program")]
    pub external_program: Option<PathBuf>,

    /// An argument passed to the external program ahead of the data file, may be repeated
    #[arg(long = "external-arg", allow_hyphen_values = true)]
    #[serde(default)]
    pub external_args: Vec<String>,

    /// Read a previously saved aligner from this JSON file instead of learning one
    #[arg(long = "load-state")]
    pub load_state: Option<PathBuf>,

    /// Save the learned aligner to this JSON file
    #[arg(long = "save-state")]
    pub save_state: Option<PathBuf>,

    /// Write a JSON summary of how many peaks matched a reference value to this file
    #[arg(long = "report-file")]
    pub report_file: Option<PathBuf>,

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

struct AlignStep {
    aligner: ReferenceAligner<AlignmentBackend>,
}

impl ProcessingStep for AlignStep {
    fn processing_params(&self) -> Vec<(&'static str, String)> {
        let mut params = vec![
            ("processing_step", "reference m/z alignment".to_string()),
            ("window_ppm", self.aligner.window_ppm.to_string()),
            ("min_mz", self.aligner.min_mz.to_string()),
            ("max_mz", self.aligner.max_mz.to_string()),
        ];
        if let Some(reference_set) = self.aligner.reference_set() {
            params.push(("reference_points", reference_set.len().to_string()));
        }
        params
    }

    fn process(&self, peak_list: &PeakList) -> Result<(PeakList, ProgressRecord), MZAlignerError> {
        let aligned = self.aligner.align_spectrum(peak_list)?;
        let prog = ProgressRecord {
            spectra: 1,
            empty_spectra: peak_list.is_empty() as usize,
            peaks: peak_list.len(),
            unmatched_peaks: aligned.unmatched.len(),
            failed_spectra: 0,
        };
        Ok((aligned.spectrum, prog))
    }
}

impl AlignCommand {
    /// Merge these arguments with the configuration files and the environment
    pub fn configure(&self, matches: Option<&ArgMatches>) -> Result<Self, MZAlignerError> {
        layer_configuration(self, matches, self.config_file.as_deref())
    }

    fn build_aligner(&self) -> Result<ReferenceAligner<AlignmentBackend>, MZAlignerError> {
        if let Some(path) = self.load_state.as_deref() {
            let aligner: ReferenceAligner<AlignmentBackend> = load_json(path)?;
            if aligner.window_ppm != self.window_ppm {
                warn!(
                    "Using the saved window of {} ppm instead of {} ppm",
                    aligner.window_ppm, self.window_ppm
                );
            }
            return Ok(aligner);
        }
        let backend = make_backend(
            self.method,
            self.max_block_size,
            self.external_program.as_deref(),
            &self.external_args,
        )?;
        let mut aligner =
            ReferenceAligner::with_backend(self.min_mz, self.max_mz, self.window_ppm, backend);
        let training_file = self
            .training_file
            .as_deref()
            .unwrap_or(self.input_file.as_path());
        let training = read_peak_lists(training_file)?;
        info!("Learning reference points with the {} method", self.method);
        aligner.fit(&training)?;
        Ok(aligner)
    }

    fn run(&self) -> Result<(), MZAlignerError> {
        let aligner = self.build_aligner()?;
        if let Some(path) = self.save_state.as_deref() {
            save_json(&aligner, path)?;
        }
        let step = AlignStep { aligner };
        let progress = run_workflow(&step, &self.input_file, &self.output_file)?;

        let mut report = AlignmentReport::default();
        for prog in progress.iter() {
            report.add(prog.peaks, prog.unmatched_peaks);
        }
        info!("{report}");
        if let Some(path) = self.report_file.as_deref() {
            save_json(&report, path)?;
        }
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
