use std::fs;
use std::io;
use std::path::Path;
use std::thread;
use std::time::Instant;

use clap::{parser::ValueSource, ArgMatches, Parser, Subcommand};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use flate2::write::GzEncoder;
use flate2::Compression;
use rayon::prelude::*;
use serde::{de::DeserializeOwned, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use mzdata::io::{
    infer_from_path, mgf::MGFWriterType, mzml::MzMLWriterType, MZReaderType,
    MassSpectrometryFormat,
};
use mzdata::meta::{custom_software_name, DataProcessing, ProcessingMethod, Software};
use mzdata::params::Param;
use mzdata::prelude::*;
use mzdata::spectrum::SpectrumConversionError;

use mzalign::{AlignmentError, BackendError, CorrectionError, SearchError};

use crate::align::AlignCommand;
use crate::convert::{from_peak_list, to_peak_list};
use crate::correct::CorrectCommand;
use crate::points::ReferencePointsCommand;
use crate::progress::ProgressRecord;
use crate::types::{CPeak, DPeak, PeakList, SpectrumType};

/// The configuration file read from the working directory when it exists
pub const CONFIG_FILE_NAME: &str = "mzaligner.toml";
/// The prefix of environment variables that override configuration keys
pub const ENV_PREFIX: &str = "MZALIGNER_";

#[derive(Debug, Error)]
pub enum MZAlignerError {
    #[error("An IO error occurred: {0}")]
    IOError(
        #[source]
        #[from]
        io::Error,
    ),
    #[error("Failed to read spectra from {0}: {1}")]
    InputError(String, #[source] io::Error),
    #[error("The output file format for {0} was either unknown or not supported ({1:?})")]
    OutputFormatUnknownOrNotSupportedError(String, MassSpectrometryFormat),
    #[error("Spectrum {0} could not be read as a centroid peak list: {1}")]
    SpectrumConversionError(String, #[source] SpectrumConversionError),
    #[error("An error occurred while reading the configuration: {0}")]
    ConfigurationError(
        #[source]
        #[from]
        figment::Error,
    ),
    #[error("An error occurred while reading or writing a state file: {0}")]
    StateError(
        #[source]
        #[from]
        serde_json::Error,
    ),
    #[error("The external method requires --external-program")]
    MissingExternalProgram,
    #[error("Failed to build the thread pool: {0}")]
    ThreadPoolError(
        #[source]
        #[from]
        rayon::ThreadPoolBuildError,
    ),
    #[error("Failed to initialize logging: {0}")]
    LoggingError(String),
    #[error(transparent)]
    AlignmentError(#[from] AlignmentError),
    #[error(transparent)]
    CorrectionError(#[from] CorrectionError),
    #[error(transparent)]
    BackendError(#[from] BackendError),
    #[error(transparent)]
    SearchError(#[from] SearchError),
}

/// Align mass spectra onto a shared reference m/z grid, or recalibrate them against
/// virtual lock masses.
///
/// Configuration is layered: built-in defaults, then `mzaligner.toml` in the working
/// directory, then the file passed to `--config-file`, then environment variables
/// prefixed with `MZALIGNER_` (nested keys separated by `__`), and finally the options
/// given on the command line.
#[derive(Parser, Debug)]
#[command(author, version)]
pub struct MZAligner {
    #[command(subcommand)]
    pub command: MZAlignerCommand,
}

#[derive(Subcommand, Debug)]
pub enum MZAlignerCommand {
    /// Learn reference m/z values from training spectra and snap peaks onto them
    Align(AlignCommand),
    /// Learn virtual lock masses from training spectra and correct the m/z drift of each spectrum
    Correct(CorrectCommand),
    /// Compute reference points from a plain text m/z table and print them to STDOUT
    ReferencePoints(ReferencePointsCommand),
}

/// Merge `args` with the configuration files and the environment.
///
/// Only options that `matches` reports as given on the command line take precedence
/// over the other sources. Everything else in `args` is treated as a default.
pub fn layer_configuration<T: Serialize + DeserializeOwned>(
    args: &T,
    matches: Option<&ArgMatches>,
    config_file: Option<&Path>,
) -> Result<T, MZAlignerError> {
    let mut config = Figment::from(Serialized::defaults(args));
    if Path::new(CONFIG_FILE_NAME).exists() {
        debug!("Reading configuration from {CONFIG_FILE_NAME}");
        config = config.merge(Toml::file_exact(CONFIG_FILE_NAME));
    }
    if let Some(path) = config_file {
        debug!("Reading configuration from {}", path.display());
        config = config.merge(Toml::file_exact(path));
    }
    config = config.merge(Env::prefixed(ENV_PREFIX).split("__"));
    if let Some(matches) = matches {
        config = config.merge(Serialized::defaults(explicit_arguments(args, matches)?));
    }
    Ok(config.extract()?)
}

/// Write the effective configuration to the debug log as TOML
pub(crate) fn log_configuration<T: Serialize>(args: &T) {
    match toml::to_string_pretty(args) {
        Ok(text) => debug!("Effective configuration:\n{text}"),
        Err(e) => debug!("Failed to render the effective configuration: {e}"),
    }
}

/// Collect the fields of `args` whose values came from the command line
fn explicit_arguments<T: Serialize>(
    args: &T,
    matches: &ArgMatches,
) -> Result<serde_json::Map<String, serde_json::Value>, MZAlignerError> {
    let known: Vec<&str> = matches.ids().map(|id| id.as_str()).collect();
    let mut explicit = serde_json::Map::new();
    if let serde_json::Value::Object(fields) = serde_json::to_value(args)? {
        for (key, value) in fields {
            if known.contains(&key.as_str())
                && matches.value_source(&key) == Some(ValueSource::CommandLine)
            {
                explicit.insert(key, value);
            }
        }
    }
    Ok(explicit)
}

pub(crate) fn create_threadpool(threads: i32) -> Result<rayon::ThreadPool, MZAlignerError> {
    let num_threads = if threads > 0 {
        threads as usize
    } else {
        thread::available_parallelism()
            .map(usize::from)
            .unwrap_or(1)
    };
    debug!("Using {} cores", num_threads);
    Ok(rayon::ThreadPoolBuilder::new()
        .num_threads(num_threads)
        .build()?)
}

/// A per-spectrum transformation run over every spectrum of an input file
pub(crate) trait ProcessingStep: Sync {
    /// The key-value parameters recorded in the output file's data processing
    fn processing_params(&self) -> Vec<(&'static str, String)>;

    fn process(&self, peak_list: &PeakList) -> Result<(PeakList, ProgressRecord), MZAlignerError>;
}

pub(crate) type SpectrumReader = MZReaderType<fs::File, CPeak, DPeak>;

pub(crate) fn open_reader(path: &Path) -> Result<SpectrumReader, MZAlignerError> {
    MZReaderType::open_path(path)
        .map_err(|e| MZAlignerError::InputError(path.display().to_string(), e))
}

/// Read every spectrum of `path` as a peak list
pub(crate) fn read_peak_lists(path: &Path) -> Result<Vec<PeakList>, MZAlignerError> {
    let reader = open_reader(path)?;
    let peak_lists = reader
        .map(|spectrum| {
            to_peak_list(spectrum)
                .map_err(|(id, e)| MZAlignerError::SpectrumConversionError(id, e))
        })
        .collect::<Result<Vec<_>, _>>()?;
    info!(
        "Read {} training spectra from {}",
        peak_lists.len(),
        path.display()
    );
    Ok(peak_lists)
}

/// Apply `step` to every spectrum in parallel, keeping input order
pub(crate) fn transform_spectra<T: ProcessingStep>(
    step: &T,
    spectra: Vec<SpectrumType>,
) -> Result<(Vec<SpectrumType>, Vec<ProgressRecord>), MZAlignerError> {
    let results = spectra
        .into_par_iter()
        .map(|spectrum| -> Result<(SpectrumType, ProgressRecord), MZAlignerError> {
            let peak_list = to_peak_list(spectrum)
                .map_err(|(id, e)| MZAlignerError::SpectrumConversionError(id, e))?;
            let (peak_list, prog) = step.process(&peak_list)?;
            Ok((from_peak_list(peak_list), prog))
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok(results.into_iter().unzip())
}

/// Read `input_file`, transform each spectrum with `step` and write the results to
/// `output_file`, returning the progress of each spectrum in input order
pub(crate) fn run_workflow<T: ProcessingStep>(
    step: &T,
    input_file: &Path,
    output_file: &Path,
) -> Result<Vec<ProgressRecord>, MZAlignerError> {
    let mut reader = open_reader(input_file)?;
    let spectra: Vec<SpectrumType> = reader.by_ref().collect();
    debug!("Read {} spectra from {}", spectra.len(), input_file.display());

    let started = Instant::now();
    let (spectra, progress) = transform_spectra(step, spectra)?;
    info!("Elapsed Time: {:0.3?}", started.elapsed());

    writer_then(step, &reader, output_file, &spectra)?;
    let total: ProgressRecord = progress.iter().copied().sum();
    info!("{total}");
    Ok(progress)
}

fn writer_then<T: ProcessingStep, R: MSDataFileMetadata>(
    step: &T,
    reader: &R,
    output_file: &Path,
    spectra: &[SpectrumType],
) -> Result<(), MZAlignerError> {
    let spectrum_count = spectra.len() as u64;
    if output_file == Path::new("-") {
        let outfile = io::stdout();
        let mut writer = MzMLWriterType::<_, CPeak, DPeak>::new(outfile);
        writer.copy_metadata_from(reader);
        update_data_processing(step, &mut writer);
        writer.set_spectrum_count(spectrum_count);
        write_output_spectra(writer, spectra)?;
    } else {
        let (ms_format, compressed) = infer_from_path(output_file);
        match ms_format {
            MassSpectrometryFormat::MGF => {
                let handle = io::BufWriter::new(fs::File::create(output_file)?);
                if compressed {
                    let encoder = GzEncoder::new(handle, Compression::best());
                    let writer = MGFWriterType::new(encoder);
                    write_output_spectra(writer, spectra)?;
                } else {
                    let writer = MGFWriterType::new(handle);
                    write_output_spectra(writer, spectra)?;
                }
            }
            MassSpectrometryFormat::MzML => {
                let handle = io::BufWriter::new(fs::File::create(output_file)?);
                if compressed {
                    let encoder = GzEncoder::new(handle, Compression::best());
                    let mut writer = MzMLWriterType::new(encoder);
                    writer.copy_metadata_from(reader);
                    update_data_processing(step, &mut writer);
                    writer.set_spectrum_count(spectrum_count);
                    write_output_spectra(writer, spectra)?;
                } else {
                    let mut writer = MzMLWriterType::new(handle);
                    writer.copy_metadata_from(reader);
                    update_data_processing(step, &mut writer);
                    writer.set_spectrum_count(spectrum_count);
                    write_output_spectra(writer, spectra)?;
                }
            }
            _ => {
                return Err(MZAlignerError::OutputFormatUnknownOrNotSupportedError(
                    output_file.to_string_lossy().to_string(),
                    ms_format,
                ))
            }
        }
    }
    Ok(())
}

fn write_output_spectra<W: SpectrumWriter<CPeak, DPeak>>(
    mut writer: W,
    spectra: &[SpectrumType],
) -> io::Result<()> {
    let mut checkpoint = Instant::now();
    for (i, spectrum) in spectra.iter().enumerate() {
        writer.write(spectrum)?;
        if checkpoint.elapsed().as_secs_f64() > 5.0 {
            info!("Written {} of {} spectra", i + 1, spectra.len());
            checkpoint = Instant::now();
        }
    }
    writer.close()?;
    debug!("Wrote {} spectra", spectra.len());
    Ok(())
}

fn make_software() -> Software {
    let mut sw = Software::default();
    let name = custom_software_name("mzaligner");
    sw.add_param(name);
    sw.id = "mzaligner".to_string();
    sw.version = option_env!("CARGO_PKG_VERSION")
        .unwrap_or("unknown")
        .to_string();
    sw
}

fn make_processing_method<T: ProcessingStep>(step: &T) -> ProcessingMethod {
    let mut processing = ProcessingMethod::default();
    processing.software_reference = "mzaligner".to_string();
    for (name, value) in step.processing_params() {
        processing.add_param(Param::new_key_value(name, value));
    }
    processing.order = i8::MAX;
    processing
}

fn update_data_processing<T: ProcessingStep, S: MSDataFileMetadata>(step: &T, source: &mut S) {
    let sw_id = {
        let mut sw = make_software();
        let stem = sw.id.clone();
        let mut i = 0;
        let mut query = stem.clone();
        while source.softwares().iter().any(|s| s.id == query) {
            i += 1;
            query = format!("{stem}_{i}");
        }
        sw.id = query.clone();
        source.softwares_mut().push(sw);
        query
    };
    if source.data_processings().is_empty() {
        let mut method = make_processing_method(step);
        method.order = 0;
        method.software_reference = sw_id.clone();
        let mut dp = DataProcessing::default();
        let dp_id = "DP1_mzaligner".to_string();
        dp.id = dp_id.clone();
        dp.push(method);
        source.data_processings_mut().push(dp);
        if let Some(descr) = source.run_description_mut() {
            descr.default_data_processing_id = Some(dp_id.clone());
        }
    } else {
        for dp in source.data_processings_mut().iter_mut() {
            let last_step = dp
                .iter()
                .max_by(|a, b| a.order.cmp(&b.order))
                .map(|m| m.order)
                .unwrap_or(-1);
            let mut method = make_processing_method(step);
            method.order = last_step.saturating_add(1);
            method.software_reference = sw_id.clone();
            dp.push(method)
        }
    }
}

/// Write `value` as pretty-printed JSON to `path`
pub(crate) fn save_json<T: Serialize>(value: &T, path: &Path) -> Result<(), MZAlignerError> {
    let handle = io::BufWriter::new(fs::File::create(path)?);
    serde_json::to_writer_pretty(handle, value)?;
    info!("Saved state to {}", path.display());
    Ok(())
}

/// Read a JSON document written by [`save_json`]
pub(crate) fn load_json<T: DeserializeOwned>(path: &Path) -> Result<T, MZAlignerError> {
    let handle = io::BufReader::new(fs::File::open(path)?);
    let value = serde_json::from_reader(handle)?;
    info!("Loaded state from {}", path.display());
    Ok(value)
}

#[cfg(test)]
mod test {
    use super::*;
    use clap::CommandFactory;
    use std::path::PathBuf;

    #[test]
    fn test_explicit_arguments() {
        let matches = MZAligner::command()
            .try_get_matches_from(["mzaligner", "align", "input.mgf", "-w", "25"])
            .unwrap();
        let (_, sub_matches) = matches.subcommand().unwrap();
        let args = MZAligner::parse_from(["mzaligner", "align", "input.mgf", "-w", "25"]);
        let MZAlignerCommand::Align(command) = args.command else {
            panic!("Expected the align command");
        };
        let explicit = explicit_arguments(&command, sub_matches).unwrap();
        assert!(explicit.contains_key("window_ppm"));
        assert!(explicit.contains_key("input_file"));
        assert!(!explicit.contains_key("min_mz"));
        assert!(!explicit.contains_key("threads"));
    }

    #[test]
    fn test_layering_defaults() {
        let args = MZAligner::parse_from(["mzaligner", "align", "input.mgf"]);
        let MZAlignerCommand::Align(command) = args.command else {
            panic!("Expected the align command");
        };
        let layered = layer_configuration(&command, None, None).unwrap();
        assert_eq!(layered.window_ppm, command.window_ppm);
        assert_eq!(layered.input_file, PathBuf::from("input.mgf"));
    }
}
