use serde::{
    Deserialize,
    Serialize,
};
use std::path::PathBuf;

use crate::cli::Cli;
use crate::errors::CliError;

fn default_chunk_size() -> usize {
    1024
}

/// Layout of the CLI configuration file.
///
/// `analysis` is kept as raw JSON so the library can report exactly which
/// required key is missing.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Config {
    pub input: Option<InputConfig>,
    pub analysis: serde_json::Value,
    pub output: Option<OutputConfig>,
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct InputConfig {
    pub spectra: Option<PathBuf>,
    pub library: Option<PathBuf>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct OutputConfig {
    pub directory: PathBuf,
}

/// Resolved paths after merging the file with command line flags.
#[derive(Debug, Clone)]
pub struct RunPaths {
    pub spectra: PathBuf,
    pub library: PathBuf,
    pub output: OutputConfig,
}

impl Config {
    pub fn from_file(path: &std::path::Path) -> Result<Self, CliError> {
        let file = std::fs::File::open(path).map_err(|e| CliError::Io {
            source: e.to_string(),
            path: Some(path.to_string_lossy().to_string()),
        })?;
        serde_json::from_reader(std::io::BufReader::new(file))
            .map_err(|e| CliError::ParseError { msg: e.to_string() })
    }

    /// Command line flags take precedence over the file.
    pub fn apply_cli_args(&mut self, args: &Cli) {
        let input = self.input.get_or_insert_with(InputConfig::default);
        if let Some(spectra) = &args.spectra_file {
            input.spectra = Some(spectra.clone());
        }
        if let Some(library) = &args.library_file {
            input.library = Some(library.clone());
        }
        if let Some(output_dir) = &args.output_dir {
            self.output = Some(OutputConfig {
                directory: output_dir.clone(),
            });
        }
        if let Some(chunk_size) = args.chunk_size {
            self.chunk_size = chunk_size;
        }
    }

    pub fn run_paths(&self) -> Result<RunPaths, CliError> {
        let input = self.input.clone().unwrap_or_default();
        let spectra = input.spectra.ok_or_else(|| CliError::Config {
            source: "No spectra provided, please provide them in either the config file or with the --spectra-file flag".to_string(),
        })?;
        let library = input.library.ok_or_else(|| CliError::Config {
            source: "No library provided, please provide one in either the config file or with the --library-file flag".to_string(),
        })?;
        let output = self.output.clone().ok_or_else(|| CliError::Config {
            source: "No output directory provided, please provide one in either the config file or with the --output-dir flag".to_string(),
        })?;
        Ok(RunPaths {
            spectra,
            library,
            output,
        })
    }
}
