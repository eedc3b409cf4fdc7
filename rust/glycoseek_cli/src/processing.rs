use indicatif::{
    ProgressIterator,
    ProgressStyle,
};
use serde::de::DeserializeOwned;
use std::path::Path;
use std::time::Instant;
use tracing::{
    debug,
    info,
};

use glycoseek::{
    Analysis,
    AnalysisConfig,
    AnalysisReport,
    GlycanCandidate,
    Spectrum,
    SpectrumCollection,
};

use super::config::{
    OutputConfig,
    RunPaths,
};
use crate::errors::CliError;

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, CliError> {
    let file = std::fs::File::open(path).map_err(|e| CliError::Io {
        source: e.to_string(),
        path: Some(path.to_string_lossy().to_string()),
    })?;
    serde_json::from_reader(std::io::BufReader::new(file)).map_err(|e| CliError::ParseError {
        msg: format!("{}: {}", path.display(), e),
    })
}

pub fn load_spectra(path: &Path) -> Result<SpectrumCollection, CliError> {
    let st = Instant::now();
    let spectra: Vec<Spectrum> = read_json(path)?;
    let collection = SpectrumCollection::new(spectra).map_err(glycoseek::GlycoSeekError::from)?;
    info!(
        "Loading {} spectra ({} MS1, {} MS2) took: {:?} for {}",
        collection.spectra().len(),
        collection.num_ms1(),
        collection.ms2_indices().len(),
        st.elapsed(),
        path.display()
    );
    Ok(collection)
}

pub fn load_library(path: &Path) -> Result<Vec<GlycanCandidate>, CliError> {
    let st = Instant::now();
    let library: Vec<GlycanCandidate> = read_json(path)?;
    info!(
        "Loading library of length {} took: {:?} for {}",
        library.len(),
        st.elapsed(),
        path.display()
    );
    Ok(library)
}

pub fn main_loop(
    analysis: &Analysis<'_>,
    chunk_size: usize,
) -> Result<AnalysisReport, CliError> {
    let start = Instant::now();
    let tasks = analysis.tasks();
    let style = ProgressStyle::with_template(
        "{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {pos}/{len} ({eta})",
    )
    .map_err(|e| CliError::Config {
        source: e.to_string(),
    })?;

    let mut nqueried = 0;
    let outputs: Vec<_> = tasks
        .chunks(chunk_size.max(1))
        .progress_with_style(style)
        .map(|chunk| {
            nqueried += chunk.len();
            // Parallelism happens here within the pipeline
            let out = analysis.score_tasks(chunk);
            debug!("Chunk gave {} raw identifications", out.identifications.len());
            out
        })
        .collect();

    let report = analysis.finish(outputs);
    info!(
        "Scored {} tasks, kept {} identifications in {:?}",
        nqueried,
        report.identifications.len(),
        start.elapsed()
    );
    Ok(report)
}

pub fn write_report(report: &AnalysisReport, output: &OutputConfig) -> Result<(), CliError> {
    let path = output.directory.join("results.json");
    let io_err = |e: std::io::Error| CliError::Io {
        source: e.to_string(),
        path: Some(path.to_string_lossy().to_string()),
    };
    let file = std::fs::File::create(&path).map_err(io_err)?;
    serde_json::to_writer_pretty(std::io::BufWriter::new(file), report)
        .map_err(|e| CliError::ParseError { msg: e.to_string() })?;
    info!("Wrote results to {}", path.display());
    Ok(())
}

pub fn process(
    paths: &RunPaths,
    config: &AnalysisConfig,
    chunk_size: usize,
) -> Result<(), CliError> {
    let spectra = load_spectra(&paths.spectra)?;
    let library = load_library(&paths.library)?;
    let analysis = Analysis::new(&spectra, &library, config)?;
    let report = main_loop(&analysis, chunk_size)?;
    info!("Run diagnostics: {:?}", report.diagnostics);
    write_report(&report, &paths.output)
}
