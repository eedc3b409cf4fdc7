mod cli;
mod config;
mod errors;
mod processing;

use clap::Parser;
use glycoseek::AnalysisConfig;
use tracing::info;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

use cli::Cli;
use config::Config;

#[cfg(target_os = "windows")]
use mimalloc::MiMalloc;

#[cfg(target_os = "windows")]
#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

fn main() -> std::result::Result<(), errors::CliError> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .from_env_lossy(),
        ) // This uses RUST_LOG environment variable
        .init();

    let args = Cli::parse();

    let mut config = Config::from_file(&args.config)?;
    config.apply_cli_args(&args);
    let paths = config.run_paths()?;
    let analysis_config = AnalysisConfig::from_json_value(config.analysis.clone())?;
    info!("Parsed configuration: {:#?}", analysis_config);

    if let Some(threads) = args.threads {
        rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build_global()
            .map_err(|e| errors::CliError::Config {
                source: e.to_string(),
            })?;
    }

    std::fs::create_dir_all(&paths.output.directory).map_err(|e| errors::CliError::Io {
        source: e.to_string(),
        path: Some(paths.output.directory.to_string_lossy().to_string()),
    })?;

    processing::process(&paths, &analysis_config, config.chunk_size)
}
