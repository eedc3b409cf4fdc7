use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to the JSON configuration file
    #[arg(short, long)]
    pub config: PathBuf,

    /// Path to the JSON spectrum dump (will over-write the config file)
    #[arg(short, long)]
    pub spectra_file: Option<PathBuf>,

    /// Path to the JSON glycan library (will over-write the config file)
    #[arg(short, long)]
    pub library_file: Option<PathBuf>,

    /// Path to the output directory
    #[arg(short, long)]
    pub output_dir: Option<PathBuf>,

    /// Number of tasks scored between progress updates
    #[arg(long)]
    pub chunk_size: Option<usize>,

    /// Number of worker threads (defaults to one per core)
    #[arg(short, long)]
    pub threads: Option<usize>,
}
