#[derive(Debug)]
pub enum CliError {
    Config {
        source: String,
    },
    ParseError {
        msg: String,
    },
    Io {
        source: String,
        path: Option<String>,
    },
    Analysis {
        source: String,
    },
}

impl std::fmt::Display for CliError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CliError::Config { source } => write!(f, "Error interpreting the config: {}", source),
            CliError::ParseError { msg } => write!(f, "Error parsing input: {}", msg),
            CliError::Io { source, path } => {
                if let Some(path) = path {
                    write!(f, "Error reading file {}: {}", path, source)
                } else {
                    write!(f, "Error reading file: {}", source)
                }
            }
            CliError::Analysis { source } => write!(f, "Analysis failed: {}", source),
        }
    }
}

impl From<glycoseek::GlycoSeekError> for CliError {
    fn from(e: glycoseek::GlycoSeekError) -> Self {
        CliError::Analysis {
            source: e.to_string(),
        }
    }
}

impl From<glycoseek::errors::ConfigError> for CliError {
    fn from(e: glycoseek::errors::ConfigError) -> Self {
        CliError::Config {
            source: e.to_string(),
        }
    }
}
