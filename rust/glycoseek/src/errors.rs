use std::path::PathBuf;

/// Numeric problems that happen while scoring a single candidate.
///
/// None of these are fatal for a run, the pipeline turns them into a
/// degraded score for the task that produced them.
#[derive(Debug, Clone, PartialEq)]
pub enum DataProcessingError {
    ExpectedSlicesSameLength {
        expected: usize,
        other: usize,
        context: String,
    },
    ExpectedNonEmptyData {
        context: Option<String>,
    },
    ExpectedFiniteNonNanData {
        context: String,
    },
    InsufficientIsotopeMatches {
        matched: usize,
        required: usize,
    },
    FitDidNotConverge {
        iterations: usize,
    },
    BudgetExhausted {
        elapsed_ms: u128,
    },
}

impl DataProcessingError {
    pub fn append_to_context(mut self, context: &str) -> Self {
        match &mut self {
            DataProcessingError::ExpectedSlicesSameLength {
                context: owned_context,
                ..
            } => {
                owned_context.push_str(context);
            }
            DataProcessingError::ExpectedNonEmptyData {
                context: owned_context,
            } => match owned_context {
                Some(x) => x.push_str(context),
                None => *owned_context = Some(context.to_string()),
            },
            DataProcessingError::ExpectedFiniteNonNanData {
                context: owned_context,
            } => {
                owned_context.push_str(context);
            }
            DataProcessingError::InsufficientIsotopeMatches { .. }
            | DataProcessingError::FitDidNotConverge { .. }
            | DataProcessingError::BudgetExhausted { .. } => {}
        }
        self
    }
}

/// Malformed inputs coming from the spectrum reader or the library builder.
#[derive(Debug, Clone, PartialEq)]
pub enum InputError {
    EmptySpectrumCollection,
    NoMs1Spectra,
    UnsortedRetentionTimes {
        index: usize,
        previous: f64,
        current: f64,
    },
    UnsortedMzArray {
        index: usize,
    },
    MismatchedArrays {
        index: usize,
        mz_len: usize,
        intensity_len: usize,
    },
    NonFiniteValue {
        context: String,
    },
    MissingPrecursor {
        index: usize,
    },
    EmptyLibrary,
    NegativeMonosaccharideCount {
        candidate: String,
        monosaccharide: String,
        count: i32,
    },
    EmptyComposition {
        candidate: String,
    },
    NonPhysicalMass {
        candidate: String,
        mass: f64,
    },
    MissingAdducts {
        candidate: String,
    },
    ZeroChargeAdduct {
        candidate: String,
        adduct: String,
    },
}

impl std::fmt::Display for InputError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptySpectrumCollection => write!(f, "The spectrum collection is empty"),
            Self::NoMs1Spectra => write!(f, "The spectrum collection has no MS1 spectra"),
            Self::UnsortedRetentionTimes {
                index,
                previous,
                current,
            } => write!(
                f,
                "MS1 retention times must be strictly increasing, spectrum {} has rt {} after {}",
                index, current, previous
            ),
            Self::UnsortedMzArray { index } => {
                write!(f, "Spectrum {} has an m/z array that is not sorted", index)
            }
            Self::MismatchedArrays {
                index,
                mz_len,
                intensity_len,
            } => write!(
                f,
                "Spectrum {} has {} m/z values but {} intensities",
                index, mz_len, intensity_len
            ),
            Self::NonFiniteValue { context } => write!(f, "Non finite value found in {}", context),
            Self::MissingPrecursor { index } => {
                write!(f, "MS2 spectrum {} has no precursor information", index)
            }
            Self::EmptyLibrary => write!(f, "The glycan library is empty"),
            Self::NegativeMonosaccharideCount {
                candidate,
                monosaccharide,
                count,
            } => write!(
                f,
                "Candidate {} has a negative count ({}) of {}",
                candidate, count, monosaccharide
            ),
            Self::EmptyComposition { candidate } => {
                write!(f, "Candidate {} has no monosaccharides", candidate)
            }
            Self::NonPhysicalMass { candidate, mass } => {
                write!(f, "Candidate {} has a non-physical mass {}", candidate, mass)
            }
            Self::MissingAdducts { candidate } => {
                write!(f, "Candidate {} declares no adducts", candidate)
            }
            Self::ZeroChargeAdduct { candidate, adduct } => write!(
                f,
                "Candidate {} declares the adduct {} which carries no charge",
                candidate, adduct
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    MissingKey { key: &'static str },
    InvalidValue { key: &'static str, reason: String },
    ParseError { msg: String },
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingKey { key } => {
                write!(f, "Required configuration key `{}` is missing", key)
            }
            Self::InvalidValue { key, reason } => {
                write!(f, "Invalid value for configuration key `{}`: {}", key, reason)
            }
            Self::ParseError { msg } => write!(f, "Error parsing configuration: {}", msg),
        }
    }
}

#[derive(Debug)]
pub enum GlycoSeekError {
    Input(InputError),
    Config(ConfigError),
    DataProcessing(DataProcessingError),
    Io {
        source: std::io::Error,
        path: Option<PathBuf>,
    },
    ParseError {
        msg: String,
    },
}

impl std::fmt::Display for GlycoSeekError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Input(e) => write!(f, "Input error: {}", e),
            Self::Config(e) => write!(f, "Configuration error: {}", e),
            Self::DataProcessing(e) => write!(f, "Data processing error: {:?}", e),
            Self::Io { source, path } => match path {
                Some(path) => write!(f, "Error reading {}: {}", path.display(), source),
                None => write!(f, "IO error: {}", source),
            },
            Self::ParseError { msg } => write!(f, "Parse error: {}", msg),
        }
    }
}

impl std::error::Error for GlycoSeekError {}

pub type Result<T> = std::result::Result<T, GlycoSeekError>;

impl From<InputError> for GlycoSeekError {
    fn from(x: InputError) -> Self {
        Self::Input(x)
    }
}

impl From<ConfigError> for GlycoSeekError {
    fn from(x: ConfigError) -> Self {
        Self::Config(x)
    }
}

impl From<DataProcessingError> for GlycoSeekError {
    fn from(x: DataProcessingError) -> Self {
        Self::DataProcessing(x)
    }
}

impl From<serde_json::Error> for GlycoSeekError {
    fn from(val: serde_json::Error) -> Self {
        GlycoSeekError::ParseError {
            msg: val.to_string(),
        }
    }
}
