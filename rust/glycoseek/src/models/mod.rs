pub mod chemistry;
pub mod chromatogram;
pub mod glycan;
pub mod identification;
pub mod spectrum;
pub mod tolerance;

pub use chemistry::{
    ELECTRON_MASS,
    Element,
    ElementalComposition,
    NEUTRON_SHIFT,
    PROTON_MASS,
};
pub use chromatogram::{
    ChromatographicPeak,
    Eic,
};
pub use glycan::{
    Adduct,
    ChargeCarrier,
    GlycanCandidate,
    GlycanComposition,
    Monosaccharide,
};
pub use identification::{
    AcrossPeakScores,
    Fragment,
    Identification,
    IsotopePeakMatch,
    IsotopicEnvelope,
    ScoreVector,
    ScoreWeights,
    ShapeMethod,
    ShapeScore,
};
pub use spectrum::{
    MsLevel,
    Precursor,
    Spectrum,
    SpectrumCollection,
};
pub use tolerance::{
    MzTolerance,
    RtWindow,
};
