use serde::{
    Deserialize,
    Serialize,
};
use std::collections::BTreeMap;
use tracing::warn;

use rustyms::glycan::{
    BaseSugar,
    GlycanSubstituent,
    MonoSaccharide,
};
use rustyms::{
    Chemical,
    MolecularFormula,
};

use super::chemistry::{
    ELECTRON_MASS,
    ElementalComposition,
    PROTON_MASS,
};
use crate::errors::InputError;
use crate::utils::math::ppm_error;

/// Library mass and composition mass disagreeing by more than this only warns.
const MASS_AGREEMENT_PPM: f64 = 10.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Monosaccharide {
    #[serde(rename = "H")]
    Hex,
    #[serde(rename = "N")]
    HexNAc,
    #[serde(rename = "S")]
    NeuAc,
    #[serde(rename = "G")]
    NeuGc,
    #[serde(rename = "F")]
    DHex,
    #[serde(rename = "X")]
    Pent,
    #[serde(rename = "U")]
    HexA,
    #[serde(rename = "M")]
    HexN,
}

impl Monosaccharide {
    pub fn code(&self) -> &'static str {
        match self {
            Monosaccharide::Hex => "H",
            Monosaccharide::HexNAc => "N",
            Monosaccharide::NeuAc => "S",
            Monosaccharide::NeuGc => "G",
            Monosaccharide::DHex => "F",
            Monosaccharide::Pent => "X",
            Monosaccharide::HexA => "U",
            Monosaccharide::HexN => "M",
        }
    }

    /// The rustyms monosaccharide this code stands for, isomers left open.
    pub fn monosaccharide(&self) -> MonoSaccharide {
        use GlycanSubstituent::*;
        match self {
            Monosaccharide::Hex => MonoSaccharide::new(BaseSugar::Hexose(None), &[]),
            Monosaccharide::HexNAc => MonoSaccharide::new(BaseSugar::Hexose(None), &[NAcetyl]),
            Monosaccharide::NeuAc => {
                MonoSaccharide::new(BaseSugar::Nonose(None), &[Amino, Acetyl, Acid])
            }
            Monosaccharide::NeuGc => {
                MonoSaccharide::new(BaseSugar::Nonose(None), &[Amino, Glycolyl, Acid])
            }
            Monosaccharide::DHex => MonoSaccharide::new(BaseSugar::Hexose(None), &[Deoxy]),
            Monosaccharide::Pent => MonoSaccharide::new(BaseSugar::Pentose(None), &[]),
            Monosaccharide::HexA => MonoSaccharide::new(BaseSugar::Hexose(None), &[Acid]),
            Monosaccharide::HexN => MonoSaccharide::new(BaseSugar::Hexose(None), &[Amino]),
        }
    }

    /// Composition of the residue as it sits in a chain (one water lost).
    pub fn residue_composition(&self) -> ElementalComposition {
        ElementalComposition::from(self.monosaccharide().formula())
    }
}

/// Monosaccharide counts of a glycan, e.g. `H5N4F1`.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GlycanComposition(pub BTreeMap<Monosaccharide, i32>);

impl GlycanComposition {
    pub fn new(counts: &[(Monosaccharide, i32)]) -> Self {
        Self(counts.iter().copied().collect())
    }

    pub fn count(&self, mono: Monosaccharide) -> i32 {
        self.0.get(&mono).copied().unwrap_or(0)
    }

    pub fn total_residues(&self) -> i32 {
        self.0.values().filter(|x| **x > 0).sum()
    }

    /// Sum of the residue compositions, without the reducing end water.
    pub fn residue_composition(&self) -> ElementalComposition {
        let mut out = ElementalComposition::default();
        for (mono, count) in self.0.iter() {
            out.add(&mono.residue_composition(), *count);
        }
        out
    }

    /// Every non-empty sub-composition, the composition itself included.
    ///
    /// Output order is deterministic (lexicographic over the counts).
    pub fn sub_compositions(&self) -> Vec<GlycanComposition> {
        let entries: Vec<(Monosaccharide, i32)> = self
            .0
            .iter()
            .filter(|(_, c)| **c > 0)
            .map(|(m, c)| (*m, *c))
            .collect();
        let mut out = Vec::new();
        let mut current = vec![0i32; entries.len()];
        loop {
            if current.iter().any(|x| *x > 0) {
                out.push(GlycanComposition(
                    entries
                        .iter()
                        .zip(current.iter())
                        .filter(|(_, c)| **c > 0)
                        .map(|((m, _), c)| (*m, *c))
                        .collect(),
                ));
            }
            // Odometer style increment
            let mut pos = 0;
            loop {
                if pos == entries.len() {
                    return out;
                }
                if current[pos] < entries[pos].1 {
                    current[pos] += 1;
                    break;
                }
                current[pos] = 0;
                pos += 1;
            }
        }
    }
}

impl std::fmt::Display for GlycanComposition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (mono, count) in self.0.iter() {
            if *count != 0 {
                write!(f, "{}{}", mono.code(), count)?;
            }
        }
        Ok(())
    }
}

/// A single charge carrying species of an adduct.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ChargeCarrier {
    #[serde(rename = "H")]
    Proton,
    #[serde(rename = "Na")]
    Sodium,
    #[serde(rename = "K")]
    Potassium,
    #[serde(rename = "Li")]
    Lithium,
    #[serde(rename = "NH4")]
    Ammonium,
    #[serde(rename = "-H")]
    Deprotonation,
}

impl ChargeCarrier {
    pub fn charge(&self) -> i32 {
        match self {
            ChargeCarrier::Deprotonation => -1,
            _ => 1,
        }
    }

    /// Neutral formula of a cation carrier, `None` for proton transfers.
    fn cation_formula(&self) -> Option<MolecularFormula> {
        match self {
            ChargeCarrier::Sodium => Some(rustyms::molecular_formula!(Na 1)),
            ChargeCarrier::Potassium => Some(rustyms::molecular_formula!(K 1)),
            ChargeCarrier::Lithium => Some(rustyms::molecular_formula!(Li 1)),
            ChargeCarrier::Ammonium => Some(rustyms::molecular_formula!(N 1 H 4)),
            ChargeCarrier::Proton | ChargeCarrier::Deprotonation => None,
        }
    }

    /// Mass added to the neutral molecule per carrier.
    pub fn mass_shift(&self) -> f64 {
        match (self, self.cation_formula()) {
            (ChargeCarrier::Deprotonation, _) => -PROTON_MASS,
            (_, Some(formula)) => formula.monoisotopic_mass().value - ELECTRON_MASS,
            (_, None) => PROTON_MASS,
        }
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            ChargeCarrier::Proton => "H",
            ChargeCarrier::Sodium => "Na",
            ChargeCarrier::Potassium => "K",
            ChargeCarrier::Lithium => "Li",
            ChargeCarrier::Ammonium => "NH4",
            ChargeCarrier::Deprotonation => "-H",
        }
    }
}

/// Ionization form, a multiset of charge carriers such as `{H: 1, Na: 1}`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Adduct {
    pub carriers: BTreeMap<ChargeCarrier, u8>,
}

impl Adduct {
    pub fn new(carriers: &[(ChargeCarrier, u8)]) -> Self {
        Self {
            carriers: carriers.iter().copied().filter(|(_, n)| *n > 0).collect(),
        }
    }

    pub fn protonated(charge: u8) -> Self {
        Self::new(&[(ChargeCarrier::Proton, charge)])
    }

    pub fn deprotonated(charge: u8) -> Self {
        Self::new(&[(ChargeCarrier::Deprotonation, charge)])
    }

    pub fn charge(&self) -> i32 {
        self.carriers
            .iter()
            .map(|(c, n)| c.charge() * *n as i32)
            .sum()
    }

    pub fn mass_shift(&self) -> f64 {
        self.carriers
            .iter()
            .map(|(c, n)| c.mass_shift() * *n as f64)
            .sum()
    }

    /// m/z of a neutral mass carrying this adduct.
    ///
    /// Zero charge adducts are rejected when the library is validated, so this
    /// returns NaN for them instead of dividing by zero.
    pub fn mz(&self, neutral_mass: f64) -> f64 {
        let z = self.charge().abs();
        if z == 0 {
            return f64::NAN;
        }
        (neutral_mass + self.mass_shift()) / z as f64
    }

    pub fn name(&self) -> String {
        self.carriers
            .iter()
            .map(|(c, n)| format!("{}{}", c.symbol(), n))
            .collect::<Vec<_>>()
            .join("")
    }
}

impl std::fmt::Display for Adduct {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// A library entry, produced by the library builder and read only here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GlycanCandidate {
    pub id: String,
    pub composition: GlycanComposition,
    pub monoisotopic_mass: f64,
    pub adducts: Vec<Adduct>,
    /// Reducing end tag composition (e.g. a 2-AB label), if any.
    #[serde(default)]
    pub reducing_end_tag: Option<ElementalComposition>,
}

impl GlycanCandidate {
    /// Builds a candidate whose mass is derived from its composition.
    pub fn from_composition(
        id: impl Into<String>,
        composition: GlycanComposition,
        adducts: Vec<Adduct>,
        reducing_end_tag: Option<ElementalComposition>,
    ) -> Self {
        let mut out = Self {
            id: id.into(),
            composition,
            monoisotopic_mass: 0.0,
            adducts,
            reducing_end_tag,
        };
        out.monoisotopic_mass = out.elemental_composition().monoisotopic_mass();
        out
    }

    /// Residues plus the reducing end water plus the tag.
    pub fn elemental_composition(&self) -> ElementalComposition {
        let mut out = self.composition.residue_composition();
        out.add(&ElementalComposition::water(), 1);
        if let Some(tag) = &self.reducing_end_tag {
            out.add(tag, 1);
        }
        out
    }

    pub fn precursor_mz(&self, adduct: &Adduct) -> f64 {
        adduct.mz(self.monoisotopic_mass)
    }

    /// Rejects non-physical candidates.
    ///
    /// A library mass that does not agree with the composition is only
    /// warned about, the library mass is authoritative.
    pub fn validate(&self) -> Result<(), InputError> {
        for (mono, count) in self.composition.0.iter() {
            if *count < 0 {
                return Err(InputError::NegativeMonosaccharideCount {
                    candidate: self.id.clone(),
                    monosaccharide: mono.code().to_string(),
                    count: *count,
                });
            }
        }
        if self.composition.total_residues() == 0 {
            return Err(InputError::EmptyComposition {
                candidate: self.id.clone(),
            });
        }
        if !self.monoisotopic_mass.is_finite() || self.monoisotopic_mass <= 0.0 {
            return Err(InputError::NonPhysicalMass {
                candidate: self.id.clone(),
                mass: self.monoisotopic_mass,
            });
        }
        if self.adducts.is_empty() {
            return Err(InputError::MissingAdducts {
                candidate: self.id.clone(),
            });
        }
        if let Some(adduct) = self.adducts.iter().find(|a| a.charge() == 0) {
            return Err(InputError::ZeroChargeAdduct {
                candidate: self.id.clone(),
                adduct: adduct.name(),
            });
        }

        let computed = self.elemental_composition().monoisotopic_mass();
        let deviation = ppm_error(self.monoisotopic_mass, computed);
        if deviation.abs() > MASS_AGREEMENT_PPM {
            warn!(
                "Candidate {} declares mass {:.5} but its composition gives {:.5} ({:.1} ppm)",
                self.id, self.monoisotopic_mass, computed, deviation
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hex5hexnac4() -> GlycanComposition {
        GlycanComposition::new(&[(Monosaccharide::Hex, 5), (Monosaccharide::HexNAc, 4)])
    }

    #[test]
    fn test_composition_display_and_serde() {
        let comp = GlycanComposition::new(&[
            (Monosaccharide::HexNAc, 4),
            (Monosaccharide::Hex, 5),
            (Monosaccharide::DHex, 1),
        ]);
        assert_eq!(comp.to_string(), "H5N4F1");
        let parsed: GlycanComposition = serde_json::from_str(r#"{"H": 5, "N": 4, "F": 1}"#).unwrap();
        assert_eq!(parsed, comp);
    }

    #[test]
    fn test_h5n4_mass() {
        // Free reducing end H5N4, a common N-glycan core
        let cand = GlycanCandidate::from_composition(
            "H5N4",
            hex5hexnac4(),
            vec![Adduct::protonated(2)],
            None,
        );
        assert!((cand.monoisotopic_mass - 1640.5918).abs() < 1e-3);
        let mz = cand.precursor_mz(&Adduct::protonated(2));
        assert!((mz - (1640.5918 + 2.0 * PROTON_MASS) / 2.0).abs() < 1e-3);
    }

    #[test]
    fn test_residue_masses() {
        let expected = [
            (Monosaccharide::Hex, 162.05282),
            (Monosaccharide::HexNAc, 203.07937),
            (Monosaccharide::NeuAc, 291.09542),
            (Monosaccharide::NeuGc, 307.09033),
            (Monosaccharide::DHex, 146.05791),
            (Monosaccharide::Pent, 132.04226),
            (Monosaccharide::HexA, 176.03209),
            (Monosaccharide::HexN, 161.06881),
        ];
        for (mono, mass) in expected {
            let got = mono.residue_composition().monoisotopic_mass();
            assert!((got - mass).abs() < 1e-4, "{:?}: {} vs {}", mono, got, mass);
        }
    }

    #[test]
    fn test_sodium_shift() {
        let shift = ChargeCarrier::Sodium.mass_shift();
        assert!((shift - 22.989218).abs() < 1e-5, "{}", shift);
        assert!((ChargeCarrier::Ammonium.mass_shift() - 18.033823).abs() < 1e-5);
    }

    #[test]
    fn test_adduct_naming_and_charge() {
        let adduct = Adduct::new(&[(ChargeCarrier::Sodium, 1), (ChargeCarrier::Proton, 1)]);
        assert_eq!(adduct.charge(), 2);
        assert_eq!(adduct.name(), "H1Na1");
        let neg = Adduct::deprotonated(2);
        assert_eq!(neg.charge(), -2);
        assert_eq!(neg.name(), "-H2");
        assert!((neg.mz(1000.0) - (1000.0 - 2.0 * PROTON_MASS) / 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_adduct_serde() {
        let adduct: Adduct = serde_json::from_str(r#"{"H": 1, "Na": 1}"#).unwrap();
        assert_eq!(adduct.charge(), 2);
        let neg: Adduct = serde_json::from_str(r#"{"-H": 1}"#).unwrap();
        assert_eq!(neg.charge(), -1);
    }

    #[test]
    fn test_validate_rejects_negative_counts() {
        let cand = GlycanCandidate {
            id: "bad".into(),
            composition: GlycanComposition::new(&[(Monosaccharide::Hex, -1)]),
            monoisotopic_mass: 100.0,
            adducts: vec![Adduct::protonated(1)],
            reducing_end_tag: None,
        };
        assert!(matches!(
            cand.validate(),
            Err(InputError::NegativeMonosaccharideCount { count: -1, .. })
        ));
    }

    #[test]
    fn test_validate_rejects_zero_charge_adduct() {
        let mut cand =
            GlycanCandidate::from_composition("x", hex5hexnac4(), vec![Adduct::new(&[])], None);
        assert!(matches!(
            cand.validate(),
            Err(InputError::ZeroChargeAdduct { .. })
        ));
        cand.adducts.clear();
        assert!(matches!(cand.validate(), Err(InputError::MissingAdducts { .. })));
    }

    #[test]
    fn test_sub_compositions() {
        let comp = GlycanComposition::new(&[(Monosaccharide::Hex, 2), (Monosaccharide::HexNAc, 1)]);
        let subs = comp.sub_compositions();
        // (2 + 1) * (1 + 1) - 1 empty
        assert_eq!(subs.len(), 5);
        assert!(subs.contains(&comp));
        assert!(subs.contains(&GlycanComposition::new(&[(Monosaccharide::HexNAc, 1)])));
    }
}
