//! Molecular formulas, monoisotopic masses and isotope envelopes.
//!
//! Masses and natural isotope abundances come from `rustyms`, this module
//! only wraps its [`MolecularFormula`] so library files can spell a formula
//! as a plain `{"C": 7, "H": 8, "N": 2}` map.

use rustyms::MolecularFormula;
use serde::{
    Deserialize,
    Serialize,
};
use std::collections::BTreeMap;

pub use rustyms::Element;

pub const PROTON_MASS: f64 = 1.007276466812;
pub const ELECTRON_MASS: f64 = 0.00054857990946;
/// Mass difference between consecutive isotopologue peaks (13C - 12C).
pub const NEUTRON_SHIFT: f64 = 1.0033548378;

/// Isotopologues less probable than this are not generated at all.
const ISOTOPE_PROBABILITY_CUTOFF: f64 = 1e-7;

/// Element counts of a molecule or a fragment of one.
///
/// Counts are signed so that losses (e.g. a water loss) can be expressed as
/// compositions and added on.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(
    try_from = "BTreeMap<String, i32>",
    into = "BTreeMap<String, i32>"
)]
pub struct ElementalComposition(MolecularFormula);

impl ElementalComposition {
    /// `None` when rustyms rejects the formula.
    pub fn new(counts: &[(Element, i32)]) -> Option<Self> {
        let elements: Vec<_> = counts.iter().map(|(e, n)| (*e, None, *n)).collect();
        MolecularFormula::new(&elements, &[]).map(Self)
    }

    pub fn water() -> Self {
        Self(rustyms::molecular_formula!(H 2 O 1))
    }

    pub fn formula(&self) -> &MolecularFormula {
        &self.0
    }

    /// Adds `other` `times` times, negative `times` subtracts.
    pub fn add(&mut self, other: &Self, times: i32) {
        let mut formula = std::mem::take(&mut self.0);
        for _ in 0..times.unsigned_abs() {
            formula = if times > 0 {
                formula + other.0.clone()
            } else {
                formula - other.0.clone()
            };
        }
        self.0 = formula;
    }

    pub fn count(&self, elem: Element) -> i32 {
        self.0
            .elements()
            .iter()
            .filter(|(e, isotope, _)| *e == elem && isotope.is_none())
            .map(|(_, _, n)| *n)
            .sum()
    }

    pub fn monoisotopic_mass(&self) -> f64 {
        self.0.monoisotopic_mass().value
    }

    /// Relative abundances of the first `n` isotopologues at nominal mass
    /// shifts, normalized so the monoisotopic peak is 1.
    ///
    /// Elements with negative counts do not contribute.
    pub fn isotope_distribution(&self, n: usize) -> Vec<f64> {
        if n == 0 {
            return Vec::new();
        }
        let probabilities = self.0.isotopic_distribution(ISOTOPE_PROBABILITY_CUTOFF);
        let mut dist: Vec<f64> = probabilities.iter().take(n).copied().collect();
        dist.resize(n, 0.0);
        let mono = dist[0];
        if mono > 0.0 {
            dist.iter_mut().for_each(|x| *x /= mono);
        } else {
            dist[0] = 1.0;
        }
        dist
    }
}

impl From<MolecularFormula> for ElementalComposition {
    fn from(value: MolecularFormula) -> Self {
        Self(value)
    }
}

impl TryFrom<BTreeMap<String, i32>> for ElementalComposition {
    type Error = String;

    fn try_from(value: BTreeMap<String, i32>) -> Result<Self, Self::Error> {
        let mut counts = Vec::with_capacity(value.len());
        for (symbol, count) in value.iter() {
            let elem = Element::try_from(symbol.as_str())
                .or_else(|()| Element::try_from(symbol.to_lowercase().as_str()))
                .map_err(|()| format!("unknown element symbol '{}'", symbol))?;
            counts.push((elem, *count));
        }
        Self::new(&counts).ok_or_else(|| format!("invalid molecular formula {:?}", value))
    }
}

impl From<ElementalComposition> for BTreeMap<String, i32> {
    fn from(value: ElementalComposition) -> Self {
        let mut out = BTreeMap::new();
        for (elem, isotope, count) in value.0.elements() {
            let key = match isotope {
                Some(iso) => format!("{}{}", iso, elem),
                None => elem.to_string(),
            };
            *out.entry(key).or_insert(0) += *count;
        }
        out
    }
}

impl std::fmt::Display for ElementalComposition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.hill_notation())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_water_mass() {
        let water = ElementalComposition::water();
        assert!((water.monoisotopic_mass() - 18.0105646837).abs() < 1e-6);
        assert_eq!(water.count(Element::H), 2);
        assert_eq!(water.count(Element::O), 1);
    }

    #[test]
    fn test_add_removes_zeroed_elements() {
        let mut comp = ElementalComposition::water();
        comp.add(&ElementalComposition::water(), -1);
        assert_eq!(comp.monoisotopic_mass(), 0.0);
        assert_eq!(comp.count(Element::H), 0);
    }

    #[test]
    fn test_carbon_isotope_distribution() {
        // For C6 the M+1/M ratio is about 6 * 0.0107 / 0.9893
        let comp = ElementalComposition::new(&[(Element::C, 6)]).unwrap();
        let dist = comp.isotope_distribution(3);
        assert_eq!(dist.len(), 3);
        assert_eq!(dist[0], 1.0);
        assert!((dist[1] - 6.0 * 0.0107 / 0.9893).abs() < 1e-3, "{:?}", dist);
        assert!(dist[2] < dist[1]);
    }

    #[test]
    fn test_distribution_grows_with_size() {
        let small = ElementalComposition::new(&[(Element::C, 10), (Element::O, 5)]).unwrap();
        let large = ElementalComposition::new(&[(Element::C, 100), (Element::O, 50)]).unwrap();
        assert!(large.isotope_distribution(2)[1] > small.isotope_distribution(2)[1]);
    }

    #[test]
    fn test_distribution_is_padded_to_the_requested_length() {
        let dist = ElementalComposition::water().isotope_distribution(8);
        assert_eq!(dist.len(), 8);
        assert!(dist.iter().all(|x| x.is_finite() && *x >= 0.0));
        assert!(ElementalComposition::water().isotope_distribution(0).is_empty());
    }

    #[test]
    fn test_serde_as_symbol_map() {
        let tag: ElementalComposition =
            serde_json::from_str(r#"{"C": 7, "H": 8, "N": 2}"#).unwrap();
        assert_eq!(tag.count(Element::C), 7);
        assert_eq!(tag.count(Element::N), 2);
        let back = serde_json::to_value(&tag).unwrap();
        assert_eq!(back["C"], 7);
        assert_eq!(back["H"], 8);

        let bad: Result<ElementalComposition, _> = serde_json::from_str(r#"{"Qq": 1}"#);
        assert!(bad.is_err());
    }
}
