use crate::models::{
    ElementalComposition,
    GlycanComposition,
    PROTON_MASS,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FragmentIonType {
    /// Non-reducing end fragment.
    B,
    /// Reducing end fragment, carries the reducing end tag.
    Y,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TheoreticalFragment {
    pub label: String,
    pub mz: f64,
    pub charge: i32,
    pub ion_type: FragmentIonType,
}

/// Builds the theoretical fragment library of a glycan composition.
#[derive(Debug, Clone, Copy)]
pub struct FragmentMassBuilder {
    pub max_charge: u8,
}

impl FragmentMassBuilder {
    pub fn new(max_charge: u8) -> Self {
        Self { max_charge }
    }

    /// Every sub-composition as a B ion with a water lost, intact and with a
    /// water gained. With a reducing end tag, Y ions carrying the tag (intact
    /// and with a water lost) are added too.
    ///
    /// Charges go from 1 up to the smaller of the precursor charge and the
    /// configured maximum; negative precursors give deprotonated fragments.
    /// The output is sorted by m/z.
    pub fn fragment_mzs(
        &self,
        composition: &GlycanComposition,
        reducing_end_tag: Option<&ElementalComposition>,
        precursor_charge: i32,
    ) -> Vec<TheoreticalFragment> {
        let max_charge = precursor_charge.unsigned_abs().min(self.max_charge as u32) as i32;
        if max_charge == 0 {
            return Vec::new();
        }
        let sign = if precursor_charge < 0 { -1 } else { 1 };
        let water = ElementalComposition::water().monoisotopic_mass();
        let tag_mass = reducing_end_tag.map(|t| t.monoisotopic_mass());

        let mut out = Vec::new();
        for sub in composition.sub_compositions() {
            let name = sub.to_string();
            let residues = sub.residue_composition().monoisotopic_mass();

            let mut neutral: Vec<(String, f64, FragmentIonType)> = vec![
                (format!("{}-H2O", name), residues - water, FragmentIonType::B),
                (name.clone(), residues, FragmentIonType::B),
                (format!("{}+H2O", name), residues + water, FragmentIonType::B),
            ];
            if let Some(tag) = tag_mass {
                neutral.push((
                    format!("{}+Tag-H2O", name),
                    residues + tag,
                    FragmentIonType::Y,
                ));
                neutral.push((
                    format!("{}+Tag", name),
                    residues + water + tag,
                    FragmentIonType::Y,
                ));
            }

            for (label, mass, ion_type) in neutral {
                for z in 1..=max_charge {
                    let mz = (mass + (sign * z) as f64 * PROTON_MASS) / z as f64;
                    if mz <= 0.0 {
                        continue;
                    }
                    out.push(TheoreticalFragment {
                        label: format!("{} ({}{})", label, z, if sign < 0 { '-' } else { '+' }),
                        mz,
                        charge: sign * z,
                        ion_type,
                    });
                }
            }
        }
        out.sort_by(|a, b| a.mz.total_cmp(&b.mz).then_with(|| a.label.cmp(&b.label)));
        out
    }
}
