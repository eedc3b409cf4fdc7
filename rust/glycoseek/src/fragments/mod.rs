mod assigner;
mod fragment_mass_builder;

pub use assigner::{
    FragmentAssigner,
    FragmentParams,
};
pub use fragment_mass_builder::{
    FragmentIonType,
    FragmentMassBuilder,
    TheoreticalFragment,
};
