mod eic;

pub use eic::{
    EicAggregation,
    EicBuilder,
};
