pub mod correlation;
pub mod math;
mod tuple_range;

pub use tuple_range::{
    TupleRange,
    TupleRangeError,
};
