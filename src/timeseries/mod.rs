pub mod normalize;

pub use normalize::{normalize, NormalizationError, Sampling};
