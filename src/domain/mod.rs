pub mod forecast;
pub mod timeseries;

pub use forecast::*;
pub use timeseries::*;
