mod geo;
mod tracker;

pub use geo::*;
pub use tracker::*;
