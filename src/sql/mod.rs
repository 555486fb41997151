//! Safe SQL builder: identifiers from definitions only, values as parameters.

mod builder;
mod dialect;
pub mod params;
pub use builder::*;
pub use dialect::*;
pub use params::*;
