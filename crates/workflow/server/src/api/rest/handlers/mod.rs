//! API request handlers

mod applications;
mod audit;
mod definitions;
mod health;
mod structure;

pub use applications::*;
pub use audit::*;
pub use definitions::*;
pub use health::*;
pub use structure::*;
