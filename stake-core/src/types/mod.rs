mod assignment;
mod lease;
mod primitives;

pub use assignment::*;
pub use lease::*;
pub use primitives::*;
