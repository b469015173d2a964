pub mod error;
pub mod id;
pub mod math;

pub use error::*;
pub use id::*;
pub use math::*;
