pub mod error;
pub mod factors;
pub mod predictions;
pub mod team;

pub use error::*;
pub use factors::*;
pub use predictions::*;
pub use team::*;
