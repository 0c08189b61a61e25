pub mod battery;
pub mod error;
pub mod types;

pub use battery::*;
pub use error::*;
pub use types::*;
