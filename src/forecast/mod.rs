pub mod engine;
pub mod production;
pub mod weather;

pub use engine::*;
pub use production::*;
pub use weather::*;
