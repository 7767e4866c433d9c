pub mod adapters;
pub mod factory;
pub mod traits;
pub mod types;

pub use adapters::*;
pub use factory::*;
pub use traits::*;
pub use types::*;
