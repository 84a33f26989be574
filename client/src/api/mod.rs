pub mod error;
pub mod gateway;
pub mod types;

pub use error::*;
pub use gateway::*;
pub use types::*;
