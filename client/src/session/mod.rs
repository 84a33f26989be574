mod manager;
mod scheduler;
mod state;

pub use manager::*;
pub use state::*;
