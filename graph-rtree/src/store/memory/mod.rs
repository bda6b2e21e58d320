mod config;
mod store;
mod transaction;

pub use config::*;
pub use store::*;
pub use transaction::*;
