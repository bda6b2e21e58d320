//! Named indexes over a graph store: creation and lookup, writer sessions
//! and read queries.

mod handle;
mod manager;
mod session;

pub use handle::*;
pub use manager::*;
pub use session::*;
