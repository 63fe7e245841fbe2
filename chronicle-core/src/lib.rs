//! Chronicle Core - Entity Types
//!
//! Data structures, error taxonomy, configuration and name
//! canonicalization shared by every chronicle crate. No IO lives here.

mod canonical;
mod config;
mod entities;
mod enums;
mod error;
mod identity;

pub use canonical::*;
pub use config::*;
pub use entities::*;
pub use enums::*;
pub use error::*;
pub use identity::*;
