//! User accounts, password authentication and remember-me tokens over a
//! pluggable record store.

pub mod config;
pub mod error;
pub mod logging;
pub mod users;

pub use error::{Result, UserError};
pub use users::{User, UserDb, UserService, Users};
