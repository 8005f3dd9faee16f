//! Error plumbing shared by every parley crate.

pub mod error;

pub use error::{Error, FromMessage, Result};
