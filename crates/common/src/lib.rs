//! Common types shared by the Freemius SSO crates

mod secret;
mod error;

pub use secret::Secret;
pub use error::{Error, Result};
