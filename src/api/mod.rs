#[cfg(feature = "remote")]
mod client;

#[cfg(feature = "remote")]
pub use client::{Error as ClientError, ExpectationClient};
