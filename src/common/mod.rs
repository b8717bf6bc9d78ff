pub(crate) mod data;

#[cfg(feature = "remote")]
pub(crate) mod http;
