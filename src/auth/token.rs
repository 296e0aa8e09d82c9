//! Token wire payloads, domain records, and secret wrappers.

pub mod payload;
pub mod record;
pub mod secret;
