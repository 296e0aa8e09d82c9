//! Auth-domain cookie and token models.

pub mod cookie;
pub mod token;

pub use cookie::*;
pub use token::{payload::*, record::*, secret::*};
