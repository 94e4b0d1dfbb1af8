mod domain;
mod nats;
mod profile;
mod provision;

pub use domain::*;
pub use nats::*;
pub use profile::*;
pub use provision::*;
