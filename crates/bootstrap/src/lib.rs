mod bootstrap;
mod domain;
mod nats;

pub use bootstrap::*;
pub use domain::*;
pub use nats::*;
