mod bootstrap_client;
mod certs;
mod key_value_store;
mod lifecycle_event;
mod message;
mod registry;
mod result;

pub use bootstrap_client::*;
pub use certs::*;
pub use key_value_store::*;
pub use lifecycle_event::*;
pub use message::*;
pub use registry::*;
pub use result::*;
