mod message_router;
mod route_map;
mod route_map_sync;
mod uplink;

pub use message_router::*;
pub use route_map::*;
pub use route_map_sync::*;
pub use uplink::*;
