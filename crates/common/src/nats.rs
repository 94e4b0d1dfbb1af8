mod client;
mod event_consumer;
mod lifecycle_event_consumer;
mod lifecycle_event_producer;
mod lifecycle_event_service;
mod message_producer;
mod middleware;
mod request_reply;
mod trace_context;
mod traits;

pub use client::*;
pub use event_consumer::*;
pub use lifecycle_event_consumer::*;
pub use lifecycle_event_producer::*;
pub use lifecycle_event_service::*;
pub use message_producer::*;
pub use middleware::*;
pub use request_reply::*;
pub use trace_context::*;
pub use traits::*;
