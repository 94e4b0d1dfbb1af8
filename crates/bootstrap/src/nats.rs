mod handshake_service;

pub use handshake_service::*;
