pub mod domain;
pub mod nats;
pub mod process;
pub mod sdk;
pub mod telemetry;
