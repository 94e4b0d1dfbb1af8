mod domain;
mod lora_adapter;
mod mqtt;

pub use domain::*;
pub use lora_adapter::*;
pub use mqtt::*;
