mod provision_error;
mod provision_result;
mod provision_service;

pub use provision_error::*;
pub use provision_result::*;
pub use provision_service::*;
