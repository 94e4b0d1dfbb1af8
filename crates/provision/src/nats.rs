mod provision_request_service;

pub use provision_request_service::*;
