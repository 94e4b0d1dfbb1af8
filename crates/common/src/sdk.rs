mod certs_client;
mod http;
mod things_client;
mod users_client;

pub use certs_client::*;
pub use http::SdkConfig;
pub use things_client::*;
pub use users_client::*;
