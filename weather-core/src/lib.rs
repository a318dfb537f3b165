pub mod activity_log;
pub mod clock;
pub mod config;
pub mod error;
pub mod error_utils;
pub mod store;
pub mod transport;
pub mod types;

pub use activity_log::*;
pub use clock::*;
pub use config::*;
pub use error::*;
pub use error_utils::*;
pub use store::*;
pub use transport::{HttpResponse, HttpTransport, ReqwestTransport};
pub use types::*;

/// Upper bound for every outbound HTTP call.
pub const REQUEST_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(30);
