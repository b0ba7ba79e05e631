//! Platform adapters and the registry that builds them from configuration

pub mod http;
pub mod registry;
pub mod signing;

pub use http::HttpPlatformAdapter;
pub use registry::PlatformRegistry;
pub use signing::{sign_payload, SignatureHeaders};
