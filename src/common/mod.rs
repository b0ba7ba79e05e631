//! Types, traits and utilities shared by every gateway component

pub mod channels;
pub mod errors;
pub mod retry;
pub mod traits;
pub mod types;
