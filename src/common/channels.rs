//! Channel type definitions for the ingest loop

use tokio::sync::mpsc;

use super::types::InboundEvent;

/// Default channel buffer size
pub const DEFAULT_CHANNEL_SIZE: usize = 1000;

/// Create a new inbound event channel with the default buffer size
pub fn create_event_channel() -> (mpsc::Sender<InboundEvent>, mpsc::Receiver<InboundEvent>) {
    mpsc::channel(DEFAULT_CHANNEL_SIZE)
}

/// Create a new inbound event channel with a custom buffer size
pub fn create_event_channel_with_size(
    size: usize,
) -> (mpsc::Sender<InboundEvent>, mpsc::Receiver<InboundEvent>) {
    mpsc::channel(size.max(1))
}
