use crate::domain::entity::{EventKey, EventPayload};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivePageViewOutput {
    pub event_id: String,
    pub device: String,
}

/// ReceivePageViewUseCase は受信したページビューをログに記録する。転送・永続化はしない。
#[derive(Default)]
pub struct ReceivePageViewUseCase;

impl ReceivePageViewUseCase {
    pub fn new() -> Self {
        Self
    }

    pub fn execute(&self, key: &EventKey, payload: &EventPayload) -> ReceivePageViewOutput {
        tracing::info!(key = %key.id, device = %payload.device, "got page view");
        ReceivePageViewOutput {
            event_id: key.id.clone(),
            device: payload.device.clone(),
        }
    }
}
