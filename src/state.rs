//! # Application State
//!
//! Shared state handed to every WebSocket upgrade through `web::Data`.
//!
//! ## What lives here:
//! - **conversation**: the single global conversation (it carries its own mutex)
//! - **hub**: address of the broadcast actor; cloning an `Addr` is cheap
//!
//! Nothing in here needs an outer lock: each field synchronizes internally.

use crate::conversation::ConversationHandle;
use crate::hub::BroadcastHub;
use actix::Addr;

#[derive(Clone)]
pub struct AppState {
    pub conversation: ConversationHandle,
    pub hub: Addr<BroadcastHub>,
}

impl AppState {
    pub fn new(conversation: ConversationHandle, hub: Addr<BroadcastHub>) -> Self {
        Self { conversation, hub }
    }
}
