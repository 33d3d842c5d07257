//! # Broadcast Hub
//!
//! Actor that owns the set of live WebSocket connections and fans every
//! conversation event out to all of them.
//!
//! ## Bridging the recognition thread:
//! The recognition thread never touches actor state. It pushes
//! `OutboundEvent`s into an unbounded tokio channel; the hub attaches the
//! receiving end as a stream when it starts, so events are delivered on the
//! actix event loop in the order they were produced.
//!
//! Registration, removal and fan-out are all handled by this one actor, so the
//! connection set is never mutated while a publish is iterating over it.

use crate::events::OutboundEvent;
use actix::prelude::*;
use std::collections::HashMap;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Serialized frame delivered to a single connection.
#[derive(Message)]
#[rtype(result = "()")]
pub struct SendText(pub String);

/// Add a connection to the broadcast set.
#[derive(Message)]
#[rtype(result = "()")]
pub struct Register {
    pub id: Uuid,
    pub recipient: Recipient<SendText>,
}

/// Remove a connection from the broadcast set.
#[derive(Message)]
#[rtype(result = "()")]
pub struct Unregister {
    pub id: Uuid,
}

/// Number of registered connections.
#[derive(Message)]
#[rtype(result = "usize")]
pub struct ConnectionCount;

pub struct BroadcastHub {
    connections: HashMap<Uuid, Recipient<SendText>>,
    events: Option<UnboundedReceiver<OutboundEvent>>,
}

impl BroadcastHub {
    /// Create a hub that drains `events` once started.
    pub fn new(events: UnboundedReceiver<OutboundEvent>) -> Self {
        Self {
            connections: HashMap::new(),
            events: Some(events),
        }
    }

    fn publish(&self, event: &OutboundEvent) {
        let json = match event.to_json() {
            Ok(json) => json,
            Err(err) => {
                warn!("Failed to serialize event {:?}: {}", event, err);
                return;
            }
        };

        debug!("Broadcasting to {} connection(s): {}", self.connections.len(), json);

        for (id, recipient) in &self.connections {
            // A failed send leaves the connection registered; it unregisters itself when it stops.
            if let Err(err) = recipient.try_send(SendText(json.clone())) {
                warn!("Failed to deliver event to connection {}: {}", id, err);
            }
        }
    }
}

impl Actor for BroadcastHub {
    type Context = Context<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        if let Some(events) = self.events.take() {
            ctx.add_stream(UnboundedReceiverStream::new(events));
        }
        info!("Broadcast hub started");
    }
}

impl StreamHandler<OutboundEvent> for BroadcastHub {
    fn handle(&mut self, event: OutboundEvent, _ctx: &mut Self::Context) {
        self.publish(&event);
    }

    fn finished(&mut self, _ctx: &mut Self::Context) {
        // Keep serving register/unregister after every producer is gone.
        warn!("Event channel closed, no further conversation events will be broadcast");
    }
}

impl Handler<Register> for BroadcastHub {
    type Result = ();

    fn handle(&mut self, msg: Register, _ctx: &mut Self::Context) {
        self.connections.insert(msg.id, msg.recipient);
        info!("Connection {} registered ({} total)", msg.id, self.connections.len());
    }
}

impl Handler<Unregister> for BroadcastHub {
    type Result = ();

    fn handle(&mut self, msg: Unregister, _ctx: &mut Self::Context) {
        if self.connections.remove(&msg.id).is_some() {
            info!("Connection {} unregistered ({} total)", msg.id, self.connections.len());
        }
    }
}

impl Handler<ConnectionCount> for BroadcastHub {
    type Result = usize;

    fn handle(&mut self, _msg: ConnectionCount, _ctx: &mut Self::Context) -> usize {
        self.connections.len()
    }
}
