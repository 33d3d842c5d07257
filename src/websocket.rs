//! # WebSocket Conversation Endpoint
//!
//! Clients connect to `/ws` (configurable) and receive every conversation
//! event as a JSON text frame.
//!
//! ## WebSocket Protocol:
//! 1. **Connection**: the client is registered with the broadcast hub and
//!    immediately receives `{"type":"state_change","state":...}` with the
//!    current state, so late joiners know where the conversation is
//! 2. **Events**: transcripts, questions, answers and state changes are pushed
//!    as they happen
//! 3. **Text input**: `{"type":"text_input","text":"..."}` answers the current
//!    question without speaking. Anything else is ignored without a reply
//! 4. **Heartbeat**: the server pings every 30 seconds and closes connections
//!    that stay silent for 60 seconds

use crate::conversation::{ConversationHandle, UtteranceSource};
use crate::events::{ClientMessage, OutboundEvent};
use crate::hub::{BroadcastHub, Register, SendText, Unregister};
use crate::state::AppState;

use actix::prelude::*;
use actix_web::{web, HttpRequest, HttpResponse, Result as ActixResult};
use actix_web_actors::ws;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);
const CLIENT_TIMEOUT: Duration = Duration::from_secs(60);

/// One actor per WebSocket connection.
pub struct ConversationSocket {
    /// Key in the hub's connection set
    id: Uuid,
    conversation: ConversationHandle,
    hub: Addr<BroadcastHub>,
    last_heartbeat: Instant,
}

impl ConversationSocket {
    pub fn new(state: &AppState) -> Self {
        Self {
            id: Uuid::new_v4(),
            conversation: state.conversation.clone(),
            hub: state.hub.clone(),
            last_heartbeat: Instant::now(),
        }
    }

    fn handle_text(&mut self, raw: &str) {
        match ClientMessage::parse(raw) {
            Some(ClientMessage::TextInput { text }) => {
                debug!("Text input from {}: {}", self.id, text);
                self.conversation.handle_utterance(&text, UtteranceSource::TextInput);
            }
            Some(ClientMessage::Unknown) => {
                debug!("Ignoring unsupported message type from {}", self.id);
            }
            None => {
                debug!("Ignoring malformed message from {}: {}", self.id, raw);
            }
        }
    }

    fn send_current_state(&self, ctx: &mut ws::WebsocketContext<Self>) {
        let event = OutboundEvent::state_change(self.conversation.current_state());
        match event.to_json() {
            Ok(json) => ctx.text(json),
            Err(err) => warn!("Failed to serialize initial state: {}", err),
        }
    }
}

impl Actor for ConversationSocket {
    type Context = ws::WebsocketContext<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        info!("WebSocket connection {} started", self.id);

        self.hub.do_send(Register {
            id: self.id,
            recipient: ctx.address().recipient(),
        });
        self.send_current_state(ctx);

        ctx.run_interval(HEARTBEAT_INTERVAL, |act, ctx| {
            if Instant::now().duration_since(act.last_heartbeat) > CLIENT_TIMEOUT {
                warn!("WebSocket {} heartbeat timeout, closing connection", act.id);
                ctx.stop();
                return;
            }
            ctx.ping(b"");
        });
    }

    fn stopped(&mut self, _ctx: &mut Self::Context) {
        info!("WebSocket connection {} stopped", self.id);
        self.hub.do_send(Unregister { id: self.id });
    }
}

impl StreamHandler<Result<ws::Message, ws::ProtocolError>> for ConversationSocket {
    fn handle(&mut self, msg: Result<ws::Message, ws::ProtocolError>, ctx: &mut Self::Context) {
        match msg {
            Ok(ws::Message::Text(text)) => {
                self.last_heartbeat = Instant::now();
                self.handle_text(&text);
            }
            Ok(ws::Message::Binary(_)) => {
                debug!("Ignoring binary frame from {}", self.id);
            }
            Ok(ws::Message::Ping(data)) => {
                ctx.pong(&data);
                self.last_heartbeat = Instant::now();
            }
            Ok(ws::Message::Pong(_)) => {
                self.last_heartbeat = Instant::now();
            }
            Ok(ws::Message::Close(reason)) => {
                info!("WebSocket {} closed: {:?}", self.id, reason);
                ctx.close(reason);
                ctx.stop();
            }
            Ok(ws::Message::Continuation(_)) => {
                warn!("Received unexpected continuation frame");
            }
            Ok(ws::Message::Nop) => {}
            Err(err) => {
                error!("WebSocket protocol error on {}: {}", self.id, err);
                ctx.stop();
            }
        }
    }
}

impl Handler<SendText> for ConversationSocket {
    type Result = ();

    fn handle(&mut self, msg: SendText, ctx: &mut Self::Context) {
        ctx.text(msg.0);
    }
}

/// WebSocket endpoint handler.
///
/// Upgrades the HTTP request; the connection itself is served by a
/// `ConversationSocket` actor.
pub async fn conversation_websocket(
    req: HttpRequest,
    stream: web::Payload,
    state: web::Data<AppState>,
) -> ActixResult<HttpResponse> {
    info!(
        "New WebSocket connection request from: {:?}",
        req.connection_info().peer_addr()
    );

    ws::start(ConversationSocket::new(&state), &req, stream)
}
