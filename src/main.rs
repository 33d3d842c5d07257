//! # Voice Assistant Backend - Main Application Entry Point
//!
//! A voice-driven conversation demo. The microphone (or a WAV file) is
//! transcribed with Whisper; saying the wake phrase starts a short scripted
//! interview, and every step is pushed to browsers over a WebSocket.
//!
//! ## Pipeline:
//! ```text
//! capture thread --(frame queue)--> recognition thread --> conversation
//!     --(event channel)--> broadcast hub actor --> WebSocket actors
//! ```
//! Clients can also type answers, which enter the conversation directly.
//!
//! ## Application Architecture:
//! - **config**: configuration (TOML file + environment variables)
//! - **audio**: frame capture and the bounded hand-off queue
//! - **transcription**: Whisper model, endpointing and the recognizer adapter
//! - **recognition**: the thread feeding utterances into the conversation
//! - **conversation**: the wake phrase / question state machine
//! - **hub** and **websocket**: fan-out of events to connected clients

mod audio; // Capture, frames and the frame queue
mod config; // Configuration management (config.rs)
mod conversation; // Dialogue state machine
mod device; // Compute device selection
mod error; // Error types (error.rs)
mod events; // Wire messages
mod hub; // Broadcast actor
mod recognition; // Recognition thread
mod state; // Shared handler state
mod transcription; // Whisper speech recognition
mod websocket; // WebSocket endpoint

use actix::Actor;
use actix_cors::Cors;
use actix_web::{web, App, HttpServer};
use anyhow::{Context, Result};
use crate::config::AppConfig;
use conversation::{Conversation, ConversationHandle};
use device::{select_device, DevicePreference};
use error::AppError;
use hub::BroadcastHub;
use state::AppState;
use std::path::Path;
use tracing::{error, info};
use tracing_actix_web::TracingLogger;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use transcription::{ModelSize, WhisperModel, WhisperRecognizer};

/// The main application entry point.
///
/// ## Startup Order:
/// 1. **Configuration** is loaded and validated
/// 2. **Speech model** is loaded; a missing model directory aborts here
/// 3. **Broadcast hub** and the **conversation** are created
/// 4. **Recognition thread** starts waiting for frames
/// 5. **Audio source** starts; an unavailable device aborts here
/// 6. **HTTP server** serves the WebSocket endpoint until SIGINT/SIGTERM
#[actix_web::main]
async fn main() -> Result<()> {
    // It's fine if there's no .env file
    dotenv::dotenv().ok();

    init_tracing()?;

    let config = AppConfig::load().context("Failed to load configuration")?;
    config.validate()?;

    info!("Starting voice-assistant-backend v{}", env!("CARGO_PKG_VERSION"));
    info!(
        "Wake phrase '{}', {} question(s)",
        config.conversation.wake_phrase,
        config.conversation.questions.len()
    );

    let model_size: ModelSize = config.model.size.parse().map_err(AppError::Config)?;
    let device_preference: DevicePreference =
        config.model.device.parse().map_err(AppError::Config)?;
    let model = WhisperModel::load(
        Path::new(&config.model.path),
        model_size,
        config.model.language.as_deref(),
        select_device(device_preference),
    )?;
    let recognizer = WhisperRecognizer::new(model, &config.endpoint, config.audio.sample_rate);

    // Events flow from the recognition thread and WebSocket actors into the hub.
    let (events_tx, events_rx) = tokio::sync::mpsc::unbounded_channel();
    let hub = BroadcastHub::new(events_rx).start();
    let conversation =
        ConversationHandle::new(Conversation::from_config(&config.conversation), events_tx);

    let (frames_tx, frames_rx) =
        audio::queue::frame_queue(config.audio.queue_capacity, config.audio.overflow);
    recognition::spawn_recognition_loop(recognizer, frames_rx, conversation.clone())?;
    audio::capture::start_audio_source(&config.audio, frames_tx)?;
    info!("Audio source {:?} started", config.audio.source);

    let app_state = AppState::new(conversation, hub);
    let bind_addr = format!("{}:{}", config.server.host, config.server.port);
    let ws_path = config.server.ws_path.clone();

    info!("Starting HTTP server on {} (WebSocket at {})", bind_addr, ws_path);

    let server = HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(app_state.clone()))
            .wrap(Cors::permissive())
            .wrap(TracingLogger::default())
            .route(&ws_path, web::get().to(websocket::conversation_websocket))
    })
    .bind(&bind_addr)
    .with_context(|| format!("Failed to bind {}", bind_addr))?
    .disable_signals()
    .run();

    let server_handle = server.handle();
    let server_task = tokio::spawn(server);

    tokio::select! {
        result = server_task => {
            match result {
                Ok(Ok(())) => {}
                Ok(Err(e)) => error!("Server error: {}", e),
                Err(e) => error!("Server task error: {}", e),
            }
        }
        _ = wait_for_shutdown() => {
            info!("Shutdown signal received, stopping server...");
            server_handle.stop(true).await;
        }
    }

    info!("Server stopped");
    Ok(())
}

/// Initialize the tracing (logging) system.
///
/// ## Environment Variables:
/// - `RUST_LOG`: filter directives; defaults to
///   `voice_assistant_backend=debug,actix_web=info`
fn init_tracing() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "voice_assistant_backend=debug,actix_web=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    Ok(())
}

/// Resolve on SIGINT (Ctrl+C) or, on Unix, SIGTERM.
async fn wait_for_shutdown() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = sigterm.recv() => info!("Received SIGTERM"),
                    _ = wait_for_interrupt() => {}
                }
                return;
            }
            Err(e) => error!("Failed to install SIGTERM handler: {}", e),
        }
    }

    wait_for_interrupt().await;
}

async fn wait_for_interrupt() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Received SIGINT"),
        Err(e) => {
            error!("Failed to listen for SIGINT: {}", e);
            std::future::pending::<()>().await;
        }
    }
}
