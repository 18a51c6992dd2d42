use anyhow::{Context, Result};
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::{Html, IntoResponse},
    routing::get,
    serve, Router,
};
use futures::{sink::SinkExt, stream::StreamExt};
use minijinja::{context, path_loader, Environment};
use minijinja_autoreload::AutoReloader;
use std::{
    net::SocketAddr,
    path::PathBuf,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};
use tokio::sync::mpsc;
use tower_http::{services::ServeDir, trace::TraceLayer};
use tracing::{error, info, warn};

use crate::advisor::{Advisor, QuickAction};
use crate::constants;
use crate::profile::{Gender, Grade, SUBJECTS};
use crate::protocol::{ClientEvent, ServerEvent};
use crate::session::{publish, Session};

/// Where and how the web UI is served.
#[derive(Debug, Clone)]
pub struct WebConfig {
    pub host: [u8; 4],
    pub port: u16,
    pub templates_dir: PathBuf,
    pub static_dir: PathBuf,
    pub loading_delay: Duration,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            host: [0, 0, 0, 0],
            port: 7860,
            templates_dir: PathBuf::from("templates"),
            static_dir: PathBuf::from("static"),
            loading_delay: constants::LOADING_DELAY,
        }
    }
}

// Shared application state. Sessions are not stored here; each socket owns its own.
#[derive(Clone)]
pub struct AppState {
    templates: Arc<AutoReloader>,
    advisor: Arc<Advisor>,
    loading_delay: Duration,
    active_sessions: Arc<AtomicUsize>,
}

impl AppState {
    pub fn new(config: &WebConfig, advisor: Arc<Advisor>) -> Self {
        Self {
            templates: Arc::new(create_minijinja_env(config.templates_dir.clone())),
            advisor,
            loading_delay: config.loading_delay,
            active_sessions: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Number of sockets currently holding a session.
    pub fn active_sessions(&self) -> usize {
        self.active_sessions.load(Ordering::SeqCst)
    }
}

fn create_minijinja_env(templates_dir: PathBuf) -> AutoReloader {
    AutoReloader::new(move |notifier| {
        let mut env = Environment::new();
        env.set_loader(path_loader(&templates_dir));
        notifier.watch_path(&templates_dir, true);
        Ok(env)
    })
}

async fn index_handler(State(state): State<AppState>) -> Result<Html<String>, Html<String>> {
    let quick_actions: Vec<_> = QuickAction::ALL
        .iter()
        .map(|action| context! { id => action, label => action.label() })
        .collect();

    state
        .templates
        .acquire_env()
        .and_then(|env| {
            env.get_template("index.html").and_then(|tmpl| {
                tmpl.render(context! {
                    title => constants::APP_TITLE,
                    advisor_name => constants::ADVISOR_NAME,
                    grades => Grade::ALL.iter().map(|g| g.label()).collect::<Vec<_>>(),
                    genders => Gender::ALL.iter().map(|g| g.label()).collect::<Vec<_>>(),
                    subjects => SUBJECTS,
                    quick_actions => quick_actions,
                })
            })
        })
        .map(Html)
        .map_err(|e| {
            error!("Failed to get or render template: {}", e);
            Html(format!("Internal Server Error: {}", e))
        })
}

async fn health_handler() -> &'static str {
    "ok"
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    info!("WebSocket connection upgrade requested");
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

// One connection is one browser tab: the session lives exactly as long as the socket.
async fn handle_socket(socket: WebSocket, state: AppState) {
    let open = state.active_sessions.fetch_add(1, Ordering::SeqCst) + 1;
    info!(active_sessions = open, "New advisor session");
    let (mut sender, mut receiver) = socket.split();
    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<ServerEvent>();

    // Both the session and its chat worker publish through out_tx; this task
    // is the only writer on the socket.
    let writer = tokio::spawn(async move {
        while let Some(event) = out_rx.recv().await {
            let json = match serde_json::to_string(&event) {
                Ok(json) => json,
                Err(e) => {
                    error!("Failed to serialize server event: {}", e);
                    continue;
                }
            };
            if sender.send(Message::Text(json)).await.is_err() {
                warn!("WebSocket client disconnected or send error. Closing connection.");
                break;
            }
        }
    });

    let mut session = Session::new(state.advisor.clone(), state.loading_delay, out_tx.clone());
    while let Some(Ok(msg)) = receiver.next().await {
        match msg {
            Message::Text(text) => {
                let event = match serde_json::from_str::<ClientEvent>(&text) {
                    Ok(event) => event,
                    Err(e) => {
                        // Report it and keep reading; one bad frame does not end the session.
                        warn!("Ignoring malformed client event {}: {}", text, e);
                        publish(&out_tx, ServerEvent::Error { message: format!("Malformed event: {}", e) });
                        continue;
                    }
                };
                // Chat messages only get queued here, so this returns quickly
                // even while a reply is streaming.
                if let Err(e) = session.handle(event).await {
                    error!("Session event failed: {:?}", e);
                    publish(&out_tx, ServerEvent::Error { message: format!("{:#}", e) });
                }
            }
            Message::Binary(_) => warn!("Received unexpected binary message from client"),
            Message::Ping(_) | Message::Pong(_) => {}
            Message::Close(_) => {
                info!("Client requested WebSocket close");
                break;
            }
        }
    }

    // Nobody is listening any more: cancel a reply in flight and stop writing.
    session.abort();
    drop(out_tx);
    writer.abort();
    let open = state.active_sessions.fetch_sub(1, Ordering::SeqCst) - 1;
    info!(active_sessions = open, "Advisor session closed");
}

pub fn build_router(state: AppState, static_dir: PathBuf) -> Router {
    let static_files_service =
        ServeDir::new(static_dir).not_found_service(tower::service_fn(|_: axum::extract::Request| async {
            Ok::<_, std::convert::Infallible>((hyper::StatusCode::NOT_FOUND, "Not Found").into_response())
        }));

    Router::new()
        .route("/", get(index_handler))
        .route("/health", get(health_handler))
        .route("/ws", get(ws_handler))
        .nest_service("/static", static_files_service)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

pub async fn start_web_server(config: WebConfig, advisor: Arc<Advisor>) -> Result<()> {
    let state = AppState::new(&config, advisor);
    let app = build_router(state, config.static_dir.clone());

    let addr = SocketAddr::from((config.host, config.port));
    info!("Web server listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context(format!("Failed to bind to address {}", addr))?;

    serve(listener, app.into_make_service())
        .await
        .context("Web server failed")?;

    Ok(())
}
