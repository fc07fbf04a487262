use std::{
    collections::HashMap,
    net::SocketAddr,
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use anyhow::Context;
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use rumqttc::{AsyncClient, Event, Incoming, MqttOptions, QoS};
use serde::Serialize;
use tokio::{
    net::TcpListener,
    sync::{mpsc, Mutex},
};
use tracing::{debug, info, warn};

use sunprotect_common::{
    AccessoryConfig, AccessoryStatus, EngineAction, Ephemeris, Sample, SpaEphemeris,
    SunProtectEngine, Topics,
};

type Engine = SunProtectEngine<SpaEphemeris>;

#[derive(Clone)]
struct AppState {
    engine: Arc<Mutex<Engine>>,
    outbound: Outbound,
}

/// Ordered queue of retained MQTT messages, drained by a single publisher task.
///
/// Publications are queued while the engine lock is held, so the broker sees
/// them in the order the engine produced them.
#[derive(Clone)]
struct Outbound {
    topics: Arc<Topics>,
    tx: mpsc::UnboundedSender<Publication>,
}

#[derive(Debug, Clone, PartialEq)]
struct Publication {
    topic: String,
    payload: Vec<u8>,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

const MAX_MQTT_PAYLOAD_BYTES: usize = 512;

pub async fn run() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config_path = std::env::var("SUNPROTECT_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("./sunprotect.json"));
    let config = load_config(&config_path).await?;

    let coordinate = config.coordinate()?;
    let zones = config.normalized_zones()?;
    for zone in &zones {
        for trigger in &zone.triggers {
            if trigger.window.is_degenerate() {
                debug!(
                    "zone {} trigger {} has inverted bounds and will never match",
                    zone.name, trigger.id
                );
            }
        }
    }

    info!(
        "accessory `{}` at lat={} long={} with {} zone(s)",
        config.name,
        coordinate.latitude,
        coordinate.longitude,
        zones.len()
    );

    let engine = SunProtectEngine::new(config.name.clone(), coordinate, zones, SpaEphemeris);
    let topics = Topics::new(&config.mqtt.topic_prefix);

    let mqtt_host = std::env::var("MQTT_HOST").unwrap_or(config.mqtt.host.clone());
    let mqtt_port = std::env::var("MQTT_PORT")
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(config.mqtt.port);

    let mut mqtt_options = MqttOptions::new("sunprotect-accessory", mqtt_host, mqtt_port);
    let mqtt_user = std::env::var("MQTT_USER").unwrap_or(config.mqtt.user.clone());
    let mqtt_pass = std::env::var("MQTT_PASS").unwrap_or(config.mqtt.pass.clone());
    if !mqtt_user.is_empty() {
        mqtt_options.set_credentials(mqtt_user, mqtt_pass);
    }

    let (mqtt, eventloop) = AsyncClient::new(mqtt_options, 64);
    mqtt.subscribe(topics.cmd_active.as_str(), QoS::AtMostOnce)
        .await
        .context("failed to subscribe to activation command topic")?;

    let (tx, rx) = mpsc::unbounded_channel();
    let outbound = Outbound {
        topics: Arc::new(topics),
        tx,
    };
    outbound.queue_actions(vec![EngineAction::ActiveChanged(false)]);

    let app_state = AppState {
        engine: Arc::new(Mutex::new(engine)),
        outbound,
    };

    spawn_publisher(mqtt, rx);
    spawn_mqtt_loop(app_state.clone(), eventloop);
    spawn_control_loop(
        app_state.clone(),
        Duration::from_secs(config.refresh_interval_secs),
    );

    let app = Router::new()
        .route("/api/status", get(handle_get_status))
        .route("/api/active", post(handle_set_active))
        .route("/api/identify", post(handle_identify))
        .with_state(app_state);

    let port = std::env::var("SUNPROTECT_HTTP_PORT")
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(config.http_port);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind accessory server at {addr}"))?;

    info!("accessory listening on http://{addr}");
    axum::serve(listener, app).await?;
    Ok(())
}

async fn load_config(path: &Path) -> anyhow::Result<AccessoryConfig> {
    let raw = tokio::fs::read(path)
        .await
        .with_context(|| format!("failed to read accessory config {}", path.display()))?;
    AccessoryConfig::from_json(&raw)
        .with_context(|| format!("invalid accessory config {}", path.display()))
}

fn spawn_publisher(mqtt: AsyncClient, mut rx: mpsc::UnboundedReceiver<Publication>) {
    tokio::spawn(async move {
        while let Some(Publication { topic, payload }) = rx.recv().await {
            if let Err(err) = mqtt
                .publish(topic.clone(), QoS::AtLeastOnce, true, payload)
                .await
            {
                warn!("publish to {topic} failed: {err}");
            }
        }
    });
}

fn spawn_mqtt_loop(app_state: AppState, mut eventloop: rumqttc::EventLoop) {
    tokio::spawn(async move {
        loop {
            match eventloop.poll().await {
                Ok(Event::Incoming(Incoming::Publish(message))) => {
                    if let Err(err) =
                        handle_mqtt_message(&app_state, &message.topic, message.payload.to_vec())
                            .await
                    {
                        warn!("mqtt message handling error: {err:#}");
                    }
                }
                Ok(Event::Incoming(Incoming::ConnAck(_))) => {
                    info!("mqtt connected");
                }
                Ok(_) => {}
                Err(err) => {
                    warn!("mqtt poll error: {err}");
                    tokio::time::sleep(Duration::from_secs(2)).await;
                }
            }
        }
    });
}

/// Evaluates immediately, then once per `period`.
fn spawn_control_loop(app_state: AppState, period: Duration) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);

        loop {
            interval.tick().await;

            let mut engine = app_state.engine.lock().await;
            run_cycle(&mut *engine, &app_state.outbound);
        }
    });
}

async fn apply_activation(app_state: &AppState, active: bool) {
    let mut engine = app_state.engine.lock().await;
    run_activation(&mut *engine, active, &app_state.outbound);
}

/// One scheduled cycle. Must be called with the engine lock held.
fn run_cycle<E: Ephemeris>(engine: &mut SunProtectEngine<E>, outbound: &Outbound) {
    let actions = evaluate(engine);
    outbound.queue_actions(actions);
    outbound.queue_status(&engine.status());
}

/// Manual activation followed by an immediate evaluation. Must be called with
/// the engine lock held.
fn run_activation<E: Ephemeris>(
    engine: &mut SunProtectEngine<E>,
    active: bool,
    outbound: &Outbound,
) {
    info!("accessory {}", if active { "activated" } else { "deactivated" });
    let mut actions = engine.set_active(active);
    actions.extend(evaluate(engine));
    outbound.queue_actions(actions);
    outbound.queue_status(&engine.status());
}

/// Run one tick; a failed sample skips the cycle.
fn evaluate<E: Ephemeris>(engine: &mut SunProtectEngine<E>) -> Vec<EngineAction> {
    let was_active = engine.is_active();
    match engine.tick(Utc::now()) {
        Ok(actions) => {
            if was_active {
                if let Some(sample) = engine.last_sample() {
                    info!(
                        "altitude: {:.2} - azimuth: {:.2}",
                        sample.altitude, sample.azimuth
                    );
                }
            }
            actions
        }
        Err(err) => {
            warn!("sun position sampling failed: {err:#}");
            Vec::new()
        }
    }
}

impl Outbound {
    fn queue_actions(&self, actions: Vec<EngineAction>) {
        let topics = &self.topics;
        for action in actions {
            match action {
                EngineAction::PublishPosition(Sample { altitude, azimuth }) => {
                    self.queue(&topics.altitude, format_degrees(altitude));
                    self.queue(&topics.azimuth, format_azimuth(azimuth));
                }
                EngineAction::ZoneChanged(change) => {
                    match change.new {
                        Some(id) => info!("zone {} matched trigger {id}", change.zone),
                        None => info!("zone {} cleared", change.zone),
                    }
                    self.queue(&topics.zone(&change.zone), change.wire_value().to_string());
                }
                EngineAction::ActiveChanged(active) => {
                    self.queue(&topics.active, active_payload(active));
                }
                EngineAction::AutoDisabled => {
                    info!("sun is down past solar noon, disabling until re-armed");
                    self.queue(&topics.active, active_payload(false));
                }
            }
        }
    }

    fn queue_status(&self, status: &AccessoryStatus) {
        match serde_json::to_vec(status) {
            Ok(body) => self.queue(&self.topics.state, body),
            Err(err) => warn!("status serialization failed: {err}"),
        }
    }

    fn queue(&self, topic: &str, payload: impl Into<Vec<u8>>) {
        let publication = Publication {
            topic: topic.to_string(),
            payload: payload.into(),
        };
        if self.tx.send(publication).is_err() {
            warn!("publisher stopped, dropping message for {topic}");
        }
    }
}

async fn handle_mqtt_message(
    app_state: &AppState,
    topic: &str,
    payload: Vec<u8>,
) -> anyhow::Result<()> {
    if payload.len() > MAX_MQTT_PAYLOAD_BYTES {
        warn!(
            "dropping oversized MQTT payload on topic {} ({} bytes)",
            topic,
            payload.len()
        );
        return Ok(());
    }

    let message = String::from_utf8(payload).context("non utf8 mqtt payload")?;

    if topic == app_state.outbound.topics.cmd_active {
        match parse_switch(&message) {
            Some(active) => apply_activation(app_state, active).await,
            None => warn!("ignoring activation command `{}`", message.trim()),
        }
    }

    Ok(())
}

async fn handle_get_status(State(state): State<AppState>) -> impl IntoResponse {
    let status = state.engine.lock().await.status();
    Json(status)
}

async fn handle_set_active(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> impl IntoResponse {
    let Some(value) = params.get("value") else {
        return error_response(StatusCode::BAD_REQUEST, "Missing 'value' parameter");
    };
    let Some(active) = parse_switch(value) else {
        return error_response(StatusCode::BAD_REQUEST, "Invalid value. Use 'on' or 'off'");
    };

    apply_activation(&state, active).await;
    handle_get_status(State(state)).await.into_response()
}

async fn handle_identify(State(state): State<AppState>) -> impl IntoResponse {
    let name = state.engine.lock().await.name().to_string();
    info!("identify requested for `{name}`");
    StatusCode::NO_CONTENT
}

fn parse_switch(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "on" | "true" | "1" => Some(true),
        "off" | "false" | "0" => Some(false),
        _ => None,
    }
}

fn active_payload(active: bool) -> &'static str {
    if active {
        "ON"
    } else {
        "OFF"
    }
}

/// One decimal, the resolution the altitude/azimuth readouts advertise.
fn format_degrees(value: f64) -> String {
    format!("{value:.1}")
}

/// Like [`format_degrees`], keeping the readout inside [0, 360).
fn format_azimuth(value: f64) -> String {
    let tenths = (value * 10.0).round().rem_euclid(3_600.0);
    format_degrees(tenths / 10.0)
}

fn error_response(status: StatusCode, message: &str) -> axum::response::Response {
    (
        status,
        Json(ErrorBody {
            error: message.to_string(),
        }),
    )
        .into_response()
}
