mod telemetry;

use axum::{
    extract::{Path, State},
    http::{header::AUTHORIZATION, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use clap::Parser;
use rand::Rng;
use serde_json::json;
use std::sync::Arc;
use telemetry::{default_specs, generate_property, PropertySpec};
use tracing::{error, info, warn};

/// Fake IoT cloud: a token endpoint plus a thing-properties endpoint.
#[derive(Debug, Parser)]
struct Args {
    #[arg(long, env = "SIM_ADDR", default_value = "127.0.0.1:8090")]
    addr: String,

    #[arg(long, env = "SIM_THING_ID", default_value = "cold-room-1")]
    thing_id: String,

    #[arg(long, env = "SIM_PROPERTIES", default_value_t = 3)]
    properties: usize,

    /// Share of properties served with a non-numeric value.
    #[arg(long, env = "SIM_MALFORMED_RATE", default_value_t = 0.05)]
    malformed_rate: f64,

    /// Share of property requests answered with 503.
    #[arg(long, env = "SIM_FAILURE_RATE", default_value_t = 0.02)]
    failure_rate: f64,
}

struct Simulation {
    thing_id: String,
    specs: Vec<PropertySpec>,
    created_at: DateTime<Utc>,
    malformed_rate: f64,
    failure_rate: f64,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    // Initialize logging
    tracing_subscriber::fmt::init();

    info!("Starting IoT cloud simulator");
    info!(
        "Thing: {}, Properties: {}, Malformed: {:.0}%, Failures: {:.0}%",
        args.thing_id,
        args.properties,
        args.malformed_rate * 100.0,
        args.failure_rate * 100.0
    );

    let sim = Arc::new(Simulation {
        thing_id: args.thing_id,
        specs: default_specs(args.properties),
        created_at: Utc::now(),
        malformed_rate: args.malformed_rate.clamp(0.0, 1.0),
        failure_rate: args.failure_rate.clamp(0.0, 1.0),
    });

    let app = Router::new()
        .route("/iot/v1/clients/token", post(issue_token))
        .route("/iot/v2/things/:thing_id/properties", get(list_properties))
        .with_state(sim);

    let listener = match tokio::net::TcpListener::bind(&args.addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("Failed to bind to {}: {}", args.addr, e);
            std::process::exit(1);
        }
    };

    info!("Simulator listening on {}", args.addr);
    info!(
        "Poller settings: TOKEN_URL=http://{0}/iot/v1/clients/token API_URL=http://{0}/iot/v2/things/{{thing_id}}/properties",
        args.addr
    );

    if let Err(e) = axum::serve(listener, app).await {
        error!("Simulator server error: {}", e);
    }
}

async fn issue_token() -> Json<serde_json::Value> {
    let token = uuid::Uuid::new_v4().to_string();
    Json(json!({
        "access_token": token,
        "expires_in": 300,
        "token_type": "Bearer"
    }))
}

async fn list_properties(
    State(sim): State<Arc<Simulation>>,
    Path(thing_id): Path<String>,
    headers: HeaderMap,
) -> Response {
    let authorized = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with("Bearer "));
    if !authorized {
        return (StatusCode::UNAUTHORIZED, "missing bearer token").into_response();
    }

    if thing_id != sim.thing_id {
        return (StatusCode::NOT_FOUND, format!("thing {} not found", thing_id)).into_response();
    }

    let mut rng = rand::thread_rng();

    if rng.gen_bool(sim.failure_rate) {
        warn!("Simulating upstream outage");
        return (StatusCode::SERVICE_UNAVAILABLE, "Service Unavailable").into_response();
    }

    let properties: Vec<_> = sim
        .specs
        .iter()
        .map(|spec| {
            let malformed = rng.gen_bool(sim.malformed_rate);
            generate_property(&mut rng, spec, &sim.thing_id, "cold-room", sim.created_at, malformed)
        })
        .collect();

    Json(properties).into_response()
}
