use axum::{
    Json, Router,
    body::Body,
    extract::{Path, State},
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::get,
};
use serde_json::json;
use std::net::SocketAddr;
use tower_http::trace::TraceLayer;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use airtrack::geojson::FeatureCollection;
use airtrack::layer::{ICON_NAME, LAYER_ID, SOURCE_ID};
use airtrack::{FeedClient, LiveLayer, MemorySurface, PollingController, StatusReporter, TrackerConfig};

#[derive(Clone)]
struct AppState {
    layer: LiveLayer<MemorySurface>,
    status: StatusReporter,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "airtrack=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    if let Err(e) = run().await {
        error!("{}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = TrackerConfig::from_env()?;
    let feed = FeedClient::new(config.feed_url.clone(), config.request_timeout)?;

    let layer = LiveLayer::new(MemorySurface::new());
    let status = StatusReporter::new();

    let mut controller = PollingController::new(feed, config.bounds, config.poll_interval);
    controller.subscribe(layer.clone());
    controller.subscribe(status.clone());
    controller.start();

    // the served surface has no style to fetch, it is ready as soon as we listen
    if layer.with_surface(|surface| surface.set_style_loaded(true)) {
        layer.style_ready()?;
    }

    let state = AppState { layer, status };
    let app = Router::new()
        .route("/", get(index))
        .route("/aircraft.geojson", get(get_aircraft))
        .route("/style.json", get(get_style))
        .route("/icon.png", get(get_icon))
        .route("/status", get(get_status))
        .route("/aircraft/:icao24/popup", get(get_popup))
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    info!("listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await?;

    controller.stop();
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("cannot listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("shutting down");
}

async fn index() -> Html<&'static str> {
    Html("<h1>Live aircraft</h1><ul><li><a href='/aircraft.geojson'>/aircraft.geojson</a></li><li><a href='/style.json'>/style.json</a></li><li><a href='/icon.png'>/icon.png</a></li><li><a href='/status'>/status</a></li></ul>")
}

async fn get_aircraft(State(state): State<AppState>) -> Json<FeatureCollection> {
    let data = state.layer.with_surface(|surface| surface.source(SOURCE_ID).cloned());
    Json(data.unwrap_or_default())
}

async fn get_style(State(state): State<AppState>) -> Response {
    let style = state.layer.with_surface(|surface| {
        let images = surface
            .images()
            .map(|(name, image)| image.data_url().map(|url| (name.to_string(), serde_json::Value::String(url))))
            .collect::<Result<serde_json::Map<String, serde_json::Value>, _>>();
        images.map(|images| {
            json!({
                "sources": { SOURCE_ID: { "type": "geojson", "data": "/aircraft.geojson" } },
                "layers": surface.layers(),
                "images": images,
            })
        })
    });

    match style {
        Ok(style) => Json(style).into_response(),
        Err(e) => {
            error!("Error encoding style images: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, format!("Error: {}", e)).into_response()
        }
    }
}

async fn get_icon(State(state): State<AppState>) -> Response {
    let png = state.layer.with_surface(|surface| surface.image(ICON_NAME).map(|icon| icon.encode_png()));

    match png {
        Some(Ok(png)) => Response::builder()
            .header("Content-Type", "image/png")
            .body(Body::from(png))
            .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response()),
        Some(Err(e)) => {
            error!("Error rendering PNG: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, format!("Error rendering PNG: {}", e)).into_response()
        }
        None => (StatusCode::NOT_FOUND, "icon not registered yet").into_response(),
    }
}

async fn get_status(State(state): State<AppState>) -> impl IntoResponse {
    let status = state.status.status();
    Json(json!({ "summary": status.summary(), "status": status }))
}

async fn get_popup(State(state): State<AppState>, Path(icao24): Path<String>) -> Response {
    let popup = state.layer.with_surface(|surface| surface.click_feature(LAYER_ID, &icao24).cloned());

    match popup {
        Some(popup) => Html(popup.html).into_response(),
        None => (StatusCode::NOT_FOUND, format!("no aircraft {}", icao24)).into_response(),
    }
}
