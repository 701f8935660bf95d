use crate::gateway::{GatewayError, ListParams, SensorGateway};
use crate::metrics;
use crate::model::ApiResponse;
use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{header, HeaderName, Method, Request, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Serialize;
use serde_json::json;
use tower_http::cors::{Any, CorsLayer};
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, warn};

const REQUEST_ID: HeaderName = HeaderName::from_static("x-request-id");

/// Builds the full HTTP surface around a gateway.
pub fn create_router(gateway: SensorGateway) -> Router {
    let api = Router::new()
        .route("/sensor-data", get(list_readings).post(create_reading))
        .route(
            "/sensor-data/:id",
            get(get_reading).put(update_reading).delete(delete_reading),
        );

    Router::new()
        .nest("/api/v1", api)
        .route("/health", get(health_check))
        .route("/test", get(test_endpoint))
        .route("/metrics", get(metrics_handler))
        .with_state(gateway)
        .layer(cors_layer())
        .layer(
            TraceLayer::new_for_http().make_span_with(|req: &Request<_>| {
                let request_id = req
                    .headers()
                    .get(&REQUEST_ID)
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or("-");
                tracing::info_span!(
                    "http",
                    %request_id,
                    method = %req.method(),
                    uri = %req.uri(),
                )
            }),
        )
        .layer(PropagateRequestIdLayer::new(REQUEST_ID))
        .layer(SetRequestIdLayer::new(REQUEST_ID, MakeRequestUuid))
}

/// Any origin; preflight `OPTIONS` requests are answered here with 200.
fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
}

fn success<T: Serialize>(status: StatusCode, message: &str, data: T) -> Response {
    (status, Json(ApiResponse::success(message, data))).into_response()
}

async fn create_reading(
    State(gateway): State<SensorGateway>,
    body: Bytes,
) -> Result<Response, GatewayError> {
    let reading = gateway.create(&body).await?;
    Ok(success(
        StatusCode::CREATED,
        "Sensor data created successfully",
        reading,
    ))
}

async fn list_readings(
    State(gateway): State<SensorGateway>,
    Query(pairs): Query<Vec<(String, String)>>,
) -> Result<Response, GatewayError> {
    let readings = gateway.list(&ListParams::from_pairs(&pairs)).await?;
    Ok(success(
        StatusCode::OK,
        "Data retrieved successfully",
        readings,
    ))
}

async fn get_reading(
    State(gateway): State<SensorGateway>,
    Path(id): Path<String>,
) -> Result<Response, GatewayError> {
    let reading = gateway.get(&id).await?;
    Ok(success(StatusCode::OK, "Data retrieved successfully", reading))
}

async fn update_reading(
    State(gateway): State<SensorGateway>,
    Path(id): Path<String>,
    body: Bytes,
) -> Result<Response, GatewayError> {
    let reading = gateway.update(&id, &body).await?;
    Ok(success(
        StatusCode::OK,
        "Sensor data updated successfully",
        reading,
    ))
}

async fn delete_reading(
    State(gateway): State<SensorGateway>,
    Path(id): Path<String>,
) -> GatewayError {
    gateway.delete(&id)
}

async fn health_check(State(gateway): State<SensorGateway>) -> Result<Response, GatewayError> {
    let report = gateway.health().await?;
    Ok(success(StatusCode::OK, "Service is healthy", report))
}

async fn test_endpoint() -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "message": "API is working",
    }))
}

async fn metrics_handler() -> Response {
    match metrics::gather_metrics() {
        Ok(text) => text.into_response(),
        Err(e) => {
            error!("Failed to encode metrics: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

impl GatewayError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            GatewayError::BadRequest(_) => StatusCode::BAD_REQUEST,
            GatewayError::NotFound => StatusCode::NOT_FOUND,
            GatewayError::Storage { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            GatewayError::NotImplemented => StatusCode::NOT_IMPLEMENTED,
            GatewayError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    /// What the caller is told. Store details stay in the server log.
    pub fn public_message(&self) -> String {
        match self {
            GatewayError::Storage { context, .. } => context.to_string(),
            GatewayError::Unavailable(_) => "Database connection failed".to_string(),
            other => other.to_string(),
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        match &self {
            GatewayError::Storage { context, source } => {
                error!("{}: {}", context, source);
            }
            GatewayError::Unavailable(detail) => {
                error!("Health check failed: {}", detail);
            }
            GatewayError::BadRequest(message) => {
                warn!("Bad request: {}", message);
            }
            GatewayError::NotFound | GatewayError::NotImplemented => {}
        }

        (
            self.status_code(),
            Json(ApiResponse::error(self.public_message())),
        )
            .into_response()
    }
}
