use std::sync::Arc;

use axum::extract::rejection::QueryRejection;
use axum::extract::{Query, State};
use axum::routing::{get, post};
use axum::{Extension, Json, Router};
use dc_data::{DailyPoint, HourlyPoint, Record, SensorService};
use dc_forecast::CarbonPredictor;
use dc_types::{internal_error, DcError, DcResult, Device, Interval, Measurement};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::warn;

use crate::config::ModelPaths;
use crate::error::{ApiError, ApiResult};

/// Largest `limit` accepted by `/carbon/co2/all`
pub const MAX_CO2_LIMIT: usize = 166_740;
pub const DEFAULT_CO2_LIMIT: usize = 100;
pub const DEFAULT_PAGE_LIMIT: usize = 500;

/// Shared handler state
#[derive(Debug, Clone)]
pub struct AppState {
    pub service: Arc<SensorService>,
    pub models: Arc<ModelPaths>,
}

impl AppState {
    pub fn new(service: Arc<SensorService>, models: ModelPaths) -> Self {
        Self {
            service,
            models: Arc::new(models),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct AllParams {
    limit: Option<usize>,
    interval: Option<Interval>,
}

#[derive(Debug, Deserialize)]
pub struct PageParams {
    #[serde(default)]
    skip: usize,
    #[serde(default = "default_page_limit")]
    limit: usize,
}

fn default_page_limit() -> usize {
    DEFAULT_PAGE_LIMIT
}

#[derive(Debug, Deserialize)]
pub struct PredictParams {
    #[serde(default)]
    force_refresh: bool,
}

pub fn router(state: AppState) -> Router {
    let mut app = Router::new()
        .route("/health", get(health))
        .route("/carbon/cache/clear", post(clear_cache))
        .route("/predict/carbon", get(predict_carbon));

    for measurement in Measurement::ALL {
        app = app.nest(
            &format!("/carbon/{}", measurement.slug()),
            measurement_routes(measurement),
        );
    }

    app.with_state(state)
}

fn measurement_routes(measurement: Measurement) -> Router<AppState> {
    let all = match measurement {
        Measurement::Co2 => get(co2_all),
        Measurement::Temperature | Measurement::Humidity => get(raw_all),
    };

    Router::new()
        .route("/all", all)
        .route("/hourly", get(hourly))
        .route("/daily", get(daily))
        .route("/count", get(count))
        .route("/page", get(page))
        .route("/debug", get(debug))
        .layer(Extension(measurement))
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

async fn co2_all(
    State(state): State<AppState>,
    params: Result<Query<AllParams>, QueryRejection>,
) -> ApiResult<Json<Vec<Record>>> {
    let Query(params) = params?;
    let limit = params.limit.unwrap_or(DEFAULT_CO2_LIMIT);
    if !(1..=MAX_CO2_LIMIT).contains(&limit) {
        return Err(ApiError::unprocessable(format!(
            "limit must be between 1 and {} (got {})",
            MAX_CO2_LIMIT, limit
        )));
    }
    let interval = params.interval.unwrap_or_default();

    let records = state
        .service
        .records(Measurement::Co2, interval, Some(limit))
        .await?;
    Ok(Json(records))
}

async fn raw_all(
    State(state): State<AppState>,
    Extension(measurement): Extension<Measurement>,
) -> ApiResult<Json<Vec<Record>>> {
    Ok(Json(state.service.all_records(measurement.device()).await?))
}

async fn hourly(
    State(state): State<AppState>,
    Extension(measurement): Extension<Measurement>,
) -> ApiResult<Json<Vec<HourlyPoint>>> {
    Ok(Json(state.service.hourly(measurement).await?))
}

async fn daily(
    State(state): State<AppState>,
    Extension(measurement): Extension<Measurement>,
) -> ApiResult<Json<Vec<DailyPoint>>> {
    Ok(Json(state.service.daily(measurement).await?))
}

async fn count(
    State(state): State<AppState>,
    Extension(measurement): Extension<Measurement>,
) -> ApiResult<Json<Value>> {
    let rows = state.service.count(measurement.device()).await?;
    Ok(Json(json!({ "rows": rows })))
}

async fn page(
    State(state): State<AppState>,
    Extension(measurement): Extension<Measurement>,
    params: Result<Query<PageParams>, QueryRejection>,
) -> ApiResult<Json<Vec<Record>>> {
    let Query(params) = params?;
    let records = state
        .service
        .page(measurement.device(), params.skip, params.limit)
        .await?;
    Ok(Json(records))
}

/// Shape of the merged table, or the load failure as `{"error"}`.
async fn debug(
    State(state): State<AppState>,
    Extension(measurement): Extension<Measurement>,
) -> ApiResult<Json<Value>> {
    match state.service.debug(measurement.device()).await {
        Ok(summary) => Ok(Json(serde_json::to_value(summary).map_err(DcError::from)?)),
        Err(e) => {
            warn!(device = %measurement.device(), error = %e, "Debug load failed");
            Ok(Json(json!({ "error": e.to_string() })))
        }
    }
}

async fn clear_cache(State(state): State<AppState>) -> Json<Value> {
    state.service.clear_cache();
    Json(json!({ "cleared": true }))
}

/// Forecast from the latest CO2 history. Failures are reported in the body.
async fn predict_carbon(
    State(state): State<AppState>,
    params: Result<Query<PredictParams>, QueryRejection>,
) -> ApiResult<Json<Value>> {
    let Query(params) = params?;

    match run_prediction(&state, params.force_refresh).await {
        Ok(prediction) => Ok(Json(prediction)),
        Err(e) => {
            warn!(error = %e, "Carbon prediction failed");
            let message = match e {
                DcError::Forecast(inner) => inner.to_string(),
                other => other.to_string(),
            };
            Ok(Json(json!({ "error": message })))
        }
    }
}

async fn run_prediction(state: &AppState, force_refresh: bool) -> DcResult<Value> {
    let table = if force_refresh {
        state.service.fresh_table(Device::Wise4051).await?
    } else {
        state.service.raw_table(Device::Wise4051).await?
    };
    let models = state.models.clone();

    let prediction = tokio::task::spawn_blocking(move || {
        CarbonPredictor::load(&models.rate_change, &models.rate_per_hour)?.predict(&table)
    })
    .await
    .map_err(|e| internal_error!("Prediction task failed: {}", e))??;

    Ok(serde_json::to_value(prediction)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{self, Body};
    use axum::http::{Request, StatusCode};
    use dc_data::{Ingestor, MemoryStore, RemoteStore, SensorSources, SourceCache};
    use std::fmt::Write as _;
    use tempfile::TempDir;
    use tower::ServiceExt;

    const CO2_CSV: &str = "TIM,COM_1 Wd_0,COM_1 Wd_0 Evt\n\
        2025-11-18T12:00:10+07:00,10,OK\n\
        2025-11-18T12:02:00+07:00,20,OK\n\
        2025-11-18T12:06:30+07:00,30,OK\n\
        2025-11-18T13:10:00+07:00,40,OK\n";

    const CLIMATE_CSV: &str = "Year,Month,Day,Hour,Minute,Second,COM_1 Wd_1,COM_1 Wd_2\n\
        2025,11,18,12,0,0,27.5,60\n\
        2025,11,18,12,30,0,28.5,62\n\
        2025,11,19,12,0,0,29.0,70\n";

    struct Fixture {
        app: Router,
        _models: TempDir,
    }

    fn fixture(store: MemoryStore) -> Fixture {
        let models = TempDir::new().unwrap();
        std::fs::write(models.path().join("rate_change.json"), r#"{"intercept": 1.5}"#).unwrap();
        std::fs::write(models.path().join("rate_per_hour.json"), r#"{"intercept": 18.0}"#)
            .unwrap();

        let remote: Arc<dyn RemoteStore> = Arc::new(store);
        let ingestor = Arc::new(Ingestor::new(remote, Arc::new(SourceCache::new())));
        let service = Arc::new(SensorService::new(
            ingestor,
            SensorSources::new("/WISE-4051", "/WISE-4012"),
        ));
        let paths = ModelPaths {
            rate_change: models.path().join("rate_change.json"),
            rate_per_hour: models.path().join("rate_per_hour.json"),
        };

        Fixture {
            app: router(AppState::new(service, paths)),
            _models: models,
        }
    }

    fn sample_store() -> MemoryStore {
        let store = MemoryStore::new();
        store.add_file("/WISE-4051/2025-11-18/co2.csv", CO2_CSV);
        store.add_file("/WISE-4012/2025-11-18/climate.csv", CLIMATE_CSV);
        store
    }

    /// Twenty five-minute readings ending 2025-11-18 14:00 +07:00.
    fn history_csv() -> String {
        let mut csv = String::from(
            "TIM,COM_1 Wd_0,COM_1 Wd_0 Evt,COM_1 Wd_1,COM_1 Wd_2,COM_1 Wd_4,COM_1 Wd_6,COM_1 Wd_7\n",
        );
        for i in 0..20u32 {
            let minutes = 25 + 5 * i;
            let (hour, minute) = (12 + minutes / 60, minutes % 60);
            writeln!(
                csv,
                "2025-11-18T{:02}:{:02}:00+07:00,{:.1},0,{:.1},60.0,300.0,12.0,0",
                hour,
                minute,
                400.0 + (i % 4) as f64 * 3.0 + i as f64,
                27.0 + i as f64 * 0.1
            )
            .unwrap();
        }
        csv
    }

    async fn send(app: &Router, method: &str, uri: &str) -> (StatusCode, Value) {
        let resp = app
            .clone()
            .oneshot(
                Request::builder()
                    .method(method)
                    .uri(uri)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let status = resp.status();
        let bytes = body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
    }

    async fn get_json(app: &Router, uri: &str) -> (StatusCode, Value) {
        send(app, "GET", uri).await
    }

    #[tokio::test]
    async fn test_health() {
        let fixture = fixture(sample_store());
        let (status, body) = get_json(&fixture.app, "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "status": "ok" }));
    }

    #[tokio::test]
    async fn test_co2_all_defaults_to_five_minute_buckets() {
        let fixture = fixture(sample_store());

        let (status, body) = get_json(&fixture.app, "/carbon/co2/all").await;
        assert_eq!(status, StatusCode::OK);
        let rows = body.as_array().unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0]["timestamp"], "2025-11-18T12:00:00+07:00");
        assert_eq!(rows[0]["COM_1 Wd_0"], 15.0);
        assert_eq!(rows[1]["COM_1 Wd_0"], 30.0);

        let (_, raw) = get_json(&fixture.app, "/carbon/co2/all?interval=raw&limit=2").await;
        let raw = raw.as_array().unwrap();
        assert_eq!(raw.len(), 2);
        assert_eq!(raw[1]["COM_1 Wd_0"], 40);
    }

    #[tokio::test]
    async fn test_co2_all_rejects_bad_parameters() {
        let fixture = fixture(sample_store());

        for uri in [
            "/carbon/co2/all?limit=0",
            "/carbon/co2/all?limit=166741",
            "/carbon/co2/all?limit=abc",
            "/carbon/co2/all?interval=2min",
        ] {
            let (status, body) = get_json(&fixture.app, uri).await;
            assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY, "{}", uri);
            assert!(body["error"].is_string(), "{}", uri);
        }

        let (status, _) = get_json(&fixture.app, "/carbon/co2/all?limit=166740").await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_climate_all_returns_raw_rows() {
        let fixture = fixture(sample_store());

        let (status, body) = get_json(&fixture.app, "/carbon/temp/all").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.as_array().unwrap().len(), 3);

        let (_, humid) = get_json(&fixture.app, "/carbon/humid/all").await;
        assert_eq!(humid.as_array().unwrap()[2]["COM_1 Wd_2"], 70);
    }

    #[tokio::test]
    async fn test_page_and_count() {
        let fixture = fixture(sample_store());

        let (status, body) = get_json(&fixture.app, "/carbon/co2/page?skip=0&limit=2").await;
        assert_eq!(status, StatusCode::OK);
        let rows = body.as_array().unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["COM_1 Wd_0"], 10);
        assert_eq!(rows[1]["COM_1 Wd_0"], 20);

        let (_, all) = get_json(&fixture.app, "/carbon/co2/page").await;
        assert_eq!(all.as_array().unwrap().len(), 4);

        let (_, count) = get_json(&fixture.app, "/carbon/temp/count").await;
        assert_eq!(count, json!({ "rows": 3 }));
    }

    #[tokio::test]
    async fn test_hourly_and_daily() {
        let fixture = fixture(sample_store());

        let (_, hourly) = get_json(&fixture.app, "/carbon/co2/hourly").await;
        let hourly = hourly.as_array().unwrap();
        assert_eq!(hourly.len(), 2);
        assert_eq!(hourly[0]["time"], "2025-11-18 12:00:00");
        assert_eq!(hourly[0]["value"], 20.0);

        let (_, daily) = get_json(&fixture.app, "/carbon/humid/daily").await;
        let daily = daily.as_array().unwrap();
        assert_eq!(daily.len(), 2);
        assert_eq!(daily[0]["value"], 61.0);
    }

    #[tokio::test]
    async fn test_debug_reports_errors_in_body() {
        let store = sample_store();
        store.fail_path("/WISE-4051");
        let fixture = fixture(store);

        let (status, body) = get_json(&fixture.app, "/carbon/co2/debug").await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["error"].is_string());

        let (status, body) = get_json(&fixture.app, "/carbon/temp/debug").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["rows"], 3);
        assert_eq!(body["sample"].as_array().unwrap().len(), 3);
        assert_eq!(body["cache"]["total_entries"], 1);
        assert!(body["cache"]["hit_rate"].is_number());

        let (status, body) = get_json(&fixture.app, "/carbon/co2/count").await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body["error"].is_string());
    }

    #[tokio::test]
    async fn test_cache_clear() {
        let fixture = fixture(sample_store());
        get_json(&fixture.app, "/carbon/co2/count").await;

        let (status, body) = send(&fixture.app, "POST", "/carbon/cache/clear").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "cleared": true }));

        let (status, _) = get_json(&fixture.app, "/carbon/cache/clear").await;
        assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
    }

    #[tokio::test]
    async fn test_predict_without_data_reports_error() {
        let store = MemoryStore::new();
        store.add_folder("/WISE-4051");
        store.add_folder("/WISE-4012");
        let fixture = fixture(store);

        let (status, body) = get_json(&fixture.app, "/predict/carbon").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            body,
            json!({ "error": "Failed to load any sensor data for prediction" })
        );
    }

    #[tokio::test]
    async fn test_predict_carbon() {
        let store = MemoryStore::new();
        store.add_file("/WISE-4051/2025-11-18/log.csv", history_csv());
        store.add_folder("/WISE-4012");
        let fixture = fixture(store);

        let (status, body) = get_json(&fixture.app, "/predict/carbon?force_refresh=true").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["timestamp_current"], "2025-11-18T14:00:00+07:00");
        assert_eq!(body["carbon_current"], 428.0);
        assert_eq!(body["carbon_predicted_rate_change_5min"], 1.5);
        assert_eq!(body["carbon_predicted_rate_per_hour"], 18.0);
        assert_eq!(body["carbon_predicted_next_level"], 429.5);
        assert_eq!(body["message"], "Prediction successful.");

        let (status, _) = get_json(&fixture.app, "/predict/carbon?force_refresh=maybe").await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn test_unknown_route() {
        let fixture = fixture(sample_store());
        let (status, _) = get_json(&fixture.app, "/carbon/co3/all").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
