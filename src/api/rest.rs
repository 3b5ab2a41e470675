use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::convert::Infallible;
use tracing::{error, info};
use warp::http::StatusCode;
use warp::hyper::body::Bytes;
use warp::reply::Response;
use warp::{Filter, Rejection, Reply};

use crate::assessment::{AssessmentService, RawMeasurement, ServiceError, ValidationError};
use crate::fhir::FHIRConverter;
use crate::hl7;

const MAX_BODY_BYTES: u64 = 16 * 1024;

/// Envelope returned by every endpoint
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    fn data(data: T) -> Self {
        ApiResponse {
            success: true,
            data: Some(data),
            error: None,
            message: None,
        }
    }
}

impl ApiResponse<()> {
    fn message(message: &str) -> Self {
        ApiResponse {
            success: true,
            data: None,
            error: None,
            message: Some(message.to_string()),
        }
    }

    fn error(error: impl Into<String>) -> Self {
        ApiResponse {
            success: false,
            data: None,
            error: Some(error.into()),
            message: None,
        }
    }
}

fn json_reply<T: Serialize>(body: &ApiResponse<T>, status: StatusCode) -> Response {
    warp::reply::with_status(warp::reply::json(body), status).into_response()
}

fn error_reply(err: &ServiceError) -> Response {
    let status = match err {
        ServiceError::Validation(_) => StatusCode::BAD_REQUEST,
        ServiceError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if status.is_server_error() {
        error!(error = %err, "request failed");
    }
    json_reply(&ApiResponse::error(err.to_string()), status)
}

pub struct RestApi {
    service: AssessmentService,
}

impl RestApi {
    pub fn new(service: AssessmentService) -> Self {
        RestApi { service }
    }

    pub fn routes(&self) -> impl Filter<Extract = (impl Reply,), Error = Infallible> + Clone {
        let cors = warp::cors()
            .allow_any_origin()
            .allow_methods(vec!["GET", "POST", "DELETE"])
            .allow_header("content-type");

        self.calculate()
            .or(self.history())
            .or(self.clear())
            .or(self.export())
            .with(cors)
            .recover(handle_rejection)
            .with(warp::trace::request())
    }

    fn with_service(&self) -> impl Filter<Extract = (AssessmentService,), Error = Infallible> + Clone {
        let service = self.service.clone();
        warp::any().map(move || service.clone())
    }

    fn calculate(&self) -> impl Filter<Extract = (Response,), Error = Rejection> + Clone {
        warp::path!("api" / "respiratory" / "calculate")
            .and(warp::post())
            .and(warp::body::content_length_limit(MAX_BODY_BYTES))
            .and(warp::body::bytes())
            .and(self.with_service())
            .and_then(calculate)
    }

    fn history(&self) -> impl Filter<Extract = (Response,), Error = Rejection> + Clone {
        warp::path!("api" / "respiratory" / "history")
            .and(warp::get())
            .and(warp::query::<HashMap<String, String>>())
            .and(self.with_service())
            .and_then(history)
    }

    fn clear(&self) -> impl Filter<Extract = (Response,), Error = Rejection> + Clone {
        warp::path!("api" / "respiratory" / "clear")
            .and(warp::delete())
            .and(self.with_service())
            .and_then(clear)
    }

    fn export(&self) -> impl Filter<Extract = (Response,), Error = Rejection> + Clone {
        warp::path!("api" / "respiratory" / "export" / String)
            .and(warp::get())
            .and(self.with_service())
            .and_then(export)
    }
}

async fn calculate(body: Bytes, service: AssessmentService) -> Result<Response, Infallible> {
    let raw = match RawMeasurement::from_json(&body) {
        Ok(raw) => raw,
        Err(e) => return Ok(error_reply(&ServiceError::from(e))),
    };

    match service.calculate(&raw).await {
        Ok(stored) => {
            info!(
                id = stored.id,
                failure = stored.assessment.has_respiratory_failure,
                "calculation stored"
            );
            Ok(json_reply(&ApiResponse::data(stored), StatusCode::OK))
        }
        Err(err) => Ok(error_reply(&err)),
    }
}

async fn history(
    params: HashMap<String, String>,
    service: AssessmentService,
) -> Result<Response, Infallible> {
    let limit = match params.get("limit").map(|l| l.parse::<usize>()) {
        None => None,
        Some(Ok(limit)) if limit > 0 => Some(limit),
        Some(_) => {
            return Ok(json_reply(
                &ApiResponse::error("limit must be a positive integer"),
                StatusCode::BAD_REQUEST,
            ))
        }
    };

    match service.recent(limit).await {
        Ok(records) => Ok(json_reply(&ApiResponse::data(records), StatusCode::OK)),
        Err(err) => Ok(error_reply(&err)),
    }
}

async fn clear(service: AssessmentService) -> Result<Response, Infallible> {
    match service.clear().await {
        Ok(()) => {
            info!("calculation history cleared");
            Ok(json_reply(
                &ApiResponse::message("History cleared successfully"),
                StatusCode::OK,
            ))
        }
        Err(err) => Ok(error_reply(&err)),
    }
}

async fn export(format: String, service: AssessmentService) -> Result<Response, Infallible> {
    if format != "fhir" && format != "hl7" {
        return Ok(json_reply(
            &ApiResponse::error(format!("Unsupported export format: {}", format)),
            StatusCode::NOT_FOUND,
        ));
    }

    let latest = match service.latest().await {
        Ok(Some(latest)) => latest,
        Ok(None) => {
            return Ok(json_reply(
                &ApiResponse::error("No calculations to export"),
                StatusCode::NOT_FOUND,
            ))
        }
        Err(err) => return Ok(error_reply(&err)),
    };

    if format == "fhir" {
        Ok(warp::reply::json(&latest.to_observation()).into_response())
    } else {
        Ok(warp::reply::with_header(hl7::to_message(&latest), "content-type", hl7::CONTENT_TYPE)
            .into_response())
    }
}

async fn handle_rejection(err: Rejection) -> Result<Response, Infallible> {
    // a bodyless POST carries no Content-Length
    if err.find::<warp::reject::LengthRequired>().is_some() {
        let err = ServiceError::from(ValidationError::MissingFields);
        return Ok(error_reply(&err));
    }

    let (status, message) = if err.is_not_found() {
        (StatusCode::NOT_FOUND, "Not found")
    } else if err.find::<warp::reject::MethodNotAllowed>().is_some() {
        (StatusCode::METHOD_NOT_ALLOWED, "Method not allowed")
    } else if err.find::<warp::reject::PayloadTooLarge>().is_some() {
        (StatusCode::PAYLOAD_TOO_LARGE, "Request body too large")
    } else if err.find::<warp::cors::CorsForbidden>().is_some() {
        (StatusCode::FORBIDDEN, "CORS request forbidden")
    } else {
        error!(rejection = ?err, "unhandled rejection");
        (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error")
    };
    Ok(json_reply(&ApiResponse::error(message), status))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assessment::{Assessment, StoredAssessment};
    use crate::storage::{BackendKind, HistoryStore, MemoryStore, StoreError};
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use serde_json::{json, Value};
    use std::sync::Arc;

    /// A store whose writes always fail
    struct FailingStore;

    #[async_trait]
    impl HistoryStore for FailingStore {
        fn kind(&self) -> BackendKind {
            BackendKind::Memory
        }

        async fn initialize(&self) -> Result<(), StoreError> {
            Ok(())
        }

        async fn save(&self, _assessment: Assessment) -> Result<StoredAssessment, StoreError> {
            Err(StoreError::Operation("disk full".to_string()))
        }

        async fn list_recent(&self, _limit: usize) -> Result<Vec<StoredAssessment>, StoreError> {
            Ok(Vec::new())
        }

        async fn clear_all(&self) -> Result<(), StoreError> {
            Ok(())
        }
    }

    fn api() -> RestApi {
        RestApi::new(AssessmentService::new(Arc::new(MemoryStore::new())))
    }

    fn body(res: &warp::http::Response<Bytes>) -> Value {
        serde_json::from_slice(res.body()).unwrap()
    }

    async fn post_calculation(api: &RestApi, payload: Value) -> warp::http::Response<Bytes> {
        warp::test::request()
            .method("POST")
            .path("/api/respiratory/calculate")
            .json(&payload)
            .reply(&api.routes())
            .await
    }

    #[tokio::test]
    async fn calculate_returns_stored_result() {
        let api = api();
        let res = post_calculation(
            &api,
            json!({ "ph": 7.30, "paCO2": 50, "paO2": 70, "fio2": 40, "bicarbonate": 24 }),
        )
        .await;

        assert_eq!(res.status(), StatusCode::OK);
        let body = body(&res);
        assert_eq!(body["success"], true);
        assert_eq!(body["data"]["id"], 1);
        assert_eq!(body["data"]["type"], "Acute Respiratory Acidosis");
        assert_eq!(body["data"]["hasRespiratoryFailure"], true);
        assert!(body["data"]["createdAt"].is_string());
    }

    #[tokio::test]
    async fn calculate_rejects_out_of_range_ph() {
        let api = api();
        let res = post_calculation(
            &api,
            json!({ "ph": 7.9, "paCO2": 40, "paO2": 90, "fio2": 21, "bicarbonate": 24 }),
        )
        .await;

        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            body(&res),
            json!({ "success": false, "error": "pH must be between 6.8 and 7.8" })
        );
    }

    #[tokio::test]
    async fn calculate_rejects_malformed_json() {
        let api = api();
        let routes = api.routes();
        let res = warp::test::request()
            .method("POST")
            .path("/api/respiratory/calculate")
            .header("content-type", "application/json")
            .body("{not json")
            .reply(&routes)
            .await;

        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body(&res)["success"], false);
    }

    #[tokio::test]
    async fn calculate_rejects_positional_array_body() {
        let api = api();
        let routes = api.routes();
        let res = warp::test::request()
            .method("POST")
            .path("/api/respiratory/calculate")
            .header("content-type", "application/json")
            .body("[7.3,50,70,40,24]")
            .reply(&routes)
            .await;

        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body(&res), json!({ "success": false, "error": "All fields are required" }));

        let res = warp::test::request()
            .path("/api/respiratory/history")
            .reply(&routes)
            .await;
        assert_eq!(body(&res), json!({ "success": true, "data": [] }));
    }

    #[tokio::test]
    async fn calculate_without_body_reports_missing_fields() {
        let api = api();
        let routes = api.routes();
        let expected = json!({ "success": false, "error": "All fields are required" });

        // no Content-Length header at all
        let res = warp::test::request()
            .method("POST")
            .path("/api/respiratory/calculate")
            .reply(&routes)
            .await;
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body(&res), expected);

        let res = warp::test::request()
            .method("POST")
            .path("/api/respiratory/calculate")
            .body("")
            .reply(&routes)
            .await;
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body(&res), expected);
    }

    #[tokio::test]
    async fn failed_save_is_a_single_server_error() {
        let api = RestApi::new(AssessmentService::new(Arc::new(FailingStore)));
        let res = post_calculation(
            &api,
            json!({ "ph": 7.30, "paCO2": 50, "paO2": 70, "fio2": 40, "bicarbonate": 24 }),
        )
        .await;

        assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = body(&res);
        assert_eq!(body["success"], false);
        assert!(body.get("data").is_none());
        assert!(body["error"].as_str().unwrap().contains("disk full"));
    }

    #[tokio::test]
    async fn history_lists_newest_first_and_honours_limit() {
        let api = api();
        let routes = api.routes();
        for pa_o2 in [70, 80, 90] {
            post_calculation(
                &api,
                json!({ "ph": 7.40, "paCO2": 40, "paO2": pa_o2, "fio2": 21, "bicarbonate": 24 }),
            )
            .await;
        }

        let res = warp::test::request()
            .method("GET")
            .path("/api/respiratory/history?limit=2")
            .reply(&routes)
            .await;
        assert_eq!(res.status(), StatusCode::OK);

        let body = body(&res);
        let ids: Vec<i64> = body["data"]
            .as_array()
            .unwrap()
            .iter()
            .map(|r| r["id"].as_i64().unwrap())
            .collect();
        assert_eq!(ids, vec![3, 2]);

        let res = warp::test::request()
            .path("/api/respiratory/history?limit=zero")
            .reply(&routes)
            .await;
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn clear_empties_history() {
        let api = api();
        let routes = api.routes();
        post_calculation(
            &api,
            json!({ "ph": 7.40, "paCO2": 40, "paO2": 90, "fio2": 21, "bicarbonate": 24 }),
        )
        .await;

        let res = warp::test::request()
            .method("DELETE")
            .path("/api/respiratory/clear")
            .reply(&routes)
            .await;
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(
            body(&res),
            json!({ "success": true, "message": "History cleared successfully" })
        );

        let res = warp::test::request()
            .path("/api/respiratory/history")
            .reply(&routes)
            .await;
        assert_eq!(body(&res), json!({ "success": true, "data": [] }));
    }

    #[tokio::test]
    async fn export_uses_latest_calculation() {
        let api = api();
        let routes = api.routes();

        let res = warp::test::request()
            .path("/api/respiratory/export/fhir")
            .reply(&routes)
            .await;
        assert_eq!(res.status(), StatusCode::NOT_FOUND);

        post_calculation(
            &api,
            json!({ "ph": 7.38, "paCO2": 40, "paO2": 55, "fio2": 40, "bicarbonate": 24 }),
        )
        .await;

        let res = warp::test::request()
            .path("/api/respiratory/export/fhir")
            .reply(&routes)
            .await;
        assert_eq!(res.status(), StatusCode::OK);
        let observation = body(&res);
        assert_eq!(observation["resourceType"], "Observation");
        assert_eq!(observation["valueCodeableConcept"]["coding"][0]["code"], "409622000");

        let res = warp::test::request()
            .path("/api/respiratory/export/hl7")
            .reply(&routes)
            .await;
        assert_eq!(res.status(), StatusCode::OK);
        let text = String::from_utf8(res.body().to_vec()).unwrap();
        assert!(text.starts_with("MSH|^~\\&|RESPCALC"));
        assert_eq!(text.split('\r').count(), 8);
    }

    #[tokio::test]
    async fn unknown_route_is_enveloped() {
        let api = api();
        let routes = api.routes();
        let res = warp::test::request()
            .path("/api/respiratory/unknown")
            .reply(&routes)
            .await;
        assert_eq!(res.status(), StatusCode::NOT_FOUND);
        assert_eq!(body(&res)["success"], false);
    }
}
