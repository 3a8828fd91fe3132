//! HTTP Layer
//!
//! `POST /predict` takes a multipart upload in the `file` field and answers with
//! the top-1 and top-k letters. `GET /health` reports the loaded model.

pub mod error;

use axum::{
    body::{Body, Bytes},
    extract::{multipart::MultipartRejection, DefaultBodyLimit, Multipart, State},
    http::Request,
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use uuid::Uuid;

use crate::vision::{labels, LetterRecognizer, PredictError, PredictionResult};

pub use error::ApiError;

/// Multipart field carrying the image
pub const FILE_FIELD: &str = "file";

/// State shared by all handlers
pub struct AppState {
    pub recognizer: LetterRecognizer,
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    model: String,
    sha256: String,
    size_bytes: u64,
    inputs: Vec<String>,
    outputs: Vec<String>,
    classes: usize,
}

/// Build the application router
pub fn router(recognizer: LetterRecognizer, max_upload_bytes: usize) -> Router {
    let state = Arc::new(AppState { recognizer });

    Router::new()
        .route("/predict", post(predict_handler))
        .route("/health", get(health_handler))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(
            TraceLayer::new_for_http().make_span_with(|req: &Request<Body>| {
                tracing::info_span!(
                    "request",
                    id = %Uuid::new_v4(),
                    method = %req.method(),
                    uri = %req.uri(),
                )
            }),
        )
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn predict_handler(
    State(state): State<Arc<AppState>>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<PredictionResult>, ApiError> {
    // A body that is not multipart at all has no file in it
    let mut multipart = multipart.map_err(|_| PredictError::MissingFile)?;
    let bytes = read_upload(&mut multipart).await?;

    let start = Instant::now();
    let recognizer = state.recognizer.clone();
    let result = tokio::task::spawn_blocking(move || recognizer.predict_bytes(&bytes))
        .await
        .map_err(|e| PredictError::Worker(e.to_string()))??;

    info!(
        "Predicted: {} ({:.2}%) in {:?}",
        result.top1.label,
        result.top1.prob * 100.0,
        start.elapsed()
    );

    Ok(Json(result))
}

/// Find the `file` part and read it. Parts without a filename are plain form
/// fields and do not count as an upload.
async fn read_upload(multipart: &mut Multipart) -> Result<Bytes, ApiError> {
    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some(FILE_FIELD) {
            continue;
        }
        match field.file_name().map(str::is_empty) {
            None => continue,
            Some(true) => return Err(PredictError::EmptyFilename.into()),
            Some(false) => return Ok(field.bytes().await?),
        }
    }
    Err(PredictError::MissingFile.into())
}

async fn health_handler(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let info = state.recognizer.model_info();
    Json(HealthResponse {
        status: "ok",
        model: info.path.display().to_string(),
        sha256: info.sha256.clone(),
        size_bytes: info.size_bytes,
        inputs: info.input_names.clone(),
        outputs: info.output_names.clone(),
        classes: labels::NUM_CLASSES,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vision::testing::{FailingClassifier, FixedClassifier};
    use axum::http::{header, Method, StatusCode};
    use image::{ImageFormat, Rgb, RgbImage};
    use serde_json::Value;
    use std::io::Cursor;
    use tower::ServiceExt;

    const BOUNDARY: &str = "X-LETTER-BOUNDARY";
    const LIMIT: usize = 1024 * 1024;

    fn app() -> Router {
        let recognizer = LetterRecognizer::new(Arc::new(FixedClassifier::dominant_first()));
        router(recognizer, LIMIT)
    }

    fn solid_png() -> Vec<u8> {
        let img = RgbImage::from_pixel(1, 1, Rgb([200, 30, 30]));
        let mut bytes = Vec::new();
        img.write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png).unwrap();
        bytes
    }

    /// Build a multipart body from (field name, optional filename, content) parts
    fn multipart_body(parts: &[(&str, Option<&str>, &[u8])]) -> Vec<u8> {
        let mut body = Vec::new();
        for (name, filename, content) in parts {
            body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
            match filename {
                Some(filename) => {
                    body.extend_from_slice(
                        format!(
                            "Content-Disposition: form-data; name=\"{name}\"; filename=\"{filename}\"\r\n\
                             Content-Type: application/octet-stream\r\n\r\n"
                        )
                        .as_bytes(),
                    );
                }
                None => {
                    body.extend_from_slice(
                        format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n").as_bytes(),
                    );
                }
            }
            body.extend_from_slice(content);
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
        body
    }

    fn predict_request(body: Vec<u8>) -> Request<Body> {
        Request::builder()
            .method(Method::POST)
            .uri("/predict")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(body))
            .unwrap()
    }

    async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_predict_solid_png() {
        let png = solid_png();
        let body = multipart_body(&[("file", Some("letter.png"), png.as_slice())]);

        let (status, json) = send(app(), predict_request(body)).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["top1"]["label"], "A");
        assert!(json["top1"]["prob"].as_f64().unwrap() > 0.5);

        let top3 = json["top3"].as_array().unwrap();
        assert_eq!(top3.len(), 3);
        assert_eq!(top3[0], json["top1"]);
        let probs: Vec<f64> = top3.iter().map(|e| e["prob"].as_f64().unwrap()).collect();
        assert!(probs.windows(2).all(|w| w[0] >= w[1]));
    }

    #[tokio::test]
    async fn test_file_after_other_fields() {
        let png = solid_png();
        let body = multipart_body(&[
            ("note", None, &b"hello"[..]),
            ("file", Some("letter.png"), png.as_slice()),
        ]);

        let (status, _) = send(app(), predict_request(body)).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_missing_file_field() {
        let body = multipart_body(&[("image", Some("letter.png"), solid_png().as_slice())]);

        let (status, json) = send(app(), predict_request(body)).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json, serde_json::json!({ "error": "No file uploaded" }));
    }

    #[tokio::test]
    async fn test_file_field_without_filename_is_not_an_upload() {
        let body = multipart_body(&[("file", None, &b"plain text"[..])]);

        let (status, json) = send(app(), predict_request(body)).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["error"], "No file uploaded");
    }

    #[tokio::test]
    async fn test_empty_filename() {
        let body = multipart_body(&[("file", Some(""), solid_png().as_slice())]);

        let (status, json) = send(app(), predict_request(body)).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json, serde_json::json!({ "error": "Empty filename" }));
    }

    #[tokio::test]
    async fn test_non_multipart_request() {
        let request = Request::builder()
            .method(Method::POST)
            .uri("/predict")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from("{}"))
            .unwrap();

        let (status, json) = send(app(), request).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["error"], "No file uploaded");
    }

    #[tokio::test]
    async fn test_non_image_bytes() {
        let body = multipart_body(&[("file", Some("notes.txt"), &b"this is not an image"[..])]);

        let (status, json) = send(app(), predict_request(body)).await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!json["error"].as_str().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_inference_failure() {
        let recognizer = LetterRecognizer::new(Arc::new(FailingClassifier::new()));
        let app = router(recognizer, LIMIT);
        let png = solid_png();
        let body = multipart_body(&[("file", Some("letter.png"), png.as_slice())]);

        let (status, json) = send(app, predict_request(body)).await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(json["error"], "shape mismatch");
    }

    #[tokio::test]
    async fn test_health() {
        let request = Request::builder()
            .uri("/health")
            .body(Body::empty())
            .unwrap();

        let (status, json) = send(app(), request).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["status"], "ok");
        assert_eq!(json["classes"], 52);
        assert_eq!(json["sha256"].as_str().unwrap().len(), 64);
        assert_eq!(json["size_bytes"], 0);
        assert_eq!(json["inputs"], serde_json::json!(["input"]));
        assert_eq!(json["outputs"], serde_json::json!(["probs"]));
    }

    #[tokio::test]
    async fn test_oversized_upload_is_rejected() {
        let recognizer = LetterRecognizer::new(Arc::new(FixedClassifier::dominant_first()));
        let app = router(recognizer, 1024);
        let payload = vec![0u8; 4096];
        let body = multipart_body(&[("file", Some("big.png"), payload.as_slice())]);

        let (status, json) = send(app, predict_request(body)).await;

        assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
        assert!(!json["error"].as_str().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_non_finite_model_output_is_server_error() {
        let mut scores = vec![0.0; labels::NUM_CLASSES];
        scores[7] = f32::NAN;
        let recognizer = LetterRecognizer::new(Arc::new(FixedClassifier::new(scores)));
        let app = router(recognizer, LIMIT);
        let png = solid_png();
        let body = multipart_body(&[("file", Some("letter.png"), png.as_slice())]);

        let (status, json) = send(app, predict_request(body)).await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(json["error"], "model produced non-finite scores");
    }

    #[tokio::test]
    async fn test_cors_allows_any_origin() {
        let request = Request::builder()
            .uri("/health")
            .header(header::ORIGIN, "http://10.0.0.5:8081")
            .body(Body::empty())
            .unwrap();

        let response = app().oneshot(request).await.unwrap();

        assert_eq!(
            response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN],
            "*"
        );
    }
}
