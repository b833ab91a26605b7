use std::sync::Arc;

use anyhow::{anyhow, Result};
use axum::body::{to_bytes, Body};
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use futures::future::BoxFuture;
use memory_lane::config::Config;
use memory_lane::memories::Media;
use memory_lane::server::api::{router, AppState};
use memory_lane::storage::{MediaHost, MediaUpload};
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

const BOUNDARY: &str = "memorylaneboundary";

fn app_state() -> Result<(AppState, TempDir)> {
    let data_dir = TempDir::new()?;
    let mut config = Config::default();
    config.storage.data_dir = data_dir.path().to_path_buf();
    config.media.max_upload_bytes = 1024;

    Ok((AppState::new(config)?, data_dir))
}

fn app() -> Result<(Router, TempDir)> {
    let (state, data_dir) = app_state()?;
    Ok((router(state)?, data_dir))
}

/// Deletes through the wrapped host but refuses every upload.
struct UploadsDown(Arc<dyn MediaHost>);

impl MediaHost for UploadsDown {
    fn upload<'a>(&'a self, _upload: &'a MediaUpload) -> BoxFuture<'a, Result<Media>> {
        Box::pin(async { Err(anyhow!("media host unavailable")) })
    }

    fn destroy<'a>(&'a self, media: &'a Media) -> BoxFuture<'a, Result<()>> {
        self.0.destroy(media)
    }
}

enum Part<'a> {
    Text(&'a str, &'a str),
    File {
        name: &'a str,
        file_name: &'a str,
        content_type: &'a str,
        bytes: &'a [u8],
    },
}

fn multipart(parts: &[Part<'_>]) -> Vec<u8> {
    let mut body = Vec::new();
    for part in parts {
        body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
        match part {
            Part::Text(name, value) => {
                body.extend_from_slice(
                    format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n")
                        .as_bytes(),
                );
            }
            Part::File {
                name,
                file_name,
                content_type,
                bytes,
            } => {
                body.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"{name}\"; filename=\"{file_name}\"\r\nContent-Type: {content_type}\r\n\r\n"
                    )
                    .as_bytes(),
                );
                body.extend_from_slice(bytes);
                body.extend_from_slice(b"\r\n");
            }
        }
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    body
}

fn form_request(method: Method, uri: &str, parts: &[Part<'_>]) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(multipart(parts)))
        .unwrap()
}

fn empty_request(method: Method, uri: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

async fn call(app: &Router, request: Request<Body>) -> Result<(StatusCode, Value)> {
    let response = app.clone().oneshot(request).await?;
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await?;
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes)?
    };
    Ok((status, body))
}

fn valid_fields<'a>(title: &'a str, date: &'a str) -> Vec<Part<'a>> {
    vec![
        Part::Text("title", title),
        Part::Text("message", "We got lost and found a bakery"),
        Part::Text("date", date),
        Part::Text("createdBy", "her"),
    ]
}

#[tokio::test]
async fn health_reports_running() -> Result<()> {
    let (app, _dir) = app()?;
    let (status, body) = call(&app, empty_request(Method::GET, "/api/health")).await?;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "Server is running");
    assert_eq!(body["peers"], 0);
    Ok(())
}

#[tokio::test]
async fn create_list_update_delete() -> Result<()> {
    let (app, dir) = app()?;

    let (status, body) = call(
        &app,
        form_request(Method::POST, "/api/memories", &valid_fields("Old trip", "2021-03-01")),
    )
    .await?;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["media"], Value::Null);

    let mut parts = valid_fields("Paris", "2023-07-14");
    parts.push(Part::File {
        name: "media",
        file_name: "eiffel.png",
        content_type: "image/png",
        bytes: b"\x89PNG\r\n",
    });
    let (status, body) = call(&app, form_request(Method::POST, "/api/memories", &parts)).await?;
    assert_eq!(status, StatusCode::CREATED);
    let paris = body["data"].clone();
    let id = paris["id"].as_str().unwrap().to_string();
    assert_eq!(paris["media"]["type"], "image");
    let public_id = paris["media"]["publicId"].as_str().unwrap().to_string();
    let media_path = dir.path().join("media").join(&public_id);
    assert!(media_path.exists());

    // Served back from the local media host.
    let response = app
        .clone()
        .oneshot(empty_request(
            Method::GET,
            paris["media"]["url"].as_str().unwrap(),
        ))
        .await?;
    assert_eq!(response.status(), StatusCode::OK);

    let (status, body) = call(&app, empty_request(Method::GET, "/api/memories")).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], 2);
    assert_eq!(body["data"][0]["title"], "Paris");
    assert_eq!(body["data"][1]["title"], "Old trip");

    let (status, body) = call(
        &app,
        form_request(
            Method::PUT,
            &format!("/api/memories/{id}"),
            &[
                Part::Text("title", "Paris at night"),
                Part::Text("message", ""),
                Part::Text("removeMedia", "true"),
            ],
        ),
    )
    .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["title"], "Paris at night");
    assert_eq!(body["data"]["message"], paris["message"]);
    assert_eq!(body["data"]["media"], Value::Null);
    assert!(!media_path.exists());

    let (status, body) = call(&app, empty_request(Method::GET, &format!("/api/memories/{id}"))).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["title"], "Paris at night");

    let (status, body) =
        call(&app, empty_request(Method::DELETE, &format!("/api/memories/{id}"))).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Memory deleted successfully");

    let (status, body) = call(&app, empty_request(Method::GET, &format!("/api/memories/{id}"))).await?;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "Memory not found");
    Ok(())
}

#[tokio::test]
async fn update_replaces_media() -> Result<()> {
    let (app, dir) = app()?;

    let mut parts = valid_fields("Song", "2022-02-02");
    parts.push(Part::File {
        name: "media",
        file_name: "first.mp3",
        content_type: "audio/mpeg",
        bytes: b"ID3 first",
    });
    let (_, body) = call(&app, form_request(Method::POST, "/api/memories", &parts)).await?;
    let id = body["data"]["id"].as_str().unwrap().to_string();
    let old_public_id = body["data"]["media"]["publicId"].as_str().unwrap().to_string();

    let (status, body) = call(
        &app,
        form_request(
            Method::PUT,
            &format!("/api/memories/{id}"),
            &[Part::File {
                name: "media",
                file_name: "second.webm",
                content_type: "video/webm",
                bytes: b"webm second",
            }],
        ),
    )
    .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["media"]["type"], "video");
    assert!(!dir.path().join("media").join(&old_public_id).exists());
    let new_public_id = body["data"]["media"]["publicId"].as_str().unwrap();
    assert!(dir.path().join("media").join(new_public_id).exists());
    Ok(())
}

#[tokio::test]
async fn failed_upload_keeps_existing_media() -> Result<()> {
    let (state, dir) = app_state()?;
    let app = router(state.clone())?;

    let mut parts = valid_fields("Sunset", "2022-08-20");
    parts.push(Part::File {
        name: "media",
        file_name: "sunset.jpg",
        content_type: "image/jpeg",
        bytes: b"\xff\xd8\xff first",
    });
    let (_, body) = call(&app, form_request(Method::POST, "/api/memories", &parts)).await?;
    let original = body["data"].clone();
    let id = original["id"].as_str().unwrap().to_string();
    let public_id = original["media"]["publicId"].as_str().unwrap().to_string();
    let media_path = dir.path().join("media").join(&public_id);
    assert!(media_path.exists());

    let mut broken = state.clone();
    broken.media = Arc::new(UploadsDown(state.media.clone()));
    let broken_app = router(broken)?;

    let (status, _) = call(
        &broken_app,
        form_request(
            Method::PUT,
            &format!("/api/memories/{id}"),
            &[
                Part::Text("title", "Sunset again"),
                Part::File {
                    name: "media",
                    file_name: "second.jpg",
                    content_type: "image/jpeg",
                    bytes: b"\xff\xd8\xff second",
                },
            ],
        ),
    )
    .await?;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);

    assert!(media_path.exists());
    let (status, body) = call(&app, empty_request(Method::GET, &format!("/api/memories/{id}"))).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["title"], "Sunset");
    assert_eq!(body["data"]["media"], original["media"]);
    Ok(())
}

#[tokio::test]
async fn create_rejects_bad_input() -> Result<()> {
    let (app, _dir) = app()?;

    let (status, body) = call(
        &app,
        form_request(
            Method::POST,
            "/api/memories",
            &[Part::Text("title", "Only a title")],
        ),
    )
    .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(
        body["error"],
        "Title, message, date, and createdBy are required. Missing: message, date, createdBy"
    );

    let mut parts = valid_fields("Hike", "2023-01-01");
    parts[3] = Part::Text("createdBy", "them");
    let (status, body) = call(&app, form_request(Method::POST, "/api/memories", &parts)).await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "createdBy must be either 'him' or 'her'");

    let (status, body) = call(
        &app,
        form_request(Method::POST, "/api/memories", &valid_fields("Hi", "2023-01-01")),
    )
    .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Validation failed");
    assert_eq!(body["details"][0], "Title must be at least 3 characters");

    let mut parts = valid_fields("Report", "2023-01-01");
    parts.push(Part::File {
        name: "media",
        file_name: "report.pdf",
        content_type: "application/pdf",
        bytes: b"%PDF-1.4",
    });
    let (status, body) = call(&app, form_request(Method::POST, "/api/memories", &parts)).await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"]
        .as_str()
        .unwrap()
        .starts_with("Unsupported file type: application/pdf"));

    let big = vec![0u8; 2048];
    let mut parts = valid_fields("Huge", "2023-01-01");
    parts.push(Part::File {
        name: "media",
        file_name: "huge.png",
        content_type: "image/png",
        bytes: &big,
    });
    let (status, body) = call(&app, form_request(Method::POST, "/api/memories", &parts)).await?;
    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(body["error"], "File size exceeds limit");

    let (_, body) = call(&app, empty_request(Method::GET, "/api/memories")).await?;
    assert_eq!(body["count"], 0);
    Ok(())
}

#[tokio::test]
async fn bad_ids_and_unknown_routes() -> Result<()> {
    let (app, _dir) = app()?;

    let (status, body) = call(&app, empty_request(Method::GET, "/api/memories/not-an-id")).await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Invalid memory ID");

    let missing = uuid::Uuid::new_v4();
    let (status, _) =
        call(&app, empty_request(Method::DELETE, &format!("/api/memories/{missing}"))).await?;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = call(
        &app,
        form_request(
            Method::PUT,
            &format!("/api/memories/{missing}"),
            &[Part::Text("title", "Nothing here")],
        ),
    )
    .await?;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = call(&app, empty_request(Method::GET, "/api/nowhere")).await?;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "Route not found");
    Ok(())
}
