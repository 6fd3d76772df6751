//! Backend contract the reconciliation loop talks to, plus its HTTP
//! implementation.
//!
//! Every request carries the device guid. Fetches answer `Ok(None)` when the
//! backend has nothing queued (204), does not know the device (403) or sends
//! an unexpected status; only transport and decoding failures are errors.

#![allow(async_fn_in_trait)]

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::multipart::{Form, Part};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::ServerConfig;
use crate::hardware::camera::photo_path;
use crate::plan::Plan;
use crate::status::Status;

const GET_PLAN: &str = "getPlan";
const GET_WATER_LEVEL: &str = "getWaterLevel";
const GET_PICTURE: &str = "getPicture";
const POST_STATUS: &str = "postStatus";
const POST_WATER: &str = "postWater";
const POST_MOISTURE: &str = "postMoisture";
const POST_PICTURE: &str = "postPicture";

/// The container was refilled; `water` is the new capacity in ml.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct WaterReset {
    pub water: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PhotoRequest {
    pub photo_id: String,
}

pub trait ServerCommunicator {
    async fn get_plan(&self) -> Result<Option<Plan>>;
    async fn get_water_level(&self) -> Result<Option<WaterReset>>;
    async fn get_picture(&self) -> Result<Option<PhotoRequest>>;
    async fn post_plan_execution(&self, status: &Status) -> Result<()>;
    /// `percent` of the container still available.
    async fn post_water(&self, percent: f64) -> Result<()>;
    async fn post_moisture(&self, percent: i32) -> Result<()>;
    /// Uploads `<photos_dir>/<name>.png` under photo id `name`.
    async fn post_picture(&self, name: &str) -> Result<()>;
}

// ---------------------------------------------------------------------------
// Wire payloads
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct StatusReport<'a> {
    device: &'a str,
    execution_status: bool,
    message: &'a str,
}

#[derive(Serialize)]
struct WaterReport<'a> {
    device: &'a str,
    water_level: f64,
}

#[derive(Serialize)]
struct MoistureReport<'a> {
    device: &'a str,
    moisture_level: i32,
}

// ---------------------------------------------------------------------------
// HTTP implementation
// ---------------------------------------------------------------------------

pub struct HttpCommunicator {
    client: reqwest::Client,
    base_url: String,
    device_guid: String,
    photos_dir: PathBuf,
}

impl HttpCommunicator {
    pub fn new(server: &ServerConfig, device_guid: &str, photos_dir: PathBuf) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(server.request_timeout_secs))
            .build()
            .context("failed to build http client")?;

        Ok(Self {
            client,
            base_url: server.base_url.trim_end_matches('/').to_string(),
            device_guid: device_guid.to_string(),
            photos_dir,
        })
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}/{endpoint}", self.base_url)
    }

    async fn fetch<T: DeserializeOwned>(&self, endpoint: &str) -> Result<Option<T>> {
        let response = self
            .client
            .get(self.url(endpoint))
            .query(&[("device", self.device_guid.as_str())])
            .send()
            .await
            .with_context(|| format!("GET {endpoint} failed"))?;

        match response.status() {
            StatusCode::OK => {
                let body = response
                    .json::<T>()
                    .await
                    .with_context(|| format!("GET {endpoint}: undecodable body"))?;
                info!(endpoint, "server has queued data");
                Ok(Some(body))
            }
            StatusCode::NO_CONTENT => {
                debug!(endpoint, "nothing queued");
                Ok(None)
            }
            StatusCode::FORBIDDEN => {
                warn!(endpoint, device = %self.device_guid, "device not registered");
                Ok(None)
            }
            other => {
                warn!(endpoint, status = %other, "unexpected response");
                Ok(None)
            }
        }
    }

    async fn post_json<B: Serialize>(&self, endpoint: &str, body: &B) -> Result<()> {
        let response = self
            .client
            .post(self.url(endpoint))
            .json(body)
            .send()
            .await
            .with_context(|| format!("POST {endpoint} failed"))?;
        self.log_post(endpoint, response.status());
        Ok(())
    }

    fn log_post(&self, endpoint: &str, status: StatusCode) {
        if status.is_success() {
            debug!(endpoint, %status, "posted");
        } else if status == StatusCode::FORBIDDEN {
            warn!(endpoint, device = %self.device_guid, "device not registered");
        } else {
            warn!(endpoint, %status, "unexpected response");
        }
    }
}

impl ServerCommunicator for HttpCommunicator {
    async fn get_plan(&self) -> Result<Option<Plan>> {
        self.fetch(GET_PLAN).await
    }

    async fn get_water_level(&self) -> Result<Option<WaterReset>> {
        self.fetch(GET_WATER_LEVEL).await
    }

    async fn get_picture(&self) -> Result<Option<PhotoRequest>> {
        self.fetch(GET_PICTURE).await
    }

    async fn post_plan_execution(&self, status: &Status) -> Result<()> {
        let body = StatusReport {
            device: &self.device_guid,
            execution_status: status.watering_status(),
            message: status.message(),
        };
        self.post_json(POST_STATUS, &body).await
    }

    async fn post_water(&self, percent: f64) -> Result<()> {
        let body = WaterReport {
            device: &self.device_guid,
            water_level: percent,
        };
        self.post_json(POST_WATER, &body).await
    }

    async fn post_moisture(&self, percent: i32) -> Result<()> {
        let body = MoistureReport {
            device: &self.device_guid,
            moisture_level: percent,
        };
        self.post_json(POST_MOISTURE, &body).await
    }

    async fn post_picture(&self, name: &str) -> Result<()> {
        let mut form = Form::new()
            .text("device_id", self.device_guid.clone())
            .text("photo_id", name.to_string());

        let path = photo_path(&self.photos_dir, name);
        match tokio::fs::read(&path).await {
            Ok(bytes) => {
                let part = Part::bytes(bytes)
                    .file_name(format!("{name}.png"))
                    .mime_str("image/png")?;
                form = form.part("image_file", part);
            }
            Err(e) => {
                warn!(path = %path.display(), "photo not readable, posting without image: {e}");
            }
        }

        let response = self
            .client
            .post(self.url(POST_PICTURE))
            .multipart(form)
            .send()
            .await
            .with_context(|| format!("POST {POST_PICTURE} failed"))?;
        self.log_post(POST_PICTURE, response.status());
        Ok(())
    }
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    use axum::extract::Query;
    use axum::http::StatusCode as AxumStatus;
    use axum::routing::{get, post};
    use axum::{Json, Router};
    use serde_json::{json, Value};

    type Posts = Arc<Mutex<Vec<(String, Value)>>>;

    // -- Helper: in-process backend ---------------------------------------

    async fn spawn_backend(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}/")
    }

    fn communicator(base_url: String) -> HttpCommunicator {
        let server = ServerConfig {
            base_url,
            request_timeout_secs: 5,
        };
        HttpCommunicator::new(&server, "dev-1", std::env::temp_dir()).unwrap()
    }

    fn recorder(posts: Posts, endpoint: &'static str) -> axum::routing::MethodRouter {
        post(move |Json(body): Json<Value>| {
            let posts = posts.clone();
            async move {
                posts.lock().unwrap().push((endpoint.to_string(), body));
                AxumStatus::CREATED
            }
        })
    }

    // -- Fetches ----------------------------------------------------------

    #[tokio::test]
    async fn get_plan_decodes_queued_plan_and_sends_guid() {
        async fn plan(Query(q): Query<HashMap<String, String>>) -> (AxumStatus, Json<Value>) {
            assert_eq!(q.get("device").map(String::as_str), Some("dev-1"));
            (
                AxumStatus::OK,
                Json(json!({"plan_type": "basic", "name": "p", "water_volume": 200})),
            )
        }
        let base = spawn_backend(Router::new().route("/getPlan", get(plan))).await;

        let plan = communicator(base).get_plan().await.unwrap().unwrap();
        assert_eq!(plan.plan_type(), "basic");
        assert_eq!(plan.core().unwrap().water_volume(), 200);
    }

    #[tokio::test]
    async fn no_content_and_forbidden_mean_nothing_queued() {
        let app = Router::new()
            .route("/getWaterLevel", get(|| async { AxumStatus::NO_CONTENT }))
            .route("/getPicture", get(|| async { AxumStatus::FORBIDDEN }))
            .route("/getPlan", get(|| async { AxumStatus::INTERNAL_SERVER_ERROR }));
        let comm = communicator(spawn_backend(app).await);

        assert_eq!(comm.get_water_level().await.unwrap(), None);
        assert_eq!(comm.get_picture().await.unwrap(), None);
        assert!(comm.get_plan().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn fetch_decodes_water_reset_and_photo_request() {
        let app = Router::new()
            .route("/getWaterLevel", get(|| async { Json(json!({"water": 1500})) }))
            .route("/getPicture", get(|| async { Json(json!({"photo_id": "ph-7"})) }));
        let comm = communicator(spawn_backend(app).await);

        assert_eq!(
            comm.get_water_level().await.unwrap(),
            Some(WaterReset { water: 1500 })
        );
        assert_eq!(
            comm.get_picture().await.unwrap(),
            Some(PhotoRequest {
                photo_id: "ph-7".into()
            })
        );
    }

    #[tokio::test]
    async fn malformed_plan_is_an_error() {
        let app = Router::new().route(
            "/getPlan",
            get(|| async { Json(json!({"plan_type": "basic", "water_volume": -5})) }),
        );
        let comm = communicator(spawn_backend(app).await);
        assert!(comm.get_plan().await.is_err());
    }

    #[tokio::test]
    async fn unreachable_backend_is_an_error() {
        // Bind then drop to get a port nobody listens on.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let comm = communicator(format!("http://{addr}"));
        assert!(comm.get_plan().await.is_err());
    }

    // -- Posts ------------------------------------------------------------

    #[tokio::test]
    async fn posts_carry_device_and_readings() {
        let posts: Posts = Arc::default();
        let app = Router::new()
            .route("/postStatus", recorder(posts.clone(), "status"))
            .route("/postWater", recorder(posts.clone(), "water"))
            .route("/postMoisture", recorder(posts.clone(), "moisture"));
        let comm = communicator(spawn_backend(app).await);

        comm.post_plan_execution(&Status::health_check()).await.unwrap();
        comm.post_water(93.5).await.unwrap();
        comm.post_moisture(42).await.unwrap();

        let posts = posts.lock().unwrap().clone();
        assert_eq!(
            posts,
            vec![
                (
                    "status".to_string(),
                    json!({"device": "dev-1", "execution_status": false, "message": "healthcheck"})
                ),
                (
                    "water".to_string(),
                    json!({"device": "dev-1", "water_level": 93.5})
                ),
                (
                    "moisture".to_string(),
                    json!({"device": "dev-1", "moisture_level": 42})
                ),
            ]
        );
    }

    #[tokio::test]
    async fn post_rejected_by_backend_is_not_an_error() {
        let app = Router::new().route("/postWater", post(|| async { AxumStatus::FORBIDDEN }));
        let comm = communicator(spawn_backend(app).await);
        comm.post_water(10.0).await.unwrap();
    }

    #[tokio::test]
    async fn post_picture_without_file_still_posts_form() {
        let hits = Arc::new(Mutex::new(0));
        let counter = hits.clone();
        let app = Router::new().route(
            "/postPicture",
            post(move || {
                let counter = counter.clone();
                async move {
                    *counter.lock().unwrap() += 1;
                    AxumStatus::CREATED
                }
            }),
        );
        let comm = communicator(spawn_backend(app).await);

        comm.post_picture("missing-photo-id").await.unwrap();
        assert_eq!(*hits.lock().unwrap(), 1);
    }
}
