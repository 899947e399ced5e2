//! HTTP implementation of [`TrainingService`].

use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use std::collections::HashSet;
use tracing::{debug, error, info};

use crate::config::OrchestratorConfig;
use crate::customizer::model::{DatasetBody, DeployedModels, StartJobBody};
use crate::customizer::{
    CustomizerError, JobStatusSnapshot, ModelInfo, StartedJob, TrainingJobSpec, TrainingService,
};
use crate::types::CustomizationJobId;

/// Stateless client for the customizer (NeMo) and deployment (NIM) APIs.
#[derive(Debug, Clone)]
pub struct CustomizerClient {
    client: Client,
    nemo_url: String,
    nim_url: String,
    namespace: String,
}

impl CustomizerClient {
    /// Build a client from the orchestrator configuration.
    pub fn new(config: &OrchestratorConfig) -> anyhow::Result<Self> {
        let client = Client::builder().timeout(config.request_timeout()).build()?;

        Ok(Self::with_client(
            client,
            config.nemo_url(),
            config.nim_url(),
            &config.namespace,
        ))
    }

    /// Build a client around an existing reqwest client.
    pub fn with_client(client: Client, nemo_url: &str, nim_url: &str, namespace: &str) -> Self {
        Self {
            client,
            nemo_url: nemo_url.trim_end_matches('/').to_string(),
            nim_url: nim_url.trim_end_matches('/').to_string(),
            namespace: namespace.to_string(),
        }
    }

    fn job_uri(&self, job_id: &CustomizationJobId) -> String {
        format!("{}/v1/customization/jobs/{}", self.nemo_url, job_id)
    }

    fn model_uri(&self, model_name: &str) -> String {
        format!("{}/v1/models/{}", self.nemo_url, model_name)
    }
}

fn transport(operation: &'static str, err: reqwest::Error) -> CustomizerError {
    let err = CustomizerError::Transport {
        operation,
        message: err.to_string(),
    };
    error!("{}", err);
    err
}

/// Pass the response through when `accept` approves its status, otherwise
/// turn it into a `RemoteService` error carrying the body.
async fn ensure_status(
    operation: &'static str,
    response: Response,
    accept: fn(StatusCode) -> bool,
) -> Result<Response, CustomizerError> {
    let status = response.status();
    if accept(status) {
        return Ok(response);
    }

    let body = response
        .text()
        .await
        .unwrap_or_else(|e| format!("<unreadable body: {e}>"));
    let err = CustomizerError::RemoteService {
        operation,
        status: status.as_u16(),
        body,
    };
    error!("{}", err);
    Err(err)
}

fn is_success(status: StatusCode) -> bool {
    status.is_success()
}

fn is_ok_or_no_content(status: StatusCode) -> bool {
    status == StatusCode::OK || status == StatusCode::NO_CONTENT
}

async fn decode<T: DeserializeOwned>(
    operation: &'static str,
    response: Response,
) -> Result<T, CustomizerError> {
    response.json::<T>().await.map_err(|e| {
        let err = CustomizerError::Decode {
            operation,
            message: e.to_string(),
        };
        error!("{}", err);
        err
    })
}

#[async_trait]
impl TrainingService for CustomizerClient {
    async fn start_job(&self, spec: &TrainingJobSpec) -> Result<StartedJob, CustomizerError> {
        const OP: &str = "start training job";

        let body = StartJobBody {
            name: &spec.name,
            output_model: format!("{}/{}", self.namespace, spec.output_model_name),
            config: &spec.base_model,
            dataset: DatasetBody {
                name: &spec.dataset_name,
                namespace: &spec.dataset_namespace,
            },
            hyperparameters: &spec.hyperparameters,
        };

        let response = self
            .client
            .post(format!("{}/v1/customization/jobs", self.nemo_url))
            .json(&body)
            .send()
            .await
            .map_err(|e| transport(OP, e))?;

        let response = ensure_status(OP, response, is_success).await?;
        let started: StartedJob = decode(OP, response).await?;

        info!(
            "Started customization job {} for {} -> {}",
            started.job_id, spec.base_model, started.output_model
        );
        Ok(started)
    }

    async fn get_status(
        &self,
        job_id: &CustomizationJobId,
    ) -> Result<JobStatusSnapshot, CustomizerError> {
        const OP: &str = "get job status";

        let response = self
            .client
            .get(format!("{}/status", self.job_uri(job_id)))
            .send()
            .await
            .map_err(|e| transport(OP, e))?;

        let response = ensure_status(OP, response, is_success).await?;
        decode(OP, response).await
    }

    async fn get_model_info(&self, model_name: &str) -> Result<ModelInfo, CustomizerError> {
        const OP: &str = "get model info";

        let response = self
            .client
            .get(self.model_uri(model_name))
            .send()
            .await
            .map_err(|e| transport(OP, e))?;

        let response = ensure_status(OP, response, is_success).await?;
        decode(OP, response).await
    }

    async fn list_deployed_models(&self) -> Result<HashSet<String>, CustomizerError> {
        const OP: &str = "get models list";

        let response = self
            .client
            .get(format!("{}/v1/models", self.nim_url))
            .send()
            .await
            .map_err(|e| transport(OP, e))?;

        let response = ensure_status(OP, response, is_success).await?;
        let models: DeployedModels = decode(OP, response).await?;

        Ok(models.data.into_iter().map(|m| m.id).collect())
    }

    async fn delete_model(&self, model_name: &str) -> Result<(), CustomizerError> {
        const OP: &str = "delete model";

        if let Err(e) = self.get_model_info(model_name).await {
            let err = CustomizerError::ModelUnavailable {
                model: model_name.to_string(),
                source: Box::new(e),
            };
            error!("{}", err);
            return Err(err);
        }

        let response = self
            .client
            .delete(self.model_uri(model_name))
            .send()
            .await
            .map_err(|e| transport(OP, e))?;

        ensure_status(OP, response, is_ok_or_no_content).await?;
        info!("Successfully deleted model {}", model_name);
        Ok(())
    }

    async fn cancel_remote_job(&self, job_id: &CustomizationJobId) -> Result<(), CustomizerError> {
        const OP: &str = "cancel customization job";

        debug!("Requesting cancellation of customization job {}", job_id);
        let response = self
            .client
            .post(format!("{}/v1/customizations/{}/cancel", self.nemo_url, job_id))
            .send()
            .await
            .map_err(|e| transport(OP, e))?;

        ensure_status(OP, response, is_ok_or_no_content).await?;
        info!("Successfully cancelled job {}", job_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TrainingConfig;
    use axum::{
        Json, Router,
        extract::{Path, State},
        http::StatusCode as AxumStatus,
        routing::{get, post},
    };
    use serde_json::{Value, json};
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct StubState {
        last_body: Arc<Mutex<Option<Value>>>,
        deleted: Arc<Mutex<Vec<String>>>,
    }

    async fn spawn_stub(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{}", addr)
    }

    fn stub_router(state: StubState) -> Router {
        Router::new()
            .route(
                "/v1/customization/jobs",
                post(
                    |State(state): State<StubState>, Json(body): Json<Value>| async move {
                        let output_model = body["output_model"].clone();
                        *state.last_body.lock().unwrap() = Some(body);
                        Json(json!({ "id": "cust-42", "output_model": output_model }))
                    },
                ),
            )
            .route(
                "/v1/customization/jobs/{id}/status",
                get(|Path(id): Path<String>| async move {
                    if id == "broken" {
                        return Err((AxumStatus::INTERNAL_SERVER_ERROR, "boom".to_string()));
                    }
                    Ok(Json(json!({
                        "status": "running",
                        "percentage_done": 40.0,
                        "epochs_completed": 1,
                        "steps_completed": 120,
                        "status_logs": [
                            { "message": "Created" },
                            { "message": "Running", "detail": null }
                        ]
                    })))
                }),
            )
            .route(
                "/v1/models/{*model}",
                get(|Path(model): Path<String>| async move {
                    if model.ends_with("missing") {
                        return Err((AxumStatus::NOT_FOUND, "no such model".to_string()));
                    }
                    Ok(Json(json!({ "name": model, "namespace": "dfwbp" })))
                })
                .delete(
                    |State(state): State<StubState>, Path(model): Path<String>| async move {
                        state.deleted.lock().unwrap().push(model);
                        AxumStatus::NO_CONTENT
                    },
                ),
            )
            .route(
                "/v1/models",
                get(|| async {
                    Json(json!({
                        "data": [ { "id": "meta/llama" }, { "id": "dfwbp/customized-a" } ]
                    }))
                }),
            )
            .route(
                "/v1/customizations/{id}/cancel",
                post(|Path(id): Path<String>| async move {
                    if id == "finished" {
                        AxumStatus::CONFLICT
                    } else {
                        AxumStatus::OK
                    }
                }),
            )
            .with_state(state)
    }

    async fn client_with_stub() -> (CustomizerClient, StubState) {
        let state = StubState::default();
        let base = spawn_stub(stub_router(state.clone())).await;
        let client = CustomizerClient::with_client(Client::new(), &base, &base, "dfwbp");
        (client, state)
    }

    fn spec() -> TrainingJobSpec {
        TrainingJobSpec {
            name: "customization-wl-llama".to_string(),
            base_model: "meta/llama-3.2-1b-instruct".to_string(),
            output_model_name: "customized-llama".to_string(),
            dataset_name: "train-wl".to_string(),
            dataset_namespace: "dfwbp".to_string(),
            hyperparameters: TrainingConfig::default(),
        }
    }

    #[tokio::test]
    async fn test_start_job_sends_namespaced_output_model() {
        let (client, state) = client_with_stub().await;

        let started = client.start_job(&spec()).await.unwrap();
        assert_eq!(started.job_id.as_str(), "cust-42");
        assert_eq!(started.output_model, "dfwbp/customized-llama");

        let body = state.last_body.lock().unwrap().clone().unwrap();
        assert_eq!(body["config"], "meta/llama-3.2-1b-instruct");
        assert_eq!(body["dataset"]["name"], "train-wl");
        assert_eq!(body["dataset"]["namespace"], "dfwbp");
        assert_eq!(body["hyperparameters"]["finetuning_type"], "lora");
        assert_eq!(body["hyperparameters"]["lora"]["adapter_dim"], 32);
    }

    #[tokio::test]
    async fn test_get_status_parses_snapshot() {
        let (client, _) = client_with_stub().await;

        let snapshot = client
            .get_status(&CustomizationJobId::new("cust-42"))
            .await
            .unwrap();
        assert_eq!(snapshot.status, crate::customizer::RemoteJobStatus::Running);
        assert_eq!(snapshot.percentage_done, 40.0);
        assert_eq!(snapshot.steps_completed, 120);
        assert_eq!(snapshot.last_log_message(), Some("Running"));
    }

    #[tokio::test]
    async fn test_non_success_status_becomes_remote_service_error() {
        let (client, _) = client_with_stub().await;

        let err = client
            .get_status(&CustomizationJobId::new("broken"))
            .await
            .unwrap_err();
        match err {
            CustomizerError::RemoteService { status, body, .. } => {
                assert_eq!(status, 500);
                assert_eq!(body, "boom");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_truncated_error_body_is_described() {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 4096];
            let _ = socket.read(&mut buf).await;
            socket
                .write_all(b"HTTP/1.1 502 Bad Gateway\r\ncontent-length: 100\r\n\r\npartial")
                .await
                .unwrap();
        });

        let base = format!("http://{}", addr);
        let client = CustomizerClient::with_client(Client::new(), &base, &base, "dfwbp");
        let err = client
            .get_status(&CustomizationJobId::new("cust-1"))
            .await
            .unwrap_err();
        match err {
            CustomizerError::RemoteService { status, body, .. } => {
                assert_eq!(status, 502);
                assert!(body.starts_with("<unreadable body: "), "{body}");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_list_deployed_models_reads_nim_ids() {
        let (client, _) = client_with_stub().await;

        let models = client.list_deployed_models().await.unwrap();
        assert_eq!(models.len(), 2);
        assert!(models.contains("dfwbp/customized-a"));
    }

    #[tokio::test]
    async fn test_delete_model_verifies_existence_first() {
        let (client, state) = client_with_stub().await;

        let err = client.delete_model("dfwbp/missing").await.unwrap_err();
        assert!(matches!(err, CustomizerError::ModelUnavailable { .. }));
        assert_eq!(err.status(), Some(404));
        assert!(state.deleted.lock().unwrap().is_empty());

        client.delete_model("dfwbp/customized-a").await.unwrap();
        assert_eq!(
            state.deleted.lock().unwrap().as_slice(),
            ["dfwbp/customized-a".to_string()]
        );
    }

    #[tokio::test]
    async fn test_cancel_remote_job_propagates_conflict() {
        let (client, _) = client_with_stub().await;

        client
            .cancel_remote_job(&CustomizationJobId::new("cust-42"))
            .await
            .unwrap();

        let err = client
            .cancel_remote_job(&CustomizationJobId::new("finished"))
            .await
            .unwrap_err();
        assert_eq!(err.status(), Some(409));
    }

    #[tokio::test]
    async fn test_unreachable_service_is_transport_error() {
        let client = CustomizerClient::with_client(
            Client::new(),
            "http://127.0.0.1:1",
            "http://127.0.0.1:1",
            "dfwbp",
        );

        let err = client.list_deployed_models().await.unwrap_err();
        assert!(matches!(err, CustomizerError::Transport { .. }));
    }
}
