//! Client for the Gemini file and inference API
mod error;
mod types;

use std::path::Path;
use std::time::Duration;

use reqwest::{header, Client, Response};
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use reqwest_tracing::TracingMiddleware;
use serde::Serialize;
use tokio_util::io::ReaderStream;

pub use error::GeminiError;
pub use types::{
    Candidate, Content, FileData, FileReference, GenerateContentRequest, GenerateContentResponse,
    GenerationConfig, Part, PromptFeedback, RemoteFile, RemoteFileState,
};

use types::UploadFileResponse;

/// Upper bound for a single vendor request; uploads of large videos dominate
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 300;
/// Maximum number of idle connections to maintain per host
const MAX_IDLE_CONNECTIONS_PER_HOST: usize = 10;
const API_KEY_HEADER: &str = "x-goog-api-key";

/// Generative-AI vendor operations used by the analysis pipeline
#[async_trait::async_trait]
pub trait GenerativeApi: Send + Sync {
    /// Whether credentials are present; checked before any network call
    fn is_configured(&self) -> bool;

    /// Uploads a local file and returns the vendor handle once the upload is acknowledged
    async fn upload_file(
        &self,
        path: &Path,
        mime_type: &str,
        display_name: &str,
    ) -> Result<RemoteFile, GeminiError>;

    /// Fetches the current state of an uploaded file
    async fn get_file(&self, name: &str) -> Result<RemoteFile, GeminiError>;

    /// Deletes an uploaded file
    async fn delete_file(&self, name: &str) -> Result<(), GeminiError>;

    /// Runs one inference call
    async fn generate_content(
        &self,
        request: &GenerateContentRequest,
    ) -> Result<GenerateContentResponse, GeminiError>;
}

#[derive(Serialize)]
struct StartUploadRequest<'a> {
    file: StartUploadFile<'a>,
}

#[derive(Serialize)]
struct StartUploadFile<'a> {
    display_name: &'a str,
}

/// HTTP client for the Gemini REST API
pub struct GeminiClient {
    base_url: String,
    api_key: Option<String>,
    model: String,
    http_client: ClientWithMiddleware,
}

impl GeminiClient {
    /// Creates a new Gemini client
    ///
    /// A missing `api_key` is not an error here; every call fails with
    /// `GeminiError::MissingApiKey` before touching the network.
    ///
    /// # Panics
    ///
    /// If the HTTP client fails to be created
    #[must_use]
    pub fn new(base_url: String, api_key: Option<String>, model: String) -> Self {
        let reqwest_client = Client::builder()
            .timeout(Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS))
            .pool_max_idle_per_host(MAX_IDLE_CONNECTIONS_PER_HOST)
            .build()
            .expect("Failed to create HTTP client");

        let http_client = ClientBuilder::new(reqwest_client)
            .with(TracingMiddleware::default())
            .build();

        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            model,
            http_client,
        }
    }

    fn api_key(&self) -> Result<&str, GeminiError> {
        self.api_key.as_deref().ok_or(GeminiError::MissingApiKey)
    }
}

/// Turns a non-success response into `GeminiError::Status`
async fn ensure_success(response: Response) -> Result<Response, GeminiError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "Unknown error".to_string());
    Err(GeminiError::Status {
        status: status.as_u16(),
        body,
    })
}

#[async_trait::async_trait]
impl GenerativeApi for GeminiClient {
    fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    async fn upload_file(
        &self,
        path: &Path,
        mime_type: &str,
        display_name: &str,
    ) -> Result<RemoteFile, GeminiError> {
        let api_key = self.api_key()?;
        let size = tokio::fs::metadata(path).await?.len();

        // Resumable protocol: open a session, then send the bytes and finalize in one request
        let start_body = serde_json::to_vec(&StartUploadRequest {
            file: StartUploadFile { display_name },
        })
        .map_err(|e| GeminiError::InvalidResponse(format!("Failed to serialize request: {e}")))?;

        let start = self
            .http_client
            .post(format!("{}/upload/v1beta/files", self.base_url))
            .header(API_KEY_HEADER, api_key)
            .header("X-Goog-Upload-Protocol", "resumable")
            .header("X-Goog-Upload-Command", "start")
            .header("X-Goog-Upload-Header-Content-Length", size.to_string())
            .header("X-Goog-Upload-Header-Content-Type", mime_type)
            .header(header::CONTENT_TYPE, "application/json")
            .body(start_body)
            .send()
            .await?;
        let start = ensure_success(start).await?;

        let upload_url = start
            .headers()
            .get("x-goog-upload-url")
            .and_then(|value| value.to_str().ok())
            .ok_or_else(|| GeminiError::InvalidResponse("missing upload URL".to_string()))?
            .to_string();

        let file = tokio::fs::File::open(path).await?;
        let response = self
            .http_client
            .post(upload_url)
            .header(header::CONTENT_LENGTH, size)
            .header("X-Goog-Upload-Offset", "0")
            .header("X-Goog-Upload-Command", "upload, finalize")
            .body(reqwest::Body::wrap_stream(ReaderStream::new(file)))
            .send()
            .await?;
        let response = ensure_success(response).await?;

        let uploaded: UploadFileResponse = response.json().await?;
        tracing::debug!(name = %uploaded.file.name, size, "Uploaded file to Gemini");

        Ok(uploaded.file)
    }

    async fn get_file(&self, name: &str) -> Result<RemoteFile, GeminiError> {
        let response = self
            .http_client
            .get(format!("{}/v1beta/{name}", self.base_url))
            .header(API_KEY_HEADER, self.api_key()?)
            .send()
            .await?;

        Ok(ensure_success(response).await?.json::<RemoteFile>().await?)
    }

    async fn delete_file(&self, name: &str) -> Result<(), GeminiError> {
        let response = self
            .http_client
            .delete(format!("{}/v1beta/{name}", self.base_url))
            .header(API_KEY_HEADER, self.api_key()?)
            .send()
            .await?;

        ensure_success(response).await?;
        Ok(())
    }

    async fn generate_content(
        &self,
        request: &GenerateContentRequest,
    ) -> Result<GenerateContentResponse, GeminiError> {
        let api_key = self.api_key()?;
        let json_body = serde_json::to_vec(request)
            .map_err(|e| GeminiError::InvalidResponse(format!("Failed to serialize request: {e}")))?;

        let response = self
            .http_client
            .post(format!(
                "{}/v1beta/models/{}:generateContent",
                self.base_url, self.model
            ))
            .header(API_KEY_HEADER, api_key)
            .header(header::CONTENT_TYPE, "application/json")
            .body(json_body)
            .send()
            .await?;

        Ok(ensure_success(response)
            .await?
            .json::<GenerateContentResponse>()
            .await?)
    }
}

#[cfg(any(test, feature = "test-utils"))]
pub mod mock {
    use std::collections::VecDeque;
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    use super::{
        GeminiError, GenerateContentRequest, GenerateContentResponse, GenerativeApi, RemoteFile,
        RemoteFileState,
    };

    /// JSON the vendor would return for the given per-level percentages
    #[must_use]
    pub fn analysis_json(velo: i32, oro: i32, epiglote: i32, confidence: i32) -> String {
        serde_json::json!({
            "velo_palato": {
                "obstrucao_percentual": velo,
                "padrao_colapso": "Concêntrico",
                "descricao": "Colapso concêntrico do palato mole"
            },
            "orofaringe": {
                "obstrucao_percentual": oro,
                "padrao_colapso": "Lateral",
                "descricao": "Colapso lateral das paredes"
            },
            "epiglote_base_lingua": {
                "obstrucao_percentual": epiglote,
                "padrao_colapso": "Anteroposterior",
                "descricao": "Retroposicionamento da base da língua"
            },
            "nivel_confianca": confidence,
            "analise_clinica": "Obstrução leve multinível"
        })
        .to_string()
    }

    /// Scripted vendor
    ///
    /// `get_file` answers with the scripted states in order and keeps
    /// repeating the last one; with no script it answers `Pending` forever.
    pub struct MockGenerativeApi {
        configured: bool,
        states: Mutex<VecDeque<RemoteFileState>>,
        last_state: Mutex<RemoteFileState>,
        response: Mutex<Result<GenerateContentResponse, String>>,
        upload_delay: Option<Duration>,
        fail_upload: bool,
        uploads: AtomicUsize,
        get_file_calls: AtomicUsize,
        generate_calls: AtomicUsize,
        uploaded_sizes: Mutex<Vec<u64>>,
        deleted: Mutex<Vec<String>>,
        last_request: Mutex<Option<GenerateContentRequest>>,
    }

    impl Default for MockGenerativeApi {
        fn default() -> Self {
            Self::new()
        }
    }

    impl MockGenerativeApi {
        /// Vendor that accepts uploads, reports ACTIVE and answers 10/20/15 at 90% confidence
        #[must_use]
        pub fn new() -> Self {
            Self {
                configured: true,
                states: Mutex::new(VecDeque::from([RemoteFileState::Active])),
                last_state: Mutex::new(RemoteFileState::Pending),
                response: Mutex::new(Ok(GenerateContentResponse::from_text(
                    analysis_json(10, 20, 15, 90),
                    "STOP",
                ))),
                upload_delay: None,
                fail_upload: false,
                uploads: AtomicUsize::new(0),
                get_file_calls: AtomicUsize::new(0),
                generate_calls: AtomicUsize::new(0),
                uploaded_sizes: Mutex::new(Vec::new()),
                deleted: Mutex::new(Vec::new()),
                last_request: Mutex::new(None),
            }
        }

        #[must_use]
        pub fn unconfigured(mut self) -> Self {
            self.configured = false;
            self
        }

        #[must_use]
        pub fn with_states(self, states: Vec<RemoteFileState>) -> Self {
            *self.states.lock().unwrap() = states.into();
            self
        }

        #[must_use]
        pub fn with_response(self, response: GenerateContentResponse) -> Self {
            *self.response.lock().unwrap() = Ok(response);
            self
        }

        #[must_use]
        pub fn with_generate_error(self, message: &str) -> Self {
            *self.response.lock().unwrap() = Err(message.to_string());
            self
        }

        #[must_use]
        pub const fn with_upload_delay(mut self, delay: Duration) -> Self {
            self.upload_delay = Some(delay);
            self
        }

        #[must_use]
        pub const fn failing_upload(mut self) -> Self {
            self.fail_upload = true;
            self
        }

        pub fn uploads(&self) -> usize {
            self.uploads.load(Ordering::SeqCst)
        }

        pub fn get_file_calls(&self) -> usize {
            self.get_file_calls.load(Ordering::SeqCst)
        }

        pub fn generate_calls(&self) -> usize {
            self.generate_calls.load(Ordering::SeqCst)
        }

        pub fn uploaded_sizes(&self) -> Vec<u64> {
            self.uploaded_sizes.lock().unwrap().clone()
        }

        pub fn deleted(&self) -> Vec<String> {
            self.deleted.lock().unwrap().clone()
        }

        pub fn last_request(&self) -> Option<GenerateContentRequest> {
            self.last_request.lock().unwrap().clone()
        }
    }

    #[async_trait::async_trait]
    impl GenerativeApi for MockGenerativeApi {
        fn is_configured(&self) -> bool {
            self.configured
        }

        async fn upload_file(
            &self,
            path: &Path,
            mime_type: &str,
            display_name: &str,
        ) -> Result<RemoteFile, GeminiError> {
            if let Some(delay) = self.upload_delay {
                tokio::time::sleep(delay).await;
            }
            if self.fail_upload {
                return Err(GeminiError::NetworkError("connection reset".to_string()));
            }

            let size = tokio::fs::metadata(path).await?.len();
            self.uploaded_sizes.lock().unwrap().push(size);
            let id = self.uploads.fetch_add(1, Ordering::SeqCst);

            Ok(RemoteFile {
                name: format!("files/mock-{id}"),
                display_name: Some(display_name.to_string()),
                mime_type: mime_type.to_string(),
                uri: format!("https://generativelanguage.test/v1beta/files/mock-{id}"),
                state: RemoteFileState::Pending,
            })
        }

        async fn get_file(&self, name: &str) -> Result<RemoteFile, GeminiError> {
            self.get_file_calls.fetch_add(1, Ordering::SeqCst);

            let state = {
                let mut last = self.last_state.lock().unwrap();
                if let Some(next) = self.states.lock().unwrap().pop_front() {
                    *last = next;
                }
                *last
            };

            Ok(RemoteFile {
                name: name.to_string(),
                display_name: None,
                mime_type: "video/mp4".to_string(),
                uri: format!("https://generativelanguage.test/v1beta/{name}"),
                state,
            })
        }

        async fn delete_file(&self, name: &str) -> Result<(), GeminiError> {
            self.deleted.lock().unwrap().push(name.to_string());
            Ok(())
        }

        async fn generate_content(
            &self,
            request: &GenerateContentRequest,
        ) -> Result<GenerateContentResponse, GeminiError> {
            self.generate_calls.fetch_add(1, Ordering::SeqCst);
            *self.last_request.lock().unwrap() = Some(request.clone());

            self.response
                .lock()
                .unwrap()
                .clone()
                .map_err(GeminiError::NetworkError)
        }
    }
}
