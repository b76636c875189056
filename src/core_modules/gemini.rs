// THEORY:
// `GeminiBackend` speaks the Generative Language REST protocol: one
// `models/{model}:generateContent` POST per image, with the prompt and a base64
// PNG as two parts of a single user turn. It is the only place in the crate that
// knows the wire format.
//
// Failure mapping follows what the service actually returns:
// - connection and DNS failures surface as `Transport`, elapsed deadlines as `Timeout`;
// - 401/403, and the 400 the service uses for malformed keys, mean the credential
//   was refused;
// - any other non-2xx keeps its status so the caller can decide whether to retry;
// - a 200 without usable text is either a blocked prompt or a malformed response.

use crate::config::ClassifierConfig;
use crate::core_modules::classifier::{InferenceBackend, InferenceRequest};
use crate::core_modules::credential::Credential;
use crate::error::InferenceError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

const API_KEY_HEADER: &str = "x-goog-api-key";

/// An `InferenceBackend` backed by the Gemini `generateContent` endpoint.
#[derive(Debug, Clone)]
pub struct GeminiBackend {
    http: reqwest::Client,
    base_url: String,
    model: String,
}

impl GeminiBackend {
    /// Builds an HTTP client whose every request is bounded by `config.request_timeout`.
    pub fn new(config: &ClassifierConfig) -> Result<Self, InferenceError> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|err| InferenceError::Transport(err.to_string()))?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
        })
    }

    pub fn endpoint(&self) -> String {
        format!("{}/v1beta/models/{}:generateContent", self.base_url, self.model)
    }
}

#[async_trait]
impl InferenceBackend for GeminiBackend {
    async fn generate(&self, credential: &Credential, request: &InferenceRequest) -> Result<String, InferenceError> {
        let body = GenerateContentRequest::from_request(request);

        let response = self
            .http
            .post(self.endpoint())
            .header(API_KEY_HEADER, credential.expose())
            .json(&body)
            .send()
            .await
            .map_err(map_transport)?;

        let status = response.status();
        let text = response.text().await.map_err(map_transport)?;
        debug!(model = %self.model, status = status.as_u16(), bytes = text.len(), "generateContent responded");

        if !status.is_success() {
            return Err(classify_http_error(status.as_u16(), &text));
        }

        let parsed: GenerateContentResponse =
            serde_json::from_str(&text).map_err(|err| InferenceError::MalformedResponse(err.to_string()))?;
        extract_text(parsed)
    }
}

fn map_transport(err: reqwest::Error) -> InferenceError {
    if err.is_timeout() {
        InferenceError::Timeout
    } else {
        InferenceError::Transport(err.to_string())
    }
}

// --- Wire format ---

#[derive(Debug, Serialize)]
struct GenerateContentRequest<'a> {
    contents: Vec<RequestContent<'a>>,
}

#[derive(Debug, Serialize)]
struct RequestContent<'a> {
    role: &'static str,
    parts: Vec<RequestPart<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RequestPart<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    inline_data: Option<InlineData<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct InlineData<'a> {
    mime_type: &'a str,
    data: &'a str,
}

impl<'a> GenerateContentRequest<'a> {
    fn from_request(request: &'a InferenceRequest) -> Self {
        Self {
            contents: vec![RequestContent {
                role: "user",
                parts: vec![
                    RequestPart {
                        text: Some(&request.prompt),
                        inline_data: None,
                    },
                    RequestPart {
                        text: None,
                        inline_data: Some(InlineData {
                            mime_type: &request.mime_type,
                            data: &request.image_base64,
                        }),
                    },
                ],
            }],
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<CandidateContent>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: Option<String>,
    status: Option<String>,
    #[serde(default)]
    details: Vec<serde_json::Value>,
}

/// Joins the text parts of the first candidate.
fn extract_text(response: GenerateContentResponse) -> Result<String, InferenceError> {
    let Some(candidate) = response.candidates.into_iter().next() else {
        return Err(match response.prompt_feedback.and_then(|f| f.block_reason) {
            Some(reason) => InferenceError::Blocked(reason),
            None => InferenceError::MalformedResponse("response contained no candidates".to_string()),
        });
    };

    let text: String = candidate
        .content
        .map(|content| content.parts.into_iter().filter_map(|part| part.text).collect())
        .unwrap_or_default();

    if !text.is_empty() {
        return Ok(text);
    }
    match candidate.finish_reason.as_deref() {
        Some(reason @ ("SAFETY" | "RECITATION" | "BLOCKLIST" | "PROHIBITED_CONTENT" | "SPII")) => {
            Err(InferenceError::Blocked(reason.to_string()))
        }
        _ => Err(InferenceError::MalformedResponse("candidate contained no text".to_string())),
    }
}

/// Maps a non-2xx response to the error taxonomy.
fn classify_http_error(status: u16, body: &str) -> InferenceError {
    let parsed = serde_json::from_str::<ErrorEnvelope>(body).ok().map(|envelope| envelope.error);
    let message = parsed
        .as_ref()
        .and_then(|error| error.message.clone())
        .unwrap_or_else(|| body.trim().chars().take(200).collect());

    let key_invalid = parsed.as_ref().is_some_and(|error| {
        error.details.iter().any(|detail| detail.get("reason").and_then(|r| r.as_str()) == Some("API_KEY_INVALID"))
            || error.status.as_deref() == Some("UNAUTHENTICATED")
            || error.status.as_deref() == Some("PERMISSION_DENIED")
    });

    if status == 401 || status == 403 || (status == 400 && key_invalid) {
        InferenceError::CredentialRejected(message)
    } else {
        InferenceError::Rejected { status, message }
    }
}
