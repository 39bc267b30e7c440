//! JSON-over-HTTP collaborator clients.

use std::{sync::Arc, time::Duration};

use futures::future::BoxFuture;
use reqwest::Client;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use tracing::debug;

use crate::{
    collaborators::{
        AnswerJudge, BoardGenerator, ClueResolution, ClueResolver, CollaboratorResult, Judgement,
        SpeechSynthesizer,
    },
    error::CollaboratorError,
    state::game::{AvailableCategory, Board, PreferenceMessage},
};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(20);
/// Board generation asks a model for a whole board and takes longer.
const GENERATION_TIMEOUT: Duration = Duration::from_secs(120);

/// Minimal POST-JSON client bound to one endpoint.
#[derive(Clone)]
struct JsonEndpoint {
    client: Client,
    url: Arc<str>,
    service: &'static str,
    timeout: Duration,
}

impl JsonEndpoint {
    fn new(service: &'static str, url: &str, timeout: Duration) -> Self {
        Self {
            client: Client::new(),
            url: Arc::<str>::from(url.trim_end_matches('/')),
            service,
            timeout,
        }
    }

    async fn post<Req, Resp>(&self, body: &Req) -> CollaboratorResult<Resp>
    where
        Req: Serialize + ?Sized,
        Resp: DeserializeOwned,
    {
        let service = self.service;
        let response = self
            .client
            .post(self.url.as_ref())
            .timeout(self.timeout)
            .json(body)
            .send()
            .await
            .map_err(|source| CollaboratorError::Transport {
                service,
                message: source.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(CollaboratorError::Status {
                service,
                status: status.as_u16(),
            });
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|source| CollaboratorError::Transport {
                service,
                message: source.to_string(),
            })?;
        debug!(service, bytes = bytes.len(), "collaborator responded");

        serde_json::from_slice(&bytes).map_err(|source| CollaboratorError::ProtocolParse {
            service,
            message: source.to_string(),
        })
    }
}

#[derive(Serialize)]
struct JudgeRequest<'a> {
    expected: &'a str,
    submitted: &'a str,
}

/// Answer judge reached over HTTP.
#[derive(Clone)]
pub struct HttpJudge {
    endpoint: JsonEndpoint,
}

impl HttpJudge {
    /// Client for the judge at `url`.
    pub fn new(url: &str) -> Self {
        Self {
            endpoint: JsonEndpoint::new("answer judge", url, REQUEST_TIMEOUT),
        }
    }
}

impl AnswerJudge for HttpJudge {
    fn evaluate(
        &self,
        expected: &str,
        submitted: &str,
    ) -> BoxFuture<'static, CollaboratorResult<Judgement>> {
        let endpoint = self.endpoint.clone();
        let expected = expected.to_string();
        let submitted = submitted.to_string();
        Box::pin(async move {
            endpoint
                .post(&JudgeRequest {
                    expected: &expected,
                    submitted: &submitted,
                })
                .await
        })
    }
}

#[derive(Serialize)]
struct ResolveRequest<'a> {
    message: &'a str,
    available: &'a [AvailableCategory],
}

#[derive(Deserialize)]
struct ResolveResponse {
    valid: bool,
    #[serde(default)]
    category: Option<String>,
    #[serde(default)]
    value: Option<i64>,
    #[serde(default)]
    error: Option<String>,
}

impl ResolveResponse {
    fn into_resolution(self, service: &'static str) -> CollaboratorResult<ClueResolution> {
        if !self.valid {
            return Ok(ClueResolution::Invalid {
                error: self
                    .error
                    .unwrap_or_else(|| "selection not understood".into()),
            });
        }
        match (self.category, self.value) {
            (Some(category), Some(value)) => Ok(ClueResolution::Valid { category, value }),
            _ => Err(CollaboratorError::ProtocolParse {
                service,
                message: "valid resolution without category and value".into(),
            }),
        }
    }
}

/// Clue resolver reached over HTTP.
#[derive(Clone)]
pub struct HttpClueResolver {
    endpoint: JsonEndpoint,
}

impl HttpClueResolver {
    /// Client for the resolver at `url`.
    pub fn new(url: &str) -> Self {
        Self {
            endpoint: JsonEndpoint::new("clue resolver", url, REQUEST_TIMEOUT),
        }
    }
}

impl ClueResolver for HttpClueResolver {
    fn resolve(
        &self,
        message: &str,
        available: &[AvailableCategory],
    ) -> BoxFuture<'static, CollaboratorResult<ClueResolution>> {
        let endpoint = self.endpoint.clone();
        let message = message.to_string();
        let available = available.to_vec();
        Box::pin(async move {
            let response: ResolveResponse = endpoint
                .post(&ResolveRequest {
                    message: &message,
                    available: &available,
                })
                .await?;
            response.into_resolution(endpoint.service)
        })
    }
}

#[derive(Serialize)]
struct SpeechRequest<'a> {
    text: &'a str,
    voice: &'a str,
}

#[derive(Deserialize)]
struct SpeechResponse {
    url: String,
}

/// Speech synthesizer reached over HTTP.
#[derive(Clone)]
pub struct HttpSpeech {
    endpoint: JsonEndpoint,
}

impl HttpSpeech {
    /// Client for the synthesizer at `url`.
    pub fn new(url: &str) -> Self {
        Self {
            endpoint: JsonEndpoint::new("speech synthesizer", url, REQUEST_TIMEOUT),
        }
    }
}

impl SpeechSynthesizer for HttpSpeech {
    fn synthesize(&self, text: &str, voice: &str) -> BoxFuture<'static, CollaboratorResult<String>> {
        let endpoint = self.endpoint.clone();
        let text = text.to_string();
        let voice = voice.to_string();
        Box::pin(async move {
            let response: SpeechResponse = endpoint
                .post(&SpeechRequest {
                    text: &text,
                    voice: &voice,
                })
                .await?;
            Ok(response.url)
        })
    }
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    preferences: &'a [PreferenceMessage],
}

/// Board generator reached over HTTP.
#[derive(Clone)]
pub struct HttpBoardGenerator {
    endpoint: JsonEndpoint,
}

impl HttpBoardGenerator {
    /// Client for the generator at `url`.
    pub fn new(url: &str) -> Self {
        Self {
            endpoint: JsonEndpoint::new("board generator", url, GENERATION_TIMEOUT),
        }
    }
}

impl BoardGenerator for HttpBoardGenerator {
    fn generate(
        &self,
        preferences: &[PreferenceMessage],
    ) -> BoxFuture<'static, CollaboratorResult<Board>> {
        let endpoint = self.endpoint.clone();
        let preferences = preferences.to_vec();
        Box::pin(async move {
            endpoint
                .post(&GenerateRequest {
                    preferences: &preferences,
                })
                .await
        })
    }
}
