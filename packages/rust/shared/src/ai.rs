//! The AI Capability: a structured-generation service the pipeline
//! consumes but does not implement.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::AiError;

/// Which pipeline step issued a request. Collaborators may use it for
/// routing or telemetry; the prompt itself is opaque to them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AiTask {
    Research,
    Generation,
    Scoring,
    Clustering,
}

impl AiTask {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Research => "research",
            Self::Generation => "generation",
            Self::Scoring => "scoring",
            Self::Clustering => "clustering",
        }
    }
}

/// One structured-generation request.
#[derive(Debug, Clone, PartialEq)]
pub struct AiRequest {
    pub task: AiTask,
    pub prompt: String,
    /// JSON schema the response must conform to.
    pub schema: Option<Value>,
    pub temperature: f32,
    /// Ground the answer in live web search results.
    pub grounded: bool,
}

impl AiRequest {
    pub fn new(task: AiTask, prompt: impl Into<String>) -> Self {
        Self {
            task,
            prompt: prompt.into(),
            schema: None,
            temperature: 0.3,
            grounded: false,
        }
    }

    pub fn with_schema(mut self, schema: Value) -> Self {
        self.schema = Some(schema);
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn grounded(mut self) -> Self {
        self.grounded = true;
        self
    }
}

/// Structured-generation service.
///
/// Implementations own their timeout. They return the parsed JSON body on
/// success; decoding it into a typed shape is the caller's job.
#[async_trait]
pub trait AiCapability: Send + Sync {
    async fn generate(&self, request: AiRequest) -> Result<Value, AiError>;
}
