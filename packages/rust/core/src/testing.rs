//! Scripted AI Capability for tests.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::Value;

use openkeywords_shared::{AiCapability, AiError, AiRequest, AiTask};

type Responder = Arc<dyn Fn(&AiRequest) -> Result<Value, AiError> + Send + Sync>;

/// Answers requests per [`AiTask`]: queued responses first, then the task's
/// responder, otherwise `Unknown`. Records every request.
#[derive(Default)]
pub struct ScriptedAi {
    queued: Mutex<HashMap<AiTask, VecDeque<Result<Value, AiError>>>>,
    responders: Mutex<HashMap<AiTask, Responder>>,
    requests: Mutex<Vec<AiRequest>>,
}

impl ScriptedAi {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Queue a one-shot response for `task`.
    pub fn push(&self, task: AiTask, response: Result<Value, AiError>) {
        self.queued
            .lock()
            .unwrap()
            .entry(task)
            .or_default()
            .push_back(response);
    }

    /// Answer every further `task` request with `f`.
    pub fn respond<F>(&self, task: AiTask, f: F)
    where
        F: Fn(&AiRequest) -> Result<Value, AiError> + Send + Sync + 'static,
    {
        self.responders.lock().unwrap().insert(task, Arc::new(f));
    }

    pub fn calls(&self, task: AiTask) -> usize {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.task == task)
            .count()
    }

    pub fn total_calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn requests(&self, task: AiTask) -> Vec<AiRequest> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.task == task)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl AiCapability for ScriptedAi {
    async fn generate(&self, request: AiRequest) -> Result<Value, AiError> {
        self.requests.lock().unwrap().push(request.clone());

        let queued = self
            .queued
            .lock()
            .unwrap()
            .get_mut(&request.task)
            .and_then(VecDeque::pop_front);
        if let Some(response) = queued {
            return response;
        }

        let responder = self.responders.lock().unwrap().get(&request.task).cloned();
        match responder {
            Some(f) => f(&request),
            None => Err(AiError::Unknown(format!(
                "no scripted response for {}",
                request.task.as_str()
            ))),
        }
    }
}

/// The JSON keyword list a scoring or clustering prompt carries.
pub fn prompt_keywords(request: &AiRequest) -> Vec<String> {
    let Some(marker) = request.prompt.find("KEYWORDS") else {
        return Vec::new();
    };
    let Some(offset) = request.prompt[marker..].find('[') else {
        return Vec::new();
    };
    let tail = &request.prompt[marker + offset..];
    serde_json::Deserializer::from_str(tail)
        .into_iter::<Vec<String>>()
        .next()
        .and_then(|r| r.ok())
        .unwrap_or_default()
}
