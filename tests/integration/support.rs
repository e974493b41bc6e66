//! Test Support
//!
//! Scripted `CompletionClient` and file-state builders for pipeline tests.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use build_verify::models::{ActiveBuild, PlanSettings};
use build_verify::services::plan::{ActiveBuildStreamFileState, BuildFileOutcome, ModelClients};
use build_verify_core::UnifiedStreamEvent;
use build_verify_llm::{ChatRequest, CompletionClient, CompletionStream, LlmError, LlmResult};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

pub const ENV_VAR: &str = "OPENAI_API_KEY";

/// What the scripted client does for one call
pub enum Script {
    /// Open a stream that yields these items and then ends
    Events(Vec<LlmResult<UnifiedStreamEvent>>),
    /// Fail the call
    Fail(LlmError),
    /// Open a stream that never yields anything
    Hang,
}

/// Completion client that replays scripted responses and records requests.
#[derive(Default)]
pub struct ScriptedClient {
    scripts: Mutex<VecDeque<Script>>,
    requests: Mutex<Vec<ChatRequest>>,
    open_senders: Mutex<Vec<mpsc::Sender<LlmResult<UnifiedStreamEvent>>>>,
}

impl ScriptedClient {
    pub fn new(scripts: Vec<Script>) -> Arc<Self> {
        Arc::new(Self {
            scripts: Mutex::new(scripts.into()),
            ..Default::default()
        })
    }

    pub fn requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl CompletionClient for ScriptedClient {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn create_stream(
        &self,
        request: &ChatRequest,
        _cancel: &CancellationToken,
    ) -> LlmResult<CompletionStream> {
        self.requests.lock().unwrap().push(request.clone());
        let script = self.scripts.lock().unwrap().pop_front();
        match script {
            Some(Script::Events(events)) => Ok(CompletionStream::from_events(events)),
            Some(Script::Fail(err)) => Err(err),
            Some(Script::Hang) => {
                let (tx, stream) = CompletionStream::channel(1);
                self.open_senders.lock().unwrap().push(tx);
                Ok(stream)
            }
            None => Err(LlmError::Other {
                message: "no scripted response left".to_string(),
            }),
        }
    }
}

/// Stream items for a single `verifyOutput` call with `args`.
pub fn verify_call(args: &str) -> Vec<LlmResult<UnifiedStreamEvent>> {
    vec![
        Ok(UnifiedStreamEvent::ToolStart {
            tool_id: "call_0".to_string(),
            tool_name: "verifyOutput".to_string(),
            arguments: None,
        }),
        Ok(UnifiedStreamEvent::ToolDelta {
            tool_id: "call_0".to_string(),
            delta: args.to_string(),
        }),
        Ok(UnifiedStreamEvent::ToolComplete {
            tool_id: "call_0".to_string(),
            tool_name: "verifyOutput".to_string(),
            arguments: args.to_string(),
        }),
        Ok(UnifiedStreamEvent::Usage {
            input_tokens: 812,
            output_tokens: 24,
            cache_read_tokens: None,
        }),
        Ok(UnifiedStreamEvent::Complete {
            stop_reason: Some("tool_calls".to_string()),
        }),
    ]
}

pub fn clients_with(client: Arc<ScriptedClient>) -> ModelClients {
    let client: Arc<dyn CompletionClient> = client;
    Arc::new(HashMap::from([(ENV_VAR.to_string(), client)]))
}

/// `main.go` on plan `p1`/`main` with a complete build result.
pub fn main_go_state(
    clients: ModelClients,
) -> (ActiveBuildStreamFileState, mpsc::Receiver<BuildFileOutcome>) {
    let (tx, rx) = mpsc::channel(4);
    let state = ActiveBuildStreamFileState::new(
        "main.go",
        "p1",
        "main",
        clients,
        Arc::new(PlanSettings::default()),
        tx,
    )
    .with_active_build(
        ActiveBuild::new("reply-1", "main.go")
            .with_description("Call run() from main")
            .with_updated_state("package main\n\nfunc main() {\n\trun()\n}\n"),
    )
    .with_pre_build_state("package main\n\nfunc main() {\n}\n");
    (state, rx)
}
