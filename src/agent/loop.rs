//! Agent loop implementation
//!
//! One [`AgentSession`] triages one email. It alternates between asking the
//! model for a decision and executing the single tool the model picked,
//! until the model gives a final answer or the session fails.
//!
//! ```text
//!            ┌──────────────────────────────┐
//!            ▼                              │ tool result appended
//!   ┌─────────────────┐  invoke   ┌─────────────────┐
//!   │  AwaitingModel  │──────────>│  ExecutingTool  │
//!   └─────────────────┘           └─────────────────┘
//!        │        │
//!  answer│        │ retries exhausted, ceiling hit,
//!        ▼        ▼ memory failure, cancelled
//!     ┌──────┐ ┌────────┐
//!     │ Done │ │ Failed │
//!     └──────┘ └────────┘
//! ```

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Serialize, Serializer};
use serde_json::Value;
use tokio::sync::watch;
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::config::Config;
use crate::email::InboundEmail;
use crate::error::{ModelError, SessionFailure};
use crate::memory::{AppendOutcome, MemoryStore, Summarizer};
use crate::providers::Backoff;
use crate::session::{ConversationTurn, ToolCallRef};
use crate::tools::{ToolCategory, ToolContext, ToolExecution, ToolFailure, ToolInvocation, ToolRegistry};
use crate::utils::string::preview;

use super::model::{ModelClient, ModelDecision};

/// Where a session is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    AwaitingModel,
    ExecutingTool,
    Done,
    Failed,
}

impl SessionState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Done | SessionState::Failed)
    }
}

/// Limits and timeouts for one session.
#[derive(Debug, Clone)]
pub struct SessionSettings {
    /// Maximum tool executions per session
    pub step_ceiling: u32,
    pub model_timeout: Duration,
    /// Default tool timeout when a tool does not set its own
    pub tool_timeout: Duration,
    /// Attempts per model call, including the first
    pub model_max_attempts: u32,
    pub backoff: Backoff,
    pub token_budget: usize,
    /// Consecutive deferred summarizations tolerated before failing
    pub summary_max_failures: u32,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self::from(&Config::default())
    }
}

impl From<&Config> for SessionSettings {
    fn from(config: &Config) -> Self {
        let defaults = &config.agents.defaults;
        Self {
            step_ceiling: defaults.max_tool_iterations,
            model_timeout: Duration::from_secs(defaults.model_timeout_secs),
            tool_timeout: Duration::from_secs(defaults.tool_timeout_secs),
            model_max_attempts: defaults.model_max_attempts.max(1),
            backoff: Backoff::new(defaults.retry_base_delay_ms, defaults.retry_max_delay_ms),
            token_budget: config.memory.token_budget,
            summary_max_failures: config.memory.summary_max_failures,
        }
    }
}

/// One executed tool invocation, in execution order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolCallRecord {
    /// 1-based step number
    pub step: u32,
    pub id: String,
    pub name: String,
    pub arguments: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<ToolCategory>,
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<ToolFailure>,
    pub duration_ms: u64,
}

/// Final outcome of a session.
#[derive(Debug, Clone, Serialize)]
pub struct SessionReport {
    pub session_id: String,
    pub email_id: String,
    pub state: SessionState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    #[serde(serialize_with = "failure_text", skip_serializing_if = "Option::is_none")]
    pub failure: Option<SessionFailure>,
    /// Tool executions performed
    pub steps: u32,
    pub tool_calls: Vec<ToolCallRecord>,
}

fn failure_text<S: Serializer>(failure: &Option<SessionFailure>, s: S) -> Result<S::Ok, S::Error> {
    match failure {
        Some(f) => s.serialize_str(&f.to_string()),
        None => s.serialize_none(),
    }
}

impl SessionReport {
    pub fn is_done(&self) -> bool {
        self.state == SessionState::Done
    }

    /// Human-readable failure cause.
    pub fn detail(&self) -> Option<String> {
        self.failure.as_ref().map(ToString::to_string)
    }

    /// Names of executed tools, in order.
    pub fn tool_names(&self) -> Vec<&str> {
        self.tool_calls.iter().map(|r| r.name.as_str()).collect()
    }
}

/// Summarizer that bounds each call with the model timeout.
struct BoundedSummarizer {
    model: Arc<dyn ModelClient>,
    timeout: Duration,
}

#[async_trait]
impl Summarizer for BoundedSummarizer {
    async fn summarize(&self, text: &str) -> Result<String, ModelError> {
        match tokio::time::timeout(self.timeout, self.model.summarize(text)).await {
            Ok(result) => result,
            Err(_) => Err(ModelError::Timeout(self.timeout.as_millis() as u64)),
        }
    }
}

/// Resolves once `cancel` reads true. A dropped sender never cancels.
async fn wait_cancelled(cancel: &mut watch::Receiver<bool>) {
    loop {
        if *cancel.borrow_and_update() {
            return;
        }
        if cancel.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

/// Request-scoped triage session.
pub struct AgentSession {
    id: String,
    email: Arc<InboundEmail>,
    memory: MemoryStore,
    registry: Arc<ToolRegistry>,
    model: Arc<dyn ModelClient>,
    context: ToolContext,
    settings: SessionSettings,
    system_prompt: String,
    state: SessionState,
    steps: u32,
    records: Vec<ToolCallRecord>,
}

impl AgentSession {
    pub fn new(
        email: InboundEmail,
        registry: Arc<ToolRegistry>,
        model: Arc<dyn ModelClient>,
        settings: SessionSettings,
        system_prompt: impl Into<String>,
    ) -> Self {
        let email = Arc::new(email);
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            memory: MemoryStore::new(settings.token_budget),
            context: ToolContext::new(Arc::clone(&email)),
            email,
            registry,
            model,
            settings,
            system_prompt: system_prompt.into(),
            state: SessionState::AwaitingModel,
            steps: 0,
            records: Vec::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn memory(&self) -> &MemoryStore {
        &self.memory
    }

    pub fn context(&self) -> &ToolContext {
        &self.context
    }

    /// Run to completion without external cancellation.
    pub async fn run(self) -> SessionReport {
        let (_cancel_tx, cancel_rx) = watch::channel(false);
        self.run_until_cancelled(cancel_rx).await
    }

    /// Run until a terminal state or until `cancel` becomes true.
    ///
    /// Cancellation aborts an in-flight model call at once. A tool that has
    /// already started runs to completion, then no further calls are made.
    pub async fn run_until_cancelled(mut self, mut cancel: watch::Receiver<bool>) -> SessionReport {
        let span = info_span!("session", session_id = %self.id, email_id = %self.email.id);
        async move {
            info!(tools = self.registry.len(), budget = self.memory.budget(), "Session started");
            let outcome = self.drive(&mut cancel).await;
            self.into_report(outcome)
        }
        .instrument(span)
        .await
    }

    async fn drive(&mut self, cancel: &mut watch::Receiver<bool>) -> Result<String, SessionFailure> {
        self.remember(ConversationTurn::user(self.email.framed_input()), cancel)
            .await?;

        loop {
            self.state = SessionState::AwaitingModel;
            let decision = self.infer_with_retry(cancel).await?;

            let (thought, invocation) = match decision {
                ModelDecision::FinalAnswer(answer) => {
                    if let Err(e) = self.remember(ConversationTurn::assistant(&answer), cancel).await {
                        warn!(error = %e, "Could not record final answer in memory");
                    }
                    return Ok(answer);
                }
                ModelDecision::Invoke { thought, invocation } => (thought, invocation),
            };

            if self.steps >= self.settings.step_ceiling {
                warn!(
                    tool = %invocation.name,
                    ceiling = self.settings.step_ceiling,
                    "Step ceiling reached"
                );
                return Err(SessionFailure::StepCeilingExceeded {
                    ceiling: self.settings.step_ceiling,
                });
            }
            if *cancel.borrow() {
                return Err(SessionFailure::Cancelled);
            }

            self.state = SessionState::ExecutingTool;
            self.steps += 1;
            let call = ToolCallRef {
                id: invocation.id.clone(),
                name: invocation.name.clone(),
                arguments: invocation.arguments.clone(),
            };
            self.remember(ConversationTurn::tool_request(thought, call.clone()), cancel)
                .await?;

            let execution = self.execute(&invocation).await;
            let terminal_timeout =
                execution.timed_out && execution.category.is_some_and(|c| c.is_terminal());

            self.remember(ConversationTurn::tool_result(call, execution.result.render()), cancel)
                .await?;

            if terminal_timeout {
                return Err(SessionFailure::TerminalToolTimeout {
                    tool: invocation.name.clone(),
                    timeout_ms: self.tool_timeout_for(&invocation.name).as_millis() as u64,
                });
            }
        }
    }

    fn tool_timeout_for(&self, name: &str) -> Duration {
        self.registry
            .resolve(name)
            .ok()
            .and_then(|t| t.timeout())
            .unwrap_or(self.settings.tool_timeout)
    }

    /// Execute one invocation and record it. Not interrupted by cancellation.
    async fn execute(&mut self, invocation: &ToolInvocation) -> ToolExecution {
        let step = self.steps;
        debug!(step, tool = %invocation.name, id = %invocation.id, "Executing tool");
        let execution = self
            .registry
            .execute(invocation, &self.context, self.settings.tool_timeout)
            .await;

        match execution.result.failure() {
            Some(failure) => warn!(
                step,
                tool = %invocation.name,
                kind = %failure.kind,
                error = %failure.message,
                "Tool returned failure"
            ),
            None => debug!(step, tool = %invocation.name, duration_ms = execution.duration_ms, "Tool succeeded"),
        }

        self.records.push(ToolCallRecord {
            step,
            id: invocation.id.clone(),
            name: invocation.name.clone(),
            arguments: invocation.arguments.clone(),
            category: execution.category,
            ok: execution.result.is_success(),
            failure: execution.result.failure().cloned(),
            duration_ms: execution.duration_ms,
        });
        execution
    }

    /// Ask the model for the next decision, retrying retryable failures with
    /// backoff up to the attempt budget.
    async fn infer_with_retry(
        &self,
        cancel: &mut watch::Receiver<bool>,
    ) -> Result<ModelDecision, SessionFailure> {
        let tools = self.registry.definitions();
        let attempts = self.settings.model_max_attempts.max(1);
        let mut last_error = None;

        for attempt in 0..attempts {
            if attempt > 0 {
                tokio::select! {
                    biased;
                    _ = wait_cancelled(cancel) => return Err(SessionFailure::Cancelled),
                    _ = self.settings.backoff.sleep(attempt - 1) => {}
                }
            }

            let call = tokio::time::timeout(
                self.settings.model_timeout,
                self.model.infer(&self.system_prompt, self.memory.snapshot(), &tools),
            );
            let outcome = tokio::select! {
                biased;
                _ = wait_cancelled(cancel) => return Err(SessionFailure::Cancelled),
                outcome = call => outcome,
            };

            let err = match outcome {
                Ok(Ok(decision)) => return Ok(decision),
                Ok(Err(e)) => e,
                Err(_) => ModelError::Timeout(self.settings.model_timeout.as_millis() as u64),
            };
            warn!(attempt = attempt + 1, max_attempts = attempts, error = %err, "Model call failed");

            if !err.is_retryable() {
                return Err(SessionFailure::ModelUnavailable {
                    attempts: attempt + 1,
                    message: err.to_string(),
                });
            }
            last_error = Some(err);
        }

        Err(SessionFailure::ModelUnavailable {
            attempts,
            message: last_error.map(|e| e.to_string()).unwrap_or_default(),
        })
    }

    /// Append a turn to memory, mapping unrecoverable memory states to
    /// session failures.
    async fn remember(
        &mut self,
        turn: ConversationTurn,
        cancel: &mut watch::Receiver<bool>,
    ) -> Result<(), SessionFailure> {
        let summarizer = BoundedSummarizer {
            model: Arc::clone(&self.model),
            timeout: self.settings.model_timeout,
        };
        let appended = tokio::select! {
            biased;
            _ = wait_cancelled(cancel) => return Err(SessionFailure::Cancelled),
            appended = self.memory.append(turn, &summarizer) => appended,
        };

        match appended {
            Ok(AppendOutcome::SummaryDeferred { failures, message })
                if failures > self.settings.summary_max_failures =>
            {
                Err(SessionFailure::SummarizationExhausted { failures, message })
            }
            Ok(_) => Ok(()),
            Err(e) => Err(SessionFailure::MemoryOverBudget {
                message: e.to_string(),
            }),
        }
    }

    fn into_report(mut self, outcome: Result<String, SessionFailure>) -> SessionReport {
        let (output, failure) = match outcome {
            Ok(answer) => {
                self.state = SessionState::Done;
                info!(steps = self.steps, answer = %preview(&answer, 120), "Session done");
                (Some(answer), None)
            }
            Err(failure) => {
                self.state = SessionState::Failed;
                error!(steps = self.steps, cause = %failure, "Session failed");
                (None, Some(failure))
            }
        };

        SessionReport {
            session_id: self.id,
            email_id: self.email.id.clone(),
            state: self.state,
            output,
            failure,
            steps: self.steps,
            tool_calls: self.records,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{MemorySnapshot, MIN_TOKEN_BUDGET};
    use crate::providers::ToolDefinition;
    use crate::tools::{Tool, ToolFailureKind};
    use serde_json::json;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    enum Step {
        Answer(&'static str),
        Call(&'static str, Value),
        Fail(ModelError),
        Hang,
    }

    /// Model that replays a script; an exhausted script answers "done".
    struct Scripted {
        steps: Mutex<VecDeque<Step>>,
        infer_calls: AtomicUsize,
        /// Reply to summarization requests; `None` fails them
        summary: Option<String>,
    }

    impl Scripted {
        fn new(steps: Vec<Step>) -> Arc<Self> {
            Self::summarizing(steps, Some("summary".into()))
        }

        fn summarizing(steps: Vec<Step>, summary: Option<String>) -> Arc<Self> {
            Arc::new(Self {
                steps: Mutex::new(steps.into()),
                infer_calls: AtomicUsize::new(0),
                summary,
            })
        }
    }

    #[async_trait]
    impl ModelClient for Scripted {
        async fn infer(
            &self,
            _system: &str,
            _memory: MemorySnapshot<'_>,
            _tools: &[ToolDefinition],
        ) -> Result<ModelDecision, ModelError> {
            let n = self.infer_calls.fetch_add(1, Ordering::SeqCst);
            let step = self.steps.lock().unwrap().pop_front();
            match step {
                None => Ok(ModelDecision::FinalAnswer("done".into())),
                Some(Step::Answer(text)) => Ok(ModelDecision::FinalAnswer(text.into())),
                Some(Step::Call(name, args)) => Ok(ModelDecision::Invoke {
                    thought: String::new(),
                    invocation: ToolInvocation::new(format!("call_{}", n), name, args),
                }),
                Some(Step::Fail(e)) => Err(e),
                Some(Step::Hang) => std::future::pending().await,
            }
        }

        async fn complete(&self, _system: &str, _prompt: &str) -> Result<String, ModelError> {
            self.summary
                .clone()
                .ok_or_else(|| ModelError::unavailable("summarizer down"))
        }
    }

    struct Ping {
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Tool for Ping {
        fn name(&self) -> &str {
            "Ping"
        }
        fn description(&self) -> &str {
            "ping"
        }
        fn parameters(&self) -> Value {
            json!({"type": "object", "properties": {}})
        }
        fn category(&self) -> ToolCategory {
            ToolCategory::Research
        }
        async fn execute(&self, _args: Value, _ctx: &ToolContext) -> Result<Value, ToolFailure> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(json!({"pong": true}))
        }
    }

    /// Research tool whose result alone overflows a 64-token budget.
    struct Bulky;

    #[async_trait]
    impl Tool for Bulky {
        fn name(&self) -> &str {
            "Bulky"
        }
        fn description(&self) -> &str {
            "bulky"
        }
        fn parameters(&self) -> Value {
            json!({"type": "object", "properties": {}})
        }
        fn category(&self) -> ToolCategory {
            ToolCategory::Research
        }
        async fn execute(&self, _args: Value, _ctx: &ToolContext) -> Result<Value, ToolFailure> {
            Ok(json!({"profile": "lorem ipsum ".repeat(40)}))
        }
    }

    /// Send tool that never finishes within the session's tool timeout.
    struct StuckSend;

    #[async_trait]
    impl Tool for StuckSend {
        fn name(&self) -> &str {
            "ReplyEmail"
        }
        fn description(&self) -> &str {
            "send"
        }
        fn parameters(&self) -> Value {
            json!({"type": "object", "properties": {}})
        }
        fn category(&self) -> ToolCategory {
            ToolCategory::Send
        }
        async fn execute(&self, _args: Value, _ctx: &ToolContext) -> Result<Value, ToolFailure> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(json!({"sent": true}))
        }
    }

    fn registry() -> (Arc<ToolRegistry>, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut registry = ToolRegistry::new();
        registry
            .register(Box::new(Ping {
                calls: Arc::clone(&calls),
            }))
            .unwrap();
        registry.register(Box::new(Bulky)).unwrap();
        registry.register(Box::new(StuckSend)).unwrap();
        (Arc::new(registry), calls)
    }

    fn settings() -> SessionSettings {
        SessionSettings {
            step_ceiling: 3,
            model_timeout: Duration::from_millis(200),
            tool_timeout: Duration::from_secs(1),
            model_max_attempts: 2,
            backoff: Backoff::new(1, 2),
            token_budget: 1000,
            summary_max_failures: 2,
        }
    }

    fn session(model: Arc<Scripted>, registry: Arc<ToolRegistry>) -> AgentSession {
        session_with(model, registry, settings())
    }

    fn session_with(
        model: Arc<Scripted>,
        registry: Arc<ToolRegistry>,
        settings: SessionSettings,
    ) -> AgentSession {
        AgentSession::new(
            InboundEmail::from_text("Hi, I'd like info about your pricing"),
            registry,
            model,
            settings,
            "system",
        )
    }

    fn tight_memory() -> SessionSettings {
        SessionSettings {
            token_budget: MIN_TOKEN_BUDGET,
            summary_max_failures: 1,
            ..settings()
        }
    }

    #[tokio::test]
    async fn test_final_answer_without_tools() {
        let (registry, _) = registry();
        let report = session(Scripted::new(vec![Step::Answer("Filed as spam")]), registry)
            .run()
            .await;
        assert!(report.is_done());
        assert_eq!(report.output.as_deref(), Some("Filed as spam"));
        assert_eq!(report.steps, 0);
    }

    #[tokio::test]
    async fn test_tool_then_answer() {
        let (registry, calls) = registry();
        let model = Scripted::new(vec![Step::Call("Ping", json!({})), Step::Answer("done")]);
        let report = session(model, registry).run().await;
        assert!(report.is_done());
        assert_eq!(report.tool_names(), vec!["Ping"]);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(report.tool_calls[0].step, 1);
        assert!(report.tool_calls[0].ok);
    }

    #[tokio::test]
    async fn test_unknown_tool_does_not_fail_session() {
        let (registry, _) = registry();
        let model = Scripted::new(vec![Step::Call("SendSMS", json!({})), Step::Answer("done")]);
        let report = session(model, registry).run().await;
        assert!(report.is_done());
        assert_eq!(
            report.tool_calls[0].failure.as_ref().map(|f| f.kind),
            Some(ToolFailureKind::UnknownTool)
        );
    }

    #[tokio::test]
    async fn test_step_ceiling() {
        let (registry, calls) = registry();
        let steps = (0..10).map(|_| Step::Call("Ping", json!({}))).collect();
        let report = session(Scripted::new(steps), registry).run().await;
        assert_eq!(report.state, SessionState::Failed);
        assert_eq!(
            report.failure,
            Some(SessionFailure::StepCeilingExceeded { ceiling: 3 })
        );
        assert_eq!(report.steps, 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retryable_model_failure_recovers() {
        let (registry, _) = registry();
        let model = Scripted::new(vec![
            Step::Fail(ModelError::MalformedResponse("garbage".into())),
            Step::Answer("recovered"),
        ]);
        let report = session(Arc::clone(&model), registry).run().await;
        assert_eq!(report.output.as_deref(), Some("recovered"));
        assert_eq!(model.infer_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_model_retries_exhausted() {
        let (registry, _) = registry();
        let model = Scripted::new(vec![
            Step::Fail(ModelError::unavailable("503")),
            Step::Fail(ModelError::unavailable("503")),
        ]);
        let report = session(model, registry).run().await;
        assert!(matches!(
            report.failure,
            Some(SessionFailure::ModelUnavailable { attempts: 2, .. })
        ));
    }

    #[tokio::test]
    async fn test_non_retryable_fails_fast() {
        let (registry, _) = registry();
        let model = Scripted::new(vec![Step::Fail(ModelError::Unavailable {
            message: "401".into(),
            retryable: false,
        })]);
        let report = session(Arc::clone(&model), registry).run().await;
        assert!(matches!(
            report.failure,
            Some(SessionFailure::ModelUnavailable { attempts: 1, .. })
        ));
        assert_eq!(model.infer_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_model_timeout_counts_as_attempt() {
        let (registry, _) = registry();
        let model = Scripted::new(vec![Step::Hang, Step::Answer("late but fine")]);
        let report = session(model, registry).run().await;
        assert_eq!(report.output.as_deref(), Some("late but fine"));
    }

    #[tokio::test]
    async fn test_cancel_aborts_in_flight_model_call() {
        let (registry, calls) = registry();
        let model = Scripted::new(vec![Step::Call("Ping", json!({})), Step::Hang]);
        let mut session = session(model, registry);
        session.settings.model_timeout = Duration::from_secs(60);

        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(session.run_until_cancelled(rx));
        tokio::time::sleep(Duration::from_millis(50)).await;
        tx.send(true).unwrap();

        let report = handle.await.unwrap();
        assert_eq!(report.failure, Some(SessionFailure::Cancelled));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_cancel_before_start_runs_nothing() {
        let (registry, calls) = registry();
        let model = Scripted::new(vec![Step::Call("Ping", json!({}))]);
        let (_tx, rx) = watch::channel(true);
        let report = session(Arc::clone(&model), registry)
            .run_until_cancelled(rx)
            .await;
        assert_eq!(report.failure, Some(SessionFailure::Cancelled));
        assert_eq!(model.infer_calls.load(Ordering::SeqCst), 0);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_summarizer_failures_exhaust_session() {
        let (registry, _) = registry();
        let steps = (0..3).map(|_| Step::Call("Bulky", json!({}))).collect();
        let report = session_with(Scripted::summarizing(steps, None), registry, tight_memory())
            .run()
            .await;
        assert_eq!(report.state, SessionState::Failed);
        match report.failure {
            Some(SessionFailure::SummarizationExhausted { failures, message }) => {
                assert_eq!(failures, 2);
                assert!(message.contains("summarizer down"), "got: {}", message);
            }
            other => panic!("expected SummarizationExhausted, got {:?}", other),
        }
        assert!(report.output.is_none());
    }

    #[tokio::test]
    async fn test_summary_larger_than_budget_fails_session() {
        let (registry, _) = registry();
        let model = Scripted::summarizing(
            vec![Step::Call("Bulky", json!({})), Step::Answer("done")],
            Some("an extremely long summary ".repeat(20)),
        );
        let report = session_with(model, registry, tight_memory()).run().await;
        assert_eq!(report.state, SessionState::Failed);
        match &report.failure {
            Some(SessionFailure::MemoryOverBudget { message }) => {
                assert!(message.contains("budget is 64"), "got: {}", message);
            }
            other => panic!("expected MemoryOverBudget, got {:?}", other),
        }
        assert_eq!(report.tool_names(), vec!["Bulky"]);
    }

    #[tokio::test]
    async fn test_send_timeout_fails_session_without_retry() {
        let (registry, _) = registry();
        let model = Scripted::new(vec![
            Step::Call("ReplyEmail", json!({})),
            Step::Call("ReplyEmail", json!({})),
        ]);
        let mut session = session(Arc::clone(&model), registry);
        session.settings.tool_timeout = Duration::from_millis(50);

        let report = session.run().await;
        assert_eq!(report.state, SessionState::Failed);
        assert_eq!(
            report.failure,
            Some(SessionFailure::TerminalToolTimeout {
                tool: "ReplyEmail".into(),
                timeout_ms: 50,
            })
        );
        assert_eq!(
            report.detail().as_deref(),
            Some("tool 'ReplyEmail' timed out after 50ms and its outcome is unknown")
        );
        assert_eq!(report.steps, 1);
        assert_eq!(model.infer_calls.load(Ordering::SeqCst), 1);
        assert_eq!(
            report.tool_calls[0].failure.as_ref().map(|f| f.kind),
            Some(ToolFailureKind::Timeout)
        );
    }

    #[test]
    fn test_report_serializes_failure_as_text() {
        let report = SessionReport {
            session_id: "s".into(),
            email_id: "e".into(),
            state: SessionState::Failed,
            output: None,
            failure: Some(SessionFailure::Cancelled),
            steps: 0,
            tool_calls: vec![],
        };
        let value = serde_json::to_value(&report).unwrap();
        assert_eq!(value["state"], "failed");
        assert_eq!(value["failure"], "session cancelled");
        assert!(value.get("output").is_none());
    }
}
