//! End-to-end triage scenarios against scripted model clients.
//!
//! Each test wires the real tool registry (the six triage tools over an
//! in-memory mailbox and notification bus) to a model client that replays a
//! fixed sequence of decisions, then checks the session report and the side
//! effects left in the mailbox and on the bus.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde_json::{json, Value};

use inboxpilot::agent::model::SUMMARIZER_SYSTEM_PROMPT;
use inboxpilot::agent::{ModelClient, ModelDecision, SessionState, TriageAgent};
use inboxpilot::bus::NotificationBus;
use inboxpilot::config::Config;
use inboxpilot::email::InboundEmail;
use inboxpilot::error::{ModelError, SessionFailure};
use inboxpilot::mailbox::InMemoryMailbox;
use inboxpilot::memory::{AppendOutcome, MemorySnapshot, MemoryStore, Summarizer};
use inboxpilot::providers::ToolDefinition;
use inboxpilot::session::{ConversationTurn, ToolCallRef};
use inboxpilot::tools::research::{LookupError, ProspectProfile, ProspectQuery, ResearchBackend};
use inboxpilot::tools::{
    build_registry, Tool, ToolCategory, ToolContext, ToolDeps, ToolFailure, ToolFailureKind,
    ToolInvocation, ToolRegistry,
};

// ============================================================================
// Scripted model
// ============================================================================

fn call(name: &str, args: Value) -> ModelDecision {
    ModelDecision::Invoke {
        thought: String::new(),
        invocation: ToolInvocation::new(format!("call_{}", name), name, args),
    }
}

fn answer(text: &str) -> ModelDecision {
    ModelDecision::FinalAnswer(text.to_string())
}

/// Replays `decisions` from `infer`. `complete` answers by system prompt:
/// classification JSON, reply text, or a summary.
struct ScriptedModel {
    decisions: Mutex<VecDeque<ModelDecision>>,
    repeat_last: bool,
    classification: Value,
    reply: String,
    tool_results_seen: Mutex<Vec<String>>,
    summaries: AtomicUsize,
}

impl ScriptedModel {
    fn new(decisions: Vec<ModelDecision>) -> Self {
        Self {
            decisions: Mutex::new(decisions.into()),
            repeat_last: false,
            classification: json!({"label": "other", "urgency": "normal", "rationale": "n/a"}),
            reply: "Thank you for your email.".to_string(),
            tool_results_seen: Mutex::new(Vec::new()),
            summaries: AtomicUsize::new(0),
        }
    }

    fn classifying(mut self, label: &str, urgency: &str) -> Self {
        self.classification = json!({"label": label, "urgency": urgency, "rationale": "scripted"});
        self
    }

    fn replying(mut self, reply: &str) -> Self {
        self.reply = reply.to_string();
        self
    }

    /// Keep returning the last decision forever.
    fn repeating(mut self) -> Self {
        self.repeat_last = true;
        self
    }
}

#[async_trait]
impl ModelClient for ScriptedModel {
    async fn infer(
        &self,
        _system: &str,
        memory: MemorySnapshot<'_>,
        _tools: &[ToolDefinition],
    ) -> Result<ModelDecision, ModelError> {
        if let Some(last) = memory.turns.last().filter(|t| t.tool_call().is_some()) {
            self.tool_results_seen
                .lock()
                .unwrap()
                .push(last.content().to_string());
        }
        let mut decisions = self.decisions.lock().unwrap();
        let next = if self.repeat_last && decisions.len() == 1 {
            decisions.front().cloned()
        } else {
            decisions.pop_front()
        };
        Ok(next.unwrap_or_else(|| answer("Nothing left to do.")))
    }

    async fn complete(&self, system: &str, _prompt: &str) -> Result<String, ModelError> {
        if system == SUMMARIZER_SYSTEM_PROMPT {
            self.summaries.fetch_add(1, Ordering::SeqCst);
            return Ok("Earlier: email categorised, tools called.".to_string());
        }
        if system.starts_with("You classify") {
            return Ok(self.classification.to_string());
        }
        Ok(self.reply.clone())
    }
}

// ============================================================================
// Harness
// ============================================================================

struct Harness {
    agent: TriageAgent,
    mailbox: Arc<InMemoryMailbox>,
    bus: Arc<NotificationBus>,
    model: Arc<ScriptedModel>,
}

struct NoResearch;

#[async_trait]
impl ResearchBackend for NoResearch {
    async fn lookup(&self, _query: &ProspectQuery) -> Result<Option<ProspectProfile>, LookupError> {
        Ok(None)
    }
}

fn harness_with(
    config: Config,
    model: ScriptedModel,
    research: Arc<dyn ResearchBackend>,
    extra: Vec<Box<dyn Tool>>,
) -> Harness {
    let model = Arc::new(model);
    let mailbox = Arc::new(InMemoryMailbox::new());
    let bus = Arc::new(NotificationBus::new());
    let deps = ToolDeps::new(&config, model.clone(), mailbox.clone(), Arc::clone(&bus))
        .with_research(research);
    let mut registry = build_registry(&config, deps).unwrap();
    for tool in extra {
        registry.register(tool).unwrap();
    }
    let agent = TriageAgent::new(Arc::new(registry), model.clone(), &config);
    Harness {
        agent,
        mailbox,
        bus,
        model,
    }
}

fn harness(model: ScriptedModel) -> Harness {
    harness_with(Config::default(), model, Arc::new(NoResearch), Vec::new())
}

async fn run(h: &Harness, email: InboundEmail) -> inboxpilot::SessionReport {
    let (_tx, rx) = tokio::sync::watch::channel(false);
    h.agent.triage(email, rx).await
}

fn escalation_topic() -> String {
    let config = Config::default();
    config
        .notifications
        .qualified(&config.notifications.escalation_topic)
}

// ============================================================================
// Scenarios
// ============================================================================

#[tokio::test]
async fn sales_lead_is_drafted_not_sent() {
    let model = ScriptedModel::new(vec![
        call("CategoriseEmail", json!({})),
        call(
            "GenerateEmailResponse",
            json!({"instructions": "Share our pricing tiers and offer a call"}),
        ),
        call(
            "CreateEmailDraft",
            json!({"body": "Hi! Our plans start at 49 EUR/month. Happy to set up a call."}),
        ),
        answer("Categorised as sales_lead and created a draft reply for review."),
    ])
    .classifying("sales_lead", "normal")
    .replying("Hi! Our plans start at 49 EUR/month. Happy to set up a call.");
    let h = harness(model);

    let email = InboundEmail::from_text("Hi, I'd like info about your pricing");
    let email_id = email.id.clone();
    let report = run(&h, email).await;

    assert_eq!(report.state, SessionState::Done);
    assert_eq!(
        report.tool_names(),
        vec!["CategoriseEmail", "GenerateEmailResponse", "CreateEmailDraft"]
    );
    assert!(report.output.unwrap().contains("draft"));
    assert!(report.tool_calls.iter().all(|c| c.ok));

    let results = h.model.tool_results_seen.lock().unwrap();
    assert!(results[0].contains("\"label\":\"sales_lead\""));
    assert!(results[1].contains("49 EUR/month"));

    assert!(h.mailbox.sent().is_empty());
    let draft = h.mailbox.draft(&email_id).unwrap();
    assert!(draft.body.contains("49 EUR/month"));
}

#[tokio::test]
async fn urgent_complaint_is_escalated_once() {
    let model = ScriptedModel::new(vec![
        call("CategoriseEmail", json!({})),
        call("Escalate", json!({"reason": "Customer reports repeated outage"})),
        call("Escalate", json!({"reason": "Customer reports repeated outage"})),
        answer("Escalated the complaint to a human."),
    ])
    .classifying("support", "high");
    let h = harness(model);
    let mut escalations = h.bus.subscribe(&escalation_topic());

    let email = InboundEmail::new(
        "Dana <dana@bigcorp.com>",
        "URGENT: production down",
        "Your inverter firmware update bricked our site. Fix this today or we cancel.",
    );
    let report = run(&h, email).await;

    assert!(report.is_done());
    assert_eq!(report.tool_names(), vec!["CategoriseEmail", "Escalate", "Escalate"]);

    let results = h.model.tool_results_seen.lock().unwrap();
    assert!(results[0].contains("\"urgency\":\"high\""));
    let first: Value = serde_json::from_str(&results[1]).unwrap();
    let second: Value = serde_json::from_str(&results[2]).unwrap();
    assert_eq!(first["result"]["status"], "escalated");
    assert_eq!(second["result"]["status"], "already_escalated");
    assert_eq!(first["result"]["escalation"], second["result"]["escalation"]);

    let published = escalations.recv().await.unwrap();
    assert_eq!(published.payload, first["result"]["escalation"]);
    assert!(tokio::time::timeout(Duration::from_millis(20), escalations.recv())
        .await
        .is_err());
}

struct TimingOutResearch;

#[async_trait]
impl ResearchBackend for TimingOutResearch {
    async fn lookup(&self, _query: &ProspectQuery) -> Result<Option<ProspectProfile>, LookupError> {
        Err(LookupError::Timeout)
    }
}

#[tokio::test]
async fn research_timeout_is_fed_back_and_session_completes() {
    let model = ScriptedModel::new(vec![
        call("ProspectResearch", json!({})),
        call("CategoriseEmail", json!({})),
        call("Escalate", json!({"reason": "Large enterprise lead, research unavailable"})),
        answer("Could not research the sender; escalated the lead."),
    ])
    .classifying("sales_lead", "high");
    let h = harness_with(
        Config::default(),
        model,
        Arc::new(TimingOutResearch),
        Vec::new(),
    );
    let _escalations = h.bus.subscribe(&escalation_topic());

    let report = run(&h, InboundEmail::new("cto@bigcorp.com", "Partnership", "Let's talk volume.")).await;

    assert_eq!(report.state, SessionState::Done);
    let research = &report.tool_calls[0];
    assert_eq!(research.name, "ProspectResearch");
    assert_eq!(
        research.failure.as_ref().map(|f| f.kind),
        Some(ToolFailureKind::LookupTimeout)
    );
    let results = h.model.tool_results_seen.lock().unwrap();
    assert!(results[0].contains("\"kind\":\"LookupTimeout\""));
    assert!(report.tool_calls[1..].iter().all(|c| c.ok));
}

#[tokio::test]
async fn escalation_with_nobody_listening_is_fed_back_as_failure() {
    let model = ScriptedModel::new(vec![
        call("Escalate", json!({"reason": "Customer threatens legal action"})),
        answer("Could not reach a human; flagged for manual review."),
    ]);
    let h = harness(model);

    let report = run(&h, InboundEmail::new("lawyer@firm.com", "Notice", "We will sue.")).await;

    assert_eq!(report.state, SessionState::Done);
    let escalate = &report.tool_calls[0];
    assert!(!escalate.ok);
    assert_eq!(
        escalate.failure.as_ref().map(|f| f.kind),
        Some(ToolFailureKind::ExecutionFailed)
    );
    let results = h.model.tool_results_seen.lock().unwrap();
    assert!(results[0].contains("nobody is listening"));
}

#[tokio::test]
async fn unknown_tool_is_reported_and_loop_continues() {
    let model = ScriptedModel::new(vec![
        call("SendSMS", json!({"to": "+100000", "text": "hi"})),
        call("CategoriseEmail", json!({})),
        answer("SMS is not available; categorised the email instead."),
    ]);
    let h = harness(model);

    let report = run(&h, InboundEmail::from_text("Please text me back")).await;

    assert!(report.is_done());
    let failure = report.tool_calls[0].failure.as_ref().unwrap();
    assert_eq!(failure.kind, ToolFailureKind::UnknownTool);
    assert!(failure.message.contains("SendSMS"));
    assert!(report.tool_calls[0].category.is_none());
    assert!(report.tool_calls[1].ok);
}

#[tokio::test]
async fn pathological_model_hits_step_ceiling() {
    let mut config = Config::default();
    config.agents.defaults.max_tool_iterations = 4;
    let model = ScriptedModel::new(vec![call("ProspectResearch", json!({}))]).repeating();
    let h = harness_with(config, model, Arc::new(NoResearch), Vec::new());

    let report = run(&h, InboundEmail::new("bob@acme.io", "Hello", "Who am I?")).await;

    assert_eq!(report.state, SessionState::Failed);
    assert_eq!(
        report.failure,
        Some(SessionFailure::StepCeilingExceeded { ceiling: 4 })
    );
    assert_eq!(report.steps, 4);
    assert!(report.detail().unwrap().contains("step ceiling"));
}

// ============================================================================
// Invariants
// ============================================================================

#[tokio::test]
async fn reply_is_sent_at_most_once_per_session() {
    let model = ScriptedModel::new(vec![
        call("ReplyEmail", json!({"body": "Thanks, we got it."})),
        call("ReplyEmail", json!({"body": "Thanks, we got it."})),
        call("ReplyEmail", json!({"body": "Really, thanks!"})),
        answer("Replied to the sender."),
    ]);
    let h = harness(model);

    let report = run(&h, InboundEmail::new("jane@acme.io", "Order", "Did my order ship?")).await;

    assert!(report.is_done());
    assert_eq!(h.mailbox.sent().len(), 1);
    let results = h.model.tool_results_seen.lock().unwrap();
    let first: Value = serde_json::from_str(&results[0]).unwrap();
    for repeat in &results[1..] {
        let repeat: Value = serde_json::from_str(repeat).unwrap();
        assert_eq!(repeat["result"]["status"], "already_sent");
        assert_eq!(repeat["result"]["receipt"], first["result"]["receipt"]);
    }
}

#[tokio::test]
async fn separate_sessions_do_not_share_side_effects() {
    let model = ScriptedModel::new(vec![
        call("ReplyEmail", json!({"body": "Hello A"})),
        answer("done"),
        call("ReplyEmail", json!({"body": "Hello B"})),
        answer("done"),
    ]);
    let h = harness(model);

    run(&h, InboundEmail::new("a@one.io", "A", "first")).await;
    run(&h, InboundEmail::new("b@two.io", "B", "second")).await;

    let sent = h.mailbox.sent();
    assert_eq!(sent.len(), 2);
    assert_eq!(sent[0].to.as_deref(), Some("a@one.io"));
    assert_eq!(sent[1].to.as_deref(), Some("b@two.io"));
}

#[tokio::test]
async fn invalid_arguments_are_rejected_before_execution() {
    let model = ScriptedModel::new(vec![
        call("Escalate", json!({"priority": "high"})),
        call("Escalate", json!({"reason": "complaint", "priority": "whenever"})),
        answer("Gave up escalating."),
    ]);
    let h = harness(model);
    let mut escalations = h.bus.subscribe(&escalation_topic());

    let report = run(&h, InboundEmail::from_text("I am unhappy")).await;

    assert!(report.is_done());
    for call in &report.tool_calls {
        assert_eq!(
            call.failure.as_ref().map(|f| f.kind),
            Some(ToolFailureKind::InvalidToolArguments)
        );
    }
    assert!(tokio::time::timeout(Duration::from_millis(20), escalations.recv())
        .await
        .is_err());
}

/// Records when each execution starts and ends.
struct Timed {
    name: &'static str,
    log: Arc<Mutex<Vec<(&'static str, Instant, Instant)>>>,
}

#[async_trait]
impl Tool for Timed {
    fn name(&self) -> &str {
        self.name
    }
    fn description(&self) -> &str {
        "records start and end times"
    }
    fn parameters(&self) -> Value {
        json!({"type": "object", "properties": {}})
    }
    fn category(&self) -> ToolCategory {
        ToolCategory::Research
    }
    async fn execute(&self, _args: Value, _ctx: &ToolContext) -> Result<Value, ToolFailure> {
        let start = Instant::now();
        tokio::time::sleep(Duration::from_millis(15)).await;
        self.log.lock().unwrap().push((self.name, start, Instant::now()));
        Ok(json!({"tool": self.name}))
    }
}

#[tokio::test]
async fn tools_execute_one_at_a_time_in_requested_order() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let timed: Vec<Box<dyn Tool>> = vec![
        Box::new(Timed { name: "TimedA", log: Arc::clone(&log) }),
        Box::new(Timed { name: "TimedB", log: Arc::clone(&log) }),
    ];
    let model = ScriptedModel::new(vec![
        call("TimedB", json!({})),
        call("TimedA", json!({})),
        call("TimedB", json!({})),
        answer("done"),
    ]);
    let h = harness_with(Config::default(), model, Arc::new(NoResearch), timed);

    let report = run(&h, InboundEmail::from_text("timing")).await;
    assert!(report.is_done());

    let log = log.lock().unwrap();
    let order: Vec<_> = log.iter().map(|(name, _, _)| *name).collect();
    assert_eq!(order, vec!["TimedB", "TimedA", "TimedB"]);
    for pair in log.windows(2) {
        assert!(pair[0].2 <= pair[1].1, "executions overlapped");
    }
    let steps: Vec<_> = report.tool_calls.iter().map(|c| c.step).collect();
    assert_eq!(steps, vec![1, 2, 3]);
}

#[tokio::test]
async fn long_session_stays_within_memory_budget() {
    let mut config = Config::default();
    config.memory.token_budget = 200;
    let mut decisions: Vec<_> = (0..8)
        .map(|i| {
            call(
                "GenerateEmailResponse",
                json!({"instructions": format!("draft variant {} with plenty of detail", i)}),
            )
        })
        .collect();
    decisions.push(answer("Drafted several variants."));
    let model = ScriptedModel::new(decisions)
        .replying(&"A fairly long generated reply that takes up a good share of the budget. ".repeat(3));
    let h = harness_with(config, model, Arc::new(NoResearch), Vec::new());

    let report = run(&h, InboundEmail::from_text("Tell me everything about your products")).await;

    assert!(report.is_done(), "failed: {:?}", report.failure);
    assert_eq!(report.steps, 8);
    assert!(h.model.summaries.load(Ordering::SeqCst) > 0);
}

struct ShortSummary;

#[async_trait]
impl Summarizer for ShortSummary {
    async fn summarize(&self, _text: &str) -> Result<String, ModelError> {
        Ok("Sender asked about pricing; categorised and researched.".to_string())
    }
}

#[tokio::test]
async fn memory_budget_holds_after_every_append() {
    let mut memory = MemoryStore::new(150);
    for i in 0..40 {
        let turn = match i % 3 {
            0 => ConversationTurn::user(format!("message {} {}", i, "words ".repeat(i % 7 * 5))),
            1 => ConversationTurn::tool_request(
                "",
                ToolCallRef {
                    id: format!("call_{}", i),
                    name: "CategoriseEmail".into(),
                    arguments: json!({}),
                },
            ),
            _ => ConversationTurn::tool_result(
                ToolCallRef {
                    id: format!("call_{}", i - 1),
                    name: "CategoriseEmail".into(),
                    arguments: json!({}),
                },
                format!("{{\"ok\":true,\"result\":\"{}\"}}", "x".repeat(i * 3)),
            ),
        };
        let outcome = memory.append(turn, &ShortSummary).await.unwrap();
        assert!(!matches!(outcome, AppendOutcome::SummaryDeferred { .. }));
        assert!(
            memory.total_tokens() <= memory.budget(),
            "append {} left {} tokens",
            i,
            memory.total_tokens()
        );
    }
    assert!(!memory.summary().is_empty());
}

struct FlakyModel {
    failures_left: AtomicUsize,
}

#[async_trait]
impl ModelClient for FlakyModel {
    async fn infer(
        &self,
        _system: &str,
        _memory: MemorySnapshot<'_>,
        _tools: &[ToolDefinition],
    ) -> Result<ModelDecision, ModelError> {
        if self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(ModelError::unavailable("503 upstream"));
        }
        Ok(answer("Filed."))
    }

    async fn complete(&self, _system: &str, _prompt: &str) -> Result<String, ModelError> {
        Ok(String::new())
    }
}

#[tokio::test]
async fn model_outage_beyond_retry_budget_fails_session() {
    let mut config = Config::default();
    config.agents.defaults.model_max_attempts = 2;
    config.agents.defaults.retry_base_delay_ms = 1;
    config.agents.defaults.retry_max_delay_ms = 2;
    let model: Arc<dyn ModelClient> = Arc::new(FlakyModel {
        failures_left: AtomicUsize::new(5),
    });
    let agent = TriageAgent::new(Arc::new(ToolRegistry::new()), model, &config);

    let (_tx, rx) = tokio::sync::watch::channel(false);
    let report = agent.triage(InboundEmail::from_text("hello"), rx).await;

    assert_eq!(report.state, SessionState::Failed);
    assert!(matches!(
        report.failure,
        Some(SessionFailure::ModelUnavailable { attempts: 2, .. })
    ));
}

#[tokio::test]
async fn transient_model_failure_is_retried() {
    let mut config = Config::default();
    config.agents.defaults.model_max_attempts = 3;
    config.agents.defaults.retry_base_delay_ms = 1;
    config.agents.defaults.retry_max_delay_ms = 2;
    let model: Arc<dyn ModelClient> = Arc::new(FlakyModel {
        failures_left: AtomicUsize::new(2),
    });
    let agent = TriageAgent::new(Arc::new(ToolRegistry::new()), model, &config);

    let (_tx, rx) = tokio::sync::watch::channel(false);
    let report = agent.triage(InboundEmail::from_text("hello"), rx).await;
    assert_eq!(report.output.as_deref(), Some("Filed."));
}

#[tokio::test]
async fn cancellation_lets_in_flight_send_finish() {
    let config = Config::default();
    let model = Arc::new(ScriptedModel::new(vec![
        call("ReplyEmail", json!({"body": "On it."})),
        answer("Replied."),
    ]));
    let mailbox = Arc::new(InMemoryMailbox::new().with_send_delay(Duration::from_millis(100)));
    let bus = Arc::new(NotificationBus::new());
    let deps = ToolDeps::new(&config, model.clone(), mailbox.clone(), bus)
        .with_research(Arc::new(NoResearch));
    let registry = build_registry(&config, deps).unwrap();
    let agent = TriageAgent::new(Arc::new(registry), model.clone(), &config);

    let (tx, rx) = tokio::sync::watch::channel(false);
    let session = agent.triage(InboundEmail::new("jane@acme.io", "Hi", "Ping"), rx);
    let cancel = async {
        tokio::time::sleep(Duration::from_millis(30)).await;
        tx.send(true).unwrap();
    };
    let (report, ()) = tokio::join!(session, cancel);

    assert_eq!(report.failure, Some(SessionFailure::Cancelled));
    assert_eq!(report.tool_names(), vec!["ReplyEmail"]);
    assert!(report.tool_calls[0].ok);
    assert_eq!(mailbox.sent().len(), 1);
}
