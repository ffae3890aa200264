//! Shared fixtures: a scripted in-process transport and a fixed-sequence
//! delta detector. No network.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use crucible::council::{
    Complexity, CouncilConfig, CritiqueStyle, Grammar, Role, SeatResponses, SeatSpec,
};
use crucible::delta::JUDGE_SYSTEM_PROMPT;
use crucible::{
    CallRequest, CallResponse, DeltaDetector, Engine, EngineSettings, Transport, TransportError,
};

pub const SYNTHESIS_TEXT: &str = "FINAL ANSWER";

/// Answers by call label (the last segment of the correlation id).
///
/// | Label       | Reply                                   |
/// |-------------|-----------------------------------------|
/// | judge       | next scripted verdict, else `YES`       |
/// | red_team    | the configured critique                 |
/// | synthesis   | [`SYNTHESIS_TEXT`]                      |
/// | seat id     | `"{label}#{n}"`, n counting per label   |
///
/// The reply names the requested model as `model_used` unless
/// [`ScriptedTransport::answered_by`] substitutes another one.
pub struct ScriptedTransport {
    critique: String,
    latencies: HashMap<String, Duration>,
    answering_models: HashMap<String, String>,
    failures: HashMap<String, TransportError>,
    judge_verdicts: Mutex<VecDeque<String>>,
    requests: Mutex<Vec<CallRequest>>,
    counters: Mutex<HashMap<String, u32>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self {
            critique: "The positions lack evidence.".to_string(),
            latencies: HashMap::new(),
            answering_models: HashMap::new(),
            failures: HashMap::new(),
            judge_verdicts: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
            counters: Mutex::new(HashMap::new()),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    pub fn with_critique(mut self, critique: &str) -> Self {
        self.critique = critique.to_string();
        self
    }

    pub fn with_latency(mut self, label: &str, latency: Duration) -> Self {
        self.latencies.insert(label.to_string(), latency);
        self
    }

    /// Report `model` as the one that answered calls labelled `label`,
    /// the way a fallback would.
    pub fn answered_by(mut self, label: &str, model: &str) -> Self {
        self.answering_models
            .insert(label.to_string(), model.to_string());
        self
    }

    pub fn failing(mut self, label: &str, err: TransportError) -> Self {
        self.failures.insert(label.to_string(), err);
        self
    }

    pub fn with_judge_verdicts(self, verdicts: &[&str]) -> Self {
        *self.judge_verdicts.lock().unwrap() = verdicts.iter().map(|v| v.to_string()).collect();
        self
    }

    pub fn requests(&self) -> Vec<CallRequest> {
        self.requests.lock().unwrap().clone()
    }

    /// Labels of every call in issue order.
    pub fn labels(&self) -> Vec<String> {
        self.requests().iter().map(label_of).collect()
    }

    pub fn requests_for(&self, label: &str) -> Vec<CallRequest> {
        self.requests()
            .into_iter()
            .filter(|r| label_of(r) == label)
            .collect()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

fn label_of(request: &CallRequest) -> String {
    let is_judge = request
        .messages
        .first()
        .is_some_and(|m| m.content == JUDGE_SYSTEM_PROMPT);
    if is_judge {
        return "judge".to_string();
    }
    request.call_label().unwrap_or("unlabelled").to_string()
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(&self, request: CallRequest) -> Result<CallResponse, TransportError> {
        let label = label_of(&request);
        let model = self
            .answering_models
            .get(&label)
            .cloned()
            .unwrap_or_else(|| request.model.clone());
        self.requests.lock().unwrap().push(request);

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if let Some(latency) = self.latencies.get(&label) {
            tokio::time::sleep(*latency).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if let Some(err) = self.failures.get(&label) {
            return Err(err.clone());
        }

        let text = match label.as_str() {
            "judge" => self
                .judge_verdicts
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| "YES".to_string()),
            "red_team" => self.critique.clone(),
            "synthesis" => SYNTHESIS_TEXT.to_string(),
            _ => {
                let mut counters = self.counters.lock().unwrap();
                let n = counters.entry(label.clone()).or_insert(0);
                *n += 1;
                format!("{}#{}", label, n)
            }
        };
        Ok(CallResponse {
            text,
            model_used: model,
        })
    }
}

/// Returns scripted verdicts in order, then `fallback` forever.
pub struct SequenceDetector {
    verdicts: Mutex<VecDeque<bool>>,
    fallback: bool,
    saw_prior: Mutex<Vec<bool>>,
}

impl SequenceDetector {
    pub fn new(verdicts: &[bool], fallback: bool) -> Self {
        Self {
            verdicts: Mutex::new(verdicts.iter().copied().collect()),
            fallback,
            saw_prior: Mutex::new(Vec::new()),
        }
    }

    pub fn always(changed: bool) -> Self {
        Self::new(&[], changed)
    }

    /// Whether each call received a prior mapping.
    pub fn saw_prior(&self) -> Vec<bool> {
        self.saw_prior.lock().unwrap().clone()
    }
}

#[async_trait]
impl DeltaDetector for SequenceDetector {
    fn name(&self) -> &'static str {
        "sequence"
    }

    async fn detect(
        &self,
        prior: Option<&SeatResponses>,
        _current: &SeatResponses,
    ) -> Result<bool, TransportError> {
        self.saw_prior.lock().unwrap().push(prior.is_some());
        Ok(self
            .verdicts
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(self.fallback))
    }
}

/// Deliberating seats from `roles` followed by one red-team seat.
pub fn council(grammar: Grammar, roles: &[Role], budget: u32) -> CouncilConfig {
    let mut seats: Vec<SeatSpec> = roles
        .iter()
        .map(|role| SeatSpec::new(*role, format!("You are the {} seat.", role.label())))
        .collect();
    seats.push(SeatSpec::new(Role::RedTeam, "You are the adversary."));
    CouncilConfig {
        seats,
        grammar,
        round_budget: budget,
        allow_early_exit: true,
        critique_style: CritiqueStyle::Logical,
        synthesis_instruction: "Answer in one paragraph.".to_string(),
        complexity: Complexity::Complicated,
        short_circuit_allowed: false,
    }
}

pub fn three_seat(grammar: Grammar, budget: u32) -> CouncilConfig {
    council(grammar, &[Role::DomainExpert, Role::Pragmatist], budget)
}

pub fn settings(trace_rounds: bool) -> EngineSettings {
    EngineSettings {
        trace_rounds,
        ..EngineSettings::default()
    }
}

pub fn engine(
    settings: EngineSettings,
    transport: &Arc<ScriptedTransport>,
    detector: Option<Arc<SequenceDetector>>,
) -> Engine {
    let transport: Arc<dyn Transport> = transport.clone();
    let builder = Engine::builder(settings, transport);
    let built = match detector {
        Some(detector) => builder.detector(detector).build(),
        None => builder.build(),
    };
    built.expect("test settings are valid")
}
