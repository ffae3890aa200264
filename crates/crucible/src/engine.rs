//! The public entry point for running a council.
//!
//! An [`Engine`] owns its settings, transport, delta detector and optional
//! model router. Runs borrow the engine immutably, so one engine can serve
//! many concurrent runs; the transport's per-model rate limiter is the only
//! state they share.

use std::sync::Arc;

use council::{CouncilConfig, RunResult};
use tokio_util::sync::CancellationToken;
use tracing::{info, info_span, Instrument};
use uuid::Uuid;

use crate::controller::RoundController;
use crate::delta::{DeltaDetector, JudgeDetector};
use crate::errors::RunError;
use crate::grammar::SeatCaller;
use crate::routing::ModelRouter;
use crate::settings::{EngineSettings, SettingsError};
use crate::transport::{OpenRouterBackend, ResilientTransport, Transport};

/// Input to one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Deliberation {
    /// Reconstructed query the council deliberates on.
    pub query: String,
    /// Raw user text, shown to synthesis alongside the reconstruction.
    pub original_query: Option<String>,
}

impl Deliberation {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            original_query: None,
        }
    }

    pub fn with_original_query(mut self, original: impl Into<String>) -> Self {
        self.original_query = Some(original.into());
        self
    }
}

pub struct Engine {
    settings: Arc<EngineSettings>,
    transport: Arc<dyn Transport>,
    detector: Arc<dyn DeltaDetector>,
    router: Option<Arc<dyn ModelRouter>>,
}

impl Engine {
    /// Engine over the OpenRouter-compatible HTTP endpoint in `settings`,
    /// with the judge-model delta detector.
    pub fn from_settings(settings: EngineSettings) -> Result<Self, SettingsError> {
        settings.validate()?;
        let backend = OpenRouterBackend::new(settings.api_key.clone(), &settings.base_url)?;
        let transport: Arc<dyn Transport> =
            Arc::new(ResilientTransport::new(backend, &settings.transport));
        Self::builder(settings, transport).build()
    }

    /// Start from an arbitrary transport. The detector defaults to a
    /// [`JudgeDetector`] over that same transport.
    pub fn builder(settings: EngineSettings, transport: Arc<dyn Transport>) -> EngineBuilder {
        EngineBuilder {
            settings,
            transport,
            detector: None,
            router: None,
        }
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// Run `config` against `input` to completion.
    pub async fn run(
        &self,
        config: &CouncilConfig,
        input: &Deliberation,
    ) -> Result<RunResult, RunError> {
        self.run_with_cancel(config, input, CancellationToken::new())
            .await
    }

    /// Like [`Engine::run`], but stops with [`RunError::Cancelled`] as soon
    /// as `cancel` fires. In-flight calls are abandoned.
    pub async fn run_with_cancel(
        &self,
        config: &CouncilConfig,
        input: &Deliberation,
        cancel: CancellationToken,
    ) -> Result<RunResult, RunError> {
        config.validate()?;

        let run_id: Arc<str> = Uuid::new_v4().to_string().into();
        let span = info_span!("council_run", run_id = %run_id, grammar = %config.grammar);
        let controller = RoundController {
            settings: &self.settings,
            detector: self.detector.as_ref(),
            caller: SeatCaller {
                transport: Arc::clone(&self.transport),
                router: self.router.clone(),
                default_model: self.settings.default_model.clone(),
                fallback: self.settings.fallback_models.clone(),
                run_id,
                cancel,
            },
        };

        async move {
            info!(
                seats = config.seats.len(),
                budget = config.round_budget,
                detector = self.detector.name(),
                "run started"
            );
            let result = controller.run(config, input).await?;
            info!(summary = %result.summary_line(), "run complete");
            Ok(result)
        }
        .instrument(span)
        .await
    }
}

pub struct EngineBuilder {
    settings: EngineSettings,
    transport: Arc<dyn Transport>,
    detector: Option<Arc<dyn DeltaDetector>>,
    router: Option<Arc<dyn ModelRouter>>,
}

impl EngineBuilder {
    pub fn detector(mut self, detector: Arc<dyn DeltaDetector>) -> Self {
        self.detector = Some(detector);
        self
    }

    pub fn router(mut self, router: Arc<dyn ModelRouter>) -> Self {
        self.router = Some(router);
        self
    }

    /// Validates the settings, then assembles the engine.
    pub fn build(self) -> Result<Engine, SettingsError> {
        self.settings.validate()?;
        let detector: Arc<dyn DeltaDetector> = match self.detector {
            Some(detector) => detector,
            None => Arc::new(
                JudgeDetector::new(Arc::clone(&self.transport), self.settings.judge_model.clone())
                    .with_fallback(self.settings.fallback_models.clone()),
            ),
        };
        Ok(Engine {
            settings: Arc::new(self.settings),
            transport: self.transport,
            detector,
            router: self.router,
        })
    }
}
