//! Prompt-driven appearance generation
//!
//! A prompt goes to the text model as a task on a small tokio runtime; the
//! result comes back over a channel that the render loop drains once per
//! frame, so the UI never blocks on the network.

pub mod gemini;
pub mod schema;

use std::sync::Arc;

use crossbeam_channel::{Receiver, Sender};
use thiserror::Error;

use crate::appearance::{AppearanceConfig, AppearanceUpdate, ColorParseError};
use crate::settings::Settings;
use crate::state::ConfigWriter;

pub use gemini::{GeminiModel, JsonRequest, TextModel};
pub use schema::GeneratedAppearance;

/// Message shown to the user for any generation failure
pub const FAILURE_MESSAGE: &str = "Failed to generate configuration.";

/// Generation failures
#[derive(Debug, Error)]
pub enum GenerateError {
    #[error("missing API key (set GEMINI_API_KEY)")]
    MissingApiKey,
    #[error("prompt is empty")]
    EmptyPrompt,
    #[error("a request is already in flight")]
    Busy,
    #[error("request failed: {0}")]
    Request(String),
    #[error("service returned {status}: {body}")]
    Service { status: u16, body: String },
    #[error("malformed response: {0}")]
    Malformed(String),
    #[error(transparent)]
    InvalidColor(#[from] ColorParseError),
    #[error("failed to start runtime: {0}")]
    Runtime(#[from] std::io::Error),
}

/// Result of a finished request, as seen by the shell
#[derive(Debug, Clone, PartialEq)]
pub enum GenerationOutcome {
    Applied,
    Failed(String),
}

/// Ask `model` for an appearance matching `prompt`
pub async fn generate<M: TextModel>(
    model: &M,
    prompt: &str,
) -> Result<AppearanceUpdate, GenerateError> {
    let prompt = prompt.trim();
    if prompt.is_empty() {
        return Err(GenerateError::EmptyPrompt);
    }

    let text = model
        .generate_json(JsonRequest {
            system_instruction: schema::SYSTEM_INSTRUCTION.to_string(),
            prompt: prompt.to_string(),
            schema: schema::response_schema(),
        })
        .await?;

    GeneratedAppearance::from_json(&text)?.validate()
}

/// Owns the runtime and the single in-flight request
pub struct ConfigGenerator<M: TextModel = GeminiModel> {
    runtime: Option<tokio::runtime::Runtime>,
    model: Arc<M>,
    writer: ConfigWriter,
    results_tx: Sender<Result<AppearanceUpdate, GenerateError>>,
    results_rx: Receiver<Result<AppearanceUpdate, GenerateError>>,
    loading: bool,
}

impl ConfigGenerator<GeminiModel> {
    /// Generator backed by the Gemini service named in `settings`
    pub fn from_settings(settings: &Settings, writer: ConfigWriter) -> Result<Self, GenerateError> {
        if settings.api_key.is_none() {
            log::warn!("GEMINI_API_KEY is not set; prompt generation will fail");
        }
        let model = GeminiModel::new(settings.api_key.clone(), settings.gemini_model.clone())?;
        Self::new(model, writer)
    }
}

impl<M: TextModel> ConfigGenerator<M> {
    pub fn new(model: M, writer: ConfigWriter) -> Result<Self, GenerateError> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .thread_name("config-generator")
            .enable_all()
            .build()?;
        let (results_tx, results_rx) = crossbeam_channel::unbounded();

        Ok(Self {
            runtime: Some(runtime),
            model: Arc::new(model),
            writer,
            results_tx,
            results_rx,
            loading: false,
        })
    }

    /// Start generating for `prompt`.
    ///
    /// Empty prompts and submissions while a request is running are rejected
    /// without contacting the service.
    pub fn submit(&mut self, prompt: &str) -> Result<(), GenerateError> {
        if self.loading {
            return Err(GenerateError::Busy);
        }
        let prompt = prompt.trim().to_string();
        if prompt.is_empty() {
            return Err(GenerateError::EmptyPrompt);
        }
        let Some(runtime) = &self.runtime else {
            return Err(GenerateError::Request("runtime stopped".to_string()));
        };

        log::info!("Generating appearance for {:?}", prompt);
        let model = Arc::clone(&self.model);
        let tx = self.results_tx.clone();
        runtime.spawn(async move {
            let result = generate(model.as_ref(), &prompt).await;
            // Receiver is gone once the shell has shut down
            let _ = tx.send(result);
        });

        self.loading = true;
        Ok(())
    }

    /// Apply a finished result, if any. Called once per frame.
    pub fn poll(&mut self) -> Option<GenerationOutcome> {
        let result = self.results_rx.try_recv().ok()?;
        self.loading = false;

        match result {
            Ok(update) => {
                log::info!(
                    "Applied generated appearance: {} / {}, size {:.2}, speed {:.2}, noise {:.2}",
                    update.color1,
                    update.color2,
                    update.particle_size,
                    update.speed,
                    update.noise_scale
                );
                self.writer.apply(&update);
                Some(GenerationOutcome::Applied)
            }
            Err(e) => {
                log::warn!("Appearance generation failed: {}", e);
                Some(GenerationOutcome::Failed(FAILURE_MESSAGE.to_string()))
            }
        }
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    /// Restore the startup appearance
    pub fn reset(&self) {
        self.writer.replace(AppearanceConfig::default());
    }
}

impl<M: TextModel> Drop for ConfigGenerator<M> {
    fn drop(&mut self) {
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::appearance::Rgb;
    use crate::state::{StateChange, StateStore};
    use parking_lot::Mutex;
    use std::future::Future;
    use std::time::{Duration, Instant};

    const CYBERPUNK_RESPONSE: &str =
        r##"{"color1":"#0ff","color2":"#f0f","particleSize":0.2,"speed":2.0,"noiseScale":1.5}"##;

    /// Text model that answers every request with a canned reply
    struct MockModel {
        reply: Result<String, String>,
        prompts: Arc<Mutex<Vec<String>>>,
    }

    impl MockModel {
        fn replying(text: &str) -> Self {
            Self {
                reply: Ok(text.to_string()),
                prompts: Arc::default(),
            }
        }

        fn failing(message: &str) -> Self {
            Self {
                reply: Err(message.to_string()),
                prompts: Arc::default(),
            }
        }
    }

    impl TextModel for MockModel {
        fn generate_json(
            &self,
            request: JsonRequest,
        ) -> impl Future<Output = Result<String, GenerateError>> + Send {
            self.prompts.lock().push(request.prompt);
            let reply = self.reply.clone().map_err(GenerateError::Request);
            async move { reply }
        }
    }

    fn wait_for_outcome<M: TextModel>(generator: &mut ConfigGenerator<M>) -> GenerationOutcome {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if let Some(outcome) = generator.poll() {
                return outcome;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        panic!("generation did not finish");
    }

    #[tokio::test]
    async fn test_generate_parses_response() {
        let model = MockModel::replying(CYBERPUNK_RESPONSE);
        let update = generate(&model, "  Cyberpunk Rain ").await.unwrap();

        assert_eq!(update.color1, Rgb::new(0.0, 1.0, 1.0));
        assert_eq!(update.color2, Rgb::new(1.0, 0.0, 1.0));
        assert_eq!(update.particle_count, None);
        assert_eq!(*model.prompts.lock(), vec!["Cyberpunk Rain".to_string()]);
    }

    #[tokio::test]
    async fn test_generate_rejects_empty_prompt_without_request() {
        let model = MockModel::replying(CYBERPUNK_RESPONSE);
        let result = generate(&model, "   ").await;
        assert!(matches!(result, Err(GenerateError::EmptyPrompt)));
        assert!(model.prompts.lock().is_empty());
    }

    #[tokio::test]
    async fn test_generate_propagates_malformed_json() {
        let model = MockModel::replying("{\"color1\": ");
        let result = generate(&model, "fire").await;
        assert!(matches!(result, Err(GenerateError::Malformed(_))));
    }

    #[test]
    fn test_cyberpunk_rain_updates_required_fields_only() {
        let (reader, _hand, config) = StateStore::default().split();
        let before = reader.appearance();
        let mut generator =
            ConfigGenerator::new(MockModel::replying(CYBERPUNK_RESPONSE), config).unwrap();

        generator.submit("Cyberpunk Rain").unwrap();
        assert!(generator.is_loading());
        assert_eq!(wait_for_outcome(&mut generator), GenerationOutcome::Applied);
        assert!(!generator.is_loading());

        let after = reader.appearance();
        assert_eq!(after.color1, Rgb::new(0.0, 1.0, 1.0));
        assert_eq!(after.color2, Rgb::new(1.0, 0.0, 1.0));
        assert!((after.particle_size - 0.2).abs() < 1e-6);
        assert!((after.speed - 2.0).abs() < 1e-6);
        assert!((after.noise_scale - 1.5).abs() < 1e-6);
        assert_eq!(after.interaction_radius, before.interaction_radius);
        assert_eq!(after.particle_count, before.particle_count);
    }

    #[test]
    fn test_failure_leaves_store_untouched() {
        let (reader, _hand, config) = StateStore::default().split();
        let changes = reader.subscribe(&[StateChange::Appearance]);
        let revision = reader.appearance_revision();
        let mut generator =
            ConfigGenerator::new(MockModel::failing("connection refused"), config).unwrap();

        generator.submit("fire").unwrap();
        assert_eq!(
            wait_for_outcome(&mut generator),
            GenerationOutcome::Failed(FAILURE_MESSAGE.to_string())
        );
        assert_eq!(reader.appearance_revision(), revision);
        assert_eq!(reader.appearance(), AppearanceConfig::default());
        assert!(changes.try_recv().is_err());
    }

    #[test]
    fn test_invalid_color_is_a_failure() {
        let (reader, _hand, config) = StateStore::default().split();
        let mut generator = ConfigGenerator::new(
            MockModel::replying(
                r##"{"color1":"teal","color2":"#f0f","particleSize":0.2,"speed":2.0,"noiseScale":1.5}"##,
            ),
            config,
        )
        .unwrap();

        generator.submit("ocean").unwrap();
        assert!(matches!(
            wait_for_outcome(&mut generator),
            GenerationOutcome::Failed(_)
        ));
        assert_eq!(reader.appearance(), AppearanceConfig::default());
    }

    #[test]
    fn test_one_request_in_flight() {
        let (_reader, _hand, config) = StateStore::default().split();
        let mut generator =
            ConfigGenerator::new(MockModel::replying(CYBERPUNK_RESPONSE), config).unwrap();

        assert!(matches!(generator.submit(""), Err(GenerateError::EmptyPrompt)));
        assert!(!generator.is_loading());

        generator.submit("rain").unwrap();
        assert!(matches!(generator.submit("snow"), Err(GenerateError::Busy)));
        wait_for_outcome(&mut generator);
        assert!(generator.submit("snow").is_ok());
    }

    #[test]
    fn test_reset_restores_defaults() {
        let (reader, _hand, config) = StateStore::default().split();
        let changes = reader.subscribe(&[StateChange::Appearance]);
        let mut generator =
            ConfigGenerator::new(MockModel::replying(CYBERPUNK_RESPONSE), config).unwrap();

        generator.submit("Cyberpunk Rain").unwrap();
        wait_for_outcome(&mut generator);
        assert_ne!(reader.appearance(), AppearanceConfig::default());

        generator.reset();
        assert_eq!(reader.appearance(), AppearanceConfig::default());
        let seen: Vec<_> = changes.try_iter().collect();
        assert_eq!(seen, vec![StateChange::Appearance, StateChange::Appearance]);
    }
}
