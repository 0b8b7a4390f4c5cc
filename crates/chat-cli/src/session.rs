//! One conversation view in the terminal: the conversation state, the model selection and the
//! clients that talk to the backend.

use std::io::Write;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use anyhow::{anyhow, Context};
use chat_client::{
    ApiClient, ChatRequest, ClientError, ConversationStreamController, ModelsResponse,
    StreamObserver, StreamOutcome,
};
use chat_core::{Config, ConversationState};
use colored::Colorize;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

pub const FAILURE_NOTICE: &str = "Sorry, something went wrong. Please try again.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    pub provider: String,
    pub model: String,
}

/// Pick provider and model: explicit values win, then the first model the server lists
/// (for the chosen provider, if only the provider was given).
pub fn resolve_selection(
    provider: Option<&str>,
    model: Option<&str>,
    models: Option<&ModelsResponse>,
) -> anyhow::Result<Selection> {
    if let (Some(provider), Some(model)) = (provider, model) {
        return Ok(Selection {
            provider: provider.to_string(),
            model: model.to_string(),
        });
    }

    let models = models.ok_or_else(|| {
        anyhow!("Failed to load the model list; make sure the backend service is running")
    })?;

    let chosen = match (provider, model) {
        (Some(provider), None) => models.models_for(provider).next(),
        (None, Some(model)) => models.models.iter().find(|m| m.id == model),
        _ => models.default_selection(),
    };

    match (chosen, provider, model) {
        (Some(info), _, _) => Ok(Selection {
            provider: info.provider.clone(),
            model: info.id.clone(),
        }),
        (None, Some(provider), _) => Err(anyhow!("Provider {provider} offers no models")),
        (None, _, Some(model)) => Err(anyhow!("Model {model} is not available")),
        (None, None, None) => Err(anyhow!("The server lists no models")),
    }
}

/// Prints each new piece of the reply as it arrives.
///
/// The controller hands over the full text so far; only the part not yet printed is written.
pub struct TerminalObserver<W> {
    out: W,
    printed: usize,
    error: Option<String>,
}

impl<W: Write + Send> TerminalObserver<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            printed: 0,
            error: None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }
}

impl<W: Write + Send> StreamObserver for TerminalObserver<W> {
    fn on_fragment(&mut self, content: &str) {
        if let Some(delta) = content.get(self.printed..) {
            let _ = write!(self.out, "{}", delta.green());
            let _ = self.out.flush();
        }
        self.printed = content.len();
    }

    fn on_complete(&mut self) {
        let _ = writeln!(self.out);
    }

    fn on_error(&mut self, error: &ClientError) {
        self.error = Some(error.to_string());
    }

    fn on_malformed(&mut self, _line: &str) {
        let _ = write!(self.out, "{}", " [skipped frame] ".dimmed());
        let _ = self.out.flush();
    }
}

/// Routes Ctrl-C to the reply being streamed, if any.
///
/// Once `tokio::signal::ctrl_c` is installed the default SIGINT handler is gone for the rest of
/// the process; the listener has to quit on its own when nothing is streaming.
#[derive(Debug, Clone, Default)]
pub struct InterruptGate {
    active: Arc<Mutex<Option<CancellationToken>>>,
}

impl InterruptGate {
    /// Register a new exchange and return its cancellation token.
    pub fn arm(&self) -> CancellationToken {
        let token = CancellationToken::new();
        *self.slot() = Some(token.clone());
        token
    }

    pub fn disarm(&self) {
        self.slot().take();
    }

    /// Cancel the active exchange. Returns `false` when nothing was streaming.
    pub fn interrupt(&self) -> bool {
        match self.slot().take() {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    fn slot(&self) -> MutexGuard<'_, Option<CancellationToken>> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Listen for Ctrl-C until the returned task is aborted. Outside a stream the process exits.
    pub fn spawn_listener(&self) -> JoinHandle<()> {
        let gate = self.clone();
        tokio::spawn(async move {
            while tokio::signal::ctrl_c().await.is_ok() {
                if !gate.interrupt() {
                    println!();
                    std::process::exit(130);
                }
            }
        })
    }
}

pub struct ChatSession {
    state: ConversationState,
    controller: ConversationStreamController,
    api: ApiClient,
    selection: Selection,
    stream: bool,
    keep_partial: bool,
    interrupts: InterruptGate,
    listener: JoinHandle<()>,
}

impl ChatSession {
    pub async fn connect(config: &Config, keep_partial: bool) -> anyhow::Result<Self> {
        let api = ApiClient::from_config(config).context("Failed to build HTTP client")?;
        let controller = ConversationStreamController::from_config(config)
            .context("Failed to build HTTP client")?;

        let models = if config.provider.is_some() && config.model.is_some() {
            None
        } else {
            match api.list_models().await {
                Ok(models) => Some(models),
                Err(err) => {
                    log::error!("Failed to load models: {}", err);
                    None
                }
            }
        };

        let selection = resolve_selection(
            config.provider.as_deref(),
            config.model.as_deref(),
            models.as_ref(),
        )?;
        log::info!("Using {}/{}", selection.provider, selection.model);

        let interrupts = InterruptGate::default();
        let listener = interrupts.spawn_listener();

        Ok(Self {
            state: ConversationState::new(),
            controller,
            api,
            selection,
            stream: config.stream,
            keep_partial,
            interrupts,
            listener,
        })
    }

    pub fn selection(&self) -> &Selection {
        &self.selection
    }

    pub fn state(&self) -> &ConversationState {
        &self.state
    }

    /// Run one exchange for `text`. Returns once the reply is final; the caller reads no input
    /// until then.
    pub async fn send(&mut self, text: &str) -> anyhow::Result<()> {
        self.state.push_user(text)?;
        let request = ChatRequest::new(
            self.selection.provider.clone(),
            self.selection.model.clone(),
            self.state.history(),
        );

        if self.stream {
            self.send_streaming(request).await
        } else {
            self.send_plain(request).await
        }
    }

    async fn send_streaming(&mut self, request: ChatRequest) -> anyhow::Result<()> {
        let cancel = self.interrupts.arm();
        let mut observer = TerminalObserver::new(std::io::stdout());
        let outcome = self
            .controller
            .start(&mut self.state, request, &mut observer, &cancel)
            .await;
        self.interrupts.disarm();

        match outcome {
            StreamOutcome::Completed { .. } => {}
            StreamOutcome::Cancelled => println!("\n{}", "[cancelled]".dimmed()),
            StreamOutcome::Failed => {
                let message = observer.error().unwrap_or("unknown error").to_string();
                self.fail_pending(&message)?;
            }
        }
        Ok(())
    }

    async fn send_plain(&mut self, request: ChatRequest) -> anyhow::Result<()> {
        self.state.begin_assistant()?;
        match self.api.chat(&request).await {
            Ok(response) => {
                self.state.set_pending_content(&response.content)?;
                self.state.complete_pending()?;
                println!("{}", response.content.green());
                if let Some(usage) = response.usage {
                    println!(
                        "{}",
                        format!(
                            "Tokens: prompt={}, completion={}, total={}",
                            usage.prompt_tokens, usage.completion_tokens, usage.total_tokens
                        )
                        .dimmed()
                    );
                }
            }
            Err(err) => self.fail_pending(&err.to_string())?,
        }
        Ok(())
    }

    fn fail_pending(&mut self, message: &str) -> anyhow::Result<()> {
        log::error!("Chat error: {}", message);
        let notice = (!self.keep_partial).then_some(FAILURE_NOTICE);
        self.state.fail_pending(notice)?;
        println!();
        println!("{}", format!("Error: {}", message).red());
        if let Some(notice) = notice {
            println!("{}", notice.red());
        }
        Ok(())
    }
}

impl Drop for ChatSession {
    fn drop(&mut self) {
        self.listener.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chat_client::ModelInfo;

    fn models() -> ModelsResponse {
        ModelsResponse {
            models: vec![
                ModelInfo {
                    id: "doubao-pro".to_string(),
                    provider: "ark".to_string(),
                    name: "Doubao Pro".to_string(),
                },
                ModelInfo {
                    id: "gpt-4o".to_string(),
                    provider: "openai".to_string(),
                    name: "GPT-4o".to_string(),
                },
            ],
        }
    }

    #[test]
    fn explicit_selection_needs_no_model_list() {
        let selection = resolve_selection(Some("openai"), Some("gpt-4o-mini"), None).unwrap();
        assert_eq!(selection.model, "gpt-4o-mini");
    }

    #[test]
    fn defaults_to_first_listed_model() {
        let selection = resolve_selection(None, None, Some(&models())).unwrap();
        assert_eq!(
            selection,
            Selection {
                provider: "ark".to_string(),
                model: "doubao-pro".to_string()
            }
        );
    }

    #[test]
    fn provider_only_picks_its_first_model() {
        let selection = resolve_selection(Some("openai"), None, Some(&models())).unwrap();
        assert_eq!(selection.model, "gpt-4o");
    }

    #[test]
    fn model_only_finds_its_provider() {
        let selection = resolve_selection(None, Some("gpt-4o"), Some(&models())).unwrap();
        assert_eq!(selection.provider, "openai");
    }

    #[test]
    fn missing_list_is_an_error() {
        let err = resolve_selection(None, None, None).unwrap_err();
        assert!(err.to_string().contains("backend service"));

        let err = resolve_selection(Some("anthropic"), None, Some(&models())).unwrap_err();
        assert!(err.to_string().contains("anthropic"));
    }

    #[test]
    fn terminal_observer_prints_only_new_text() {
        colored::control::set_override(false);
        let mut out = Vec::new();
        {
            let mut observer = TerminalObserver::new(&mut out);
            observer.on_fragment("Hel");
            observer.on_fragment("Hello");
            observer.on_fragment("Hello world");
            observer.on_complete();
            assert!(observer.error().is_none());
        }
        assert_eq!(String::from_utf8(out).unwrap(), "Hello world\n");
    }

    #[test]
    fn terminal_observer_marks_skipped_frames() {
        colored::control::set_override(false);
        let mut out = Vec::new();
        {
            let mut observer = TerminalObserver::new(&mut out);
            observer.on_fragment("Hel");
            observer.on_malformed("data: oops");
            observer.on_fragment("Hello");
        }
        assert_eq!(String::from_utf8(out).unwrap(), "Hel [skipped frame] lo");
    }

    #[test]
    fn interrupt_cancels_only_the_active_exchange() {
        let gate = InterruptGate::default();
        assert!(!gate.interrupt());

        let token = gate.arm();
        assert!(gate.interrupt());
        assert!(token.is_cancelled());
        assert!(!gate.interrupt());

        let token = gate.arm();
        gate.disarm();
        assert!(!gate.interrupt());
        assert!(!token.is_cancelled());
    }
}
