use std::time::{Duration, Instant};

use ratatui::layout::Rect;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::chat::{ChatRejection, ChatSession};
use crate::config::Config;
use crate::environment::Endpoint;
use crate::gemini::{ApiError, GeminiClient};
use crate::render::{render_markdown, RenderedAnswer};
use crate::solver::{Field, SolverSession};

pub const COPY_ACK_DURATION: Duration = Duration::from_secs(2);

type RequestTask = JoinHandle<Result<String, ApiError>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputMode {
    Normal,
    Editing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FocusPane {
    Form,
    Answer,
    Chat,
}

/// What the answer region currently shows
#[derive(Debug, Clone, Default)]
pub enum AnswerView {
    #[default]
    Hidden,
    Loading,
    Rendered(RenderedAnswer),
    Failed(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptKind {
    ImagePath,
    ApiKey,
}

/// Single-line popup input (image path, API key)
#[derive(Debug, Clone)]
pub struct PromptInput {
    pub kind: PromptKind,
    pub input: String,
    pub cursor: usize,
}

pub struct App {
    // Core state
    pub should_quit: bool,
    pub input_mode: InputMode,
    pub focus: FocusPane,

    // Solver form
    pub solver: SolverSession,
    pub field: Field,
    pub cursor: usize, // char cursor in the focused field
    pub answer: AnswerView,
    pub answer_scroll: u16,
    pub solve_task: Option<RequestTask>,

    // Chat panel
    pub chat: ChatSession,
    pub chat_visible: bool,
    pub chat_input: String,
    pub chat_cursor: usize,
    pub chat_scroll: u16,
    pub chat_follow: bool, // keep the newest message in view
    pub chat_task: Option<RequestTask>,

    // Popups and transient affordances
    pub alert: Option<String>,
    pub prompt: Option<PromptInput>,
    pub copied_at: Option<Instant>,
    pub animation_frame: u8,

    // Panel areas for mouse hit-testing (updated during render)
    pub answer_area: Option<Rect>,
    pub chat_area: Option<Rect>,

    pub config: Config,
    pub client: GeminiClient,
}

impl App {
    pub fn new(config: Config) -> Self {
        let endpoint = Endpoint::resolve(&config);
        info!(mode = endpoint.mode.as_str(), "Starting homework helper");

        let mut solver = SolverSession::new();
        solver.subject = config.subject.clone().unwrap_or_default();
        solver.level = config.level.clone().unwrap_or_default();
        solver.language = config.language.clone().unwrap_or_else(|| "English".to_string());

        Self {
            should_quit: false,
            input_mode: InputMode::Normal,
            focus: FocusPane::Form,

            solver,
            field: Field::Question,
            cursor: 0,
            answer: AnswerView::Hidden,
            answer_scroll: 0,
            solve_task: None,

            chat: ChatSession::new(),
            chat_visible: false,
            chat_input: String::new(),
            chat_cursor: 0,
            chat_scroll: 0,
            chat_follow: true,
            chat_task: None,

            alert: None,
            prompt: None,
            copied_at: None,
            animation_frame: 0,

            answer_area: None,
            chat_area: None,

            client: GeminiClient::new(endpoint),
            config,
        }
    }

    /// Submit control is disabled for exactly as long as a solve is in flight
    pub fn is_solving(&self) -> bool {
        self.solve_task.is_some()
    }

    pub fn submit_solver(&mut self) {
        if self.is_solving() {
            debug!("Solve already in flight, ignoring submit");
            return;
        }

        let request = match self.solver.prepare(self.client.endpoint()) {
            Ok(request) => request,
            Err(rejection) => {
                info!(reason = %rejection, "Solver submit rejected");
                self.alert = Some(rejection.to_string());
                return;
            }
        };

        info!(
            subject = %request.subject,
            level = %request.level,
            with_image = request.image.is_some(),
            "Submitting homework question"
        );

        self.answer = AnswerView::Loading;
        self.answer_scroll = 0;
        self.input_mode = InputMode::Normal;

        let client = self.client.clone();
        let payload = request.to_payload();
        self.solve_task = Some(tokio::spawn(async move { client.generate(&payload).await }));
    }

    pub fn submit_chat(&mut self) {
        match self.chat.submit(&self.chat_input) {
            Ok(payload) => {
                self.chat_input.clear();
                self.chat_cursor = 0;
                self.chat_follow = true;

                let client = self.client.clone();
                self.chat_task = Some(tokio::spawn(async move { client.generate(&payload).await }));
            }
            Err(ChatRejection::EmptyMessage) => {}
            Err(rejection @ ChatRejection::AwaitingResponse) => {
                debug!(reason = %rejection, "Chat submit rejected");
            }
        }
    }

    /// Collect finished requests; called from the event loop on every tick
    pub async fn poll_tasks(&mut self) {
        if self.solve_task.as_ref().is_some_and(|t| t.is_finished()) {
            if let Some(task) = self.solve_task.take() {
                let result = join(task).await;
                self.finish_solve(result);
            }
        }

        if self.chat_task.as_ref().is_some_and(|t| t.is_finished()) {
            if let Some(task) = self.chat_task.take() {
                let result = join(task).await;
                if let Err(e) = &result {
                    error!(error = %e, "Chat request failed");
                }
                self.chat.complete(result);
                self.chat_follow = true;
            }
        }
    }

    pub fn finish_solve(&mut self, result: Result<String, ApiError>) {
        self.answer = match result {
            Ok(text) => AnswerView::Rendered(render_markdown(&text)),
            Err(e) => {
                error!(error = %e, "Solve request failed");
                AnswerView::Failed(format!("Error: {}", e))
            }
        };
        self.answer_scroll = 0;
    }

    pub async fn attach_image(&mut self, path: &str) {
        let path = std::path::Path::new(path.trim());
        if let Err(e) = self.solver.attach_image(path).await {
            warn!(error = %e, "Image attach failed");
            self.alert = Some(e.to_string());
        }
    }

    pub fn remove_image(&mut self) {
        self.solver.remove_image();
    }

    pub fn set_api_key(&mut self, key: &str) {
        let key = key.trim();
        if key.is_empty() {
            return;
        }

        self.config.gemini_api_key = Some(key.to_string());
        if let Err(e) = Config::save_api_key(key) {
            warn!(error = %e, "Could not persist API key");
        }
        self.client = GeminiClient::new(Endpoint::resolve(&self.config));
    }

    pub fn toggle_chat(&mut self) {
        self.chat_visible = !self.chat_visible;
        if self.chat_visible {
            self.focus = FocusPane::Chat;
            self.input_mode = InputMode::Editing;
        } else {
            self.close_chat();
        }
    }

    pub fn close_chat(&mut self) {
        self.chat_visible = false;
        if self.focus == FocusPane::Chat {
            self.focus = FocusPane::Form;
            self.input_mode = InputMode::Normal;
        }
    }

    pub fn answer_text(&self) -> Option<&str> {
        match &self.answer {
            AnswerView::Rendered(answer) => Some(answer.plain.as_str()),
            AnswerView::Failed(message) => Some(message.as_str()),
            AnswerView::Hidden | AnswerView::Loading => None,
        }
    }

    pub fn copy_answer(&mut self) {
        let Some(text) = self.answer_text().map(str::to_string) else {
            return;
        };

        match crate::clipboard::copy(&text) {
            Ok(()) => self.acknowledge_copy(Instant::now()),
            Err(e) => {
                warn!(error = %e, "Clipboard copy failed");
                self.alert = Some(format!("Could not copy to clipboard: {}", e));
            }
        }
    }

    pub fn acknowledge_copy(&mut self, now: Instant) {
        self.copied_at = Some(now);
    }

    pub fn copy_acknowledged(&self) -> bool {
        self.copied_at.is_some()
    }

    /// Tick animation frame and expire the copy acknowledgment
    pub fn tick(&mut self, now: Instant) {
        if self.is_solving() || self.chat.is_awaiting() {
            self.animation_frame = (self.animation_frame + 1) % 3;
        }
        if self
            .copied_at
            .is_some_and(|at| now.duration_since(at) >= COPY_ACK_DURATION)
        {
            self.copied_at = None;
        }
    }

    pub fn focus_field(&mut self, field: Field) {
        self.field = field;
        self.cursor = self.solver.field(field).chars().count();
    }

    pub fn scroll_answer_down(&mut self) {
        self.answer_scroll = self.answer_scroll.saturating_add(1);
    }

    pub fn scroll_answer_up(&mut self) {
        self.answer_scroll = self.answer_scroll.saturating_sub(1);
    }

    pub fn scroll_chat_down(&mut self) {
        self.chat_follow = false;
        self.chat_scroll = self.chat_scroll.saturating_add(1);
    }

    pub fn scroll_chat_up(&mut self) {
        self.chat_follow = false;
        self.chat_scroll = self.chat_scroll.saturating_sub(1);
    }

    pub fn open_prompt(&mut self, kind: PromptKind) {
        self.prompt = Some(PromptInput {
            kind,
            input: String::new(),
            cursor: 0,
        });
    }
}

async fn join(task: RequestTask) -> Result<String, ApiError> {
    task.await
        .unwrap_or_else(|e| Err(ApiError::Interrupted(e.to_string())))
}
