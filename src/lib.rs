pub mod app;
pub mod chat;
pub mod clipboard;
pub mod config;
pub mod environment;
pub mod gemini;
pub mod handler;
pub mod logging;
pub mod prompt;
pub mod render;
pub mod solver;
pub mod tui;
pub mod ui;

// Re-export main types for convenience
pub use app::App;
pub use chat::{ChatMessage, ChatRole, ChatSession};
pub use config::Config;
pub use environment::{Endpoint, Mode};
pub use gemini::{ApiError, ApiPayload, GeminiClient};
pub use prompt::build_prompt;
pub use render::{render_markdown, RenderedAnswer};
pub use solver::{ImageAttachment, SolverRequest, SolverSession, SubmitRejection};
