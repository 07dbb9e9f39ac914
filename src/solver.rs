use std::path::Path;

use base64::Engine;
use thiserror::Error;
use tracing::{info, warn};

use crate::environment::Endpoint;
use crate::gemini::{ApiPayload, Content, Part};
use crate::prompt::build_prompt;

/// An image read fully into memory, ready to ride along as inline data
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageAttachment {
    pub mime_type: String,
    pub data: String,
    pub file_name: String,
    pub size: usize,
}

impl ImageAttachment {
    pub fn from_bytes(file_name: &str, mime_type: &str, bytes: &[u8]) -> Self {
        Self {
            mime_type: mime_type.to_string(),
            data: base64::engine::general_purpose::STANDARD.encode(bytes),
            file_name: file_name.to_string(),
            size: bytes.len(),
        }
    }

    /// One-line preview shown while the image is attached
    pub fn preview(&self) -> String {
        format!("🖼  {} ({}, {})", self.file_name, self.mime_type, human_size(self.size))
    }
}

#[derive(Debug, Error)]
pub enum ImageError {
    #[error("Could not read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("{0} is not an image file")]
    NotAnImage(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SubmitRejection {
    #[error("API Key is missing! Please add your GEMINI_API_KEY to the config file or press K to enter one.")]
    MissingApiKey,
    #[error("Please enter a question or upload an image.")]
    MissingInput,
}

/// Snapshot of the form taken at submit time
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SolverRequest {
    pub question: String,
    pub subject: String,
    pub level: String,
    pub language: String,
    pub notes: String,
    pub image: Option<ImageAttachment>,
}

impl SolverRequest {
    pub fn to_payload(&self) -> ApiPayload {
        let mut parts = vec![Part::text(build_prompt(self))];
        if let Some(image) = &self.image {
            parts.push(Part::inline_data(&image.mime_type, &image.data));
        }

        ApiPayload {
            contents: vec![Content { role: None, parts }],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Question,
    Subject,
    Level,
    Language,
    Notes,
}

impl Field {
    pub fn all() -> [Field; 5] {
        [Field::Question, Field::Subject, Field::Level, Field::Language, Field::Notes]
    }

    pub fn label(&self) -> &'static str {
        match self {
            Field::Question => "Question",
            Field::Subject => "Subject",
            Field::Level => "Level",
            Field::Language => "Language",
            Field::Notes => "Additional Notes",
        }
    }

    pub fn next(&self) -> Field {
        match self {
            Field::Question => Field::Subject,
            Field::Subject => Field::Level,
            Field::Level => Field::Language,
            Field::Language => Field::Notes,
            Field::Notes => Field::Question,
        }
    }

    pub fn prev(&self) -> Field {
        match self {
            Field::Question => Field::Notes,
            Field::Subject => Field::Question,
            Field::Level => Field::Subject,
            Field::Language => Field::Level,
            Field::Notes => Field::Language,
        }
    }
}

/// Solver form state plus the attached image, which outlives individual submits
#[derive(Debug, Clone, Default)]
pub struct SolverSession {
    pub question: String,
    pub subject: String,
    pub level: String,
    pub language: String,
    pub notes: String,
    image: Option<ImageAttachment>,
}

impl SolverSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn field(&self, field: Field) -> &String {
        match field {
            Field::Question => &self.question,
            Field::Subject => &self.subject,
            Field::Level => &self.level,
            Field::Language => &self.language,
            Field::Notes => &self.notes,
        }
    }

    pub fn field_mut(&mut self, field: Field) -> &mut String {
        match field {
            Field::Question => &mut self.question,
            Field::Subject => &mut self.subject,
            Field::Level => &mut self.level,
            Field::Language => &mut self.language,
            Field::Notes => &mut self.notes,
        }
    }

    pub fn image(&self) -> Option<&ImageAttachment> {
        self.image.as_ref()
    }

    /// Replace any attached image with the file at `path`
    pub async fn attach_image(&mut self, path: &Path) -> Result<&ImageAttachment, ImageError> {
        let shown = path.display().to_string();

        let mime = mime_guess::from_path(path).first_or_octet_stream();
        if mime.type_() != mime_guess::mime::IMAGE {
            warn!(path = %shown, mime = %mime, "Rejected non-image attachment");
            return Err(ImageError::NotAnImage(shown));
        }

        let bytes = tokio::fs::read(path).await.map_err(|source| ImageError::Read {
            path: shown.clone(),
            source,
        })?;

        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or(shown);

        let attachment = ImageAttachment::from_bytes(&file_name, mime.essence_str(), &bytes);
        info!(file = %attachment.file_name, mime = %attachment.mime_type, size = attachment.size, "Image attached");

        Ok(&*self.image.insert(attachment))
    }

    pub fn remove_image(&mut self) {
        if let Some(image) = self.image.take() {
            info!(file = %image.file_name, "Image removed");
        }
    }

    /// Validate and snapshot the form; nothing is sent when this fails.
    pub fn prepare(&self, endpoint: &Endpoint) -> Result<SolverRequest, SubmitRejection> {
        if endpoint.is_missing_key() {
            return Err(SubmitRejection::MissingApiKey);
        }
        if self.question.trim().is_empty() && self.image.is_none() {
            return Err(SubmitRejection::MissingInput);
        }

        Ok(SolverRequest {
            question: self.question.clone(),
            subject: self.subject.clone(),
            level: self.level.clone(),
            language: self.language.clone(),
            notes: self.notes.clone(),
            image: self.image.clone(),
        })
    }
}

fn human_size(bytes: usize) -> String {
    const KB: f64 = 1024.0;
    let b = bytes as f64;
    if b < KB {
        format!("{} B", bytes)
    } else if b < KB * KB {
        format!("{:.1} KB", b / KB)
    } else {
        format!("{:.1} MB", b / (KB * KB))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::environment::Mode;
    use crate::gemini::InlineData;
    use tempfile::tempdir;

    fn dev_endpoint(key: Option<&str>) -> Endpoint {
        Endpoint {
            mode: Mode::Development,
            url: "http://localhost/generate".to_string(),
            api_key: key.map(str::to_string),
        }
    }

    #[test]
    fn test_empty_submit_is_rejected() {
        let mut session = SolverSession::new();
        assert_eq!(
            session.prepare(&dev_endpoint(Some("k"))),
            Err(SubmitRejection::MissingInput)
        );

        // Whitespace alone is not a question
        session.question = "  \n\t ".to_string();
        assert_eq!(
            session.prepare(&dev_endpoint(Some("k"))),
            Err(SubmitRejection::MissingInput)
        );
    }

    #[test]
    fn test_missing_key_checked_first() {
        let mut session = SolverSession::new();
        session.question = "2 + 2?".to_string();
        assert_eq!(session.prepare(&dev_endpoint(None)), Err(SubmitRejection::MissingApiKey));

        let production = Endpoint {
            mode: Mode::Production,
            url: "https://example.com/api/generate".to_string(),
            api_key: None,
        };
        assert!(session.prepare(&production).is_ok());
    }

    #[tokio::test]
    async fn test_image_lifecycle_gates_submission() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("worksheet.png");
        std::fs::write(&path, b"hello").unwrap();

        let mut session = SolverSession::new();
        let attached = session.attach_image(&path).await.unwrap();
        assert_eq!(attached.file_name, "worksheet.png");
        assert_eq!(attached.mime_type, "image/png");
        assert_eq!(attached.data, "aGVsbG8=");

        let endpoint = dev_endpoint(Some("k"));
        let request = session.prepare(&endpoint).unwrap();
        assert!(request.image.is_some());

        // Image survives a submit
        assert!(session.image().is_some());

        session.remove_image();
        assert!(session.image().is_none());
        assert_eq!(session.prepare(&endpoint), Err(SubmitRejection::MissingInput));
    }

    #[tokio::test]
    async fn test_attach_replaces_previous_image() {
        let dir = tempdir().unwrap();
        let first = dir.path().join("a.jpg");
        let second = dir.path().join("b.gif");
        std::fs::write(&first, b"one").unwrap();
        std::fs::write(&second, b"two").unwrap();

        let mut session = SolverSession::new();
        session.attach_image(&first).await.unwrap();
        session.attach_image(&second).await.unwrap();

        let image = session.image().unwrap();
        assert_eq!(image.file_name, "b.gif");
        assert_eq!(image.mime_type, "image/gif");
    }

    #[tokio::test]
    async fn test_attach_rejects_non_images_and_missing_files() {
        let dir = tempdir().unwrap();
        let notes = dir.path().join("notes.txt");
        std::fs::write(&notes, b"text").unwrap();

        let mut session = SolverSession::new();
        assert!(matches!(
            session.attach_image(&notes).await,
            Err(ImageError::NotAnImage(_))
        ));
        assert!(matches!(
            session.attach_image(&dir.path().join("missing.png")).await,
            Err(ImageError::Read { .. })
        ));
        assert!(session.image().is_none());
    }

    #[test]
    fn test_payload_carries_prompt_then_image() {
        let request = SolverRequest {
            question: "Label the triangle".to_string(),
            image: Some(ImageAttachment::from_bytes("t.png", "image/png", b"hello")),
            ..SolverRequest::default()
        };
        let payload = request.to_payload();

        assert_eq!(payload.contents.len(), 1);
        assert!(payload.contents[0].role.is_none());
        let parts = &payload.contents[0].parts;
        assert_eq!(parts.len(), 2);
        assert!(matches!(&parts[0], Part::Text { text } if text.contains("Label the triangle")));
        assert_eq!(
            parts[1],
            Part::InlineData {
                inline_data: InlineData {
                    mime_type: "image/png".to_string(),
                    data: "aGVsbG8=".to_string(),
                }
            }
        );
    }

    #[test]
    fn test_human_size() {
        assert_eq!(human_size(512), "512 B");
        assert_eq!(human_size(2048), "2.0 KB");
        assert_eq!(human_size(3 * 1024 * 1024), "3.0 MB");
    }
}
