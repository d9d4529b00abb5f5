use crate::config::PipelineConfig;
use crate::dataset::{parse_upload, truncate_chars, Dataset, FileFormat, UploadedContent};
use crate::error::ParseError;
use crate::extract::extract_code_block;
use crate::llm::LlmTransport;
use crate::prompt::{overview_prompt, question_prompt};
use crate::render::RenderSurface;
use crate::script::{execute, ExecutionContext};

/// Shown for any transport failure. Deliberately generic: the underlying
/// error goes to the log, not the user.
pub const TRANSPORT_FAILURE_MESSAGE: &str = "The assistant failed to respond. Try again.";

/// Terminal state of one question turn. Every variant returns the session to
/// idle; nothing carries over to the next question except the dataset.
#[derive(Debug, Clone, PartialEq)]
pub enum TurnOutcome {
    TransportFailed,
    /// The reply had no code block. A normal outcome, not an error.
    Answered { answer: String },
    Executed { answer: String, code: String, charts: usize, tables: usize },
    ExecutionFailed { answer: String, code: String, error: String },
}

impl TurnOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            TurnOutcome::TransportFailed => "transport_failed",
            TurnOutcome::Answered { .. } => "answered",
            TurnOutcome::Executed { .. } => "executed",
            TurnOutcome::ExecutionFailed { .. } => "execution_failed",
        }
    }

    pub fn answer(&self) -> Option<&str> {
        match self {
            TurnOutcome::TransportFailed => None,
            TurnOutcome::Answered { answer }
            | TurnOutcome::Executed { answer, .. }
            | TurnOutcome::ExecutionFailed { answer, .. } => Some(answer),
        }
    }

    pub fn code(&self) -> Option<&str> {
        match self {
            TurnOutcome::Executed { code, .. }
            | TurnOutcome::ExecutionFailed { code, .. } => Some(code),
            _ => None,
        }
    }
}

/// One user's conversation state: the current upload plus the pipeline
/// bounds. Uploading again replaces the content wholesale.
#[derive(Debug, Clone, Default)]
pub struct Session {
    pipeline: PipelineConfig,
    content: Option<UploadedContent>,
}

impl Session {
    pub fn new(pipeline: PipelineConfig) -> Session {
        Session { pipeline, content: None }
    }

    pub fn content(&self) -> Option<&UploadedContent> {
        self.content.as_ref()
    }

    /// Parse an upload and show a bounded preview. On failure the previous
    /// content stays in place and the error is reported.
    #[tracing::instrument(skip_all, fields(format = format.label(), bytes = bytes.len()))]
    pub fn upload(
        &mut self,
        bytes: &[u8],
        format: FileFormat,
        surface: &dyn RenderSurface,
    ) -> Result<(), ParseError> {
        match parse_upload(bytes, format) {
            Ok(content) => {
                match &content {
                    UploadedContent::Table(ds) => surface.table(ds),
                    UploadedContent::Text(body) => {
                        surface.text(truncate_chars(body, self.pipeline.preview_chars))
                    }
                }
                self.content = Some(content);
                Ok(())
            }
            Err(e) => {
                surface.error(&format!("Error processing file: {}", e));
                Err(e)
            }
        }
    }

    /// The automatic summary turn that follows an upload. A failure here is
    /// reported but does not block later questions.
    #[tracing::instrument(skip_all)]
    pub async fn overview(&self, transport: &dyn LlmTransport, surface: &dyn RenderSurface) {
        let Some(prefix) = self.prompt_prefix() else {
            surface.info("Upload a file first.");
            return;
        };
        match transport.complete(&overview_prompt(&prefix)).await {
            Ok(text) => surface.text(&text),
            Err(e) => {
                tracing::warn!("overview request failed: {e}");
                surface.error(TRANSPORT_FAILURE_MESSAGE);
            }
        }
    }

    /// One question turn: prompt, transport, display, extract, audit,
    /// execute once. See [`TurnOutcome`] for the terminal states.
    #[tracing::instrument(skip_all, fields(question = question))]
    pub async fn ask(
        &self,
        question: &str,
        transport: &dyn LlmTransport,
        surface: &dyn RenderSurface,
    ) -> TurnOutcome {
        let prefix = self.prompt_prefix().unwrap_or_else(|| "(no file uploaded)".into());
        let prompt = question_prompt(&prefix, question);

        let response = match transport.complete(&prompt).await {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!("question request failed: {e}");
                surface.error(TRANSPORT_FAILURE_MESSAGE);
                return TurnOutcome::TransportFailed;
            }
        };
        surface.text(&response);

        let code = match extract_code_block(&response) {
            Some(code) => {
                // Audit step: the code is always shown before it runs.
                surface.code(code);
                code.to_string()
            }
            None => return TurnOutcome::Answered { answer: response },
        };

        let empty = Dataset::default();
        let dataset = self
            .content
            .as_ref()
            .and_then(|c| c.dataset())
            .unwrap_or(&empty);
        let ctx = ExecutionContext {
            dataset,
            surface,
            limits: self.pipeline.limits,
        };
        match execute(&code, &ctx) {
            Ok(report) => TurnOutcome::Executed {
                answer: response,
                code,
                charts: report.charts,
                tables: report.tables,
            },
            Err(e) => {
                surface.error(&format!("Error running chart code: {}", e));
                TurnOutcome::ExecutionFailed {
                    answer: response,
                    code,
                    error: e.to_string(),
                }
            }
        }
    }

    fn prompt_prefix(&self) -> Option<String> {
        self.content.as_ref().map(|c| {
            c.prompt_text(self.pipeline.head_rows, self.pipeline.prompt_prefix_chars)
        })
    }
}
