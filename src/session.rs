//! Session state: the selected image, the instruction and the request cycle.
//!
//! A [`Session`] moves through four states:
//!
//! ```text
//! Idle ──submit──▶ Loading ──ok──▶ Success
//!   ▲                 │
//!   │                 └──err──▶ Error
//!   └── select_image (from any state)
//! ```
//!
//! Only one request is ever outstanding: [`Session::begin_submit`] refuses
//! while a request is loading or an intake is still running.

use crate::error::Result;
use crate::image::{SourceFile, SourceImage, TransformationRequest, TransformationResult};
use crate::transform::ImageTransformer;
use serde::{Deserialize, Serialize};

/// Instruction offered before the user edits it.
pub const DEFAULT_INSTRUCTION: &str = "Verwandel diese Waldpilzbild in eine haarige Plüschwelt";

/// Error message shown when a failure carries no message of its own.
pub const GENERIC_ERROR_MESSAGE: &str = "Something went wrong during generation.";

/// Where a session is in its request cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AppState {
    /// Nothing submitted since the current image was selected.
    #[default]
    Idle,
    /// A transformation request is outstanding.
    Loading,
    /// The last request returned an image.
    Success,
    /// The last request failed.
    Error,
}

impl AppState {
    /// Returns the state name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Loading => "loading",
            Self::Success => "success",
            Self::Error => "error",
        }
    }
}

impl std::fmt::Display for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// State holder for one user session.
#[derive(Debug, Clone)]
pub struct Session {
    source: Option<SourceImage>,
    instruction: String,
    state: AppState,
    result: Option<TransformationResult>,
    error: Option<String>,
    intake_pending: bool,
}

impl Default for Session {
    fn default() -> Self {
        Self {
            source: None,
            instruction: DEFAULT_INSTRUCTION.to_string(),
            state: AppState::Idle,
            result: None,
            error: None,
            intake_pending: false,
        }
    }
}

impl Session {
    /// Creates an idle session with the default instruction.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the current state.
    pub fn state(&self) -> AppState {
        self.state
    }

    /// Returns the selected source image.
    pub fn source(&self) -> Option<&SourceImage> {
        self.source.as_ref()
    }

    /// Returns the current instruction.
    pub fn instruction(&self) -> &str {
        &self.instruction
    }

    /// Replaces the instruction used by the next submission.
    pub fn set_instruction(&mut self, instruction: impl Into<String>) {
        self.instruction = instruction.into();
    }

    /// Returns the result of the last successful request.
    pub fn result(&self) -> Option<&TransformationResult> {
        self.result.as_ref()
    }

    /// Returns the message of the last failed request.
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Returns true while a selected file is being normalized.
    pub fn is_intake_pending(&self) -> bool {
        self.intake_pending
    }

    /// Returns true if a submission would be accepted right now.
    pub fn can_submit(&self) -> bool {
        self.source.is_some() && !self.intake_pending && self.state != AppState::Loading
    }

    /// Marks the start of an intake. Submission is disabled until it ends.
    pub fn begin_intake(&mut self) {
        self.intake_pending = true;
    }

    /// Ends an intake that failed, leaving everything else as it was.
    pub fn abort_intake(&mut self) {
        self.intake_pending = false;
    }

    /// Selects a new source image, resetting to [`AppState::Idle`].
    ///
    /// Any previous result and error are dropped, whatever the current state.
    pub fn select_image(&mut self, source: SourceImage) {
        tracing::debug!(name = %source.name, width = source.width, height = source.height, "image selected");
        self.source = Some(source);
        self.result = None;
        self.error = None;
        self.state = AppState::Idle;
        self.intake_pending = false;
    }

    /// Starts a submission, returning the request to send.
    ///
    /// Returns `None` and changes nothing when no image is selected, an
    /// intake is pending, or a request is already loading.
    pub fn begin_submit(&mut self) -> Option<TransformationRequest> {
        if !self.can_submit() {
            return None;
        }
        let request = self.source.as_ref()?.request(self.instruction.clone());
        self.state = AppState::Loading;
        self.error = None;
        Some(request)
    }

    /// Completes the outstanding request with an image.
    pub fn resolve_success(&mut self, result: TransformationResult) {
        if self.state != AppState::Loading {
            tracing::warn!(state = %self.state, "ignoring result with no request outstanding");
            return;
        }
        self.result = Some(result);
        self.state = AppState::Success;
    }

    /// Completes the outstanding request with a failure.
    ///
    /// An empty message is replaced by [`GENERIC_ERROR_MESSAGE`].
    pub fn resolve_error(&mut self, message: Option<String>) {
        if self.state != AppState::Loading {
            tracing::warn!(state = %self.state, "ignoring failure with no request outstanding");
            return;
        }
        let message = message
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| GENERIC_ERROR_MESSAGE.to_string());
        self.error = Some(message);
        self.state = AppState::Error;
    }

    /// Normalizes `file` and selects it.
    ///
    /// On failure the error is returned and the previous image, result and
    /// error stay as they were.
    pub async fn intake(&mut self, file: &SourceFile) -> Result<()> {
        self.begin_intake();
        match crate::image::intake(file).await {
            Ok(source) => {
                self.select_image(source);
                Ok(())
            }
            Err(e) => {
                tracing::warn!(name = %file.name(), "image intake failed: {e}");
                self.abort_intake();
                Err(e)
            }
        }
    }

    /// Submits the selected image to `transformer` and records the outcome.
    ///
    /// Remote failures are logged and stored as the session error rather
    /// than returned. Returns the state reached, or `None` if the
    /// submission was refused.
    pub async fn generate<T>(&mut self, transformer: &T) -> Option<AppState>
    where
        T: ImageTransformer + ?Sized,
    {
        let request = self.begin_submit()?;

        match transformer.transform(&request).await {
            Ok(result) => self.resolve_success(result),
            Err(e) => {
                tracing::error!(transformer = %transformer.name(), "transformation failed: {e}");
                self.resolve_error(Some(e.to_string()));
            }
        }

        Some(self.state)
    }
}
