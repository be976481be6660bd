use std::path::PathBuf;

use quartzviz_contracts::jobs::GraphError;
use thiserror::Error;

/// Coarse classification callers branch on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    Asset,
    Upload,
    Submission,
    Transport,
    Timeout,
    Job,
    Decode,
    Io,
    Cancelled,
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("invalid input: {0}")]
    Validation(String),
    #[error("workflow parameters rejected ({status}): {detail}")]
    ParamsRejected { status: u16, detail: String },
    #[error("invalid workflow graph: {0}")]
    Graph(#[from] GraphError),
    #[error("no texture image available for product {code}")]
    Asset { code: String, path: Option<PathBuf> },
    #[error("upload failed: {0}")]
    Upload(String),
    #[error("job submission failed: {0}")]
    Submission(String),
    #[error("{context} failed: {message}")]
    Transport {
        context: String,
        status: Option<u16>,
        message: String,
    },
    #[error("{label} job timed out after {polls} polls ({waited_secs}s)")]
    Timeout {
        label: String,
        polls: u32,
        waited_secs: u64,
    },
    #[error("job failed: {reason} (code: {code})")]
    Job { reason: String, code: String },
    #[error("image could not be decoded: {0}")]
    Decode(String),
    #[error("failed to write {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("run cancelled")]
    Cancelled,
}

impl EngineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) | Self::ParamsRejected { .. } | Self::Graph(_) => {
                ErrorKind::Validation
            }
            Self::Asset { .. } => ErrorKind::Asset,
            Self::Upload(_) => ErrorKind::Upload,
            Self::Submission(_) => ErrorKind::Submission,
            Self::Transport { .. } => ErrorKind::Transport,
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::Job { .. } => ErrorKind::Job,
            Self::Decode(_) => ErrorKind::Decode,
            Self::Io { .. } => ErrorKind::Io,
            Self::Cancelled => ErrorKind::Cancelled,
        }
    }

    /// Caller-input problems, detected before any network call.
    pub fn is_validation(&self) -> bool {
        matches!(self.kind(), ErrorKind::Validation | ErrorKind::Asset)
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Single-line message shown to the person who started the run.
    pub fn user_message(&self) -> String {
        match self {
            Self::Validation(message) => message.clone(),
            Self::ParamsRejected { detail, .. } => {
                format!("The imaging service rejected the workflow parameters: {detail}")
            }
            Self::Graph(err) => format!("Internal workflow error: {err}"),
            Self::Asset { code, .. } => {
                let short = quartzviz_contracts::catalog::short_code(code);
                format!("No product image found for {short}.")
            }
            Self::Upload(message) => format!("Could not upload the image: {message}"),
            Self::Submission(message) => format!("Could not start the job: {message}"),
            Self::Transport { message, .. } => format!("Imaging service error: {message}"),
            Self::Timeout {
                label, waited_secs, ..
            } => format!("The {label} job did not finish within {waited_secs} seconds."),
            Self::Job { reason, code } => format!("The job failed: {reason} (code: {code})."),
            Self::Decode(_) => "The result image could not be read.".to_string(),
            Self::Io { source, .. } => format!("Could not save the image: {source}"),
            Self::Cancelled => "The run was cancelled.".to_string(),
        }
    }
}
