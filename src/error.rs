use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;

use crate::process::EncodingStatus;

#[derive(Error, Debug)]
pub enum EncodeError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("FFmpeg binary not found: {}", .binary.display())]
    BinaryNotFound {
        binary: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("FFmpeg binary not executable: {}", .binary.display())]
    BinaryPermissionDenied {
        binary: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("FFprobe binary not found: {}", .binary.display())]
    ProbeBinaryNotFound {
        binary: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("FFprobe binary not executable: {}", .binary.display())]
    ProbeBinaryPermissionDenied {
        binary: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    ProbeFailed(Box<CommandFailure>),

    #[error(transparent)]
    CommandFailed(Box<CommandFailure>),

    #[error("EncodingProcess::start() called multiple times")]
    AlreadyStarted,

    #[error("Encoding process not started. Use EncodingProcess::start() to start the encoding process")]
    ProcessNotStarted,

    #[error("EventStream::dispose() called multiple times")]
    AlreadyDisposed,

    #[error("Encoding of {output} failed")]
    JobFailed {
        output: String,
        #[source]
        source: Arc<EncodeError>,
    },
}

pub type Result<T> = std::result::Result<T, EncodeError>;

impl EncodeError {
    /// Maps a spawn failure of the ffmpeg binary to the matching error kind.
    pub fn from_spawn(source: std::io::Error, binary: &Path) -> Self {
        let binary = binary.to_path_buf();
        match source.kind() {
            std::io::ErrorKind::NotFound => Self::BinaryNotFound { binary, source },
            std::io::ErrorKind::PermissionDenied => Self::BinaryPermissionDenied { binary, source },
            _ => Self::Io(source),
        }
    }

    /// Maps a spawn failure of the ffprobe binary to the matching error kind.
    pub fn from_probe_spawn(source: std::io::Error, binary: &Path) -> Self {
        let binary = binary.to_path_buf();
        match source.kind() {
            std::io::ErrorKind::NotFound => Self::ProbeBinaryNotFound { binary, source },
            std::io::ErrorKind::PermissionDenied => {
                Self::ProbeBinaryPermissionDenied { binary, source }
            }
            _ => Self::Io(source),
        }
    }

    /// The structured failure for errors produced by a finished external command.
    pub fn command_failure(&self) -> Option<&CommandFailure> {
        match self {
            Self::CommandFailed(failure) | Self::ProbeFailed(failure) => Some(&**failure),
            Self::JobFailed { source, .. } => source.command_failure(),
            _ => None,
        }
    }

    /// Contract violations by the caller, as opposed to environmental failures.
    pub fn is_usage_error(&self) -> bool {
        matches!(
            self,
            Self::AlreadyStarted | Self::ProcessNotStarted | Self::AlreadyDisposed
        )
    }
}

/// Everything known about a failed ffmpeg or ffprobe invocation.
#[derive(Debug, Default)]
pub struct CommandFailure {
    pub message: String,
    pub status: Option<EncodingStatus>,
    pub stderr: Vec<u8>,
    pub cmd: Vec<String>,
    pub input: Option<String>,
    pub output: Option<String>,
    pub cwd: Option<PathBuf>,
    pub source: Option<Box<EncodeError>>,
}

impl CommandFailure {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ..Default::default()
        }
    }

    pub fn stderr_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stderr).into_owned()
    }
}

impl fmt::Display for CommandFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.message)?;
        if let Some(status) = &self.status {
            match status.code {
                Some(code) => writeln!(f, "  Exit code: {}", code)?,
                None => writeln!(f, "  Exit code: none")?,
            }
            if let Some(signal) = status.signal {
                writeln!(f, "  Signal: {}", signal)?;
            }
        }
        if let Some(binary) = self.cmd.first() {
            writeln!(f, "  Binary: {}", binary)?;
        }
        if let Some(input) = &self.input {
            writeln!(f, "  Input file: {}", input)?;
        }
        if let Some(output) = &self.output {
            writeln!(f, "  Output file: {}", output)?;
        }
        if let Some(cwd) = &self.cwd {
            writeln!(f, "  Working directory: {}", cwd.display())?;
        }
        if !self.cmd.is_empty() {
            writeln!(f, "  Command: {}", self.cmd.join(" "))?;
        }
        let stderr = self.stderr_lossy();
        let stderr = stderr.trim();
        if !stderr.is_empty() {
            write!(f, "\n{}", stderr)?;
        }
        Ok(())
    }
}

impl std::error::Error for CommandFailure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_deref()
            .map(|e| e as &(dyn std::error::Error + 'static))
    }
}
