use async_trait::async_trait;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tracing::debug;

use super::capabilities::{self, Codecs, Encoders, Filters, Formats};
use super::info::MediaInfo;
use crate::encoding::{DEFAULT_PROBE_BINARY, Encoding};
use crate::error::{CommandFailure, EncodeError, Result};
use crate::process::EncodingStatus;

/// Source of input metadata for a running job
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Prober: Send + Sync {
    /// Fetch container and stream metadata for `input`
    async fn probe(&self, input: &str) -> Result<MediaInfo>;
}

/// ffprobe-backed metadata and capability queries
#[derive(Debug, Clone)]
pub struct FfprobeClient {
    binary: PathBuf,
    cwd: Option<PathBuf>,
    extra_args: Vec<String>,
}

impl Default for FfprobeClient {
    fn default() -> Self {
        Self::new(DEFAULT_PROBE_BINARY)
    }
}

impl FfprobeClient {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            cwd: None,
            extra_args: Vec::new(),
        }
    }

    /// Client using the job's probe binary and working directory
    pub fn for_encoding(encoding: &Encoding) -> Self {
        let client = Self::new(encoding.probe_binary());
        match encoding.cwd() {
            Some(cwd) => client.with_cwd(cwd),
            None => client,
        }
    }

    pub fn with_cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    /// Arguments inserted before the input of metadata queries
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.extra_args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn binary(&self) -> &Path {
        &self.binary
    }

    /// Container and stream metadata for one input
    pub async fn media_info(&self, input: &str) -> Result<MediaInfo> {
        let mut args: Vec<String> = ["-print_format", "json", "-show_format", "-show_streams"]
            .into_iter()
            .map(String::from)
            .collect();
        args.extend(self.extra_args.iter().cloned());
        args.push(input.to_string());

        let stdout = self.run(&args, Some(input)).await?;
        let raw: Value = serde_json::from_slice(&stdout)?;
        Ok(serde_json::from_value(camelize_keys(raw))?)
    }

    /// Version string from the `-version` banner
    pub async fn version(&self) -> Result<String> {
        let stdout = self.run(&["-version".to_string()], None).await?;
        Ok(capabilities::parse_version(&String::from_utf8_lossy(&stdout)))
    }

    pub async fn formats(&self) -> Result<Formats> {
        let listing = self.listing("-formats").await?;
        Ok(capabilities::parse_formats(&listing))
    }

    pub async fn filters(&self) -> Result<Filters> {
        let listing = self.listing("-filters").await?;
        Ok(capabilities::parse_filters(&listing))
    }

    pub async fn codecs(&self) -> Result<Codecs> {
        let listing = self.listing("-codecs").await?;
        Ok(capabilities::parse_codecs(&listing))
    }

    pub async fn encoders(&self) -> Result<Encoders> {
        let listing = self.listing("-encoders").await?;
        Ok(capabilities::parse_encoders(&listing))
    }

    async fn listing(&self, query: &str) -> Result<String> {
        let stdout = self.run(&[query.to_string()], None).await?;
        Ok(String::from_utf8_lossy(&stdout).into_owned())
    }

    /// Run `<binary> -hide_banner <args>` to completion and return stdout.
    async fn run(&self, args: &[String], input: Option<&str>) -> Result<Vec<u8>> {
        let mut cmd = Command::new(&self.binary);
        cmd.arg("-hide_banner")
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(cwd) = &self.cwd {
            cmd.current_dir(cwd);
        }

        let argv: Vec<String> = std::iter::once(self.binary.to_string_lossy().into_owned())
            .chain(std::iter::once("-hide_banner".to_string()))
            .chain(args.iter().cloned())
            .collect();
        debug!("Running ffprobe: {}", argv.join(" "));

        let output = cmd
            .output()
            .await
            .map_err(|e| EncodeError::from_probe_spawn(e, &self.binary))?;

        if !output.status.success() {
            return Err(EncodeError::ProbeFailed(Box::new(CommandFailure {
                status: Some(EncodingStatus::from(output.status)),
                stderr: output.stderr,
                cmd: argv,
                input: input.map(str::to_string),
                cwd: self.cwd.clone(),
                ..CommandFailure::new("FFprobe command failed.")
            })));
        }

        Ok(output.stdout)
    }
}

#[async_trait]
impl Prober for FfprobeClient {
    async fn probe(&self, input: &str) -> Result<MediaInfo> {
        self.media_info(input).await
    }
}

/// Rewrites every object key from `snake_case` to `camelCase`, recursing
/// into nested objects and arrays.
pub fn camelize_keys(value: Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(key, value)| (camelize(&key), camelize_keys(value)))
                .collect::<Map<String, Value>>(),
        ),
        Value::Array(items) => Value::Array(items.into_iter().map(camelize_keys).collect()),
        other => other,
    }
}

/// An underscore followed by a letter becomes the uppercase letter; any
/// other underscore is kept.
fn camelize(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    let mut chars = key.chars().peekable();
    while let Some(c) = chars.next() {
        match (c, chars.peek()) {
            ('_', Some(next)) if next.is_ascii_alphabetic() => {
                out.push(next.to_ascii_uppercase());
                chars.next();
            }
            _ => out.push(c),
        }
    }
    out
}
