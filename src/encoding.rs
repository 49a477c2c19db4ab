//! Declarative description of one encoding job.
//!
//! An [`Encoding`] carries the process-level settings (binaries, working
//! directory, input and output locators) and three layers of stream options:
//!
//! - `shared`: applies to every job built from the same template
//! - `input`: emitted before `-i`, scoped to the input
//! - `output`: per-output overrides layered on top of `shared`
//!
//! Every field is optional so that layers can be merged without losing the
//! difference between "unset" and "set to a default value".

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const DEFAULT_BINARY: &str = "ffmpeg";
pub const DEFAULT_PROBE_BINARY: &str = "ffprobe";
pub const DEFAULT_INPUT: &str = "pipe:0";
pub const DEFAULT_OUTPUT: &str = "pipe:1";

/// Stream options shared by the input, output and shared scopes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EncodingOptions {
    pub format: Option<String>,
    pub codec: Option<String>,
    pub audio_codec: Option<String>,
    pub video_codec: Option<String>,
    /// Plain numbers are read as kbit/s.
    pub audio_bitrate: Option<String>,
    /// Plain numbers are read as kbit/s.
    pub video_bitrate: Option<String>,
    pub min_video_bitrate: Option<String>,
    pub max_video_bitrate: Option<String>,
    pub video_buf_size: Option<String>,
    pub frame_rate: Option<f64>,
    pub sample_rate: Option<u32>,
    pub audio_channels: Option<u32>,
    pub audio_quality: Option<u32>,
    pub width: Option<String>,
    pub height: Option<String>,
    pub frames: Option<u64>,
    pub duration: Option<String>,
    #[serde(rename = "loop")]
    pub loop_count: Option<String>,
    pub no_audio: Option<bool>,
    pub no_video: Option<bool>,
    pub override_output: Option<bool>,
    pub args: Option<Vec<String>>,
}

fn take_set<T: Clone>(target: &mut Option<T>, value: &Option<T>) {
    if value.is_some() {
        target.clone_from(value);
    }
}

impl EncodingOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copies every option set in `other` over this one.
    pub fn merge(&mut self, other: &EncodingOptions) -> &mut Self {
        take_set(&mut self.format, &other.format);
        take_set(&mut self.codec, &other.codec);
        take_set(&mut self.audio_codec, &other.audio_codec);
        take_set(&mut self.video_codec, &other.video_codec);
        take_set(&mut self.audio_bitrate, &other.audio_bitrate);
        take_set(&mut self.video_bitrate, &other.video_bitrate);
        take_set(&mut self.min_video_bitrate, &other.min_video_bitrate);
        take_set(&mut self.max_video_bitrate, &other.max_video_bitrate);
        take_set(&mut self.video_buf_size, &other.video_buf_size);
        take_set(&mut self.frame_rate, &other.frame_rate);
        take_set(&mut self.sample_rate, &other.sample_rate);
        take_set(&mut self.audio_channels, &other.audio_channels);
        take_set(&mut self.audio_quality, &other.audio_quality);
        take_set(&mut self.width, &other.width);
        take_set(&mut self.height, &other.height);
        take_set(&mut self.frames, &other.frames);
        take_set(&mut self.duration, &other.duration);
        take_set(&mut self.loop_count, &other.loop_count);
        take_set(&mut self.no_audio, &other.no_audio);
        take_set(&mut self.no_video, &other.no_video);
        take_set(&mut self.override_output, &other.override_output);
        take_set(&mut self.args, &other.args);
        self
    }

    /// Keeps the options set here and fills the gaps from `base`.
    pub fn rebase(&mut self, base: &EncodingOptions) -> &mut Self {
        let mut rebased = base.clone();
        rebased.merge(self);
        *self = rebased;
        self
    }

    /// Returns `self` with `top` layered over it, leaving both untouched.
    pub fn overlay(&self, top: &EncodingOptions) -> EncodingOptions {
        let mut layered = self.clone();
        layered.merge(top);
        layered
    }

    pub fn is_empty(&self) -> bool {
        self == &EncodingOptions::default()
    }

    pub fn format(&mut self, format: impl Into<String>) -> &mut Self {
        self.format = Some(format.into());
        self
    }

    pub fn codec(&mut self, codec: impl Into<String>) -> &mut Self {
        self.codec = Some(codec.into());
        self
    }

    pub fn audio_codec(&mut self, codec: impl Into<String>) -> &mut Self {
        self.audio_codec = Some(codec.into());
        self
    }

    pub fn video_codec(&mut self, codec: impl Into<String>) -> &mut Self {
        self.video_codec = Some(codec.into());
        self
    }

    pub fn audio_bitrate(&mut self, bitrate: impl ToString) -> &mut Self {
        self.audio_bitrate = Some(bitrate.to_string());
        self
    }

    pub fn video_bitrate(&mut self, bitrate: impl ToString) -> &mut Self {
        self.video_bitrate = Some(bitrate.to_string());
        self
    }

    pub fn min_video_bitrate(&mut self, bitrate: impl ToString) -> &mut Self {
        self.min_video_bitrate = Some(bitrate.to_string());
        self
    }

    pub fn max_video_bitrate(&mut self, bitrate: impl ToString) -> &mut Self {
        self.max_video_bitrate = Some(bitrate.to_string());
        self
    }

    pub fn video_buf_size(&mut self, size: impl ToString) -> &mut Self {
        self.video_buf_size = Some(size.to_string());
        self
    }

    pub fn frame_rate(&mut self, fps: f64) -> &mut Self {
        self.frame_rate = Some(fps);
        self
    }

    pub fn sample_rate(&mut self, hz: u32) -> &mut Self {
        self.sample_rate = Some(hz);
        self
    }

    pub fn audio_channels(&mut self, count: u32) -> &mut Self {
        self.audio_channels = Some(count);
        self
    }

    pub fn audio_quality(&mut self, quality: u32) -> &mut Self {
        self.audio_quality = Some(quality);
        self
    }

    /// Scaled width; `-1` keeps the aspect ratio.
    pub fn width(&mut self, width: impl ToString) -> &mut Self {
        self.width = Some(width.to_string());
        self
    }

    /// Scaled height; `-1` keeps the aspect ratio.
    pub fn height(&mut self, height: impl ToString) -> &mut Self {
        self.height = Some(height.to_string());
        self
    }

    pub fn frames(&mut self, frames: u64) -> &mut Self {
        self.frames = Some(frames);
        self
    }

    pub fn duration(&mut self, duration: impl ToString) -> &mut Self {
        self.duration = Some(duration.to_string());
        self
    }

    pub fn loop_count(&mut self, count: impl ToString) -> &mut Self {
        self.loop_count = Some(count.to_string());
        self
    }

    pub fn no_audio(&mut self, disable: bool) -> &mut Self {
        self.no_audio = Some(disable);
        self
    }

    pub fn no_video(&mut self, disable: bool) -> &mut Self {
        self.no_video = Some(disable);
        self
    }

    pub fn override_output(&mut self, enable: bool) -> &mut Self {
        self.override_output = Some(enable);
        self
    }

    pub fn args<I, S>(&mut self, args: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = Some(args.into_iter().map(Into::into).collect());
        self
    }
}

/// One job: process settings plus layered stream options.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Encoding {
    binary: Option<PathBuf>,
    probe_binary: Option<PathBuf>,
    cwd: Option<PathBuf>,
    threads: Option<u32>,
    log_level: Option<String>,
    input: Option<String>,
    output: Option<String>,
    shared: EncodingOptions,
    #[serde(rename = "input_options")]
    input_scope: EncodingOptions,
    #[serde(rename = "output_options")]
    output_scope: EncodingOptions,
}

impl Encoding {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn binary(&self) -> &Path {
        self.binary
            .as_deref()
            .unwrap_or_else(|| Path::new(DEFAULT_BINARY))
    }

    pub fn probe_binary(&self) -> &Path {
        self.probe_binary
            .as_deref()
            .unwrap_or_else(|| Path::new(DEFAULT_PROBE_BINARY))
    }

    pub fn cwd(&self) -> Option<&Path> {
        self.cwd.as_deref()
    }

    pub fn threads(&self) -> Option<u32> {
        self.threads
    }

    pub fn log_level(&self) -> Option<&str> {
        self.log_level.as_deref()
    }

    pub fn input(&self) -> &str {
        self.input.as_deref().unwrap_or(DEFAULT_INPUT)
    }

    pub fn output(&self) -> &str {
        self.output.as_deref().unwrap_or(DEFAULT_OUTPUT)
    }

    pub fn shared(&self) -> &EncodingOptions {
        &self.shared
    }

    pub fn input_options(&self) -> &EncodingOptions {
        &self.input_scope
    }

    pub fn output_options(&self) -> &EncodingOptions {
        &self.output_scope
    }

    pub fn shared_mut(&mut self) -> &mut EncodingOptions {
        &mut self.shared
    }

    pub fn input_options_mut(&mut self) -> &mut EncodingOptions {
        &mut self.input_scope
    }

    pub fn output_options_mut(&mut self) -> &mut EncodingOptions {
        &mut self.output_scope
    }

    /// Options that apply to the output: `shared` with the output scope on top.
    pub fn effective_output_options(&self) -> EncodingOptions {
        self.shared.overlay(&self.output_scope)
    }

    pub fn set_binary(&mut self, binary: impl Into<PathBuf>) -> &mut Self {
        self.binary = Some(binary.into());
        self
    }

    pub fn set_probe_binary(&mut self, binary: impl Into<PathBuf>) -> &mut Self {
        self.probe_binary = Some(binary.into());
        self
    }

    pub fn set_cwd(&mut self, cwd: impl Into<PathBuf>) -> &mut Self {
        self.cwd = Some(cwd.into());
        self
    }

    pub fn set_threads(&mut self, threads: u32) -> &mut Self {
        self.threads = Some(threads);
        self
    }

    pub fn set_log_level(&mut self, level: impl Into<String>) -> &mut Self {
        self.log_level = Some(level.into());
        self
    }

    pub fn set_input(&mut self, input: impl Into<String>) -> &mut Self {
        self.input = Some(input.into());
        self
    }

    pub fn set_output(&mut self, output: impl Into<String>) -> &mut Self {
        self.output = Some(output.into());
        self
    }

    /// Whether the input is a real source rather than a stdin passthrough.
    pub fn has_input(&self) -> bool {
        !is_stream_locator(self.input())
    }

    /// Whether the output goes to a pipe, which rules out progress reporting
    /// since `-progress -` needs stdout for itself.
    pub fn is_output_stream(&self) -> bool {
        is_stream_locator(self.output())
    }

    /// Copies every setting present in `other` over this one.
    pub fn merge(&mut self, other: &Encoding) -> &mut Self {
        take_set(&mut self.binary, &other.binary);
        take_set(&mut self.probe_binary, &other.probe_binary);
        take_set(&mut self.cwd, &other.cwd);
        take_set(&mut self.threads, &other.threads);
        take_set(&mut self.log_level, &other.log_level);
        take_set(&mut self.input, &other.input);
        take_set(&mut self.output, &other.output);
        self.shared.merge(&other.shared);
        self.input_scope.merge(&other.input_scope);
        self.output_scope.merge(&other.output_scope);
        self
    }

    /// Keeps the settings present here and fills the gaps from `base`.
    pub fn rebase(&mut self, base: &Encoding) -> &mut Self {
        let mut rebased = base.clone();
        rebased.merge(self);
        *self = rebased;
        self
    }
}

fn is_stream_locator(locator: &str) -> bool {
    locator.is_empty() || locator == "-" || locator.starts_with("pipe:")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let encoding = Encoding::new();
        assert_eq!(encoding.binary(), Path::new("ffmpeg"));
        assert_eq!(encoding.probe_binary(), Path::new("ffprobe"));
        assert_eq!(encoding.input(), "pipe:0");
        assert_eq!(encoding.output(), "pipe:1");
        assert!(!encoding.has_input());
        assert!(encoding.is_output_stream());
        assert!(encoding.effective_output_options().is_empty());
    }

    #[test]
    fn test_stream_locators() {
        let mut encoding = Encoding::new();
        encoding.set_input("input.mp4").set_output("-");
        assert!(encoding.has_input());
        assert!(encoding.is_output_stream());

        encoding.set_output("out/video.webm");
        assert!(!encoding.is_output_stream());
    }

    #[test]
    fn test_merge_overrides_set_fields_only() {
        let mut base = EncodingOptions::new();
        base.width(640).audio_bitrate(128).override_output(true);

        let mut top = EncodingOptions::new();
        top.width(320).video_codec("libx264");

        base.merge(&top);
        assert_eq!(base.width.as_deref(), Some("320"));
        assert_eq!(base.audio_bitrate.as_deref(), Some("128"));
        assert_eq!(base.video_codec.as_deref(), Some("libx264"));
        assert_eq!(base.override_output, Some(true));
        assert_eq!(top.audio_bitrate, None);
    }

    #[test]
    fn test_rebase_keeps_own_fields() {
        let mut base = EncodingOptions::new();
        base.width(640).height(480);

        let mut own = EncodingOptions::new();
        own.width(200);
        own.rebase(&base);

        assert_eq!(own.width.as_deref(), Some("200"));
        assert_eq!(own.height.as_deref(), Some("480"));
        assert_eq!(base.width.as_deref(), Some("640"));
    }

    #[test]
    fn test_output_scope_layers_over_shared() {
        let mut encoding = Encoding::new();
        encoding.shared_mut().video_bitrate("1M").audio_bitrate(192);
        encoding.output_options_mut().video_bitrate("500k");

        let effective = encoding.effective_output_options();
        assert_eq!(effective.video_bitrate.as_deref(), Some("500k"));
        assert_eq!(effective.audio_bitrate.as_deref(), Some("192"));
        assert_eq!(encoding.shared().video_bitrate.as_deref(), Some("1M"));
    }

    #[test]
    fn test_clone_is_a_snapshot() {
        let mut template = Encoding::new();
        template.set_input("in.mp4").shared_mut().width(480);

        let job = template.clone();
        template.shared_mut().width(1080);
        template.set_input("other.mp4");

        assert_eq!(job.input(), "in.mp4");
        assert_eq!(job.shared().width.as_deref(), Some("480"));
    }

    #[test]
    fn test_encoding_merge_and_rebase() {
        let mut template = Encoding::new();
        template.set_binary("/opt/ffmpeg").set_threads(4);

        let mut job = Encoding::new();
        job.set_threads(2).set_output("out.mp4");
        job.rebase(&template);
        assert_eq!(job.binary(), Path::new("/opt/ffmpeg"));
        assert_eq!(job.threads(), Some(2));
        assert_eq!(job.output(), "out.mp4");

        let mut merged = template.clone();
        merged.merge(&job);
        assert_eq!(merged.threads(), Some(2));
        assert_eq!(template.threads(), Some(4));
    }

    #[test]
    fn test_options_deserialize_from_toml() {
        let options: EncodingOptions = toml::from_str(
            r#"
            video_codec = "libx264"
            audio_bitrate = "192k"
            loop = "0"
            args = ["-movflags", "+faststart"]
            "#,
        )
        .unwrap();

        assert_eq!(options.video_codec.as_deref(), Some("libx264"));
        assert_eq!(options.loop_count.as_deref(), Some("0"));
        assert_eq!(options.args.as_ref().map(Vec::len), Some(2));
        assert_eq!(options.width, None);
    }
}
