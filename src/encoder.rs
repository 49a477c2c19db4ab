//! Fluent builder for one or more encoding jobs.
//!
//! Settings made before the first [`Encoder::output`] call go to the global
//! template. Each `output` call snapshots the template into a new job and
//! makes it the target of every following setter, so later changes never
//! leak into jobs declared earlier.
//!
//! ```no_run
//! # async fn run() -> ffencode::error::Result<()> {
//! use ffencode::Encoder;
//!
//! Encoder::with_input("movie.mp4")
//!     .audio_bitrate(192)
//!     .override_output(true)
//!     .output("small.mp4")
//!     .width(320)
//!     .output("large.mp4")
//!     .width(1280)
//!     .encode()
//!     .await
//! # }
//! ```

use futures::stream::{self, SelectAll};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use crate::encoding::{Encoding, EncodingOptions};
use crate::error::{EncodeError, Result};
use crate::media::Prober;
use crate::process::{EncodingEvent, EncodingProcess};

/// Callback run by [`Encoder::encode`] for every event of a job.
pub type EventHandler = Arc<dyn Fn(&EncodingEvent) + Send + Sync>;

/// Job list plus the template new jobs are cloned from.
///
/// Iterating yields one unstarted [`EncodingProcess`] per declared output,
/// in declaration order.
#[derive(Default)]
pub struct Encoder {
    global: Encoding,
    encodings: Vec<Encoding>,
    global_handlers: Vec<EventHandler>,
    /// Parallel to `encodings`.
    handlers: Vec<Vec<EventHandler>>,
    active: Option<usize>,
    cursor: usize,
    prober: Option<Arc<dyn Prober>>,
}

impl Encoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_input(input: impl Into<String>) -> Self {
        Self::new().input(input)
    }

    /// Start from an existing template, e.g. one filled from settings.
    pub fn from_template(global: Encoding) -> Self {
        Self {
            global,
            ..Self::default()
        }
    }

    /// The global template.
    pub fn global(&self) -> &Encoding {
        &self.global
    }

    /// Template changes apply to outputs declared afterwards.
    pub fn global_mut(&mut self) -> &mut Encoding {
        &mut self.global
    }

    /// The job currently receiving settings, if any output was declared.
    pub fn encoding(&self) -> Option<&Encoding> {
        self.active.and_then(|i| self.encodings.get(i))
    }

    pub fn encodings(&self) -> &[Encoding] {
        &self.encodings
    }

    /// Metadata source handed to every produced process.
    pub fn prober(mut self, prober: Arc<dyn Prober>) -> Self {
        self.prober = Some(prober);
        self
    }

    fn target(&mut self) -> &mut Encoding {
        match self.active {
            Some(i) => &mut self.encodings[i],
            None => &mut self.global,
        }
    }

    /// Output-side options of the current target: the shared scope of the
    /// template, or the output scope of the active job.
    fn options(&mut self) -> &mut EncodingOptions {
        match self.active {
            Some(i) => self.encodings[i].output_options_mut(),
            None => self.global.shared_mut(),
        }
    }

    /// Declare a new job writing to `path`.
    pub fn output(mut self, path: impl Into<String>) -> Self {
        let mut encoding = self.global.clone();
        encoding.set_output(path);
        self.encodings.push(encoding);
        self.handlers.push(self.global_handlers.clone());
        self.active = Some(self.encodings.len() - 1);
        self
    }

    /// Run `handler` for each event of the active job, or of every job
    /// declared afterwards when no output was declared yet. Handlers are
    /// called by [`encode`](Self::encode) in registration order.
    pub fn on_event<F>(mut self, handler: F) -> Self
    where
        F: Fn(&EncodingEvent) + Send + Sync + 'static,
    {
        let handler: EventHandler = Arc::new(handler);
        match self.active {
            Some(i) => self.handlers[i].push(handler),
            None => self.global_handlers.push(handler),
        }
        self
    }

    pub fn input(mut self, source: impl Into<String>) -> Self {
        self.target().set_input(source);
        self
    }

    /// Options emitted before `-i`.
    pub fn input_options(mut self, configure: impl FnOnce(&mut EncodingOptions)) -> Self {
        configure(self.target().input_options_mut());
        self
    }

    pub fn cwd(mut self, path: impl Into<PathBuf>) -> Self {
        self.target().set_cwd(path);
        self
    }

    pub fn threads(mut self, count: u32) -> Self {
        self.target().set_threads(count);
        self
    }

    pub fn binary(mut self, ffmpeg: impl Into<PathBuf>) -> Self {
        self.target().set_binary(ffmpeg);
        self
    }

    pub fn probe_binary(mut self, ffprobe: impl Into<PathBuf>) -> Self {
        self.target().set_probe_binary(ffprobe);
        self
    }

    pub fn log_level(mut self, level: impl Into<String>) -> Self {
        self.target().set_log_level(level);
        self
    }

    pub fn override_output(mut self, enable: bool) -> Self {
        self.options().override_output(enable);
        self
    }

    pub fn format(mut self, format: impl Into<String>) -> Self {
        self.options().format(format);
        self
    }

    pub fn codec(mut self, codec: impl Into<String>) -> Self {
        self.options().codec(codec);
        self
    }

    pub fn audio_codec(mut self, codec: impl Into<String>) -> Self {
        self.options().audio_codec(codec);
        self
    }

    pub fn video_codec(mut self, codec: impl Into<String>) -> Self {
        self.options().video_codec(codec);
        self
    }

    pub fn audio_bitrate(mut self, bitrate: impl ToString) -> Self {
        self.options().audio_bitrate(bitrate);
        self
    }

    pub fn video_bitrate(mut self, bitrate: impl ToString) -> Self {
        self.options().video_bitrate(bitrate);
        self
    }

    pub fn min_video_bitrate(mut self, bitrate: impl ToString) -> Self {
        self.options().min_video_bitrate(bitrate);
        self
    }

    pub fn max_video_bitrate(mut self, bitrate: impl ToString) -> Self {
        self.options().max_video_bitrate(bitrate);
        self
    }

    pub fn video_buf_size(mut self, size: impl ToString) -> Self {
        self.options().video_buf_size(size);
        self
    }

    pub fn width(mut self, width: impl ToString) -> Self {
        self.options().width(width);
        self
    }

    pub fn height(mut self, height: impl ToString) -> Self {
        self.options().height(height);
        self
    }

    pub fn frame_rate(mut self, fps: f64) -> Self {
        self.options().frame_rate(fps);
        self
    }

    pub fn sample_rate(mut self, hz: u32) -> Self {
        self.options().sample_rate(hz);
        self
    }

    pub fn frames(mut self, frames: u64) -> Self {
        self.options().frames(frames);
        self
    }

    pub fn audio_quality(mut self, quality: u32) -> Self {
        self.options().audio_quality(quality);
        self
    }

    pub fn audio_channels(mut self, count: u32) -> Self {
        self.options().audio_channels(count);
        self
    }

    pub fn duration(mut self, duration: impl ToString) -> Self {
        self.options().duration(duration);
        self
    }

    pub fn loop_count(mut self, count: impl ToString) -> Self {
        self.options().loop_count(count);
        self
    }

    pub fn no_audio(mut self, disable: bool) -> Self {
        self.options().no_audio(disable);
        self
    }

    pub fn no_video(mut self, disable: bool) -> Self {
        self.options().no_video(disable);
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.options().args(args);
        self
    }

    /// Jobs as an async stream, for use with [`fan_in`].
    pub fn into_stream(self) -> stream::Iter<Encoder> {
        stream::iter(self)
    }

    /// Run every job in declaration order, stopping at the first failure.
    pub async fn encode(mut self) -> Result<()> {
        let handlers: Vec<_> = std::mem::take(&mut self.handlers)
            .into_iter()
            .skip(self.cursor)
            .collect();

        for (process, handlers) in self.zip(handlers) {
            process.start()?;
            let outcome = wait_for_job(&process, &handlers).await;
            process.close();
            outcome?;
        }
        Ok(())
    }
}

async fn wait_for_job(process: &EncodingProcess, handlers: &[EventHandler]) -> Result<()> {
    while let Some(event) = process.events().next().await? {
        for handler in handlers {
            handler(&event);
        }
        if let EncodingEvent::Error { error, encoding } = event {
            return Err(EncodeError::JobFailed {
                output: encoding.output().to_string(),
                source: error,
            });
        }
    }
    info!("Encoded {}", process.encoding().output());
    Ok(())
}

impl Iterator for Encoder {
    type Item = EncodingProcess;

    fn next(&mut self) -> Option<EncodingProcess> {
        let encoding = self.encodings.get(self.cursor)?.clone();
        self.cursor += 1;

        let process = EncodingProcess::new(encoding);
        Some(match &self.prober {
            Some(prober) => process.with_prober(prober.clone()),
            None => process,
        })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.encodings.len().saturating_sub(self.cursor);
        (remaining, Some(remaining))
    }
}

/// Merge several encoders into one stream of jobs, polled round-robin.
pub fn fan_in<I>(encoders: I) -> SelectAll<stream::Iter<Encoder>>
where
    I: IntoIterator<Item = Encoder>,
{
    stream::select_all(encoders.into_iter().map(Encoder::into_stream))
}
