use std::path::Path;
use tokio::process::Command;

use crate::encoding::{Encoding, EncodingOptions};

/// ffmpeg argument list under construction.
///
/// The first element of [`FfmpegCommand::to_vec`] is the binary, followed by
/// the arguments in the order they were added.
#[derive(Debug, Clone, PartialEq)]
pub struct FfmpegCommand {
    pub binary: String,
    pub args: Vec<String>,
}

impl FfmpegCommand {
    /// Create a new command for the given binary
    pub fn new<S: Into<String>>(binary: S) -> Self {
        Self {
            binary: binary.into(),
            args: Vec::new(),
        }
    }

    /// Formats the full command line for one job.
    ///
    /// `silent` drops the `-progress - -nostats` pair; it is set when stdout
    /// carries the encoded media instead of progress records.
    ///
    /// Order: binary, `-hide_banner`, input-scoped options, `-i <input>`,
    /// `-y`/`-n`, progress flags, `-threads`, output options (shared with the
    /// output scope layered on top), `-loglevel`, raw arguments, output.
    pub fn from_encoding(encoding: &Encoding, silent: bool) -> Self {
        let output_options = encoding.effective_output_options();

        let mut cmd = Self::new(encoding.binary().to_string_lossy())
            .arg("-hide_banner")
            .stream_options(encoding.input_options())
            .raw_args(encoding.input_options())
            .input(encoding.input())
            .overwrite(output_options.override_output.unwrap_or(false));

        if !silent {
            cmd = cmd.progress();
        }

        if let Some(threads) = encoding.threads() {
            cmd = cmd.arg("-threads").arg(threads.to_string());
        }

        cmd = cmd.stream_options(&output_options);

        if let Some(level) = encoding.log_level() {
            cmd = cmd.arg("-loglevel").arg(level);
        }

        cmd.raw_args(&output_options).output(encoding.output())
    }

    /// Add an argument
    pub fn arg<S: Into<String>>(mut self, arg: S) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Add multiple arguments
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(|s| s.into()));
        self
    }

    /// Add input
    pub fn input<S: Into<String>>(self, input: S) -> Self {
        self.arg("-i").arg(input)
    }

    /// Add output
    pub fn output<S: Into<String>>(self, output: S) -> Self {
        self.arg(output)
    }

    /// Overwrite (`-y`) or refuse to overwrite (`-n`) an existing output
    pub fn overwrite(self, enable: bool) -> Self {
        self.arg(if enable { "-y" } else { "-n" })
    }

    /// Machine-readable progress on stdout
    pub fn progress(self) -> Self {
        self.args(["-progress", "-", "-nostats"])
    }

    /// Add video filter
    pub fn video_filter<S: Into<String>>(self, filter: S) -> Self {
        self.arg("-vf").arg(filter)
    }

    fn flag<T: ToString>(self, flag: &str, value: Option<&T>) -> Self {
        match value {
            Some(value) => self.arg(flag).arg(value.to_string()),
            None => self,
        }
    }

    fn switch(self, flag: &str, enabled: Option<bool>) -> Self {
        if enabled.unwrap_or(false) {
            self.arg(flag)
        } else {
            self
        }
    }

    fn stream_options(self, options: &EncodingOptions) -> Self {
        let audio_bitrate = options.audio_bitrate.as_deref().map(with_kbit_suffix);
        let video_bitrate = options.video_bitrate.as_deref().map(with_kbit_suffix);

        let cmd = self
            .flag("-f", options.format.as_ref())
            .flag("-codec", options.codec.as_ref())
            .flag("-acodec", options.audio_codec.as_ref())
            .flag("-vcodec", options.video_codec.as_ref())
            .flag("-b:a", audio_bitrate.as_ref())
            .flag("-b:v", video_bitrate.as_ref())
            .flag("-minrate", options.min_video_bitrate.as_ref())
            .flag("-maxrate", options.max_video_bitrate.as_ref())
            .flag("-bufsize", options.video_buf_size.as_ref())
            .flag("-r", options.frame_rate.as_ref())
            .flag("-ar", options.sample_rate.as_ref())
            .flag("-vframes", options.frames.as_ref())
            .flag("-q:a", options.audio_quality.as_ref())
            .flag("-ac", options.audio_channels.as_ref())
            .flag("-t", options.duration.as_ref())
            .flag("-loop", options.loop_count.as_ref())
            .switch("-an", options.no_audio)
            .switch("-vn", options.no_video);

        if options.width.is_some() || options.height.is_some() {
            let width = options.width.as_deref().unwrap_or("-1");
            let height = options.height.as_deref().unwrap_or("-1");
            cmd.video_filter(format!("scale={}:{}", width, height))
        } else {
            cmd
        }
    }

    fn raw_args(self, options: &EncodingOptions) -> Self {
        match &options.args {
            Some(args) => self.args(args.iter().cloned()),
            None => self,
        }
    }

    /// Binary followed by every argument
    pub fn to_vec(&self) -> Vec<String> {
        let mut argv = Vec::with_capacity(self.args.len() + 1);
        argv.push(self.binary.clone());
        argv.extend(self.args.iter().cloned());
        argv
    }

    /// Process builder for this command line
    pub fn to_command(&self, cwd: Option<&Path>) -> Command {
        let mut cmd = Command::new(&self.binary);
        cmd.args(&self.args);
        if let Some(cwd) = cwd {
            cmd.current_dir(cwd);
        }
        cmd
    }
}

/// Plain numbers are kbit/s for ffmpeg's `-b:a`/`-b:v`; anything carrying a
/// unit is passed through.
fn with_kbit_suffix(bitrate: &str) -> String {
    if bitrate.trim().parse::<f64>().is_ok() {
        format!("{}k", bitrate.trim())
    } else {
        bitrate.to_string()
    }
}
