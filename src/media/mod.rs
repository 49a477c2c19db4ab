// Media boundary
//
// Everything that talks to, or formats input for, the ffmpeg binaries:
// - Commands: argv construction for one encoding job
// - Probe: ffprobe metadata and capability queries behind the `Prober` trait
// - Info: typed ffprobe metadata
// - Capabilities: parsers for ffmpeg's capability listings

pub mod capabilities;
pub mod commands;
pub mod info;
pub mod probe;

pub use capabilities::{
    CodecInfo, CodecTraits, Codecs, EncoderInfo, Encoders, FilterInfo, FilterPad, Filters,
    FormatInfo, Formats, MediaKind,
};
pub use commands::FfmpegCommand;
pub use info::{CodecType, MediaFormat, MediaInfo, MediaStream};
#[cfg(test)]
pub use probe::MockProber;
pub use probe::{FfprobeClient, Prober, camelize_keys};
