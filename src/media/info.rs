use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Probe metadata for one input, as reported by
/// `ffprobe -print_format json -show_format -show_streams` after its keys
/// were camelized.
///
/// ffprobe reports most numeric properties as strings (`"duration": "10.0"`),
/// so they are kept verbatim and parsed on demand. Keys without a dedicated
/// field are preserved in `extra`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaInfo {
    #[serde(default)]
    pub format: MediaFormat,
    #[serde(default)]
    pub streams: Vec<MediaStream>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaFormat {
    pub filename: Option<String>,
    pub nb_streams: Option<u32>,
    pub nb_programs: Option<u32>,
    pub format_name: Option<String>,
    pub format_long_name: Option<String>,
    pub start_time: Option<String>,
    pub duration: Option<String>,
    pub size: Option<String>,
    pub bit_rate: Option<String>,
    pub probe_score: Option<u32>,
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CodecType {
    Video,
    Audio,
    Subtitle,
    Data,
    Attachment,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaStream {
    pub index: Option<u32>,
    pub codec_name: Option<String>,
    pub codec_long_name: Option<String>,
    pub profile: Option<String>,
    pub codec_type: Option<CodecType>,
    pub codec_tag_string: Option<String>,
    pub duration: Option<String>,
    pub bit_rate: Option<String>,
    pub nb_frames: Option<String>,

    // video
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub pix_fmt: Option<String>,
    pub r_frame_rate: Option<String>,
    pub avg_frame_rate: Option<String>,
    pub display_aspect_ratio: Option<String>,

    // audio
    pub sample_fmt: Option<String>,
    pub sample_rate: Option<String>,
    pub channels: Option<u32>,
    pub channel_layout: Option<String>,

    #[serde(default)]
    pub tags: BTreeMap<String, String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl MediaInfo {
    /// First video stream, if any.
    pub fn video_stream(&self) -> Option<&MediaStream> {
        self.streams
            .iter()
            .find(|s| s.codec_type == Some(CodecType::Video))
    }

    pub fn audio_streams(&self) -> impl Iterator<Item = &MediaStream> {
        self.streams
            .iter()
            .filter(|s| s.codec_type == Some(CodecType::Audio))
    }

    /// Frame count of the video stream. `None` when absent, unparseable or
    /// zero, since no percentage can be derived from it.
    pub fn total_frames(&self) -> Option<u64> {
        self.video_stream()
            .and_then(MediaStream::frame_count)
            .filter(|frames| *frames > 0)
    }

    /// Container duration in seconds.
    pub fn duration_secs(&self) -> Option<f64> {
        self.format.duration.as_deref()?.trim().parse().ok()
    }
}

impl MediaStream {
    pub fn frame_count(&self) -> Option<u64> {
        self.nb_frames.as_deref()?.trim().parse().ok()
    }

    /// `r_frame_rate` as a number, e.g. `"30000/1001"` yields `29.97`.
    pub fn frame_rate(&self) -> Option<f64> {
        let rate = self.r_frame_rate.as_deref()?;
        match rate.split_once('/') {
            Some((num, den)) => {
                let num: f64 = num.trim().parse().ok()?;
                let den: f64 = den.trim().parse().ok()?;
                (den != 0.0).then(|| num / den)
            }
            None => rate.trim().parse().ok(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PROBE: &str = r#"{
        "streams": [
            {
                "index": 0,
                "codecName": "h264",
                "codecType": "video",
                "width": 320,
                "height": 240,
                "pixFmt": "yuv420p",
                "rFrameRate": "25/1",
                "nbFrames": "250",
                "disposition": { "default": 1 },
                "tags": { "language": "und" }
            },
            {
                "index": 1,
                "codecName": "aac",
                "codecType": "audio",
                "sampleRate": "44100",
                "channels": 2
            },
            {
                "index": 2,
                "codecType": "weird"
            }
        ],
        "format": {
            "filename": "fixture.mp4",
            "nbStreams": 3,
            "formatName": "mov,mp4,m4a,3gp,3g2,mj2",
            "duration": "10.000000",
            "size": "95123",
            "bitRate": "76098",
            "probeScore": 100,
            "tags": { "majorBrand": "isom" }
        }
    }"#;

    #[test]
    fn test_deserialize_probe_output() {
        let info: MediaInfo = serde_json::from_str(PROBE).unwrap();

        assert_eq!(info.format.filename.as_deref(), Some("fixture.mp4"));
        assert_eq!(info.format.nb_streams, Some(3));
        assert_eq!(info.format.tags["majorBrand"], "isom");
        assert_eq!(info.duration_secs(), Some(10.0));
        assert_eq!(info.streams.len(), 3);
        assert_eq!(info.streams[2].codec_type, Some(CodecType::Unknown));
        assert!(info.streams[0].extra.contains_key("disposition"));

        let video = info.video_stream().unwrap();
        assert_eq!(video.width, Some(320));
        assert_eq!(video.frame_rate(), Some(25.0));
        assert_eq!(info.total_frames(), Some(250));
        assert_eq!(info.audio_streams().count(), 1);
    }

    #[test]
    fn test_total_frames_unknown_or_zero() {
        let mut info = MediaInfo::default();
        assert_eq!(info.total_frames(), None);

        info.streams.push(MediaStream {
            codec_type: Some(CodecType::Video),
            nb_frames: Some("N/A".to_string()),
            ..Default::default()
        });
        assert_eq!(info.total_frames(), None);

        info.streams[0].nb_frames = Some("0".to_string());
        assert_eq!(info.total_frames(), None);
    }
}
