use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::encoding::Encoding;
use crate::error::EncodeError;
use crate::media::MediaInfo;

/// Lifecycle event of one job.
///
/// A job emits `Start`, at most one `Info`, any number of `Progress` events
/// and finally exactly one of `End` or `Error`.
#[derive(Debug, Clone)]
pub enum EncodingEvent {
    Start {
        encoding: Arc<Encoding>,
    },
    Info {
        encoding: Arc<Encoding>,
        info: Arc<MediaInfo>,
    },
    Progress {
        encoding: Arc<Encoding>,
        /// `None` when the input's frame count is unknown.
        percent: Option<u8>,
        record: ProgressRecord,
    },
    End {
        encoding: Arc<Encoding>,
    },
    Error {
        encoding: Arc<Encoding>,
        error: Arc<EncodeError>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Start,
    Info,
    Progress,
    End,
    Error,
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EventKind::Start => "start",
            EventKind::Info => "info",
            EventKind::Progress => "progress",
            EventKind::End => "end",
            EventKind::Error => "error",
        };
        f.write_str(name)
    }
}

impl EncodingEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            EncodingEvent::Start { .. } => EventKind::Start,
            EncodingEvent::Info { .. } => EventKind::Info,
            EncodingEvent::Progress { .. } => EventKind::Progress,
            EncodingEvent::End { .. } => EventKind::End,
            EncodingEvent::Error { .. } => EventKind::Error,
        }
    }

    /// `End` and `Error` are the last event a job emits.
    pub fn is_terminal(&self) -> bool {
        matches!(self, EncodingEvent::End { .. } | EncodingEvent::Error { .. })
    }

    pub fn encoding(&self) -> &Arc<Encoding> {
        match self {
            EncodingEvent::Start { encoding }
            | EncodingEvent::Info { encoding, .. }
            | EncodingEvent::Progress { encoding, .. }
            | EncodingEvent::End { encoding }
            | EncodingEvent::Error { encoding, .. } => encoding,
        }
    }
}

/// Value of the `progress` key closing each block.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProgressState {
    #[default]
    Continue,
    End,
}

/// One `key=value` block from ffmpeg's `-progress` output.
///
/// Known keys are parsed into typed fields; values ffmpeg reports as `N/A`
/// stay `None`. Every key, known or not, is kept verbatim in `fields`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ProgressRecord {
    pub frame: Option<u64>,
    pub fps: Option<f64>,
    /// Quantizer of the first output stream (`stream_0_0_q`).
    pub quality: Option<f64>,
    pub bitrate: Option<String>,
    pub total_size: Option<u64>,
    /// ffmpeg names this `out_time_ms` but reports microseconds.
    pub out_time_us: Option<i64>,
    pub out_time: Option<String>,
    pub dup_frames: Option<u64>,
    pub drop_frames: Option<u64>,
    /// Encode speed relative to realtime, `1.5x` parsed as `1.5`.
    pub speed: Option<f64>,
    pub state: ProgressState,
    pub fields: BTreeMap<String, String>,
}

impl ProgressRecord {
    pub fn from_fields(fields: BTreeMap<String, String>) -> Self {
        Self {
            frame: parse_field(&fields, "frame"),
            fps: parse_field(&fields, "fps"),
            quality: parse_field(&fields, "stream_0_0_q"),
            bitrate: text_field(&fields, "bitrate"),
            total_size: parse_field(&fields, "total_size"),
            out_time_us: parse_field(&fields, "out_time_us")
                .or_else(|| parse_field(&fields, "out_time_ms")),
            out_time: text_field(&fields, "out_time"),
            dup_frames: parse_field(&fields, "dup_frames"),
            drop_frames: parse_field(&fields, "drop_frames"),
            speed: fields
                .get("speed")
                .and_then(|v| v.trim().trim_end_matches('x').trim().parse().ok()),
            state: match fields.get("progress").map(|v| v.trim()) {
                Some("end") => ProgressState::End,
                _ => ProgressState::Continue,
            },
            fields,
        }
    }

    pub fn is_end(&self) -> bool {
        self.state == ProgressState::End
    }
}

fn parse_field<T: FromStr>(fields: &BTreeMap<String, String>, key: &str) -> Option<T> {
    fields.get(key).and_then(|v| v.trim().parse().ok())
}

fn text_field(fields: &BTreeMap<String, String>, key: &str) -> Option<String> {
    fields
        .get(key)
        .map(|v| v.trim())
        .filter(|v| !v.is_empty() && *v != "N/A")
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_record_from_fields() {
        let record = ProgressRecord::from_fields(fields(&[
            ("frame", "120"),
            ("fps", "59.94"),
            ("stream_0_0_q", "28.0"),
            ("bitrate", "1200.5kbits/s"),
            ("total_size", "524336"),
            ("out_time_us", "4000000"),
            ("out_time_ms", "4000000"),
            ("out_time", "00:00:04.000000"),
            ("dup_frames", "0"),
            ("drop_frames", "2"),
            ("speed", "2.01x"),
            ("progress", "continue"),
        ]));

        assert_eq!(record.frame, Some(120));
        assert_eq!(record.fps, Some(59.94));
        assert_eq!(record.quality, Some(28.0));
        assert_eq!(record.bitrate.as_deref(), Some("1200.5kbits/s"));
        assert_eq!(record.total_size, Some(524336));
        assert_eq!(record.out_time_us, Some(4_000_000));
        assert_eq!(record.drop_frames, Some(2));
        assert_eq!(record.speed, Some(2.01));
        assert!(!record.is_end());
        assert_eq!(record.fields.len(), 12);
    }

    #[test]
    fn test_not_available_values() {
        let record = ProgressRecord::from_fields(fields(&[
            ("bitrate", "N/A"),
            ("total_size", "N/A"),
            ("speed", "N/A"),
            ("progress", "end"),
        ]));

        assert_eq!(record.bitrate, None);
        assert_eq!(record.total_size, None);
        assert_eq!(record.speed, None);
        assert!(record.is_end());
    }

    #[test]
    fn test_event_kind() {
        let encoding = Arc::new(Encoding::new());
        let start = EncodingEvent::Start {
            encoding: encoding.clone(),
        };
        let error = EncodingEvent::Error {
            encoding: encoding.clone(),
            error: Arc::new(EncodeError::ProcessNotStarted),
        };

        assert_eq!(start.kind(), EventKind::Start);
        assert!(!start.is_terminal());
        assert!(error.is_terminal());
        assert_eq!(error.kind().to_string(), "error");
        assert!(Arc::ptr_eq(error.encoding(), &encoding));
    }
}
