//! Parsers for ffmpeg's capability listings (`-formats`, `-filters`,
//! `-codecs`, `-encoders`).
//!
//! Each parser takes the raw listing text and maps every matching line to a
//! typed record keyed by name. Header and legend lines do not match and are
//! ignored.

use regex_lite::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::LazyLock;

static FORMAT_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*([D ])([E ]) ([^ ]+) +(.*)$").expect("valid format regex"));

static FILTER_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?: [T.][S.][C.] )?([^ ]+) +(AA?|VV?|\|)->(AA?|VV?|\|) +(.*)$")
        .expect("valid filter regex")
});

static LEGACY_CODEC_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*([D ])([E ])([VAS])([S ])([D ])([T ]) ([^ ]+) +(.*)$")
        .expect("valid codec regex")
});

static CODEC_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*([D.])([E.])([VAS])([I.])([L.])([S.]) ([^ ]+) +(.*)$")
        .expect("valid codec regex")
});

static ENCODER_ALIASES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\(encoders:([^)]+)\)").expect("valid encoders regex"));

static DECODER_ALIASES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\(decoders:([^)]+)\)").expect("valid decoders regex"));

static ENCODER_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*([VAS.])([F.])([S.])([X.])([B.])([D.]) ([^ ]+) +(.*)$")
        .expect("valid encoder regex")
});

/// Legend rows use `=` in the name column.
const LEGEND: &str = "=";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Video,
    Audio,
    Subtitle,
}

impl MediaKind {
    fn from_flag(flag: &str) -> Option<Self> {
        match flag {
            "V" => Some(Self::Video),
            "A" => Some(Self::Audio),
            "S" => Some(Self::Subtitle),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FormatInfo {
    pub description: String,
    pub can_demux: bool,
    pub can_mux: bool,
}

/// Pad kind on either side of a filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterPad {
    Audio,
    Video,
    /// Source or sink filters (`|`).
    None,
}

impl FilterPad {
    fn parse(column: &str) -> (Self, bool) {
        let pad = match column.chars().next() {
            Some('A') => Self::Audio,
            Some('V') => Self::Video,
            _ => Self::None,
        };
        (pad, column.len() > 1)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterInfo {
    pub description: String,
    pub input: FilterPad,
    pub multiple_inputs: bool,
    pub output: FilterPad,
    pub multiple_outputs: bool,
}

/// Flags that differ between the two `-codecs` listing layouts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "layout", rename_all = "camelCase")]
pub enum CodecTraits {
    #[serde(rename_all = "camelCase")]
    Legacy {
        draw_horiz_band: bool,
        direct_rendering: bool,
        weird_frame_truncation: bool,
    },
    #[serde(rename_all = "camelCase")]
    Current {
        intra_frame_only: bool,
        lossy: bool,
        lossless: bool,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CodecInfo {
    pub kind: MediaKind,
    pub description: String,
    pub can_decode: bool,
    pub can_encode: bool,
    pub traits: CodecTraits,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncoderInfo {
    pub kind: MediaKind,
    pub description: String,
    pub frame_mt: bool,
    pub slice_mt: bool,
    pub experimental: bool,
    pub draw_horiz_band: bool,
    pub direct_rendering: bool,
}

pub type Formats = BTreeMap<String, FormatInfo>;
pub type Filters = BTreeMap<String, FilterInfo>;
pub type Codecs = BTreeMap<String, CodecInfo>;
pub type Encoders = BTreeMap<String, EncoderInfo>;

/// Parse `-formats`. Comma-separated names (`mov,mp4,m4a`) yield one entry
/// per alias; repeated names accumulate their demux/mux flags.
pub fn parse_formats(listing: &str) -> Formats {
    let mut formats = Formats::new();

    for line in listing.lines() {
        let Some(caps) = FORMAT_LINE.captures(line) else {
            continue;
        };
        let description = caps[4].to_string();
        for name in caps[3].split(',').filter(|n| !n.is_empty() && *n != LEGEND) {
            let entry = formats.entry(name.to_string()).or_insert_with(|| FormatInfo {
                description: description.clone(),
                can_demux: false,
                can_mux: false,
            });
            if &caps[1] == "D" {
                entry.can_demux = true;
            }
            if &caps[2] == "E" {
                entry.can_mux = true;
            }
        }
    }

    formats
}

/// Parse `-filters`.
pub fn parse_filters(listing: &str) -> Filters {
    let mut filters = Filters::new();

    for line in listing.lines() {
        let Some(caps) = FILTER_LINE.captures(line) else {
            continue;
        };
        if &caps[1] == LEGEND {
            continue;
        }
        let (input, multiple_inputs) = FilterPad::parse(&caps[2]);
        let (output, multiple_outputs) = FilterPad::parse(&caps[3]);
        filters.insert(
            caps[1].to_string(),
            FilterInfo {
                description: caps[4].to_string(),
                input,
                multiple_inputs,
                output,
                multiple_outputs,
            },
        );
    }

    filters
}

/// Parse `-codecs` in either the legacy (`DEVSDT`) or current (`DEV.LS`)
/// layout.
///
/// In the current layout a description may name the concrete implementations,
/// e.g. `(decoders: h264 h264_qsv) (encoders: libx264 h264_nvenc)`. Each of
/// those gets its own entry: encoders are marked encodable, decoders are
/// marked decodable (and not encodable unless also listed as an encoder).
pub fn parse_codecs(listing: &str) -> Codecs {
    let mut codecs = Codecs::new();

    for line in listing.lines() {
        if let Some(caps) = LEGACY_CODEC_LINE.captures(line) {
            if &caps[7] != LEGEND {
                let Some(kind) = MediaKind::from_flag(&caps[3]) else {
                    continue;
                };
                codecs.insert(
                    caps[7].to_string(),
                    CodecInfo {
                        kind,
                        description: caps[8].to_string(),
                        can_decode: &caps[1] == "D",
                        can_encode: &caps[2] == "E",
                        traits: CodecTraits::Legacy {
                            draw_horiz_band: &caps[4] == "S",
                            direct_rendering: &caps[5] == "D",
                            weird_frame_truncation: &caps[6] == "T",
                        },
                    },
                );
            }
        }

        let Some(caps) = CODEC_LINE.captures(line) else {
            continue;
        };
        if &caps[7] == LEGEND {
            continue;
        }
        let Some(kind) = MediaKind::from_flag(&caps[3]) else {
            continue;
        };
        let codec = CodecInfo {
            kind,
            description: caps[8].to_string(),
            can_decode: &caps[1] == "D",
            can_encode: &caps[2] == "E",
            traits: CodecTraits::Current {
                intra_frame_only: &caps[4] == "I",
                lossy: &caps[5] == "L",
                lossless: &caps[6] == "S",
            },
        };

        let encoders = aliases(&ENCODER_ALIASES, &codec.description);
        let decoders = aliases(&DECODER_ALIASES, &codec.description);

        for name in &encoders {
            codecs.insert(
                name.clone(),
                CodecInfo {
                    can_encode: true,
                    ..codec.clone()
                },
            );
        }

        for name in &decoders {
            codecs
                .entry(name.clone())
                .and_modify(|existing| existing.can_decode = true)
                .or_insert_with(|| CodecInfo {
                    can_decode: true,
                    can_encode: false,
                    ..codec.clone()
                });
        }

        codecs.insert(caps[7].to_string(), codec);
    }

    codecs
}

fn aliases(pattern: &Regex, description: &str) -> Vec<String> {
    pattern
        .captures(description)
        .map(|caps| caps[1].split_whitespace().map(str::to_string).collect())
        .unwrap_or_default()
}

/// Parse `-encoders`.
pub fn parse_encoders(listing: &str) -> Encoders {
    let mut encoders = Encoders::new();

    for line in listing.lines() {
        let Some(caps) = ENCODER_LINE.captures(line) else {
            continue;
        };
        if &caps[7] == LEGEND {
            continue;
        }
        let Some(kind) = MediaKind::from_flag(&caps[1]) else {
            continue;
        };
        encoders.insert(
            caps[7].to_string(),
            EncoderInfo {
                kind,
                description: caps[8].to_string(),
                frame_mt: &caps[2] == "F",
                slice_mt: &caps[3] == "S",
                experimental: &caps[4] == "X",
                draw_horiz_band: &caps[5] == "B",
                direct_rendering: &caps[6] == "D",
            },
        );
    }

    encoders
}

/// `ffprobe version 6.1.1 Copyright ...` yields `6.1.1`.
pub fn parse_version(banner: &str) -> String {
    banner
        .lines()
        .next()
        .and_then(|line| line.split(' ').nth(2))
        .unwrap_or("unknown")
        .to_string()
}
