//! End-to-end runs against the ffmpeg and ffprobe found on `PATH`.
//! Each test returns early when either binary is missing.

use std::path::{Path, PathBuf};
use std::process::Command;

use ffencode::error::EncodeError;
use ffencode::process::EventKind;
use ffencode::{Encoder, EncodingEvent, EncodingProcess};

fn has_binary(name: &str) -> bool {
    Command::new(name)
        .arg("-version")
        .output()
        .map(|output| output.status.success())
        .unwrap_or(false)
}

fn media_tools_available() -> bool {
    let available = has_binary("ffmpeg") && has_binary("ffprobe");
    if !available {
        eprintln!("ffmpeg/ffprobe not on PATH, skipping");
    }
    available
}

/// Two seconds of 320x240 test pattern at 25 fps (50 frames).
fn fixture(dir: &Path) -> PathBuf {
    let path = dir.join("input.mp4");
    let status = Command::new("ffmpeg")
        .args([
            "-hide_banner",
            "-loglevel",
            "error",
            "-f",
            "lavfi",
            "-i",
            "testsrc=duration=2:size=320x240:rate=25",
            "-pix_fmt",
            "yuv420p",
            "-y",
        ])
        .arg(&path)
        .status()
        .unwrap();
    assert!(status.success(), "failed to generate fixture");
    path
}

async fn collect(process: &EncodingProcess) -> Vec<EncodingEvent> {
    let mut events = Vec::new();
    while let Some(event) = process.events().next().await.unwrap() {
        events.push(event);
    }
    events
}

#[tokio::test]
async fn test_scaled_encode_reports_progress() {
    if !media_tools_available() {
        return;
    }
    let dir = tempfile::tempdir().unwrap();
    let input = fixture(dir.path());
    let output = dir.path().join("scaled.mp4");

    let mut encoder = Encoder::with_input(input.to_string_lossy())
        .override_output(true)
        .output(output.to_string_lossy())
        .width(200);
    let process = encoder.next().unwrap();
    process.start().unwrap();

    let events = collect(&process).await;
    let kinds: Vec<EventKind> = events.iter().map(EncodingEvent::kind).collect();
    assert_eq!(kinds.first(), Some(&EventKind::Start));
    assert_eq!(kinds.get(1), Some(&EventKind::Info));
    assert_eq!(kinds.last(), Some(&EventKind::End));
    assert!(kinds.contains(&EventKind::Progress));

    let info = events.iter().find_map(|event| match event {
        EncodingEvent::Info { info, .. } => Some(info.clone()),
        _ => None,
    });
    assert_eq!(info.unwrap().video_stream().and_then(|s| s.width), Some(320));

    let percents: Vec<u8> = events
        .iter()
        .filter_map(|event| match event {
            EncodingEvent::Progress { percent, .. } => *percent,
            _ => None,
        })
        .collect();
    assert_eq!(percents.last(), Some(&100));
    assert!(percents.windows(2).all(|w| w[0] <= w[1]));

    let status = process.status().await.unwrap();
    assert!(status.success);
    assert!(std::fs::metadata(&output).unwrap().len() > 0);
    process.close();
}

#[tokio::test]
async fn test_invalid_bitrate_reports_error() {
    if !media_tools_available() {
        return;
    }
    let dir = tempfile::tempdir().unwrap();
    let input = fixture(dir.path());
    let output = dir.path().join("broken.mp4");

    let mut encoder = Encoder::with_input(input.to_string_lossy())
        .override_output(true)
        .video_bitrate("192kk")
        .output(output.to_string_lossy());
    let process = encoder.next().unwrap();
    process.start().unwrap();

    let events = collect(&process).await;
    let error = match events.last() {
        Some(EncodingEvent::Error { error, .. }) => error.clone(),
        other => panic!("expected an error event, got {:?}", other.map(|e| e.kind())),
    };
    let failure = error.command_failure().expect("command failure details");
    assert!(!failure.stderr.is_empty());
    assert!(failure.status.is_some_and(|status| !status.success));

    let status = process.status().await.unwrap();
    assert!(!status.success);
    process.close();
}

#[tokio::test]
async fn test_encode_runs_every_output() {
    if !media_tools_available() {
        return;
    }
    let dir = tempfile::tempdir().unwrap();
    let input = fixture(dir.path());
    let small = dir.path().join("small.mp4");
    let large = dir.path().join("large.mp4");

    Encoder::with_input(input.to_string_lossy())
        .override_output(true)
        .output(small.to_string_lossy())
        .width(160)
        .output(large.to_string_lossy())
        .width(240)
        .encode()
        .await
        .unwrap();

    assert!(small.exists());
    assert!(large.exists());

    let result = Encoder::with_input(dir.path().join("missing.mp4").to_string_lossy())
        .output(dir.path().join("never.mp4").to_string_lossy())
        .encode()
        .await;
    assert!(matches!(result, Err(EncodeError::JobFailed { .. })));
}
