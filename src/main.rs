//! ffencode - declarative ffmpeg jobs from the command line
//!
//! Thin front end over the library: builds encoders from the arguments and
//! the settings file, runs them and renders their events.

use anyhow::{Context, Result, bail};
use clap::Parser;
use futures::StreamExt;
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{Level, error, info, warn};
use tracing_appender::{non_blocking, rolling};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};
use walkdir::WalkDir;

use ffencode::cli::{Args, CapabilityKind, Commands};
use ffencode::config::Settings;
use ffencode::media::FfprobeClient;
use ffencode::{EncodeError, Encoder, EncodingEvent, EncodingProcess, fan_in};

const MEDIA_EXTENSIONS: &[&str] = &[
    "mp4", "mkv", "avi", "mov", "wmv", "flv", "webm", "m4v", "mpg", "mpeg", "ts", "mp3", "wav",
    "flac", "m4a", "ogg",
];

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    setup_logging(args.verbose)?;

    let settings = Settings::discover(args.config.as_deref(), &std::env::current_dir()?)?;

    match args.command {
        Commands::Encode {
            input,
            outputs,
            width,
            height,
            video_bitrate,
            audio_bitrate,
            video_codec,
            audio_codec,
            format,
            overwrite,
            extra,
        } => {
            let mut encoder = Encoder::from_template(settings.template()).input(&input);
            if overwrite {
                encoder = encoder.override_output(true);
            }
            {
                let options = encoder.global_mut().shared_mut();
                if let Some(width) = width {
                    options.width(width);
                }
                if let Some(height) = height {
                    options.height(height);
                }
                if let Some(bitrate) = &video_bitrate {
                    options.video_bitrate(bitrate);
                }
                if let Some(bitrate) = &audio_bitrate {
                    options.audio_bitrate(bitrate);
                }
                if let Some(codec) = &video_codec {
                    options.video_codec(codec);
                }
                if let Some(codec) = &audio_codec {
                    options.audio_codec(codec);
                }
                if let Some(format) = &format {
                    options.format(format);
                }
                if !extra.is_empty() {
                    options.args(&extra);
                }
            }
            for output in &outputs {
                encoder = encoder.output(output);
            }

            info!("Encoding {} into {} output(s)", input, outputs.len());
            for process in encoder {
                let bar = progress_bar(process.encoding().output())?;
                let outcome = run_job(&process, Some(&bar)).await;
                process.close();
                match outcome {
                    Ok(()) => bar.finish_with_message(format!("{} done", process.encoding().output())),
                    Err(e) => {
                        bar.abandon_with_message(format!("{} failed", process.encoding().output()));
                        return Err(e.into());
                    }
                }
            }
        }

        Commands::Batch {
            input_dir,
            output_dir,
            extension,
            overwrite,
        } => {
            std::fs::create_dir_all(&output_dir).with_context(|| {
                format!("Failed to create output directory {}", output_dir.display())
            })?;

            let files = find_media_files(&input_dir, &output_dir);
            if files.is_empty() {
                warn!("No media files found in {}", input_dir.display());
                return Ok(());
            }
            info!(
                "Encoding {} file(s) with up to {} concurrent job(s)",
                files.len(),
                settings.max_concurrent_jobs
            );

            let template = settings.template();
            let encoders = files.iter().map(|file| {
                let output = batch_output_path(file, &output_dir, &extension);
                Encoder::from_template(template.clone())
                    .input(file.to_string_lossy())
                    .override_output(overwrite)
                    .output(output.to_string_lossy())
            });

            let bar = ProgressBar::new(files.len() as u64);
            bar.set_style(
                ProgressStyle::default_bar()
                    .template("[{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")?
                    .progress_chars("#>-"),
            );

            let results: Vec<Result<(), EncodeError>> = fan_in(encoders)
                .map(|process| {
                    let bar = bar.clone();
                    async move {
                        let outcome = run_job(&process, None).await;
                        process.close();
                        bar.inc(1);
                        bar.set_message(process.encoding().output().to_string());
                        outcome
                    }
                })
                .buffer_unordered(settings.max_concurrent_jobs)
                .collect()
                .await;
            bar.finish_and_clear();

            let failures: Vec<_> = results.into_iter().filter_map(|r| r.err()).collect();
            for failure in &failures {
                error!("{}", failure);
            }
            if !failures.is_empty() {
                bail!("{} of {} job(s) failed", failures.len(), files.len());
            }
            println!("Encoded {} file(s) into {}", files.len(), output_dir.display());
        }

        Commands::Probe { input } => {
            let info = FfprobeClient::new(&settings.probe_binary)
                .media_info(&input)
                .await?;
            println!("{}", serde_json::to_string_pretty(&info)?);
        }

        Commands::Capabilities { kind } => {
            let client = FfprobeClient::new(&settings.probe_binary);
            info!("Using ffprobe {}", client.version().await?);
            match kind {
                CapabilityKind::Formats => print_json(&client.formats().await?)?,
                CapabilityKind::Filters => print_json(&client.filters().await?)?,
                CapabilityKind::Codecs => print_json(&client.codecs().await?)?,
                CapabilityKind::Encoders => print_json(&client.encoders().await?)?,
            }
        }

        Commands::InitConfig { path } => {
            if path.exists() {
                bail!("{} already exists", path.display());
            }
            Settings::default().save_to_file(&path)?;
            println!("Wrote default settings to {}", path.display());
        }
    }

    Ok(())
}

/// Start `process` and follow its events until the terminal one.
async fn run_job(process: &EncodingProcess, bar: Option<&ProgressBar>) -> Result<(), EncodeError> {
    process.start()?;

    while let Some(event) = process.events().next().await? {
        match event {
            EncodingEvent::Start { encoding } => {
                info!("Started {} -> {}", encoding.input(), encoding.output());
            }
            EncodingEvent::Info { info, .. } => {
                if let (Some(bar), None) = (bar, info.total_frames()) {
                    bar.set_message(format!("{} (length unknown)", process.encoding().output()));
                }
            }
            EncodingEvent::Progress { percent, record, .. } => {
                if let Some(bar) = bar {
                    match percent {
                        Some(percent) => bar.set_position(u64::from(percent)),
                        None => bar.set_message(format!(
                            "{} frame {}",
                            process.encoding().output(),
                            record.frame.unwrap_or_default()
                        )),
                    }
                }
            }
            EncodingEvent::End { encoding } => {
                info!("Finished {}", encoding.output());
            }
            EncodingEvent::Error { encoding, error } => {
                return Err(EncodeError::JobFailed {
                    output: encoding.output().to_string(),
                    source: error,
                });
            }
        }
    }

    Ok(())
}

fn progress_bar(output: &str) -> Result<ProgressBar> {
    let bar = ProgressBar::new(100);
    bar.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}% {msg}")?
            .progress_chars("#>-"),
    );
    bar.set_message(output.to_string());
    Ok(bar)
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Media files under `input_dir`, skipping anything inside `output_dir`.
fn find_media_files(input_dir: &Path, output_dir: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();

    for entry in WalkDir::new(input_dir).into_iter().filter_map(|e| e.ok()) {
        let path = entry.path();
        if !entry.file_type().is_file() || path.starts_with(output_dir) {
            continue;
        }
        if let Some(extension) = path.extension().and_then(|e| e.to_str()) {
            if MEDIA_EXTENSIONS.contains(&extension.to_lowercase().as_str()) {
                files.push(path.to_path_buf());
            }
        }
    }

    files.sort();
    files
}

fn batch_output_path(input: &Path, output_dir: &Path, extension: &str) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output".to_string());
    output_dir.join(format!("{}.{}", stem, extension.trim_start_matches('.')))
}

fn setup_logging(verbose: bool) -> Result<()> {
    let log_dir = std::env::current_dir()?.join(".ffencode").join("log");
    std::fs::create_dir_all(&log_dir)?;

    // Daily rotation; the guard lives for the rest of the program
    let file_appender = rolling::daily(&log_dir, "ffencode.log");
    let (non_blocking_file, guard) = non_blocking(file_appender);
    std::mem::forget(guard);

    let log_level = if verbose { Level::DEBUG } else { Level::INFO };

    let console_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false);

    let file_layer = fmt::layer()
        .with_writer(non_blocking_file)
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .with_ansi(false);

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env().add_directive(log_level.into()))
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;

    info!(
        "Logging initialized - console: {}, file: {}",
        log_level,
        log_dir.join("ffencode.log").display()
    );

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_fs::prelude::*;

    #[test]
    fn test_find_media_files_skips_output_dir() {
        let dir = assert_fs::TempDir::new().unwrap();
        dir.child("a.mp4").touch().unwrap();
        dir.child("nested/b.MKV").touch().unwrap();
        dir.child("notes.txt").touch().unwrap();
        dir.child("out/a.mp4").touch().unwrap();

        let files = find_media_files(dir.path(), &dir.path().join("out"));
        assert_eq!(
            files,
            vec![dir.path().join("a.mp4"), dir.path().join("nested/b.MKV")]
        );
    }

    #[test]
    fn test_batch_output_path() {
        let out = Path::new("/tmp/out");
        assert_eq!(
            batch_output_path(Path::new("/media/clip.mov"), out, ".webm"),
            out.join("clip.webm")
        );
        assert_eq!(
            batch_output_path(Path::new("/media/clip.mov"), out, "mp4"),
            out.join("clip.mp4")
        );
    }
}
