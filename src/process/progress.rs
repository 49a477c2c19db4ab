//! Incremental decoder for ffmpeg's `-progress` channel.
//!
//! ffmpeg writes repeating blocks of `key=value` lines, each block closed by
//! `progress=continue` or `progress=end`. Reads may split a block (or a line)
//! anywhere, so bytes are buffered until a full line is available.

use std::collections::BTreeMap;

use super::events::ProgressRecord;

#[derive(Debug, Default)]
pub struct ProgressParser {
    pending: Vec<u8>,
    block: BTreeMap<String, String>,
    total_frames: Option<u64>,
    last_percent: Option<u8>,
    finished: bool,
}

impl ProgressParser {
    /// `total_frames` of `None` or zero disables percentages.
    pub fn new(total_frames: Option<u64>) -> Self {
        Self {
            total_frames: total_frames.filter(|total| *total > 0),
            ..Default::default()
        }
    }

    /// Whether the closing `progress=end` block was seen.
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Feed one chunk read from the channel and return the records it
    /// completed, each paired with its percentage.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<(Option<u8>, ProgressRecord)> {
        self.pending.extend_from_slice(chunk);

        let mut records = Vec::new();
        while let Some(newline) = self.pending.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=newline).collect();
            if let Some(record) = self.line(&line) {
                records.push(record);
            }
        }
        records
    }

    /// Flush a trailing line without newline once the channel hit EOF.
    pub fn finish(&mut self) -> Option<(Option<u8>, ProgressRecord)> {
        if self.pending.is_empty() {
            return None;
        }
        let line = std::mem::take(&mut self.pending);
        self.line(&line)
    }

    fn line(&mut self, raw: &[u8]) -> Option<(Option<u8>, ProgressRecord)> {
        if self.finished {
            return None;
        }

        let line = String::from_utf8_lossy(raw);
        let line = line.trim();
        let (key, value) = line.split_once('=')?;
        let (key, value) = (key.trim(), value.trim());
        if key.is_empty() {
            return None;
        }

        self.block.insert(key.to_string(), value.to_string());
        if key != "progress" {
            return None;
        }

        let record = ProgressRecord::from_fields(std::mem::take(&mut self.block));
        if record.is_end() {
            self.finished = true;
        }
        let percent = self.percent(&record);
        Some((percent, record))
    }

    /// floor(100 * frame / total), clamped to 100 and never below the
    /// previous value. The closing record reports 100.
    fn percent(&mut self, record: &ProgressRecord) -> Option<u8> {
        let total = self.total_frames?;

        let current = if record.is_end() {
            100
        } else {
            match record.frame {
                Some(frame) => (frame.saturating_mul(100) / total).min(100) as u8,
                None => self.last_percent.unwrap_or(0),
            }
        };

        let percent = self.last_percent.map_or(current, |last| last.max(current));
        self.last_percent = Some(percent);
        Some(percent)
    }
}
