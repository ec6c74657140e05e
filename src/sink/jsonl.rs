//! JSON-lines archive sink
//!
//! One record per line: `segment`, `event` or `trigger`. The writer is
//! flushed on every event so a reader tailing the file sees whole segments.

use parking_lot::Mutex;
use serde::Serialize;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::error::SinkError;
use crate::segment::demux::ChannelSegment;
use crate::session::state::TriggerTime;
use crate::sink::SegmentSink;

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum Record<'a> {
    Segment(&'a ChannelSegment),
    Event { name: &'a str },
    Trigger { time: f64, ctime: Option<String> },
}

/// Appends segments to a file as JSON lines
pub struct JsonLinesSink {
    path: PathBuf,
    writer: Mutex<BufWriter<File>>,
}

impl JsonLinesSink {
    /// Open `path` for appending, creating parent directories as needed
    pub fn create(path: impl AsRef<Path>) -> Result<Self, SinkError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self {
            path,
            writer: Mutex::new(BufWriter::new(file)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write(&self, record: &Record<'_>, flush: bool) -> Result<(), SinkError> {
        let line = serde_json::to_string(record)?;
        let mut writer = self.writer.lock();
        writer.write_all(line.as_bytes())?;
        writer.write_all(b"\n")?;
        if flush {
            writer.flush()?;
        }
        Ok(())
    }
}

impl SegmentSink for JsonLinesSink {
    fn publish_channel_segment(&self, segment: &ChannelSegment) -> Result<(), SinkError> {
        self.write(&Record::Segment(segment), false)
    }

    fn emit_event(&self, name: &str) -> Result<(), SinkError> {
        self.write(&Record::Event { name }, true)
    }

    fn publish_trigger_time(&self, trigger: TriggerTime) -> Result<(), SinkError> {
        self.write(
            &Record::Trigger {
                time: trigger.seconds(),
                ctime: trigger.to_ctime(),
            },
            true,
        )
    }
}
