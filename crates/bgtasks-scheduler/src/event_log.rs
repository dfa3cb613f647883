//! Append-only event log: one JSON object per line, one file per log name.
//! Human-readable, never rewritten. Writes are best-effort: failures are
//! logged and dropped so the scheduling path never blocks on them.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{SecondsFormat, Utc};
use serde::Serialize;

use bgtasks_core::error::Result;
use bgtasks_core::types::JobKind;

/// One line of the log file.
#[derive(Debug, Clone, Serialize)]
pub struct EventRecord {
    #[serde(rename = "type")]
    pub kind: String,
    pub ts: String,
}

/// Event log bound to a single file. Share one instance per name via `Arc`;
/// the internal lock is the FIFO writer queue for that file.
pub struct EventLog {
    name: String,
    path: PathBuf,
    writer: Mutex<()>,
}

impl EventLog {
    /// Log named `name`, stored as `eventlog-{name}.json` under `dir`.
    pub fn new(dir: &Path, name: &str) -> Self {
        std::fs::create_dir_all(dir).ok();
        Self {
            name: name.to_string(),
            path: dir.join(format!("eventlog-{name}.json")),
            writer: Mutex::new(()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Location of the log file, for sharing/exporting.
    pub fn file_path(&self) -> &Path {
        &self.path
    }

    pub fn append_begin_idle(&self) {
        self.append("begin-idle");
    }

    pub fn append_end_idle(&self) {
        self.append("end-idle");
    }

    pub fn append_refresh_start(&self, will_expire: bool) {
        self.append(&JobKind::Refresh.start_event(will_expire));
    }

    pub fn append_refresh_expired(&self) {
        self.append(&JobKind::Refresh.expired_event());
    }

    pub fn append_processing_start(&self, will_expire: bool, task_num: usize) {
        self.append(&JobKind::Processing(task_num).start_event(will_expire));
    }

    pub fn append_processing_expired(&self, task_num: usize) {
        self.append(&JobKind::Processing(task_num).expired_event());
    }

    /// Append a record of `kind` stamped with the current UTC time.
    pub fn append(&self, kind: &str) {
        let record = EventRecord {
            kind: kind.to_string(),
            ts: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
        };
        if let Err(e) = self.write_record(&record) {
            tracing::warn!("⚠️ Event log '{}' dropped '{}': {e}", self.name, record.kind);
        }
    }

    fn write_record(&self, record: &EventRecord) -> Result<()> {
        let mut line = serde_json::to_string(record)?;
        line.push('\n');

        let _queue = self.writer.lock().unwrap_or_else(|e| e.into_inner());
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.write_all(line.as_bytes())?;
        tracing::debug!("📝 [{}] {}", self.name, record.kind);
        Ok(())
    }

    /// Every well-formed record, oldest first, as `"{ts} - {type}"`.
    pub fn load_all(&self) -> Vec<String> {
        let content = match std::fs::read(&self.path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Vec::new(),
            Err(e) => {
                tracing::warn!("⚠️ Failed to read event log '{}': {e}", self.name);
                return Vec::new();
            }
        };

        // A torn multi-byte write only loses its own line.
        content
            .split(|b| *b == b'\n')
            .filter_map(|line| std::str::from_utf8(line).ok())
            .map(|line| line.trim_end_matches('\r'))
            .filter_map(format_line)
            .collect()
    }

    /// Remove the whole log file. No-op if it does not exist.
    pub fn delete_all(&self) {
        let _queue = self.writer.lock().unwrap_or_else(|e| e.into_inner());
        match std::fs::remove_file(&self.path) {
            Ok(()) => tracing::info!("🗑️ Event log '{}' deleted", self.name),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!("⚠️ Failed to delete event log '{}': {e}", self.name),
        }
    }
}

/// `"{ts} - {type}"` for a JSON object line carrying both fields as
/// non-empty strings.
fn format_line(line: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(line).ok()?;
    let obj = value.as_object()?;
    let ts = obj.get("ts")?.as_str().filter(|s| !s.is_empty())?;
    let kind = obj.get("type")?.as_str().filter(|s| !s.is_empty())?;
    Some(format!("{ts} - {kind}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_append_then_load_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let log = EventLog::new(dir.path(), "test");
        log.append("refresh-start");
        log.append("refresh-expired");

        let rows = log.load_all();
        assert_eq!(rows.len(), 2);
        assert!(rows[0].ends_with(" - refresh-start"));
        assert!(rows[1].ends_with(" - refresh-expired"));
    }

    #[test]
    fn test_line_format_is_json_with_iso_timestamp() {
        let dir = tempfile::tempdir().unwrap();
        let log = EventLog::new(dir.path(), "fmt");
        log.append_processing_start(false, 1);

        let raw = std::fs::read_to_string(log.file_path()).unwrap();
        assert!(raw.ends_with('\n'));
        let value: serde_json::Value = serde_json::from_str(raw.trim_end()).unwrap();
        assert_eq!(value["type"], "processing-1-start");
        let ts = value["ts"].as_str().unwrap();
        assert!(chrono::DateTime::parse_from_rfc3339(ts).is_ok());
        assert!(ts.ends_with('Z'));

        let rows = log.load_all();
        assert_eq!(rows, vec![format!("{ts} - processing-1-start")]);
    }

    #[test]
    fn test_malformed_lines_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let log = EventLog::new(dir.path(), "messy");
        std::fs::write(
            log.file_path(),
            concat!(
                "{\"type\":\"begin-idle\",\"ts\":\"2026-01-01T00:00:00Z\"}\n",
                "not json at all\n",
                "{\"type\":\"missing-ts\"}\n",
                "{\"ts\":\"2026-01-01T00:00:01Z\"}\n",
                "{\"type\":\"\",\"ts\":\"2026-01-01T00:00:02Z\"}\n",
                "{\"type\":7,\"ts\":\"2026-01-01T00:00:03Z\"}\n",
                "[\"array\",\"2026-01-01T00:00:03Z\"]\n",
                "\n",
                "{\"type\":\"end-idle\",\"ts\":\"2026-01-01T00:00:04Z\"}\n",
            ),
        )
        .unwrap();

        assert_eq!(
            log.load_all(),
            vec![
                "2026-01-01T00:00:00Z - begin-idle".to_string(),
                "2026-01-01T00:00:04Z - end-idle".to_string(),
            ]
        );
    }

    #[test]
    fn test_torn_utf8_line_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let log = EventLog::new(dir.path(), "torn");
        log.append_refresh_start(false);
        {
            let mut file = OpenOptions::new().append(true).open(log.file_path()).unwrap();
            file.write_all(b"{\"type\":\"caf\xc3\n").unwrap();
        }
        log.append_refresh_expired();

        let rows = log.load_all();
        assert_eq!(rows.len(), 2);
        assert!(rows[0].ends_with(" - refresh-start"));
        assert!(rows[1].ends_with(" - refresh-expired"));
    }

    #[test]
    fn test_delete_all() {
        let dir = tempfile::tempdir().unwrap();
        let log = EventLog::new(dir.path(), "del");
        log.delete_all();
        log.append_begin_idle();
        log.append_end_idle();
        assert_eq!(log.load_all().len(), 2);

        log.delete_all();
        assert!(log.load_all().is_empty());
        assert!(!log.file_path().exists());

        log.append_refresh_start(false);
        assert_eq!(log.load_all().len(), 1);
    }

    #[test]
    fn test_logs_are_independent_per_name() {
        let dir = tempfile::tempdir().unwrap();
        let a = EventLog::new(dir.path(), "a");
        let b = EventLog::new(dir.path(), "b");
        a.append("only-a");
        assert_eq!(a.load_all().len(), 1);
        assert!(b.load_all().is_empty());
    }

    #[test]
    fn test_unwritable_dir_is_swallowed() {
        let dir = tempfile::tempdir().unwrap();
        let log = EventLog::new(dir.path(), "gone");
        std::fs::create_dir(log.file_path()).unwrap();
        log.append("lost");
        assert!(log.load_all().is_empty());
    }

    #[test]
    fn test_concurrent_appends_never_interleave() {
        let dir = tempfile::tempdir().unwrap();
        let log = Arc::new(EventLog::new(dir.path(), "race"));

        let handles: Vec<_> = (0..8)
            .map(|t| {
                let log = Arc::clone(&log);
                std::thread::spawn(move || {
                    for i in 0..50 {
                        log.append(&format!("writer-{t}-{i}"));
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        let raw = std::fs::read_to_string(log.file_path()).unwrap();
        assert_eq!(raw.lines().count(), 400);
        assert_eq!(log.load_all().len(), 400);

        // Per-writer order survives.
        for t in 0..8 {
            let prefix = format!("writer-{t}-");
            let seen: Vec<usize> = log
                .load_all()
                .iter()
                .filter_map(|row| row.split(" - ").nth(1))
                .filter_map(|kind| kind.strip_prefix(&prefix))
                .map(|n| n.parse().unwrap())
                .collect();
            assert_eq!(seen, (0..50).collect::<Vec<_>>());
        }
    }
}
