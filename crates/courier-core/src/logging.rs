//! JSONL logging for listener instances.
//!
//! Every tracing event becomes one self-contained JSON object appended to
//! a per-instance, per-day file, so several listeners can share a log
//! directory without interleaving partial lines.
//!
//! ```text
//! logs/
//! └── raw/
//!     ├── 2026-10-16_alice.jsonl
//!     └── 2026-10-16_bob.jsonl
//! ```
//!
//! ```bash
//! # Every recoverable failure a listener hit
//! jq 'select(.level == "warn")' logs/raw/*.jsonl
//! ```

use std::fmt::Write as _;
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::field::{Field, Visit};
use tracing::{Event, Subscriber};
use tracing_subscriber::layer::{Context, SubscriberExt};
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// One line of a JSONL log file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogLine {
    /// RFC 3339 timestamp with millis
    pub ts: String,
    /// trace, debug, info, warn, error
    pub level: String,
    /// Listener instance name
    pub instance: String,
    /// Module path of the event
    pub target: String,
    /// Human-readable message
    pub msg: String,
    /// Structured event fields
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fields: Option<Value>,
    /// Enclosing spans, root first, joined with " > "
    #[serde(skip_serializing_if = "Option::is_none")]
    pub span: Option<String>,
}

impl LogLine {
    /// Create a line stamped with the current time
    pub fn new(
        level: impl Into<String>,
        instance: impl Into<String>,
        target: impl Into<String>,
        msg: impl Into<String>,
    ) -> Self {
        Self {
            ts: chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
            level: level.into(),
            instance: instance.into(),
            target: target.into(),
            msg: msg.into(),
            fields: None,
            span: None,
        }
    }
}

/// Append-only writer for one instance's log file.
pub struct LogFileWriter {
    instance: String,
    path: PathBuf,
    writer: Mutex<BufWriter<File>>,
}

impl LogFileWriter {
    /// Open (or create) `<logs_dir>/raw/<date>_<instance>.jsonl`
    pub fn open(logs_dir: impl AsRef<Path>, instance: impl Into<String>) -> std::io::Result<Self> {
        let instance = instance.into();
        let raw_dir = logs_dir.as_ref().join("raw");
        fs::create_dir_all(&raw_dir)?;

        let date = chrono::Local::now().format("%Y-%m-%d");
        let path = raw_dir.join(format!("{}_{}.jsonl", date, instance));
        let file = OpenOptions::new().create(true).append(true).open(&path)?;

        Ok(Self {
            instance,
            path,
            writer: Mutex::new(BufWriter::new(file)),
        })
    }

    /// Instance name
    pub fn instance(&self) -> &str {
        &self.instance
    }

    /// Path of the log file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one line and flush it.
    pub fn append(&self, line: &LogLine) -> std::io::Result<()> {
        let json = serde_json::to_string(line)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        let mut writer = self.writer.lock().unwrap_or_else(|e| e.into_inner());
        writeln!(writer, "{}", json)?;
        writer.flush()
    }
}

/// Tracing layer that writes events through a [`LogFileWriter`].
pub struct JsonlLayer {
    writer: LogFileWriter,
}

impl JsonlLayer {
    /// Create a layer logging to `logs_dir` under `instance`
    pub fn new(logs_dir: impl AsRef<Path>, instance: impl Into<String>) -> std::io::Result<Self> {
        Ok(Self {
            writer: LogFileWriter::open(logs_dir, instance)?,
        })
    }

    /// Path of the log file
    pub fn log_path(&self) -> &Path {
        self.writer.path()
    }
}

impl<S> Layer<S> for JsonlLayer
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_event(&self, event: &Event<'_>, ctx: Context<'_, S>) {
        let metadata = event.metadata();
        let mut visitor = FieldCollector::default();
        event.record(&mut visitor);

        let mut line = LogLine::new(
            metadata.level().as_str().to_lowercase(),
            self.writer.instance(),
            metadata.target(),
            visitor.message.unwrap_or_default(),
        );
        if !visitor.fields.is_empty() {
            line.fields = Some(Value::Object(visitor.fields));
        }
        if let Some(scope) = ctx.event_scope(event) {
            let spans: Vec<&str> = scope.from_root().map(|span| span.name()).collect();
            if !spans.is_empty() {
                line.span = Some(spans.join(" > "));
            }
        }

        // A logging failure must never take the listener down
        let _ = self.writer.append(&line);
    }
}

#[derive(Default)]
struct FieldCollector {
    message: Option<String>,
    fields: serde_json::Map<String, Value>,
}

impl FieldCollector {
    fn insert(&mut self, field: &Field, value: Value) {
        self.fields.insert(field.name().to_string(), value);
    }
}

impl Visit for FieldCollector {
    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        let mut buf = String::new();
        let _ = write!(buf, "{:?}", value);
        if field.name() == "message" {
            self.message = Some(buf);
        } else {
            self.insert(field, Value::String(buf));
        }
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message = Some(value.to_string());
        } else {
            self.insert(field, Value::String(value.to_string()));
        }
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.insert(field, Value::Number(value.into()));
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.insert(field, Value::Number(value.into()));
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.insert(field, Value::Bool(value));
    }

    fn record_error(&mut self, field: &Field, value: &(dyn std::error::Error + 'static)) {
        self.insert(field, Value::String(value.to_string()));
    }
}

/// Map `-v` counts onto a default filter directive.
pub fn verbosity_filter(verbosity: u8) -> &'static str {
    match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    }
}

/// Install the global subscriber: console output filtered by `RUST_LOG`
/// (or `verbosity`), plus a JSONL file when `logs_dir` is given.
///
/// Returns the JSONL file path, if one was opened.
pub fn init(
    verbosity: u8,
    logs_dir: Option<&Path>,
    instance: &str,
) -> std::io::Result<Option<PathBuf>> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(verbosity_filter(verbosity)));

    let jsonl = logs_dir
        .map(|dir| JsonlLayer::new(dir, instance))
        .transpose()?;
    let path = jsonl.as_ref().map(|layer| layer.log_path().to_path_buf());

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(jsonl)
        .try_init()
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::AlreadyExists, e))?;

    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_layer_writes_one_line_per_event() {
        let temp = TempDir::new().unwrap();
        let layer = JsonlLayer::new(temp.path(), "alice").unwrap();
        let path = layer.log_path().to_path_buf();

        let subscriber = tracing_subscriber::registry().with(layer);
        tracing::subscriber::with_default(subscriber, || {
            tracing::info!("Subscribed to message stream");
            tracing::warn!(conversation_id = "c1", consecutive_failures = 2u64, "Query failed");
        });

        let content = fs::read_to_string(&path).unwrap();
        let lines: Vec<LogLine> = content
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();

        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].level, "info");
        assert_eq!(lines[0].instance, "alice");
        assert_eq!(lines[0].msg, "Subscribed to message stream");
        let fields = lines[1].fields.as_ref().unwrap();
        assert_eq!(fields["conversation_id"], "c1");
        assert_eq!(fields["consecutive_failures"], 2);
    }

    #[test]
    fn test_span_names_are_recorded() {
        let temp = TempDir::new().unwrap();
        let layer = JsonlLayer::new(temp.path(), "bob").unwrap();
        let path = layer.log_path().to_path_buf();

        let subscriber = tracing_subscriber::registry().with(layer);
        tracing::subscriber::with_default(subscriber, || {
            let _outer = tracing::info_span!("listen").entered();
            let _inner = tracing::info_span!("poll_cycle").entered();
            tracing::debug!("Polling conversations");
        });

        let content = fs::read_to_string(&path).unwrap();
        assert!(content.contains("\"span\":\"listen > poll_cycle\""));
    }

    #[test]
    fn test_writer_appends_across_reopen() {
        let temp = TempDir::new().unwrap();
        {
            let writer = LogFileWriter::open(temp.path(), "carol").unwrap();
            writer.append(&LogLine::new("info", "carol", "t", "first")).unwrap();
        }
        let writer = LogFileWriter::open(temp.path(), "carol").unwrap();
        writer.append(&LogLine::new("info", "carol", "t", "second")).unwrap();

        let content = fs::read_to_string(writer.path()).unwrap();
        assert_eq!(content.lines().count(), 2);
        assert!(writer.path().starts_with(temp.path().join("raw")));
    }

    #[test]
    fn test_verbosity_filter() {
        assert_eq!(verbosity_filter(0), "warn");
        assert_eq!(verbosity_filter(1), "info");
        assert_eq!(verbosity_filter(2), "debug");
        assert_eq!(verbosity_filter(9), "trace");
    }
}
