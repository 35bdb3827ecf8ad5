use std::fmt::{self, Write as _};

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::fmt::format::{FormatEvent, FormatFields, Writer};
use tracing_subscriber::fmt::FmtContext;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt as fmt_layer, EnvFilter, Layer, Registry};

use crate::config::HostSettings;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
    Critical,
}

impl LogLevel {
    pub fn parse(level: &str) -> Self {
        match level.to_lowercase().as_str() {
            "trace" => LogLevel::Trace,
            "debug" => LogLevel::Debug,
            "info" => LogLevel::Info,
            "warn" => LogLevel::Warn,
            "error" => LogLevel::Error,
            "critical" => LogLevel::Critical,
            _ => LogLevel::Info,
        }
    }

    pub fn from_tracing(level: &Level) -> Self {
        if *level == Level::ERROR {
            LogLevel::Error
        } else if *level == Level::WARN {
            LogLevel::Warn
        } else if *level == Level::INFO {
            LogLevel::Info
        } else if *level == Level::DEBUG {
            LogLevel::Debug
        } else {
            LogLevel::Trace
        }
    }
}

/// Cloud-logging severity of a structured log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Debug,
    Info,
    Notice,
    Warning,
    Error,
    Critical,
}

impl Severity {
    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Debug => "DEBUG",
            Severity::Info => "INFO",
            Severity::Notice => "NOTICE",
            Severity::Warning => "WARNING",
            Severity::Error => "ERROR",
            Severity::Critical => "CRITICAL",
        }
    }
}

/// Map an internal log level to the severity the cloud log agent expects.
/// Info maps to NOTICE and debug to INFO so that routine runtime chatter
/// ranks below messages an operator chose to emit.
pub fn severity_for(level: LogLevel) -> Severity {
    match level {
        LogLevel::Critical => Severity::Critical,
        LogLevel::Error => Severity::Error,
        LogLevel::Warn => Severity::Warning,
        LogLevel::Info => Severity::Notice,
        LogLevel::Debug => Severity::Info,
        LogLevel::Trace => Severity::Debug,
    }
}

fn ensure_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Shape one structured log entry. Object payloads keep their fields and
/// gain a `severity`; anything else becomes `{severity, message}`.
/// Payloads originating from debug nodes arrive pre-stringified.
pub fn structured_entry(level: LogLevel, msg: &Value) -> Value {
    let severity = severity_for(level).as_str();
    match msg {
        Value::Object(fields) => {
            let mut entry = fields.clone();
            entry.insert("severity".to_string(), json!(severity));
            Value::Object(entry)
        }
        other => json!({
            "severity": severity,
            "message": ensure_string(other),
        }),
    }
}

/// Event formatter for headless deployments: one JSON entry per line,
/// shaped by [`structured_entry`] so the cloud log agent picks up the
/// `severity` field instead of tracing's own level.
pub struct CloudLogFormat;

struct JsonVisitor<'a>(&'a mut serde_json::Map<String, Value>);

impl Visit for JsonVisitor<'_> {
    fn record_f64(&mut self, field: &Field, value: f64) {
        self.0.insert(field.name().to_string(), json!(value));
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.0.insert(field.name().to_string(), json!(value));
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.0.insert(field.name().to_string(), json!(value));
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.0.insert(field.name().to_string(), json!(value));
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        self.0.insert(field.name().to_string(), json!(value));
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        self.0
            .insert(field.name().to_string(), json!(format!("{:?}", value)));
    }
}

impl<S, N> FormatEvent<S, N> for CloudLogFormat
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        _ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        let mut fields = serde_json::Map::new();
        event.record(&mut JsonVisitor(&mut fields));
        let level = LogLevel::from_tracing(event.metadata().level());
        let entry = structured_entry(level, &Value::Object(fields));
        writeln!(writer, "{entry}")
    }
}

/// Wire up the tracing subscriber for this process: JSON lines carrying a
/// cloud `severity` field in headless mode, readable output in interactive
/// mode, plus an optional daily-rolling file when `log_dir` is set.
/// `RUST_LOG` overrides the configured level.
pub fn init_tracing(settings: &HostSettings) -> anyhow::Result<()> {
    let mut layers: Vec<Box<dyn Layer<Registry> + Send + Sync>> = Vec::new();

    if settings.mode.is_headless() {
        layers.push(
            fmt_layer::layer()
                .event_format(CloudLogFormat)
                .with_ansi(false)
                .boxed(),
        );
    } else {
        layers.push(
            fmt_layer::layer()
                .with_ansi(settings.debug_use_colors)
                .boxed(),
        );
    }

    if let Some(dir) = &settings.log_dir {
        let appender = tracing_appender::rolling::daily(dir, "flowfn.log");
        layers.push(
            fmt_layer::layer()
                .with_writer(appender)
                .with_ansi(false)
                .boxed(),
        );
    }

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(settings.log_level.clone()));

    tracing_subscriber::registry()
        .with(layers)
        .with(filter)
        .try_init()?;
    Ok(())
}
