use once_cell::sync::OnceCell;
use tracing::{span, Level, Span};
use tracing_subscriber::{fmt, layer::SubscriberExt, EnvFilter, Registry};

static INIT: OnceCell<()> = OnceCell::new();

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl LogFormat {
    pub fn parse(raw: &str) -> Option<LogFormat> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "text" | "plain" => Some(LogFormat::Text),
            "json" => Some(LogFormat::Json),
            _ => None,
        }
    }
}

/// Installs the global subscriber once; later calls are no-ops.
pub fn init_tracing(format: LogFormat) {
    INIT.get_or_init(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
        let result = match format {
            LogFormat::Text => {
                let fmt_layer = fmt::layer()
                    .with_ansi(false)
                    .with_target(false)
                    .with_thread_ids(true);
                tracing::subscriber::set_global_default(
                    Registry::default().with(filter).with(fmt_layer),
                )
            }
            LogFormat::Json => {
                let fmt_layer = fmt::layer().json().with_target(true);
                tracing::subscriber::set_global_default(
                    Registry::default().with(filter).with(fmt_layer),
                )
            }
        };
        let _ = result;
    });
}

pub fn step_span(step_id: &str, label: &str) -> Span {
    span!(Level::INFO, "step", step = %step_id, label = %label)
}
