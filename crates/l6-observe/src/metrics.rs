use hdrhistogram::Histogram;
use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

pub type LabelMap = BTreeMap<String, String>;

const WINDOW: Duration = Duration::from_secs(60);
const SERIES_LIMIT: usize = 8;
const LABEL_VALUE_LIMIT: usize = 64;

static ENABLED: AtomicBool = AtomicBool::new(true);

#[derive(Hash, Eq, PartialEq, Clone)]
struct MetricKey {
    name: &'static str,
    labels: Vec<(String, String)>,
}

impl MetricKey {
    fn new(name: &'static str, labels: LabelMap) -> Self {
        Self {
            name,
            labels: sanitize_labels(labels).into_iter().collect(),
        }
    }

    fn fmt_labels(&self) -> String {
        if self.labels.is_empty() {
            String::new()
        } else {
            let inner = self
                .labels
                .iter()
                .map(|(k, v)| format!("{}=\"{}\"", k, v))
                .collect::<Vec<_>>()
                .join(",");
            format!("{{{}}}", inner)
        }
    }
}

/// Caps label count and value length so selectors cannot explode the series set.
fn sanitize_labels(labels: LabelMap) -> LabelMap {
    labels
        .into_iter()
        .take(SERIES_LIMIT)
        .map(|(k, v)| {
            let value = if v.chars().count() > LABEL_VALUE_LIMIT {
                v.chars().take(LABEL_VALUE_LIMIT).collect()
            } else {
                v
            };
            (k, value.replace('"', "'"))
        })
        .collect()
}

struct HistEntry {
    histogram: Histogram<u64>,
    sum: u128,
    window_start: Instant,
}

impl HistEntry {
    fn new() -> Option<Self> {
        Some(Self {
            histogram: Histogram::<u64>::new(3).ok()?,
            sum: 0,
            window_start: Instant::now(),
        })
    }
}

static COUNTERS: OnceCell<Mutex<HashMap<MetricKey, u64>>> = OnceCell::new();
static HISTOGRAMS: OnceCell<Mutex<HashMap<MetricKey, HistEntry>>> = OnceCell::new();

fn counters() -> &'static Mutex<HashMap<MetricKey, u64>> {
    COUNTERS.get_or_init(|| Mutex::new(HashMap::new()))
}

fn histograms() -> &'static Mutex<HashMap<MetricKey, HistEntry>> {
    HISTOGRAMS.get_or_init(|| Mutex::new(HashMap::new()))
}

pub fn set_enabled(enabled: bool) {
    ENABLED.store(enabled, Ordering::Relaxed);
}

pub fn labels<const N: usize>(pairs: [(&str, &str); N]) -> LabelMap {
    pairs
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

pub fn inc(name: &'static str, labels: LabelMap) {
    add(name, 1, labels);
}

pub fn add(name: &'static str, delta: u64, labels: LabelMap) {
    if !ENABLED.load(Ordering::Relaxed) {
        return;
    }
    let key = MetricKey::new(name, labels);
    let mut map = counters().lock();
    *map.entry(key).or_insert(0) += delta;
}

pub fn observe(name: &'static str, value: u64, labels: LabelMap) {
    if !ENABLED.load(Ordering::Relaxed) {
        return;
    }
    let key = MetricKey::new(name, labels);
    let mut map = histograms().lock();
    if !map.contains_key(&key) {
        let Some(entry) = HistEntry::new() else {
            return;
        };
        map.insert(key.clone(), entry);
    }
    if let Some(entry) = map.get_mut(&key) {
        if entry.window_start.elapsed() >= WINDOW {
            entry.histogram.reset();
            entry.sum = 0;
            entry.window_start = Instant::now();
        }
        let _ = entry.histogram.record(value);
        entry.sum += value as u128;
    }
}

pub fn counter_value(name: &'static str, labels: LabelMap) -> u64 {
    let key = MetricKey::new(name, labels);
    counters().lock().get(&key).copied().unwrap_or(0)
}

/// Sum of a counter across every label set.
pub fn counter_total(name: &str) -> u64 {
    counters()
        .lock()
        .iter()
        .filter(|(key, _)| key.name == name)
        .map(|(_, value)| *value)
        .sum()
}

pub fn quantile(name: &'static str, labels: LabelMap, q: f64) -> Option<u64> {
    let key = MetricKey::new(name, labels);
    let map = histograms().lock();
    let entry = map.get(&key)?;
    if entry.histogram.len() == 0 {
        return None;
    }
    Some(entry.histogram.value_at_quantile(q))
}

/// Prometheus text exposition of everything recorded so far.
pub fn render_text() -> String {
    let mut lines = Vec::new();

    for (key, value) in counters().lock().iter() {
        lines.push(format!("{}{} {}", key.name, key.fmt_labels(), value));
    }

    for (key, entry) in histograms().lock().iter() {
        if entry.histogram.len() == 0 {
            continue;
        }
        for q in [0.5, 0.9, 0.99] {
            let mut labels = key
                .labels
                .iter()
                .map(|(k, v)| format!("{}=\"{}\"", k, v))
                .collect::<Vec<_>>();
            labels.push(format!("quantile=\"{:.2}\"", q));
            lines.push(format!(
                "{}{{{}}} {}",
                key.name,
                labels.join(","),
                entry.histogram.value_at_quantile(q)
            ));
        }
        lines.push(format!(
            "{}_count{} {}",
            key.name,
            key.fmt_labels(),
            entry.histogram.len()
        ));
        lines.push(format!("{}_sum{} {}", key.name, key.fmt_labels(), entry.sum));
    }

    lines.sort();
    let mut output = lines.join("\n");
    if !output.is_empty() {
        output.push('\n');
    }
    output
}
