//! Label-keyed counters, gauges and histograms rendered in the Prometheus
//! text format. Series are created lazily on first use and kept in `DashMap`s
//! so every connection task can record without a global lock.

use std::fmt::Write;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::time::Duration;

use dashmap::DashMap;

/// Sorted label pairs identifying one series.
type LabelKey = Vec<(String, String)>;

fn label_key(labels: &[(&str, &str)]) -> LabelKey {
    let mut key: LabelKey = labels
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    key.sort();
    key
}

fn escape_label(v: &str) -> String {
    v.replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\n")
}

/// `k="v",k2="v2"` (empty for an unlabelled series).
fn label_body(key: &LabelKey) -> String {
    key.iter()
        .map(|(k, v)| format!("{k}=\"{}\"", escape_label(v)))
        .collect::<Vec<_>>()
        .join(",")
}

fn series(name: &str, key: &LabelKey) -> String {
    if key.is_empty() {
        name.to_string()
    } else {
        format!("{name}{{{}}}", label_body(key))
    }
}

#[derive(Default)]
pub struct CounterVec {
    map: DashMap<LabelKey, AtomicU64>,
}

impl CounterVec {
    pub fn inc(&self, labels: &[(&str, &str)]) {
        self.add(labels, 1);
    }

    pub fn add(&self, labels: &[(&str, &str)], v: u64) {
        self.map
            .entry(label_key(labels))
            .or_default()
            .fetch_add(v, Ordering::Relaxed);
    }

    /// Current value (0 for an unseen series).
    pub fn get(&self, labels: &[(&str, &str)]) -> u64 {
        self.map
            .get(&label_key(labels))
            .map(|c| c.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    fn render(&self, name: &str, out: &mut String) {
        let _ = writeln!(out, "# TYPE {name} counter");
        for r in self.map.iter() {
            let _ = writeln!(
                out,
                "{} {}",
                series(name, r.key()),
                r.value().load(Ordering::Relaxed)
            );
        }
    }
}

#[derive(Default)]
pub struct GaugeVec {
    map: DashMap<LabelKey, AtomicI64>,
}

impl GaugeVec {
    pub fn inc(&self, labels: &[(&str, &str)]) {
        self.add(labels, 1);
    }

    pub fn dec(&self, labels: &[(&str, &str)]) {
        self.add(labels, -1);
    }

    pub fn add(&self, labels: &[(&str, &str)], v: i64) {
        self.map
            .entry(label_key(labels))
            .or_default()
            .fetch_add(v, Ordering::Relaxed);
    }

    pub fn get(&self, labels: &[(&str, &str)]) -> i64 {
        self.map
            .get(&label_key(labels))
            .map(|g| g.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    fn render(&self, name: &str, out: &mut String) {
        let _ = writeln!(out, "# TYPE {name} gauge");
        for r in self.map.iter() {
            let _ = writeln!(
                out,
                "{} {}",
                series(name, r.key()),
                r.value().load(Ordering::Relaxed)
            );
        }
    }
}

/// Upper bounds in milliseconds. Authentication may call out to a remote
/// service, so the scale runs up to ten seconds.
const BUCKETS_MILLIS: [u64; 10] = [1, 5, 10, 25, 50, 100, 250, 1_000, 2_500, 10_000];

#[derive(Default)]
struct Histogram {
    count: AtomicU64,
    sum_millis: AtomicU64,
    buckets: [AtomicU64; BUCKETS_MILLIS.len()],
}

#[derive(Default)]
pub struct HistogramVec {
    map: DashMap<LabelKey, Histogram>,
}

impl HistogramVec {
    pub fn observe(&self, labels: &[(&str, &str)], elapsed: Duration) {
        let hist = self.map.entry(label_key(labels)).or_default();
        let millis = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX);

        hist.count.fetch_add(1, Ordering::Relaxed);
        hist.sum_millis.fetch_add(millis, Ordering::Relaxed);
        for (bucket, &le) in hist.buckets.iter().zip(BUCKETS_MILLIS.iter()) {
            if millis <= le {
                bucket.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    pub fn count(&self, labels: &[(&str, &str)]) -> u64 {
        self.map
            .get(&label_key(labels))
            .map(|h| h.count.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    fn render(&self, name: &str, out: &mut String) {
        let _ = writeln!(out, "# TYPE {name} histogram");
        for r in self.map.iter() {
            let labels = label_body(r.key());
            let prefix = if labels.is_empty() {
                String::new()
            } else {
                format!("{labels},")
            };
            let hist = r.value();
            let count = hist.count.load(Ordering::Relaxed);

            for (bucket, le) in hist.buckets.iter().zip(BUCKETS_MILLIS) {
                let _ = writeln!(
                    out,
                    "{name}_bucket{{{prefix}le=\"{le}\"}} {}",
                    bucket.load(Ordering::Relaxed)
                );
            }
            let _ = writeln!(out, "{name}_bucket{{{prefix}le=\"+Inf\"}} {count}");
            let _ = writeln!(
                out,
                "{} {}",
                series(&format!("{name}_sum"), r.key()),
                hist.sum_millis.load(Ordering::Relaxed)
            );
            let _ = writeln!(out, "{} {count}", series(&format!("{name}_count"), r.key()));
        }
    }
}

/// Every series the gateway records.
#[derive(Default)]
pub struct StompMetrics {
    pub ws_upgrades: CounterVec,
    pub connections_opened: CounterVec,
    pub connections_active: GaugeVec,
    /// label: `command`
    pub frames_in: CounterVec,
    /// label: `reason`
    pub closes: CounterVec,
    /// label: `kind`
    pub errors: CounterVec,
    pub heartbeat_pings: CounterVec,
    pub heartbeat_timeouts: CounterVec,
    /// label: `outcome` (`ok` | `failed`), unit: milliseconds
    pub auth_duration: HistogramVec,
}

impl StompMetrics {
    pub fn render(&self) -> String {
        let mut out = String::new();
        self.ws_upgrades.render("stomplite_ws_upgrades_total", &mut out);
        self.connections_opened
            .render("stomplite_connections_opened_total", &mut out);
        self.connections_active
            .render("stomplite_connections_active", &mut out);
        self.frames_in.render("stomplite_frames_in_total", &mut out);
        self.closes.render("stomplite_closes_total", &mut out);
        self.errors.render("stomplite_errors_total", &mut out);
        self.heartbeat_pings
            .render("stomplite_heartbeat_pings_total", &mut out);
        self.heartbeat_timeouts
            .render("stomplite_heartbeat_timeouts_total", &mut out);
        self.auth_duration
            .render("stomplite_auth_duration_millis", &mut out);
        out
    }
}
