use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use super::MetricsSink;

#[derive(Debug, Default)]
struct Store {
    counters: BTreeMap<String, u64>,
    timings: BTreeMap<String, Vec<Duration>>,
    gauges: BTreeMap<String, f64>,
    histograms: BTreeMap<String, Vec<f64>>,
}

/// Keeps every data point in memory. Backs the `/metrics` endpoint and tests.
#[derive(Debug, Default)]
pub struct InMemoryMetrics {
    store: Mutex<Store>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TimingSummary {
    pub count: usize,
    pub total_ms: u64,
    pub max_ms: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct HistogramSummary {
    pub count: usize,
    pub sum: f64,
    pub max: f64,
}

/// Keys are the metric name, followed by `|tag,tag` when tags were attached.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MetricsSnapshot {
    pub counters: BTreeMap<String, u64>,
    pub timings: BTreeMap<String, TimingSummary>,
    pub gauges: BTreeMap<String, f64>,
    pub histograms: BTreeMap<String, HistogramSummary>,
}

fn key(name: &str, tags: &[String]) -> String {
    if tags.is_empty() {
        name.to_string()
    } else {
        format!("{}|{}", name, tags.join(","))
    }
}

fn name_of(key: &str) -> &str {
    key.split('|').next().unwrap_or(key)
}

impl InMemoryMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    fn store(&self) -> std::sync::MutexGuard<'_, Store> {
        self.store.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Sum of a counter across all tag sets.
    pub fn counter(&self, name: &str) -> u64 {
        self.store()
            .counters
            .iter()
            .filter(|(k, _)| name_of(k) == name)
            .map(|(_, v)| *v)
            .sum()
    }

    pub fn timings(&self, name: &str) -> Vec<Duration> {
        self.store()
            .timings
            .iter()
            .filter(|(k, _)| name_of(k) == name)
            .flat_map(|(_, v)| v.iter().copied())
            .collect()
    }

    /// Last value written under `name`, whatever its tags.
    pub fn gauge_value(&self, name: &str) -> Option<f64> {
        self.store()
            .gauges
            .iter()
            .filter(|(k, _)| name_of(k) == name)
            .map(|(_, v)| *v)
            .last()
    }

    pub fn histogram(&self, name: &str) -> Vec<f64> {
        self.store()
            .histograms
            .iter()
            .filter(|(k, _)| name_of(k) == name)
            .flat_map(|(_, v)| v.iter().copied())
            .collect()
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let store = self.store();
        let timings = store
            .timings
            .iter()
            .map(|(k, samples)| {
                let summary = TimingSummary {
                    count: samples.len(),
                    total_ms: samples.iter().map(|d| d.as_millis() as u64).sum(),
                    max_ms: samples.iter().map(|d| d.as_millis() as u64).max().unwrap_or(0),
                };
                (k.clone(), summary)
            })
            .collect();

        let histograms = store
            .histograms
            .iter()
            .map(|(k, values)| {
                let summary = HistogramSummary {
                    count: values.len(),
                    sum: values.iter().sum(),
                    max: values.iter().copied().fold(0.0, f64::max),
                };
                (k.clone(), summary)
            })
            .collect();

        MetricsSnapshot {
            counters: store.counters.clone(),
            timings,
            gauges: store.gauges.clone(),
            histograms,
        }
    }
}

impl MetricsSink for InMemoryMetrics {
    fn incr(&self, name: &str, tags: &[String]) {
        *self.store().counters.entry(key(name, tags)).or_insert(0) += 1;
    }

    fn timing(&self, name: &str, elapsed: Duration, tags: &[String]) {
        self.store()
            .timings
            .entry(key(name, tags))
            .or_default()
            .push(elapsed);
    }

    fn gauge(&self, name: &str, value: f64, tags: &[String]) {
        self.store().gauges.insert(key(name, tags), value);
    }

    fn histogram(&self, name: &str, value: f64, tags: &[String]) {
        self.store()
            .histograms
            .entry(key(name, tags))
            .or_default()
            .push(value);
    }
}
