//! Raw timing samples, kept per `<algorithm>.time.<name>`.

use crate::summary::TimerInfo;
use std::collections::BTreeMap;
use std::time::Instant;

/// Run `f` and return its result with the elapsed wall time in ms.
pub fn timed<T>(f: impl FnOnce() -> T) -> (T, f64) {
    let start = Instant::now();
    let out = f();
    (out, start.elapsed().as_secs_f64() * 1e3)
}

#[derive(Debug, Default)]
pub struct TimerStore {
    timers: BTreeMap<String, Vec<f64>>,
}

impl TimerStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn name(algname: &str, key: &str) -> String {
        format!("{}.time.{}", algname, key)
    }

    /// Start (or restart) an empty series.
    pub fn book(&mut self, algname: &str, key: &str) {
        self.timers.insert(Self::name(algname, key), Vec::new());
    }

    /// Append a sample, booking the series on first use.
    pub fn fill(&mut self, algname: &str, key: &str, ms: f64) {
        self.timers
            .entry(Self::name(algname, key))
            .or_default()
            .push(ms);
    }

    pub fn get(&self, algname: &str, key: &str) -> Option<&[f64]> {
        self.timers.get(&Self::name(algname, key)).map(Vec::as_slice)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.timers.contains_key(name)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.timers.keys().map(String::as_str)
    }

    /// Mean and sample standard deviation. A single sample reports itself
    /// for both; an empty series has no stats.
    pub fn stats(&self, algname: &str, key: &str) -> Option<(f64, f64)> {
        self.timers
            .get(&Self::name(algname, key))
            .and_then(|s| series_stats(s))
    }

    pub fn summary(&self) -> Vec<TimerInfo> {
        self.timers
            .iter()
            .filter_map(|(name, samples)| {
                let (mean_ms, std_ms) = series_stats(samples)?;
                Some(TimerInfo {
                    name: name.clone(),
                    count: samples.len(),
                    total_ms: samples.iter().sum(),
                    mean_ms,
                    std_ms,
                })
            })
            .collect()
    }
}

fn series_stats(samples: &[f64]) -> Option<(f64, f64)> {
    match samples {
        [] => None,
        [only] => Some((*only, *only)),
        _ => {
            let n = samples.len() as f64;
            let mean = samples.iter().sum::<f64>() / n;
            let var = samples.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / (n - 1.0);
            Some((mean, var.sqrt()))
        }
    }
}
