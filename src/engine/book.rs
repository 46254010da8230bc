//! One-dimensional histograms keyed by `<algorithm>.<name>`.
//!
//! Histograms booked as timers keep their raw fills until `rebook`, which
//! derives new bin edges from what was seen during sampling. Every other
//! histogram keeps its binning and only loses its contents.

use crate::error::{Error, Result};
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Histogram {
    edges: Vec<f64>,
    counts: Vec<u64>,
    underflow: u64,
    overflow: u64,
    entries: u64,
    nonfinite: u64,
    sum: f64,
    sum2: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    axis: Option<String>,
}

impl Histogram {
    /// Edges must be finite, strictly increasing, and at least two long.
    pub fn new(edges: Vec<f64>, axis: Option<String>) -> Result<Self> {
        if edges.len() < 2 {
            return Err(Error::Config("histogram needs at least two edges".to_string()));
        }
        if edges.iter().any(|e| !e.is_finite()) || edges.windows(2).any(|w| w[0] >= w[1]) {
            return Err(Error::Config(
                "histogram edges must be finite and strictly increasing".to_string(),
            ));
        }
        Ok(Self {
            counts: vec![0; edges.len() - 1],
            edges,
            underflow: 0,
            overflow: 0,
            entries: 0,
            nonfinite: 0,
            sum: 0.0,
            sum2: 0.0,
            axis,
        })
    }

    /// Same binning, no contents.
    pub fn cleared(&self) -> Self {
        Self {
            edges: self.edges.clone(),
            counts: vec![0; self.counts.len()],
            underflow: 0,
            overflow: 0,
            entries: 0,
            nonfinite: 0,
            sum: 0.0,
            sum2: 0.0,
            axis: self.axis.clone(),
        }
    }

    /// Non-finite values are counted as overflow and kept out of the
    /// mean and std.
    pub fn fill(&mut self, x: f64) {
        if !x.is_finite() {
            self.overflow += 1;
            self.nonfinite += 1;
            return;
        }
        self.entries += 1;
        self.sum += x;
        self.sum2 += x * x;

        let last = self.edges.len() - 1;
        if x < self.edges[0] {
            self.underflow += 1;
        } else if x >= self.edges[last] {
            self.overflow += 1;
        } else {
            // First edge strictly greater than x closes x's bin.
            let upper = self.edges.partition_point(|&e| e <= x);
            self.counts[upper - 1] += 1;
        }
    }

    pub fn edges(&self) -> &[f64] {
        &self.edges
    }

    pub fn counts(&self) -> &[u64] {
        &self.counts
    }

    pub fn underflow(&self) -> u64 {
        self.underflow
    }

    pub fn overflow(&self) -> u64 {
        self.overflow
    }

    /// Finite fills.
    pub fn entries(&self) -> u64 {
        self.entries
    }

    /// NaN and infinite fills.
    pub fn nonfinite(&self) -> u64 {
        self.nonfinite
    }

    pub fn mean(&self) -> Option<f64> {
        (self.entries > 0).then(|| self.sum / self.entries as f64)
    }

    /// Population standard deviation of every fill, in range or not.
    pub fn std(&self) -> Option<f64> {
        let mean = self.mean()?;
        let var = self.sum2 / self.entries as f64 - mean * mean;
        Some(var.max(0.0).sqrt())
    }
}

/// `n` equal-width bins over `[lo, hi)`.
pub fn uniform_edges(lo: f64, hi: f64, n: usize) -> Vec<f64> {
    let n = n.max(1);
    let width = (hi - lo) / n as f64;
    (0..=n).map(|i| lo + width * i as f64).collect()
}

/// Edges covering every sample, about `sqrt(n)` bins.
fn auto_edges(samples: &[f64]) -> Option<Vec<f64>> {
    let lo = samples.iter().copied().fold(f64::INFINITY, f64::min);
    let hi = samples.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if !lo.is_finite() || !hi.is_finite() || hi <= lo {
        return None;
    }
    let nbins = ((samples.len() as f64).sqrt().ceil() as usize).clamp(5, 100);
    // Widen the top edge so the maximum lands in range.
    let hi = hi + (hi - lo) / nbins as f64;
    Some(uniform_edges(lo, hi, nbins))
}

#[derive(Debug, Default)]
pub struct HistBook {
    hists: BTreeMap<String, Histogram>,
    timers: BTreeMap<String, Vec<f64>>,
    rebooked: bool,
}

impl HistBook {
    pub fn new() -> Self {
        Self::default()
    }

    fn key(algname: &str, name: &str) -> String {
        format!("{}.{}", algname, name)
    }

    pub fn book(
        &mut self,
        algname: &str,
        name: &str,
        edges: Vec<f64>,
        axis: Option<&str>,
    ) -> Result<()> {
        let key = Self::key(algname, name);
        if self.hists.contains_key(&key) {
            return Err(Error::Config(format!("histogram {} already booked", key)));
        }
        let hist = Histogram::new(edges, axis.map(str::to_string))?;
        info!("booking {}", key);
        self.hists.insert(key, hist);
        Ok(())
    }

    /// Book a histogram whose binning is recomputed at `rebook`.
    pub fn book_timer(&mut self, algname: &str, name: &str, edges: Vec<f64>) -> Result<()> {
        self.book(algname, name, edges, Some("ms"))?;
        self.timers.insert(Self::key(algname, name), Vec::new());
        Ok(())
    }

    pub fn fill(&mut self, algname: &str, name: &str, value: f64) -> Result<()> {
        let key = Self::key(algname, name);
        let hist = self
            .hists
            .get_mut(&key)
            .ok_or_else(|| Error::Config(format!("histogram {} is not booked", key)))?;
        hist.fill(value);
        if !self.rebooked && value.is_finite() {
            if let Some(samples) = self.timers.get_mut(&key) {
                samples.push(value);
            }
        }
        Ok(())
    }

    /// Reset every histogram. Timer histograms get edges derived from the
    /// values filled so far; others keep their edges.
    pub fn rebook(&mut self) {
        self.rebooked = true;
        for (key, hist) in self.hists.iter_mut() {
            let fresh = match self.timers.remove(key) {
                None => hist.cleared(),
                Some(samples) => match auto_edges(&samples)
                    .and_then(|edges| Histogram::new(edges, Some("ms".to_string())).ok())
                {
                    Some(h) => h,
                    None => {
                        warn!("{} fails rebook, using original bins", key);
                        hist.cleared()
                    }
                },
            };
            *hist = fresh;
        }
    }

    pub fn get(&self, key: &str) -> Option<&Histogram> {
        self.hists.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.hists.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.hists.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Histogram)> {
        self.hists.iter()
    }

    pub fn len(&self) -> usize {
        self.hists.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hists.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn fills_land_in_half_open_bins() {
        let mut h = Histogram::new(vec![0.0, 1.0, 2.0], None).unwrap();
        for x in [-1.0, 0.0, 0.5, 1.0, 1.99, 2.0, 5.0] {
            h.fill(x);
        }
        assert_eq!(h.counts(), [2, 2]);
        assert_eq!(h.underflow(), 1);
        assert_eq!(h.overflow(), 2);
        assert_eq!(h.entries(), 7);
    }

    #[test]
    fn non_finite_fills_overflow_without_skewing_stats() {
        let mut h = Histogram::new(vec![0.0, 1.0, 2.0], None).unwrap();
        for x in [0.5, f64::NAN, f64::INFINITY, f64::NEG_INFINITY, 1.5] {
            h.fill(x);
        }
        assert_eq!(h.counts(), [1, 1]);
        assert_eq!(h.overflow(), 3);
        assert_eq!(h.nonfinite(), 3);
        assert_eq!(h.entries(), 2);
        assert_eq!(h.mean(), Some(1.0));
    }

    #[test]
    fn mean_and_std() {
        let mut h = Histogram::new(uniform_edges(0.0, 10.0, 10), None).unwrap();
        for x in [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0] {
            h.fill(x);
        }
        assert_eq!(h.mean(), Some(5.0));
        assert_eq!(h.std(), Some(2.0));
    }

    #[test]
    fn rejects_bad_edges() {
        assert!(Histogram::new(vec![1.0], None).is_err());
        assert!(Histogram::new(vec![0.0, 0.0, 1.0], None).is_err());
        assert!(Histogram::new(vec![0.0, f64::NAN], None).is_err());
    }

    #[test]
    fn book_fill_and_duplicate() {
        let mut book = HistBook::new();
        book.book("alg", "nrows", uniform_edges(0.0, 100.0, 10), None).unwrap();
        assert!(book.book("alg", "nrows", vec![0.0, 1.0], None).is_err());
        book.fill("alg", "nrows", 42.0).unwrap();
        assert_eq!(book.get("alg.nrows").unwrap().counts()[4], 1);
        assert!(book.fill("alg", "missing", 1.0).is_err());
    }

    #[test]
    fn rebook_clears_and_rebins_timers() {
        let mut book = HistBook::new();
        book.book("alg", "n", vec![0.0, 10.0], None).unwrap();
        book.book_timer("steer", "time.alg", uniform_edges(0.0, 100.0, 50)).unwrap();
        for ms in [1.0, 2.0, 3.0, 4.0] {
            book.fill("steer", "time.alg", ms).unwrap();
        }
        book.fill("alg", "n", 3.0).unwrap();

        book.rebook();
        let n = book.get("alg.n").unwrap();
        assert_eq!(n.entries(), 0);
        assert_eq!(n.edges(), [0.0, 10.0]);

        let t = book.get("steer.time.alg").unwrap();
        assert_eq!(t.entries(), 0);
        assert_eq!(t.edges()[0], 1.0);
        assert!(*t.edges().last().unwrap() > 4.0);
    }

    #[test]
    fn rebook_keeps_bins_when_timer_saw_one_value() {
        let mut book = HistBook::new();
        book.book_timer("steer", "time.alg", vec![0.0, 1.0, 2.0]).unwrap();
        book.fill("steer", "time.alg", 0.5).unwrap();
        book.rebook();
        assert_eq!(book.get("steer.time.alg").unwrap().edges(), [0.0, 1.0, 2.0]);
    }
}
