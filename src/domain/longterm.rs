//! Long-term measurement series
//!
//! Bounded, time-ordered sample storage backing the frequency and DAC
//! history of each channel.

use std::collections::VecDeque;
use std::time::SystemTime;

/// Time-ordered series of samples with optional bounded capacity
///
/// With a capacity limit the series behaves as a ring buffer: the oldest
/// entry is evicted first on overflow. Without a limit it appends without
/// bound. Chronological order is preserved either way.
#[derive(Debug, Clone, Default)]
pub struct LongtermSeries {
    points: VecDeque<(SystemTime, f64)>,
    limit: Option<usize>,
}

impl LongtermSeries {
    /// Create an unbounded series
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a series that keeps at most `limit` points
    pub fn with_limit(limit: usize) -> Self {
        Self {
            points: VecDeque::with_capacity(limit),
            limit: Some(limit),
        }
    }

    /// Append a sample stamped with the current wall-clock time
    pub fn append(&mut self, value: f64) {
        self.append_at(SystemTime::now(), value);
    }

    /// Append a sample with an explicit timestamp
    pub fn append_at(&mut self, time: SystemTime, value: f64) {
        if let Some(limit) = self.limit {
            if self.points.len() == limit {
                self.points.pop_front();
            }
        }
        self.points.push_back((time, value));
    }

    /// Number of stored samples
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Whether the series is empty
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// The most recent sample, if any
    pub fn newest(&self) -> Option<(SystemTime, f64)> {
        self.points.back().copied()
    }

    /// Timestamps of the oldest and newest samples
    pub fn time_range(&self) -> Option<(SystemTime, SystemTime)> {
        match (self.points.front(), self.points.back()) {
            (Some(&(t_min, _)), Some(&(t_max, _))) => Some((t_min, t_max)),
            _ => None,
        }
    }

    /// Iterate samples oldest first
    pub fn iter(&self) -> impl Iterator<Item = &(SystemTime, f64)> {
        self.points.iter()
    }

    /// Drop all stored samples
    pub fn clear(&mut self) {
        self.points.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_unbounded_append() {
        let mut series = LongtermSeries::new();
        for i in 0..100 {
            series.append(i as f64);
        }
        assert_eq!(series.len(), 100);
        assert_eq!(series.newest().unwrap().1, 99.0);
    }

    #[test]
    fn test_ring_eviction_oldest_first() {
        let mut series = LongtermSeries::with_limit(3);
        let t0 = SystemTime::UNIX_EPOCH;
        for i in 0..5u64 {
            series.append_at(t0 + Duration::from_secs(i), i as f64);
        }
        assert_eq!(series.len(), 3);
        let values: Vec<f64> = series.iter().map(|&(_, v)| v).collect();
        assert_eq!(values, vec![2.0, 3.0, 4.0]);
    }

    #[test]
    fn test_chronological_order_preserved() {
        let mut series = LongtermSeries::with_limit(4);
        let t0 = SystemTime::UNIX_EPOCH;
        for i in 0..10u64 {
            series.append_at(t0 + Duration::from_secs(i), i as f64);
        }
        let times: Vec<SystemTime> = series.iter().map(|&(t, _)| t).collect();
        let mut sorted = times.clone();
        sorted.sort();
        assert_eq!(times, sorted);
    }

    #[test]
    fn test_time_range() {
        let mut series = LongtermSeries::with_limit(2);
        let t0 = SystemTime::UNIX_EPOCH;
        series.append_at(t0 + Duration::from_secs(1), 1.0);
        series.append_at(t0 + Duration::from_secs(2), 2.0);
        series.append_at(t0 + Duration::from_secs(3), 3.0);
        let (t_min, t_max) = series.time_range().unwrap();
        assert_eq!(t_min, t0 + Duration::from_secs(2));
        assert_eq!(t_max, t0 + Duration::from_secs(3));
    }

    #[test]
    fn test_empty_series() {
        let series = LongtermSeries::new();
        assert!(series.is_empty());
        assert!(series.newest().is_none());
        assert!(series.time_range().is_none());
    }
}
