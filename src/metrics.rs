use std::time::Duration;

/// Spread of per-run wall-clock times.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunTimeStats {
    pub mean: Duration,
    pub median: Duration,
    pub p25: Duration,
    pub p75: Duration,
}

impl RunTimeStats {
    /// Quartiles are taken by index into the sorted times, no interpolation.
    /// `None` for fewer than two runs.
    pub fn from_elapsed(elapsed: &[Duration]) -> Option<Self> {
        if elapsed.len() < 2 {
            return None;
        }
        let mut sorted = elapsed.to_vec();
        sorted.sort_unstable();
        let quartile = |q: usize| sorted[sorted.len() * q / 4];
        let total: Duration = elapsed.iter().sum();
        Some(Self {
            mean: total / elapsed.len() as u32,
            median: quartile(2),
            p25: quartile(1),
            p75: quartile(3),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secs(v: &[u64]) -> Vec<Duration> {
        v.iter().copied().map(Duration::from_secs).collect()
    }

    #[test]
    fn needs_two_runs() {
        assert_eq!(RunTimeStats::from_elapsed(&[]), None);
        assert_eq!(RunTimeStats::from_elapsed(&secs(&[7])), None);
    }

    #[test]
    fn quartiles_by_index() {
        let stats = RunTimeStats::from_elapsed(&secs(&[4, 1, 3, 2])).unwrap();
        assert_eq!(stats.mean, Duration::from_millis(2500));
        assert_eq!(stats.median, Duration::from_secs(3));
        assert_eq!(stats.p25, Duration::from_secs(2));
        assert_eq!(stats.p75, Duration::from_secs(4));
    }
}
