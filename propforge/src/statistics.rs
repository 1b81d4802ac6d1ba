//! Sampling helpers and generated-value distribution reports.

use std::collections::BTreeMap;
use std::fmt;

use crate::arbitrary::Arbitrary;
use crate::rng::RandomSource;

/// Materialize `n` unbiased draws from an arbitrary, seeded from entropy.
pub fn sample<T, A: Arbitrary<T>>(arbitrary: &A, n: usize) -> Vec<T> {
    sample_with_seed(arbitrary, RandomSource::from_entropy().seed(), n)
}

/// Materialize `n` unbiased draws from an arbitrary under a fixed seed.
pub fn sample_with_seed<T, A: Arbitrary<T>>(arbitrary: &A, seed: u64, n: usize) -> Vec<T> {
    let mut rng = RandomSource::from_seed(seed);
    (0..n)
        .map(|_| arbitrary.generate(&mut rng, None).into_value())
        .collect()
}

/// Label counts over a sample of generated values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Distribution {
    counts: BTreeMap<String, usize>,
    total: usize,
}

impl Distribution {
    /// How often a label was observed.
    pub fn count(&self, label: &str) -> usize {
        self.counts.get(label).copied().unwrap_or(0)
    }

    /// Share of the sample carrying a label, in percent.
    pub fn percentage(&self, label: &str) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        self.count(label) as f64 * 100.0 / self.total as f64
    }

    /// Observed labels with their counts, most frequent first.
    pub fn entries(&self) -> Vec<(&str, usize)> {
        let mut entries: Vec<(&str, usize)> = self
            .counts
            .iter()
            .map(|(label, count)| (label.as_str(), *count))
            .collect();
        entries.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
        entries
    }

    pub fn total(&self) -> usize {
        self.total
    }
}

impl fmt::Display for Distribution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (label, count) in self.entries() {
            writeln!(
                f,
                "{}: {:.2}% ({} / {})",
                label,
                count as f64 * 100.0 / self.total.max(1) as f64,
                count,
                self.total
            )?;
        }
        Ok(())
    }
}

/// Classify `n` entropy-seeded draws and aggregate the label distribution.
pub fn statistics<T, A, C>(arbitrary: &A, classify: C, n: usize) -> Distribution
where
    A: Arbitrary<T>,
    C: Fn(&T) -> String,
{
    statistics_with_seed(arbitrary, classify, RandomSource::from_entropy().seed(), n)
}

/// Classify `n` draws under a fixed seed; the distribution is deterministic.
pub fn statistics_with_seed<T, A, C>(arbitrary: &A, classify: C, seed: u64, n: usize) -> Distribution
where
    A: Arbitrary<T>,
    C: Fn(&T) -> String,
{
    let mut rng = RandomSource::from_seed(seed);
    let mut counts: BTreeMap<String, usize> = BTreeMap::new();
    for _ in 0..n {
        let value = arbitrary.generate(&mut rng, None).into_value();
        *counts.entry(classify(&value)).or_insert(0) += 1;
    }
    Distribution { counts, total: n }
}
