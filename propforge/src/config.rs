//! Runner parameters and their validation.

use std::sync::Arc;
use std::time::Duration;

use crate::error::PropertyError;
use crate::runner::RunDetails;

/// How much of the run the failure report describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum Verbosity {
    /// Counterexample, seed, and path only.
    Quiet,
    /// Adds the execution tree of the shrink search.
    Verbose,
    /// Adds every executed candidate, skipped trials included.
    VeryVerbose,
}

impl From<u8> for Verbosity {
    fn from(level: u8) -> Self {
        match level {
            0 => Verbosity::Quiet,
            1 => Verbosity::Verbose,
            _ => Verbosity::VeryVerbose,
        }
    }
}

/// Callback receiving the final [`RunDetails`] before `check` returns.
pub type Reporter<T> = Arc<dyn Fn(&RunDetails<T>) + Send + Sync>;

/// Configuration for one `check`/`assert_property` call.
pub struct Parameters<T> {
    /// Seed of the random stream; drawn from entropy when absent.
    pub seed: Option<u64>,
    /// Replay path of a previously reported counterexample.
    pub path: Option<String>,
    /// Number of (non-skipped) trials to run.
    pub num_runs: usize,
    /// Skip budget: exceeding it fails the run as a configuration error.
    pub max_skips_per_run: usize,
    /// Candidate-execution budget for the shrink search.
    pub max_shrinks: usize,
    /// Per-trial wall-clock limit.
    pub timeout: Option<Duration>,
    /// Stop issuing trials after this wall-clock budget.
    pub interrupt_after_time_limit: Option<Duration>,
    /// Skip remaining trials after this wall-clock budget.
    pub skip_all_after_time_limit: Option<Duration>,
    /// Disable the bias schedule entirely.
    pub unbiased: bool,
    /// Stop at the first failure without shrinking.
    pub end_on_failure: bool,
    /// Report verbosity.
    pub verbose: Verbosity,
    /// Literal cases always tried before any random trial.
    pub examples: Vec<T>,
    /// Callback receiving the final run details.
    pub reporter: Option<Reporter<T>>,
}

impl<T> Default for Parameters<T> {
    fn default() -> Self {
        Self {
            seed: None,
            path: None,
            num_runs: 100,
            max_skips_per_run: 100,
            max_shrinks: 1000,
            timeout: None,
            interrupt_after_time_limit: None,
            skip_all_after_time_limit: None,
            unbiased: false,
            end_on_failure: false,
            verbose: Verbosity::Quiet,
            examples: Vec::new(),
            reporter: None,
        }
    }
}

impl<T> Parameters<T> {
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn with_num_runs(mut self, num_runs: usize) -> Self {
        self.num_runs = num_runs;
        self
    }

    pub fn with_max_shrinks(mut self, max_shrinks: usize) -> Self {
        self.max_shrinks = max_shrinks;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_interrupt_after(mut self, limit: Duration) -> Self {
        self.interrupt_after_time_limit = Some(limit);
        self
    }

    pub fn with_skip_all_after(mut self, limit: Duration) -> Self {
        self.skip_all_after_time_limit = Some(limit);
        self
    }

    pub fn unbiased(mut self) -> Self {
        self.unbiased = true;
        self
    }

    pub fn end_on_failure(mut self) -> Self {
        self.end_on_failure = true;
        self
    }

    pub fn with_verbosity(mut self, verbose: Verbosity) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn with_examples(mut self, examples: Vec<T>) -> Self {
        self.examples = examples;
        self
    }

    pub fn with_reporter(mut self, reporter: impl Fn(&RunDetails<T>) + Send + Sync + 'static) -> Self {
        self.reporter = Some(Arc::new(reporter));
        self
    }

    /// Reject configurations the runner cannot honor.
    pub fn validate(&self) -> Result<(), PropertyError> {
        if self.num_runs == 0 {
            return Err(PropertyError::contract_violation(
                "num_runs must be greater than zero",
            ));
        }
        if self.max_shrinks == 0 {
            return Err(PropertyError::contract_violation(
                "max_shrinks must be greater than zero",
            ));
        }
        if let Some(timeout) = self.timeout {
            if timeout.is_zero() {
                return Err(PropertyError::contract_violation(
                    "timeout must be greater than zero",
                ));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_documented_contract() {
        let params: Parameters<i64> = Parameters::default();
        assert_eq!(params.num_runs, 100);
        assert_eq!(params.max_skips_per_run, 100);
        assert_eq!(params.max_shrinks, 1000);
        assert!(params.seed.is_none());
        assert!(!params.unbiased);
        assert_eq!(params.verbose, Verbosity::Quiet);
    }

    #[test]
    fn builders_compose() {
        let params: Parameters<i64> = Parameters::default()
            .with_seed(42)
            .with_num_runs(10)
            .unbiased()
            .end_on_failure()
            .with_verbosity(Verbosity::Verbose);
        assert_eq!(params.seed, Some(42));
        assert_eq!(params.num_runs, 10);
        assert!(params.unbiased);
        assert!(params.end_on_failure);
        assert!(params.validate().is_ok());
    }

    #[test]
    fn invalid_configurations_are_rejected() {
        let params: Parameters<i64> = Parameters::default().with_num_runs(0);
        assert!(params.validate().is_err());

        let params: Parameters<i64> = Parameters::default().with_max_shrinks(0);
        assert!(params.validate().is_err());

        let params: Parameters<i64> = Parameters::default().with_timeout(Duration::ZERO);
        assert!(params.validate().is_err());
    }

    #[test]
    fn verbosity_orders_and_converts() {
        assert!(Verbosity::Quiet < Verbosity::Verbose);
        assert!(Verbosity::Verbose < Verbosity::VeryVerbose);
        assert_eq!(Verbosity::from(0), Verbosity::Quiet);
        assert_eq!(Verbosity::from(2), Verbosity::VeryVerbose);
        assert_eq!(Verbosity::from(7), Verbosity::VeryVerbose);
    }
}
