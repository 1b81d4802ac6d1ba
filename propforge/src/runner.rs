//! Trial orchestration: `check`/`assert_property`, the shrink search, and
//! seed/path replay.

use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::time::Instant;

use crate::arbitrary::BiasFactor;
use crate::config::{Parameters, Verbosity};
use crate::decorators::TimeoutProperty;
use crate::error::PropertyError;
use crate::property::{AsyncProperty, Property, RunOutcome, panic_message};
use crate::rng::RandomSource;
use crate::value::Value;

/// How one candidate execution went.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum ExecutionStatus {
    Success,
    Failure,
    Skipped,
}

/// One node of the recorded shrink search: the candidate, its outcome, and
/// the candidates tried while shrinking it.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct ExecutionTree<T> {
    pub value: T,
    pub status: ExecutionStatus,
    pub children: Vec<ExecutionTree<T>>,
}

impl<T> ExecutionTree<T> {
    fn leaf(value: T, status: ExecutionStatus) -> Self {
        Self {
            value,
            status,
            children: Vec::new(),
        }
    }
}

/// The structured result of one `check` call. Immutable once returned.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct RunDetails<T> {
    /// Whether the property failed (or the run could not be completed).
    pub failed: bool,
    /// Trials executed, skipped trials excluded; on failure, the failing
    /// trial counts.
    pub num_runs: usize,
    /// Trials discarded by preconditions or skip policies.
    pub num_skips: usize,
    /// Depth of the shrink search: how many times a smaller failing
    /// candidate replaced the current one.
    pub num_shrinks: usize,
    /// Seed of the random stream; replays the run exactly.
    pub seed: u64,
    /// The minimal failing value found, if any.
    pub counterexample: Option<T>,
    /// Replay path of the counterexample, colon-separated.
    pub counterexample_path: Option<String>,
    /// Rendered error of the minimal counterexample.
    pub error: Option<String>,
    /// Every trial as executed; failing trials carry the shrink search as
    /// their children.
    pub execution_summary: Vec<ExecutionTree<T>>,
    /// Whether a wall-clock budget stopped the run before `num_runs` trials.
    pub interrupted: bool,
}

impl<T: fmt::Debug> RunDetails<T> {
    /// Render the user-facing report. The failure header embeds `seed=` and
    /// `path="…"` in a stable format meant to be pasted into regression
    /// tests.
    pub fn format(&self, verbosity: Verbosity) -> String {
        if !self.failed {
            let mut out = format!("Property passed after {} test(s)", self.num_runs);
            if self.interrupted {
                out.push_str(" (interrupted before the full run)");
            }
            return out;
        }

        let mut out = format!(
            "Property failed after {} test(s) and {} shrink step(s)\n{{ seed={}, path=\"{}\" }}\n",
            self.num_runs,
            self.num_shrinks,
            self.seed,
            self.counterexample_path.as_deref().unwrap_or(""),
        );
        if let Some(counterexample) = &self.counterexample {
            out.push_str(&format!("Counterexample: {:?}\n", counterexample));
        }
        if let Some(error) = &self.error {
            out.push_str(&format!("Got error: {}", error));
        }
        if verbosity >= Verbosity::Verbose && !self.execution_summary.is_empty() {
            out.push_str("\nExecution summary:\n");
            render_tree(&self.execution_summary, 0, verbosity, &mut out);
        }
        out
    }
}

fn render_tree<T: fmt::Debug>(
    nodes: &[ExecutionTree<T>],
    depth: usize,
    verbosity: Verbosity,
    out: &mut String,
) {
    for node in nodes {
        if node.status == ExecutionStatus::Skipped && verbosity < Verbosity::VeryVerbose {
            continue;
        }
        let symbol = match node.status {
            ExecutionStatus::Success => ".",
            ExecutionStatus::Failure => "x",
            ExecutionStatus::Skipped => "!",
        };
        out.push_str(&format!(
            "{}{} {:?}\n",
            "  ".repeat(depth),
            symbol,
            node.value
        ));
        render_tree(&node.children, depth + 1, verbosity, out);
    }
}

fn format_path(trial: usize, shrink_path: &[usize]) -> String {
    let mut out = trial.to_string();
    for index in shrink_path {
        out.push(':');
        out.push_str(&index.to_string());
    }
    out
}

fn parse_path(text: &str) -> Result<(usize, Vec<usize>), PropertyError> {
    let mut parts = text.split(':');
    let trial = parts
        .next()
        .and_then(|p| p.parse::<usize>().ok())
        .ok_or_else(|| {
            PropertyError::contract_violation(format!("malformed replay path: {:?}", text))
        })?;
    let mut shrink_path = Vec::new();
    for part in parts {
        let index = part.parse::<usize>().map_err(|_| {
            PropertyError::contract_violation(format!("malformed replay path: {:?}", text))
        })?;
        shrink_path.push(index);
    }
    Ok((trial, shrink_path))
}

/// Run a property and panic with the stable replay message on failure.
pub fn assert_property<T, P>(property: &P, parameters: Parameters<T>)
where
    T: Clone + fmt::Debug + 'static,
    P: Property<T>,
{
    let verbosity = parameters.verbose;
    let details = check(property, parameters);
    if details.failed {
        panic!("{}", details.format(verbosity));
    }
}

/// Run a property for its configured number of trials, shrinking the first
/// failure to a minimal counterexample.
///
/// Invalid parameters and malformed replay paths are contract violations
/// and panic eagerly; everything else is reported through [`RunDetails`].
pub fn check<T, P>(property: &P, parameters: Parameters<T>) -> RunDetails<T>
where
    T: Clone + fmt::Debug + 'static,
    P: Property<T>,
{
    if let Err(error) = parameters.validate() {
        panic!("{}", error);
    }
    match parameters.timeout {
        Some(limit) => run_sync(&TimeoutProperty::new(property, limit), parameters),
        None => run_sync(property, parameters),
    }
}

fn report<T>(parameters: &Parameters<T>, details: RunDetails<T>) -> RunDetails<T> {
    if let Some(reporter) = &parameters.reporter {
        reporter(&details);
    }
    details
}

fn bias_for<T>(parameters: &Parameters<T>, index: usize) -> Option<BiasFactor> {
    if parameters.unbiased {
        None
    } else {
        Some(BiasFactor::for_run(index, parameters.num_runs))
    }
}

fn run_sync<T, P>(property: &P, parameters: Parameters<T>) -> RunDetails<T>
where
    T: Clone + fmt::Debug + 'static,
    P: Property<T>,
{
    let seed = parameters
        .seed
        .unwrap_or_else(|| RandomSource::from_entropy().seed());
    let mut rng = RandomSource::from_seed(seed);

    if let Some(path_text) = parameters.path.clone() {
        let (trial, shrink_path) =
            parse_path(&path_text).unwrap_or_else(|error| panic!("{}", error));
        return replay_sync(property, parameters, seed, &mut rng, trial, shrink_path);
    }

    let start = Instant::now();
    let total = parameters.num_runs;
    let mut trees: Vec<ExecutionTree<T>> = Vec::new();
    let mut executed = 0usize;
    let mut skips = 0usize;
    let mut trial_index = 0usize;
    let mut interrupted = false;

    while executed < total {
        if let Some(limit) = parameters.interrupt_after_time_limit {
            if start.elapsed() >= limit {
                interrupted = true;
                break;
            }
        }
        if let Some(limit) = parameters.skip_all_after_time_limit {
            if start.elapsed() >= limit {
                skips += total - executed;
                interrupted = true;
                break;
            }
        }

        let value = if trial_index < parameters.examples.len() {
            Value::new(parameters.examples[trial_index].clone())
        } else {
            let generated = catch_unwind(AssertUnwindSafe(|| {
                property.generate(&mut rng, bias_for(&parameters, trial_index))
            }));
            match generated {
                Ok(value) => value,
                Err(payload) => {
                    let details = RunDetails {
                        failed: true,
                        num_runs: executed,
                        num_skips: skips,
                        num_shrinks: 0,
                        seed,
                        counterexample: None,
                        counterexample_path: None,
                        error: Some(panic_message(payload)),
                        execution_summary: trees,
                        interrupted: false,
                    };
                    return report(&parameters, details);
                }
            }
        };

        match property.run(value.value()) {
            RunOutcome::Success => {
                trees.push(ExecutionTree::leaf(
                    value.value().clone(),
                    ExecutionStatus::Success,
                ));
                executed += 1;
                trial_index += 1;
            }
            RunOutcome::Skipped(_) => {
                trees.push(ExecutionTree::leaf(
                    value.value().clone(),
                    ExecutionStatus::Skipped,
                ));
                skips += 1;
                trial_index += 1;
                if skips > parameters.max_skips_per_run {
                    let details = RunDetails {
                        failed: true,
                        num_runs: executed,
                        num_skips: skips,
                        num_shrinks: 0,
                        seed,
                        counterexample: None,
                        counterexample_path: None,
                        error: Some(
                            PropertyError::generation_exhausted(
                                skips,
                                "too many pre-condition failures",
                            )
                            .to_string(),
                        ),
                        execution_summary: trees,
                        interrupted: false,
                    };
                    return report(&parameters, details);
                }
            }
            RunOutcome::Failure(error) => {
                executed += 1;
                let mut node =
                    ExecutionTree::leaf(value.value().clone(), ExecutionStatus::Failure);
                let mut shrink_path = Vec::new();
                let (final_value, final_error) =
                    if parameters.end_on_failure || error.is_timeout() {
                        (value, error)
                    } else {
                        let mut budget = parameters.max_shrinks;
                        shrink_search(
                            property,
                            value,
                            error,
                            &mut budget,
                            &mut shrink_path,
                            &mut node.children,
                        )
                    };
                trees.push(node);
                let details = RunDetails {
                    failed: true,
                    num_runs: executed,
                    num_skips: skips,
                    num_shrinks: shrink_path.len(),
                    seed,
                    counterexample: Some(final_value.value().clone()),
                    counterexample_path: Some(format_path(trial_index, &shrink_path)),
                    error: Some(final_error.to_string()),
                    execution_summary: trees,
                    interrupted: false,
                };
                return report(&parameters, details);
            }
        }
    }

    // A wall-clock budget that prevented every trial is a failure; having
    // completed some trials is a soft degrade.
    let failed = interrupted && executed == 0;
    let details = RunDetails {
        failed,
        num_runs: executed,
        num_skips: skips,
        num_shrinks: 0,
        seed,
        counterexample: None,
        counterexample_path: None,
        error: if failed {
            Some(
                PropertyError::Interrupted {
                    after: start.elapsed(),
                    completed_runs: 0,
                }
                .to_string(),
            )
        } else {
            None
        },
        execution_summary: trees,
        interrupted,
    };
    report(&parameters, details)
}

fn replay_sync<T, P>(
    property: &P,
    parameters: Parameters<T>,
    seed: u64,
    rng: &mut RandomSource,
    trial: usize,
    shrink_path: Vec<usize>,
) -> RunDetails<T>
where
    T: Clone + fmt::Debug + 'static,
    P: Property<T>,
{
    let mut value = if trial < parameters.examples.len() {
        Value::new(parameters.examples[trial].clone())
    } else {
        for index in parameters.examples.len()..trial {
            let _ = property.generate(rng, bias_for(&parameters, index));
        }
        property.generate(rng, bias_for(&parameters, trial))
    };
    for (depth, index) in shrink_path.iter().enumerate() {
        value = property.shrink(&value).nth(*index).unwrap_or_else(|| {
            panic!(
                "{}",
                PropertyError::contract_violation(format!(
                    "replay path component {} at depth {} does not match the property",
                    index, depth
                ))
            )
        });
    }

    match property.run(value.value()) {
        RunOutcome::Failure(error) => {
            let mut node = ExecutionTree::leaf(value.value().clone(), ExecutionStatus::Failure);
            let mut path = shrink_path;
            let (final_value, final_error) = if error.is_timeout() {
                (value, error)
            } else {
                let mut budget = parameters.max_shrinks;
                shrink_search(
                    property,
                    value,
                    error,
                    &mut budget,
                    &mut path,
                    &mut node.children,
                )
            };
            let details = RunDetails {
                failed: true,
                num_runs: 1,
                num_skips: 0,
                num_shrinks: path.len(),
                seed,
                counterexample: Some(final_value.value().clone()),
                counterexample_path: Some(format_path(trial, &path)),
                error: Some(final_error.to_string()),
                execution_summary: vec![node],
                interrupted: false,
            };
            report(&parameters, details)
        }
        outcome => {
            let status = match outcome {
                RunOutcome::Skipped(_) => ExecutionStatus::Skipped,
                _ => ExecutionStatus::Success,
            };
            let skipped = status == ExecutionStatus::Skipped;
            let details = RunDetails {
                failed: false,
                num_runs: if skipped { 0 } else { 1 },
                num_skips: if skipped { 1 } else { 0 },
                num_shrinks: 0,
                seed,
                counterexample: None,
                counterexample_path: None,
                error: None,
                execution_summary: vec![ExecutionTree::leaf(value.value().clone(), status)],
                interrupted: false,
            };
            report(&parameters, details)
        }
    }
}

/// Walk the candidate stream, recursing into the first failing candidate,
/// until no candidate fails, the budget runs out, or a timeout stops the
/// search where it stands.
fn shrink_search<T, P>(
    property: &P,
    current: Value<T>,
    current_error: PropertyError,
    budget: &mut usize,
    path: &mut Vec<usize>,
    children: &mut Vec<ExecutionTree<T>>,
) -> (Value<T>, PropertyError)
where
    T: Clone + fmt::Debug + 'static,
    P: Property<T>,
{
    let mut index = 0usize;
    let mut stream = property.shrink(&current);
    while let Some(candidate) = stream.next() {
        if *budget == 0 {
            break;
        }
        *budget -= 1;
        match property.run(candidate.value()) {
            RunOutcome::Success => {
                children.push(ExecutionTree::leaf(
                    candidate.value().clone(),
                    ExecutionStatus::Success,
                ));
                index += 1;
            }
            RunOutcome::Skipped(_) => {
                children.push(ExecutionTree::leaf(
                    candidate.value().clone(),
                    ExecutionStatus::Skipped,
                ));
                index += 1;
            }
            RunOutcome::Failure(error) => {
                path.push(index);
                let mut node =
                    ExecutionTree::leaf(candidate.value().clone(), ExecutionStatus::Failure);
                if error.is_timeout() {
                    children.push(node);
                    return (candidate, error);
                }
                let result = shrink_search(
                    property,
                    candidate,
                    error,
                    budget,
                    path,
                    &mut node.children,
                );
                children.push(node);
                return result;
            }
        }
    }
    (current, current_error)
}

/// Async variant of [`assert_property`].
pub async fn assert_async_property<T, P>(property: &P, parameters: Parameters<T>)
where
    T: Clone + fmt::Debug + Sync + 'static,
    P: AsyncProperty<T> + Sync,
{
    let verbosity = parameters.verbose;
    let details = check_async(property, parameters).await;
    if details.failed {
        panic!("{}", details.format(verbosity));
    }
}

/// Async variant of [`check`]. Trials and shrink candidates are awaited
/// strictly sequentially: the search must know whether a candidate failed
/// before choosing the next one.
pub async fn check_async<T, P>(property: &P, parameters: Parameters<T>) -> RunDetails<T>
where
    T: Clone + fmt::Debug + Sync + 'static,
    P: AsyncProperty<T> + Sync,
{
    if let Err(error) = parameters.validate() {
        panic!("{}", error);
    }
    match parameters.timeout {
        Some(limit) => run_async(&TimeoutProperty::new(property, limit), parameters).await,
        None => run_async(property, parameters).await,
    }
}

async fn run_async<T, P>(property: &P, parameters: Parameters<T>) -> RunDetails<T>
where
    T: Clone + fmt::Debug + Sync + 'static,
    P: AsyncProperty<T> + Sync,
{
    let seed = parameters
        .seed
        .unwrap_or_else(|| RandomSource::from_entropy().seed());
    let mut rng = RandomSource::from_seed(seed);

    let start = Instant::now();
    let total = parameters.num_runs;
    let mut trees: Vec<ExecutionTree<T>> = Vec::new();
    let mut executed = 0usize;
    let mut skips = 0usize;
    let mut trial_index = 0usize;
    let mut interrupted = false;

    while executed < total {
        if let Some(limit) = parameters.interrupt_after_time_limit {
            if start.elapsed() >= limit {
                interrupted = true;
                break;
            }
        }
        if let Some(limit) = parameters.skip_all_after_time_limit {
            if start.elapsed() >= limit {
                skips += total - executed;
                interrupted = true;
                break;
            }
        }

        let value = if trial_index < parameters.examples.len() {
            Value::new(parameters.examples[trial_index].clone())
        } else {
            let generated = catch_unwind(AssertUnwindSafe(|| {
                property.generate(&mut rng, bias_for(&parameters, trial_index))
            }));
            match generated {
                Ok(value) => value,
                Err(payload) => {
                    let details = RunDetails {
                        failed: true,
                        num_runs: executed,
                        num_skips: skips,
                        num_shrinks: 0,
                        seed,
                        counterexample: None,
                        counterexample_path: None,
                        error: Some(panic_message(payload)),
                        execution_summary: trees,
                        interrupted: false,
                    };
                    return report(&parameters, details);
                }
            }
        };

        match property.run(value.value()).await {
            RunOutcome::Success => {
                trees.push(ExecutionTree::leaf(
                    value.value().clone(),
                    ExecutionStatus::Success,
                ));
                executed += 1;
                trial_index += 1;
            }
            RunOutcome::Skipped(_) => {
                trees.push(ExecutionTree::leaf(
                    value.value().clone(),
                    ExecutionStatus::Skipped,
                ));
                skips += 1;
                trial_index += 1;
                if skips > parameters.max_skips_per_run {
                    let details = RunDetails {
                        failed: true,
                        num_runs: executed,
                        num_skips: skips,
                        num_shrinks: 0,
                        seed,
                        counterexample: None,
                        counterexample_path: None,
                        error: Some(
                            PropertyError::generation_exhausted(
                                skips,
                                "too many pre-condition failures",
                            )
                            .to_string(),
                        ),
                        execution_summary: trees,
                        interrupted: false,
                    };
                    return report(&parameters, details);
                }
            }
            RunOutcome::Failure(error) => {
                executed += 1;
                let mut node =
                    ExecutionTree::leaf(value.value().clone(), ExecutionStatus::Failure);
                let mut shrink_path = Vec::new();
                let (final_value, final_error) =
                    if parameters.end_on_failure || error.is_timeout() {
                        (value, error)
                    } else {
                        let mut budget = parameters.max_shrinks;
                        shrink_search_async(
                            property,
                            value,
                            error,
                            &mut budget,
                            &mut shrink_path,
                            &mut node.children,
                        )
                        .await
                    };
                trees.push(node);
                let details = RunDetails {
                    failed: true,
                    num_runs: executed,
                    num_skips: skips,
                    num_shrinks: shrink_path.len(),
                    seed,
                    counterexample: Some(final_value.value().clone()),
                    counterexample_path: Some(format_path(trial_index, &shrink_path)),
                    error: Some(final_error.to_string()),
                    execution_summary: trees,
                    interrupted: false,
                };
                return report(&parameters, details);
            }
        }
    }

    let failed = interrupted && executed == 0;
    let details = RunDetails {
        failed,
        num_runs: executed,
        num_skips: skips,
        num_shrinks: 0,
        seed,
        counterexample: None,
        counterexample_path: None,
        error: if failed {
            Some(
                PropertyError::Interrupted {
                    after: start.elapsed(),
                    completed_runs: 0,
                }
                .to_string(),
            )
        } else {
            None
        },
        execution_summary: trees,
        interrupted,
    };
    report(&parameters, details)
}

fn shrink_search_async<'a, T, P>(
    property: &'a P,
    current: Value<T>,
    current_error: PropertyError,
    budget: &'a mut usize,
    path: &'a mut Vec<usize>,
    children: &'a mut Vec<ExecutionTree<T>>,
) -> std::pin::Pin<Box<dyn std::future::Future<Output = (Value<T>, PropertyError)> + 'a>>
where
    T: Clone + fmt::Debug + Sync + 'static,
    P: AsyncProperty<T> + Sync,
{
    Box::pin(async move {
        let mut index = 0usize;
        let mut stream = property.shrink(&current);
        while let Some(candidate) = stream.next() {
            if *budget == 0 {
                break;
            }
            *budget -= 1;
            match property.run(candidate.value()).await {
                RunOutcome::Success => {
                    children.push(ExecutionTree::leaf(
                        candidate.value().clone(),
                        ExecutionStatus::Success,
                    ));
                    index += 1;
                }
                RunOutcome::Skipped(_) => {
                    children.push(ExecutionTree::leaf(
                        candidate.value().clone(),
                        ExecutionStatus::Skipped,
                    ));
                    index += 1;
                }
                RunOutcome::Failure(error) => {
                    path.push(index);
                    let mut node =
                        ExecutionTree::leaf(candidate.value().clone(), ExecutionStatus::Failure);
                    if error.is_timeout() {
                        children.push(node);
                        return (candidate, error);
                    }
                    let result = shrink_search_async(
                        property,
                        candidate,
                        error,
                        budget,
                        path,
                        &mut node.children,
                    )
                    .await;
                    children.push(node);
                    return result;
                }
            }
        }
        (current, current_error)
    })
}
