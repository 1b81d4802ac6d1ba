//! Cross-cutting property wrappers: timeout, unbiased mode, and
//! equal-value suppression.
//!
//! Decorators wrap an inner property and implement the same trait, so they
//! compose freely and the runner never needs to know which are present.

use std::collections::HashSet;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll, Waker};
use std::time::{Duration, Instant};

use crate::arbitrary::BiasFactor;
use crate::error::PropertyError;
use crate::property::{AsyncProperty, Property, RunOutcome};
use crate::rng::RandomSource;
use crate::stream::Stream;
use crate::value::Value;

/// Wraps a property with a per-trial wall-clock limit.
///
/// Exceeding the limit is a distinct `Timeout` failure, never a generic
/// predicate failure, and the runner stops shrinking past it.
///
/// A synchronous predicate cannot be preempted, so the sync variant reports
/// the timeout after the call completes. The async variant genuinely races
/// the predicate against a timer and abandons — does not cancel — the
/// in-flight future on expiry.
pub struct TimeoutProperty<P> {
    inner: P,
    limit: Duration,
}

impl<P> TimeoutProperty<P> {
    pub fn new(inner: P, limit: Duration) -> Self {
        Self { inner, limit }
    }
}

impl<T, P: Property<T>> Property<T> for TimeoutProperty<P> {
    fn generate(&self, rng: &mut RandomSource, bias: Option<BiasFactor>) -> Value<T> {
        self.inner.generate(rng, bias)
    }

    fn can_shrink_without_context(&self, value: &T) -> bool {
        self.inner.can_shrink_without_context(value)
    }

    fn shrink(&self, value: &Value<T>) -> Stream<Value<T>> {
        self.inner.shrink(value)
    }

    fn run(&self, input: &T) -> RunOutcome {
        let start = Instant::now();
        let outcome = self.inner.run(input);
        if start.elapsed() > self.limit {
            return RunOutcome::Failure(PropertyError::timeout(self.limit));
        }
        outcome
    }
}

impl<T, P> AsyncProperty<T> for TimeoutProperty<P>
where
    P: AsyncProperty<T> + Sync,
    T: Sync,
{
    fn generate(&self, rng: &mut RandomSource, bias: Option<BiasFactor>) -> Value<T> {
        self.inner.generate(rng, bias)
    }

    fn can_shrink_without_context(&self, value: &T) -> bool {
        self.inner.can_shrink_without_context(value)
    }

    fn shrink(&self, value: &Value<T>) -> Stream<Value<T>> {
        self.inner.shrink(value)
    }

    fn run<'a>(
        &'a self,
        input: &'a T,
    ) -> Pin<Box<dyn Future<Output = RunOutcome> + Send + 'a>> {
        let limit = self.limit;
        Box::pin(async move {
            let race = Race {
                predicate: self.inner.run(input),
                timer: TimerFuture::new(limit),
                limit,
            };
            race.await
        })
    }
}

/// A one-shot timer backed by a sleeping thread, keeping the crate
/// runtime-agnostic.
struct TimerFuture {
    state: Arc<Mutex<TimerState>>,
    duration: Duration,
    started: bool,
}

struct TimerState {
    fired: bool,
    waker: Option<Waker>,
}

impl TimerFuture {
    fn new(duration: Duration) -> Self {
        Self {
            state: Arc::new(Mutex::new(TimerState {
                fired: false,
                waker: None,
            })),
            duration,
            started: false,
        }
    }
}

impl Future for TimerFuture {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        let mut state = self.state.lock().unwrap();
        if state.fired {
            return Poll::Ready(());
        }
        state.waker = Some(cx.waker().clone());
        drop(state);

        if !self.started {
            self.started = true;
            let state = Arc::clone(&self.state);
            let duration = self.duration;
            std::thread::spawn(move || {
                std::thread::sleep(duration);
                let mut state = state.lock().unwrap();
                state.fired = true;
                if let Some(waker) = state.waker.take() {
                    waker.wake();
                }
            });
        }
        Poll::Pending
    }
}

/// Races a predicate future against a timer; whichever resolves first wins.
struct Race<'a> {
    predicate: Pin<Box<dyn Future<Output = RunOutcome> + Send + 'a>>,
    timer: TimerFuture,
    limit: Duration,
}

impl Future for Race<'_> {
    type Output = RunOutcome;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<RunOutcome> {
        if let Poll::Ready(outcome) = self.predicate.as_mut().poll(cx) {
            return Poll::Ready(outcome);
        }
        let limit = self.limit;
        if Pin::new(&mut self.timer).poll(cx).is_ready() {
            // The losing predicate future stops being polled; any threads or
            // tasks it already started keep running in the background.
            return Poll::Ready(RunOutcome::Failure(PropertyError::timeout(limit)));
        }
        Poll::Pending
    }
}

/// Forces unbiased generation regardless of the runner's bias schedule.
pub struct UnbiasedProperty<P> {
    inner: P,
}

impl<P> UnbiasedProperty<P> {
    pub fn new(inner: P) -> Self {
        Self { inner }
    }
}

impl<T, P: Property<T>> Property<T> for UnbiasedProperty<P> {
    fn generate(&self, rng: &mut RandomSource, _bias: Option<BiasFactor>) -> Value<T> {
        self.inner.generate(rng, None)
    }

    fn can_shrink_without_context(&self, value: &T) -> bool {
        self.inner.can_shrink_without_context(value)
    }

    fn shrink(&self, value: &Value<T>) -> Stream<Value<T>> {
        self.inner.shrink(value)
    }

    fn run(&self, input: &T) -> RunOutcome {
        self.inner.run(input)
    }
}

/// Skips candidates whose value was already executed, judged on the value's
/// debug rendering.
pub struct IgnoreEqualValuesProperty<P> {
    inner: P,
    seen: Mutex<HashSet<String>>,
}

impl<P> IgnoreEqualValuesProperty<P> {
    pub fn new(inner: P) -> Self {
        Self {
            inner,
            seen: Mutex::new(HashSet::new()),
        }
    }
}

impl<T: fmt::Debug, P: Property<T>> Property<T> for IgnoreEqualValuesProperty<P> {
    fn generate(&self, rng: &mut RandomSource, bias: Option<BiasFactor>) -> Value<T> {
        self.inner.generate(rng, bias)
    }

    fn can_shrink_without_context(&self, value: &T) -> bool {
        self.inner.can_shrink_without_context(value)
    }

    fn shrink(&self, value: &Value<T>) -> Stream<Value<T>> {
        self.inner.shrink(value)
    }

    fn run(&self, input: &T) -> RunOutcome {
        let key = format!("{:?}", input);
        let fresh = self.seen.lock().unwrap().insert(key);
        if !fresh {
            return RunOutcome::Skipped(Some("duplicate value".to_string()));
        }
        self.inner.run(input)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::primitives::integer;
    use crate::property::{async_property, property};

    #[test]
    fn sync_timeout_reports_a_distinct_failure_kind() {
        let slow = property(integer(0i64, 10), |_n| {
            std::thread::sleep(Duration::from_millis(30));
            true
        });
        let wrapped = TimeoutProperty::new(slow, Duration::from_millis(1));
        match Property::run(&wrapped, &3) {
            RunOutcome::Failure(error) => assert!(error.is_timeout()),
            other => panic!("expected timeout, got {:?}", other),
        }
    }

    #[test]
    fn sync_timeout_passes_fast_predicates_through() {
        let fast = property(integer(0i64, 10), |_n| true);
        let wrapped = TimeoutProperty::new(fast, Duration::from_secs(5));
        assert_eq!(Property::run(&wrapped, &3), RunOutcome::Success);
    }

    #[tokio::test]
    async fn async_timeout_races_the_predicate() {
        let slow = async_property(integer(0i64, 10), |_n| async {
            tokio::time::sleep(Duration::from_secs(10)).await;
            true
        });
        let wrapped = TimeoutProperty::new(slow, Duration::from_millis(20));
        let started = Instant::now();
        match AsyncProperty::run(&wrapped, &3).await {
            RunOutcome::Failure(error) => assert!(error.is_timeout()),
            other => panic!("expected timeout, got {:?}", other),
        }
        // The race resolved on the timer, not on the ten-second sleep.
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn unbiased_strips_the_bias_schedule() {
        // With maximum pressure a biased integer frequently lands on an
        // edge; unbiased generation over a huge range practically never
        // hits the exact bounds this often.
        let prop = UnbiasedProperty::new(property(
            integer(0i64, 1_000_000_000),
            |_n| true,
        ));
        let mut rng = RandomSource::from_seed(1);
        let edges = (0..200)
            .filter(|_| {
                let v = prop
                    .generate(&mut rng, Some(BiasFactor::MAX_PRESSURE))
                    .into_value();
                v == 0 || v == 1_000_000_000
            })
            .count();
        assert_eq!(edges, 0);
    }

    #[test]
    fn equal_values_are_skipped_on_repeat() {
        let prop = IgnoreEqualValuesProperty::new(property(integer(0i64, 10), |_n| true));
        assert_eq!(prop.run(&5), RunOutcome::Success);
        assert!(matches!(prop.run(&5), RunOutcome::Skipped(_)));
        assert_eq!(prop.run(&6), RunOutcome::Success);
    }
}
