//! Property definitions pairing arbitraries with predicates.

use std::future::Future;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::pin::Pin;

use crate::arbitrary::{Arbitrary, BiasFactor};
use crate::error::PropertyError;
use crate::rng::RandomSource;
use crate::stream::Stream;
use crate::value::Value;

/// The outcome of executing a property against one candidate value.
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    /// The predicate held.
    Success,
    /// The predicate threw, returned false, or rejected.
    Failure(PropertyError),
    /// A precondition discarded the candidate; the runner re-draws.
    Skipped(Option<String>),
}

impl RunOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, RunOutcome::Failure(_))
    }
}

/// Conversion from the values predicates are allowed to return.
///
/// `true`/`()`/`Ok(())` are success, `false` is failure, and
/// `Err(PreconditionFailed)` (as produced by [`crate::pre`]) skips the
/// candidate.
pub trait Testable {
    fn into_outcome(self) -> RunOutcome;
}

impl Testable for bool {
    fn into_outcome(self) -> RunOutcome {
        if self {
            RunOutcome::Success
        } else {
            RunOutcome::Failure(PropertyError::property_failed("predicate returned false"))
        }
    }
}

impl Testable for () {
    fn into_outcome(self) -> RunOutcome {
        RunOutcome::Success
    }
}

impl Testable for Result<(), PropertyError> {
    fn into_outcome(self) -> RunOutcome {
        match self {
            Ok(()) => RunOutcome::Success,
            Err(PropertyError::PreconditionFailed { label }) => RunOutcome::Skipped(label),
            Err(error) => RunOutcome::Failure(error),
        }
    }
}

/// A runnable property over values of type `T`.
///
/// Beyond generation and shrinking (delegated to the wrapped arbitrary),
/// `run` executes the predicate with lifecycle hooks around it — once per
/// candidate evaluation, shrink candidates included, not once per test.
pub trait Property<T> {
    fn generate(&self, rng: &mut RandomSource, bias: Option<BiasFactor>) -> Value<T>;

    fn can_shrink_without_context(&self, value: &T) -> bool;

    fn shrink(&self, value: &Value<T>) -> Stream<Value<T>>;

    fn run(&self, input: &T) -> RunOutcome;
}

/// An async property; `run` returns a boxed future the runner awaits
/// sequentially, one candidate at a time.
pub trait AsyncProperty<T> {
    fn generate(&self, rng: &mut RandomSource, bias: Option<BiasFactor>) -> Value<T>;

    fn can_shrink_without_context(&self, value: &T) -> bool;

    fn shrink(&self, value: &Value<T>) -> Stream<Value<T>>;

    fn run<'a>(&'a self, input: &'a T)
    -> Pin<Box<dyn Future<Output = RunOutcome> + Send + 'a>>;
}

impl<T, P: Property<T> + ?Sized> Property<T> for &P {
    fn generate(&self, rng: &mut RandomSource, bias: Option<BiasFactor>) -> Value<T> {
        (**self).generate(rng, bias)
    }

    fn can_shrink_without_context(&self, value: &T) -> bool {
        (**self).can_shrink_without_context(value)
    }

    fn shrink(&self, value: &Value<T>) -> Stream<Value<T>> {
        (**self).shrink(value)
    }

    fn run(&self, input: &T) -> RunOutcome {
        (**self).run(input)
    }
}

impl<T, P: AsyncProperty<T> + ?Sized> AsyncProperty<T> for &P {
    fn generate(&self, rng: &mut RandomSource, bias: Option<BiasFactor>) -> Value<T> {
        (**self).generate(rng, bias)
    }

    fn can_shrink_without_context(&self, value: &T) -> bool {
        (**self).can_shrink_without_context(value)
    }

    fn shrink(&self, value: &Value<T>) -> Stream<Value<T>> {
        (**self).shrink(value)
    }

    fn run<'a>(
        &'a self,
        input: &'a T,
    ) -> Pin<Box<dyn Future<Output = RunOutcome> + Send + 'a>> {
        (**self).run(input)
    }
}

type Hook = Box<dyn Fn() + Send + Sync>;
type SyncPredicate<T> = Box<dyn Fn(&T) -> RunOutcome + Send + Sync>;
type AsyncPredicate<T> =
    Box<dyn Fn(T) -> Pin<Box<dyn Future<Output = RunOutcome> + Send>> + Send + Sync>;

pub(crate) fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "predicate panicked".to_string()
    }
}

/// A concrete sync property: one arbitrary plus one predicate.
pub struct PropertyDef<T, A> {
    arbitrary: A,
    predicate: SyncPredicate<T>,
    before_each: Option<Hook>,
    after_each: Option<Hook>,
}

/// Build a sync property from an arbitrary and a predicate.
///
/// The predicate may return `bool`, `()`, or `Result<(), PropertyError>`;
/// panics inside it are caught and reported as failures.
pub fn property<T, A, F, O>(arbitrary: A, predicate: F) -> PropertyDef<T, A>
where
    A: Arbitrary<T>,
    F: Fn(&T) -> O + Send + Sync + 'static,
    O: Testable,
{
    PropertyDef {
        arbitrary,
        predicate: Box::new(move |input: &T| {
            match catch_unwind(AssertUnwindSafe(|| predicate(input))) {
                Ok(outcome) => outcome.into_outcome(),
                Err(payload) => {
                    RunOutcome::Failure(PropertyError::property_failed(panic_message(payload)))
                }
            }
        }),
        before_each: None,
        after_each: None,
    }
}

impl<T, A> PropertyDef<T, A> {
    /// Run a hook before every candidate evaluation.
    pub fn before_each(mut self, hook: impl Fn() + Send + Sync + 'static) -> Self {
        self.before_each = Some(Box::new(hook));
        self
    }

    /// Run a hook after every candidate evaluation.
    pub fn after_each(mut self, hook: impl Fn() + Send + Sync + 'static) -> Self {
        self.after_each = Some(Box::new(hook));
        self
    }
}

impl<T, A: Arbitrary<T>> Property<T> for PropertyDef<T, A> {
    fn generate(&self, rng: &mut RandomSource, bias: Option<BiasFactor>) -> Value<T> {
        self.arbitrary.generate(rng, bias)
    }

    fn can_shrink_without_context(&self, value: &T) -> bool {
        self.arbitrary.can_shrink_without_context(value)
    }

    fn shrink(&self, value: &Value<T>) -> Stream<Value<T>> {
        self.arbitrary.shrink(value)
    }

    fn run(&self, input: &T) -> RunOutcome {
        if let Some(hook) = &self.before_each {
            hook();
        }
        let outcome = (self.predicate)(input);
        if let Some(hook) = &self.after_each {
            hook();
        }
        outcome
    }
}

/// A concrete async property: one arbitrary plus one async predicate.
pub struct AsyncPropertyDef<T, A> {
    arbitrary: A,
    predicate: AsyncPredicate<T>,
    before_each: Option<Hook>,
    after_each: Option<Hook>,
}

/// Build an async property. The predicate takes its input by value (the
/// runner clones each candidate) and may resolve to any [`Testable`].
pub fn async_property<T, A, F, Fut, O>(arbitrary: A, predicate: F) -> AsyncPropertyDef<T, A>
where
    A: Arbitrary<T>,
    T: 'static,
    F: Fn(T) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = O> + Send + 'static,
    O: Testable + 'static,
{
    AsyncPropertyDef {
        arbitrary,
        predicate: Box::new(move |input: T| {
            let fut = predicate(input);
            Box::pin(async move { fut.await.into_outcome() })
                as Pin<Box<dyn Future<Output = RunOutcome> + Send>>
        }),
        before_each: None,
        after_each: None,
    }
}

impl<T, A> AsyncPropertyDef<T, A> {
    /// Run a hook before every candidate evaluation.
    pub fn before_each(mut self, hook: impl Fn() + Send + Sync + 'static) -> Self {
        self.before_each = Some(Box::new(hook));
        self
    }

    /// Run a hook after every candidate evaluation.
    pub fn after_each(mut self, hook: impl Fn() + Send + Sync + 'static) -> Self {
        self.after_each = Some(Box::new(hook));
        self
    }
}

impl<T: Clone + Send + Sync, A: Arbitrary<T> + Sync> AsyncProperty<T> for AsyncPropertyDef<T, A> {
    fn generate(&self, rng: &mut RandomSource, bias: Option<BiasFactor>) -> Value<T> {
        self.arbitrary.generate(rng, bias)
    }

    fn can_shrink_without_context(&self, value: &T) -> bool {
        self.arbitrary.can_shrink_without_context(value)
    }

    fn shrink(&self, value: &Value<T>) -> Stream<Value<T>> {
        self.arbitrary.shrink(value)
    }

    fn run<'a>(
        &'a self,
        input: &'a T,
    ) -> Pin<Box<dyn Future<Output = RunOutcome> + Send + 'a>> {
        let input = input.clone();
        Box::pin(async move {
            if let Some(hook) = &self.before_each {
                hook();
            }
            let outcome = (self.predicate)(input).await;
            if let Some(hook) = &self.after_each {
                hook();
            }
            outcome
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::pre;
    use crate::primitives::integer;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn bool_predicates_classify_outcomes() {
        let prop = property(integer(0i64, 10), |n| *n <= 10);
        assert_eq!(prop.run(&5), RunOutcome::Success);

        let prop = property(integer(0i64, 10), |n| *n > 100);
        assert!(prop.run(&5).is_failure());
    }

    #[test]
    fn panicking_predicates_become_failures() {
        let prop = property(integer(0i64, 10), |n| {
            assert!(*n > 100, "value too small");
        });
        match prop.run(&5) {
            RunOutcome::Failure(PropertyError::PropertyFailed { message, .. }) => {
                assert!(message.contains("value too small"));
            }
            other => panic!("expected failure, got {:?}", other),
        }
    }

    #[test]
    fn preconditions_skip_the_candidate() {
        let prop = property(integer(0i64, 10), |n| {
            pre(*n % 2 == 0)?;
            Ok(())
        });
        assert_eq!(prop.run(&3), RunOutcome::Skipped(None));
        assert_eq!(prop.run(&4), RunOutcome::Success);
    }

    #[test]
    fn hooks_run_around_every_evaluation() {
        let before = Arc::new(AtomicUsize::new(0));
        let after = Arc::new(AtomicUsize::new(0));
        let b = before.clone();
        let a = after.clone();
        let prop = property(integer(0i64, 10), |_n| true)
            .before_each(move || {
                b.fetch_add(1, Ordering::SeqCst);
            })
            .after_each(move || {
                a.fetch_add(1, Ordering::SeqCst);
            });

        for n in 0..5 {
            let _ = prop.run(&n);
        }
        assert_eq!(before.load(Ordering::SeqCst), 5);
        assert_eq!(after.load(Ordering::SeqCst), 5);
    }

    #[tokio::test]
    async fn async_predicates_resolve_to_outcomes() {
        let prop = async_property(integer(0i64, 10), |n| async move { n <= 10 });
        assert_eq!(prop.run(&5).await, RunOutcome::Success);

        let prop = async_property(integer(0i64, 10), |n| async move { n > 100 });
        assert!(prop.run(&5).await.is_failure());
    }
}
