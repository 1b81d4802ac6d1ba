//! Composable arbitraries: map, filter, chain, constants, and weighted
//! choice.

use std::marker::PhantomData;
use std::sync::Arc;

use crate::arbitrary::{Arbitrary, BiasFactor, BoxedArbitrary};
use crate::error::PropertyError;
use crate::rng::RandomSource;
use crate::stream::Stream;
use crate::value::{ShrinkContext, Value};

/// How many rejected draws a filtered arbitrary tolerates before reporting
/// generation exhaustion.
pub const MAX_FILTER_ATTEMPTS: usize = 1000;

/// Context carried by mapped values: the source value the mapper was applied
/// to, so shrinking can delegate to the source arbitrary.
struct MapShrinkContext<T> {
    source: Value<T>,
}

/// An arbitrary transforming generated values through a mapper.
pub struct Map<S, T, F> {
    source: S,
    mapper: Arc<F>,
    _marker: PhantomData<fn() -> T>,
}

impl<S, T, F> Map<S, T, F> {
    pub(crate) fn new(source: S, mapper: F) -> Self {
        Self {
            source,
            mapper: Arc::new(mapper),
            _marker: PhantomData,
        }
    }
}

impl<S, T, U, F> Arbitrary<U> for Map<S, T, F>
where
    S: Arbitrary<T>,
    T: Clone + Send + Sync + 'static,
    U: 'static,
    F: Fn(&T) -> U + Send + Sync + 'static,
{
    fn generate(&self, rng: &mut RandomSource, bias: Option<BiasFactor>) -> Value<U> {
        let source = self.source.generate(rng, bias);
        let mapped = (self.mapper)(source.value());
        Value::with_context(mapped, MapShrinkContext { source })
    }

    fn can_shrink_without_context(&self, _value: &U) -> bool {
        // Without an unmapper there is no way back to the source domain.
        false
    }

    fn shrink(&self, value: &Value<U>) -> Stream<Value<U>> {
        let source = match value.context_as::<MapShrinkContext<T>>() {
            Some(ctx) => ctx.source.clone(),
            None => return Stream::empty(),
        };
        let mapper = Arc::clone(&self.mapper);
        self.source.shrink(&source).map(move |candidate| {
            let mapped = (mapper)(candidate.value());
            Value::with_context(mapped, MapShrinkContext { source: candidate })
        })
    }
}

/// A mapped arbitrary that can also shrink bare values by unmapping them
/// back into the source domain.
pub struct MapUnmap<S, T, F, G> {
    source: S,
    mapper: Arc<F>,
    unmapper: Arc<G>,
    _marker: PhantomData<fn() -> T>,
}

impl<S, T, F, G> MapUnmap<S, T, F, G> {
    pub(crate) fn new(source: S, mapper: F, unmapper: G) -> Self {
        Self {
            source,
            mapper: Arc::new(mapper),
            unmapper: Arc::new(unmapper),
            _marker: PhantomData,
        }
    }
}

impl<S, T, U, F, G> MapUnmap<S, T, F, G>
where
    S: Arbitrary<T>,
    T: Clone + Send + Sync + 'static,
    U: PartialEq + std::fmt::Debug + 'static,
    F: Fn(&T) -> U + Send + Sync + 'static,
    G: Fn(&U) -> Option<T> + Send + Sync + 'static,
{
    /// Recover the source value behind a bare mapped value, enforcing the
    /// round-trip law `mapper(unmapper(u)) == u`.
    fn unmap_checked(&self, value: &U) -> Value<T> {
        let source = match (self.unmapper)(value) {
            Some(source) => source,
            None => panic!(
                "{}",
                PropertyError::contract_violation(format!(
                    "unmapper rejected a value the mapper claims to produce: {:?}",
                    value
                ))
            ),
        };
        let roundtrip = (self.mapper)(&source);
        if &roundtrip != value {
            panic!(
                "{}",
                PropertyError::contract_violation(format!(
                    "unmapper does not invert mapper: unmapped {:?} re-maps to {:?}",
                    value, roundtrip
                ))
            );
        }
        Value::new(source)
    }
}

impl<S, T, U, F, G> Arbitrary<U> for MapUnmap<S, T, F, G>
where
    S: Arbitrary<T>,
    T: Clone + Send + Sync + 'static,
    U: PartialEq + std::fmt::Debug + 'static,
    F: Fn(&T) -> U + Send + Sync + 'static,
    G: Fn(&U) -> Option<T> + Send + Sync + 'static,
{
    fn generate(&self, rng: &mut RandomSource, bias: Option<BiasFactor>) -> Value<U> {
        let source = self.source.generate(rng, bias);
        let mapped = (self.mapper)(source.value());
        Value::with_context(mapped, MapShrinkContext { source })
    }

    fn can_shrink_without_context(&self, value: &U) -> bool {
        match (self.unmapper)(value) {
            Some(source) => self.source.can_shrink_without_context(&source),
            None => false,
        }
    }

    fn shrink(&self, value: &Value<U>) -> Stream<Value<U>> {
        let source = match value.context_as::<MapShrinkContext<T>>() {
            Some(ctx) => ctx.source.clone(),
            None => self.unmap_checked(value.value()),
        };
        let mapper = Arc::clone(&self.mapper);
        self.source.shrink(&source).map(move |candidate| {
            let mapped = (mapper)(candidate.value());
            Value::with_context(mapped, MapShrinkContext { source: candidate })
        })
    }
}

/// An arbitrary re-drawing until its predicate accepts the value.
pub struct Filter<S, F> {
    source: S,
    predicate: Arc<F>,
}

impl<S, F> Filter<S, F> {
    pub(crate) fn new(source: S, predicate: F) -> Self {
        Self {
            source,
            predicate: Arc::new(predicate),
        }
    }
}

impl<S, T, F> Arbitrary<T> for Filter<S, F>
where
    S: Arbitrary<T>,
    T: 'static,
    F: Fn(&T) -> bool + Send + Sync + 'static,
{
    fn generate(&self, rng: &mut RandomSource, bias: Option<BiasFactor>) -> Value<T> {
        for _ in 0..MAX_FILTER_ATTEMPTS {
            let candidate = self.source.generate(rng, bias);
            if (self.predicate)(candidate.value()) {
                return candidate;
            }
        }
        // Contained by the runner and reported as a configuration error:
        // the predicate rejects too much of the source's domain.
        panic!(
            "{}",
            PropertyError::generation_exhausted(MAX_FILTER_ATTEMPTS, "filtered arbitrary")
        );
    }

    fn can_shrink_without_context(&self, value: &T) -> bool {
        self.source.can_shrink_without_context(value) && (self.predicate)(value)
    }

    fn shrink(&self, value: &Value<T>) -> Stream<Value<T>> {
        let predicate = Arc::clone(&self.predicate);
        self.source
            .shrink(value)
            .filter(move |candidate| (predicate)(candidate.value()))
    }
}

/// Context carried by chained values: everything needed to re-derive the
/// dependent arbitrary when the source shrinks, and to keep shrinking the
/// dependent value in place.
struct ChainShrinkContext<T> {
    source: Value<T>,
    rng_snapshot: RandomSource,
    bias: Option<BiasFactor>,
    dependent: Option<ShrinkContext>,
}

/// Dependent generation: the source value selects the arbitrary the final
/// value is drawn from.
pub struct Chain<S, T, U, F> {
    source: S,
    selector: Arc<F>,
    _marker: PhantomData<fn(T) -> U>,
}

impl<S, T, U, F> Chain<S, T, U, F> {
    pub(crate) fn new(source: S, selector: F) -> Self {
        Self {
            source,
            selector: Arc::new(selector),
            _marker: PhantomData,
        }
    }
}

impl<S, T, U, F> Arbitrary<U> for Chain<S, T, U, F>
where
    S: Arbitrary<T>,
    T: Clone + Send + Sync + 'static,
    U: Clone + 'static,
    F: Fn(&T) -> BoxedArbitrary<U> + Send + Sync + 'static,
{
    fn generate(&self, rng: &mut RandomSource, bias: Option<BiasFactor>) -> Value<U> {
        let source = self.source.generate(rng, bias);
        // The dependent draw runs on a fork so re-deriving it during shrink
        // replays from an identical stream.
        let mut dependent_rng = rng.fork();
        let snapshot = dependent_rng.clone();
        let dependent = (self.selector)(source.value()).generate(&mut dependent_rng, bias);
        let context = ChainShrinkContext {
            source,
            rng_snapshot: snapshot,
            bias,
            dependent: dependent.context().cloned(),
        };
        Value::with_shared_context(dependent.into_value(), Arc::new(context))
    }

    fn can_shrink_without_context(&self, _value: &U) -> bool {
        // The source value cannot be recovered from the dependent value.
        false
    }

    fn shrink(&self, value: &Value<U>) -> Stream<Value<U>> {
        let ctx = match value.context_as::<ChainShrinkContext<T>>() {
            Some(ctx) => ctx,
            None => return Stream::empty(),
        };

        // First: shrink the source and re-derive the dependent arbitrary,
        // replaying the recorded stream so the relationship stays
        // deterministic.
        let selector = Arc::clone(&self.selector);
        let snapshot = ctx.rng_snapshot.clone();
        let bias = ctx.bias;
        let source_shrinks = self.source.shrink(&ctx.source).map(move |source_candidate| {
            let mut dependent_rng = snapshot.clone();
            let dependent =
                (selector)(source_candidate.value()).generate(&mut dependent_rng, bias);
            let context = ChainShrinkContext {
                source: source_candidate,
                rng_snapshot: snapshot.clone(),
                bias,
                dependent: dependent.context().cloned(),
            };
            Value::with_shared_context(dependent.into_value(), Arc::new(context))
        });

        // Then: hold the source fixed and shrink the dependent value.
        let dependent_arb = (self.selector)(ctx.source.value());
        let dependent_value = match &ctx.dependent {
            Some(shared) => Value::with_shared_context(value.value().clone(), shared.clone()),
            None => Value::new(value.value().clone()),
        };
        let source = ctx.source.clone();
        let snapshot = ctx.rng_snapshot.clone();
        let dependent_shrinks = dependent_arb.shrink(&dependent_value).map(move |candidate| {
            let context = ChainShrinkContext {
                source: source.clone(),
                rng_snapshot: snapshot.clone(),
                bias,
                dependent: candidate.context().cloned(),
            };
            Value::with_shared_context(candidate.into_value(), Arc::new(context))
        });

        source_shrinks.chain(dependent_shrinks)
    }
}

/// Context carried by constant choices: the index picked from the list.
struct ChoiceIndex(usize);

/// An arbitrary choosing among a fixed list of constants, shrinking toward
/// earlier entries.
#[derive(Debug, Clone)]
pub struct ConstantArbitrary<T> {
    values: Vec<T>,
}

/// An arbitrary always producing the same value.
pub fn constant<T: Clone>(value: T) -> ConstantArbitrary<T> {
    ConstantArbitrary {
        values: vec![value],
    }
}

/// An arbitrary choosing among the given constants. Earlier entries are
/// considered smaller: shrinking falls back toward the front of the list.
pub fn constant_from<T: Clone>(values: Vec<T>) -> ConstantArbitrary<T> {
    if values.is_empty() {
        panic!("constant_from requires at least one value");
    }
    ConstantArbitrary { values }
}

impl<T: Clone + PartialEq + 'static> Arbitrary<T> for ConstantArbitrary<T> {
    fn generate(&self, rng: &mut RandomSource, bias: Option<BiasFactor>) -> Value<T> {
        let index = if self.values.len() == 1 {
            0
        } else if bias.map(|b| b.should_bias(rng)).unwrap_or(false) {
            0
        } else {
            rng.next_usize(self.values.len())
        };
        Value::with_context(self.values[index].clone(), ChoiceIndex(index))
    }

    fn can_shrink_without_context(&self, value: &T) -> bool {
        self.values.contains(value)
    }

    fn shrink(&self, value: &Value<T>) -> Stream<Value<T>> {
        let index = match value.context_as::<ChoiceIndex>() {
            Some(ChoiceIndex(index)) => *index,
            None => match self.values.iter().position(|v| v == value.value()) {
                Some(index) => index,
                None => return Stream::empty(),
            },
        };
        let earlier: Vec<Value<T>> = self.values[..index]
            .iter()
            .enumerate()
            .map(|(i, v)| Value::with_context(v.clone(), ChoiceIndex(i)))
            .collect();
        Stream::from_iter(earlier)
    }
}

/// Context carried by weighted choices: the branch taken and the branch
/// value's own context.
struct BranchContext {
    branch: usize,
    inner: Option<ShrinkContext>,
}

/// An arbitrary picking one of several child arbitraries, optionally
/// weighted.
pub struct Frequency<T> {
    entries: Vec<(u32, BoxedArbitrary<T>)>,
    total_weight: u64,
    cross_shrink: bool,
}

/// Choose uniformly among child arbitraries.
pub fn oneof<T>(arbitraries: Vec<BoxedArbitrary<T>>) -> Frequency<T> {
    frequency(arbitraries.into_iter().map(|a| (1, a)).collect())
}

/// Choose among child arbitraries with the given weights.
pub fn frequency<T>(entries: Vec<(u32, BoxedArbitrary<T>)>) -> Frequency<T> {
    if entries.is_empty() {
        panic!("frequency requires at least one entry");
    }
    let total_weight: u64 = entries.iter().map(|(w, _)| *w as u64).sum();
    if total_weight == 0 {
        panic!("frequency requires a nonzero total weight");
    }
    Frequency {
        entries,
        total_weight,
        cross_shrink: false,
    }
}

impl<T> Frequency<T> {
    /// When enabled, shrinking a non-first branch also tries candidates from
    /// the first (smallest) branch.
    pub fn with_cross_shrink(mut self, enabled: bool) -> Self {
        self.cross_shrink = enabled;
        self
    }

    fn pick_branch(&self, rng: &mut RandomSource) -> usize {
        let mut ticket = rng.next_int(0, self.total_weight as i128 - 1) as u64;
        for (index, (weight, _)) in self.entries.iter().enumerate() {
            let weight = *weight as u64;
            if ticket < weight {
                return index;
            }
            ticket -= weight;
        }
        self.entries.len() - 1
    }
}

impl<T: Clone + 'static> Arbitrary<T> for Frequency<T> {
    fn generate(&self, rng: &mut RandomSource, bias: Option<BiasFactor>) -> Value<T> {
        let branch = self.pick_branch(rng);
        let inner = self.entries[branch].1.generate(rng, bias);
        let context = BranchContext {
            branch,
            inner: inner.context().cloned(),
        };
        Value::with_context(inner.into_value(), context)
    }

    fn can_shrink_without_context(&self, value: &T) -> bool {
        self.entries
            .iter()
            .any(|(_, arb)| arb.can_shrink_without_context(value))
    }

    fn shrink(&self, value: &Value<T>) -> Stream<Value<T>> {
        let (branch, inner_ctx) = match value.context_as::<BranchContext>() {
            Some(ctx) => (ctx.branch, ctx.inner.clone()),
            None => {
                // Bare value: shrink through the first branch that accepts it.
                match self
                    .entries
                    .iter()
                    .position(|(_, arb)| arb.can_shrink_without_context(value.value()))
                {
                    Some(branch) => (branch, None),
                    None => return Stream::empty(),
                }
            }
        };

        let branch_value = match inner_ctx {
            Some(shared) => Value::with_shared_context(value.value().clone(), shared),
            None => Value::new(value.value().clone()),
        };

        let wrap = move |branch: usize| {
            move |candidate: Value<T>| {
                let context = BranchContext {
                    branch,
                    inner: candidate.context().cloned(),
                };
                Value::with_context(candidate.into_value(), context)
            }
        };

        let own = self.entries[branch].1.shrink(&branch_value).map(wrap(branch));

        if self.cross_shrink
            && branch != 0
            && self.entries[0].1.can_shrink_without_context(value.value())
        {
            let first = self.entries[0]
                .1
                .shrink(&Value::new(value.value().clone()))
                .map(wrap(0));
            first.chain(own)
        } else {
            own
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::primitives::{integer, nat};

    fn rng(seed: u64) -> RandomSource {
        RandomSource::from_seed(seed)
    }

    #[test]
    fn map_shrinks_through_the_source() {
        let arb = integer(0i64, 100).map(|n| n * 2);
        let mut rng = rng(1);
        let value = arb.generate(&mut rng, None);
        assert_eq!(*value.value() % 2, 0);

        for candidate in arb.shrink(&value).take(16) {
            assert_eq!(*candidate.value() % 2, 0);
            assert!(candidate.value().abs() <= value.value().abs());
        }
    }

    #[test]
    fn map_without_unmapper_cannot_shrink_bare_values() {
        let arb = integer(0i64, 100).map(|n| n * 2);
        assert!(!arb.can_shrink_without_context(&42));
        assert_eq!(arb.shrink(&Value::new(42)).count(), 0);
    }

    #[test]
    fn unmapper_enables_cold_shrinks() {
        let arb = integer(0i64, 1000).map_with_unmap(
            |n| n.to_string(),
            |s: &String| s.parse::<i64>().ok().filter(|n| (0..=1000).contains(n)),
        );
        assert!(arb.can_shrink_without_context(&"417".to_string()));

        let candidates: Vec<String> = arb
            .shrink(&Value::new("417".to_string()))
            .take(4)
            .map(|v| v.into_value())
            .collect();
        assert_eq!(candidates[0], "0");
    }

    #[test]
    #[should_panic(expected = "Contract violation")]
    fn unmapper_breaking_the_roundtrip_law_is_rejected() {
        // This unmapper loses information: it maps everything to 0.
        let arb = integer(0i64, 1000).map_with_unmap(|n| n.to_string(), |_s: &String| Some(0));
        let _ = arb.shrink(&Value::new("417".to_string())).count();
    }

    #[test]
    fn filter_only_produces_matching_values() {
        let arb = integer(0i64, 1000).filter(|n| n % 3 == 0);
        let mut rng = rng(8);
        for _ in 0..50 {
            let v = arb.generate(&mut rng, None).into_value();
            assert_eq!(v % 3, 0);
        }
    }

    #[test]
    fn filter_shrinks_never_violate_the_predicate() {
        let arb = integer(0i64, 1000).filter(|n| n % 3 == 0);
        let mut rng = rng(8);
        let value = arb.generate(&mut rng, None);
        for candidate in arb.shrink(&value) {
            assert_eq!(*candidate.value() % 3, 0);
        }
    }

    #[test]
    #[should_panic(expected = "Generation exhausted")]
    fn unsatisfiable_filter_gives_up() {
        let arb = integer(0i64, 10).filter(|_| false);
        let mut rng = rng(8);
        let _ = arb.generate(&mut rng, None);
    }

    #[test]
    fn chain_derives_the_dependent_arbitrary() {
        // Draw a length, then a value bounded by it.
        let arb = nat(50).chain(|len| integer(0u64, (*len).max(1)).boxed());
        let mut rng = rng(21);
        for _ in 0..50 {
            let v = arb.generate(&mut rng, None).into_value();
            assert!(v <= 50);
        }
    }

    #[test]
    fn chain_shrinks_both_levels() {
        let arb = integer(10u64, 50).chain(|n| integer(0u64, *n).boxed());
        let mut rng = rng(3);
        let value = arb.generate(&mut rng, None);
        let candidates: Vec<u64> = arb
            .shrink(&value)
            .take(32)
            .map(|v| v.into_value())
            .collect();
        assert!(!candidates.is_empty());
        // Every candidate is producible by some in-range source value.
        assert!(candidates.iter().all(|v| *v <= 50));
    }

    #[test]
    fn constant_from_shrinks_toward_the_front() {
        let arb = constant_from(vec!["small", "medium", "large"]);
        let value = Value::new("large");
        let candidates: Vec<&str> = arb.shrink(&value).map(|v| v.into_value()).collect();
        assert_eq!(candidates, vec!["small", "medium"]);
        assert_eq!(arb.shrink(&Value::new("small")).count(), 0);
    }

    #[test]
    fn frequency_respects_weights_roughly() {
        let arb = frequency(vec![
            (9, constant(0u8).boxed()),
            (1, constant(1u8).boxed()),
        ]);
        let mut rng = rng(13);
        let ones = (0..1000)
            .filter(|_| arb.generate(&mut rng, None).into_value() == 1)
            .count();
        assert!(ones < 300, "weight-1 branch chosen {} times", ones);
        assert!(ones > 0);
    }

    #[test]
    fn frequency_shrink_stays_in_the_chosen_branch() {
        let arb = frequency(vec![
            (1, integer(0i64, 10).boxed()),
            (1, integer(100i64, 200).boxed()),
        ]);
        let mut rng = rng(5);
        loop {
            let value = arb.generate(&mut rng, None);
            if *value.value() >= 100 {
                for candidate in arb.shrink(&value) {
                    assert!((100..=200).contains(candidate.value()));
                }
                break;
            }
        }
    }

    #[test]
    fn cross_shrink_falls_back_to_the_first_branch() {
        let arb = frequency(vec![
            (1, integer(0i64, 300).boxed()),
            (1, integer(100i64, 200).boxed()),
        ])
        .with_cross_shrink(true);
        let mut rng = rng(5);
        loop {
            let value = arb.generate(&mut rng, None);
            if *value.value() >= 100 {
                let first: Vec<i64> = arb
                    .shrink(&value)
                    .take(3)
                    .map(|v| v.into_value())
                    .collect();
                // The first-branch walk starts at its own target, zero.
                assert_eq!(first[0], 0);
                break;
            }
        }
    }

    #[test]
    #[should_panic(expected = "at least one entry")]
    fn frequency_rejects_empty_entries() {
        let _ = frequency::<u8>(vec![]);
    }
}
