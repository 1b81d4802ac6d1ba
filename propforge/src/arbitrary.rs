//! The core generation capability and its type-erased form.

use std::sync::Arc;

use crate::combinator::{Chain, Filter, Map, MapUnmap};
use crate::rng::RandomSource;
use crate::stream::Stream;
use crate::value::Value;

/// Edge-value bias weight: with probability roughly `1/factor` an arbitrary
/// prefers an "interesting" edge value (zero, a range bound, an empty
/// collection) over a uniform draw. `None` anywhere a bias is expected means
/// fully unbiased generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BiasFactor(u32);

impl BiasFactor {
    /// The strongest bias the runner ever applies (1 in 2 draws biased).
    pub const MAX_PRESSURE: BiasFactor = BiasFactor(2);

    /// Create a bias factor. Factors below 2 are clamped to 2 so a biased
    /// draw never becomes a certainty.
    pub fn new(factor: u32) -> Self {
        Self(factor.max(2))
    }

    /// The weight `f` in "edge value with probability 1/f".
    pub fn factor(&self) -> u32 {
        self.0
    }

    /// Decide, using one draw, whether this generation should take the
    /// biased path.
    pub fn should_bias(&self, rng: &mut RandomSource) -> bool {
        rng.next_usize(self.0 as usize) == 0
    }

    /// The bias the runner applies at trial `run_index` out of `total`:
    /// pressure increases linearly so early trials explore broadly and later
    /// trials increasingly probe edge values.
    pub fn for_run(run_index: usize, total: usize) -> Self {
        const BROADEST: u32 = 100;
        if total <= 1 {
            return BiasFactor::new(BROADEST);
        }
        let remaining = (total - 1 - run_index.min(total - 1)) as u32;
        let span = (total - 1) as u32;
        BiasFactor::new(2 + remaining * (BROADEST - 2) / span)
    }
}

/// The unit of generation: produce values, report cold-shrinkability, and
/// enumerate shrink candidates.
///
/// `generate` must be a pure function of the random source's state plus the
/// bias factor: the same state always yields the same value. `shrink` must
/// be lazy and monotone — every candidate is no larger than its parent under
/// the arbitrary's own ordering, and the parent itself is never re-emitted.
pub trait Arbitrary<T> {
    /// Draw one value, attaching whatever context later shrinking needs.
    fn generate(&self, rng: &mut RandomSource, bias: Option<BiasFactor>) -> Value<T>;

    /// Whether a bare value (no generation context, e.g. a user-supplied
    /// example) can still be shrunk by this arbitrary.
    fn can_shrink_without_context(&self, value: &T) -> bool;

    /// Enumerate strictly-smaller candidates for a failing value.
    fn shrink(&self, value: &Value<T>) -> Stream<Value<T>>;

    /// Transform generated values through `f`. Shrinking delegates to the
    /// source and re-applies `f`; bare values are not shrinkable without an
    /// unmapper (see [`Arbitrary::map_with_unmap`]).
    fn map<U, F>(self, f: F) -> Map<Self, T, F>
    where
        Self: Sized,
        F: Fn(&T) -> U,
    {
        Map::new(self, f)
    }

    /// Like [`Arbitrary::map`], but with an unmapper enabling cold shrinks
    /// of user-supplied values. The unmapper must invert the mapper for
    /// every producible value; violations surface as contract violations at
    /// first use, never as silently wrong shrinks.
    fn map_with_unmap<U, F, G>(self, f: F, unmap: G) -> MapUnmap<Self, T, F, G>
    where
        Self: Sized,
        F: Fn(&T) -> U,
        G: Fn(&U) -> Option<T>,
    {
        MapUnmap::new(self, f, unmap)
    }

    /// Keep only values matching `predicate`, re-drawing up to a bounded
    /// number of times before signaling generation exhaustion.
    fn filter<F>(self, predicate: F) -> Filter<Self, F>
    where
        Self: Sized,
        F: Fn(&T) -> bool,
    {
        Filter::new(self, predicate)
    }

    /// Dependent generation: the drawn value selects a second arbitrary to
    /// draw from. The produced context tracks enough state to replay the
    /// relationship while shrinking.
    fn chain<U, F>(self, f: F) -> Chain<Self, T, U, F>
    where
        Self: Sized,
        F: Fn(&T) -> BoxedArbitrary<U>,
    {
        Chain::new(self, f)
    }

    /// Type-erase this arbitrary behind a cheaply-cloneable handle.
    fn boxed(self) -> BoxedArbitrary<T>
    where
        Self: Sized + Send + Sync + 'static,
    {
        BoxedArbitrary::new(self)
    }
}

/// A type-erased, shareable arbitrary.
///
/// Arbitraries are stateless aside from configuration, so handles may be
/// cloned and reused freely across combinators and trials.
pub struct BoxedArbitrary<T> {
    inner: Arc<dyn Arbitrary<T> + Send + Sync>,
}

impl<T> BoxedArbitrary<T> {
    /// Erase a concrete arbitrary.
    pub fn new<A: Arbitrary<T> + Send + Sync + 'static>(arbitrary: A) -> Self {
        Self {
            inner: Arc::new(arbitrary),
        }
    }
}

impl<T> Clone for BoxedArbitrary<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> Arbitrary<T> for BoxedArbitrary<T> {
    fn generate(&self, rng: &mut RandomSource, bias: Option<BiasFactor>) -> Value<T> {
        self.inner.generate(rng, bias)
    }

    fn can_shrink_without_context(&self, value: &T) -> bool {
        self.inner.can_shrink_without_context(value)
    }

    fn shrink(&self, value: &Value<T>) -> Stream<Value<T>> {
        self.inner.shrink(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::primitives::integer;

    #[test]
    fn bias_pressure_increases_with_run_index() {
        let total = 100;
        let early = BiasFactor::for_run(0, total).factor();
        let mid = BiasFactor::for_run(50, total).factor();
        let late = BiasFactor::for_run(99, total).factor();
        assert!(early > mid && mid > late);
        assert_eq!(late, 2);
    }

    #[test]
    fn bias_factor_never_below_two() {
        assert_eq!(BiasFactor::new(0).factor(), 2);
        assert_eq!(BiasFactor::new(1).factor(), 2);
        assert_eq!(BiasFactor::new(7).factor(), 7);
    }

    #[test]
    fn boxed_arbitrary_delegates_and_clones() {
        let arb = integer(0i64, 10).boxed();
        let copy = arb.clone();

        let mut a = RandomSource::from_seed(5);
        let mut b = RandomSource::from_seed(5);
        assert_eq!(
            arb.generate(&mut a, None).value(),
            copy.generate(&mut b, None).value()
        );
        assert!(arb.can_shrink_without_context(&5));
    }
}
