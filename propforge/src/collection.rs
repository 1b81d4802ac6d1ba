//! Composite arbitraries: tuples, records, arrays, and unique arrays.

use std::collections::{BTreeMap, HashSet};
use std::hash::Hash;
use std::sync::Arc;

use crate::arbitrary::{Arbitrary, BiasFactor, BoxedArbitrary};
use crate::error::PropertyError;
use crate::primitives::SizeConstraints;
use crate::rng::RandomSource;
use crate::shrink::lengths_toward;
use crate::stream::Stream;
use crate::value::{ShrinkContext, Value};

/// How many draws a unique array tolerates before reporting exhaustion.
pub const MAX_UNIQUE_ATTEMPTS: usize = 1000;

/// Context carried by composite values: one slot per component, in the
/// composite's fixed component order.
struct ComponentContexts {
    components: Vec<Option<ShrinkContext>>,
}

macro_rules! impl_tuple_arbitrary {
    ($(($A:ident, $T:ident, $idx:tt)),+) => {
        impl<$($A,)+ $($T,)+> Arbitrary<($($T,)+)> for ($($A,)+)
        where
            $($A: Arbitrary<$T>,)+
            $($T: Clone + Send + Sync + 'static,)+
        {
            fn generate(
                &self,
                rng: &mut RandomSource,
                bias: Option<BiasFactor>,
            ) -> Value<($($T,)+)> {
                // Each component draws from its own fork so one component's
                // draw count never shifts its siblings.
                let mut components = Vec::new();
                let tuple = ($(
                    {
                        let mut child = rng.fork();
                        let v = self.$idx.generate(&mut child, bias);
                        components.push(v.context().cloned());
                        v.into_value()
                    },
                )+);
                Value::with_context(tuple, ComponentContexts { components })
            }

            fn can_shrink_without_context(&self, value: &($($T,)+)) -> bool {
                $(self.$idx.can_shrink_without_context(&value.$idx))&&+
            }

            fn shrink(&self, value: &Value<($($T,)+)>) -> Stream<Value<($($T,)+)>> {
                let contexts: Vec<Option<ShrinkContext>> =
                    match value.context_as::<ComponentContexts>() {
                        Some(ctx) => ctx.components.clone(),
                        None => {
                            if !self.can_shrink_without_context(value.value()) {
                                return Stream::empty();
                            }
                            vec![$({ let _ = $idx; None },)+]
                        }
                    };
                let full = value.value().clone();

                // One component at a time, in a fixed order, holding the
                // others fixed.
                let mut streams = Vec::new();
                $(
                    {
                        let component = match &contexts[$idx] {
                            Some(shared) => Value::with_shared_context(
                                full.$idx.clone(),
                                shared.clone(),
                            ),
                            None => Value::new(full.$idx.clone()),
                        };
                        let full = full.clone();
                        let contexts = contexts.clone();
                        streams.push(self.$idx.shrink(&component).map(move |candidate| {
                            let mut tuple = full.clone();
                            let mut contexts = contexts.clone();
                            contexts[$idx] = candidate.context().cloned();
                            tuple.$idx = candidate.into_value();
                            Value::with_context(
                                tuple,
                                ComponentContexts { components: contexts },
                            )
                        }));
                    }
                )+
                Stream::concat(streams)
            }
        }
    };
}

impl_tuple_arbitrary!((A0, T0, 0), (A1, T1, 1));
impl_tuple_arbitrary!((A0, T0, 0), (A1, T1, 1), (A2, T2, 2));
impl_tuple_arbitrary!((A0, T0, 0), (A1, T1, 1), (A2, T2, 2), (A3, T3, 3));
impl_tuple_arbitrary!(
    (A0, T0, 0),
    (A1, T1, 1),
    (A2, T2, 2),
    (A3, T3, 3),
    (A4, T4, 4)
);

/// Arbitrary for string-keyed records with a fixed field set.
pub struct RecordArbitrary<T> {
    fields: Vec<(String, BoxedArbitrary<T>)>,
}

/// Build a record arbitrary. Field order is the shrink order.
pub fn record<T>(fields: Vec<(impl Into<String>, BoxedArbitrary<T>)>) -> RecordArbitrary<T> {
    let fields: Vec<(String, BoxedArbitrary<T>)> =
        fields.into_iter().map(|(k, a)| (k.into(), a)).collect();
    let mut seen = HashSet::new();
    for (key, _) in &fields {
        if !seen.insert(key.clone()) {
            panic!(
                "{}",
                PropertyError::contract_violation(format!("record has a duplicate field: {}", key))
            );
        }
    }
    RecordArbitrary { fields }
}

impl<T: Clone + Send + Sync + 'static> Arbitrary<BTreeMap<String, T>> for RecordArbitrary<T> {
    fn generate(
        &self,
        rng: &mut RandomSource,
        bias: Option<BiasFactor>,
    ) -> Value<BTreeMap<String, T>> {
        let mut components = Vec::new();
        let mut map = BTreeMap::new();
        for (key, arb) in &self.fields {
            let mut child = rng.fork();
            let v = arb.generate(&mut child, bias);
            components.push(v.context().cloned());
            map.insert(key.clone(), v.into_value());
        }
        Value::with_context(map, ComponentContexts { components })
    }

    fn can_shrink_without_context(&self, value: &BTreeMap<String, T>) -> bool {
        value.len() == self.fields.len()
            && self.fields.iter().all(|(key, arb)| {
                value
                    .get(key)
                    .map(|v| arb.can_shrink_without_context(v))
                    .unwrap_or(false)
            })
    }

    fn shrink(&self, value: &Value<BTreeMap<String, T>>) -> Stream<Value<BTreeMap<String, T>>> {
        let contexts: Vec<Option<ShrinkContext>> = match value.context_as::<ComponentContexts>() {
            Some(ctx) => ctx.components.clone(),
            None => {
                if !self.can_shrink_without_context(value.value()) {
                    return Stream::empty();
                }
                vec![None; self.fields.len()]
            }
        };
        let full = value.value().clone();

        let mut streams = Vec::new();
        for (index, (key, arb)) in self.fields.iter().enumerate() {
            let current = match full.get(key) {
                Some(v) => v.clone(),
                None => continue,
            };
            let component = match &contexts[index] {
                Some(shared) => Value::with_shared_context(current, shared.clone()),
                None => Value::new(current),
            };
            let full = full.clone();
            let contexts = contexts.clone();
            let key = key.clone();
            streams.push(arb.shrink(&component).map(move |candidate| {
                let mut map = full.clone();
                let mut contexts = contexts.clone();
                contexts[index] = candidate.context().cloned();
                map.insert(key.clone(), candidate.into_value());
                Value::with_context(map, ComponentContexts { components: contexts })
            }));
        }
        Stream::concat(streams)
    }
}

/// Shared candidate enumeration for array-like arbitraries: length
/// reductions first (tail drop via bisection, shortest first), then
/// in-place element shrinks.
fn shrink_array_like<T: Clone + Send + Sync + 'static>(
    element: &BoxedArbitrary<T>,
    min_length: usize,
    items: Vec<T>,
    contexts: Vec<Option<ShrinkContext>>,
) -> Stream<Value<Vec<T>>> {
    let len = items.len();

    let prefix_items = items.clone();
    let prefix_contexts = contexts.clone();
    let length_candidates =
        Stream::from_iter(lengths_toward(min_length.min(len), len).map(move |l| {
            Value::with_context(
                prefix_items[..l].to_vec(),
                ComponentContexts {
                    components: prefix_contexts[..l].to_vec(),
                },
            )
        }));

    let element = element.clone();
    let element_candidates = Stream::from_iter((0..len).flat_map(move |index| {
        let current = match &contexts[index] {
            Some(shared) => Value::with_shared_context(items[index].clone(), shared.clone()),
            None => Value::new(items[index].clone()),
        };
        if contexts[index].is_none() && !element.can_shrink_without_context(&items[index]) {
            return Vec::new();
        }
        let items = items.clone();
        let contexts = contexts.clone();
        element
            .shrink(&current)
            .map(move |candidate| {
                let mut next = items.clone();
                let mut contexts = contexts.clone();
                contexts[index] = candidate.context().cloned();
                next[index] = candidate.into_value();
                Value::with_context(next, ComponentContexts { components: contexts })
            })
            .collect::<Vec<_>>()
    }));

    length_candidates.chain(element_candidates)
}

/// Arbitrary for vectors: a length drawn from size constraints, then that
/// many elements.
pub struct ArrayArbitrary<T> {
    element: BoxedArbitrary<T>,
    size: SizeConstraints,
}

/// Build an array arbitrary over the given element arbitrary.
pub fn array<T>(element: BoxedArbitrary<T>, size: SizeConstraints) -> ArrayArbitrary<T> {
    ArrayArbitrary { element, size }
}

impl<T: Clone + Send + Sync + 'static> Arbitrary<Vec<T>> for ArrayArbitrary<T> {
    fn generate(&self, rng: &mut RandomSource, bias: Option<BiasFactor>) -> Value<Vec<T>> {
        let length = if bias.map(|b| b.should_bias(rng)).unwrap_or(false) {
            self.size.min
        } else {
            rng.next_int(self.size.min as i128, self.size.max as i128) as usize
        };
        let mut content = rng.fork();
        let mut components = Vec::with_capacity(length);
        let mut items = Vec::with_capacity(length);
        for _ in 0..length {
            let v = self.element.generate(&mut content, bias);
            components.push(v.context().cloned());
            items.push(v.into_value());
        }
        Value::with_context(items, ComponentContexts { components })
    }

    fn can_shrink_without_context(&self, value: &Vec<T>) -> bool {
        (self.size.min..=self.size.max).contains(&value.len())
            && value
                .iter()
                .all(|v| self.element.can_shrink_without_context(v))
    }

    fn shrink(&self, value: &Value<Vec<T>>) -> Stream<Value<Vec<T>>> {
        let items = value.value().clone();
        let contexts: Vec<Option<ShrinkContext>> = match value.context_as::<ComponentContexts>() {
            Some(ctx) => ctx.components.clone(),
            None => {
                if !(self.size.min..=self.size.max).contains(&items.len()) {
                    return Stream::empty();
                }
                vec![None; items.len()]
            }
        };
        shrink_array_like(&self.element, self.size.min, items, contexts)
    }
}

/// Arbitrary for vectors whose elements are unique under a caller-supplied
/// selector key.
pub struct UniqueArrayArbitrary<T, K, S> {
    element: BoxedArbitrary<T>,
    size: SizeConstraints,
    selector: Arc<S>,
    _marker: std::marker::PhantomData<fn() -> K>,
}

/// Build a unique-array arbitrary. Uniqueness is judged on `selector(&item)`
/// and re-checked after every shrink step.
pub fn unique_array<T, K, S>(
    element: BoxedArbitrary<T>,
    size: SizeConstraints,
    selector: S,
) -> UniqueArrayArbitrary<T, K, S>
where
    K: Eq + Hash,
    S: Fn(&T) -> K,
{
    UniqueArrayArbitrary {
        element,
        size,
        selector: Arc::new(selector),
        _marker: std::marker::PhantomData,
    }
}

impl<T, K, S> UniqueArrayArbitrary<T, K, S>
where
    K: Eq + Hash,
    S: Fn(&T) -> K,
{
    fn is_unique(&self, items: &[T]) -> bool {
        let mut seen = HashSet::new();
        items.iter().all(|item| seen.insert((self.selector)(item)))
    }
}

impl<T, K, S> Arbitrary<Vec<T>> for UniqueArrayArbitrary<T, K, S>
where
    T: Clone + Send + Sync + 'static,
    K: Eq + Hash + 'static,
    S: Fn(&T) -> K + Send + Sync + 'static,
{
    fn generate(&self, rng: &mut RandomSource, bias: Option<BiasFactor>) -> Value<Vec<T>> {
        let target = if bias.map(|b| b.should_bias(rng)).unwrap_or(false) {
            self.size.min
        } else {
            rng.next_int(self.size.min as i128, self.size.max as i128) as usize
        };
        let mut content = rng.fork();
        let mut seen = HashSet::new();
        let mut components = Vec::new();
        let mut items = Vec::new();
        let mut attempts = 0;
        while items.len() < target {
            if attempts >= MAX_UNIQUE_ATTEMPTS {
                if items.len() >= self.size.min {
                    break;
                }
                panic!(
                    "{}",
                    PropertyError::generation_exhausted(attempts, "unique array")
                );
            }
            attempts += 1;
            let v = self.element.generate(&mut content, bias);
            if seen.insert((self.selector)(v.value())) {
                components.push(v.context().cloned());
                items.push(v.into_value());
            }
        }
        Value::with_context(items, ComponentContexts { components })
    }

    fn can_shrink_without_context(&self, value: &Vec<T>) -> bool {
        (self.size.min..=self.size.max).contains(&value.len())
            && self.is_unique(value)
            && value
                .iter()
                .all(|v| self.element.can_shrink_without_context(v))
    }

    fn shrink(&self, value: &Value<Vec<T>>) -> Stream<Value<Vec<T>>> {
        let items = value.value().clone();
        let contexts: Vec<Option<ShrinkContext>> = match value.context_as::<ComponentContexts>() {
            Some(ctx) => ctx.components.clone(),
            None => {
                if !self.can_shrink_without_context(&items) {
                    return Stream::empty();
                }
                vec![None; items.len()]
            }
        };
        // Element shrinks may collide under the selector; every candidate is
        // re-checked and violators are discarded.
        let selector = Arc::clone(&self.selector);
        shrink_array_like(&self.element, self.size.min, items, contexts).filter(move |candidate| {
            let mut seen = HashSet::new();
            candidate
                .value()
                .iter()
                .all(|item| seen.insert((selector)(item)))
        })
    }
}
