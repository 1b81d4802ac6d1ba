//! Leaf arbitraries for booleans, integers, floats, characters, and strings.

use crate::arbitrary::{Arbitrary, BiasFactor};
use crate::rng::RandomSource;
use crate::shrink::{Bisect, lengths_toward, shrink_target};
use crate::stream::Stream;
use crate::value::Value;

/// Inclusive length bounds for generated collections and strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SizeConstraints {
    pub min: usize,
    pub max: usize,
}

impl SizeConstraints {
    /// Create validated length bounds.
    pub fn new(min: usize, max: usize) -> Self {
        if min > max {
            panic!(
                "SizeConstraints requires min <= max (got min={}, max={})",
                min, max
            );
        }
        Self { min, max }
    }
}

impl Default for SizeConstraints {
    fn default() -> Self {
        Self { min: 0, max: 10 }
    }
}

/// Arbitrary for boolean values.
#[derive(Debug, Clone)]
pub struct BooleanArbitrary;

/// Build a boolean arbitrary. `true` shrinks to `false`.
pub fn boolean() -> BooleanArbitrary {
    BooleanArbitrary
}

impl Arbitrary<bool> for BooleanArbitrary {
    fn generate(&self, rng: &mut RandomSource, bias: Option<BiasFactor>) -> Value<bool> {
        if let Some(bias) = bias {
            if bias.should_bias(rng) {
                return Value::new(false);
            }
        }
        Value::new(rng.next_usize(2) == 1)
    }

    fn can_shrink_without_context(&self, _value: &bool) -> bool {
        true
    }

    fn shrink(&self, value: &Value<bool>) -> Stream<Value<bool>> {
        if *value.value() {
            Stream::once(Value::new(false))
        } else {
            Stream::empty()
        }
    }
}

/// Context attached to integer shrink candidates: the bound nearest the
/// target already known to pass, narrowing the remaining search window.
struct IntegerShrinkContext(i128);

/// Arbitrary for integers constrained to `min..=max`.
#[derive(Debug, Clone)]
pub struct IntegerArbitrary<T> {
    min: T,
    max: T,
}

/// Build an integer arbitrary over `min..=max`.
pub fn integer<T: Copy + PartialOrd + std::fmt::Debug>(min: T, max: T) -> IntegerArbitrary<T> {
    if min > max {
        panic!(
            "integer requires min <= max (got min={:?}, max={:?})",
            min, max
        );
    }
    IntegerArbitrary { min, max }
}

/// Build a natural-number arbitrary over `0..=max`.
pub fn nat(max: u64) -> IntegerArbitrary<u64> {
    integer(0, max)
}

macro_rules! impl_integer_arbitrary {
    ($($t:ty),*) => {
        $(
            impl IntegerArbitrary<$t> {
                /// The full range of the type.
                pub fn full_range() -> Self {
                    Self { min: <$t>::MIN, max: <$t>::MAX }
                }
            }

            impl Arbitrary<$t> for IntegerArbitrary<$t> {
                fn generate(&self, rng: &mut RandomSource, bias: Option<BiasFactor>) -> Value<$t> {
                    if let Some(bias) = bias {
                        if bias.should_bias(rng) {
                            let target = shrink_target(self.min, self.max);
                            let edges = [target, self.min, self.max];
                            let pick = edges[rng.next_usize(edges.len())];
                            return Value::new(pick);
                        }
                    }
                    let drawn = rng.next_int(self.min as i128, self.max as i128);
                    Value::new(drawn as $t)
                }

                fn can_shrink_without_context(&self, value: &$t) -> bool {
                    self.min <= *value && *value <= self.max
                }

                fn shrink(&self, value: &Value<$t>) -> Stream<Value<$t>> {
                    let v = *value.value() as i128;
                    let target = shrink_target(self.min, self.max) as i128;
                    if v == target {
                        return Stream::empty();
                    }
                    let walk = match value.context_as::<IntegerShrinkContext>() {
                        Some(ctx) => Bisect::resume(v, ctx.0),
                        None => Bisect::new(v, target),
                    };
                    Stream::from_iter(walk.map(|(candidate, bound)| {
                        Value::with_context(candidate as $t, IntegerShrinkContext(bound))
                    }))
                }
            }
        )*
    };
}

impl_integer_arbitrary!(i8, i16, i32, i64, isize, u8, u16, u32, u64, usize);

/// Inclusive bounds for generated floats.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FloatConstraints {
    pub min: f64,
    pub max: f64,
}

impl Default for FloatConstraints {
    fn default() -> Self {
        Self {
            min: -1000.0,
            max: 1000.0,
        }
    }
}

/// Arbitrary for `f64` values in a finite range.
#[derive(Debug, Clone)]
pub struct FloatArbitrary {
    constraints: FloatConstraints,
}

/// Build a float arbitrary over `[min, max]`.
pub fn float(constraints: FloatConstraints) -> FloatArbitrary {
    if !(constraints.min <= constraints.max)
        || !constraints.min.is_finite()
        || !constraints.max.is_finite()
    {
        panic!(
            "float requires finite min <= max (got min={}, max={})",
            constraints.min, constraints.max
        );
    }
    FloatArbitrary { constraints }
}

impl Arbitrary<f64> for FloatArbitrary {
    fn generate(&self, rng: &mut RandomSource, bias: Option<BiasFactor>) -> Value<f64> {
        let FloatConstraints { min, max } = self.constraints;
        if let Some(bias) = bias {
            if bias.should_bias(rng) {
                let mut edges = vec![min, max];
                if min <= 0.0 && 0.0 <= max {
                    edges.push(0.0);
                }
                return Value::new(edges[rng.next_usize(edges.len())]);
            }
        }
        Value::new(min + rng.next_f64() * (max - min))
    }

    fn can_shrink_without_context(&self, value: &f64) -> bool {
        value.is_finite() && self.constraints.min <= *value && *value <= self.constraints.max
    }

    fn shrink(&self, value: &Value<f64>) -> Stream<Value<f64>> {
        let v = *value.value();
        let FloatConstraints { min, max } = self.constraints;
        if v == 0.0 || !v.is_finite() {
            return Stream::empty();
        }

        let mut candidates = Vec::new();
        if min <= 0.0 && 0.0 <= max {
            candidates.push(0.0);
        }
        let half = v / 2.0;
        if half != v && min <= half && half <= max {
            candidates.push(half);
        }
        let truncated = v.trunc();
        if truncated != v && min <= truncated && truncated <= max {
            candidates.push(truncated);
        }
        Stream::from_iter(candidates.into_iter().map(Value::new))
    }
}

/// Arbitrary for characters drawn from a set of inclusive ranges.
#[derive(Debug, Clone)]
pub struct CharArbitrary {
    ranges: Vec<(char, char)>,
}

impl CharArbitrary {
    /// Printable ASCII, space through tilde.
    pub fn ascii_printable() -> Self {
        Self {
            ranges: vec![(' ', '~')],
        }
    }

    /// ASCII digits and letters.
    pub fn ascii_alphanumeric() -> Self {
        Self {
            ranges: vec![('0', '9'), ('A', 'Z'), ('a', 'z')],
        }
    }

    /// Custom inclusive ranges.
    pub fn with_ranges(ranges: Vec<(char, char)>) -> Self {
        if ranges.is_empty() {
            panic!("CharArbitrary requires at least one range");
        }
        for (start, end) in &ranges {
            if start > end {
                panic!(
                    "CharArbitrary range start must not exceed end (got {:?}..={:?})",
                    start, end
                );
            }
        }
        Self { ranges }
    }

    fn contains(&self, c: char) -> bool {
        self.ranges
            .iter()
            .any(|(start, end)| (*start..=*end).contains(&c))
    }

    /// Characters a shrink converges toward, cheapest first.
    fn shrink_goals(&self) -> Vec<char> {
        let mut goals: Vec<char> = ['a', '0', ' ']
            .into_iter()
            .filter(|c| self.contains(*c))
            .collect();
        for (start, _) in &self.ranges {
            if !goals.contains(start) {
                goals.push(*start);
            }
        }
        goals
    }
}

/// Build a printable-ASCII character arbitrary.
pub fn character() -> CharArbitrary {
    CharArbitrary::ascii_printable()
}

impl Arbitrary<char> for CharArbitrary {
    fn generate(&self, rng: &mut RandomSource, bias: Option<BiasFactor>) -> Value<char> {
        if let Some(bias) = bias {
            if bias.should_bias(rng) {
                let goals = self.shrink_goals();
                return Value::new(goals[rng.next_usize(goals.len())]);
            }
        }
        let (start, end) = self.ranges[rng.next_usize(self.ranges.len())];
        let code = rng.next_int(start as u32 as i128, end as u32 as i128) as u32;
        Value::new(char::from_u32(code).unwrap_or(start))
    }

    fn can_shrink_without_context(&self, value: &char) -> bool {
        self.contains(*value)
    }

    fn shrink(&self, value: &Value<char>) -> Stream<Value<char>> {
        let v = *value.value();
        let candidates: Vec<char> = self
            .shrink_goals()
            .into_iter()
            .filter(|goal| (*goal as u32) < (v as u32))
            .collect();
        Stream::from_iter(candidates.into_iter().map(Value::new))
    }
}

/// Arbitrary for strings: a length drawn from size constraints, then that
/// many characters from a character arbitrary.
#[derive(Debug, Clone)]
pub struct StringArbitrary {
    chars: CharArbitrary,
    size: SizeConstraints,
}

/// Build a printable-ASCII string arbitrary with the given length bounds.
pub fn string(size: SizeConstraints) -> StringArbitrary {
    StringArbitrary {
        chars: CharArbitrary::ascii_printable(),
        size,
    }
}

/// Build a string arbitrary over a custom character arbitrary.
pub fn string_of(chars: CharArbitrary, size: SizeConstraints) -> StringArbitrary {
    StringArbitrary { chars, size }
}

impl Arbitrary<String> for StringArbitrary {
    fn generate(&self, rng: &mut RandomSource, bias: Option<BiasFactor>) -> Value<String> {
        let length = if bias.map(|b| b.should_bias(rng)).unwrap_or(false) {
            self.size.min
        } else {
            rng.next_int(self.size.min as i128, self.size.max as i128) as usize
        };
        // Content comes from a forked stream so the character count never
        // shifts sibling draws.
        let mut content = rng.fork();
        let s: String = (0..length)
            .map(|_| self.chars.generate(&mut content, bias).into_value())
            .collect();
        Value::new(s)
    }

    fn can_shrink_without_context(&self, value: &String) -> bool {
        let len = value.chars().count();
        self.size.min <= len
            && len <= self.size.max
            && value.chars().all(|c| self.chars.contains(c))
    }

    fn shrink(&self, value: &Value<String>) -> Stream<Value<String>> {
        let chars: Vec<char> = value.value().chars().collect();
        let len = chars.len();
        let min = self.size.min;

        // Chunk removal first: shorter counterexamples are worth more than
        // smaller characters.
        let prefix_chars = chars.clone();
        let length_candidates = Stream::from_iter(
            lengths_toward(min.min(len), len)
                .map(move |l| Value::new(prefix_chars[..l].iter().collect::<String>())),
        );

        let char_arb = self.chars.clone();
        let element_candidates = Stream::from_iter((0..len).flat_map(move |i| {
            let base = chars.clone();
            char_arb
                .shrink(&Value::new(base[i]))
                .map(move |c| {
                    let mut next = base.clone();
                    next[i] = c.into_value();
                    Value::new(next.into_iter().collect::<String>())
                })
                .collect::<Vec<_>>()
        }));

        length_candidates.chain(element_candidates)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rng(seed: u64) -> RandomSource {
        RandomSource::from_seed(seed)
    }

    #[test]
    fn boolean_shrinks_true_to_false() {
        let arb = boolean();
        let shrinks: Vec<bool> = arb
            .shrink(&Value::new(true))
            .map(|v| *v.value())
            .collect();
        assert_eq!(shrinks, vec![false]);
        assert_eq!(arb.shrink(&Value::new(false)).count(), 0);
    }

    #[test]
    fn integer_generates_in_range() {
        let arb = integer(-20i64, 20);
        let mut rng = rng(11);
        for _ in 0..200 {
            let v = arb.generate(&mut rng, None).into_value();
            assert!((-20..=20).contains(&v));
        }
    }

    #[test]
    fn integer_bias_prefers_edges() {
        let arb = integer(5u32, 1000);
        let mut rng = rng(4);
        let mut saw_edge = false;
        for _ in 0..300 {
            let v = arb
                .generate(&mut rng, Some(BiasFactor::MAX_PRESSURE))
                .into_value();
            if v == 5 || v == 1000 {
                saw_edge = true;
            }
        }
        assert!(saw_edge);
    }

    #[test]
    fn integer_shrink_is_monotone_and_target_first() {
        let arb = integer(-100i32, 100);
        let candidates: Vec<i32> = arb
            .shrink(&Value::new(80))
            .map(|v| *v.value())
            .collect();
        assert_eq!(candidates[0], 0);
        for c in &candidates {
            assert!(c.abs() <= 80);
        }
        // Strictly increasing toward the original value after the target.
        for pair in candidates.windows(2) {
            assert!(pair[0] < pair[1]);
        }
    }

    #[test]
    fn integer_shrink_context_narrows_the_window() {
        let arb = integer(0u64, 1000);
        let mut current = Value::new(100u64);
        let mut seen = std::collections::HashSet::new();
        // Walk: always descend into the last candidate; no value may repeat.
        for _ in 0..64 {
            let next = match arb.shrink(&current).last() {
                Some(v) => v,
                None => break,
            };
            assert!(seen.insert(*next.value()), "revisited {}", next.value());
            current = next;
        }
    }

    #[test]
    fn integer_at_target_has_no_shrinks() {
        assert_eq!(integer(0i8, 10).shrink(&Value::new(0)).count(), 0);
        assert_eq!(integer(5u16, 10).shrink(&Value::new(5)).count(), 0);
        assert_eq!(integer(-10i64, -3).shrink(&Value::new(-3)).count(), 0);
    }

    #[test]
    fn float_shrinks_toward_zero() {
        let arb = float(FloatConstraints::default());
        let candidates: Vec<f64> = arb
            .shrink(&Value::new(7.5))
            .map(|v| *v.value())
            .collect();
        assert_eq!(candidates, vec![0.0, 3.75, 7.0]);
        assert_eq!(arb.shrink(&Value::new(0.0)).count(), 0);
    }

    #[test]
    fn character_respects_ranges() {
        let arb = CharArbitrary::ascii_alphanumeric();
        let mut rng = rng(9);
        for _ in 0..200 {
            let c = arb.generate(&mut rng, None).into_value();
            assert!(c.is_ascii_alphanumeric());
        }
    }

    #[test]
    fn character_shrinks_toward_goals() {
        let arb = CharArbitrary::ascii_printable();
        let candidates: Vec<char> = arb
            .shrink(&Value::new('z'))
            .map(|v| *v.value())
            .collect();
        assert!(candidates.contains(&'a'));
        assert!(candidates.iter().all(|c| (*c as u32) < ('z' as u32)));
    }

    #[test]
    fn string_length_within_constraints() {
        let arb = string(SizeConstraints::new(2, 6));
        let mut rng = rng(17);
        for _ in 0..100 {
            let s = arb.generate(&mut rng, None).into_value();
            assert!((2..=6).contains(&s.len()));
        }
    }

    #[test]
    fn string_shrinks_length_before_characters() {
        let arb = string(SizeConstraints::new(0, 10));
        let candidates: Vec<String> = arb
            .shrink(&Value::new("zzzz".to_string()))
            .map(|v| v.into_value())
            .collect();
        assert_eq!(candidates[0], "");
        // Every candidate is no longer than the original.
        assert!(candidates.iter().all(|s| s.len() <= 4));
        // Character-level shrinks preserve length and appear after the
        // length reductions.
        assert!(candidates.iter().any(|s| s.len() == 4 && s != "zzzz"));
    }

    #[test]
    #[should_panic(expected = "min <= max")]
    fn integer_rejects_inverted_bounds() {
        let _ = integer(10i32, 3);
    }

    #[test]
    #[should_panic(expected = "at least one range")]
    fn character_rejects_empty_ranges() {
        let _ = CharArbitrary::with_ranges(vec![]);
    }
}
