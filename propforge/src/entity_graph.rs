//! Arbitraries for mutually-referencing entity collections.
//!
//! Generation is two-phase: flat unlinked collections per entity type first,
//! then a link-index structure of plain integers describing cross-references,
//! materialized into an adjacency representation at the end. Keeping the
//! random step on integer indices keeps it acyclic and shrinkable even when
//! the materialized graph is cyclic.

use std::collections::{BTreeMap, HashSet};
use std::fmt;

use crate::arbitrary::{Arbitrary, BiasFactor, BoxedArbitrary};
use crate::error::PropertyError;
use crate::primitives::SizeConstraints;
use crate::rng::RandomSource;
use crate::shrink::{Bisect, lengths_toward};
use crate::stream::Stream;
use crate::value::Value;

/// How many references a relation attaches to each source entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    /// An optional reference; shrinking prefers dropping it.
    ZeroOrOne,
    /// A mandatory reference.
    One,
    /// A bounded set of references.
    Many(SizeConstraints),
}

/// How a relation picks target indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LinkStrategy {
    /// A target index is never reused across source entities.
    Exclusive,
    /// The target index must exceed the source entity's own index; builds
    /// strictly-ordered chains and DAGs. Source and target type must
    /// coincide.
    Successor,
    /// Unconstrained.
    Any,
}

/// One relation between entity types.
#[derive(Debug, Clone)]
pub struct RelationSpec {
    pub name: String,
    pub source: String,
    pub target: String,
    pub arity: Arity,
    pub strategy: LinkStrategy,
}

impl RelationSpec {
    pub fn new(
        name: impl Into<String>,
        source: impl Into<String>,
        target: impl Into<String>,
        arity: Arity,
        strategy: LinkStrategy,
    ) -> Self {
        Self {
            name: name.into(),
            source: source.into(),
            target: target.into(),
            arity,
            strategy,
        }
    }
}

/// The target indices a relation attached to one source entity.
#[derive(Debug, Clone, PartialEq, Eq)]
enum LinkTargets {
    Optional(Option<usize>),
    Single(usize),
    Multi(Vec<usize>),
}

impl LinkTargets {
    fn targets(&self) -> Vec<usize> {
        match self {
            LinkTargets::Optional(None) => Vec::new(),
            LinkTargets::Optional(Some(t)) => vec![*t],
            LinkTargets::Single(t) => vec![*t],
            LinkTargets::Multi(ts) => ts.clone(),
        }
    }
}

/// The unlinked collections plus the integer link structure; the shrinkable
/// core a graph value carries as its context.
#[derive(Clone)]
struct GraphStructure<E> {
    entities: BTreeMap<String, Vec<E>>,
    // links[r][i] = targets relation r attached to source entity i.
    links: Vec<Vec<LinkTargets>>,
}

/// A materialized cross-reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Link {
    pub relation: String,
    pub source_type: String,
    pub source_index: usize,
    pub target_type: String,
    pub target_index: usize,
}

/// A fully-linked entity graph: flat collections plus resolved references.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityGraph<E> {
    pub entities: BTreeMap<String, Vec<E>>,
    pub links: Vec<Link>,
}

impl<E> EntityGraph<E> {
    /// The links of one relation, in source-index order.
    pub fn links_of(&self, relation: &str) -> Vec<&Link> {
        self.links
            .iter()
            .filter(|l| l.relation == relation)
            .collect()
    }
}

struct EntityTypeSpec<E> {
    name: String,
    count: SizeConstraints,
    payload: BoxedArbitrary<E>,
}

/// Builder for [`EntityGraphArbitrary`]. Relation configurations are
/// validated eagerly at [`EntityGraphBuilder::build`].
pub struct EntityGraphBuilder<E> {
    types: Vec<EntityTypeSpec<E>>,
    relations: Vec<RelationSpec>,
}

impl<E> Default for EntityGraphBuilder<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> EntityGraphBuilder<E> {
    pub fn new() -> Self {
        Self {
            types: Vec::new(),
            relations: Vec::new(),
        }
    }

    /// Declare an entity type with a count range and a payload arbitrary.
    pub fn entity_type(
        mut self,
        name: impl Into<String>,
        count: SizeConstraints,
        payload: BoxedArbitrary<E>,
    ) -> Self {
        self.types.push(EntityTypeSpec {
            name: name.into(),
            count,
            payload,
        });
        self
    }

    /// Declare a relation between two declared entity types.
    pub fn relation(mut self, spec: RelationSpec) -> Self {
        self.relations.push(spec);
        self
    }

    /// Validate the configuration and produce the arbitrary.
    pub fn build(self) -> Result<EntityGraphArbitrary<E>, PropertyError> {
        let type_names: HashSet<&str> = self.types.iter().map(|t| t.name.as_str()).collect();
        if self.types.is_empty() {
            return Err(PropertyError::contract_violation(
                "entity graph requires at least one entity type",
            ));
        }

        for relation in &self.relations {
            if !type_names.contains(relation.source.as_str()) {
                return Err(PropertyError::contract_violation(format!(
                    "relation {} references undeclared source type {}",
                    relation.name, relation.source
                )));
            }
            if !type_names.contains(relation.target.as_str()) {
                return Err(PropertyError::contract_violation(format!(
                    "relation {} references undeclared target type {}",
                    relation.name, relation.target
                )));
            }
            if relation.strategy == LinkStrategy::Successor {
                if relation.source != relation.target {
                    return Err(PropertyError::contract_violation(format!(
                        "successor relation {} must link a type to itself",
                        relation.name
                    )));
                }
                if relation.arity == Arity::One {
                    return Err(PropertyError::contract_violation(format!(
                        "successor relation {} cannot have arity one: the last entity has no successor",
                        relation.name
                    )));
                }
            }
        }

        // Exclusive reservations on a target type cannot coexist with other
        // strategies competing for the same indices.
        for target in &type_names {
            let strategies: HashSet<LinkStrategy> = self
                .relations
                .iter()
                .filter(|r| r.target == *target)
                .map(|r| r.strategy)
                .collect();
            if strategies.contains(&LinkStrategy::Exclusive) && strategies.len() > 1 {
                return Err(PropertyError::contract_violation(format!(
                    "target type {} mixes an exclusive relation with other strategies",
                    target
                )));
            }
        }

        Ok(EntityGraphArbitrary {
            types: self.types,
            relations: self.relations,
        })
    }
}

/// Arbitrary for [`EntityGraph`] values.
pub struct EntityGraphArbitrary<E> {
    types: Vec<EntityTypeSpec<E>>,
    relations: Vec<RelationSpec>,
}

impl<E> fmt::Debug for EntityGraphArbitrary<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityGraphArbitrary")
            .field(
                "types",
                &self.types.iter().map(|t| &t.name).collect::<Vec<_>>(),
            )
            .field("relations", &self.relations)
            .finish()
    }
}

impl<E: Clone + Send + Sync + 'static> EntityGraphArbitrary<E> {
    fn materialize(&self, structure: &GraphStructure<E>) -> EntityGraph<E> {
        let mut links = Vec::new();
        for (r, per_source) in structure.links.iter().enumerate() {
            let relation = &self.relations[r];
            for (source_index, targets) in per_source.iter().enumerate() {
                for target_index in targets.targets() {
                    links.push(Link {
                        relation: relation.name.clone(),
                        source_type: relation.source.clone(),
                        source_index,
                        target_type: relation.target.clone(),
                        target_index,
                    });
                }
            }
        }
        EntityGraph {
            entities: structure.entities.clone(),
            links,
        }
    }

    /// Whether a (possibly shrunk) link structure still honors every
    /// relation's strategy and arity.
    fn structure_is_valid(&self, structure: &GraphStructure<E>) -> bool {
        let mut exclusive_used: BTreeMap<&str, HashSet<usize>> = BTreeMap::new();
        for (r, per_source) in structure.links.iter().enumerate() {
            let relation = &self.relations[r];
            let target_count = structure
                .entities
                .get(&relation.target)
                .map(|v| v.len())
                .unwrap_or(0);
            for (source_index, targets) in per_source.iter().enumerate() {
                let resolved = targets.targets();
                match (&relation.arity, targets) {
                    (Arity::One, LinkTargets::Single(_)) => {}
                    (Arity::ZeroOrOne, LinkTargets::Optional(_)) => {}
                    (Arity::Many(size), LinkTargets::Multi(ts)) => {
                        if ts.len() < size.min || ts.len() > size.max {
                            return false;
                        }
                    }
                    _ => return false,
                }
                for target in &resolved {
                    if *target >= target_count {
                        return false;
                    }
                    if relation.strategy == LinkStrategy::Successor && *target <= source_index {
                        return false;
                    }
                    if relation.strategy == LinkStrategy::Exclusive
                        && !exclusive_used
                            .entry(relation.target.as_str())
                            .or_default()
                            .insert(*target)
                    {
                        return false;
                    }
                }
                if resolved.len() != resolved.iter().collect::<HashSet<_>>().len() {
                    return false;
                }
            }
        }
        true
    }

    fn generate_structure(
        &self,
        rng: &mut RandomSource,
        bias: Option<BiasFactor>,
    ) -> GraphStructure<E> {
        // Phase 1: flat unlinked collections.
        let mut entities = BTreeMap::new();
        for spec in &self.types {
            let count = if bias.map(|b| b.should_bias(rng)).unwrap_or(false) {
                spec.count.min
            } else {
                rng.next_int(spec.count.min as i128, spec.count.max as i128) as usize
            };
            let mut content = rng.fork();
            let payloads: Vec<E> = (0..count)
                .map(|_| spec.payload.generate(&mut content, bias).into_value())
                .collect();
            entities.insert(spec.name.clone(), payloads);
        }

        // Phase 2: integer link indices.
        let mut exclusive_used: BTreeMap<&str, HashSet<usize>> = BTreeMap::new();
        let mut links = Vec::with_capacity(self.relations.len());
        for relation in &self.relations {
            let source_count = entities.get(&relation.source).map(|v| v.len()).unwrap_or(0);
            let target_count = entities.get(&relation.target).map(|v| v.len()).unwrap_or(0);
            let mut per_source = Vec::with_capacity(source_count);
            for source_index in 0..source_count {
                let mut pool: Vec<usize> = match relation.strategy {
                    LinkStrategy::Any => (0..target_count).collect(),
                    LinkStrategy::Successor => (source_index + 1..target_count).collect(),
                    LinkStrategy::Exclusive => {
                        let used = exclusive_used.entry(relation.target.as_str()).or_default();
                        (0..target_count).filter(|i| !used.contains(i)).collect()
                    }
                };
                let mut draw = |pool: &mut Vec<usize>, rng: &mut RandomSource| -> usize {
                    let picked = pool.swap_remove(rng.next_usize(pool.len()));
                    if relation.strategy == LinkStrategy::Exclusive {
                        exclusive_used
                            .entry(relation.target.as_str())
                            .or_default()
                            .insert(picked);
                    }
                    picked
                };
                let targets = match relation.arity {
                    Arity::One => {
                        if pool.is_empty() {
                            panic!(
                                "{}",
                                PropertyError::generation_exhausted(
                                    source_count,
                                    format!("relation {} has no remaining targets", relation.name),
                                )
                            );
                        }
                        LinkTargets::Single(draw(&mut pool, rng))
                    }
                    Arity::ZeroOrOne => {
                        if pool.is_empty() || rng.next_usize(2) == 0 {
                            LinkTargets::Optional(None)
                        } else {
                            LinkTargets::Optional(Some(draw(&mut pool, rng)))
                        }
                    }
                    Arity::Many(size) => {
                        if pool.len() < size.min {
                            panic!(
                                "{}",
                                PropertyError::generation_exhausted(
                                    source_count,
                                    format!(
                                        "relation {} cannot reach its minimum of {} targets",
                                        relation.name, size.min
                                    ),
                                )
                            );
                        }
                        let upper = size.max.min(pool.len());
                        let k = rng.next_int(size.min as i128, upper as i128) as usize;
                        let mut picked: Vec<usize> =
                            (0..k).map(|_| draw(&mut pool, rng)).collect();
                        picked.sort_unstable();
                        LinkTargets::Multi(picked)
                    }
                };
                per_source.push(targets);
            }
            links.push(per_source);
        }

        GraphStructure { entities, links }
    }

    /// Candidate structures one shrink step away: dropped optional links,
    /// shortened multi-link sets, and targets lowered toward their floor.
    fn shrink_structures(&self, structure: &GraphStructure<E>) -> Vec<GraphStructure<E>> {
        let mut candidates = Vec::new();
        for (r, per_source) in structure.links.iter().enumerate() {
            let relation = &self.relations[r];
            for (source_index, targets) in per_source.iter().enumerate() {
                let floor = match relation.strategy {
                    LinkStrategy::Successor => source_index + 1,
                    _ => 0,
                };
                let mut replace = |next: LinkTargets| {
                    let mut shrunk = structure.clone();
                    shrunk.links[r][source_index] = next;
                    candidates.push(shrunk);
                };
                match targets {
                    LinkTargets::Optional(Some(t)) => {
                        replace(LinkTargets::Optional(None));
                        for (lower, _) in Bisect::new(*t as i128, floor as i128) {
                            replace(LinkTargets::Optional(Some(lower as usize)));
                        }
                    }
                    LinkTargets::Optional(None) => {}
                    LinkTargets::Single(t) => {
                        for (lower, _) in Bisect::new(*t as i128, floor as i128) {
                            replace(LinkTargets::Single(lower as usize));
                        }
                    }
                    LinkTargets::Multi(ts) => {
                        let min = match relation.arity {
                            Arity::Many(size) => size.min,
                            _ => 0,
                        };
                        for l in lengths_toward(min.min(ts.len()), ts.len()) {
                            replace(LinkTargets::Multi(ts[..l].to_vec()));
                        }
                        for (i, t) in ts.iter().enumerate() {
                            for (lower, _) in Bisect::new(*t as i128, floor as i128) {
                                let mut next = ts.clone();
                                next[i] = lower as usize;
                                replace(LinkTargets::Multi(next));
                            }
                        }
                    }
                }
            }
        }
        candidates
    }
}

/// Context carried by generated graphs: the pre-materialization structure.
struct GraphShrinkContext<E> {
    structure: GraphStructure<E>,
}

impl<E: Clone + Send + Sync + 'static> Arbitrary<EntityGraph<E>> for EntityGraphArbitrary<E> {
    fn generate(&self, rng: &mut RandomSource, bias: Option<BiasFactor>) -> Value<EntityGraph<E>> {
        let structure = self.generate_structure(rng, bias);
        let graph = self.materialize(&structure);
        Value::with_context(graph, GraphShrinkContext { structure })
    }

    fn can_shrink_without_context(&self, _value: &EntityGraph<E>) -> bool {
        // The link structure cannot be recovered from a bare graph.
        false
    }

    fn shrink(&self, value: &Value<EntityGraph<E>>) -> Stream<Value<EntityGraph<E>>> {
        let structure = match value.context_as::<GraphShrinkContext<E>>() {
            Some(ctx) => &ctx.structure,
            None => return Stream::empty(),
        };
        let candidates: Vec<Value<EntityGraph<E>>> = self
            .shrink_structures(structure)
            .into_iter()
            .filter(|candidate| self.structure_is_valid(candidate))
            .map(|candidate| {
                let graph = self.materialize(&candidate);
                Value::with_context(graph, GraphShrinkContext { structure: candidate })
            })
            .collect();
        Stream::from_iter(candidates)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::primitives::nat;

    fn rng(seed: u64) -> RandomSource {
        RandomSource::from_seed(seed)
    }

    fn successor_graph() -> EntityGraphArbitrary<u64> {
        EntityGraphBuilder::new()
            .entity_type("node", SizeConstraints::new(2, 8), nat(100).boxed())
            .relation(RelationSpec::new(
                "next",
                "node",
                "node",
                Arity::ZeroOrOne,
                LinkStrategy::Successor,
            ))
            .build()
            .unwrap()
    }

    #[test]
    fn successor_links_strictly_increase() {
        let arb = successor_graph();
        for seed in 0..20 {
            let graph = arb.generate(&mut rng(seed), None).into_value();
            for link in graph.links_of("next") {
                assert!(
                    link.target_index > link.source_index,
                    "successor link {} -> {} does not increase",
                    link.source_index,
                    link.target_index
                );
            }
        }
    }

    #[test]
    fn successor_links_survive_shrinking() {
        let arb = successor_graph();
        let value = arb.generate(&mut rng(7), None);
        for candidate in arb.shrink(&value) {
            for link in candidate.value().links_of("next") {
                assert!(link.target_index > link.source_index);
            }
        }
    }

    #[test]
    fn exclusive_targets_are_never_shared() {
        let arb = EntityGraphBuilder::new()
            .entity_type("team", SizeConstraints::new(1, 3), nat(10).boxed())
            .entity_type("employee", SizeConstraints::new(6, 10), nat(10).boxed())
            .relation(RelationSpec::new(
                "members",
                "team",
                "employee",
                Arity::Many(SizeConstraints::new(0, 2)),
                LinkStrategy::Exclusive,
            ))
            .build()
            .unwrap();
        for seed in 0..20 {
            let graph = arb.generate(&mut rng(seed), None).into_value();
            let mut used = HashSet::new();
            for link in graph.links_of("members") {
                assert!(used.insert(link.target_index), "target reused");
            }
        }
    }

    #[test]
    fn mandatory_links_are_always_present() {
        let arb = EntityGraphBuilder::new()
            .entity_type("employee", SizeConstraints::new(1, 5), nat(10).boxed())
            .entity_type("manager", SizeConstraints::new(1, 3), nat(10).boxed())
            .relation(RelationSpec::new(
                "reports_to",
                "employee",
                "manager",
                Arity::One,
                LinkStrategy::Any,
            ))
            .build()
            .unwrap();
        for seed in 0..20 {
            let graph = arb.generate(&mut rng(seed), None).into_value();
            let employees = graph.entities.get("employee").unwrap().len();
            assert_eq!(graph.links_of("reports_to").len(), employees);
        }
    }

    #[test]
    fn shrinking_only_removes_or_lowers_links() {
        let arb = successor_graph();
        let value = arb.generate(&mut rng(3), None);
        let original_links = value.value().links.len();
        for candidate in arb.shrink(&value) {
            assert!(candidate.value().links.len() <= original_links);
            // Entities are held fixed; only the link structure shrinks.
            assert_eq!(candidate.value().entities, value.value().entities);
        }
    }

    #[test]
    fn successor_arity_one_is_rejected() {
        let err = EntityGraphBuilder::new()
            .entity_type("node", SizeConstraints::new(1, 5), nat(10).boxed())
            .relation(RelationSpec::new(
                "next",
                "node",
                "node",
                Arity::One,
                LinkStrategy::Successor,
            ))
            .build()
            .unwrap_err();
        assert!(matches!(err, PropertyError::ContractViolation { .. }));
    }

    #[test]
    fn successor_across_types_is_rejected() {
        let err = EntityGraphBuilder::new()
            .entity_type("a", SizeConstraints::new(1, 5), nat(10).boxed())
            .entity_type("b", SizeConstraints::new(1, 5), nat(10).boxed())
            .relation(RelationSpec::new(
                "next",
                "a",
                "b",
                Arity::ZeroOrOne,
                LinkStrategy::Successor,
            ))
            .build()
            .unwrap_err();
        assert!(matches!(err, PropertyError::ContractViolation { .. }));
    }

    #[test]
    fn mixing_exclusive_with_other_strategies_is_rejected() {
        let err = EntityGraphBuilder::new()
            .entity_type("team", SizeConstraints::new(1, 3), nat(10).boxed())
            .entity_type("employee", SizeConstraints::new(2, 6), nat(10).boxed())
            .relation(RelationSpec::new(
                "members",
                "team",
                "employee",
                Arity::Many(SizeConstraints::new(0, 2)),
                LinkStrategy::Exclusive,
            ))
            .relation(RelationSpec::new(
                "reviewer",
                "team",
                "employee",
                Arity::ZeroOrOne,
                LinkStrategy::Any,
            ))
            .build()
            .unwrap_err();
        assert!(matches!(err, PropertyError::ContractViolation { .. }));
    }

    #[test]
    fn undeclared_types_are_rejected() {
        let err = EntityGraphBuilder::new()
            .entity_type("node", SizeConstraints::new(1, 5), nat(10).boxed())
            .relation(RelationSpec::new(
                "edge",
                "node",
                "ghost",
                Arity::ZeroOrOne,
                LinkStrategy::Any,
            ))
            .build()
            .unwrap_err();
        assert!(matches!(err, PropertyError::ContractViolation { .. }));
    }
}
