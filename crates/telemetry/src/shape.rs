//! Static analysis of an operation's selection set: nesting depth and field count.
//!
//! Fragment spreads are resolved through the document's fragment table and walked as if they
//! were inlined. Neither inline fragments nor spreads add a nesting level. The walk is bounded:
//! a field deeper than [`ShapeLimits::max_depth`], a spread that is already being expanded on
//! the current path, more than `max_depth` fragments nested between fields, or more than
//! [`ShapeLimits::max_visited_nodes`] visited selections all stop the analysis with a
//! [`Measure::Saturated`] value instead of recursing forever.

use std::collections::HashMap;

use async_graphql_parser::{
    types::{FragmentDefinition, Selection, SelectionSet},
    Positioned,
};
use async_graphql_value::Name;
use graphql_observability_config::AnalysisConfig;

/// Fragment table of an executable document, keyed by fragment name.
pub type Fragments = HashMap<Name, Positioned<FragmentDefinition>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShapeLimits {
    pub max_depth: u32,
    pub max_visited_nodes: u64,
}

impl Default for ShapeLimits {
    fn default() -> Self {
        AnalysisConfig::default().into()
    }
}

impl From<AnalysisConfig> for ShapeLimits {
    fn from(config: AnalysisConfig) -> Self {
        Self {
            max_depth: config.max_depth,
            max_visited_nodes: config.max_visited_nodes,
        }
    }
}

/// The limit that stopped an analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Saturation {
    /// A field nested deeper than `max_depth`.
    Depth,
    /// A fragment spread inside its own expansion.
    FragmentCycle,
    /// More than `max_depth` fragments nested between two fields.
    FragmentNesting,
    /// More than `max_visited_nodes` selections.
    VisitedNodes,
}

/// Result of a shape measurement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Measure {
    Exact(u64),
    /// The analysis stopped early. Depth reports `max_depth` when the selection nests deeper
    /// than it (or expands forever through a cycle), complexity reports `max_visited_nodes`
    /// when the visit budget ran out. Otherwise `value` is what was measured before stopping.
    Saturated { value: u64, limit: Saturation },
}

impl Measure {
    /// Value to report.
    pub fn value(self) -> u64 {
        match self {
            Measure::Exact(value) | Measure::Saturated { value, .. } => value,
        }
    }

    pub fn is_saturated(self) -> bool {
        matches!(self, Measure::Saturated { .. })
    }

    pub fn saturation(self) -> Option<Saturation> {
        match self {
            Measure::Exact(_) => None,
            Measure::Saturated { limit, .. } => Some(limit),
        }
    }
}

/// Maximum nesting depth of a selection set, with the default limits.
pub fn depth(selection_set: Option<&SelectionSet>, fragments: Option<&Fragments>) -> Measure {
    depth_with_limits(selection_set, fragments, ShapeLimits::default())
}

/// Number of fields reachable from a selection set, with the default limits.
pub fn complexity(selection_set: Option<&SelectionSet>, fragments: Option<&Fragments>) -> Measure {
    complexity_with_limits(selection_set, fragments, ShapeLimits::default())
}

pub fn depth_with_limits(
    selection_set: Option<&SelectionSet>,
    fragments: Option<&Fragments>,
    limits: ShapeLimits,
) -> Measure {
    let Some(selection_set) = selection_set else {
        return Measure::Exact(0);
    };

    let mut walker = Walker::new(fragments, limits);

    match walker.walk(selection_set, 0, 0) {
        Ok(()) => Measure::Exact(walker.deepest),
        Err(limit @ (Saturation::Depth | Saturation::FragmentCycle)) => Measure::Saturated {
            value: u64::from(limits.max_depth),
            limit,
        },
        Err(limit) => Measure::Saturated {
            value: walker.deepest,
            limit,
        },
    }
}

pub fn complexity_with_limits(
    selection_set: Option<&SelectionSet>,
    fragments: Option<&Fragments>,
    limits: ShapeLimits,
) -> Measure {
    let Some(selection_set) = selection_set else {
        return Measure::Exact(0);
    };

    let mut walker = Walker::new(fragments, limits);

    match walker.walk(selection_set, 0, 0) {
        Ok(()) => Measure::Exact(walker.fields),
        Err(limit @ Saturation::VisitedNodes) => Measure::Saturated {
            value: limits.max_visited_nodes,
            limit,
        },
        Err(limit) => Measure::Saturated {
            value: walker.fields,
            limit,
        },
    }
}

struct Walker<'a> {
    fragments: Option<&'a Fragments>,
    limits: ShapeLimits,
    visited: u64,
    fields: u64,
    deepest: u64,
    // fragments being expanded on the current path
    expanding: Vec<&'a str>,
}

impl<'a> Walker<'a> {
    fn new(fragments: Option<&'a Fragments>, limits: ShapeLimits) -> Self {
        Self {
            fragments,
            limits,
            visited: 0,
            fields: 0,
            deepest: 0,
            expanding: Vec::new(),
        }
    }

    fn fragment(&self, name: &str) -> Option<(&'a str, &'a SelectionSet)> {
        self.fragments?
            .get_key_value(name)
            .map(|(name, fragment)| (name.as_str(), &fragment.node.selection_set.node))
    }

    /// `depth` is the number of fields above `selection_set`, `hops` the number of fragments
    /// entered since the last of them.
    fn walk(&mut self, selection_set: &'a SelectionSet, depth: u64, hops: u32) -> Result<(), Saturation> {
        for selection in &selection_set.items {
            self.visited += 1;

            if self.visited > self.limits.max_visited_nodes {
                return Err(Saturation::VisitedNodes);
            }

            match &selection.node {
                Selection::Field(field) => {
                    let depth = depth + 1;

                    if depth > u64::from(self.limits.max_depth) {
                        return Err(Saturation::Depth);
                    }

                    self.fields += 1;
                    self.deepest = self.deepest.max(depth);
                    self.walk(&field.node.selection_set.node, depth, 0)?;
                }
                Selection::InlineFragment(fragment) => {
                    let hops = self.hop(hops)?;
                    self.walk(&fragment.node.selection_set.node, depth, hops)?;
                }
                Selection::FragmentSpread(spread) => {
                    let Some((name, selection_set)) = self.fragment(&spread.node.fragment_name.node) else {
                        continue;
                    };

                    if self.expanding.contains(&name) {
                        return Err(Saturation::FragmentCycle);
                    }

                    let hops = self.hop(hops)?;

                    self.expanding.push(name);
                    let result = self.walk(selection_set, depth, hops);
                    self.expanding.pop();

                    result?;
                }
            }
        }

        Ok(())
    }

    fn hop(&self, hops: u32) -> Result<u32, Saturation> {
        let hops = hops + 1;

        if hops > self.limits.max_depth {
            return Err(Saturation::FragmentNesting);
        }

        Ok(hops)
    }
}
