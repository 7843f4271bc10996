//! Per-project target dependency graph.
//!
//! Built once per project from the declared targets' depends-on
//! expressions. Used by the finalization pass to give unparented targets a
//! dependency-shaped nesting instead of a flat list under the project.
//!
//! Target names compare case-insensitively; the original spelling is kept
//! for display. The graph assumes a DAG but does not check: closure
//! queries guard with a visited set, so a cycle terminates silently
//! instead of being reported.

use girder_core::{DependencyProvider, TargetDefinition};
use rustc_hash::{FxHashMap, FxHashSet};

/// Dependency and dependent sets for one project's targets.
#[derive(Debug, Default)]
pub struct TargetGraph {
    /// Lowercased target name -> names it depends on (original spelling).
    dependencies: FxHashMap<String, Vec<String>>,
    /// Lowercased target name -> names that depend on it, in declaration
    /// order so `get_dependent` is deterministic.
    dependents: FxHashMap<String, Vec<String>>,
}

impl TargetGraph {
    /// Build the graph from target definitions, expanding each depends-on
    /// expression through the provider and splitting on `;` and whitespace.
    pub fn from_definitions(
        project_file: &str,
        definitions: &[TargetDefinition],
        provider: &dyn DependencyProvider,
    ) -> Self {
        let mut graph = TargetGraph::default();
        for definition in definitions {
            let expanded = provider.expand(project_file, &definition.depends_on);
            for dependency in split_expression(&expanded) {
                graph.insert(&definition.name, dependency);
            }
        }
        graph
    }

    fn insert(&mut self, target: &str, dependency: &str) {
        let deps = self.dependencies.entry(target.to_lowercase()).or_default();
        if !deps.iter().any(|d| d.eq_ignore_ascii_case(dependency)) {
            deps.push(dependency.to_string());
        }
        let dependents = self.dependents.entry(dependency.to_lowercase()).or_default();
        if !dependents.iter().any(|d| d.eq_ignore_ascii_case(target)) {
            dependents.push(target.to_string());
        }
    }

    /// Direct dependencies of a target.
    pub fn get_dependencies(&self, target: &str) -> &[String] {
        self.dependencies
            .get(&target.to_lowercase())
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    /// Some target that depends on `target`, or `None`.
    ///
    /// First-found in declaration order — a heuristic, not a canonical
    /// parent, when multiple targets depend on the same one.
    pub fn get_dependent(&self, target: &str) -> Option<&str> {
        self.dependents
            .get(&target.to_lowercase())
            .and_then(|v| v.first())
            .map(String::as_str)
    }

    /// All targets that depend on `target`, in declaration order.
    pub fn get_dependents(&self, target: &str) -> &[String] {
        self.dependents
            .get(&target.to_lowercase())
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    /// Transitive dependency closure of a target, the target excluded.
    ///
    /// Visited-set guarded: a cycle stops expansion without being reported.
    pub fn target_closure(&self, target: &str) -> FxHashSet<String> {
        let mut closure = FxHashSet::default();
        let mut stack: Vec<String> = self
            .get_dependencies(target)
            .iter()
            .cloned()
            .collect();
        while let Some(current) = stack.pop() {
            let key = current.to_lowercase();
            if !closure.insert(current) {
                continue;
            }
            for next in self.dependencies.get(&key).into_iter().flatten() {
                if !closure.contains(next) {
                    stack.push(next.clone());
                }
            }
        }
        closure
    }
}

fn split_expression(expression: &str) -> impl Iterator<Item = &str> {
    expression
        .split(|c: char| c == ';' || c.is_whitespace())
        .map(str::trim)
        .filter(|s| !s.is_empty())
}
