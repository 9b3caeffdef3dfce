//! Component graph construction and validation.
//!
//! Components are declared flat, by dotted id. [`ComponentGraphBuilder::finalize`]
//! turns the declarations into a validated tree:
//!
//! 1. **Placeholders** - missing ancestors of dotted ids are synthesized
//! 2. **Tree** - parent/child links by id prefix
//! 3. **Namespaces** - each component inherits its ancestors' tokens
//! 4. **Dependencies** - string ids become [`ComponentId`]s
//! 5. **Freeze** - no further declaration changes
//! 6. **Cycles** - depth-first search over dependency edges
//!
//! Containment does not imply ordering: a child may depend on its parent (and
//! a parent on its child) without forming a cycle. Only explicit dependency
//! edges are checked.

use std::path::PathBuf;

use rustc_hash::{FxHashMap, FxHashSet};
use smol_str::SmolStr;
use tracing::debug;

use super::model::{Component, ComponentHandle};
use crate::base::{ComponentId, component_ancestors, parent_component_id, validate_component_id};
use crate::error::{ConfigError, Result};

/// Collects component declarations until [`finalize`](Self::finalize).
#[derive(Debug)]
pub struct ComponentGraphBuilder {
    base: PathBuf,
    components: Vec<Component>,
    by_id: FxHashMap<SmolStr, ComponentId>,
}

impl ComponentGraphBuilder {
    /// Create a builder; components declared from now on use `base` as their
    /// base directory.
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self {
            base: base.into(),
            components: Vec::new(),
            by_id: FxHashMap::default(),
        }
    }

    /// Change the base directory for subsequently declared components, e.g.
    /// when interpreting another definition file.
    pub fn set_base(&mut self, base: impl Into<PathBuf>) {
        self.base = base.into();
    }

    /// Declare a new component.
    pub fn declare(&mut self, id: &str) -> Result<ComponentHandle<'_>> {
        validate_component_id(id).map_err(|reason| ConfigError::InvalidName {
            name: id.to_string(),
            reason,
        })?;
        if self.by_id.contains_key(id) {
            return Err(ConfigError::DuplicateComponent { id: SmolStr::new(id) }.into());
        }
        let component_id = self.push(Component::new(id, self.base.clone()));
        Ok(ComponentHandle::new(&mut self.components[component_id.index()]))
    }

    /// Re-open a declared component.
    pub fn component_mut(&mut self, id: &str) -> Option<ComponentHandle<'_>> {
        let component_id = *self.by_id.get(id)?;
        Some(ComponentHandle::new(&mut self.components[component_id.index()]))
    }

    pub fn contains(&self, id: &str) -> bool {
        self.by_id.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.components.len()
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    fn push(&mut self, component: Component) -> ComponentId {
        let component_id = ComponentId::new(self.components.len() as u32);
        self.by_id.insert(component.id.clone(), component_id);
        self.components.push(component);
        component_id
    }

    /// Validate the declarations and produce an immutable graph.
    ///
    /// Any error aborts construction; the builder is consumed either way.
    pub fn finalize(mut self) -> Result<ComponentGraph, ConfigError> {
        self.create_missing_components();
        self.generate_component_tree();
        self.determine_component_namespaces();
        self.complete_dependency_references()?;
        self.freeze_components();

        let graph = ComponentGraph {
            components: self.components,
            by_id: self.by_id,
        };
        graph.ensure_no_circular_dependencies()?;

        debug!(
            components = graph.len(),
            placeholders = graph.iter().filter(|c| c.is_placeholder()).count(),
            "component graph finalized"
        );
        Ok(graph)
    }

    /// Create blank components for every ancestor id that was never declared.
    fn create_missing_components(&mut self) {
        let declared = self.components.len();
        for index in 0..declared {
            let id = self.components[index].id.clone();
            let base = self.components[index].base.clone();
            for ancestor in component_ancestors(&id) {
                if !self.by_id.contains_key(ancestor) {
                    self.push(Component::placeholder(ancestor, base.clone()));
                }
            }
        }
    }

    /// Link every component to its parent in one pass over the flat set.
    fn generate_component_tree(&mut self) {
        for index in 0..self.components.len() {
            let parent = parent_component_id(&self.components[index].id)
                .and_then(|parent_id| self.by_id.get(parent_id).copied());
            if let Some(parent) = parent {
                self.components[index].parent = Some(parent);
                self.components[parent.index()]
                    .children
                    .push(ComponentId::new(index as u32));
            }
        }
    }

    /// Resolve namespaces parents-first, so each component only joins its own
    /// token onto its parent's resolved namespace.
    fn determine_component_namespaces(&mut self) {
        let mut order: Vec<usize> = (0..self.components.len()).collect();
        order.sort_by_key(|&index| self.components[index].id.matches('.').count());

        for index in order {
            let inherited = match self.components[index].parent {
                Some(parent) => self.components[parent.index()].namespace.clone(),
                None => Default::default(),
            };
            let component = &mut self.components[index];
            component.namespace = match &component.namespace_token {
                Some(token) => inherited.join(token),
                None => inherited,
            };
        }
    }

    /// Replace dependency ids with references to the actual components.
    fn complete_dependency_references(&mut self) -> Result<(), ConfigError> {
        for component in &mut self.components {
            let mut resolved = Vec::with_capacity(component.dependency_ids.len());
            for dependency in &component.dependency_ids {
                match self.by_id.get(dependency) {
                    Some(&id) => resolved.push(id),
                    None => {
                        return Err(ConfigError::UnresolvedDependency {
                            component: component.id.clone(),
                            dependency: dependency.clone(),
                        });
                    }
                }
            }
            component.dependencies = resolved;
        }
        Ok(())
    }

    fn freeze_components(&mut self) {
        for component in &mut self.components {
            component.frozen = true;
        }
    }
}

// ============================================================================
// COMPONENT GRAPH
// ============================================================================

/// A finalized, frozen component graph.
#[derive(Debug, Default)]
pub struct ComponentGraph {
    components: Vec<Component>,
    by_id: FxHashMap<SmolStr, ComponentId>,
}

impl ComponentGraph {
    /// Look up a component by dotted id.
    pub fn get(&self, id: &str) -> Option<&Component> {
        self.by_id.get(id).map(|&id| &self.components[id.index()])
    }

    /// Look up the id assigned to a dotted id.
    pub fn id_of(&self, id: &str) -> Option<ComponentId> {
        self.by_id.get(id).copied()
    }

    pub fn component(&self, id: ComponentId) -> &Component {
        &self.components[id.index()]
    }

    /// A declaration handle on a frozen component. Every change through it
    /// fails with a protection error.
    pub fn component_mut(&mut self, id: &str) -> Option<ComponentHandle<'_>> {
        let component_id = *self.by_id.get(id)?;
        Some(ComponentHandle::new(&mut self.components[component_id.index()]))
    }

    /// All components, declared ones first, then placeholders.
    pub fn iter(&self) -> impl Iterator<Item = &Component> + '_ {
        self.components.iter()
    }

    pub fn ids(&self) -> impl Iterator<Item = ComponentId> + '_ {
        (0..self.components.len()).map(|index| ComponentId::new(index as u32))
    }

    pub fn len(&self) -> usize {
        self.components.len()
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    /// Components no other component depends on.
    pub fn roots(&self) -> Vec<ComponentId> {
        let targeted = self.dependency_targets();
        self.ids().filter(|id| !targeted.contains(id)).collect()
    }

    /// Every component ordered so dependencies come before dependents.
    ///
    /// Parents otherwise come before their children. When a parent depends
    /// on one of its children the dependency wins and the child comes first.
    pub fn load_order(&self) -> Vec<ComponentId> {
        let mut order = Vec::with_capacity(self.components.len());
        let mut seen = vec![false; self.components.len()];
        for id in self.ids() {
            if self.component(id).parent.is_none() {
                self.visit_in_load_order(id, &mut seen, &mut order);
            }
        }
        order
    }

    fn visit_in_load_order(&self, id: ComponentId, seen: &mut [bool], order: &mut Vec<ComponentId>) {
        if seen[id.index()] {
            return;
        }
        seen[id.index()] = true;
        let component = self.component(id);
        for &dependency in &component.dependencies {
            self.visit_in_load_order(dependency, seen, order);
        }
        order.push(id);
        for &child in &component.children {
            self.visit_in_load_order(child, seen, order);
        }
    }

    fn dependency_targets(&self) -> FxHashSet<ComponentId> {
        self.components
            .iter()
            .flat_map(|component| component.dependencies.iter().copied())
            .collect()
    }

    /// Search for a cycle from every root component, then from anything left
    /// unvisited (a cycle with no entry point has no root).
    fn ensure_no_circular_dependencies(&self) -> Result<(), ConfigError> {
        let targeted = self.dependency_targets();
        let roots = self
            .ids()
            .filter(|id| !targeted.contains(id))
            .chain(self.ids().filter(|id| targeted.contains(id)));

        let mut completed = vec![false; self.components.len()];
        for root in roots {
            if !completed[root.index()] {
                self.search_for_cycle(root, &mut completed)?;
            }
        }
        Ok(())
    }

    /// Iterative depth-first search from `root` with a fresh visiting path.
    fn search_for_cycle(&self, root: ComponentId, completed: &mut [bool]) -> Result<(), ConfigError> {
        let mut visiting: FxHashSet<ComponentId> = FxHashSet::default();
        let mut path: Vec<(ComponentId, usize)> = vec![(root, 0)];
        visiting.insert(root);

        while let Some(top) = path.last_mut() {
            let (node, cursor) = *top;
            let dependencies = &self.component(node).dependencies;
            if let Some(&next) = dependencies.get(cursor) {
                top.1 += 1;
                if completed[next.index()] {
                    continue;
                }
                if visiting.contains(&next) {
                    return Err(self.cycle_error(&path, next));
                }
                visiting.insert(next);
                path.push((next, 0));
            } else {
                path.pop();
                visiting.remove(&node);
                completed[node.index()] = true;
            }
        }
        Ok(())
    }

    fn cycle_error(&self, path: &[(ComponentId, usize)], repeated: ComponentId) -> ConfigError {
        let start = path.iter().position(|&(id, _)| id == repeated).unwrap_or(0);
        let cycle = path[start..]
            .iter()
            .map(|&(id, _)| self.component(id).id.clone())
            .chain(std::iter::once(self.component(repeated).id.clone()))
            .collect();
        ConfigError::CircularDependency {
            component: self.component(repeated).id.clone(),
            cycle,
        }
    }
}
