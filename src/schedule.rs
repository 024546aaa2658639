//! Schedule builder with dependency graph
//!
//! Constructs system execution schedule via topological sort, then greedily groups the
//! topological order into conflict-free stages the executor can run one stage at a time,
//! systems within a stage dispatched to the thread pool in parallel.

use rustc_hash::FxHashMap;
use std::collections::VecDeque;

use crate::error::{EngineError, Result};
use crate::system::{BoxedSystem, System, SystemAccess, SystemId};

/// System node in dependency graph.
#[derive(Debug, Clone)]
pub struct SystemNode {
    pub id: SystemId,
    pub access: SystemAccess,
}

/// Dependency graph for systems: an edge `a -> b` means `a` must complete before `b` starts,
/// derived from conflicting access declared via [`SystemAccess::conflicts_with`].
pub struct SystemGraph {
    pub nodes: Vec<SystemNode>,
    pub edges: FxHashMap<SystemId, Vec<SystemId>>,
    pub reverse_edges: FxHashMap<SystemId, Vec<SystemId>>,
}

impl SystemGraph {
    pub fn build(systems: &[BoxedSystem]) -> Self {
        let mut nodes = Vec::with_capacity(systems.len());
        let mut edges: FxHashMap<SystemId, Vec<SystemId>> = FxHashMap::default();
        let mut reverse_edges: FxHashMap<SystemId, Vec<SystemId>> = FxHashMap::default();

        for (i, system) in systems.iter().enumerate() {
            let id = SystemId(i as u32);
            let access = system.access();
            nodes.push(SystemNode { id, access });
            edges.insert(id, Vec::new());
            reverse_edges.insert(id, Vec::new());
        }

        // declaration order is preserved as a tie-break: conflicting systems are serialized
        // in the order they were declared, per §4.5.
        for i in 0..nodes.len() {
            for j in (i + 1)..nodes.len() {
                let id_a = nodes[i].id;
                let id_b = nodes[j].id;

                if nodes[i].access.conflicts_with(&nodes[j].access) {
                    edges.get_mut(&id_a).unwrap().push(id_b);
                    reverse_edges.get_mut(&id_b).unwrap().push(id_a);
                }
            }
        }

        Self { nodes, edges, reverse_edges }
    }

    /// Kahn's algorithm; returns `Err(SystemCycleDetected)` if the conflict graph has a cycle
    /// (which cannot arise from pairwise conflicts alone, but is checked defensively).
    pub fn topological_sort(&self) -> Result<Vec<SystemId>> {
        let mut in_degree: FxHashMap<SystemId, usize> = FxHashMap::default();
        let mut queue = VecDeque::new();
        let mut result = Vec::with_capacity(self.nodes.len());

        for node in &self.nodes {
            in_degree.insert(node.id, self.reverse_edges.get(&node.id).map_or(0, |v| v.len()));
        }

        for node in &self.nodes {
            if in_degree[&node.id] == 0 {
                queue.push_back(node.id);
            }
        }

        while let Some(id) = queue.pop_front() {
            result.push(id);

            if let Some(neighbors) = self.edges.get(&id) {
                for &neighbor in neighbors {
                    let degree = in_degree.get_mut(&neighbor).unwrap();
                    *degree -= 1;
                    if *degree == 0 {
                        queue.push_back(neighbor);
                    }
                }
            }
        }

        if result.len() != self.nodes.len() {
            return Err(EngineError::SystemCycleDetected);
        }

        Ok(result)
    }
}

/// A group of systems with pairwise-disjoint access that the executor may run concurrently.
#[derive(Debug, Clone, Default)]
pub struct Stage {
    pub systems: Vec<SystemId>,
}

impl Stage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn try_add(&mut self, system_id: SystemId, access: &SystemAccess, graph: &SystemGraph) -> bool {
        for &existing_id in &self.systems {
            let existing_node = graph.nodes.iter().find(|n| n.id == existing_id).unwrap();
            if access.conflicts_with(&existing_node.access) {
                return false;
            }
        }
        self.systems.push(system_id);
        true
    }
}

/// A user-declared `before`/`after` name constraint on a system (applied on top of the
/// conflict-derived ordering; violating a constraint does not itself create a conflict edge,
/// so cycles between constraints are not detected here — only genuine access conflicts are).
#[derive(Debug, Clone)]
pub struct OrderingConstraint {
    pub system_name: String,
    pub before: Vec<String>,
    pub after: Vec<String>,
}

/// A fully built, per-level execution schedule: the system list, the conflict-free stages
/// derived from it, and the raw dependency graph kept around for introspection/debugging.
pub struct Schedule {
    pub(crate) systems: Vec<BoxedSystem>,
    pub(crate) stages: Vec<Stage>,
    pub(crate) graph: Option<SystemGraph>,
    pub(crate) ordering_constraints: Vec<OrderingConstraint>,
}

impl Default for Schedule {
    fn default() -> Self {
        Self::new()
    }
}

impl Schedule {
    pub fn from_systems(systems: Vec<BoxedSystem>) -> Result<Self> {
        Self { systems, stages: Vec::new(), graph: None, ordering_constraints: Vec::new() }.build()
    }

    pub fn new() -> Self {
        Self { systems: Vec::new(), stages: Vec::new(), graph: None, ordering_constraints: Vec::new() }
    }

    pub fn with_system(mut self, system: BoxedSystem) -> Self {
        self.add_system(system);
        self
    }

    pub fn add_system(&mut self, system: BoxedSystem) {
        self.systems.push(system);
        self.invalidate();
    }

    pub fn add_system_before(&mut self, system: BoxedSystem, before: &str) {
        let system_name = system.name().to_string();
        self.systems.push(system);
        self.constraint_for(system_name).before.push(before.to_string());
        self.invalidate();
    }

    pub fn add_system_after(&mut self, system: BoxedSystem, after: &str) {
        let system_name = system.name().to_string();
        self.systems.push(system);
        self.constraint_for(system_name).after.push(after.to_string());
        self.invalidate();
    }

    fn constraint_for(&mut self, system_name: String) -> &mut OrderingConstraint {
        if let Some(idx) = self.ordering_constraints.iter().position(|c| c.system_name == system_name) {
            &mut self.ordering_constraints[idx]
        } else {
            self.ordering_constraints.push(OrderingConstraint {
                system_name,
                before: Vec::new(),
                after: Vec::new(),
            });
            self.ordering_constraints.last_mut().unwrap()
        }
    }

    fn invalidate(&mut self) {
        self.graph = None;
        self.stages.clear();
    }

    pub fn get_system_mut(&mut self, name: &str) -> Option<&mut (dyn System + 'static)> {
        self.systems.iter_mut().find(|sys| sys.name() == name).map(|sys| sys.as_mut())
    }

    pub fn build(mut self) -> Result<Self> {
        self.rebuild()?;
        Ok(self)
    }

    pub(crate) fn ensure_built(&mut self) -> Result<()> {
        if self.graph.is_none() {
            self.rebuild()?;
        }
        Ok(())
    }

    fn rebuild(&mut self) -> Result<()> {
        let graph = SystemGraph::build(&self.systems);
        let sorted = graph.topological_sort()?;

        let mut stages = Vec::new();
        let mut current_stage = Stage::new();

        for &system_id in &sorted {
            let node = graph.nodes.iter().find(|n| n.id == system_id).unwrap();

            if !current_stage.try_add(system_id, &node.access, &graph) {
                if !current_stage.systems.is_empty() {
                    stages.push(current_stage);
                    current_stage = Stage::new();
                }
                current_stage.systems.push(system_id);
            }
        }

        if !current_stage.systems.is_empty() {
            stages.push(current_stage);
        }

        self.graph = Some(graph);
        self.stages = stages;
        Ok(())
    }

    pub fn stage_count(&self) -> usize {
        self.stages.len()
    }

    pub fn stage_system_count(&self, stage_idx: usize) -> usize {
        self.stages.get(stage_idx).map_or(0, |s| s.systems.len())
    }

    pub fn system_count(&self) -> usize {
        self.systems.len()
    }

    pub(crate) fn system_mut_by_id(&mut self, id: SystemId) -> Option<&mut BoxedSystem> {
        self.systems.get_mut(id.0 as usize)
    }

    pub(crate) fn stage_plan(&self) -> Vec<&[SystemId]> {
        self.stages.iter().map(|stage| stage.systems.as_slice()).collect()
    }

    pub fn get_accesses(&self) -> Vec<SystemAccess> {
        self.systems.iter().map(|s| s.access()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Result as EngineResult;
    use crate::system::{SystemContext, SystemId};

    #[test]
    fn test_stage_creation() {
        let stage = Stage::new();
        assert_eq!(stage.systems.len(), 0);
    }

    struct MockSystem(&'static str, SystemAccess);
    impl System for MockSystem {
        fn update(&mut self, _ctx: &SystemContext) -> EngineResult<()> {
            Ok(())
        }
        fn name(&self) -> &'static str {
            self.0
        }
        fn access(&self) -> SystemAccess {
            self.1
        }
    }

    #[test]
    fn test_lazy_rebuild() {
        let mut schedule = Schedule::new();
        schedule.add_system(Box::new(MockSystem("a", SystemAccess::empty())));
        assert!(schedule.graph.is_none(), "graph should be dirty after add_system");

        schedule.ensure_built().expect("failed to build");
        assert!(schedule.graph.is_some());

        schedule.add_system(Box::new(MockSystem("b", SystemAccess::empty())));
        assert!(schedule.graph.is_none(), "graph should be invalidated after adding a system");
    }

    #[test]
    fn test_conflicting_systems_land_in_separate_stages() {
        let mut schedule = Schedule::new();
        schedule.add_system(Box::new(MockSystem("writer1", SystemAccess::empty().writing(0))));
        schedule.add_system(Box::new(MockSystem("writer2", SystemAccess::empty().writing(0))));
        schedule.ensure_built().unwrap();
        assert_eq!(schedule.stage_count(), 2);
    }

    #[test]
    fn test_disjoint_systems_share_a_stage() {
        let mut schedule = Schedule::new();
        schedule.add_system(Box::new(MockSystem("writer1", SystemAccess::empty().writing(0))));
        schedule.add_system(Box::new(MockSystem("writer2", SystemAccess::empty().writing(1))));
        schedule.ensure_built().unwrap();
        assert_eq!(schedule.stage_count(), 1);
        assert_eq!(schedule.stage_system_count(0), 2);
    }

    #[test]
    fn test_system_mut_by_id_accesses_declared_system() {
        let mut schedule = Schedule::new();
        schedule.add_system(Box::new(MockSystem("only", SystemAccess::empty())));
        let system = schedule.system_mut_by_id(SystemId(0));
        assert!(system.is_some());
    }
}
