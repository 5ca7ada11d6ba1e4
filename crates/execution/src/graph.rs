//! Task graph - turns a flat task list into a validated dependency DAG.
//!
//! A built graph is immutable. Extending it produces a new version and
//! leaves the old one untouched, so readers never observe a half-updated
//! graph.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use archon_core::{Task, TaskId};
use tracing::debug;

/// Errors that stop graph construction. No partial graph is ever returned.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GraphError {
    /// A dependency names a task that is not in the collection
    #[error("task {task} depends on unknown task {missing}")]
    DanglingDependency {
        /// Task that declared the dependency
        task: TaskId,
        /// The unknown id
        missing: TaskId,
    },

    /// The dependencies form a cycle
    #[error("cyclic dependency: {}", format_cycle(.cycle))]
    CyclicDependency {
        /// Nodes of the cycle, starting at the node that was revisited
        cycle: Vec<TaskId>,
    },

    /// Two tasks share an id
    #[error("duplicate task id: {0}")]
    DuplicateTask(TaskId),

    /// A quality threshold outside [0, 1]
    #[error("task {task} has quality threshold {threshold}, expected a value in [0, 1]")]
    InvalidQualityThreshold {
        /// Task id
        task: TaskId,
        /// The rejected threshold
        threshold: f64,
    },
}

fn format_cycle(cycle: &[TaskId]) -> String {
    let mut parts: Vec<&str> = cycle.iter().map(TaskId::as_str).collect();
    if let Some(first) = cycle.first() {
        parts.push(first.as_str());
    }
    parts.join(" -> ")
}

/// A validated, acyclic task dependency graph.
#[derive(Debug, Clone)]
pub struct TaskGraph {
    /// task id -> task
    tasks: BTreeMap<TaskId, Task>,
    /// task -> [dependencies], in declared order
    dependencies: BTreeMap<TaskId, Vec<TaskId>>,
    /// task -> [dependents], ascending
    dependents: BTreeMap<TaskId, Vec<TaskId>>,
    /// Incremented by every extension
    version: u64,
}

/// Build a validated graph from `tasks`.
pub fn build_graph(tasks: Vec<Task>) -> Result<TaskGraph, GraphError> {
    TaskGraph::build(tasks)
}

impl TaskGraph {
    /// Validate `tasks` and build the graph.
    pub fn build(tasks: Vec<Task>) -> Result<Self, GraphError> {
        let mut map = BTreeMap::new();
        insert_all(&mut map, tasks)?;
        Self::assemble(map, 0)
    }

    /// Build a new graph version containing this graph's tasks plus `new_tasks`.
    ///
    /// Existing edges are never changed. New tasks may depend on existing
    /// tasks or on each other; the whole graph is re-checked for cycles.
    pub fn extend(&self, new_tasks: Vec<Task>) -> Result<Self, GraphError> {
        let mut map = self.tasks.clone();
        insert_all(&mut map, new_tasks)?;
        Self::assemble(map, self.version + 1)
    }

    fn assemble(mut tasks: BTreeMap<TaskId, Task>, version: u64) -> Result<Self, GraphError> {
        let mut dependencies = BTreeMap::new();
        let mut dependents: BTreeMap<TaskId, Vec<TaskId>> =
            tasks.keys().map(|id| (id.clone(), Vec::new())).collect();

        for (id, task) in tasks.iter_mut() {
            dedup_in_place(&mut task.dependencies);
            for dep in &task.dependencies {
                match dependents.get_mut(dep) {
                    Some(list) => list.push(id.clone()),
                    None => {
                        return Err(GraphError::DanglingDependency {
                            task: id.clone(),
                            missing: dep.clone(),
                        })
                    }
                }
            }
            dependencies.insert(id.clone(), task.dependencies.clone());
        }

        if let Some(cycle) = find_cycle(&dependencies) {
            return Err(GraphError::CyclicDependency { cycle });
        }

        let graph = Self {
            tasks,
            dependencies,
            dependents,
            version,
        };
        debug!(
            "Built task graph v{}: {} tasks, {} edges",
            graph.version,
            graph.len(),
            graph.edge_count()
        );
        Ok(graph)
    }

    /// Look up a task.
    pub fn task(&self, id: &TaskId) -> Option<&Task> {
        self.tasks.get(id)
    }

    /// Whether the graph contains `id`.
    pub fn contains(&self, id: &TaskId) -> bool {
        self.tasks.contains_key(id)
    }

    /// All tasks, ascending by id.
    pub fn tasks(&self) -> impl Iterator<Item = &Task> {
        self.tasks.values()
    }

    /// All task ids, ascending.
    pub fn ids(&self) -> impl Iterator<Item = &TaskId> {
        self.tasks.keys()
    }

    /// Direct dependencies of a task.
    pub fn dependencies_of(&self, id: &TaskId) -> &[TaskId] {
        self.dependencies.get(id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Direct dependents of a task, ascending.
    pub fn dependents_of(&self, id: &TaskId) -> &[TaskId] {
        self.dependents.get(id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Number of tasks.
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    /// Whether the graph has no tasks.
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Number of dependency edges.
    pub fn edge_count(&self) -> usize {
        self.dependencies.values().map(Vec::len).sum()
    }

    /// Graph version; 0 for a fresh build.
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Tasks in dependency order; ready tasks are taken in ascending id order.
    pub fn topological_order(&self) -> Vec<TaskId> {
        let mut in_degree: HashMap<&TaskId, usize> = self
            .dependencies
            .iter()
            .map(|(id, deps)| (id, deps.len()))
            .collect();
        let mut ready: BTreeSet<&TaskId> = in_degree
            .iter()
            .filter(|(_, d)| **d == 0)
            .map(|(id, _)| *id)
            .collect();

        let mut order = Vec::with_capacity(self.len());
        while let Some(id) = ready.pop_first() {
            order.push(id.clone());
            for dependent in self.dependents_of(id) {
                if let Some(d) = in_degree.get_mut(dependent) {
                    *d -= 1;
                    if *d == 0 {
                        ready.insert(dependent);
                    }
                }
            }
        }
        order
    }
}

fn insert_all(map: &mut BTreeMap<TaskId, Task>, tasks: Vec<Task>) -> Result<(), GraphError> {
    for task in tasks {
        if map.contains_key(&task.id) {
            return Err(GraphError::DuplicateTask(task.id));
        }
        // NaN fails the range check too
        if !(0.0..=1.0).contains(&task.quality_threshold) {
            return Err(GraphError::InvalidQualityThreshold {
                task: task.id,
                threshold: task.quality_threshold,
            });
        }
        map.insert(task.id.clone(), task);
    }
    Ok(())
}

fn dedup_in_place(ids: &mut Vec<TaskId>) {
    let mut seen = BTreeSet::new();
    ids.retain(|id| seen.insert(id.clone()));
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    Visiting,
    Done,
}

/// Depth-first search over dependency edges, roots in ascending id order.
///
/// Returns the node sequence of the first cycle found: from the revisited
/// node along the current path.
fn find_cycle(dependencies: &BTreeMap<TaskId, Vec<TaskId>>) -> Option<Vec<TaskId>> {
    let mut marks: HashMap<&TaskId, Mark> = HashMap::new();

    for root in dependencies.keys() {
        if marks.contains_key(root) {
            continue;
        }

        // (node, index of the next dependency to visit)
        let mut stack: Vec<(&TaskId, usize)> = vec![(root, 0)];
        marks.insert(root, Mark::Visiting);

        while let Some(&(node, next)) = stack.last() {
            let deps = dependencies.get(node).map(Vec::as_slice).unwrap_or(&[]);
            let Some(dep) = deps.get(next) else {
                marks.insert(node, Mark::Done);
                stack.pop();
                continue;
            };
            if let Some(top) = stack.last_mut() {
                top.1 += 1;
            }

            match marks.get(dep) {
                Some(Mark::Visiting) => {
                    let start = stack.iter().position(|(n, _)| *n == dep).unwrap_or(0);
                    return Some(stack[start..].iter().map(|(n, _)| (*n).clone()).collect());
                }
                Some(Mark::Done) => {}
                None => {
                    marks.insert(dep, Mark::Visiting);
                    stack.push((dep, 0));
                }
            }
        }
    }

    None
}
