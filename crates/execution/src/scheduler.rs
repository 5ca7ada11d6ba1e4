//! Level scheduling over a task graph.
//!
//! All functions here are pure reads of an immutable [`TaskGraph`] plus a
//! status snapshot; concurrent callers never need coordination.

use std::collections::{HashMap, HashSet};

use archon_core::{TaskId, TaskStatus};
use serde::Serialize;
use tracing::debug;

use crate::graph::TaskGraph;

/// Hours assumed for a task without an estimate in [`estimate_completion_hours`].
pub const DEFAULT_TASK_HOURS: f64 = 1.0;

/// Longest dependency chain by estimated duration.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CriticalPath {
    /// Tasks on the path, first dependency first
    pub tasks: Vec<TaskId>,
    /// Sum of the estimated hours along the path
    pub total_hours: f64,
}

/// Summary numbers for a graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct GraphStats {
    /// Number of tasks
    pub total_tasks: usize,
    /// Number of dependency edges
    pub total_dependencies: usize,
    /// Number of levels
    pub levels: usize,
    /// Widest level
    pub max_parallelism: usize,
}

/// Group tasks into levels.
///
/// Level 0 holds the tasks without dependencies; every other task sits one
/// level above its deepest dependency. Tasks within a level are ascending
/// by id, and every task appears exactly once.
pub fn get_levels(graph: &TaskGraph) -> Vec<Vec<TaskId>> {
    let depths = depths(graph);
    let mut levels: Vec<Vec<TaskId>> = Vec::new();
    // ids() is ascending, so each level comes out sorted
    for id in graph.ids() {
        let depth = depths.get(id).copied().unwrap_or(0);
        if levels.len() <= depth {
            levels.resize_with(depth + 1, Vec::new);
        }
        levels[depth].push(id.clone());
    }
    levels
}

fn depths(graph: &TaskGraph) -> HashMap<TaskId, usize> {
    let mut depths: HashMap<TaskId, usize> = HashMap::with_capacity(graph.len());
    for id in graph.topological_order() {
        let depth = graph
            .dependencies_of(&id)
            .iter()
            .filter_map(|dep| depths.get(dep))
            .map(|d| d + 1)
            .max()
            .unwrap_or(0);
        depths.insert(id, depth);
    }
    depths
}

fn status_of(graph: &TaskGraph, statuses: &HashMap<TaskId, TaskStatus>, id: &TaskId) -> Option<TaskStatus> {
    statuses
        .get(id)
        .copied()
        .or_else(|| graph.task(id).map(|t| t.status))
}

/// Tasks that may start now: not yet started, with every dependency completed.
///
/// Tasks absent from `statuses` use the status stored on the task itself.
/// The result is ascending by id.
pub fn get_executable_tasks(graph: &TaskGraph, statuses: &HashMap<TaskId, TaskStatus>) -> Vec<TaskId> {
    graph
        .ids()
        .filter(|id| status_of(graph, statuses, id).is_some_and(|s| s.is_startable()))
        .filter(|id| {
            graph
                .dependencies_of(id)
                .iter()
                .all(|dep| status_of(graph, statuses, dep) == Some(TaskStatus::Completed))
        })
        .cloned()
        .collect()
}

/// Tasks with a failed task somewhere among their transitive dependencies.
pub fn failed_ancestry(graph: &TaskGraph, statuses: &HashMap<TaskId, TaskStatus>) -> HashSet<TaskId> {
    let mut tainted = HashSet::new();
    for id in graph.topological_order() {
        let hit = graph.dependencies_of(&id).iter().any(|dep| {
            tainted.contains(dep) || status_of(graph, statuses, dep) == Some(TaskStatus::Failed)
        });
        if hit {
            tainted.insert(id);
        }
    }
    tainted
}

/// Unfinished tasks that cannot run because an upstream task failed, ascending.
pub fn blocked_by_failure(graph: &TaskGraph, statuses: &HashMap<TaskId, TaskStatus>) -> Vec<TaskId> {
    let tainted = failed_ancestry(graph, statuses);
    graph
        .ids()
        .filter(|id| tainted.contains(*id))
        .filter(|id| {
            matches!(
                status_of(graph, statuses, id),
                Some(TaskStatus::Pending | TaskStatus::Ready | TaskStatus::Blocked)
            )
        })
        .cloned()
        .collect()
}

fn hours(graph: &TaskGraph, id: &TaskId) -> Option<f64> {
    graph
        .task(id)
        .and_then(|t| t.context.estimated_hours)
        .filter(|h| h.is_finite() && *h >= 0.0)
}

/// The dependency chain with the largest total estimated duration.
///
/// Tasks without an estimate count as zero hours. Equal-length chains are
/// broken toward the smaller task ids.
pub fn critical_path(graph: &TaskGraph) -> CriticalPath {
    let mut finish: HashMap<TaskId, f64> = HashMap::with_capacity(graph.len());
    let mut previous: HashMap<TaskId, TaskId> = HashMap::new();

    for id in graph.topological_order() {
        let own = hours(graph, &id).unwrap_or_else(|| {
            debug!("Task {} has no estimate, counted as 0h", id);
            0.0
        });

        let mut best: Option<(&TaskId, f64)> = None;
        for dep in graph.dependencies_of(&id) {
            let Some(&dep_finish) = finish.get(dep) else { continue };
            best = match best {
                Some((b, f)) if f > dep_finish || (f == dep_finish && b < dep) => Some((b, f)),
                _ => Some((dep, dep_finish)),
            };
        }

        let start = best.map(|(_, f)| f).unwrap_or(0.0);
        if let Some((dep, _)) = best {
            previous.insert(id.clone(), dep.clone());
        }
        finish.insert(id, start + own);
    }

    // ids() is ascending, so a strict comparison keeps the smallest id on ties
    let mut end: Option<(&TaskId, f64)> = None;
    for id in graph.ids() {
        let Some(&f) = finish.get(id) else { continue };
        if end.map_or(true, |(_, best)| f > best) {
            end = Some((id, f));
        }
    }

    let Some((end, total_hours)) = end else {
        return CriticalPath::default();
    };

    let mut tasks = vec![end.clone()];
    let mut cursor = end;
    while let Some(prev) = previous.get(cursor) {
        tasks.push(prev.clone());
        cursor = prev;
    }
    tasks.reverse();

    CriticalPath { tasks, total_hours }
}

/// Wall-clock estimate when every level runs fully in parallel.
///
/// Each level costs as much as its longest task. Tasks without an estimate
/// count as [`DEFAULT_TASK_HOURS`].
pub fn estimate_completion_hours(graph: &TaskGraph) -> f64 {
    get_levels(graph)
        .iter()
        .map(|level| {
            level
                .iter()
                .map(|id| hours(graph, id).unwrap_or(DEFAULT_TASK_HOURS))
                .fold(0.0, f64::max)
        })
        .sum()
}

/// Summary numbers for `graph`.
pub fn graph_stats(graph: &TaskGraph) -> GraphStats {
    let levels = get_levels(graph);
    GraphStats {
        total_tasks: graph.len(),
        total_dependencies: graph.edge_count(),
        levels: levels.len(),
        max_parallelism: levels.iter().map(Vec::len).max().unwrap_or(0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::build_graph;
    use archon_core::Task;

    fn t(id: &str, deps: &[&str], hours: Option<f64>) -> Task {
        let task = Task::new(id, format!("task {id}")).with_dependencies(deps.iter().copied());
        match hours {
            Some(h) => task.with_estimated_hours(h),
            None => task,
        }
    }

    fn ids(list: &[&str]) -> Vec<TaskId> {
        list.iter().map(|s| TaskId::from(*s)).collect()
    }

    fn diamond() -> TaskGraph {
        build_graph(vec![
            t("A", &[], Some(2.0)),
            t("B", &["A"], Some(3.0)),
            t("C", &["A"], Some(1.0)),
            t("D", &["B", "C"], Some(4.0)),
        ])
        .unwrap()
    }

    fn statuses(pairs: &[(&str, TaskStatus)]) -> HashMap<TaskId, TaskStatus> {
        pairs.iter().map(|(id, s)| (TaskId::from(*id), *s)).collect()
    }

    #[test]
    fn test_diamond_levels() {
        let levels = get_levels(&diamond());
        assert_eq!(levels, vec![ids(&["A"]), ids(&["B", "C"]), ids(&["D"])]);
    }

    #[test]
    fn test_levels_cover_every_task_once() {
        let graph = build_graph(vec![
            t("e", &["a"], None),
            t("d", &["c", "a"], None),
            t("c", &["b"], None),
            t("b", &["a"], None),
            t("a", &[], None),
            t("f", &[], None),
        ])
        .unwrap();
        let levels = get_levels(&graph);

        let mut seen: Vec<TaskId> = levels.iter().flatten().cloned().collect();
        seen.sort();
        assert_eq!(seen, graph.ids().cloned().collect::<Vec<_>>());

        let level_of = |id: &TaskId| levels.iter().position(|l| l.contains(id)).unwrap();
        for task in graph.tasks() {
            for dep in graph.dependencies_of(&task.id) {
                assert!(level_of(dep) < level_of(&task.id));
            }
        }
        assert_eq!(levels[0], ids(&["a", "f"]));
        assert_eq!(levels[3], ids(&["d"]));
    }

    #[test]
    fn test_empty_graph() {
        let graph = build_graph(Vec::new()).unwrap();
        assert!(get_levels(&graph).is_empty());
        assert_eq!(critical_path(&graph), CriticalPath::default());
        assert_eq!(estimate_completion_hours(&graph), 0.0);
        assert!(get_executable_tasks(&graph, &HashMap::new()).is_empty());
    }

    #[test]
    fn test_executable_tasks_follow_completion() {
        let graph = diamond();

        assert_eq!(get_executable_tasks(&graph, &HashMap::new()), ids(&["A"]));

        let s = statuses(&[("A", TaskStatus::Completed)]);
        assert_eq!(get_executable_tasks(&graph, &s), ids(&["B", "C"]));

        let s = statuses(&[
            ("A", TaskStatus::Completed),
            ("B", TaskStatus::Completed),
            ("C", TaskStatus::InProgress),
        ]);
        assert!(get_executable_tasks(&graph, &s).is_empty());

        let s = statuses(&[
            ("A", TaskStatus::Completed),
            ("B", TaskStatus::Completed),
            ("C", TaskStatus::Completed),
        ]);
        assert_eq!(get_executable_tasks(&graph, &s), ids(&["D"]));
    }

    #[test]
    fn test_ready_counts_as_startable() {
        let graph = diamond();
        let s = statuses(&[("A", TaskStatus::Completed), ("B", TaskStatus::Ready)]);
        assert_eq!(get_executable_tasks(&graph, &s), ids(&["B", "C"]));
    }

    #[test]
    fn test_executable_tasks_never_include_unfinished_dependencies() {
        let graph = diamond();
        let all = [
            TaskStatus::Pending,
            TaskStatus::Ready,
            TaskStatus::InProgress,
            TaskStatus::Blocked,
            TaskStatus::Completed,
            TaskStatus::Failed,
        ];
        for a in all {
            for b in all {
                let s = statuses(&[("A", TaskStatus::Completed), ("B", a), ("C", b)]);
                for id in get_executable_tasks(&graph, &s) {
                    assert!(s.get(&id).map_or(true, |st| st.is_startable()));
                    for dep in graph.dependencies_of(&id) {
                        assert_eq!(s.get(dep), Some(&TaskStatus::Completed));
                    }
                }
            }
        }
    }

    #[test]
    fn test_failure_blocks_downstream() {
        let graph = diamond();
        let s = statuses(&[("A", TaskStatus::Completed), ("B", TaskStatus::Failed)]);
        assert_eq!(blocked_by_failure(&graph, &s), ids(&["D"]));
        assert_eq!(get_executable_tasks(&graph, &s), ids(&["C"]));

        let s = statuses(&[("A", TaskStatus::Failed)]);
        assert_eq!(blocked_by_failure(&graph, &s), ids(&["B", "C", "D"]));
    }

    #[test]
    fn test_critical_path_of_diamond() {
        let path = critical_path(&diamond());
        assert_eq!(path.tasks, ids(&["A", "B", "D"]));
        assert_eq!(path.total_hours, 9.0);
    }

    #[test]
    fn test_critical_path_missing_estimates_count_zero() {
        let graph = build_graph(vec![
            t("a", &[], None),
            t("b", &["a"], Some(1.5)),
            t("c", &[], Some(1.0)),
        ])
        .unwrap();
        let path = critical_path(&graph);
        assert_eq!(path.tasks, ids(&["a", "b"]));
        assert_eq!(path.total_hours, 1.5);
    }

    #[test]
    fn test_critical_path_tie_prefers_smaller_ids() {
        let graph = build_graph(vec![
            t("x", &[], Some(1.0)),
            t("y", &[], Some(1.0)),
            t("z", &["y", "x"], Some(1.0)),
        ])
        .unwrap();
        assert_eq!(critical_path(&graph).tasks, ids(&["x", "z"]));
    }

    #[test]
    fn test_completion_estimate_is_sum_of_level_maxima() {
        // levels: [A=2], [B=3, C=1], [D=4]
        assert_eq!(estimate_completion_hours(&diamond()), 9.0);

        let graph = build_graph(vec![t("a", &[], None), t("b", &[], Some(0.5))]).unwrap();
        assert_eq!(estimate_completion_hours(&graph), DEFAULT_TASK_HOURS);
    }

    #[test]
    fn test_graph_stats() {
        let stats = graph_stats(&diamond());
        assert_eq!(
            stats,
            GraphStats {
                total_tasks: 4,
                total_dependencies: 4,
                levels: 3,
                max_parallelism: 2,
            }
        );
    }
}
