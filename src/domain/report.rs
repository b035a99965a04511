//! Read-only queries over an engine
//!
//! Nothing here mutates the engine; calling any query twice without an
//! intervening transition returns the same answer.
//!
//! The dependency analysis (critical path, bottlenecks, parallel phases)
//! only looks at remaining work: tasks that read as DONE or CANCELLED drop
//! out of every chain.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt::Write as _;

use serde::Serialize;

use super::engine::{Engine, EngineError};
use super::graph::resolve_finder;
use super::id::TaskId;
use super::readiness::EffectiveStatus;
use super::task::{Task, TaskState};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EdgeKind {
    /// `from` waits on `to`
    Blocks,
    /// `from`'s trigger acts on `to`
    Triggers,
    /// `from` is the parent of `to`
    Parent,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GraphNode {
    pub id: TaskId,
    pub heading: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<TaskState>,
    pub status: EffectiveStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct GraphEdge {
    pub from: TaskId,
    pub to: TaskId,
    pub kind: EdgeKind,
    pub label: String,
}

/// Neighbourhood of one task, for display and export
#[derive(Debug, Clone, Serialize)]
pub struct DependencyGraph {
    pub root: TaskId,
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<GraphEdge>,
    /// Blocking cycle the root lies on or reaches
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cycle: Option<Vec<TaskId>>,
}

impl DependencyGraph {
    /// Renders the graph in Graphviz DOT format
    pub fn to_dot(&self) -> String {
        let mut out = String::from("digraph tasks {\n    rankdir=LR;\n    node [shape=box, style=filled];\n");

        for node in &self.nodes {
            let fill = match node.status {
                EffectiveStatus::State(TaskState::Done) => "palegreen",
                EffectiveStatus::State(TaskState::Next) => "orange",
                EffectiveStatus::State(TaskState::InProgress) => "yellow",
                EffectiveStatus::Ready => "lightblue",
                _ => "white",
            };
            let mut attrs = format!(
                "label=\"{}\\n{}\\n[{}]\", fillcolor={}",
                escape(node.id.as_str()),
                escape(&node.heading),
                node.status,
                fill
            );
            if node.id == self.root {
                attrs.push_str(", penwidth=2");
            }
            let _ = writeln!(out, "    \"{}\" [{}];", escape(node.id.as_str()), attrs);
        }

        for edge in &self.edges {
            let (style, color) = match edge.kind {
                EdgeKind::Blocks => ("solid", "red"),
                EdgeKind::Triggers => ("dashed", "darkgreen"),
                EdgeKind::Parent => ("dotted", "blue"),
            };
            let _ = writeln!(
                out,
                "    \"{}\" -> \"{}\" [label=\"{}\", style={}, color={}];",
                escape(edge.from.as_str()),
                escape(edge.to.as_str()),
                escape(&edge.label),
                style,
                color
            );
        }

        out.push_str("}\n");
        out
    }
}

fn escape(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"")
}

/// Corpus-wide counts
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Summary {
    pub total: usize,
    pub by_state: BTreeMap<TaskState, usize>,
    pub by_status: BTreeMap<EffectiveStatus, usize>,
    pub containers: usize,
    pub invalid_declarations: usize,
    pub cycles: usize,
}

/// How much remaining work waits on one task
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Bottleneck {
    pub id: TaskId,
    pub heading: String,
    pub status: EffectiveStatus,
    /// Tasks whose blocker names this task
    pub direct: usize,
    /// Tasks that wait on it through any chain
    pub transitive: usize,
}

/// Corpus-wide dependency analysis
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Analysis {
    /// Longest blocking chain, first prerequisite first
    pub critical_path: Vec<TaskId>,
    pub bottlenecks: Vec<Bottleneck>,
    /// Open leaf tasks grouped so each group only waits on earlier ones
    pub phases: Vec<Vec<TaskId>>,
}

impl Engine {
    /// READY tasks, highest priority first, then by ID
    pub fn actionable_tasks(&self) -> Vec<&Task> {
        let mut ready: Vec<&Task> = self
            .store()
            .all()
            .filter(|t| self.effective_status(&t.id) == Some(EffectiveStatus::Ready))
            .collect();

        ready.sort_by(|a, b| {
            let rank = |t: &Task| t.priority.map_or(u16::MAX, |p| u16::from(p.rank()));
            rank(a).cmp(&rank(b)).then_with(|| a.id.cmp(&b.id))
        });
        ready
    }

    /// READY tasks within the subtree rooted at `project`
    pub fn actionable_tasks_in(&self, project: &TaskId) -> Result<Vec<&Task>, EngineError> {
        self.require(project)?;
        let mut scope: HashSet<TaskId> = self.store().descendants(project).into_iter().collect();
        scope.insert(project.clone());

        Ok(self
            .actionable_tasks()
            .into_iter()
            .filter(|t| scope.contains(&t.id))
            .collect())
    }

    /// Blocking dependencies of `id` (transitively), the tasks waiting on it,
    /// its trigger targets and its place in the hierarchy
    pub fn dependency_graph(&self, id: &TaskId) -> Result<DependencyGraph, EngineError> {
        let root = self.require(id)?;
        let graph = self.blocking_graph();

        let mut members: HashSet<TaskId> = graph.reachable_from(id);
        members.insert(id.clone());

        let mut edges: Vec<GraphEdge> = Vec::new();
        let mut seen: HashSet<GraphEdge> = HashSet::new();
        let mut push = |edge: GraphEdge, edges: &mut Vec<GraphEdge>| {
            if seen.insert(edge.clone()) {
                edges.push(edge);
            }
        };

        for task in self.store().all().filter(|t| members.contains(&t.id)) {
            for edge in graph.edges_from(&task.id) {
                push(blocks(edge.from, edge.to, edge.clause), &mut edges);
            }
        }

        let mut extra: Vec<TaskId> = Vec::new();

        for dependent in graph.dependents(id) {
            for edge in graph.edges_from(&dependent).into_iter().filter(|e| &e.to == id) {
                push(blocks(edge.from, edge.to, edge.clause), &mut edges);
            }
            extra.push(dependent);
        }

        if let Some(Some(Ok(trigger))) = self.declarations(id).map(|d| d.trigger.as_ref()) {
            for clause in &trigger.clauses {
                let label = clause.op.to_string();
                for target in resolve_finder(self.store(), id, &clause.finder).found {
                    push(
                        GraphEdge {
                            from: id.clone(),
                            to: target.clone(),
                            kind: EdgeKind::Triggers,
                            label: label.clone(),
                        },
                        &mut edges,
                    );
                    extra.push(target);
                }
            }
        }

        if let Some(parent) = &root.parent_id {
            push(parent_edge(parent, id), &mut edges);
            extra.push(parent.clone());
        }
        for child in self.store().child_ids(id) {
            push(parent_edge(id, child), &mut edges);
            extra.push(child.clone());
        }

        members.extend(extra);

        let mut nodes = vec![self.node(root)];
        nodes.extend(
            self.store()
                .all()
                .filter(|t| &t.id != id && members.contains(&t.id))
                .map(|t| self.node(t)),
        );

        let cycle = match self.check_cycles(id) {
            Err(EngineError::CycleDetected { path }) => Some(path),
            _ => None,
        };

        Ok(DependencyGraph {
            root: id.clone(),
            nodes,
            edges,
            cycle,
        })
    }

    fn is_remaining(&self, id: &TaskId) -> bool {
        self.store()
            .derived_state(id)
            .is_some_and(|state| !state.is_closed())
    }

    fn first_cycle(&self) -> EngineError {
        EngineError::CycleDetected {
            path: self.cycles().first().cloned().unwrap_or_default(),
        }
    }

    /// Longest chain of remaining tasks linked by blocking edges
    pub fn critical_path(&self) -> Result<Vec<TaskId>, EngineError> {
        self.blocking_graph()
            .longest_chain(|id| self.is_remaining(id))
            .ok_or_else(|| self.first_cycle())
    }

    /// Remaining tasks that others wait on, most transitive dependents first
    ///
    /// Ties break on direct dependents, then on ID. At most `limit` entries.
    pub fn bottlenecks(&self, limit: usize) -> Vec<Bottleneck> {
        let graph = self.blocking_graph();

        let mut out: Vec<Bottleneck> = self
            .store()
            .all()
            .filter(|t| self.is_remaining(&t.id))
            .filter_map(|task| {
                let direct = graph
                    .dependents(&task.id)
                    .iter()
                    .filter(|d| self.is_remaining(d))
                    .count();
                if direct == 0 {
                    return None;
                }
                let transitive = graph
                    .transitive_dependents(&task.id)
                    .iter()
                    .filter(|d| self.is_remaining(d))
                    .count();
                Some(Bottleneck {
                    id: task.id.clone(),
                    heading: task.heading.clone(),
                    status: self
                        .effective_status(&task.id)
                        .unwrap_or(EffectiveStatus::Container),
                    direct,
                    transitive,
                })
            })
            .collect();

        out.sort_by(|a, b| {
            b.transitive
                .cmp(&a.transitive)
                .then_with(|| b.direct.cmp(&a.direct))
                .then_with(|| a.id.cmp(&b.id))
        });
        out.truncate(limit);
        out
    }

    /// Open leaf tasks grouped into phases that can run in parallel
    ///
    /// Phase N holds the tasks whose longest chain of remaining dependencies
    /// has N links. Each phase is sorted by ID.
    pub fn parallel_phases(&self) -> Result<Vec<Vec<TaskId>>, EngineError> {
        let levels: HashMap<TaskId, usize> = self
            .blocking_graph()
            .levels(|id| self.is_remaining(id))
            .ok_or_else(|| self.first_cycle())?;

        let mut phases: BTreeMap<usize, Vec<TaskId>> = BTreeMap::new();
        for task in self.store().all() {
            let open = task.state.is_some_and(TaskState::is_open);
            if !open || task.is_container() || !self.store().is_leaf(&task.id) {
                continue;
            }
            if let Some(&level) = levels.get(&task.id) {
                phases.entry(level).or_default().push(task.id.clone());
            }
        }

        Ok(phases
            .into_values()
            .map(|mut phase| {
                phase.sort();
                phase
            })
            .collect())
    }

    /// Critical path, top `limit` bottlenecks and parallel phases together
    pub fn analysis(&self, limit: usize) -> Result<Analysis, EngineError> {
        Ok(Analysis {
            critical_path: self.critical_path()?,
            bottlenecks: self.bottlenecks(limit),
            phases: self.parallel_phases()?,
        })
    }

    fn node(&self, task: &Task) -> GraphNode {
        GraphNode {
            id: task.id.clone(),
            heading: task.heading.clone(),
            state: task.state,
            status: self
                .effective_status(&task.id)
                .unwrap_or(EffectiveStatus::Container),
        }
    }

    pub fn summary(&self) -> Summary {
        let mut by_state: BTreeMap<TaskState, usize> =
            TaskState::ALL.iter().map(|s| (*s, 0)).collect();
        let mut by_status: BTreeMap<EffectiveStatus, usize> = BTreeMap::new();
        let mut containers = 0;

        for task in self.store().all() {
            match task.state {
                Some(state) if !task.is_container() => *by_state.entry(state).or_default() += 1,
                _ => containers += 1,
            }
            if let Some(status) = self.effective_status(&task.id) {
                *by_status.entry(status).or_default() += 1;
            }
        }

        Summary {
            total: self.store().len(),
            by_state,
            by_status,
            containers,
            invalid_declarations: self.invalid_declarations().len(),
            cycles: self.cycles().len(),
        }
    }
}

fn blocks(from: TaskId, to: TaskId, clause: String) -> GraphEdge {
    GraphEdge {
        from,
        to,
        kind: EdgeKind::Blocks,
        label: clause,
    }
}

fn parent_edge(parent: &TaskId, child: &TaskId) -> GraphEdge {
    GraphEdge {
        from: parent.clone(),
        to: child.clone(),
        kind: EdgeKind::Parent,
        label: String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::task::{Priority, TaskRecord};

    fn id(s: &str) -> TaskId {
        s.parse().unwrap()
    }

    fn ids(tasks: &[&Task]) -> Vec<String> {
        tasks.iter().map(|t| t.id.to_string()).collect()
    }

    #[test]
    fn actionable_sorted_by_priority_then_id() {
        let engine = Engine::new([
            TaskRecord::new(id("D"), "d"),
            TaskRecord::new(id("C"), "c").with_priority(Priority::Number(1)),
            TaskRecord::new(id("B"), "b").with_priority(Priority::Letter(0)),
            TaskRecord::new(id("A"), "a"),
            TaskRecord::new(id("W"), "w").with_blocker("ids(A) todo?(DONE)"),
        ])
        .unwrap();

        assert_eq!(ids(&engine.actionable_tasks()), ["B", "C", "A", "D"]);
    }

    #[test]
    fn actionable_is_idempotent() {
        let engine = Engine::new([
            TaskRecord::new(id("A"), "a"),
            TaskRecord::new(id("B"), "b").with_blocker("ids(A)"),
        ])
        .unwrap();

        assert_eq!(ids(&engine.actionable_tasks()), ids(&engine.actionable_tasks()));
    }

    #[test]
    fn actionable_within_project() {
        let engine = Engine::new([
            TaskRecord::container(id("P"), "p"),
            TaskRecord::new(id("A"), "a").with_parent(id("P")),
            TaskRecord::new(id("B"), "b"),
        ])
        .unwrap();

        assert_eq!(ids(&engine.actionable_tasks_in(&id("P")).unwrap()), ["A"]);
        assert!(engine.actionable_tasks_in(&id("NOPE")).is_err());
    }

    #[test]
    fn non_leaf_never_actionable() {
        let engine = Engine::new([
            TaskRecord::new(id("P"), "p").with_blocker("children todo?(DONE)"),
            TaskRecord::new(id("C1"), "c1").with_parent(id("P")),
            TaskRecord::new(id("C2"), "c2").with_parent(id("P")),
        ])
        .unwrap();

        assert_eq!(ids(&engine.actionable_tasks()), ["C1", "C2"]);
    }

    #[test]
    fn dependency_graph_collects_neighbourhood() {
        let engine = Engine::new([
            TaskRecord::container(id("G"), "goal"),
            TaskRecord::new(id("A"), "a").with_parent(id("G")),
            TaskRecord::new(id("B"), "b")
                .with_parent(id("G"))
                .with_blocker("ids(A) todo?(DONE)")
                .with_trigger("ids(D) todo!(NEXT)"),
            TaskRecord::new(id("C"), "c").with_blocker("ids(B)"),
            TaskRecord::new(id("D"), "d"),
            TaskRecord::new(id("UNRELATED"), "u"),
        ])
        .unwrap();

        let graph = engine.dependency_graph(&id("B")).unwrap();

        assert_eq!(graph.nodes[0].id, id("B"));
        let node_ids: HashSet<_> = graph.nodes.iter().map(|n| n.id.to_string()).collect();
        assert_eq!(node_ids, ["A", "B", "C", "D", "G"].iter().map(|s| s.to_string()).collect());

        let kinds: Vec<_> = graph
            .edges
            .iter()
            .map(|e| (e.from.as_str(), e.to.as_str(), e.kind))
            .collect();
        assert!(kinds.contains(&("B", "A", EdgeKind::Blocks)));
        assert!(kinds.contains(&("C", "B", EdgeKind::Blocks)));
        assert!(kinds.contains(&("B", "D", EdgeKind::Triggers)));
        assert!(kinds.contains(&("G", "B", EdgeKind::Parent)));
        assert!(graph.cycle.is_none());
    }

    #[test]
    fn dependency_graph_unknown_id() {
        let engine = Engine::new([TaskRecord::new(id("A"), "a")]).unwrap();
        assert_eq!(
            engine.dependency_graph(&id("NOPE")).unwrap_err(),
            EngineError::UnknownTaskId(id("NOPE"))
        );
    }

    #[test]
    fn dependency_graph_flags_cycle() {
        let engine = Engine::new([
            TaskRecord::new(id("A"), "a").with_blocker("ids(B)"),
            TaskRecord::new(id("B"), "b").with_blocker("ids(A)"),
        ])
        .unwrap();

        let graph = engine.dependency_graph(&id("A")).unwrap();
        let cycle = graph.cycle.unwrap();
        assert!(cycle.contains(&id("A")) && cycle.contains(&id("B")));
    }

    #[test]
    fn dot_export() {
        let engine = Engine::new([
            TaskRecord::new(id("A"), "say \"hi\""),
            TaskRecord::new(id("B"), "b").with_blocker("ids(A) todo?(DONE)"),
        ])
        .unwrap();

        let dot = engine.dependency_graph(&id("B")).unwrap().to_dot();
        assert!(dot.starts_with("digraph tasks {"));
        assert!(dot.contains("\"B\" -> \"A\" [label=\"ids(A) todo?(DONE)\", style=solid, color=red];"));
        assert!(dot.contains("fillcolor=lightblue"));
        assert!(dot.contains("say \\\"hi\\\""));
        assert!(dot.trim_end().ends_with('}'));
    }

    fn pipeline() -> Engine {
        Engine::new([
            TaskRecord::new(id("SPEC"), "spec").with_state(TaskState::Done),
            TaskRecord::new(id("API"), "api").with_blocker("ids(SPEC) todo?(DONE)"),
            TaskRecord::new(id("DB"), "db"),
            TaskRecord::new(id("SVC"), "svc").with_blocker("ids(API DB) todo?(DONE)"),
            TaskRecord::new(id("UI"), "ui").with_blocker("ids(API) todo?(DONE)"),
            TaskRecord::new(id("E2E"), "e2e").with_blocker("ids(SVC UI) todo?(DONE)"),
            TaskRecord::new(id("DOCS"), "docs"),
        ])
        .unwrap()
    }

    fn strs(ids: &[TaskId]) -> Vec<&str> {
        ids.iter().map(TaskId::as_str).collect()
    }

    #[test]
    fn critical_path_skips_closed_work() {
        let engine = pipeline();
        assert_eq!(strs(&engine.critical_path().unwrap()), ["API", "SVC", "E2E"]);
    }

    #[test]
    fn bottlenecks_rank_by_transitive_dependents() {
        let engine = pipeline();
        let bottlenecks = engine.bottlenecks(10);

        let ranked: Vec<_> = bottlenecks
            .iter()
            .map(|b| (b.id.as_str(), b.direct, b.transitive))
            .collect();
        assert_eq!(
            ranked,
            [("API", 2, 3), ("DB", 1, 2), ("SVC", 1, 1), ("UI", 1, 1)]
        );
        assert_eq!(bottlenecks[0].status, EffectiveStatus::Ready);

        assert_eq!(engine.bottlenecks(1).len(), 1);
    }

    #[test]
    fn parallel_phases_group_open_leaves() {
        let engine = pipeline();
        let phases = engine.parallel_phases().unwrap();

        let phases: Vec<Vec<&str>> = phases.iter().map(|p| strs(p)).collect();
        assert_eq!(
            phases,
            vec![vec!["API", "DB", "DOCS"], vec!["SVC", "UI"], vec!["E2E"]]
        );
    }

    #[test]
    fn analysis_fails_on_cycle() {
        let engine = Engine::new([
            TaskRecord::new(id("A"), "a").with_blocker("ids(B)"),
            TaskRecord::new(id("B"), "b").with_blocker("ids(A)"),
        ])
        .unwrap();

        assert!(matches!(
            engine.analysis(10),
            Err(EngineError::CycleDetected { path }) if path.contains(&id("A"))
        ));
        assert!(engine.parallel_phases().is_err());
        assert_eq!(engine.bottlenecks(10).len(), 2);
    }

    #[test]
    fn summary_counts() {
        let mut engine = Engine::new([
            TaskRecord::container(id("G"), "goal"),
            TaskRecord::new(id("A"), "a").with_parent(id("G")),
            TaskRecord::new(id("B"), "b").with_parent(id("G")).with_blocker("ids(A)"),
            TaskRecord::new(id("Y"), "y").with_blocker("blokcer(typo"),
        ])
        .unwrap();
        engine.apply_transition(&id("A"), TaskState::Cancelled).unwrap();

        let summary = engine.summary();
        assert_eq!(summary.total, 4);
        assert_eq!(summary.containers, 1);
        assert_eq!(summary.by_state[&TaskState::Todo], 2);
        assert_eq!(summary.by_state[&TaskState::Cancelled], 1);
        assert_eq!(summary.by_state[&TaskState::Done], 0);
        assert_eq!(summary.by_status[&EffectiveStatus::Ready], 1);
        assert_eq!(summary.by_status[&EffectiveStatus::Waiting], 1);
        assert_eq!(summary.invalid_declarations, 1);
        assert_eq!(summary.cycles, 0);
    }
}
