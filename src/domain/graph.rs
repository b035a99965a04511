//! Blocking graph resolution
//!
//! Evaluates finders against the store to materialize target sets, builds the
//! directed blocking graph (edges point from the blocked task to each task it
//! waits on) and detects cycles in it. Uses petgraph for the graph itself.
//!
//! The graph is derived data: it is rebuilt lazily from the store and the
//! compiled declarations, cached, and dropped on any change.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::OnceLock;

use petgraph::algo::{tarjan_scc, toposort};
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::{Dfs, EdgeRef, Reversed};
use petgraph::Direction;
use serde::Serialize;
use tracing::{debug, warn};

use super::expr::{Declarations, Finder};
use super::id::TaskId;
use super::store::TaskStore;

/// Tasks selected by a finder
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Targets {
    /// Known tasks, in finder order, without duplicates
    pub found: Vec<TaskId>,
    /// IDs named by `ids(...)` that are not in the store
    pub missing: Vec<TaskId>,
}

/// Evaluates a finder relative to `source`
pub fn resolve_finder(store: &TaskStore, source: &TaskId, finder: &Finder) -> Targets {
    let candidates: Vec<TaskId> = match finder {
        Finder::Ids(ids) => ids.clone(),
        Finder::Children => store.child_ids(source).to_vec(),
        Finder::Parent => store
            .get(source)
            .and_then(|t| t.parent_id.clone())
            .into_iter()
            .collect(),
        Finder::Siblings => store
            .sibling_group(source)
            .iter()
            .filter(|id| *id != source)
            .cloned()
            .collect(),
        Finder::NextSibling | Finder::PreviousSibling => {
            let group = store.sibling_group(source);
            let pos = group.iter().position(|id| id == source);
            let neighbour = match (finder, pos) {
                (Finder::NextSibling, Some(p)) => group.get(p + 1),
                (Finder::PreviousSibling, Some(p)) if p > 0 => group.get(p - 1),
                _ => None,
            };
            neighbour.cloned().into_iter().collect()
        }
        Finder::SelfTask => vec![source.clone()],
        Finder::Ancestors => store.ancestors(source),
        Finder::Descendants => store.descendants(source),
    };

    let mut targets = Targets::default();
    let mut seen = HashSet::new();
    for id in candidates {
        if !seen.insert(id.clone()) {
            continue;
        }
        if store.contains(&id) {
            targets.found.push(id);
        } else {
            targets.missing.push(id);
        }
    }
    targets
}

/// A resolved blocking edge
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BlockingEdge {
    /// The blocked task
    pub from: TaskId,
    /// The task it waits on
    pub to: TaskId,
    /// Source text of the clause that produced the edge
    pub clause: String,
}

/// Directed blocking graph over all tasks
#[derive(Debug, Clone, Default)]
pub struct BlockingGraph {
    graph: DiGraph<TaskId, String>,
    node_map: HashMap<TaskId, NodeIndex>,
}

impl BlockingGraph {
    /// Builds the graph from every parsed blocker in the corpus
    ///
    /// Tasks whose blocker failed to parse contribute no edges.
    pub fn build(store: &TaskStore, declarations: &HashMap<TaskId, Declarations>) -> Self {
        let mut graph = Self::default();

        for task in store.all() {
            let idx = graph.graph.add_node(task.id.clone());
            graph.node_map.insert(task.id.clone(), idx);
        }

        for task in store.all() {
            let Some(Some(Ok(blocker))) = declarations.get(&task.id).map(|d| d.blocker.as_ref())
            else {
                continue;
            };

            let from = graph.node_map[&task.id];
            for clause in &blocker.clauses {
                for target in resolve_finder(store, &task.id, &clause.finder).found {
                    let to = graph.node_map[&target];
                    graph.graph.add_edge(from, to, clause.text.clone());
                }
            }
        }

        debug!(
            nodes = graph.graph.node_count(),
            edges = graph.graph.edge_count(),
            "built blocking graph"
        );
        graph
    }

    /// Returns true if the graph contains the task
    pub fn contains(&self, id: &TaskId) -> bool {
        self.node_map.contains_key(id)
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Outgoing edges of a task, in declaration order
    pub fn edges_from(&self, id: &TaskId) -> Vec<BlockingEdge> {
        let Some(&idx) = self.node_map.get(id) else {
            return vec![];
        };

        let mut edges: Vec<_> = self
            .graph
            .edges_directed(idx, Direction::Outgoing)
            .map(|e| {
                let edge = BlockingEdge {
                    from: id.clone(),
                    to: self.graph[e.target()].clone(),
                    clause: e.weight().clone(),
                };
                (e.id(), edge)
            })
            .collect();
        edges.sort_by_key(|(edge_id, _)| *edge_id);
        edges.into_iter().map(|(_, edge)| edge).collect()
    }

    /// Tasks this task waits on
    pub fn dependencies(&self, id: &TaskId) -> Vec<TaskId> {
        self.neighbours(id, Direction::Outgoing)
    }

    /// Tasks waiting on this task
    pub fn dependents(&self, id: &TaskId) -> Vec<TaskId> {
        self.neighbours(id, Direction::Incoming)
    }

    fn neighbours(&self, id: &TaskId, dir: Direction) -> Vec<TaskId> {
        let Some(&idx) = self.node_map.get(id) else {
            return vec![];
        };

        let mut indices: Vec<_> = self.graph.neighbors_directed(idx, dir).collect();
        indices.sort();
        indices.dedup();
        indices.into_iter().map(|i| self.graph[i].clone()).collect()
    }

    /// All tasks reachable from `id` along blocking edges (excluding `id`
    /// unless it lies on a cycle)
    pub fn reachable_from(&self, id: &TaskId) -> HashSet<TaskId> {
        let mut out = HashSet::new();
        let Some(&start) = self.node_map.get(id) else {
            return out;
        };

        for next in self.graph.neighbors_directed(start, Direction::Outgoing) {
            let mut dfs = Dfs::new(&self.graph, next);
            while let Some(node) = dfs.next(&self.graph) {
                out.insert(self.graph[node].clone());
            }
        }
        out
    }

    /// Finds cycles with a depth-first traversal over every node
    ///
    /// Each back edge found yields one cycle, reported as a path that starts
    /// and ends with the same task, e.g. `[A, B, A]`.
    pub fn find_cycles(&self) -> Vec<Vec<TaskId>> {
        #[derive(Clone, Copy, PartialEq)]
        enum Mark {
            New,
            OnStack,
            Done,
        }

        let mut marks = vec![Mark::New; self.graph.node_count()];
        let mut cycles = Vec::new();

        for root in self.graph.node_indices() {
            if marks[root.index()] != Mark::New {
                continue;
            }

            // (node, sorted successors, next successor to visit)
            let mut stack: Vec<(NodeIndex, Vec<NodeIndex>, usize)> = Vec::new();
            marks[root.index()] = Mark::OnStack;
            stack.push((root, self.successors(root), 0));

            while let Some((node, succ, pos)) = stack.last_mut() {
                if *pos >= succ.len() {
                    marks[node.index()] = Mark::Done;
                    stack.pop();
                    continue;
                }

                let next = succ[*pos];
                *pos += 1;

                match marks[next.index()] {
                    Mark::New => {
                        marks[next.index()] = Mark::OnStack;
                        let succ = self.successors(next);
                        stack.push((next, succ, 0));
                    }
                    Mark::OnStack => {
                        let start = stack
                            .iter()
                            .position(|(n, _, _)| *n == next)
                            .unwrap_or(0);
                        let mut path: Vec<TaskId> = stack[start..]
                            .iter()
                            .map(|(n, _, _)| self.graph[*n].clone())
                            .collect();
                        path.push(self.graph[next].clone());
                        cycles.push(path);
                    }
                    Mark::Done => {}
                }
            }
        }

        if !cycles.is_empty() {
            warn!(count = cycles.len(), "blocking graph contains cycles");
        }
        cycles
    }

    /// Shortest blocking cycle that passes through `id`, e.g. `[C, B, A, C]`
    ///
    /// Membership comes from the strongly connected components, so a task is
    /// found however the traversal first reached its cycle.
    pub fn cycle_through(&self, id: &TaskId) -> Option<Vec<TaskId>> {
        let &start = self.node_map.get(id)?;
        self.graph
            .neighbors_directed(start, Direction::Outgoing)
            .next()?;

        let component: HashSet<NodeIndex> = tarjan_scc(&self.graph)
            .into_iter()
            .find(|c| c.contains(&start))?
            .into_iter()
            .collect();

        let mut prev: HashMap<NodeIndex, NodeIndex> = HashMap::new();
        let mut queue = VecDeque::from([start]);
        while let Some(node) = queue.pop_front() {
            for next in self.successors(node) {
                if !component.contains(&next) {
                    continue;
                }
                if next == start {
                    let mut path = vec![node];
                    let mut current = node;
                    while current != start {
                        match prev.get(&current) {
                            Some(&p) => current = p,
                            None => break,
                        }
                        path.push(current);
                    }
                    path.reverse();
                    path.push(start);
                    return Some(path.into_iter().map(|n| self.graph[n].clone()).collect());
                }
                if !prev.contains_key(&next) {
                    prev.insert(next, node);
                    queue.push_back(next);
                }
            }
        }
        None
    }

    /// Every task that waits on `id`, directly or through other tasks
    pub fn transitive_dependents(&self, id: &TaskId) -> HashSet<TaskId> {
        let mut out = HashSet::new();
        let Some(&start) = self.node_map.get(id) else {
            return out;
        };

        let reversed = Reversed(&self.graph);
        let mut dfs = Dfs::new(reversed, start);
        while let Some(node) = dfs.next(reversed) {
            if node != start {
                out.insert(self.graph[node].clone());
            }
        }
        out
    }

    /// Longest chain of blocking edges between tasks for which `counts` is
    /// true, first prerequisite first
    ///
    /// Ties go to the smaller ID at each step. Empty when no such edge
    /// exists, `None` when the graph has a cycle.
    pub fn longest_chain(&self, counts: impl Fn(&TaskId) -> bool) -> Option<Vec<TaskId>> {
        let order = toposort(&self.graph, None).ok()?;
        let count = self.graph.node_count();
        let mut depth = vec![0usize; count];
        let mut next: Vec<Option<NodeIndex>> = vec![None; count];

        for &node in order.iter().rev() {
            if !counts(&self.graph[node]) {
                continue;
            }
            for dep in self.successors(node) {
                if !counts(&self.graph[dep]) {
                    continue;
                }
                let candidate = depth[dep.index()] + 1;
                let better = match next[node.index()] {
                    None => true,
                    Some(current) => {
                        candidate > depth[node.index()]
                            || (candidate == depth[node.index()]
                                && self.graph[dep] < self.graph[current])
                    }
                };
                if better {
                    depth[node.index()] = candidate;
                    next[node.index()] = Some(dep);
                }
            }
        }

        let Some(start) = self
            .graph
            .node_indices()
            .filter(|n| depth[n.index()] > 0)
            .max_by(|a, b| {
                depth[a.index()]
                    .cmp(&depth[b.index()])
                    .then_with(|| self.graph[*b].cmp(&self.graph[*a]))
            })
        else {
            return Some(Vec::new());
        };

        let mut chain = vec![start];
        let mut current = start;
        while let Some(dep) = next[current.index()] {
            chain.push(dep);
            current = dep;
        }
        chain.reverse();
        Some(chain.into_iter().map(|n| self.graph[n].clone()).collect())
    }

    /// Level of every task in dependency order
    ///
    /// A task sits one level above its deepest dependency; dependencies for
    /// which `counts` is false are ignored. Returns `None` on a cycle.
    pub fn levels(&self, counts: impl Fn(&TaskId) -> bool) -> Option<HashMap<TaskId, usize>> {
        let order = toposort(&self.graph, None).ok()?;
        let mut level = vec![0usize; self.graph.node_count()];

        for &node in order.iter().rev() {
            level[node.index()] = self
                .successors(node)
                .into_iter()
                .filter(|dep| counts(&self.graph[*dep]))
                .map(|dep| level[dep.index()] + 1)
                .max()
                .unwrap_or(0);
        }

        Some(
            self.graph
                .node_indices()
                .map(|n| (self.graph[n].clone(), level[n.index()]))
                .collect(),
        )
    }

    fn successors(&self, node: NodeIndex) -> Vec<NodeIndex> {
        let mut succ: Vec<_> = self
            .graph
            .neighbors_directed(node, Direction::Outgoing)
            .collect();
        succ.sort();
        succ.dedup();
        succ
    }

    /// Tasks ordered so every task comes after the tasks it waits on
    ///
    /// Returns `None` when the graph has a cycle.
    pub fn topological_order(&self) -> Option<Vec<TaskId>> {
        let order = toposort(&self.graph, None).ok()?;
        Some(
            order
                .into_iter()
                .rev()
                .map(|idx| self.graph[idx].clone())
                .collect(),
        )
    }
}

/// Lazily built, cached blocking graph and cycle set
#[derive(Debug, Clone, Default)]
pub struct GraphResolver {
    graph: OnceLock<BlockingGraph>,
    cycles: OnceLock<Vec<Vec<TaskId>>>,
}

impl GraphResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the blocking graph, building it on first use
    pub fn graph(
        &self,
        store: &TaskStore,
        declarations: &HashMap<TaskId, Declarations>,
    ) -> &BlockingGraph {
        self.graph
            .get_or_init(|| BlockingGraph::build(store, declarations))
    }

    /// Returns every cycle in the blocking graph (cached until invalidated)
    pub fn cycles(
        &self,
        store: &TaskStore,
        declarations: &HashMap<TaskId, Declarations>,
    ) -> &[Vec<TaskId>] {
        self.cycles
            .get_or_init(|| self.graph(store, declarations).find_cycles())
    }

    /// Returns the first cycle that `id` lies on or can reach
    pub fn cycle_involving(
        &self,
        store: &TaskStore,
        declarations: &HashMap<TaskId, Declarations>,
        id: &TaskId,
    ) -> Option<&Vec<TaskId>> {
        let cycles = self.cycles(store, declarations);
        if cycles.is_empty() {
            return None;
        }

        let reachable = self.graph(store, declarations).reachable_from(id);
        cycles
            .iter()
            .find(|cycle| cycle.iter().any(|n| n == id || reachable.contains(n)))
    }

    /// Drops cached results after any state or declaration change
    pub fn invalidate(&mut self) {
        self.graph = OnceLock::new();
        self.cycles = OnceLock::new();
    }

    pub fn is_cached(&self) -> bool {
        self.graph.get().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::task::TaskRecord;

    fn id(s: &str) -> TaskId {
        s.parse().unwrap()
    }

    fn setup(records: Vec<TaskRecord>) -> (TaskStore, HashMap<TaskId, Declarations>) {
        let store = TaskStore::from_records(records).unwrap();
        let decls = store
            .all()
            .map(|t| (t.id.clone(), Declarations::compile(t)))
            .collect();
        (store, decls)
    }

    fn family() -> TaskStore {
        TaskStore::from_records([
            TaskRecord::container(id("P"), "p"),
            TaskRecord::new(id("A"), "a").with_parent(id("P")),
            TaskRecord::new(id("B"), "b").with_parent(id("P")),
            TaskRecord::new(id("C"), "c").with_parent(id("P")),
        ])
        .unwrap()
    }

    #[test]
    fn finders_resolve_against_hierarchy() {
        let store = family();

        let children = resolve_finder(&store, &id("P"), &Finder::Children);
        assert_eq!(children.found, vec![id("A"), id("B"), id("C")]);

        let siblings = resolve_finder(&store, &id("B"), &Finder::Siblings);
        assert_eq!(siblings.found, vec![id("A"), id("C")]);

        let next = resolve_finder(&store, &id("B"), &Finder::NextSibling);
        assert_eq!(next.found, vec![id("C")]);

        let prev = resolve_finder(&store, &id("A"), &Finder::PreviousSibling);
        assert!(prev.found.is_empty());

        let parent = resolve_finder(&store, &id("A"), &Finder::Parent);
        assert_eq!(parent.found, vec![id("P")]);

        let me = resolve_finder(&store, &id("A"), &Finder::SelfTask);
        assert_eq!(me.found, vec![id("A")]);
    }

    #[test]
    fn ids_pass_through_and_report_missing() {
        let store = family();
        let finder = Finder::Ids(vec![id("C"), id("GHOST"), id("A"), id("C")]);

        let targets = resolve_finder(&store, &id("B"), &finder);
        assert_eq!(targets.found, vec![id("C"), id("A")]);
        assert_eq!(targets.missing, vec![id("GHOST")]);
    }

    #[test]
    fn edges_point_from_blocked_to_target() {
        let (store, decls) = setup(vec![
            TaskRecord::new(id("A"), "a"),
            TaskRecord::new(id("B"), "b"),
            TaskRecord::new(id("X"), "x").with_blocker("ids(A B) todo?(DONE)"),
        ]);

        let graph = BlockingGraph::build(&store, &decls);
        let edges = graph.edges_from(&id("X"));

        assert_eq!(edges.len(), 2);
        assert_eq!(edges[0].to, id("A"));
        assert_eq!(edges[1].to, id("B"));
        assert_eq!(edges[0].clause, "ids(A B) todo?(DONE)");
        assert_eq!(graph.dependents(&id("A")), vec![id("X")]);
        assert_eq!(graph.dependencies(&id("X")), vec![id("A"), id("B")]);
    }

    #[test]
    fn invalid_blockers_add_no_edges() {
        let (store, decls) = setup(vec![
            TaskRecord::new(id("A"), "a"),
            TaskRecord::new(id("Y"), "y").with_blocker("blokcer(typo"),
        ]);

        let graph = BlockingGraph::build(&store, &decls);
        assert_eq!(graph.edge_count(), 0);
    }

    #[test]
    fn two_node_cycle_names_both() {
        let (store, decls) = setup(vec![
            TaskRecord::new(id("A"), "a").with_blocker("ids(B) todo?(DONE)"),
            TaskRecord::new(id("B"), "b").with_blocker("ids(A) todo?(DONE)"),
        ]);

        let cycles = BlockingGraph::build(&store, &decls).find_cycles();
        assert_eq!(cycles, vec![vec![id("A"), id("B"), id("A")]]);
    }

    #[test]
    fn longer_cycle_path_is_complete() {
        let (store, decls) = setup(vec![
            TaskRecord::new(id("S"), "s").with_blocker("ids(A)"),
            TaskRecord::new(id("A"), "a").with_blocker("ids(B)"),
            TaskRecord::new(id("B"), "b").with_blocker("ids(C)"),
            TaskRecord::new(id("C"), "c").with_blocker("ids(A)"),
        ]);

        let cycles = BlockingGraph::build(&store, &decls).find_cycles();
        assert_eq!(cycles, vec![vec![id("A"), id("B"), id("C"), id("A")]]);
    }

    #[test]
    fn self_block_is_a_cycle() {
        let (store, decls) = setup(vec![TaskRecord::new(id("A"), "a").with_blocker("self todo?(DONE)")]);

        let cycles = BlockingGraph::build(&store, &decls).find_cycles();
        assert_eq!(cycles, vec![vec![id("A"), id("A")]]);
    }

    #[test]
    fn acyclic_graph_has_topological_order() {
        let (store, decls) = setup(vec![
            TaskRecord::new(id("C"), "c").with_blocker("ids(B)"),
            TaskRecord::new(id("B"), "b").with_blocker("ids(A)"),
            TaskRecord::new(id("A"), "a"),
        ]);

        let graph = BlockingGraph::build(&store, &decls);
        assert!(graph.find_cycles().is_empty());

        let order = graph.topological_order().unwrap();
        let pos = |s: &str| order.iter().position(|t| t == &id(s)).unwrap();
        assert!(pos("A") < pos("B"));
        assert!(pos("B") < pos("C"));
    }

    #[test]
    fn transitive_dependents_follow_chains() {
        let (store, decls) = setup(vec![
            TaskRecord::new(id("A"), "a"),
            TaskRecord::new(id("B"), "b").with_blocker("ids(A)"),
            TaskRecord::new(id("C"), "c").with_blocker("ids(B)"),
            TaskRecord::new(id("D"), "d").with_blocker("ids(A)"),
            TaskRecord::new(id("E"), "e"),
        ]);

        let graph = BlockingGraph::build(&store, &decls);
        let dependents = graph.transitive_dependents(&id("A"));
        assert_eq!(dependents, [id("B"), id("C"), id("D")].into_iter().collect());
        assert!(graph.transitive_dependents(&id("E")).is_empty());
    }

    #[test]
    fn longest_chain_prefers_depth_then_smaller_id() {
        let (store, decls) = setup(vec![
            TaskRecord::new(id("A"), "a"),
            TaskRecord::new(id("B"), "b").with_blocker("ids(A)"),
            TaskRecord::new(id("C"), "c").with_blocker("ids(B)"),
            TaskRecord::new(id("X"), "x"),
            TaskRecord::new(id("Y"), "y").with_blocker("ids(X)"),
            TaskRecord::new(id("Z"), "z").with_blocker("ids(Y)"),
        ]);

        let chain = BlockingGraph::build(&store, &decls).longest_chain(|_| true).unwrap();
        assert_eq!(chain, vec![id("A"), id("B"), id("C")]);
    }

    #[test]
    fn longest_chain_empty_without_edges_and_none_on_cycle() {
        let (store, decls) = setup(vec![TaskRecord::new(id("A"), "a")]);
        assert_eq!(BlockingGraph::build(&store, &decls).longest_chain(|_| true), Some(vec![]));

        let (store, decls) = setup(vec![
            TaskRecord::new(id("A"), "a").with_blocker("ids(B)"),
            TaskRecord::new(id("B"), "b").with_blocker("ids(A)"),
        ]);
        let graph = BlockingGraph::build(&store, &decls);
        assert!(graph.longest_chain(|_| true).is_none());
        assert!(graph.levels(|_| true).is_none());
    }

    #[test]
    fn levels_skip_uncounted_dependencies() {
        let (store, decls) = setup(vec![
            TaskRecord::new(id("A"), "a"),
            TaskRecord::new(id("B"), "b").with_blocker("ids(A)"),
            TaskRecord::new(id("C"), "c").with_blocker("ids(A B)"),
        ]);
        let graph = BlockingGraph::build(&store, &decls);

        let all = graph.levels(|_| true).unwrap();
        assert_eq!((all[&id("A")], all[&id("B")], all[&id("C")]), (0, 1, 2));

        let without_a = graph.levels(|t| t.as_str() != "A").unwrap();
        assert_eq!((without_a[&id("B")], without_a[&id("C")]), (0, 1));
    }

    #[test]
    fn cycle_through_finds_member_entered_from_second_edge() {
        let (store, decls) = setup(vec![
            TaskRecord::new(id("A"), "a").with_blocker("ids(B C)"),
            TaskRecord::new(id("B"), "b").with_blocker("ids(A)"),
            TaskRecord::new(id("C"), "c").with_blocker("ids(B)"),
            TaskRecord::new(id("UP"), "up").with_blocker("ids(A)"),
        ]);
        let graph = BlockingGraph::build(&store, &decls);

        assert_eq!(
            graph.cycle_through(&id("C")),
            Some(vec![id("C"), id("B"), id("A"), id("C")])
        );
        assert!(graph.cycle_through(&id("UP")).is_none());
    }

    #[test]
    fn resolver_reports_cycle_only_for_involved_tasks() {
        let (store, decls) = setup(vec![
            TaskRecord::new(id("A"), "a").with_blocker("ids(B)"),
            TaskRecord::new(id("B"), "b").with_blocker("ids(A)"),
            TaskRecord::new(id("UP"), "upstream").with_blocker("ids(A)"),
            TaskRecord::new(id("FREE"), "free"),
        ]);

        let resolver = GraphResolver::new();
        assert!(resolver.cycle_involving(&store, &decls, &id("A")).is_some());
        assert!(resolver.cycle_involving(&store, &decls, &id("UP")).is_some());
        assert!(resolver.cycle_involving(&store, &decls, &id("FREE")).is_none());
    }

    #[test]
    fn resolver_caches_until_invalidated() {
        let (store, decls) = setup(vec![TaskRecord::new(id("A"), "a")]);

        let mut resolver = GraphResolver::new();
        assert!(!resolver.is_cached());

        resolver.graph(&store, &decls);
        assert!(resolver.is_cached());

        resolver.invalidate();
        assert!(!resolver.is_cached());
    }

    #[test]
    fn wide_graph_resolves_quickly() {
        use std::time::Instant;

        let mut records = vec![TaskRecord::new(id("T0"), "t0")];
        for i in 1..500 {
            records.push(
                TaskRecord::new(id(&format!("T{}", i)), format!("t{}", i))
                    .with_blocker(format!("ids(T{}) todo?(DONE)", i - 1)),
            );
        }
        let (store, decls) = setup(records);

        let start = Instant::now();
        let graph = BlockingGraph::build(&store, &decls);
        assert!(graph.find_cycles().is_empty());
        let duration = start.elapsed();

        assert!(duration.as_millis() < 500, "Resolution took {:?}", duration);
    }
}
