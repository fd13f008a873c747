//! Workflow graph definition.
//!
//! A [`Graph`] is an immutable description of the workflow, built once per run and
//! validated up front so that configuration mistakes surface at startup, never mid-run:
//!
//! - every node has at most one outgoing transition, either a direct edge or a fan-out,
//! - a fan-out names an ordered group of members that run concurrently and converge at
//!   a barrier; the group's exit (a direct edge or *the* conditional edge) belongs to
//!   the barrier, so the branch decision is taken exactly once per completed group,
//! - exactly one entry node and exactly one terminal node (no outgoing transition),
//! - every node is reachable from the entry.
//!
//! The conditional edge is a pure router over the folded state returning a branch
//! label; labels map to explicit targets declared at build time.

use crate::error::{GraphError, Result};
use crate::node::NodeExecutor;
use agora_checkpoint::StepCursor;
use serde_json::Value;
use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;
use std::sync::Arc;

/// Identifier of a node in the graph.
pub type NodeId = String;

/// Pure routing function evaluated once per completed fan-out group.
pub type BranchRouter = Arc<dyn Fn(&Value) -> String + Send + Sync>;

/// A named set of nodes that run concurrently and fold at a shared barrier.
///
/// `members` keeps declaration order; the engine folds member updates in exactly this
/// order regardless of completion order.
#[derive(Clone)]
pub struct FanOutGroup {
    pub id: String,
    pub members: Vec<NodeId>,
}

struct ConditionalEdge {
    router: BranchRouter,
    branches: HashMap<String, NodeId>,
}

enum GroupExit {
    Direct(NodeId),
    Conditional(ConditionalEdge),
}

/// Validated, immutable workflow graph.
pub struct Graph {
    executors: HashMap<NodeId, Arc<dyn NodeExecutor>>,
    edges: HashMap<NodeId, NodeId>,
    fan_outs: HashMap<NodeId, String>,
    groups: HashMap<String, FanOutGroup>,
    exits: HashMap<String, GroupExit>,
    entry: NodeId,
    terminal: NodeId,
}

impl fmt::Debug for Graph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Graph")
            .field("nodes", &self.node_ids())
            .field("entry", &self.entry)
            .field("terminal", &self.terminal)
            .finish_non_exhaustive()
    }
}

impl Graph {
    pub fn builder() -> GraphBuilder {
        GraphBuilder::default()
    }

    /// The node every run starts at.
    pub fn entry(&self) -> &str {
        &self.entry
    }

    /// The single node with no outgoing transition.
    pub fn terminal(&self) -> &str {
        &self.terminal
    }

    /// Declared node ids, sorted.
    pub fn node_ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.executors.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }

    pub(crate) fn executor(&self, node: &str) -> Result<Arc<dyn NodeExecutor>> {
        self.executors.get(node).cloned().ok_or_else(|| {
            GraphError::configuration(format!("node '{}' is not declared in the graph", node))
        })
    }

    pub(crate) fn group(&self, group_id: &str) -> Result<&FanOutGroup> {
        self.groups.get(group_id).ok_or_else(|| {
            GraphError::configuration(format!(
                "fan-out group '{}' is not declared in the graph",
                group_id
            ))
        })
    }

    /// What runs after `node` completes: its fan-out group, its direct successor, or
    /// nothing (the node is terminal).
    pub(crate) fn transition_after(&self, node: &str) -> StepCursor {
        if let Some(group_id) = self.fan_outs.get(node) {
            StepCursor::group(group_id.clone())
        } else if let Some(next) = self.edges.get(node) {
            StepCursor::node(next.clone())
        } else {
            StepCursor::Done
        }
    }

    /// Resolve a completed group's exit against the freshly folded state.
    ///
    /// For a conditional exit the router runs exactly once here; the returned label is
    /// reported alongside the chosen target.
    pub(crate) fn group_exit(&self, group_id: &str, state: &Value) -> Result<(NodeId, Option<String>)> {
        match self.exits.get(group_id) {
            Some(GroupExit::Direct(next)) => Ok((next.clone(), None)),
            Some(GroupExit::Conditional(edge)) => {
                let label = (edge.router)(state);
                let target = edge.branches.get(&label).ok_or_else(|| {
                    GraphError::configuration(format!(
                        "conditional edge of group '{}' returned undeclared branch '{}'",
                        group_id, label
                    ))
                })?;
                Ok((target.clone(), Some(label)))
            }
            None => Err(GraphError::configuration(format!(
                "fan-out group '{}' has no exit",
                group_id
            ))),
        }
    }
}

enum ExitSpec {
    Direct(NodeId),
    Conditional {
        router: BranchRouter,
        branches: Vec<(String, NodeId)>,
    },
}

/// Builder collecting nodes, edges, fan-outs, and the conditional edge; everything is
/// checked in [`GraphBuilder::build`].
#[derive(Default)]
pub struct GraphBuilder {
    executors: HashMap<NodeId, Arc<dyn NodeExecutor>>,
    declared: Vec<NodeId>,
    edges: Vec<(NodeId, NodeId)>,
    fan_outs: Vec<(NodeId, String, Vec<NodeId>)>,
    exits: Vec<(String, ExitSpec)>,
    entry: Option<NodeId>,
}

impl GraphBuilder {
    /// Declare a node and the executor that implements it.
    pub fn add_node(mut self, id: impl Into<String>, executor: Arc<dyn NodeExecutor>) -> Self {
        let id = id.into();
        self.declared.push(id.clone());
        self.executors.insert(id, executor);
        self
    }

    /// Set the entry node.
    pub fn set_entry(mut self, id: impl Into<String>) -> Self {
        self.entry = Some(id.into());
        self
    }

    /// Add an unconditional edge.
    pub fn add_edge(mut self, from: impl Into<String>, to: impl Into<String>) -> Self {
        self.edges.push((from.into(), to.into()));
        self
    }

    /// Declare that `source` fans out into a named group of concurrent members.
    pub fn add_fan_out<I, S>(
        mut self,
        source: impl Into<String>,
        group_id: impl Into<String>,
        members: I,
    ) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fan_outs.push((
            source.into(),
            group_id.into(),
            members.into_iter().map(Into::into).collect(),
        ));
        self
    }

    /// Give a group's barrier an unconditional successor.
    pub fn add_group_edge(mut self, group_id: impl Into<String>, to: impl Into<String>) -> Self {
        self.exits
            .push((group_id.into(), ExitSpec::Direct(to.into())));
        self
    }

    /// Attach the conditional edge to a group's barrier.
    ///
    /// `router` maps the folded state to a branch label; `branches` maps labels to
    /// target nodes. A graph may carry at most one conditional edge.
    pub fn add_condition<I, L, T>(
        mut self,
        group_id: impl Into<String>,
        router: BranchRouter,
        branches: I,
    ) -> Self
    where
        I: IntoIterator<Item = (L, T)>,
        L: Into<String>,
        T: Into<String>,
    {
        self.exits.push((
            group_id.into(),
            ExitSpec::Conditional {
                router,
                branches: branches
                    .into_iter()
                    .map(|(label, target)| (label.into(), target.into()))
                    .collect(),
            },
        ));
        self
    }

    /// Validate the definition and produce an immutable [`Graph`].
    pub fn build(mut self) -> Result<Graph> {
        let mut seen = HashSet::new();
        for id in &self.declared {
            if !seen.insert(id.clone()) {
                return Err(GraphError::configuration(format!(
                    "node '{}' is declared more than once",
                    id
                )));
            }
        }
        if self.declared.is_empty() {
            return Err(GraphError::configuration("graph declares no nodes"));
        }

        let entry = self
            .entry
            .clone()
            .ok_or_else(|| GraphError::configuration("entry node is not set"))?;
        self.require_node(&entry, "entry")?;

        // Each node gets at most one outgoing transition.
        let mut outgoing: HashSet<&str> = HashSet::new();
        let mut edges = HashMap::new();
        for (from, to) in &self.edges {
            self.require_node(from, "edge source")?;
            self.require_node(to, "edge target")?;
            if !outgoing.insert(from) {
                return Err(GraphError::configuration(format!(
                    "node '{}' has more than one outgoing transition",
                    from
                )));
            }
            edges.insert(from.clone(), to.clone());
        }

        let mut fan_outs = HashMap::new();
        let mut groups = HashMap::new();
        let mut members_of: HashMap<&str, &str> = HashMap::new();
        for (source, group_id, members) in &self.fan_outs {
            self.require_node(source, "fan-out source")?;
            if groups.contains_key(group_id) {
                return Err(GraphError::configuration(format!(
                    "fan-out group '{}' is declared more than once",
                    group_id
                )));
            }
            if members.is_empty() {
                return Err(GraphError::configuration(format!(
                    "fan-out group '{}' has no members",
                    group_id
                )));
            }
            if !outgoing.insert(source) {
                return Err(GraphError::configuration(format!(
                    "node '{}' has more than one outgoing transition",
                    source
                )));
            }
            let mut member_set = HashSet::new();
            for member in members {
                self.require_node(member, "fan-out member")?;
                if !member_set.insert(member.as_str()) {
                    return Err(GraphError::configuration(format!(
                        "node '{}' appears twice in group '{}'",
                        member, group_id
                    )));
                }
                if member == source {
                    return Err(GraphError::configuration(format!(
                        "node '{}' cannot be a member of its own fan-out group",
                        member
                    )));
                }
                if let Some(other) = members_of.insert(member, group_id) {
                    return Err(GraphError::configuration(format!(
                        "node '{}' belongs to groups '{}' and '{}'",
                        member, other, group_id
                    )));
                }
            }
            fan_outs.insert(source.clone(), group_id.clone());
            groups.insert(
                group_id.clone(),
                FanOutGroup {
                    id: group_id.clone(),
                    members: members.clone(),
                },
            );
        }

        // Members converge at the barrier; an explicit out-edge would bypass it.
        for (member, group_id) in &members_of {
            if outgoing.contains(member) {
                return Err(GraphError::configuration(format!(
                    "member '{}' of group '{}' must not have its own outgoing transition",
                    member, group_id
                )));
            }
        }

        let mut exits = HashMap::new();
        let mut conditional_count = 0usize;
        for (group_id, spec) in std::mem::take(&mut self.exits) {
            if !groups.contains_key(&group_id) {
                return Err(GraphError::configuration(format!(
                    "exit declared for unknown group '{}'",
                    group_id
                )));
            }
            let exit = match spec {
                ExitSpec::Direct(to) => {
                    self.require_node(&to, "group successor")?;
                    GroupExit::Direct(to)
                }
                ExitSpec::Conditional { router, branches } => {
                    conditional_count += 1;
                    if conditional_count > 1 {
                        return Err(GraphError::configuration(
                            "graph declares more than one conditional edge",
                        ));
                    }
                    if branches.is_empty() {
                        return Err(GraphError::configuration(format!(
                            "conditional edge of group '{}' declares no branches",
                            group_id
                        )));
                    }
                    let mut branch_map = HashMap::new();
                    for (label, target) in branches {
                        self.require_node(&target, "branch target")?;
                        if branch_map.insert(label.clone(), target).is_some() {
                            return Err(GraphError::configuration(format!(
                                "branch '{}' of group '{}' is declared twice",
                                label, group_id
                            )));
                        }
                    }
                    GroupExit::Conditional(ConditionalEdge {
                        router,
                        branches: branch_map,
                    })
                }
            };
            if exits.insert(group_id.clone(), exit).is_some() {
                return Err(GraphError::configuration(format!(
                    "group '{}' declares more than one exit",
                    group_id
                )));
            }
        }
        for group_id in groups.keys() {
            if !exits.contains_key(group_id) {
                return Err(GraphError::configuration(format!(
                    "fan-out group '{}' has no exit",
                    group_id
                )));
            }
        }

        let terminal = find_terminal(&self.declared, &outgoing, &members_of)?;
        check_reachability(&self.declared, &entry, &edges, &fan_outs, &groups, &exits)?;

        Ok(Graph {
            executors: self.executors,
            edges,
            fan_outs,
            groups,
            exits,
            entry,
            terminal,
        })
    }

    fn require_node(&self, id: &str, role: &str) -> Result<()> {
        if self.executors.contains_key(id) {
            Ok(())
        } else {
            Err(GraphError::configuration(format!(
                "{} '{}' is not a declared node",
                role, id
            )))
        }
    }
}

fn find_terminal(
    declared: &[NodeId],
    outgoing: &HashSet<&str>,
    members_of: &HashMap<&str, &str>,
) -> Result<NodeId> {
    let mut terminals: Vec<&NodeId> = declared
        .iter()
        .filter(|id| !outgoing.contains(id.as_str()) && !members_of.contains_key(id.as_str()))
        .collect();
    terminals.sort();

    match terminals.as_slice() {
        [single] => Ok((*single).clone()),
        [] => Err(GraphError::configuration("graph has no terminal node")),
        many => Err(GraphError::configuration(format!(
            "graph has multiple terminal nodes: {}",
            many.iter()
                .map(|id| id.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        ))),
    }
}

fn check_reachability(
    declared: &[NodeId],
    entry: &str,
    edges: &HashMap<NodeId, NodeId>,
    fan_outs: &HashMap<NodeId, String>,
    groups: &HashMap<String, FanOutGroup>,
    exits: &HashMap<String, GroupExit>,
) -> Result<()> {
    let mut visited = HashSet::new();
    let mut queue = VecDeque::from([entry.to_string()]);

    while let Some(node) = queue.pop_front() {
        if !visited.insert(node.clone()) {
            continue;
        }
        if let Some(next) = edges.get(&node) {
            queue.push_back(next.clone());
        }
        if let Some(group_id) = fan_outs.get(&node) {
            if let Some(group) = groups.get(group_id) {
                queue.extend(group.members.iter().cloned());
            }
            match exits.get(group_id) {
                Some(GroupExit::Direct(next)) => queue.push_back(next.clone()),
                Some(GroupExit::Conditional(edge)) => {
                    queue.extend(edge.branches.values().cloned());
                }
                None => {}
            }
        }
    }

    let mut unreachable: Vec<&str> = declared
        .iter()
        .filter(|id| !visited.contains(id.as_str()))
        .map(|id| id.as_str())
        .collect();
    unreachable.sort_unstable();

    if unreachable.is_empty() {
        Ok(())
    } else {
        Err(GraphError::configuration(format!(
            "nodes unreachable from entry '{}': {}",
            entry,
            unreachable.join(", ")
        )))
    }
}
