//! Dependency resolution: worklist discovery, cycle detection, and the
//! deterministic build order.

use std::collections::{HashMap, VecDeque};

use crate::contracts::{Module, ModuleKey, ModuleRef, NestedBuild};
use crate::error::BuildError;

/// One resolved module: the instance plus its backward dependency edges.
/// Owned exclusively by the graph and, after sorting, by the host.
pub(crate) struct ModuleNode {
    pub key: ModuleKey,
    pub module: Box<dyn Module>,
    pub deps: Vec<ModuleKey>,
}

impl std::fmt::Debug for ModuleNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleNode")
            .field("key", &self.key)
            .field("deps", &self.deps)
            .finish_non_exhaustive()
    }
}

/// The dependency graph in first-discovery order, keyed by module identity.
pub(crate) struct ModuleGraph {
    nodes: Vec<ModuleNode>,
    index: HashMap<ModuleKey, usize>,
}

impl std::fmt::Debug for ModuleGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleGraph")
            .field("nodes", &self.nodes)
            .field("index", &self.index)
            .finish()
    }
}

enum Pending {
    Ref(ModuleRef),
    Nested { key: ModuleKey, build: NestedBuild },
}

impl Pending {
    fn key(&self) -> ModuleKey {
        match self {
            Pending::Ref(r) => r.key(),
            Pending::Nested { key, .. } => *key,
        }
    }

    fn construct(self) -> anyhow::Result<Box<dyn Module>> {
        match self {
            Pending::Ref(r) => r.construct(),
            Pending::Nested { build, .. } => build(),
        }
    }
}

impl ModuleGraph {
    /// Discover the transitive module set from the given roots.
    ///
    /// Each identity is instantiated and its `declare` step run exactly once;
    /// declared dependencies and nested attachments feed back into the
    /// worklist until it drains.
    pub fn discover(roots: &[ModuleRef]) -> Result<Self, BuildError> {
        let mut graph = Self {
            nodes: Vec::new(),
            index: HashMap::new(),
        };

        let mut work: VecDeque<Pending> =
            roots.iter().map(|r| Pending::Ref(*r)).collect();

        while let Some(pending) = work.pop_front() {
            let key = pending.key();
            if graph.index.contains_key(&key) {
                if matches!(pending, Pending::Nested { .. }) {
                    tracing::debug!(
                        module = key.name(),
                        "nested attach targets an already-discovered module, ignoring"
                    );
                }
                continue;
            }

            let mut module =
                pending
                    .construct()
                    .map_err(|source| BuildError::ModuleUnavailable {
                        module: key.name(),
                        source,
                    })?;

            let mut scope = crate::contracts::Discovery::new();
            module.declare(&mut scope);
            let (deps, nested) = scope.into_parts();

            graph.index.insert(key, graph.nodes.len());
            graph.nodes.push(ModuleNode {
                key,
                module,
                deps: deps.iter().map(|d| d.key()).collect(),
            });

            for dep in deps {
                work.push_back(Pending::Ref(dep));
            }
            for (key, build) in nested {
                work.push_back(Pending::Nested { key, build });
            }
        }

        Ok(graph)
    }

    /// Consume the graph into a dependency-first, deterministic build order.
    ///
    /// DFS post-order over the first-discovery node list: dependencies are
    /// emitted before their dependents, and mutually unordered modules keep
    /// first-discovery order.
    pub fn into_build_order(self) -> Result<Vec<ModuleNode>, BuildError> {
        let order = sort_postorder(&self.nodes, &self.index)?;

        let mut slots: Vec<Option<ModuleNode>> = self.nodes.into_iter().map(Some).collect();
        let nodes: Vec<ModuleNode> = order.into_iter().filter_map(|i| slots[i].take()).collect();

        tracing::info!(
            modules = ?nodes.iter().map(|n| n.key.name()).collect::<Vec<_>>(),
            "module dependency order resolved"
        );

        Ok(nodes)
    }
}

#[derive(Clone, Copy, PartialEq)]
enum Mark {
    New,
    Visiting,
    Done,
}

fn sort_postorder(
    nodes: &[ModuleNode],
    index: &HashMap<ModuleKey, usize>,
) -> Result<Vec<usize>, BuildError> {
    let mut marks = vec![Mark::New; nodes.len()];
    let mut path = Vec::new();
    let mut order = Vec::with_capacity(nodes.len());

    for i in 0..nodes.len() {
        if marks[i] == Mark::New {
            visit(i, nodes, index, &mut marks, &mut path, &mut order)?;
        }
    }

    Ok(order)
}

fn visit(
    node: usize,
    nodes: &[ModuleNode],
    index: &HashMap<ModuleKey, usize>,
    marks: &mut [Mark],
    path: &mut Vec<usize>,
    order: &mut Vec<usize>,
) -> Result<(), BuildError> {
    marks[node] = Mark::Visiting;
    path.push(node);

    for dep_key in &nodes[node].deps {
        // Discovery enqueues every declared dependency, so the lookup holds.
        let Some(&dep) = index.get(dep_key) else {
            debug_assert!(false, "declared dependency missing from graph");
            continue;
        };
        match marks[dep] {
            Mark::Done => {}
            Mark::New => visit(dep, nodes, index, marks, path, order)?,
            Mark::Visiting => {
                // Back edge: report the chain from the first occurrence of
                // the revisited node, closed on that node.
                let start = path.iter().position(|&p| p == dep).unwrap_or(0);
                let mut chain: Vec<&'static str> =
                    path[start..].iter().map(|&p| nodes[p].key.name()).collect();
                chain.push(nodes[dep].key.name());
                return Err(BuildError::CycleDetected { path: chain });
            }
        }
    }

    path.pop();
    marks[node] = Mark::Done;
    order.push(node);
    Ok(())
}
