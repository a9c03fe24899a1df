//! Export/import dependency graph between target stacks
//!
//! An edge `A -> B` means stack A imports a value exported by stack B, so B
//! cannot be deleted until A is gone.

mod scheduler;

pub use scheduler::{DeletionReport, GroupScheduler};

use crate::aws::api::StackApi;
use crate::error::ReapError;
use crate::retry::RetryPolicy;
use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use tracing::debug;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DependencyGraph {
    nodes: BTreeSet<String>,
    /// importer -> exporters it depends on
    edges: BTreeMap<String, BTreeSet<String>>,
}

impl DependencyGraph {
    /// Build the graph for `targets` from their exports and importers.
    ///
    /// Absent stacks become isolated nodes. A nested importer counts as its
    /// root stack. An importer outside `targets` would keep its exporter
    /// alive forever, so it fails the build.
    pub async fn build(
        stacks: &dyn StackApi,
        retry: &RetryPolicy,
        targets: &[String],
    ) -> Result<Self, ReapError> {
        let target_set: BTreeSet<&str> = targets.iter().map(String::as_str).collect();
        let mut graph = Self::default();

        for target in targets {
            graph.nodes.insert(target.clone());

            let Some(snapshot) = retry
                .call("DescribeStacks", || stacks.describe_stack(target))
                .await?
            else {
                debug!(stack = %target, "Target does not exist");
                continue;
            };

            for export in &snapshot.exports {
                let importers = retry
                    .call("ListImports", || stacks.list_imports(&export.name))
                    .await?;

                for importer in importers {
                    let importer = if target_set.contains(importer.as_str()) {
                        importer
                    } else {
                        match Self::targeted_root(stacks, retry, &target_set, &importer).await? {
                            Some(root) => {
                                debug!(importer = %importer, root = %root, "Importer is nested in a target");
                                root
                            }
                            None => {
                                return Err(ReapError::ExternalImporter {
                                    exporter: target.clone(),
                                    export: export.name.clone(),
                                    importer,
                                });
                            }
                        }
                    };
                    // Imports within one stack tree go away with the tree
                    if importer == *target {
                        continue;
                    }
                    debug!(importer = %importer, exporter = %target, export = %export.name, "Dependency");
                    graph.add_edge(&importer, target);
                }
            }
        }

        Ok(graph)
    }

    /// Root stack of a nested `importer`, if that root is a target
    async fn targeted_root(
        stacks: &dyn StackApi,
        retry: &RetryPolicy,
        target_set: &BTreeSet<&str>,
        importer: &str,
    ) -> Result<Option<String>, ReapError> {
        let snapshot = retry
            .call("DescribeStacks", || stacks.describe_stack(importer))
            .await?;
        Ok(snapshot
            .and_then(|s| s.root_stack)
            .filter(|root| target_set.contains(root.as_str())))
    }

    /// Graph from explicit `(importer, exporter)` pairs
    pub fn from_edges<'a>(
        nodes: impl IntoIterator<Item = &'a str>,
        edges: impl IntoIterator<Item = (&'a str, &'a str)>,
    ) -> Self {
        let mut graph = Self {
            nodes: nodes.into_iter().map(str::to_string).collect(),
            edges: BTreeMap::new(),
        };
        for (importer, exporter) in edges {
            graph.nodes.insert(importer.to_string());
            graph.nodes.insert(exporter.to_string());
            graph.add_edge(importer, exporter);
        }
        graph
    }

    fn add_edge(&mut self, importer: &str, exporter: &str) {
        self.edges
            .entry(importer.to_string())
            .or_default()
            .insert(exporter.to_string());
    }

    pub fn nodes(&self) -> &BTreeSet<String> {
        &self.nodes
    }

    /// Stacks that `importer` depends on
    pub fn dependencies(&self, importer: &str) -> impl Iterator<Item = &String> {
        self.edges.get(importer).into_iter().flatten()
    }

    /// Find a cycle, if any.
    ///
    /// Depth-first search keeping the active path; a back edge to a node on
    /// the path closes a cycle. The returned path repeats its first node at
    /// the end (`[A, B, A]`).
    pub fn detect_circular_dependency(&self) -> Option<Vec<String>> {
        #[derive(Clone, Copy, PartialEq, Eq)]
        enum Color {
            White,
            Gray,
            Black,
        }

        fn dfs<'g>(
            node: &'g str,
            graph: &'g DependencyGraph,
            colors: &mut HashMap<&'g str, Color>,
            path: &mut Vec<&'g str>,
        ) -> Option<Vec<String>> {
            colors.insert(node, Color::Gray);
            path.push(node);

            for next in graph.dependencies(node) {
                match colors.get(next.as_str()).copied().unwrap_or(Color::White) {
                    Color::Gray => {
                        let pos = path.iter().position(|p| *p == next.as_str())?;
                        let mut cycle: Vec<String> =
                            path[pos..].iter().map(|s| s.to_string()).collect();
                        cycle.push(next.clone());
                        return Some(cycle);
                    }
                    Color::White => {
                        if let Some(cycle) = dfs(next, graph, colors, path) {
                            return Some(cycle);
                        }
                    }
                    Color::Black => {}
                }
            }

            path.pop();
            colors.insert(node, Color::Black);
            None
        }

        let mut colors: HashMap<&str, Color> = HashMap::new();
        for node in &self.nodes {
            if colors.get(node.as_str()).is_none() {
                let mut path = Vec::new();
                if let Some(cycle) = dfs(node, self, &mut colors, &mut path) {
                    return Some(cycle);
                }
            }
        }
        None
    }

    /// Order the stacks into groups that can be deleted together.
    ///
    /// Kahn's algorithm counting in-degree from the importer side: the first
    /// group holds stacks nothing depends on, and each exporter lands in a
    /// later group than all of its importers. Groups are sorted. Stacks on a
    /// cycle are left out, so check [`Self::detect_circular_dependency`] first.
    pub fn deletion_groups(&self) -> Vec<Vec<String>> {
        // Number of importers still alive per stack
        let mut importers: HashMap<&str, usize> =
            self.nodes.iter().map(|n| (n.as_str(), 0)).collect();
        for exporters in self.edges.values() {
            for exporter in exporters {
                *importers.entry(exporter.as_str()).or_default() += 1;
            }
        }

        let mut ready: VecDeque<&str> = self
            .nodes
            .iter()
            .map(String::as_str)
            .filter(|n| importers.get(n) == Some(&0))
            .collect();
        let mut groups = Vec::new();

        while !ready.is_empty() {
            let mut group: Vec<String> = ready.drain(..).map(str::to_string).collect();
            group.sort();

            let mut next = Vec::new();
            for importer in &group {
                for exporter in self.dependencies(importer) {
                    if let Some(count) = importers.get_mut(exporter.as_str()) {
                        *count -= 1;
                        if *count == 0 {
                            next.push(exporter.as_str());
                        }
                    }
                }
            }
            ready.extend(next);
            groups.push(group);
        }

        groups
    }
}
