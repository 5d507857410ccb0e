use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{bail, Context};
use candle_core::{DType, Device, Result, Tensor};
use regex::Regex;
use tracing::info;

use super::utils::download_zip_members;
use crate::graph::Graph;

const KARATE_URL: &str = "http://www-personal.umich.edu/~mejn/netdata/karate.zip";

// Zachary (1977), 0-based as distributed with networkx.
#[rustfmt::skip]
const KARATE_EDGES: [(u32, u32); 78] = [
    (1, 0), (2, 0), (2, 1), (3, 0), (3, 1), (3, 2), (4, 0), (5, 0),
    (6, 0), (6, 4), (6, 5), (7, 0), (7, 1), (7, 2), (7, 3), (8, 0),
    (8, 2), (9, 2), (10, 0), (10, 4), (10, 5), (11, 0), (12, 0), (12, 3),
    (13, 0), (13, 1), (13, 2), (13, 3), (16, 5), (16, 6), (17, 0), (17, 1),
    (19, 0), (19, 1), (21, 0), (21, 1), (25, 23), (25, 24), (27, 2), (27, 23),
    (27, 24), (28, 2), (29, 23), (29, 26), (30, 1), (30, 8), (31, 0), (31, 24),
    (31, 25), (31, 28), (32, 2), (32, 8), (32, 14), (32, 15), (32, 18), (32, 20),
    (32, 22), (32, 23), (32, 29), (32, 30), (32, 31), (33, 8), (33, 9), (33, 13),
    (33, 14), (33, 15), (33, 18), (33, 19), (33, 20), (33, 22), (33, 23), (33, 26),
    (33, 27), (33, 28), (33, 29), (33, 30), (33, 31), (33, 32),
];

// Members who followed the instructor ("Mr. Hi"); everyone else joined the officer.
const MR_HI: [u32; 17] = [0, 1, 2, 3, 4, 5, 6, 7, 8, 10, 11, 12, 13, 16, 17, 19, 21];

/// Zachary's karate club.
///
/// Only the instructor (the first node) and the administrator (the last node)
/// are labelled, with classes 0 and 1; the club split is kept as ground truth.
#[derive(Debug, Clone)]
pub struct KarateClub {
    pub num_nodes: usize,
    pub edges: Vec<(u32, u32)>,
    pub club: Option<Vec<u32>>,
}
impl KarateClub {
    pub fn builtin() -> Self {
        let club = (0..34u32)
            .map(|v| if MR_HI.contains(&v) { 0 } else { 1 })
            .collect();
        Self {
            num_nodes: 34,
            edges: KARATE_EDGES.to_vec(),
            club: Some(club),
        }
    }

    /// Loads `root/karate.gml`, downloading it first when missing.
    pub fn new<P: AsRef<Path>>(root: P) -> anyhow::Result<Self> {
        let path = root.as_ref().join("karate.gml");
        if !path.exists() {
            Self::download(root.as_ref())?;
        }
        Self::from_gml(path)
    }
    pub fn download<P: AsRef<Path>>(root: P) -> anyhow::Result<()> {
        download_zip_members(KARATE_URL, &["karate.gml"], root)
    }

    /// Parses a GML file (e.g. Newman's `karate.gml`). Node ids are mapped to
    /// `0..n` in ascending order. Ground truth is attached when the graph is
    /// the 78-edge karate club.
    pub fn from_gml<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("cannot read {}", path.display()))?;
        let karate = Self::parse_gml(&text)?;
        info!(
            path = %path.display(),
            num_nodes = karate.num_nodes,
            num_edges = karate.edges.len(),
            "loaded graph"
        );
        Ok(karate)
    }

    pub fn parse_gml(text: &str) -> anyhow::Result<Self> {
        let node_re = Regex::new(r"node\s*\[\s*id\s+(-?\d+)")?;
        let edge_re = Regex::new(r"edge\s*\[\s*source\s+(-?\d+)\s+target\s+(-?\d+)")?;

        let mut ids = BTreeMap::new();
        for caps in node_re.captures_iter(text) {
            ids.insert(caps[1].parse::<i64>()?, 0u32);
        }
        if ids.is_empty() {
            bail!("no nodes found");
        }
        for (index, slot) in ids.values_mut().enumerate() {
            *slot = index as u32;
        }

        let mut edges = Vec::new();
        for caps in edge_re.captures_iter(text) {
            let (u, v): (i64, i64) = (caps[1].parse()?, caps[2].parse()?);
            match (ids.get(&u), ids.get(&v)) {
                (Some(&u), Some(&v)) => edges.push((u, v)),
                _ => bail!("edge ({u}, {v}) refers to an undeclared node"),
            }
        }

        let num_nodes = ids.len();
        let builtin = Self::builtin();
        let club = if num_nodes == builtin.num_nodes && same_edges(&edges, &builtin.edges) {
            builtin.club
        } else {
            None
        };
        Ok(Self {
            num_nodes,
            edges,
            club,
        })
    }

    /// The symmetrized graph, optionally with a self-loop on every node.
    pub fn graph(&self, device: &Device, self_loops: bool) -> Result<Graph> {
        let graph = Graph::from_undirected(self.num_nodes, &self.edges, device)?;
        if self_loops {
            graph.with_self_loops()
        } else {
            Ok(graph)
        }
    }
    /// One-hot node features: the identity matrix.
    pub fn features(&self, device: &Device) -> Result<Tensor> {
        Tensor::eye(self.num_nodes, DType::F32, device)
    }
    pub fn labeled_nodes(&self, device: &Device) -> Result<Tensor> {
        Tensor::new(&[0u32, self.num_nodes as u32 - 1], device)
    }
    pub fn labels(&self, device: &Device) -> Result<Tensor> {
        Tensor::new(&[0u32, 1], device)
    }
}

fn same_edges(a: &[(u32, u32)], b: &[(u32, u32)]) -> bool {
    let normalize = |edges: &[(u32, u32)]| {
        let mut edges: Vec<_> = edges.iter().map(|&(u, v)| (u.min(v), u.max(v))).collect();
        edges.sort_unstable();
        edges
    };
    normalize(a) == normalize(b)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn builtin_graph_sizes() -> Result<()> {
        let karate = KarateClub::builtin();
        let g = karate.graph(&Device::Cpu, false)?;
        assert_eq!(g.num_nodes(), 34);
        assert_eq!(g.num_edges(), 156);
        assert_eq!(karate.graph(&Device::Cpu, true)?.num_edges(), 190);
        // the instructor and the administrator are the hubs
        let degrees = g.in_degrees();
        assert_eq!(degrees[0], 16);
        assert_eq!(degrees[33], 17);
        Ok(())
    }

    #[test]
    fn ground_truth_is_split_and_anchored() {
        let club = KarateClub::builtin().club.unwrap();
        assert_eq!(club.iter().filter(|&&c| c == 0).count(), 17);
        assert_eq!(club[0], 0);
        assert_eq!(club[33], 1);
    }

    #[test]
    fn parses_one_based_gml() -> anyhow::Result<()> {
        let mut gml = String::from("Creator \"test\"\ngraph\n[\n");
        for v in 1..=34 {
            gml.push_str(&format!("  node\n  [\n    id {v}\n  ]\n"));
        }
        for (u, v) in KARATE_EDGES {
            let (source, target) = (v + 1, u + 1);
            gml.push_str(&format!(
                "  edge\n  [\n    source {source}\n    target {target}\n  ]\n"
            ));
        }
        gml.push_str("]\n");

        let mut file = tempfile::NamedTempFile::new()?;
        file.write_all(gml.as_bytes())?;
        let karate = KarateClub::from_gml(file.path())?;
        assert_eq!(karate.num_nodes, 34);
        assert_eq!(karate.edges.len(), 78);
        assert!(karate.club.is_some());
        Ok(())
    }

    #[test]
    fn gml_without_ground_truth() -> anyhow::Result<()> {
        let gml = "graph [ node [ id 10 ] node [ id 20 ] node [ id 30 ] \
                   edge [ source 10 target 30 ] ]";
        let g = KarateClub::parse_gml(gml)?;
        assert_eq!(g.num_nodes, 3);
        assert_eq!(g.edges, vec![(0, 2)]);
        assert!(g.club.is_none());
        let dangling = "graph [ node [ id 1 ] edge [ source 1 target 2 ] ]";
        assert!(KarateClub::parse_gml(dangling).is_err());
        Ok(())
    }
}
