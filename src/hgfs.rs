use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::tensor::{Tensor, TensorArena, TensorError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeHandle(u64);

impl NodeHandle {
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub fn raw(&self) -> u64 {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgeId(u64);

impl EdgeId {
    pub fn raw(&self) -> u64 {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeType {
    Inheritance,
    Similarity,
    SyncTopology,
    SwarmMember,
    AuthTrust,
    Dependency,
    Temporal,
    Causal,
}

impl EdgeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EdgeType::Inheritance => "inheritance",
            EdgeType::Similarity => "similarity",
            EdgeType::SyncTopology => "sync_topology",
            EdgeType::SwarmMember => "swarm_member",
            EdgeType::AuthTrust => "auth_trust",
            EdgeType::Dependency => "dependency",
            EdgeType::Temporal => "temporal",
            EdgeType::Causal => "causal",
        }
    }
}

/// Node payload storage: a tensor checked out of the shared arena when the
/// arena has room, a plain heap buffer of the same element count otherwise.
#[derive(Debug)]
enum NodeBacking {
    Tensor(Tensor),
    Heap(Vec<f32>),
}

#[derive(Debug)]
pub struct HgfsNode {
    pub handle: NodeHandle,
    pub depth: u32,
    pub size: usize,
    backing: NodeBacking,
}

impl HgfsNode {
    pub fn tensor_backed(&self) -> bool {
        matches!(self.backing, NodeBacking::Tensor(_))
    }

    /// The node's `ceil(size / 4)` f32 payload slots, whichever backing holds
    /// them.
    pub fn payload(&self) -> &[f32] {
        match &self.backing {
            NodeBacking::Tensor(tensor) => tensor.as_slice(),
            NodeBacking::Heap(data) => data,
        }
    }

    pub fn payload_mut(&mut self) -> &mut [f32] {
        match &mut self.backing {
            NodeBacking::Tensor(tensor) => tensor.as_mut_slice(),
            NodeBacking::Heap(data) => data,
        }
    }
}

#[derive(Debug)]
pub struct HgfsEdge {
    pub id: EdgeId,
    pub edge_type: EdgeType,
    pub src: NodeHandle,
    pub dst: NodeHandle,
    pub weight: f32,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum HgfsError {
    #[error("unknown hypergraph node handle {}", .0.raw())]
    UnknownNode(NodeHandle),
    #[error(transparent)]
    Tensor(#[from] TensorError),
}

/// Outcome of a node allocation, reported so callers can log clamping and
/// backing decisions.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct NodeAlloc {
    pub handle: NodeHandle,
    pub depth: u32,
    pub depth_clamped: bool,
    pub tensor_backed: bool,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct EdgeOutcome {
    pub id: EdgeId,
    pub adjacency_set: bool,
}

/// Hypergraph filesystem: a handle-indexed registry of tensor-backed nodes,
/// typed edges between them, and a dense adjacency matrix for fast neighbor
/// queries. Handle and edge-id sequences start at 1 and never recycle.
#[derive(Debug)]
pub struct Hgfs {
    nodes: BTreeMap<NodeHandle, HgfsNode>,
    edges: Vec<HgfsEdge>,
    next_handle: u64,
    next_edge_id: u64,
    adjacency: Tensor,
    max_atoms: usize,
    max_depth: u32,
    adjacency_skips: u64,
    depth_clamps: u64,
}

impl Hgfs {
    pub fn new(
        arena: &mut TensorArena,
        max_atoms: usize,
        max_depth: u32,
    ) -> Result<Self, HgfsError> {
        let adjacency = arena.matrix(max_atoms, max_atoms)?;
        Ok(Self {
            nodes: BTreeMap::new(),
            edges: Vec::new(),
            next_handle: 1,
            next_edge_id: 1,
            adjacency,
            max_atoms,
            max_depth,
            adjacency_skips: 0,
            depth_clamps: 0,
        })
    }

    /// Create a node. The backing is a tensor of `ceil(size / 4)` f32 slots
    /// when the shared arena has room, otherwise a plain heap buffer.
    /// Requested depths beyond the configured maximum are clamped, not
    /// rejected, and the clamp is counted.
    pub fn alloc(
        &mut self,
        arena: &mut TensorArena,
        size: usize,
        depth: u32,
    ) -> Result<NodeAlloc, HgfsError> {
        let depth_clamped = depth > self.max_depth;
        let effective_depth = if depth_clamped { self.max_depth } else { depth };

        let elem_count = (size + 3) / 4;
        let (backing, tensor_backed) = match arena.vector(elem_count) {
            Ok(tensor) => (NodeBacking::Tensor(tensor), true),
            Err(_) => (NodeBacking::Heap(vec![0.0; elem_count]), false),
        };

        if depth_clamped {
            self.depth_clamps += 1;
        }

        let handle = NodeHandle(self.next_handle);
        self.next_handle += 1;

        self.nodes.insert(
            handle,
            HgfsNode {
                handle,
                depth: effective_depth,
                size,
                backing,
            },
        );

        Ok(NodeAlloc {
            handle,
            depth: effective_depth,
            depth_clamped,
            tensor_backed,
        })
    }

    /// Unlink a node. Heap backings drop here; tensor backings are returned
    /// to the arena, whose budget accounting never shrinks (tensor memory is
    /// reclaimed only when the whole context goes away at shutdown).
    pub fn free(&mut self, arena: &mut TensorArena, handle: NodeHandle) -> Result<(), HgfsError> {
        let node = self
            .nodes
            .remove(&handle)
            .ok_or(HgfsError::UnknownNode(handle))?;
        match node.backing {
            NodeBacking::Tensor(tensor) => arena.release(tensor),
            NodeBacking::Heap(_) => {}
        }
        Ok(())
    }

    /// Create a one-directional typed edge. Fails without any state change
    /// when either endpoint is unknown. The adjacency entry is written only
    /// when both handles index inside the matrix; out-of-range pairs are
    /// skipped and counted.
    pub fn edge(
        &mut self,
        src: NodeHandle,
        dst: NodeHandle,
        edge_type: EdgeType,
    ) -> Result<EdgeOutcome, HgfsError> {
        if !self.nodes.contains_key(&src) {
            return Err(HgfsError::UnknownNode(src));
        }
        if !self.nodes.contains_key(&dst) {
            return Err(HgfsError::UnknownNode(dst));
        }

        let id = EdgeId(self.next_edge_id);
        self.next_edge_id += 1;

        self.edges.push(HgfsEdge {
            id,
            edge_type,
            src,
            dst,
            weight: 1.0,
        });

        let adjacency_set =
            (src.raw() as usize) < self.max_atoms && (dst.raw() as usize) < self.max_atoms;
        if adjacency_set {
            self.adjacency
                .set(src.raw() as usize, dst.raw() as usize, 1.0);
        } else {
            self.adjacency_skips += 1;
        }

        Ok(EdgeOutcome { id, adjacency_set })
    }

    pub fn adjacency_weight(&self, src: NodeHandle, dst: NodeHandle) -> f32 {
        self.adjacency
            .at(src.raw() as usize, dst.raw() as usize)
            .unwrap_or(0.0)
    }

    pub fn node(&self, handle: NodeHandle) -> Option<&HgfsNode> {
        self.nodes.get(&handle)
    }

    pub fn node_mut(&mut self, handle: NodeHandle) -> Option<&mut HgfsNode> {
        self.nodes.get_mut(&handle)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn edges(&self) -> &[HgfsEdge] {
        &self.edges
    }

    pub fn adjacency_skips(&self) -> u64 {
        self.adjacency_skips
    }

    pub fn depth_clamps(&self) -> u64 {
        self.depth_clamps
    }
}
