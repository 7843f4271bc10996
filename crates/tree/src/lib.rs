//! Build-tree construction from decoded event streams.
//!
//! Layout:
//!
//! ```text
//! girder-tree
//! ├── node     arena-backed tree (NodeId, NodeKind, BuildTree)
//! ├── graph    per-project target dependency graph
//! └── builder  event dispatch, correlation maps, finalization
//! ```

#![warn(missing_docs)]

mod builder;
mod graph;
mod node;

pub use builder::{BuildResult, TreeBuilder};
pub use graph::TargetGraph;
pub use node::{BuildTree, Node, NodeId, NodeKind};
