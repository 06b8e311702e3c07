//! Graph algorithms

pub mod pathfinding;

pub use pathfinding::{bfs, PathResult};
