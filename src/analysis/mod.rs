//! Graph algorithms over the node store.
pub mod topology;
