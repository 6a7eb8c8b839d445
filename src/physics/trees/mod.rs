pub mod node;
pub mod tree;
mod tree_volume_query;
