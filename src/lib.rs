//! Mesh boundary smoothing for convex-versus-mesh collisions.
//!
//! Per-triangle narrow phase tests know nothing about their neighbors, so contacts near
//! shared triangle edges can come out with normals that catch on geometry which isn't
//! actually there. [`MeshReduction`](physics::collision_detection::mesh_reduction::MeshReduction)
//! analyzes a batch of per-triangle manifolds jointly and deletes or redirects the ones
//! whose normals infringe on a neighboring triangle's face region.

pub mod physics;
pub mod utilities;
