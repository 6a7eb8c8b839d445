pub mod contact_manifold;
pub mod mesh_reduction;
pub mod nonconvex_reduction;
