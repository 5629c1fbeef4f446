//! Triangle mesh input for trimesh geoms.
//!
//! Meshes come from the external loader with triangles grouped by material:
//! each material owns a contiguous, ascending `[start, end)` range of
//! triangle indices.

use glam::Vec3;
use rapier3d::prelude::{SharedShape, Vector};
use tracing::warn;

use crate::error::PhysicsError;

/// A named run of triangles sharing one material.
#[derive(Debug, Clone, PartialEq)]
pub struct MaterialRange {
    /// Material name as given by the loader.
    pub name: String,
    /// First triangle index (inclusive).
    pub start: u32,
    /// One past the last triangle index.
    pub end: u32,
}

/// Indexed triangle soup with material ranges.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TriangleMesh {
    /// Vertex positions.
    pub vertices: Vec<Vec3>,
    /// Vertex indices, three per triangle.
    pub indices: Vec<[u32; 3]>,
    /// Ascending, non-overlapping material ranges. May be empty.
    pub materials: Vec<MaterialRange>,
}

impl TriangleMesh {
    /// Number of triangles.
    pub fn triangle_count(&self) -> usize {
        self.indices.len()
    }

    /// Checks that the mesh can back a collision shape.
    pub fn validate(&self) -> Result<(), PhysicsError> {
        if self.indices.is_empty() {
            return Err(PhysicsError::EmptyMesh);
        }
        let vertex_count = self.vertices.len() as u32;
        if let Some(tri) = self
            .indices
            .iter()
            .find(|tri| tri.iter().any(|&i| i >= vertex_count))
        {
            return Err(PhysicsError::InvalidMesh(format!(
                "triangle {tri:?} references a vertex past {vertex_count}"
            )));
        }
        let mut previous_end = 0;
        for range in &self.materials {
            if range.start > range.end || range.start < previous_end {
                return Err(PhysicsError::InvalidMesh(format!(
                    "material `{}` range [{}, {}) is not ascending",
                    range.name, range.start, range.end
                )));
            }
            previous_end = range.end;
        }
        Ok(())
    }

    /// Builds the Rapier trimesh shape.
    pub fn to_shape(&self) -> Result<SharedShape, PhysicsError> {
        self.validate()?;
        let vertices: Vec<Vector> = self
            .vertices
            .iter()
            .map(|v| Vector::new(v.x, v.y, v.z))
            .collect();
        SharedShape::trimesh(vertices, self.indices.clone())
            .map_err(|e| PhysicsError::InvalidMesh(format!("{e:?}")))
    }
}

/// Index of the material whose range contains `triangle`.
///
/// Triangles past the last range resolve to the last material (logged).
/// Returns `None` only when there are no materials.
pub fn material_index(materials: &[MaterialRange], triangle: u32) -> Option<usize> {
    if materials.is_empty() {
        return None;
    }
    let index = materials.partition_point(|m| m.end <= triangle);
    if index >= materials.len() {
        warn!(
            triangle,
            materials = materials.len(),
            "triangle outside every material range, using last material"
        );
        return Some(materials.len() - 1);
    }
    Some(index)
}
