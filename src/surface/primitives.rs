//! Closed test surfaces: a subdivided cube and an icosphere.

use nalgebra::Point3;

use crate::core::collections::FastHashMap;
use crate::surface::tri_mesh::SurfaceTriMesh;

/// Unit cube `[-0.5, 0.5]^3` with each face split into `n x n` quads of two
/// triangles, outward oriented. `n == 0` is treated as 1.
#[must_use]
pub fn cube(n: usize) -> SurfaceTriMesh {
    let n = n.max(1);
    let scale = 1.0 / n as f64;
    let mut lookup: FastHashMap<[usize; 3], usize> = FastHashMap::default();
    let mut positions = Vec::new();
    let mut triangles = Vec::new();

    let mut vertex = |lattice: [usize; 3]| -> usize {
        *lookup.entry(lattice).or_insert_with(|| {
            positions.push(Point3::new(
                lattice[0] as f64 * scale - 0.5,
                lattice[1] as f64 * scale - 0.5,
                lattice[2] as f64 * scale - 0.5,
            ));
            positions.len() - 1
        })
    };

    for axis in 0..3 {
        let (u, v) = ((axis + 1) % 3, (axis + 2) % 3);
        for positive in [false, true] {
            for i in 0..n {
                for j in 0..n {
                    let corner = |di: usize, dj: usize| {
                        let mut l = [0; 3];
                        l[axis] = if positive { n } else { 0 };
                        l[u] = i + di;
                        l[v] = j + dj;
                        l
                    };
                    let mut quad = [
                        vertex(corner(0, 0)),
                        vertex(corner(1, 0)),
                        vertex(corner(1, 1)),
                        vertex(corner(0, 1)),
                    ];
                    if !positive {
                        quad.reverse();
                    }
                    triangles.push([quad[0], quad[1], quad[2]]);
                    triangles.push([quad[0], quad[2], quad[3]]);
                }
            }
        }
    }

    SurfaceTriMesh::from_triangles(positions, &triangles).unwrap_or_default()
}

/// Unit sphere approximated by an icosahedron subdivided `subdivisions`
/// times, outward oriented.
#[must_use]
pub fn icosphere(subdivisions: usize) -> SurfaceTriMesh {
    let t = f64::midpoint(1.0, 5.0_f64.sqrt());
    let mut positions: Vec<Point3<f64>> = [
        [-1.0, t, 0.0],
        [1.0, t, 0.0],
        [-1.0, -t, 0.0],
        [1.0, -t, 0.0],
        [0.0, -1.0, t],
        [0.0, 1.0, t],
        [0.0, -1.0, -t],
        [0.0, 1.0, -t],
        [t, 0.0, -1.0],
        [t, 0.0, 1.0],
        [-t, 0.0, -1.0],
        [-t, 0.0, 1.0],
    ]
    .iter()
    .map(|&[x, y, z]| Point3::from(nalgebra::Vector3::new(x, y, z).normalize()))
    .collect();

    let mut triangles: Vec<[usize; 3]> = vec![
        [0, 11, 5],
        [0, 5, 1],
        [0, 1, 7],
        [0, 7, 10],
        [0, 10, 11],
        [1, 5, 9],
        [5, 11, 4],
        [11, 10, 2],
        [10, 7, 6],
        [7, 1, 8],
        [3, 9, 4],
        [3, 4, 2],
        [3, 2, 6],
        [3, 6, 8],
        [3, 8, 9],
        [4, 9, 5],
        [2, 4, 11],
        [6, 2, 10],
        [8, 6, 7],
        [9, 8, 1],
    ];

    for _ in 0..subdivisions {
        let mut midpoints: FastHashMap<(usize, usize), usize> = FastHashMap::default();
        let mut midpoint = |a: usize, b: usize, positions: &mut Vec<Point3<f64>>| -> usize {
            let key = if a < b { (a, b) } else { (b, a) };
            *midpoints.entry(key).or_insert_with(|| {
                let m = (positions[a].coords + positions[b].coords).normalize();
                positions.push(Point3::from(m));
                positions.len() - 1
            })
        };
        let mut next = Vec::with_capacity(triangles.len() * 4);
        for [a, b, c] in triangles {
            let ab = midpoint(a, b, &mut positions);
            let bc = midpoint(b, c, &mut positions);
            let ca = midpoint(c, a, &mut positions);
            next.extend_from_slice(&[[a, ab, ca], [b, bc, ab], [c, ca, bc], [ab, bc, ca]]);
        }
        triangles = next;
    }

    SurfaceTriMesh::from_triangles(positions, &triangles).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cube_is_closed_and_outward() {
        let mesh = cube(4);
        assert_eq!(mesh.number_of_triangles(), 6 * 16 * 2);
        assert_eq!(mesh.number_of_vertices(), 6 * 16 + 2);
        assert!(mesh.is_closed());
        assert!((mesh.signed_volume() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_icosphere_is_closed_and_outward() {
        let mesh = icosphere(2);
        assert_eq!(mesh.number_of_triangles(), 20 * 16);
        assert!(mesh.is_closed());
        let volume = mesh.signed_volume();
        assert!(volume > 3.5 && volume < 4.0 * std::f64::consts::PI / 3.0);
        for p in mesh.positions() {
            assert!((p.coords.norm() - 1.0).abs() < 1e-12);
        }
    }
}
