//! Grow-only point octree answering "is any point within `r` of `p`".

use nalgebra::Point3;

use crate::core::collections::SmallBuffer;
use crate::geometry::aabb::Aabb;

/// Points per leaf before it splits.
const LEAF_CAPACITY: usize = 8;

/// Leaves at this depth keep accepting points instead of splitting.
const MAX_DEPTH: u32 = 16;

#[derive(Clone, Debug)]
struct OctreeNode {
    bbox: Aabb,
    depth: u32,
    /// Index of the first of eight consecutive children.
    children: Option<usize>,
    points: SmallBuffer<usize, LEAF_CAPACITY>,
}

impl OctreeNode {
    fn leaf(bbox: Aabb, depth: u32) -> Self {
        Self {
            bbox,
            depth,
            children: None,
            points: SmallBuffer::new(),
        }
    }
}

/// Point set over a fixed root box.
///
/// Points outside the root box are kept in an overflow list that every query
/// scans.
#[derive(Clone, Debug)]
pub struct PointOctree {
    nodes: Vec<OctreeNode>,
    positions: Vec<Point3<f64>>,
    overflow: Vec<usize>,
}

fn octant(center: &Point3<f64>, p: &Point3<f64>) -> usize {
    usize::from(p.x >= center.x) | (usize::from(p.y >= center.y) << 1) | (usize::from(p.z >= center.z) << 2)
}

fn child_box(parent: &Aabb, octant: usize) -> Aabb {
    let c = parent.center();
    let pick = |bit: usize, axis: usize| {
        if octant & bit == 0 {
            (parent.min[axis], c[axis])
        } else {
            (c[axis], parent.max[axis])
        }
    };
    let (x0, x1) = pick(1, 0);
    let (y0, y1) = pick(2, 1);
    let (z0, z1) = pick(4, 2);
    Aabb::new(Point3::new(x0, y0, z0), Point3::new(x1, y1, z1))
}

impl PointOctree {
    #[must_use]
    pub fn new(bounds: Aabb) -> Self {
        Self {
            nodes: vec![OctreeNode::leaf(bounds, 0)],
            positions: Vec::new(),
            overflow: Vec::new(),
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    #[must_use]
    pub fn position(&self, id: usize) -> Option<&Point3<f64>> {
        self.positions.get(id)
    }

    #[must_use]
    pub fn positions(&self) -> &[Point3<f64>] {
        &self.positions
    }

    /// Adds `p` and returns its id.
    pub fn insert(&mut self, p: Point3<f64>) -> usize {
        let id = self.positions.len();
        self.positions.push(p);
        if !self.nodes[0].bbox.contains_point(&p) {
            self.overflow.push(id);
            return id;
        }

        let mut node = 0;
        while let Some(first) = self.nodes[node].children {
            node = first + octant(&self.nodes[node].bbox.center(), &p);
        }
        self.nodes[node].points.push(id);
        if self.nodes[node].points.len() > LEAF_CAPACITY && self.nodes[node].depth < MAX_DEPTH {
            self.split(node);
        }
        id
    }

    fn split(&mut self, node: usize) {
        let first = self.nodes.len();
        let bbox = self.nodes[node].bbox;
        let depth = self.nodes[node].depth + 1;
        self.nodes
            .extend((0..8).map(|o| OctreeNode::leaf(child_box(&bbox, o), depth)));
        let points = std::mem::take(&mut self.nodes[node].points);
        self.nodes[node].children = Some(first);
        let center = bbox.center();
        for id in points {
            let child = first + octant(&center, &self.positions[id]);
            self.nodes[child].points.push(id);
        }
    }

    /// Some point strictly closer than `radius` to `p`, if any.
    #[must_use]
    pub fn find_within(&self, p: &Point3<f64>, radius: f64) -> Option<usize> {
        let r2 = radius * radius;
        let hit = |id: &usize| (self.positions[*id] - p).norm_squared() < r2;
        if let Some(&id) = self.overflow.iter().find(|id| hit(id)) {
            return Some(id);
        }
        let mut stack = vec![0usize];
        while let Some(node) = stack.pop() {
            let n = &self.nodes[node];
            if n.bbox.distance_squared(p) >= r2 {
                continue;
            }
            if let Some(first) = n.children {
                stack.extend(first..first + 8);
            } else if let Some(&id) = n.points.iter().find(|id| hit(id)) {
                return Some(id);
            }
        }
        None
    }
}
