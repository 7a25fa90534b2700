use glam::Vec3;

/// Most points a manifold keeps after reduction.
pub const MAX_MANIFOLD_POINTS: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ManifoldPoint {
    /// World-space point midway between the two surfaces.
    pub position: Vec3,
    /// Unit normal from A towards B at this point.
    pub normal: Vec3,
    pub penetration: f32,
}

/// Contact points produced by one collide routine. Normals point from A towards B.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Manifold {
    /// Representative normal, taken from the deepest point.
    pub normal: Vec3,
    pub points: Vec<ManifoldPoint>,
}

impl Manifold {
    pub fn new(normal: Vec3) -> Self {
        Self {
            normal,
            points: Vec::with_capacity(MAX_MANIFOLD_POINTS),
        }
    }

    pub fn single(position: Vec3, normal: Vec3, penetration: f32) -> Self {
        let mut manifold = Self::new(normal);
        manifold.push(position, normal, penetration);
        manifold
    }

    pub fn push(&mut self, position: Vec3, normal: Vec3, penetration: f32) {
        self.points.push(ManifoldPoint {
            position,
            normal,
            penetration,
        });
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn max_penetration(&self) -> f32 {
        self.points
            .iter()
            .map(|p| p.penetration)
            .fold(0.0, f32::max)
    }

    /// Swaps the roles of A and B.
    pub fn flip(&mut self) {
        self.normal = -self.normal;
        for point in &mut self.points {
            point.normal = -point.normal;
        }
    }

    pub fn flipped(mut self) -> Self {
        self.flip();
        self
    }

    /// Appends another manifold's points; the deeper of the two supplies the normal.
    pub fn merge(&mut self, other: Manifold) {
        if other.max_penetration() > self.max_penetration() || self.points.is_empty() {
            self.normal = other.normal;
        }
        self.points.extend(other.points);
    }

    /// Keeps the deepest point and the points spreading the widest area around it.
    pub fn reduce(&mut self) {
        if self.points.len() <= MAX_MANIFOLD_POINTS {
            return;
        }
        let mut remaining = std::mem::take(&mut self.points);
        let mut kept = Vec::with_capacity(MAX_MANIFOLD_POINTS);

        let deepest = index_of_max(&remaining, |p| p.penetration);
        kept.push(remaining.swap_remove(deepest));

        let first = kept[0].position;
        let furthest = index_of_max(&remaining, |p| p.position.distance_squared(first));
        kept.push(remaining.swap_remove(furthest));

        let second = kept[1].position;
        let widest = index_of_max(&remaining, |p| {
            (second - first).cross(p.position - first).length_squared()
        });
        kept.push(remaining.swap_remove(widest));

        let third = kept[2].position;
        let opposite = index_of_max(&remaining, |p| {
            let q = p.position;
            (second - first).cross(q - first).length_squared()
                + (third - second).cross(q - second).length_squared()
                + (first - third).cross(q - third).length_squared()
        });
        kept.push(remaining.swap_remove(opposite));

        self.points = kept;
    }
}

fn index_of_max(points: &[ManifoldPoint], score: impl Fn(&ManifoldPoint) -> f32) -> usize {
    let mut best = 0;
    let mut best_score = f32::NEG_INFINITY;
    for (i, point) in points.iter().enumerate() {
        let s = score(point);
        if s > best_score {
            best_score = s;
            best = i;
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reduce_keeps_deepest_and_corners() {
        let mut manifold = Manifold::new(Vec3::Y);
        for x in [-1.0, -0.5, 0.0, 0.5, 1.0] {
            for z in [-1.0, 1.0] {
                let depth = if x == 0.0 && z == 1.0 { 0.3 } else { 0.1 };
                manifold.push(Vec3::new(x, 0.0, z), Vec3::Y, depth);
            }
        }
        manifold.reduce();
        assert_eq!(manifold.len(), MAX_MANIFOLD_POINTS);
        assert!(manifold.points.iter().any(|p| p.penetration == 0.3));
        assert!(manifold.points.iter().any(|p| p.position.z < 0.0));
    }

    #[test]
    fn flip_negates_normals() {
        let manifold = Manifold::single(Vec3::ZERO, Vec3::X, 0.1).flipped();
        assert_eq!(manifold.normal, Vec3::NEG_X);
        assert_eq!(manifold.points[0].normal, Vec3::NEG_X);
    }
}
