//! Total lookup table from shape-type pairs to collide routines and from
//! (cast kind, shape type) to cast routines.

use std::sync::Arc;

use super::{
    casting::{self, CastFn},
    manifold::Manifold,
    narrowphase::{self, CollideFn},
    primitives::{CastHit, CastKind, CastShape, CAST_KIND_COUNT},
    shapes::ShapeInstance,
};
use crate::core::collider::{ShapeType, SHAPE_TYPE_COUNT};

/// How faithfully a routine follows the real geometry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Accuracy {
    Exact,
    /// Answers from world bounds only.
    BoundingVolume,
}

#[derive(Debug, Clone, Copy)]
pub struct CollideEntry {
    pub func: CollideFn,
    /// The routine was registered for `(b, a)`; call it swapped and flip the result.
    pub flipped: bool,
    pub accuracy: Accuracy,
}

impl CollideEntry {
    pub fn run(&self, a: &ShapeInstance, b: &ShapeInstance) -> Option<Manifold> {
        if self.flipped {
            (self.func)(b, a).map(Manifold::flipped)
        } else {
            (self.func)(a, b)
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct CastEntry {
    pub func: CastFn,
    pub accuracy: Accuracy,
}

impl CastEntry {
    pub fn run(&self, cast: &CastShape, instance: &ShapeInstance) -> Option<CastHit> {
        (self.func)(cast, instance)
    }
}

const AABB_COLLIDE: CollideEntry = CollideEntry {
    func: narrowphase::aabb_proxy,
    flipped: false,
    accuracy: Accuracy::BoundingVolume,
};

const AABB_CAST: CastEntry = CastEntry {
    func: casting::aabb_fallback,
    accuracy: Accuracy::BoundingVolume,
};

/// Immutable after construction; share it with [`ShapeDispatchTable::shared`].
#[derive(Debug, Clone)]
pub struct ShapeDispatchTable {
    collide: [[Option<CollideEntry>; SHAPE_TYPE_COUNT]; SHAPE_TYPE_COUNT],
    cast: [[Option<CastEntry>; SHAPE_TYPE_COUNT]; CAST_KIND_COUNT],
}

impl Default for ShapeDispatchTable {
    fn default() -> Self {
        Self::new()
    }
}

impl ShapeDispatchTable {
    pub fn new() -> Self {
        let mut table = Self {
            collide: [[None; SHAPE_TYPE_COUNT]; SHAPE_TYPE_COUNT],
            cast: [[None; SHAPE_TYPE_COUNT]; CAST_KIND_COUNT],
        };
        table.register_bounding_volumes();
        table.register_primitives();
        table.register_complex();
        table.register_midphase();
        table
    }

    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Blanket AABB proxies: every pair with a complex shape and every cast.
    fn register_bounding_volumes(&mut self) {
        for a in ShapeType::ALL {
            for b in ShapeType::ALL {
                if a.is_complex() || b.is_complex() {
                    self.collide[a.index()][b.index()] = Some(AABB_COLLIDE);
                }
            }
            for kind in CastKind::ALL {
                self.cast[kind.index()][a.index()] = Some(AABB_CAST);
            }
        }
    }

    fn register_primitives(&mut self) {
        use ShapeType::*;

        for a in ShapeType::PRIMITIVES {
            for b in ShapeType::PRIMITIVES {
                self.register_collide(a, b, narrowphase::convex_convex);
            }
        }
        self.register_collide(Sphere, Sphere, narrowphase::sphere_sphere);
        self.register_collide(Sphere, Box, narrowphase::sphere_box);
        self.register_collide(Sphere, Capsule, narrowphase::sphere_capsule);
        self.register_collide(Capsule, Capsule, narrowphase::capsule_capsule);
        self.register_collide(Capsule, Box, narrowphase::capsule_box);
        self.register_collide(Box, Box, narrowphase::box_box);

        let exact = |func: CastFn| CastEntry {
            func,
            accuracy: Accuracy::Exact,
        };
        for kind in [CastKind::Ray, CastKind::Segment] {
            let row = &mut self.cast[kind.index()];
            row[Sphere.index()] = Some(exact(casting::line_sphere_shape));
            row[Box.index()] = Some(exact(casting::line_box));
            row[Capsule.index()] = Some(exact(casting::line_capsule));
            row[Cylinder.index()] = Some(exact(casting::line_cylinder));
            row[Ellipsoid.index()] = Some(exact(casting::line_ellipsoid));
        }
        for kind in [CastKind::Aabb, CastKind::Sphere] {
            for shape in ShapeType::ALL {
                self.cast[kind.index()][shape.index()] = Some(exact(casting::volume_overlap));
            }
        }
        let frustum = &mut self.cast[CastKind::Frustum.index()];
        frustum[Sphere.index()] = Some(exact(casting::frustum_sphere));
        frustum[Box.index()] = Some(exact(casting::frustum_box));
    }

    fn register_complex(&mut self) {
        use ShapeType::*;

        for complex in ShapeType::COMPLEX {
            for primitive in ShapeType::PRIMITIVES {
                self.register_collide(complex, primitive, narrowphase::complex_convex);
            }
        }
        // Hull pieces pair with anything; surface against surface stays a proxy.
        for other in [MultiConvexMesh, TriangleMesh, HeightField] {
            self.register_collide(MultiConvexMesh, other, narrowphase::complex_complex);
        }
        // Hulls are convex: their own pieces are themselves.
        for other in [ConvexMesh, TriangleMesh, HeightField] {
            self.register_collide(other, ConvexMesh, narrowphase::complex_convex);
        }
        self.register_collide(MultiConvexMesh, ConvexMesh, narrowphase::complex_convex);

        let frustum = &mut self.cast[CastKind::Frustum.index()];
        let hull = CastEntry {
            func: casting::frustum_hull,
            accuracy: Accuracy::Exact,
        };
        frustum[ConvexMesh.index()] = Some(hull);
        frustum[MultiConvexMesh.index()] = Some(hull);
    }

    /// Ray and segment casts routed through each complex shape's own midphase.
    fn register_midphase(&mut self) {
        for kind in [CastKind::Ray, CastKind::Segment] {
            for shape in ShapeType::COMPLEX {
                self.cast[kind.index()][shape.index()] = Some(CastEntry {
                    func: casting::line_complex,
                    accuracy: Accuracy::Exact,
                });
            }
        }
    }

    /// Registers `func` for `(a, b)` and its flipped form for `(b, a)`.
    fn register_collide(&mut self, a: ShapeType, b: ShapeType, func: CollideFn) {
        self.collide[a.index()][b.index()] = Some(CollideEntry {
            func,
            flipped: false,
            accuracy: Accuracy::Exact,
        });
        if a != b {
            self.collide[b.index()][a.index()] = Some(CollideEntry {
                func,
                flipped: true,
                accuracy: Accuracy::Exact,
            });
        }
    }

    pub fn is_registered(&self, a: ShapeType, b: ShapeType) -> bool {
        self.collide[a.index()][b.index()].is_some()
    }

    pub fn is_cast_registered(&self, kind: CastKind, shape: ShapeType) -> bool {
        self.cast[kind.index()][shape.index()].is_some()
    }

    pub fn collide_entry(&self, a: ShapeType, b: ShapeType) -> CollideEntry {
        match self.collide[a.index()][b.index()] {
            Some(entry) => entry,
            None => {
                debug_assert!(false, "no collide routine for {a:?} x {b:?}");
                log::error!("no collide routine for {a:?} x {b:?}; using bounding volumes");
                AABB_COLLIDE
            }
        }
    }

    pub fn cast_entry(&self, kind: CastKind, shape: ShapeType) -> CastEntry {
        match self.cast[kind.index()][shape.index()] {
            Some(entry) => entry,
            None => {
                debug_assert!(false, "no cast routine for {kind:?} x {shape:?}");
                log::error!("no cast routine for {kind:?} x {shape:?}; using bounding volumes");
                AABB_CAST
            }
        }
    }

    pub fn collide(&self, a: &ShapeInstance, b: &ShapeInstance) -> Option<Manifold> {
        let mut manifold = self.collide_entry(a.shape_type(), b.shape_type()).run(a, b)?;
        manifold.reduce();
        Some(manifold)
    }

    pub fn cast(&self, cast: &CastShape, instance: &ShapeInstance) -> Option<CastHit> {
        self.cast_entry(cast.kind(), instance.shape_type())
            .run(cast, instance)
    }
}
