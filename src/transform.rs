//! Categorised 2D/3D transforms.
//!
//! The render job picks a strategy per transform node based on its
//! [`TransformCategory`]: cheaper categories keep a reduced representation so
//! that composing and applying them never goes through a full matrix.

use glam::{Mat4, Vec2, Vec4};

use crate::geometry::Rect;

/// How expensive a transform is to apply, from most general to cheapest.
///
/// The ordering is meaningful: composing two transforms yields the lower of
/// their categories.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TransformCategory {
    /// Category could not be determined.
    Unknown,
    /// Arbitrary 4x4 matrix, possibly with perspective.
    Any,
    /// 3D transform without perspective.
    ThreeD,
    /// 2D transform that rotates or shears.
    TwoD,
    /// 2D scale followed by a translation.
    TwoDAffine,
    /// 2D translation.
    TwoDTranslate,
    /// No-op.
    Identity,
}

/// A transform in its cheapest known representation.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum Transform {
    /// Leaves points untouched.
    Identity,
    /// Adds an offset.
    Translate(Vec2),
    /// `p * scale + translate`.
    Affine {
        /// Per-axis scale.
        scale: Vec2,
        /// Offset applied after scaling.
        translate: Vec2,
    },
    /// Anything else.
    Matrix {
        /// The full matrix.
        matrix: Mat4,
        /// Cached category of `matrix`.
        category: TransformCategory,
    },
}

impl Default for Transform {
    fn default() -> Self {
        Self::Identity
    }
}

impl Transform {
    /// A translation.
    #[must_use]
    pub fn translate(dx: f32, dy: f32) -> Self {
        Self::Translate(Vec2::new(dx, dy))
    }

    /// A scale about the origin.
    #[must_use]
    pub fn scale(sx: f32, sy: f32) -> Self {
        Self::Affine {
            scale: Vec2::new(sx, sy),
            translate: Vec2::ZERO,
        }
    }

    /// A rotation about the origin, in degrees.
    #[must_use]
    pub fn rotate(degrees: f32) -> Self {
        Self::Matrix {
            matrix: Mat4::from_rotation_z(degrees.to_radians()),
            category: TransformCategory::TwoD,
        }
    }

    /// Classify an arbitrary matrix and reduce it to the cheapest variant.
    #[must_use]
    #[allow(clippy::float_cmp)]
    pub fn from_matrix(matrix: Mat4) -> Self {
        let is_3d = matrix.x_axis.z != 0.0
            || matrix.y_axis.z != 0.0
            || matrix.w_axis.z != 0.0
            || matrix.z_axis != Vec4::Z;
        let has_perspective =
            matrix.x_axis.w != 0.0 || matrix.y_axis.w != 0.0 || matrix.w_axis.w != 1.0;

        if has_perspective {
            return Self::Matrix {
                matrix,
                category: TransformCategory::Any,
            };
        }
        if is_3d {
            return Self::Matrix {
                matrix,
                category: TransformCategory::ThreeD,
            };
        }
        if matrix.x_axis.y != 0.0 || matrix.y_axis.x != 0.0 {
            return Self::Matrix {
                matrix,
                category: TransformCategory::TwoD,
            };
        }

        let scale = Vec2::new(matrix.x_axis.x, matrix.y_axis.y);
        let translate = Vec2::new(matrix.w_axis.x, matrix.w_axis.y);
        if scale != Vec2::ONE {
            Self::Affine { scale, translate }
        } else if translate != Vec2::ZERO {
            Self::Translate(translate)
        } else {
            Self::Identity
        }
    }

    /// The category of this transform.
    #[must_use]
    pub fn category(&self) -> TransformCategory {
        match self {
            Self::Identity => TransformCategory::Identity,
            Self::Translate(_) => TransformCategory::TwoDTranslate,
            Self::Affine { .. } => TransformCategory::TwoDAffine,
            Self::Matrix { category, .. } => *category,
        }
    }

    /// The transform as a 4x4 matrix.
    #[must_use]
    pub fn to_matrix(&self) -> Mat4 {
        match self {
            Self::Identity => Mat4::IDENTITY,
            Self::Translate(t) => Mat4::from_translation(t.extend(0.0)),
            Self::Affine { scale, translate } => {
                Mat4::from_translation(translate.extend(0.0)) * Mat4::from_scale(scale.extend(1.0))
            }
            Self::Matrix { matrix, .. } => *matrix,
        }
    }

    /// The offset of a translation-only (or identity) transform.
    #[must_use]
    pub fn to_translate(&self) -> Option<Vec2> {
        match self {
            Self::Identity => Some(Vec2::ZERO),
            Self::Translate(t) => Some(*t),
            _ => None,
        }
    }

    /// `(scale, translate)` for transforms of category
    /// [`TwoDAffine`](TransformCategory::TwoDAffine) or cheaper.
    #[must_use]
    pub fn to_affine(&self) -> Option<(Vec2, Vec2)> {
        match self {
            Self::Identity => Some((Vec2::ONE, Vec2::ZERO)),
            Self::Translate(t) => Some((Vec2::ONE, *t)),
            Self::Affine { scale, translate } => Some((*scale, *translate)),
            Self::Matrix { .. } => None,
        }
    }

    /// Compose `self` with `child`, so that points are mapped by `child`
    /// first and by `self` second.
    #[must_use]
    pub fn then(&self, child: &Transform) -> Transform {
        match (self, child) {
            (Self::Identity, other) | (other, Self::Identity) => *other,
            (Self::Translate(a), Self::Translate(b)) => Self::Translate(*a + *b),
            (Self::Translate(a), Self::Affine { scale, translate }) => Self::Affine {
                scale: *scale,
                translate: *translate + *a,
            },
            (Self::Affine { scale, translate }, Self::Translate(b)) => Self::Affine {
                scale: *scale,
                translate: *translate + *scale * *b,
            },
            (
                Self::Affine {
                    scale: s1,
                    translate: t1,
                },
                Self::Affine {
                    scale: s2,
                    translate: t2,
                },
            ) => Self::Affine {
                scale: *s1 * *s2,
                translate: *t1 + *s1 * *t2,
            },
            _ => Self::Matrix {
                matrix: self.to_matrix() * child.to_matrix(),
                category: self.category().min(child.category()),
            },
        }
    }

    /// `self` composed with a translation applied first.
    #[must_use]
    pub fn pre_translate(&self, dx: f32, dy: f32) -> Transform {
        self.then(&Transform::translate(dx, dy))
    }

    /// Map a single point.
    #[must_use]
    pub fn transform_point(&self, point: Vec2) -> Vec2 {
        match self {
            Self::Identity => point,
            Self::Translate(t) => point + *t,
            Self::Affine { scale, translate } => point * *scale + *translate,
            Self::Matrix { matrix, .. } => matrix.project_point3(point.extend(0.0)).truncate(),
        }
    }

    /// The axis-aligned bounding box of `rect` after transformation.
    #[must_use]
    pub fn transform_bounds(&self, rect: &Rect) -> Rect {
        let min = Vec2::new(rect.x, rect.y);
        let max = Vec2::new(rect.max_x(), rect.max_y());

        match self {
            Self::Identity | Self::Translate(_) | Self::Affine { .. } => {
                Rect::from_points(self.transform_point(min), self.transform_point(max))
            }
            Self::Matrix { .. } => {
                let corners = [
                    self.transform_point(min),
                    self.transform_point(Vec2::new(max.x, min.y)),
                    self.transform_point(max),
                    self.transform_point(Vec2::new(min.x, max.y)),
                ];
                let lo = corners.iter().copied().fold(Vec2::splat(f32::INFINITY), Vec2::min);
                let hi = corners
                    .iter()
                    .copied()
                    .fold(Vec2::splat(f32::NEG_INFINITY), Vec2::max);
                Rect::from_points(lo, hi)
            }
        }
    }

    /// Magnitude of the scale applied along each axis.
    #[must_use]
    pub fn scale_factors(&self) -> Vec2 {
        match self {
            Self::Identity | Self::Translate(_) => Vec2::ONE,
            Self::Affine { scale, .. } => scale.abs(),
            Self::Matrix { matrix, .. } => Vec2::new(
                matrix.x_axis.truncate().length(),
                matrix.y_axis.truncate().length(),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;

    fn assert_vec_eq(a: Vec2, b: Vec2) {
        assert!((a - b).length() < 1e-4, "expected {b:?}, got {a:?}");
    }

    #[test]
    fn classify_matrices() {
        assert_eq!(Transform::from_matrix(Mat4::IDENTITY), Transform::Identity);
        assert_eq!(
            Transform::from_matrix(Mat4::from_translation(Vec3::new(3.0, 4.0, 0.0))),
            Transform::translate(3.0, 4.0)
        );
        assert_eq!(
            Transform::from_matrix(Mat4::from_scale(Vec3::new(2.0, 3.0, 1.0))).category(),
            TransformCategory::TwoDAffine
        );
        assert_eq!(
            Transform::from_matrix(Mat4::from_rotation_z(0.5)).category(),
            TransformCategory::TwoD
        );
        assert_eq!(
            Transform::from_matrix(Mat4::from_rotation_x(0.5)).category(),
            TransformCategory::ThreeD
        );
    }

    #[test]
    fn composing_keeps_cheapest_representation() {
        let t = Transform::translate(10.0, 0.0).then(&Transform::scale(2.0, 2.0));
        assert_eq!(t.category(), TransformCategory::TwoDAffine);
        assert_vec_eq(t.transform_point(Vec2::new(1.0, 1.0)), Vec2::new(12.0, 2.0));

        let t = Transform::scale(2.0, 2.0).pre_translate(5.0, 5.0);
        assert_vec_eq(t.transform_point(Vec2::ZERO), Vec2::new(10.0, 10.0));
    }

    #[test]
    fn composing_with_rotation_falls_back_to_matrix() {
        let t = Transform::translate(1.0, 1.0).then(&Transform::rotate(90.0));
        assert_eq!(t.category(), TransformCategory::TwoD);
        assert_vec_eq(t.transform_point(Vec2::new(1.0, 0.0)), Vec2::new(1.0, 2.0));
    }

    #[test]
    fn affine_matches_matrix() {
        let t = Transform::Affine {
            scale: Vec2::new(2.0, -3.0),
            translate: Vec2::new(1.0, 1.0),
        };
        let p = Vec2::new(4.0, 5.0);
        let via_matrix = t.to_matrix().transform_point3(p.extend(0.0)).truncate();
        assert_vec_eq(t.transform_point(p), via_matrix);
    }

    #[test]
    fn bounds_keep_width_and_height_apart() {
        let t = Transform::translate(5.0, 5.0);
        let r = t.transform_bounds(&Rect::new(0.0, 0.0, 10.0, 40.0));
        assert_eq!(r, Rect::new(5.0, 5.0, 10.0, 40.0));
    }

    #[test]
    fn bounds_with_negative_scale_are_normalized() {
        let t = Transform::scale(-1.0, 2.0);
        let r = t.transform_bounds(&Rect::new(0.0, 0.0, 10.0, 10.0));
        assert_eq!(r, Rect::new(-10.0, 0.0, 10.0, 20.0));
    }

    #[test]
    fn rotated_bounds_cover_all_corners() {
        let r = Transform::rotate(45.0).transform_bounds(&Rect::new(0.0, 0.0, 10.0, 10.0));
        let half_diag = 10.0 * std::f32::consts::FRAC_1_SQRT_2;
        assert!((r.x + half_diag).abs() < 1e-3);
        assert!((r.width - 2.0 * half_diag).abs() < 1e-3);
        assert!((r.height - 2.0 * half_diag).abs() < 1e-3);
    }

    #[test]
    fn scale_factors_of_rotation_are_unit() {
        let s = Transform::rotate(30.0).scale_factors();
        assert_vec_eq(s, Vec2::ONE);
    }
}
