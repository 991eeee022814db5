//! Rectangles, rounded rectangles and the clip intersection helpers built on
//! them.

use glam::Vec2;

/// An axis-aligned rectangle with its origin at the top-left corner.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct Rect {
    /// Left edge.
    pub x: f32,
    /// Top edge.
    pub y: f32,
    /// Width, expected to be non-negative.
    pub width: f32,
    /// Height, expected to be non-negative.
    pub height: f32,
}

impl Rect {
    /// Create a rectangle from its origin and size.
    #[must_use]
    pub const fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// The smallest rectangle containing both points, regardless of their
    /// order.
    #[must_use]
    pub fn from_points(a: Vec2, b: Vec2) -> Self {
        let min = a.min(b);
        let max = a.max(b);
        Self::new(min.x, min.y, max.x - min.x, max.y - min.y)
    }

    /// Right edge.
    #[must_use]
    pub fn max_x(&self) -> f32 {
        self.x + self.width
    }

    /// Bottom edge.
    #[must_use]
    pub fn max_y(&self) -> f32 {
        self.y + self.height
    }

    /// Whether either dimension is zero or not a number.
    ///
    /// Such rectangles can never produce pixels.
    #[must_use]
    pub fn is_degenerate(&self) -> bool {
        self.width == 0.0 || self.height == 0.0 || self.width.is_nan() || self.height.is_nan()
    }

    /// Translate the rectangle.
    #[must_use]
    pub fn offset(&self, dx: f32, dy: f32) -> Self {
        Self::new(self.x + dx, self.y + dy, self.width, self.height)
    }

    /// Whether the two rectangles overlap or touch.
    ///
    /// Both rectangles are assumed to be normalized. Touching edges count as
    /// overlapping, which keeps culling conservative.
    #[must_use]
    pub fn intersects(&self, other: &Rect) -> bool {
        !(self.x > other.max_x()
            || self.max_x() < other.x
            || self.y > other.max_y()
            || self.max_y() < other.y)
    }

    /// Whether `other` lies entirely inside `self`.
    #[must_use]
    pub fn contains_rect(&self, other: &Rect) -> bool {
        other.x >= self.x
            && other.max_x() <= self.max_x()
            && other.y >= self.y
            && other.max_y() <= self.max_y()
    }

    /// The overlapping area of both rectangles, or an empty rectangle at the
    /// origin when they are disjoint.
    #[must_use]
    pub fn intersection(&self, other: &Rect) -> Rect {
        let x = self.x.max(other.x);
        let y = self.y.max(other.y);
        let max_x = self.max_x().min(other.max_x());
        let max_y = self.max_y().min(other.max_y());

        if max_x <= x || max_y <= y {
            Rect::default()
        } else {
            Rect::new(x, y, max_x - x, max_y - y)
        }
    }

    /// The smallest rectangle containing both.
    #[must_use]
    pub fn union(&self, other: &Rect) -> Rect {
        let x = self.x.min(other.x);
        let y = self.y.min(other.y);
        let max_x = self.max_x().max(other.max_x());
        let max_y = self.max_y().max(other.max_y());
        Rect::new(x, y, max_x - x, max_y - y)
    }
}

/// An integer rectangle, used for damage regions and scissoring.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct IRect {
    /// Left edge.
    pub x: i32,
    /// Top edge.
    pub y: i32,
    /// Width.
    pub width: i32,
    /// Height.
    pub height: i32,
}

impl IRect {
    /// Create an integer rectangle.
    #[must_use]
    pub const fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// The smallest rectangle containing both.
    #[must_use]
    pub fn union(&self, other: &IRect) -> IRect {
        let x = self.x.min(other.x);
        let y = self.y.min(other.y);
        let max_x = (self.x + self.width).max(other.x + other.width);
        let max_y = (self.y + self.height).max(other.y + other.height);
        IRect::new(x, y, max_x - x, max_y - y)
    }

    /// Whether `other` lies entirely inside `self`.
    #[must_use]
    pub fn contains(&self, other: &IRect) -> bool {
        other.x >= self.x
            && other.y >= self.y
            && other.x + other.width <= self.x + self.width
            && other.y + other.height <= self.y + self.height
    }

    /// Convert to a floating point rectangle.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn to_rect(&self) -> Rect {
        Rect::new(
            self.x as f32,
            self.y as f32,
            self.width as f32,
            self.height as f32,
        )
    }
}

/// One of the four corners of a rounded rectangle, in uniform order.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Corner {
    /// Top-left, index 0.
    TopLeft = 0,
    /// Top-right, index 1.
    TopRight = 1,
    /// Bottom-right, index 2.
    BottomRight = 2,
    /// Bottom-left, index 3.
    BottomLeft = 3,
}

impl Corner {
    /// All corners in uniform order.
    pub const ALL: [Corner; 4] = [
        Corner::TopLeft,
        Corner::TopRight,
        Corner::BottomRight,
        Corner::BottomLeft,
    ];
}

/// A rectangle with elliptical corners.
///
/// Each corner is described by its horizontal and vertical radius.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct RoundedRect {
    /// Outer bounds.
    pub bounds: Rect,
    /// Corner radii (`x` = width, `y` = height) indexed by [`Corner`].
    pub corners: [Vec2; 4],
}

impl RoundedRect {
    /// A rounded rectangle with square corners.
    #[must_use]
    pub fn from_rect(bounds: Rect) -> Self {
        Self {
            bounds,
            corners: [Vec2::ZERO; 4],
        }
    }

    /// A rounded rectangle with the same circular radius on every corner.
    #[must_use]
    pub fn with_radius(bounds: Rect, radius: f32) -> Self {
        Self {
            bounds,
            corners: [Vec2::splat(radius); 4],
        }
    }

    /// Radius of one corner.
    #[must_use]
    pub fn corner(&self, corner: Corner) -> Vec2 {
        self.corners[corner as usize]
    }

    /// Whether the given corner is actually rounded.
    #[must_use]
    pub fn has_corner(&self, corner: Corner) -> bool {
        let c = self.corner(corner);
        c.x > 0.0 && c.y > 0.0
    }

    /// Whether no corner is rounded, making this a plain rectangle.
    #[must_use]
    pub fn is_rectilinear(&self) -> bool {
        self.corners.iter().all(|c| c.x <= 0.0 || c.y <= 0.0)
    }

    /// The bounding box of one corner's ellipse quadrant.
    #[must_use]
    pub fn corner_rect(&self, corner: Corner) -> Rect {
        let b = &self.bounds;
        let c = self.corner(corner);
        match corner {
            Corner::TopLeft => Rect::new(b.x, b.y, c.x, c.y),
            Corner::TopRight => Rect::new(b.max_x() - c.x, b.y, c.x, c.y),
            Corner::BottomRight => Rect::new(b.max_x() - c.x, b.max_y() - c.y, c.x, c.y),
            Corner::BottomLeft => Rect::new(b.x, b.max_y() - c.y, c.x, c.y),
        }
    }

    /// The bounds shrunk on each side by the largest radius touching that
    /// side. Everything inside it is unaffected by the rounding.
    #[must_use]
    pub fn inner_rect(&self) -> Rect {
        let left = self
            .corner(Corner::TopLeft)
            .x
            .max(self.corner(Corner::BottomLeft).x);
        let right = self
            .corner(Corner::TopRight)
            .x
            .max(self.corner(Corner::BottomRight).x);
        let top = self
            .corner(Corner::TopLeft)
            .y
            .max(self.corner(Corner::TopRight).y);
        let bottom = self
            .corner(Corner::BottomLeft)
            .y
            .max(self.corner(Corner::BottomRight).y);

        Rect::new(
            self.bounds.x + left,
            self.bounds.y + top,
            self.bounds.width - left - right,
            self.bounds.height - top - bottom,
        )
    }

    /// Conservative containment test against [`inner_rect`](Self::inner_rect).
    #[must_use]
    pub fn inner_contains_rect(&self, rect: &Rect) -> bool {
        self.inner_rect().contains_rect(rect)
    }

    /// Scale every corner radius.
    #[must_use]
    pub fn scale_corners(mut self, scale_x: f32, scale_y: f32) -> Self {
        let scale = Vec2::new(scale_x, scale_y);
        for c in &mut self.corners {
            *c *= scale;
        }
        self
    }

    /// Swap corners to match the shape mirrored horizontally and/or
    /// vertically.
    #[must_use]
    pub fn mirror(mut self, horizontal: bool, vertical: bool) -> Self {
        let [tl, tr, br, bl] = [
            Corner::TopLeft as usize,
            Corner::TopRight as usize,
            Corner::BottomRight as usize,
            Corner::BottomLeft as usize,
        ];
        if horizontal {
            self.corners.swap(tl, tr);
            self.corners.swap(bl, br);
        }
        if vertical {
            self.corners.swap(tl, bl);
            self.corners.swap(tr, br);
        }
        self
    }

    /// Uniform layout: bounds as one `vec4`, then the corners as two `vec4`s.
    #[must_use]
    pub fn to_uniform_data(&self) -> [f32; 12] {
        let b = &self.bounds;
        let c = &self.corners;
        [
            b.x, b.y, b.width, b.height, c[0].x, c[0].y, c[1].x, c[1].y, c[2].x, c[2].y, c[3].x,
            c[3].y,
        ]
    }
}

/// Intersect a plain rectangle with a rounded one.
///
/// A rounded corner survives only if the rectangle fully contains that
/// corner's box; corners the rectangle does not touch are squared off. If the
/// rectangle cuts through a rounded corner, the intersection is not a single
/// rounded rectangle and `None` is returned.
#[must_use]
pub fn intersect_rounded_rectilinear(
    non_rounded: &Rect,
    rounded: &RoundedRect,
) -> Option<RoundedRect> {
    let mut touched = [false; 4];

    for corner in Corner::ALL {
        if !rounded.has_corner(corner) {
            continue;
        }
        let corner_rect = rounded.corner_rect(corner);
        if non_rounded.intersects(&corner_rect) {
            if !non_rounded.contains_rect(&corner_rect) {
                return None;
            }
            touched[corner as usize] = true;
        }
    }

    let mut result = RoundedRect::from_rect(non_rounded.intersection(&rounded.bounds));
    for corner in Corner::ALL {
        if touched[corner as usize] {
            result.corners[corner as usize] = rounded.corner(corner);
        }
    }

    Some(result)
}
