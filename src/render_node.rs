//! The scene graph consumed by the render job.

use glam::Vec2;

use crate::geometry::{Rect, RoundedRect};
use crate::transform::Transform;
use crate::types::{Color, ColorStop};

/// What a node draws.
#[derive(Clone, Debug, PartialEq)]
pub enum NodeKind {
    /// Children drawn in order.
    Container(Vec<RenderNode>),
    /// A child wrapped in a debug group.
    Debug {
        /// Label of the group; without one no group is opened.
        message: Option<String>,
        /// Wrapped node.
        child: Box<RenderNode>,
    },
    /// The bounds filled with one color.
    Color(Color),
    /// The bounds filled with a linear gradient.
    LinearGradient {
        /// Where offset 0 lies.
        start: Vec2,
        /// Where offset 1 lies.
        end: Vec2,
        /// Stops sorted by offset.
        stops: Vec<ColorStop>,
    },
    /// The bounds filled with an existing GL texture.
    Texture {
        /// GL texture name holding premultiplied RGBA.
        texture: u32,
    },
    /// A child clipped to a rectangle.
    Clip {
        /// Clip rectangle in the child's coordinates.
        clip: Rect,
        /// Clipped node.
        child: Box<RenderNode>,
    },
    /// A child clipped to a rounded rectangle.
    RoundedClip {
        /// Clip shape in the child's coordinates.
        clip: RoundedRect,
        /// Clipped node.
        child: Box<RenderNode>,
    },
    /// A child drawn through a transform.
    Transform {
        /// Child to parent transform.
        transform: Transform,
        /// Transformed node.
        child: Box<RenderNode>,
    },
}

/// A node and its bounds in its parent's coordinates.
#[derive(Clone, Debug, PartialEq)]
pub struct RenderNode {
    bounds: Rect,
    kind: NodeKind,
}

impl RenderNode {
    /// Group `children`.
    #[must_use]
    pub fn container(children: Vec<RenderNode>) -> Self {
        let bounds = children
            .iter()
            .map(|c| c.bounds)
            .reduce(|a, b| a.union(&b))
            .unwrap_or_default();
        Self {
            bounds,
            kind: NodeKind::Container(children),
        }
    }

    /// Wrap `child` in a debug group.
    #[must_use]
    pub fn debug(child: RenderNode, message: Option<String>) -> Self {
        Self {
            bounds: child.bounds,
            kind: NodeKind::Debug {
                message,
                child: Box::new(child),
            },
        }
    }

    /// Fill `bounds` with `color`.
    #[must_use]
    pub fn color(bounds: Rect, color: Color) -> Self {
        Self {
            bounds,
            kind: NodeKind::Color(color),
        }
    }

    /// Fill `bounds` with a gradient from `start` to `end`.
    #[must_use]
    pub fn linear_gradient(bounds: Rect, start: Vec2, end: Vec2, stops: Vec<ColorStop>) -> Self {
        Self {
            bounds,
            kind: NodeKind::LinearGradient { start, end, stops },
        }
    }

    /// Fill `bounds` with `texture`.
    #[must_use]
    pub fn texture(bounds: Rect, texture: u32) -> Self {
        Self {
            bounds,
            kind: NodeKind::Texture { texture },
        }
    }

    /// Clip `child` to `clip`.
    #[must_use]
    pub fn clip(child: RenderNode, clip: Rect) -> Self {
        Self {
            bounds: child.bounds.intersection(&clip),
            kind: NodeKind::Clip {
                clip,
                child: Box::new(child),
            },
        }
    }

    /// Clip `child` to a rounded rectangle.
    #[must_use]
    pub fn rounded_clip(child: RenderNode, clip: RoundedRect) -> Self {
        Self {
            bounds: child.bounds.intersection(&clip.bounds),
            kind: NodeKind::RoundedClip {
                clip,
                child: Box::new(child),
            },
        }
    }

    /// Draw `child` through `transform`.
    #[must_use]
    pub fn transform(child: RenderNode, transform: Transform) -> Self {
        Self {
            bounds: transform.transform_bounds(&child.bounds),
            kind: NodeKind::Transform {
                transform,
                child: Box::new(child),
            },
        }
    }

    /// Bounds in the parent's coordinates.
    #[must_use]
    pub fn bounds(&self) -> &Rect {
        &self.bounds
    }

    /// What the node draws.
    #[must_use]
    pub fn kind(&self) -> &NodeKind {
        &self.kind
    }

    /// Short name of the node kind.
    #[must_use]
    pub fn kind_name(&self) -> &'static str {
        match self.kind {
            NodeKind::Container(_) => "container",
            NodeKind::Debug { .. } => "debug",
            NodeKind::Color(_) => "color",
            NodeKind::LinearGradient { .. } => "linear-gradient",
            NodeKind::Texture { .. } => "texture",
            NodeKind::Clip { .. } => "clip",
            NodeKind::RoundedClip { .. } => "rounded-clip",
            NodeKind::Transform { .. } => "transform",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn container_bounds_cover_children() {
        let node = RenderNode::container(vec![
            RenderNode::color(Rect::new(0.0, 0.0, 10.0, 10.0), Color::default()),
            RenderNode::color(Rect::new(20.0, 5.0, 10.0, 10.0), Color::default()),
        ]);
        assert_eq!(node.bounds(), &Rect::new(0.0, 0.0, 30.0, 15.0));
    }

    #[test]
    fn empty_container_is_degenerate() {
        assert!(RenderNode::container(Vec::new()).bounds().is_degenerate());
    }

    #[test]
    fn clip_bounds_are_intersected() {
        let child = RenderNode::color(Rect::new(0.0, 0.0, 100.0, 100.0), Color::default());
        let node = RenderNode::clip(child, Rect::new(50.0, 50.0, 100.0, 100.0));
        assert_eq!(node.bounds(), &Rect::new(50.0, 50.0, 50.0, 50.0));
    }

    #[test]
    fn transform_bounds_follow_the_transform() {
        let child = RenderNode::color(Rect::new(0.0, 0.0, 10.0, 20.0), Color::default());
        let node = RenderNode::transform(child, Transform::scale(2.0, 2.0));
        assert_eq!(node.bounds(), &Rect::new(0.0, 0.0, 20.0, 40.0));
        assert_eq!(node.kind_name(), "transform");
    }
}
