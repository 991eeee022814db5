//! One frame's walk over a render node tree.
//!
//! The job keeps a stack of modelview transforms and a stack of clips while
//! visiting nodes, and turns every node it can handle into draws on the
//! driver's command queue. Cheap transforms (translations) only move a running
//! offset that is baked into vertex positions; scales push a new modelview.
//! Anything that would need an offscreen pass is handed to a [`Fallback`].

use glam::{Mat4, Vec2, Vec3};

use crate::backend::{ClearMask, GlBackend};
use crate::command_queue::CommandQueue;
use crate::driver::Driver;
use crate::error::Result;
use crate::geometry::{intersect_rounded_rectilinear, IRect, Rect, RoundedRect};
use crate::program::{Program, Uniform};
use crate::render_node::{NodeKind, RenderNode};
use crate::transform::{Transform, TransformCategory};
use crate::types::{Color, ColorStop, Vertex, N_VERTICES};

/// Near plane of the orthographic projection.
pub const ORTHO_NEAR_PLANE: f32 = -10000.0;
/// Far plane of the orthographic projection.
pub const ORTHO_FAR_PLANE: f32 = 10000.0;
/// Most color stops the gradient program accepts.
pub const MAX_GRADIENT_STOPS: usize = 6;

/// Why a node could not be drawn directly.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum FallbackReason {
    /// The node is a transform of this category, which needs the child
    /// rendered offscreen first.
    ComplexTransform(TransformCategory),
    /// The node's rounded clip cannot be combined with the current clip into
    /// one rounded rectangle.
    RoundedClip,
    /// The gradient has this many stops, more than [`MAX_GRADIENT_STOPS`].
    GradientStops(usize),
}

/// A node handed to a [`Fallback`] and the state it was reached with.
#[derive(Debug)]
pub struct FallbackRequest<'a> {
    /// The node that could not be drawn.
    pub node: &'a RenderNode,
    /// Why.
    pub reason: FallbackReason,
    /// Current modelview matrix.
    pub modelview: Mat4,
    /// Current clip in viewport coordinates.
    pub clip: RoundedRect,
    /// Running offset to add to the node's coordinates.
    pub offset: Vec2,
}

/// Renders nodes the job cannot draw directly, typically by drawing them
/// into an offscreen target and compositing the result.
pub trait Fallback {
    /// Handle one node.
    fn visit_fallback(&mut self, queue: &mut CommandQueue, request: &FallbackRequest<'_>);
}

/// The default [`Fallback`]: logs and draws nothing.
#[derive(Copy, Clone, Debug, Default)]
pub struct SkipFallback;

impl Fallback for SkipFallback {
    fn visit_fallback(&mut self, _queue: &mut CommandQueue, request: &FallbackRequest<'_>) {
        log::debug!(
            "skipping {} node at {:?}: {:?}",
            request.node.kind_name(),
            request.node.bounds(),
            request.reason
        );
    }
}

#[derive(Copy, Clone, Debug)]
struct Modelview {
    transform: Transform,
    matrix: Mat4,
    scale: Vec2,
    offset_before: Vec2,
}

impl Modelview {
    fn new(transform: Transform, offset_before: Vec2) -> Self {
        let scale = match transform.to_affine() {
            Some((scale, _)) => scale,
            None => transform.scale_factors(),
        };
        Self {
            matrix: transform.to_matrix(),
            transform,
            scale,
            offset_before,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq)]
struct Clip {
    rect: RoundedRect,
    is_rectilinear: bool,
}

/// Outcome of combining a node's clip with the current one.
#[derive(Clone, Debug, PartialEq)]
enum ClipResolution {
    /// Push this clip for the child.
    Push(RoundedRect),
    /// The new clip does not restrict anything further.
    Unchanged,
    /// Needs an offscreen pass.
    Offscreen,
}

/// Walks a render node tree for one frame.
pub struct RenderJob {
    viewport: Rect,
    projection: Mat4,
    scale_factor: f32,
    region: Option<IRect>,
    framebuffer: u32,
    flip_y: bool,

    modelview: Vec<Modelview>,
    clip: Vec<Clip>,
    offset: Vec2,
    scale: Vec2,

    fallback: Box<dyn Fallback>,
}

impl RenderJob {
    /// Prepare a job drawing into `framebuffer`.
    ///
    /// `viewport` is in device pixels; node coordinates are scaled by
    /// `scale_factor` into it. With a `region` (in node coordinates) only its
    /// bounding box is drawn. `flip_y` is set when rendering into a texture.
    ///
    /// # Panics
    ///
    /// Panics if `scale_factor` is not positive.
    #[must_use]
    pub fn new(
        viewport: Rect,
        scale_factor: f32,
        region: Option<IRect>,
        framebuffer: u32,
        flip_y: bool,
    ) -> Self {
        assert!(scale_factor > 0.0, "scale factor must be positive");

        let mut job = Self {
            viewport,
            projection: projection_matrix(&viewport, flip_y),
            scale_factor,
            region,
            framebuffer,
            flip_y,
            modelview: Vec::new(),
            clip: Vec::new(),
            offset: Vec2::ZERO,
            scale: Vec2::splat(scale_factor),
            fallback: Box::new(SkipFallback),
        };

        job.set_modelview(Transform::scale(scale_factor, scale_factor));

        let clip = match region {
            Some(region) => job.transform_bounds(&region.to_rect()),
            None => viewport,
        };
        job.push_clip(RoundedRect::from_rect(clip));

        job
    }

    /// Route nodes that cannot be drawn directly to `fallback`.
    pub fn set_fallback(&mut self, fallback: Box<dyn Fallback>) {
        self.fallback = fallback;
    }

    /// Give back the fallback so it can outlive the job.
    #[must_use]
    pub fn into_fallback(self) -> Box<dyn Fallback> {
        self.fallback
    }

    /// The viewport in device pixels.
    #[must_use]
    pub fn viewport(&self) -> &Rect {
        &self.viewport
    }

    /// The projection used for every draw.
    #[must_use]
    pub fn projection(&self) -> &Mat4 {
        &self.projection
    }

    /// Whether the projection keeps GL's bottom-up orientation.
    #[must_use]
    pub fn flip_y(&self) -> bool {
        self.flip_y
    }

    /// Record `root` into the driver's queue: a clear of the target, then
    /// every visible node.
    pub fn record(&mut self, driver: &mut Driver, root: &RenderNode) {
        let queue = driver.queue_mut();
        // The queue keeps the last frame's target; 0 must be rebound too.
        queue.bind_framebuffer(self.framebuffer);
        queue.clear(ClearMask::empty(), &self.viewport);

        self.visit_node(driver, root);
    }

    /// Record and execute `root` as one frame.
    ///
    /// The region's scissor covers every device pixel the region touches, so
    /// fractional scale factors scissor conservatively.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Gl`](crate::Error::Gl) if execution cannot create
    /// its buffers.
    pub fn render<B: GlBackend + ?Sized>(
        &mut self,
        driver: &mut Driver,
        backend: &B,
        root: &RenderNode,
    ) -> Result<()> {
        driver.begin_frame();
        self.record(driver, root);

        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let surface_height = self.viewport.height as u32;
        let scissor = self
            .region
            .map(|region| device_region(&region, self.scale_factor));
        let result = driver
            .queue()
            .execute(backend, surface_height, 1, scissor);

        driver.end_frame(backend);
        result
    }

    fn current_modelview(&self) -> &Modelview {
        self.modelview
            .last()
            .expect("modelview stack is never empty while rendering")
    }

    fn current_clip(&self) -> &Clip {
        self.clip
            .last()
            .expect("clip stack is never empty while rendering")
    }

    fn set_modelview(&mut self, transform: Transform) {
        let modelview = Modelview::new(transform, self.offset);
        self.offset = Vec2::ZERO;
        self.scale = modelview.scale;
        self.modelview.push(modelview);
    }

    fn push_modelview(&mut self, transform: &Transform) {
        let composed = match self.modelview.last() {
            Some(last) => last
                .transform
                .pre_translate(self.offset.x, self.offset.y)
                .then(transform),
            None => *transform,
        };
        self.set_modelview(composed);
    }

    fn pop_modelview(&mut self) {
        let head = self
            .modelview
            .pop()
            .expect("pop_modelview without matching push");
        self.offset = head.offset_before;
        if let Some(last) = self.modelview.last() {
            self.scale = last.scale;
        }
    }

    fn push_clip(&mut self, rect: RoundedRect) {
        self.clip.push(Clip {
            is_rectilinear: rect.is_rectilinear(),
            rect,
        });
    }

    fn pop_clip(&mut self) {
        self.clip.pop().expect("pop_clip without matching push");
    }

    /// `rect` in node coordinates mapped into the viewport.
    fn transform_bounds(&self, rect: &Rect) -> Rect {
        self.current_modelview()
            .transform
            .transform_bounds(&rect.offset(self.offset.x, self.offset.y))
    }

    fn overlaps_clip(&self, node: &RenderNode) -> bool {
        self.current_clip()
            .rect
            .bounds
            .intersects(&self.transform_bounds(node.bounds()))
    }

    fn fallback(&mut self, driver: &mut Driver, node: &RenderNode, reason: FallbackReason) {
        let request = FallbackRequest {
            node,
            reason,
            modelview: self.current_modelview().matrix,
            clip: self.current_clip().rect,
            offset: self.offset,
        };
        self.fallback.visit_fallback(driver.queue_mut(), &request);
    }

    fn visit_node(&mut self, driver: &mut Driver, node: &RenderNode) {
        if node.bounds().is_degenerate() || !self.overlaps_clip(node) {
            return;
        }

        match node.kind() {
            NodeKind::Container(children) => {
                for child in children {
                    self.visit_node(driver, child);
                }
            }
            NodeKind::Debug { message, child } => match message {
                Some(message) => {
                    driver.queue_mut().push_debug_group(message);
                    self.visit_node(driver, child);
                    driver.queue_mut().pop_debug_group();
                }
                None => self.visit_node(driver, child),
            },
            NodeKind::Color(color) => self.visit_color_node(driver, node, *color),
            NodeKind::LinearGradient { start, end, stops } => {
                self.visit_linear_gradient_node(driver, node, *start, *end, stops);
            }
            NodeKind::Texture { texture } => self.visit_texture_node(driver, node, *texture),
            NodeKind::Clip { clip, child } => {
                self.visit_clipped_child(driver, node, child, &RoundedRect::from_rect(*clip));
            }
            NodeKind::RoundedClip { clip, child } => {
                self.visit_clipped_child(driver, node, child, clip);
            }
            NodeKind::Transform { transform, child } => {
                self.visit_transform_node(driver, node, transform, child);
            }
        }
    }

    fn begin_draw(&self, program: &Program, queue: &mut CommandQueue) {
        program.begin_draw(
            queue,
            &self.viewport,
            &self.projection,
            &self.current_modelview().matrix,
            &self.current_clip().rect,
            1.0,
        );
    }

    /// Two triangles covering `rect`, shifted by the running offset.
    fn draw_rect(&self, queue: &mut CommandQueue, rect: &Rect) {
        let min_x = self.offset.x + rect.x;
        let min_y = self.offset.y + rect.y;
        let max_x = min_x + rect.width;
        let max_y = min_y + rect.height;

        let vertices: [Vertex; N_VERTICES] = [
            Vertex::new(min_x, min_y, 0.0, 0.0),
            Vertex::new(min_x, max_y, 0.0, 1.0),
            Vertex::new(max_x, min_y, 1.0, 0.0),
            Vertex::new(max_x, max_y, 1.0, 1.0),
            Vertex::new(min_x, max_y, 0.0, 1.0),
            Vertex::new(max_x, min_y, 1.0, 0.0),
        ];
        *queue.add_vertices(None) = vertices;
    }

    fn visit_color_node(&mut self, driver: &mut Driver, node: &RenderNode, color: Color) {
        let (programs, queue) = driver.split();
        let program = &programs.color;

        self.begin_draw(program, queue);
        program.set_uniform_color(queue, Uniform::Color, color);
        self.draw_rect(queue, node.bounds());
        program.end_draw(queue);
    }

    fn visit_linear_gradient_node(
        &mut self,
        driver: &mut Driver,
        node: &RenderNode,
        start: Vec2,
        end: Vec2,
        stops: &[ColorStop],
    ) {
        if stops.is_empty() {
            return;
        }
        if stops.len() > MAX_GRADIENT_STOPS {
            self.fallback(driver, node, FallbackReason::GradientStops(stops.len()));
            return;
        }

        let (programs, queue) = driver.split();
        let program = &programs.linear_gradient;
        let start = start + self.offset;
        let end = end + self.offset;

        #[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
        let count = stops.len() as i32;

        self.begin_draw(program, queue);
        program.set_uniform1i(queue, Uniform::NumColorStops, count);
        program.set_uniform1fv(queue, Uniform::ColorStops, bytemuck::cast_slice(stops));
        program.set_uniform4f(queue, Uniform::Points, [start.x, start.y, end.x, end.y]);
        self.draw_rect(queue, node.bounds());
        program.end_draw(queue);
    }

    fn visit_texture_node(&mut self, driver: &mut Driver, node: &RenderNode, texture: u32) {
        let (programs, queue) = driver.split();
        let program = &programs.blit;

        program.set_uniform_texture(queue, Uniform::Source, 0, texture);
        self.begin_draw(program, queue);
        self.draw_rect(queue, node.bounds());
        program.end_draw(queue);
    }

    /// Combine `clip` (in node coordinates) with the current clip.
    fn resolve_clip(&self, clip: &RoundedRect) -> ClipResolution {
        let transformed = RoundedRect {
            bounds: self.transform_bounds(&clip.bounds),
            corners: clip
                .scale_corners(self.scale.x.abs(), self.scale.y.abs())
                .mirror(self.scale.x < 0.0, self.scale.y < 0.0)
                .corners,
        };
        let current = self.current_clip();

        match (current.is_rectilinear, transformed.is_rectilinear()) {
            (true, true) => ClipResolution::Push(RoundedRect::from_rect(
                transformed.bounds.intersection(&current.rect.bounds),
            )),
            (false, true) => intersect_rounded_rectilinear(&transformed.bounds, &current.rect)
                .map_or(ClipResolution::Offscreen, ClipResolution::Push),
            (true, false) => match intersect_rounded_rectilinear(&current.rect.bounds, &transformed) {
                Some(intersection) => ClipResolution::Push(intersection),
                // The root clip is the viewport, which bounds drawing anyway.
                None if self.clip.len() <= 1 => ClipResolution::Push(transformed),
                None => ClipResolution::Offscreen,
            },
            (false, false) => {
                if transformed.inner_contains_rect(&current.rect.bounds) {
                    ClipResolution::Unchanged
                } else if current.rect.inner_contains_rect(&transformed.bounds) {
                    ClipResolution::Push(transformed)
                } else {
                    ClipResolution::Offscreen
                }
            }
        }
    }

    fn visit_clipped_child(
        &mut self,
        driver: &mut Driver,
        node: &RenderNode,
        child: &RenderNode,
        clip: &RoundedRect,
    ) {
        match self.resolve_clip(clip) {
            ClipResolution::Push(rect) => {
                if rect.bounds.is_degenerate() {
                    return;
                }
                self.push_clip(rect);
                self.visit_node(driver, child);
                self.pop_clip();
            }
            ClipResolution::Unchanged => self.visit_node(driver, child),
            ClipResolution::Offscreen => self.fallback(driver, node, FallbackReason::RoundedClip),
        }
    }

    fn visit_transform_node(
        &mut self,
        driver: &mut Driver,
        node: &RenderNode,
        transform: &Transform,
        child: &RenderNode,
    ) {
        match transform.category() {
            TransformCategory::Identity => self.visit_node(driver, child),
            TransformCategory::TwoDTranslate => {
                let delta = transform.to_translate().unwrap_or_default();
                self.offset += delta;
                self.visit_node(driver, child);
                self.offset -= delta;
            }
            TransformCategory::TwoDAffine => {
                self.push_modelview(transform);
                self.visit_node(driver, child);
                self.pop_modelview();
            }
            category @ (TransformCategory::TwoD
            | TransformCategory::ThreeD
            | TransformCategory::Any
            | TransformCategory::Unknown) => {
                self.fallback(driver, node, FallbackReason::ComplexTransform(category));
            }
        }
    }
}

/// `region` scaled to device pixels, rounded outwards.
#[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
fn device_region(region: &IRect, scale_factor: f32) -> IRect {
    let x0 = (region.x as f32 * scale_factor).floor();
    let y0 = (region.y as f32 * scale_factor).floor();
    let x1 = ((region.x + region.width) as f32 * scale_factor).ceil();
    let y1 = ((region.y + region.height) as f32 * scale_factor).ceil();
    IRect::new(x0 as i32, y0 as i32, (x1 - x0) as i32, (y1 - y0) as i32)
}

/// Orthographic projection over `viewport`, flipped so y grows downwards
/// unless `flip_y` asks for GL's bottom-up texture orientation.
#[must_use]
pub fn projection_matrix(viewport: &Rect, flip_y: bool) -> Mat4 {
    let projection = Mat4::orthographic_rh_gl(
        viewport.x,
        viewport.max_x(),
        viewport.y,
        viewport.max_y(),
        ORTHO_NEAR_PLANE,
        ORTHO_FAR_PLANE,
    );

    if flip_y {
        projection
    } else {
        Mat4::from_scale(Vec3::new(1.0, -1.0, 1.0)) * projection
    }
}
