//! The top-level renderer: a backend, the driver for its surface and the
//! fallback used for nodes that need offscreen passes.

use crate::backend::GlBackend;
use crate::driver::Driver;
use crate::error::Result;
use crate::geometry::{IRect, Rect};
use crate::render_job::{Fallback, RenderJob, SkipFallback};
use crate::render_node::RenderNode;

/// Renders node trees to the window surface or into textures.
pub struct Renderer<B: GlBackend> {
    backend: B,
    driver: Driver,
    fallback: Box<dyn Fallback>,
}

impl<B: GlBackend> Renderer<B> {
    /// Compile the built-in programs on `backend`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Gl`](crate::Error::Gl) if a program fails to compile.
    pub fn new(backend: B) -> Result<Self> {
        let driver = Driver::new(&backend, None)?;
        Ok(Self {
            backend,
            driver,
            fallback: Box::new(SkipFallback),
        })
    }

    /// The backend GL calls go to.
    #[must_use]
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// The driver for this renderer's surface.
    #[must_use]
    pub fn driver(&self) -> &Driver {
        &self.driver
    }

    /// Handle nodes the renderer cannot draw directly with `fallback`.
    pub fn set_fallback(&mut self, fallback: Box<dyn Fallback>) {
        self.fallback = fallback;
    }

    /// Draw `root` to the window surface of `size` logical pixels.
    ///
    /// `damage` lists the areas that changed since the last frame; only their
    /// bounding box is redrawn. `None` redraws everything and an empty list
    /// draws nothing.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Gl`](crate::Error::Gl) if execution cannot create its
    /// buffers.
    pub fn render(
        &mut self,
        root: &RenderNode,
        [width, height]: [u32; 2],
        scale_factor: u32,
        damage: Option<&[IRect]>,
    ) -> Result<()> {
        if damage.is_some_and(<[IRect]>::is_empty) {
            return Ok(());
        }

        #[allow(clippy::cast_precision_loss)]
        let (viewport, scale) = (
            Rect::new(
                0.0,
                0.0,
                (width * scale_factor) as f32,
                (height * scale_factor) as f32,
            ),
            scale_factor as f32,
        );
        let region = render_region([width, height], damage);

        self.run(RenderJob::new(viewport, scale, region, 0, false), root)
    }

    /// Draw the part of `root` inside `viewport` into a new texture of the
    /// viewport's size and return the texture name. The caller owns it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TextureTooLarge`](crate::Error::TextureTooLarge) or
    /// [`Error::IncompleteFramebuffer`](crate::Error::IncompleteFramebuffer)
    /// if the target cannot be created.
    pub fn render_texture(&mut self, root: &RenderNode, viewport: &Rect) -> Result<u32> {
        #[allow(clippy::cast_possible_truncation)]
        let (width, height) = (viewport.width.ceil() as i32, viewport.height.ceil() as i32);

        let target = self
            .driver
            .create_render_target(&self.backend, width.max(1), height.max(1))?;
        // Deleted with the frame; the texture is handed to the caller.
        self.driver.release_render_target(target, true);

        #[allow(clippy::cast_precision_loss)]
        let viewport = Rect::new(
            viewport.x,
            viewport.y,
            target.width as f32,
            target.height as f32,
        );
        let job = RenderJob::new(viewport, 1.0, None, target.framebuffer, true);

        match self.run(job, root) {
            Ok(()) => Ok(target.texture),
            Err(e) => {
                self.backend.delete_texture(target.texture);
                Err(e)
            }
        }
    }

    fn run(&mut self, mut job: RenderJob, root: &RenderNode) -> Result<()> {
        job.set_fallback(std::mem::replace(&mut self.fallback, Box::new(SkipFallback)));
        let result = job.render(&mut self.driver, &self.backend, root);
        self.fallback = job.into_fallback();
        result
    }

    /// Delete the programs and any pending targets.
    pub fn destroy(&mut self) {
        self.driver.destroy(&self.backend);
    }
}

/// The area of a `size` surface to redraw for `damage`: `None` when the whole
/// surface is affected, otherwise the bounding box of the damage.
#[must_use]
pub fn render_region([width, height]: [u32; 2], damage: Option<&[IRect]>) -> Option<IRect> {
    let bounds = damage?.iter().copied().reduce(|a, b| a.union(&b))?;

    #[allow(clippy::cast_possible_wrap)]
    let surface = IRect::new(0, 0, width as i32, height as i32);
    if bounds.contains(&surface) {
        None
    } else {
        Some(bounds)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::cell::Cell;
    use std::rc::Rc;

    use super::*;
    use crate::backend::recording::{GlCall, RecordingBackend};
    use crate::command_queue::CommandQueue;
    use crate::render_job::FallbackRequest;
    use crate::transform::Transform;
    use crate::types::Color;
    use crate::Error;

    fn scene() -> RenderNode {
        RenderNode::container(vec![
            RenderNode::color(Rect::new(0.0, 0.0, 40.0, 40.0), Color::new(0.0, 0.0, 1.0, 1.0)),
            RenderNode::transform(
                RenderNode::color(Rect::new(0.0, 0.0, 10.0, 10.0), Color::default()),
                Transform::rotate(30.0),
            ),
        ])
    }

    fn renderer() -> Renderer<RecordingBackend> {
        let renderer = Renderer::new(RecordingBackend::new()).unwrap();
        renderer.backend().take_calls();
        renderer
    }

    fn scissors(calls: &[GlCall]) -> Vec<Option<IRect>> {
        calls
            .iter()
            .filter_map(|c| match c {
                GlCall::Scissor(s) => Some(*s),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn region_of_full_damage_is_the_whole_surface() {
        let damage = [IRect::new(0, 0, 50, 100), IRect::new(50, 0, 50, 100)];
        assert_eq!(render_region([100, 100], Some(&damage)), None);
        assert_eq!(render_region([100, 100], None), None);
    }

    #[test]
    fn region_is_the_damage_bounding_box() {
        let damage = [IRect::new(10, 10, 5, 5), IRect::new(30, 20, 10, 10)];
        assert_eq!(
            render_region([100, 100], Some(&damage)),
            Some(IRect::new(10, 10, 30, 20))
        );
    }

    #[test]
    fn full_render_draws_without_scissor() {
        let mut renderer = renderer();
        renderer.render(&scene(), [100, 80], 2, None).unwrap();

        let calls = renderer.backend().take_calls();
        assert_eq!(scissors(&calls), vec![None]);
        assert!(calls.contains(&GlCall::Viewport(200, 160)));
        assert!(calls.contains(&GlCall::DrawArrays { first: 0, count: 6 }));
        assert!(!renderer.driver().in_frame());
        renderer.destroy();
    }

    #[test]
    fn damaged_render_is_scissored() {
        let mut renderer = renderer();
        renderer
            .render(&scene(), [100, 80], 2, Some(&[IRect::new(10, 10, 20, 20)]))
            .unwrap();

        let calls = renderer.backend().take_calls();
        assert_eq!(scissors(&calls), vec![Some(IRect::new(20, 100, 40, 40))]);
        renderer.destroy();
    }

    #[test]
    fn empty_damage_draws_nothing() {
        let mut renderer = renderer();
        renderer.render(&scene(), [100, 80], 1, Some(&[])).unwrap();
        assert!(renderer.backend().take_calls().is_empty());
        assert_eq!(renderer.driver().frame_id(), 0);
        renderer.destroy();
    }

    #[test]
    fn texture_render_keeps_only_the_texture() {
        let mut renderer = renderer();
        let texture = renderer
            .render_texture(&scene(), &Rect::new(0.0, 0.0, 32.0, 16.0))
            .unwrap();

        let calls = renderer.backend().take_calls();
        assert!(calls.contains(&GlCall::CreateTexture(texture)));
        assert!(calls.contains(&GlCall::TextureImage {
            width: 32,
            height: 16,
            pixels: None
        }));
        assert!(calls.iter().any(|c| matches!(c, GlCall::DeleteFramebuffer(_))));
        assert!(!calls.contains(&GlCall::DeleteTexture(texture)));
        // Offscreen targets are never scissored.
        assert_eq!(scissors(&calls), vec![None, None]);
        renderer.destroy();
    }

    #[test]
    fn window_frame_after_texture_render_targets_the_surface() {
        let mut renderer = renderer();
        renderer
            .render_texture(&scene(), &Rect::new(0.0, 0.0, 16.0, 16.0))
            .unwrap();
        renderer.backend().take_calls();

        renderer.render(&scene(), [100, 100], 1, None).unwrap();
        let calls = renderer.backend().take_calls();
        assert!(!calls
            .iter()
            .any(|c| matches!(c, GlCall::BindFramebuffer(id) if *id != 0)));
        assert!(calls.contains(&GlCall::Clear(crate::ClearMask::all())));
        assert!(calls.contains(&GlCall::DrawArrays { first: 0, count: 6 }));
        renderer.destroy();
    }

    #[test]
    fn texture_render_reports_incomplete_targets() {
        let mut renderer = renderer();
        renderer
            .backend()
            .framebuffer_status
            .set(glow::FRAMEBUFFER_UNSUPPORTED);

        let result = renderer.render_texture(&scene(), &Rect::new(0.0, 0.0, 8.0, 8.0));
        assert!(matches!(
            result,
            Err(Error::IncompleteFramebuffer(glow::FRAMEBUFFER_UNSUPPORTED))
        ));
        assert!(!renderer.driver().in_frame());
        renderer.destroy();
    }

    #[test]
    fn oversized_texture_is_refused() {
        let mut renderer = renderer();
        let result = renderer.render_texture(&scene(), &Rect::new(0.0, 0.0, 5000.0, 8.0));
        assert!(matches!(result, Err(Error::TextureTooLarge { max: 4096, .. })));
        renderer.destroy();
    }

    struct Counter(Rc<Cell<usize>>);

    impl Fallback for Counter {
        fn visit_fallback(&mut self, _queue: &mut CommandQueue, _request: &FallbackRequest<'_>) {
            self.0.set(self.0.get() + 1);
        }
    }

    #[test]
    fn fallback_survives_across_frames() {
        let mut renderer = renderer();
        let count = Rc::new(Cell::new(0));
        renderer.set_fallback(Box::new(Counter(Rc::clone(&count))));

        renderer.render(&scene(), [100, 100], 1, None).unwrap();
        renderer.render(&scene(), [100, 100], 1, None).unwrap();
        assert_eq!(count.get(), 2);
        renderer.destroy();
    }
}
