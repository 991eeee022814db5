//! Per-surface state: the command queue, the built-in programs and
//! offscreen render targets.

use crate::backend::GlBackend;
use crate::command_queue::CommandQueue;
use crate::error::Result;
use crate::program::Program;
use crate::shaders;
use crate::types::Filter;
use crate::uniforms::SharedUniformState;

/// The programs used by the render job.
#[derive(Debug)]
pub struct Programs {
    /// Solid fill.
    pub color: Program,
    /// Linear gradient fill.
    pub linear_gradient: Program,
    /// Texture copy.
    pub blit: Program,
}

impl Programs {
    fn compile<B: GlBackend + ?Sized>(backend: &B) -> Result<Self> {
        Ok(Self {
            color: Program::compile(backend, "color", shaders::COLOR_FRAGMENT_SRC)?,
            linear_gradient: Program::compile(
                backend,
                "linear_gradient",
                shaders::LINEAR_GRADIENT_FRAGMENT_SRC,
            )?,
            blit: Program::compile(backend, "blit", shaders::BLIT_FRAGMENT_SRC)?,
        })
    }

    fn delete<B: GlBackend + ?Sized>(&mut self, backend: &B, queue: &mut CommandQueue) {
        self.color.delete(backend, queue);
        self.linear_gradient.delete(backend, queue);
        self.blit.delete(backend, queue);
    }
}

/// A framebuffer with a texture as its color attachment.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct RenderTarget {
    /// GL framebuffer name.
    pub framebuffer: u32,
    /// GL texture name.
    pub texture: u32,
    /// Width in pixels.
    pub width: i32,
    /// Height in pixels.
    pub height: i32,
}

/// Owns the command queue and programs for one surface and brackets frames.
pub struct Driver {
    queue: CommandQueue,
    programs: Programs,
    frame_id: u64,
    in_frame: bool,
    autorelease_framebuffers: Vec<u32>,
    autorelease_textures: Vec<u32>,
}

impl Driver {
    /// Compile the built-in programs and create a queue.
    ///
    /// Pass the uniform state of another driver on the same display to share
    /// it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Gl`](crate::Error::Gl) if a program fails to compile.
    pub fn new<B: GlBackend + ?Sized>(backend: &B, uniforms: Option<SharedUniformState>) -> Result<Self> {
        Ok(Self {
            queue: CommandQueue::new(uniforms, None),
            programs: Programs::compile(backend)?,
            frame_id: 0,
            in_frame: false,
            autorelease_framebuffers: Vec::new(),
            autorelease_textures: Vec::new(),
        })
    }

    /// The surface's command queue.
    #[must_use]
    pub fn queue(&self) -> &CommandQueue {
        &self.queue
    }

    /// The surface's command queue, mutably.
    pub fn queue_mut(&mut self) -> &mut CommandQueue {
        &mut self.queue
    }

    /// The built-in programs.
    #[must_use]
    pub fn programs(&self) -> &Programs {
        &self.programs
    }

    /// The programs and the queue they record into, borrowed together.
    pub fn split(&mut self) -> (&Programs, &mut CommandQueue) {
        (&self.programs, &mut self.queue)
    }

    /// Number of frames begun so far.
    #[must_use]
    pub fn frame_id(&self) -> u64 {
        self.frame_id
    }

    /// Whether a frame is being recorded.
    #[must_use]
    pub fn in_frame(&self) -> bool {
        self.in_frame
    }

    /// Start a frame.
    ///
    /// # Panics
    ///
    /// Panics if the previous frame was not ended.
    pub fn begin_frame(&mut self) {
        assert!(!self.in_frame, "begin_frame called twice");
        self.in_frame = true;
        self.frame_id += 1;
        self.queue.begin_frame();
    }

    /// Finish a frame: reset the queue and delete released targets.
    ///
    /// # Panics
    ///
    /// Panics outside a frame.
    pub fn end_frame<B: GlBackend + ?Sized>(&mut self, backend: &B) {
        assert!(self.in_frame, "end_frame called without begin_frame");
        self.queue.end_frame();
        self.delete_released(backend);
        self.in_frame = false;
    }

    fn delete_released<B: GlBackend + ?Sized>(&mut self, backend: &B) {
        for framebuffer in self.autorelease_framebuffers.drain(..) {
            backend.delete_framebuffer(framebuffer);
        }
        for texture in self.autorelease_textures.drain(..) {
            backend.delete_texture(texture);
        }
    }

    /// Create an offscreen target with linear filtering.
    ///
    /// # Errors
    ///
    /// See [`CommandQueue::create_render_target`].
    pub fn create_render_target<B: GlBackend + ?Sized>(
        &mut self,
        backend: &B,
        width: i32,
        height: i32,
    ) -> Result<RenderTarget> {
        let (framebuffer, texture) =
            self.queue
                .create_render_target(backend, width, height, Filter::Linear, Filter::Linear)?;
        Ok(RenderTarget {
            framebuffer,
            texture,
            width,
            height,
        })
    }

    /// Schedule `target` for deletion at the end of the frame. With
    /// `keep_texture` the texture survives and its name is returned.
    pub fn release_render_target(&mut self, target: RenderTarget, keep_texture: bool) -> Option<u32> {
        self.autorelease_framebuffers.push(target.framebuffer);
        if keep_texture {
            Some(target.texture)
        } else {
            self.autorelease_textures.push(target.texture);
            None
        }
    }

    /// Delete the programs and anything still pending release.
    pub fn destroy<B: GlBackend + ?Sized>(&mut self, backend: &B) {
        self.programs.delete(backend, &mut self.queue);
        self.delete_released(backend);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::backend::recording::{GlCall, RecordingBackend};

    #[test]
    fn programs_are_compiled_up_front() {
        let backend = RecordingBackend::new();
        let mut driver = Driver::new(&backend, None).unwrap();
        let compiled = backend
            .take_calls()
            .into_iter()
            .filter(|c| matches!(c, GlCall::CompileProgram(_)))
            .count();
        assert_eq!(compiled, 3);
        assert_ne!(driver.programs().color.id(), driver.programs().blit.id());
        driver.destroy(&backend);
    }

    #[test]
    fn frames_are_counted() {
        let backend = RecordingBackend::new();
        let mut driver = Driver::new(&backend, None).unwrap();
        driver.begin_frame();
        driver.end_frame(&backend);
        driver.begin_frame();
        assert_eq!(driver.frame_id(), 2);
        assert!(driver.in_frame());
        driver.end_frame(&backend);
        driver.destroy(&backend);
    }

    #[test]
    #[should_panic(expected = "begin_frame called twice")]
    fn nested_frames_panic() {
        let backend = RecordingBackend::new();
        let mut driver = Driver::new(&backend, None).unwrap();
        driver.begin_frame();
        driver.begin_frame();
    }

    #[test]
    fn released_targets_are_deleted_at_end_of_frame() {
        let backend = RecordingBackend::new();
        let mut driver = Driver::new(&backend, None).unwrap();
        driver.begin_frame();

        let kept = driver.create_render_target(&backend, 32, 32).unwrap();
        let dropped = driver.create_render_target(&backend, 16, 16).unwrap();
        assert_eq!(driver.release_render_target(kept, true), Some(kept.texture));
        assert_eq!(driver.release_render_target(dropped, false), None);
        backend.take_calls();

        driver.end_frame(&backend);
        assert_eq!(
            backend.take_calls(),
            vec![
                GlCall::DeleteFramebuffer(kept.framebuffer),
                GlCall::DeleteFramebuffer(dropped.framebuffer),
                GlCall::DeleteTexture(dropped.texture),
            ]
        );
        driver.destroy(&backend);
    }

    #[test]
    fn drivers_can_share_uniforms() {
        let backend = RecordingBackend::new();
        let mut first = Driver::new(&backend, None).unwrap();
        let mut second = Driver::new(&backend, Some(first.queue().uniforms().clone())).unwrap();
        assert!(first.queue().shares_uniforms_with(second.queue()));
        first.destroy(&backend);
        second.destroy(&backend);
    }
}
