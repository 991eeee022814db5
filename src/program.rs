//! Linked GL programs and the uniform slots they expose.
//!
//! A [`Program`] never uploads anything itself: every setter records the
//! value into the command queue's uniform state, which diffs it against the
//! last value the program saw.

use glam::Mat4;

use crate::backend::GlBackend;
use crate::command_queue::CommandQueue;
use crate::geometry::{Rect, RoundedRect};
use crate::types::Color;

/// Uniform slots a program can register.
///
/// The first five are shared by every program and recorded by
/// [`Program::begin_draw`].
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Uniform {
    /// `vec4` viewport origin and size.
    Viewport,
    /// `mat4` projection.
    Projection,
    /// `mat4` modelview.
    Modelview,
    /// Rounded rectangle clip.
    ClipRect,
    /// `float` opacity.
    Alpha,
    /// `vec4` fill color.
    Color,
    /// Sampler reading the source texture.
    Source,
    /// `vec4` gradient start and end points.
    Points,
    /// `int` number of gradient stops.
    NumColorStops,
    /// `float[]` packed gradient stops.
    ColorStops,
}

impl Uniform {
    const COUNT: usize = 10;

    /// Every slot together with the GLSL name it is looked up by.
    pub const NAMES: [(Uniform, &'static str); Self::COUNT] = [
        (Uniform::Viewport, "u_viewport"),
        (Uniform::Projection, "u_projection"),
        (Uniform::Modelview, "u_modelview"),
        (Uniform::ClipRect, "u_clip_rect"),
        (Uniform::Alpha, "u_alpha"),
        (Uniform::Color, "u_color"),
        (Uniform::Source, "u_source"),
        (Uniform::Points, "u_points"),
        (Uniform::NumColorStops, "u_num_color_stops"),
        (Uniform::ColorStops, "u_color_stops"),
    ];
}

/// A linked program and the locations of its registered uniforms.
#[derive(Debug)]
pub struct Program {
    id: u32,
    name: String,
    locations: [Option<u32>; Uniform::COUNT],
    deleted: bool,
}

impl Program {
    /// Wrap a linked program. No uniforms are registered yet.
    #[must_use]
    pub fn new(id: u32, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            locations: [None; Uniform::COUNT],
            deleted: false,
        }
    }

    /// Compile the shared vertex stage with `fragment_src` and register
    /// every slot from [`Uniform::NAMES`] the program uses.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Gl`](crate::Error::Gl) if compilation fails.
    pub fn compile<B: GlBackend + ?Sized>(
        backend: &B,
        name: &str,
        fragment_src: &str,
    ) -> crate::Result<Self> {
        let id = backend.compile_program(crate::shaders::VERTEX_SRC, fragment_src)?;
        let mut program = Self::new(id, name);
        for (key, uniform_name) in Uniform::NAMES {
            program.add_uniform(backend, uniform_name, key);
        }
        log::debug!("compiled program {name} as {id}");
        Ok(program)
    }

    /// GL program name.
    #[must_use]
    pub fn id(&self) -> u32 {
        self.id
    }

    /// Debug name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Map `key` to the location of the uniform called `name`. Returns
    /// `false` if the program has no such uniform.
    pub fn add_uniform<B: GlBackend + ?Sized>(&mut self, backend: &B, name: &str, key: Uniform) -> bool {
        let location = backend.uniform_location(self.id, name);
        self.locations[key as usize] = location;
        location.is_some()
    }

    /// Location registered for `key`.
    #[must_use]
    pub fn location(&self, key: Uniform) -> Option<u32> {
        self.locations[key as usize]
    }

    /// Record the shared uniforms and open a draw on the queue.
    pub fn begin_draw(
        &self,
        queue: &mut CommandQueue,
        viewport: &Rect,
        projection: &Mat4,
        modelview: &Mat4,
        clip: &RoundedRect,
        alpha: f32,
    ) {
        {
            let mut uniforms = queue.uniforms().borrow_mut();
            if let Some(location) = self.location(Uniform::Viewport) {
                uniforms.set4f(
                    self.id,
                    location,
                    [viewport.x, viewport.y, viewport.width, viewport.height],
                );
            }
            if let Some(location) = self.location(Uniform::Modelview) {
                uniforms.set_matrix(self.id, location, modelview);
            }
            if let Some(location) = self.location(Uniform::Projection) {
                uniforms.set_matrix(self.id, location, projection);
            }
            if let Some(location) = self.location(Uniform::ClipRect) {
                uniforms.set_rounded_rect(self.id, location, clip);
            }
            if let Some(location) = self.location(Uniform::Alpha) {
                uniforms.set1f(self.id, location, alpha);
            }
        }

        queue.begin_draw(self.id, viewport);
    }

    /// Close the draw opened by [`begin_draw`](Self::begin_draw).
    pub fn end_draw(&self, queue: &mut CommandQueue) {
        queue.end_draw();
    }

    /// Set a `float`.
    pub fn set_uniform1f(&self, queue: &mut CommandQueue, key: Uniform, value: f32) {
        if let Some(location) = self.location(key) {
            queue.uniforms().borrow_mut().set1f(self.id, location, value);
        }
    }

    /// Set a `vec4`.
    pub fn set_uniform4f(&self, queue: &mut CommandQueue, key: Uniform, value: [f32; 4]) {
        if let Some(location) = self.location(key) {
            queue.uniforms().borrow_mut().set4f(self.id, location, value);
        }
    }

    /// Set a `float[]`.
    pub fn set_uniform1fv(&self, queue: &mut CommandQueue, key: Uniform, values: &[f32]) {
        if let Some(location) = self.location(key) {
            queue
                .uniforms()
                .borrow_mut()
                .set1fv(self.id, location, values);
        }
    }

    /// Set an `int`.
    pub fn set_uniform1i(&self, queue: &mut CommandQueue, key: Uniform, value: i32) {
        if let Some(location) = self.location(key) {
            queue.uniforms().borrow_mut().set1i(self.id, location, value);
        }
    }

    /// Set a color.
    pub fn set_uniform_color(&self, queue: &mut CommandQueue, key: Uniform, color: Color) {
        if let Some(location) = self.location(key) {
            queue
                .uniforms()
                .borrow_mut()
                .set_color(self.id, location, color);
        }
    }

    /// Set a `mat4`.
    pub fn set_uniform_matrix(&self, queue: &mut CommandQueue, key: Uniform, matrix: &Mat4) {
        if let Some(location) = self.location(key) {
            queue
                .uniforms()
                .borrow_mut()
                .set_matrix(self.id, location, matrix);
        }
    }

    /// Set a rounded rectangle.
    pub fn set_uniform_rounded_rect(&self, queue: &mut CommandQueue, key: Uniform, rect: &RoundedRect) {
        if let Some(location) = self.location(key) {
            queue
                .uniforms()
                .borrow_mut()
                .set_rounded_rect(self.id, location, rect);
        }
    }

    /// Bind `texture` on `unit` and point the sampler `key` at it.
    pub fn set_uniform_texture(&self, queue: &mut CommandQueue, key: Uniform, unit: u32, texture: u32) {
        queue.bind_texture(unit, texture);
        if let Some(location) = self.location(key) {
            queue
                .uniforms()
                .borrow_mut()
                .set_texture(self.id, location, unit);
        }
    }

    /// Delete the GL program and forget its uniform values.
    pub fn delete<B: GlBackend + ?Sized>(&mut self, backend: &B, queue: &mut CommandQueue) {
        if !self.deleted {
            queue.delete_program(backend, self.id);
            self.deleted = true;
        }
    }
}

impl Drop for Program {
    fn drop(&mut self) {
        if !self.deleted && self.id != 0 {
            log::warn!(
                "program {} ({}) dropped without being deleted, leaking it",
                self.name,
                self.id
            );
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::backend::recording::{GlCall, RecordingBackend};
    use crate::command_queue::Command;

    fn program(backend: &RecordingBackend) -> Program {
        let mut program = Program::new(7, "test");
        assert!(program.add_uniform(backend, "u_viewport", Uniform::Viewport));
        assert!(program.add_uniform(backend, "u_projection", Uniform::Projection));
        assert!(program.add_uniform(backend, "u_modelview", Uniform::Modelview));
        assert!(program.add_uniform(backend, "u_clip_rect", Uniform::ClipRect));
        assert!(program.add_uniform(backend, "u_alpha", Uniform::Alpha));
        assert!(program.add_uniform(backend, "u_color", Uniform::Color));
        program
    }

    fn quad_draw(program: &Program, queue: &mut CommandQueue, color: Color) {
        let viewport = Rect::new(0.0, 0.0, 100.0, 100.0);
        program.set_uniform_color(queue, Uniform::Color, color);
        program.begin_draw(
            queue,
            &viewport,
            &Mat4::IDENTITY,
            &Mat4::IDENTITY,
            &RoundedRect::from_rect(viewport),
            1.0,
        );
        queue.add_vertices(None);
        program.end_draw(queue);
    }

    #[test]
    fn shared_uniforms_are_recorded_once() {
        let backend = RecordingBackend::new();
        let mut program = program(&backend);
        let mut queue = CommandQueue::default();

        quad_draw(&program, &mut queue, Color::new(1.0, 0.0, 0.0, 1.0));
        quad_draw(&program, &mut queue, Color::new(1.0, 0.0, 0.0, 1.0));

        let batches: Vec<_> = queue.batches().collect();
        assert_eq!(batches.len(), 1);
        match batches[0].command {
            Command::Draw(draw) => {
                assert_eq!(draw.uniform_count, 6);
                assert_eq!(draw.vbo_count, 12);
            }
            other => panic!("unexpected {other:?}"),
        }

        program.delete(&backend, &mut queue);
    }

    #[test]
    fn changing_color_splits_the_draw() {
        let backend = RecordingBackend::new();
        let mut program = program(&backend);
        let mut queue = CommandQueue::default();

        quad_draw(&program, &mut queue, Color::new(1.0, 0.0, 0.0, 1.0));
        quad_draw(&program, &mut queue, Color::new(0.0, 1.0, 0.0, 1.0));

        assert_eq!(queue.len(), 2);
        program.delete(&backend, &mut queue);
    }

    #[test]
    fn unknown_uniform_is_ignored() {
        let backend = RecordingBackend::new();
        let mut program = Program::new(3, "bare");
        program.set_uniform1f(&mut CommandQueue::default(), Uniform::Alpha, 1.0);
        assert_eq!(program.location(Uniform::Alpha), None);
        program.delete(&backend, &mut CommandQueue::default());
    }

    #[test]
    fn texture_uniform_binds_the_unit() {
        let backend = RecordingBackend::new();
        let mut program = Program::new(5, "blit");
        program.add_uniform(&backend, "u_source", Uniform::Source);
        let mut queue = CommandQueue::default();
        program.set_uniform_texture(&mut queue, Uniform::Source, 0, 99);
        assert_eq!(queue.attachments().textures[0].id, 99);
        program.delete(&backend, &mut queue);
    }

    #[test]
    fn delete_is_idempotent() {
        let backend = RecordingBackend::new();
        let mut program = Program::new(9, "p");
        let mut queue = CommandQueue::default();
        program.delete(&backend, &mut queue);
        program.delete(&backend, &mut queue);
        assert_eq!(backend.take_calls(), vec![GlCall::DeleteProgram(9)]);
    }

    #[test]
    fn compile_registers_every_named_uniform() {
        let backend = RecordingBackend::new();
        let mut program = Program::compile(&backend, "color", "").unwrap();
        for (key, _) in Uniform::NAMES {
            assert!(program.location(key).is_some());
        }
        program.delete(&backend, &mut CommandQueue::default());
    }
}
