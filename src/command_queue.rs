//! Deferred recording and execution of GL batches.
//!
//! Recording never touches GL. Each instruction becomes a [`Batch`] in a
//! dense array; batches are chained through a `next` index so a draw that
//! continues the previous one can be merged into it by simply extending the
//! vertex range and dropping the new record. [`CommandQueue::execute`] then
//! walks the chain once, applying framebuffer, program, viewport and scissor
//! changes only when the next batch needs something different.

use std::rc::Rc;

use crate::attachments::{AttachmentState, BindTexture};
use crate::backend::{ClearMask, GlBackend};
use crate::error::{Error, Result};
use crate::geometry::{IRect, Rect};
use crate::types::{Filter, Vertex, N_VERTICES};
use crate::uniforms::{SharedUniformState, UniformInfo, UniformState};

/// A draw call recorded into the queue.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct DrawCommand {
    /// Program used for the draw.
    pub program: u32,
    /// First vertex in the shared vertex buffer.
    pub vbo_offset: u32,
    /// Number of vertices.
    pub vbo_count: u32,
    /// First texture bind recorded for this draw.
    pub bind_offset: u32,
    /// Number of texture binds to apply before drawing.
    pub bind_count: u32,
    /// First uniform change recorded for this draw.
    pub uniform_offset: u32,
    /// Number of uniform changes to apply before drawing.
    pub uniform_count: u32,
}

/// What a batch does when executed.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Command {
    /// Clear the target framebuffer.
    Clear(ClearMask),
    /// Open a debug group whose label is interned in the queue.
    PushDebugGroup(u32),
    /// Close the innermost debug group.
    PopDebugGroup,
    /// Draw triangles.
    Draw(DrawCommand),
}

/// One recorded instruction.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Batch {
    /// The instruction.
    pub command: Command,
    /// Target framebuffer; 0 is the window surface.
    pub framebuffer: u32,
    /// Viewport size in effect for the instruction.
    pub viewport: [u16; 2],
    next: Option<u32>,
}

impl Batch {
    /// Index of the batch executed after this one.
    #[must_use]
    pub fn next(&self) -> Option<u32> {
        self.next
    }
}

#[derive(Copy, Clone, Debug)]
struct UniformChange {
    info: UniformInfo,
    location: u32,
}

/// Records batches for one rendering context and executes them.
pub struct CommandQueue {
    uniforms: SharedUniformState,
    attachments: AttachmentState,
    saved_state: Vec<AttachmentState>,

    batches: Vec<Batch>,
    tail: Option<u32>,
    in_draw: bool,

    vertices: Vec<[Vertex; N_VERTICES]>,
    binds: Vec<BindTexture>,
    uniform_changes: Vec<UniformChange>,
    debug_groups: Vec<String>,

    max_texture_size: Option<i32>,
}

impl Default for CommandQueue {
    fn default() -> Self {
        Self::new(None, None)
    }
}

impl CommandQueue {
    /// Create a queue.
    ///
    /// Pass the uniform state of another queue to share program uniforms
    /// between surfaces. The maximum texture size is queried from the backend
    /// on first use unless given here.
    #[must_use]
    pub fn new(uniforms: Option<SharedUniformState>, max_texture_size: Option<i32>) -> Self {
        Self {
            uniforms: uniforms.unwrap_or_else(UniformState::new_shared),
            attachments: AttachmentState::new(),
            saved_state: Vec::new(),
            batches: Vec::new(),
            tail: None,
            in_draw: false,
            vertices: Vec::new(),
            binds: Vec::new(),
            uniform_changes: Vec::new(),
            debug_groups: Vec::new(),
            max_texture_size,
        }
    }

    /// The uniform state this queue snapshots from.
    #[must_use]
    pub fn uniforms(&self) -> &SharedUniformState {
        &self.uniforms
    }

    /// The resources subsequent batches expect to be bound.
    #[must_use]
    pub fn attachments(&self) -> &AttachmentState {
        &self.attachments
    }

    /// Number of batches recorded this frame, merged draws counted once.
    #[must_use]
    pub fn len(&self) -> usize {
        self.batches.len()
    }

    /// Whether nothing has been recorded this frame.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.batches.is_empty()
    }

    /// Number of vertices written this frame.
    #[must_use]
    pub fn vertex_count(&self) -> usize {
        self.vertices.len() * N_VERTICES
    }

    /// The vertices written this frame, in buffer order.
    #[must_use]
    pub fn vertices(&self) -> &[Vertex] {
        self.vertices.as_flattened()
    }

    /// Label of an interned debug group.
    #[must_use]
    pub fn debug_group_label(&self, label: u32) -> Option<&str> {
        self.debug_groups.get(label as usize).map(String::as_str)
    }

    /// Iterate the batches in execution order.
    pub fn batches(&self) -> impl Iterator<Item = &Batch> + '_ {
        let mut index = if self.batches.is_empty() { None } else { Some(0) };
        std::iter::from_fn(move || {
            let batch = self.batches.get(index? as usize)?;
            index = batch.next;
            Some(batch)
        })
    }

    fn push_batch(&mut self, command: Command, viewport: &Rect) {
        assert!(!self.in_draw, "cannot record a batch inside a draw");
        self.batches.push(Batch {
            command,
            framebuffer: self.attachments.framebuffer.id,
            viewport: viewport_size(viewport),
            next: None,
        });
    }

    fn enqueue_last(&mut self) {
        let index = u32::try_from(self.batches.len() - 1).expect("batch count exceeds u32::MAX");
        if let Some(tail) = self.tail {
            self.batches[tail as usize].next = Some(index);
        }
        self.tail = Some(index);
    }

    /// Start a draw with `program` over `viewport`.
    ///
    /// # Panics
    ///
    /// Panics if a draw is already open.
    pub fn begin_draw(&mut self, program: u32, viewport: &Rect) {
        #[allow(clippy::cast_possible_truncation)]
        let command = Command::Draw(DrawCommand {
            program,
            vbo_offset: self.vertex_count() as u32,
            vbo_count: 0,
            bind_offset: self.binds.len() as u32,
            bind_count: 0,
            uniform_offset: self.uniform_changes.len() as u32,
            uniform_count: 0,
        });
        self.push_batch(command, viewport);
        self.in_draw = true;
    }

    fn open_draw(&mut self) -> &mut DrawCommand {
        assert!(self.in_draw, "no draw is open");
        match self.batches.last_mut() {
            Some(Batch {
                command: Command::Draw(draw),
                ..
            }) => draw,
            _ => unreachable!("open draw is not the last batch"),
        }
    }

    /// Reserve one quad of vertices in the open draw.
    ///
    /// With `source` the vertices are copied in; otherwise the caller fills
    /// the returned slot.
    ///
    /// # Panics
    ///
    /// Panics if no draw is open.
    pub fn add_vertices(&mut self, source: Option<&[Vertex; N_VERTICES]>) -> &mut [Vertex; N_VERTICES] {
        #[allow(clippy::cast_possible_truncation)]
        {
            self.open_draw().vbo_count += N_VERTICES as u32;
        }
        self.vertices
            .push(source.copied().unwrap_or([Vertex::default(); N_VERTICES]));
        let last = self.vertices.len() - 1;
        &mut self.vertices[last]
    }

    /// Finish the open draw.
    ///
    /// A draw without vertices is dropped. Otherwise the framebuffer, the
    /// uniforms changed for the draw's program and the changed texture binds
    /// are captured, and the draw is merged into the previous batch when it
    /// simply continues it.
    ///
    /// # Panics
    ///
    /// Panics if no draw is open.
    pub fn end_draw(&mut self) {
        let draw = *self.open_draw();
        self.in_draw = false;

        if draw.vbo_count == 0 {
            self.batches.pop();
            return;
        }

        let framebuffer = self.attachments.framebuffer.id;
        self.attachments.framebuffer.changed = false;

        let uniform_changes = &mut self.uniform_changes;
        self.uniforms
            .borrow_mut()
            .snapshot(draw.program, |info, location| {
                uniform_changes.push(UniformChange {
                    info: *info,
                    location,
                });
            });

        let binds = &mut self.binds;
        self.attachments
            .take_changed_textures(|texture| binds.push(*texture));

        #[allow(clippy::cast_possible_truncation)]
        let draw = DrawCommand {
            uniform_count: self.uniform_changes.len() as u32 - draw.uniform_offset,
            bind_count: self.binds.len() as u32 - draw.bind_offset,
            ..draw
        };

        let index = self.batches.len() - 1;
        let batch = &mut self.batches[index];
        batch.framebuffer = framebuffer;
        batch.command = Command::Draw(draw);
        let batch = *batch;

        if let Some(prev) = self.tail.map(|tail| &mut self.batches[tail as usize]) {
            if let Command::Draw(prev_draw) = &mut prev.command {
                if prev_draw.program == draw.program
                    && prev.viewport == batch.viewport
                    && prev.framebuffer == batch.framebuffer
                    && draw.uniform_count == 0
                    && draw.bind_count == 0
                    && prev_draw.vbo_offset + prev_draw.vbo_count == draw.vbo_offset
                {
                    prev_draw.vbo_count += draw.vbo_count;
                    self.batches.pop();
                    return;
                }
            }
        }

        self.enqueue_last();
    }

    /// Record a clear of the currently bound framebuffer. An empty mask
    /// clears color, depth and stencil.
    ///
    /// # Panics
    ///
    /// Panics if a draw is open.
    pub fn clear(&mut self, bits: ClearMask, viewport: &Rect) {
        let bits = if bits.is_empty() { ClearMask::all() } else { bits };
        self.push_batch(Command::Clear(bits), viewport);
        self.enqueue_last();
        self.attachments.framebuffer.changed = false;
    }

    /// Record the start of a debug group.
    ///
    /// # Panics
    ///
    /// Panics if a draw is open.
    pub fn push_debug_group(&mut self, label: &str) {
        let interned = match self.debug_groups.iter().position(|l| l == label) {
            Some(position) => position,
            None => {
                self.debug_groups.push(label.to_owned());
                self.debug_groups.len() - 1
            }
        };
        let interned = u32::try_from(interned).expect("debug group count exceeds u32::MAX");
        self.push_batch(Command::PushDebugGroup(interned), &Rect::default());
        self.enqueue_last();
    }

    /// Record the end of the innermost debug group.
    ///
    /// # Panics
    ///
    /// Panics if a draw is open.
    pub fn pop_debug_group(&mut self) {
        self.push_batch(Command::PopDebugGroup, &Rect::default());
        self.enqueue_last();
    }

    /// Target `framebuffer` with subsequent batches.
    pub fn bind_framebuffer(&mut self, framebuffer: u32) {
        self.attachments.bind_framebuffer(framebuffer);
    }

    /// Sample `texture` on `unit` in subsequent draws.
    pub fn bind_texture(&mut self, unit: u32, texture: u32) {
        self.attachments.bind_texture(unit, texture);
    }

    /// Push a copy of the attachment state.
    pub fn save(&mut self) {
        self.saved_state.push(self.attachments.clone());
    }

    /// Pop the attachment state pushed by the matching [`save`](Self::save)
    /// and rebind its framebuffer and unit 0 texture on the backend.
    ///
    /// # Panics
    ///
    /// Panics without a matching `save`.
    pub fn restore<B: GlBackend + ?Sized>(&mut self, backend: &B) {
        let saved = self
            .saved_state
            .pop()
            .unwrap_or_else(|| panic!("restore without matching save"));
        backend.bind_framebuffer(saved.framebuffer.id);
        backend.bind_texture(0, saved.textures[0].id);
        self.attachments = saved;
    }

    /// Start recording a frame.
    ///
    /// # Panics
    ///
    /// Panics if the previous frame was not ended.
    pub fn begin_frame(&mut self) {
        assert!(self.batches.is_empty(), "previous frame was not ended");
        self.tail = None;
    }

    /// Drop the frame's batches, keeping their allocations.
    ///
    /// # Panics
    ///
    /// Panics if a [`save`](Self::save) was not restored.
    pub fn end_frame(&mut self) {
        assert!(
            self.saved_state.is_empty(),
            "{} saved attachment states were not restored",
            self.saved_state.len()
        );

        self.uniforms.borrow_mut().end_frame();
        self.debug_groups.clear();
        self.batches.clear();
        self.vertices.clear();
        self.binds.clear();
        self.uniform_changes.clear();
        self.tail = None;
    }

    /// Issue the recorded batches.
    ///
    /// `scissor` is in unscaled window coordinates and applies only while
    /// drawing to the window surface (framebuffer 0).
    ///
    /// # Errors
    ///
    /// Returns [`Error::Gl`] if the vertex array or buffer cannot be created.
    ///
    /// # Panics
    ///
    /// Panics if a draw is open or the batch chain loops.
    pub fn execute<B: GlBackend + ?Sized>(
        &self,
        backend: &B,
        surface_height: u32,
        scale_factor: u32,
        scissor: Option<IRect>,
    ) -> Result<()> {
        assert!(!self.in_draw, "cannot execute inside a draw");

        if self.batches.is_empty() {
            return Ok(());
        }

        backend.prepare();
        let vao = backend.create_vertex_array()?;
        let vbo = backend.upload_vertices(bytemuck::cast_slice(&self.vertices))?;

        let scissor = scissor.map(|rect| flip_scissor(&rect, surface_height, scale_factor));
        let apply_scissor = |framebuffer: u32| {
            backend.scissor(if framebuffer == 0 { scissor } else { None });
        };

        let uniforms = self.uniforms.borrow();
        let mut framebuffer = 0;
        let mut program = 0;
        let mut viewport = [0u16; 2];
        let mut apply_viewport = |size: [u16; 2]| {
            if viewport != size {
                viewport = size;
                backend.viewport(size[0], size[1]);
            }
        };

        apply_scissor(framebuffer);

        let mut next = Some(0u32);
        let mut count = 0usize;

        while let Some(index) = next {
            let batch = &self.batches[index as usize];
            assert_ne!(batch.next, Some(index), "batch {index} links to itself");
            count += 1;
            assert!(count <= self.batches.len(), "batch chain contains a cycle");

            match batch.command {
                Command::Clear(bits) => {
                    if framebuffer != batch.framebuffer {
                        framebuffer = batch.framebuffer;
                        backend.bind_framebuffer(framebuffer);
                        apply_scissor(framebuffer);
                    }
                    apply_viewport(batch.viewport);
                    backend.clear(bits);
                }
                Command::PushDebugGroup(label) => {
                    backend.push_debug_group(self.debug_group_label(label).unwrap_or_default());
                }
                Command::PopDebugGroup => backend.pop_debug_group(),
                Command::Draw(draw) => {
                    if program != draw.program {
                        program = draw.program;
                        backend.use_program(program);
                    }
                    if framebuffer != batch.framebuffer {
                        framebuffer = batch.framebuffer;
                        backend.bind_framebuffer(framebuffer);
                        apply_scissor(framebuffer);
                    }
                    apply_viewport(batch.viewport);

                    for bind in range(&self.binds, draw.bind_offset, draw.bind_count) {
                        backend.bind_texture(bind.unit, bind.id);
                    }
                    for change in range(&self.uniform_changes, draw.uniform_offset, draw.uniform_count) {
                        backend.set_uniform(change.location, uniforms.value(&change.info));
                    }

                    backend.draw_arrays(draw.vbo_offset, draw.vbo_count);
                }
            }

            next = batch.next;
        }

        backend.delete_buffer(vbo);
        backend.delete_vertex_array(vao);

        log::trace!(
            "executed {count} batches, {} vertices, {} uniform changes, {} binds",
            self.vertex_count(),
            self.uniform_changes.len(),
            self.binds.len()
        );

        Ok(())
    }

    fn max_texture_size<B: GlBackend + ?Sized>(&mut self, backend: &B) -> i32 {
        *self
            .max_texture_size
            .get_or_insert_with(|| backend.max_texture_size())
    }

    /// Create an empty RGBA texture, leaving the caller's bindings intact.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TextureTooLarge`] without touching GL if either
    /// dimension exceeds the driver's limit, or [`Error::Gl`] if the driver
    /// refuses to create the texture.
    pub fn create_texture<B: GlBackend + ?Sized>(
        &mut self,
        backend: &B,
        width: i32,
        height: i32,
        min_filter: Filter,
        mag_filter: Filter,
    ) -> Result<u32> {
        let max = self.max_texture_size(backend);
        if width > max || height > max {
            return Err(Error::TextureTooLarge { width, height, max });
        }

        self.save();
        let texture = backend.create_texture();
        if texture.is_ok() {
            backend.texture_parameters(min_filter, mag_filter);
            backend.texture_image(width, height, None);
        }
        self.restore(backend);
        texture
    }

    /// Generate a framebuffer name.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Gl`] if the driver refuses.
    pub fn create_framebuffer<B: GlBackend + ?Sized>(&mut self, backend: &B) -> Result<u32> {
        backend.create_framebuffer()
    }

    /// Create a framebuffer with a fresh texture as its color attachment.
    /// Returns `(framebuffer, texture)`.
    ///
    /// # Errors
    ///
    /// Fails like [`create_texture`](Self::create_texture), or with
    /// [`Error::IncompleteFramebuffer`] (after deleting both objects) if the
    /// driver rejects the attachment.
    ///
    /// # Panics
    ///
    /// Panics if either dimension is not positive.
    pub fn create_render_target<B: GlBackend + ?Sized>(
        &mut self,
        backend: &B,
        width: i32,
        height: i32,
        min_filter: Filter,
        mag_filter: Filter,
    ) -> Result<(u32, u32)> {
        assert!(width > 0 && height > 0, "render target must not be empty");

        self.save();
        let result = self.attach_render_target(backend, width, height, min_filter, mag_filter);
        self.restore(backend);
        result
    }

    fn attach_render_target<B: GlBackend + ?Sized>(
        &mut self,
        backend: &B,
        width: i32,
        height: i32,
        min_filter: Filter,
        mag_filter: Filter,
    ) -> Result<(u32, u32)> {
        let texture = self.create_texture(backend, width, height, min_filter, mag_filter)?;
        let framebuffer = match self.create_framebuffer(backend) {
            Ok(framebuffer) => framebuffer,
            Err(e) => {
                backend.delete_texture(texture);
                return Err(e);
            }
        };

        backend.bind_framebuffer(framebuffer);
        backend.attach_color_texture(texture);

        let status = backend.framebuffer_status();
        if status != glow::FRAMEBUFFER_COMPLETE {
            backend.delete_framebuffer(framebuffer);
            backend.delete_texture(texture);
            return Err(Error::IncompleteFramebuffer(status));
        }

        Ok((framebuffer, texture))
    }

    /// Upload the `width`x`height` region of `image` at `(x, y)` into a new
    /// texture. Requests past the driver's limit are clamped with a warning.
    /// The texture bound on unit 0 is restored afterwards.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Gl`] if the driver refuses to create the texture.
    ///
    /// # Panics
    ///
    /// Panics if the region lies outside `image`.
    #[allow(clippy::too_many_arguments)]
    pub fn upload_texture<B: GlBackend + ?Sized>(
        &mut self,
        backend: &B,
        image: &image::RgbaImage,
        x: u32,
        y: u32,
        width: u32,
        height: u32,
        min_filter: Filter,
        mag_filter: Filter,
    ) -> Result<u32> {
        assert!(
            x + width <= image.width() && y + height <= image.height(),
            "upload region exceeds the {}x{} source",
            image.width(),
            image.height()
        );

        let max = u32::try_from(self.max_texture_size(backend)).unwrap_or(0);
        let (width, height) = if width > max || height > max {
            log::warn!(
                "Attempt to create texture of size {width}x{height} but max size is {max}. Clipping will occur."
            );
            (width.min(max), height.min(max))
        } else {
            (width, height)
        };

        let (gl_width, gl_height) = (gl_size(width), gl_size(height));
        let texture = self.create_texture(backend, gl_width, gl_height, min_filter, mag_filter)?;

        let region = image::imageops::crop_imm(image, x, y, width, height).to_image();
        backend.bind_texture(0, texture);
        backend.texture_image(gl_width, gl_height, Some(region.as_raw()));

        let previous = self.attachments.textures[0].id;
        if previous > 0 {
            backend.bind_texture(0, previous);
        }

        Ok(texture)
    }

    /// Delete a program and forget its uniform values.
    pub fn delete_program<B: GlBackend + ?Sized>(&mut self, backend: &B, program: u32) {
        backend.delete_program(program);
        self.uniforms.borrow_mut().clear_program(program);
    }

    /// Whether `other` shares this queue's uniform state.
    #[must_use]
    pub fn shares_uniforms_with(&self, other: &CommandQueue) -> bool {
        Rc::ptr_eq(&self.uniforms, &other.uniforms)
    }
}

fn range<T>(items: &[T], offset: u32, count: u32) -> &[T] {
    &items[offset as usize..(offset + count) as usize]
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn viewport_size(viewport: &Rect) -> [u16; 2] {
    [viewport.width as u16, viewport.height as u16]
}

/// Convert a `u32` to `i32` for GL API calls.
///
/// # Panics
///
/// Panics if `value > i32::MAX`.
fn gl_size(value: u32) -> i32 {
    i32::try_from(value).expect("dimension exceeds i32::MAX")
}

/// Scale a window-space rectangle to device pixels and move its origin to
/// the bottom left, as `glScissor` expects.
fn flip_scissor(rect: &IRect, surface_height: u32, scale_factor: u32) -> IRect {
    let scale = gl_size(scale_factor);
    IRect::new(
        rect.x * scale,
        gl_size(surface_height) - rect.height * scale - rect.y * scale,
        rect.width * scale,
        rect.height * scale,
    )
}
