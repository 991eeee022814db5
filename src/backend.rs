//! The GL surface the command queue executes against.
//!
//! [`GlBackend`] is deliberately narrow: only the calls batch execution and
//! the resource helpers issue. [`GlowBackend`] forwards them to a
//! [`glow::Context`].

use std::num::NonZeroU32;
use std::sync::Arc;

use bitflags::bitflags;
use glow::{HasContext, PixelUnpackData};

use crate::error::Result;
use crate::geometry::IRect;
use crate::shaders;
use crate::types::{Filter, Vertex};
use crate::uniforms::UniformValue;

/// GL internal format for RGBA8 textures, pre-cast to the `i32` that
/// `tex_image_2d` expects.
#[allow(clippy::cast_possible_wrap)]
const RGBA8_INTERNAL_FORMAT: i32 = glow::RGBA8 as i32;

bitflags! {
    /// Buffers affected by a clear, using the GL bit values.
    #[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
    pub struct ClearMask: u32 {
        /// `GL_COLOR_BUFFER_BIT`.
        const COLOR = glow::COLOR_BUFFER_BIT;
        /// `GL_DEPTH_BUFFER_BIT`.
        const DEPTH = glow::DEPTH_BUFFER_BIT;
        /// `GL_STENCIL_BUFFER_BIT`.
        const STENCIL = glow::STENCIL_BUFFER_BIT;
    }
}

/// The GL entry points used by [`CommandQueue`](crate::CommandQueue).
///
/// Object names are plain `u32`s as GL hands them out; 0 means "none".
pub trait GlBackend {
    /// `GL_MAX_TEXTURE_SIZE`.
    fn max_texture_size(&self) -> i32;

    /// Fixed pipeline state for a frame: depth test with `GL_LEQUAL` and
    /// premultiplied-alpha blending.
    fn prepare(&self);

    /// Create and bind a vertex array object.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Gl`](crate::Error::Gl) if the driver refuses.
    fn create_vertex_array(&self) -> Result<u32>;

    /// Delete a vertex array object.
    fn delete_vertex_array(&self, id: u32);

    /// Create an array buffer holding `bytes` of packed [`Vertex`] data and
    /// point attributes 0 (position) and 1 (uv) at it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Gl`](crate::Error::Gl) if the driver refuses.
    fn upload_vertices(&self, bytes: &[u8]) -> Result<u32>;

    /// Delete a buffer object.
    fn delete_buffer(&self, id: u32);

    /// `glBindFramebuffer(GL_FRAMEBUFFER, id)`.
    fn bind_framebuffer(&self, id: u32);

    /// `glViewport(0, 0, width, height)`.
    fn viewport(&self, width: u16, height: u16);

    /// Enable the scissor test with `rect` (GL window coordinates), or
    /// disable it.
    fn scissor(&self, rect: Option<IRect>);

    /// `glClear(mask)`.
    fn clear(&self, mask: ClearMask);

    /// `glUseProgram(id)`.
    fn use_program(&self, id: u32);

    /// Bind a 2D texture on a texture unit.
    fn bind_texture(&self, unit: u32, id: u32);

    /// Upload a uniform of the currently used program.
    fn set_uniform(&self, location: u32, value: UniformValue<'_>);

    /// `glDrawArrays(GL_TRIANGLES, first, count)`.
    fn draw_arrays(&self, first: u32, count: u32);

    /// Open a debug group, if the context supports it.
    fn push_debug_group(&self, label: &str);

    /// Close the innermost debug group.
    fn pop_debug_group(&self);

    /// Generate a texture name and bind it on unit 0.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Gl`](crate::Error::Gl) if the driver refuses.
    fn create_texture(&self) -> Result<u32>;

    /// Set filtering (and clamp-to-edge wrapping) on the texture bound to
    /// unit 0.
    fn texture_parameters(&self, min: Filter, mag: Filter);

    /// Allocate RGBA8 storage for the texture bound to unit 0, optionally
    /// filling it with tightly packed RGBA pixels.
    fn texture_image(&self, width: i32, height: i32, pixels: Option<&[u8]>);

    /// Generate a framebuffer name.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Gl`](crate::Error::Gl) if the driver refuses.
    fn create_framebuffer(&self) -> Result<u32>;

    /// Attach `texture` as color attachment 0 of the bound framebuffer.
    fn attach_color_texture(&self, texture: u32);

    /// `glCheckFramebufferStatus(GL_FRAMEBUFFER)`.
    fn framebuffer_status(&self) -> u32;

    /// Delete a texture.
    fn delete_texture(&self, id: u32);

    /// Delete a framebuffer.
    fn delete_framebuffer(&self, id: u32);

    /// Compile and link a program from a vertex stage and a fragment body.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Gl`](crate::Error::Gl) with the driver's log if
    /// compilation or linking fails.
    fn compile_program(&self, vertex_src: &str, fragment_src: &str) -> Result<u32>;

    /// Delete a linked program.
    fn delete_program(&self, id: u32);

    /// Location of a named uniform in a linked program.
    fn uniform_location(&self, program: u32, name: &str) -> Option<u32>;
}

/// [`GlBackend`] over a [`glow::Context`].
///
/// Every call assumes the context passed to [`new`](Self::new) is current on
/// the calling thread.
pub struct GlowBackend {
    gl: Arc<glow::Context>,
}

impl GlowBackend {
    /// Wrap a GL context.
    ///
    /// # Safety
    ///
    /// The context must be valid and current whenever a method of the
    /// returned backend is called.
    #[must_use]
    pub unsafe fn new(gl: Arc<glow::Context>) -> Self {
        Self { gl }
    }

    /// The wrapped context.
    #[must_use]
    pub fn context(&self) -> &Arc<glow::Context> {
        &self.gl
    }
}

fn named<T>(id: u32, wrap: fn(NonZeroU32) -> T) -> Option<T> {
    NonZeroU32::new(id).map(wrap)
}

// Every GL call below relies on the contract of `GlowBackend::new`: the
// context is valid and current.
impl GlBackend for GlowBackend {
    fn max_texture_size(&self) -> i32 {
        unsafe { self.gl.get_parameter_i32(glow::MAX_TEXTURE_SIZE) }
    }

    fn prepare(&self) {
        let gl = &self.gl;
        unsafe {
            gl.enable(glow::DEPTH_TEST);
            gl.depth_func(glow::LEQUAL);

            // Premultiplied alpha.
            gl.enable(glow::BLEND);
            gl.blend_func(glow::ONE, glow::ONE_MINUS_SRC_ALPHA);
            gl.blend_equation(glow::FUNC_ADD);
        }
    }

    fn create_vertex_array(&self) -> Result<u32> {
        let gl = &self.gl;
        unsafe {
            let vao = gl.create_vertex_array()?;
            gl.bind_vertex_array(Some(vao));
            Ok(vao.0.get())
        }
    }

    fn delete_vertex_array(&self, id: u32) {
        if let Some(vao) = named(id, glow::NativeVertexArray) {
            unsafe {
                self.gl.bind_vertex_array(None);
                self.gl.delete_vertex_array(vao);
            }
        }
    }

    fn upload_vertices(&self, bytes: &[u8]) -> Result<u32> {
        // Vertex is 16 bytes, well within i32 range.
        #[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
        let stride = std::mem::size_of::<Vertex>() as i32;
        #[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
        let uv_offset = std::mem::offset_of!(Vertex, uv) as i32;

        let gl = &self.gl;
        unsafe {
            let buffer = gl.create_buffer()?;
            gl.bind_buffer(glow::ARRAY_BUFFER, Some(buffer));
            gl.buffer_data_u8_slice(glow::ARRAY_BUFFER, bytes, glow::STREAM_DRAW);

            gl.enable_vertex_attrib_array(0);
            gl.vertex_attrib_pointer_f32(0, 2, glow::FLOAT, false, stride, 0);
            gl.enable_vertex_attrib_array(1);
            gl.vertex_attrib_pointer_f32(1, 2, glow::FLOAT, false, stride, uv_offset);

            Ok(buffer.0.get())
        }
    }

    fn delete_buffer(&self, id: u32) {
        if let Some(buffer) = named(id, glow::NativeBuffer) {
            unsafe {
                self.gl.bind_buffer(glow::ARRAY_BUFFER, None);
                self.gl.delete_buffer(buffer);
            }
        }
    }

    fn bind_framebuffer(&self, id: u32) {
        unsafe {
            self.gl
                .bind_framebuffer(glow::FRAMEBUFFER, named(id, glow::NativeFramebuffer));
        }
    }

    fn viewport(&self, width: u16, height: u16) {
        unsafe { self.gl.viewport(0, 0, i32::from(width), i32::from(height)) };
    }

    fn scissor(&self, rect: Option<IRect>) {
        let gl = &self.gl;
        unsafe {
            match rect {
                Some(r) => {
                    gl.enable(glow::SCISSOR_TEST);
                    gl.scissor(r.x, r.y, r.width, r.height);
                }
                None => gl.disable(glow::SCISSOR_TEST),
            }
        }
    }

    fn clear(&self, mask: ClearMask) {
        unsafe { self.gl.clear(mask.bits()) };
    }

    fn use_program(&self, id: u32) {
        unsafe { self.gl.use_program(named(id, glow::NativeProgram)) };
    }

    fn bind_texture(&self, unit: u32, id: u32) {
        unsafe {
            self.gl.active_texture(glow::TEXTURE0 + unit);
            self.gl
                .bind_texture(glow::TEXTURE_2D, named(id, glow::NativeTexture));
        }
    }

    fn set_uniform(&self, location: u32, value: UniformValue<'_>) {
        let gl = &self.gl;
        let location = glow::NativeUniformLocation(location);
        let location = Some(&location);

        unsafe {
            match value {
                UniformValue::Float { components, data } => match components {
                    1 => gl.uniform_1_f32_slice(location, data),
                    2 => gl.uniform_2_f32_slice(location, data),
                    3 => gl.uniform_3_f32_slice(location, data),
                    _ => gl.uniform_4_f32_slice(location, data),
                },
                UniformValue::Int { components, data } => match components {
                    1 => gl.uniform_1_i32_slice(location, data),
                    2 => gl.uniform_2_i32_slice(location, data),
                    3 => gl.uniform_3_i32_slice(location, data),
                    _ => gl.uniform_4_i32_slice(location, data),
                },
                UniformValue::Matrix4(data) => gl.uniform_matrix_4_f32_slice(location, false, data),
            }
        }
    }

    fn draw_arrays(&self, first: u32, count: u32) {
        let first = i32::try_from(first).expect("vertex offset exceeds i32::MAX");
        let count = i32::try_from(count).expect("vertex count exceeds i32::MAX");
        unsafe { self.gl.draw_arrays(glow::TRIANGLES, first, count) };
    }

    fn push_debug_group(&self, label: &str) {
        if self.gl.supports_debug() {
            unsafe {
                self.gl
                    .push_debug_group(glow::DEBUG_SOURCE_APPLICATION, 0, label);
            }
        }
    }

    fn pop_debug_group(&self) {
        if self.gl.supports_debug() {
            unsafe { self.gl.pop_debug_group() };
        }
    }

    fn create_texture(&self) -> Result<u32> {
        let gl = &self.gl;
        unsafe {
            let texture = gl.create_texture()?;
            gl.active_texture(glow::TEXTURE0);
            gl.bind_texture(glow::TEXTURE_2D, Some(texture));
            Ok(texture.0.get())
        }
    }

    fn texture_parameters(&self, min: Filter, mag: Filter) {
        let gl = &self.gl;
        // GL constant values are small enough that the cast is always safe.
        #[allow(clippy::cast_possible_wrap)]
        unsafe {
            gl.tex_parameter_i32(glow::TEXTURE_2D, glow::TEXTURE_MIN_FILTER, min.to_gl() as i32);
            gl.tex_parameter_i32(glow::TEXTURE_2D, glow::TEXTURE_MAG_FILTER, mag.to_gl() as i32);
            gl.tex_parameter_i32(
                glow::TEXTURE_2D,
                glow::TEXTURE_WRAP_S,
                glow::CLAMP_TO_EDGE as i32,
            );
            gl.tex_parameter_i32(
                glow::TEXTURE_2D,
                glow::TEXTURE_WRAP_T,
                glow::CLAMP_TO_EDGE as i32,
            );
        }
    }

    fn texture_image(&self, width: i32, height: i32, pixels: Option<&[u8]>) {
        unsafe {
            self.gl.pixel_store_i32(glow::UNPACK_ALIGNMENT, 1);
            self.gl.tex_image_2d(
                glow::TEXTURE_2D,
                0,
                RGBA8_INTERNAL_FORMAT,
                width,
                height,
                0,
                glow::RGBA,
                glow::UNSIGNED_BYTE,
                PixelUnpackData::Slice(pixels),
            );
        }
    }

    fn create_framebuffer(&self) -> Result<u32> {
        let framebuffer = unsafe { self.gl.create_framebuffer() }?;
        Ok(framebuffer.0.get())
    }

    fn attach_color_texture(&self, texture: u32) {
        unsafe {
            self.gl.framebuffer_texture_2d(
                glow::FRAMEBUFFER,
                glow::COLOR_ATTACHMENT0,
                glow::TEXTURE_2D,
                named(texture, glow::NativeTexture),
                0,
            );
        }
    }

    fn framebuffer_status(&self) -> u32 {
        unsafe { self.gl.check_framebuffer_status(glow::FRAMEBUFFER) }
    }

    fn delete_texture(&self, id: u32) {
        if let Some(texture) = named(id, glow::NativeTexture) {
            unsafe { self.gl.delete_texture(texture) };
        }
    }

    fn delete_framebuffer(&self, id: u32) {
        if let Some(framebuffer) = named(id, glow::NativeFramebuffer) {
            unsafe { self.gl.delete_framebuffer(framebuffer) };
        }
    }

    fn compile_program(&self, vertex_src: &str, fragment_src: &str) -> Result<u32> {
        let program = unsafe { shaders::compile_program(&self.gl, vertex_src, fragment_src) }?;
        Ok(program.0.get())
    }

    fn delete_program(&self, id: u32) {
        if let Some(program) = named(id, glow::NativeProgram) {
            unsafe { self.gl.delete_program(program) };
        }
    }

    fn uniform_location(&self, program: u32, name: &str) -> Option<u32> {
        let program = named(program, glow::NativeProgram)?;
        unsafe { self.gl.get_uniform_location(program, name) }.map(|location| location.0)
    }
}

/// A backend that records calls instead of issuing them.
#[cfg(test)]
pub(crate) mod recording {
    use std::cell::{Cell, RefCell};
    use std::collections::HashMap;

    use super::{ClearMask, GlBackend};
    use crate::error::Result;
    use crate::geometry::IRect;
    use crate::types::Filter;
    use crate::uniforms::UniformValue;

    /// Owned copy of a [`UniformValue`].
    #[derive(Clone, Debug, PartialEq)]
    pub enum RecordedUniform {
        Float(usize, Vec<f32>),
        Int(usize, Vec<i32>),
        Matrix4(Vec<f32>),
    }

    #[derive(Clone, Debug, PartialEq)]
    pub enum GlCall {
        Prepare,
        CreateVertexArray(u32),
        DeleteVertexArray(u32),
        UploadVertices { buffer: u32, bytes: usize },
        DeleteBuffer(u32),
        BindFramebuffer(u32),
        Viewport(u16, u16),
        Scissor(Option<IRect>),
        Clear(ClearMask),
        UseProgram(u32),
        BindTexture { unit: u32, id: u32 },
        Uniform { location: u32, value: RecordedUniform },
        DrawArrays { first: u32, count: u32 },
        PushDebugGroup(String),
        PopDebugGroup,
        CreateTexture(u32),
        TextureParameters(Filter, Filter),
        TextureImage { width: i32, height: i32, pixels: Option<usize> },
        CreateFramebuffer(u32),
        AttachColorTexture(u32),
        DeleteTexture(u32),
        DeleteFramebuffer(u32),
        CompileProgram(u32),
        DeleteProgram(u32),
    }

    pub struct RecordingBackend {
        calls: RefCell<Vec<GlCall>>,
        next_id: Cell<u32>,
        locations: RefCell<HashMap<(u32, String), u32>>,
        pub max_texture_size: i32,
        pub framebuffer_status: Cell<u32>,
    }

    impl Default for RecordingBackend {
        fn default() -> Self {
            Self {
                calls: RefCell::default(),
                next_id: Cell::new(100),
                locations: RefCell::default(),
                max_texture_size: 4096,
                framebuffer_status: Cell::new(glow::FRAMEBUFFER_COMPLETE),
            }
        }
    }

    impl RecordingBackend {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn take_calls(&self) -> Vec<GlCall> {
            self.calls.take()
        }

        fn push(&self, call: GlCall) {
            self.calls.borrow_mut().push(call);
        }

        fn next_id(&self) -> u32 {
            let id = self.next_id.get();
            self.next_id.set(id + 1);
            id
        }
    }

    impl GlBackend for RecordingBackend {
        fn max_texture_size(&self) -> i32 {
            self.max_texture_size
        }

        fn prepare(&self) {
            self.push(GlCall::Prepare);
        }

        fn create_vertex_array(&self) -> Result<u32> {
            let id = self.next_id();
            self.push(GlCall::CreateVertexArray(id));
            Ok(id)
        }

        fn delete_vertex_array(&self, id: u32) {
            self.push(GlCall::DeleteVertexArray(id));
        }

        fn upload_vertices(&self, bytes: &[u8]) -> Result<u32> {
            let buffer = self.next_id();
            self.push(GlCall::UploadVertices {
                buffer,
                bytes: bytes.len(),
            });
            Ok(buffer)
        }

        fn delete_buffer(&self, id: u32) {
            self.push(GlCall::DeleteBuffer(id));
        }

        fn bind_framebuffer(&self, id: u32) {
            self.push(GlCall::BindFramebuffer(id));
        }

        fn viewport(&self, width: u16, height: u16) {
            self.push(GlCall::Viewport(width, height));
        }

        fn scissor(&self, rect: Option<IRect>) {
            self.push(GlCall::Scissor(rect));
        }

        fn clear(&self, mask: ClearMask) {
            self.push(GlCall::Clear(mask));
        }

        fn use_program(&self, id: u32) {
            self.push(GlCall::UseProgram(id));
        }

        fn bind_texture(&self, unit: u32, id: u32) {
            self.push(GlCall::BindTexture { unit, id });
        }

        fn set_uniform(&self, location: u32, value: UniformValue<'_>) {
            let value = match value {
                UniformValue::Float { components, data } => {
                    RecordedUniform::Float(components, data.to_vec())
                }
                UniformValue::Int { components, data } => {
                    RecordedUniform::Int(components, data.to_vec())
                }
                UniformValue::Matrix4(data) => RecordedUniform::Matrix4(data.to_vec()),
            };
            self.push(GlCall::Uniform { location, value });
        }

        fn draw_arrays(&self, first: u32, count: u32) {
            self.push(GlCall::DrawArrays { first, count });
        }

        fn push_debug_group(&self, label: &str) {
            self.push(GlCall::PushDebugGroup(label.to_owned()));
        }

        fn pop_debug_group(&self) {
            self.push(GlCall::PopDebugGroup);
        }

        fn create_texture(&self) -> Result<u32> {
            let id = self.next_id();
            self.push(GlCall::CreateTexture(id));
            Ok(id)
        }

        fn texture_parameters(&self, min: Filter, mag: Filter) {
            self.push(GlCall::TextureParameters(min, mag));
        }

        fn texture_image(&self, width: i32, height: i32, pixels: Option<&[u8]>) {
            self.push(GlCall::TextureImage {
                width,
                height,
                pixels: pixels.map(<[u8]>::len),
            });
        }

        fn create_framebuffer(&self) -> Result<u32> {
            let id = self.next_id();
            self.push(GlCall::CreateFramebuffer(id));
            Ok(id)
        }

        fn attach_color_texture(&self, texture: u32) {
            self.push(GlCall::AttachColorTexture(texture));
        }

        fn framebuffer_status(&self) -> u32 {
            self.framebuffer_status.get()
        }

        fn delete_texture(&self, id: u32) {
            self.push(GlCall::DeleteTexture(id));
        }

        fn delete_framebuffer(&self, id: u32) {
            self.push(GlCall::DeleteFramebuffer(id));
        }

        fn compile_program(&self, _vertex_src: &str, _fragment_src: &str) -> Result<u32> {
            let id = self.next_id();
            self.push(GlCall::CompileProgram(id));
            Ok(id)
        }

        fn delete_program(&self, id: u32) {
            self.push(GlCall::DeleteProgram(id));
        }

        fn uniform_location(&self, program: u32, name: &str) -> Option<u32> {
            let mut locations = self.locations.borrow_mut();
            #[allow(clippy::cast_possible_truncation)]
            let next = locations.keys().filter(|(p, _)| *p == program).count() as u32;
            Some(
                *locations
                    .entry((program, name.to_owned()))
                    .or_insert(next),
            )
        }
    }
}
