//! Deferred OpenGL rendering of scene graphs via [glow].
//!
//! This crate records GL work into a [`CommandQueue`] instead of issuing it
//! immediately, then replays the whole frame in one pass. A [`RenderJob`]
//! walks a tree of [`RenderNode`]s, tracking transforms and clips, and turns
//! each node into draws on the queue. Consecutive draws with the same program,
//! target and uniforms are merged into a single `glDrawArrays` call.
//!
//! # Features
//!
//! - **Batch merging**: contiguous draws that change no state collapse into
//!   one batch.
//! - **Uniform diffing**: only values that differ from what a program last saw
//!   are uploaded, and each batch replays exactly the values it captured.
//! - **Lazy state**: framebuffer, program, viewport and scissor are applied
//!   only when they change during execution.
//! - **Transform and clip tracking**: translations are folded into vertex
//!   positions, rounded clips are intersected on the CPU where possible, and
//!   everything else is handed to a [`Fallback`](render_job::Fallback).
//! - **Damage regions**: [`Renderer::render`] redraws only the bounding box of
//!   the damaged area, using the scissor test.
//!
//! # Safety
//!
//! [`GlowBackend`] wraps a [`glow::Context`], which must be current whenever
//! the backend is used. Creating it is `unsafe` for that reason; everything
//! else is safe.
//!
//! [glow]: https://docs.rs/glow

mod attachments;
pub mod backend;
pub mod command_queue;
mod driver;
mod error;
pub mod geometry;
pub mod program;
pub mod render_job;
mod render_node;
mod renderer;
mod shaders;
pub mod transform;
mod types;
pub mod uniforms;

pub use attachments::{AttachmentState, BindFramebuffer, BindTexture, MAX_TEXTURE_UNITS};
pub use backend::{ClearMask, GlBackend, GlowBackend};
pub use command_queue::CommandQueue;
pub use driver::{Driver, Programs, RenderTarget};
pub use error::{Error, Result};
pub use geometry::{Corner, IRect, Rect, RoundedRect};
pub use program::{Program, Uniform};
pub use render_job::RenderJob;
pub use render_node::{NodeKind, RenderNode};
pub use renderer::{render_region, Renderer};
pub use transform::{Transform, TransformCategory};
pub use types::{Color, ColorStop, Filter, Vertex, N_VERTICES};
