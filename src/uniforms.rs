//! Last-written uniform values per program, diffed per draw.
//!
//! Setting a uniform never touches GL. The value lands in a word store and
//! the slot is flagged as changed; when a draw ends, the command queue
//! snapshots the changed slots of that draw's program as `(info, location)`
//! pairs. Execution later resolves each pair back into the stored value.
//!
//! A value that changes after it has been snapshotted is written to fresh
//! storage, so batches recorded earlier in the frame still read the value
//! they captured.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use glam::Mat4;

use crate::geometry::RoundedRect;
use crate::types::Color;

/// Uniform state shared by every command queue on one display connection.
///
/// Programs are compiled once and used by several surfaces, so their last
/// known uniform values must be shared too. All queues sharing this state
/// must run on the same thread.
pub type SharedUniformState = Rc<RefCell<UniformState>>;

/// Storage layout of a uniform, which also selects the GL setter.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum UniformFormat {
    /// `float`.
    F1,
    /// `vec2`.
    F2,
    /// `vec3`.
    F3,
    /// `vec4`.
    F4,
    /// `float[]`.
    F1v,
    /// `vec2[]`.
    F2v,
    /// `vec3[]`.
    F3v,
    /// `vec4[]`.
    F4v,
    /// `int`.
    I1,
    /// `ivec2`.
    I2,
    /// `ivec3`.
    I3,
    /// `ivec4`.
    I4,
    /// Sampler bound to a texture unit.
    Texture,
    /// `mat4`.
    Matrix,
    /// `vec4` color.
    Color,
    /// Rounded rectangle as up to three `vec4`s.
    RoundedRect,
}

impl UniformFormat {
    /// Number of 32-bit words one element occupies.
    #[must_use]
    pub const fn element_words(self) -> usize {
        match self {
            Self::F1 | Self::F1v | Self::I1 | Self::Texture => 1,
            Self::F2 | Self::F2v | Self::I2 => 2,
            Self::F3 | Self::F3v | Self::I3 => 3,
            Self::F4 | Self::F4v | Self::I4 | Self::Color => 4,
            Self::RoundedRect => 12,
            Self::Matrix => 16,
        }
    }
}

/// Where a snapshotted uniform value lives and how to apply it.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct UniformInfo {
    /// Storage layout.
    pub format: UniformFormat,
    /// Number of elements; 1 for scalars.
    pub array_count: u32,
    /// Word offset into the value store.
    pub offset: u32,
    /// For rounded rectangles, whether the corner radii are sent too.
    pub send_corners: bool,
}

impl UniformInfo {
    fn len(&self) -> usize {
        self.format.element_words() * self.array_count as usize
    }
}

/// A resolved uniform value, ready for the matching `glUniform*` call.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum UniformValue<'a> {
    /// `glUniform{components}fv` with `data.len() / components` elements.
    Float {
        /// Components per element (1 to 4).
        components: usize,
        /// Packed element data.
        data: &'a [f32],
    },
    /// `glUniform{components}iv` with `data.len() / components` elements.
    Int {
        /// Components per element (1 to 4).
        components: usize,
        /// Packed element data.
        data: &'a [i32],
    },
    /// `glUniformMatrix4fv`, column major.
    Matrix4(&'a [f32]),
}

#[derive(Copy, Clone, Debug)]
struct Slot {
    info: UniformInfo,
    changed: bool,
}

#[derive(Default, Debug)]
struct ProgramUniforms {
    /// Indexed by uniform location.
    slots: Vec<Option<Slot>>,
}

/// Last-set value per `(program, location)`.
#[derive(Default, Debug)]
pub struct UniformState {
    programs: HashMap<u32, ProgramUniforms>,
    values: Vec<u32>,
}

impl UniformState {
    /// Create an empty uniform state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty uniform state wrapped for sharing between queues.
    #[must_use]
    pub fn new_shared() -> SharedUniformState {
        Rc::new(RefCell::new(Self::new()))
    }

    fn set(
        &mut self,
        program: u32,
        location: u32,
        format: UniformFormat,
        array_count: u32,
        send_corners: bool,
        words: &[u32],
    ) {
        let Self { programs, values } = self;
        let slots = &mut programs.entry(program).or_default().slots;
        let index = location as usize;
        if slots.len() <= index {
            slots.resize(index + 1, None);
        }

        match &mut slots[index] {
            Some(slot) if slot.info.format == format && slot.info.array_count == array_count => {
                let offset = slot.info.offset as usize;
                let current = &mut values[offset..offset + words.len()];
                if current == words {
                    return;
                }
                if slot.changed {
                    // Not snapshotted yet, nobody else reads this storage.
                    current.copy_from_slice(words);
                } else {
                    slot.info.offset = alloc(values, words);
                }
                slot.info.send_corners = send_corners;
                slot.changed = true;
            }
            entry => {
                *entry = Some(Slot {
                    info: UniformInfo {
                        format,
                        array_count,
                        offset: alloc(values, words),
                        send_corners,
                    },
                    changed: true,
                });
            }
        }
    }

    /// Set a `float`.
    pub fn set1f(&mut self, program: u32, location: u32, value: f32) {
        self.set(program, location, UniformFormat::F1, 1, false, &[value.to_bits()]);
    }

    /// Set a `vec2`.
    pub fn set2f(&mut self, program: u32, location: u32, x: f32, y: f32) {
        self.set_floats(program, location, UniformFormat::F2, 1, &[x, y]);
    }

    /// Set a `vec3`.
    pub fn set3f(&mut self, program: u32, location: u32, x: f32, y: f32, z: f32) {
        self.set_floats(program, location, UniformFormat::F3, 1, &[x, y, z]);
    }

    /// Set a `vec4`.
    pub fn set4f(&mut self, program: u32, location: u32, value: [f32; 4]) {
        self.set_floats(program, location, UniformFormat::F4, 1, &value);
    }

    /// Set a `float[]`.
    pub fn set1fv(&mut self, program: u32, location: u32, values: &[f32]) {
        self.set_float_array(program, location, UniformFormat::F1v, values);
    }

    /// Set a `vec2[]` from packed components.
    pub fn set2fv(&mut self, program: u32, location: u32, values: &[f32]) {
        self.set_float_array(program, location, UniformFormat::F2v, values);
    }

    /// Set a `vec3[]` from packed components.
    pub fn set3fv(&mut self, program: u32, location: u32, values: &[f32]) {
        self.set_float_array(program, location, UniformFormat::F3v, values);
    }

    /// Set a `vec4[]` from packed components.
    pub fn set4fv(&mut self, program: u32, location: u32, values: &[f32]) {
        self.set_float_array(program, location, UniformFormat::F4v, values);
    }

    /// Set an `int`.
    pub fn set1i(&mut self, program: u32, location: u32, value: i32) {
        self.set_ints(program, location, UniformFormat::I1, &[value]);
    }

    /// Set an `ivec2`.
    pub fn set2i(&mut self, program: u32, location: u32, x: i32, y: i32) {
        self.set_ints(program, location, UniformFormat::I2, &[x, y]);
    }

    /// Set an `ivec3`.
    pub fn set3i(&mut self, program: u32, location: u32, x: i32, y: i32, z: i32) {
        self.set_ints(program, location, UniformFormat::I3, &[x, y, z]);
    }

    /// Set an `ivec4`.
    pub fn set4i(&mut self, program: u32, location: u32, value: [i32; 4]) {
        self.set_ints(program, location, UniformFormat::I4, &value);
    }

    /// Point a sampler at a texture unit.
    pub fn set_texture(&mut self, program: u32, location: u32, unit: u32) {
        self.set(program, location, UniformFormat::Texture, 1, false, &[unit]);
    }

    /// Set a `mat4`.
    pub fn set_matrix(&mut self, program: u32, location: u32, matrix: &Mat4) {
        self.set_floats(
            program,
            location,
            UniformFormat::Matrix,
            1,
            &matrix.to_cols_array(),
        );
    }

    /// Set a color.
    pub fn set_color(&mut self, program: u32, location: u32, color: Color) {
        self.set_floats(program, location, UniformFormat::Color, 1, &color.to_array());
    }

    /// Set a rounded rectangle. Corner radii are only sent when present.
    pub fn set_rounded_rect(&mut self, program: u32, location: u32, rect: &RoundedRect) {
        let data = rect.to_uniform_data();
        self.set(
            program,
            location,
            UniformFormat::RoundedRect,
            1,
            !rect.is_rectilinear(),
            bytemuck::cast_slice(&data),
        );
    }

    fn set_floats(
        &mut self,
        program: u32,
        location: u32,
        format: UniformFormat,
        array_count: u32,
        values: &[f32],
    ) {
        self.set(
            program,
            location,
            format,
            array_count,
            false,
            bytemuck::cast_slice(values),
        );
    }

    fn set_float_array(
        &mut self,
        program: u32,
        location: u32,
        format: UniformFormat,
        values: &[f32],
    ) {
        let components = format.element_words();
        assert!(
            !values.is_empty() && values.len() % components == 0,
            "uniform array length {} is not a multiple of {components}",
            values.len()
        );
        #[allow(clippy::cast_possible_truncation)]
        let count = (values.len() / components) as u32;
        self.set_floats(program, location, format, count, values);
    }

    fn set_ints(&mut self, program: u32, location: u32, format: UniformFormat, values: &[i32]) {
        self.set(
            program,
            location,
            format,
            1,
            false,
            bytemuck::cast_slice(values),
        );
    }

    /// Report every uniform of `program` changed since the last snapshot and
    /// mark it as captured.
    pub fn snapshot(&mut self, program: u32, mut callback: impl FnMut(&UniformInfo, u32)) {
        let Some(uniforms) = self.programs.get_mut(&program) else {
            return;
        };

        for (location, slot) in uniforms.slots.iter_mut().enumerate() {
            if let Some(slot) = slot.as_mut().filter(|s| s.changed) {
                slot.changed = false;
                #[allow(clippy::cast_possible_truncation)]
                callback(&slot.info, location as u32);
            }
        }
    }

    /// Resolve a snapshotted uniform into the value to upload.
    #[must_use]
    pub fn value(&self, info: &UniformInfo) -> UniformValue<'_> {
        let offset = info.offset as usize;
        let words = &self.values[offset..offset + info.len()];

        match info.format {
            UniformFormat::F1 | UniformFormat::F1v => float(1, words),
            UniformFormat::F2 | UniformFormat::F2v => float(2, words),
            UniformFormat::F3 | UniformFormat::F3v => float(3, words),
            UniformFormat::F4 | UniformFormat::F4v | UniformFormat::Color => float(4, words),
            UniformFormat::I1 | UniformFormat::Texture => int(1, words),
            UniformFormat::I2 => int(2, words),
            UniformFormat::I3 => int(3, words),
            UniformFormat::I4 => int(4, words),
            UniformFormat::Matrix => UniformValue::Matrix4(bytemuck::cast_slice(words)),
            UniformFormat::RoundedRect if info.send_corners => float(4, words),
            UniformFormat::RoundedRect => float(4, &words[..4]),
        }
    }

    /// Forget everything about a deleted program.
    pub fn clear_program(&mut self, program: u32) {
        self.programs.remove(&program);
    }

    /// Compact the value store once the frame's batches are gone.
    pub fn end_frame(&mut self) {
        let mut compacted = Vec::with_capacity(self.values.len());

        for uniforms in self.programs.values_mut() {
            for slot in uniforms.slots.iter_mut().flatten() {
                let offset = slot.info.offset as usize;
                let words = &self.values[offset..offset + slot.info.len()];
                slot.info.offset = alloc(&mut compacted, words);
            }
        }

        self.values = compacted;
    }
}

fn alloc(values: &mut Vec<u32>, words: &[u32]) -> u32 {
    let offset = u32::try_from(values.len()).expect("uniform value store exceeds u32::MAX words");
    values.extend_from_slice(words);
    offset
}

fn float(components: usize, words: &[u32]) -> UniformValue<'_> {
    UniformValue::Float {
        components,
        data: bytemuck::cast_slice(words),
    }
}

fn int(components: usize, words: &[u32]) -> UniformValue<'_> {
    UniformValue::Int {
        components,
        data: bytemuck::cast_slice(words),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Rect;

    fn snapshot(state: &mut UniformState, program: u32) -> Vec<(UniformInfo, u32)> {
        let mut out = Vec::new();
        state.snapshot(program, |info, location| out.push((*info, location)));
        out
    }

    #[test]
    fn unchanged_value_is_not_reported_twice() {
        let mut state = UniformState::new();
        state.set1f(1, 3, 0.5);
        assert_eq!(snapshot(&mut state, 1).len(), 1);

        state.set1f(1, 3, 0.5);
        assert!(snapshot(&mut state, 1).is_empty());
    }

    #[test]
    fn snapshot_is_per_program() {
        let mut state = UniformState::new();
        state.set1f(1, 0, 1.0);
        state.set1f(2, 0, 2.0);
        let first = snapshot(&mut state, 1);
        assert_eq!(first.len(), 1);
        assert_eq!(state.value(&first[0].0), float(1, &[1.0f32.to_bits()]));
        assert_eq!(snapshot(&mut state, 2).len(), 1);
    }

    #[test]
    fn change_after_snapshot_gets_fresh_storage() {
        let mut state = UniformState::new();
        state.set4f(7, 1, [1.0, 0.0, 0.0, 1.0]);
        let (old, _) = snapshot(&mut state, 7)[0];

        state.set4f(7, 1, [0.0, 1.0, 0.0, 1.0]);
        let (new, location) = snapshot(&mut state, 7)[0];

        assert_eq!(location, 1);
        assert_ne!(old.offset, new.offset);
        assert_eq!(
            state.value(&old),
            UniformValue::Float {
                components: 4,
                data: &[1.0, 0.0, 0.0, 1.0]
            }
        );
        assert_eq!(
            state.value(&new),
            UniformValue::Float {
                components: 4,
                data: &[0.0, 1.0, 0.0, 1.0]
            }
        );
    }

    #[test]
    fn pending_change_is_overwritten_in_place() {
        let mut state = UniformState::new();
        state.set1i(1, 0, 1);
        state.set1i(1, 0, 2);
        let changes = snapshot(&mut state, 1);
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].0.offset, 0);
        assert_eq!(
            state.value(&changes[0].0),
            UniformValue::Int {
                components: 1,
                data: &[2]
            }
        );
    }

    #[test]
    fn rounded_rect_sends_corners_only_when_rounded() {
        let mut state = UniformState::new();
        state.set_rounded_rect(1, 0, &RoundedRect::from_rect(Rect::new(0.0, 0.0, 10.0, 10.0)));
        let (info, _) = snapshot(&mut state, 1)[0];
        assert!(!info.send_corners);
        match state.value(&info) {
            UniformValue::Float { components, data } => {
                assert_eq!(components, 4);
                assert_eq!(data.len(), 4);
            }
            other => panic!("unexpected value {other:?}"),
        }

        state.set_rounded_rect(1, 0, &RoundedRect::with_radius(Rect::new(0.0, 0.0, 10.0, 10.0), 2.0));
        let (info, _) = snapshot(&mut state, 1)[0];
        assert!(info.send_corners);
        match state.value(&info) {
            UniformValue::Float { data, .. } => assert_eq!(data.len(), 12),
            other => panic!("unexpected value {other:?}"),
        }
    }

    #[test]
    fn float_arrays_record_their_element_count() {
        let mut state = UniformState::new();
        state.set1fv(1, 2, &[0.0; 15]);
        let (info, _) = snapshot(&mut state, 1)[0];
        assert_eq!(info.array_count, 15);
        assert_eq!(info.format, UniformFormat::F1v);
    }

    #[test]
    fn clear_program_forgets_values() {
        let mut state = UniformState::new();
        state.set1f(1, 0, 1.0);
        let _ = snapshot(&mut state, 1);
        state.clear_program(1);
        state.set1f(1, 0, 1.0);
        assert_eq!(snapshot(&mut state, 1).len(), 1);
    }

    #[test]
    fn end_frame_compacts_and_preserves_values() {
        let mut state = UniformState::new();
        state.set1f(1, 0, 1.0);
        let _ = snapshot(&mut state, 1);
        state.set1f(1, 0, 2.0);
        let _ = snapshot(&mut state, 1);
        state.set1f(1, 0, 3.0);
        let _ = snapshot(&mut state, 1);

        state.end_frame();

        // Same value again is still recognised as unchanged.
        state.set1f(1, 0, 3.0);
        assert!(snapshot(&mut state, 1).is_empty());
        state.set1f(1, 0, 4.0);
        let (info, _) = snapshot(&mut state, 1)[0];
        assert_eq!(info.offset, 1);
    }
}
