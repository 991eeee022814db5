//! Tracking of the GL resources a draw expects to be bound.

/// Number of texture units tracked for bind diffing.
pub const MAX_TEXTURE_UNITS: usize = 4;

/// The framebuffer the next batch renders into.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct BindFramebuffer {
    /// GL framebuffer name; 0 is the window surface.
    pub id: u32,
    /// Set when `id` changed since the last batch picked it up.
    pub changed: bool,
}

/// The texture expected on one texture unit.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct BindTexture {
    /// Texture unit index (`GL_TEXTURE0 + unit`).
    pub unit: u32,
    /// GL texture name; 0 means nothing bound.
    pub id: u32,
    /// Set when `id` changed since the last draw picked it up.
    pub changed: bool,
}

/// The currently bound framebuffer and textures, as the recorded batches
/// see them.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AttachmentState {
    /// Target framebuffer.
    pub framebuffer: BindFramebuffer,
    /// Texture bindings, indexed by unit.
    pub textures: [BindTexture; MAX_TEXTURE_UNITS],
}

impl Default for AttachmentState {
    fn default() -> Self {
        Self::new()
    }
}

impl AttachmentState {
    /// Nothing bound, framebuffer 0.
    #[must_use]
    pub fn new() -> Self {
        #[allow(clippy::cast_possible_truncation)]
        let textures = std::array::from_fn(|unit| BindTexture {
            unit: unit as u32,
            id: 0,
            changed: false,
        });
        Self {
            framebuffer: BindFramebuffer::default(),
            textures,
        }
    }

    /// Record that subsequent batches target `id`.
    pub fn bind_framebuffer(&mut self, id: u32) {
        if self.framebuffer.id != id {
            self.framebuffer.id = id;
            self.framebuffer.changed = true;
        }
    }

    /// Record that subsequent draws sample `id` on `unit`.
    ///
    /// # Panics
    ///
    /// Panics if `unit` is not below [`MAX_TEXTURE_UNITS`].
    pub fn bind_texture(&mut self, unit: u32, id: u32) {
        let slot = self
            .textures
            .get_mut(unit as usize)
            .unwrap_or_else(|| panic!("texture unit {unit} exceeds {MAX_TEXTURE_UNITS}"));

        if slot.id != id {
            slot.id = id;
            slot.changed = true;
        }
    }

    /// Collect the texture binds changed since the last call and clear their
    /// change flags. Units with nothing bound are not reported.
    pub fn take_changed_textures(&mut self, mut callback: impl FnMut(&BindTexture)) {
        for texture in &mut self.textures {
            if texture.changed && texture.id > 0 {
                texture.changed = false;
                callback(texture);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rebinding_same_texture_is_not_a_change() {
        let mut state = AttachmentState::new();
        state.bind_texture(1, 5);
        let mut seen = Vec::new();
        state.take_changed_textures(|t| seen.push(*t));
        assert_eq!(seen.len(), 1);
        assert_eq!((seen[0].unit, seen[0].id), (1, 5));

        state.bind_texture(1, 5);
        seen.clear();
        state.take_changed_textures(|t| seen.push(*t));
        assert!(seen.is_empty());
    }

    #[test]
    fn unbinding_is_not_reported() {
        let mut state = AttachmentState::new();
        state.bind_texture(0, 3);
        state.take_changed_textures(|_| {});
        state.bind_texture(0, 0);
        let mut count = 0;
        state.take_changed_textures(|_| count += 1);
        assert_eq!(count, 0);
    }

    #[test]
    fn framebuffer_change_flag() {
        let mut state = AttachmentState::new();
        state.bind_framebuffer(0);
        assert!(!state.framebuffer.changed);
        state.bind_framebuffer(9);
        assert!(state.framebuffer.changed);
        assert_eq!(state.framebuffer.id, 9);
    }

    #[test]
    #[should_panic(expected = "texture unit")]
    fn out_of_range_unit_panics() {
        AttachmentState::new().bind_texture(MAX_TEXTURE_UNITS as u32, 1);
    }
}
