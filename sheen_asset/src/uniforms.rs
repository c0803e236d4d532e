//! Name to slot resolution and CPU-side storage for program uniforms.

use crate::shader::{BindingKind, ProgramLayout, UniformKind};
use nalgebra::{Matrix4, Vector2, Vector3, Vector4};
use std::collections::HashMap;
use tracing::{debug, trace};

/// Stable handle of one uniform value inside a program's [`UniformTable`].
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct UniformSlot(u32);

impl UniformSlot {
    /// Returned for names the program doesn't declare or never reads.
    pub const ABSENT: UniformSlot = UniformSlot(u32::MAX);

    pub const fn is_absent(self) -> bool {
        self.0 == Self::ABSENT.0
    }

    pub const fn index(self) -> Option<usize> {
        if self.is_absent() {
            None
        } else {
            Some(self.0 as usize)
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq)]
pub enum UniformValue {
    F32(f32),
    I32(i32),
    U32(u32),
    Bool(bool),
    Vec2(Vector2<f32>),
    Vec3(Vector3<f32>),
    Vec4(Vector4<f32>),
    /// Stored column-major, as the shader reads it.
    Mat4(Matrix4<f32>),
}

macro_rules! uniform_value_from {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for UniformValue {
                fn from(value: $ty) -> Self {
                    UniformValue::$variant(value)
                }
            }
        )*
    };
}

uniform_value_from! {
    f32 => F32,
    i32 => I32,
    u32 => U32,
    bool => Bool,
    Vector2<f32> => Vec2,
    Vector3<f32> => Vec3,
    Vector4<f32> => Vec4,
    Matrix4<f32> => Mat4,
}

impl UniformValue {
    fn encode(&self, kind: UniformKind, out: &mut [u8]) -> bool {
        let bytes: &[u8] = match (self, kind) {
            (UniformValue::F32(v), UniformKind::F32) => bytemuck::bytes_of(v),
            (UniformValue::I32(v), UniformKind::I32) => bytemuck::bytes_of(v),
            (UniformValue::U32(v), UniformKind::U32) => bytemuck::bytes_of(v),
            (UniformValue::Bool(v), UniformKind::I32 | UniformKind::U32) => {
                out.copy_from_slice(&u32::from(*v).to_ne_bytes());
                return true;
            }
            (UniformValue::Vec2(v), UniformKind::Vec2) => bytemuck::cast_slice(v.as_slice()),
            (UniformValue::Vec3(v), UniformKind::Vec3) => bytemuck::cast_slice(v.as_slice()),
            (UniformValue::Vec4(v), UniformKind::Vec4) => bytemuck::cast_slice(v.as_slice()),
            (UniformValue::Mat4(m), UniformKind::Mat4) => bytemuck::cast_slice(m.as_slice()),
            _ => return false,
        };

        out.copy_from_slice(bytes);
        true
    }

    fn decode(kind: UniformKind, bytes: &[u8]) -> Option<Self> {
        let floats = |n: usize| -> Vec<f32> {
            bytes[..n * 4]
                .chunks_exact(4)
                .map(|c| f32::from_ne_bytes([c[0], c[1], c[2], c[3]]))
                .collect()
        };
        let word = || [bytes[0], bytes[1], bytes[2], bytes[3]];

        Some(match kind {
            UniformKind::F32 => UniformValue::F32(f32::from_ne_bytes(word())),
            UniformKind::I32 => UniformValue::I32(i32::from_ne_bytes(word())),
            UniformKind::U32 => UniformValue::U32(u32::from_ne_bytes(word())),
            UniformKind::Vec2 => UniformValue::Vec2(Vector2::from_column_slice(&floats(2))),
            UniformKind::Vec3 => UniformValue::Vec3(Vector3::from_column_slice(&floats(3))),
            UniformKind::Vec4 => UniformValue::Vec4(Vector4::from_column_slice(&floats(4))),
            UniformKind::Mat4 => UniformValue::Mat4(Matrix4::from_column_slice(&floats(16))),
            UniformKind::Opaque { .. } => return None,
        })
    }
}

/// CPU copy of one `var<uniform>` buffer.
#[derive(Debug, Clone)]
pub struct UniformBlock {
    pub group: u32,
    pub binding: u32,
    pub name: String,
    data: Vec<u8>,
    dirty: bool,
}

impl UniformBlock {
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }
}

#[derive(Debug, Clone)]
struct SlotEntry {
    block: usize,
    offset: usize,
    kind: UniformKind,
}

/// A texture or sampler binding and the texture unit it reads from.
#[derive(Debug, Clone, PartialEq)]
pub struct TextureBinding {
    pub group: u32,
    pub binding: u32,
    pub name: String,
    pub kind: BindingKind,
    pub unit: u32,
}

#[derive(Debug, Clone, Default)]
pub struct UniformTable {
    blocks: Vec<UniformBlock>,
    slots: Vec<SlotEntry>,
    names: HashMap<String, UniformSlot>,
    textures: Vec<TextureBinding>,
}

impl UniformTable {
    /// An empty table, as used by programs that failed to link. Every name resolves to
    /// [`UniformSlot::ABSENT`].
    pub fn empty() -> Self {
        UniformTable::default()
    }

    /// Lays out storage for every uniform block of `layout`.
    ///
    /// Each block member is reachable as `member`, `variable.member` and
    /// `Type.member`. A bare member name shared by two blocks belongs to the
    /// block with the lower group and binding.
    pub fn new(layout: &ProgramLayout) -> Self {
        let mut table = UniformTable::default();

        for binding in &layout.bindings {
            let block_layout = match &binding.kind {
                BindingKind::Uniform(block) => block,
                kind => {
                    table.textures.push(TextureBinding {
                        group: binding.group,
                        binding: binding.binding,
                        name: binding.name.clone(),
                        kind: kind.clone(),
                        unit: 0,
                    });
                    continue;
                }
            };

            let block = table.blocks.len();
            table.blocks.push(UniformBlock {
                group: binding.group,
                binding: binding.binding,
                name: binding.name.clone(),
                data: vec![0; block_layout.size as usize],
                dirty: true,
            });

            for member in &block_layout.members {
                let slot = UniformSlot(table.slots.len() as u32);
                table.slots.push(SlotEntry {
                    block,
                    offset: member.offset as usize,
                    kind: member.kind,
                });

                let mut keys = vec![
                    member.name.clone(),
                    format!("{}.{}", binding.name, member.name),
                ];
                if let Some(type_name) = &block_layout.type_name {
                    keys.push(format!("{type_name}.{}", member.name));
                }

                for key in keys {
                    if let Some(existing) = table.names.get(&key) {
                        if *existing != slot {
                            debug!("Uniform name {key:?} is ambiguous, keeping the first declaration");
                        }
                        continue;
                    }
                    table.names.insert(key, slot);
                }
            }
        }

        table
    }

    /// Looks up a uniform by name. Unknown names give [`UniformSlot::ABSENT`].
    pub fn resolve(&self, name: &str) -> UniformSlot {
        self.names.get(name).copied().unwrap_or(UniformSlot::ABSENT)
    }

    /// Stores `value` in `slot`. Absent slots and values of the wrong type are ignored.
    pub fn write(&mut self, slot: UniformSlot, value: impl Into<UniformValue>) {
        let Some(entry) = slot.index().and_then(|i| self.slots.get(i)) else {
            return;
        };

        let value = value.into();
        let block = &mut self.blocks[entry.block];
        let range = entry.offset..entry.offset + entry.kind.size() as usize;
        let Some(dst) = block.data.get_mut(range) else {
            return;
        };

        if value.encode(entry.kind, dst) {
            block.dirty = true;
        } else {
            trace!("Ignoring {value:?} written to a {:?} uniform", entry.kind);
        }
    }

    pub fn read(&self, slot: UniformSlot) -> Option<UniformValue> {
        let entry = self.slots.get(slot.index()?)?;
        let data = self.blocks[entry.block].data.get(entry.offset..)?;
        UniformValue::decode(entry.kind, data)
    }

    pub fn blocks(&self) -> &[UniformBlock] {
        &self.blocks
    }

    /// Hands every block written since the last flush to `upload` and marks it clean.
    pub fn flush(&mut self, mut upload: impl FnMut(usize, &UniformBlock)) {
        for (i, block) in self.blocks.iter_mut().enumerate() {
            if block.dirty {
                upload(i, block);
                block.dirty = false;
            }
        }
    }

    pub fn block_index(&self, group: u32, binding: u32) -> Option<usize> {
        self.blocks
            .iter()
            .position(|b| b.group == group && b.binding == binding)
    }

    /// Routes the texture binding `name` and its `<name>_sampler` to texture `unit`.
    ///
    /// Returns false when the program doesn't read a texture called `name`.
    pub fn assign_texture_unit(&mut self, name: &str, unit: u32) -> bool {
        let sampler = format!("{name}_sampler");
        let mut found = false;

        for binding in &mut self.textures {
            if (binding.name == name && binding.kind.is_texture())
                || (binding.name == sampler && binding.kind.is_sampler())
            {
                binding.unit = unit;
                found |= binding.kind.is_texture();
            }
        }

        found
    }

    pub fn texture_unit(&self, name: &str) -> Option<u32> {
        self.textures
            .iter()
            .find(|b| b.name == name)
            .map(|b| b.unit)
    }

    pub fn texture_bindings(&self) -> &[TextureBinding] {
        &self.textures
    }
}
