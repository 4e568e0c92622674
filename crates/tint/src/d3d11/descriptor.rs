//! Descriptor state for Direct3D 11, which binds descriptors straight into context slots.
//!
//! A set remembers the native object of every descriptor. Binding the set rebinds its whole
//! range from the range's first register on.

use tint_api::{
    descriptor::{BufferRange, DescriptorRange, DescriptorType, Descriptors},
    pipeline::ShaderStage,
};
use tracing::debug;

/// Largest constant buffer, `D3D11_REQ_CONSTANT_BUFFER_ELEMENT_COUNT` vectors of 16 bytes.
pub const MAX_CONSTANT_VALUES: usize = 4096 * 4;

/// Stages with their own slot tables, in binding order.
const STAGES: [ShaderStage; 6] = [
    ShaderStage::VERTEX,
    ShaderStage::HULL,
    ShaderStage::DOMAIN,
    ShaderStage::GEOMETRY,
    ShaderStage::PIXEL,
    ShaderStage::COMPUTE,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Slot {
    #[default]
    Empty,
    /// Sampler state or view, by its native pointer.
    Object(u64),
    ConstantBuffer(BufferRange),
}

impl Slot {
    pub const fn raw(&self) -> u64 {
        match self {
            Self::Empty => 0,
            Self::Object(raw) => *raw,
            Self::ConstantBuffer(range) => range.buffer.raw(),
        }
    }
}

/// Slots for `descriptors`. Sampler and view pairs don't exist in Direct3D 11.
pub fn slots(descriptors: &Descriptors<'_>) -> Option<Vec<Slot>> {
    let slots = match descriptors {
        Descriptors::Samplers(samplers) => samplers.iter().map(|s| Slot::Object(s.raw())).collect(),
        Descriptors::ShaderResourceViews(views) | Descriptors::UnorderedAccessViews(views) => {
            views.iter().map(|v| Slot::Object(v.raw())).collect()
        }
        Descriptors::ConstantBuffers(ranges) => ranges.iter().copied().map(Slot::ConstantBuffer).collect(),
        Descriptors::SamplersWithViews(_) => return None,
    };

    Some(slots)
}

#[derive(Debug, Clone, PartialEq)]
pub struct SetData {
    pub range: DescriptorRange,
    pub slots: Vec<Slot>,
}

impl SetData {
    pub fn new(range: DescriptorRange) -> Self {
        Self {
            range,
            slots: vec![Slot::Empty; range.count as usize],
        }
    }

    /// Writes `descriptors` at `binding` and `array_offset`, dropping what doesn't fit.
    ///
    /// Returns `false` without touching the set when the type doesn't match its layout.
    pub fn update(&mut self, binding: u32, array_offset: u32, descriptors: &Descriptors<'_>) -> bool {
        if descriptors.ty() != self.range.ty {
            debug!(
                "{:?} descriptors written to a {:?} range",
                descriptors.ty(),
                self.range.ty
            );
            return false;
        }
        let Some(values) = slots(descriptors) else {
            return false;
        };

        let first = (binding.saturating_sub(self.range.binding) + array_offset) as usize;
        for (slot, value) in self.slots.iter_mut().skip(first).zip(values) {
            *slot = value;
        }
        true
    }
}

/// Individual stages of `visibility` the bind applies to.
pub fn bound_stages(visibility: ShaderStage, stages: ShaderStage) -> impl Iterator<Item = ShaderStage> {
    let visible = visibility & stages;
    STAGES.into_iter().filter(move |stage| visible.contains(*stage))
}

/// First constant and constant count of a buffer range, in 16 byte vectors.
///
/// `ID3D11DeviceContext1` windows start at multiples of 16 vectors and hold a multiple
/// of 16 vectors. `None` when the range needs no window or can't be one.
pub fn constant_window(range: &BufferRange, buffer_size: u64) -> Option<(u32, u32)> {
    let size = if range.size == u64::MAX {
        buffer_size.saturating_sub(range.offset)
    } else {
        range.size
    };
    if range.offset == 0 && size >= buffer_size {
        return None;
    }
    if range.offset % 256 != 0 {
        debug!("constant buffer offset {} is not 256 byte aligned", range.offset);
        return None;
    }

    let first = (range.offset / 16) as u32;
    let count = (size.div_ceil(256) * 16) as u32;
    Some((first, count))
}

/// CPU copy of a push constant range.
///
/// Values are kept in whole 16 byte vectors, the native buffer is rewritten from it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PushConstants {
    values: Vec<u32>,
}

impl PushConstants {
    /// Writes `values` from 32-bit value `first` on, growing the copy as needed.
    ///
    /// Returns `true` if the copy grew, the native buffer then needs to be recreated.
    pub fn write(&mut self, first: u32, values: &[u32]) -> bool {
        let first = first as usize;
        let end = (first + values.len()).min(MAX_CONSTANT_VALUES);
        if end <= first {
            return false;
        }

        let grown = end > self.values.len();
        if grown {
            self.values.resize(end.div_ceil(4) * 4, 0);
        }
        self.values[first..end].copy_from_slice(&values[..end - first]);
        grown
    }

    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.values)
    }

    #[inline]
    pub fn byte_size(&self) -> u32 {
        (self.values.len() * 4) as u32
    }
}

#[cfg(test)]
mod tests {
    use tint_api::{Resource, ResourceView, Sampler};

    use super::*;

    fn range(ty: DescriptorType, count: u32) -> DescriptorRange {
        DescriptorRange {
            binding: 2,
            dx_register_index: 4,
            dx_register_space: 0,
            count,
            visibility: ShaderStage::VERTEX | ShaderStage::PIXEL,
            ty,
        }
    }

    #[test]
    fn update_writes_native_pointers() {
        let mut set = SetData::new(range(DescriptorType::ShaderResourceView, 4));
        let views = [ResourceView::from_raw(0x1000), ResourceView::from_raw(0x2000)];

        assert!(set.update(3, 1, &Descriptors::ShaderResourceViews(&views)));
        assert_eq!(
            set.slots,
            [Slot::Empty, Slot::Empty, Slot::Object(0x1000), Slot::Object(0x2000)]
        );
    }

    #[test]
    fn update_drops_overflow() {
        let mut set = SetData::new(range(DescriptorType::Sampler, 2));
        let samplers = [Sampler::from_raw(1), Sampler::from_raw(2), Sampler::from_raw(3)];

        assert!(set.update(2, 1, &Descriptors::Samplers(&samplers)));
        assert_eq!(set.slots, [Slot::Empty, Slot::Object(1)]);
    }

    #[test]
    fn mismatched_type_is_rejected() {
        let mut set = SetData::new(range(DescriptorType::Sampler, 1));
        let views = [ResourceView::from_raw(0x1000)];

        assert!(!set.update(2, 0, &Descriptors::ShaderResourceViews(&views)));
        assert_eq!(set.slots, [Slot::Empty]);

        let pairs = [(Sampler::from_raw(1), ResourceView::from_raw(2))];
        let mut combined = SetData::new(range(DescriptorType::SamplerWithResourceView, 1));
        assert!(!combined.update(2, 0, &Descriptors::SamplersWithViews(&pairs)));
    }

    #[test]
    fn stages_in_binding_order() {
        let stages: Vec<_> = bound_stages(ShaderStage::ALL, ShaderStage::PIXEL | ShaderStage::VERTEX).collect();
        assert_eq!(stages, [ShaderStage::VERTEX, ShaderStage::PIXEL]);

        assert_eq!(bound_stages(ShaderStage::PIXEL, ShaderStage::COMPUTE).count(), 0);
    }

    #[test]
    fn constant_windows() {
        let buffer = Resource::from_raw(0x4000);
        let whole = BufferRange {
            buffer,
            offset: 0,
            size: u64::MAX,
        };
        assert_eq!(constant_window(&whole, 1024), None);

        let window = BufferRange {
            buffer,
            offset: 512,
            size: 100,
        };
        assert_eq!(constant_window(&window, 1024), Some((32, 16)));

        let unaligned = BufferRange { offset: 64, ..window };
        assert_eq!(constant_window(&unaligned, 1024), None);
    }

    #[test]
    fn push_constants_grow_in_vectors() {
        let mut constants = PushConstants::default();
        assert!(constants.write(0, &[1, 2]));
        assert_eq!(constants.byte_size(), 16);

        assert!(!constants.write(2, &[3]));
        assert!(constants.write(5, &[6]));
        assert_eq!(constants.byte_size(), 32);
        assert_eq!(&constants.as_bytes()[..12], bytemuck::cast_slice::<u32, u8>(&[1, 2, 3]));
    }

    #[test]
    fn push_constants_are_capped() {
        let mut constants = PushConstants::default();
        assert!(!constants.write(MAX_CONSTANT_VALUES as u32, &[1]));
        assert!(constants.write(MAX_CONSTANT_VALUES as u32 - 1, &[1, 2]));
        assert_eq!(constants.byte_size() as usize, MAX_CONSTANT_VALUES * 4);
    }
}
