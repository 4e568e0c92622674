//! Descriptor ranges, pipeline layouts and descriptor updates.

use crate::{DescriptorSet, Resource, ResourceView, Sampler, pipeline::ShaderStage};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum DescriptorType {
    Sampler = 0,
    SamplerWithResourceView = 1,
    ShaderResourceView = 2,
    UnorderedAccessView = 3,
    ConstantBuffer = 6,
}

/// Contiguous run of descriptors of one type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DescriptorRange {
    pub binding: u32,
    /// Flat D3D shader register of the first descriptor.
    pub dx_register_index: u32,
    pub dx_register_space: u32,
    pub count: u32,
    pub visibility: ShaderStage,
    pub ty: DescriptorType,
}

/// Push constants, counted in 32-bit values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConstantRange {
    pub offset: u32,
    pub dx_register_index: u32,
    pub dx_register_space: u32,
    pub count: u32,
    pub visibility: ShaderStage,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PipelineLayoutParam {
    PushConstants(ConstantRange),
    PushDescriptors(DescriptorRange),
    DescriptorTable(Vec<DescriptorRange>),
}

impl PipelineLayoutParam {
    /// `true` if every range of the parameter has the same descriptor type.
    pub fn is_single_type(&self) -> bool {
        match self {
            Self::PushConstants(_) | Self::PushDescriptors(_) => true,
            Self::DescriptorTable(ranges) => ranges.windows(2).all(|w| w[0].ty == w[1].ty),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct BufferRange {
    pub buffer: Resource,
    pub offset: u64,
    /// `u64::MAX` for the rest of the buffer.
    pub size: u64,
}

/// Typed descriptor payload of an update or push.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Descriptors<'a> {
    Samplers(&'a [Sampler]),
    SamplersWithViews(&'a [(Sampler, ResourceView)]),
    ShaderResourceViews(&'a [ResourceView]),
    UnorderedAccessViews(&'a [ResourceView]),
    ConstantBuffers(&'a [BufferRange]),
}

impl Descriptors<'_> {
    pub const fn ty(&self) -> DescriptorType {
        match self {
            Self::Samplers(_) => DescriptorType::Sampler,
            Self::SamplersWithViews(_) => DescriptorType::SamplerWithResourceView,
            Self::ShaderResourceViews(_) => DescriptorType::ShaderResourceView,
            Self::UnorderedAccessViews(_) => DescriptorType::UnorderedAccessView,
            Self::ConstantBuffers(_) => DescriptorType::ConstantBuffer,
        }
    }

    pub const fn len(&self) -> usize {
        match self {
            Self::Samplers(d) => d.len(),
            Self::SamplersWithViews(d) => d.len(),
            Self::ShaderResourceViews(d) | Self::UnorderedAccessViews(d) => d.len(),
            Self::ConstantBuffers(d) => d.len(),
        }
    }

    pub const fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DescriptorSetUpdate<'a> {
    pub set: DescriptorSet,
    pub binding: u32,
    pub array_offset: u32,
    pub descriptors: Descriptors<'a>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn range(ty: DescriptorType) -> DescriptorRange {
        DescriptorRange {
            binding: 0,
            dx_register_index: 0,
            dx_register_space: 0,
            count: 1,
            visibility: ShaderStage::PIXEL,
            ty,
        }
    }

    #[test]
    fn single_type_tables() {
        let same = PipelineLayoutParam::DescriptorTable(vec![
            range(DescriptorType::ShaderResourceView),
            range(DescriptorType::ShaderResourceView),
        ]);
        assert!(same.is_single_type());

        let mixed = PipelineLayoutParam::DescriptorTable(vec![
            range(DescriptorType::ShaderResourceView),
            range(DescriptorType::Sampler),
        ]);
        assert!(!mixed.is_single_type());
    }
}
