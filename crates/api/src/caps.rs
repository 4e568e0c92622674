/// Optional device capabilities.
///
/// Every backend answers these from its feature level or extension set alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceCaps {
    ComputeShader,
    GeometryShader,
    HullAndDomainShader,
    DualSourceBlend,
    IndependentBlend,
    LogicOp,
    DrawInstanced,
    DrawOrDispatchIndirect,
    FillModeNonSolid,
    MultiViewport,
    PartialPushConstantUpdates,
    PartialPushDescriptorUpdates,
    SamplerCompare,
    SamplerAnisotropic,
    SamplerWithResourceView,
    CopyBufferRegion,
    CopyBufferToTexture,
    Blit,
    ResolveRegion,
    CopyQueryPoolResults,
}

impl DeviceCaps {
    pub const ALL: [Self; 20] = [
        Self::ComputeShader,
        Self::GeometryShader,
        Self::HullAndDomainShader,
        Self::DualSourceBlend,
        Self::IndependentBlend,
        Self::LogicOp,
        Self::DrawInstanced,
        Self::DrawOrDispatchIndirect,
        Self::FillModeNonSolid,
        Self::MultiViewport,
        Self::PartialPushConstantUpdates,
        Self::PartialPushDescriptorUpdates,
        Self::SamplerCompare,
        Self::SamplerAnisotropic,
        Self::SamplerWithResourceView,
        Self::CopyBufferRegion,
        Self::CopyBufferToTexture,
        Self::Blit,
        Self::ResolveRegion,
        Self::CopyQueryPoolResults,
    ];
}
