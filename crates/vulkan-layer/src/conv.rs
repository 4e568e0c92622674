//! Conversions between the unified model and Vulkan structures.

use ash::vk;
use tint_api::{
    Error, Format,
    descriptor::DescriptorType,
    pipeline::{
        BlendDesc, BlendFactor, BlendOp, CullMode, DepthStencilDesc, FillMode, LoadOp, LogicOp,
        PipelineState, PrimitiveTopology, QueryType, RasterizerDesc, ShaderStage, StencilFace,
        StencilOp, StoreOp,
    },
    resource::{
        MemoryHeap, ResourceDesc, ResourceDimension, ResourceFlags, ResourceUsage,
        ResourceViewDesc, ResourceViewType, ViewRange,
    },
    sampler::{CompareOp, FilterMode, SamplerDesc, TextureAddressMode},
};

pub fn map_format(format: Format) -> vk::Format {
    use Format as F;

    match format {
        F::Unknown => vk::Format::UNDEFINED,
        F::R1Unorm | F::R10G10B10XrBiasA2Unorm => vk::Format::UNDEFINED,
        F::L8Unorm | F::A8Unorm | F::R8Typeless | F::R8Unorm => vk::Format::R8_UNORM,
        F::R8Uint => vk::Format::R8_UINT,
        F::R8Sint => vk::Format::R8_SINT,
        F::R8Snorm => vk::Format::R8_SNORM,
        F::L8A8Unorm | F::R8G8Typeless | F::R8G8Unorm => vk::Format::R8G8_UNORM,
        F::R8G8Uint => vk::Format::R8G8_UINT,
        F::R8G8Sint => vk::Format::R8G8_SINT,
        F::R8G8Snorm => vk::Format::R8G8_SNORM,
        F::R8G8B8A8Typeless | F::R8G8B8A8Unorm => vk::Format::R8G8B8A8_UNORM,
        F::R8G8B8A8UnormSrgb => vk::Format::R8G8B8A8_SRGB,
        F::R8G8B8A8Uint => vk::Format::R8G8B8A8_UINT,
        F::R8G8B8A8Sint => vk::Format::R8G8B8A8_SINT,
        F::R8G8B8A8Snorm => vk::Format::R8G8B8A8_SNORM,
        F::B8G8R8A8Typeless | F::B8G8R8A8Unorm | F::B8G8R8X8Typeless | F::B8G8R8X8Unorm => {
            vk::Format::B8G8R8A8_UNORM
        }
        F::B8G8R8A8UnormSrgb | F::B8G8R8X8UnormSrgb => vk::Format::B8G8R8A8_SRGB,
        F::R10G10B10A2Typeless | F::R10G10B10A2Unorm => vk::Format::A2B10G10R10_UNORM_PACK32,
        F::R10G10B10A2Uint => vk::Format::A2B10G10R10_UINT_PACK32,
        F::L16Unorm | F::R16Typeless | F::R16Unorm => vk::Format::R16_UNORM,
        F::R16Float => vk::Format::R16_SFLOAT,
        F::R16Uint => vk::Format::R16_UINT,
        F::R16Sint => vk::Format::R16_SINT,
        F::R16Snorm => vk::Format::R16_SNORM,
        F::R16G16Typeless | F::R16G16Float => vk::Format::R16G16_SFLOAT,
        F::R16G16Unorm => vk::Format::R16G16_UNORM,
        F::R16G16Uint => vk::Format::R16G16_UINT,
        F::R16G16Sint => vk::Format::R16G16_SINT,
        F::R16G16Snorm => vk::Format::R16G16_SNORM,
        F::R16G16B16A16Typeless | F::R16G16B16A16Float => vk::Format::R16G16B16A16_SFLOAT,
        F::R16G16B16A16Unorm => vk::Format::R16G16B16A16_UNORM,
        F::R16G16B16A16Uint => vk::Format::R16G16B16A16_UINT,
        F::R16G16B16A16Sint => vk::Format::R16G16B16A16_SINT,
        F::R16G16B16A16Snorm => vk::Format::R16G16B16A16_SNORM,
        F::R32Typeless | F::R32Float => vk::Format::R32_SFLOAT,
        F::R32Uint => vk::Format::R32_UINT,
        F::R32Sint => vk::Format::R32_SINT,
        F::R32G32Typeless | F::R32G32Float => vk::Format::R32G32_SFLOAT,
        F::R32G32Uint => vk::Format::R32G32_UINT,
        F::R32G32Sint => vk::Format::R32G32_SINT,
        F::R32G32B32Typeless | F::R32G32B32Float => vk::Format::R32G32B32_SFLOAT,
        F::R32G32B32Uint => vk::Format::R32G32B32_UINT,
        F::R32G32B32Sint => vk::Format::R32G32B32_SINT,
        F::R32G32B32A32Typeless | F::R32G32B32A32Float => vk::Format::R32G32B32A32_SFLOAT,
        F::R32G32B32A32Uint => vk::Format::R32G32B32A32_UINT,
        F::R32G32B32A32Sint => vk::Format::R32G32B32A32_SINT,
        F::R9G9B9E5 => vk::Format::E5B9G9R9_UFLOAT_PACK32,
        F::R11G11B10Float => vk::Format::B10G11R11_UFLOAT_PACK32,
        F::B5G6R5Unorm => vk::Format::R5G6B5_UNORM_PACK16,
        F::B5G5R5A1Unorm => vk::Format::A1R5G5B5_UNORM_PACK16,
        F::B4G4R4A4Unorm => vk::Format::A4R4G4B4_UNORM_PACK16,
        F::R8G8B8G8Unorm => vk::Format::B8G8R8G8_422_UNORM,
        F::G8R8G8B8Unorm => vk::Format::G8B8G8R8_422_UNORM,
        F::D16Unorm => vk::Format::D16_UNORM,
        F::R24G8Typeless | F::D24UnormS8Uint | F::R24UnormX8Uint | F::X24UnormG8Uint | F::Intz => {
            vk::Format::D24_UNORM_S8_UINT
        }
        F::D32Float => vk::Format::D32_SFLOAT,
        F::R32G8Typeless | F::D32FloatS8Uint | F::R32FloatX8Uint | F::X32FloatG8Uint => {
            vk::Format::D32_SFLOAT_S8_UINT
        }
        F::Bc1Typeless | F::Bc1Unorm => vk::Format::BC1_RGBA_UNORM_BLOCK,
        F::Bc1UnormSrgb => vk::Format::BC1_RGBA_SRGB_BLOCK,
        F::Bc2Typeless | F::Bc2Unorm => vk::Format::BC2_UNORM_BLOCK,
        F::Bc2UnormSrgb => vk::Format::BC2_SRGB_BLOCK,
        F::Bc3Typeless | F::Bc3Unorm => vk::Format::BC3_UNORM_BLOCK,
        F::Bc3UnormSrgb => vk::Format::BC3_SRGB_BLOCK,
        F::Bc4Typeless | F::Bc4Unorm => vk::Format::BC4_UNORM_BLOCK,
        F::Bc4Snorm => vk::Format::BC4_SNORM_BLOCK,
        F::Bc5Typeless | F::Bc5Unorm => vk::Format::BC5_UNORM_BLOCK,
        F::Bc5Snorm => vk::Format::BC5_SNORM_BLOCK,
        F::Bc6hTypeless | F::Bc6hUf16 => vk::Format::BC6H_UFLOAT_BLOCK,
        F::Bc6hSf16 => vk::Format::BC6H_SFLOAT_BLOCK,
        F::Bc7Typeless | F::Bc7Unorm => vk::Format::BC7_UNORM_BLOCK,
        F::Bc7UnormSrgb => vk::Format::BC7_SRGB_BLOCK,
    }
}

/// Returns [`Format::Unknown`] for formats without a unified counterpart.
pub fn unmap_format(format: vk::Format) -> Format {
    use Format as F;

    match format {
        vk::Format::R8_UNORM => F::R8Unorm,
        vk::Format::R8_UINT => F::R8Uint,
        vk::Format::R8_SINT => F::R8Sint,
        vk::Format::R8_SNORM => F::R8Snorm,
        vk::Format::R8G8_UNORM => F::R8G8Unorm,
        vk::Format::R8G8_UINT => F::R8G8Uint,
        vk::Format::R8G8_SINT => F::R8G8Sint,
        vk::Format::R8G8_SNORM => F::R8G8Snorm,
        vk::Format::R8G8B8A8_UNORM => F::R8G8B8A8Unorm,
        vk::Format::R8G8B8A8_SRGB => F::R8G8B8A8UnormSrgb,
        vk::Format::R8G8B8A8_UINT => F::R8G8B8A8Uint,
        vk::Format::R8G8B8A8_SINT => F::R8G8B8A8Sint,
        vk::Format::R8G8B8A8_SNORM => F::R8G8B8A8Snorm,
        vk::Format::B8G8R8A8_UNORM => F::B8G8R8A8Unorm,
        vk::Format::B8G8R8A8_SRGB => F::B8G8R8A8UnormSrgb,
        vk::Format::A2B10G10R10_UNORM_PACK32 => F::R10G10B10A2Unorm,
        vk::Format::A2B10G10R10_UINT_PACK32 => F::R10G10B10A2Uint,
        vk::Format::R16_UNORM => F::R16Unorm,
        vk::Format::R16_SFLOAT => F::R16Float,
        vk::Format::R16_UINT => F::R16Uint,
        vk::Format::R16_SINT => F::R16Sint,
        vk::Format::R16_SNORM => F::R16Snorm,
        vk::Format::R16G16_SFLOAT => F::R16G16Float,
        vk::Format::R16G16_UNORM => F::R16G16Unorm,
        vk::Format::R16G16_UINT => F::R16G16Uint,
        vk::Format::R16G16_SINT => F::R16G16Sint,
        vk::Format::R16G16_SNORM => F::R16G16Snorm,
        vk::Format::R16G16B16A16_SFLOAT => F::R16G16B16A16Float,
        vk::Format::R16G16B16A16_UNORM => F::R16G16B16A16Unorm,
        vk::Format::R16G16B16A16_UINT => F::R16G16B16A16Uint,
        vk::Format::R16G16B16A16_SINT => F::R16G16B16A16Sint,
        vk::Format::R16G16B16A16_SNORM => F::R16G16B16A16Snorm,
        vk::Format::R32_SFLOAT => F::R32Float,
        vk::Format::R32_UINT => F::R32Uint,
        vk::Format::R32_SINT => F::R32Sint,
        vk::Format::R32G32_SFLOAT => F::R32G32Float,
        vk::Format::R32G32_UINT => F::R32G32Uint,
        vk::Format::R32G32_SINT => F::R32G32Sint,
        vk::Format::R32G32B32_SFLOAT => F::R32G32B32Float,
        vk::Format::R32G32B32_UINT => F::R32G32B32Uint,
        vk::Format::R32G32B32_SINT => F::R32G32B32Sint,
        vk::Format::R32G32B32A32_SFLOAT => F::R32G32B32A32Float,
        vk::Format::R32G32B32A32_UINT => F::R32G32B32A32Uint,
        vk::Format::R32G32B32A32_SINT => F::R32G32B32A32Sint,
        vk::Format::E5B9G9R9_UFLOAT_PACK32 => F::R9G9B9E5,
        vk::Format::B10G11R11_UFLOAT_PACK32 => F::R11G11B10Float,
        vk::Format::R5G6B5_UNORM_PACK16 => F::B5G6R5Unorm,
        vk::Format::A1R5G5B5_UNORM_PACK16 => F::B5G5R5A1Unorm,
        vk::Format::A4R4G4B4_UNORM_PACK16 => F::B4G4R4A4Unorm,
        vk::Format::B8G8R8G8_422_UNORM => F::R8G8B8G8Unorm,
        vk::Format::G8B8G8R8_422_UNORM => F::G8R8G8B8Unorm,
        vk::Format::D16_UNORM => F::D16Unorm,
        vk::Format::D24_UNORM_S8_UINT => F::D24UnormS8Uint,
        vk::Format::D32_SFLOAT => F::D32Float,
        vk::Format::D32_SFLOAT_S8_UINT => F::D32FloatS8Uint,
        vk::Format::BC1_RGB_UNORM_BLOCK | vk::Format::BC1_RGBA_UNORM_BLOCK => F::Bc1Unorm,
        vk::Format::BC1_RGB_SRGB_BLOCK | vk::Format::BC1_RGBA_SRGB_BLOCK => F::Bc1UnormSrgb,
        vk::Format::BC2_UNORM_BLOCK => F::Bc2Unorm,
        vk::Format::BC2_SRGB_BLOCK => F::Bc2UnormSrgb,
        vk::Format::BC3_UNORM_BLOCK => F::Bc3Unorm,
        vk::Format::BC3_SRGB_BLOCK => F::Bc3UnormSrgb,
        vk::Format::BC4_UNORM_BLOCK => F::Bc4Unorm,
        vk::Format::BC4_SNORM_BLOCK => F::Bc4Snorm,
        vk::Format::BC5_UNORM_BLOCK => F::Bc5Unorm,
        vk::Format::BC5_SNORM_BLOCK => F::Bc5Snorm,
        vk::Format::BC6H_UFLOAT_BLOCK => F::Bc6hUf16,
        vk::Format::BC6H_SFLOAT_BLOCK => F::Bc6hSf16,
        vk::Format::BC7_UNORM_BLOCK => F::Bc7Unorm,
        vk::Format::BC7_SRGB_BLOCK => F::Bc7UnormSrgb,
        _ => F::Unknown,
    }
}

pub fn aspect_mask(format: vk::Format) -> vk::ImageAspectFlags {
    match format {
        vk::Format::D16_UNORM | vk::Format::X8_D24_UNORM_PACK32 | vk::Format::D32_SFLOAT => {
            vk::ImageAspectFlags::DEPTH
        }
        vk::Format::S8_UINT => vk::ImageAspectFlags::STENCIL,
        vk::Format::D16_UNORM_S8_UINT
        | vk::Format::D24_UNORM_S8_UINT
        | vk::Format::D32_SFLOAT_S8_UINT => {
            vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL
        }
        _ => vk::ImageAspectFlags::COLOR,
    }
}

pub fn map_access(state: ResourceUsage) -> vk::AccessFlags {
    let mut access = vk::AccessFlags::empty();
    if state == ResourceUsage::PRESENT {
        return access;
    }
    if state.contains(ResourceUsage::CPU_ACCESS) {
        access |= vk::AccessFlags::HOST_READ | vk::AccessFlags::HOST_WRITE;
    }
    if state.contains(ResourceUsage::DEPTH_STENCIL_READ) {
        access |= vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_READ;
    }
    if state.contains(ResourceUsage::DEPTH_STENCIL_WRITE) {
        access |= vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE;
    }
    if state.contains(ResourceUsage::RENDER_TARGET) {
        access |= vk::AccessFlags::COLOR_ATTACHMENT_READ | vk::AccessFlags::COLOR_ATTACHMENT_WRITE;
    }
    if state.intersects(ResourceUsage::SHADER_RESOURCE) {
        access |= vk::AccessFlags::SHADER_READ;
    }
    if state.contains(ResourceUsage::UNORDERED_ACCESS) {
        access |= vk::AccessFlags::SHADER_READ | vk::AccessFlags::SHADER_WRITE;
    }
    if state.intersects(ResourceUsage::COPY_DEST | ResourceUsage::RESOLVE_DEST) {
        access |= vk::AccessFlags::TRANSFER_WRITE;
    }
    if state.intersects(ResourceUsage::COPY_SOURCE | ResourceUsage::RESOLVE_SOURCE) {
        access |= vk::AccessFlags::TRANSFER_READ;
    }
    if state.contains(ResourceUsage::INDEX_BUFFER) {
        access |= vk::AccessFlags::INDEX_READ;
    }
    if state.contains(ResourceUsage::VERTEX_BUFFER) {
        access |= vk::AccessFlags::VERTEX_ATTRIBUTE_READ;
    }
    if state.contains(ResourceUsage::CONSTANT_BUFFER) {
        access |= vk::AccessFlags::UNIFORM_READ;
    }
    if state.contains(ResourceUsage::INDIRECT_ARGUMENT) {
        access |= vk::AccessFlags::INDIRECT_COMMAND_READ;
    }

    access
}

pub fn map_image_layout(state: ResourceUsage) -> vk::ImageLayout {
    if state.is_empty() {
        return vk::ImageLayout::UNDEFINED;
    }
    if state == ResourceUsage::DEPTH_STENCIL || state == ResourceUsage::DEPTH_STENCIL_WRITE {
        return vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL;
    }
    if state == ResourceUsage::DEPTH_STENCIL_READ {
        return vk::ImageLayout::DEPTH_STENCIL_READ_ONLY_OPTIMAL;
    }
    if state == ResourceUsage::RENDER_TARGET {
        return vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL;
    }
    if !state.is_empty() && ResourceUsage::SHADER_RESOURCE.contains(state) {
        return vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL;
    }
    if state == ResourceUsage::COPY_DEST || state == ResourceUsage::RESOLVE_DEST {
        return vk::ImageLayout::TRANSFER_DST_OPTIMAL;
    }
    if state == ResourceUsage::COPY_SOURCE || state == ResourceUsage::RESOLVE_SOURCE {
        return vk::ImageLayout::TRANSFER_SRC_OPTIMAL;
    }
    if state == ResourceUsage::PRESENT {
        return vk::ImageLayout::PRESENT_SRC_KHR;
    }

    vk::ImageLayout::GENERAL
}

pub fn map_pipeline_stage(
    state: ResourceUsage,
    src_stage: bool,
    features: &vk::PhysicalDeviceFeatures,
) -> vk::PipelineStageFlags {
    if state == ResourceUsage::GENERAL {
        return vk::PipelineStageFlags::ALL_COMMANDS;
    }
    if state.is_empty() || state == ResourceUsage::PRESENT {
        return if src_stage {
            vk::PipelineStageFlags::TOP_OF_PIPE
        } else {
            vk::PipelineStageFlags::BOTTOM_OF_PIPE
        };
    }

    let mut stages = vk::PipelineStageFlags::empty();
    if state.contains(ResourceUsage::CPU_ACCESS) {
        stages |= vk::PipelineStageFlags::HOST;
    }
    if state.contains(ResourceUsage::DEPTH_STENCIL_READ) {
        stages |= vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS;
    }
    if state.contains(ResourceUsage::DEPTH_STENCIL_WRITE) {
        stages |= vk::PipelineStageFlags::LATE_FRAGMENT_TESTS;
    }
    if state.contains(ResourceUsage::RENDER_TARGET) {
        stages |= vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT;
    }
    if state.intersects(ResourceUsage::SHADER_RESOURCE_PIXEL | ResourceUsage::CONSTANT_BUFFER) {
        stages |= vk::PipelineStageFlags::FRAGMENT_SHADER;
    }
    if state.intersects(ResourceUsage::SHADER_RESOURCE_NON_PIXEL | ResourceUsage::CONSTANT_BUFFER) {
        stages |= vk::PipelineStageFlags::VERTEX_SHADER | vk::PipelineStageFlags::COMPUTE_SHADER;
        if features.tessellation_shader != vk::FALSE {
            stages |= vk::PipelineStageFlags::TESSELLATION_CONTROL_SHADER
                | vk::PipelineStageFlags::TESSELLATION_EVALUATION_SHADER;
        }
        if features.geometry_shader != vk::FALSE {
            stages |= vk::PipelineStageFlags::GEOMETRY_SHADER;
        }
    }
    if state.contains(ResourceUsage::UNORDERED_ACCESS) {
        stages |= vk::PipelineStageFlags::COMPUTE_SHADER;
    }
    if state.intersects(
        ResourceUsage::COPY_DEST
            | ResourceUsage::COPY_SOURCE
            | ResourceUsage::RESOLVE_DEST
            | ResourceUsage::RESOLVE_SOURCE,
    ) {
        stages |= vk::PipelineStageFlags::TRANSFER;
    }
    if state.intersects(ResourceUsage::INDEX_BUFFER | ResourceUsage::VERTEX_BUFFER) {
        stages |= vk::PipelineStageFlags::VERTEX_INPUT;
    }
    if state.contains(ResourceUsage::INDIRECT_ARGUMENT) {
        stages |= vk::PipelineStageFlags::DRAW_INDIRECT;
    }

    stages
}

pub fn map_image_usage(usage: ResourceUsage) -> vk::ImageUsageFlags {
    let mut flags = vk::ImageUsageFlags::empty();
    if usage.intersects(ResourceUsage::COPY_DEST | ResourceUsage::RESOLVE_DEST) {
        flags |= vk::ImageUsageFlags::TRANSFER_DST;
    }
    if usage.intersects(ResourceUsage::COPY_SOURCE | ResourceUsage::RESOLVE_SOURCE) {
        flags |= vk::ImageUsageFlags::TRANSFER_SRC;
    }
    // Clears go through vkCmdClear*Image
    if usage.intersects(ResourceUsage::DEPTH_STENCIL) {
        flags |= vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT | vk::ImageUsageFlags::TRANSFER_DST;
    }
    if usage.contains(ResourceUsage::RENDER_TARGET) {
        flags |= vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::TRANSFER_DST;
    }
    if usage.intersects(ResourceUsage::SHADER_RESOURCE) {
        flags |= vk::ImageUsageFlags::SAMPLED;
    }
    if usage.contains(ResourceUsage::UNORDERED_ACCESS) {
        flags |= vk::ImageUsageFlags::STORAGE;
    }

    flags
}

pub fn unmap_image_usage(flags: vk::ImageUsageFlags) -> ResourceUsage {
    let mut usage = ResourceUsage::empty();
    if flags.contains(vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT) {
        usage |= ResourceUsage::DEPTH_STENCIL;
    }
    if flags.contains(vk::ImageUsageFlags::COLOR_ATTACHMENT) {
        usage |= ResourceUsage::RENDER_TARGET;
    }
    if flags.contains(vk::ImageUsageFlags::SAMPLED) {
        usage |= ResourceUsage::SHADER_RESOURCE;
    }
    if flags.contains(vk::ImageUsageFlags::STORAGE) {
        usage |= ResourceUsage::UNORDERED_ACCESS;
    }
    if flags.contains(vk::ImageUsageFlags::TRANSFER_DST) {
        usage |= ResourceUsage::COPY_DEST;
    }
    if flags.contains(vk::ImageUsageFlags::TRANSFER_SRC) {
        usage |= ResourceUsage::COPY_SOURCE;
    }

    usage
}

pub fn map_buffer_usage(usage: ResourceUsage) -> vk::BufferUsageFlags {
    let mut flags = vk::BufferUsageFlags::empty();
    if usage.contains(ResourceUsage::INDEX_BUFFER) {
        flags |= vk::BufferUsageFlags::INDEX_BUFFER;
    }
    if usage.contains(ResourceUsage::VERTEX_BUFFER) {
        flags |= vk::BufferUsageFlags::VERTEX_BUFFER;
    }
    if usage.contains(ResourceUsage::CONSTANT_BUFFER) {
        flags |= vk::BufferUsageFlags::UNIFORM_BUFFER;
    }
    if usage.contains(ResourceUsage::INDIRECT_ARGUMENT) {
        flags |= vk::BufferUsageFlags::INDIRECT_BUFFER;
    }
    if usage.intersects(ResourceUsage::SHADER_RESOURCE) {
        flags |= vk::BufferUsageFlags::UNIFORM_TEXEL_BUFFER;
    }
    if usage.contains(ResourceUsage::UNORDERED_ACCESS) {
        flags |= vk::BufferUsageFlags::STORAGE_BUFFER;
    }
    if usage.contains(ResourceUsage::COPY_DEST) {
        flags |= vk::BufferUsageFlags::TRANSFER_DST;
    }
    if usage.contains(ResourceUsage::COPY_SOURCE) {
        flags |= vk::BufferUsageFlags::TRANSFER_SRC;
    }

    flags
}

pub fn unmap_buffer_usage(flags: vk::BufferUsageFlags) -> ResourceUsage {
    let mut usage = ResourceUsage::empty();
    if flags.contains(vk::BufferUsageFlags::INDEX_BUFFER) {
        usage |= ResourceUsage::INDEX_BUFFER;
    }
    if flags.contains(vk::BufferUsageFlags::VERTEX_BUFFER) {
        usage |= ResourceUsage::VERTEX_BUFFER;
    }
    if flags.contains(vk::BufferUsageFlags::UNIFORM_BUFFER) {
        usage |= ResourceUsage::CONSTANT_BUFFER;
    }
    if flags.contains(vk::BufferUsageFlags::INDIRECT_BUFFER) {
        usage |= ResourceUsage::INDIRECT_ARGUMENT;
    }
    if flags.intersects(
        vk::BufferUsageFlags::UNIFORM_TEXEL_BUFFER | vk::BufferUsageFlags::STORAGE_TEXEL_BUFFER,
    ) {
        usage |= ResourceUsage::SHADER_RESOURCE;
    }
    if flags.contains(vk::BufferUsageFlags::STORAGE_BUFFER) {
        usage |= ResourceUsage::UNORDERED_ACCESS;
    }
    if flags.contains(vk::BufferUsageFlags::TRANSFER_DST) {
        usage |= ResourceUsage::COPY_DEST;
    }
    if flags.contains(vk::BufferUsageFlags::TRANSFER_SRC) {
        usage |= ResourceUsage::COPY_SOURCE;
    }

    usage
}

/// Memory property flags as `(required, preferred)`.
pub fn map_memory_heap(heap: MemoryHeap) -> (vk::MemoryPropertyFlags, vk::MemoryPropertyFlags) {
    match heap {
        MemoryHeap::Unknown | MemoryHeap::GpuOnly => (
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
            vk::MemoryPropertyFlags::empty(),
        ),
        MemoryHeap::CpuToGpu => (
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
        ),
        MemoryHeap::GpuToCpu => (
            vk::MemoryPropertyFlags::HOST_VISIBLE,
            vk::MemoryPropertyFlags::HOST_CACHED | vk::MemoryPropertyFlags::HOST_COHERENT,
        ),
        MemoryHeap::CpuOnly => (
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
            vk::MemoryPropertyFlags::empty(),
        ),
    }
}

/// Picks a memory type allowed by `type_bits`, honoring the preferred flags when possible.
pub fn find_memory_type(
    props: &vk::PhysicalDeviceMemoryProperties,
    type_bits: u32,
    heap: MemoryHeap,
) -> Option<u32> {
    let (required, preferred) = map_memory_heap(heap);
    let types = &props.memory_types[..props.memory_type_count as usize];
    let candidate = |flags: vk::MemoryPropertyFlags| {
        types.iter().enumerate().position(|(index, ty)| {
            type_bits & (1 << index) != 0 && ty.property_flags.contains(flags)
        })
    };

    candidate(required | preferred)
        .or_else(|| candidate(required))
        .map(|index| index as u32)
}

pub fn map_image_info(desc: &ResourceDesc, info: &mut vk::ImageCreateInfo<'_>) {
    match desc.dimension {
        ResourceDimension::Buffer { .. } => {}
        ResourceDimension::Texture1d {
            width,
            layers,
            levels,
        } => {
            info.image_type = vk::ImageType::TYPE_1D;
            info.extent = vk::Extent3D {
                width,
                height: 1,
                depth: 1,
            };
            info.array_layers = layers as u32;
            info.mip_levels = levels as u32;
            info.samples = vk::SampleCountFlags::TYPE_1;
        }
        ResourceDimension::Texture2d {
            width,
            height,
            layers,
            levels,
            samples,
        } => {
            info.image_type = vk::ImageType::TYPE_2D;
            info.extent = vk::Extent3D {
                width,
                height,
                depth: 1,
            };
            info.array_layers = layers as u32;
            info.mip_levels = levels as u32;
            info.samples = vk::SampleCountFlags::from_raw(samples.max(1) as u32);
        }
        ResourceDimension::Texture3d {
            width,
            height,
            depth,
            levels,
        } => {
            info.image_type = vk::ImageType::TYPE_3D;
            info.extent = vk::Extent3D {
                width,
                height,
                depth: depth as u32,
            };
            info.array_layers = 1;
            info.mip_levels = levels as u32;
            info.samples = vk::SampleCountFlags::TYPE_1;
        }
    }

    let format = map_format(desc.format);
    if format != vk::Format::UNDEFINED {
        info.format = format;
    }

    info.usage |= map_image_usage(desc.usage);
    if desc.flags.contains(ResourceFlags::CUBE_COMPATIBLE) {
        info.flags |= vk::ImageCreateFlags::CUBE_COMPATIBLE;
    } else {
        info.flags &= !vk::ImageCreateFlags::CUBE_COMPATIBLE;
    }
    // Mipmap generation blits between levels
    if desc.flags.contains(ResourceFlags::GENERATE_MIPMAPS) {
        info.usage |= vk::ImageUsageFlags::TRANSFER_SRC | vk::ImageUsageFlags::TRANSFER_DST;
    }
}

pub fn map_buffer_info(desc: &ResourceDesc, info: &mut vk::BufferCreateInfo<'_>) {
    if let ResourceDimension::Buffer { size, .. } = desc.dimension {
        info.size = size;
    }
    info.usage |= map_buffer_usage(desc.usage);
}

pub fn unmap_image_info(info: &vk::ImageCreateInfo<'_>) -> ResourceDesc {
    let levels = info.mip_levels.min(u16::MAX as u32) as u16;
    let samples = info.samples.as_raw().max(1) as u16;
    let dimension = match info.image_type {
        vk::ImageType::TYPE_1D => ResourceDimension::Texture1d {
            width: info.extent.width,
            layers: info.array_layers.min(u16::MAX as u32) as u16,
            levels,
        },
        vk::ImageType::TYPE_3D => ResourceDimension::Texture3d {
            width: info.extent.width,
            height: info.extent.height,
            depth: info.extent.depth.min(u16::MAX as u32) as u16,
            levels,
        },
        _ => ResourceDimension::Texture2d {
            width: info.extent.width,
            height: info.extent.height,
            layers: info.array_layers.min(u16::MAX as u32) as u16,
            levels,
            samples,
        },
    };

    let mut usage = unmap_image_usage(info.usage);
    if matches!(dimension, ResourceDimension::Texture2d { .. }) {
        if samples > 1 && info.usage.contains(vk::ImageUsageFlags::TRANSFER_SRC) {
            usage |= ResourceUsage::RESOLVE_SOURCE;
        } else if samples == 1 && info.usage.contains(vk::ImageUsageFlags::TRANSFER_DST) {
            usage |= ResourceUsage::RESOLVE_DEST;
        }
    }

    let mut flags = ResourceFlags::empty();
    if info.flags.contains(vk::ImageCreateFlags::CUBE_COMPATIBLE) {
        flags |= ResourceFlags::CUBE_COMPATIBLE;
    }
    let transfer = vk::ImageUsageFlags::TRANSFER_SRC | vk::ImageUsageFlags::TRANSFER_DST;
    if info.mip_levels > 1 && info.usage.contains(transfer) {
        flags |= ResourceFlags::GENERATE_MIPMAPS;
    }

    ResourceDesc {
        dimension,
        format: unmap_format(info.format),
        heap: MemoryHeap::GpuOnly,
        usage,
        flags,
    }
}

pub fn unmap_buffer_info(info: &vk::BufferCreateInfo<'_>) -> ResourceDesc {
    ResourceDesc {
        dimension: ResourceDimension::Buffer {
            size: info.size,
            stride: 0,
        },
        format: Format::Unknown,
        heap: MemoryHeap::GpuOnly,
        usage: unmap_buffer_usage(info.usage),
        flags: ResourceFlags::empty(),
    }
}

pub fn map_view_type(ty: ResourceViewType) -> Option<vk::ImageViewType> {
    Some(match ty {
        ResourceViewType::Texture1d => vk::ImageViewType::TYPE_1D,
        ResourceViewType::Texture1dArray => vk::ImageViewType::TYPE_1D_ARRAY,
        ResourceViewType::Texture2d | ResourceViewType::Texture2dMultisample => {
            vk::ImageViewType::TYPE_2D
        }
        ResourceViewType::Texture2dArray | ResourceViewType::Texture2dMultisampleArray => {
            vk::ImageViewType::TYPE_2D_ARRAY
        }
        ResourceViewType::Texture3d => vk::ImageViewType::TYPE_3D,
        ResourceViewType::TextureCube => vk::ImageViewType::CUBE,
        ResourceViewType::TextureCubeArray => vk::ImageViewType::CUBE_ARRAY,
        ResourceViewType::Unknown | ResourceViewType::Buffer => return None,
    })
}

pub fn map_image_view_info(desc: &ResourceViewDesc, info: &mut vk::ImageViewCreateInfo<'_>) {
    if let Some(ty) = map_view_type(desc.ty) {
        info.view_type = ty;
    }

    let format = map_format(desc.format);
    if format != vk::Format::UNDEFINED {
        info.format = format;
    }

    if let ViewRange::Texture {
        first_level,
        levels,
        first_layer,
        layers,
    } = desc.range
    {
        info.subresource_range.base_mip_level = first_level;
        info.subresource_range.level_count = levels;
        info.subresource_range.base_array_layer = first_layer;
        info.subresource_range.layer_count = layers;
    }
}

pub fn unmap_image_view_info(info: &vk::ImageViewCreateInfo<'_>) -> ResourceViewDesc {
    let ty = match info.view_type {
        vk::ImageViewType::TYPE_1D => ResourceViewType::Texture1d,
        vk::ImageViewType::TYPE_1D_ARRAY => ResourceViewType::Texture1dArray,
        vk::ImageViewType::TYPE_2D => ResourceViewType::Texture2d,
        vk::ImageViewType::TYPE_2D_ARRAY => ResourceViewType::Texture2dArray,
        vk::ImageViewType::TYPE_3D => ResourceViewType::Texture3d,
        vk::ImageViewType::CUBE => ResourceViewType::TextureCube,
        vk::ImageViewType::CUBE_ARRAY => ResourceViewType::TextureCubeArray,
        _ => ResourceViewType::Unknown,
    };

    ResourceViewDesc {
        ty,
        format: unmap_format(info.format),
        range: ViewRange::Texture {
            first_level: info.subresource_range.base_mip_level,
            levels: info.subresource_range.level_count,
            first_layer: info.subresource_range.base_array_layer,
            layers: info.subresource_range.layer_count,
        },
    }
}

pub fn map_buffer_view_info(desc: &ResourceViewDesc, info: &mut vk::BufferViewCreateInfo<'_>) {
    let format = map_format(desc.format);
    if format != vk::Format::UNDEFINED {
        info.format = format;
    }

    if let ViewRange::Buffer { offset, size } = desc.range {
        info.offset = offset;
        info.range = if size == u64::MAX { vk::WHOLE_SIZE } else { size };
    }
}

pub fn unmap_buffer_view_info(info: &vk::BufferViewCreateInfo<'_>) -> ResourceViewDesc {
    ResourceViewDesc {
        ty: ResourceViewType::Buffer,
        format: unmap_format(info.format),
        range: ViewRange::Buffer {
            offset: info.offset,
            size: if info.range == vk::WHOLE_SIZE {
                u64::MAX
            } else {
                info.range
            },
        },
    }
}

fn map_address_mode(mode: TextureAddressMode) -> vk::SamplerAddressMode {
    match mode {
        TextureAddressMode::Wrap => vk::SamplerAddressMode::REPEAT,
        TextureAddressMode::Mirror => vk::SamplerAddressMode::MIRRORED_REPEAT,
        TextureAddressMode::Clamp => vk::SamplerAddressMode::CLAMP_TO_EDGE,
        TextureAddressMode::Border => vk::SamplerAddressMode::CLAMP_TO_BORDER,
        TextureAddressMode::MirrorOnce => vk::SamplerAddressMode::MIRROR_CLAMP_TO_EDGE,
    }
}

fn unmap_address_mode(mode: vk::SamplerAddressMode) -> TextureAddressMode {
    match mode {
        vk::SamplerAddressMode::MIRRORED_REPEAT => TextureAddressMode::Mirror,
        vk::SamplerAddressMode::CLAMP_TO_EDGE => TextureAddressMode::Clamp,
        vk::SamplerAddressMode::CLAMP_TO_BORDER => TextureAddressMode::Border,
        vk::SamplerAddressMode::MIRROR_CLAMP_TO_EDGE => TextureAddressMode::MirrorOnce,
        _ => TextureAddressMode::Wrap,
    }
}

pub fn map_sampler_info(desc: &SamplerDesc) -> vk::SamplerCreateInfo<'static> {
    let filter = |linear| {
        if linear {
            vk::Filter::LINEAR
        } else {
            vk::Filter::NEAREST
        }
    };

    let anisotropic = desc.filter.is_anisotropic();
    vk::SamplerCreateInfo::default()
        .min_filter(filter(anisotropic || desc.filter.min_linear()))
        .mag_filter(filter(anisotropic || desc.filter.mag_linear()))
        .mipmap_mode(if anisotropic || desc.filter.mip_linear() {
            vk::SamplerMipmapMode::LINEAR
        } else {
            vk::SamplerMipmapMode::NEAREST
        })
        .anisotropy_enable(anisotropic)
        .compare_enable(desc.filter.is_compare())
        .address_mode_u(map_address_mode(desc.address_u))
        .address_mode_v(map_address_mode(desc.address_v))
        .address_mode_w(map_address_mode(desc.address_w))
        .mip_lod_bias(desc.mip_lod_bias)
        .max_anisotropy(desc.max_anisotropy)
        .compare_op(map_compare_op(desc.compare_op))
        .min_lod(desc.min_lod)
        .max_lod(desc.max_lod)
}

pub fn unmap_sampler_info(info: &vk::SamplerCreateInfo<'_>) -> SamplerDesc {
    SamplerDesc {
        filter: FilterMode::from_parts(
            info.min_filter == vk::Filter::LINEAR,
            info.mag_filter == vk::Filter::LINEAR,
            info.mipmap_mode == vk::SamplerMipmapMode::LINEAR,
            info.anisotropy_enable != vk::FALSE,
            info.compare_enable != vk::FALSE,
        ),
        address_u: unmap_address_mode(info.address_mode_u),
        address_v: unmap_address_mode(info.address_mode_v),
        address_w: unmap_address_mode(info.address_mode_w),
        mip_lod_bias: info.mip_lod_bias,
        max_anisotropy: info.max_anisotropy,
        compare_op: unmap_compare_op(info.compare_op),
        border_color: match info.border_color {
            vk::BorderColor::FLOAT_OPAQUE_BLACK | vk::BorderColor::INT_OPAQUE_BLACK => {
                [0.0, 0.0, 0.0, 1.0]
            }
            vk::BorderColor::FLOAT_OPAQUE_WHITE | vk::BorderColor::INT_OPAQUE_WHITE => [1.0; 4],
            _ => [0.0; 4],
        },
        min_lod: info.min_lod,
        max_lod: info.max_lod,
    }
}

/// Unified compare ops are numbered one above Vulkan's.
#[inline]
pub fn map_compare_op(op: CompareOp) -> vk::CompareOp {
    vk::CompareOp::from_raw(op as i32 - 1)
}

pub fn unmap_compare_op(op: vk::CompareOp) -> CompareOp {
    match op {
        vk::CompareOp::NEVER => CompareOp::Never,
        vk::CompareOp::LESS => CompareOp::Less,
        vk::CompareOp::EQUAL => CompareOp::Equal,
        vk::CompareOp::LESS_OR_EQUAL => CompareOp::LessEqual,
        vk::CompareOp::GREATER => CompareOp::Greater,
        vk::CompareOp::NOT_EQUAL => CompareOp::NotEqual,
        vk::CompareOp::GREATER_OR_EQUAL => CompareOp::GreaterEqual,
        _ => CompareOp::Always,
    }
}

#[inline]
pub fn map_stencil_op(op: StencilOp) -> vk::StencilOp {
    vk::StencilOp::from_raw(op as i32)
}

pub fn unmap_stencil_op(op: vk::StencilOp) -> StencilOp {
    match op {
        vk::StencilOp::ZERO => StencilOp::Zero,
        vk::StencilOp::REPLACE => StencilOp::Replace,
        vk::StencilOp::INCREMENT_AND_CLAMP => StencilOp::IncrementSaturate,
        vk::StencilOp::DECREMENT_AND_CLAMP => StencilOp::DecrementSaturate,
        vk::StencilOp::INVERT => StencilOp::Invert,
        vk::StencilOp::INCREMENT_AND_WRAP => StencilOp::Increment,
        vk::StencilOp::DECREMENT_AND_WRAP => StencilOp::Decrement,
        _ => StencilOp::Keep,
    }
}

#[inline]
pub fn map_blend_op(op: BlendOp) -> vk::BlendOp {
    vk::BlendOp::from_raw(op as i32)
}

pub fn unmap_blend_op(op: vk::BlendOp) -> BlendOp {
    match op {
        vk::BlendOp::SUBTRACT => BlendOp::Subtract,
        vk::BlendOp::REVERSE_SUBTRACT => BlendOp::ReverseSubtract,
        vk::BlendOp::MIN => BlendOp::Min,
        vk::BlendOp::MAX => BlendOp::Max,
        _ => BlendOp::Add,
    }
}

#[inline]
pub fn map_blend_factor(factor: BlendFactor) -> vk::BlendFactor {
    vk::BlendFactor::from_raw(factor as i32)
}

pub fn unmap_blend_factor(factor: vk::BlendFactor) -> BlendFactor {
    use BlendFactor as B;

    match factor {
        vk::BlendFactor::ONE => B::One,
        vk::BlendFactor::SRC_COLOR => B::SourceColor,
        vk::BlendFactor::ONE_MINUS_SRC_COLOR => B::OneMinusSourceColor,
        vk::BlendFactor::DST_COLOR => B::DestColor,
        vk::BlendFactor::ONE_MINUS_DST_COLOR => B::OneMinusDestColor,
        vk::BlendFactor::SRC_ALPHA => B::SourceAlpha,
        vk::BlendFactor::ONE_MINUS_SRC_ALPHA => B::OneMinusSourceAlpha,
        vk::BlendFactor::DST_ALPHA => B::DestAlpha,
        vk::BlendFactor::ONE_MINUS_DST_ALPHA => B::OneMinusDestAlpha,
        vk::BlendFactor::CONSTANT_COLOR => B::ConstantColor,
        vk::BlendFactor::ONE_MINUS_CONSTANT_COLOR => B::OneMinusConstantColor,
        vk::BlendFactor::CONSTANT_ALPHA => B::ConstantAlpha,
        vk::BlendFactor::ONE_MINUS_CONSTANT_ALPHA => B::OneMinusConstantAlpha,
        vk::BlendFactor::SRC_ALPHA_SATURATE => B::SourceAlphaSaturate,
        vk::BlendFactor::SRC1_COLOR => B::Source1Color,
        vk::BlendFactor::ONE_MINUS_SRC1_COLOR => B::OneMinusSource1Color,
        vk::BlendFactor::SRC1_ALPHA => B::Source1Alpha,
        vk::BlendFactor::ONE_MINUS_SRC1_ALPHA => B::OneMinusSource1Alpha,
        _ => B::Zero,
    }
}

#[inline]
pub fn map_logic_op(op: LogicOp) -> vk::LogicOp {
    vk::LogicOp::from_raw(op as i32)
}

pub fn unmap_logic_op(op: vk::LogicOp) -> LogicOp {
    use LogicOp as L;

    match op {
        vk::LogicOp::CLEAR => L::Clear,
        vk::LogicOp::AND => L::And,
        vk::LogicOp::AND_REVERSE => L::AndReverse,
        vk::LogicOp::AND_INVERTED => L::AndInverted,
        vk::LogicOp::NO_OP => L::Noop,
        vk::LogicOp::XOR => L::Xor,
        vk::LogicOp::OR => L::Or,
        vk::LogicOp::NOR => L::Nor,
        vk::LogicOp::EQUIVALENT => L::Equivalent,
        vk::LogicOp::INVERT => L::Invert,
        vk::LogicOp::OR_REVERSE => L::OrReverse,
        vk::LogicOp::COPY_INVERTED => L::CopyInverted,
        vk::LogicOp::OR_INVERTED => L::OrInverted,
        vk::LogicOp::NAND => L::Nand,
        vk::LogicOp::SET => L::Set,
        _ => L::Copy,
    }
}

pub fn map_fill_mode(mode: FillMode) -> vk::PolygonMode {
    match mode {
        FillMode::Solid => vk::PolygonMode::FILL,
        FillMode::Wireframe => vk::PolygonMode::LINE,
        FillMode::Point => vk::PolygonMode::POINT,
    }
}

pub fn unmap_fill_mode(mode: vk::PolygonMode) -> FillMode {
    match mode {
        vk::PolygonMode::LINE => FillMode::Wireframe,
        vk::PolygonMode::POINT => FillMode::Point,
        _ => FillMode::Solid,
    }
}

#[inline]
pub fn map_cull_mode(mode: CullMode) -> vk::CullModeFlags {
    vk::CullModeFlags::from_raw(mode as u32)
}

pub fn unmap_cull_mode(mode: vk::CullModeFlags) -> CullMode {
    match mode {
        vk::CullModeFlags::FRONT => CullMode::Front,
        vk::CullModeFlags::BACK => CullMode::Back,
        vk::CullModeFlags::FRONT_AND_BACK => CullMode::FrontAndBack,
        _ => CullMode::None,
    }
}

/// `None` for [`PrimitiveTopology::Undefined`].
pub fn map_topology(topology: PrimitiveTopology) -> Option<vk::PrimitiveTopology> {
    Some(match topology {
        PrimitiveTopology::Undefined => return None,
        PrimitiveTopology::PointList => vk::PrimitiveTopology::POINT_LIST,
        PrimitiveTopology::LineList => vk::PrimitiveTopology::LINE_LIST,
        PrimitiveTopology::LineStrip => vk::PrimitiveTopology::LINE_STRIP,
        PrimitiveTopology::TriangleList => vk::PrimitiveTopology::TRIANGLE_LIST,
        PrimitiveTopology::TriangleStrip => vk::PrimitiveTopology::TRIANGLE_STRIP,
        PrimitiveTopology::TriangleFan => vk::PrimitiveTopology::TRIANGLE_FAN,
        PrimitiveTopology::LineListAdj => vk::PrimitiveTopology::LINE_LIST_WITH_ADJACENCY,
        PrimitiveTopology::LineStripAdj => vk::PrimitiveTopology::LINE_STRIP_WITH_ADJACENCY,
        PrimitiveTopology::TriangleListAdj => vk::PrimitiveTopology::TRIANGLE_LIST_WITH_ADJACENCY,
        PrimitiveTopology::TriangleStripAdj => {
            vk::PrimitiveTopology::TRIANGLE_STRIP_WITH_ADJACENCY
        }
        PrimitiveTopology::PatchList(_) => vk::PrimitiveTopology::PATCH_LIST,
    })
}

/// Patch lists need the control point count of the tessellation state.
pub fn unmap_topology(topology: vk::PrimitiveTopology, patch_control_points: u32) -> PrimitiveTopology {
    match topology {
        vk::PrimitiveTopology::POINT_LIST => PrimitiveTopology::PointList,
        vk::PrimitiveTopology::LINE_LIST => PrimitiveTopology::LineList,
        vk::PrimitiveTopology::LINE_STRIP => PrimitiveTopology::LineStrip,
        vk::PrimitiveTopology::TRIANGLE_LIST => PrimitiveTopology::TriangleList,
        vk::PrimitiveTopology::TRIANGLE_STRIP => PrimitiveTopology::TriangleStrip,
        vk::PrimitiveTopology::TRIANGLE_FAN => PrimitiveTopology::TriangleFan,
        vk::PrimitiveTopology::LINE_LIST_WITH_ADJACENCY => PrimitiveTopology::LineListAdj,
        vk::PrimitiveTopology::LINE_STRIP_WITH_ADJACENCY => PrimitiveTopology::LineStripAdj,
        vk::PrimitiveTopology::TRIANGLE_LIST_WITH_ADJACENCY => PrimitiveTopology::TriangleListAdj,
        vk::PrimitiveTopology::TRIANGLE_STRIP_WITH_ADJACENCY => {
            PrimitiveTopology::TriangleStripAdj
        }
        vk::PrimitiveTopology::PATCH_LIST => {
            PrimitiveTopology::PatchList(patch_control_points.clamp(1, 32) as u8)
        }
        _ => PrimitiveTopology::Undefined,
    }
}

pub fn map_query_type(ty: QueryType) -> vk::QueryType {
    match ty {
        QueryType::Occlusion | QueryType::BinaryOcclusion => vk::QueryType::OCCLUSION,
        QueryType::Timestamp => vk::QueryType::TIMESTAMP,
        QueryType::PipelineStatistics => vk::QueryType::PIPELINE_STATISTICS,
    }
}

/// Unified shader stages share Vulkan's bit layout.
#[inline]
pub fn map_shader_stages(stages: ShaderStage) -> vk::ShaderStageFlags {
    vk::ShaderStageFlags::from_raw(stages.bits())
}

#[inline]
pub fn unmap_shader_stages(stages: vk::ShaderStageFlags) -> ShaderStage {
    ShaderStage::from_bits_truncate(stages.as_raw())
}

pub fn map_descriptor_type(ty: DescriptorType) -> vk::DescriptorType {
    match ty {
        DescriptorType::Sampler => vk::DescriptorType::SAMPLER,
        DescriptorType::SamplerWithResourceView => vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
        DescriptorType::ShaderResourceView => vk::DescriptorType::SAMPLED_IMAGE,
        DescriptorType::UnorderedAccessView => vk::DescriptorType::STORAGE_IMAGE,
        DescriptorType::ConstantBuffer => vk::DescriptorType::UNIFORM_BUFFER,
    }
}

pub fn unmap_descriptor_type(ty: vk::DescriptorType) -> Option<DescriptorType> {
    Some(match ty {
        vk::DescriptorType::SAMPLER => DescriptorType::Sampler,
        vk::DescriptorType::COMBINED_IMAGE_SAMPLER => DescriptorType::SamplerWithResourceView,
        vk::DescriptorType::SAMPLED_IMAGE | vk::DescriptorType::UNIFORM_TEXEL_BUFFER => {
            DescriptorType::ShaderResourceView
        }
        vk::DescriptorType::STORAGE_IMAGE
        | vk::DescriptorType::STORAGE_TEXEL_BUFFER
        | vk::DescriptorType::STORAGE_BUFFER
        | vk::DescriptorType::STORAGE_BUFFER_DYNAMIC => DescriptorType::UnorderedAccessView,
        vk::DescriptorType::UNIFORM_BUFFER | vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC => {
            DescriptorType::ConstantBuffer
        }
        _ => return None,
    })
}

pub fn map_load_op(op: LoadOp) -> vk::AttachmentLoadOp {
    match op {
        LoadOp::Load => vk::AttachmentLoadOp::LOAD,
        LoadOp::Clear => vk::AttachmentLoadOp::CLEAR,
        LoadOp::Discard | LoadOp::DontCare => vk::AttachmentLoadOp::DONT_CARE,
    }
}

pub fn map_store_op(op: StoreOp) -> vk::AttachmentStoreOp {
    match op {
        StoreOp::Store => vk::AttachmentStoreOp::STORE,
        StoreOp::Discard | StoreOp::DontCare => vk::AttachmentStoreOp::DONT_CARE,
    }
}

pub fn map_dynamic_state(state: PipelineState) -> Option<vk::DynamicState> {
    Some(match state {
        PipelineState::Viewport => vk::DynamicState::VIEWPORT,
        PipelineState::Scissor => vk::DynamicState::SCISSOR,
        PipelineState::DepthBias
        | PipelineState::DepthBiasClamp
        | PipelineState::DepthBiasSlopeScaled => vk::DynamicState::DEPTH_BIAS,
        PipelineState::BlendConstant => vk::DynamicState::BLEND_CONSTANTS,
        PipelineState::StencilReadMask => vk::DynamicState::STENCIL_COMPARE_MASK,
        PipelineState::StencilWriteMask => vk::DynamicState::STENCIL_WRITE_MASK,
        PipelineState::StencilReferenceValue => vk::DynamicState::STENCIL_REFERENCE,
        PipelineState::CullMode => vk::DynamicState::CULL_MODE,
        PipelineState::FrontCounterClockwise => vk::DynamicState::FRONT_FACE,
        PipelineState::PrimitiveTopology => vk::DynamicState::PRIMITIVE_TOPOLOGY,
        PipelineState::DepthTest => vk::DynamicState::DEPTH_TEST_ENABLE,
        PipelineState::DepthWriteMask => vk::DynamicState::DEPTH_WRITE_ENABLE,
        PipelineState::DepthFunc => vk::DynamicState::DEPTH_COMPARE_OP,
        PipelineState::StencilTest => vk::DynamicState::STENCIL_TEST_ENABLE,
        PipelineState::LogicOp => vk::DynamicState::LOGIC_OP_EXT,
        _ => return None,
    })
}

pub fn unmap_dynamic_state(state: vk::DynamicState) -> Option<PipelineState> {
    Some(match state {
        vk::DynamicState::VIEWPORT => PipelineState::Viewport,
        vk::DynamicState::SCISSOR => PipelineState::Scissor,
        vk::DynamicState::DEPTH_BIAS => PipelineState::DepthBias,
        vk::DynamicState::BLEND_CONSTANTS => PipelineState::BlendConstant,
        vk::DynamicState::STENCIL_COMPARE_MASK => PipelineState::StencilReadMask,
        vk::DynamicState::STENCIL_WRITE_MASK => PipelineState::StencilWriteMask,
        vk::DynamicState::STENCIL_REFERENCE => PipelineState::StencilReferenceValue,
        vk::DynamicState::CULL_MODE => PipelineState::CullMode,
        vk::DynamicState::FRONT_FACE => PipelineState::FrontCounterClockwise,
        vk::DynamicState::PRIMITIVE_TOPOLOGY => PipelineState::PrimitiveTopology,
        vk::DynamicState::DEPTH_TEST_ENABLE => PipelineState::DepthTest,
        vk::DynamicState::DEPTH_WRITE_ENABLE => PipelineState::DepthWriteMask,
        vk::DynamicState::DEPTH_COMPARE_OP => PipelineState::DepthFunc,
        vk::DynamicState::STENCIL_TEST_ENABLE => PipelineState::StencilTest,
        vk::DynamicState::LOGIC_OP_EXT => PipelineState::LogicOp,
        _ => return None,
    })
}

pub fn map_rasterizer_state(desc: &RasterizerDesc) -> vk::PipelineRasterizationStateCreateInfo<'static> {
    vk::PipelineRasterizationStateCreateInfo::default()
        .depth_clamp_enable(!desc.depth_clip_enable)
        .polygon_mode(map_fill_mode(desc.fill_mode))
        .cull_mode(map_cull_mode(desc.cull_mode))
        .front_face(if desc.front_counter_clockwise {
            vk::FrontFace::COUNTER_CLOCKWISE
        } else {
            vk::FrontFace::CLOCKWISE
        })
        .depth_bias_enable(
            desc.depth_bias != 0.0 || desc.depth_bias_clamp != 0.0 || desc.slope_scaled_depth_bias != 0.0,
        )
        .depth_bias_constant_factor(desc.depth_bias)
        .depth_bias_clamp(desc.depth_bias_clamp)
        .depth_bias_slope_factor(desc.slope_scaled_depth_bias)
        .line_width(1.0)
}

pub fn unmap_rasterizer_state(info: &vk::PipelineRasterizationStateCreateInfo<'_>) -> RasterizerDesc {
    RasterizerDesc {
        fill_mode: unmap_fill_mode(info.polygon_mode),
        cull_mode: unmap_cull_mode(info.cull_mode),
        front_counter_clockwise: info.front_face == vk::FrontFace::COUNTER_CLOCKWISE,
        depth_bias: info.depth_bias_constant_factor,
        depth_bias_clamp: info.depth_bias_clamp,
        slope_scaled_depth_bias: info.depth_bias_slope_factor,
        depth_clip_enable: info.depth_clamp_enable == vk::FALSE,
        ..RasterizerDesc::default()
    }
}

fn map_stencil_face(face: &StencilFace, desc: &DepthStencilDesc) -> vk::StencilOpState {
    vk::StencilOpState {
        fail_op: map_stencil_op(face.fail_op),
        pass_op: map_stencil_op(face.pass_op),
        depth_fail_op: map_stencil_op(face.depth_fail_op),
        compare_op: map_compare_op(face.func),
        compare_mask: desc.stencil_read_mask as u32,
        write_mask: desc.stencil_write_mask as u32,
        reference: desc.stencil_reference_value as u32,
    }
}

fn unmap_stencil_face(state: &vk::StencilOpState) -> StencilFace {
    StencilFace {
        fail_op: unmap_stencil_op(state.fail_op),
        depth_fail_op: unmap_stencil_op(state.depth_fail_op),
        pass_op: unmap_stencil_op(state.pass_op),
        func: unmap_compare_op(state.compare_op),
    }
}

pub fn map_depth_stencil_state(desc: &DepthStencilDesc) -> vk::PipelineDepthStencilStateCreateInfo<'static> {
    vk::PipelineDepthStencilStateCreateInfo::default()
        .depth_test_enable(desc.depth_enable)
        .depth_write_enable(desc.depth_write_mask)
        .depth_compare_op(map_compare_op(desc.depth_func))
        .stencil_test_enable(desc.stencil_enable)
        .front(map_stencil_face(&desc.front, desc))
        .back(map_stencil_face(&desc.back, desc))
        .min_depth_bounds(0.0)
        .max_depth_bounds(1.0)
}

pub fn unmap_depth_stencil_state(info: &vk::PipelineDepthStencilStateCreateInfo<'_>) -> DepthStencilDesc {
    DepthStencilDesc {
        depth_enable: info.depth_test_enable != vk::FALSE,
        depth_write_mask: info.depth_write_enable != vk::FALSE,
        depth_func: unmap_compare_op(info.depth_compare_op),
        stencil_enable: info.stencil_test_enable != vk::FALSE,
        stencil_read_mask: info.front.compare_mask as u8,
        stencil_write_mask: info.front.write_mask as u8,
        stencil_reference_value: info.front.reference as u8,
        front: unmap_stencil_face(&info.front),
        back: unmap_stencil_face(&info.back),
    }
}

pub fn map_blend_attachments(
    desc: &BlendDesc,
    count: usize,
) -> Vec<vk::PipelineColorBlendAttachmentState> {
    (0..count)
        .map(|i| vk::PipelineColorBlendAttachmentState {
            blend_enable: desc.blend_enable[i] as vk::Bool32,
            src_color_blend_factor: map_blend_factor(desc.source_color_blend_factor[i]),
            dst_color_blend_factor: map_blend_factor(desc.dest_color_blend_factor[i]),
            color_blend_op: map_blend_op(desc.color_blend_op[i]),
            src_alpha_blend_factor: map_blend_factor(desc.source_alpha_blend_factor[i]),
            dst_alpha_blend_factor: map_blend_factor(desc.dest_alpha_blend_factor[i]),
            alpha_blend_op: map_blend_op(desc.alpha_blend_op[i]),
            color_write_mask: vk::ColorComponentFlags::from_raw(
                desc.render_target_write_mask[i] as u32,
            ),
        })
        .collect()
}

pub fn unmap_blend_state(info: &vk::PipelineColorBlendStateCreateInfo<'_>) -> BlendDesc {
    let mut desc = BlendDesc::default();
    let attachments = if info.p_attachments.is_null() {
        &[][..]
    } else {
        unsafe { core::slice::from_raw_parts(info.p_attachments, info.attachment_count as usize) }
    };

    for (i, attachment) in attachments.iter().take(desc.blend_enable.len()).enumerate() {
        desc.blend_enable[i] = attachment.blend_enable != vk::FALSE;
        desc.logic_op_enable[i] = info.logic_op_enable != vk::FALSE;
        desc.source_color_blend_factor[i] = unmap_blend_factor(attachment.src_color_blend_factor);
        desc.dest_color_blend_factor[i] = unmap_blend_factor(attachment.dst_color_blend_factor);
        desc.color_blend_op[i] = unmap_blend_op(attachment.color_blend_op);
        desc.source_alpha_blend_factor[i] = unmap_blend_factor(attachment.src_alpha_blend_factor);
        desc.dest_alpha_blend_factor[i] = unmap_blend_factor(attachment.dst_alpha_blend_factor);
        desc.alpha_blend_op[i] = unmap_blend_op(attachment.alpha_blend_op);
        desc.logic_op[i] = unmap_logic_op(info.logic_op);
        desc.render_target_write_mask[i] = attachment.color_write_mask.as_raw() as u8;
    }

    let [r, g, b, a] = info.blend_constants.map(|c| (c.clamp(0.0, 1.0) * 255.0) as u32);
    desc.blend_constant = r | g << 8 | b << 16 | a << 24;
    desc
}

pub fn map_error(result: vk::Result) -> Error {
    match result {
        vk::Result::ERROR_OUT_OF_HOST_MEMORY | vk::Result::ERROR_OUT_OF_DEVICE_MEMORY => {
            Error::OutOfMemory
        }
        vk::Result::ERROR_DEVICE_LOST => Error::DeviceLost,
        result => Error::Native(result.as_raw()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn typeless_formats_resolve_to_typed() {
        assert_eq!(map_format(Format::R8G8B8A8Typeless), vk::Format::R8G8B8A8_UNORM);
        assert_eq!(map_format(Format::B8G8R8X8UnormSrgb), vk::Format::B8G8R8A8_SRGB);
        assert_eq!(map_format(Format::R24G8Typeless), vk::Format::D24_UNORM_S8_UINT);
        assert_eq!(map_format(Format::R1Unorm), vk::Format::UNDEFINED);
    }

    #[test]
    fn typed_formats_survive() {
        for raw in 1..=115 {
            let format = Format::from_raw(raw);
            if format == Format::Unknown || format.is_typeless() {
                continue;
            }

            let native = map_format(format);
            if native == vk::Format::UNDEFINED {
                continue;
            }
            // Formats folding onto another native format come back as that format's canonical member
            assert_eq!(map_format(unmap_format(native)), native, "{format:?}");
        }
    }

    #[test]
    fn image_desc_roundtrip() {
        let info = vk::ImageCreateInfo::default()
            .image_type(vk::ImageType::TYPE_2D)
            .format(vk::Format::B8G8R8A8_SRGB)
            .extent(vk::Extent3D {
                width: 1920,
                height: 1080,
                depth: 1,
            })
            .mip_levels(1)
            .array_layers(1)
            .samples(vk::SampleCountFlags::TYPE_1)
            .usage(
                vk::ImageUsageFlags::COLOR_ATTACHMENT
                    | vk::ImageUsageFlags::SAMPLED
                    | vk::ImageUsageFlags::TRANSFER_DST,
            );

        let desc = unmap_image_info(&info);
        assert_eq!(desc.extent(), (1920, 1080, 1));
        assert_eq!(desc.format, Format::B8G8R8A8UnormSrgb);
        assert!(desc.usage.contains(ResourceUsage::RENDER_TARGET | ResourceUsage::SHADER_RESOURCE));

        let mut back = vk::ImageCreateInfo::default();
        map_image_info(&desc, &mut back);
        assert_eq!(back.image_type, info.image_type);
        assert_eq!(back.format, info.format);
        assert_eq!(back.extent, info.extent);
        assert_eq!(back.mip_levels, info.mip_levels);
        assert_eq!(back.array_layers, info.array_layers);
        assert!(back.usage.contains(info.usage));
    }

    #[test]
    fn cube_and_volume_desc() {
        let cube = vk::ImageCreateInfo::default()
            .flags(vk::ImageCreateFlags::CUBE_COMPATIBLE)
            .image_type(vk::ImageType::TYPE_2D)
            .format(vk::Format::R16G16B16A16_SFLOAT)
            .extent(vk::Extent3D {
                width: 64,
                height: 64,
                depth: 1,
            })
            .mip_levels(7)
            .array_layers(6)
            .samples(vk::SampleCountFlags::TYPE_1)
            .usage(vk::ImageUsageFlags::TRANSFER_SRC | vk::ImageUsageFlags::TRANSFER_DST);
        let desc = unmap_image_info(&cube);
        assert!(desc.flags.contains(ResourceFlags::CUBE_COMPATIBLE | ResourceFlags::GENERATE_MIPMAPS));
        assert_eq!(desc.layers(), 6);

        let mut volume = vk::ImageCreateInfo::default()
            .image_type(vk::ImageType::TYPE_3D)
            .format(vk::Format::R8_UNORM)
            .extent(vk::Extent3D {
                width: 32,
                height: 16,
                depth: 8,
            })
            .mip_levels(1)
            .array_layers(1);
        let desc = unmap_image_info(&volume);
        assert_eq!(desc.extent(), (32, 16, 8));

        volume.extent = vk::Extent3D::default();
        map_image_info(&desc, &mut volume);
        assert_eq!(volume.extent.depth, 8);
        assert_eq!(volume.array_layers, 1);
    }

    #[test]
    fn buffer_desc_roundtrip() {
        let info = vk::BufferCreateInfo::default().size(4096).usage(
            vk::BufferUsageFlags::VERTEX_BUFFER
                | vk::BufferUsageFlags::INDEX_BUFFER
                | vk::BufferUsageFlags::TRANSFER_DST,
        );
        let desc = unmap_buffer_info(&info);
        assert_eq!(desc.extent().0, 4096);

        let mut back = vk::BufferCreateInfo::default();
        map_buffer_info(&desc, &mut back);
        assert_eq!(back.size, info.size);
        assert_eq!(back.usage, info.usage);
    }

    #[test]
    fn layouts_and_access() {
        assert_eq!(
            map_image_layout(ResourceUsage::SHADER_RESOURCE_PIXEL),
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL
        );
        assert_eq!(
            map_image_layout(ResourceUsage::DEPTH_STENCIL),
            vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL
        );
        assert_eq!(map_image_layout(ResourceUsage::PRESENT), vk::ImageLayout::PRESENT_SRC_KHR);
        assert_eq!(
            map_image_layout(ResourceUsage::RENDER_TARGET | ResourceUsage::COPY_SOURCE),
            vk::ImageLayout::GENERAL
        );
        assert_eq!(map_access(ResourceUsage::PRESENT), vk::AccessFlags::empty());

        let features = vk::PhysicalDeviceFeatures::default();
        assert_eq!(
            map_pipeline_stage(ResourceUsage::empty(), true, &features),
            vk::PipelineStageFlags::TOP_OF_PIPE
        );
        assert_eq!(
            map_pipeline_stage(ResourceUsage::PRESENT, false, &features),
            vk::PipelineStageFlags::BOTTOM_OF_PIPE
        );
    }

    #[test]
    fn sampler_roundtrip() {
        let desc = SamplerDesc {
            filter: FilterMode::CompareMinLinearMagMipPoint,
            address_u: TextureAddressMode::Border,
            compare_op: CompareOp::LessEqual,
            ..SamplerDesc::default()
        };

        let info = map_sampler_info(&desc);
        assert_eq!(info.compare_op, vk::CompareOp::LESS_OR_EQUAL);
        assert_eq!(info.address_mode_u, vk::SamplerAddressMode::CLAMP_TO_BORDER);

        let back = unmap_sampler_info(&info);
        assert_eq!(back.filter, desc.filter);
        assert_eq!(back.compare_op, desc.compare_op);
        assert_eq!(back.address_u, desc.address_u);
    }

    #[test]
    fn depth_stencil_roundtrip() {
        let desc = DepthStencilDesc {
            depth_func: CompareOp::Greater,
            stencil_enable: true,
            stencil_reference_value: 3,
            ..DepthStencilDesc::default()
        };
        let back = unmap_depth_stencil_state(&map_depth_stencil_state(&desc));
        assert_eq!(back, desc);
    }

    #[test]
    fn patch_topology_keeps_control_points() {
        let topology = PrimitiveTopology::PatchList(4);
        let native = map_topology(topology).unwrap();
        assert_eq!(unmap_topology(native, 4), topology);
        assert_eq!(map_topology(PrimitiveTopology::Undefined), None);
    }
}
