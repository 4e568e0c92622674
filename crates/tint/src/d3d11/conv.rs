//! Direct3D 11 values and descriptions in and out of the unified model.
//!
//! Like the Direct3D 9 tables these work on plain numbers. The Windows device mirrors the
//! native descriptions into the structs below. Unified formats are DXGI formats, so format
//! translation is the identity outside the few Direct3D 9 only formats.

use num_traits::FromPrimitive;
use tint_api::{
    Format,
    pipeline::{
        BlendDesc, BlendFactor, BlendOp, CullMode, DepthStencilDesc, FillMode, InputElement,
        MAX_RENDER_TARGETS, PrimitiveTopology, RasterizerDesc, StencilFace, StencilOp,
    },
    resource::{
        MemoryHeap, ResourceDesc, ResourceDimension, ResourceFlags, ResourceUsage,
        ResourceViewDesc, ResourceViewType, ViewRange,
    },
    sampler::{CompareOp, FilterMode, SamplerDesc, TextureAddressMode},
};

/// `D3D11_USAGE`
pub mod usage {
    pub const DEFAULT: u32 = 0;
    pub const IMMUTABLE: u32 = 1;
    pub const DYNAMIC: u32 = 2;
    pub const STAGING: u32 = 3;
}

/// `D3D11_BIND_FLAG`
pub mod bind {
    pub const VERTEX_BUFFER: u32 = 0x1;
    pub const INDEX_BUFFER: u32 = 0x2;
    pub const CONSTANT_BUFFER: u32 = 0x4;
    pub const SHADER_RESOURCE: u32 = 0x8;
    pub const STREAM_OUTPUT: u32 = 0x10;
    pub const RENDER_TARGET: u32 = 0x20;
    pub const DEPTH_STENCIL: u32 = 0x40;
    pub const UNORDERED_ACCESS: u32 = 0x80;
}

/// `D3D11_CPU_ACCESS_FLAG`
pub mod cpu {
    pub const WRITE: u32 = 0x10000;
    pub const READ: u32 = 0x20000;
}

/// `D3D11_RESOURCE_MISC_FLAG`
pub mod misc {
    pub const GENERATE_MIPS: u32 = 0x1;
    pub const SHARED: u32 = 0x2;
    pub const TEXTURECUBE: u32 = 0x4;
    pub const DRAWINDIRECT_ARGS: u32 = 0x10;
    pub const BUFFER_ALLOW_RAW_VIEWS: u32 = 0x20;
    pub const BUFFER_STRUCTURED: u32 = 0x40;
}

/// `D3D11_INPUT_CLASSIFICATION`
pub const INPUT_PER_INSTANCE_DATA: u32 = 1;
/// `D3D11_APPEND_ALIGNED_ELEMENT`
pub const APPEND_ALIGNED_ELEMENT: u32 = u32::MAX;

/// `D3D11_BUFFER_DESC`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BufferDesc {
    pub byte_width: u32,
    pub usage: u32,
    pub bind_flags: u32,
    pub cpu_access_flags: u32,
    pub misc_flags: u32,
    pub structure_byte_stride: u32,
}

/// `D3D11_TEXTURE1D_DESC`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Texture1dDesc {
    pub width: u32,
    pub mip_levels: u32,
    pub array_size: u32,
    pub format: u32,
    pub usage: u32,
    pub bind_flags: u32,
    pub cpu_access_flags: u32,
    pub misc_flags: u32,
}

/// `D3D11_TEXTURE2D_DESC`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Texture2dDesc {
    pub width: u32,
    pub height: u32,
    pub mip_levels: u32,
    pub array_size: u32,
    pub format: u32,
    pub sample_count: u32,
    pub sample_quality: u32,
    pub usage: u32,
    pub bind_flags: u32,
    pub cpu_access_flags: u32,
    pub misc_flags: u32,
}

/// `D3D11_TEXTURE3D_DESC`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Texture3dDesc {
    pub width: u32,
    pub height: u32,
    pub depth: u32,
    pub mip_levels: u32,
    pub format: u32,
    pub usage: u32,
    pub bind_flags: u32,
    pub cpu_access_flags: u32,
    pub misc_flags: u32,
}

pub fn format_from_dxgi(raw: u32) -> Format {
    match Format::from_raw(raw) {
        Format::L8Unorm | Format::L8A8Unorm | Format::L16Unorm | Format::Intz => Format::Unknown,
        format => format,
    }
}

/// DXGI format of `format`, 0 (`DXGI_FORMAT_UNKNOWN`) for formats only Direct3D 9 has.
pub fn format_to_dxgi(format: Format) -> u32 {
    match format {
        Format::L8Unorm => Format::R8Unorm as u32,
        Format::L8A8Unorm => Format::R8G8Unorm as u32,
        Format::L16Unorm => Format::R16Unorm as u32,
        Format::Intz => Format::R24G8Typeless as u32,
        format => format as u32,
    }
}

pub const fn heap_from_usage(usage: u32, cpu_access: u32) -> MemoryHeap {
    match usage {
        self::usage::DEFAULT | self::usage::IMMUTABLE => MemoryHeap::GpuOnly,
        self::usage::DYNAMIC => MemoryHeap::CpuToGpu,
        self::usage::STAGING if cpu_access & cpu::READ != 0 => MemoryHeap::GpuToCpu,
        self::usage::STAGING => MemoryHeap::CpuOnly,
        _ => MemoryHeap::Unknown,
    }
}

/// `D3D11_USAGE` and CPU access flags for `heap`.
pub const fn usage_from_heap(heap: MemoryHeap) -> (u32, u32) {
    match heap {
        MemoryHeap::Unknown | MemoryHeap::GpuOnly => (usage::DEFAULT, 0),
        MemoryHeap::CpuToGpu => (usage::DYNAMIC, cpu::WRITE),
        MemoryHeap::GpuToCpu => (usage::STAGING, cpu::READ),
        MemoryHeap::CpuOnly => (usage::STAGING, cpu::READ | cpu::WRITE),
    }
}

pub fn usage_from_bind(bind_flags: u32, misc_flags: u32) -> (ResourceUsage, ResourceFlags) {
    let mut usage = ResourceUsage::COPY_DEST | ResourceUsage::COPY_SOURCE;
    let mut flags = ResourceFlags::empty();

    let table = [
        (bind::VERTEX_BUFFER, ResourceUsage::VERTEX_BUFFER),
        (bind::INDEX_BUFFER, ResourceUsage::INDEX_BUFFER),
        (bind::CONSTANT_BUFFER, ResourceUsage::CONSTANT_BUFFER),
        (bind::SHADER_RESOURCE, ResourceUsage::SHADER_RESOURCE),
        (bind::STREAM_OUTPUT, ResourceUsage::STREAM_OUTPUT),
        (bind::RENDER_TARGET, ResourceUsage::RENDER_TARGET),
        (bind::DEPTH_STENCIL, ResourceUsage::DEPTH_STENCIL),
        (bind::UNORDERED_ACCESS, ResourceUsage::UNORDERED_ACCESS),
    ];
    for (bit, unified) in table {
        if bind_flags & bit != 0 {
            usage |= unified;
        }
    }
    if bind_flags & (bind::RENDER_TARGET | bind::DEPTH_STENCIL) != 0 {
        usage |= ResourceUsage::RESOLVE_SOURCE | ResourceUsage::RESOLVE_DEST;
    }

    if misc_flags & misc::GENERATE_MIPS != 0 {
        flags |= ResourceFlags::GENERATE_MIPMAPS;
    }
    if misc_flags & misc::SHARED != 0 {
        flags |= ResourceFlags::SHARED;
    }
    if misc_flags & misc::TEXTURECUBE != 0 {
        flags |= ResourceFlags::CUBE_COMPATIBLE;
    }
    if misc_flags & misc::DRAWINDIRECT_ARGS != 0 {
        usage |= ResourceUsage::INDIRECT_ARGUMENT;
    }
    if misc_flags & misc::BUFFER_STRUCTURED != 0 {
        flags |= ResourceFlags::STRUCTURED;
    }

    (usage, flags)
}

/// Bind and misc flags for `usage` and `flags`.
pub fn bind_from_usage(usage: ResourceUsage, flags: ResourceFlags) -> (u32, u32) {
    let mut bind_flags = 0;
    let mut misc_flags = 0;

    let table = [
        (ResourceUsage::VERTEX_BUFFER, bind::VERTEX_BUFFER),
        (ResourceUsage::INDEX_BUFFER, bind::INDEX_BUFFER),
        (ResourceUsage::CONSTANT_BUFFER, bind::CONSTANT_BUFFER),
        (ResourceUsage::SHADER_RESOURCE_PIXEL, bind::SHADER_RESOURCE),
        (ResourceUsage::SHADER_RESOURCE_NON_PIXEL, bind::SHADER_RESOURCE),
        (ResourceUsage::STREAM_OUTPUT, bind::STREAM_OUTPUT),
        (ResourceUsage::RENDER_TARGET, bind::RENDER_TARGET),
        (ResourceUsage::DEPTH_STENCIL_WRITE, bind::DEPTH_STENCIL),
        (ResourceUsage::DEPTH_STENCIL_READ, bind::DEPTH_STENCIL),
        (ResourceUsage::UNORDERED_ACCESS, bind::UNORDERED_ACCESS),
    ];
    for (unified, bit) in table {
        if usage.intersects(unified) {
            bind_flags |= bit;
        }
    }

    if usage.contains(ResourceUsage::INDIRECT_ARGUMENT) {
        misc_flags |= misc::DRAWINDIRECT_ARGS;
    }
    if flags.contains(ResourceFlags::GENERATE_MIPMAPS) {
        misc_flags |= misc::GENERATE_MIPS;
    }
    if flags.contains(ResourceFlags::SHARED) {
        misc_flags |= misc::SHARED;
    }
    if flags.contains(ResourceFlags::CUBE_COMPATIBLE) {
        misc_flags |= misc::TEXTURECUBE;
    }
    if flags.contains(ResourceFlags::STRUCTURED) {
        misc_flags |= misc::BUFFER_STRUCTURED;
    }

    (bind_flags, misc_flags)
}

fn flags_with_heap(mut flags: ResourceFlags, usage: u32) -> ResourceFlags {
    if usage == self::usage::DYNAMIC {
        flags |= ResourceFlags::DYNAMIC;
    }
    flags
}

pub fn buffer_to_desc(desc: &BufferDesc) -> ResourceDesc {
    let (usage, flags) = usage_from_bind(desc.bind_flags, desc.misc_flags);
    ResourceDesc {
        dimension: ResourceDimension::Buffer {
            size: desc.byte_width as u64,
            stride: desc.structure_byte_stride,
        },
        format: Format::Unknown,
        heap: heap_from_usage(desc.usage, desc.cpu_access_flags),
        usage,
        flags: flags_with_heap(flags, desc.usage),
    }
}

/// Writes `desc` into `native`. `false` when `desc` is not a buffer that fits.
pub fn apply_buffer_desc(desc: &ResourceDesc, native: &mut BufferDesc) -> bool {
    let ResourceDimension::Buffer { size, stride } = desc.dimension else {
        return false;
    };
    let Ok(byte_width) = u32::try_from(size) else {
        return false;
    };

    let (bind_flags, misc_flags) = bind_from_usage(desc.usage, desc.flags);
    let (usage, cpu_access_flags) = usage_from_heap(desc.heap);
    native.byte_width = byte_width;
    native.structure_byte_stride = stride;
    native.bind_flags = bind_flags;
    native.misc_flags = misc_flags | (native.misc_flags & misc::BUFFER_ALLOW_RAW_VIEWS);
    // Immutable buffers stay immutable, they can't be created any other way from their data
    if native.usage != self::usage::IMMUTABLE || desc.heap != MemoryHeap::GpuOnly {
        native.usage = usage;
        native.cpu_access_flags = cpu_access_flags;
    }
    true
}

pub fn texture_1d_to_desc(desc: &Texture1dDesc) -> ResourceDesc {
    let (usage, flags) = usage_from_bind(desc.bind_flags, desc.misc_flags);
    ResourceDesc {
        dimension: ResourceDimension::Texture1d {
            width: desc.width,
            layers: desc.array_size as u16,
            levels: desc.mip_levels as u16,
        },
        format: format_from_dxgi(desc.format),
        heap: heap_from_usage(desc.usage, desc.cpu_access_flags),
        usage,
        flags: flags_with_heap(flags, desc.usage),
    }
}

pub fn apply_texture_1d_desc(desc: &ResourceDesc, native: &mut Texture1dDesc) -> bool {
    let ResourceDimension::Texture1d { width, layers, levels } = desc.dimension else {
        return false;
    };

    let (bind_flags, misc_flags) = bind_from_usage(desc.usage, desc.flags);
    let (usage, cpu_access_flags) = usage_from_heap(desc.heap);
    *native = Texture1dDesc {
        width,
        mip_levels: levels as u32,
        array_size: layers as u32,
        format: format_to_dxgi(desc.format),
        usage: keep_immutable(native.usage, usage, desc.heap),
        bind_flags,
        cpu_access_flags,
        misc_flags,
    };
    true
}

pub fn texture_2d_to_desc(desc: &Texture2dDesc) -> ResourceDesc {
    let (usage, flags) = usage_from_bind(desc.bind_flags, desc.misc_flags);
    ResourceDesc {
        dimension: ResourceDimension::Texture2d {
            width: desc.width,
            height: desc.height,
            layers: desc.array_size as u16,
            levels: desc.mip_levels as u16,
            samples: desc.sample_count.max(1) as u16,
        },
        format: format_from_dxgi(desc.format),
        heap: heap_from_usage(desc.usage, desc.cpu_access_flags),
        usage,
        flags: flags_with_heap(flags, desc.usage),
    }
}

pub fn apply_texture_2d_desc(desc: &ResourceDesc, native: &mut Texture2dDesc) -> bool {
    let ResourceDimension::Texture2d {
        width,
        height,
        layers,
        levels,
        samples,
    } = desc.dimension
    else {
        return false;
    };

    let (bind_flags, misc_flags) = bind_from_usage(desc.usage, desc.flags);
    let (usage, cpu_access_flags) = usage_from_heap(desc.heap);
    let sample_quality = if samples as u32 == native.sample_count {
        native.sample_quality
    } else {
        0
    };
    *native = Texture2dDesc {
        width,
        height,
        mip_levels: levels as u32,
        array_size: layers as u32,
        format: format_to_dxgi(desc.format),
        sample_count: samples.max(1) as u32,
        sample_quality,
        usage: keep_immutable(native.usage, usage, desc.heap),
        bind_flags,
        cpu_access_flags,
        misc_flags,
    };
    true
}

pub fn texture_3d_to_desc(desc: &Texture3dDesc) -> ResourceDesc {
    let (usage, flags) = usage_from_bind(desc.bind_flags, desc.misc_flags);
    ResourceDesc {
        dimension: ResourceDimension::Texture3d {
            width: desc.width,
            height: desc.height,
            depth: desc.depth as u16,
            levels: desc.mip_levels as u16,
        },
        format: format_from_dxgi(desc.format),
        heap: heap_from_usage(desc.usage, desc.cpu_access_flags),
        usage,
        flags: flags_with_heap(flags, desc.usage),
    }
}

pub fn apply_texture_3d_desc(desc: &ResourceDesc, native: &mut Texture3dDesc) -> bool {
    let ResourceDimension::Texture3d {
        width,
        height,
        depth,
        levels,
    } = desc.dimension
    else {
        return false;
    };

    let (bind_flags, misc_flags) = bind_from_usage(desc.usage, desc.flags);
    let (usage, cpu_access_flags) = usage_from_heap(desc.heap);
    *native = Texture3dDesc {
        width,
        height,
        depth: depth as u32,
        mip_levels: levels as u32,
        format: format_to_dxgi(desc.format),
        usage: keep_immutable(native.usage, usage, desc.heap),
        bind_flags,
        cpu_access_flags,
        misc_flags,
    };
    true
}

const fn keep_immutable(native: u32, usage: u32, heap: MemoryHeap) -> u32 {
    if native == self::usage::IMMUTABLE && matches!(heap, MemoryHeap::GpuOnly) {
        native
    } else {
        usage
    }
}

/// Which of the four view interfaces a view description belongs to.
///
/// Every interface numbers its dimensions differently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ViewKind {
    ShaderResource,
    RenderTarget,
    DepthStencil,
    UnorderedAccess,
}

impl ViewKind {
    pub const fn usage(self) -> ResourceUsage {
        match self {
            Self::ShaderResource => ResourceUsage::SHADER_RESOURCE,
            Self::RenderTarget => ResourceUsage::RENDER_TARGET,
            Self::DepthStencil => ResourceUsage::DEPTH_STENCIL,
            Self::UnorderedAccess => ResourceUsage::UNORDERED_ACCESS,
        }
    }

    /// Kind creating a view for `usage`.
    pub fn from_usage(usage: ResourceUsage) -> Option<Self> {
        if usage.intersects(ResourceUsage::DEPTH_STENCIL) {
            Some(Self::DepthStencil)
        } else if usage.contains(ResourceUsage::RENDER_TARGET) {
            Some(Self::RenderTarget)
        } else if usage.contains(ResourceUsage::UNORDERED_ACCESS) {
            Some(Self::UnorderedAccess)
        } else if usage.intersects(ResourceUsage::SHADER_RESOURCE) {
            Some(Self::ShaderResource)
        } else {
            None
        }
    }

    /// Native dimension value of `ty`, `None` if the interface has no such dimension.
    pub const fn dimension(self, ty: ResourceViewType) -> Option<u32> {
        use ResourceViewType as T;

        let raw = match (self, ty) {
            (_, T::Unknown) => 0,
            (Self::DepthStencil, T::Buffer | T::Texture3d | T::TextureCube | T::TextureCubeArray) => {
                return None;
            }
            (Self::DepthStencil, T::Texture1d) => 1,
            (Self::DepthStencil, T::Texture1dArray) => 2,
            (Self::DepthStencil, T::Texture2d) => 3,
            (Self::DepthStencil, T::Texture2dArray) => 4,
            (Self::DepthStencil, T::Texture2dMultisample) => 5,
            (Self::DepthStencil, T::Texture2dMultisampleArray) => 6,
            (Self::UnorderedAccess, T::Texture2dMultisample | T::Texture2dMultisampleArray) => {
                return None;
            }
            (Self::RenderTarget | Self::UnorderedAccess, T::TextureCube | T::TextureCubeArray) => {
                return None;
            }
            (_, T::Buffer) => 1,
            (_, T::Texture1d) => 2,
            (_, T::Texture1dArray) => 3,
            (_, T::Texture2d) => 4,
            (_, T::Texture2dArray) => 5,
            (_, T::Texture2dMultisample) => 6,
            (_, T::Texture2dMultisampleArray) => 7,
            (_, T::Texture3d) => 8,
            (_, T::TextureCube) => 9,
            (_, T::TextureCubeArray) => 10,
        };
        Some(raw)
    }

    pub const fn view_type(self, dimension: u32) -> ResourceViewType {
        use ResourceViewType as T;

        match (self, dimension) {
            (Self::DepthStencil, 1) => T::Texture1d,
            (Self::DepthStencil, 2) => T::Texture1dArray,
            (Self::DepthStencil, 3) => T::Texture2d,
            (Self::DepthStencil, 4) => T::Texture2dArray,
            (Self::DepthStencil, 5) => T::Texture2dMultisample,
            (Self::DepthStencil, 6) => T::Texture2dMultisampleArray,
            (Self::DepthStencil, _) => T::Unknown,
            // D3D11_SRV_DIMENSION_BUFFEREX
            (Self::ShaderResource, 11) => T::Buffer,
            (_, 1) => T::Buffer,
            (_, 2) => T::Texture1d,
            (_, 3) => T::Texture1dArray,
            (_, 4) => T::Texture2d,
            (_, 5) => T::Texture2dArray,
            (_, 6) => T::Texture2dMultisample,
            (_, 7) => T::Texture2dMultisampleArray,
            (_, 8) => T::Texture3d,
            (Self::ShaderResource, 9) => T::TextureCube,
            (Self::ShaderResource, 10) => T::TextureCubeArray,
            _ => T::Unknown,
        }
    }
}

/// The union members of a view description flattened into one struct.
///
/// Buffer views count elements in `first`/`count`. Texture views put the first mip level
/// in `first` and the level count in `count`, which is 1 for render target, depth-stencil
/// and unordered access views. 3D unordered access and render target views address depth
/// slices through the layer fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ViewDesc {
    pub format: u32,
    pub dimension: u32,
    pub first: u32,
    pub count: u32,
    pub first_layer: u32,
    pub layers: u32,
}

impl ViewDesc {
    /// Reads the dimension union of a native description, given as its first four words.
    pub fn from_words(kind: ViewKind, format: u32, dimension: u32, words: [u32; 4]) -> Self {
        use ResourceViewType as T;

        let [a, b, c, d] = words;
        let (first, count, first_layer, layers) = match (kind.view_type(dimension), kind) {
            (T::Buffer, _) => (a, b, 0, 0),
            (T::Texture2dMultisample, _) => (0, 1, 0, 1),
            (T::Texture2dMultisampleArray, _) => (0, 1, a, b),
            (T::Texture1dArray | T::Texture2dArray, ViewKind::ShaderResource) => (a, b, c, d),
            (T::TextureCubeArray, _) => (a, b, c, d.saturating_mul(6)),
            (T::Texture1dArray | T::Texture2dArray | T::Texture3d, ViewKind::RenderTarget | ViewKind::UnorderedAccess) => {
                (a, 1, b, c)
            }
            (T::Texture1dArray | T::Texture2dArray, ViewKind::DepthStencil) => (a, 1, b, c),
            (_, ViewKind::ShaderResource) => (a, b, 0, 1),
            _ => (a, 1, 0, 1),
        };

        Self {
            format,
            dimension,
            first,
            count,
            first_layer,
            layers,
        }
    }

    /// Dimension union words of the native description.
    pub fn words(&self, kind: ViewKind) -> [u32; 4] {
        use ResourceViewType as T;

        match (kind.view_type(self.dimension), kind) {
            (T::Buffer, _) => [self.first, self.count, 0, 0],
            (T::Texture2dMultisample | T::Unknown, _) => [0; 4],
            (T::Texture2dMultisampleArray, _) => [self.first_layer, self.layers, 0, 0],
            (T::Texture1dArray | T::Texture2dArray, ViewKind::ShaderResource) => {
                [self.first, self.count, self.first_layer, self.layers]
            }
            (T::TextureCubeArray, _) => [self.first, self.count, self.first_layer, self.layers / 6],
            (T::Texture1dArray | T::Texture2dArray | T::Texture3d, ViewKind::RenderTarget | ViewKind::UnorderedAccess)
            | (T::Texture1dArray | T::Texture2dArray, ViewKind::DepthStencil) => {
                [self.first, self.first_layer, self.layers, 0]
            }
            (_, ViewKind::ShaderResource) => [self.first, self.count, 0, 0],
            _ => [self.first, 0, 0, 0],
        }
    }
}

/// Unified description of a view. `element_size` converts buffer elements to bytes.
pub fn view_to_desc(kind: ViewKind, native: &ViewDesc, element_size: u32) -> ResourceViewDesc {
    let ty = kind.view_type(native.dimension);
    let format = format_from_dxgi(native.format);
    let range = match ty {
        ResourceViewType::Buffer => ViewRange::Buffer {
            offset: native.first as u64 * element_size as u64,
            size: native.count as u64 * element_size as u64,
        },
        _ => ViewRange::Texture {
            first_level: native.first,
            levels: if kind == ViewKind::ShaderResource {
                native.count
            } else {
                1
            },
            first_layer: native.first_layer,
            layers: native.layers,
        },
    };

    ResourceViewDesc::new(ty, format, range)
}

/// Native description of `desc`, `None` if the view interface can't express it.
pub fn apply_view_desc(kind: ViewKind, desc: &ResourceViewDesc, element_size: u32) -> Option<ViewDesc> {
    let dimension = kind.dimension(desc.ty)?;
    let format = format_to_dxgi(desc.format);

    Some(match desc.range {
        ViewRange::Buffer { offset, size } => {
            let element_size = element_size.max(1) as u64;
            ViewDesc {
                format,
                dimension,
                first: u32::try_from(offset / element_size).ok()?,
                count: u32::try_from(size / element_size).ok()?,
                first_layer: 0,
                layers: 0,
            }
        }
        ViewRange::Texture {
            first_level,
            levels,
            first_layer,
            layers,
        } => ViewDesc {
            format,
            dimension,
            first: first_level,
            count: levels,
            first_layer,
            layers,
        },
    })
}

/// Size of one buffer view element. Structured buffers use their stride.
pub const fn element_size(format: Format, stride: u32) -> u32 {
    if stride != 0 {
        stride
    } else {
        match format.bytes_per_pixel() {
            0 => 4,
            size => size,
        }
    }
}

/// `D3D11_SAMPLER_DESC`
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct NativeSampler {
    pub filter: u32,
    pub address: [u32; 3],
    pub mip_lod_bias: f32,
    pub max_anisotropy: u32,
    pub comparison_func: u32,
    pub border_color: [f32; 4],
    pub min_lod: f32,
    pub max_lod: f32,
}

/// Filter, address and comparison values share their numbering with the unified enums.
pub fn sampler_to_desc(native: &NativeSampler) -> SamplerDesc {
    let address = |raw| TextureAddressMode::from_u32(raw).unwrap_or_default();
    SamplerDesc {
        filter: FilterMode::from_u32(native.filter).unwrap_or_default(),
        address_u: address(native.address[0]),
        address_v: address(native.address[1]),
        address_w: address(native.address[2]),
        mip_lod_bias: native.mip_lod_bias,
        max_anisotropy: native.max_anisotropy as f32,
        compare_op: CompareOp::from_u32(native.comparison_func).unwrap_or_default(),
        border_color: native.border_color,
        min_lod: native.min_lod,
        max_lod: native.max_lod,
    }
}

pub fn sampler_from_desc(desc: &SamplerDesc) -> NativeSampler {
    NativeSampler {
        filter: desc.filter as u32,
        address: [desc.address_u as u32, desc.address_v as u32, desc.address_w as u32],
        mip_lod_bias: desc.mip_lod_bias,
        max_anisotropy: desc.max_anisotropy.clamp(1.0, 16.0) as u32,
        comparison_func: desc.compare_op as u32,
        border_color: desc.border_color,
        min_lod: desc.min_lod,
        max_lod: desc.max_lod,
    }
}

pub const fn blend_factor_to_d3d(factor: BlendFactor) -> u32 {
    match factor {
        BlendFactor::Zero => 1,
        BlendFactor::One => 2,
        BlendFactor::SourceColor => 3,
        BlendFactor::OneMinusSourceColor => 4,
        BlendFactor::SourceAlpha => 5,
        BlendFactor::OneMinusSourceAlpha => 6,
        BlendFactor::DestAlpha => 7,
        BlendFactor::OneMinusDestAlpha => 8,
        BlendFactor::DestColor => 9,
        BlendFactor::OneMinusDestColor => 10,
        BlendFactor::SourceAlphaSaturate => 11,
        BlendFactor::ConstantColor | BlendFactor::ConstantAlpha => 14,
        BlendFactor::OneMinusConstantColor | BlendFactor::OneMinusConstantAlpha => 15,
        BlendFactor::Source1Color => 16,
        BlendFactor::OneMinusSource1Color => 17,
        BlendFactor::Source1Alpha => 18,
        BlendFactor::OneMinusSource1Alpha => 19,
    }
}

pub const fn blend_factor_from_d3d(raw: u32) -> BlendFactor {
    match raw {
        2 => BlendFactor::One,
        3 => BlendFactor::SourceColor,
        4 => BlendFactor::OneMinusSourceColor,
        5 => BlendFactor::SourceAlpha,
        6 => BlendFactor::OneMinusSourceAlpha,
        7 => BlendFactor::DestAlpha,
        8 => BlendFactor::OneMinusDestAlpha,
        9 => BlendFactor::DestColor,
        10 => BlendFactor::OneMinusDestColor,
        11 => BlendFactor::SourceAlphaSaturate,
        14 => BlendFactor::ConstantColor,
        15 => BlendFactor::OneMinusConstantColor,
        16 => BlendFactor::Source1Color,
        17 => BlendFactor::OneMinusSource1Color,
        18 => BlendFactor::Source1Alpha,
        19 => BlendFactor::OneMinusSource1Alpha,
        _ => BlendFactor::Zero,
    }
}

pub const fn blend_op_to_d3d(op: BlendOp) -> u32 {
    op as u32 + 1
}

pub const fn blend_op_from_d3d(raw: u32) -> BlendOp {
    match raw {
        2 => BlendOp::Subtract,
        3 => BlendOp::ReverseSubtract,
        4 => BlendOp::Min,
        5 => BlendOp::Max,
        _ => BlendOp::Add,
    }
}

pub const fn stencil_op_to_d3d(op: StencilOp) -> u32 {
    op as u32 + 1
}

pub const fn stencil_op_from_d3d(raw: u32) -> StencilOp {
    match raw {
        2 => StencilOp::Zero,
        3 => StencilOp::Replace,
        4 => StencilOp::IncrementSaturate,
        5 => StencilOp::DecrementSaturate,
        6 => StencilOp::Invert,
        7 => StencilOp::Increment,
        8 => StencilOp::Decrement,
        _ => StencilOp::Keep,
    }
}

pub fn compare_op_from_d3d(raw: u32) -> CompareOp {
    CompareOp::from_u32(raw).unwrap_or_default()
}

/// Points can't be rasterized as fill mode, they fall back to wireframe.
pub const fn fill_mode_to_d3d(mode: FillMode) -> u32 {
    match mode {
        FillMode::Solid => 3,
        FillMode::Wireframe | FillMode::Point => 2,
    }
}

pub const fn fill_mode_from_d3d(raw: u32) -> FillMode {
    match raw {
        2 => FillMode::Wireframe,
        _ => FillMode::Solid,
    }
}

/// Culling both faces is not expressible, it culls nothing.
pub const fn cull_mode_to_d3d(mode: CullMode) -> u32 {
    match mode {
        CullMode::None | CullMode::FrontAndBack => 1,
        CullMode::Front => 2,
        CullMode::Back => 3,
    }
}

pub const fn cull_mode_from_d3d(raw: u32) -> CullMode {
    match raw {
        1 => CullMode::None,
        2 => CullMode::Front,
        _ => CullMode::Back,
    }
}

/// `D3D11_PRIMITIVE_TOPOLOGY` shares its numbering with the unified values. Fans don't exist.
pub const fn topology_to_d3d(topology: PrimitiveTopology) -> u32 {
    match topology {
        PrimitiveTopology::TriangleFan => 0,
        topology => topology.to_raw(),
    }
}

pub const fn topology_from_d3d(raw: u32) -> PrimitiveTopology {
    match raw {
        6 => PrimitiveTopology::Undefined,
        raw => PrimitiveTopology::from_raw(raw),
    }
}

/// `D3D11_RENDER_TARGET_BLEND_DESC`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct NativeTargetBlend {
    pub blend_enable: bool,
    pub src_blend: u32,
    pub dest_blend: u32,
    pub blend_op: u32,
    pub src_blend_alpha: u32,
    pub dest_blend_alpha: u32,
    pub blend_op_alpha: u32,
    pub write_mask: u8,
}

/// `D3D11_BLEND_DESC`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct NativeBlend {
    pub alpha_to_coverage: bool,
    pub independent_blend: bool,
    pub targets: [NativeTargetBlend; MAX_RENDER_TARGETS],
}

/// Without independent blending every target uses the first target's state.
pub fn blend_to_desc(native: &NativeBlend) -> BlendDesc {
    let mut desc = BlendDesc {
        alpha_to_coverage_enable: native.alpha_to_coverage,
        ..Default::default()
    };

    for index in 0..MAX_RENDER_TARGETS {
        let target = if native.independent_blend {
            &native.targets[index]
        } else {
            &native.targets[0]
        };
        desc.blend_enable[index] = target.blend_enable;
        desc.source_color_blend_factor[index] = blend_factor_from_d3d(target.src_blend);
        desc.dest_color_blend_factor[index] = blend_factor_from_d3d(target.dest_blend);
        desc.color_blend_op[index] = blend_op_from_d3d(target.blend_op);
        desc.source_alpha_blend_factor[index] = blend_factor_from_d3d(target.src_blend_alpha);
        desc.dest_alpha_blend_factor[index] = blend_factor_from_d3d(target.dest_blend_alpha);
        desc.alpha_blend_op[index] = blend_op_from_d3d(target.blend_op_alpha);
        desc.render_target_write_mask[index] = target.write_mask;
    }

    desc
}

pub fn blend_from_desc(desc: &BlendDesc) -> NativeBlend {
    let mut native = NativeBlend {
        alpha_to_coverage: desc.alpha_to_coverage_enable,
        ..Default::default()
    };

    for (index, target) in native.targets.iter_mut().enumerate() {
        *target = NativeTargetBlend {
            blend_enable: desc.blend_enable[index],
            src_blend: blend_factor_to_d3d(desc.source_color_blend_factor[index]),
            dest_blend: blend_factor_to_d3d(desc.dest_color_blend_factor[index]),
            blend_op: blend_op_to_d3d(desc.color_blend_op[index]),
            src_blend_alpha: blend_factor_to_d3d(desc.source_alpha_blend_factor[index]),
            dest_blend_alpha: blend_factor_to_d3d(desc.dest_alpha_blend_factor[index]),
            blend_op_alpha: blend_op_to_d3d(desc.alpha_blend_op[index]),
            write_mask: desc.render_target_write_mask[index],
        };
    }
    native.independent_blend = native.targets.windows(2).any(|pair| pair[0] != pair[1]);

    native
}

/// `D3D11_RASTERIZER_DESC`
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct NativeRasterizer {
    pub fill_mode: u32,
    pub cull_mode: u32,
    pub front_counter_clockwise: bool,
    pub depth_bias: i32,
    pub depth_bias_clamp: f32,
    pub slope_scaled_depth_bias: f32,
    pub depth_clip_enable: bool,
    pub scissor_enable: bool,
    pub multisample_enable: bool,
    pub antialiased_line_enable: bool,
}

pub fn rasterizer_to_desc(native: &NativeRasterizer) -> RasterizerDesc {
    RasterizerDesc {
        fill_mode: fill_mode_from_d3d(native.fill_mode),
        cull_mode: cull_mode_from_d3d(native.cull_mode),
        front_counter_clockwise: native.front_counter_clockwise,
        depth_bias: native.depth_bias as f32,
        depth_bias_clamp: native.depth_bias_clamp,
        slope_scaled_depth_bias: native.slope_scaled_depth_bias,
        depth_clip_enable: native.depth_clip_enable,
        scissor_enable: native.scissor_enable,
        multisample_enable: native.multisample_enable,
        antialiased_line_enable: native.antialiased_line_enable,
    }
}

pub fn rasterizer_from_desc(desc: &RasterizerDesc) -> NativeRasterizer {
    NativeRasterizer {
        fill_mode: fill_mode_to_d3d(desc.fill_mode),
        cull_mode: cull_mode_to_d3d(desc.cull_mode),
        front_counter_clockwise: desc.front_counter_clockwise,
        depth_bias: desc.depth_bias as i32,
        depth_bias_clamp: desc.depth_bias_clamp,
        slope_scaled_depth_bias: desc.slope_scaled_depth_bias,
        depth_clip_enable: desc.depth_clip_enable,
        scissor_enable: desc.scissor_enable,
        multisample_enable: desc.multisample_enable,
        antialiased_line_enable: desc.antialiased_line_enable,
    }
}

/// `D3D11_DEPTH_STENCILOP_DESC`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct NativeStencilFace {
    pub fail_op: u32,
    pub depth_fail_op: u32,
    pub pass_op: u32,
    pub func: u32,
}

/// `D3D11_DEPTH_STENCIL_DESC`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct NativeDepthStencil {
    pub depth_enable: bool,
    pub depth_write: bool,
    pub depth_func: u32,
    pub stencil_enable: bool,
    pub stencil_read_mask: u8,
    pub stencil_write_mask: u8,
    pub front: NativeStencilFace,
    pub back: NativeStencilFace,
}

fn stencil_face_to_desc(native: &NativeStencilFace) -> StencilFace {
    StencilFace {
        fail_op: stencil_op_from_d3d(native.fail_op),
        depth_fail_op: stencil_op_from_d3d(native.depth_fail_op),
        pass_op: stencil_op_from_d3d(native.pass_op),
        func: compare_op_from_d3d(native.func),
    }
}

fn stencil_face_from_desc(face: &StencilFace) -> NativeStencilFace {
    NativeStencilFace {
        fail_op: stencil_op_to_d3d(face.fail_op),
        depth_fail_op: stencil_op_to_d3d(face.depth_fail_op),
        pass_op: stencil_op_to_d3d(face.pass_op),
        func: face.func as u32,
    }
}

/// The stencil reference is context state in Direct3D 11, the description leaves it at 0.
pub fn depth_stencil_to_desc(native: &NativeDepthStencil) -> DepthStencilDesc {
    DepthStencilDesc {
        depth_enable: native.depth_enable,
        depth_write_mask: native.depth_write,
        depth_func: compare_op_from_d3d(native.depth_func),
        stencil_enable: native.stencil_enable,
        stencil_read_mask: native.stencil_read_mask,
        stencil_write_mask: native.stencil_write_mask,
        stencil_reference_value: 0,
        front: stencil_face_to_desc(&native.front),
        back: stencil_face_to_desc(&native.back),
    }
}

pub fn depth_stencil_from_desc(desc: &DepthStencilDesc) -> NativeDepthStencil {
    NativeDepthStencil {
        depth_enable: desc.depth_enable,
        depth_write: desc.depth_write_mask,
        depth_func: desc.depth_func as u32,
        stencil_enable: desc.stencil_enable,
        stencil_read_mask: desc.stencil_read_mask,
        stencil_write_mask: desc.stencil_write_mask,
        front: stencil_face_from_desc(&desc.front),
        back: stencil_face_from_desc(&desc.back),
    }
}

/// `D3D11_INPUT_ELEMENT_DESC`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct NativeInputElement<'a> {
    pub semantic: &'a str,
    pub semantic_index: u32,
    pub format: u32,
    pub input_slot: u32,
    pub aligned_byte_offset: u32,
    pub input_slot_class: u32,
    pub instance_data_step_rate: u32,
}

/// Element strides live in `IASetVertexBuffers`, unified elements get 0.
pub fn input_elements_to_desc<'a>(native: &[NativeInputElement<'a>]) -> Vec<InputElement<'a>> {
    native
        .iter()
        .enumerate()
        .map(|(location, element)| InputElement {
            location: location as u32,
            semantic: element.semantic,
            semantic_index: element.semantic_index,
            format: format_from_dxgi(element.format),
            buffer_binding: element.input_slot,
            offset: element.aligned_byte_offset,
            stride: 0,
            instance_step_rate: if element.input_slot_class == INPUT_PER_INSTANCE_DATA {
                element.instance_data_step_rate.max(1)
            } else {
                0
            },
        })
        .collect()
}

pub fn input_elements_from_desc<'a>(elements: &[InputElement<'a>]) -> Vec<NativeInputElement<'a>> {
    elements
        .iter()
        .map(|element| NativeInputElement {
            semantic: element.semantic,
            semantic_index: element.semantic_index,
            format: format_to_dxgi(element.format),
            input_slot: element.buffer_binding,
            aligned_byte_offset: element.offset,
            input_slot_class: (element.instance_step_rate != 0) as u32,
            instance_data_step_rate: element.instance_step_rate,
        })
        .collect()
}

/// Subresource index of `level` in `layer`, `D3D11CalcSubresource`.
#[inline]
pub const fn subresource(level: u32, layer: u32, levels: u32) -> u32 {
    level + layer * levels
}

#[cfg(test)]
mod tests {
    use super::*;

    fn render_target() -> Texture2dDesc {
        Texture2dDesc {
            width: 1920,
            height: 1080,
            mip_levels: 1,
            array_size: 1,
            format: Format::R8G8B8A8Typeless as u32,
            sample_count: 4,
            sample_quality: 16,
            usage: usage::DEFAULT,
            bind_flags: bind::RENDER_TARGET | bind::SHADER_RESOURCE,
            cpu_access_flags: 0,
            misc_flags: 0,
        }
    }

    #[test]
    fn texture_2d_round_trip() {
        let native = render_target();
        let desc = texture_2d_to_desc(&native);
        assert_eq!(desc.format, Format::R8G8B8A8Typeless);
        assert_eq!(desc.heap, MemoryHeap::GpuOnly);
        assert!(desc.usage.contains(ResourceUsage::RENDER_TARGET | ResourceUsage::SHADER_RESOURCE));
        assert!(matches!(desc.dimension, ResourceDimension::Texture2d { samples: 4, .. }));

        let mut back = native;
        assert!(apply_texture_2d_desc(&desc, &mut back));
        assert_eq!(back, native);
    }

    #[test]
    fn sample_quality_resets_with_count() {
        let mut desc = texture_2d_to_desc(&render_target());
        desc.dimension = ResourceDimension::Texture2d {
            width: 1920,
            height: 1080,
            layers: 1,
            levels: 1,
            samples: 1,
        };

        let mut native = render_target();
        assert!(apply_texture_2d_desc(&desc, &mut native));
        assert_eq!((native.sample_count, native.sample_quality), (1, 0));
    }

    #[test]
    fn staging_heaps() {
        assert_eq!(heap_from_usage(usage::STAGING, cpu::READ), MemoryHeap::GpuToCpu);
        assert_eq!(heap_from_usage(usage::STAGING, cpu::WRITE), MemoryHeap::CpuOnly);
        assert_eq!(usage_from_heap(MemoryHeap::CpuToGpu), (usage::DYNAMIC, cpu::WRITE));
    }

    #[test]
    fn immutable_buffers_stay_immutable() {
        let mut native = BufferDesc {
            byte_width: 256,
            usage: usage::IMMUTABLE,
            bind_flags: bind::INDEX_BUFFER,
            ..Default::default()
        };
        let mut desc = buffer_to_desc(&native);
        desc.dimension = ResourceDimension::Buffer { size: 512, stride: 0 };

        assert!(apply_buffer_desc(&desc, &mut native));
        assert_eq!(native.byte_width, 512);
        assert_eq!(native.usage, usage::IMMUTABLE);
        assert_eq!(native.bind_flags, bind::INDEX_BUFFER);
    }

    #[test]
    fn oversized_buffer_is_rejected() {
        let desc = ResourceDesc::buffer(u64::from(u32::MAX) + 1, MemoryHeap::GpuOnly, ResourceUsage::VERTEX_BUFFER);
        assert!(!apply_buffer_desc(&desc, &mut BufferDesc::default()));
    }

    #[test]
    fn view_dimensions_per_interface() {
        assert_eq!(ViewKind::DepthStencil.dimension(ResourceViewType::Texture2d), Some(3));
        assert_eq!(ViewKind::RenderTarget.dimension(ResourceViewType::Texture2d), Some(4));
        assert_eq!(ViewKind::ShaderResource.dimension(ResourceViewType::TextureCube), Some(9));
        assert_eq!(ViewKind::RenderTarget.dimension(ResourceViewType::TextureCube), None);
        assert_eq!(ViewKind::DepthStencil.dimension(ResourceViewType::Texture3d), None);

        for kind in [ViewKind::ShaderResource, ViewKind::RenderTarget, ViewKind::DepthStencil] {
            let dimension = kind.dimension(ResourceViewType::Texture2dMultisample).unwrap();
            assert_eq!(kind.view_type(dimension), ResourceViewType::Texture2dMultisample);
        }
        assert_eq!(ViewKind::ShaderResource.view_type(11), ResourceViewType::Buffer);
    }

    #[test]
    fn buffer_views_count_elements() {
        let native = ViewDesc {
            format: Format::R32Float as u32,
            dimension: 1,
            first: 16,
            count: 64,
            ..Default::default()
        };
        let desc = view_to_desc(ViewKind::ShaderResource, &native, 4);
        assert_eq!(desc.range, ViewRange::Buffer { offset: 64, size: 256 });
        assert_eq!(apply_view_desc(ViewKind::ShaderResource, &desc, 4), Some(native));
    }

    #[test]
    fn structured_element_size() {
        assert_eq!(element_size(Format::Unknown, 48), 48);
        assert_eq!(element_size(Format::R16G16B16A16Float, 0), 8);
        assert_eq!(element_size(Format::Unknown, 0), 4);
    }

    #[test]
    fn d3d9_formats_have_no_dxgi_value() {
        assert_eq!(format_from_dxgi(Format::Intz as u32), Format::Unknown);
        assert_eq!(format_to_dxgi(Format::Intz), Format::R24G8Typeless as u32);
        assert_eq!(format_from_dxgi(Format::B8G8R8A8UnormSrgb as u32), Format::B8G8R8A8UnormSrgb);
    }

    #[test]
    fn blend_expands_shared_target_state() {
        let mut native = NativeBlend::default();
        native.targets[0] = NativeTargetBlend {
            blend_enable: true,
            src_blend: 5,
            dest_blend: 6,
            blend_op: 1,
            src_blend_alpha: 2,
            dest_blend_alpha: 1,
            blend_op_alpha: 1,
            write_mask: 0xf,
        };

        let desc = blend_to_desc(&native);
        assert!(desc.blend_enable.iter().all(|enabled| *enabled));
        assert_eq!(desc.source_color_blend_factor[7], BlendFactor::SourceAlpha);
        assert_eq!(desc.dest_color_blend_factor[3], BlendFactor::OneMinusSourceAlpha);

        let back = blend_from_desc(&desc);
        assert!(!back.independent_blend);
        assert_eq!(back.targets[0], native.targets[0]);
    }

    #[test]
    fn independent_blend_when_targets_differ() {
        let mut desc = BlendDesc::default();
        desc.blend_enable[1] = true;
        assert!(blend_from_desc(&desc).independent_blend);
    }

    #[test]
    fn rasterizer_and_depth_stencil_values() {
        let desc = RasterizerDesc {
            fill_mode: FillMode::Wireframe,
            cull_mode: CullMode::Front,
            depth_bias: 4.0,
            ..Default::default()
        };
        let native = rasterizer_from_desc(&desc);
        assert_eq!((native.fill_mode, native.cull_mode, native.depth_bias), (2, 2, 4));
        assert_eq!(rasterizer_to_desc(&native), desc);

        let desc = DepthStencilDesc {
            depth_func: CompareOp::GreaterEqual,
            front: StencilFace {
                pass_op: StencilOp::Replace,
                ..Default::default()
            },
            ..Default::default()
        };
        let native = depth_stencil_from_desc(&desc);
        assert_eq!(native.depth_func, 7);
        assert_eq!(native.front.pass_op, 3);
        assert_eq!(depth_stencil_to_desc(&native), desc);
    }

    #[test]
    fn instance_elements() {
        let native = [
            NativeInputElement {
                semantic: "POSITION",
                format: Format::R32G32B32Float as u32,
                ..Default::default()
            },
            NativeInputElement {
                semantic: "TEXCOORD",
                semantic_index: 1,
                format: Format::R32G32Float as u32,
                input_slot: 1,
                aligned_byte_offset: APPEND_ALIGNED_ELEMENT,
                input_slot_class: INPUT_PER_INSTANCE_DATA,
                instance_data_step_rate: 0,
            },
        ];

        let elements = input_elements_to_desc(&native);
        assert_eq!(elements[1].location, 1);
        assert_eq!(elements[1].instance_step_rate, 1);
        assert_eq!(elements[1].offset, APPEND_ALIGNED_ELEMENT);

        let back = input_elements_from_desc(&elements);
        assert_eq!(back[0], native[0]);
        assert_eq!(back[1].input_slot_class, INPUT_PER_INSTANCE_DATA);
        assert_eq!(back[1].instance_data_step_rate, 1);
    }

    #[test]
    fn fans_have_no_topology() {
        assert_eq!(topology_to_d3d(PrimitiveTopology::TriangleFan), 0);
        assert_eq!(topology_to_d3d(PrimitiveTopology::PatchList(3)), 35);
        assert_eq!(topology_from_d3d(4), PrimitiveTopology::TriangleList);
    }

    #[test]
    fn view_union_words() {
        // D3D11_TEX2D_ARRAY_RTV { MipSlice: 2, FirstArraySlice: 3, ArraySize: 4 }
        let rtv = ViewDesc::from_words(ViewKind::RenderTarget, 28, 5, [2, 3, 4, 0]);
        assert_eq!((rtv.first, rtv.count, rtv.first_layer, rtv.layers), (2, 1, 3, 4));
        assert_eq!(rtv.words(ViewKind::RenderTarget), [2, 3, 4, 0]);

        // D3D11_TEX2D_ARRAY_SRV { MostDetailedMip: 1, MipLevels: 5, FirstArraySlice: 0, ArraySize: 2 }
        let srv = ViewDesc::from_words(ViewKind::ShaderResource, 28, 5, [1, 5, 0, 2]);
        assert_eq!((srv.first, srv.count, srv.first_layer, srv.layers), (1, 5, 0, 2));
        assert_eq!(srv.words(ViewKind::ShaderResource), [1, 5, 0, 2]);

        let cubes = ViewDesc::from_words(ViewKind::ShaderResource, 28, 10, [0, 1, 6, 2]);
        assert_eq!(cubes.layers, 12);
        assert_eq!(cubes.words(ViewKind::ShaderResource), [0, 1, 6, 2]);

        let dsv = ViewDesc::from_words(ViewKind::DepthStencil, 45, 3, [1, 0, 0, 0]);
        assert_eq!((dsv.first, dsv.count), (1, 1));
        assert_eq!(dsv.words(ViewKind::DepthStencil), [1, 0, 0, 0]);

        let buffer = ViewDesc::from_words(ViewKind::UnorderedAccess, 0, 1, [4, 64, 0, 0]);
        assert_eq!(view_to_desc(ViewKind::UnorderedAccess, &buffer, 16).range, ViewRange::Buffer {
            offset: 64,
            size: 1024
        });
    }

    #[test]
    fn sampler_values_pass_through() {
        let desc = SamplerDesc {
            filter: FilterMode::Anisotropic,
            max_anisotropy: 8.0,
            address_u: TextureAddressMode::Wrap,
            ..Default::default()
        };
        let native = sampler_from_desc(&desc);
        assert_eq!(native.filter, 0x55);
        assert_eq!(native.address[0], 1);
        assert_eq!(native.max_anisotropy, 8);
        assert_eq!(sampler_to_desc(&native), desc);
    }
}
