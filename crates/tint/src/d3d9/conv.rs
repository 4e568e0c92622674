//! Direct3D 9 values and descriptions in and out of the unified model.
//!
//! Everything here works on plain numbers so the tables build and test on every platform.
//! The Windows device copies the native descriptions into the mirrors below.

use tint_api::{
    Format,
    pipeline::{
        BlendDesc, BlendFactor, BlendOp, CullMode, DepthStencilDesc, FillMode, InputElement,
        PipelineState, PrimitiveTopology, RasterizerDesc, StencilOp,
    },
    resource::{MemoryHeap, ResourceDesc, ResourceDimension, ResourceFlags, ResourceUsage},
    sampler::{CompareOp, SamplerDesc},
};

const fn fourcc(code: &[u8; 4]) -> u32 {
    u32::from_le_bytes(*code)
}

/// `D3DFORMAT` values.
pub mod fmt {
    use super::fourcc;

    pub const UNKNOWN: u32 = 0;
    pub const R8G8B8: u32 = 20;
    pub const A8R8G8B8: u32 = 21;
    pub const X8R8G8B8: u32 = 22;
    pub const R5G6B5: u32 = 23;
    pub const X1R5G5B5: u32 = 24;
    pub const A1R5G5B5: u32 = 25;
    pub const A4R4G4B4: u32 = 26;
    pub const A8: u32 = 28;
    pub const A2B10G10R10: u32 = 31;
    pub const A8B8G8R8: u32 = 32;
    pub const X8B8G8R8: u32 = 33;
    pub const G16R16: u32 = 34;
    pub const A2R10G10B10: u32 = 35;
    pub const A16B16G16R16: u32 = 36;
    pub const L8: u32 = 50;
    pub const A8L8: u32 = 51;
    pub const V8U8: u32 = 60;
    pub const Q8W8V8U8: u32 = 63;
    pub const V16U16: u32 = 64;
    pub const D16_LOCKABLE: u32 = 70;
    pub const D32: u32 = 71;
    pub const D24S8: u32 = 75;
    pub const D24X8: u32 = 77;
    pub const D16: u32 = 80;
    pub const L16: u32 = 81;
    pub const D32F_LOCKABLE: u32 = 82;
    pub const D24FS8: u32 = 83;
    pub const VERTEXDATA: u32 = 100;
    pub const INDEX16: u32 = 101;
    pub const INDEX32: u32 = 102;
    pub const Q16W16V16U16: u32 = 110;
    pub const R16F: u32 = 111;
    pub const G16R16F: u32 = 112;
    pub const A16B16G16R16F: u32 = 113;
    pub const R32F: u32 = 114;
    pub const G32R32F: u32 = 115;
    pub const A32B32G32R32F: u32 = 116;

    pub const DXT1: u32 = fourcc(b"DXT1");
    pub const DXT2: u32 = fourcc(b"DXT2");
    pub const DXT3: u32 = fourcc(b"DXT3");
    pub const DXT4: u32 = fourcc(b"DXT4");
    pub const DXT5: u32 = fourcc(b"DXT5");
    pub const ATI1: u32 = fourcc(b"ATI1");
    pub const ATI2: u32 = fourcc(b"ATI2");
    pub const INTZ: u32 = fourcc(b"INTZ");
    pub const NULL: u32 = fourcc(b"NULL");
}

/// `D3DRESOURCETYPE` values.
pub mod rtype {
    pub const SURFACE: u32 = 1;
    pub const VOLUME: u32 = 2;
    pub const TEXTURE: u32 = 3;
    pub const VOLUMETEXTURE: u32 = 4;
    pub const CUBETEXTURE: u32 = 5;
    pub const VERTEXBUFFER: u32 = 6;
    pub const INDEXBUFFER: u32 = 7;
}

/// `D3DUSAGE_*` bits.
pub mod usage {
    pub const RENDERTARGET: u32 = 0x1;
    pub const DEPTHSTENCIL: u32 = 0x2;
    pub const WRITEONLY: u32 = 0x8;
    pub const DYNAMIC: u32 = 0x200;
    pub const AUTOGENMIPMAP: u32 = 0x400;
}

/// `D3DPOOL` values.
pub mod pool {
    pub const DEFAULT: u32 = 0;
    pub const MANAGED: u32 = 1;
    pub const SYSTEMMEM: u32 = 2;
    pub const SCRATCH: u32 = 3;
}

/// `D3DRENDERSTATETYPE` values of the states the unified model knows.
pub mod rs {
    pub const ZENABLE: u32 = 7;
    pub const FILLMODE: u32 = 8;
    pub const ZWRITEENABLE: u32 = 14;
    pub const ALPHATESTENABLE: u32 = 15;
    pub const SRCBLEND: u32 = 19;
    pub const DESTBLEND: u32 = 20;
    pub const CULLMODE: u32 = 22;
    pub const ZFUNC: u32 = 23;
    pub const ALPHAREF: u32 = 24;
    pub const ALPHAFUNC: u32 = 25;
    pub const ALPHABLENDENABLE: u32 = 27;
    pub const STENCILENABLE: u32 = 52;
    pub const STENCILFAIL: u32 = 53;
    pub const STENCILZFAIL: u32 = 54;
    pub const STENCILPASS: u32 = 55;
    pub const STENCILFUNC: u32 = 56;
    pub const STENCILREF: u32 = 57;
    pub const STENCILMASK: u32 = 58;
    pub const STENCILWRITEMASK: u32 = 59;
    pub const CLIPPING: u32 = 136;
    pub const MULTISAMPLEANTIALIAS: u32 = 161;
    pub const MULTISAMPLEMASK: u32 = 162;
    pub const COLORWRITEENABLE: u32 = 168;
    pub const BLENDOP: u32 = 171;
    pub const SCISSORTESTENABLE: u32 = 174;
    pub const SLOPESCALEDEPTHBIAS: u32 = 175;
    pub const ANTIALIASEDLINEENABLE: u32 = 176;
    pub const TWOSIDEDSTENCILMODE: u32 = 185;
    pub const CCW_STENCILFAIL: u32 = 186;
    pub const CCW_STENCILZFAIL: u32 = 187;
    pub const CCW_STENCILPASS: u32 = 188;
    pub const CCW_STENCILFUNC: u32 = 189;
    pub const BLENDFACTOR: u32 = 193;
    pub const SRGBWRITEENABLE: u32 = 194;
    pub const DEPTHBIAS: u32 = 195;
    pub const SEPARATEALPHABLENDENABLE: u32 = 206;
    pub const SRCBLENDALPHA: u32 = 207;
    pub const DESTBLENDALPHA: u32 = 208;
    pub const BLENDOPALPHA: u32 = 209;

    pub const COLORWRITEENABLE1: u32 = 190;
    pub const COLORWRITEENABLE2: u32 = 191;
    pub const COLORWRITEENABLE3: u32 = 192;
}

macro_rules! assert_render_states {
    ($($state:ident == $rs:ident,)*) => {
        const _: () = assert!($(PipelineState::$state as u32 == rs::$rs)&&*);

        /// Every unified state that is also a D3D9 render state, with its `D3DRS_*` value.
        pub const RENDER_STATES: &[(PipelineState, u32)] = &[$((PipelineState::$state, rs::$rs),)*];
    };
}

// SetRenderState forwards state numbers as they are
assert_render_states! {
    DepthTest == ZENABLE,
    FillMode == FILLMODE,
    DepthWriteMask == ZWRITEENABLE,
    AlphaTest == ALPHATESTENABLE,
    SrcColorBlendFactor == SRCBLEND,
    DstColorBlendFactor == DESTBLEND,
    CullMode == CULLMODE,
    DepthFunc == ZFUNC,
    AlphaReferenceValue == ALPHAREF,
    AlphaFunc == ALPHAFUNC,
    BlendEnable == ALPHABLENDENABLE,
    StencilTest == STENCILENABLE,
    FrontStencilFail == STENCILFAIL,
    FrontStencilDepthFail == STENCILZFAIL,
    FrontStencilPass == STENCILPASS,
    FrontStencilFunc == STENCILFUNC,
    StencilReferenceValue == STENCILREF,
    StencilReadMask == STENCILMASK,
    StencilWriteMask == STENCILWRITEMASK,
    DepthClip == CLIPPING,
    Multisample == MULTISAMPLEANTIALIAS,
    SampleMask == MULTISAMPLEMASK,
    RenderTargetWriteMask == COLORWRITEENABLE,
    ColorBlendOp == BLENDOP,
    ScissorTest == SCISSORTESTENABLE,
    DepthBiasSlopeScaled == SLOPESCALEDEPTHBIAS,
    AntialiasedLine == ANTIALIASEDLINEENABLE,
    BackStencilFail == CCW_STENCILFAIL,
    BackStencilDepthFail == CCW_STENCILZFAIL,
    BackStencilPass == CCW_STENCILPASS,
    BackStencilFunc == CCW_STENCILFUNC,
    BlendConstant == BLENDFACTOR,
    SrgbWrite == SRGBWRITEENABLE,
    DepthBias == DEPTHBIAS,
    SrcAlphaBlendFactor == SRCBLENDALPHA,
    DstAlphaBlendFactor == DESTBLENDALPHA,
    AlphaBlendOp == BLENDOPALPHA,
}

/// `D3DSAMPLERSTATETYPE` values.
pub mod samp {
    pub const ADDRESSU: u32 = 1;
    pub const ADDRESSV: u32 = 2;
    pub const ADDRESSW: u32 = 3;
    pub const BORDERCOLOR: u32 = 4;
    pub const MAGFILTER: u32 = 5;
    pub const MINFILTER: u32 = 6;
    pub const MIPFILTER: u32 = 7;
    pub const MIPMAPLODBIAS: u32 = 8;
    pub const MAXMIPLEVEL: u32 = 9;
    pub const MAXANISOTROPY: u32 = 10;
    pub const SRGBTEXTURE: u32 = 11;
}

/// `D3DTEXTUREFILTERTYPE` values.
pub mod texf {
    pub const NONE: u32 = 0;
    pub const POINT: u32 = 1;
    pub const LINEAR: u32 = 2;
    pub const ANISOTROPIC: u32 = 3;
}

/// `D3DSURFACE_DESC`, also used for texture and cube texture levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SurfaceDesc {
    pub format: u32,
    pub ty: u32,
    pub usage: u32,
    pub pool: u32,
    pub multisample_type: u32,
    pub multisample_quality: u32,
    pub width: u32,
    pub height: u32,
}

/// `D3DVOLUME_DESC`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct VolumeDesc {
    pub format: u32,
    pub ty: u32,
    pub usage: u32,
    pub pool: u32,
    pub width: u32,
    pub height: u32,
    pub depth: u32,
}

/// `D3DVERTEXBUFFER_DESC`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct VertexBufferDesc {
    pub format: u32,
    pub ty: u32,
    pub usage: u32,
    pub pool: u32,
    pub size: u32,
    pub fvf: u32,
}

/// `D3DINDEXBUFFER_DESC`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct IndexBufferDesc {
    pub format: u32,
    pub ty: u32,
    pub usage: u32,
    pub pool: u32,
    pub size: u32,
}

pub fn format_from_d3d(raw: u32) -> Format {
    match raw {
        fmt::A8R8G8B8 => Format::B8G8R8A8Unorm,
        fmt::X8R8G8B8 | fmt::R8G8B8 => Format::B8G8R8X8Unorm,
        fmt::R5G6B5 => Format::B5G6R5Unorm,
        fmt::X1R5G5B5 | fmt::A1R5G5B5 => Format::B5G5R5A1Unorm,
        fmt::A4R4G4B4 => Format::B4G4R4A4Unorm,
        fmt::A8 => Format::A8Unorm,
        fmt::A2B10G10R10 | fmt::A2R10G10B10 => Format::R10G10B10A2Unorm,
        fmt::A8B8G8R8 | fmt::X8B8G8R8 => Format::R8G8B8A8Unorm,
        fmt::G16R16 => Format::R16G16Unorm,
        fmt::A16B16G16R16 => Format::R16G16B16A16Unorm,
        fmt::L8 => Format::L8Unorm,
        fmt::A8L8 => Format::L8A8Unorm,
        fmt::L16 => Format::L16Unorm,
        fmt::V8U8 => Format::R8G8Snorm,
        fmt::Q8W8V8U8 => Format::R8G8B8A8Snorm,
        fmt::V16U16 => Format::R16G16Snorm,
        fmt::Q16W16V16U16 => Format::R16G16B16A16Snorm,
        fmt::D16 | fmt::D16_LOCKABLE => Format::D16Unorm,
        fmt::D24S8 | fmt::D24X8 | fmt::D24FS8 => Format::D24UnormS8Uint,
        fmt::D32 | fmt::D32F_LOCKABLE => Format::D32Float,
        fmt::INTZ => Format::Intz,
        fmt::R16F => Format::R16Float,
        fmt::G16R16F => Format::R16G16Float,
        fmt::A16B16G16R16F => Format::R16G16B16A16Float,
        fmt::R32F => Format::R32Float,
        fmt::G32R32F => Format::R32G32Float,
        fmt::A32B32G32R32F => Format::R32G32B32A32Float,
        fmt::DXT1 => Format::Bc1Unorm,
        fmt::DXT2 | fmt::DXT3 => Format::Bc2Unorm,
        fmt::DXT4 | fmt::DXT5 => Format::Bc3Unorm,
        fmt::ATI1 => Format::Bc4Unorm,
        fmt::ATI2 => Format::Bc5Unorm,
        fmt::INDEX16 => Format::R16Uint,
        fmt::INDEX32 => Format::R32Uint,
        _ => Format::Unknown,
    }
}

/// Native format of `format`, [`fmt::UNKNOWN`] when D3D9 has no equivalent.
///
/// sRGB is a sampler and render state in D3D9, so sRGB variants map to their linear format.
pub fn format_to_d3d(format: Format, lockable: bool) -> u32 {
    match format {
        Format::B8G8R8A8Typeless | Format::B8G8R8A8Unorm | Format::B8G8R8A8UnormSrgb => {
            fmt::A8R8G8B8
        }
        Format::B8G8R8X8Typeless | Format::B8G8R8X8Unorm | Format::B8G8R8X8UnormSrgb => {
            fmt::X8R8G8B8
        }
        Format::R8G8B8A8Typeless | Format::R8G8B8A8Unorm | Format::R8G8B8A8UnormSrgb => {
            fmt::A8B8G8R8
        }
        Format::B5G6R5Unorm => fmt::R5G6B5,
        Format::B5G5R5A1Unorm => fmt::A1R5G5B5,
        Format::B4G4R4A4Unorm => fmt::A4R4G4B4,
        Format::A8Unorm => fmt::A8,
        Format::R10G10B10A2Typeless | Format::R10G10B10A2Unorm => fmt::A2B10G10R10,
        Format::R16G16Typeless | Format::R16G16Unorm => fmt::G16R16,
        Format::R16G16B16A16Typeless | Format::R16G16B16A16Unorm => fmt::A16B16G16R16,
        Format::L8Unorm => fmt::L8,
        Format::L8A8Unorm => fmt::A8L8,
        Format::L16Unorm => fmt::L16,
        Format::R8G8Snorm => fmt::V8U8,
        Format::R8G8B8A8Snorm => fmt::Q8W8V8U8,
        Format::R16G16Snorm => fmt::V16U16,
        Format::R16G16B16A16Snorm => fmt::Q16W16V16U16,
        Format::D16Unorm if lockable => fmt::D16_LOCKABLE,
        Format::D16Unorm => fmt::D16,
        Format::R24G8Typeless | Format::D24UnormS8Uint => fmt::D24S8,
        Format::D32Float => fmt::D32F_LOCKABLE,
        Format::Intz => fmt::INTZ,
        Format::R16Float => fmt::R16F,
        Format::R16G16Float => fmt::G16R16F,
        Format::R16G16B16A16Float => fmt::A16B16G16R16F,
        Format::R32Float => fmt::R32F,
        Format::R32G32Float => fmt::G32R32F,
        Format::R32G32B32A32Float => fmt::A32B32G32R32F,
        Format::Bc1Typeless | Format::Bc1Unorm | Format::Bc1UnormSrgb => fmt::DXT1,
        Format::Bc2Typeless | Format::Bc2Unorm | Format::Bc2UnormSrgb => fmt::DXT3,
        Format::Bc3Typeless | Format::Bc3Unorm | Format::Bc3UnormSrgb => fmt::DXT5,
        Format::Bc4Typeless | Format::Bc4Unorm => fmt::ATI1,
        Format::Bc5Typeless | Format::Bc5Unorm => fmt::ATI2,
        Format::R16Uint => fmt::INDEX16,
        Format::R32Uint => fmt::INDEX32,
        _ => fmt::UNKNOWN,
    }
}

pub const fn heap_from_pool(raw: u32) -> MemoryHeap {
    match raw {
        pool::DEFAULT => MemoryHeap::GpuOnly,
        pool::MANAGED => MemoryHeap::CpuToGpu,
        pool::SYSTEMMEM => MemoryHeap::GpuToCpu,
        pool::SCRATCH => MemoryHeap::CpuOnly,
        _ => MemoryHeap::Unknown,
    }
}

/// Pool for `heap`. Attachments and dynamic resources always live in the default pool.
pub fn pool_from_heap(heap: MemoryHeap, usage: ResourceUsage, flags: ResourceFlags) -> u32 {
    let pool = match heap {
        MemoryHeap::Unknown | MemoryHeap::GpuOnly => pool::DEFAULT,
        MemoryHeap::CpuToGpu => pool::MANAGED,
        MemoryHeap::GpuToCpu => pool::SYSTEMMEM,
        MemoryHeap::CpuOnly => pool::SCRATCH,
    };

    let attachment = usage.intersects(ResourceUsage::RENDER_TARGET | ResourceUsage::DEPTH_STENCIL);
    if pool == pool::MANAGED && (attachment || flags.contains(ResourceFlags::DYNAMIC)) {
        pool::DEFAULT
    } else {
        pool
    }
}

pub fn usage_from_d3d(raw: u32) -> (ResourceUsage, ResourceFlags) {
    let mut usage = ResourceUsage::empty();
    let mut flags = ResourceFlags::empty();

    if raw & self::usage::RENDERTARGET != 0 {
        usage |= ResourceUsage::RENDER_TARGET | ResourceUsage::COPY_SOURCE | ResourceUsage::RESOLVE_SOURCE;
    }
    if raw & self::usage::DEPTHSTENCIL != 0 {
        usage |= ResourceUsage::DEPTH_STENCIL;
    }
    if raw & self::usage::DYNAMIC != 0 {
        flags |= ResourceFlags::DYNAMIC;
    }
    if raw & self::usage::AUTOGENMIPMAP != 0 {
        flags |= ResourceFlags::GENERATE_MIPMAPS;
    }

    (usage, flags)
}

pub fn usage_to_d3d(usage: ResourceUsage, flags: ResourceFlags) -> u32 {
    let mut raw = 0;

    if usage.contains(ResourceUsage::RENDER_TARGET) {
        raw |= self::usage::RENDERTARGET;
    }
    if usage.intersects(ResourceUsage::DEPTH_STENCIL) {
        raw |= self::usage::DEPTHSTENCIL;
    }
    if flags.contains(ResourceFlags::DYNAMIC) {
        raw |= self::usage::DYNAMIC;
    }
    if flags.contains(ResourceFlags::GENERATE_MIPMAPS) {
        raw |= self::usage::AUTOGENMIPMAP;
    }

    raw
}

const MANAGED_USAGE: u32 = usage::RENDERTARGET | usage::DEPTHSTENCIL | usage::DYNAMIC | usage::AUTOGENMIPMAP;

/// Unified description of a surface, texture or cube texture with `levels` mip levels.
pub fn surface_to_desc(desc: &SurfaceDesc, levels: u32) -> ResourceDesc {
    let (mut usage, mut flags) = usage_from_d3d(desc.usage);
    if desc.pool == pool::DEFAULT {
        usage |= ResourceUsage::COPY_DEST;
    }

    let (layers, levels) = match desc.ty {
        rtype::TEXTURE => {
            usage |= ResourceUsage::SHADER_RESOURCE;
            (1, levels)
        }
        rtype::CUBETEXTURE => {
            usage |= ResourceUsage::SHADER_RESOURCE;
            flags |= ResourceFlags::CUBE_COMPATIBLE;
            (6, levels)
        }
        _ => (1, 1),
    };

    ResourceDesc {
        dimension: ResourceDimension::Texture2d {
            width: desc.width,
            height: desc.height,
            layers,
            levels: levels.max(1) as u16,
            samples: if desc.multisample_type >= 2 {
                desc.multisample_type as u16
            } else {
                1
            },
        },
        format: format_from_d3d(desc.format),
        heap: heap_from_pool(desc.pool),
        usage,
        flags,
    }
}

/// Writes `desc` into `native`, keeping its resource type. Returns the level count.
///
/// `None` when `desc` is not a 2D texture or its format has no D3D9 equivalent.
pub fn apply_surface_desc(desc: &ResourceDesc, native: &mut SurfaceDesc) -> Option<u32> {
    let ResourceDimension::Texture2d {
        width,
        height,
        layers,
        levels,
        samples,
    } = desc.dimension
    else {
        return None;
    };
    if (native.ty == rtype::CUBETEXTURE) != (layers == 6) && layers != 1 {
        return None;
    }

    let format = format_to_d3d(desc.format, native.format == fmt::D16_LOCKABLE);
    if format == fmt::UNKNOWN {
        return None;
    }

    native.format = format;
    native.width = width;
    native.height = height;
    native.usage = usage_to_d3d(desc.usage, desc.flags) | (native.usage & !MANAGED_USAGE);
    native.pool = pool_from_heap(desc.heap, desc.usage, desc.flags);
    if samples > 1 {
        native.multisample_type = samples as u32;
    } else {
        native.multisample_type = 0;
        native.multisample_quality = 0;
    }

    Some(levels as u32)
}

pub fn volume_to_desc(desc: &VolumeDesc, levels: u32) -> ResourceDesc {
    let (mut usage, flags) = usage_from_d3d(desc.usage);
    usage |= ResourceUsage::SHADER_RESOURCE;
    if desc.pool == pool::DEFAULT {
        usage |= ResourceUsage::COPY_DEST;
    }

    ResourceDesc {
        dimension: ResourceDimension::Texture3d {
            width: desc.width,
            height: desc.height,
            depth: desc.depth as u16,
            levels: levels.max(1) as u16,
        },
        format: format_from_d3d(desc.format),
        heap: heap_from_pool(desc.pool),
        usage,
        flags,
    }
}

pub fn apply_volume_desc(desc: &ResourceDesc, native: &mut VolumeDesc) -> Option<u32> {
    let ResourceDimension::Texture3d {
        width,
        height,
        depth,
        levels,
    } = desc.dimension
    else {
        return None;
    };

    let format = format_to_d3d(desc.format, false);
    if format == fmt::UNKNOWN {
        return None;
    }

    native.format = format;
    native.width = width;
    native.height = height;
    native.depth = depth as u32;
    native.usage = usage_to_d3d(desc.usage, desc.flags) | (native.usage & !MANAGED_USAGE);
    native.pool = pool_from_heap(desc.heap, desc.usage, desc.flags);

    Some(levels as u32)
}

pub fn vertex_buffer_to_desc(desc: &VertexBufferDesc) -> ResourceDesc {
    let (usage, flags) = usage_from_d3d(desc.usage);

    ResourceDesc {
        dimension: ResourceDimension::Buffer {
            size: desc.size as u64,
            stride: 0,
        },
        format: Format::Unknown,
        heap: heap_from_pool(desc.pool),
        usage: usage | ResourceUsage::VERTEX_BUFFER,
        flags,
    }
}

pub fn apply_vertex_buffer_desc(desc: &ResourceDesc, native: &mut VertexBufferDesc) -> bool {
    let ResourceDimension::Buffer { size, .. } = desc.dimension else {
        return false;
    };
    let Ok(size) = u32::try_from(size) else {
        return false;
    };

    native.size = size;
    native.usage = usage_to_d3d(desc.usage, desc.flags) | (native.usage & !MANAGED_USAGE);
    native.pool = pool_from_heap(desc.heap, desc.usage, desc.flags);
    true
}

pub fn index_buffer_to_desc(desc: &IndexBufferDesc) -> ResourceDesc {
    let (usage, flags) = usage_from_d3d(desc.usage);

    ResourceDesc {
        dimension: ResourceDimension::Buffer {
            size: desc.size as u64,
            stride: 0,
        },
        format: if desc.format == fmt::INDEX32 {
            Format::R32Uint
        } else {
            Format::R16Uint
        },
        heap: heap_from_pool(desc.pool),
        usage: usage | ResourceUsage::INDEX_BUFFER,
        flags,
    }
}

pub fn apply_index_buffer_desc(desc: &ResourceDesc, native: &mut IndexBufferDesc) -> bool {
    let ResourceDimension::Buffer { size, .. } = desc.dimension else {
        return false;
    };
    let Ok(size) = u32::try_from(size) else {
        return false;
    };

    native.size = size;
    native.format = match desc.format {
        Format::R32Uint => fmt::INDEX32,
        Format::R16Uint => fmt::INDEX16,
        _ => native.format,
    };
    native.usage = usage_to_d3d(desc.usage, desc.flags) | (native.usage & !MANAGED_USAGE);
    native.pool = pool_from_heap(desc.heap, desc.usage, desc.flags);
    true
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
        BlendFactor::Source1Color | BlendFactor::Source1Alpha => 16,
        BlendFactor::OneMinusSource1Color | BlendFactor::OneMinusSource1Alpha => 17,
    }
}

pub const fn blend_factor_from_d3d(raw: u32) -> BlendFactor {
    match raw {
        2 => BlendFactor::One,
        3 => BlendFactor::SourceColor,
        4 => BlendFactor::OneMinusSourceColor,
        5 | 12 => BlendFactor::SourceAlpha,
        6 | 13 => BlendFactor::OneMinusSourceAlpha,
        7 => BlendFactor::DestAlpha,
        8 => BlendFactor::OneMinusDestAlpha,
        9 => BlendFactor::DestColor,
        10 => BlendFactor::OneMinusDestColor,
        11 => BlendFactor::SourceAlphaSaturate,
        14 => BlendFactor::ConstantColor,
        15 => BlendFactor::OneMinusConstantColor,
        16 => BlendFactor::Source1Color,
        17 => BlendFactor::OneMinusSource1Color,
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

/// `D3DCMPFUNC` shares the numbering of [`CompareOp`].
pub const fn compare_op_to_d3d(op: CompareOp) -> u32 {
    op as u32
}

pub const fn compare_op_from_d3d(raw: u32) -> CompareOp {
    match raw {
        1 => CompareOp::Never,
        2 => CompareOp::Less,
        3 => CompareOp::Equal,
        4 => CompareOp::LessEqual,
        5 => CompareOp::Greater,
        6 => CompareOp::NotEqual,
        7 => CompareOp::GreaterEqual,
        _ => CompareOp::Always,
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

pub const fn fill_mode_to_d3d(mode: FillMode) -> u32 {
    match mode {
        FillMode::Point => 1,
        FillMode::Wireframe => 2,
        FillMode::Solid => 3,
    }
}

pub const fn fill_mode_from_d3d(raw: u32) -> FillMode {
    match raw {
        1 => FillMode::Point,
        2 => FillMode::Wireframe,
        _ => FillMode::Solid,
    }
}

/// D3D9 culls by winding, so the face to cull depends on which winding is front facing.
pub const fn cull_mode_to_d3d(mode: CullMode, front_counter_clockwise: bool) -> u32 {
    const NONE: u32 = 1;
    const CW: u32 = 2;
    const CCW: u32 = 3;

    match (mode, front_counter_clockwise) {
        (CullMode::Back, false) | (CullMode::Front, true) => CCW,
        (CullMode::Back, true) | (CullMode::Front, false) => CW,
        (CullMode::None | CullMode::FrontAndBack, _) => NONE,
    }
}

/// Cull mode with clockwise front faces, the D3D9 convention.
pub const fn cull_mode_from_d3d(raw: u32) -> CullMode {
    match raw {
        2 => CullMode::Front,
        3 => CullMode::Back,
        _ => CullMode::None,
    }
}

/// `D3DPRIMITIVETYPE` shares the numbering of [`PrimitiveTopology`] up to triangle fans.
pub const fn topology_to_d3d(topology: PrimitiveTopology) -> u32 {
    match topology.to_raw() {
        raw @ 1..=6 => raw,
        _ => 0,
    }
}

pub const fn topology_from_d3d(raw: u32) -> PrimitiveTopology {
    match raw {
        1..=6 => PrimitiveTopology::from_raw(raw),
        _ => PrimitiveTopology::Undefined,
    }
}

/// Vertices consumed by `primitives` primitives of type `prim_type`.
pub const fn vertex_count(prim_type: u32, primitives: u32) -> u32 {
    match topology_from_d3d(prim_type) {
        PrimitiveTopology::PointList => primitives,
        PrimitiveTopology::LineList => primitives * 2,
        PrimitiveTopology::LineStrip => primitives + 1,
        PrimitiveTopology::TriangleList => primitives * 3,
        PrimitiveTopology::TriangleStrip | PrimitiveTopology::TriangleFan => primitives + 2,
        _ => 0,
    }
}

/// Whole primitives formed by `vertices` vertices of type `prim_type`.
pub const fn primitive_count(prim_type: u32, vertices: u32) -> u32 {
    match topology_from_d3d(prim_type) {
        PrimitiveTopology::PointList => vertices,
        PrimitiveTopology::LineList => vertices / 2,
        PrimitiveTopology::LineStrip => vertices.saturating_sub(1),
        PrimitiveTopology::TriangleList => vertices / 3,
        PrimitiveTopology::TriangleStrip | PrimitiveTopology::TriangleFan => {
            vertices.saturating_sub(2)
        }
        _ => 0,
    }
}

/// `D3DCOLOR` (ARGB) as normalized RGBA.
pub fn color_to_rgba(color: u32) -> [f32; 4] {
    let channel = |shift: u32| ((color >> shift) & 0xff) as f32 / 255.0;
    [channel(16), channel(8), channel(0), channel(24)]
}

pub fn rgba_to_color(rgba: &[f32; 4]) -> u32 {
    let channel = |value: f32| (value.clamp(0.0, 1.0) * 255.0).round() as u32;
    channel(rgba[3]) << 24 | channel(rgba[0]) << 16 | channel(rgba[1]) << 8 | channel(rgba[2])
}

/// Sampler states setting up one stage the way `desc` describes.
pub fn sampler_states(desc: &SamplerDesc) -> [(u32, u32); 10] {
    let filter = desc.filter;
    let pick = |linear: bool| {
        if filter.is_anisotropic() {
            texf::ANISOTROPIC
        } else if linear {
            texf::LINEAR
        } else {
            texf::POINT
        }
    };

    [
        (samp::ADDRESSU, desc.address_u as u32),
        (samp::ADDRESSV, desc.address_v as u32),
        (samp::ADDRESSW, desc.address_w as u32),
        (samp::BORDERCOLOR, rgba_to_color(&desc.border_color)),
        (samp::MAGFILTER, pick(filter.mag_linear())),
        (samp::MINFILTER, pick(filter.min_linear())),
        (
            samp::MIPFILTER,
            if filter.mip_linear() {
                texf::LINEAR
            } else {
                texf::POINT
            },
        ),
        (samp::MIPMAPLODBIAS, desc.mip_lod_bias.to_bits()),
        (samp::MAXMIPLEVEL, desc.min_lod.max(0.0) as u32),
        (samp::MAXANISOTROPY, desc.max_anisotropy.max(1.0) as u32),
    ]
}

/// Render states applying `desc` to the output merger. D3D9 blends every render target alike.
pub fn blend_states(desc: &BlendDesc) -> Vec<(u32, u32)> {
    let separate_alpha = desc.source_alpha_blend_factor[0] != desc.source_color_blend_factor[0]
        || desc.dest_alpha_blend_factor[0] != desc.dest_color_blend_factor[0]
        || desc.alpha_blend_op[0] != desc.color_blend_op[0];

    vec![
        (rs::ALPHABLENDENABLE, desc.blend_enable[0] as u32),
        (rs::SRCBLEND, blend_factor_to_d3d(desc.source_color_blend_factor[0])),
        (rs::DESTBLEND, blend_factor_to_d3d(desc.dest_color_blend_factor[0])),
        (rs::BLENDOP, blend_op_to_d3d(desc.color_blend_op[0])),
        (rs::SEPARATEALPHABLENDENABLE, separate_alpha as u32),
        (rs::SRCBLENDALPHA, blend_factor_to_d3d(desc.source_alpha_blend_factor[0])),
        (rs::DESTBLENDALPHA, blend_factor_to_d3d(desc.dest_alpha_blend_factor[0])),
        (rs::BLENDOPALPHA, blend_op_to_d3d(desc.alpha_blend_op[0])),
        (rs::BLENDFACTOR, rgba8_to_color(desc.blend_constant)),
        (rs::COLORWRITEENABLE, desc.render_target_write_mask[0] as u32),
        (rs::COLORWRITEENABLE1, desc.render_target_write_mask[1] as u32),
        (rs::COLORWRITEENABLE2, desc.render_target_write_mask[2] as u32),
        (rs::COLORWRITEENABLE3, desc.render_target_write_mask[3] as u32),
    ]
}

pub fn rasterizer_states(desc: &RasterizerDesc) -> Vec<(u32, u32)> {
    vec![
        (rs::FILLMODE, fill_mode_to_d3d(desc.fill_mode)),
        (
            rs::CULLMODE,
            cull_mode_to_d3d(desc.cull_mode, desc.front_counter_clockwise),
        ),
        (rs::DEPTHBIAS, desc.depth_bias.to_bits()),
        (rs::SLOPESCALEDEPTHBIAS, desc.slope_scaled_depth_bias.to_bits()),
        (rs::CLIPPING, desc.depth_clip_enable as u32),
        (rs::SCISSORTESTENABLE, desc.scissor_enable as u32),
        (rs::MULTISAMPLEANTIALIAS, desc.multisample_enable as u32),
        (rs::ANTIALIASEDLINEENABLE, desc.antialiased_line_enable as u32),
    ]
}

pub fn depth_stencil_states(desc: &DepthStencilDesc) -> Vec<(u32, u32)> {
    vec![
        (rs::ZENABLE, desc.depth_enable as u32),
        (rs::ZWRITEENABLE, desc.depth_write_mask as u32),
        (rs::ZFUNC, compare_op_to_d3d(desc.depth_func)),
        (rs::STENCILENABLE, desc.stencil_enable as u32),
        (rs::STENCILMASK, desc.stencil_read_mask as u32),
        (rs::STENCILWRITEMASK, desc.stencil_write_mask as u32),
        (rs::STENCILREF, desc.stencil_reference_value as u32),
        (rs::STENCILFAIL, stencil_op_to_d3d(desc.front.fail_op)),
        (rs::STENCILZFAIL, stencil_op_to_d3d(desc.front.depth_fail_op)),
        (rs::STENCILPASS, stencil_op_to_d3d(desc.front.pass_op)),
        (rs::STENCILFUNC, compare_op_to_d3d(desc.front.func)),
        (rs::TWOSIDEDSTENCILMODE, (desc.front != desc.back) as u32),
        (rs::CCW_STENCILFAIL, stencil_op_to_d3d(desc.back.fail_op)),
        (rs::CCW_STENCILZFAIL, stencil_op_to_d3d(desc.back.depth_fail_op)),
        (rs::CCW_STENCILPASS, stencil_op_to_d3d(desc.back.pass_op)),
        (rs::CCW_STENCILFUNC, compare_op_to_d3d(desc.back.func)),
    ]
}

/// Packed RGBA8 as a `D3DCOLOR`.
pub const fn rgba8_to_color(rgba: u32) -> u32 {
    let [r, g, b, a] = rgba.to_le_bytes();
    u32::from_be_bytes([a, r, g, b])
}

/// `D3DVERTEXELEMENT9`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct VertexElement {
    pub stream: u16,
    pub offset: u16,
    pub ty: u8,
    pub method: u8,
    pub usage: u8,
    pub usage_index: u8,
}

impl VertexElement {
    /// `D3DDECL_END()`
    pub const END: Self = Self {
        stream: 0xff,
        offset: 0,
        ty: DECLTYPE_UNUSED,
        method: 0,
        usage: 0,
        usage_index: 0,
    };
}

const DECLTYPE_UNUSED: u8 = 17;

const DECL_TYPES: &[(u8, Format)] = &[
    (0, Format::R32Float),
    (1, Format::R32G32Float),
    (2, Format::R32G32B32Float),
    (3, Format::R32G32B32A32Float),
    (4, Format::B8G8R8A8Unorm),
    (5, Format::R8G8B8A8Uint),
    (6, Format::R16G16Sint),
    (7, Format::R16G16B16A16Sint),
    (8, Format::R8G8B8A8Unorm),
    (9, Format::R16G16Snorm),
    (10, Format::R16G16B16A16Snorm),
    (11, Format::R16G16Unorm),
    (12, Format::R16G16B16A16Unorm),
    (15, Format::R16G16Float),
    (16, Format::R16G16B16A16Float),
];

const DECL_USAGES: &[&str] = &[
    "POSITION",
    "BLENDWEIGHT",
    "BLENDINDICES",
    "NORMAL",
    "PSIZE",
    "TEXCOORD",
    "TANGENT",
    "BINORMAL",
    "TESSFACTOR",
    "POSITIONT",
    "COLOR",
    "FOG",
    "DEPTH",
    "SAMPLE",
];

/// Vertex declaration of `elements`, terminated by [`VertexElement::END`].
///
/// `None` when an element format or semantic has no D3D9 equivalent.
pub fn vertex_elements(elements: &[InputElement<'_>]) -> Option<Vec<VertexElement>> {
    let mut declaration = Vec::with_capacity(elements.len() + 1);
    for element in elements {
        let &(ty, _) = DECL_TYPES
            .iter()
            .find(|(_, format)| *format == element.format)?;
        let usage = DECL_USAGES
            .iter()
            .position(|name| name.eq_ignore_ascii_case(element.semantic))?;

        declaration.push(VertexElement {
            stream: u16::try_from(element.buffer_binding).ok()?,
            offset: u16::try_from(element.offset).ok()?,
            ty,
            method: 0,
            usage: usage as u8,
            usage_index: u8::try_from(element.semantic_index).ok()?,
        });
    }
    declaration.push(VertexElement::END);

    Some(declaration)
}

/// Input elements of a declaration, up to its terminator.
pub fn input_elements(declaration: &[VertexElement]) -> Vec<InputElement<'static>> {
    declaration
        .iter()
        .take_while(|element| element.stream != 0xff)
        .enumerate()
        .map(|(location, element)| InputElement {
            location: location as u32,
            semantic: DECL_USAGES
                .get(element.usage as usize)
                .copied()
                .unwrap_or_default(),
            semantic_index: element.usage_index as u32,
            format: DECL_TYPES
                .iter()
                .find(|(ty, _)| *ty == element.ty)
                .map_or(Format::Unknown, |&(_, format)| format),
            buffer_binding: element.stream as u32,
            offset: element.offset as u32,
            stride: 0,
            instance_step_rate: 0,
        })
        .collect()
}

/// Number of tokens in shader bytecode, the end token included.
///
/// `token` reads the token at an index. Shader model 2 and later instructions carry their
/// length, which keeps constants from being read as the end token.
pub fn shader_token_count(mut token: impl FnMut(usize) -> u32) -> usize {
    const END: u32 = 0x0000_ffff;
    const COMMENT: u32 = 0xfffe;

    let major = (token(0) >> 8) & 0xff;
    let mut index = 1;
    loop {
        let value = token(index);
        index += 1;
        if value == END {
            return index;
        }

        if value & 0xffff == COMMENT {
            index += ((value >> 16) & 0x7fff) as usize;
        } else if major >= 2 {
            index += ((value >> 24) & 0xf) as usize;
        }
    }
}

#[cfg(test)]
mod tests {
    use tint_api::sampler::FilterMode;

    use super::*;

    #[test]
    fn render_states_are_numeric() {
        for &(state, raw) in RENDER_STATES {
            assert_eq!(PipelineState::from_raw(raw), Some(state));
        }
        // D3DRS_LIGHTING has no unified counterpart
        assert_eq!(PipelineState::from_raw(137), None);
    }

    #[test]
    fn texture_round_trip() {
        let native = SurfaceDesc {
            format: fmt::A8R8G8B8,
            ty: rtype::TEXTURE,
            usage: usage::RENDERTARGET | usage::AUTOGENMIPMAP,
            pool: pool::DEFAULT,
            width: 1280,
            height: 720,
            ..Default::default()
        };

        let desc = surface_to_desc(&native, 4);
        assert_eq!(desc.format, Format::B8G8R8A8Unorm);
        assert_eq!(desc.extent(), (1280, 720, 1));
        assert_eq!(desc.levels(), 4);
        assert!(desc.usage.contains(ResourceUsage::SHADER_RESOURCE | ResourceUsage::RENDER_TARGET));
        assert!(desc.flags.contains(ResourceFlags::GENERATE_MIPMAPS));

        let mut back = SurfaceDesc {
            ty: rtype::TEXTURE,
            ..Default::default()
        };
        assert_eq!(apply_surface_desc(&desc, &mut back), Some(4));
        assert_eq!(back, native);
    }

    #[test]
    fn multisampled_surface_round_trip() {
        let native = SurfaceDesc {
            format: fmt::D24S8,
            ty: rtype::SURFACE,
            usage: usage::DEPTHSTENCIL,
            pool: pool::DEFAULT,
            multisample_type: 4,
            multisample_quality: 0,
            width: 800,
            height: 600,
        };

        let desc = surface_to_desc(&native, 1);
        assert!(matches!(
            desc.dimension,
            ResourceDimension::Texture2d { samples: 4, levels: 1, .. }
        ));
        assert_eq!(desc.format, Format::D24UnormS8Uint);

        let mut back = SurfaceDesc {
            ty: rtype::SURFACE,
            ..Default::default()
        };
        apply_surface_desc(&desc, &mut back).unwrap();
        assert_eq!(back, native);
    }

    #[test]
    fn cube_round_trip() {
        let native = SurfaceDesc {
            format: fmt::A16B16G16R16F,
            ty: rtype::CUBETEXTURE,
            pool: pool::MANAGED,
            width: 256,
            height: 256,
            ..Default::default()
        };

        let desc = surface_to_desc(&native, 9);
        assert_eq!(desc.layers(), 6);
        assert!(desc.flags.contains(ResourceFlags::CUBE_COMPATIBLE));
        assert_eq!(desc.heap, MemoryHeap::CpuToGpu);

        let mut back = SurfaceDesc {
            ty: rtype::CUBETEXTURE,
            ..Default::default()
        };
        assert_eq!(apply_surface_desc(&desc, &mut back), Some(9));
        assert_eq!(back, native);
    }

    #[test]
    fn buffer_round_trip() {
        let vertices = VertexBufferDesc {
            format: fmt::UNKNOWN,
            ty: rtype::VERTEXBUFFER,
            usage: usage::WRITEONLY | usage::DYNAMIC,
            pool: pool::DEFAULT,
            size: 4096,
            fvf: 0x102,
        };
        let desc = vertex_buffer_to_desc(&vertices);
        assert_eq!(desc.extent().0, 4096);
        assert!(desc.usage.contains(ResourceUsage::VERTEX_BUFFER));
        assert!(desc.flags.contains(ResourceFlags::DYNAMIC));

        let mut back = VertexBufferDesc {
            ty: rtype::VERTEXBUFFER,
            usage: usage::WRITEONLY,
            fvf: 0x102,
            ..Default::default()
        };
        assert!(apply_vertex_buffer_desc(&desc, &mut back));
        assert_eq!(back, vertices);

        let indices = IndexBufferDesc {
            format: fmt::INDEX32,
            ty: rtype::INDEXBUFFER,
            usage: 0,
            pool: pool::MANAGED,
            size: 600,
        };
        let desc = index_buffer_to_desc(&indices);
        assert_eq!(desc.format, Format::R32Uint);

        let mut back = IndexBufferDesc {
            ty: rtype::INDEXBUFFER,
            ..Default::default()
        };
        assert!(apply_index_buffer_desc(&desc, &mut back));
        assert_eq!(back, indices);
    }

    #[test]
    fn oversized_buffer_is_rejected() {
        let desc = ResourceDesc::buffer(
            u64::from(u32::MAX) + 1,
            MemoryHeap::GpuOnly,
            ResourceUsage::VERTEX_BUFFER,
        );
        assert!(!apply_vertex_buffer_desc(&desc, &mut VertexBufferDesc::default()));
    }

    #[test]
    fn untranslatable_format_declines() {
        let desc = ResourceDesc::texture_2d(
            64,
            64,
            1,
            Format::Bc7Unorm,
            MemoryHeap::GpuOnly,
            ResourceUsage::SHADER_RESOURCE,
        );
        let mut native = SurfaceDesc {
            ty: rtype::TEXTURE,
            ..Default::default()
        };
        assert_eq!(apply_surface_desc(&desc, &mut native), None);
    }

    #[test]
    fn srgb_shares_the_linear_format() {
        assert_eq!(format_to_d3d(Format::B8G8R8A8UnormSrgb, false), fmt::A8R8G8B8);
        assert_eq!(format_to_d3d(Format::D16Unorm, true), fmt::D16_LOCKABLE);
        assert_eq!(format_from_d3d(fmt::INTZ), Format::Intz);
        assert_eq!(format_from_d3d(fmt::NULL), Format::Unknown);
    }

    #[test]
    fn primitive_counts() {
        const TRIANGLE_STRIP: u32 = 5;
        const LINE_LIST: u32 = 2;

        assert_eq!(vertex_count(TRIANGLE_STRIP, 2), 4);
        assert_eq!(primitive_count(TRIANGLE_STRIP, 4), 2);
        assert_eq!(vertex_count(LINE_LIST, 3), 6);
        assert_eq!(primitive_count(LINE_LIST, 7), 3);
        assert_eq!(vertex_count(0, 10), 0);
    }

    #[test]
    fn fixed_function_tables() {
        for factor in [
            BlendFactor::Zero,
            BlendFactor::OneMinusSourceAlpha,
            BlendFactor::DestColor,
            BlendFactor::ConstantColor,
        ] {
            assert_eq!(blend_factor_from_d3d(blend_factor_to_d3d(factor)), factor);
        }
        assert_eq!(stencil_op_from_d3d(stencil_op_to_d3d(StencilOp::Invert)), StencilOp::Invert);
        assert_eq!(compare_op_from_d3d(compare_op_to_d3d(CompareOp::GreaterEqual)), CompareOp::GreaterEqual);
        assert_eq!(fill_mode_from_d3d(fill_mode_to_d3d(FillMode::Wireframe)), FillMode::Wireframe);

        assert_eq!(cull_mode_from_d3d(cull_mode_to_d3d(CullMode::Back, false)), CullMode::Back);
        assert_eq!(cull_mode_to_d3d(CullMode::Back, true), cull_mode_to_d3d(CullMode::Front, false));
    }

    #[test]
    fn colors() {
        assert_eq!(color_to_rgba(0xff00_8000), [0.0, 128.0 / 255.0, 0.0, 1.0]);
        assert_eq!(rgba_to_color(&[1.0, 0.0, 0.5, 1.0]), 0xffff_0080);
    }

    #[test]
    fn anisotropic_sampler() {
        let desc = SamplerDesc {
            filter: FilterMode::Anisotropic,
            max_anisotropy: 8.0,
            ..SamplerDesc::default()
        };
        let states = sampler_states(&desc);
        assert!(states.contains(&(samp::MINFILTER, texf::ANISOTROPIC)));
        assert!(states.contains(&(samp::MIPFILTER, texf::LINEAR)));
        assert!(states.contains(&(samp::MAXANISOTROPY, 8)));
        assert!(states.contains(&(samp::ADDRESSU, 3)));
    }

    #[test]
    fn vertex_declaration_round_trip() {
        let elements = [
            InputElement {
                location: 0,
                semantic: "POSITION",
                format: Format::R32G32B32Float,
                ..Default::default()
            },
            InputElement {
                location: 1,
                semantic: "TEXCOORD",
                semantic_index: 0,
                format: Format::R32G32Float,
                offset: 12,
                ..Default::default()
            },
        ];

        let declaration = vertex_elements(&elements).unwrap();
        assert_eq!(declaration.len(), 3);
        assert_eq!(declaration[2], VertexElement::END);
        assert_eq!(declaration[1].usage, 5);
        assert_eq!(input_elements(&declaration), elements);

        let unknown = [InputElement {
            semantic: "SV_Position",
            format: Format::R32G32B32A32Float,
            ..Default::default()
        }];
        assert_eq!(vertex_elements(&unknown), None);
    }

    #[test]
    fn pipeline_sub_states() {
        let blend = blend_states(&BlendDesc::default());
        assert!(blend.contains(&(rs::SEPARATEALPHABLENDENABLE, 0)));
        assert!(blend.contains(&(rs::BLENDFACTOR, 0xffff_ffff)));
        assert!(blend.contains(&(rs::SRCBLEND, 2)));

        let raster = rasterizer_states(&RasterizerDesc::default());
        assert!(raster.contains(&(rs::CULLMODE, 3)));
        assert!(raster.contains(&(rs::FILLMODE, 3)));

        let depth = depth_stencil_states(&DepthStencilDesc::default());
        assert!(depth.contains(&(rs::ZFUNC, 2)));
        assert!(depth.contains(&(rs::TWOSIDEDSTENCILMODE, 0)));

        assert_eq!(rgba8_to_color(0x4433_2211), 0x4411_2233);
    }

    #[test]
    fn shader_length_skips_comments_and_operands() {
        let tokens = [
            0xffff_0300, // ps_3_0
            0x0002_fffe, // comment of two tokens
            0x0000_ffff,
            0x0000_0000,
            0x0400_0051, // def c0, with an operand that looks like the end token
            0xa00f_0000,
            0x0000_ffff,
            0x0000_0000,
            0x0000_0000,
            0x0000_ffff,
        ];

        assert_eq!(shader_token_count(|index| tokens[index]), tokens.len());
    }
}
