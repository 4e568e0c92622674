//! Resource and resource view descriptions.

use bitflags::bitflags;

use crate::{Error, Format, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum MemoryHeap {
    #[default]
    Unknown,
    GpuOnly,
    CpuToGpu,
    GpuToCpu,
    CpuOnly,
}

bitflags! {
    /// Every way a resource may be used or bound.
    ///
    /// Also doubles as the resource state for barriers.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ResourceUsage: u32 {
        const VERTEX_BUFFER = 0x1;
        const INDEX_BUFFER = 0x2;
        const RENDER_TARGET = 0x4;
        const UNORDERED_ACCESS = 0x8;
        const DEPTH_STENCIL_WRITE = 0x10;
        const DEPTH_STENCIL_READ = 0x20;
        const DEPTH_STENCIL = Self::DEPTH_STENCIL_WRITE.bits() | Self::DEPTH_STENCIL_READ.bits();
        const SHADER_RESOURCE_NON_PIXEL = 0x40;
        const SHADER_RESOURCE_PIXEL = 0x80;
        const SHADER_RESOURCE = Self::SHADER_RESOURCE_NON_PIXEL.bits() | Self::SHADER_RESOURCE_PIXEL.bits();
        const STREAM_OUTPUT = 0x100;
        const INDIRECT_ARGUMENT = 0x200;
        const COPY_DEST = 0x400;
        const COPY_SOURCE = 0x800;
        const RESOLVE_DEST = 0x1000;
        const RESOLVE_SOURCE = 0x2000;
        const CONSTANT_BUFFER = 0x8000;
        const CPU_ACCESS = 0x10000;
        const PRESENT = 0x20000;
        const GENERAL = 0x8000_0000;
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ResourceFlags: u32 {
        const SHARED = 0x1;
        const CUBE_COMPATIBLE = 0x2;
        const GENERATE_MIPMAPS = 0x4;
        const DYNAMIC = 0x8;
        const STRUCTURED = 0x10;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceDimension {
    Buffer {
        size: u64,
        /// Structure stride, `0` for raw and typed buffers.
        stride: u32,
    },
    Texture1d {
        width: u32,
        layers: u16,
        levels: u16,
    },
    Texture2d {
        width: u32,
        height: u32,
        layers: u16,
        levels: u16,
        samples: u16,
    },
    Texture3d {
        width: u32,
        height: u32,
        depth: u16,
        levels: u16,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ResourceDesc {
    pub dimension: ResourceDimension,
    pub format: Format,
    pub heap: MemoryHeap,
    pub usage: ResourceUsage,
    pub flags: ResourceFlags,
}

impl ResourceDesc {
    pub const fn buffer(size: u64, heap: MemoryHeap, usage: ResourceUsage) -> Self {
        Self {
            dimension: ResourceDimension::Buffer { size, stride: 0 },
            format: Format::Unknown,
            heap,
            usage,
            flags: ResourceFlags::empty(),
        }
    }

    pub const fn texture_2d(
        width: u32,
        height: u32,
        levels: u16,
        format: Format,
        heap: MemoryHeap,
        usage: ResourceUsage,
    ) -> Self {
        Self {
            dimension: ResourceDimension::Texture2d {
                width,
                height,
                layers: 1,
                levels,
                samples: 1,
            },
            format,
            heap,
            usage,
            flags: ResourceFlags::empty(),
        }
    }

    pub const fn is_buffer(&self) -> bool {
        matches!(self.dimension, ResourceDimension::Buffer { .. })
    }

    /// Width, height and depth of the top level. Buffers report their size as width.
    pub const fn extent(&self) -> (u32, u32, u32) {
        match self.dimension {
            ResourceDimension::Buffer { size, .. } => (size as u32, 1, 1),
            ResourceDimension::Texture1d { width, .. } => (width, 1, 1),
            ResourceDimension::Texture2d { width, height, .. } => (width, height, 1),
            ResourceDimension::Texture3d {
                width,
                height,
                depth,
                ..
            } => (width, height, depth as u32),
        }
    }

    pub const fn levels(&self) -> u16 {
        match self.dimension {
            ResourceDimension::Buffer { .. } => 1,
            ResourceDimension::Texture1d { levels, .. }
            | ResourceDimension::Texture2d { levels, .. }
            | ResourceDimension::Texture3d { levels, .. } => levels,
        }
    }

    pub const fn layers(&self) -> u16 {
        match self.dimension {
            ResourceDimension::Texture1d { layers, .. }
            | ResourceDimension::Texture2d { layers, .. } => layers,
            _ => 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ResourceViewType {
    #[default]
    Unknown,
    Buffer,
    Texture1d,
    Texture1dArray,
    Texture2d,
    Texture2dArray,
    Texture2dMultisample,
    Texture2dMultisampleArray,
    Texture3d,
    TextureCube,
    TextureCubeArray,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ViewRange {
    Buffer {
        offset: u64,
        size: u64,
    },
    Texture {
        first_level: u32,
        levels: u32,
        first_layer: u32,
        layers: u32,
    },
}

impl ViewRange {
    /// Every level and layer of a texture.
    pub const ALL: Self = Self::Texture {
        first_level: 0,
        levels: u32::MAX,
        first_layer: 0,
        layers: u32::MAX,
    };
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ResourceViewDesc {
    pub ty: ResourceViewType,
    pub format: Format,
    pub range: ViewRange,
}

impl ResourceViewDesc {
    pub const fn new(ty: ResourceViewType, format: Format, range: ViewRange) -> Self {
        Self { ty, format, range }
    }

    /// A view over the whole resource with its own format.
    pub const fn whole(desc: &ResourceDesc) -> Self {
        let ty = match desc.dimension {
            ResourceDimension::Buffer { size, .. } => {
                return Self::new(
                    ResourceViewType::Buffer,
                    desc.format,
                    ViewRange::Buffer { offset: 0, size },
                );
            }
            ResourceDimension::Texture1d { layers: 1, .. } => ResourceViewType::Texture1d,
            ResourceDimension::Texture1d { .. } => ResourceViewType::Texture1dArray,
            ResourceDimension::Texture2d {
                layers: 1,
                samples: 1,
                ..
            } => ResourceViewType::Texture2d,
            ResourceDimension::Texture2d { samples: 1, .. } => ResourceViewType::Texture2dArray,
            ResourceDimension::Texture2d { layers: 1, .. } => ResourceViewType::Texture2dMultisample,
            ResourceDimension::Texture2d { .. } => ResourceViewType::Texture2dMultisampleArray,
            ResourceDimension::Texture3d { .. } => ResourceViewType::Texture3d,
        };

        Self::new(ty, desc.format, ViewRange::ALL)
    }
}

/// Rejects a view whose format is outside the typeless family of the resource format.
pub fn check_view_compatible(resource: &ResourceDesc, view: &ResourceViewDesc) -> Result<()> {
    if view.format == Format::Unknown
        || resource.format == Format::Unknown
        || view.format == resource.format
    {
        return Ok(());
    }

    if view.format.typeless() == resource.format.typeless() {
        Ok(())
    } else {
        Err(Error::Unsupported("view format outside the resource format family"))
    }
}

/// A 3D box inside a subresource, `left..right` exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct SubresourceBox {
    pub left: i32,
    pub top: i32,
    pub front: i32,
    pub right: i32,
    pub bottom: i32,
    pub back: i32,
}

impl SubresourceBox {
    pub const fn width(&self) -> u32 {
        (self.right - self.left) as u32
    }

    pub const fn height(&self) -> u32 {
        (self.bottom - self.top) as u32
    }

    pub const fn depth(&self) -> u32 {
        (self.back - self.front) as u32
    }
}

/// CPU side data of one subresource.
#[derive(Debug, Clone, Copy)]
pub struct SubresourceData<'a> {
    pub data: &'a [u8],
    pub row_pitch: u32,
    pub slice_pitch: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MapAccess {
    ReadOnly,
    WriteOnly,
    ReadWrite,
    WriteDiscard,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn view_family() {
        let desc = ResourceDesc::texture_2d(
            64,
            64,
            1,
            Format::R8G8B8A8Typeless,
            MemoryHeap::GpuOnly,
            ResourceUsage::SHADER_RESOURCE,
        );

        let srgb = ResourceViewDesc::new(
            ResourceViewType::Texture2d,
            Format::R8G8B8A8UnormSrgb,
            ViewRange::ALL,
        );
        assert!(check_view_compatible(&desc, &srgb).is_ok());

        let float = ResourceViewDesc {
            format: Format::R32Float,
            ..srgb
        };
        assert!(matches!(
            check_view_compatible(&desc, &float),
            Err(Error::Unsupported(_))
        ));
    }

    #[test]
    fn whole_view_type() {
        let mut desc = ResourceDesc::texture_2d(
            8,
            8,
            1,
            Format::R8Unorm,
            MemoryHeap::GpuOnly,
            ResourceUsage::SHADER_RESOURCE,
        );
        assert_eq!(ResourceViewDesc::whole(&desc).ty, ResourceViewType::Texture2d);

        desc.dimension = ResourceDimension::Texture2d {
            width: 8,
            height: 8,
            layers: 6,
            levels: 1,
            samples: 1,
        };
        assert_eq!(
            ResourceViewDesc::whole(&desc).ty,
            ResourceViewType::Texture2dArray
        );
    }
}
