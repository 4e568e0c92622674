//! Direct3D 9 backend.
//!
//! Translators, the clear splitter and the surface planner are plain functions and build
//! everywhere. The device object and the vtable hooks need Windows.

pub mod clear;
#[cfg(windows)]
pub mod command;
pub mod conv;
#[cfg(windows)]
pub mod device;
#[cfg(windows)]
pub mod hook;

use tint_api::{
    DeviceCaps, Device, Resource,
    resource::{ResourceDesc, ResourceDimension, ResourceUsage},
};
use tint_event::Registry;
use tracing::warn;

use crate::dispatch::{self, Creation};
use conv::{SurfaceDesc, apply_surface_desc, pool, rtype, surface_to_desc};

/// `D3DPRASTERCAPS_ANISOTROPY`
const RASTER_CAPS_ANISOTROPY: u32 = 0x0002_0000;
/// `D3DPMISCCAPS_INDEPENDENTWRITEMASKS`
const MISC_CAPS_INDEPENDENT_WRITE_MASKS: u32 = 0x0000_4000;

/// Capability answer of a device with the given `D3DCAPS9` raster and primitive misc caps.
pub const fn capability(cap: DeviceCaps, raster_caps: u32, misc_caps: u32) -> bool {
    match cap {
        DeviceCaps::IndependentBlend => misc_caps & MISC_CAPS_INDEPENDENT_WRITE_MASKS != 0,
        DeviceCaps::SamplerAnisotropic => raster_caps & RASTER_CAPS_ANISOTROPY != 0,
        DeviceCaps::FillModeNonSolid
        | DeviceCaps::PartialPushConstantUpdates
        | DeviceCaps::PartialPushDescriptorUpdates
        | DeviceCaps::SamplerWithResourceView
        | DeviceCaps::Blit
        | DeviceCaps::ResolveRegion => true,
        DeviceCaps::ComputeShader
        | DeviceCaps::GeometryShader
        | DeviceCaps::HullAndDomainShader
        | DeviceCaps::DualSourceBlend
        | DeviceCaps::LogicOp
        | DeviceCaps::DrawInstanced
        | DeviceCaps::DrawOrDispatchIndirect
        | DeviceCaps::MultiViewport
        | DeviceCaps::SamplerCompare
        | DeviceCaps::CopyBufferRegion
        | DeviceCaps::CopyBufferToTexture
        | DeviceCaps::CopyQueryPoolResults => false,
    }
}

/// D3D9 surfaces can't be sampled, a surface with this usage has to be a texture level.
#[inline]
pub fn needs_surface_replacement(usage: ResourceUsage) -> bool {
    usage.intersects(ResourceUsage::SHADER_RESOURCE)
}

/// Texture standing in for `surface`. Textures are never multisampled.
pub fn replacement_texture(surface: &SurfaceDesc) -> SurfaceDesc {
    SurfaceDesc {
        ty: rtype::TEXTURE,
        pool: pool::DEFAULT,
        multisample_type: 0,
        multisample_quality: 0,
        ..*surface
    }
}

/// Native action for a `CreateRenderTarget` or `CreateDepthStencilSurface` call.
#[derive(Debug, Clone, PartialEq)]
pub enum SurfacePlan {
    /// Create the surface from this description.
    Surface(SurfaceDesc),

    /// Create a single level texture and hand out its first surface.
    Texture {
        texture: SurfaceDesc,
        desc: ResourceDesc,
    },

    Substitute(Resource),
    Failed,
}

/// Runs the resource creation event for a standalone surface and picks how to create it.
pub fn plan_surface(registry: &Registry, device: &dyn Device, native: &SurfaceDesc) -> SurfacePlan {
    let desc = surface_to_desc(native, 1);
    let initial_state = desc.usage
        & (ResourceUsage::RENDER_TARGET | ResourceUsage::DEPTH_STENCIL_WRITE);

    let desc = match dispatch::create_resource(registry, device, &desc, initial_state) {
        Creation::Unchanged => return SurfacePlan::Surface(*native),
        Creation::Modified(desc) => desc,
        Creation::Substitute(resource) => return SurfacePlan::Substitute(resource),
        Creation::Failed => return SurfacePlan::Failed,
    };

    let mut edited = *native;
    if apply_surface_desc(&desc, &mut edited).is_none() {
        warn!("surface description edit can't be expressed in Direct3D 9, ignoring it");
        return SurfacePlan::Surface(*native);
    }

    if needs_surface_replacement(desc.usage) {
        let mut desc = desc;
        // Textures are never multisampled
        if let ResourceDimension::Texture2d { samples, .. } = &mut desc.dimension {
            *samples = 1;
        }
        SurfacePlan::Texture {
            texture: replacement_texture(&edited),
            desc,
        }
    } else {
        SurfacePlan::Surface(edited)
    }
}

#[cfg(test)]
mod tests {
    use tint_event::{Event, EventKind, Flow};

    use super::*;
    use crate::testing::NullDevice;
    use conv::{fmt, usage};

    fn render_target() -> SurfaceDesc {
        SurfaceDesc {
            format: fmt::A8R8G8B8,
            ty: rtype::SURFACE,
            usage: usage::RENDERTARGET,
            pool: pool::DEFAULT,
            multisample_type: 4,
            multisample_quality: 0,
            width: 1920,
            height: 1080,
        }
    }

    #[test]
    fn sampled_surface_becomes_texture() {
        let registry = Registry::new();
        registry.register_addon("sample", |r| {
            r.on(EventKind::CreateResource, |event| {
                if let Event::CreateResource { desc, .. } = event {
                    desc.usage |= ResourceUsage::SHADER_RESOURCE;
                }
                Flow::Continue
            });
        });

        let device = NullDevice::default();
        let SurfacePlan::Texture { texture, desc } =
            plan_surface(&registry, &device, &render_target())
        else {
            panic!("surface was not replaced");
        };

        assert_eq!(texture.ty, rtype::TEXTURE);
        assert_eq!(texture.multisample_type, 0);
        assert_eq!((texture.width, texture.height), (1920, 1080));
        assert_eq!(texture.usage & usage::RENDERTARGET, usage::RENDERTARGET);
        assert!(matches!(
            desc.dimension,
            ResourceDimension::Texture2d { samples: 1, .. }
        ));
    }

    #[test]
    fn untouched_surface_is_created_as_asked() {
        let registry = Registry::new();
        let device = NullDevice::default();

        assert_eq!(
            plan_surface(&registry, &device, &render_target()),
            SurfacePlan::Surface(render_target())
        );
    }

    #[test]
    fn handled_without_substitute_fails() {
        let registry = Registry::new();
        registry.register_addon("deny", |r| {
            r.on(EventKind::CreateResource, |_| Flow::Handled);
        });

        let device = NullDevice::default();
        assert_eq!(
            plan_surface(&registry, &device, &render_target()),
            SurfacePlan::Failed
        );
    }

    #[test]
    fn capabilities_follow_caps_bits() {
        assert!(!capability(DeviceCaps::ComputeShader, u32::MAX, u32::MAX));
        assert!(capability(DeviceCaps::SamplerWithResourceView, 0, 0));
        assert!(!capability(DeviceCaps::SamplerAnisotropic, 0, 0));
        assert!(capability(DeviceCaps::SamplerAnisotropic, RASTER_CAPS_ANISOTROPY, 0));
        assert!(capability(
            DeviceCaps::IndependentBlend,
            0,
            MISC_CAPS_INDEPENDENT_WRITE_MASKS
        ));
    }

    #[test]
    fn sampled_usage_needs_replacement() {
        assert!(needs_surface_replacement(
            ResourceUsage::SHADER_RESOURCE_PIXEL | ResourceUsage::RENDER_TARGET
        ));
        assert!(!needs_surface_replacement(ResourceUsage::DEPTH_STENCIL));
    }
}
