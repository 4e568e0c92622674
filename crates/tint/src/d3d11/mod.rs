//! Direct3D 11 backend.
//!
//! Translators, descriptor state and the creation planners build everywhere. The device,
//! its contexts and the vtable hooks need Windows.

#[cfg(windows)]
pub mod command;
pub mod conv;
pub mod descriptor;
#[cfg(windows)]
pub mod device;
#[cfg(windows)]
pub mod hook;

use tint_api::{
    DeviceCaps, Device, Resource, ResourceView,
    resource::{ResourceDesc, ResourceDimension, ResourceUsage, ResourceViewDesc},
};
use tint_event::Registry;
use tracing::warn;

use crate::dispatch::{self, Creation};
use conv::{ViewDesc, ViewKind};

/// `D3D_FEATURE_LEVEL_9_3`
pub const FEATURE_LEVEL_9_3: u32 = 0x9300;
/// `D3D_FEATURE_LEVEL_10_0`
pub const FEATURE_LEVEL_10_0: u32 = 0xa000;
/// `D3D_FEATURE_LEVEL_10_1`
pub const FEATURE_LEVEL_10_1: u32 = 0xa100;
/// `D3D_FEATURE_LEVEL_11_0`
pub const FEATURE_LEVEL_11_0: u32 = 0xb000;
/// `D3D_FEATURE_LEVEL_11_1`
pub const FEATURE_LEVEL_11_1: u32 = 0xb100;

/// Capability answer of a device created at `feature_level`.
pub const fn capability(cap: DeviceCaps, feature_level: u32) -> bool {
    match cap {
        DeviceCaps::ComputeShader
        | DeviceCaps::HullAndDomainShader
        | DeviceCaps::DrawOrDispatchIndirect => feature_level >= FEATURE_LEVEL_11_0,
        DeviceCaps::GeometryShader | DeviceCaps::DualSourceBlend => feature_level >= FEATURE_LEVEL_10_0,
        DeviceCaps::IndependentBlend => feature_level >= FEATURE_LEVEL_10_1,
        DeviceCaps::LogicOp | DeviceCaps::ResolveRegion => feature_level >= FEATURE_LEVEL_11_1,
        DeviceCaps::DrawInstanced => feature_level >= FEATURE_LEVEL_9_3,
        DeviceCaps::FillModeNonSolid
        | DeviceCaps::MultiViewport
        | DeviceCaps::PartialPushDescriptorUpdates
        | DeviceCaps::SamplerCompare
        | DeviceCaps::SamplerAnisotropic
        | DeviceCaps::CopyBufferRegion => true,
        DeviceCaps::PartialPushConstantUpdates
        | DeviceCaps::SamplerWithResourceView
        | DeviceCaps::CopyBufferToTexture
        | DeviceCaps::Blit
        | DeviceCaps::CopyQueryPoolResults => false,
    }
}

/// Native action for a creation call after its event ran.
#[derive(Debug, Clone, PartialEq)]
pub enum Plan<T, H> {
    /// Forward the application's description.
    Forward,

    /// Create from this edited description.
    Create(T),

    Substitute(H),
    Failed,
}

/// Runs the resource creation event for a native description.
///
/// Returns the plan and the unified description the created resource ends up with.
pub fn plan_resource<T: Copy>(
    registry: &Registry,
    device: &dyn Device,
    native: &T,
    to_desc: fn(&T) -> ResourceDesc,
    apply: fn(&ResourceDesc, &mut T) -> bool,
) -> (Plan<T, Resource>, ResourceDesc) {
    let original = to_desc(native);

    let desc = match dispatch::create_resource(registry, device, &original, ResourceUsage::GENERAL) {
        Creation::Unchanged => return (Plan::Forward, original),
        Creation::Modified(desc) => desc,
        Creation::Substitute(resource) => return (Plan::Substitute(resource), original),
        Creation::Failed => return (Plan::Failed, original),
    };

    let mut edited = *native;
    if !apply(&desc, &mut edited) {
        warn!("resource description edit can't be expressed in Direct3D 11, ignoring it");
        return (Plan::Forward, original);
    }

    (Plan::Create(edited), desc)
}

/// Runs the view creation event for a view of `resource`.
///
/// `native` is the application's description, `None` for a view of the whole resource.
pub fn plan_view(
    registry: &Registry,
    device: &dyn Device,
    resource: Resource,
    resource_desc: &ResourceDesc,
    kind: ViewKind,
    native: Option<&ViewDesc>,
) -> (Plan<ViewDesc, ResourceView>, ResourceViewDesc) {
    let element_size = element_size(resource_desc);
    let original = match native {
        Some(native) => conv::view_to_desc(kind, native, element_size),
        None => ResourceViewDesc::whole(resource_desc),
    };

    let desc = match dispatch::create_resource_view(registry, device, resource, kind.usage(), &original) {
        Creation::Unchanged => return (Plan::Forward, original),
        Creation::Modified(desc) => desc,
        Creation::Substitute(view) => return (Plan::Substitute(view), original),
        Creation::Failed => return (Plan::Failed, original),
    };

    match conv::apply_view_desc(kind, &desc, element_size) {
        Some(edited) => (Plan::Create(edited), desc),
        None => {
            warn!("{kind:?} view description edit can't be expressed in Direct3D 11, ignoring it");
            (Plan::Forward, original)
        }
    }
}

/// Size of one element of buffer views over a resource.
pub fn element_size(desc: &ResourceDesc) -> u32 {
    match desc.dimension {
        ResourceDimension::Buffer { stride, .. } => conv::element_size(desc.format, stride),
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use tint_api::{
        Format,
        resource::{MemoryHeap, ResourceViewType, ViewRange},
    };
    use tint_event::{Event, EventKind, Flow};

    use super::*;
    use crate::testing::NullDevice;
    use conv::{Texture2dDesc, apply_texture_2d_desc, bind, texture_2d_to_desc, usage};

    fn depth_buffer() -> Texture2dDesc {
        Texture2dDesc {
            width: 1280,
            height: 720,
            mip_levels: 1,
            array_size: 1,
            format: Format::D24UnormS8Uint as u32,
            sample_count: 1,
            sample_quality: 0,
            usage: usage::DEFAULT,
            bind_flags: bind::DEPTH_STENCIL,
            cpu_access_flags: 0,
            misc_flags: 0,
        }
    }

    #[test]
    fn compute_needs_feature_level_11() {
        assert!(!capability(DeviceCaps::ComputeShader, FEATURE_LEVEL_10_1));
        assert!(capability(DeviceCaps::ComputeShader, FEATURE_LEVEL_11_0));
        assert!(capability(DeviceCaps::ComputeShader, FEATURE_LEVEL_11_1));
        assert!(!capability(DeviceCaps::LogicOp, FEATURE_LEVEL_11_0));
        assert!(!capability(DeviceCaps::SamplerWithResourceView, FEATURE_LEVEL_11_1));
        assert!(capability(DeviceCaps::SamplerCompare, FEATURE_LEVEL_9_3));
    }

    #[test]
    fn untouched_resource_is_forwarded() {
        let registry = Registry::new();
        let device = NullDevice::default();

        let (plan, desc) = plan_resource(
            &registry,
            &device,
            &depth_buffer(),
            texture_2d_to_desc,
            apply_texture_2d_desc,
        );
        assert_eq!(plan, Plan::Forward);
        assert_eq!(desc.format, Format::D24UnormS8Uint);
    }

    #[test]
    fn sampled_depth_buffer_is_edited() {
        let registry = Registry::new();
        registry.register_addon("depth", |r| {
            r.on(EventKind::CreateResource, |event| {
                if let Event::CreateResource { desc, .. } = event {
                    if desc.usage.intersects(ResourceUsage::DEPTH_STENCIL) {
                        desc.format = desc.format.typeless();
                        desc.usage |= ResourceUsage::SHADER_RESOURCE;
                    }
                }
                Flow::Continue
            });
        });

        let device = NullDevice::default();
        let (plan, desc) = plan_resource(
            &registry,
            &device,
            &depth_buffer(),
            texture_2d_to_desc,
            apply_texture_2d_desc,
        );
        let Plan::Create(native) = plan else {
            panic!("description was not edited");
        };

        assert_eq!(native.format, Format::R24G8Typeless as u32);
        assert_eq!(native.bind_flags, bind::DEPTH_STENCIL | bind::SHADER_RESOURCE);
        assert_eq!(desc.format, Format::R24G8Typeless);
    }

    #[test]
    fn inexpressible_edit_is_ignored() {
        let registry = Registry::new();
        registry.register_addon("buffer", |r| {
            r.on(EventKind::CreateResource, |event| {
                if let Event::CreateResource { desc, .. } = event {
                    *desc = ResourceDesc::buffer(64, MemoryHeap::GpuOnly, ResourceUsage::VERTEX_BUFFER);
                }
                Flow::Continue
            });
        });

        let device = NullDevice::default();
        let (plan, desc) = plan_resource(
            &registry,
            &device,
            &depth_buffer(),
            texture_2d_to_desc,
            apply_texture_2d_desc,
        );
        assert_eq!(plan, Plan::Forward);
        assert_eq!(desc.format, Format::D24UnormS8Uint);
    }

    #[test]
    fn handled_resource_fails_or_substitutes() {
        let registry = Registry::new();
        registry.register_addon("deny", |r| {
            r.on(EventKind::CreateResource, |_| Flow::Handled);
        });
        let device = NullDevice::default();
        let (plan, _) = plan_resource(
            &registry,
            &device,
            &depth_buffer(),
            texture_2d_to_desc,
            apply_texture_2d_desc,
        );
        assert_eq!(plan, Plan::Failed);

        let registry = Registry::new();
        registry.register_addon("replace", |r| {
            r.on(EventKind::CreateResource, |event| {
                if let Event::CreateResource { substitute, .. } = event {
                    *substitute = Some(Resource::from_raw(0x7000));
                }
                Flow::Handled
            });
        });
        let (plan, _) = plan_resource(
            &registry,
            &device,
            &depth_buffer(),
            texture_2d_to_desc,
            apply_texture_2d_desc,
        );
        assert_eq!(plan, Plan::Substitute(Resource::from_raw(0x7000)));
    }

    #[test]
    fn whole_resource_view_edit() {
        let registry = Registry::new();
        registry.register_addon("srgb", |r| {
            r.on(EventKind::CreateResourceView, |event| {
                if let Event::CreateResourceView { desc, .. } = event {
                    desc.format = desc.format.default_typed_srgb();
                }
                Flow::Continue
            });
        });

        let device = NullDevice::default();
        let mut native = depth_buffer();
        native.format = Format::R8G8B8A8Unorm as u32;
        native.bind_flags = bind::RENDER_TARGET;
        let resource_desc = texture_2d_to_desc(&native);

        let (plan, desc) = plan_view(
            &registry,
            &device,
            Resource::from_raw(0x8000),
            &resource_desc,
            ViewKind::RenderTarget,
            None,
        );
        let Plan::Create(view) = plan else {
            panic!("view was not edited");
        };

        assert_eq!(view.format, Format::R8G8B8A8UnormSrgb as u32);
        assert_eq!(view.dimension, 4);
        assert_eq!(desc.ty, ResourceViewType::Texture2d);
        assert!(matches!(desc.range, ViewRange::Texture { first_level: 0, .. }));
    }

    #[test]
    fn buffer_view_plan_keeps_application_description() {
        let registry = Registry::new();
        let device = NullDevice::default();
        let mut resource_desc = ResourceDesc::buffer(4096, MemoryHeap::GpuOnly, ResourceUsage::SHADER_RESOURCE);
        resource_desc.dimension = ResourceDimension::Buffer { size: 4096, stride: 16 };

        let native = ViewDesc {
            format: 0,
            dimension: 1,
            first: 2,
            count: 8,
            ..Default::default()
        };
        let (plan, desc) = plan_view(
            &registry,
            &device,
            Resource::from_raw(0x9000),
            &resource_desc,
            ViewKind::ShaderResource,
            Some(&native),
        );

        assert_eq!(plan, Plan::Forward);
        assert_eq!(desc.range, ViewRange::Buffer { offset: 32, size: 128 });
    }
}
