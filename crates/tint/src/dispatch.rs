//! Creation events shared by every backend.
//!
//! A creation hook builds the unified descriptor, lets add-ons look at it and then either
//! runs the native call (possibly with an edited descriptor), adopts a substitute handle
//! or fails the call.

use tint_api::{
    Device, Pipeline, PipelineLayout, Resource, ResourceView, Sampler,
    pipeline::PipelineDesc,
    resource::{ResourceDesc, ResourceUsage, ResourceViewDesc},
    sampler::SamplerDesc,
};
use tint_event::{Event, EventKind, Flow, Registry};
use tracing::debug;

/// Outcome of a creation event.
#[derive(Debug, Clone, PartialEq)]
pub enum Creation<D, H> {
    /// No listener touched the descriptor, forward the native call as is.
    Unchanged,

    /// Create the object from this descriptor instead.
    Modified(D),

    /// An add-on created the object itself. Skip the native call.
    Substitute(H),

    /// An add-on handled the call without providing an object.
    Failed,
}

impl<D, H> Creation<D, H> {
    fn resolve(flow: Flow, original: &D, desc: D, substitute: Option<H>) -> Self
    where
        D: PartialEq,
    {
        match (flow, substitute) {
            (Flow::Handled, Some(handle)) => Self::Substitute(handle),
            (Flow::Handled, None) => {
                debug!("creation handled without a substitute");
                Self::Failed
            }
            (Flow::Continue, _) if desc == *original => Self::Unchanged,
            (Flow::Continue, _) => Self::Modified(desc),
        }
    }
}

pub fn create_sampler(
    registry: &Registry,
    device: &dyn Device,
    desc: &SamplerDesc,
) -> Creation<SamplerDesc, Sampler> {
    if !registry.has_listeners(EventKind::CreateSampler) {
        return Creation::Unchanged;
    }

    let mut event = Event::CreateSampler {
        device,
        desc: *desc,
        substitute: None,
    };
    let flow = registry.dispatch(&mut event);
    let Event::CreateSampler {
        desc: edited,
        substitute,
        ..
    } = event
    else {
        return Creation::Unchanged;
    };

    Creation::resolve(flow, desc, edited, substitute)
}

pub fn create_resource(
    registry: &Registry,
    device: &dyn Device,
    desc: &ResourceDesc,
    initial_state: ResourceUsage,
) -> Creation<ResourceDesc, Resource> {
    if !registry.has_listeners(EventKind::CreateResource) {
        return Creation::Unchanged;
    }

    let mut event = Event::CreateResource {
        device,
        desc: *desc,
        initial_state,
        substitute: None,
    };
    let flow = registry.dispatch(&mut event);
    let Event::CreateResource {
        desc: edited,
        substitute,
        ..
    } = event
    else {
        return Creation::Unchanged;
    };

    Creation::resolve(flow, desc, edited, substitute)
}

pub fn create_resource_view(
    registry: &Registry,
    device: &dyn Device,
    resource: Resource,
    usage: ResourceUsage,
    desc: &ResourceViewDesc,
) -> Creation<ResourceViewDesc, ResourceView> {
    if !registry.has_listeners(EventKind::CreateResourceView) {
        return Creation::Unchanged;
    }

    let mut event = Event::CreateResourceView {
        device,
        resource,
        usage,
        desc: *desc,
        substitute: None,
    };
    let flow = registry.dispatch(&mut event);
    let Event::CreateResourceView {
        desc: edited,
        substitute,
        ..
    } = event
    else {
        return Creation::Unchanged;
    };

    Creation::resolve(flow, desc, edited, substitute)
}

pub fn create_pipeline<'a>(
    registry: &Registry,
    device: &'a dyn Device,
    layout: PipelineLayout,
    desc: &PipelineDesc<'a>,
) -> Creation<PipelineDesc<'a>, Pipeline> {
    if !registry.has_listeners(EventKind::CreatePipeline) {
        return Creation::Unchanged;
    }

    let mut event = Event::CreatePipeline {
        device,
        layout,
        desc: desc.clone(),
        substitute: None,
    };
    let flow = registry.dispatch(&mut event);
    let Event::CreatePipeline {
        desc: edited,
        substitute,
        ..
    } = event
    else {
        return Creation::Unchanged;
    };

    Creation::resolve(flow, desc, edited, substitute)
}

/// Fires `InitResource`, skipping the payload when nobody listens.
pub fn init_resource(
    registry: &Registry,
    device: &dyn Device,
    desc: &ResourceDesc,
    initial_state: ResourceUsage,
    resource: Resource,
) {
    if registry.has_listeners(EventKind::InitResource) {
        registry.dispatch(&mut Event::InitResource {
            device,
            desc: *desc,
            initial_state,
            resource,
        });
    }
}

pub fn destroy_resource(registry: &Registry, device: &dyn Device, resource: Resource) {
    if registry.has_listeners(EventKind::DestroyResource) {
        registry.dispatch(&mut Event::DestroyResource { device, resource });
    }
}

pub fn init_resource_view(
    registry: &Registry,
    device: &dyn Device,
    resource: Resource,
    usage: ResourceUsage,
    desc: &ResourceViewDesc,
    view: ResourceView,
) {
    if registry.has_listeners(EventKind::InitResourceView) {
        registry.dispatch(&mut Event::InitResourceView {
            device,
            resource,
            usage,
            desc: *desc,
            view,
        });
    }
}

pub fn destroy_resource_view(registry: &Registry, device: &dyn Device, view: ResourceView) {
    if registry.has_listeners(EventKind::DestroyResourceView) {
        registry.dispatch(&mut Event::DestroyResourceView { device, view });
    }
}

pub fn init_sampler(registry: &Registry, device: &dyn Device, desc: &SamplerDesc, sampler: Sampler) {
    if registry.has_listeners(EventKind::InitSampler) {
        registry.dispatch(&mut Event::InitSampler {
            device,
            desc: *desc,
            sampler,
        });
    }
}

pub fn destroy_sampler(registry: &Registry, device: &dyn Device, sampler: Sampler) {
    if registry.has_listeners(EventKind::DestroySampler) {
        registry.dispatch(&mut Event::DestroySampler { device, sampler });
    }
}

pub fn init_pipeline(
    registry: &Registry,
    device: &dyn Device,
    layout: PipelineLayout,
    desc: &PipelineDesc<'_>,
    pipeline: Pipeline,
) {
    if registry.has_listeners(EventKind::InitPipeline) {
        registry.dispatch(&mut Event::InitPipeline {
            device,
            layout,
            desc,
            pipeline,
        });
    }
}

pub fn destroy_pipeline(registry: &Registry, device: &dyn Device, pipeline: Pipeline) {
    if registry.has_listeners(EventKind::DestroyPipeline) {
        registry.dispatch(&mut Event::DestroyPipeline { device, pipeline });
    }
}

#[cfg(test)]
mod tests {
    use tint_api::{Format, resource::MemoryHeap};

    use super::*;
    use crate::testing::NullDevice;

    fn texture() -> ResourceDesc {
        ResourceDesc::texture_2d(
            64,
            64,
            1,
            Format::R8G8B8A8Unorm,
            MemoryHeap::GpuOnly,
            ResourceUsage::SHADER_RESOURCE,
        )
    }

    #[test]
    fn no_listener_is_unchanged() {
        let registry = Registry::new();
        let device = NullDevice::default();
        assert_eq!(
            create_resource(&registry, &device, &texture(), ResourceUsage::empty()),
            Creation::Unchanged
        );
    }

    #[test]
    fn edited_desc_is_used() {
        let registry = Registry::new();
        registry.register_addon("upgrade", |r| {
            r.on(EventKind::CreateResource, |event| {
                if let Event::CreateResource { desc, .. } = event {
                    desc.format = Format::R16G16B16A16Float;
                }
                Flow::Continue
            });
        });

        let device = NullDevice::default();
        let Creation::Modified(desc) =
            create_resource(&registry, &device, &texture(), ResourceUsage::empty())
        else {
            panic!("descriptor edit was lost");
        };
        assert_eq!(desc.format, Format::R16G16B16A16Float);
    }

    #[test]
    fn handled_adopts_substitute_or_fails() {
        let registry = Registry::new();
        registry.register_addon("substitute", |r| {
            r.on(EventKind::CreateSampler, |event| {
                if let Event::CreateSampler {
                    desc, substitute, ..
                } = event
                    && desc.max_anisotropy > 1.0
                {
                    *substitute = Some(Sampler::from_raw(0x42));
                }
                Flow::Handled
            });
        });

        let device = NullDevice::default();
        let anisotropic = SamplerDesc {
            max_anisotropy: 16.0,
            ..SamplerDesc::default()
        };
        assert_eq!(
            create_sampler(&registry, &device, &anisotropic),
            Creation::Substitute(Sampler::from_raw(0x42))
        );
        assert_eq!(
            create_sampler(&registry, &device, &SamplerDesc::default()),
            Creation::Failed
        );
    }
}
