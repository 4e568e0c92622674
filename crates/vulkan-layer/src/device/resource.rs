//! Object creation hooks.
//!
//! Every hook translates the create info into the unified descriptor, runs the creation
//! event and records the created object, so commands recorded later can be described
//! to add-ons.

use core::{ffi::CStr, ptr, slice};
use std::sync::Arc;

use ash::vk::{self, Handle};
use tint::dispatch::{self, Creation};
use tint_api::{
    Device, Pipeline, PipelineLayout, Resource, ResourceView, Sampler,
    pipeline::{GraphicsDesc, InputElement, MAX_RENDER_TARGETS, PipelineDesc, PrimitiveTopology, ShaderDesc},
    resource::{ResourceDesc, ResourceUsage},
};
use tint_event::Registry;
use tracing::{debug, trace, warn};

use super::{
    DeviceImpl,
    device_impl::{
        NativeResource, NativeView, PipelineData, ResourceData, ViewData, entry_point_name,
        unpack_color,
    },
    find_in_chain, get_device,
    render_pass::raw_slice,
};
use crate::conv;

/// Usages a view can be created for.
const VIEW_USAGES: ResourceUsage = ResourceUsage::RENDER_TARGET
    .union(ResourceUsage::DEPTH_STENCIL)
    .union(ResourceUsage::SHADER_RESOURCE)
    .union(ResourceUsage::UNORDERED_ACCESS);

#[tracing::instrument]
pub(super) extern "system" fn create_buffer(
    device: vk::Device,
    info: *const vk::BufferCreateInfo<'_>,
    allocator: *const vk::AllocationCallbacks<'_>,
    buffer: *mut vk::Buffer,
) -> vk::Result {
    trace!("vkCreateBuffer called");

    let Some(device) = get_device(device) else {
        return vk::Result::ERROR_INITIALIZATION_FAILED;
    };
    let Some(info) = (unsafe { info.as_ref() }) else {
        return vk::Result::ERROR_INITIALIZATION_FAILED;
    };

    create_buffer_impl(tint::registry(), &device, info, allocator, buffer)
}

pub(crate) fn create_buffer_impl(
    registry: &Registry,
    device: &DeviceImpl,
    info: &vk::BufferCreateInfo<'_>,
    allocator: *const vk::AllocationCallbacks<'_>,
    buffer: *mut vk::Buffer,
) -> vk::Result {
    let mut desc = conv::unmap_buffer_info(info);
    let mut patched = *info;
    match dispatch::create_resource(registry, device, &desc, ResourceUsage::empty()) {
        Creation::Unchanged => {}
        Creation::Modified(modified) => {
            conv::map_buffer_info(&modified, &mut patched);
            desc = modified;
        }
        Creation::Substitute(resource) => {
            unsafe { *buffer = vk::Buffer::from_raw(resource.raw()) };
            return vk::Result::SUCCESS;
        }
        Creation::Failed => return vk::Result::ERROR_INITIALIZATION_FAILED,
    }

    let res = unsafe {
        (device.fp.fp_v1_0().create_buffer)(device.handle, &patched, allocator, buffer)
    };
    if res == vk::Result::SUCCESS {
        let buffer = unsafe { *buffer };
        register_resource(registry, device, desc, NativeResource::Buffer(buffer));
    }

    res
}

#[tracing::instrument]
pub(super) extern "system" fn destroy_buffer(
    device: vk::Device,
    buffer: vk::Buffer,
    allocator: *const vk::AllocationCallbacks<'_>,
) {
    trace!("vkDestroyBuffer called");

    let Some(device) = get_device(device) else {
        return;
    };
    release_resource(tint::registry(), &device, buffer.as_raw(), || unsafe {
        (device.fp.fp_v1_0().destroy_buffer)(device.handle, buffer, allocator)
    });
}

#[tracing::instrument]
pub(super) extern "system" fn create_image(
    device: vk::Device,
    info: *const vk::ImageCreateInfo<'_>,
    allocator: *const vk::AllocationCallbacks<'_>,
    image: *mut vk::Image,
) -> vk::Result {
    trace!("vkCreateImage called");

    let Some(device) = get_device(device) else {
        return vk::Result::ERROR_INITIALIZATION_FAILED;
    };
    let Some(info) = (unsafe { info.as_ref() }) else {
        return vk::Result::ERROR_INITIALIZATION_FAILED;
    };

    create_image_impl(tint::registry(), &device, info, allocator, image)
}

pub(crate) fn create_image_impl(
    registry: &Registry,
    device: &DeviceImpl,
    info: &vk::ImageCreateInfo<'_>,
    allocator: *const vk::AllocationCallbacks<'_>,
    image: *mut vk::Image,
) -> vk::Result {
    let initial_state = if info.initial_layout == vk::ImageLayout::PREINITIALIZED {
        ResourceUsage::CPU_ACCESS
    } else {
        ResourceUsage::empty()
    };

    let mut desc = conv::unmap_image_info(info);
    let mut patched = *info;
    match dispatch::create_resource(registry, device, &desc, initial_state) {
        Creation::Unchanged => {}
        Creation::Modified(modified) => {
            conv::map_image_info(&modified, &mut patched);
            desc = modified;
        }
        Creation::Substitute(resource) => {
            unsafe { *image = vk::Image::from_raw(resource.raw()) };
            return vk::Result::SUCCESS;
        }
        Creation::Failed => return vk::Result::ERROR_INITIALIZATION_FAILED,
    }

    let res = unsafe {
        (device.fp.fp_v1_0().create_image)(device.handle, &patched, allocator, image)
    };
    if res == vk::Result::SUCCESS {
        let image = unsafe { *image };
        register_resource(
            registry,
            device,
            desc,
            NativeResource::Image {
                image,
                format: patched.format,
            },
        );
    }

    res
}

#[tracing::instrument]
pub(super) extern "system" fn destroy_image(
    device: vk::Device,
    image: vk::Image,
    allocator: *const vk::AllocationCallbacks<'_>,
) {
    trace!("vkDestroyImage called");

    let Some(device) = get_device(device) else {
        return;
    };
    release_resource(tint::registry(), &device, image.as_raw(), || unsafe {
        (device.fp.fp_v1_0().destroy_image)(device.handle, image, allocator)
    });
}

fn register_resource(
    registry: &Registry,
    device: &DeviceImpl,
    desc: ResourceDesc,
    native: NativeResource,
) {
    let raw = match native {
        NativeResource::Buffer(buffer) => buffer.as_raw(),
        NativeResource::Image { image, .. } => image.as_raw(),
    };
    device.resources.insert(
        raw,
        ResourceData {
            desc,
            native,
            memory: vk::DeviceMemory::null(),
            owned: false,
        },
    );
    dispatch::init_resource(
        registry,
        device,
        &desc,
        ResourceUsage::empty(),
        Resource::from_raw(raw),
    );
}

/// Forgets a resource and destroys it. Substitutes created by add-ons are released
/// through the device, which owns their memory.
fn release_resource(registry: &Registry, device: &DeviceImpl, raw: u64, destroy: impl FnOnce()) {
    if raw == 0 {
        return;
    }

    let resource = Resource::from_raw(raw);
    dispatch::destroy_resource(registry, device, resource);
    if device.resources.with(raw, |data| data.owned) == Some(true) {
        device.destroy_resource(resource);
        return;
    }

    device.release_default_view(resource);
    device.resources.remove(raw);
    destroy();
}

/// Usage a view is created for, derived from its resource.
fn view_usage(device: &DeviceImpl, resource: Resource) -> ResourceUsage {
    device
        .resources
        .with(resource.raw(), |data| data.desc.usage & VIEW_USAGES)
        .unwrap_or_default()
}

#[tracing::instrument]
pub(super) extern "system" fn create_image_view(
    device: vk::Device,
    info: *const vk::ImageViewCreateInfo<'_>,
    allocator: *const vk::AllocationCallbacks<'_>,
    view: *mut vk::ImageView,
) -> vk::Result {
    trace!("vkCreateImageView called");

    let Some(device) = get_device(device) else {
        return vk::Result::ERROR_INITIALIZATION_FAILED;
    };
    let Some(info) = (unsafe { info.as_ref() }) else {
        return vk::Result::ERROR_INITIALIZATION_FAILED;
    };

    create_image_view_impl(tint::registry(), &device, info, allocator, view)
}

pub(crate) fn create_image_view_impl(
    registry: &Registry,
    device: &DeviceImpl,
    info: &vk::ImageViewCreateInfo<'_>,
    allocator: *const vk::AllocationCallbacks<'_>,
    view: *mut vk::ImageView,
) -> vk::Result {
    let resource = Resource::from_raw(info.image.as_raw());
    let usage = view_usage(device, resource);

    let mut desc = conv::unmap_image_view_info(info);
    let mut patched = *info;
    match dispatch::create_resource_view(registry, device, resource, usage, &desc) {
        Creation::Unchanged => {}
        Creation::Modified(modified) => {
            conv::map_image_view_info(&modified, &mut patched);
            desc = modified;
        }
        Creation::Substitute(substitute) => {
            unsafe { *view = vk::ImageView::from_raw(substitute.raw()) };
            return vk::Result::SUCCESS;
        }
        Creation::Failed => return vk::Result::ERROR_INITIALIZATION_FAILED,
    }

    let res = unsafe {
        (device.fp.fp_v1_0().create_image_view)(device.handle, &patched, allocator, view)
    };
    if res == vk::Result::SUCCESS {
        let handle = unsafe { *view };
        device.views.insert(
            handle.as_raw(),
            ViewData {
                resource,
                desc,
                native: NativeView::Image {
                    view: handle,
                    image: patched.image,
                    format: patched.format,
                    range: patched.subresource_range,
                },
            },
        );
        dispatch::init_resource_view(
            registry,
            device,
            resource,
            usage,
            &desc,
            ResourceView::from_raw(handle.as_raw()),
        );
    }

    res
}

#[tracing::instrument]
pub(super) extern "system" fn destroy_image_view(
    device: vk::Device,
    view: vk::ImageView,
    allocator: *const vk::AllocationCallbacks<'_>,
) {
    trace!("vkDestroyImageView called");

    let Some(device) = get_device(device) else {
        return;
    };
    release_view(tint::registry(), &device, view.as_raw(), || unsafe {
        (device.fp.fp_v1_0().destroy_image_view)(device.handle, view, allocator)
    });
}

#[tracing::instrument]
pub(super) extern "system" fn create_buffer_view(
    device: vk::Device,
    info: *const vk::BufferViewCreateInfo<'_>,
    allocator: *const vk::AllocationCallbacks<'_>,
    view: *mut vk::BufferView,
) -> vk::Result {
    trace!("vkCreateBufferView called");

    let Some(device) = get_device(device) else {
        return vk::Result::ERROR_INITIALIZATION_FAILED;
    };
    let Some(info) = (unsafe { info.as_ref() }) else {
        return vk::Result::ERROR_INITIALIZATION_FAILED;
    };
    let registry = tint::registry();

    let resource = Resource::from_raw(info.buffer.as_raw());
    let usage = view_usage(&device, resource);
    let mut desc = conv::unmap_buffer_view_info(info);
    let mut patched = *info;
    match dispatch::create_resource_view(registry, &*device, resource, usage, &desc) {
        Creation::Unchanged => {}
        Creation::Modified(modified) => {
            conv::map_buffer_view_info(&modified, &mut patched);
            desc = modified;
        }
        Creation::Substitute(substitute) => {
            unsafe { *view = vk::BufferView::from_raw(substitute.raw()) };
            return vk::Result::SUCCESS;
        }
        Creation::Failed => return vk::Result::ERROR_INITIALIZATION_FAILED,
    }

    let res = unsafe {
        (device.fp.fp_v1_0().create_buffer_view)(device.handle, &patched, allocator, view)
    };
    if res == vk::Result::SUCCESS {
        let handle = unsafe { *view };
        device.views.insert(
            handle.as_raw(),
            ViewData {
                resource,
                desc,
                native: NativeView::Buffer(handle),
            },
        );
        dispatch::init_resource_view(
            registry,
            &*device,
            resource,
            usage,
            &desc,
            ResourceView::from_raw(handle.as_raw()),
        );
    }

    res
}

#[tracing::instrument]
pub(super) extern "system" fn destroy_buffer_view(
    device: vk::Device,
    view: vk::BufferView,
    allocator: *const vk::AllocationCallbacks<'_>,
) {
    trace!("vkDestroyBufferView called");

    let Some(device) = get_device(device) else {
        return;
    };
    release_view(tint::registry(), &device, view.as_raw(), || unsafe {
        (device.fp.fp_v1_0().destroy_buffer_view)(device.handle, view, allocator)
    });
}

fn release_view(registry: &Registry, device: &DeviceImpl, raw: u64, destroy: impl FnOnce()) {
    if raw == 0 {
        return;
    }

    dispatch::destroy_resource_view(registry, device, ResourceView::from_raw(raw));
    device.views.remove(raw);
    destroy();
}

#[tracing::instrument]
pub(super) extern "system" fn create_sampler(
    device: vk::Device,
    info: *const vk::SamplerCreateInfo<'_>,
    allocator: *const vk::AllocationCallbacks<'_>,
    sampler: *mut vk::Sampler,
) -> vk::Result {
    trace!("vkCreateSampler called");

    let Some(device) = get_device(device) else {
        return vk::Result::ERROR_INITIALIZATION_FAILED;
    };
    let Some(info) = (unsafe { info.as_ref() }) else {
        return vk::Result::ERROR_INITIALIZATION_FAILED;
    };
    let registry = tint::registry();

    let mut desc = conv::unmap_sampler_info(info);
    let mut patched = *info;
    match dispatch::create_sampler(registry, &*device, &desc) {
        Creation::Unchanged => {}
        Creation::Modified(modified) => {
            let mapped = conv::map_sampler_info(&modified);
            patched = vk::SamplerCreateInfo {
                p_next: info.p_next,
                flags: info.flags,
                border_color: info.border_color,
                unnormalized_coordinates: info.unnormalized_coordinates,
                ..mapped
            };
            desc = modified;
        }
        Creation::Substitute(substitute) => {
            unsafe { *sampler = vk::Sampler::from_raw(substitute.raw()) };
            return vk::Result::SUCCESS;
        }
        Creation::Failed => return vk::Result::ERROR_INITIALIZATION_FAILED,
    }

    let res = unsafe {
        (device.fp.fp_v1_0().create_sampler)(device.handle, &patched, allocator, sampler)
    };
    if res == vk::Result::SUCCESS {
        let handle = unsafe { *sampler };
        device.samplers.insert(handle.as_raw(), desc);
        dispatch::init_sampler(registry, &*device, &desc, Sampler::from_raw(handle.as_raw()));
    }

    res
}

#[tracing::instrument]
pub(super) extern "system" fn destroy_sampler(
    device: vk::Device,
    sampler: vk::Sampler,
    allocator: *const vk::AllocationCallbacks<'_>,
) {
    trace!("vkDestroySampler called");

    let Some(device) = get_device(device) else {
        return;
    };
    if !sampler.is_null() {
        dispatch::destroy_sampler(tint::registry(), &*device, Sampler::from_raw(sampler.as_raw()));
        device.samplers.remove(sampler.as_raw());
    }

    unsafe { (device.fp.fp_v1_0().destroy_sampler)(device.handle, sampler, allocator) }
}

#[tracing::instrument]
pub(super) extern "system" fn create_shader_module(
    device: vk::Device,
    info: *const vk::ShaderModuleCreateInfo<'_>,
    allocator: *const vk::AllocationCallbacks<'_>,
    module: *mut vk::ShaderModule,
) -> vk::Result {
    trace!("vkCreateShaderModule called");

    let Some(device) = get_device(device) else {
        return vk::Result::ERROR_INITIALIZATION_FAILED;
    };
    let res = unsafe {
        (device.fp.fp_v1_0().create_shader_module)(device.handle, info, allocator, module)
    };

    // Pipelines describe their shaders by code, modules only live until then
    if res == vk::Result::SUCCESS
        && let Some(info) = unsafe { info.as_ref() }
        && !info.p_code.is_null()
    {
        let code = unsafe { slice::from_raw_parts(info.p_code.cast::<u8>(), info.code_size) };
        device
            .shader_modules
            .insert(unsafe { *module }.as_raw(), Arc::from(code));
    }

    res
}

#[tracing::instrument]
pub(super) extern "system" fn destroy_shader_module(
    device: vk::Device,
    module: vk::ShaderModule,
    allocator: *const vk::AllocationCallbacks<'_>,
) {
    trace!("vkDestroyShaderModule called");

    let Some(device) = get_device(device) else {
        return;
    };
    device.shader_modules.remove(module.as_raw());
    unsafe { (device.fp.fp_v1_0().destroy_shader_module)(device.handle, module, allocator) }
}

/// Code and entry point of a pipeline stage, kept alive while a descriptor borrows them.
pub(crate) struct StageSource {
    stage: vk::ShaderStageFlags,
    code: Arc<[u8]>,
    entry_point: String,
}

fn stage_sources(
    device: &DeviceImpl,
    stages: &[vk::PipelineShaderStageCreateInfo<'_>],
) -> Vec<StageSource> {
    stages
        .iter()
        .filter_map(|stage| {
            let Some(code) = device.shader_modules.with(stage.module.as_raw(), Arc::clone) else {
                debug!("stage {:?} uses an unknown module", stage.stage);
                return None;
            };
            let entry_point = if stage.p_name.is_null() {
                "main".to_string()
            } else {
                unsafe { CStr::from_ptr(stage.p_name) }
                    .to_string_lossy()
                    .into_owned()
            };

            Some(StageSource {
                stage: stage.stage,
                code,
                entry_point,
            })
        })
        .collect()
}

fn shader(sources: &[StageSource], stage: vk::ShaderStageFlags) -> Option<ShaderDesc<'_>> {
    sources
        .iter()
        .find(|source| source.stage == stage)
        .map(|source| ShaderDesc {
            code: &source.code,
            entry_point: Some(&source.entry_point),
        })
}

/// Unified description of a native graphics pipeline.
pub(crate) fn graphics_desc<'a>(
    device: &DeviceImpl,
    info: &vk::GraphicsPipelineCreateInfo<'_>,
    sources: &'a [StageSource],
) -> GraphicsDesc<'a> {
    let mut desc = GraphicsDesc {
        vertex_shader: shader(sources, vk::ShaderStageFlags::VERTEX),
        hull_shader: shader(sources, vk::ShaderStageFlags::TESSELLATION_CONTROL),
        domain_shader: shader(sources, vk::ShaderStageFlags::TESSELLATION_EVALUATION),
        geometry_shader: shader(sources, vk::ShaderStageFlags::GEOMETRY),
        pixel_shader: shader(sources, vk::ShaderStageFlags::FRAGMENT),
        ..GraphicsDesc::default()
    };

    if let Some(input) = unsafe { info.p_vertex_input_state.as_ref() } {
        let bindings = unsafe {
            raw_slice(
                input.p_vertex_binding_descriptions,
                input.vertex_binding_description_count,
            )
        };
        let attributes = unsafe {
            raw_slice(
                input.p_vertex_attribute_descriptions,
                input.vertex_attribute_description_count,
            )
        };

        desc.input_layout = attributes
            .iter()
            .map(|attribute| {
                let binding = bindings
                    .iter()
                    .find(|binding| binding.binding == attribute.binding);
                InputElement {
                    location: attribute.location,
                    semantic: "TEXCOORD",
                    semantic_index: attribute.location,
                    format: conv::unmap_format(attribute.format),
                    buffer_binding: attribute.binding,
                    offset: attribute.offset,
                    stride: binding.map_or(0, |binding| binding.stride),
                    instance_step_rate: binding.map_or(0, |binding| {
                        (binding.input_rate == vk::VertexInputRate::INSTANCE) as u32
                    }),
                }
            })
            .collect();
    }

    let patch_points = unsafe { info.p_tessellation_state.as_ref() }
        .map_or(0, |state| state.patch_control_points);
    if let Some(state) = unsafe { info.p_input_assembly_state.as_ref() } {
        desc.topology = conv::unmap_topology(state.topology, patch_points);
    }
    if let Some(state) = unsafe { info.p_viewport_state.as_ref() } {
        desc.viewport_count = state.viewport_count;
    }
    if let Some(state) = unsafe { info.p_rasterization_state.as_ref() } {
        desc.rasterizer_state = conv::unmap_rasterizer_state(state);
    }
    if let Some(state) = unsafe { info.p_color_blend_state.as_ref() } {
        desc.blend_state = conv::unmap_blend_state(state);
    }
    if let Some(state) = unsafe { info.p_multisample_state.as_ref() } {
        desc.sample_count = state.rasterization_samples.as_raw().max(1);
        desc.sample_mask = unsafe { state.p_sample_mask.as_ref() }
            .copied()
            .unwrap_or(u32::MAX);
        desc.blend_state.alpha_to_coverage_enable = state.alpha_to_coverage_enable != vk::FALSE;
        desc.rasterizer_state.multisample_enable = desc.sample_count > 1;
    }
    match unsafe { info.p_depth_stencil_state.as_ref() } {
        Some(state) => desc.depth_stencil_state = conv::unmap_depth_stencil_state(state),
        None => {
            desc.depth_stencil_state.depth_enable = false;
            desc.depth_stencil_state.depth_write_mask = false;
        }
    }
    if let Some(state) = unsafe { info.p_dynamic_state.as_ref() } {
        desc.dynamic_states = unsafe { raw_slice(state.p_dynamic_states, state.dynamic_state_count) }
            .iter()
            .filter_map(|&state| conv::unmap_dynamic_state(state))
            .collect();
    }

    let (colors, depth_stencil) = attachment_formats(device, info);
    for (slot, format) in desc.render_target_formats.iter_mut().zip(colors) {
        *slot = conv::unmap_format(format);
    }
    desc.depth_stencil_format = conv::unmap_format(depth_stencil);
    desc
}

/// Color and depth stencil formats a pipeline renders to, from its render pass or
/// its dynamic rendering info.
fn attachment_formats(
    device: &DeviceImpl,
    info: &vk::GraphicsPipelineCreateInfo<'_>,
) -> (Vec<vk::Format>, vk::Format) {
    if !info.render_pass.is_null() {
        let formats = device.render_passes.with(info.render_pass.as_raw(), |pass| {
            let format = |attachment: u32| {
                pass.attachments
                    .get(attachment as usize)
                    .map_or(vk::Format::UNDEFINED, |attachment| attachment.format)
            };
            let Some(subpass) = pass.subpasses.get(info.subpass as usize) else {
                return (Vec::new(), vk::Format::UNDEFINED);
            };
            (
                subpass.colors.iter().map(|&attachment| format(attachment)).collect(),
                subpass.depth_stencil.map_or(vk::Format::UNDEFINED, format),
            )
        });
        return formats.unwrap_or((Vec::new(), vk::Format::UNDEFINED));
    }

    let Some(rendering) = (unsafe {
        find_in_chain::<vk::PipelineRenderingCreateInfo<'_>>(
            info.p_next,
            vk::StructureType::PIPELINE_RENDERING_CREATE_INFO,
        )
    }) else {
        return (Vec::new(), vk::Format::UNDEFINED);
    };
    let rendering = unsafe { rendering.as_ref() };
    let colors = unsafe {
        raw_slice(
            rendering.p_color_attachment_formats,
            rendering.color_attachment_count,
        )
    };
    let depth_stencil = if rendering.depth_attachment_format != vk::Format::UNDEFINED {
        rendering.depth_attachment_format
    } else {
        rendering.stencil_attachment_format
    };

    (colors.iter().take(MAX_RENDER_TARGETS).copied().collect(), depth_stencil)
}

fn native_error(err: tint_api::Error) -> vk::Result {
    warn!("cannot rebuild edited pipeline. err: {err}");
    vk::Result::ERROR_INITIALIZATION_FAILED
}

/// Creates one graphics pipeline with state rebuilt from an edited descriptor.
///
/// Fixed function state the descriptor doesn't cover stays as the application gave it.
fn create_edited_graphics(
    device: &DeviceImpl,
    cache: vk::PipelineCache,
    info: &vk::GraphicsPipelineCreateInfo<'_>,
    desc: &GraphicsDesc<'_>,
    allocator: *const vk::AllocationCallbacks<'_>,
) -> Result<vk::Pipeline, vk::Result> {
    let mut modules = scopeguard::guard(Vec::new(), |modules: Vec<vk::ShaderModule>| {
        for module in modules {
            unsafe { device.fp.destroy_shader_module(module, None) };
        }
    });

    let mut stages = Vec::new();
    for (shader, stage) in [
        (&desc.vertex_shader, vk::ShaderStageFlags::VERTEX),
        (&desc.hull_shader, vk::ShaderStageFlags::TESSELLATION_CONTROL),
        (&desc.domain_shader, vk::ShaderStageFlags::TESSELLATION_EVALUATION),
        (&desc.geometry_shader, vk::ShaderStageFlags::GEOMETRY),
        (&desc.pixel_shader, vk::ShaderStageFlags::FRAGMENT),
    ] {
        let Some(shader) = shader else {
            continue;
        };
        let module = device.create_shader_module(shader).map_err(native_error)?;
        modules.push(module);
        stages.push((stage, module, entry_point_name(shader).map_err(native_error)?));
    }
    let stage_infos: Vec<vk::PipelineShaderStageCreateInfo> = stages
        .iter()
        .map(|(stage, module, name)| {
            vk::PipelineShaderStageCreateInfo::default()
                .stage(*stage)
                .module(*module)
                .name(name)
        })
        .collect();

    let input_assembly = vk::PipelineInputAssemblyStateCreateInfo::default().topology(
        conv::map_topology(desc.topology).unwrap_or(vk::PrimitiveTopology::TRIANGLE_LIST),
    );
    let tessellation = match desc.topology {
        PrimitiveTopology::PatchList(points) => Some(
            vk::PipelineTessellationStateCreateInfo::default().patch_control_points(points as u32),
        ),
        _ => None,
    };
    let rasterization = conv::map_rasterizer_state(&desc.rasterizer_state);
    let depth_stencil = conv::map_depth_stencil_state(&desc.depth_stencil_state);
    let sample_mask = [desc.sample_mask];
    let multisample = vk::PipelineMultisampleStateCreateInfo::default()
        .rasterization_samples(vk::SampleCountFlags::from_raw(desc.sample_count.max(1)))
        .sample_mask(&sample_mask)
        .alpha_to_coverage_enable(desc.blend_state.alpha_to_coverage_enable);

    let mut patched = *info;
    patched.stage_count = stage_infos.len() as u32;
    patched.p_stages = stage_infos.as_ptr();
    patched.p_input_assembly_state = &input_assembly;
    patched.p_rasterization_state = &rasterization;
    patched.p_depth_stencil_state = &depth_stencil;
    patched.p_multisample_state = &multisample;
    if let Some(tessellation) = &tessellation {
        patched.p_tessellation_state = tessellation;
    }

    let mut color_blend;
    let attachments;
    if let Some(original) = unsafe { info.p_color_blend_state.as_ref() } {
        attachments = conv::map_blend_attachments(
            &desc.blend_state,
            (original.attachment_count as usize).min(MAX_RENDER_TARGETS),
        );
        color_blend = *original;
        color_blend.attachment_count = attachments.len() as u32;
        color_blend.p_attachments = attachments.as_ptr();
        color_blend.logic_op_enable = desc.blend_state.logic_op_enable[0] as vk::Bool32;
        color_blend.logic_op = conv::map_logic_op(desc.blend_state.logic_op[0]);
        color_blend.blend_constants = unpack_color(desc.blend_state.blend_constant);
        patched.p_color_blend_state = &color_blend;
    }

    let mut pipeline = vk::Pipeline::null();
    let res = unsafe {
        (device.fp.fp_v1_0().create_graphics_pipelines)(
            device.handle,
            cache,
            1,
            &patched,
            allocator,
            &mut pipeline,
        )
    };
    if res != vk::Result::SUCCESS {
        return Err(res);
    }
    Ok(pipeline)
}

fn create_edited_compute(
    device: &DeviceImpl,
    cache: vk::PipelineCache,
    info: &vk::ComputePipelineCreateInfo<'_>,
    shader: &ShaderDesc<'_>,
    allocator: *const vk::AllocationCallbacks<'_>,
) -> Result<vk::Pipeline, vk::Result> {
    let module = device.create_shader_module(shader).map_err(native_error)?;
    scopeguard::defer! {
        unsafe { device.fp.destroy_shader_module(module, None) };
    }
    let name = entry_point_name(shader).map_err(native_error)?;

    let mut patched = *info;
    patched.stage.module = module;
    patched.stage.p_name = name.as_ptr();

    let mut pipeline = vk::Pipeline::null();
    let res = unsafe {
        (device.fp.fp_v1_0().create_compute_pipelines)(
            device.handle,
            cache,
            1,
            &patched,
            allocator,
            &mut pipeline,
        )
    };
    if res != vk::Result::SUCCESS {
        return Err(res);
    }
    Ok(pipeline)
}

/// Runs the creation events of a batch and creates what the add-ons left to the driver.
///
/// One vetoed pipeline fails the whole batch. A batch nobody edited is forwarded in one call,
/// otherwise pipelines are created one by one.
#[allow(clippy::too_many_arguments)]
fn create_pipelines<'a, I>(
    registry: &Registry,
    device: &'a DeviceImpl,
    infos: &[I],
    descs: &[PipelineDesc<'a>],
    layout: impl Fn(&I) -> vk::PipelineLayout,
    bind_point: vk::PipelineBindPoint,
    out: &mut [vk::Pipeline],
    forward: impl Fn(&[I], &mut [vk::Pipeline]) -> vk::Result,
    create_edited: impl Fn(&I, &PipelineDesc<'a>) -> Result<vk::Pipeline, vk::Result>,
) -> vk::Result {
    let outcomes: Vec<Creation<PipelineDesc<'a>, Pipeline>> = infos
        .iter()
        .zip(descs)
        .map(|(info, desc)| {
            dispatch::create_pipeline(
                registry,
                device,
                PipelineLayout::from_raw(layout(info).as_raw()),
                desc,
            )
        })
        .collect();

    if outcomes.iter().any(|outcome| matches!(outcome, Creation::Failed)) {
        debug!("pipeline batch of {} vetoed", infos.len());
        out.fill(vk::Pipeline::null());
        return vk::Result::ERROR_INITIALIZATION_FAILED;
    }

    let res = if outcomes
        .iter()
        .all(|outcome| matches!(outcome, Creation::Unchanged))
    {
        forward(infos, out)
    } else {
        let mut res = vk::Result::SUCCESS;
        for (i, outcome) in outcomes.iter().enumerate() {
            let created = match outcome {
                Creation::Substitute(pipeline) => Ok(vk::Pipeline::from_raw(pipeline.raw())),
                Creation::Modified(desc) => create_edited(&infos[i], desc),
                _ => {
                    let mut pipeline = [vk::Pipeline::null()];
                    match forward(slice::from_ref(&infos[i]), &mut pipeline) {
                        vk::Result::SUCCESS => Ok(pipeline[0]),
                        err => Err(err),
                    }
                }
            };

            match created {
                Ok(pipeline) => out[i] = pipeline,
                Err(err) => {
                    out[i] = vk::Pipeline::null();
                    res = err;
                }
            }
        }
        res
    };

    for (i, &pipeline) in out.iter().enumerate() {
        if pipeline.is_null() || device.pipelines.contains(pipeline.as_raw()) {
            continue;
        }

        device.pipelines.insert(
            pipeline.as_raw(),
            PipelineData {
                bind_point,
                owned: false,
            },
        );
        let desc = match &outcomes[i] {
            Creation::Modified(desc) => desc,
            _ => &descs[i],
        };
        dispatch::init_pipeline(
            registry,
            device,
            PipelineLayout::from_raw(layout(&infos[i]).as_raw()),
            desc,
            Pipeline::from_raw(pipeline.as_raw()),
        );
    }

    res
}

unsafe fn out_slice<'a, T>(ptr: *mut T, len: u32) -> &'a mut [T] {
    if ptr.is_null() || len == 0 {
        &mut []
    } else {
        unsafe { slice::from_raw_parts_mut(ptr, len as usize) }
    }
}

#[tracing::instrument]
pub(super) extern "system" fn create_graphics_pipelines(
    device: vk::Device,
    cache: vk::PipelineCache,
    count: u32,
    infos: *const vk::GraphicsPipelineCreateInfo<'_>,
    allocator: *const vk::AllocationCallbacks<'_>,
    pipelines: *mut vk::Pipeline,
) -> vk::Result {
    trace!("vkCreateGraphicsPipelines called");

    let Some(device) = get_device(device) else {
        return vk::Result::ERROR_INITIALIZATION_FAILED;
    };
    let infos = unsafe { raw_slice(infos, count) };
    let out = unsafe { out_slice(pipelines, count) };

    create_graphics_pipelines_impl(tint::registry(), &device, cache, infos, allocator, out)
}

pub(crate) fn create_graphics_pipelines_impl(
    registry: &Registry,
    device: &DeviceImpl,
    cache: vk::PipelineCache,
    infos: &[vk::GraphicsPipelineCreateInfo<'_>],
    allocator: *const vk::AllocationCallbacks<'_>,
    out: &mut [vk::Pipeline],
) -> vk::Result {
    let sources: Vec<Vec<StageSource>> = infos
        .iter()
        .map(|info| stage_sources(device, unsafe { raw_slice(info.p_stages, info.stage_count) }))
        .collect();
    let descs: Vec<PipelineDesc<'_>> = infos
        .iter()
        .zip(&sources)
        .map(|(info, sources)| PipelineDesc::Graphics(Box::new(graphics_desc(device, info, sources))))
        .collect();

    create_pipelines(
        registry,
        device,
        infos,
        &descs,
        |info| info.layout,
        vk::PipelineBindPoint::GRAPHICS,
        out,
        |infos, out| unsafe {
            (device.fp.fp_v1_0().create_graphics_pipelines)(
                device.handle,
                cache,
                infos.len() as u32,
                infos.as_ptr(),
                allocator,
                out.as_mut_ptr(),
            )
        },
        |info, desc| match desc {
            PipelineDesc::Graphics(desc) => {
                create_edited_graphics(device, cache, info, desc, allocator)
            }
            _ => {
                warn!("graphics pipeline edited into {:?}", desc.ty());
                Err(vk::Result::ERROR_INITIALIZATION_FAILED)
            }
        },
    )
}

#[tracing::instrument]
pub(super) extern "system" fn create_compute_pipelines(
    device: vk::Device,
    cache: vk::PipelineCache,
    count: u32,
    infos: *const vk::ComputePipelineCreateInfo<'_>,
    allocator: *const vk::AllocationCallbacks<'_>,
    pipelines: *mut vk::Pipeline,
) -> vk::Result {
    trace!("vkCreateComputePipelines called");

    let Some(device) = get_device(device) else {
        return vk::Result::ERROR_INITIALIZATION_FAILED;
    };
    let infos = unsafe { raw_slice(infos, count) };
    let out = unsafe { out_slice(pipelines, count) };
    let sources: Vec<Vec<StageSource>> = infos
        .iter()
        .map(|info| stage_sources(&device, slice::from_ref(&info.stage)))
        .collect();
    let descs: Vec<PipelineDesc<'_>> = sources
        .iter()
        .map(|sources| {
            PipelineDesc::Compute(
                shader(sources, vk::ShaderStageFlags::COMPUTE).unwrap_or_default(),
            )
        })
        .collect();

    create_pipelines(
        tint::registry(),
        &device,
        infos,
        &descs,
        |info| info.layout,
        vk::PipelineBindPoint::COMPUTE,
        out,
        |infos, out| unsafe {
            (device.fp.fp_v1_0().create_compute_pipelines)(
                device.handle,
                cache,
                infos.len() as u32,
                infos.as_ptr(),
                allocator,
                out.as_mut_ptr(),
            )
        },
        |info, desc| match desc {
            PipelineDesc::Compute(shader) => {
                create_edited_compute(&device, cache, info, shader, allocator)
            }
            _ => {
                warn!("compute pipeline edited into {:?}", desc.ty());
                Err(vk::Result::ERROR_INITIALIZATION_FAILED)
            }
        },
    )
}

#[tracing::instrument]
pub(super) extern "system" fn destroy_pipeline(
    device: vk::Device,
    pipeline: vk::Pipeline,
    allocator: *const vk::AllocationCallbacks<'_>,
) {
    trace!("vkDestroyPipeline called");

    let Some(device) = get_device(device) else {
        return;
    };
    if !pipeline.is_null() {
        let handle = Pipeline::from_raw(pipeline.as_raw());
        dispatch::destroy_pipeline(tint::registry(), &*device, handle);
        if device.pipelines.with(pipeline.as_raw(), |data| data.owned) == Some(true) {
            device.destroy_pipeline(handle);
            return;
        }
        device.pipelines.remove(pipeline.as_raw());
    }

    unsafe { (device.fp.fp_v1_0().destroy_pipeline)(device.handle, pipeline, allocator) }
}

#[cfg(test)]
mod tests {
    use core::{
        ffi::{CStr, c_char},
        mem,
        sync::atomic::{AtomicUsize, Ordering},
    };

    use parking_lot::Mutex;
    use tint_api::{
        Format,
        pipeline::{BlendFactor, CullMode},
        resource::ResourceDimension,
    };
    use tint_event::{Event, EventKind, Flow};

    use super::*;
    use crate::device::device_impl::tests::offline_device;

    static IMAGE_FORMATS: Mutex<Vec<vk::Format>> = Mutex::new(Vec::new());
    static PIPELINE_CALLS: AtomicUsize = AtomicUsize::new(0);

    unsafe extern "system" fn mock_create_image(
        _device: vk::Device,
        info: *const vk::ImageCreateInfo<'_>,
        _allocator: *const vk::AllocationCallbacks<'_>,
        image: *mut vk::Image,
    ) -> vk::Result {
        let mut formats = IMAGE_FORMATS.lock();
        formats.push(unsafe { (*info).format });
        unsafe { *image = vk::Image::from_raw(0x9000 + formats.len() as u64) };
        vk::Result::SUCCESS
    }

    unsafe extern "system" fn mock_destroy_image(
        _device: vk::Device,
        _image: vk::Image,
        _allocator: *const vk::AllocationCallbacks<'_>,
    ) {
    }

    unsafe extern "system" fn mock_create_graphics_pipelines(
        _device: vk::Device,
        _cache: vk::PipelineCache,
        count: u32,
        _infos: *const vk::GraphicsPipelineCreateInfo<'_>,
        _allocator: *const vk::AllocationCallbacks<'_>,
        pipelines: *mut vk::Pipeline,
    ) -> vk::Result {
        let first = PIPELINE_CALLS.fetch_add(1, Ordering::Relaxed) as u64 * 0x10;
        for i in 0..count as usize {
            unsafe { *pipelines.add(i) = vk::Pipeline::from_raw(0xa000 + first + i as u64) };
        }
        vk::Result::SUCCESS
    }

    unsafe extern "system" fn mock_proc_addr(
        _device: vk::Device,
        name: *const c_char,
    ) -> vk::PFN_vkVoidFunction {
        match unsafe { CStr::from_ptr(name) }.to_bytes() {
            b"vkCreateImage" => unsafe {
                mem::transmute::<vk::PFN_vkCreateImage, vk::PFN_vkVoidFunction>(mock_create_image)
            },
            b"vkDestroyImage" => unsafe {
                mem::transmute::<vk::PFN_vkDestroyImage, vk::PFN_vkVoidFunction>(mock_destroy_image)
            },
            b"vkCreateGraphicsPipelines" => unsafe {
                mem::transmute::<vk::PFN_vkCreateGraphicsPipelines, vk::PFN_vkVoidFunction>(
                    mock_create_graphics_pipelines,
                )
            },
            _ => None,
        }
    }

    #[test]
    fn image_creation_follows_addon_edits() {
        let device = offline_device(Some(mock_proc_addr));
        let registry = Registry::new();
        let initialized = Arc::new(Mutex::new(Vec::new()));
        registry.register_addon("hdr", {
            let initialized = initialized.clone();
            move |r| {
                r.on(EventKind::CreateResource, |event| {
                    if let Event::CreateResource { desc, .. } = event
                        && desc.format == Format::R8G8B8A8Unorm
                    {
                        desc.format = Format::R16G16B16A16Float;
                    }
                    Flow::Continue
                });
                r.on(EventKind::InitResource, move |event| {
                    if let Event::InitResource { resource, desc, .. } = event {
                        initialized.lock().push((*resource, desc.format));
                    }
                    Flow::Continue
                });
            }
        });

        let info = vk::ImageCreateInfo::default()
            .image_type(vk::ImageType::TYPE_2D)
            .format(vk::Format::R8G8B8A8_UNORM)
            .extent(vk::Extent3D {
                width: 256,
                height: 256,
                depth: 1,
            })
            .mip_levels(1)
            .array_layers(1)
            .samples(vk::SampleCountFlags::TYPE_1)
            .usage(vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::SAMPLED);

        let mut image = vk::Image::null();
        assert_eq!(
            create_image_impl(&registry, &device, &info, ptr::null(), &mut image),
            vk::Result::SUCCESS
        );
        assert_eq!(
            IMAGE_FORMATS.lock().last(),
            Some(&vk::Format::R16G16B16A16_SFLOAT)
        );

        let resource = Resource::from_raw(image.as_raw());
        let desc = device.get_resource_desc(resource).unwrap();
        assert_eq!(desc.format, Format::R16G16B16A16Float);
        assert!(matches!(
            desc.dimension,
            ResourceDimension::Texture2d {
                width: 256,
                height: 256,
                ..
            }
        ));
        assert_eq!(
            *initialized.lock(),
            [(resource, Format::R16G16B16A16Float)]
        );

        release_resource(&registry, &device, image.as_raw(), || {});
        assert!(device.get_resource_desc(resource).is_none());
    }

    fn vertex_shader_module(device: &DeviceImpl) -> vk::ShaderModule {
        let module = vk::ShaderModule::from_raw(0x77);
        device
            .shader_modules
            .insert(module.as_raw(), Arc::from(&[0x03, 0x02, 0x23, 0x07][..]));
        module
    }

    #[test]
    fn graphics_desc_reads_native_state() {
        let device = offline_device(None);
        let module = vertex_shader_module(&device);

        let stages = [vk::PipelineShaderStageCreateInfo::default()
            .stage(vk::ShaderStageFlags::VERTEX)
            .module(module)
            .name(c"VSMain")];
        let bindings = [vk::VertexInputBindingDescription {
            binding: 0,
            stride: 20,
            input_rate: vk::VertexInputRate::VERTEX,
        }];
        let attributes = [vk::VertexInputAttributeDescription {
            location: 1,
            binding: 0,
            format: vk::Format::R32G32_SFLOAT,
            offset: 12,
        }];
        let vertex_input = vk::PipelineVertexInputStateCreateInfo::default()
            .vertex_binding_descriptions(&bindings)
            .vertex_attribute_descriptions(&attributes);
        let input_assembly = vk::PipelineInputAssemblyStateCreateInfo::default()
            .topology(vk::PrimitiveTopology::TRIANGLE_STRIP);
        let rasterization = vk::PipelineRasterizationStateCreateInfo::default()
            .cull_mode(vk::CullModeFlags::FRONT)
            .polygon_mode(vk::PolygonMode::FILL);
        let blend_attachments = [vk::PipelineColorBlendAttachmentState {
            blend_enable: vk::TRUE,
            src_color_blend_factor: vk::BlendFactor::SRC_ALPHA,
            dst_color_blend_factor: vk::BlendFactor::ONE_MINUS_SRC_ALPHA,
            color_write_mask: vk::ColorComponentFlags::RGBA,
            ..Default::default()
        }];
        let color_blend =
            vk::PipelineColorBlendStateCreateInfo::default().attachments(&blend_attachments);
        let color_formats = [vk::Format::B8G8R8A8_UNORM];
        let mut rendering = vk::PipelineRenderingCreateInfo::default()
            .color_attachment_formats(&color_formats)
            .depth_attachment_format(vk::Format::D32_SFLOAT);

        let info = vk::GraphicsPipelineCreateInfo::default()
            .stages(&stages)
            .vertex_input_state(&vertex_input)
            .input_assembly_state(&input_assembly)
            .rasterization_state(&rasterization)
            .color_blend_state(&color_blend)
            .push_next(&mut rendering);

        let sources = stage_sources(&device, &stages);
        let desc = graphics_desc(&device, &info, &sources);

        let vertex = desc.vertex_shader.unwrap();
        assert_eq!(vertex.code, [0x03, 0x02, 0x23, 0x07]);
        assert_eq!(vertex.entry_point, Some("VSMain"));
        assert!(desc.pixel_shader.is_none());

        assert_eq!(desc.input_layout.len(), 1);
        assert_eq!(desc.input_layout[0].format, Format::R32G32Float);
        assert_eq!(desc.input_layout[0].stride, 20);
        assert_eq!(desc.input_layout[0].offset, 12);

        assert_eq!(desc.topology, PrimitiveTopology::TriangleStrip);
        assert_eq!(desc.rasterizer_state.cull_mode, CullMode::Front);
        assert!(desc.blend_state.blend_enable[0]);
        assert_eq!(
            desc.blend_state.dest_color_blend_factor[0],
            BlendFactor::OneMinusSourceAlpha
        );
        assert!(!desc.depth_stencil_state.depth_enable);
        assert_eq!(desc.render_target_count(), 1);
        assert_eq!(desc.render_target_formats[0], Format::B8G8R8A8Unorm);
        assert_eq!(desc.depth_stencil_format, Format::D32Float);
    }

    #[test]
    fn vetoed_pipeline_fails_whole_batch() {
        let device = offline_device(Some(mock_proc_addr));
        let module = vertex_shader_module(&device);
        let registry = Registry::new();
        registry.register_addon("veto", |r| {
            r.on(EventKind::CreatePipeline, |event| match event {
                Event::CreatePipeline {
                    desc: PipelineDesc::Graphics(desc),
                    ..
                } if desc.topology == PrimitiveTopology::PointList => Flow::Handled,
                _ => Flow::Continue,
            });
        });

        let stages = [vk::PipelineShaderStageCreateInfo::default()
            .stage(vk::ShaderStageFlags::VERTEX)
            .module(module)
            .name(c"main")];
        let triangles = vk::PipelineInputAssemblyStateCreateInfo::default()
            .topology(vk::PrimitiveTopology::TRIANGLE_LIST);
        let points = vk::PipelineInputAssemblyStateCreateInfo::default()
            .topology(vk::PrimitiveTopology::POINT_LIST);
        let infos = [
            vk::GraphicsPipelineCreateInfo::default()
                .stages(&stages)
                .input_assembly_state(&triangles),
            vk::GraphicsPipelineCreateInfo::default()
                .stages(&stages)
                .input_assembly_state(&points),
        ];

        let calls = PIPELINE_CALLS.load(Ordering::Relaxed);
        let mut out = [vk::Pipeline::from_raw(1); 2];
        assert_eq!(
            create_graphics_pipelines_impl(
                &registry,
                &device,
                vk::PipelineCache::null(),
                &infos,
                ptr::null(),
                &mut out
            ),
            vk::Result::ERROR_INITIALIZATION_FAILED
        );
        assert_eq!(out, [vk::Pipeline::null(); 2]);
        assert_eq!(PIPELINE_CALLS.load(Ordering::Relaxed), calls);

        // Without the point list the batch goes through in one driver call
        assert_eq!(
            create_graphics_pipelines_impl(
                &registry,
                &device,
                vk::PipelineCache::null(),
                &infos[..1],
                ptr::null(),
                &mut out[..1]
            ),
            vk::Result::SUCCESS
        );
        assert!(!out[0].is_null());
        assert!(device.pipelines.contains(out[0].as_raw()));
    }
}
