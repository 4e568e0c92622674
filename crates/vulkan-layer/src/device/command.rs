//! Command buffer hooks.
//!
//! State binds are reported after the native call. Draws, dispatches, copies and clears are
//! reported before it, and a listener returning [`Flow::Handled`] skips the native call.
//! Commands translated into several events are skipped as a whole once any of them is handled.

use core::ffi::c_void;
use std::sync::Arc;

use ash::vk::{self, Handle};
use once_cell::sync::Lazy;
use tint::map::IntDashMap;
use tint_api::{
    DescriptorSet, Format, Pipeline, PipelineLayout, Resource, ResourceView,
    pipeline::{IndirectCommand, PipelineStage, PipelineState, Rect, ShaderStage, Viewport},
    resource::{ResourceDesc, ResourceUsage, SubresourceBox},
    sampler::FilterMode,
};
use tint_event::{Event, EventKind, Flow, Registry};
use tracing::{debug, trace};

use super::{
    CommandListImpl, DeviceImpl,
    command_list::PassState,
    device_impl::ParamBinding,
    find_in_chain, get_device,
    render_pass::raw_slice,
};
use crate::conv;

/// Command buffers of every managed device.
static COMMAND_BUFFER_MAP: Lazy<IntDashMap<u64, Arc<CommandListImpl>>> =
    Lazy::new(IntDashMap::default);

#[inline]
pub(crate) fn get_command_list(cmd: vk::CommandBuffer) -> Option<Arc<CommandListImpl>> {
    COMMAND_BUFFER_MAP.get(&cmd.as_raw()).map(|cmd_list| cmd_list.clone())
}

fn register_command_list(registry: &Registry, cmd_list: Arc<CommandListImpl>) {
    registry.dispatch(&mut Event::InitCommandList {
        cmd_list: &*cmd_list,
    });
    COMMAND_BUFFER_MAP.insert(cmd_list.handle.as_raw(), cmd_list);
}

fn unregister_command_list(registry: &Registry, cmd: vk::CommandBuffer) {
    if let Some((_, cmd_list)) = COMMAND_BUFFER_MAP.remove(&cmd.as_raw()) {
        registry.dispatch(&mut Event::DestroyCommandList {
            cmd_list: &*cmd_list,
        });
    }
}

fn unregister_where(registry: &Registry, f: impl Fn(&CommandListImpl) -> bool) {
    let handles: Vec<u64> = COMMAND_BUFFER_MAP
        .iter()
        .filter(|entry| f(entry.value()))
        .map(|entry| *entry.key())
        .collect();

    for handle in handles {
        unregister_command_list(registry, vk::CommandBuffer::from_raw(handle));
    }
}

/// Drops the command lists a device still has when it is destroyed.
pub(crate) fn destroy_device_command_lists(registry: &Registry, device: &DeviceImpl) {
    unregister_where(registry, |cmd_list| cmd_list.device.handle == device.handle);
}

#[tracing::instrument]
pub(super) extern "system" fn allocate_command_buffers(
    device: vk::Device,
    info: *const vk::CommandBufferAllocateInfo<'_>,
    command_buffers: *mut vk::CommandBuffer,
) -> vk::Result {
    trace!("vkAllocateCommandBuffers called");

    let Some(device) = get_device(device) else {
        return vk::Result::ERROR_INITIALIZATION_FAILED;
    };
    let res = unsafe {
        (device.fp.fp_v1_0().allocate_command_buffers)(device.handle, info, command_buffers)
    };
    if res != vk::Result::SUCCESS {
        debug!("vkAllocateCommandBuffers failed. err: {res:?}");
        return res;
    }

    let Some(info) = (unsafe { info.as_ref() }) else {
        return res;
    };
    let registry = tint::registry();
    for &cmd in unsafe { raw_slice(command_buffers.cast_const(), info.command_buffer_count) } {
        register_command_list(
            registry,
            Arc::new(CommandListImpl::new(
                device.clone(),
                cmd,
                info.command_pool,
                info.level,
            )),
        );
    }

    res
}

#[tracing::instrument]
pub(super) extern "system" fn free_command_buffers(
    device: vk::Device,
    pool: vk::CommandPool,
    count: u32,
    command_buffers: *const vk::CommandBuffer,
) {
    trace!("vkFreeCommandBuffers called");

    let Some(device) = get_device(device) else {
        return;
    };
    let registry = tint::registry();
    for &cmd in unsafe { raw_slice(command_buffers, count) } {
        unregister_command_list(registry, cmd);
    }

    unsafe {
        (device.fp.fp_v1_0().free_command_buffers)(device.handle, pool, count, command_buffers)
    }
}

#[tracing::instrument]
pub(super) extern "system" fn destroy_command_pool(
    device: vk::Device,
    pool: vk::CommandPool,
    allocator: *const vk::AllocationCallbacks<'_>,
) {
    trace!("vkDestroyCommandPool called");

    let Some(device) = get_device(device) else {
        return;
    };
    unregister_where(tint::registry(), |cmd_list| {
        cmd_list.pool == pool && cmd_list.device.handle == device.handle
    });

    unsafe { (device.fp.fp_v1_0().destroy_command_pool)(device.handle, pool, allocator) }
}

#[tracing::instrument]
pub(super) extern "system" fn begin_command_buffer(
    cmd: vk::CommandBuffer,
    info: *const vk::CommandBufferBeginInfo<'_>,
) -> vk::Result {
    trace!("vkBeginCommandBuffer called");

    let Some(cmd_list) = get_command_list(cmd) else {
        return vk::Result::ERROR_INITIALIZATION_FAILED;
    };
    *cmd_list.state.lock() = PassState::default();
    tint::registry().dispatch(&mut Event::ResetCommandList {
        cmd_list: &*cmd_list,
    });

    unsafe { (cmd_list.device.fp.fp_v1_0().begin_command_buffer)(cmd, info) }
}

#[tracing::instrument]
pub(super) extern "system" fn cmd_bind_pipeline(
    cmd: vk::CommandBuffer,
    bind_point: vk::PipelineBindPoint,
    pipeline: vk::Pipeline,
) {
    trace!("vkCmdBindPipeline called");

    let Some(cmd_list) = get_command_list(cmd) else {
        return;
    };
    unsafe { (cmd_list.device.fp.fp_v1_0().cmd_bind_pipeline)(cmd, bind_point, pipeline) };

    let stages = match bind_point {
        vk::PipelineBindPoint::COMPUTE => PipelineStage::COMPUTE_SHADER,
        vk::PipelineBindPoint::GRAPHICS => PipelineStage::ALL_GRAPHICS,
        _ => return,
    };
    tint::registry().dispatch(&mut Event::BindPipeline {
        cmd_list: &*cmd_list,
        stages,
        pipeline: Pipeline::from_raw(pipeline.as_raw()),
    });
}

#[tracing::instrument]
pub(super) extern "system" fn cmd_set_viewport(
    cmd: vk::CommandBuffer,
    first: u32,
    count: u32,
    viewports: *const vk::Viewport,
) {
    trace!("vkCmdSetViewport called");

    let Some(cmd_list) = get_command_list(cmd) else {
        return;
    };
    unsafe { (cmd_list.device.fp.fp_v1_0().cmd_set_viewport)(cmd, first, count, viewports) };

    let viewports: Vec<Viewport> = unsafe { raw_slice(viewports, count) }
        .iter()
        .map(|viewport| Viewport {
            x: viewport.x,
            y: viewport.y,
            width: viewport.width,
            height: viewport.height,
            min_depth: viewport.min_depth,
            max_depth: viewport.max_depth,
        })
        .collect();
    tint::registry().dispatch(&mut Event::BindViewports {
        cmd_list: &*cmd_list,
        first,
        viewports: &viewports,
    });
}

#[tracing::instrument]
pub(super) extern "system" fn cmd_set_scissor(
    cmd: vk::CommandBuffer,
    first: u32,
    count: u32,
    scissors: *const vk::Rect2D,
) {
    trace!("vkCmdSetScissor called");

    let Some(cmd_list) = get_command_list(cmd) else {
        return;
    };
    let scissors = unsafe { raw_slice(scissors, count) };
    set_scissor_impl(tint::registry(), &cmd_list, first, scissors);
}

pub(crate) fn set_scissor_impl(
    registry: &Registry,
    cmd_list: &CommandListImpl,
    first: u32,
    scissors: &[vk::Rect2D],
) {
    unsafe {
        (cmd_list.device.fp.fp_v1_0().cmd_set_scissor)(
            cmd_list.handle,
            first,
            scissors.len() as u32,
            scissors.as_ptr(),
        )
    };

    let rects: Vec<Rect> = scissors.iter().map(unmap_rect).collect();
    registry.dispatch(&mut Event::BindScissorRects {
        cmd_list,
        first,
        rects: &rects,
    });
}

fn unmap_rect(rect: &vk::Rect2D) -> Rect {
    Rect {
        left: rect.offset.x,
        top: rect.offset.y,
        right: rect.offset.x + rect.extent.width as i32,
        bottom: rect.offset.y + rect.extent.height as i32,
    }
}

fn bind_states(cmd_list: &CommandListImpl, states: &[PipelineState], values: &[u32]) {
    tint::registry().dispatch(&mut Event::BindPipelineStates {
        cmd_list,
        states,
        values,
    });
}

#[tracing::instrument]
pub(super) extern "system" fn cmd_set_depth_bias(
    cmd: vk::CommandBuffer,
    constant_factor: f32,
    clamp: f32,
    slope_factor: f32,
) {
    trace!("vkCmdSetDepthBias called");

    let Some(cmd_list) = get_command_list(cmd) else {
        return;
    };
    unsafe {
        (cmd_list.device.fp.fp_v1_0().cmd_set_depth_bias)(cmd, constant_factor, clamp, slope_factor)
    };

    bind_states(
        &cmd_list,
        &[
            PipelineState::DepthBias,
            PipelineState::DepthBiasClamp,
            PipelineState::DepthBiasSlopeScaled,
        ],
        &[
            constant_factor as i32 as u32,
            clamp.to_bits(),
            slope_factor.to_bits(),
        ],
    );
}

/// Packs a float color into the RGBA8 value blend constant states carry.
fn pack_color(color: &[f32; 4]) -> u32 {
    u32::from_le_bytes(color.map(|channel| (channel.clamp(0.0, 1.0) * 255.0).round() as u8))
}

#[tracing::instrument]
pub(super) extern "system" fn cmd_set_blend_constants(
    cmd: vk::CommandBuffer,
    constants: *const [f32; 4],
) {
    trace!("vkCmdSetBlendConstants called");

    let Some(cmd_list) = get_command_list(cmd) else {
        return;
    };
    unsafe { (cmd_list.device.fp.fp_v1_0().cmd_set_blend_constants)(cmd, constants) };

    let Some(constants) = (unsafe { constants.as_ref() }) else {
        return;
    };
    bind_states(
        &cmd_list,
        &[PipelineState::BlendConstant],
        &[pack_color(constants)],
    );
}

fn bind_stencil_state(
    cmd_list: &CommandListImpl,
    face_mask: vk::StencilFaceFlags,
    state: PipelineState,
    value: u32,
) {
    // Only states shared by both faces have a unified counterpart
    if face_mask == vk::StencilFaceFlags::FRONT_AND_BACK {
        bind_states(cmd_list, &[state], &[value]);
    }
}

#[tracing::instrument]
pub(super) extern "system" fn cmd_set_stencil_compare_mask(
    cmd: vk::CommandBuffer,
    face_mask: vk::StencilFaceFlags,
    compare_mask: u32,
) {
    trace!("vkCmdSetStencilCompareMask called");

    let Some(cmd_list) = get_command_list(cmd) else {
        return;
    };
    unsafe {
        (cmd_list.device.fp.fp_v1_0().cmd_set_stencil_compare_mask)(cmd, face_mask, compare_mask)
    };
    bind_stencil_state(&cmd_list, face_mask, PipelineState::StencilReadMask, compare_mask);
}

#[tracing::instrument]
pub(super) extern "system" fn cmd_set_stencil_write_mask(
    cmd: vk::CommandBuffer,
    face_mask: vk::StencilFaceFlags,
    write_mask: u32,
) {
    trace!("vkCmdSetStencilWriteMask called");

    let Some(cmd_list) = get_command_list(cmd) else {
        return;
    };
    unsafe {
        (cmd_list.device.fp.fp_v1_0().cmd_set_stencil_write_mask)(cmd, face_mask, write_mask)
    };
    bind_stencil_state(&cmd_list, face_mask, PipelineState::StencilWriteMask, write_mask);
}

#[tracing::instrument]
pub(super) extern "system" fn cmd_set_stencil_reference(
    cmd: vk::CommandBuffer,
    face_mask: vk::StencilFaceFlags,
    reference: u32,
) {
    trace!("vkCmdSetStencilReference called");

    let Some(cmd_list) = get_command_list(cmd) else {
        return;
    };
    unsafe {
        (cmd_list.device.fp.fp_v1_0().cmd_set_stencil_reference)(cmd, face_mask, reference)
    };
    bind_stencil_state(
        &cmd_list,
        face_mask,
        PipelineState::StencilReferenceValue,
        reference,
    );
}

fn bind_point_stages(bind_point: vk::PipelineBindPoint) -> ShaderStage {
    if bind_point == vk::PipelineBindPoint::COMPUTE {
        ShaderStage::COMPUTE
    } else {
        ShaderStage::ALL_GRAPHICS
    }
}

/// Layout parameter matching `f`, if the layout is known.
fn find_param(
    device: &DeviceImpl,
    layout: vk::PipelineLayout,
    f: impl Fn(&ParamBinding) -> bool,
) -> Option<u32> {
    device
        .pipeline_layouts
        .with(layout.as_raw(), |data| data.params.iter().position(f))?
        .map(|index| index as u32)
}

#[allow(clippy::too_many_arguments)]
#[tracing::instrument]
pub(super) extern "system" fn cmd_bind_descriptor_sets(
    cmd: vk::CommandBuffer,
    bind_point: vk::PipelineBindPoint,
    layout: vk::PipelineLayout,
    first_set: u32,
    set_count: u32,
    sets: *const vk::DescriptorSet,
    dynamic_offset_count: u32,
    dynamic_offsets: *const u32,
) {
    trace!("vkCmdBindDescriptorSets called");

    let Some(cmd_list) = get_command_list(cmd) else {
        return;
    };
    unsafe {
        (cmd_list.device.fp.fp_v1_0().cmd_bind_descriptor_sets)(
            cmd,
            bind_point,
            layout,
            first_set,
            set_count,
            sets,
            dynamic_offset_count,
            dynamic_offsets,
        )
    };

    let first = find_param(&cmd_list.device, layout, |param| {
        *param == ParamBinding::Set(first_set)
    })
    .unwrap_or(first_set);
    let sets: Vec<DescriptorSet> = unsafe { raw_slice(sets, set_count) }
        .iter()
        .map(|set| DescriptorSet::from_raw(set.as_raw()))
        .collect();
    tint::registry().dispatch(&mut Event::BindDescriptorSets {
        cmd_list: &*cmd_list,
        stages: bind_point_stages(bind_point),
        layout: PipelineLayout::from_raw(layout.as_raw()),
        first,
        sets: &sets,
    });
}

/// Bytes per index of a bound index buffer, `0` when unbinding.
fn index_size(buffer: vk::Buffer, index_type: vk::IndexType) -> u32 {
    if buffer == vk::Buffer::null() {
        return 0;
    }

    match index_type {
        vk::IndexType::UINT8_EXT => 1,
        vk::IndexType::UINT16 => 2,
        _ => 4,
    }
}

#[tracing::instrument]
pub(super) extern "system" fn cmd_bind_index_buffer(
    cmd: vk::CommandBuffer,
    buffer: vk::Buffer,
    offset: vk::DeviceSize,
    index_type: vk::IndexType,
) {
    trace!("vkCmdBindIndexBuffer called");

    let Some(cmd_list) = get_command_list(cmd) else {
        return;
    };
    unsafe {
        (cmd_list.device.fp.fp_v1_0().cmd_bind_index_buffer)(cmd, buffer, offset, index_type)
    };

    tint::registry().dispatch(&mut Event::BindIndexBuffer {
        cmd_list: &*cmd_list,
        buffer: Resource::from_raw(buffer.as_raw()),
        offset,
        index_size: index_size(buffer, index_type),
    });
}

#[tracing::instrument]
pub(super) extern "system" fn cmd_bind_vertex_buffers(
    cmd: vk::CommandBuffer,
    first: u32,
    count: u32,
    buffers: *const vk::Buffer,
    offsets: *const vk::DeviceSize,
) {
    trace!("vkCmdBindVertexBuffers called");

    let Some(cmd_list) = get_command_list(cmd) else {
        return;
    };
    unsafe {
        (cmd_list.device.fp.fp_v1_0().cmd_bind_vertex_buffers)(cmd, first, count, buffers, offsets)
    };

    let buffers: Vec<Resource> = unsafe { raw_slice(buffers, count) }
        .iter()
        .map(|buffer| Resource::from_raw(buffer.as_raw()))
        .collect();
    // Strides live in the pipeline
    let strides = vec![0; buffers.len()];
    tint::registry().dispatch(&mut Event::BindVertexBuffers {
        cmd_list: &*cmd_list,
        first,
        buffers: &buffers,
        offsets: unsafe { raw_slice(offsets, count) },
        strides: &strides,
    });
}

#[tracing::instrument]
pub(super) extern "system" fn cmd_push_constants(
    cmd: vk::CommandBuffer,
    layout: vk::PipelineLayout,
    stage_flags: vk::ShaderStageFlags,
    offset: u32,
    size: u32,
    values: *const c_void,
) {
    trace!("vkCmdPushConstants called");

    let Some(cmd_list) = get_command_list(cmd) else {
        return;
    };
    unsafe {
        (cmd_list.device.fp.fp_v1_0().cmd_push_constants)(
            cmd,
            layout,
            stage_flags,
            offset,
            size,
            values,
        )
    };

    let registry = tint::registry();
    if !registry.has_listeners(EventKind::PushConstants) {
        return;
    }

    // The data pointer carries no alignment guarantee
    let bytes = unsafe { raw_slice(values.cast::<u8>(), size) };
    let values: Vec<u32> = bytes
        .chunks_exact(4)
        .map(|chunk| u32::from_ne_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect();
    let param = find_param(&cmd_list.device, layout, |param| {
        matches!(param, ParamBinding::Constants { .. })
    })
    .unwrap_or(0);

    registry.dispatch(&mut Event::PushConstants {
        cmd_list: &*cmd_list,
        stages: conv::unmap_shader_stages(stage_flags),
        layout: PipelineLayout::from_raw(layout.as_raw()),
        param,
        first: offset / 4,
        values: &values,
    });
}

#[tracing::instrument]
pub(super) extern "system" fn cmd_draw(
    cmd: vk::CommandBuffer,
    vertex_count: u32,
    instance_count: u32,
    first_vertex: u32,
    first_instance: u32,
) {
    trace!("vkCmdDraw called");

    let Some(cmd_list) = get_command_list(cmd) else {
        return;
    };
    draw_impl(
        tint::registry(),
        &cmd_list,
        vertex_count,
        instance_count,
        first_vertex,
        first_instance,
    );
}

pub(crate) fn draw_impl(
    registry: &Registry,
    cmd_list: &CommandListImpl,
    vertex_count: u32,
    instance_count: u32,
    first_vertex: u32,
    first_instance: u32,
) {
    let flow = registry.dispatch(&mut Event::Draw {
        cmd_list,
        vertex_count,
        instance_count,
        first_vertex,
        first_instance,
    });
    if flow == Flow::Handled {
        return;
    }

    unsafe {
        (cmd_list.device.fp.fp_v1_0().cmd_draw)(
            cmd_list.handle,
            vertex_count,
            instance_count,
            first_vertex,
            first_instance,
        )
    }
}

#[tracing::instrument]
pub(super) extern "system" fn cmd_draw_indexed(
    cmd: vk::CommandBuffer,
    index_count: u32,
    instance_count: u32,
    first_index: u32,
    vertex_offset: i32,
    first_instance: u32,
) {
    trace!("vkCmdDrawIndexed called");

    let Some(cmd_list) = get_command_list(cmd) else {
        return;
    };
    let flow = tint::registry().dispatch(&mut Event::DrawIndexed {
        cmd_list: &*cmd_list,
        index_count,
        instance_count,
        first_index,
        vertex_offset,
        first_instance,
    });
    if flow == Flow::Handled {
        return;
    }

    unsafe {
        (cmd_list.device.fp.fp_v1_0().cmd_draw_indexed)(
            cmd,
            index_count,
            instance_count,
            first_index,
            vertex_offset,
            first_instance,
        )
    }
}

fn indirect_handled(
    cmd_list: &CommandListImpl,
    ty: IndirectCommand,
    buffer: vk::Buffer,
    offset: vk::DeviceSize,
    draw_count: u32,
    stride: u32,
) -> bool {
    tint::registry().dispatch(&mut Event::DrawOrDispatchIndirect {
        cmd_list,
        ty,
        buffer: Resource::from_raw(buffer.as_raw()),
        offset,
        draw_count,
        stride,
    }) == Flow::Handled
}

#[tracing::instrument]
pub(super) extern "system" fn cmd_draw_indirect(
    cmd: vk::CommandBuffer,
    buffer: vk::Buffer,
    offset: vk::DeviceSize,
    draw_count: u32,
    stride: u32,
) {
    trace!("vkCmdDrawIndirect called");

    let Some(cmd_list) = get_command_list(cmd) else {
        return;
    };
    if indirect_handled(&cmd_list, IndirectCommand::Draw, buffer, offset, draw_count, stride) {
        return;
    }

    unsafe {
        (cmd_list.device.fp.fp_v1_0().cmd_draw_indirect)(cmd, buffer, offset, draw_count, stride)
    }
}

#[tracing::instrument]
pub(super) extern "system" fn cmd_draw_indexed_indirect(
    cmd: vk::CommandBuffer,
    buffer: vk::Buffer,
    offset: vk::DeviceSize,
    draw_count: u32,
    stride: u32,
) {
    trace!("vkCmdDrawIndexedIndirect called");

    let Some(cmd_list) = get_command_list(cmd) else {
        return;
    };
    if indirect_handled(
        &cmd_list,
        IndirectCommand::DrawIndexed,
        buffer,
        offset,
        draw_count,
        stride,
    ) {
        return;
    }

    unsafe {
        (cmd_list.device.fp.fp_v1_0().cmd_draw_indexed_indirect)(
            cmd, buffer, offset, draw_count, stride,
        )
    }
}

#[tracing::instrument]
pub(super) extern "system" fn cmd_dispatch(cmd: vk::CommandBuffer, x: u32, y: u32, z: u32) {
    trace!("vkCmdDispatch called");

    let Some(cmd_list) = get_command_list(cmd) else {
        return;
    };
    let flow = tint::registry().dispatch(&mut Event::Dispatch {
        cmd_list: &*cmd_list,
        x,
        y,
        z,
    });
    if flow == Flow::Handled {
        return;
    }

    unsafe { (cmd_list.device.fp.fp_v1_0().cmd_dispatch)(cmd, x, y, z) }
}

#[tracing::instrument]
pub(super) extern "system" fn cmd_dispatch_indirect(
    cmd: vk::CommandBuffer,
    buffer: vk::Buffer,
    offset: vk::DeviceSize,
) {
    trace!("vkCmdDispatchIndirect called");

    let Some(cmd_list) = get_command_list(cmd) else {
        return;
    };
    if indirect_handled(&cmd_list, IndirectCommand::Dispatch, buffer, offset, 1, 0) {
        return;
    }

    unsafe { (cmd_list.device.fp.fp_v1_0().cmd_dispatch_indirect)(cmd, buffer, offset) }
}

#[tracing::instrument]
pub(super) extern "system" fn cmd_copy_buffer(
    cmd: vk::CommandBuffer,
    src: vk::Buffer,
    dst: vk::Buffer,
    count: u32,
    regions: *const vk::BufferCopy,
) {
    trace!("vkCmdCopyBuffer called");

    let Some(cmd_list) = get_command_list(cmd) else {
        return;
    };
    let regions = unsafe { raw_slice(regions, count) };
    copy_buffer_impl(tint::registry(), &cmd_list, src, dst, regions);
}

pub(crate) fn copy_buffer_impl(
    registry: &Registry,
    cmd_list: &CommandListImpl,
    src: vk::Buffer,
    dst: vk::Buffer,
    regions: &[vk::BufferCopy],
) {
    for region in regions {
        let flow = registry.dispatch(&mut Event::CopyBufferRegion {
            cmd_list,
            src: Resource::from_raw(src.as_raw()),
            src_offset: region.src_offset,
            dst: Resource::from_raw(dst.as_raw()),
            dst_offset: region.dst_offset,
            size: region.size,
        });
        if flow == Flow::Handled {
            return;
        }
    }

    unsafe {
        (cmd_list.device.fp.fp_v1_0().cmd_copy_buffer)(
            cmd_list.handle,
            src,
            dst,
            regions.len() as u32,
            regions.as_ptr(),
        )
    }
}

fn image_desc(device: &DeviceImpl, image: vk::Image) -> Option<ResourceDesc> {
    device.resources.with(image.as_raw(), |data| data.desc)
}

/// Subresource indices of every layer in `layers`. Levels vary fastest.
fn subresources(desc: Option<&ResourceDesc>, layers: &vk::ImageSubresourceLayers) -> Vec<u32> {
    let (levels, total) = desc
        .map(|desc| (u32::from(desc.levels()).max(1), u32::from(desc.layers())))
        .unwrap_or((1, layers.base_array_layer + 1));
    let count = if layers.layer_count == vk::REMAINING_ARRAY_LAYERS {
        total.saturating_sub(layers.base_array_layer)
    } else {
        layers.layer_count
    };

    (layers.base_array_layer..layers.base_array_layer + count)
        .map(|layer| layers.mip_level + layer * levels)
        .collect()
}

fn region_box(offset: vk::Offset3D, extent: vk::Extent3D) -> SubresourceBox {
    SubresourceBox {
        left: offset.x,
        top: offset.y,
        front: offset.z,
        right: offset.x + extent.width as i32,
        bottom: offset.y + extent.height as i32,
        back: offset.z + extent.depth as i32,
    }
}

fn corners_box(offsets: &[vk::Offset3D; 2]) -> SubresourceBox {
    SubresourceBox {
        left: offsets[0].x,
        top: offsets[0].y,
        front: offsets[0].z,
        right: offsets[1].x,
        bottom: offsets[1].y,
        back: offsets[1].z,
    }
}

#[allow(clippy::too_many_arguments)]
#[tracing::instrument]
pub(super) extern "system" fn cmd_copy_image(
    cmd: vk::CommandBuffer,
    src: vk::Image,
    src_layout: vk::ImageLayout,
    dst: vk::Image,
    dst_layout: vk::ImageLayout,
    count: u32,
    regions: *const vk::ImageCopy,
) {
    trace!("vkCmdCopyImage called");

    let Some(cmd_list) = get_command_list(cmd) else {
        return;
    };
    let registry = tint::registry();
    if registry.has_listeners(EventKind::CopyTextureRegion) {
        let src_desc = image_desc(&cmd_list.device, src);
        let dst_desc = image_desc(&cmd_list.device, dst);
        for region in unsafe { raw_slice(regions, count) } {
            let src_subresources = subresources(src_desc.as_ref(), &region.src_subresource);
            let dst_subresources = subresources(dst_desc.as_ref(), &region.dst_subresource);
            for (&src_subresource, &dst_subresource) in src_subresources.iter().zip(&dst_subresources) {
                let flow = registry.dispatch(&mut Event::CopyTextureRegion {
                    cmd_list: &*cmd_list,
                    src: Resource::from_raw(src.as_raw()),
                    src_subresource,
                    src_box: Some(region_box(region.src_offset, region.extent)),
                    dst: Resource::from_raw(dst.as_raw()),
                    dst_subresource,
                    dst_box: Some(region_box(region.dst_offset, region.extent)),
                    filter: FilterMode::MinMagMipPoint,
                });
                if flow == Flow::Handled {
                    return;
                }
            }
        }
    }

    unsafe {
        (cmd_list.device.fp.fp_v1_0().cmd_copy_image)(
            cmd, src, src_layout, dst, dst_layout, count, regions,
        )
    }
}

#[allow(clippy::too_many_arguments)]
#[tracing::instrument]
pub(super) extern "system" fn cmd_blit_image(
    cmd: vk::CommandBuffer,
    src: vk::Image,
    src_layout: vk::ImageLayout,
    dst: vk::Image,
    dst_layout: vk::ImageLayout,
    count: u32,
    regions: *const vk::ImageBlit,
    filter: vk::Filter,
) {
    trace!("vkCmdBlitImage called");

    let Some(cmd_list) = get_command_list(cmd) else {
        return;
    };
    let registry = tint::registry();
    if registry.has_listeners(EventKind::CopyTextureRegion) {
        let mode = if filter == vk::Filter::LINEAR {
            FilterMode::MinMagMipLinear
        } else {
            FilterMode::MinMagMipPoint
        };
        let src_desc = image_desc(&cmd_list.device, src);
        let dst_desc = image_desc(&cmd_list.device, dst);
        for region in unsafe { raw_slice(regions, count) } {
            let src_subresources = subresources(src_desc.as_ref(), &region.src_subresource);
            let dst_subresources = subresources(dst_desc.as_ref(), &region.dst_subresource);
            for (&src_subresource, &dst_subresource) in src_subresources.iter().zip(&dst_subresources) {
                let flow = registry.dispatch(&mut Event::CopyTextureRegion {
                    cmd_list: &*cmd_list,
                    src: Resource::from_raw(src.as_raw()),
                    src_subresource,
                    src_box: Some(corners_box(&region.src_offsets)),
                    dst: Resource::from_raw(dst.as_raw()),
                    dst_subresource,
                    dst_box: Some(corners_box(&region.dst_offsets)),
                    filter: mode,
                });
                if flow == Flow::Handled {
                    return;
                }
            }
        }
    }

    unsafe {
        (cmd_list.device.fp.fp_v1_0().cmd_blit_image)(
            cmd, src, src_layout, dst, dst_layout, count, regions, filter,
        )
    }
}

/// Bytes between two array layers in a buffer laid out as `region` describes.
fn layer_pitch(desc: Option<&ResourceDesc>, region: &vk::BufferImageCopy) -> u64 {
    let Some(desc) = desc else {
        return 0;
    };
    let width = if region.buffer_row_length == 0 {
        region.image_extent.width
    } else {
        region.buffer_row_length
    };
    let height = if region.buffer_image_height == 0 {
        region.image_extent.height
    } else {
        region.buffer_image_height
    };

    let format: Format = desc.format;
    u64::from(format.slice_pitch(format.row_pitch(width), height))
        * u64::from(region.image_extent.depth.max(1))
}

#[tracing::instrument]
pub(super) extern "system" fn cmd_copy_buffer_to_image(
    cmd: vk::CommandBuffer,
    src: vk::Buffer,
    dst: vk::Image,
    dst_layout: vk::ImageLayout,
    count: u32,
    regions: *const vk::BufferImageCopy,
) {
    trace!("vkCmdCopyBufferToImage called");

    let Some(cmd_list) = get_command_list(cmd) else {
        return;
    };
    let registry = tint::registry();
    if registry.has_listeners(EventKind::CopyBufferToTexture) {
        let desc = image_desc(&cmd_list.device, dst);
        for region in unsafe { raw_slice(regions, count) } {
            let pitch = layer_pitch(desc.as_ref(), region);
            let subresources = subresources(desc.as_ref(), &region.image_subresource);
            for (layer, &dst_subresource) in subresources.iter().enumerate() {
                let flow = registry.dispatch(&mut Event::CopyBufferToTexture {
                    cmd_list: &*cmd_list,
                    src: Resource::from_raw(src.as_raw()),
                    src_offset: region.buffer_offset + layer as u64 * pitch,
                    row_length: region.buffer_row_length,
                    slice_height: region.buffer_image_height,
                    dst: Resource::from_raw(dst.as_raw()),
                    dst_subresource,
                    dst_box: Some(region_box(region.image_offset, region.image_extent)),
                });
                if flow == Flow::Handled {
                    return;
                }
            }
        }
    }

    unsafe {
        (cmd_list.device.fp.fp_v1_0().cmd_copy_buffer_to_image)(
            cmd, src, dst, dst_layout, count, regions,
        )
    }
}

#[tracing::instrument]
pub(super) extern "system" fn cmd_copy_image_to_buffer(
    cmd: vk::CommandBuffer,
    src: vk::Image,
    src_layout: vk::ImageLayout,
    dst: vk::Buffer,
    count: u32,
    regions: *const vk::BufferImageCopy,
) {
    trace!("vkCmdCopyImageToBuffer called");

    let Some(cmd_list) = get_command_list(cmd) else {
        return;
    };
    let registry = tint::registry();
    if registry.has_listeners(EventKind::CopyTextureToBuffer) {
        let desc = image_desc(&cmd_list.device, src);
        for region in unsafe { raw_slice(regions, count) } {
            let pitch = layer_pitch(desc.as_ref(), region);
            let subresources = subresources(desc.as_ref(), &region.image_subresource);
            for (layer, &src_subresource) in subresources.iter().enumerate() {
                let flow = registry.dispatch(&mut Event::CopyTextureToBuffer {
                    cmd_list: &*cmd_list,
                    src: Resource::from_raw(src.as_raw()),
                    src_subresource,
                    src_box: Some(region_box(region.image_offset, region.image_extent)),
                    dst: Resource::from_raw(dst.as_raw()),
                    dst_offset: region.buffer_offset + layer as u64 * pitch,
                    row_length: region.buffer_row_length,
                    slice_height: region.buffer_image_height,
                });
                if flow == Flow::Handled {
                    return;
                }
            }
        }
    }

    unsafe {
        (cmd_list.device.fp.fp_v1_0().cmd_copy_image_to_buffer)(
            cmd, src, src_layout, dst, count, regions,
        )
    }
}

#[allow(clippy::too_many_arguments)]
#[tracing::instrument]
pub(super) extern "system" fn cmd_resolve_image(
    cmd: vk::CommandBuffer,
    src: vk::Image,
    src_layout: vk::ImageLayout,
    dst: vk::Image,
    dst_layout: vk::ImageLayout,
    count: u32,
    regions: *const vk::ImageResolve,
) {
    trace!("vkCmdResolveImage called");

    let Some(cmd_list) = get_command_list(cmd) else {
        return;
    };
    let registry = tint::registry();
    if registry.has_listeners(EventKind::ResolveTextureRegion) {
        let src_desc = image_desc(&cmd_list.device, src);
        let dst_desc = image_desc(&cmd_list.device, dst);
        for region in unsafe { raw_slice(regions, count) } {
            let src_subresources = subresources(src_desc.as_ref(), &region.src_subresource);
            let dst_subresources = subresources(dst_desc.as_ref(), &region.dst_subresource);
            for (&src_subresource, &dst_subresource) in src_subresources.iter().zip(&dst_subresources) {
                let flow = registry.dispatch(&mut Event::ResolveTextureRegion {
                    cmd_list: &*cmd_list,
                    src: Resource::from_raw(src.as_raw()),
                    src_subresource,
                    src_box: Some(region_box(region.src_offset, region.extent)),
                    dst: Resource::from_raw(dst.as_raw()),
                    dst_subresource,
                    dst_offset: [region.dst_offset.x, region.dst_offset.y, region.dst_offset.z],
                    format: Format::Unknown,
                });
                if flow == Flow::Handled {
                    return;
                }
            }
        }
    }

    unsafe {
        (cmd_list.device.fp.fp_v1_0().cmd_resolve_image)(
            cmd, src, src_layout, dst, dst_layout, count, regions,
        )
    }
}

/// Moves a whole image between the application's layout and an attachment layout.
fn transition(
    cmd_list: &CommandListImpl,
    image: vk::Image,
    aspect: vk::ImageAspectFlags,
    old_layout: vk::ImageLayout,
    new_layout: vk::ImageLayout,
) {
    let barrier = vk::ImageMemoryBarrier::default()
        .src_access_mask(vk::AccessFlags::MEMORY_WRITE)
        .dst_access_mask(vk::AccessFlags::MEMORY_READ | vk::AccessFlags::MEMORY_WRITE)
        .old_layout(old_layout)
        .new_layout(new_layout)
        .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .image(image)
        .subresource_range(super::command_list::whole_range(aspect));

    unsafe {
        cmd_list.device.fp.cmd_pipeline_barrier(
            cmd_list.handle,
            vk::PipelineStageFlags::ALL_COMMANDS,
            vk::PipelineStageFlags::ALL_COMMANDS,
            vk::DependencyFlags::empty(),
            &[],
            &[],
            &[barrier],
        )
    }
}

#[tracing::instrument]
pub(super) extern "system" fn cmd_clear_color_image(
    cmd: vk::CommandBuffer,
    image: vk::Image,
    layout: vk::ImageLayout,
    color: *const vk::ClearColorValue,
    range_count: u32,
    ranges: *const vk::ImageSubresourceRange,
) {
    trace!("vkCmdClearColorImage called");

    let Some(cmd_list) = get_command_list(cmd) else {
        return;
    };
    let registry = tint::registry();
    if registry.has_listeners(EventKind::ClearRenderTargetView)
        && let Some(value) = unsafe { color.as_ref() }
        && let Some(rtv) = cmd_list
            .device
            .default_view(Resource::from_raw(image.as_raw()), ResourceUsage::RENDER_TARGET)
    {
        let aspect = vk::ImageAspectFlags::COLOR;
        transition(&cmd_list, image, aspect, layout, vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL);
        let flow = registry.dispatch(&mut Event::ClearRenderTargetView {
            cmd_list: &*cmd_list,
            rtv,
            color: unsafe { value.float32 },
            rects: &[],
        });
        transition(&cmd_list, image, aspect, vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL, layout);

        if flow == Flow::Handled {
            return;
        }
    }

    unsafe {
        (cmd_list.device.fp.fp_v1_0().cmd_clear_color_image)(
            cmd,
            image,
            layout,
            color,
            range_count,
            ranges,
        )
    }
}

#[tracing::instrument]
pub(super) extern "system" fn cmd_clear_depth_stencil_image(
    cmd: vk::CommandBuffer,
    image: vk::Image,
    layout: vk::ImageLayout,
    value: *const vk::ClearDepthStencilValue,
    range_count: u32,
    ranges: *const vk::ImageSubresourceRange,
) {
    trace!("vkCmdClearDepthStencilImage called");

    let Some(cmd_list) = get_command_list(cmd) else {
        return;
    };
    let registry = tint::registry();
    if registry.has_listeners(EventKind::ClearDepthStencilView)
        && let Some(clear) = unsafe { value.as_ref() }
        && let Some(dsv) = cmd_list
            .device
            .default_view(Resource::from_raw(image.as_raw()), ResourceUsage::DEPTH_STENCIL)
    {
        let aspect = unsafe { raw_slice(ranges, range_count) }
            .iter()
            .fold(vk::ImageAspectFlags::empty(), |aspect, range| aspect | range.aspect_mask);

        transition(&cmd_list, image, aspect, layout, vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL);
        let flow = registry.dispatch(&mut Event::ClearDepthStencilView {
            cmd_list: &*cmd_list,
            dsv,
            depth: aspect.contains(vk::ImageAspectFlags::DEPTH).then_some(clear.depth),
            stencil: aspect
                .contains(vk::ImageAspectFlags::STENCIL)
                .then_some(clear.stencil as u8),
            rects: &[],
        });
        transition(&cmd_list, image, aspect, vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL, layout);

        if flow == Flow::Handled {
            return;
        }
    }

    unsafe {
        (cmd_list.device.fp.fp_v1_0().cmd_clear_depth_stencil_image)(
            cmd,
            image,
            layout,
            value,
            range_count,
            ranges,
        )
    }
}

/// Views of the attachments the current subpass writes, as `(colors, depth_stencil)`.
fn subpass_views(
    device: &DeviceImpl,
    state: &PassState,
) -> Option<(Vec<ResourceView>, Option<ResourceView>)> {
    let view = |attachment: u32| {
        state
            .views
            .get(attachment as usize)
            .map(|view| ResourceView::from_raw(view.as_raw()))
            .unwrap_or_default()
    };

    device.render_passes.with(state.render_pass.as_raw(), |data| {
        let subpass = data.subpasses.get(state.subpass as usize)?;
        Some((
            subpass.colors.iter().map(|&attachment| view(attachment)).collect(),
            subpass.depth_stencil.map(view),
        ))
    })?
}

#[tracing::instrument]
pub(super) extern "system" fn cmd_clear_attachments(
    cmd: vk::CommandBuffer,
    attachment_count: u32,
    attachments: *const vk::ClearAttachment,
    rect_count: u32,
    rects: *const vk::ClearRect,
) {
    trace!("vkCmdClearAttachments called");

    let Some(cmd_list) = get_command_list(cmd) else {
        return;
    };
    let registry = tint::registry();
    let state = cmd_list.state.lock().clone();
    if let Some((colors, depth_stencil)) = subpass_views(&cmd_list.device, &state) {
        let rects: Vec<Rect> = unsafe { raw_slice(rects, rect_count) }
            .iter()
            .map(|rect| unmap_rect(&rect.rect))
            .collect();

        for attachment in unsafe { raw_slice(attachments, attachment_count) } {
            let flow = if attachment.aspect_mask.contains(vk::ImageAspectFlags::COLOR) {
                let Some(&rtv) = colors.get(attachment.color_attachment as usize) else {
                    continue;
                };
                registry.dispatch(&mut Event::ClearRenderTargetView {
                    cmd_list: &*cmd_list,
                    rtv,
                    color: unsafe { attachment.clear_value.color.float32 },
                    rects: &rects,
                })
            } else {
                let Some(dsv) = depth_stencil else {
                    continue;
                };
                let value = unsafe { attachment.clear_value.depth_stencil };
                registry.dispatch(&mut Event::ClearDepthStencilView {
                    cmd_list: &*cmd_list,
                    dsv,
                    depth: attachment
                        .aspect_mask
                        .contains(vk::ImageAspectFlags::DEPTH)
                        .then_some(value.depth),
                    stencil: attachment
                        .aspect_mask
                        .contains(vk::ImageAspectFlags::STENCIL)
                        .then_some(value.stencil as u8),
                    rects: &rects,
                })
            };

            if flow == Flow::Handled {
                return;
            }
        }
    }

    unsafe {
        (cmd_list.device.fp.fp_v1_0().cmd_clear_attachments)(
            cmd,
            attachment_count,
            attachments,
            rect_count,
            rects,
        )
    }
}

/// Reports the current subpass as a render pass begin.
fn begin_subpass(registry: &Registry, cmd_list: &CommandListImpl) {
    let state = cmd_list.state.lock().clone();
    let Some((render_targets, depth_stencil)) = cmd_list.device.render_passes.with(
        state.render_pass.as_raw(),
        |data| data.targets(state.subpass, &state.views, &state.clear_values),
    ) else {
        debug!("render pass {:?} is unknown", state.render_pass);
        return;
    };

    registry.dispatch(&mut Event::BeginRenderPass {
        cmd_list,
        render_targets: &render_targets,
        depth_stencil,
    });
}

#[tracing::instrument]
pub(super) extern "system" fn cmd_begin_render_pass(
    cmd: vk::CommandBuffer,
    info: *const vk::RenderPassBeginInfo<'_>,
    contents: vk::SubpassContents,
) {
    trace!("vkCmdBeginRenderPass called");

    let Some(cmd_list) = get_command_list(cmd) else {
        return;
    };
    unsafe { (cmd_list.device.fp.fp_v1_0().cmd_begin_render_pass)(cmd, info, contents) };

    let Some(info) = (unsafe { info.as_ref() }) else {
        return;
    };
    begin_render_pass_impl(tint::registry(), &cmd_list, info);
}

pub(crate) fn begin_render_pass_impl(
    registry: &Registry,
    cmd_list: &CommandListImpl,
    info: &vk::RenderPassBeginInfo<'_>,
) {
    let mut views = cmd_list
        .device
        .framebuffers
        .with(info.framebuffer.as_raw(), |data| data.attachments.clone())
        .unwrap_or_default();
    if views.is_empty()
        && let Some(begin) = unsafe {
            find_in_chain::<vk::RenderPassAttachmentBeginInfo<'_>>(
                info.p_next,
                vk::StructureType::RENDER_PASS_ATTACHMENT_BEGIN_INFO,
            )
        }
    {
        let begin = unsafe { begin.as_ref() };
        views = unsafe { raw_slice(begin.p_attachments, begin.attachment_count) }.to_vec();
    }

    *cmd_list.state.lock() = PassState {
        render_pass: info.render_pass,
        framebuffer: info.framebuffer,
        subpass: 0,
        views,
        clear_values: unsafe { raw_slice(info.p_clear_values, info.clear_value_count) }.to_vec(),
    };
    begin_subpass(registry, cmd_list);
}

#[tracing::instrument]
pub(super) extern "system" fn cmd_next_subpass(
    cmd: vk::CommandBuffer,
    contents: vk::SubpassContents,
) {
    trace!("vkCmdNextSubpass called");

    let Some(cmd_list) = get_command_list(cmd) else {
        return;
    };
    let registry = tint::registry();
    registry.dispatch(&mut Event::FinishRenderPass {
        cmd_list: &*cmd_list,
    });

    unsafe { (cmd_list.device.fp.fp_v1_0().cmd_next_subpass)(cmd, contents) };

    cmd_list.state.lock().subpass += 1;
    begin_subpass(registry, &cmd_list);
}

#[tracing::instrument]
pub(super) extern "system" fn cmd_end_render_pass(cmd: vk::CommandBuffer) {
    trace!("vkCmdEndRenderPass called");

    let Some(cmd_list) = get_command_list(cmd) else {
        return;
    };
    tint::registry().dispatch(&mut Event::FinishRenderPass {
        cmd_list: &*cmd_list,
    });

    unsafe { (cmd_list.device.fp.fp_v1_0().cmd_end_render_pass)(cmd) };
    *cmd_list.state.lock() = PassState::default();
}

#[tracing::instrument]
pub(super) extern "system" fn cmd_execute_commands(
    cmd: vk::CommandBuffer,
    count: u32,
    command_buffers: *const vk::CommandBuffer,
) {
    trace!("vkCmdExecuteCommands called");

    let Some(cmd_list) = get_command_list(cmd) else {
        return;
    };
    let registry = tint::registry();
    for &secondary in unsafe { raw_slice(command_buffers, count) } {
        if let Some(secondary) = get_command_list(secondary) {
            registry.dispatch(&mut Event::ExecuteSecondaryCommandList {
                cmd_list: &*cmd_list,
                secondary: &*secondary,
            });
        }
    }

    unsafe { (cmd_list.device.fp.fp_v1_0().cmd_execute_commands)(cmd, count, command_buffers) }
}

#[cfg(test)]
mod tests {
    use core::{
        ffi::{CStr, c_char},
        mem,
        sync::atomic::{AtomicUsize, Ordering},
    };

    use parking_lot::Mutex;
    use tint_api::pipeline::LoadOp;

    use super::*;
    use crate::device::{
        device_impl::tests::offline_device,
        render_pass::{FramebufferData, RenderPassData},
    };

    static DRAW_CALLS: AtomicUsize = AtomicUsize::new(0);
    static COPY_CALLS: AtomicUsize = AtomicUsize::new(0);
    static SCISSOR_ORDER: Mutex<Vec<&'static str>> = Mutex::new(Vec::new());

    unsafe extern "system" fn mock_cmd_draw(
        _cmd: vk::CommandBuffer,
        _vertex_count: u32,
        _instance_count: u32,
        _first_vertex: u32,
        _first_instance: u32,
    ) {
        DRAW_CALLS.fetch_add(1, Ordering::Relaxed);
    }

    unsafe extern "system" fn mock_cmd_copy_buffer(
        _cmd: vk::CommandBuffer,
        _src: vk::Buffer,
        _dst: vk::Buffer,
        _count: u32,
        _regions: *const vk::BufferCopy,
    ) {
        COPY_CALLS.fetch_add(1, Ordering::Relaxed);
    }

    unsafe extern "system" fn mock_cmd_set_scissor(
        _cmd: vk::CommandBuffer,
        _first: u32,
        _count: u32,
        _scissors: *const vk::Rect2D,
    ) {
        SCISSOR_ORDER.lock().push("native");
    }

    unsafe extern "system" fn mock_proc_addr(
        _device: vk::Device,
        name: *const c_char,
    ) -> vk::PFN_vkVoidFunction {
        match unsafe { CStr::from_ptr(name) }.to_bytes() {
            b"vkCmdDraw" => unsafe {
                mem::transmute::<vk::PFN_vkCmdDraw, vk::PFN_vkVoidFunction>(mock_cmd_draw)
            },
            b"vkCmdCopyBuffer" => unsafe {
                mem::transmute::<vk::PFN_vkCmdCopyBuffer, vk::PFN_vkVoidFunction>(
                    mock_cmd_copy_buffer,
                )
            },
            b"vkCmdSetScissor" => unsafe {
                mem::transmute::<vk::PFN_vkCmdSetScissor, vk::PFN_vkVoidFunction>(
                    mock_cmd_set_scissor,
                )
            },
            _ => None,
        }
    }

    fn command_list(raw: u64) -> CommandListImpl {
        CommandListImpl::new(
            Arc::new(offline_device(Some(mock_proc_addr))),
            vk::CommandBuffer::from_raw(raw),
            vk::CommandPool::from_raw(0x10),
            vk::CommandBufferLevel::PRIMARY,
        )
    }

    #[test]
    fn vetoed_draw_skips_native_call() {
        let cmd_list = command_list(0x3000);
        let registry = Registry::new();
        registry.register_addon("skip-triangles", |r| {
            r.on(EventKind::Draw, |event| match event {
                Event::Draw { vertex_count: 3, .. } => Flow::Handled,
                _ => Flow::Continue,
            });
        });

        draw_impl(&registry, &cmd_list, 3, 1, 0, 0);
        draw_impl(&registry, &cmd_list, 6, 1, 0, 0);
        assert_eq!(DRAW_CALLS.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn scissors_are_reported_after_the_native_call() {
        let cmd_list = command_list(0x3100);
        let registry = Registry::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        registry.register_addon("scissors", {
            let seen = seen.clone();
            move |r| {
                r.on(EventKind::BindScissorRects, move |event| {
                    if let Event::BindScissorRects { first, rects, .. } = event {
                        SCISSOR_ORDER.lock().push("event");
                        seen.lock().push((*first, rects.to_vec()));
                    }
                    Flow::Continue
                });
            }
        });

        let scissor = vk::Rect2D {
            offset: vk::Offset2D { x: 16, y: 8 },
            extent: vk::Extent2D {
                width: 100,
                height: 50,
            },
        };
        set_scissor_impl(&registry, &cmd_list, 1, &[scissor]);

        assert_eq!(*SCISSOR_ORDER.lock(), ["native", "event"]);
        assert_eq!(
            *seen.lock(),
            [(
                1,
                vec![Rect {
                    left: 16,
                    top: 8,
                    right: 116,
                    bottom: 58
                }]
            )]
        );
    }

    #[test]
    fn handled_region_skips_whole_copy() {
        let cmd_list = command_list(0x3200);
        let registry = Registry::new();
        let seen = Arc::new(AtomicUsize::new(0));
        registry.register_addon("copies", {
            let seen = seen.clone();
            move |r| {
                r.on(EventKind::CopyBufferRegion, move |event| {
                    seen.fetch_add(1, Ordering::Relaxed);
                    match event {
                        Event::CopyBufferRegion { size: 256, .. } => Flow::Handled,
                        _ => Flow::Continue,
                    }
                });
            }
        });

        let region = |size| vk::BufferCopy {
            src_offset: 0,
            dst_offset: 0,
            size,
        };
        copy_buffer_impl(
            &registry,
            &cmd_list,
            vk::Buffer::from_raw(0x40),
            vk::Buffer::from_raw(0x50),
            &[region(64), region(256)],
        );

        assert_eq!(seen.load(Ordering::Relaxed), 2);
        assert_eq!(COPY_CALLS.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn index_size_follows_type() {
        let buffer = vk::Buffer::from_raw(0x60);
        assert_eq!(index_size(buffer, vk::IndexType::UINT16), 2);
        assert_eq!(index_size(buffer, vk::IndexType::UINT32), 4);
        assert_eq!(index_size(buffer, vk::IndexType::UINT8_EXT), 1);
        assert_eq!(index_size(vk::Buffer::null(), vk::IndexType::UINT16), 0);
    }

    #[test]
    fn blend_constants_pack_as_rgba8() {
        assert_eq!(pack_color(&[1.0, 0.0, 0.0, 1.0]), 0xff00_00ff);
        assert_eq!(pack_color(&[2.0, -1.0, 0.5, 0.0]), 0x0080_00ff);
    }

    #[test]
    fn render_pass_begin_reports_framebuffer_views() {
        let cmd_list = command_list(0x3300);
        let render_pass = vk::RenderPass::from_raw(0x70);
        let framebuffer = vk::Framebuffer::from_raw(0x80);

        let attachment = vk::AttachmentDescription {
            format: vk::Format::R8G8B8A8_UNORM,
            samples: vk::SampleCountFlags::TYPE_1,
            load_op: vk::AttachmentLoadOp::CLEAR,
            store_op: vk::AttachmentStoreOp::STORE,
            ..Default::default()
        };
        let color = vk::AttachmentReference {
            attachment: 0,
            layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
        };
        let subpass = vk::SubpassDescription::default().color_attachments(core::slice::from_ref(&color));
        let info = vk::RenderPassCreateInfo::default()
            .attachments(core::slice::from_ref(&attachment))
            .subpasses(core::slice::from_ref(&subpass));
        cmd_list
            .device
            .render_passes
            .insert(render_pass.as_raw(), RenderPassData::from_info(&info));
        cmd_list.device.framebuffers.insert(
            framebuffer.as_raw(),
            FramebufferData {
                attachments: vec![vk::ImageView::from_raw(0x90)],
            },
        );

        let registry = Registry::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        registry.register_addon("passes", {
            let seen = seen.clone();
            move |r| {
                r.on(EventKind::BeginRenderPass, move |event| {
                    if let Event::BeginRenderPass { render_targets, .. } = event {
                        seen.lock().extend_from_slice(render_targets);
                    }
                    Flow::Continue
                });
            }
        });

        let clear = [vk::ClearValue {
            color: vk::ClearColorValue {
                float32: [0.0, 0.5, 1.0, 1.0],
            },
        }];
        let begin = vk::RenderPassBeginInfo::default()
            .render_pass(render_pass)
            .framebuffer(framebuffer)
            .clear_values(&clear);
        begin_render_pass_impl(&registry, &cmd_list, &begin);

        let seen = seen.lock();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].view, ResourceView::from_raw(0x90));
        assert_eq!(seen[0].load_op, LoadOp::Clear);
        assert_eq!(seen[0].clear_color, [0.0, 0.5, 1.0, 1.0]);

        let (colors, depth_stencil) = subpass_views(&cmd_list.device, &cmd_list.state.lock()).unwrap();
        assert_eq!(colors, [ResourceView::from_raw(0x90)]);
        assert_eq!(depth_stencil, None);
    }
}
