use std::{ffi::CString, sync::Arc};

use ash::vk::{self, Handle};
use parking_lot::Mutex;
use tint_api::{
    CommandList, DescriptorSet, Device, Format, Pipeline, PipelineLayout, QueryPool, Resource,
    ResourceView,
    descriptor::DescriptorSetUpdate,
    pipeline::{
        IndirectCommand, PipelineStage, PipelineState, QueryType, Rect, RenderPassDepthStencil,
        RenderPassRenderTarget, ShaderStage, Viewport,
    },
    resource::{ResourceDesc, ResourceDimension, ResourceUsage, SubresourceBox},
    sampler::FilterMode,
};
use tracing::{debug, error};

use super::{
    DeviceImpl,
    device_impl::{NativeResource, NativeView, ParamBinding, ResourceData, ViewData, unpack_color},
    render_pass::RenderPassKey,
};
use crate::conv;

/// Render pass the command buffer is currently recording in.
#[derive(Clone, Default)]
pub(crate) struct PassState {
    pub render_pass: vk::RenderPass,
    pub framebuffer: vk::Framebuffer,
    pub subpass: u32,
    /// Framebuffer attachments, or the ones passed at begin time for imageless framebuffers.
    pub views: Vec<vk::ImageView>,
    pub clear_values: Vec<vk::ClearValue>,
}

pub struct CommandListImpl {
    pub(crate) handle: vk::CommandBuffer,
    pub(crate) device: Arc<DeviceImpl>,
    pub(crate) pool: vk::CommandPool,
    pub(crate) level: vk::CommandBufferLevel,
    pub(crate) state: Mutex<PassState>,
}

impl CommandListImpl {
    pub(crate) fn new(
        device: Arc<DeviceImpl>,
        handle: vk::CommandBuffer,
        pool: vk::CommandPool,
        level: vk::CommandBufferLevel,
    ) -> Self {
        Self {
            handle,
            device,
            pool,
            level,
            state: Mutex::new(PassState::default()),
        }
    }

    fn image(&self, resource: Resource) -> Option<(ResourceData, vk::Image)> {
        let data = self.device.resources.get_copied(resource.raw())?;
        match data.native {
            NativeResource::Image { image, .. } => Some((data, image)),
            NativeResource::Buffer(_) => None,
        }
    }

    fn buffer(&self, resource: Resource) -> Option<(ResourceData, vk::Buffer)> {
        let data = self.device.resources.get_copied(resource.raw())?;
        match data.native {
            NativeResource::Buffer(buffer) => Some((data, buffer)),
            NativeResource::Image { .. } => None,
        }
    }

    fn image_view(&self, view: ResourceView) -> Option<(ViewData, vk::ImageView, vk::Image, vk::ImageSubresourceRange)> {
        let data = self.device.views.get_copied(view.raw())?;
        match data.native {
            NativeView::Image {
                view, image, range, ..
            } => Some((data, view, image, range)),
            NativeView::Buffer(_) => None,
        }
    }

    fn bind_point(&self, stages: ShaderStage) -> vk::PipelineBindPoint {
        if stages == ShaderStage::COMPUTE {
            vk::PipelineBindPoint::COMPUTE
        } else {
            vk::PipelineBindPoint::GRAPHICS
        }
    }

    fn set_index(&self, layout: PipelineLayout, param: u32) -> u32 {
        match self.device.param_binding(layout, param) {
            Some(ParamBinding::Set(index)) => index,
            _ => param,
        }
    }

    /// Layout transition of a single mip level.
    #[allow(clippy::too_many_arguments)]
    fn level_barrier(
        &self,
        image: vk::Image,
        aspect: vk::ImageAspectFlags,
        level: u32,
        old_layout: vk::ImageLayout,
        new_layout: vk::ImageLayout,
        src_access: vk::AccessFlags,
        dst_access: vk::AccessFlags,
    ) {
        let barrier = vk::ImageMemoryBarrier::default()
            .src_access_mask(src_access)
            .dst_access_mask(dst_access)
            .old_layout(old_layout)
            .new_layout(new_layout)
            .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .image(image)
            .subresource_range(vk::ImageSubresourceRange {
                aspect_mask: aspect,
                base_mip_level: level,
                level_count: 1,
                base_array_layer: 0,
                layer_count: vk::REMAINING_ARRAY_LAYERS,
            });

        unsafe {
            self.device.fp.cmd_pipeline_barrier(
                self.handle,
                vk::PipelineStageFlags::TRANSFER,
                vk::PipelineStageFlags::TRANSFER,
                vk::DependencyFlags::empty(),
                &[],
                &[],
                &[barrier],
            );
        }
    }

    fn debug_label(label: &str, color: [f32; 4], f: impl FnOnce(&vk::DebugUtilsLabelEXT<'_>)) {
        let Ok(name) = CString::new(label) else {
            return;
        };
        f(&vk::DebugUtilsLabelEXT::default()
            .label_name(&name)
            .color(color));
    }
}

pub(crate) fn whole_range(aspect: vk::ImageAspectFlags) -> vk::ImageSubresourceRange {
    vk::ImageSubresourceRange {
        aspect_mask: aspect,
        base_mip_level: 0,
        level_count: vk::REMAINING_MIP_LEVELS,
        base_array_layer: 0,
        layer_count: vk::REMAINING_ARRAY_LAYERS,
    }
}

/// Subresource index to level and layer. Levels vary fastest.
pub(crate) fn subresource_layers(
    desc: &ResourceDesc,
    aspect: vk::ImageAspectFlags,
    subresource: u32,
) -> vk::ImageSubresourceLayers {
    let levels = u32::from(desc.levels()).max(1);
    vk::ImageSubresourceLayers {
        aspect_mask: aspect,
        mip_level: subresource % levels,
        base_array_layer: subresource / levels,
        layer_count: 1,
    }
}

pub(crate) fn level_extent(desc: &ResourceDesc, level: u32) -> vk::Extent3D {
    let (width, height, depth) = desc.extent();
    vk::Extent3D {
        width: (width >> level).max(1),
        height: (height >> level).max(1),
        depth: (depth >> level).max(1),
    }
}

/// Offset and extent of a box, or of the whole level without one.
fn box_region(
    desc: &ResourceDesc,
    level: u32,
    region: Option<&SubresourceBox>,
) -> (vk::Offset3D, vk::Extent3D) {
    match region {
        Some(region) => (
            vk::Offset3D {
                x: region.left,
                y: region.top,
                z: region.front,
            },
            vk::Extent3D {
                width: region.width(),
                height: region.height(),
                depth: region.depth(),
            },
        ),
        None => (vk::Offset3D::default(), level_extent(desc, level)),
    }
}

pub(crate) fn buffer_image_copy(
    desc: &ResourceDesc,
    aspect: vk::ImageAspectFlags,
    buffer_offset: u64,
    row_length: u32,
    image_height: u32,
    subresource: u32,
    region: Option<&SubresourceBox>,
) -> vk::BufferImageCopy {
    let layers = subresource_layers(desc, aspect, subresource);
    let (offset, extent) = box_region(desc, layers.mip_level, region);
    vk::BufferImageCopy {
        buffer_offset,
        buffer_row_length: row_length,
        buffer_image_height: image_height,
        image_subresource: layers,
        image_offset: offset,
        image_extent: extent,
    }
}

fn buffer_size(desc: &ResourceDesc) -> u64 {
    match desc.dimension {
        ResourceDimension::Buffer { size, .. } => size,
        _ => 0,
    }
}

fn sample_count(desc: &ResourceDesc) -> vk::SampleCountFlags {
    match desc.dimension {
        ResourceDimension::Texture2d { samples, .. } => {
            vk::SampleCountFlags::from_raw(u32::from(samples.max(1)))
        }
        _ => vk::SampleCountFlags::TYPE_1,
    }
}

fn box_to_offsets(desc: &ResourceDesc, level: u32, region: Option<&SubresourceBox>) -> [vk::Offset3D; 2] {
    let (offset, extent) = box_region(desc, level, region);
    [
        offset,
        vk::Offset3D {
            x: offset.x + extent.width as i32,
            y: offset.y + extent.height as i32,
            z: offset.z + extent.depth as i32,
        },
    ]
}

impl CommandList for CommandListImpl {
    fn barrier(&self, resources: &[Resource], old_states: &[ResourceUsage], new_states: &[ResourceUsage]) {
        let device = &self.device;
        let mut src_stage = vk::PipelineStageFlags::empty();
        let mut dst_stage = vk::PipelineStageFlags::empty();
        let mut image_barriers = Vec::new();
        let mut buffer_barriers = Vec::new();

        for ((resource, &old_state), &new_state) in resources.iter().zip(old_states).zip(new_states) {
            let Some(data) = device.resources.get_copied(resource.raw()) else {
                continue;
            };
            src_stage |= conv::map_pipeline_stage(old_state, true, &device.features);
            dst_stage |= conv::map_pipeline_stage(new_state, false, &device.features);

            match data.native {
                NativeResource::Image { image, .. } => image_barriers.push(
                    vk::ImageMemoryBarrier::default()
                        .src_access_mask(conv::map_access(old_state))
                        .dst_access_mask(conv::map_access(new_state))
                        .old_layout(conv::map_image_layout(old_state))
                        .new_layout(conv::map_image_layout(new_state))
                        .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                        .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                        .image(image)
                        .subresource_range(whole_range(data.aspect())),
                ),
                NativeResource::Buffer(buffer) => buffer_barriers.push(
                    vk::BufferMemoryBarrier::default()
                        .src_access_mask(conv::map_access(old_state))
                        .dst_access_mask(conv::map_access(new_state))
                        .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                        .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                        .buffer(buffer)
                        .offset(0)
                        .size(vk::WHOLE_SIZE),
                ),
            }
        }

        if image_barriers.is_empty() && buffer_barriers.is_empty() {
            return;
        }

        unsafe {
            device.fp.cmd_pipeline_barrier(
                self.handle,
                src_stage,
                dst_stage,
                vk::DependencyFlags::empty(),
                &[],
                &buffer_barriers,
                &image_barriers,
            );
        }
    }

    fn begin_render_pass(
        &self,
        render_targets: &[RenderPassRenderTarget],
        depth_stencil: Option<&RenderPassDepthStencil>,
    ) {
        let device = &self.device;
        let mut views = Vec::with_capacity(render_targets.len() + 1);
        let mut clear_values = Vec::with_capacity(render_targets.len() + 1);
        let mut colors = Vec::with_capacity(render_targets.len());
        let mut area: Option<vk::Extent2D> = None;
        let mut samples = vk::SampleCountFlags::TYPE_1;

        let mut attach = |view: ResourceView| {
            let (data, image_view, _, range) = self.image_view(view)?;
            let desc = device.get_resource_desc(data.resource)?;
            let extent = level_extent(&desc, range.base_mip_level);
            let extent = vk::Extent2D {
                width: extent.width,
                height: extent.height,
            };
            area = Some(match area {
                Some(area) => vk::Extent2D {
                    width: area.width.min(extent.width),
                    height: area.height.min(extent.height),
                },
                None => extent,
            });
            samples = sample_count(&desc);
            views.push(image_view);

            match data.native {
                NativeView::Image { format, .. } => Some(format),
                NativeView::Buffer(_) => None,
            }
        };

        for target in render_targets {
            let Some(format) = attach(target.view) else {
                debug!("render target {:?} is not an image view", target.view);
                return;
            };
            colors.push((
                format,
                conv::map_load_op(target.load_op),
                conv::map_store_op(target.store_op),
            ));
            clear_values.push(vk::ClearValue {
                color: vk::ClearColorValue {
                    float32: target.clear_color,
                },
            });
        }

        let depth_stencil = match depth_stencil {
            Some(target) => {
                let Some(format) = attach(target.view) else {
                    debug!("depth stencil {:?} is not an image view", target.view);
                    return;
                };
                clear_values.push(vk::ClearValue {
                    depth_stencil: vk::ClearDepthStencilValue {
                        depth: target.clear_depth,
                        stencil: u32::from(target.clear_stencil),
                    },
                });
                Some((
                    format,
                    conv::map_load_op(target.depth_load_op),
                    conv::map_store_op(target.depth_store_op),
                    conv::map_load_op(target.stencil_load_op),
                    conv::map_store_op(target.stencil_store_op),
                ))
            }
            None => None,
        };

        let Some(area) = area else {
            debug!("render pass without attachments ignored");
            return;
        };

        let render_pass = match device.render_pass(RenderPassKey {
            colors,
            depth_stencil,
            samples,
        }) {
            Ok(render_pass) => render_pass,
            Err(err) => {
                error!("failed to create render pass. err: {err}");
                return;
            }
        };
        let framebuffer = match device.framebuffer(render_pass, views, area) {
            Ok(framebuffer) => framebuffer,
            Err(err) => {
                error!("failed to create framebuffer. err: {err}");
                return;
            }
        };

        let info = vk::RenderPassBeginInfo::default()
            .render_pass(render_pass)
            .framebuffer(framebuffer)
            .render_area(vk::Rect2D {
                offset: vk::Offset2D::default(),
                extent: area,
            })
            .clear_values(&clear_values);
        unsafe {
            device
                .fp
                .cmd_begin_render_pass(self.handle, &info, vk::SubpassContents::INLINE)
        };

        *self.state.lock() = PassState {
            render_pass,
            framebuffer,
            subpass: 0,
            views: Vec::new(),
            clear_values,
        };
    }

    fn finish_render_pass(&self) {
        unsafe { self.device.fp.cmd_end_render_pass(self.handle) };
        *self.state.lock() = PassState::default();
    }

    fn bind_pipeline(&self, stages: PipelineStage, pipeline: Pipeline) {
        let bind_point = self
            .device
            .pipelines
            .with(pipeline.raw(), |data| data.bind_point)
            .unwrap_or(if stages == PipelineStage::COMPUTE_SHADER {
                vk::PipelineBindPoint::COMPUTE
            } else {
                vk::PipelineBindPoint::GRAPHICS
            });

        unsafe {
            self.device.fp.cmd_bind_pipeline(
                self.handle,
                bind_point,
                vk::Pipeline::from_raw(pipeline.raw()),
            )
        };
    }

    fn bind_pipeline_states(&self, states: &[PipelineState], values: &[u32]) {
        let fp = &self.device.fp;
        for (&state, &value) in states.iter().zip(values) {
            unsafe {
                match state {
                    PipelineState::BlendConstant => {
                        fp.cmd_set_blend_constants(self.handle, &unpack_color(value))
                    }
                    PipelineState::StencilReferenceValue => fp.cmd_set_stencil_reference(
                        self.handle,
                        vk::StencilFaceFlags::FRONT_AND_BACK,
                        value,
                    ),
                    PipelineState::StencilReadMask => fp.cmd_set_stencil_compare_mask(
                        self.handle,
                        vk::StencilFaceFlags::FRONT_AND_BACK,
                        value,
                    ),
                    PipelineState::StencilWriteMask => fp.cmd_set_stencil_write_mask(
                        self.handle,
                        vk::StencilFaceFlags::FRONT_AND_BACK,
                        value,
                    ),
                    PipelineState::DepthBias => fp.cmd_set_depth_bias(
                        self.handle,
                        f32::from_bits(value),
                        0.0,
                        0.0,
                    ),
                    state => debug!("pipeline state {state:?} is not dynamic"),
                }
            }
        }
    }

    fn bind_viewports(&self, first: u32, viewports: &[Viewport]) {
        let viewports: Vec<vk::Viewport> = viewports
            .iter()
            .map(|viewport| vk::Viewport {
                x: viewport.x,
                y: viewport.y,
                width: viewport.width,
                height: viewport.height,
                min_depth: viewport.min_depth,
                max_depth: viewport.max_depth,
            })
            .collect();
        unsafe { self.device.fp.cmd_set_viewport(self.handle, first, &viewports) };
    }

    fn bind_scissor_rects(&self, first: u32, rects: &[Rect]) {
        let rects: Vec<vk::Rect2D> = rects
            .iter()
            .map(|rect| vk::Rect2D {
                offset: vk::Offset2D {
                    x: rect.left,
                    y: rect.top,
                },
                extent: vk::Extent2D {
                    width: rect.width(),
                    height: rect.height(),
                },
            })
            .collect();
        unsafe { self.device.fp.cmd_set_scissor(self.handle, first, &rects) };
    }

    fn push_constants(
        &self,
        _stages: ShaderStage,
        layout: PipelineLayout,
        param: u32,
        first: u32,
        values: &[u32],
    ) {
        let Some(ParamBinding::Constants { stages, offset }) =
            self.device.param_binding(layout, param)
        else {
            debug!("parameter {param} of {layout:?} is not a push constant range");
            return;
        };

        unsafe {
            self.device.fp.cmd_push_constants(
                self.handle,
                vk::PipelineLayout::from_raw(layout.raw()),
                stages,
                offset + first * 4,
                bytemuck::cast_slice(values),
            )
        };
    }

    fn push_descriptors(
        &self,
        stages: ShaderStage,
        layout: PipelineLayout,
        param: u32,
        update: &DescriptorSetUpdate<'_>,
    ) {
        let device = &self.device;
        let Some(ParamBinding::Set(index)) = device.param_binding(layout, param) else {
            debug!("parameter {param} of {layout:?} is not a descriptor set");
            return;
        };
        let vk_layout = vk::PipelineLayout::from_raw(layout.raw());
        let bind_point = self.bind_point(stages);

        let (ty, info) = device.descriptor_write_info(&update.descriptors);
        let write = info.apply(
            vk::WriteDescriptorSet::default()
                .dst_binding(update.binding)
                .dst_array_element(update.array_offset)
                .descriptor_type(ty),
        );

        if let Some(push_descriptor_set) = device.optional.cmd_push_descriptor_set {
            unsafe { push_descriptor_set(self.handle, bind_point, vk_layout, index, 1, &write) };
            return;
        }

        let Some(Some(set_layout)) = device.pipeline_layouts.with(layout.raw(), |data| {
            data.set_layouts.get(index as usize).copied()
        }) else {
            return;
        };
        let set = match device.allocate_transient_set(set_layout) {
            Ok(set) => set,
            Err(err) => {
                error!("failed to allocate transient descriptor set. err: {err}");
                return;
            }
        };

        unsafe {
            device.fp.update_descriptor_sets(&[write.dst_set(set)], &[]);
            device
                .fp
                .cmd_bind_descriptor_sets(self.handle, bind_point, vk_layout, index, &[set], &[]);
        }
    }

    fn bind_descriptor_sets(
        &self,
        stages: ShaderStage,
        layout: PipelineLayout,
        first: u32,
        sets: &[DescriptorSet],
    ) {
        let sets: Vec<vk::DescriptorSet> = sets
            .iter()
            .map(|set| vk::DescriptorSet::from_raw(set.raw()))
            .collect();

        unsafe {
            self.device.fp.cmd_bind_descriptor_sets(
                self.handle,
                self.bind_point(stages),
                vk::PipelineLayout::from_raw(layout.raw()),
                self.set_index(layout, first),
                &sets,
                &[],
            )
        };
    }

    fn bind_index_buffer(&self, buffer: Resource, offset: u64, index_size: u32) {
        let index_type = match index_size {
            2 => vk::IndexType::UINT16,
            4 => vk::IndexType::UINT32,
            _ => {
                debug!("index buffers can't be unbound");
                return;
            }
        };

        unsafe {
            self.device.fp.cmd_bind_index_buffer(
                self.handle,
                vk::Buffer::from_raw(buffer.raw()),
                offset,
                index_type,
            )
        };
    }

    fn bind_vertex_buffers(&self, first: u32, buffers: &[Resource], offsets: &[u64], _strides: &[u32]) {
        let buffers: Vec<vk::Buffer> = buffers
            .iter()
            .map(|buffer| vk::Buffer::from_raw(buffer.raw()))
            .collect();
        let count = buffers.len().min(offsets.len());

        unsafe {
            self.device.fp.cmd_bind_vertex_buffers(
                self.handle,
                first,
                &buffers[..count],
                &offsets[..count],
            )
        };
    }

    fn draw(&self, vertex_count: u32, instance_count: u32, first_vertex: u32, first_instance: u32) {
        unsafe {
            self.device.fp.cmd_draw(
                self.handle,
                vertex_count,
                instance_count,
                first_vertex,
                first_instance,
            )
        };
    }

    fn draw_indexed(
        &self,
        index_count: u32,
        instance_count: u32,
        first_index: u32,
        vertex_offset: i32,
        first_instance: u32,
    ) {
        unsafe {
            self.device.fp.cmd_draw_indexed(
                self.handle,
                index_count,
                instance_count,
                first_index,
                vertex_offset,
                first_instance,
            )
        };
    }

    fn dispatch(&self, x: u32, y: u32, z: u32) {
        unsafe { self.device.fp.cmd_dispatch(self.handle, x, y, z) };
    }

    fn draw_or_dispatch_indirect(
        &self,
        ty: IndirectCommand,
        buffer: Resource,
        offset: u64,
        draw_count: u32,
        stride: u32,
    ) {
        let buffer = vk::Buffer::from_raw(buffer.raw());
        let fp = &self.device.fp;
        unsafe {
            match ty {
                IndirectCommand::Draw => {
                    fp.cmd_draw_indirect(self.handle, buffer, offset, draw_count, stride)
                }
                IndirectCommand::DrawIndexed => {
                    fp.cmd_draw_indexed_indirect(self.handle, buffer, offset, draw_count, stride)
                }
                IndirectCommand::Dispatch => {
                    for i in 0..u64::from(draw_count) {
                        fp.cmd_dispatch_indirect(self.handle, buffer, offset + i * u64::from(stride));
                    }
                }
            }
        }
    }

    fn copy_resource(&self, src: Resource, dst: Resource) {
        let device = &self.device;
        let (Some(src_data), Some(dst_data)) = (
            device.resources.get_copied(src.raw()),
            device.resources.get_copied(dst.raw()),
        ) else {
            return;
        };

        match (src_data.native, dst_data.native) {
            (NativeResource::Buffer(src_buffer), NativeResource::Buffer(dst_buffer)) => {
                let region = vk::BufferCopy {
                    src_offset: 0,
                    dst_offset: 0,
                    size: buffer_size(&src_data.desc).min(buffer_size(&dst_data.desc)),
                };
                unsafe {
                    device
                        .fp
                        .cmd_copy_buffer(self.handle, src_buffer, dst_buffer, &[region])
                };
            }

            (
                NativeResource::Image { image: src_image, .. },
                NativeResource::Image { image: dst_image, .. },
            ) => {
                let layers = u32::from(src_data.desc.layers());
                let regions: Vec<vk::ImageCopy> = (0..u32::from(src_data.desc.levels()))
                    .map(|level| {
                        let src_subresource = vk::ImageSubresourceLayers {
                            aspect_mask: src_data.aspect(),
                            mip_level: level,
                            base_array_layer: 0,
                            layer_count: layers,
                        };
                        vk::ImageCopy {
                            src_subresource,
                            src_offset: vk::Offset3D::default(),
                            dst_subresource: vk::ImageSubresourceLayers {
                                aspect_mask: dst_data.aspect(),
                                ..src_subresource
                            },
                            dst_offset: vk::Offset3D::default(),
                            extent: level_extent(&src_data.desc, level),
                        }
                    })
                    .collect();

                unsafe {
                    device.fp.cmd_copy_image(
                        self.handle,
                        src_image,
                        vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
                        dst_image,
                        vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                        &regions,
                    )
                };
            }

            _ => debug!("copy between a buffer and a texture needs a region"),
        }
    }

    fn copy_buffer_region(&self, src: Resource, src_offset: u64, dst: Resource, dst_offset: u64, size: u64) {
        let (Some((src_data, src_buffer)), Some((_, dst_buffer))) = (self.buffer(src), self.buffer(dst))
        else {
            return;
        };

        let size = if size == u64::MAX {
            buffer_size(&src_data.desc).saturating_sub(src_offset)
        } else {
            size
        };
        let region = vk::BufferCopy {
            src_offset,
            dst_offset,
            size,
        };
        unsafe {
            self.device
                .fp
                .cmd_copy_buffer(self.handle, src_buffer, dst_buffer, &[region])
        };
    }

    fn copy_buffer_to_texture(
        &self,
        src: Resource,
        src_offset: u64,
        row_length: u32,
        slice_height: u32,
        dst: Resource,
        dst_subresource: u32,
        dst_box: Option<&SubresourceBox>,
    ) {
        let (Some((_, buffer)), Some((dst_data, image))) = (self.buffer(src), self.image(dst)) else {
            return;
        };

        let region = buffer_image_copy(
            &dst_data.desc,
            dst_data.aspect(),
            src_offset,
            row_length,
            slice_height,
            dst_subresource,
            dst_box,
        );
        unsafe {
            self.device.fp.cmd_copy_buffer_to_image(
                self.handle,
                buffer,
                image,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                &[region],
            )
        };
    }

    fn copy_texture_region(
        &self,
        src: Resource,
        src_subresource: u32,
        src_box: Option<&SubresourceBox>,
        dst: Resource,
        dst_subresource: u32,
        dst_box: Option<&SubresourceBox>,
        filter: FilterMode,
    ) {
        let (Some((src_data, src_image)), Some((dst_data, dst_image))) = (self.image(src), self.image(dst))
        else {
            return;
        };

        let src_layers = subresource_layers(&src_data.desc, src_data.aspect(), src_subresource);
        let dst_layers = subresource_layers(&dst_data.desc, dst_data.aspect(), dst_subresource);
        let (src_offset, src_extent) = box_region(&src_data.desc, src_layers.mip_level, src_box);
        let (dst_offset, dst_extent) = box_region(&dst_data.desc, dst_layers.mip_level, dst_box);

        let fp = &self.device.fp;
        // Differently sized regions need a scaling blit
        if dst_box.is_some() && src_extent != dst_extent {
            let region = vk::ImageBlit {
                src_subresource: src_layers,
                src_offsets: box_to_offsets(&src_data.desc, src_layers.mip_level, src_box),
                dst_subresource: dst_layers,
                dst_offsets: box_to_offsets(&dst_data.desc, dst_layers.mip_level, dst_box),
            };
            let filter = if filter.min_linear() || filter.mag_linear() {
                vk::Filter::LINEAR
            } else {
                vk::Filter::NEAREST
            };

            unsafe {
                fp.cmd_blit_image(
                    self.handle,
                    src_image,
                    vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
                    dst_image,
                    vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                    &[region],
                    filter,
                )
            };
            return;
        }

        let region = vk::ImageCopy {
            src_subresource: src_layers,
            src_offset,
            dst_subresource: dst_layers,
            dst_offset,
            extent: src_extent,
        };
        unsafe {
            fp.cmd_copy_image(
                self.handle,
                src_image,
                vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
                dst_image,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                &[region],
            )
        };
    }

    fn copy_texture_to_buffer(
        &self,
        src: Resource,
        src_subresource: u32,
        src_box: Option<&SubresourceBox>,
        dst: Resource,
        dst_offset: u64,
        row_length: u32,
        slice_height: u32,
    ) {
        let (Some((src_data, image)), Some((_, buffer))) = (self.image(src), self.buffer(dst)) else {
            return;
        };

        let region = buffer_image_copy(
            &src_data.desc,
            src_data.aspect(),
            dst_offset,
            row_length,
            slice_height,
            src_subresource,
            src_box,
        );
        unsafe {
            self.device.fp.cmd_copy_image_to_buffer(
                self.handle,
                image,
                vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
                buffer,
                &[region],
            )
        };
    }

    fn resolve_texture_region(
        &self,
        src: Resource,
        src_subresource: u32,
        src_box: Option<&SubresourceBox>,
        dst: Resource,
        dst_subresource: u32,
        dst_offset: [i32; 3],
        _format: Format,
    ) {
        let (Some((src_data, src_image)), Some((dst_data, dst_image))) = (self.image(src), self.image(dst))
        else {
            return;
        };

        let src_layers = subresource_layers(&src_data.desc, src_data.aspect(), src_subresource);
        let (src_offset, extent) = box_region(&src_data.desc, src_layers.mip_level, src_box);
        let [x, y, z] = dst_offset;
        let region = vk::ImageResolve {
            src_subresource: src_layers,
            src_offset,
            dst_subresource: subresource_layers(&dst_data.desc, dst_data.aspect(), dst_subresource),
            dst_offset: vk::Offset3D { x, y, z },
            extent,
        };

        unsafe {
            self.device.fp.cmd_resolve_image(
                self.handle,
                src_image,
                vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
                dst_image,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                &[region],
            )
        };
    }

    fn clear_depth_stencil_view(
        &self,
        dsv: ResourceView,
        depth: Option<f32>,
        stencil: Option<u8>,
        rects: &[Rect],
    ) {
        let Some((data, _, image, mut range)) = self.image_view(dsv) else {
            return;
        };
        if !rects.is_empty() {
            debug!("clear rectangles are ignored");
        }

        let mut aspect = vk::ImageAspectFlags::empty();
        if depth.is_some() {
            aspect |= vk::ImageAspectFlags::DEPTH;
        }
        if stencil.is_some() {
            aspect |= vk::ImageAspectFlags::STENCIL;
        }
        range.aspect_mask &= aspect;
        if range.aspect_mask.is_empty() {
            return;
        }

        let value = vk::ClearDepthStencilValue {
            depth: depth.unwrap_or_default(),
            stencil: u32::from(stencil.unwrap_or_default()),
        };
        let resource = [data.resource];
        self.barrier(&resource, &[ResourceUsage::DEPTH_STENCIL_WRITE], &[ResourceUsage::COPY_DEST]);
        unsafe {
            self.device.fp.cmd_clear_depth_stencil_image(
                self.handle,
                image,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                &value,
                &[range],
            )
        };
        self.barrier(&resource, &[ResourceUsage::COPY_DEST], &[ResourceUsage::DEPTH_STENCIL_WRITE]);
    }

    fn clear_render_target_view(&self, rtv: ResourceView, color: &[f32; 4], rects: &[Rect]) {
        let Some((data, _, image, range)) = self.image_view(rtv) else {
            return;
        };
        if !rects.is_empty() {
            debug!("clear rectangles are ignored");
        }

        let value = vk::ClearColorValue { float32: *color };
        let resource = [data.resource];
        self.barrier(&resource, &[ResourceUsage::RENDER_TARGET], &[ResourceUsage::COPY_DEST]);
        unsafe {
            self.device.fp.cmd_clear_color_image(
                self.handle,
                image,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                &value,
                &[range],
            )
        };
        self.barrier(&resource, &[ResourceUsage::COPY_DEST], &[ResourceUsage::RENDER_TARGET]);
    }

    fn clear_unordered_access_view_uint(&self, uav: ResourceView, values: &[u32; 4], _rects: &[Rect]) {
        let Some((_, _, image, range)) = self.image_view(uav) else {
            debug!("only texture views can be cleared");
            return;
        };

        unsafe {
            self.device.fp.cmd_clear_color_image(
                self.handle,
                image,
                vk::ImageLayout::GENERAL,
                &vk::ClearColorValue { uint32: *values },
                &[range],
            )
        };
    }

    fn clear_unordered_access_view_float(&self, uav: ResourceView, values: &[f32; 4], _rects: &[Rect]) {
        let Some((_, _, image, range)) = self.image_view(uav) else {
            debug!("only texture views can be cleared");
            return;
        };

        unsafe {
            self.device.fp.cmd_clear_color_image(
                self.handle,
                image,
                vk::ImageLayout::GENERAL,
                &vk::ClearColorValue { float32: *values },
                &[range],
            )
        };
    }

    fn generate_mipmaps(&self, srv: ResourceView) {
        let Some((data, _, image, range)) = self.image_view(srv) else {
            return;
        };
        let Some(desc) = self.device.get_resource_desc(data.resource) else {
            return;
        };
        let levels = u32::from(desc.levels());
        if levels < 2 {
            return;
        }

        let aspect = range.aspect_mask;
        let layers = u32::from(desc.layers());
        let resource = [data.resource];
        self.barrier(&resource, &[ResourceUsage::SHADER_RESOURCE], &[ResourceUsage::COPY_DEST]);

        for level in 1..levels {
            self.level_barrier(
                image,
                aspect,
                level - 1,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
                vk::AccessFlags::TRANSFER_WRITE,
                vk::AccessFlags::TRANSFER_READ,
            );

            let subresource = |mip_level| vk::ImageSubresourceLayers {
                aspect_mask: aspect,
                mip_level,
                base_array_layer: 0,
                layer_count: layers,
            };
            let region = vk::ImageBlit {
                src_subresource: subresource(level - 1),
                src_offsets: box_to_offsets(&desc, level - 1, None),
                dst_subresource: subresource(level),
                dst_offsets: box_to_offsets(&desc, level, None),
            };
            unsafe {
                self.device.fp.cmd_blit_image(
                    self.handle,
                    image,
                    vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
                    image,
                    vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                    &[region],
                    vk::Filter::LINEAR,
                )
            };
        }

        // Every level but the last ends up as a blit source
        for level in 0..levels {
            let old_layout = if level == levels - 1 {
                vk::ImageLayout::TRANSFER_DST_OPTIMAL
            } else {
                vk::ImageLayout::TRANSFER_SRC_OPTIMAL
            };
            self.level_barrier(
                image,
                aspect,
                level,
                old_layout,
                vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
                vk::AccessFlags::TRANSFER_WRITE | vk::AccessFlags::TRANSFER_READ,
                vk::AccessFlags::SHADER_READ,
            );
        }
    }

    fn begin_query(&self, pool: QueryPool, ty: QueryType, index: u32) {
        let pool = vk::QueryPool::from_raw(pool.raw());
        let flags = match ty {
            QueryType::Timestamp => return,
            QueryType::Occlusion => vk::QueryControlFlags::PRECISE,
            _ => vk::QueryControlFlags::empty(),
        };

        unsafe {
            self.device.fp.cmd_reset_query_pool(self.handle, pool, index, 1);
            self.device.fp.cmd_begin_query(self.handle, pool, index, flags);
        }
    }

    fn end_query(&self, pool: QueryPool, ty: QueryType, index: u32) {
        let pool = vk::QueryPool::from_raw(pool.raw());
        unsafe {
            if ty == QueryType::Timestamp {
                self.device.fp.cmd_reset_query_pool(self.handle, pool, index, 1);
                self.device.fp.cmd_write_timestamp(
                    self.handle,
                    vk::PipelineStageFlags::BOTTOM_OF_PIPE,
                    pool,
                    index,
                );
            } else {
                self.device.fp.cmd_end_query(self.handle, pool, index);
            }
        }
    }

    fn copy_query_pool_results(
        &self,
        pool: QueryPool,
        _ty: QueryType,
        first: u32,
        count: u32,
        dst: Resource,
        dst_offset: u64,
        stride: u32,
    ) {
        unsafe {
            self.device.fp.cmd_copy_query_pool_results(
                self.handle,
                vk::QueryPool::from_raw(pool.raw()),
                first,
                count,
                vk::Buffer::from_raw(dst.raw()),
                dst_offset,
                u64::from(stride),
                vk::QueryResultFlags::TYPE_64 | vk::QueryResultFlags::WAIT,
            )
        };
    }

    fn begin_debug_event(&self, label: &str, color: [f32; 4]) {
        let Some(begin) = self.device.optional.cmd_begin_debug_utils_label else {
            return;
        };
        Self::debug_label(label, color, |info| unsafe { begin(self.handle, info) });
    }

    fn end_debug_event(&self) {
        if let Some(end) = self.device.optional.cmd_end_debug_utils_label {
            unsafe { end(self.handle) };
        }
    }

    fn insert_debug_marker(&self, label: &str, color: [f32; 4]) {
        let Some(insert) = self.device.optional.cmd_insert_debug_utils_label else {
            return;
        };
        Self::debug_label(label, color, |info| unsafe { insert(self.handle, info) });
    }
}

#[cfg(test)]
mod tests {
    use tint_api::resource::{MemoryHeap, ResourceFlags};

    use super::*;

    fn texture(levels: u16, layers: u16) -> ResourceDesc {
        ResourceDesc {
            dimension: ResourceDimension::Texture2d {
                width: 256,
                height: 64,
                layers,
                levels,
                samples: 1,
            },
            format: Format::R8G8B8A8Unorm,
            heap: MemoryHeap::GpuOnly,
            usage: ResourceUsage::SHADER_RESOURCE,
            flags: ResourceFlags::empty(),
        }
    }

    #[test]
    fn subresource_index_splits_level_and_layer() {
        let desc = texture(4, 6);
        let layers = subresource_layers(&desc, vk::ImageAspectFlags::COLOR, 9);
        assert_eq!(layers.mip_level, 1);
        assert_eq!(layers.base_array_layer, 2);
        assert_eq!(layers.layer_count, 1);
    }

    #[test]
    fn level_extent_never_reaches_zero() {
        let desc = texture(9, 1);
        assert_eq!(
            level_extent(&desc, 7),
            vk::Extent3D {
                width: 2,
                height: 1,
                depth: 1
            }
        );
    }

    #[test]
    fn boxed_copy_region() {
        let desc = texture(1, 1);
        let region = SubresourceBox {
            left: 8,
            top: 4,
            front: 0,
            right: 24,
            bottom: 12,
            back: 1,
        };
        let copy = buffer_image_copy(&desc, vk::ImageAspectFlags::COLOR, 64, 0, 0, 0, Some(&region));
        assert_eq!(copy.buffer_offset, 64);
        assert_eq!(copy.image_offset, vk::Offset3D { x: 8, y: 4, z: 0 });
        assert_eq!(
            copy.image_extent,
            vk::Extent3D {
                width: 16,
                height: 8,
                depth: 1
            }
        );

        let [start, end] = box_to_offsets(&desc, 0, None);
        assert_eq!(start, vk::Offset3D::default());
        assert_eq!(end, vk::Offset3D { x: 256, y: 64, z: 1 });
    }
}
