//! Device, command list and command queue interfaces implemented by every backend.

use bitflags::bitflags;

use crate::{
    AnyHandle, DescriptorSet, DescriptorSetLayout, DeviceCaps, Format, Pipeline, PipelineLayout,
    QueryPool, Resource, ResourceView, Result, Sampler,
    descriptor::{DescriptorRange, DescriptorSetUpdate, PipelineLayoutParam},
    pipeline::{
        IndirectCommand, PipelineDesc, PipelineStage, PipelineState, QueryType, Rect,
        RenderPassDepthStencil, RenderPassRenderTarget, ShaderStage, Viewport,
    },
    resource::{
        MapAccess, ResourceDesc, ResourceUsage, ResourceViewDesc, SubresourceBox, SubresourceData,
    },
    sampler::{FilterMode, SamplerDesc},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum DeviceApi {
    D3D9 = 0x9000,
    D3D10 = 0xa000,
    D3D11 = 0xb000,
    Vulkan = 0x20000,
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct QueueType: u32 {
        const GRAPHICS = 0x1;
        const COMPUTE = 0x2;
        const COPY = 0x4;
    }
}

/// CPU pointer to a mapped subresource.
#[derive(Debug, Clone, Copy)]
pub struct MappedSubresource {
    pub data: *mut u8,
    pub row_pitch: u32,
    pub slice_pitch: u32,
}

pub trait Device: Send + Sync {
    fn api(&self) -> DeviceApi;

    fn check_capability(&self, cap: DeviceCaps) -> bool;
    fn check_format_support(&self, format: Format, usage: ResourceUsage) -> bool;

    fn create_sampler(&self, desc: &SamplerDesc) -> Result<Sampler>;
    fn destroy_sampler(&self, sampler: Sampler);

    fn create_resource(
        &self,
        desc: &ResourceDesc,
        initial_data: Option<&[SubresourceData<'_>]>,
        initial_state: ResourceUsage,
    ) -> Result<Resource>;
    fn destroy_resource(&self, resource: Resource);
    fn get_resource_desc(&self, resource: Resource) -> Option<ResourceDesc>;

    fn create_resource_view(
        &self,
        resource: Resource,
        usage: ResourceUsage,
        desc: &ResourceViewDesc,
    ) -> Result<ResourceView>;
    fn destroy_resource_view(&self, view: ResourceView);
    fn get_resource_from_view(&self, view: ResourceView) -> Option<Resource>;

    fn create_pipeline(&self, layout: PipelineLayout, desc: &PipelineDesc<'_>)
    -> Result<Pipeline>;
    fn destroy_pipeline(&self, pipeline: Pipeline);

    fn create_pipeline_layout(&self, params: &[PipelineLayoutParam]) -> Result<PipelineLayout>;
    fn destroy_pipeline_layout(&self, layout: PipelineLayout);

    fn create_descriptor_set_layout(
        &self,
        ranges: &[DescriptorRange],
        push_descriptors: bool,
    ) -> Result<DescriptorSetLayout>;
    fn destroy_descriptor_set_layout(&self, layout: DescriptorSetLayout);

    fn create_query_pool(&self, ty: QueryType, size: u32) -> Result<QueryPool>;
    fn destroy_query_pool(&self, pool: QueryPool);

    fn create_descriptor_sets(
        &self,
        layout: DescriptorSetLayout,
        count: usize,
    ) -> Result<Vec<DescriptorSet>>;
    fn destroy_descriptor_sets(&self, sets: &[DescriptorSet]);
    fn update_descriptor_sets(&self, updates: &[DescriptorSetUpdate<'_>]);

    fn map_resource(
        &self,
        resource: Resource,
        subresource: u32,
        access: MapAccess,
    ) -> Result<MappedSubresource>;
    fn unmap_resource(&self, resource: Resource, subresource: u32);

    fn upload_buffer_region(&self, data: &[u8], dst: Resource, dst_offset: u64) -> Result<()>;
    fn upload_texture_region(
        &self,
        data: &SubresourceData<'_>,
        dst: Resource,
        dst_subresource: u32,
        dst_box: Option<&SubresourceBox>,
    ) -> Result<()>;

    /// Reads back query results without stalling.
    ///
    /// Returns `false` if the results are not available yet.
    fn get_query_pool_results(&self, pool: QueryPool, first: u32, results: &mut [u64]) -> bool;

    fn set_resource_name(&self, resource: Resource, name: &str);

    /// Blocks until the GPU finished all submitted work.
    fn wait_idle(&self);

    /// `true` between the creation and destruction of the object behind `handle`.
    fn is_valid(&self, handle: AnyHandle) -> bool;
}

macro_rules! unsupported {
    ($name:literal) => {
        tracing::debug!(concat!($name, " is not supported by this backend"))
    };
}

/// Command recording context.
///
/// Operations a backend can't express are logged and ignored.
#[allow(unused_variables)]
pub trait CommandList: Send + Sync {
    fn barrier(&self, resources: &[Resource], old_states: &[ResourceUsage], new_states: &[ResourceUsage]) {
        unsupported!("barrier");
    }

    fn begin_render_pass(
        &self,
        render_targets: &[RenderPassRenderTarget],
        depth_stencil: Option<&RenderPassDepthStencil>,
    ) {
        unsupported!("begin_render_pass");
    }

    fn finish_render_pass(&self) {
        unsupported!("finish_render_pass");
    }

    fn bind_pipeline(&self, stages: PipelineStage, pipeline: Pipeline) {
        unsupported!("bind_pipeline");
    }

    fn bind_pipeline_states(&self, states: &[PipelineState], values: &[u32]) {
        unsupported!("bind_pipeline_states");
    }

    fn bind_viewports(&self, first: u32, viewports: &[Viewport]) {
        unsupported!("bind_viewports");
    }

    fn bind_scissor_rects(&self, first: u32, rects: &[Rect]) {
        unsupported!("bind_scissor_rects");
    }

    fn push_constants(
        &self,
        stages: ShaderStage,
        layout: PipelineLayout,
        param: u32,
        first: u32,
        values: &[u32],
    ) {
        unsupported!("push_constants");
    }

    fn push_descriptors(
        &self,
        stages: ShaderStage,
        layout: PipelineLayout,
        param: u32,
        update: &DescriptorSetUpdate<'_>,
    ) {
        unsupported!("push_descriptors");
    }

    fn bind_descriptor_sets(
        &self,
        stages: ShaderStage,
        layout: PipelineLayout,
        first: u32,
        sets: &[DescriptorSet],
    ) {
        unsupported!("bind_descriptor_sets");
    }

    fn bind_index_buffer(&self, buffer: Resource, offset: u64, index_size: u32) {
        unsupported!("bind_index_buffer");
    }

    fn bind_vertex_buffers(&self, first: u32, buffers: &[Resource], offsets: &[u64], strides: &[u32]) {
        unsupported!("bind_vertex_buffers");
    }

    fn draw(&self, vertex_count: u32, instance_count: u32, first_vertex: u32, first_instance: u32) {
        unsupported!("draw");
    }

    fn draw_indexed(
        &self,
        index_count: u32,
        instance_count: u32,
        first_index: u32,
        vertex_offset: i32,
        first_instance: u32,
    ) {
        unsupported!("draw_indexed");
    }

    fn dispatch(&self, x: u32, y: u32, z: u32) {
        unsupported!("dispatch");
    }

    fn draw_or_dispatch_indirect(
        &self,
        ty: IndirectCommand,
        buffer: Resource,
        offset: u64,
        draw_count: u32,
        stride: u32,
    ) {
        unsupported!("draw_or_dispatch_indirect");
    }

    fn copy_resource(&self, src: Resource, dst: Resource) {
        unsupported!("copy_resource");
    }

    fn copy_buffer_region(&self, src: Resource, src_offset: u64, dst: Resource, dst_offset: u64, size: u64) {
        unsupported!("copy_buffer_region");
    }

    #[allow(clippy::too_many_arguments)]
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
        unsupported!("copy_buffer_to_texture");
    }

    #[allow(clippy::too_many_arguments)]
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
        unsupported!("copy_texture_region");
    }

    #[allow(clippy::too_many_arguments)]
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
        unsupported!("copy_texture_to_buffer");
    }

    #[allow(clippy::too_many_arguments)]
    fn resolve_texture_region(
        &self,
        src: Resource,
        src_subresource: u32,
        src_box: Option<&SubresourceBox>,
        dst: Resource,
        dst_subresource: u32,
        dst_offset: [i32; 3],
        format: Format,
    ) {
        unsupported!("resolve_texture_region");
    }

    fn clear_depth_stencil_view(
        &self,
        dsv: ResourceView,
        depth: Option<f32>,
        stencil: Option<u8>,
        rects: &[Rect],
    ) {
        unsupported!("clear_depth_stencil_view");
    }

    fn clear_render_target_view(&self, rtv: ResourceView, color: &[f32; 4], rects: &[Rect]) {
        unsupported!("clear_render_target_view");
    }

    fn clear_unordered_access_view_uint(&self, uav: ResourceView, values: &[u32; 4], rects: &[Rect]) {
        unsupported!("clear_unordered_access_view_uint");
    }

    fn clear_unordered_access_view_float(&self, uav: ResourceView, values: &[f32; 4], rects: &[Rect]) {
        unsupported!("clear_unordered_access_view_float");
    }

    fn generate_mipmaps(&self, srv: ResourceView) {
        unsupported!("generate_mipmaps");
    }

    fn begin_query(&self, pool: QueryPool, ty: QueryType, index: u32) {
        unsupported!("begin_query");
    }

    fn end_query(&self, pool: QueryPool, ty: QueryType, index: u32) {
        unsupported!("end_query");
    }

    #[allow(clippy::too_many_arguments)]
    fn copy_query_pool_results(
        &self,
        pool: QueryPool,
        ty: QueryType,
        first: u32,
        count: u32,
        dst: Resource,
        dst_offset: u64,
        stride: u32,
    ) {
        unsupported!("copy_query_pool_results");
    }

    fn begin_debug_event(&self, label: &str, color: [f32; 4]) {}

    fn end_debug_event(&self) {}

    fn insert_debug_marker(&self, label: &str, color: [f32; 4]) {}
}

pub trait CommandQueue: Send + Sync {
    fn queue_type(&self) -> QueueType;

    /// Queue owned list for work tint issues on its own, `None` if the queue can't record.
    fn immediate_command_list(&self) -> Option<&dyn CommandList>;

    /// Submits everything recorded on the immediate command list.
    fn flush_immediate_command_list(&self);

    fn wait_idle(&self);
}
