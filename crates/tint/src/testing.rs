//! In-memory device, command list and queue used by unit tests.

use core::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use tint_api::{
    AnyHandle, CommandList, CommandQueue, DescriptorSet, DescriptorSetLayout, Device, DeviceApi,
    DeviceCaps, Error, Format, Pipeline, PipelineLayout, QueryPool, Resource, ResourceView, Result,
    Sampler,
    descriptor::{DescriptorRange, DescriptorSetUpdate, PipelineLayoutParam},
    device::{MappedSubresource, QueueType},
    pipeline::{
        PipelineDesc, PipelineStage, QueryType, Rect, RenderPassDepthStencil,
        RenderPassRenderTarget, ShaderStage, Viewport,
    },
    resource::{
        MapAccess, ResourceDesc, ResourceUsage, ResourceViewDesc, SubresourceBox, SubresourceData,
    },
    sampler::SamplerDesc,
};

use crate::map::HandleTable;

/// Device keeping every object in tables, without any GPU behind it.
pub struct NullDevice {
    next: AtomicU64,
    pub resources: HandleTable<ResourceDesc>,
    pub views: HandleTable<Resource>,
    pub samplers: HandleTable<()>,
    pub pipelines: HandleTable<()>,
    pub layouts: HandleTable<()>,
    pub set_layouts: HandleTable<()>,
    pub sets: HandleTable<()>,
    pub query_pools: HandleTable<()>,
    pub wait_idle_calls: AtomicU64,
}

impl Default for NullDevice {
    fn default() -> Self {
        Self {
            next: AtomicU64::new(0x1000),
            resources: HandleTable::new(),
            views: HandleTable::new(),
            samplers: HandleTable::new(),
            pipelines: HandleTable::new(),
            layouts: HandleTable::new(),
            set_layouts: HandleTable::new(),
            sets: HandleTable::new(),
            query_pools: HandleTable::new(),
            wait_idle_calls: AtomicU64::new(0),
        }
    }
}

impl NullDevice {
    fn next_raw(&self) -> u64 {
        self.next.fetch_add(0x10, Ordering::Relaxed)
    }

    fn register<T>(&self, table: &HandleTable<T>, value: T) -> u64 {
        let raw = self.next_raw();
        table.insert(raw, value);
        raw
    }
}

impl Device for NullDevice {
    fn api(&self) -> DeviceApi {
        DeviceApi::Vulkan
    }

    fn check_capability(&self, cap: DeviceCaps) -> bool {
        !matches!(cap, DeviceCaps::SamplerWithResourceView)
    }

    fn check_format_support(&self, format: Format, _usage: ResourceUsage) -> bool {
        format != Format::Unknown
    }

    fn create_sampler(&self, _desc: &SamplerDesc) -> Result<Sampler> {
        Ok(Sampler::from_raw(self.register(&self.samplers, ())))
    }

    fn destroy_sampler(&self, sampler: Sampler) {
        self.samplers.remove(sampler.raw());
    }

    fn create_resource(
        &self,
        desc: &ResourceDesc,
        _initial_data: Option<&[SubresourceData<'_>]>,
        _initial_state: ResourceUsage,
    ) -> Result<Resource> {
        Ok(Resource::from_raw(self.register(&self.resources, *desc)))
    }

    fn destroy_resource(&self, resource: Resource) {
        self.resources.remove(resource.raw());
    }

    fn get_resource_desc(&self, resource: Resource) -> Option<ResourceDesc> {
        self.resources.get_copied(resource.raw())
    }

    fn create_resource_view(
        &self,
        resource: Resource,
        _usage: ResourceUsage,
        _desc: &ResourceViewDesc,
    ) -> Result<ResourceView> {
        if !self.resources.contains(resource.raw()) {
            return Err(Error::InvalidHandle);
        }
        Ok(ResourceView::from_raw(self.register(&self.views, resource)))
    }

    fn destroy_resource_view(&self, view: ResourceView) {
        self.views.remove(view.raw());
    }

    fn get_resource_from_view(&self, view: ResourceView) -> Option<Resource> {
        self.views.get_copied(view.raw())
    }

    fn create_pipeline(&self, _layout: PipelineLayout, _desc: &PipelineDesc<'_>) -> Result<Pipeline> {
        Ok(Pipeline::from_raw(self.register(&self.pipelines, ())))
    }

    fn destroy_pipeline(&self, pipeline: Pipeline) {
        self.pipelines.remove(pipeline.raw());
    }

    fn create_pipeline_layout(&self, _params: &[PipelineLayoutParam]) -> Result<PipelineLayout> {
        Ok(PipelineLayout::from_raw(self.register(&self.layouts, ())))
    }

    fn destroy_pipeline_layout(&self, layout: PipelineLayout) {
        self.layouts.remove(layout.raw());
    }

    fn create_descriptor_set_layout(
        &self,
        _ranges: &[DescriptorRange],
        _push_descriptors: bool,
    ) -> Result<DescriptorSetLayout> {
        Ok(DescriptorSetLayout::from_raw(self.register(&self.set_layouts, ())))
    }

    fn destroy_descriptor_set_layout(&self, layout: DescriptorSetLayout) {
        self.set_layouts.remove(layout.raw());
    }

    fn create_query_pool(&self, _ty: QueryType, _size: u32) -> Result<QueryPool> {
        Ok(QueryPool::from_raw(self.register(&self.query_pools, ())))
    }

    fn destroy_query_pool(&self, pool: QueryPool) {
        self.query_pools.remove(pool.raw());
    }

    fn create_descriptor_sets(
        &self,
        _layout: DescriptorSetLayout,
        count: usize,
    ) -> Result<Vec<DescriptorSet>> {
        Ok((0..count)
            .map(|_| DescriptorSet::from_raw(self.register(&self.sets, ())))
            .collect())
    }

    fn destroy_descriptor_sets(&self, sets: &[DescriptorSet]) {
        for set in sets {
            self.sets.remove(set.raw());
        }
    }

    fn update_descriptor_sets(&self, _updates: &[DescriptorSetUpdate<'_>]) {}

    fn map_resource(
        &self,
        _resource: Resource,
        _subresource: u32,
        _access: MapAccess,
    ) -> Result<MappedSubresource> {
        Err(Error::Unsupported("map_resource"))
    }

    fn unmap_resource(&self, _resource: Resource, _subresource: u32) {}

    fn upload_buffer_region(&self, _data: &[u8], dst: Resource, _dst_offset: u64) -> Result<()> {
        if self.resources.contains(dst.raw()) {
            Ok(())
        } else {
            Err(Error::InvalidHandle)
        }
    }

    fn upload_texture_region(
        &self,
        _data: &SubresourceData<'_>,
        dst: Resource,
        _dst_subresource: u32,
        _dst_box: Option<&SubresourceBox>,
    ) -> Result<()> {
        if self.resources.contains(dst.raw()) {
            Ok(())
        } else {
            Err(Error::InvalidHandle)
        }
    }

    fn get_query_pool_results(&self, _pool: QueryPool, _first: u32, _results: &mut [u64]) -> bool {
        false
    }

    fn set_resource_name(&self, _resource: Resource, _name: &str) {}

    fn wait_idle(&self) {
        self.wait_idle_calls.fetch_add(1, Ordering::Relaxed);
    }

    fn is_valid(&self, handle: AnyHandle) -> bool {
        let raw = handle.raw();
        match handle {
            AnyHandle::Resource(_) => self.resources.contains(raw),
            AnyHandle::ResourceView(_) => self.views.contains(raw),
            AnyHandle::Sampler(_) => self.samplers.contains(raw),
            AnyHandle::Pipeline(_) => self.pipelines.contains(raw),
            AnyHandle::PipelineLayout(_) => self.layouts.contains(raw),
            AnyHandle::DescriptorSetLayout(_) => self.set_layouts.contains(raw),
            AnyHandle::DescriptorSet(_) => self.sets.contains(raw),
            AnyHandle::QueryPool(_) => self.query_pools.contains(raw),
        }
    }
}

/// Command list writing the name of every recorded command into a log.
#[derive(Default)]
pub struct RecordingCommandList {
    pub commands: Mutex<Vec<&'static str>>,
}

impl RecordingCommandList {
    fn record(&self, name: &'static str) {
        self.commands.lock().push(name);
    }

    pub fn take(&self) -> Vec<&'static str> {
        core::mem::take(&mut *self.commands.lock())
    }
}

impl CommandList for RecordingCommandList {
    fn barrier(&self, _resources: &[Resource], _old: &[ResourceUsage], _new: &[ResourceUsage]) {
        self.record("barrier");
    }

    fn begin_render_pass(
        &self,
        _render_targets: &[RenderPassRenderTarget],
        _depth_stencil: Option<&RenderPassDepthStencil>,
    ) {
        self.record("begin_render_pass");
    }

    fn finish_render_pass(&self) {
        self.record("finish_render_pass");
    }

    fn bind_pipeline(&self, _stages: PipelineStage, _pipeline: Pipeline) {
        self.record("bind_pipeline");
    }

    fn bind_viewports(&self, _first: u32, _viewports: &[Viewport]) {
        self.record("bind_viewports");
    }

    fn bind_scissor_rects(&self, _first: u32, _rects: &[Rect]) {
        self.record("bind_scissor_rects");
    }

    fn push_constants(
        &self,
        _stages: ShaderStage,
        _layout: PipelineLayout,
        _param: u32,
        _first: u32,
        _values: &[u32],
    ) {
        self.record("push_constants");
    }

    fn bind_descriptor_sets(
        &self,
        _stages: ShaderStage,
        _layout: PipelineLayout,
        _first: u32,
        _sets: &[DescriptorSet],
    ) {
        self.record("bind_descriptor_sets");
    }

    fn draw(&self, _vertex_count: u32, _instance_count: u32, _first_vertex: u32, _first_instance: u32) {
        self.record("draw");
    }

    fn dispatch(&self, _x: u32, _y: u32, _z: u32) {
        self.record("dispatch");
    }

    fn copy_resource(&self, _src: Resource, _dst: Resource) {
        self.record("copy_resource");
    }

    fn clear_render_target_view(&self, _rtv: ResourceView, _color: &[f32; 4], _rects: &[Rect]) {
        self.record("clear_render_target_view");
    }

    fn generate_mipmaps(&self, _srv: ResourceView) {
        self.record("generate_mipmaps");
    }
}

/// Queue whose immediate command list is a [`RecordingCommandList`].
#[derive(Default)]
pub struct RecordingQueue {
    pub list: RecordingCommandList,
    pub flushes: AtomicU64,
}

impl CommandQueue for RecordingQueue {
    fn queue_type(&self) -> QueueType {
        QueueType::GRAPHICS | QueueType::COMPUTE | QueueType::COPY
    }

    fn immediate_command_list(&self) -> Option<&dyn CommandList> {
        Some(&self.list)
    }

    fn flush_immediate_command_list(&self) {
        self.flushes.fetch_add(1, Ordering::Relaxed);
    }

    fn wait_idle(&self) {}
}
