//! The [`Event`] enum sent to add-ons and the [`Registry`] dispatching it.
//!
//! Hooks build an [`Event`] from the intercepted native call and pass it to [`Registry::dispatch`].
//! Listeners run synchronously on the calling thread, in registration order.
//! For overridable events a listener may return [`Flow::Handled`] to skip the native call.

mod registry;

pub use registry::{AddonId, Listener, Registrar, Registry};

use tint_api::{
    CommandList, CommandQueue, DescriptorSet, Device, Format, Pipeline, PipelineLayout, QueryPool,
    Resource, ResourceView, Sampler,
    descriptor::DescriptorSetUpdate,
    pipeline::{
        IndirectCommand, PipelineDesc, PipelineStage, PipelineState, QueryType, Rect,
        RenderPassDepthStencil, RenderPassRenderTarget, ShaderStage, Viewport,
    },
    resource::{ResourceDesc, ResourceUsage, ResourceViewDesc, SubresourceBox, SubresourceData},
    sampler::{FilterMode, SamplerDesc},
};

/// Version of the event layout. Bumped on every change to [`Event`] or [`EventKind`].
pub const EVENT_ABI_VERSION: u32 = 1;

/// Listener verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Flow {
    /// Let the default action run, possibly with an edited payload.
    #[default]
    Continue,

    /// Skip the default action.
    ///
    /// Only honored for overridable events.
    Handled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum EventKind {
    InitDevice,
    DestroyDevice,
    InitCommandList,
    DestroyCommandList,
    InitCommandQueue,
    DestroyCommandQueue,
    InitSwapchain,
    DestroySwapchain,
    Resize,
    InitEffectRuntime,
    DestroyEffectRuntime,
    CreateSampler,
    InitSampler,
    DestroySampler,
    CreateResource,
    InitResource,
    DestroyResource,
    CreateResourceView,
    InitResourceView,
    DestroyResourceView,
    CreatePipeline,
    InitPipeline,
    DestroyPipeline,
    UploadBufferRegion,
    UploadTextureRegion,
    BarrierHint,
    BeginRenderPass,
    FinishRenderPass,
    BindPipeline,
    BindPipelineStates,
    BindViewports,
    BindScissorRects,
    PushConstants,
    PushDescriptors,
    BindDescriptorSets,
    BindIndexBuffer,
    BindVertexBuffers,
    Draw,
    DrawIndexed,
    Dispatch,
    DrawOrDispatchIndirect,
    CopyResource,
    CopyBufferRegion,
    CopyBufferToTexture,
    CopyTextureRegion,
    CopyTextureToBuffer,
    ResolveTextureRegion,
    ClearDepthStencilView,
    ClearRenderTargetView,
    ClearUnorderedAccessViewUint,
    ClearUnorderedAccessViewFloat,
    GenerateMipmaps,
    BeginQuery,
    EndQuery,
    ResetCommandList,
    ExecuteCommandList,
    ExecuteSecondaryCommandList,
    Present,
    BeginEffects,
    FinishEffects,
}

impl EventKind {
    pub const COUNT: usize = Self::FinishEffects as usize + 1;

    /// `true` if a listener returning [`Flow::Handled`] skips the default action.
    pub const fn is_overridable(self) -> bool {
        matches!(
            self,
            Self::CreateSampler
                | Self::CreateResource
                | Self::CreateResourceView
                | Self::CreatePipeline
                | Self::UploadBufferRegion
                | Self::UploadTextureRegion
                | Self::Draw
                | Self::DrawIndexed
                | Self::Dispatch
                | Self::DrawOrDispatchIndirect
                | Self::CopyResource
                | Self::CopyBufferRegion
                | Self::CopyBufferToTexture
                | Self::CopyTextureRegion
                | Self::CopyTextureToBuffer
                | Self::ResolveTextureRegion
                | Self::ClearDepthStencilView
                | Self::ClearRenderTargetView
                | Self::ClearUnorderedAccessViewUint
                | Self::ClearUnorderedAccessViewFloat
                | Self::GenerateMipmaps
                | Self::BeginQuery
                | Self::EndQuery
        )
    }
}

/// Describe an event sent to add-ons.
///
/// Swapchains and effect runtimes are identified by their raw native handle.
pub enum Event<'a> {
    /// A device is ready to be used. Fired after its tables are set up.
    InitDevice { device: &'a dyn Device },

    /// A device is about to be destroyed.
    DestroyDevice { device: &'a dyn Device },

    InitCommandList { cmd_list: &'a dyn CommandList },
    DestroyCommandList { cmd_list: &'a dyn CommandList },

    InitCommandQueue { queue: &'a dyn CommandQueue },
    DestroyCommandQueue { queue: &'a dyn CommandQueue },

    InitSwapchain { device: &'a dyn Device, swapchain: u64 },
    DestroySwapchain { device: &'a dyn Device, swapchain: u64 },

    /// Swapchain buffers are resized or recreated.
    Resize {
        swapchain: u64,
        width: u32,
        height: u32,
    },

    InitEffectRuntime { device: &'a dyn Device, runtime: u64 },
    DestroyEffectRuntime { device: &'a dyn Device, runtime: u64 },

    /// A sampler is about to be created.
    ///
    /// Listeners may edit `desc`, or store a substitute sampler and return [`Flow::Handled`].
    /// Handled without a substitute makes the creation fail.
    CreateSampler {
        device: &'a dyn Device,
        desc: SamplerDesc,
        substitute: Option<Sampler>,
    },
    InitSampler {
        device: &'a dyn Device,
        desc: SamplerDesc,
        sampler: Sampler,
    },
    DestroySampler { device: &'a dyn Device, sampler: Sampler },

    /// A resource is about to be created. Same override rules as [`Event::CreateSampler`].
    CreateResource {
        device: &'a dyn Device,
        desc: ResourceDesc,
        initial_state: ResourceUsage,
        substitute: Option<Resource>,
    },
    InitResource {
        device: &'a dyn Device,
        desc: ResourceDesc,
        initial_state: ResourceUsage,
        resource: Resource,
    },
    DestroyResource {
        device: &'a dyn Device,
        resource: Resource,
    },

    /// A resource view is about to be created. Same override rules as [`Event::CreateSampler`].
    CreateResourceView {
        device: &'a dyn Device,
        resource: Resource,
        usage: ResourceUsage,
        desc: ResourceViewDesc,
        substitute: Option<ResourceView>,
    },
    InitResourceView {
        device: &'a dyn Device,
        resource: Resource,
        usage: ResourceUsage,
        desc: ResourceViewDesc,
        view: ResourceView,
    },
    DestroyResourceView {
        device: &'a dyn Device,
        view: ResourceView,
    },

    /// A pipeline is about to be created. Same override rules as [`Event::CreateSampler`].
    CreatePipeline {
        device: &'a dyn Device,
        layout: PipelineLayout,
        desc: PipelineDesc<'a>,
        substitute: Option<Pipeline>,
    },
    InitPipeline {
        device: &'a dyn Device,
        layout: PipelineLayout,
        desc: &'a PipelineDesc<'a>,
        pipeline: Pipeline,
    },
    DestroyPipeline {
        device: &'a dyn Device,
        pipeline: Pipeline,
    },

    UploadBufferRegion {
        device: &'a dyn Device,
        data: &'a [u8],
        dst: Resource,
        dst_offset: u64,
    },
    UploadTextureRegion {
        device: &'a dyn Device,
        data: SubresourceData<'a>,
        dst: Resource,
        dst_subresource: u32,
        dst_box: Option<SubresourceBox>,
    },

    /// Resources are transitioned by the application.
    BarrierHint {
        cmd_list: &'a dyn CommandList,
        resources: &'a [Resource],
        old_states: &'a [ResourceUsage],
        new_states: &'a [ResourceUsage],
    },

    BeginRenderPass {
        cmd_list: &'a dyn CommandList,
        render_targets: &'a [RenderPassRenderTarget],
        depth_stencil: Option<RenderPassDepthStencil>,
    },
    FinishRenderPass { cmd_list: &'a dyn CommandList },

    BindPipeline {
        cmd_list: &'a dyn CommandList,
        stages: PipelineStage,
        pipeline: Pipeline,
    },
    BindPipelineStates {
        cmd_list: &'a dyn CommandList,
        states: &'a [PipelineState],
        values: &'a [u32],
    },
    BindViewports {
        cmd_list: &'a dyn CommandList,
        first: u32,
        viewports: &'a [Viewport],
    },
    BindScissorRects {
        cmd_list: &'a dyn CommandList,
        first: u32,
        rects: &'a [Rect],
    },
    PushConstants {
        cmd_list: &'a dyn CommandList,
        stages: ShaderStage,
        layout: PipelineLayout,
        param: u32,
        first: u32,
        values: &'a [u32],
    },
    PushDescriptors {
        cmd_list: &'a dyn CommandList,
        stages: ShaderStage,
        layout: PipelineLayout,
        param: u32,
        update: DescriptorSetUpdate<'a>,
    },
    BindDescriptorSets {
        cmd_list: &'a dyn CommandList,
        stages: ShaderStage,
        layout: PipelineLayout,
        first: u32,
        sets: &'a [DescriptorSet],
    },
    BindIndexBuffer {
        cmd_list: &'a dyn CommandList,
        buffer: Resource,
        offset: u64,
        /// Bytes per index, `0` when unbinding.
        index_size: u32,
    },
    BindVertexBuffers {
        cmd_list: &'a dyn CommandList,
        first: u32,
        buffers: &'a [Resource],
        offsets: &'a [u64],
        strides: &'a [u32],
    },

    Draw {
        cmd_list: &'a dyn CommandList,
        vertex_count: u32,
        instance_count: u32,
        first_vertex: u32,
        first_instance: u32,
    },
    DrawIndexed {
        cmd_list: &'a dyn CommandList,
        index_count: u32,
        instance_count: u32,
        first_index: u32,
        vertex_offset: i32,
        first_instance: u32,
    },
    Dispatch {
        cmd_list: &'a dyn CommandList,
        x: u32,
        y: u32,
        z: u32,
    },
    DrawOrDispatchIndirect {
        cmd_list: &'a dyn CommandList,
        ty: IndirectCommand,
        buffer: Resource,
        offset: u64,
        draw_count: u32,
        stride: u32,
    },

    CopyResource {
        cmd_list: &'a dyn CommandList,
        src: Resource,
        dst: Resource,
    },
    CopyBufferRegion {
        cmd_list: &'a dyn CommandList,
        src: Resource,
        src_offset: u64,
        dst: Resource,
        dst_offset: u64,
        size: u64,
    },
    CopyBufferToTexture {
        cmd_list: &'a dyn CommandList,
        src: Resource,
        src_offset: u64,
        row_length: u32,
        slice_height: u32,
        dst: Resource,
        dst_subresource: u32,
        dst_box: Option<SubresourceBox>,
    },
    CopyTextureRegion {
        cmd_list: &'a dyn CommandList,
        src: Resource,
        src_subresource: u32,
        src_box: Option<SubresourceBox>,
        dst: Resource,
        dst_subresource: u32,
        dst_box: Option<SubresourceBox>,
        filter: FilterMode,
    },
    CopyTextureToBuffer {
        cmd_list: &'a dyn CommandList,
        src: Resource,
        src_subresource: u32,
        src_box: Option<SubresourceBox>,
        dst: Resource,
        dst_offset: u64,
        row_length: u32,
        slice_height: u32,
    },
    ResolveTextureRegion {
        cmd_list: &'a dyn CommandList,
        src: Resource,
        src_subresource: u32,
        src_box: Option<SubresourceBox>,
        dst: Resource,
        dst_subresource: u32,
        dst_offset: [i32; 3],
        format: Format,
    },

    ClearDepthStencilView {
        cmd_list: &'a dyn CommandList,
        dsv: ResourceView,
        depth: Option<f32>,
        stencil: Option<u8>,
        rects: &'a [Rect],
    },
    /// One render target view of a possibly batched clear.
    ClearRenderTargetView {
        cmd_list: &'a dyn CommandList,
        rtv: ResourceView,
        color: [f32; 4],
        rects: &'a [Rect],
    },
    ClearUnorderedAccessViewUint {
        cmd_list: &'a dyn CommandList,
        uav: ResourceView,
        values: [u32; 4],
        rects: &'a [Rect],
    },
    ClearUnorderedAccessViewFloat {
        cmd_list: &'a dyn CommandList,
        uav: ResourceView,
        values: [f32; 4],
        rects: &'a [Rect],
    },
    GenerateMipmaps {
        cmd_list: &'a dyn CommandList,
        srv: ResourceView,
    },

    BeginQuery {
        cmd_list: &'a dyn CommandList,
        pool: QueryPool,
        ty: QueryType,
        index: u32,
    },
    EndQuery {
        cmd_list: &'a dyn CommandList,
        pool: QueryPool,
        ty: QueryType,
        index: u32,
    },

    /// Recording into a command list starts over.
    ResetCommandList { cmd_list: &'a dyn CommandList },

    /// A command list is submitted to a queue.
    ExecuteCommandList {
        queue: &'a dyn CommandQueue,
        cmd_list: &'a dyn CommandList,
    },
    ExecuteSecondaryCommandList {
        cmd_list: &'a dyn CommandList,
        secondary: &'a dyn CommandList,
    },

    /// A swapchain is about to present. Fired before the effect runtime renders.
    Present {
        queue: &'a dyn CommandQueue,
        swapchain: u64,
        source_rect: Option<Rect>,
        dest_rect: Option<Rect>,
    },

    BeginEffects {
        runtime: u64,
        cmd_list: &'a dyn CommandList,
        rtv: ResourceView,
        rtv_srgb: ResourceView,
    },
    FinishEffects {
        runtime: u64,
        cmd_list: &'a dyn CommandList,
        rtv: ResourceView,
        rtv_srgb: ResourceView,
    },
}

impl core::fmt::Debug for Event<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_tuple("Event").field(&self.kind()).finish()
    }
}

impl Event<'_> {
    pub const fn kind(&self) -> EventKind {
        match self {
            Self::InitDevice { .. } => EventKind::InitDevice,
            Self::DestroyDevice { .. } => EventKind::DestroyDevice,
            Self::InitCommandList { .. } => EventKind::InitCommandList,
            Self::DestroyCommandList { .. } => EventKind::DestroyCommandList,
            Self::InitCommandQueue { .. } => EventKind::InitCommandQueue,
            Self::DestroyCommandQueue { .. } => EventKind::DestroyCommandQueue,
            Self::InitSwapchain { .. } => EventKind::InitSwapchain,
            Self::DestroySwapchain { .. } => EventKind::DestroySwapchain,
            Self::Resize { .. } => EventKind::Resize,
            Self::InitEffectRuntime { .. } => EventKind::InitEffectRuntime,
            Self::DestroyEffectRuntime { .. } => EventKind::DestroyEffectRuntime,
            Self::CreateSampler { .. } => EventKind::CreateSampler,
            Self::InitSampler { .. } => EventKind::InitSampler,
            Self::DestroySampler { .. } => EventKind::DestroySampler,
            Self::CreateResource { .. } => EventKind::CreateResource,
            Self::InitResource { .. } => EventKind::InitResource,
            Self::DestroyResource { .. } => EventKind::DestroyResource,
            Self::CreateResourceView { .. } => EventKind::CreateResourceView,
            Self::InitResourceView { .. } => EventKind::InitResourceView,
            Self::DestroyResourceView { .. } => EventKind::DestroyResourceView,
            Self::CreatePipeline { .. } => EventKind::CreatePipeline,
            Self::InitPipeline { .. } => EventKind::InitPipeline,
            Self::DestroyPipeline { .. } => EventKind::DestroyPipeline,
            Self::UploadBufferRegion { .. } => EventKind::UploadBufferRegion,
            Self::UploadTextureRegion { .. } => EventKind::UploadTextureRegion,
            Self::BarrierHint { .. } => EventKind::BarrierHint,
            Self::BeginRenderPass { .. } => EventKind::BeginRenderPass,
            Self::FinishRenderPass { .. } => EventKind::FinishRenderPass,
            Self::BindPipeline { .. } => EventKind::BindPipeline,
            Self::BindPipelineStates { .. } => EventKind::BindPipelineStates,
            Self::BindViewports { .. } => EventKind::BindViewports,
            Self::BindScissorRects { .. } => EventKind::BindScissorRects,
            Self::PushConstants { .. } => EventKind::PushConstants,
            Self::PushDescriptors { .. } => EventKind::PushDescriptors,
            Self::BindDescriptorSets { .. } => EventKind::BindDescriptorSets,
            Self::BindIndexBuffer { .. } => EventKind::BindIndexBuffer,
            Self::BindVertexBuffers { .. } => EventKind::BindVertexBuffers,
            Self::Draw { .. } => EventKind::Draw,
            Self::DrawIndexed { .. } => EventKind::DrawIndexed,
            Self::Dispatch { .. } => EventKind::Dispatch,
            Self::DrawOrDispatchIndirect { .. } => EventKind::DrawOrDispatchIndirect,
            Self::CopyResource { .. } => EventKind::CopyResource,
            Self::CopyBufferRegion { .. } => EventKind::CopyBufferRegion,
            Self::CopyBufferToTexture { .. } => EventKind::CopyBufferToTexture,
            Self::CopyTextureRegion { .. } => EventKind::CopyTextureRegion,
            Self::CopyTextureToBuffer { .. } => EventKind::CopyTextureToBuffer,
            Self::ResolveTextureRegion { .. } => EventKind::ResolveTextureRegion,
            Self::ClearDepthStencilView { .. } => EventKind::ClearDepthStencilView,
            Self::ClearRenderTargetView { .. } => EventKind::ClearRenderTargetView,
            Self::ClearUnorderedAccessViewUint { .. } => EventKind::ClearUnorderedAccessViewUint,
            Self::ClearUnorderedAccessViewFloat { .. } => EventKind::ClearUnorderedAccessViewFloat,
            Self::GenerateMipmaps { .. } => EventKind::GenerateMipmaps,
            Self::BeginQuery { .. } => EventKind::BeginQuery,
            Self::EndQuery { .. } => EventKind::EndQuery,
            Self::ResetCommandList { .. } => EventKind::ResetCommandList,
            Self::ExecuteCommandList { .. } => EventKind::ExecuteCommandList,
            Self::ExecuteSecondaryCommandList { .. } => EventKind::ExecuteSecondaryCommandList,
            Self::Present { .. } => EventKind::Present,
            Self::BeginEffects { .. } => EventKind::BeginEffects,
            Self::FinishEffects { .. } => EventKind::FinishEffects,
        }
    }
}
