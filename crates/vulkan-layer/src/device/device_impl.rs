//! [`Device`] implementation over a managed `VkDevice`.
//!
//! Every call goes straight to the next layer, so objects created here never show up in
//! the layer's own hooks and never fire events.

use core::{
    ffi::{CStr, c_void},
    mem, ptr,
};
use std::{
    collections::HashMap,
    ffi::CString,
    io::Cursor,
    sync::{Arc, Weak},
};

use ash::{
    khr,
    vk::{self, Handle},
};
use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use scopeguard::ScopeGuard;
use tint::map::HandleTable;
use tint_api::{
    AnyHandle, CommandList, DescriptorSet, DescriptorSetLayout, Device, DeviceApi, DeviceCaps,
    Error, Format,
    Pipeline, PipelineLayout, QueryPool, Resource, ResourceView, Result, Sampler,
    descriptor::{DescriptorRange, DescriptorSetUpdate, Descriptors, PipelineLayoutParam},
    device::MappedSubresource,
    pipeline::{GraphicsDesc, PipelineDesc, PrimitiveTopology, QueryType, ShaderDesc},
    resource::{
        MapAccess, MemoryHeap, ResourceDesc, ResourceDimension, ResourceUsage, ResourceViewDesc,
        ResourceViewType, SubresourceBox, SubresourceData, check_view_compatible,
    },
    sampler::SamplerDesc,
};
use tracing::{debug, error};

use super::{
    CommandListImpl, CommandQueueImpl, DevicePlan, OptionalFns,
    command_list::{buffer_image_copy, subresource_layers},
    render_pass::{FramebufferData, RenderPassData, RenderPassKey},
};
use crate::{conv, instance::PhysicalDeviceData};

/// Transient descriptor pools, one per frame in flight.
const TRANSIENT_POOL_COUNT: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum NativeResource {
    Buffer(vk::Buffer),
    Image { image: vk::Image, format: vk::Format },
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct ResourceData {
    pub desc: ResourceDesc,
    pub native: NativeResource,
    /// Memory the layer allocated for the resource, null otherwise.
    pub memory: vk::DeviceMemory,
    /// Created through [`Device::create_resource`].
    pub owned: bool,
}

impl ResourceData {
    pub fn aspect(&self) -> vk::ImageAspectFlags {
        match self.native {
            NativeResource::Buffer(_) => vk::ImageAspectFlags::empty(),
            NativeResource::Image { format, .. } => conv::aspect_mask(format),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub(crate) enum NativeView {
    Image {
        view: vk::ImageView,
        image: vk::Image,
        format: vk::Format,
        range: vk::ImageSubresourceRange,
    },
    Buffer(vk::BufferView),
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct ViewData {
    pub resource: Resource,
    pub desc: ResourceViewDesc,
    pub native: NativeView,
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct PipelineData {
    pub bind_point: vk::PipelineBindPoint,
    pub owned: bool,
}

/// Where a pipeline layout parameter lives in the Vulkan layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ParamBinding {
    /// Push constant block at a byte offset.
    Constants {
        stages: vk::ShaderStageFlags,
        offset: u32,
    },
    /// Descriptor set index.
    Set(u32),
}

#[derive(Debug, Clone)]
pub(crate) struct PipelineLayoutData {
    pub params: Vec<ParamBinding>,
    /// Set layouts created for the layout, destroyed with it.
    pub set_layouts: Vec<vk::DescriptorSetLayout>,
}

#[derive(Debug, Clone)]
pub(crate) struct SetLayoutData {
    pub ranges: Vec<DescriptorRange>,
    pub push: bool,
}

/// Descriptor payload of one write.
pub(crate) enum WriteInfo {
    Images(Vec<vk::DescriptorImageInfo>),
    Buffers(Vec<vk::DescriptorBufferInfo>),
    TexelBuffers(Vec<vk::BufferView>),
}

impl WriteInfo {
    pub fn apply<'a>(&'a self, write: vk::WriteDescriptorSet<'a>) -> vk::WriteDescriptorSet<'a> {
        match self {
            Self::Images(infos) => write.image_info(infos),
            Self::Buffers(infos) => write.buffer_info(infos),
            Self::TexelBuffers(views) => write.texel_buffer_view(views),
        }
    }
}

#[derive(Default)]
struct TransientPools {
    pools: [vk::DescriptorPool; TRANSIENT_POOL_COUNT],
    current: usize,
}

type FramebufferKey = (vk::RenderPass, Vec<vk::ImageView>);

struct Staging {
    buffer: vk::Buffer,
    memory: vk::DeviceMemory,
}

pub struct DeviceImpl {
    pub handle: vk::Device,
    pub physical_device: vk::PhysicalDevice,

    /// Next layer's `vkGetDeviceProcAddr`.
    pub(crate) get_proc_addr: vk::PFN_vkGetDeviceProcAddr,
    /// Next layer's device functions.
    pub(crate) fp: ash::Device,
    pub(crate) swapchain_fn: khr::swapchain::DeviceFn,
    pub(crate) optional: OptionalFns,
    instance: ash::Instance,

    pub(crate) graphics_family: u32,
    pub(crate) features: vk::PhysicalDeviceFeatures,
    memory_properties: vk::PhysicalDeviceMemoryProperties,
    push_descriptor: bool,

    pub(crate) resources: HandleTable<ResourceData>,
    pub(crate) views: HandleTable<ViewData>,
    pub(crate) samplers: HandleTable<SamplerDesc>,
    /// SPIR-V of live shader modules.
    pub(crate) shader_modules: HandleTable<Arc<[u8]>>,
    pub(crate) pipelines: HandleTable<PipelineData>,
    pub(crate) pipeline_layouts: HandleTable<PipelineLayoutData>,
    pub(crate) set_layouts: HandleTable<SetLayoutData>,
    pub(crate) descriptor_sets: HandleTable<vk::DescriptorSetLayout>,
    pub(crate) query_pools: HandleTable<QueryType>,
    pub(crate) render_passes: HandleTable<RenderPassData>,
    pub(crate) framebuffers: HandleTable<FramebufferData>,
    default_views: HandleTable<ResourceView>,

    render_pass_cache: Mutex<HashMap<RenderPassKey, vk::RenderPass>>,
    framebuffer_cache: Mutex<HashMap<FramebufferKey, vk::Framebuffer>>,
    descriptor_pool: Mutex<vk::DescriptorPool>,
    transient_pools: Mutex<TransientPools>,
    graphics_queue: OnceCell<Weak<CommandQueueImpl>>,
}

impl DeviceImpl {
    pub(crate) fn new(
        handle: vk::Device,
        physical_device: vk::PhysicalDevice,
        get_proc_addr: vk::PFN_vkGetDeviceProcAddr,
        physical: &PhysicalDeviceData,
        plan: &DevicePlan,
    ) -> Self {
        let loader = move |name: &CStr| unsafe {
            mem::transmute::<vk::PFN_vkVoidFunction, *const c_void>(get_proc_addr(
                handle,
                name.as_ptr(),
            ))
        };

        Self {
            handle,
            physical_device,
            get_proc_addr,
            fp: unsafe { ash::Device::load_with(loader, handle) },
            swapchain_fn: khr::swapchain::DeviceFn::load(loader),
            optional: OptionalFns::load(get_proc_addr, handle, plan.push_descriptor),
            instance: physical.instance.clone(),

            graphics_family: plan.graphics_family,
            features: plan.features,
            memory_properties: physical.memory_properties,
            push_descriptor: plan.push_descriptor,

            resources: HandleTable::new(),
            views: HandleTable::new(),
            samplers: HandleTable::new(),
            shader_modules: HandleTable::new(),
            pipelines: HandleTable::new(),
            pipeline_layouts: HandleTable::new(),
            set_layouts: HandleTable::new(),
            descriptor_sets: HandleTable::new(),
            query_pools: HandleTable::new(),
            render_passes: HandleTable::new(),
            framebuffers: HandleTable::new(),
            default_views: HandleTable::new(),

            render_pass_cache: Mutex::new(HashMap::new()),
            framebuffer_cache: Mutex::new(HashMap::new()),
            descriptor_pool: Mutex::new(vk::DescriptorPool::null()),
            transient_pools: Mutex::new(TransientPools::default()),
            graphics_queue: OnceCell::new(),
        }
    }

    pub(crate) fn set_graphics_queue(&self, queue: &Arc<CommandQueueImpl>) {
        _ = self.graphics_queue.set(Arc::downgrade(queue));
    }

    pub(crate) fn graphics_queue(&self) -> Option<Arc<CommandQueueImpl>> {
        self.graphics_queue.get()?.upgrade()
    }

    /// Records on the graphics queue's immediate command list and waits for the result.
    fn submit_immediate<R>(&self, f: impl FnOnce(&CommandListImpl) -> R) -> Result<R> {
        let Some(queue) = self.graphics_queue() else {
            return Err(Error::Unsupported("device has no graphics queue"));
        };

        queue.submit_immediate(f)
    }

    /// Whole resource view used to report application clears, created on first use.
    pub(crate) fn default_view(&self, resource: Resource, usage: ResourceUsage) -> Option<ResourceView> {
        if let Some(view) = self.default_views.get_copied(resource.raw()) {
            return Some(view);
        }

        let desc = self.get_resource_desc(resource)?;
        let view = match self.create_resource_view(resource, usage, &ResourceViewDesc::whole(&desc)) {
            Ok(view) => view,
            Err(err) => {
                debug!("cannot create default view of {resource:?}. err: {err}");
                return None;
            }
        };
        self.default_views.insert(resource.raw(), view);
        Some(view)
    }

    pub(crate) fn release_default_view(&self, resource: Resource) {
        if let Some(view) = self.default_views.remove(resource.raw()) {
            self.destroy_resource_view(view);
        }
    }

    pub(crate) fn param_binding(&self, layout: PipelineLayout, param: u32) -> Option<ParamBinding> {
        self.pipeline_layouts
            .with(layout.raw(), |data| data.params.get(param as usize).copied())?
    }

    pub(crate) fn render_pass(&self, key: RenderPassKey) -> Result<vk::RenderPass> {
        let mut cache = self.render_pass_cache.lock();
        if let Some(&render_pass) = cache.get(&key) {
            return Ok(render_pass);
        }

        let render_pass = key.create(&self.fp).map_err(conv::map_error)?;
        cache.insert(key, render_pass);
        Ok(render_pass)
    }

    pub(crate) fn framebuffer(
        &self,
        render_pass: vk::RenderPass,
        views: Vec<vk::ImageView>,
        extent: vk::Extent2D,
    ) -> Result<vk::Framebuffer> {
        let mut cache = self.framebuffer_cache.lock();
        let key = (render_pass, views);
        if let Some(&framebuffer) = cache.get(&key) {
            return Ok(framebuffer);
        }

        let info = vk::FramebufferCreateInfo::default()
            .render_pass(render_pass)
            .attachments(&key.1)
            .width(extent.width)
            .height(extent.height)
            .layers(1);
        let framebuffer =
            unsafe { self.fp.create_framebuffer(&info, None) }.map_err(conv::map_error)?;
        cache.insert(key, framebuffer);
        Ok(framebuffer)
    }

    fn create_pool(
        &self,
        flags: vk::DescriptorPoolCreateFlags,
        max_sets: u32,
    ) -> Result<vk::DescriptorPool> {
        let sizes = [
            vk::DescriptorType::SAMPLER,
            vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
            vk::DescriptorType::SAMPLED_IMAGE,
            vk::DescriptorType::STORAGE_IMAGE,
            vk::DescriptorType::UNIFORM_BUFFER,
            vk::DescriptorType::UNIFORM_TEXEL_BUFFER,
            vk::DescriptorType::STORAGE_TEXEL_BUFFER,
        ]
        .map(|ty| vk::DescriptorPoolSize {
            ty,
            descriptor_count: max_sets * 8,
        });

        let info = vk::DescriptorPoolCreateInfo::default()
            .flags(flags)
            .max_sets(max_sets)
            .pool_sizes(&sizes);
        unsafe { self.fp.create_descriptor_pool(&info, None) }.map_err(conv::map_error)
    }

    fn descriptor_pool(&self) -> Result<vk::DescriptorPool> {
        let mut pool = self.descriptor_pool.lock();
        if pool.is_null() {
            *pool = self.create_pool(vk::DescriptorPoolCreateFlags::FREE_DESCRIPTOR_SET, 512)?;
        }

        Ok(*pool)
    }

    /// Allocates a set that lives until the current transient pool comes around again.
    pub(crate) fn allocate_transient_set(
        &self,
        layout: vk::DescriptorSetLayout,
    ) -> Result<vk::DescriptorSet> {
        let mut transient = self.transient_pools.lock();
        let current = transient.current;
        if transient.pools[current].is_null() {
            transient.pools[current] = self.create_pool(vk::DescriptorPoolCreateFlags::empty(), 1024)?;
        }

        let layouts = [layout];
        let info = vk::DescriptorSetAllocateInfo::default()
            .descriptor_pool(transient.pools[current])
            .set_layouts(&layouts);
        let sets = unsafe { self.fp.allocate_descriptor_sets(&info) }.map_err(conv::map_error)?;
        sets.first().copied().ok_or(Error::OutOfMemory)
    }

    /// Moves to the next transient pool, recycling its sets.
    pub(crate) fn rotate_transient_pools(&self) {
        let mut transient = self.transient_pools.lock();
        transient.current = (transient.current + 1) % TRANSIENT_POOL_COUNT;

        let pool = transient.pools[transient.current];
        if !pool.is_null()
            && let Err(err) = unsafe {
                self.fp
                    .reset_descriptor_pool(pool, vk::DescriptorPoolResetFlags::empty())
            }
        {
            error!("failed to reset transient descriptor pool. err: {err:?}");
        }
    }

    pub(crate) fn descriptor_write_info(
        &self,
        descriptors: &Descriptors<'_>,
    ) -> (vk::DescriptorType, WriteInfo) {
        let image_view = |view: ResourceView| match self.views.get_copied(view.raw()) {
            Some(ViewData {
                native: NativeView::Image { view, .. },
                ..
            }) => view,
            _ => vk::ImageView::null(),
        };
        let buffer_view = |view: ResourceView| match self.views.get_copied(view.raw()) {
            Some(ViewData {
                native: NativeView::Buffer(view),
                ..
            }) => Some(view),
            _ => None,
        };

        match *descriptors {
            Descriptors::Samplers(samplers) => (
                vk::DescriptorType::SAMPLER,
                WriteInfo::Images(
                    samplers
                        .iter()
                        .map(|sampler| vk::DescriptorImageInfo {
                            sampler: vk::Sampler::from_raw(sampler.raw()),
                            ..Default::default()
                        })
                        .collect(),
                ),
            ),
            Descriptors::SamplersWithViews(pairs) => (
                vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
                WriteInfo::Images(
                    pairs
                        .iter()
                        .map(|&(sampler, view)| vk::DescriptorImageInfo {
                            sampler: vk::Sampler::from_raw(sampler.raw()),
                            image_view: image_view(view),
                            image_layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
                        })
                        .collect(),
                ),
            ),
            Descriptors::ShaderResourceViews(views) => {
                match views.iter().map(|&view| buffer_view(view)).collect::<Option<Vec<_>>>() {
                    Some(texels) if !texels.is_empty() => (
                        vk::DescriptorType::UNIFORM_TEXEL_BUFFER,
                        WriteInfo::TexelBuffers(texels),
                    ),
                    _ => (
                        vk::DescriptorType::SAMPLED_IMAGE,
                        WriteInfo::Images(
                            views
                                .iter()
                                .map(|&view| vk::DescriptorImageInfo {
                                    image_view: image_view(view),
                                    image_layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
                                    ..Default::default()
                                })
                                .collect(),
                        ),
                    ),
                }
            }
            Descriptors::UnorderedAccessViews(views) => {
                match views.iter().map(|&view| buffer_view(view)).collect::<Option<Vec<_>>>() {
                    Some(texels) if !texels.is_empty() => (
                        vk::DescriptorType::STORAGE_TEXEL_BUFFER,
                        WriteInfo::TexelBuffers(texels),
                    ),
                    _ => (
                        vk::DescriptorType::STORAGE_IMAGE,
                        WriteInfo::Images(
                            views
                                .iter()
                                .map(|&view| vk::DescriptorImageInfo {
                                    image_view: image_view(view),
                                    image_layout: vk::ImageLayout::GENERAL,
                                    ..Default::default()
                                })
                                .collect(),
                        ),
                    ),
                }
            }
            Descriptors::ConstantBuffers(ranges) => (
                vk::DescriptorType::UNIFORM_BUFFER,
                WriteInfo::Buffers(
                    ranges
                        .iter()
                        .map(|range| vk::DescriptorBufferInfo {
                            buffer: vk::Buffer::from_raw(range.buffer.raw()),
                            offset: range.offset,
                            range: if range.size == u64::MAX {
                                vk::WHOLE_SIZE
                            } else {
                                range.size
                            },
                        })
                        .collect(),
                ),
            ),
        }
    }

    fn allocate_memory(
        &self,
        requirements: vk::MemoryRequirements,
        heap: MemoryHeap,
    ) -> Result<vk::DeviceMemory> {
        let Some(memory_type_index) =
            conv::find_memory_type(&self.memory_properties, requirements.memory_type_bits, heap)
        else {
            return Err(Error::OutOfMemory);
        };

        let info = vk::MemoryAllocateInfo::default()
            .allocation_size(requirements.size)
            .memory_type_index(memory_type_index);
        unsafe { self.fp.allocate_memory(&info, None) }.map_err(conv::map_error)
    }

    fn create_staging(&self, data: &[u8]) -> Result<Staging> {
        let info = vk::BufferCreateInfo::default()
            .size(data.len() as u64)
            .usage(vk::BufferUsageFlags::TRANSFER_SRC)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);
        let buffer = unsafe { self.fp.create_buffer(&info, None) }.map_err(conv::map_error)?;
        let buffer = scopeguard::guard(buffer, |buffer| unsafe {
            self.fp.destroy_buffer(buffer, None)
        });

        let requirements = unsafe { self.fp.get_buffer_memory_requirements(*buffer) };
        let memory = self.allocate_memory(requirements, MemoryHeap::CpuOnly)?;
        let memory = scopeguard::guard(memory, |memory| unsafe { self.fp.free_memory(memory, None) });

        unsafe {
            self.fp
                .bind_buffer_memory(*buffer, *memory, 0)
                .map_err(conv::map_error)?;
            let mapped = self
                .fp
                .map_memory(*memory, 0, vk::WHOLE_SIZE, vk::MemoryMapFlags::empty())
                .map_err(conv::map_error)?;
            ptr::copy_nonoverlapping(data.as_ptr(), mapped.cast::<u8>(), data.len());
            self.fp.unmap_memory(*memory);
        }

        Ok(Staging {
            buffer: ScopeGuard::into_inner(buffer),
            memory: ScopeGuard::into_inner(memory),
        })
    }

    fn destroy_staging(&self, staging: Staging) {
        unsafe {
            self.fp.destroy_buffer(staging.buffer, None);
            self.fp.free_memory(staging.memory, None);
        }
    }

    /// Copies CPU data into host visible resource memory.
    fn write_mapped(&self, resource: &ResourceData, offset: u64, data: &[u8]) -> Result<()> {
        unsafe {
            let mapped = self
                .fp
                .map_memory(resource.memory, offset, data.len() as u64, vk::MemoryMapFlags::empty())
                .map_err(conv::map_error)?;
            ptr::copy_nonoverlapping(data.as_ptr(), mapped.cast::<u8>(), data.len());
            self.fp.unmap_memory(resource.memory);
        }

        Ok(())
    }

    fn texture_copy_region(
        resource: &ResourceData,
        data: &SubresourceData<'_>,
        subresource: u32,
        dst_box: Option<&SubresourceBox>,
    ) -> vk::BufferImageCopy {
        let format = resource.desc.format;
        // Zero lengths mean tightly packed rows
        let (row_length, image_height) = match format.bytes_per_pixel() {
            0 => (0, 0),
            bpp => (
                data.row_pitch / bpp,
                data.slice_pitch.checked_div(data.row_pitch).unwrap_or(0),
            ),
        };

        buffer_image_copy(
            &resource.desc,
            resource.aspect(),
            0,
            row_length,
            image_height,
            subresource,
            dst_box,
        )
    }

    fn upload_initial_data(
        &self,
        resource: Resource,
        data: &ResourceData,
        initial_data: Option<&[SubresourceData<'_>]>,
        initial_state: ResourceUsage,
    ) -> Result<()> {
        let initial_data = initial_data.unwrap_or_default();
        match data.native {
            NativeResource::Buffer(buffer) => {
                let Some(first) = initial_data.first() else {
                    return Ok(());
                };
                if is_host_visible(data.desc.heap) {
                    return self.write_mapped(data, 0, first.data);
                }

                let staging = self.create_staging(first.data)?;
                let res = self.submit_immediate(|list| unsafe {
                    let region = vk::BufferCopy {
                        src_offset: 0,
                        dst_offset: 0,
                        size: first.data.len() as u64,
                    };
                    self.fp
                        .cmd_copy_buffer(list.handle, staging.buffer, buffer, &[region]);
                });
                self.destroy_staging(staging);
                res
            }

            NativeResource::Image { image, .. } => {
                if initial_data.is_empty() {
                    if initial_state.is_empty() {
                        return Ok(());
                    }
                    return self.submit_immediate(|list| {
                        list.barrier(&[resource], &[ResourceUsage::empty()], &[initial_state]);
                    });
                }

                let mut stagings = Vec::with_capacity(initial_data.len());
                for subresource in initial_data {
                    match self.create_staging(subresource.data) {
                        Ok(staging) => stagings.push(staging),
                        Err(err) => {
                            stagings.into_iter().for_each(|staging| self.destroy_staging(staging));
                            return Err(err);
                        }
                    }
                }

                let res = self.submit_immediate(|list| {
                    list.barrier(
                        &[resource],
                        &[ResourceUsage::empty()],
                        &[ResourceUsage::COPY_DEST],
                    );
                    for (index, (subresource, staging)) in
                        initial_data.iter().zip(&stagings).enumerate()
                    {
                        let region = Self::texture_copy_region(data, subresource, index as u32, None);
                        unsafe {
                            self.fp.cmd_copy_buffer_to_image(
                                list.handle,
                                staging.buffer,
                                image,
                                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                                &[region],
                            );
                        }
                    }
                    list.barrier(&[resource], &[ResourceUsage::COPY_DEST], &[initial_state]);
                });
                stagings.into_iter().for_each(|staging| self.destroy_staging(staging));
                res
            }
        }
    }

    pub(crate) fn create_shader_module(&self, shader: &ShaderDesc<'_>) -> Result<vk::ShaderModule> {
        let code = ash::util::read_spv(&mut Cursor::new(shader.code))
            .map_err(|_| Error::Unsupported("shader code is not SPIR-V"))?;
        let info = vk::ShaderModuleCreateInfo::default().code(&code);
        unsafe { self.fp.create_shader_module(&info, None) }.map_err(conv::map_error)
    }

    fn create_compute_pipeline(
        &self,
        layout: PipelineLayout,
        shader: &ShaderDesc<'_>,
    ) -> Result<vk::Pipeline> {
        let module = self.create_shader_module(shader)?;
        scopeguard::defer! {
            unsafe { self.fp.destroy_shader_module(module, None) };
        }

        let entry_point = entry_point_name(shader)?;
        let stage = vk::PipelineShaderStageCreateInfo::default()
            .stage(vk::ShaderStageFlags::COMPUTE)
            .module(module)
            .name(&entry_point);
        let info = vk::ComputePipelineCreateInfo::default()
            .stage(stage)
            .layout(vk::PipelineLayout::from_raw(layout.raw()));

        let pipelines = unsafe {
            self.fp
                .create_compute_pipelines(vk::PipelineCache::null(), &[info], None)
        }
        .map_err(|(_, err)| conv::map_error(err))?;
        pipelines.first().copied().ok_or(Error::Unsupported("no pipeline created"))
    }

    fn create_graphics_pipeline(
        &self,
        layout: PipelineLayout,
        desc: &GraphicsDesc<'_>,
    ) -> Result<vk::Pipeline> {
        let mut modules = scopeguard::guard(Vec::new(), |modules: Vec<vk::ShaderModule>| {
            for module in modules {
                unsafe { self.fp.destroy_shader_module(module, None) };
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
            let module = self.create_shader_module(shader)?;
            modules.push(module);
            stages.push((stage, module, entry_point_name(shader)?));
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

        let mut bindings: Vec<vk::VertexInputBindingDescription> = Vec::new();
        for element in &desc.input_layout {
            if bindings
                .iter()
                .all(|binding| binding.binding != element.buffer_binding)
            {
                bindings.push(vk::VertexInputBindingDescription {
                    binding: element.buffer_binding,
                    stride: element.stride,
                    input_rate: if element.instance_step_rate > 0 {
                        vk::VertexInputRate::INSTANCE
                    } else {
                        vk::VertexInputRate::VERTEX
                    },
                });
            }
        }
        let attributes: Vec<vk::VertexInputAttributeDescription> = desc
            .input_layout
            .iter()
            .map(|element| vk::VertexInputAttributeDescription {
                location: element.location,
                binding: element.buffer_binding,
                format: conv::map_format(element.format),
                offset: element.offset,
            })
            .collect();
        let vertex_input = vk::PipelineVertexInputStateCreateInfo::default()
            .vertex_binding_descriptions(&bindings)
            .vertex_attribute_descriptions(&attributes);

        let input_assembly = vk::PipelineInputAssemblyStateCreateInfo::default().topology(
            conv::map_topology(desc.topology).unwrap_or(vk::PrimitiveTopology::TRIANGLE_LIST),
        );
        let tessellation = match desc.topology {
            PrimitiveTopology::PatchList(points) => Some(
                vk::PipelineTessellationStateCreateInfo::default()
                    .patch_control_points(points as u32),
            ),
            _ => None,
        };

        let viewport_count = desc.viewport_count.max(1);
        let viewport = vk::PipelineViewportStateCreateInfo::default()
            .viewport_count(viewport_count)
            .scissor_count(viewport_count);
        let rasterization = conv::map_rasterizer_state(&desc.rasterizer_state);

        let samples = vk::SampleCountFlags::from_raw(desc.sample_count.max(1));
        let sample_mask = [desc.sample_mask];
        let multisample = vk::PipelineMultisampleStateCreateInfo::default()
            .rasterization_samples(samples)
            .sample_mask(&sample_mask)
            .alpha_to_coverage_enable(desc.blend_state.alpha_to_coverage_enable);
        let depth_stencil = conv::map_depth_stencil_state(&desc.depth_stencil_state);

        let count = desc.render_target_count();
        let attachments = conv::map_blend_attachments(&desc.blend_state, count);
        let color_blend = vk::PipelineColorBlendStateCreateInfo::default()
            .logic_op_enable(desc.blend_state.logic_op_enable[0])
            .logic_op(conv::map_logic_op(desc.blend_state.logic_op[0]))
            .attachments(&attachments)
            .blend_constants(unpack_color(desc.blend_state.blend_constant));

        let mut dynamic_states = vec![vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR];
        for state in desc.dynamic_states.iter().filter_map(|&state| conv::map_dynamic_state(state)) {
            if !dynamic_states.contains(&state) {
                dynamic_states.push(state);
            }
        }
        let dynamic = vk::PipelineDynamicStateCreateInfo::default().dynamic_states(&dynamic_states);

        let render_pass = self.render_pass(RenderPassKey {
            colors: desc.render_target_formats[..count]
                .iter()
                .map(|&format| {
                    (
                        conv::map_format(format),
                        vk::AttachmentLoadOp::LOAD,
                        vk::AttachmentStoreOp::STORE,
                    )
                })
                .collect(),
            depth_stencil: (desc.depth_stencil_format != Format::Unknown).then(|| {
                (
                    conv::map_format(desc.depth_stencil_format),
                    vk::AttachmentLoadOp::LOAD,
                    vk::AttachmentStoreOp::STORE,
                    vk::AttachmentLoadOp::LOAD,
                    vk::AttachmentStoreOp::STORE,
                )
            }),
            samples,
        })?;

        let mut info = vk::GraphicsPipelineCreateInfo::default()
            .stages(&stage_infos)
            .vertex_input_state(&vertex_input)
            .input_assembly_state(&input_assembly)
            .viewport_state(&viewport)
            .rasterization_state(&rasterization)
            .multisample_state(&multisample)
            .depth_stencil_state(&depth_stencil)
            .color_blend_state(&color_blend)
            .dynamic_state(&dynamic)
            .layout(vk::PipelineLayout::from_raw(layout.raw()))
            .render_pass(render_pass)
            .subpass(0);
        if let Some(tessellation) = &tessellation {
            info = info.tessellation_state(tessellation);
        }

        let pipelines = unsafe {
            self.fp
                .create_graphics_pipelines(vk::PipelineCache::null(), &[info], None)
        }
        .map_err(|(_, err)| conv::map_error(err))?;
        pipelines.first().copied().ok_or(Error::Unsupported("no pipeline created"))
    }

    fn create_set_layout(
        &self,
        ranges: &[DescriptorRange],
        push_descriptors: bool,
    ) -> Result<vk::DescriptorSetLayout> {
        let bindings: Vec<vk::DescriptorSetLayoutBinding> = ranges
            .iter()
            .map(|range| {
                vk::DescriptorSetLayoutBinding::default()
                    .binding(range.binding)
                    .descriptor_type(conv::map_descriptor_type(range.ty))
                    .descriptor_count(range.count)
                    .stage_flags(conv::map_shader_stages(range.visibility))
            })
            .collect();

        let mut info = vk::DescriptorSetLayoutCreateInfo::default().bindings(&bindings);
        if push_descriptors && self.push_descriptor {
            info = info.flags(vk::DescriptorSetLayoutCreateFlags::PUSH_DESCRIPTOR_KHR);
        }
        unsafe { self.fp.create_descriptor_set_layout(&info, None) }.map_err(conv::map_error)
    }

    /// Destroys what the layer created for its own use. Called right before the device goes away.
    pub(crate) fn destroy_internal_objects(&self) {
        for (_, view) in self.default_views.drain() {
            self.destroy_resource_view(view);
        }

        unsafe {
            for (_, framebuffer) in self.framebuffer_cache.lock().drain() {
                self.fp.destroy_framebuffer(framebuffer, None);
            }
            for (_, render_pass) in self.render_pass_cache.lock().drain() {
                self.fp.destroy_render_pass(render_pass, None);
            }

            let pool = mem::take(&mut *self.descriptor_pool.lock());
            if !pool.is_null() {
                self.fp.destroy_descriptor_pool(pool, None);
            }
            for pool in mem::take(&mut self.transient_pools.lock().pools) {
                if !pool.is_null() {
                    self.fp.destroy_descriptor_pool(pool, None);
                }
            }
        }
    }
}

pub(crate) fn entry_point_name(shader: &ShaderDesc<'_>) -> Result<CString> {
    CString::new(shader.entry_point.unwrap_or("main"))
        .map_err(|_| Error::Unsupported("entry point contains a nul byte"))
}

fn is_host_visible(heap: MemoryHeap) -> bool {
    matches!(
        heap,
        MemoryHeap::CpuToGpu | MemoryHeap::GpuToCpu | MemoryHeap::CpuOnly
    )
}

/// Unpacks an RGBA8 color into normalized floats.
pub(crate) fn unpack_color(rgba: u32) -> [f32; 4] {
    rgba.to_le_bytes().map(|channel| channel as f32 / 255.0)
}

pub(crate) fn capability(
    cap: DeviceCaps,
    features: &vk::PhysicalDeviceFeatures,
    push_descriptor: bool,
) -> bool {
    let enabled = |feature: vk::Bool32| feature != vk::FALSE;
    match cap {
        DeviceCaps::GeometryShader => enabled(features.geometry_shader),
        DeviceCaps::HullAndDomainShader => enabled(features.tessellation_shader),
        DeviceCaps::DualSourceBlend => enabled(features.dual_src_blend),
        DeviceCaps::IndependentBlend => enabled(features.independent_blend),
        DeviceCaps::LogicOp => enabled(features.logic_op),
        DeviceCaps::FillModeNonSolid => enabled(features.fill_mode_non_solid),
        DeviceCaps::MultiViewport => enabled(features.multi_viewport),
        DeviceCaps::SamplerAnisotropic => enabled(features.sampler_anisotropy),
        DeviceCaps::PartialPushDescriptorUpdates => push_descriptor,
        DeviceCaps::ComputeShader
        | DeviceCaps::DrawInstanced
        | DeviceCaps::DrawOrDispatchIndirect
        | DeviceCaps::PartialPushConstantUpdates
        | DeviceCaps::SamplerCompare
        | DeviceCaps::SamplerWithResourceView
        | DeviceCaps::CopyBufferRegion
        | DeviceCaps::CopyBufferToTexture
        | DeviceCaps::Blit
        | DeviceCaps::ResolveRegion
        | DeviceCaps::CopyQueryPoolResults => true,
    }
}

impl Device for DeviceImpl {
    fn api(&self) -> DeviceApi {
        DeviceApi::Vulkan
    }

    fn check_capability(&self, cap: DeviceCaps) -> bool {
        capability(cap, &self.features, self.push_descriptor)
    }

    fn check_format_support(&self, format: Format, usage: ResourceUsage) -> bool {
        let format = conv::map_format(format);
        if format == vk::Format::UNDEFINED {
            return false;
        }

        let mut required = vk::FormatFeatureFlags::empty();
        if usage.contains(ResourceUsage::RENDER_TARGET) {
            required |= vk::FormatFeatureFlags::COLOR_ATTACHMENT;
        }
        if usage.intersects(ResourceUsage::DEPTH_STENCIL) {
            required |= vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT;
        }
        if usage.intersects(ResourceUsage::SHADER_RESOURCE) {
            required |= vk::FormatFeatureFlags::SAMPLED_IMAGE;
        }
        if usage.contains(ResourceUsage::UNORDERED_ACCESS) {
            required |= vk::FormatFeatureFlags::STORAGE_IMAGE;
        }
        if usage.intersects(ResourceUsage::COPY_DEST | ResourceUsage::RESOLVE_DEST) {
            required |= vk::FormatFeatureFlags::TRANSFER_DST;
        }
        if usage.intersects(ResourceUsage::COPY_SOURCE | ResourceUsage::RESOLVE_SOURCE) {
            required |= vk::FormatFeatureFlags::TRANSFER_SRC;
        }

        let properties = unsafe {
            self.instance
                .get_physical_device_format_properties(self.physical_device, format)
        };
        properties.optimal_tiling_features.contains(required)
    }

    fn create_sampler(&self, desc: &SamplerDesc) -> Result<Sampler> {
        let info = conv::map_sampler_info(desc);
        let sampler =
            unsafe { self.fp.create_sampler(&info, None) }.map_err(conv::map_error)?;
        self.samplers.insert(sampler.as_raw(), *desc);
        Ok(Sampler::from_raw(sampler.as_raw()))
    }

    fn destroy_sampler(&self, sampler: Sampler) {
        if self.samplers.remove(sampler.raw()).is_some() {
            unsafe {
                self.fp
                    .destroy_sampler(vk::Sampler::from_raw(sampler.raw()), None)
            };
        }
    }

    fn create_resource(
        &self,
        desc: &ResourceDesc,
        initial_data: Option<&[SubresourceData<'_>]>,
        initial_state: ResourceUsage,
    ) -> Result<Resource> {
        let data = match desc.dimension {
            ResourceDimension::Buffer { .. } => {
                let mut info =
                    vk::BufferCreateInfo::default().sharing_mode(vk::SharingMode::EXCLUSIVE);
                conv::map_buffer_info(desc, &mut info);
                if initial_data.is_some() && !is_host_visible(desc.heap) {
                    info.usage |= vk::BufferUsageFlags::TRANSFER_DST;
                }

                let buffer =
                    unsafe { self.fp.create_buffer(&info, None) }.map_err(conv::map_error)?;
                let buffer = scopeguard::guard(buffer, |buffer| unsafe {
                    self.fp.destroy_buffer(buffer, None)
                });
                let requirements = unsafe { self.fp.get_buffer_memory_requirements(*buffer) };
                let memory = self.allocate_memory(requirements, desc.heap)?;
                let memory =
                    scopeguard::guard(memory, |memory| unsafe { self.fp.free_memory(memory, None) });
                unsafe { self.fp.bind_buffer_memory(*buffer, *memory, 0) }
                    .map_err(conv::map_error)?;

                ResourceData {
                    desc: *desc,
                    native: NativeResource::Buffer(ScopeGuard::into_inner(buffer)),
                    memory: ScopeGuard::into_inner(memory),
                    owned: true,
                }
            }

            _ => {
                let format = conv::map_format(desc.format);
                let mut info = vk::ImageCreateInfo::default()
                    .format(format)
                    .tiling(if is_host_visible(desc.heap) {
                        vk::ImageTiling::LINEAR
                    } else {
                        vk::ImageTiling::OPTIMAL
                    })
                    .sharing_mode(vk::SharingMode::EXCLUSIVE)
                    .initial_layout(vk::ImageLayout::UNDEFINED);
                conv::map_image_info(desc, &mut info);
                if initial_data.is_some() {
                    info.usage |= vk::ImageUsageFlags::TRANSFER_DST;
                }
                // Views may reinterpret within the typeless family
                if desc.format.is_typeless() {
                    info.flags |= vk::ImageCreateFlags::MUTABLE_FORMAT;
                }

                let image =
                    unsafe { self.fp.create_image(&info, None) }.map_err(conv::map_error)?;
                let image = scopeguard::guard(image, |image| unsafe {
                    self.fp.destroy_image(image, None)
                });
                let requirements = unsafe { self.fp.get_image_memory_requirements(*image) };
                let memory = self.allocate_memory(requirements, desc.heap)?;
                let memory =
                    scopeguard::guard(memory, |memory| unsafe { self.fp.free_memory(memory, None) });
                unsafe { self.fp.bind_image_memory(*image, *memory, 0) }
                    .map_err(conv::map_error)?;

                ResourceData {
                    desc: *desc,
                    native: NativeResource::Image {
                        image: ScopeGuard::into_inner(image),
                        format: info.format,
                    },
                    memory: ScopeGuard::into_inner(memory),
                    owned: true,
                }
            }
        };

        let raw = match data.native {
            NativeResource::Buffer(buffer) => buffer.as_raw(),
            NativeResource::Image { image, .. } => image.as_raw(),
        };
        let resource = Resource::from_raw(raw);
        self.resources.insert(raw, data);

        if let Err(err) = self.upload_initial_data(resource, &data, initial_data, initial_state) {
            error!("failed to upload initial data of {resource:?}. err: {err}");
            self.destroy_resource(resource);
            return Err(err);
        }

        Ok(resource)
    }

    fn destroy_resource(&self, resource: Resource) {
        self.release_default_view(resource);
        let Some(data) = self.resources.remove(resource.raw()) else {
            return;
        };
        if !data.owned {
            return;
        }

        unsafe {
            match data.native {
                NativeResource::Buffer(buffer) => self.fp.destroy_buffer(buffer, None),
                NativeResource::Image { image, .. } => self.fp.destroy_image(image, None),
            }
            if !data.memory.is_null() {
                self.fp.free_memory(data.memory, None);
            }
        }
    }

    fn get_resource_desc(&self, resource: Resource) -> Option<ResourceDesc> {
        self.resources.with(resource.raw(), |data| data.desc)
    }

    fn create_resource_view(
        &self,
        resource: Resource,
        usage: ResourceUsage,
        desc: &ResourceViewDesc,
    ) -> Result<ResourceView> {
        let Some(data) = self.resources.get_copied(resource.raw()) else {
            return Err(Error::InvalidHandle);
        };
        check_view_compatible(&data.desc, desc)?;

        let (native, desc) = match data.native {
            NativeResource::Image { image, format } => {
                let mut aspect = conv::aspect_mask(format);
                // Depth stencil images are sampled through their depth aspect
                if usage.intersects(ResourceUsage::SHADER_RESOURCE)
                    && aspect.contains(vk::ImageAspectFlags::DEPTH)
                {
                    aspect = vk::ImageAspectFlags::DEPTH;
                }

                let mut desc = *desc;
                if desc.ty == ResourceViewType::Unknown {
                    desc.ty = ResourceViewDesc::whole(&data.desc).ty;
                }
                if conv::map_view_type(desc.ty).is_none() {
                    return Err(Error::Unsupported("view type does not match an image"));
                }

                let mut info = vk::ImageViewCreateInfo::default()
                    .image(image)
                    .format(format)
                    .subresource_range(vk::ImageSubresourceRange {
                        aspect_mask: aspect,
                        base_mip_level: 0,
                        level_count: vk::REMAINING_MIP_LEVELS,
                        base_array_layer: 0,
                        layer_count: vk::REMAINING_ARRAY_LAYERS,
                    });
                conv::map_image_view_info(&desc, &mut info);

                let view =
                    unsafe { self.fp.create_image_view(&info, None) }.map_err(conv::map_error)?;
                let native = NativeView::Image {
                    view,
                    image,
                    format: info.format,
                    range: info.subresource_range,
                };
                (native, desc)
            }

            NativeResource::Buffer(buffer) => {
                if desc.format == Format::Unknown {
                    return Err(Error::Unsupported("buffer views need a format"));
                }

                let mut info = vk::BufferViewCreateInfo::default()
                    .buffer(buffer)
                    .offset(0)
                    .range(vk::WHOLE_SIZE);
                conv::map_buffer_view_info(desc, &mut info);
                let view =
                    unsafe { self.fp.create_buffer_view(&info, None) }.map_err(conv::map_error)?;
                (NativeView::Buffer(view), *desc)
            }
        };

        let raw = match native {
            NativeView::Image { view, .. } => view.as_raw(),
            NativeView::Buffer(view) => view.as_raw(),
        };
        self.views.insert(
            raw,
            ViewData {
                resource,
                desc,
                native,
            },
        );
        Ok(ResourceView::from_raw(raw))
    }

    fn destroy_resource_view(&self, view: ResourceView) {
        let Some(data) = self.views.remove(view.raw()) else {
            return;
        };

        match data.native {
            NativeView::Image { view, .. } => {
                let mut cache = self.framebuffer_cache.lock();
                cache.retain(|(_, views), framebuffer| {
                    let keep = !views.contains(&view);
                    if !keep {
                        unsafe { self.fp.destroy_framebuffer(*framebuffer, None) };
                    }
                    keep
                });
                unsafe { self.fp.destroy_image_view(view, None) };
            }
            NativeView::Buffer(view) => unsafe { self.fp.destroy_buffer_view(view, None) },
        }
    }

    fn get_resource_from_view(&self, view: ResourceView) -> Option<Resource> {
        self.views.with(view.raw(), |data| data.resource)
    }

    fn create_pipeline(&self, layout: PipelineLayout, desc: &PipelineDesc<'_>) -> Result<Pipeline> {
        let (pipeline, bind_point) = match desc {
            PipelineDesc::Compute(shader) => (
                self.create_compute_pipeline(layout, shader)?,
                vk::PipelineBindPoint::COMPUTE,
            ),
            PipelineDesc::Graphics(graphics) => (
                self.create_graphics_pipeline(layout, graphics)?,
                vk::PipelineBindPoint::GRAPHICS,
            ),
            _ => return Err(Error::Unsupported("partial pipeline state objects")),
        };

        self.pipelines.insert(
            pipeline.as_raw(),
            PipelineData {
                bind_point,
                owned: true,
            },
        );
        Ok(Pipeline::from_raw(pipeline.as_raw()))
    }

    fn destroy_pipeline(&self, pipeline: Pipeline) {
        if self.pipelines.remove(pipeline.raw()).is_some() {
            unsafe {
                self.fp
                    .destroy_pipeline(vk::Pipeline::from_raw(pipeline.raw()), None)
            };
        }
    }

    fn create_pipeline_layout(&self, params: &[PipelineLayoutParam]) -> Result<PipelineLayout> {
        let mut set_layouts = scopeguard::guard(Vec::new(), |layouts: Vec<vk::DescriptorSetLayout>| {
            for layout in layouts {
                unsafe { self.fp.destroy_descriptor_set_layout(layout, None) };
            }
        });
        let mut constant_ranges = Vec::new();
        let mut bindings = Vec::with_capacity(params.len());

        for param in params {
            match param {
                PipelineLayoutParam::PushConstants(range) => {
                    let stages = conv::map_shader_stages(range.visibility);
                    let offset = range.offset * 4;
                    constant_ranges.push(vk::PushConstantRange {
                        stage_flags: stages,
                        offset,
                        size: range.count * 4,
                    });
                    bindings.push(ParamBinding::Constants { stages, offset });
                }
                PipelineLayoutParam::PushDescriptors(range) => {
                    set_layouts.push(self.create_set_layout(slice_of(range), true)?);
                    bindings.push(ParamBinding::Set(set_layouts.len() as u32 - 1));
                }
                PipelineLayoutParam::DescriptorTable(ranges) => {
                    set_layouts.push(self.create_set_layout(ranges, false)?);
                    bindings.push(ParamBinding::Set(set_layouts.len() as u32 - 1));
                }
            }
        }

        let info = vk::PipelineLayoutCreateInfo::default()
            .set_layouts(&set_layouts)
            .push_constant_ranges(&constant_ranges);
        let layout =
            unsafe { self.fp.create_pipeline_layout(&info, None) }.map_err(conv::map_error)?;

        self.pipeline_layouts.insert(
            layout.as_raw(),
            PipelineLayoutData {
                params: bindings,
                set_layouts: ScopeGuard::into_inner(set_layouts),
            },
        );
        Ok(PipelineLayout::from_raw(layout.as_raw()))
    }

    fn destroy_pipeline_layout(&self, layout: PipelineLayout) {
        let Some(data) = self.pipeline_layouts.remove(layout.raw()) else {
            return;
        };

        unsafe {
            self.fp
                .destroy_pipeline_layout(vk::PipelineLayout::from_raw(layout.raw()), None);
            for set_layout in data.set_layouts {
                self.fp.destroy_descriptor_set_layout(set_layout, None);
            }
        }
    }

    fn create_descriptor_set_layout(
        &self,
        ranges: &[DescriptorRange],
        push_descriptors: bool,
    ) -> Result<DescriptorSetLayout> {
        let layout = self.create_set_layout(ranges, push_descriptors)?;
        self.set_layouts.insert(
            layout.as_raw(),
            SetLayoutData {
                ranges: ranges.to_vec(),
                push: push_descriptors,
            },
        );
        Ok(DescriptorSetLayout::from_raw(layout.as_raw()))
    }

    fn destroy_descriptor_set_layout(&self, layout: DescriptorSetLayout) {
        if self.set_layouts.remove(layout.raw()).is_some() {
            unsafe {
                self.fp.destroy_descriptor_set_layout(
                    vk::DescriptorSetLayout::from_raw(layout.raw()),
                    None,
                )
            };
        }
    }

    fn create_query_pool(&self, ty: QueryType, size: u32) -> Result<QueryPool> {
        let mut info = vk::QueryPoolCreateInfo::default()
            .query_type(conv::map_query_type(ty))
            .query_count(size);
        if ty == QueryType::PipelineStatistics {
            info = info.pipeline_statistics(
                vk::QueryPipelineStatisticFlags::INPUT_ASSEMBLY_VERTICES
                    | vk::QueryPipelineStatisticFlags::INPUT_ASSEMBLY_PRIMITIVES
                    | vk::QueryPipelineStatisticFlags::VERTEX_SHADER_INVOCATIONS
                    | vk::QueryPipelineStatisticFlags::CLIPPING_INVOCATIONS
                    | vk::QueryPipelineStatisticFlags::CLIPPING_PRIMITIVES
                    | vk::QueryPipelineStatisticFlags::FRAGMENT_SHADER_INVOCATIONS
                    | vk::QueryPipelineStatisticFlags::COMPUTE_SHADER_INVOCATIONS,
            );
        }

        let pool = unsafe { self.fp.create_query_pool(&info, None) }.map_err(conv::map_error)?;
        self.query_pools.insert(pool.as_raw(), ty);
        Ok(QueryPool::from_raw(pool.as_raw()))
    }

    fn destroy_query_pool(&self, pool: QueryPool) {
        if self.query_pools.remove(pool.raw()).is_some() {
            unsafe {
                self.fp
                    .destroy_query_pool(vk::QueryPool::from_raw(pool.raw()), None)
            };
        }
    }

    fn create_descriptor_sets(
        &self,
        layout: DescriptorSetLayout,
        count: usize,
    ) -> Result<Vec<DescriptorSet>> {
        if !self.set_layouts.contains(layout.raw()) {
            return Err(Error::InvalidHandle);
        }

        let layout = vk::DescriptorSetLayout::from_raw(layout.raw());
        let layouts = vec![layout; count];
        let info = vk::DescriptorSetAllocateInfo::default()
            .descriptor_pool(self.descriptor_pool()?)
            .set_layouts(&layouts);
        let sets = unsafe { self.fp.allocate_descriptor_sets(&info) }.map_err(conv::map_error)?;

        Ok(sets
            .into_iter()
            .map(|set| {
                self.descriptor_sets.insert(set.as_raw(), layout);
                DescriptorSet::from_raw(set.as_raw())
            })
            .collect())
    }

    fn destroy_descriptor_sets(&self, sets: &[DescriptorSet]) {
        let sets: Vec<vk::DescriptorSet> = sets
            .iter()
            .filter(|set| self.descriptor_sets.remove(set.raw()).is_some())
            .map(|set| vk::DescriptorSet::from_raw(set.raw()))
            .collect();
        if sets.is_empty() {
            return;
        }

        let pool = *self.descriptor_pool.lock();
        if let Err(err) = unsafe { self.fp.free_descriptor_sets(pool, &sets) } {
            error!("failed to free descriptor sets. err: {err:?}");
        }
    }

    fn update_descriptor_sets(&self, updates: &[DescriptorSetUpdate<'_>]) {
        let infos: Vec<(vk::DescriptorType, WriteInfo)> = updates
            .iter()
            .map(|update| self.descriptor_write_info(&update.descriptors))
            .collect();
        let writes: Vec<vk::WriteDescriptorSet> = updates
            .iter()
            .zip(&infos)
            .map(|(update, (ty, info))| {
                info.apply(
                    vk::WriteDescriptorSet::default()
                        .dst_set(vk::DescriptorSet::from_raw(update.set.raw()))
                        .dst_binding(update.binding)
                        .dst_array_element(update.array_offset)
                        .descriptor_type(*ty),
                )
            })
            .collect();

        unsafe { self.fp.update_descriptor_sets(&writes, &[]) };
    }

    fn map_resource(
        &self,
        resource: Resource,
        subresource: u32,
        _access: MapAccess,
    ) -> Result<MappedSubresource> {
        let Some(data) = self.resources.get_copied(resource.raw()) else {
            return Err(Error::InvalidHandle);
        };
        if data.memory.is_null() || !is_host_visible(data.desc.heap) {
            return Err(Error::Unsupported("resource memory is not host visible"));
        }

        match data.native {
            NativeResource::Buffer(_) => {
                let mapped = unsafe {
                    self.fp
                        .map_memory(data.memory, 0, vk::WHOLE_SIZE, vk::MemoryMapFlags::empty())
                }
                .map_err(conv::map_error)?;
                let (width, _, _) = data.desc.extent();
                Ok(MappedSubresource {
                    data: mapped.cast(),
                    row_pitch: width,
                    slice_pitch: width,
                })
            }

            NativeResource::Image { image, .. } => {
                let layers = subresource_layers(&data.desc, data.aspect(), subresource);
                let layout = unsafe {
                    self.fp.get_image_subresource_layout(
                        image,
                        vk::ImageSubresource {
                            aspect_mask: layers.aspect_mask,
                            mip_level: layers.mip_level,
                            array_layer: layers.base_array_layer,
                        },
                    )
                };
                let mapped = unsafe {
                    self.fp.map_memory(
                        data.memory,
                        layout.offset,
                        layout.size,
                        vk::MemoryMapFlags::empty(),
                    )
                }
                .map_err(conv::map_error)?;

                Ok(MappedSubresource {
                    data: mapped.cast(),
                    row_pitch: layout.row_pitch as u32,
                    slice_pitch: layout.depth_pitch as u32,
                })
            }
        }
    }

    fn unmap_resource(&self, resource: Resource, _subresource: u32) {
        if let Some(memory) = self.resources.with(resource.raw(), |data| data.memory)
            && !memory.is_null()
        {
            unsafe { self.fp.unmap_memory(memory) };
        }
    }

    fn upload_buffer_region(&self, data: &[u8], dst: Resource, dst_offset: u64) -> Result<()> {
        let Some(resource) = self.resources.get_copied(dst.raw()) else {
            return Err(Error::InvalidHandle);
        };
        let NativeResource::Buffer(buffer) = resource.native else {
            return Err(Error::Unsupported("upload target is not a buffer"));
        };
        if !resource.memory.is_null() && is_host_visible(resource.desc.heap) {
            return self.write_mapped(&resource, dst_offset, data);
        }

        let staging = self.create_staging(data)?;
        let res = self.submit_immediate(|list| unsafe {
            let region = vk::BufferCopy {
                src_offset: 0,
                dst_offset,
                size: data.len() as u64,
            };
            self.fp
                .cmd_copy_buffer(list.handle, staging.buffer, buffer, &[region]);
        });
        self.destroy_staging(staging);
        res
    }

    fn upload_texture_region(
        &self,
        data: &SubresourceData<'_>,
        dst: Resource,
        dst_subresource: u32,
        dst_box: Option<&SubresourceBox>,
    ) -> Result<()> {
        let Some(resource) = self.resources.get_copied(dst.raw()) else {
            return Err(Error::InvalidHandle);
        };
        let NativeResource::Image { image, .. } = resource.native else {
            return Err(Error::Unsupported("upload target is not a texture"));
        };

        let staging = self.create_staging(data.data)?;
        let region = Self::texture_copy_region(&resource, data, dst_subresource, dst_box);
        let res = self.submit_immediate(|list| {
            list.barrier(
                &[dst],
                &[ResourceUsage::SHADER_RESOURCE],
                &[ResourceUsage::COPY_DEST],
            );
            unsafe {
                self.fp.cmd_copy_buffer_to_image(
                    list.handle,
                    staging.buffer,
                    image,
                    vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                    &[region],
                );
            }
            list.barrier(
                &[dst],
                &[ResourceUsage::COPY_DEST],
                &[ResourceUsage::SHADER_RESOURCE],
            );
        });
        self.destroy_staging(staging);
        res
    }

    fn get_query_pool_results(&self, pool: QueryPool, first: u32, results: &mut [u64]) -> bool {
        if !self.query_pools.contains(pool.raw()) {
            return false;
        }

        unsafe {
            self.fp.get_query_pool_results(
                vk::QueryPool::from_raw(pool.raw()),
                first,
                results,
                vk::QueryResultFlags::TYPE_64,
            )
        }
        .is_ok()
    }

    fn set_resource_name(&self, resource: Resource, name: &str) {
        let Some(set_object_name) = self.optional.set_debug_utils_object_name else {
            return;
        };
        let Some(native) = self.resources.with(resource.raw(), |data| data.native) else {
            return;
        };
        let Ok(name) = CString::new(name) else {
            return;
        };

        let info = vk::DebugUtilsObjectNameInfoEXT::default().object_name(&name);
        let info = match native {
            NativeResource::Buffer(buffer) => info.object_handle(buffer),
            NativeResource::Image { image, .. } => info.object_handle(image),
        };
        unsafe { set_object_name(self.handle, &info) };
    }

    fn wait_idle(&self) {
        if let Err(err) = unsafe { self.fp.device_wait_idle() } {
            error!("vkDeviceWaitIdle failed. err: {err:?}");
        }
    }

    fn is_valid(&self, handle: AnyHandle) -> bool {
        let raw = handle.raw();
        match handle {
            AnyHandle::Resource(_) => self.resources.contains(raw),
            AnyHandle::ResourceView(_) => self.views.contains(raw),
            AnyHandle::Pipeline(_) => self.pipelines.contains(raw),
            AnyHandle::PipelineLayout(_) => self.pipeline_layouts.contains(raw),
            AnyHandle::DescriptorSet(_) => self.descriptor_sets.contains(raw),
            AnyHandle::DescriptorSetLayout(_) => self.set_layouts.contains(raw),
            AnyHandle::Sampler(_) => self.samplers.contains(raw),
            AnyHandle::QueryPool(_) => self.query_pools.contains(raw),
        }
    }
}

fn slice_of<T>(value: &T) -> &[T] {
    core::slice::from_ref(value)
}

#[cfg(test)]
pub(crate) mod tests {
    use core::{
        ffi::{CStr, c_char},
        mem,
    };

    use super::*;
    use crate::device::tests::physical_device;

    unsafe extern "system" fn no_proc(
        _device: vk::Device,
        _name: *const c_char,
    ) -> vk::PFN_vkVoidFunction {
        None
    }

    /// Device whose driver functions are all missing. Only table logic may run on it.
    pub(crate) fn offline_device(get_proc_addr: Option<vk::PFN_vkGetDeviceProcAddr>) -> DeviceImpl {
        let physical = physical_device(&[]);
        let plan = DevicePlan {
            graphics_family: 0,
            extensions: Vec::new(),
            features: physical.features,
            push_descriptor: false,
        };
        DeviceImpl::new(
            vk::Device::from_raw(0x1000),
            vk::PhysicalDevice::from_raw(0x2000),
            get_proc_addr.unwrap_or(no_proc),
            &physical,
            &plan,
        )
    }

    #[test]
    fn capabilities_follow_features() {
        let mut features = vk::PhysicalDeviceFeatures::default();
        assert!(capability(DeviceCaps::ComputeShader, &features, false));
        assert!(!capability(DeviceCaps::GeometryShader, &features, false));
        assert!(!capability(DeviceCaps::PartialPushDescriptorUpdates, &features, false));

        features.geometry_shader = vk::TRUE;
        features.sampler_anisotropy = vk::TRUE;
        assert!(capability(DeviceCaps::GeometryShader, &features, false));
        assert!(capability(DeviceCaps::SamplerAnisotropic, &features, false));
        assert!(capability(DeviceCaps::PartialPushDescriptorUpdates, &features, true));
    }

    #[test]
    fn tables_answer_validity() {
        let device = offline_device(None);
        let image = vk::Image::from_raw(0x30);
        let desc = ResourceDesc::texture_2d(
            16,
            16,
            1,
            Format::R8G8B8A8Unorm,
            MemoryHeap::GpuOnly,
            ResourceUsage::RENDER_TARGET,
        );
        device.resources.insert(
            image.as_raw(),
            ResourceData {
                desc,
                native: NativeResource::Image {
                    image,
                    format: vk::Format::R8G8B8A8_UNORM,
                },
                memory: vk::DeviceMemory::null(),
                owned: false,
            },
        );

        let resource = Resource::from_raw(0x30);
        assert!(device.is_valid(resource.into()));
        assert!(!device.is_valid(ResourceView::from_raw(0x30).into()));
        assert_eq!(device.get_resource_desc(resource), Some(desc));
        assert!(matches!(
            device.map_resource(resource, 0, MapAccess::ReadOnly),
            Err(Error::Unsupported(_))
        ));

        // Application resources are only forgotten
        device.destroy_resource(resource);
        assert!(!device.is_valid(resource.into()));
    }

    #[test]
    fn unknown_handles_are_rejected() {
        let device = offline_device(None);
        assert_eq!(
            device.create_resource_view(
                Resource::from_raw(0x99),
                ResourceUsage::SHADER_RESOURCE,
                &ResourceViewDesc::whole(&ResourceDesc::buffer(
                    4,
                    MemoryHeap::GpuOnly,
                    ResourceUsage::empty()
                )),
            ),
            Err(Error::InvalidHandle)
        );
        assert!(matches!(
            device.upload_buffer_region(&[0; 4], Resource::from_raw(0x99), 0),
            Err(Error::InvalidHandle)
        ));
        assert!(!device.get_query_pool_results(QueryPool::from_raw(1), 0, &mut [0]));
    }

    unsafe extern "system" fn mock_create_image_view(
        _device: vk::Device,
        _info: *const vk::ImageViewCreateInfo<'_>,
        _allocator: *const vk::AllocationCallbacks<'_>,
        view: *mut vk::ImageView,
    ) -> vk::Result {
        unsafe { *view = vk::ImageView::from_raw(0x70) };
        vk::Result::SUCCESS
    }

    unsafe extern "system" fn mock_destroy_image_view(
        _device: vk::Device,
        _view: vk::ImageView,
        _allocator: *const vk::AllocationCallbacks<'_>,
    ) {
    }

    unsafe extern "system" fn view_proc_addr(
        _device: vk::Device,
        name: *const c_char,
    ) -> vk::PFN_vkVoidFunction {
        match unsafe { CStr::from_ptr(name) }.to_bytes() {
            b"vkCreateImageView" => unsafe {
                mem::transmute::<vk::PFN_vkCreateImageView, vk::PFN_vkVoidFunction>(
                    mock_create_image_view,
                )
            },
            b"vkDestroyImageView" => unsafe {
                mem::transmute::<vk::PFN_vkDestroyImageView, vk::PFN_vkVoidFunction>(
                    mock_destroy_image_view,
                )
            },
            _ => None,
        }
    }

    #[test]
    fn image_views_record_inferred_type() {
        let device = offline_device(Some(view_proc_addr));
        let image = vk::Image::from_raw(0x40);
        let desc = ResourceDesc::texture_2d(
            8,
            8,
            1,
            Format::R8G8B8A8Unorm,
            MemoryHeap::GpuOnly,
            ResourceUsage::SHADER_RESOURCE,
        );
        device.resources.insert(
            image.as_raw(),
            ResourceData {
                desc,
                native: NativeResource::Image {
                    image,
                    format: vk::Format::R8G8B8A8_UNORM,
                },
                memory: vk::DeviceMemory::null(),
                owned: false,
            },
        );

        let view = device
            .create_resource_view(
                Resource::from_raw(0x40),
                ResourceUsage::SHADER_RESOURCE,
                &ResourceViewDesc {
                    ty: ResourceViewType::Unknown,
                    ..ResourceViewDesc::whole(&desc)
                },
            )
            .unwrap();
        assert_eq!(
            device.views.with(view.raw(), |data| data.desc.ty),
            Some(ResourceViewType::Texture2d)
        );
        assert_eq!(device.get_resource_from_view(view), Some(Resource::from_raw(0x40)));

        device.destroy_resource_view(view);
        assert!(!device.is_valid(view.into()));
    }

    #[test]
    fn blend_constant_unpacks_rgba() {
        assert_eq!(unpack_color(0xff00_00ff), [1.0, 0.0, 0.0, 1.0]);
    }
}
