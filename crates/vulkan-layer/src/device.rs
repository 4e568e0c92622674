pub mod command;
pub mod command_list;
pub mod device_impl;
pub mod queue;
pub mod render_pass;
pub mod resource;
pub mod swapchain;

use core::{
    ffi::{CStr, c_char, c_void},
    ptr::NonNull,
    slice,
};
use std::sync::Arc;

use ash::{
    khr,
    vk::{self, BaseInStructure, Handle},
};
use once_cell::sync::Lazy;
use tint::map::IntDashMap;
use tint_event::Event;
use tracing::{debug, error, trace, warn};

use super::{proc_table, resolve_proc};
use crate::instance::{PhysicalDeviceData, get_physical_device_data};

pub use command_list::CommandListImpl;
pub use device_impl::DeviceImpl;
pub use queue::CommandQueueImpl;

/// Devices the layer manages.
static DEVICE_MAP: Lazy<IntDashMap<u64, Arc<DeviceImpl>>> = Lazy::new(IntDashMap::default);

/// Devices the layer only forwards, with the next layer's `vkGetDeviceProcAddr`.
static PASSTHROUGH_MAP: Lazy<IntDashMap<u64, vk::PFN_vkGetDeviceProcAddr>> =
    Lazy::new(IntDashMap::default);

#[inline]
pub(crate) fn get_device(device: vk::Device) -> Option<Arc<DeviceImpl>> {
    DEVICE_MAP.get(&device.as_raw()).map(|device| device.clone())
}

/// Layer's implementation of `vkGetDeviceProcAddr`.
#[tracing::instrument(skip(name))]
pub(super) extern "system" fn get_proc_addr(
    device: vk::Device,
    name: *const c_char,
) -> vk::PFN_vkVoidFunction {
    let name_str = unsafe { CStr::from_ptr(name) }.to_string_lossy();
    trace!("vkGetDeviceProcAddr called name: {}", name_str);

    unsafe {
        proc_table!(&*name_str => {
            "vkGetDeviceProcAddr" => get_proc_addr: vk::PFN_vkGetDeviceProcAddr,
            "vkDestroyDevice" => destroy_device: vk::PFN_vkDestroyDevice,
        });
    }

    if let Some(next) = PASSTHROUGH_MAP.get(&device.as_raw()).map(|next| *next) {
        return unsafe { next(device, name) };
    }

    if let Some(func) = intercepted_proc(&name_str) {
        return Some(func);
    }

    let next = DEVICE_MAP.get(&device.as_raw())?.get_proc_addr;
    unsafe { next(device, name) }
}

/// Layer hook for a device level function name, if the layer intercepts it.
fn intercepted_proc(name: &str) -> vk::PFN_vkVoidFunction {
    unsafe {
        proc_table!(name => {
            "vkCreateSwapchainKHR" => swapchain::create_swapchain: vk::PFN_vkCreateSwapchainKHR,
            "vkDestroySwapchainKHR" => swapchain::destroy_swapchain: vk::PFN_vkDestroySwapchainKHR,
            "vkQueueSubmit" => queue::queue_submit: vk::PFN_vkQueueSubmit,
            "vkQueuePresentKHR" => queue::queue_present: vk::PFN_vkQueuePresentKHR,

            "vkCreateBuffer" => resource::create_buffer: vk::PFN_vkCreateBuffer,
            "vkDestroyBuffer" => resource::destroy_buffer: vk::PFN_vkDestroyBuffer,
            "vkCreateBufferView" => resource::create_buffer_view: vk::PFN_vkCreateBufferView,
            "vkDestroyBufferView" => resource::destroy_buffer_view: vk::PFN_vkDestroyBufferView,
            "vkCreateImage" => resource::create_image: vk::PFN_vkCreateImage,
            "vkDestroyImage" => resource::destroy_image: vk::PFN_vkDestroyImage,
            "vkCreateImageView" => resource::create_image_view: vk::PFN_vkCreateImageView,
            "vkDestroyImageView" => resource::destroy_image_view: vk::PFN_vkDestroyImageView,
            "vkCreateSampler" => resource::create_sampler: vk::PFN_vkCreateSampler,
            "vkDestroySampler" => resource::destroy_sampler: vk::PFN_vkDestroySampler,
            "vkCreateShaderModule" => resource::create_shader_module: vk::PFN_vkCreateShaderModule,
            "vkDestroyShaderModule" => resource::destroy_shader_module: vk::PFN_vkDestroyShaderModule,
            "vkCreateGraphicsPipelines" => resource::create_graphics_pipelines: vk::PFN_vkCreateGraphicsPipelines,
            "vkCreateComputePipelines" => resource::create_compute_pipelines: vk::PFN_vkCreateComputePipelines,
            "vkDestroyPipeline" => resource::destroy_pipeline: vk::PFN_vkDestroyPipeline,

            "vkCreateRenderPass" => render_pass::create_render_pass: vk::PFN_vkCreateRenderPass,
            "vkCreateRenderPass2" => render_pass::create_render_pass2: vk::PFN_vkCreateRenderPass2,
            "vkCreateRenderPass2KHR" => render_pass::create_render_pass2: vk::PFN_vkCreateRenderPass2,
            "vkDestroyRenderPass" => render_pass::destroy_render_pass: vk::PFN_vkDestroyRenderPass,
            "vkCreateFramebuffer" => render_pass::create_framebuffer: vk::PFN_vkCreateFramebuffer,
            "vkDestroyFramebuffer" => render_pass::destroy_framebuffer: vk::PFN_vkDestroyFramebuffer,

            "vkAllocateCommandBuffers" => command::allocate_command_buffers: vk::PFN_vkAllocateCommandBuffers,
            "vkFreeCommandBuffers" => command::free_command_buffers: vk::PFN_vkFreeCommandBuffers,
            "vkDestroyCommandPool" => command::destroy_command_pool: vk::PFN_vkDestroyCommandPool,
            "vkBeginCommandBuffer" => command::begin_command_buffer: vk::PFN_vkBeginCommandBuffer,
            "vkCmdBindPipeline" => command::cmd_bind_pipeline: vk::PFN_vkCmdBindPipeline,
            "vkCmdSetViewport" => command::cmd_set_viewport: vk::PFN_vkCmdSetViewport,
            "vkCmdSetScissor" => command::cmd_set_scissor: vk::PFN_vkCmdSetScissor,
            "vkCmdSetDepthBias" => command::cmd_set_depth_bias: vk::PFN_vkCmdSetDepthBias,
            "vkCmdSetBlendConstants" => command::cmd_set_blend_constants: vk::PFN_vkCmdSetBlendConstants,
            "vkCmdSetStencilCompareMask" => command::cmd_set_stencil_compare_mask: vk::PFN_vkCmdSetStencilCompareMask,
            "vkCmdSetStencilWriteMask" => command::cmd_set_stencil_write_mask: vk::PFN_vkCmdSetStencilWriteMask,
            "vkCmdSetStencilReference" => command::cmd_set_stencil_reference: vk::PFN_vkCmdSetStencilReference,
            "vkCmdBindDescriptorSets" => command::cmd_bind_descriptor_sets: vk::PFN_vkCmdBindDescriptorSets,
            "vkCmdBindIndexBuffer" => command::cmd_bind_index_buffer: vk::PFN_vkCmdBindIndexBuffer,
            "vkCmdBindVertexBuffers" => command::cmd_bind_vertex_buffers: vk::PFN_vkCmdBindVertexBuffers,
            "vkCmdDraw" => command::cmd_draw: vk::PFN_vkCmdDraw,
            "vkCmdDrawIndexed" => command::cmd_draw_indexed: vk::PFN_vkCmdDrawIndexed,
            "vkCmdDrawIndirect" => command::cmd_draw_indirect: vk::PFN_vkCmdDrawIndirect,
            "vkCmdDrawIndexedIndirect" => command::cmd_draw_indexed_indirect: vk::PFN_vkCmdDrawIndexedIndirect,
            "vkCmdDispatch" => command::cmd_dispatch: vk::PFN_vkCmdDispatch,
            "vkCmdDispatchIndirect" => command::cmd_dispatch_indirect: vk::PFN_vkCmdDispatchIndirect,
            "vkCmdCopyBuffer" => command::cmd_copy_buffer: vk::PFN_vkCmdCopyBuffer,
            "vkCmdCopyImage" => command::cmd_copy_image: vk::PFN_vkCmdCopyImage,
            "vkCmdBlitImage" => command::cmd_blit_image: vk::PFN_vkCmdBlitImage,
            "vkCmdCopyBufferToImage" => command::cmd_copy_buffer_to_image: vk::PFN_vkCmdCopyBufferToImage,
            "vkCmdCopyImageToBuffer" => command::cmd_copy_image_to_buffer: vk::PFN_vkCmdCopyImageToBuffer,
            "vkCmdClearColorImage" => command::cmd_clear_color_image: vk::PFN_vkCmdClearColorImage,
            "vkCmdClearDepthStencilImage" => command::cmd_clear_depth_stencil_image: vk::PFN_vkCmdClearDepthStencilImage,
            "vkCmdClearAttachments" => command::cmd_clear_attachments: vk::PFN_vkCmdClearAttachments,
            "vkCmdResolveImage" => command::cmd_resolve_image: vk::PFN_vkCmdResolveImage,
            "vkCmdPushConstants" => command::cmd_push_constants: vk::PFN_vkCmdPushConstants,
            "vkCmdBeginRenderPass" => command::cmd_begin_render_pass: vk::PFN_vkCmdBeginRenderPass,
            "vkCmdNextSubpass" => command::cmd_next_subpass: vk::PFN_vkCmdNextSubpass,
            "vkCmdEndRenderPass" => command::cmd_end_render_pass: vk::PFN_vkCmdEndRenderPass,
            "vkCmdExecuteCommands" => command::cmd_execute_commands: vk::PFN_vkCmdExecuteCommands,
        });
    }

    None
}

/// How a device gets created when the layer manages it.
#[derive(Debug, Clone)]
pub(crate) struct DevicePlan {
    pub graphics_family: u32,
    pub extensions: Vec<*const c_char>,
    pub features: vk::PhysicalDeviceFeatures,
    pub push_descriptor: bool,
}

/// Decide how to patch a device creation, or why the device stays passthrough.
pub(crate) fn plan_device(
    info: &vk::DeviceCreateInfo<'_>,
    physical: &PhysicalDeviceData,
) -> Result<DevicePlan, &'static str> {
    let extensions: Vec<*const c_char> = if info.pp_enabled_extension_names.is_null() {
        Vec::new()
    } else {
        unsafe {
            slice::from_raw_parts(
                info.pp_enabled_extension_names,
                info.enabled_extension_count as usize,
            )
        }
        .to_vec()
    };
    let enabled = |name: &CStr| {
        extensions
            .iter()
            .any(|&ext| unsafe { CStr::from_ptr(ext) } == name)
    };

    if !enabled(khr::swapchain::NAME) {
        return Err("VK_KHR_swapchain is not enabled");
    }

    let queue_infos = if info.p_queue_create_infos.is_null() {
        &[][..]
    } else {
        unsafe {
            slice::from_raw_parts(
                info.p_queue_create_infos,
                info.queue_create_info_count as usize,
            )
        }
    };
    let Some(graphics_family) = queue_infos
        .iter()
        .find(|queue| {
            queue.queue_count > 0
                && physical
                    .queue_families
                    .get(queue.queue_family_index as usize)
                    .is_some_and(|family| family.queue_flags.contains(vk::QueueFlags::GRAPHICS))
        })
        .map(|queue| queue.queue_family_index)
    else {
        return Err("no graphics queue requested");
    };

    let mut plan = DevicePlan {
        graphics_family,
        extensions: extensions.clone(),
        features: if info.p_enabled_features.is_null() {
            vk::PhysicalDeviceFeatures::default()
        } else {
            unsafe { *info.p_enabled_features }
        },
        push_descriptor: false,
    };

    for required in [khr::image_format_list::NAME, khr::swapchain_mutable_format::NAME] {
        if !physical.supports_extension(required) {
            return Err("required extension is not supported");
        }
        if !enabled(required) {
            plan.extensions.push(required.as_ptr());
        }
    }

    if physical.supports_extension(khr::push_descriptor::NAME) {
        plan.push_descriptor = true;
        if !enabled(khr::push_descriptor::NAME) {
            plan.extensions.push(khr::push_descriptor::NAME.as_ptr());
        }
    }

    force_features(&mut plan.features, &physical.features);
    Ok(plan)
}

/// Turn on the features effect shaders rely on, when the hardware has them.
fn force_features(features: &mut vk::PhysicalDeviceFeatures, supported: &vk::PhysicalDeviceFeatures) {
    features.shader_image_gather_extended |= supported.shader_image_gather_extended;
    features.shader_storage_image_write_without_format |=
        supported.shader_storage_image_write_without_format;
}

/// Implementation of layer's `vkCreateDevice`.
#[tracing::instrument]
pub(super) extern "system" fn create_device(
    ph_device: vk::PhysicalDevice,
    info: *const vk::DeviceCreateInfo,
    callback: *const vk::AllocationCallbacks,
    device: *mut vk::Device,
) -> vk::Result {
    trace!("vkCreateDevice called");

    let Some(layer_create_info) =
        (unsafe { get_layer_link_info(info).map(|mut info| info.as_mut()) })
    else {
        return vk::Result::ERROR_INITIALIZATION_FAILED;
    };
    let link = unsafe { &*{ layer_create_info.u.p_layer_info } };
    // Move chain info for next layer
    layer_create_info.u.p_layer_info = unsafe { (*layer_create_info.u.p_layer_info).p_next };

    let Some(next_get_instance_proc_addr) = link.pfn_next_get_instance_proc_addr else {
        return vk::Result::ERROR_INITIALIZATION_FAILED;
    };
    let Some(next_get_device_proc_addr) = link.pfn_next_get_device_proc_addr else {
        return vk::Result::ERROR_INITIALIZATION_FAILED;
    };

    let Some(create_device) = (unsafe {
        resolve_proc!(next_get_instance_proc_addr =>
            vk::Instance::null(),
            c"vkCreateDevice": vk::PFN_vkCreateDevice
        )
    }) else {
        return vk::Result::ERROR_INITIALIZATION_FAILED;
    };

    let Some(create_info) = (unsafe { info.as_ref() }) else {
        return vk::Result::ERROR_INITIALIZATION_FAILED;
    };

    let plan = match get_physical_device_data(ph_device) {
        Some(_) if !tint::config().hooks.vulkan => Err("vulkan hooks are disabled"),
        Some(physical) => plan_device(create_info, &physical).map(|plan| (plan, physical)),
        None => Err("unknown physical device"),
    };

    let (mut plan, physical) = match plan {
        Ok(plan) => plan,
        Err(reason) => {
            warn!("device is passthrough: {reason}");
            let res = unsafe { create_device(ph_device, info, callback, device) };
            if res == vk::Result::SUCCESS {
                PASSTHROUGH_MAP.insert(unsafe { *device }.as_raw(), next_get_device_proc_addr);
            }
            return res;
        }
    };

    let mut patched = *create_info;
    patched.enabled_extension_count = plan.extensions.len() as u32;
    patched.pp_enabled_extension_names = plan.extensions.as_ptr();
    if !create_info.p_enabled_features.is_null() {
        patched.p_enabled_features = &plan.features;
    } else if let Some(mut features2) = unsafe {
        find_in_chain::<vk::PhysicalDeviceFeatures2>(
            create_info.p_next,
            vk::StructureType::PHYSICAL_DEVICE_FEATURES_2,
        )
    } {
        let features2 = unsafe { features2.as_mut() };
        force_features(&mut features2.features, &physical.features);
        plan.features = features2.features;
    } else {
        patched.p_enabled_features = &plan.features;
    }

    let res = unsafe { create_device(ph_device, &patched, callback, device) };
    if res != vk::Result::SUCCESS {
        error!("vkCreateDevice failed with patched create info. res: {res:?}");
        return res;
    }

    debug!("initializing device tables");
    let device = unsafe { *device };
    let device_impl = Arc::new(DeviceImpl::new(
        device,
        ph_device,
        next_get_device_proc_addr,
        &physical,
        &plan,
    ));

    let Some(get_device_queue) = (unsafe {
        resolve_proc!(next_get_device_proc_addr =>
            device,
            c"vkGetDeviceQueue": vk::PFN_vkGetDeviceQueue
        )
    }) else {
        return vk::Result::ERROR_INITIALIZATION_FAILED;
    };

    let queue_infos = unsafe {
        slice::from_raw_parts(
            create_info.p_queue_create_infos,
            create_info.queue_create_info_count as usize,
        )
    };

    DEVICE_MAP.insert(device.as_raw(), device_impl.clone());
    let registry = tint::registry();
    registry.dispatch(&mut Event::InitDevice {
        device: &*device_impl,
    });

    for queue_info in queue_infos {
        // Protected queues can only be fetched through vkGetDeviceQueue2
        if queue_info.flags.contains(vk::DeviceQueueCreateFlags::PROTECTED) {
            continue;
        }

        let family = physical
            .queue_families
            .get(queue_info.queue_family_index as usize)
            .map(|family| family.queue_flags)
            .unwrap_or_default();

        for i in 0..queue_info.queue_count {
            let mut queue = vk::Queue::null();
            unsafe { get_device_queue(device, queue_info.queue_family_index, i, &mut queue) };
            if queue.is_null() {
                continue;
            }

            debug!(
                "found queue: {:?} family_index: {} index: {}",
                queue, queue_info.queue_family_index, i
            );
            let queue_impl = Arc::new(CommandQueueImpl::new(
                device_impl.clone(),
                queue,
                queue_info.queue_family_index,
                family,
            ));
            if queue_info.queue_family_index == plan.graphics_family {
                device_impl.set_graphics_queue(&queue_impl);
            }
            registry.dispatch(&mut Event::InitCommandQueue { queue: &*queue_impl });
            queue::register_queue(queue_impl);
        }
    }

    vk::Result::SUCCESS
}

/// Implementation of layer's `vkDestroyDevice`.
#[tracing::instrument]
extern "system" fn destroy_device(
    device: vk::Device,
    allocator: *const vk::AllocationCallbacks<'_>,
) {
    trace!("vkDestroyDevice called");

    if let Some((_, next)) = PASSTHROUGH_MAP.remove(&device.as_raw()) {
        if let Some(destroy_device) = unsafe {
            resolve_proc!(next => device, c"vkDestroyDevice": vk::PFN_vkDestroyDevice)
        } {
            unsafe { destroy_device(device, allocator) };
        }
        return;
    }

    let Some((_, device_impl)) = DEVICE_MAP.remove(&device.as_raw()) else {
        return;
    };

    debug!("device tables cleanup");
    let registry = tint::registry();
    swapchain::destroy_device_swapchains(registry, &device_impl);
    command::destroy_device_command_lists(registry, &device_impl);
    for queue in queue::unregister_device_queues(device) {
        registry.dispatch(&mut Event::DestroyCommandQueue { queue: &*queue });
        queue.destroy();
    }

    registry.dispatch(&mut Event::DestroyDevice {
        device: &*device_impl,
    });
    device_impl.destroy_internal_objects();

    unsafe { (device_impl.fp.fp_v1_0().destroy_device)(device, allocator) }
}

/// First structure of type `s_type` in a `p_next` chain.
pub(crate) unsafe fn find_in_chain<T>(
    mut next: *const c_void,
    s_type: vk::StructureType,
) -> Option<NonNull<T>> {
    while let Some(base) = NonNull::new(next.cast::<BaseInStructure>().cast_mut()) {
        if unsafe { base.as_ref() }.s_type == s_type {
            return Some(base.cast());
        }
        next = unsafe { base.as_ref() }.p_next.cast();
    }

    None
}

/// Vulkan structure for layer device link info.
#[repr(C)]
#[derive(Copy, Clone)]
struct VkLayerDeviceLink {
    /// Pointer to next layer's `VkLayerDeviceLink`.
    pub p_next: *mut VkLayerDeviceLink,

    /// Function pointer to next layer's `vkGetInstanceProcAddr`.
    pub pfn_next_get_instance_proc_addr: Option<vk::PFN_vkGetInstanceProcAddr>,

    /// Function pointer to next layer's `vkGetDeviceProcAddr`.
    pub pfn_next_get_device_proc_addr: Option<vk::PFN_vkGetDeviceProcAddr>,
}

#[repr(C)]
#[derive(Copy, Clone)]
union LayerDeviceCreateInfoUnion {
    pub p_layer_info: *mut VkLayerDeviceLink,
}

/// Vulkan structure for layer device create info.
#[repr(C)]
#[derive(Copy, Clone)]
struct LayerDeviceCreateInfo {
    /// Structure type, which is [`vk::StructureType::LOADER_DEVICE_CREATE_INFO`].
    pub s_type: vk::StructureType,
    pub p_next: *mut c_void,

    /// `0` for the link info entry.
    pub function: i32,
    pub u: LayerDeviceCreateInfoUnion,
}

unsafe fn get_layer_link_info(
    device_create_info: *const vk::DeviceCreateInfo,
) -> Option<NonNull<LayerDeviceCreateInfo>> {
    const VK_LAYER_LINK_INFO: i32 = 0;

    let mut layer_create_info: NonNull<BaseInStructure> =
        NonNull::new(device_create_info.cast::<BaseInStructure>().cast_mut())?;
    loop {
        layer_create_info = NonNull::new(
            unsafe { layer_create_info.as_ref() }
                .p_next
                .cast::<BaseInStructure>()
                .cast_mut(),
        )?;

        if unsafe { layer_create_info.as_ref() }.s_type
            == vk::StructureType::LOADER_DEVICE_CREATE_INFO
        {
            let layer_create_info = layer_create_info.cast::<LayerDeviceCreateInfo>();
            if unsafe { layer_create_info.as_ref() }.function == VK_LAYER_LINK_INFO {
                return Some(layer_create_info);
            }
        }
    }
}

/// Optional device functions resolved by name, `None` when the driver lacks them.
#[derive(Clone, Copy, Default)]
pub(crate) struct OptionalFns {
    pub create_render_pass2: Option<vk::PFN_vkCreateRenderPass2>,
    pub cmd_push_descriptor_set: Option<vk::PFN_vkCmdPushDescriptorSetKHR>,
    pub set_debug_utils_object_name: Option<vk::PFN_vkSetDebugUtilsObjectNameEXT>,
    pub cmd_begin_debug_utils_label: Option<vk::PFN_vkCmdBeginDebugUtilsLabelEXT>,
    pub cmd_end_debug_utils_label: Option<vk::PFN_vkCmdEndDebugUtilsLabelEXT>,
    pub cmd_insert_debug_utils_label: Option<vk::PFN_vkCmdInsertDebugUtilsLabelEXT>,
}

impl OptionalFns {
    pub(crate) fn load(
        get_proc_addr: vk::PFN_vkGetDeviceProcAddr,
        device: vk::Device,
        push_descriptor: bool,
    ) -> Self {
        macro_rules! proc {
            ($name:literal : $ty:ty) => {
                unsafe { resolve_proc!(get_proc_addr => device, $name : $ty) }
            };
        }

        let create_render_pass2 = proc!(c"vkCreateRenderPass2": vk::PFN_vkCreateRenderPass2)
            .or(proc!(c"vkCreateRenderPass2KHR": vk::PFN_vkCreateRenderPass2));

        Self {
            create_render_pass2,
            cmd_push_descriptor_set: if push_descriptor {
                proc!(c"vkCmdPushDescriptorSetKHR": vk::PFN_vkCmdPushDescriptorSetKHR)
            } else {
                None
            },
            set_debug_utils_object_name: proc!(
                c"vkSetDebugUtilsObjectNameEXT": vk::PFN_vkSetDebugUtilsObjectNameEXT
            ),
            cmd_begin_debug_utils_label: proc!(
                c"vkCmdBeginDebugUtilsLabelEXT": vk::PFN_vkCmdBeginDebugUtilsLabelEXT
            ),
            cmd_end_debug_utils_label: proc!(
                c"vkCmdEndDebugUtilsLabelEXT": vk::PFN_vkCmdEndDebugUtilsLabelEXT
            ),
            cmd_insert_debug_utils_label: proc!(
                c"vkCmdInsertDebugUtilsLabelEXT": vk::PFN_vkCmdInsertDebugUtilsLabelEXT
            ),
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use core::ptr;
    use std::ffi::CString;

    use ash::Instance;

    use super::*;

    pub(crate) fn physical_device(extensions: &[&CStr]) -> PhysicalDeviceData {
        PhysicalDeviceData {
            instance: unsafe { Instance::load_with(|_| ptr::null(), vk::Instance::null()) },
            api_version: vk::API_VERSION_1_1,
            memory_properties: vk::PhysicalDeviceMemoryProperties::default(),
            features: vk::PhysicalDeviceFeatures {
                shader_image_gather_extended: vk::TRUE,
                shader_storage_image_write_without_format: vk::TRUE,
                ..Default::default()
            },
            queue_families: vec![
                vk::QueueFamilyProperties {
                    queue_flags: vk::QueueFlags::TRANSFER,
                    queue_count: 1,
                    ..Default::default()
                },
                vk::QueueFamilyProperties {
                    queue_flags: vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE,
                    queue_count: 4,
                    ..Default::default()
                },
            ],
            extensions: extensions.iter().map(|&ext| CString::from(ext)).collect(),
        }
    }

    fn queue_info(family: u32) -> vk::DeviceQueueCreateInfo<'static> {
        static PRIORITY: [f32; 1] = [1.0];
        vk::DeviceQueueCreateInfo::default()
            .queue_family_index(family)
            .queue_priorities(&PRIORITY)
    }

    #[test]
    fn plan_patches_extensions_and_features() {
        let physical = physical_device(&[
            khr::swapchain::NAME,
            khr::image_format_list::NAME,
            khr::swapchain_mutable_format::NAME,
            khr::push_descriptor::NAME,
        ]);
        let queues = [queue_info(0), queue_info(1)];
        let extensions = [khr::swapchain::NAME.as_ptr()];
        let info = vk::DeviceCreateInfo::default()
            .queue_create_infos(&queues)
            .enabled_extension_names(&extensions);

        let plan = plan_device(&info, &physical).unwrap();
        assert_eq!(plan.graphics_family, 1);
        assert!(plan.push_descriptor);
        assert_eq!(plan.extensions.len(), 4);
        assert_eq!(plan.features.shader_image_gather_extended, vk::TRUE);
        assert_eq!(plan.features.shader_storage_image_write_without_format, vk::TRUE);
    }

    #[test]
    fn plan_rejects_unfit_devices() {
        let physical = physical_device(&[khr::swapchain::NAME, khr::image_format_list::NAME]);
        let queues = [queue_info(1)];
        let extensions = [khr::swapchain::NAME.as_ptr()];

        let no_swapchain = vk::DeviceCreateInfo::default().queue_create_infos(&queues);
        assert!(plan_device(&no_swapchain, &physical).is_err());

        let compute_only = [queue_info(0)];
        let info = vk::DeviceCreateInfo::default()
            .queue_create_infos(&compute_only)
            .enabled_extension_names(&extensions);
        assert!(plan_device(&info, &physical).is_err());

        // Missing VK_KHR_swapchain_mutable_format
        let info = vk::DeviceCreateInfo::default()
            .queue_create_infos(&queues)
            .enabled_extension_names(&extensions);
        assert!(plan_device(&info, &physical).is_err());
    }

    #[test]
    fn chain_lookup() {
        let mut features2 = vk::PhysicalDeviceFeatures2::default();
        let info = vk::DeviceCreateInfo::default().push_next(&mut features2);
        let found = unsafe {
            find_in_chain::<vk::PhysicalDeviceFeatures2>(
                info.p_next,
                vk::StructureType::PHYSICAL_DEVICE_FEATURES_2,
            )
        };
        assert!(found.is_some());
        assert!(
            unsafe {
                find_in_chain::<vk::PhysicalDeviceFeatures2>(
                    info.p_next,
                    vk::StructureType::PHYSICAL_DEVICE_VULKAN_1_1_FEATURES,
                )
            }
            .is_none()
        );
    }
}
