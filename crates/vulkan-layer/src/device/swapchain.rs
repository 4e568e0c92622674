//! Swapchain creation patching and back buffer registration.

use core::ptr;
use std::sync::Arc;

use ash::vk::{self, Handle};
use once_cell::sync::Lazy;
use tint::{
    map::IntDashMap,
    runtime::{EffectRuntime, compiler::ShaderFormat},
};
use tint_api::{CommandQueue, Device, Resource};
use tint_event::{Event, Registry};
use tracing::{debug, error, trace};

use super::{
    DeviceImpl,
    device_impl::{NativeResource, ResourceData},
    find_in_chain, get_device,
    render_pass::raw_slice,
};
use crate::conv;

pub(crate) struct SwapchainData {
    device: vk::Device,
    /// Back buffers, registered as resources the layer doesn't own.
    resources: Vec<Resource>,
    runtime: Option<Arc<EffectRuntime>>,
}

static SWAPCHAIN_MAP: Lazy<IntDashMap<u64, SwapchainData>> = Lazy::new(IntDashMap::default);

pub(crate) fn get_runtime(swapchain: vk::SwapchainKHR) -> Option<Arc<EffectRuntime>> {
    SWAPCHAIN_MAP
        .get(&swapchain.as_raw())
        .and_then(|data| data.runtime.clone())
}

/// View formats the swapchain images must support: the linear and sRGB variant of `format`
/// followed by the application's own list, without duplicates.
pub(crate) fn build_format_list(format: vk::Format, app_formats: &[vk::Format]) -> Vec<vk::Format> {
    let unified = conv::unmap_format(format);
    let mut formats = vec![
        conv::map_format(unified.default_typed()),
        conv::map_format(unified.default_typed_srgb()),
    ];
    formats.extend_from_slice(app_formats);

    let mut list: Vec<vk::Format> = Vec::with_capacity(formats.len());
    for format in formats {
        if format != vk::Format::UNDEFINED && !list.contains(&format) {
            list.push(format);
        }
    }
    list
}

/// Whether the default typed format of `format` differs from its sRGB variant.
fn is_mutable_format(format: vk::Format) -> bool {
    let unified = conv::unmap_format(format);
    let srgb = conv::map_format(unified.default_typed_srgb());
    srgb != vk::Format::UNDEFINED && conv::map_format(unified.default_typed()) != srgb
}

/// Adds `family` to a concurrent sharing family list.
fn with_family(families: &[u32], family: u32) -> Vec<u32> {
    let mut families = families.to_vec();
    if !families.contains(&family) {
        families.push(family);
    }
    families
}

#[tracing::instrument]
pub(super) extern "system" fn create_swapchain(
    device: vk::Device,
    info: *const vk::SwapchainCreateInfoKHR<'_>,
    allocator: *const vk::AllocationCallbacks<'_>,
    swapchain: *mut vk::SwapchainKHR,
) -> vk::Result {
    trace!("vkCreateSwapchainKHR called");

    let Some(device) = get_device(device) else {
        return vk::Result::ERROR_INITIALIZATION_FAILED;
    };
    let Some(info) = (unsafe { info.as_ref() }) else {
        return vk::Result::ERROR_INITIALIZATION_FAILED;
    };

    create_swapchain_impl(tint::registry(), &device, info, allocator, swapchain)
}

pub(crate) fn create_swapchain_impl(
    registry: &Registry,
    device: &Arc<DeviceImpl>,
    info: &vk::SwapchainCreateInfoKHR<'_>,
    allocator: *const vk::AllocationCallbacks<'_>,
    swapchain: *mut vk::SwapchainKHR,
) -> vk::Result {
    if !info.old_swapchain.is_null() {
        cleanup_swapchain(registry, device, info.old_swapchain);
    }

    let app_list = unsafe {
        find_in_chain::<vk::ImageFormatListCreateInfo<'_>>(
            info.p_next,
            vk::StructureType::IMAGE_FORMAT_LIST_CREATE_INFO,
        )
    };
    let app_formats = app_list
        .map(|list| unsafe {
            let list = list.as_ref();
            raw_slice(list.p_view_formats, list.view_format_count)
        })
        .unwrap_or_default();
    let mutable = is_mutable_format(info.image_format);
    let formats = build_format_list(info.image_format, app_formats);

    let mut patched = *info;
    patched.image_usage |= vk::ImageUsageFlags::TRANSFER_SRC;

    let families;
    if info.image_sharing_mode == vk::SharingMode::CONCURRENT {
        families = with_family(
            unsafe { raw_slice(info.p_queue_family_indices, info.queue_family_index_count) },
            device.graphics_family,
        );
        patched.queue_family_index_count = families.len() as u32;
        patched.p_queue_family_indices = families.as_ptr();
    }

    let mut format_list = vk::ImageFormatListCreateInfo::default().view_formats(&formats);
    // The application's list is swapped for the merged one during the call
    let mut restore = None;
    if mutable {
        patched.flags |= vk::SwapchainCreateFlagsKHR::MUTABLE_FORMAT;
    }
    if mutable || app_list.is_some() {
        match app_list {
            Some(mut list) => {
                let list = unsafe { list.as_mut() };
                restore = Some((list.view_format_count, list.p_view_formats));
                list.view_format_count = formats.len() as u32;
                list.p_view_formats = formats.as_ptr();
            }
            None => {
                format_list.p_next = patched.p_next;
                patched.p_next = ptr::from_ref(&format_list).cast();
            }
        }
    }

    let res = unsafe {
        (device.swapchain_fn.create_swapchain_khr)(device.handle, &patched, allocator, swapchain)
    };
    if let (Some(mut list), Some((count, formats))) = (app_list, restore) {
        let list = unsafe { list.as_mut() };
        list.view_format_count = count;
        list.p_view_formats = formats;
    }
    if res != vk::Result::SUCCESS {
        return res;
    }

    let swapchain = unsafe { *swapchain };
    let images = match swapchain_images(device, swapchain) {
        Ok(images) => images,
        Err(err) => {
            error!("failed to get swapchain images. err: {err:?}");
            return vk::Result::SUCCESS;
        }
    };

    let image_info = vk::ImageCreateInfo::default()
        .image_type(vk::ImageType::TYPE_2D)
        .format(patched.image_format)
        .extent(vk::Extent3D {
            width: patched.image_extent.width,
            height: patched.image_extent.height,
            depth: 1,
        })
        .mip_levels(1)
        .array_layers(patched.image_array_layers)
        .samples(vk::SampleCountFlags::TYPE_1)
        .usage(patched.image_usage);
    let desc = conv::unmap_image_info(&image_info);

    let resources: Vec<Resource> = images
        .iter()
        .map(|&image| {
            device.resources.insert(
                image.as_raw(),
                ResourceData {
                    desc,
                    native: NativeResource::Image {
                        image,
                        format: patched.image_format,
                    },
                    memory: vk::DeviceMemory::null(),
                    owned: false,
                },
            );
            Resource::from_raw(image.as_raw())
        })
        .collect();

    debug!(
        "swapchain {:?} created with {} images of {:?}",
        swapchain,
        images.len(),
        desc.format
    );
    registry.dispatch(&mut Event::InitSwapchain {
        device: &**device,
        swapchain: swapchain.as_raw(),
    });
    if !info.old_swapchain.is_null() {
        registry.dispatch(&mut Event::Resize {
            swapchain: swapchain.as_raw(),
            width: patched.image_extent.width,
            height: patched.image_extent.height,
        });
    }

    let runtime = create_runtime(registry, device, swapchain, &resources);
    SWAPCHAIN_MAP.insert(
        swapchain.as_raw(),
        SwapchainData {
            device: device.handle,
            resources,
            runtime,
        },
    );

    vk::Result::SUCCESS
}

fn swapchain_images(device: &DeviceImpl, swapchain: vk::SwapchainKHR) -> ash::prelude::VkResult<Vec<vk::Image>> {
    let get_images = device.swapchain_fn.get_swapchain_images_khr;
    let mut count = 0;
    unsafe { get_images(device.handle, swapchain, &mut count, ptr::null_mut()) }.result()?;

    let mut images = vec![vk::Image::null(); count as usize];
    unsafe { get_images(device.handle, swapchain, &mut count, images.as_mut_ptr()) }.result()?;
    images.truncate(count as usize);
    Ok(images)
}

fn create_runtime(
    registry: &Registry,
    device: &Arc<DeviceImpl>,
    swapchain: vk::SwapchainKHR,
    back_buffers: &[Resource],
) -> Option<Arc<EffectRuntime>> {
    let queue = device.graphics_queue()?;
    let runtime = EffectRuntime::new(
        swapchain.as_raw(),
        device.clone() as Arc<dyn Device>,
        queue as Arc<dyn CommandQueue>,
        tint::effect_compiler(),
        ShaderFormat::SpirV,
        &tint::config().effects,
    );

    match runtime.on_init(registry, back_buffers) {
        Ok(()) => Some(Arc::new(runtime)),
        Err(err) => {
            error!("effect runtime initialization failed. err: {err:?}");
            None
        }
    }
}

#[tracing::instrument]
pub(super) extern "system" fn destroy_swapchain(
    device: vk::Device,
    swapchain: vk::SwapchainKHR,
    allocator: *const vk::AllocationCallbacks<'_>,
) {
    trace!("vkDestroySwapchainKHR called");

    let Some(device) = get_device(device) else {
        return;
    };
    cleanup_swapchain(tint::registry(), &device, swapchain);

    unsafe { (device.swapchain_fn.destroy_swapchain_khr)(device.handle, swapchain, allocator) }
}

/// Releases everything the layer tracks for a swapchain about to go away.
fn cleanup_swapchain(registry: &Registry, device: &DeviceImpl, swapchain: vk::SwapchainKHR) {
    let Some((_, data)) = SWAPCHAIN_MAP.remove(&swapchain.as_raw()) else {
        return;
    };

    debug!("swapchain {:?} cleanup", swapchain);
    if let Some(runtime) = data.runtime {
        runtime.on_reset(registry);
    }
    registry.dispatch(&mut Event::DestroySwapchain {
        device,
        swapchain: swapchain.as_raw(),
    });

    for resource in data.resources {
        device.release_default_view(resource);
        device.resources.remove(resource.raw());
    }
}

/// Cleans up every swapchain of a device being destroyed.
pub(crate) fn destroy_device_swapchains(registry: &Registry, device: &DeviceImpl) {
    let swapchains: Vec<u64> = SWAPCHAIN_MAP
        .iter()
        .filter(|entry| entry.device == device.handle)
        .map(|entry| *entry.key())
        .collect();

    for swapchain in swapchains {
        cleanup_swapchain(registry, device, vk::SwapchainKHR::from_raw(swapchain));
    }
}

#[cfg(test)]
mod tests {
    use core::{
        ffi::{CStr, c_char},
        mem,
    };
    use std::sync::atomic::{AtomicUsize, Ordering};

    use parking_lot::Mutex;
    use tint_api::resource::ResourceUsage;
    use tint_event::{EventKind, Flow};

    use super::*;
    use crate::device::device_impl::tests::offline_device;

    #[derive(Debug, Clone, Default)]
    struct RecordedInfo {
        usage: vk::ImageUsageFlags,
        flags: vk::SwapchainCreateFlagsKHR,
        view_formats: Vec<vk::Format>,
        families: Vec<u32>,
    }

    static RECORDED: Mutex<Vec<RecordedInfo>> = Mutex::new(Vec::new());

    unsafe extern "system" fn mock_create_swapchain(
        _device: vk::Device,
        info: *const vk::SwapchainCreateInfoKHR<'_>,
        _allocator: *const vk::AllocationCallbacks<'_>,
        swapchain: *mut vk::SwapchainKHR,
    ) -> vk::Result {
        let info = unsafe { &*info };
        let view_formats = unsafe {
            find_in_chain::<vk::ImageFormatListCreateInfo<'_>>(
                info.p_next,
                vk::StructureType::IMAGE_FORMAT_LIST_CREATE_INFO,
            )
        }
        .map(|list| unsafe {
            let list = list.as_ref();
            raw_slice(list.p_view_formats, list.view_format_count).to_vec()
        })
        .unwrap_or_default();

        let mut recorded = RECORDED.lock();
        recorded.push(RecordedInfo {
            usage: info.image_usage,
            flags: info.flags,
            view_formats,
            families: unsafe { raw_slice(info.p_queue_family_indices, info.queue_family_index_count) }
                .to_vec(),
        });
        unsafe { *swapchain = vk::SwapchainKHR::from_raw(0x5000 + recorded.len() as u64) };
        vk::Result::SUCCESS
    }

    unsafe extern "system" fn mock_get_swapchain_images(
        _device: vk::Device,
        swapchain: vk::SwapchainKHR,
        count: *mut u32,
        images: *mut vk::Image,
    ) -> vk::Result {
        unsafe {
            if !images.is_null() {
                for i in 0..2 {
                    *images.add(i) = vk::Image::from_raw(swapchain.as_raw() * 0x10 + i as u64);
                }
            }
            *count = 2;
        }
        vk::Result::SUCCESS
    }

    unsafe extern "system" fn mock_proc_addr(
        _device: vk::Device,
        name: *const c_char,
    ) -> vk::PFN_vkVoidFunction {
        match unsafe { CStr::from_ptr(name) }.to_bytes() {
            b"vkCreateSwapchainKHR" => unsafe {
                mem::transmute::<vk::PFN_vkCreateSwapchainKHR, vk::PFN_vkVoidFunction>(
                    mock_create_swapchain,
                )
            },
            b"vkGetSwapchainImagesKHR" => unsafe {
                mem::transmute::<vk::PFN_vkGetSwapchainImagesKHR, vk::PFN_vkVoidFunction>(
                    mock_get_swapchain_images,
                )
            },
            _ => None,
        }
    }

    #[test]
    fn format_list_pairs_linear_and_srgb() {
        assert_eq!(
            build_format_list(vk::Format::B8G8R8A8_UNORM, &[]),
            [vk::Format::B8G8R8A8_UNORM, vk::Format::B8G8R8A8_SRGB]
        );
        assert_eq!(
            build_format_list(
                vk::Format::R8G8B8A8_SRGB,
                &[vk::Format::R8G8B8A8_UNORM, vk::Format::A2B10G10R10_UNORM_PACK32]
            ),
            [
                vk::Format::R8G8B8A8_UNORM,
                vk::Format::R8G8B8A8_SRGB,
                vk::Format::A2B10G10R10_UNORM_PACK32
            ]
        );
        // Formats without an sRGB variant stay immutable
        assert_eq!(
            build_format_list(vk::Format::A2B10G10R10_UNORM_PACK32, &[]),
            [vk::Format::A2B10G10R10_UNORM_PACK32]
        );
    }

    #[test]
    fn creation_is_patched_and_images_registered() {
        let device = Arc::new(offline_device(Some(mock_proc_addr)));
        let registry = Registry::new();
        let init_count = Arc::new(AtomicUsize::new(0));
        registry.register_addon("count", {
            let init_count = init_count.clone();
            move |r| {
                r.on(EventKind::InitSwapchain, move |_| {
                    init_count.fetch_add(1, Ordering::Relaxed);
                    Flow::Continue
                });
            }
        });

        let families = [3];
        let info = vk::SwapchainCreateInfoKHR::default()
            .image_format(vk::Format::B8G8R8A8_UNORM)
            .image_extent(vk::Extent2D {
                width: 1920,
                height: 1080,
            })
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .image_sharing_mode(vk::SharingMode::CONCURRENT)
            .queue_family_indices(&families);

        let mut swapchain = vk::SwapchainKHR::null();
        assert_eq!(
            create_swapchain_impl(&registry, &device, &info, ptr::null(), &mut swapchain),
            vk::Result::SUCCESS
        );

        let recorded = RECORDED.lock()[(swapchain.as_raw() - 0x5001) as usize].clone();
        assert!(recorded.usage.contains(vk::ImageUsageFlags::TRANSFER_SRC | vk::ImageUsageFlags::COLOR_ATTACHMENT));
        assert!(recorded.flags.contains(vk::SwapchainCreateFlagsKHR::MUTABLE_FORMAT));
        assert_eq!(
            recorded.view_formats,
            [vk::Format::B8G8R8A8_UNORM, vk::Format::B8G8R8A8_SRGB]
        );
        assert_eq!(recorded.families, [3, device.graphics_family]);
        assert_eq!(init_count.load(Ordering::Relaxed), 1);

        let back_buffer = Resource::from_raw(swapchain.as_raw() * 0x10);
        let desc = device.get_resource_desc(back_buffer).unwrap();
        assert_eq!(desc.extent(), (1920, 1080, 1));
        assert!(desc.usage.contains(ResourceUsage::RENDER_TARGET | ResourceUsage::COPY_SOURCE));

        cleanup_swapchain(&registry, &device, swapchain);
        assert!(!device.is_valid(back_buffer.into()));
        assert!(get_runtime(swapchain).is_none());
    }

    #[test]
    fn app_format_list_does_not_force_mutable() {
        let device = Arc::new(offline_device(Some(mock_proc_addr)));
        let registry = Registry::new();

        let app_formats = [vk::Format::R8G8B8A8_UNORM];
        let mut app_list = vk::ImageFormatListCreateInfo::default().view_formats(&app_formats);
        let info = vk::SwapchainCreateInfoKHR::default()
            .image_format(vk::Format::A2B10G10R10_UNORM_PACK32)
            .image_extent(vk::Extent2D {
                width: 640,
                height: 480,
            })
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .image_sharing_mode(vk::SharingMode::EXCLUSIVE)
            .push_next(&mut app_list);

        let mut swapchain = vk::SwapchainKHR::null();
        assert_eq!(
            create_swapchain_impl(&registry, &device, &info, ptr::null(), &mut swapchain),
            vk::Result::SUCCESS
        );

        let recorded = RECORDED.lock()[(swapchain.as_raw() - 0x5001) as usize].clone();
        assert!(!recorded.flags.contains(vk::SwapchainCreateFlagsKHR::MUTABLE_FORMAT));
        assert_eq!(
            recorded.view_formats,
            [vk::Format::A2B10G10R10_UNORM_PACK32, vk::Format::R8G8B8A8_UNORM]
        );
        // the application's list is put back after the call
        assert_eq!(app_list.view_format_count, 1);
        assert_eq!(app_list.p_view_formats, app_formats.as_ptr());

        cleanup_swapchain(&registry, &device, swapchain);
        assert!(get_runtime(swapchain).is_none());
    }
}
