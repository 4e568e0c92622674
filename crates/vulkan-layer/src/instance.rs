use core::{
    ffi::{CStr, c_char, c_void},
    mem,
    ptr::NonNull,
};
use std::ffi::CString;

use ash::{
    Instance,
    vk::{self, BaseInStructure, Handle},
};
use once_cell::sync::Lazy;
use tint::map::IntDashMap;
use tracing::{debug, error, trace};

use super::{proc_table, resolve_proc};
use crate::device;

static DISPATCH_TABLE: Lazy<IntDashMap<u64, DispatchTable>> = Lazy::new(IntDashMap::default);

/// Physical device facts the device hooks decide on.
pub(crate) static PHYSICAL_DEVICE_MAP: Lazy<IntDashMap<u64, PhysicalDeviceData>> =
    Lazy::new(IntDashMap::default);

struct DispatchTable {
    get_proc_addr: vk::PFN_vkGetInstanceProcAddr,
    physical_devices: Vec<vk::PhysicalDevice>,
    instance: Instance,
}

impl DispatchTable {
    fn new(get_proc_addr: vk::PFN_vkGetInstanceProcAddr, raw_instance: vk::Instance) -> Self {
        let instance = unsafe {
            Instance::load_with(
                |name| {
                    mem::transmute::<vk::PFN_vkVoidFunction, *const c_void>(get_proc_addr(
                        raw_instance,
                        name.as_ptr(),
                    ))
                },
                raw_instance,
            )
        };

        let physical_devices = match unsafe { instance.enumerate_physical_devices() } {
            Ok(physical_devices) => physical_devices,
            Err(err) => {
                error!("failed to enumerate physical devices. err: {err:?}");
                Vec::new()
            }
        };

        Self {
            get_proc_addr,
            physical_devices,
            instance,
        }
    }
}

/// Properties of a [`vk::PhysicalDevice`] captured at instance creation.
#[derive(Clone)]
pub(crate) struct PhysicalDeviceData {
    /// Next layer's instance functions.
    pub instance: Instance,
    pub api_version: u32,
    pub memory_properties: vk::PhysicalDeviceMemoryProperties,
    pub features: vk::PhysicalDeviceFeatures,
    pub queue_families: Vec<vk::QueueFamilyProperties>,
    pub extensions: Vec<CString>,
}

impl PhysicalDeviceData {
    fn query(instance: &Instance, physical_device: vk::PhysicalDevice) -> Self {
        let properties = unsafe { instance.get_physical_device_properties(physical_device) };
        let extensions =
            unsafe { instance.enumerate_device_extension_properties(physical_device) }
                .unwrap_or_default()
                .iter()
                .filter_map(|ext| ext.extension_name_as_c_str().ok().map(CStr::to_owned))
                .collect();

        Self {
            instance: instance.clone(),
            api_version: properties.api_version,
            memory_properties: unsafe {
                instance.get_physical_device_memory_properties(physical_device)
            },
            features: unsafe { instance.get_physical_device_features(physical_device) },
            queue_families: unsafe {
                instance.get_physical_device_queue_family_properties(physical_device)
            },
            extensions,
        }
    }

    pub fn supports_extension(&self, name: &CStr) -> bool {
        self.extensions.iter().any(|ext| ext.as_c_str() == name)
    }
}

pub(crate) fn get_physical_device_data(
    physical_device: vk::PhysicalDevice,
) -> Option<PhysicalDeviceData> {
    PHYSICAL_DEVICE_MAP
        .get(&physical_device.as_raw())
        .map(|data| data.clone())
}

#[tracing::instrument(skip(name))]
pub(super) extern "system" fn get_proc_addr(
    instance: vk::Instance,
    name: *const c_char,
) -> vk::PFN_vkVoidFunction {
    let name_str = unsafe { CStr::from_ptr(name) }.to_string_lossy();
    trace!("vkGetInstanceProcAddr called name: {}", name_str);

    unsafe {
        proc_table!(&*name_str => {
            "vkGetInstanceProcAddr" => get_proc_addr: vk::PFN_vkGetInstanceProcAddr,
            "vkCreateInstance" => create_instance: vk::PFN_vkCreateInstance,
            "vkDestroyInstance" => destroy_instance: vk::PFN_vkDestroyInstance,
            "vkCreateDevice" => device::create_device: vk::PFN_vkCreateDevice,
            "vkGetDeviceProcAddr" => device::get_proc_addr: vk::PFN_vkGetDeviceProcAddr,
        });
    }

    unsafe { (DISPATCH_TABLE.get(&instance.as_raw())?.get_proc_addr)(instance, name) }
}

#[tracing::instrument]
extern "system" fn create_instance(
    info: *const vk::InstanceCreateInfo,
    callback: *const vk::AllocationCallbacks,
    instance: *mut vk::Instance,
) -> vk::Result {
    trace!("vkCreateInstance called");

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

    let Some(create_instance) = (unsafe {
        resolve_proc!(next_get_instance_proc_addr =>
            vk::Instance::null(),
            c"vkCreateInstance": vk::PFN_vkCreateInstance
        )
    }) else {
        return vk::Result::ERROR_INITIALIZATION_FAILED;
    };

    let res = unsafe { create_instance(info, callback, instance) };
    if res != vk::Result::SUCCESS {
        return res;
    }

    debug!("initializing instance dispatch table");
    let instance = unsafe { *instance };
    let table = DispatchTable::new(next_get_instance_proc_addr, instance);
    for &physical_device in &table.physical_devices {
        PHYSICAL_DEVICE_MAP.insert(
            physical_device.as_raw(),
            PhysicalDeviceData::query(&table.instance, physical_device),
        );
    }

    DISPATCH_TABLE.insert(instance.as_raw(), table);

    vk::Result::SUCCESS
}

#[tracing::instrument]
extern "system" fn destroy_instance(
    instance: vk::Instance,
    allocator: *const vk::AllocationCallbacks<'_>,
) {
    trace!("vkDestroyInstance called");

    let Some((_, table)) = DISPATCH_TABLE.remove(&instance.as_raw()) else {
        return;
    };

    debug!("instance dispatch table cleanup");
    for physical_device in &table.physical_devices {
        PHYSICAL_DEVICE_MAP.remove(&physical_device.as_raw());
    }

    unsafe {
        (table.instance.fp_v1_0().destroy_instance)(instance, allocator);
    }
}

#[repr(C)]
#[derive(Copy, Clone)]
struct LayerInstanceLink {
    pub p_next: *mut LayerInstanceLink,
    pub pfn_next_get_instance_proc_addr: Option<vk::PFN_vkGetInstanceProcAddr>,
    pub pfn_next_get_physical_device_proc_addr: vk::PFN_vkVoidFunction,
}

#[repr(C)]
#[derive(Copy, Clone)]
union LayerInstanceCreateInfoUnion {
    pub p_layer_info: *mut LayerInstanceLink,
}

#[repr(C)]
#[derive(Copy, Clone)]
struct LayerInstanceCreateInfo {
    pub s_type: vk::StructureType,
    pub p_next: *mut c_void,
    pub function: i32,
    pub u: LayerInstanceCreateInfoUnion,
}

unsafe fn get_layer_link_info(
    instance_create_info: *const vk::InstanceCreateInfo,
) -> Option<NonNull<LayerInstanceCreateInfo>> {
    const VK_LAYER_LINK_INFO: i32 = 0;

    let mut layer_create_info: NonNull<BaseInStructure> =
        NonNull::new(instance_create_info.cast::<BaseInStructure>().cast_mut())?;
    loop {
        layer_create_info = NonNull::new(
            unsafe { layer_create_info.as_ref() }
                .p_next
                .cast::<BaseInStructure>()
                .cast_mut(),
        )?;

        if unsafe { layer_create_info.as_ref() }.s_type
            == vk::StructureType::LOADER_INSTANCE_CREATE_INFO
        {
            let layer_create_info = layer_create_info.cast::<LayerInstanceCreateInfo>();
            if unsafe { layer_create_info.as_ref() }.function == VK_LAYER_LINK_INFO {
                return Some(layer_create_info);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use core::ptr;

    use super::*;

    #[test]
    fn link_info_skips_other_loader_infos() {
        let mut link = LayerInstanceLink {
            p_next: ptr::null_mut(),
            pfn_next_get_instance_proc_addr: None,
            pfn_next_get_physical_device_proc_addr: None,
        };
        let mut link_info = LayerInstanceCreateInfo {
            s_type: vk::StructureType::LOADER_INSTANCE_CREATE_INFO,
            p_next: ptr::null_mut(),
            function: 0,
            u: LayerInstanceCreateInfoUnion {
                p_layer_info: &raw mut link,
            },
        };
        // Loader data callback entry, function 1
        let mut data_info = LayerInstanceCreateInfo {
            s_type: vk::StructureType::LOADER_INSTANCE_CREATE_INFO,
            p_next: (&raw mut link_info).cast(),
            function: 1,
            u: LayerInstanceCreateInfoUnion {
                p_layer_info: ptr::null_mut(),
            },
        };
        let info = vk::InstanceCreateInfo {
            p_next: (&raw mut data_info).cast_const().cast(),
            ..Default::default()
        };

        let found = unsafe { get_layer_link_info(&info) }.unwrap();
        assert_eq!(found.as_ptr(), &raw mut link_info);

        let bare = vk::InstanceCreateInfo::default();
        assert!(unsafe { get_layer_link_info(&bare) }.is_none());
    }
}
