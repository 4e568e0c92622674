//! Vulkan implicit layer.
//!
//! The loader negotiates through [`vkNegotiateLoaderLayerInterfaceVersion`] and from then on
//! resolves every instance and device function through the layer's proc address functions.

pub mod conv;
pub mod device;
pub mod instance;

use core::ffi::c_void;

use ash::vk::{self, PFN_vkGetDeviceProcAddr, PFN_vkGetInstanceProcAddr, StructureType};

use tracing::{debug, trace};

/// Layer interface version spoken by this layer.
const LAYER_INTERFACE_VERSION: u32 = 2;

#[repr(C)]
struct VkNegotiateLayerInterface {
    s_type: StructureType,
    p_next: *const c_void,
    loader_layer_interface_version: u32,
    pfn_get_instance_proc_addr: Option<PFN_vkGetInstanceProcAddr>,
    pfn_get_device_proc_addr: Option<PFN_vkGetDeviceProcAddr>,
    pfn_get_physical_device_proc_addr: Option<PFN_vkGetInstanceProcAddr>,
}

#[tracing::instrument]
#[unsafe(export_name = "vkNegotiateLoaderLayerInterfaceVersion")]
extern "system" fn layer_negotiate_loader_layer_interface_version(
    version: *mut VkNegotiateLayerInterface,
) -> vk::Result {
    trace!("vkNegotiateLoaderLayerInterfaceVersion called");

    let Some(version) = (unsafe { version.as_mut() }) else {
        return vk::Result::ERROR_INITIALIZATION_FAILED;
    };
    if version.loader_layer_interface_version < LAYER_INTERFACE_VERSION {
        debug!(
            "loader interface version {} is too old",
            version.loader_layer_interface_version
        );
        return vk::Result::ERROR_INITIALIZATION_FAILED;
    }

    if !tint::config().hooks.vulkan {
        debug!("vulkan layer disabled by configuration");
        return vk::Result::ERROR_INITIALIZATION_FAILED;
    }

    debug!("initializing vulkan layer");
    version.loader_layer_interface_version = LAYER_INTERFACE_VERSION;
    version.pfn_get_instance_proc_addr = Some(instance::get_proc_addr);
    version.pfn_get_device_proc_addr = Some(device::get_proc_addr);
    version.pfn_get_physical_device_proc_addr = None;

    vk::Result::SUCCESS
}

macro_rules! proc_table {
    ($name:expr => {
        $($proc:literal => $func:path : $proc_ty:ty),* $(,)?
    }) => {
        match $name {
            $(
                $proc => return ::core::mem::transmute::<
                    $proc_ty,
                    ::ash::vk::PFN_vkVoidFunction
                >($func),
            )*
            _ => {}
        }
    };
}
use proc_table;

macro_rules! resolve_proc {
    ($f:expr => $this:expr, $name:literal : $ty:ty) => {
        ::core::mem::transmute::<::ash::vk::PFN_vkVoidFunction, Option<$ty>>($f(
            $this,
            $name.as_ptr(),
        ))
    };
}
use resolve_proc;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn negotiation_installs_entry_points() {
        let mut interface = VkNegotiateLayerInterface {
            s_type: StructureType::from_raw(0),
            p_next: core::ptr::null(),
            loader_layer_interface_version: 2,
            pfn_get_instance_proc_addr: None,
            pfn_get_device_proc_addr: None,
            pfn_get_physical_device_proc_addr: None,
        };

        assert_eq!(
            layer_negotiate_loader_layer_interface_version(&mut interface),
            vk::Result::SUCCESS
        );
        assert!(interface.pfn_get_instance_proc_addr.is_some());
        assert!(interface.pfn_get_device_proc_addr.is_some());

        interface.loader_layer_interface_version = 1;
        assert_eq!(
            layer_negotiate_loader_layer_interface_version(&mut interface),
            vk::Result::ERROR_INITIALIZATION_FAILED
        );
    }
}
