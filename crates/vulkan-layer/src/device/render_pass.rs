//! Render pass and framebuffer tracking.
//!
//! Vulkan clears attachments through load operations, so the layer keeps enough of every
//! render pass to report the targets and clears of each subpass.

use core::slice;

use ash::vk::{self, Handle};
use tint_api::{
    ResourceView,
    pipeline::{LoadOp, RenderPassDepthStencil, RenderPassRenderTarget, StoreOp},
};
use tracing::trace;

use super::get_device;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct AttachmentInfo {
    pub format: vk::Format,
    pub samples: vk::SampleCountFlags,
    pub load_op: vk::AttachmentLoadOp,
    pub store_op: vk::AttachmentStoreOp,
    pub stencil_load_op: vk::AttachmentLoadOp,
    pub stencil_store_op: vk::AttachmentStoreOp,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub(crate) struct SubpassInfo {
    /// Attachment index per color slot, [`vk::ATTACHMENT_UNUSED`] for holes.
    pub colors: Vec<u32>,
    pub depth_stencil: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub(crate) struct RenderPassData {
    pub attachments: Vec<AttachmentInfo>,
    pub subpasses: Vec<SubpassInfo>,
    /// First subpass referencing each attachment. Load operations only apply there.
    pub first_use: Vec<Option<u32>>,
}

impl RenderPassData {
    fn new(attachments: Vec<AttachmentInfo>, subpasses: Vec<SubpassInfo>) -> Self {
        let mut first_use = vec![None; attachments.len()];
        for (index, subpass) in subpasses.iter().enumerate() {
            for &attachment in subpass.colors.iter().chain(&subpass.depth_stencil) {
                if let Some(first) = first_use.get_mut(attachment as usize)
                    && first.is_none()
                {
                    *first = Some(index as u32);
                }
            }
        }

        Self {
            attachments,
            subpasses,
            first_use,
        }
    }

    pub fn from_info(info: &vk::RenderPassCreateInfo<'_>) -> Self {
        let attachments = unsafe { raw_slice(info.p_attachments, info.attachment_count) }
            .iter()
            .map(|attachment| AttachmentInfo {
                format: attachment.format,
                samples: attachment.samples,
                load_op: attachment.load_op,
                store_op: attachment.store_op,
                stencil_load_op: attachment.stencil_load_op,
                stencil_store_op: attachment.stencil_store_op,
            })
            .collect();

        let subpasses = unsafe { raw_slice(info.p_subpasses, info.subpass_count) }
            .iter()
            .map(|subpass| SubpassInfo {
                colors: unsafe {
                    raw_slice(subpass.p_color_attachments, subpass.color_attachment_count)
                }
                .iter()
                .map(|reference| reference.attachment)
                .collect(),
                depth_stencil: unsafe { subpass.p_depth_stencil_attachment.as_ref() }
                    .map(|reference| reference.attachment)
                    .filter(|&attachment| attachment != vk::ATTACHMENT_UNUSED),
            })
            .collect();

        Self::new(attachments, subpasses)
    }

    pub fn from_info2(info: &vk::RenderPassCreateInfo2<'_>) -> Self {
        let attachments = unsafe { raw_slice(info.p_attachments, info.attachment_count) }
            .iter()
            .map(|attachment| AttachmentInfo {
                format: attachment.format,
                samples: attachment.samples,
                load_op: attachment.load_op,
                store_op: attachment.store_op,
                stencil_load_op: attachment.stencil_load_op,
                stencil_store_op: attachment.stencil_store_op,
            })
            .collect();

        let subpasses = unsafe { raw_slice(info.p_subpasses, info.subpass_count) }
            .iter()
            .map(|subpass| SubpassInfo {
                colors: unsafe {
                    raw_slice(subpass.p_color_attachments, subpass.color_attachment_count)
                }
                .iter()
                .map(|reference| reference.attachment)
                .collect(),
                depth_stencil: unsafe { subpass.p_depth_stencil_attachment.as_ref() }
                    .map(|reference| reference.attachment)
                    .filter(|&attachment| attachment != vk::ATTACHMENT_UNUSED),
            })
            .collect();

        Self::new(attachments, subpasses)
    }

    /// Targets of `subpass` as seen by add-ons.
    ///
    /// Attachments are reported as cleared only in the first subpass using them.
    pub fn targets(
        &self,
        subpass: u32,
        views: &[vk::ImageView],
        clear_values: &[vk::ClearValue],
    ) -> (Vec<RenderPassRenderTarget>, Option<RenderPassDepthStencil>) {
        let Some(info) = self.subpasses.get(subpass as usize) else {
            return (Vec::new(), None);
        };

        let first = |attachment: u32| self.first_use[attachment as usize] == Some(subpass);
        let view = |attachment: u32| {
            views
                .get(attachment as usize)
                .map(|view| ResourceView::from_raw(view.as_raw()))
                .unwrap_or_default()
        };
        let clear = |attachment: u32| clear_values.get(attachment as usize).copied();

        let render_targets = info
            .colors
            .iter()
            .map(|&attachment| {
                let Some(desc) = self.attachments.get(attachment as usize) else {
                    return RenderPassRenderTarget::default();
                };

                let load_op = unmap_load_op(desc.load_op, first(attachment));
                RenderPassRenderTarget {
                    view: view(attachment),
                    load_op,
                    store_op: unmap_store_op(desc.store_op),
                    clear_color: match clear(attachment) {
                        Some(value) if load_op == LoadOp::Clear => unsafe { value.color.float32 },
                        _ => [0.0; 4],
                    },
                }
            })
            .collect();

        let depth_stencil = info.depth_stencil.and_then(|attachment| {
            let desc = self.attachments.get(attachment as usize)?;
            let depth_load_op = unmap_load_op(desc.load_op, first(attachment));
            let stencil_load_op = unmap_load_op(desc.stencil_load_op, first(attachment));
            let value = clear(attachment)
                .map(|value| unsafe { value.depth_stencil })
                .unwrap_or_default();

            Some(RenderPassDepthStencil {
                view: view(attachment),
                depth_load_op,
                depth_store_op: unmap_store_op(desc.store_op),
                stencil_load_op,
                stencil_store_op: unmap_store_op(desc.stencil_store_op),
                clear_depth: value.depth,
                clear_stencil: value.stencil as u8,
            })
        });

        (render_targets, depth_stencil)
    }
}

fn unmap_load_op(op: vk::AttachmentLoadOp, first_use: bool) -> LoadOp {
    match op {
        vk::AttachmentLoadOp::CLEAR if first_use => LoadOp::Clear,
        vk::AttachmentLoadOp::DONT_CARE if first_use => LoadOp::DontCare,
        _ => LoadOp::Load,
    }
}

fn unmap_store_op(op: vk::AttachmentStoreOp) -> StoreOp {
    match op {
        vk::AttachmentStoreOp::STORE => StoreOp::Store,
        _ => StoreOp::DontCare,
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub(crate) struct FramebufferData {
    /// Empty for imageless framebuffers.
    pub attachments: Vec<vk::ImageView>,
}

/// Layout of a render pass the layer creates for its own rendering.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) struct RenderPassKey {
    pub colors: Vec<(vk::Format, vk::AttachmentLoadOp, vk::AttachmentStoreOp)>,
    /// Format, depth ops and stencil ops.
    pub depth_stencil: Option<(
        vk::Format,
        vk::AttachmentLoadOp,
        vk::AttachmentStoreOp,
        vk::AttachmentLoadOp,
        vk::AttachmentStoreOp,
    )>,
    pub samples: vk::SampleCountFlags,
}

impl RenderPassKey {
    pub fn create(&self, device: &ash::Device) -> ash::prelude::VkResult<vk::RenderPass> {
        let mut attachments: Vec<vk::AttachmentDescription> = self
            .colors
            .iter()
            .map(|&(format, load_op, store_op)| vk::AttachmentDescription {
                format,
                samples: self.samples,
                load_op,
                store_op,
                stencil_load_op: vk::AttachmentLoadOp::DONT_CARE,
                stencil_store_op: vk::AttachmentStoreOp::DONT_CARE,
                initial_layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
                final_layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
                ..Default::default()
            })
            .collect();
        let color_refs: Vec<vk::AttachmentReference> = (0..self.colors.len() as u32)
            .map(|attachment| vk::AttachmentReference {
                attachment,
                layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
            })
            .collect();

        let depth_ref = self.depth_stencil.map(
            |(format, load_op, store_op, stencil_load_op, stencil_store_op)| {
                attachments.push(vk::AttachmentDescription {
                    format,
                    samples: self.samples,
                    load_op,
                    store_op,
                    stencil_load_op,
                    stencil_store_op,
                    initial_layout: vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
                    final_layout: vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
                    ..Default::default()
                });
                vk::AttachmentReference {
                    attachment: attachments.len() as u32 - 1,
                    layout: vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
                }
            },
        );

        let mut subpass = vk::SubpassDescription::default()
            .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
            .color_attachments(&color_refs);
        if let Some(depth_ref) = &depth_ref {
            subpass = subpass.depth_stencil_attachment(depth_ref);
        }
        let subpasses = [subpass];

        let info = vk::RenderPassCreateInfo::default()
            .attachments(&attachments)
            .subpasses(&subpasses);
        unsafe { device.create_render_pass(&info, None) }
    }
}

pub(crate) unsafe fn raw_slice<'a, T>(ptr: *const T, len: u32) -> &'a [T] {
    if ptr.is_null() || len == 0 {
        &[]
    } else {
        unsafe { slice::from_raw_parts(ptr, len as usize) }
    }
}

#[tracing::instrument]
pub(super) extern "system" fn create_render_pass(
    device: vk::Device,
    info: *const vk::RenderPassCreateInfo<'_>,
    allocator: *const vk::AllocationCallbacks<'_>,
    render_pass: *mut vk::RenderPass,
) -> vk::Result {
    trace!("vkCreateRenderPass called");

    let Some(device) = get_device(device) else {
        return vk::Result::ERROR_INITIALIZATION_FAILED;
    };
    let res = unsafe {
        (device.fp.fp_v1_0().create_render_pass)(device.handle, info, allocator, render_pass)
    };
    if res == vk::Result::SUCCESS
        && let Some(info) = unsafe { info.as_ref() }
    {
        device
            .render_passes
            .insert(unsafe { *render_pass }.as_raw(), RenderPassData::from_info(info));
    }

    res
}

#[tracing::instrument]
pub(super) extern "system" fn create_render_pass2(
    device: vk::Device,
    info: *const vk::RenderPassCreateInfo2<'_>,
    allocator: *const vk::AllocationCallbacks<'_>,
    render_pass: *mut vk::RenderPass,
) -> vk::Result {
    trace!("vkCreateRenderPass2 called");

    let Some(device) = get_device(device) else {
        return vk::Result::ERROR_INITIALIZATION_FAILED;
    };
    let Some(create_render_pass2) = device.optional.create_render_pass2 else {
        return vk::Result::ERROR_FEATURE_NOT_PRESENT;
    };
    let res = unsafe { create_render_pass2(device.handle, info, allocator, render_pass) };
    if res == vk::Result::SUCCESS
        && let Some(info) = unsafe { info.as_ref() }
    {
        device
            .render_passes
            .insert(unsafe { *render_pass }.as_raw(), RenderPassData::from_info2(info));
    }

    res
}

#[tracing::instrument]
pub(super) extern "system" fn destroy_render_pass(
    device: vk::Device,
    render_pass: vk::RenderPass,
    allocator: *const vk::AllocationCallbacks<'_>,
) {
    trace!("vkDestroyRenderPass called");

    let Some(device) = get_device(device) else {
        return;
    };
    device.render_passes.remove(render_pass.as_raw());
    unsafe { (device.fp.fp_v1_0().destroy_render_pass)(device.handle, render_pass, allocator) }
}

#[tracing::instrument]
pub(super) extern "system" fn create_framebuffer(
    device: vk::Device,
    info: *const vk::FramebufferCreateInfo<'_>,
    allocator: *const vk::AllocationCallbacks<'_>,
    framebuffer: *mut vk::Framebuffer,
) -> vk::Result {
    trace!("vkCreateFramebuffer called");

    let Some(device) = get_device(device) else {
        return vk::Result::ERROR_INITIALIZATION_FAILED;
    };
    let res = unsafe {
        (device.fp.fp_v1_0().create_framebuffer)(device.handle, info, allocator, framebuffer)
    };
    if res == vk::Result::SUCCESS
        && let Some(info) = unsafe { info.as_ref() }
    {
        let attachments = if info.flags.contains(vk::FramebufferCreateFlags::IMAGELESS) {
            Vec::new()
        } else {
            unsafe { raw_slice(info.p_attachments, info.attachment_count) }.to_vec()
        };
        device
            .framebuffers
            .insert(unsafe { *framebuffer }.as_raw(), FramebufferData { attachments });
    }

    res
}

#[tracing::instrument]
pub(super) extern "system" fn destroy_framebuffer(
    device: vk::Device,
    framebuffer: vk::Framebuffer,
    allocator: *const vk::AllocationCallbacks<'_>,
) {
    trace!("vkDestroyFramebuffer called");

    let Some(device) = get_device(device) else {
        return;
    };
    device.framebuffers.remove(framebuffer.as_raw());
    unsafe { (device.fp.fp_v1_0().destroy_framebuffer)(device.handle, framebuffer, allocator) }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attachment(format: vk::Format, load_op: vk::AttachmentLoadOp) -> vk::AttachmentDescription {
        vk::AttachmentDescription {
            format,
            samples: vk::SampleCountFlags::TYPE_1,
            load_op,
            store_op: vk::AttachmentStoreOp::STORE,
            stencil_load_op: load_op,
            stencil_store_op: vk::AttachmentStoreOp::DONT_CARE,
            ..Default::default()
        }
    }

    #[test]
    fn clears_only_on_first_use() {
        let attachments = [
            attachment(vk::Format::B8G8R8A8_UNORM, vk::AttachmentLoadOp::CLEAR),
            attachment(vk::Format::D24_UNORM_S8_UINT, vk::AttachmentLoadOp::CLEAR),
        ];
        let color = [vk::AttachmentReference {
            attachment: 0,
            layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
        }];
        let depth = vk::AttachmentReference {
            attachment: 1,
            layout: vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
        };
        let subpasses = [
            vk::SubpassDescription::default()
                .color_attachments(&color)
                .depth_stencil_attachment(&depth),
            vk::SubpassDescription::default().color_attachments(&color),
        ];
        let info = vk::RenderPassCreateInfo::default()
            .attachments(&attachments)
            .subpasses(&subpasses);

        let data = RenderPassData::from_info(&info);
        assert_eq!(data.first_use, [Some(0), Some(0)]);

        let views = [vk::ImageView::from_raw(0x10), vk::ImageView::from_raw(0x20)];
        let clear_values = [
            vk::ClearValue {
                color: vk::ClearColorValue {
                    float32: [0.25, 0.5, 0.75, 1.0],
                },
            },
            vk::ClearValue {
                depth_stencil: vk::ClearDepthStencilValue {
                    depth: 1.0,
                    stencil: 7,
                },
            },
        ];

        let (targets, depth_stencil) = data.targets(0, &views, &clear_values);
        assert_eq!(targets.len(), 1);
        assert_eq!(targets[0].view, ResourceView::from_raw(0x10));
        assert_eq!(targets[0].load_op, LoadOp::Clear);
        assert_eq!(targets[0].clear_color, [0.25, 0.5, 0.75, 1.0]);
        let depth_stencil = depth_stencil.unwrap();
        assert_eq!(depth_stencil.depth_load_op, LoadOp::Clear);
        assert_eq!(depth_stencil.clear_depth, 1.0);
        assert_eq!(depth_stencil.clear_stencil, 7);

        let (targets, depth_stencil) = data.targets(1, &views, &clear_values);
        assert_eq!(targets[0].load_op, LoadOp::Load);
        assert!(depth_stencil.is_none());

        assert!(data.targets(5, &views, &clear_values).0.is_empty());
    }
}
