// SPDX-License-Identifier: CEPL-1.0
//! Swapchain negotiation and creation.

use std::rc::Rc;

use ash::vk;
use tracing::{debug, info};

use crate::device::Device;
use crate::driver::{Driver, ImageViewDesc, SwapchainDesc};
use crate::error::{Error, Result};
use crate::instance::Surface;
use crate::RenderSize;

/// Used when the surface reports a single `UNDEFINED` format, meaning any
/// format is accepted.
pub const DEFAULT_FORMAT: vk::Format = vk::Format::R8G8B8A8_UNORM;

const RGBA8_FORMATS: [vk::Format; 4] = [
    vk::Format::B8G8R8A8_UNORM,
    vk::Format::B8G8R8A8_SRGB,
    vk::Format::R8G8B8A8_UNORM,
    vk::Format::R8G8B8A8_SRGB,
];

const COMPOSITE_ALPHA_ORDER: [vk::CompositeAlphaFlagsKHR; 4] = [
    vk::CompositeAlphaFlagsKHR::OPAQUE,
    vk::CompositeAlphaFlagsKHR::PRE_MULTIPLIED,
    vk::CompositeAlphaFlagsKHR::POST_MULTIPLIED,
    vk::CompositeAlphaFlagsKHR::INHERIT,
];

/// Whole color image, one mip, one layer.
pub const COLOR_RANGE: vk::ImageSubresourceRange = vk::ImageSubresourceRange {
    aspect_mask: vk::ImageAspectFlags::COLOR,
    base_mip_level: 0,
    level_count: 1,
    base_array_layer: 0,
    layer_count: 1,
};

pub fn choose_present_mode(modes: &[vk::PresentModeKHR]) -> vk::PresentModeKHR {
    if modes.contains(&vk::PresentModeKHR::MAILBOX) {
        vk::PresentModeKHR::MAILBOX
    } else {
        vk::PresentModeKHR::FIFO
    }
}

/// `min + 1`, clamped to `max` unless `max` is 0 (unbounded).
pub fn choose_image_count(caps: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let want = caps.min_image_count.saturating_add(1);
    if caps.max_image_count == 0 {
        want
    } else {
        want.min(caps.max_image_count)
    }
}

pub fn choose_surface_format(formats: &[vk::SurfaceFormatKHR]) -> Option<vk::SurfaceFormatKHR> {
    match formats {
        [] => None,
        [only] if only.format == vk::Format::UNDEFINED => Some(vk::SurfaceFormatKHR {
            format: DEFAULT_FORMAT,
            color_space: only.color_space,
        }),
        [first, ..] => Some(
            formats
                .iter()
                .copied()
                .find(|f| {
                    RGBA8_FORMATS.contains(&f.format)
                        && f.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR
                })
                .unwrap_or(*first),
        ),
    }
}

pub fn choose_extent(caps: &vk::SurfaceCapabilitiesKHR, want: RenderSize) -> vk::Extent2D {
    if caps.current_extent.width != u32::MAX && caps.current_extent.height != u32::MAX {
        caps.current_extent
    } else {
        // Not `clamp`: it panics when a driver reports min > max.
        vk::Extent2D {
            width: want
                .width
                .min(caps.max_image_extent.width)
                .max(caps.min_image_extent.width),
            height: want
                .height
                .min(caps.max_image_extent.height)
                .max(caps.min_image_extent.height),
        }
    }
}

pub fn choose_composite_alpha(supported: vk::CompositeAlphaFlagsKHR) -> vk::CompositeAlphaFlagsKHR {
    COMPOSITE_ALPHA_ORDER
        .into_iter()
        .find(|&mode| supported.contains(mode))
        .unwrap_or(vk::CompositeAlphaFlagsKHR::INHERIT)
}

pub fn choose_sharing(graphics: u32, present: u32) -> (vk::SharingMode, Vec<u32>) {
    if graphics == present {
        (vk::SharingMode::EXCLUSIVE, Vec::new())
    } else {
        (vk::SharingMode::CONCURRENT, vec![graphics, present])
    }
}

/// Everything the swapchain will be created with, decided up front.
#[derive(Clone, Debug)]
pub struct SwapchainPlan {
    pub format: vk::SurfaceFormatKHR,
    pub present_mode: vk::PresentModeKHR,
    pub extent: vk::Extent2D,
    pub image_count: u32,
    pub pre_transform: vk::SurfaceTransformFlagsKHR,
    pub composite_alpha: vk::CompositeAlphaFlagsKHR,
    pub sharing_mode: vk::SharingMode,
    pub queue_family_indices: Vec<u32>,
}

impl SwapchainPlan {
    pub fn negotiate(
        caps: &vk::SurfaceCapabilitiesKHR,
        formats: &[vk::SurfaceFormatKHR],
        modes: &[vk::PresentModeKHR],
        want: RenderSize,
        graphics_family: u32,
        present_family: u32,
    ) -> Result<Self> {
        let format = choose_surface_format(formats).ok_or(Error::SwapchainCreationFailed {
            op: "vkGetPhysicalDeviceSurfaceFormatsKHR",
            result: vk::Result::ERROR_FORMAT_NOT_SUPPORTED,
        })?;
        let (sharing_mode, queue_family_indices) = choose_sharing(graphics_family, present_family);
        Ok(Self {
            format,
            present_mode: choose_present_mode(modes),
            extent: choose_extent(caps, want),
            image_count: choose_image_count(caps),
            pre_transform: caps.current_transform,
            composite_alpha: choose_composite_alpha(caps.supported_composite_alpha),
            sharing_mode,
            queue_family_indices,
        })
    }

    fn desc(&self, surface: vk::SurfaceKHR, old_swapchain: vk::SwapchainKHR) -> SwapchainDesc {
        SwapchainDesc {
            surface,
            min_image_count: self.image_count,
            format: self.format,
            extent: self.extent,
            usage: vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::TRANSFER_DST,
            sharing_mode: self.sharing_mode,
            queue_family_indices: self.queue_family_indices.clone(),
            pre_transform: self.pre_transform,
            composite_alpha: self.composite_alpha,
            present_mode: self.present_mode,
            old_swapchain,
        }
    }
}

/// Swapchain with its images and one view per image. Views are released
/// before the swapchain, last view first.
pub struct Swapchain<D: Driver> {
    device: Rc<Device<D>>,
    _surface: Rc<Surface<D>>,
    raw: vk::SwapchainKHR,
    plan: SwapchainPlan,
    images: Vec<vk::Image>,
    views: Vec<vk::ImageView>,
}

impl<D: Driver> Swapchain<D> {
    /// Negotiates and creates a swapchain. Passing `old` links the new chain
    /// to it; the caller drops `old` afterwards. On any failure nothing
    /// created here survives.
    pub fn new(
        device: &Rc<Device<D>>,
        surface: &Rc<Surface<D>>,
        want: RenderSize,
        old: Option<&Swapchain<D>>,
    ) -> Result<Self> {
        let driver = device.driver();
        let adapter = device.adapter();
        // SAFETY: adapter and surface belong to the same live instance.
        let (caps, formats, modes) = unsafe {
            (
                driver
                    .surface_capabilities(adapter.raw, surface.raw())
                    .map_err(Error::swapchain("vkGetPhysicalDeviceSurfaceCapabilitiesKHR"))?,
                driver
                    .surface_formats(adapter.raw, surface.raw())
                    .map_err(Error::swapchain("vkGetPhysicalDeviceSurfaceFormatsKHR"))?,
                driver
                    .present_modes(adapter.raw, surface.raw())
                    .map_err(Error::swapchain("vkGetPhysicalDeviceSurfacePresentModesKHR"))?,
            )
        };
        debug!("surface formats {formats:?}, present modes {modes:?}");

        let plan = SwapchainPlan::negotiate(
            &caps,
            &formats,
            &modes,
            want,
            adapter.graphics_family,
            adapter.present_family,
        )?;
        let old_raw = old.map_or(vk::SwapchainKHR::null(), |s| s.raw);
        let desc = plan.desc(surface.raw(), old_raw);

        // SAFETY: the device was created with VK_KHR_swapchain; `old_raw` is
        // null or a live swapchain of this surface.
        let raw = unsafe { driver.create_swapchain(device.raw(), &desc) }
            .map_err(Error::swapchain("vkCreateSwapchainKHR"))?;

        let mut swapchain = Self {
            device: Rc::clone(device),
            _surface: Rc::clone(surface),
            raw,
            plan,
            images: Vec::new(),
            views: Vec::new(),
        };

        // SAFETY: `raw` was just created on this device.
        swapchain.images = unsafe { driver.swapchain_images(device.raw(), raw) }
            .map_err(Error::swapchain("vkGetSwapchainImagesKHR"))?;

        for &image in &swapchain.images {
            let desc = ImageViewDesc {
                image,
                view_type: vk::ImageViewType::TYPE_2D,
                format: swapchain.plan.format.format,
                range: COLOR_RANGE,
            };
            // SAFETY: `image` is owned by the swapchain above. An early
            // return drops `swapchain`, which releases the views made so far.
            let view = unsafe { driver.create_image_view(device.raw(), &desc) }
                .map_err(Error::swapchain("vkCreateImageView"))?;
            swapchain.views.push(view);
        }

        info!(
            "created swapchain {}x{} ({:?}/{:?}, {:?}, {} images, {:?})",
            swapchain.plan.extent.width,
            swapchain.plan.extent.height,
            swapchain.plan.format.format,
            swapchain.plan.format.color_space,
            swapchain.plan.present_mode,
            swapchain.images.len(),
            swapchain.plan.sharing_mode,
        );
        Ok(swapchain)
    }

    pub fn raw(&self) -> vk::SwapchainKHR {
        self.raw
    }

    pub fn plan(&self) -> &SwapchainPlan {
        &self.plan
    }

    pub fn images(&self) -> &[vk::Image] {
        &self.images
    }

    pub fn views(&self) -> &[vk::ImageView] {
        &self.views
    }
}

impl<D: Driver> Drop for Swapchain<D> {
    fn drop(&mut self) {
        let driver = self.device.driver();
        // SAFETY: the device is idle (frame executor / recreation waited) and
        // the views were created from this swapchain's images.
        unsafe {
            for &view in self.views.iter().rev() {
                driver.destroy_image_view(self.device.raw(), view);
            }
            driver.destroy_swapchain(self.device.raw(), self.raw);
        }
    }
}
