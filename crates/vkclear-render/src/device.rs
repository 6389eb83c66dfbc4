// SPDX-License-Identifier: CEPL-1.0
use std::rc::Rc;

use ash::vk;
use tracing::info;

use crate::caps::DeviceRequirements;
use crate::driver::{DeviceDesc, Driver};
use crate::error::{Error, Result};
use crate::instance::Instance;
use crate::select::Adapter;

/// Logical device plus the graphics and present queues. The two queue
/// handles are equal when the adapter exposes a combined family.
pub struct Device<D: Driver> {
    instance: Rc<Instance<D>>,
    raw: vk::Device,
    adapter: Adapter,
    graphics_queue: vk::Queue,
    present_queue: vk::Queue,
}

impl<D: Driver> Device<D> {
    pub fn new(
        instance: &Rc<Instance<D>>,
        adapter: Adapter,
        req: &DeviceRequirements,
    ) -> Result<Rc<Self>> {
        let driver = instance.driver();
        let families = adapter.queue_families();
        let desc = DeviceDesc {
            queue_families: &families,
            layers: &req.layers,
            extensions: &req.extensions,
        };
        // SAFETY: the adapter was enumerated from this instance and passed
        // the same requirements during selection.
        let raw = unsafe { driver.create_device(adapter.raw, &desc) }
            .map_err(Error::create("vkCreateDevice"))?;

        // Own the handle before anything else can fail.
        let mut device = Self {
            instance: Rc::clone(instance),
            raw,
            adapter,
            graphics_queue: vk::Queue::null(),
            present_queue: vk::Queue::null(),
        };
        // SAFETY: both families were requested with one queue each.
        unsafe {
            device.graphics_queue = driver
                .device_queue(raw, device.adapter.graphics_family)
                .map_err(Error::create("vkGetDeviceQueue(graphics)"))?;
            device.present_queue = driver
                .device_queue(raw, device.adapter.present_family)
                .map_err(Error::create("vkGetDeviceQueue(present)"))?;
        }
        info!(
            "created logical device ({} queue famil{})",
            families.len(),
            if families.len() == 1 { "y" } else { "ies" }
        );
        Ok(Rc::new(device))
    }

    pub fn raw(&self) -> vk::Device {
        self.raw
    }

    pub fn driver(&self) -> &Rc<D> {
        self.instance.driver()
    }

    pub fn adapter(&self) -> &Adapter {
        &self.adapter
    }

    pub fn graphics_queue(&self) -> vk::Queue {
        self.graphics_queue
    }

    pub fn present_queue(&self) -> vk::Queue {
        self.present_queue
    }

    /// Blocks until every queue on the device is idle.
    pub fn wait_idle(&self) -> Result<()> {
        // SAFETY: the device is alive for as long as `self`.
        unsafe { self.driver().device_wait_idle(self.raw) }.map_err(Error::frame("vkDeviceWaitIdle"))
    }
}

impl<D: Driver> Drop for Device<D> {
    fn drop(&mut self) {
        // SAFETY: swapchains, pools and semaphores hold an Rc to the device,
        // so all of them are gone. The frame executor idled the queues.
        unsafe { self.driver().destroy_device(self.raw) };
    }
}
