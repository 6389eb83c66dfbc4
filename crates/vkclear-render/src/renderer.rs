// SPDX-License-Identifier: CEPL-1.0
use std::rc::Rc;

use tracing::info;

use crate::caps::DeviceRequirements;
use crate::device::Device;
use crate::driver::Driver;
use crate::error::Result;
use crate::frame::{FrameExecutor, LoopSignal};
use crate::instance::{DebugMessenger, Instance, Surface};
use crate::select::select_adapter;
use crate::swapchain::Swapchain;
use crate::{PresentTarget, RenderConfig, RenderSize};

/// The whole bring-up, owned in one place.
///
/// STRICT TEARDOWN ORDER is the field order below (Rust drops fields top to
/// bottom), the reverse of creation:
/// - frame executor: idle wait, semaphores, command buffer, command pool
/// - swapchain: image views (last first), then the swapchain
/// - device
/// - surface
/// - debug messenger
/// - instance
pub struct Renderer<D: Driver> {
    frame: FrameExecutor<D>,
    swapchain: Swapchain<D>,
    device: Rc<Device<D>>,
    surface: Rc<Surface<D>>,
    _debug: Option<DebugMessenger<D>>,
    _instance: Rc<Instance<D>>,
    frames: u64,
}

impl<D: Driver> Renderer<D> {
    pub fn new(driver: Rc<D>, target: &PresentTarget, cfg: &RenderConfig) -> Result<Self> {
        let instance = Instance::new(driver, cfg, target)?;
        let debug = if cfg.validation {
            Some(DebugMessenger::new(&instance)?)
        } else {
            None
        };
        let surface = Surface::new(&instance, target)?;

        let device_req = DeviceRequirements::new(cfg.api_version);
        // SAFETY: instance and surface are alive for the whole call.
        let adapter = unsafe {
            select_adapter(
                instance.driver().as_ref(),
                instance.raw(),
                surface.raw(),
                &device_req,
            )?
        };
        let device = Device::new(&instance, adapter, &device_req)?;
        let swapchain = Swapchain::new(&device, &surface, target.size, None)?;
        let frame = FrameExecutor::new(&device, cfg.clear_color)?;
        info!("renderer ready");

        Ok(Self {
            frame,
            swapchain,
            device,
            surface,
            _debug: debug,
            _instance: instance,
            frames: 0,
        })
    }

    pub fn device(&self) -> &Rc<Device<D>> {
        &self.device
    }

    pub fn swapchain(&self) -> &Swapchain<D> {
        &self.swapchain
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    pub fn set_clear_color(&mut self, rgba: [f32; 4]) {
        self.frame.set_clear_color(rgba);
    }

    /// One full acquire → record → submit → present → idle cycle.
    pub fn render(&mut self) -> Result<u32> {
        let index = self.frame.draw(&self.swapchain)?;
        self.frames += 1;
        Ok(index)
    }

    /// Pumps, then renders, until the pump asks to exit or `max_frames` is
    /// reached. Returns the number of frames presented by this call.
    pub fn run(
        &mut self,
        mut pump: impl FnMut() -> LoopSignal,
        max_frames: Option<u64>,
    ) -> Result<u64> {
        let mut presented = 0;
        while max_frames.map_or(true, |max| presented < max) {
            if pump() == LoopSignal::Exit {
                info!("close requested after {presented} frames");
                break;
            }
            self.render()?;
            presented += 1;
        }
        Ok(presented)
    }

    /// Rebuilds the swapchain for `size`, chaining the current one as
    /// `oldSwapchain`. The old chain and its views are released after the
    /// new one exists.
    pub fn recreate_swapchain(&mut self, size: RenderSize) -> Result<()> {
        self.device.wait_idle()?;
        let next = Swapchain::new(&self.device, &self.surface, size, Some(&self.swapchain))?;
        self.swapchain = next;
        Ok(())
    }
}
