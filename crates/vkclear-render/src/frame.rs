// SPDX-License-Identifier: CEPL-1.0
//! Per-frame protocol.
//!
//! One frame in flight, strictly sequential:
//!
//! ```text
//! acquire ──(image_available)──▶ submit ──(render_finished)──▶ present ──▶ device idle
//! ```
//!
//! The idle wait at the end of every frame is what lets a single command
//! buffer and a single pair of semaphores be reused without fences. Moving
//! to several frames in flight means a fence and semaphore pair per frame.

use std::rc::Rc;

use ash::vk;
use tracing::{trace, warn};

use crate::device::Device;
use crate::driver::{Driver, ImageBarrier, SubmitDesc};
use crate::error::{Error, Result};
use crate::swapchain::{Swapchain, COLOR_RANGE};

/// What the event pump reports back to the frame loop.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoopSignal {
    Continue,
    Exit,
}

pub struct CommandPool<D: Driver> {
    device: Rc<Device<D>>,
    raw: vk::CommandPool,
}

impl<D: Driver> CommandPool<D> {
    /// Transient pool on the graphics family; reset as a whole each frame.
    pub fn new(device: &Rc<Device<D>>) -> Result<Rc<Self>> {
        // SAFETY: the family was requested at device creation.
        let raw = unsafe {
            device.driver().create_command_pool(
                device.raw(),
                device.adapter().graphics_family,
                vk::CommandPoolCreateFlags::TRANSIENT,
            )
        }
        .map_err(Error::create("vkCreateCommandPool"))?;
        Ok(Rc::new(Self {
            device: Rc::clone(device),
            raw,
        }))
    }

    pub fn raw(&self) -> vk::CommandPool {
        self.raw
    }

    /// Returns every buffer of the pool to the initial state.
    pub fn reset(&self) -> Result<()> {
        // SAFETY: the only buffer is not pending; the previous frame ended
        // with a device idle wait.
        unsafe { self.device.driver().reset_command_pool(self.device.raw(), self.raw) }
            .map_err(Error::frame("vkResetCommandPool"))
    }
}

impl<D: Driver> Drop for CommandPool<D> {
    fn drop(&mut self) {
        // SAFETY: buffers hold an Rc to the pool and are freed already.
        unsafe { self.device.driver().destroy_command_pool(self.device.raw(), self.raw) };
    }
}

pub struct CommandBuffer<D: Driver> {
    pool: Rc<CommandPool<D>>,
    raw: vk::CommandBuffer,
}

impl<D: Driver> CommandBuffer<D> {
    pub fn new(pool: &Rc<CommandPool<D>>) -> Result<Self> {
        let device = &pool.device;
        // SAFETY: pool is alive and belongs to `device`.
        let raw = unsafe { device.driver().allocate_command_buffer(device.raw(), pool.raw) }
            .map_err(Error::create("vkAllocateCommandBuffers"))?;
        Ok(Self {
            pool: Rc::clone(pool),
            raw,
        })
    }

    pub fn raw(&self) -> vk::CommandBuffer {
        self.raw
    }
}

impl<D: Driver> Drop for CommandBuffer<D> {
    fn drop(&mut self) {
        let device = &self.pool.device;
        // SAFETY: not pending, see FrameExecutor::drop.
        unsafe {
            device
                .driver()
                .free_command_buffer(device.raw(), self.pool.raw, self.raw)
        };
    }
}

pub struct Semaphore<D: Driver> {
    device: Rc<Device<D>>,
    raw: vk::Semaphore,
}

impl<D: Driver> Semaphore<D> {
    pub fn new(device: &Rc<Device<D>>) -> Result<Self> {
        // SAFETY: device is alive.
        let raw = unsafe { device.driver().create_semaphore(device.raw()) }
            .map_err(Error::create("vkCreateSemaphore"))?;
        Ok(Self {
            device: Rc::clone(device),
            raw,
        })
    }

    pub fn raw(&self) -> vk::Semaphore {
        self.raw
    }
}

impl<D: Driver> Drop for Semaphore<D> {
    fn drop(&mut self) {
        // SAFETY: no queue operation waits on or signals it after idle.
        unsafe { self.device.driver().destroy_semaphore(self.device.raw(), self.raw) };
    }
}

/// Owns the command buffer and the two semaphores of the single frame.
///
/// Fields drop in declaration order, which is the reverse of creation.
pub struct FrameExecutor<D: Driver> {
    render_finished: Semaphore<D>,
    image_available: Semaphore<D>,
    cmd: CommandBuffer<D>,
    clear_color: [f32; 4],
}

impl<D: Driver> FrameExecutor<D> {
    pub fn new(device: &Rc<Device<D>>, clear_color: [f32; 4]) -> Result<Self> {
        let pool = CommandPool::new(device)?;
        let cmd = CommandBuffer::new(&pool)?;
        let image_available = Semaphore::new(device)?;
        let render_finished = Semaphore::new(device)?;
        Ok(Self {
            render_finished,
            image_available,
            cmd,
            clear_color,
        })
    }

    pub fn set_clear_color(&mut self, rgba: [f32; 4]) {
        self.clear_color = rgba;
    }

    fn device(&self) -> &Rc<Device<D>> {
        &self.cmd.pool.device
    }

    /// Acquire, record, submit, present, then wait for idle. Returns the
    /// presented image index. Any failure is fatal for the loop.
    pub fn draw(&mut self, swapchain: &Swapchain<D>) -> Result<u32> {
        let device = Rc::clone(self.device());
        let driver = device.driver();

        // SAFETY: the swapchain lives on this device; the semaphore is
        // unsignaled because the previous frame was fully waited on.
        let (index, suboptimal) = unsafe {
            driver.acquire_next_image(device.raw(), swapchain.raw(), self.image_available.raw)
        }
        .map_err(Error::frame("vkAcquireNextImageKHR"))?;
        if suboptimal {
            return Err(Error::FrameOperationFailed {
                op: "vkAcquireNextImageKHR",
                result: vk::Result::SUBOPTIMAL_KHR,
            });
        }

        let image = *swapchain
            .images()
            .get(index as usize)
            .ok_or(Error::FrameOperationFailed {
                op: "vkAcquireNextImageKHR",
                result: vk::Result::ERROR_OUT_OF_DATE_KHR,
            })?;
        self.record(image)?;

        let submit = SubmitDesc {
            wait_semaphore: self.image_available.raw,
            wait_stage: vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
            command_buffer: self.cmd.raw,
            signal_semaphore: self.render_finished.raw,
        };
        // SAFETY: the buffer is fully recorded and not pending.
        unsafe { driver.queue_submit(device.graphics_queue(), &submit) }
            .map_err(Error::frame("vkQueueSubmit"))?;

        // SAFETY: `index` was acquired above and is presented exactly once.
        let suboptimal = unsafe {
            driver.queue_present(
                device.present_queue(),
                swapchain.raw(),
                index,
                self.render_finished.raw,
            )
        }
        .map_err(Error::frame("vkQueuePresentKHR"))?;
        if suboptimal {
            return Err(Error::FrameOperationFailed {
                op: "vkQueuePresentKHR",
                result: vk::Result::SUBOPTIMAL_KHR,
            });
        }

        device.wait_idle()?;
        trace!("presented image {index}");
        Ok(index)
    }

    /// Layout transition, clear, transition to present.
    fn record(&self, image: vk::Image) -> Result<()> {
        let device = self.device();
        let driver = device.driver();
        let cmd = self.cmd.raw;

        self.cmd.pool.reset()?;
        // SAFETY (block): the buffer was reset with its pool and is not
        // pending; `image` belongs to the swapchain and was just acquired.
        unsafe {
            driver
                .begin_command_buffer(cmd, vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT)
                .map_err(Error::frame("vkBeginCommandBuffer"))?;

            // Source stage matches the semaphore wait stage so the
            // transition happens after the presentation engine lets go.
            driver.cmd_image_barrier(
                cmd,
                &ImageBarrier {
                    image,
                    src_stage: vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
                    dst_stage: vk::PipelineStageFlags::TRANSFER,
                    src_access: vk::AccessFlags::empty(),
                    dst_access: vk::AccessFlags::TRANSFER_WRITE,
                    old_layout: vk::ImageLayout::UNDEFINED,
                    new_layout: vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                    range: COLOR_RANGE,
                },
            );
            driver.cmd_clear_color_image(
                cmd,
                image,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                self.clear_color,
                COLOR_RANGE,
            );
            driver.cmd_image_barrier(
                cmd,
                &ImageBarrier {
                    image,
                    src_stage: vk::PipelineStageFlags::TRANSFER,
                    dst_stage: vk::PipelineStageFlags::BOTTOM_OF_PIPE,
                    src_access: vk::AccessFlags::TRANSFER_WRITE,
                    dst_access: vk::AccessFlags::empty(),
                    old_layout: vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                    new_layout: vk::ImageLayout::PRESENT_SRC_KHR,
                    range: COLOR_RANGE,
                },
            );

            driver
                .end_command_buffer(cmd)
                .map_err(Error::frame("vkEndCommandBuffer"))
        }
    }
}

impl<D: Driver> Drop for FrameExecutor<D> {
    fn drop(&mut self) {
        // Nothing may be pending when the semaphores and buffer go away.
        if let Err(e) = self.device().wait_idle() {
            warn!("wait idle before teardown: {e}");
        }
    }
}
