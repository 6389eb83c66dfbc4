// SPDX-License-Identifier: CEPL-1.0
//! A single fixed-size window driven by non-blocking event pumping, so the
//! frame loop stays in control of the thread.
#![deny(unsafe_op_in_unsafe_fn)]

use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use tracing::{debug, info};

pub use winit;

use winit::{
    application::ApplicationHandler,
    dpi::PhysicalSize,
    error::OsError,
    event::WindowEvent,
    event_loop::{ActiveEventLoop, EventLoop},
    platform::pump_events::{EventLoopExtPumpEvents, PumpStatus as WinitPumpStatus},
    raw_window_handle::{HasDisplayHandle, HasWindowHandle, RawDisplayHandle, RawWindowHandle},
    window::{Window, WindowId},
};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WindowDesc {
    pub title: String,
    pub width: u32,
    pub height: u32,
}

/// Result of one [`Platform::pump`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PumpStatus {
    Continue,
    CloseRequested,
}

impl PumpStatus {
    fn from_pump(close_requested: bool, status: WinitPumpStatus) -> Self {
        match status {
            WinitPumpStatus::Exit(_) => PumpStatus::CloseRequested,
            WinitPumpStatus::Continue if close_requested => PumpStatus::CloseRequested,
            WinitPumpStatus::Continue => PumpStatus::Continue,
        }
    }
}

struct Handler {
    desc: WindowDesc,
    window: Option<Window>,
    opened: bool,
    close_requested: bool,
    error: Option<OsError>,
}

impl ApplicationHandler for Handler {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.opened || self.window.is_some() {
            return;
        }
        let attrs = Window::default_attributes()
            .with_title(self.desc.title.as_str())
            .with_inner_size(PhysicalSize::new(self.desc.width, self.desc.height))
            .with_resizable(false)
            .with_visible(true);
        match event_loop.create_window(attrs) {
            Ok(window) => self.window = Some(window),
            Err(e) => {
                self.error = Some(e);
                event_loop.exit();
            }
        }
    }

    fn window_event(&mut self, _event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => {
                info!("CloseRequested");
                self.close_requested = true;
            }
            WindowEvent::Resized(size) => {
                debug!("Resized → {}x{} (ignored)", size.width, size.height);
            }
            _ => {}
        }
    }
}

/// Owns the event loop and the window. The window drops first.
pub struct Platform {
    window: Window,
    handler: Handler,
    event_loop: EventLoop<()>,
}

impl Platform {
    /// Creates the event loop and pumps it until the window exists.
    pub fn open(desc: WindowDesc) -> Result<Self> {
        let mut event_loop: EventLoop<()> = EventLoop::new().context("create event loop")?;
        let mut handler = Handler {
            desc,
            window: None,
            opened: false,
            close_requested: false,
            error: None,
        };

        let window = loop {
            let status = event_loop.pump_app_events(Some(Duration::ZERO), &mut handler);
            if let Some(e) = handler.error.take() {
                return Err(anyhow!(e).context("create window"));
            }
            if let Some(window) = handler.window.take() {
                break window;
            }
            if let WinitPumpStatus::Exit(code) = status {
                bail!("event loop exited with code {code} before the window opened");
            }
        };
        handler.opened = true;

        let size = window.inner_size();
        info!(
            "window \"{}\" open at {}x{}",
            handler.desc.title, size.width, size.height
        );
        Ok(Self {
            window,
            handler,
            event_loop,
        })
    }

    /// Drains pending events without blocking.
    pub fn pump(&mut self) -> PumpStatus {
        let status = self
            .event_loop
            .pump_app_events(Some(Duration::ZERO), &mut self.handler);
        PumpStatus::from_pump(self.handler.close_requested, status)
    }

    /// Current drawable size in pixels, never zero.
    pub fn size(&self) -> (u32, u32) {
        let size = self.window.inner_size();
        (size.width.max(1), size.height.max(1))
    }

    pub fn raw_handles(&self) -> Result<(RawDisplayHandle, RawWindowHandle)> {
        let display = self.window.display_handle().context("display handle")?;
        let window = self.window.window_handle().context("window handle")?;
        Ok((display.as_raw(), window.as_raw()))
    }
}
