// SPDX-License-Identifier: CEPL-1.0
#![deny(unsafe_op_in_unsafe_fn)]
use std::path::PathBuf;
use std::process::ExitCode;
use std::rc::Rc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info};
use vkclear_core::init_tracing;
use vkclear_platform::{Platform, PumpStatus, WindowDesc};
use vkclear_render::{version_string, LoopSignal, PresentTarget, RenderConfig, RenderSize, Renderer};
use vkclear_render_vk::AshDriver;

mod config;

use config::AppCfg;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file
    #[arg(long, default_value = config::DEFAULT_PATH)]
    config: PathBuf,
    /// Exit after presenting this many frames
    #[arg(long)]
    frames: Option<u64>,
    /// Skip the validation layer and debug messenger
    #[arg(long)]
    no_validation: bool,
    /// Window width in pixels
    #[arg(long)]
    width: Option<u32>,
    /// Window height in pixels
    #[arg(long)]
    height: Option<u32>,
}

impl Args {
    fn apply(&self, cfg: &mut AppCfg) {
        if let Some(w) = self.width {
            cfg.window.width = w;
        }
        if let Some(h) = self.height {
            cfg.window.height = h;
        }
        if self.no_validation {
            cfg.render.validation = false;
        }
    }
}

fn run(args: &Args) -> Result<u64> {
    let mut cfg = config::load(&args.config);
    args.apply(&mut cfg);

    let mut platform = Platform::open(WindowDesc {
        title: cfg.window.title.clone(),
        width: cfg.window.width.max(1),
        height: cfg.window.height.max(1),
    })?;
    let (display, window) = platform.raw_handles()?;
    let (width, height) = platform.size();
    let target = PresentTarget {
        display,
        window,
        size: RenderSize { width, height },
    };

    let driver = Rc::new(AshDriver::load().context("load Vulkan loader")?);
    let render_cfg = RenderConfig {
        app_name: cfg.window.title.clone(),
        validation: cfg.render.validation,
        clear_color: cfg.render.clear_color,
        ..RenderConfig::default()
    };
    info!(
        "validation = {}, api floor = {}",
        render_cfg.validation,
        version_string(render_cfg.api_version)
    );

    // Declared after the platform so it drops before the window.
    let mut renderer = Renderer::new(driver, &target, &render_cfg).context("renderer init")?;
    let frames = renderer
        .run(
            || match platform.pump() {
                PumpStatus::Continue => LoopSignal::Continue,
                PumpStatus::CloseRequested => LoopSignal::Exit,
            },
            args.frames,
        )
        .context("frame loop")?;
    Ok(frames)
}

fn main() -> ExitCode {
    init_tracing();
    let args = Args::parse();
    match run(&args) {
        Ok(frames) => {
            info!("presented {frames} frames, shutting down");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}
