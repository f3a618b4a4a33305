//! Sprite demo application
//!
//! Draws a field of rotating sprites and a text panel on top.
//! Escape quits, B toggles batching, P cycles the perspective warp.

use std::time::Instant;

use glfw::{Action, Key, WindowEvent};
use sprite_engine::config::Config;
use sprite_engine::foundation::logging;
use sprite_engine::foundation::math::{Vec2, Vec4};
use sprite_engine::render::glfw_window::GlfwWindow;
use sprite_engine::render::{
    BatchMode, FileShaderSource, FontdueGlyphSource, GlyphSource, PerspectiveMode, RendererConfig, SpriteRenderer,
};
use sprite_engine::texture::Texture;

const CONFIG_PATH: &str = "sprite_demo.toml";
const FONT_PATH: &str = "resources/fonts/demo.ttf";
const GRID: usize = 12;

fn checkerboard(size: u32, cell: u32) -> Vec<u8> {
    let mut pixels = Vec::with_capacity((size * size * 4) as usize);
    for y in 0..size {
        for x in 0..size {
            let light = ((x / cell) + (y / cell)) % 2 == 0;
            let value = if light { 230 } else { 60 };
            pixels.extend_from_slice(&[value, value, 255, 255]);
        }
    }
    pixels
}

fn next_perspective(mode: PerspectiveMode) -> PerspectiveMode {
    match mode {
        PerspectiveMode::None => PerspectiveMode::Globe,
        PerspectiveMode::Globe => PerspectiveMode::VanishingPoint,
        PerspectiveMode::VanishingPoint => PerspectiveMode::Fisheye,
        PerspectiveMode::Fisheye => PerspectiveMode::None,
    }
}

fn load_config() -> RendererConfig {
    match RendererConfig::load_from_file(CONFIG_PATH) {
        Ok(config) => {
            log::info!("Loaded {CONFIG_PATH}");
            config
        }
        Err(e) => {
            log::info!("Using default configuration ({e})");
            RendererConfig::new("Sprite Demo")
        }
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    logging::init_with_level(log::LevelFilter::Info);

    let config = load_config();
    let mut window = GlfwWindow::new(&config.application_name, 1024, 768)?;
    let shaders = FileShaderSource::new(&config.shaders);

    let font = match FontdueGlyphSource::from_file(FONT_PATH) {
        Ok(font) => Some(font),
        Err(e) => {
            log::warn!("No demo font: {e}");
            None
        }
    };
    let glyphs = font.as_ref().map(|f| f as &dyn GlyphSource);

    let mut renderer = SpriteRenderer::init(&mut window, &config, &shaders, glyphs)?;
    let mut sprite = Texture::from_data(&checkerboard(64, 8), 64, 64, 4, true, None)?;

    let start = Instant::now();
    let mut perspective = config.perspective.mode;
    let mut batch_mode = config.batch_mode;

    while !window.should_close() {
        window.poll_events();

        let events: Vec<_> = window.flush_events().collect();
        for (_, event) in events {
            match event {
                WindowEvent::Key(Key::Escape, _, Action::Press, _) => window.set_should_close(true),
                WindowEvent::Key(Key::B, _, Action::Press, _) => {
                    batch_mode = match batch_mode {
                        BatchMode::Immediate => BatchMode::Coalesced,
                        BatchMode::Coalesced => BatchMode::Immediate,
                    };
                    renderer.set_batch_mode(batch_mode);
                }
                WindowEvent::Key(Key::P, _, Action::Press, _) => {
                    perspective = next_perspective(perspective);
                    renderer.set_perspective_mode(perspective);
                }
                WindowEvent::FramebufferSize(width, height) => {
                    renderer.notify_resized();
                    if width > 0 && height > 0 {
                        renderer.set_orthographic(width as f32, height as f32);
                    }
                }
                _ => {}
            }
        }

        if !renderer.begin_frame(&mut window) {
            continue;
        }

        let t = start.elapsed().as_secs_f32();
        let (width, height) = renderer.extent();
        let step = Vec2::new(width as f32 / GRID as f32, height as f32 / GRID as f32);

        for row in 0..GRID {
            for col in 0..GRID {
                let corner = Vec2::new((col as f32 + 0.2) * step.x, (row as f32 + 0.2) * step.y);
                let rotation = t + (row * GRID + col) as f32 * 0.1;
                renderer.draw_sprite(&mut sprite, corner, step * 0.6, rotation);
            }
        }

        renderer.suspend_perspective();
        renderer.draw_colored_rect(
            Vec2::new(8.0, height as f32 - 56.0),
            Vec2::new(220.0, 48.0),
            0.0,
            Vec4::new(0.1, 0.1, 0.1, 0.7),
        );
        let stats = format!("draws: {}\n{batch_mode:?} / {perspective:?}", renderer.draw_call_count());
        renderer.draw_text(&stats, Vec2::new(16.0, height as f32 - 24.0), Vec4::new(1.0, 1.0, 0.6, 1.0));
        renderer.resume_perspective();

        renderer.end_frame(&mut window);
    }

    renderer.shutdown();
    log::info!("Sprite demo completed");
    Ok(())
}
