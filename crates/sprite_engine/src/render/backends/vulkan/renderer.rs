//! Vulkan sprite renderer
//!
//! Owns the whole GPU context and drives the frame loop:
//! `begin_frame` → draws → `end_frame`, two frames in flight.
//!
//! Initialization is all-or-nothing and returns an error. Everything after
//! that degrades instead of failing: a bad frame is logged and skipped, a draw
//! that cannot be resolved is dropped or drawn with the white placeholder.

use std::rc::Rc;

use ash::{vk, Device};

use super::initialization::context::{VkResultExt, VulkanContext, VulkanError, VulkanResult};
use super::rendering::commands::CommandPool;
use super::rendering::recorder::VulkanDrawRecorder;
use super::rendering::render_pass::RenderPass;
use super::rendering::shader::{ShaderModule, SpritePipeline};
use super::resources::buffer::{Buffer, MappedBuffer, HOST_COHERENT};
use super::resources::descriptor_set::{
    DescriptorCache, DescriptorSetLayout, DescriptorSetLayoutBuilder, VulkanDescriptorAllocator,
};
use super::resources::glyph_cache::GlyphCache;
use super::resources::image_upload::VulkanImageUploader;
use super::resources::texture_cache::{CachedTexture, TextureCache};
use super::state::framebuffer::Framebuffer;
use super::state::sync::FrameSync;
use crate::foundation::math::{orthographic, Mat4, Vec2, Vec3, Vec4};
use crate::render::batch::{build_quad, BatchKey, SpriteBatcher, SpritePushConstants, SpriteVertex, UvRect};
use crate::render::config::{BatchMode, RendererConfig};
use crate::render::perspective::{PerspectiveMode, PerspectiveWarp};
use crate::render::shader_source::{ShaderSource, SPRITE_FRAGMENT, SPRITE_VERTEX};
use crate::render::text::{layout_text, outlined_glyph_draws, GlyphSource};
use crate::render::window::{wait_for_nonzero_extent, RenderWindow};
use crate::texture::{ImageUploader, Texture};

/// Frames the CPU may record ahead of the GPU
pub const MAX_FRAMES_IN_FLIGHT: usize = 2;

/// A viewport rectangle in framebuffer pixels, Y up from the bottom edge
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewportRect {
    /// Left edge
    pub x: f32,
    /// Bottom edge
    pub y: f32,
    /// Width
    pub width: f32,
    /// Height
    pub height: f32,
}

impl ViewportRect {
    /// Whole framebuffer
    pub fn full(extent: vk::Extent2D) -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            width: extent.width as f32,
            height: extent.height as f32,
        }
    }

    /// Vulkan viewport with a negative height, so +Y points up.
    ///
    /// Vulkan's origin is the top-left, so the rect's bottom edge lands at
    /// `framebuffer_height - y`.
    pub fn to_flipped_viewport(self, framebuffer_height: f32) -> vk::Viewport {
        vk::Viewport {
            x: self.x,
            y: framebuffer_height - self.y,
            width: self.width,
            height: -self.height,
            min_depth: 0.0,
            max_depth: 1.0,
        }
    }
}

/// Index pattern for `quads` quads of four vertices each
pub fn quad_indices(quads: usize) -> Vec<u32> {
    (0..quads as u32)
        .flat_map(|q| {
            let base = q * 4;
            [base, base + 1, base + 2, base + 2, base + 3, base]
        })
        .collect()
}

struct FrameResources {
    command_buffer: vk::CommandBuffer,
    sync: FrameSync,
    vertices: MappedBuffer<SpriteVertex>,
}

#[derive(Debug, Clone, Copy)]
struct ActiveFrame {
    image_index: u32,
    command_buffer: vk::CommandBuffer,
}

/// Batched 2D sprite renderer over Vulkan
pub struct SpriteRenderer {
    // GPU objects, dropped in declaration order before `context`
    frames: Vec<FrameResources>,
    quad_index_buffer: Buffer,
    framebuffers: Vec<Framebuffer>,
    descriptors: DescriptorCache<VulkanDescriptorAllocator>,
    glyphs: Option<GlyphCache>,
    texture_cache: TextureCache,
    white_texture: Texture,
    uploader: Rc<VulkanImageUploader>,
    command_pool: CommandPool,
    pipeline: SpritePipeline,
    descriptor_set_layout: DescriptorSetLayout,
    render_pass: RenderPass,
    context: VulkanContext,

    // Frame state
    batcher: SpriteBatcher,
    current_frame: usize,
    active_frame: Option<ActiveFrame>,
    framebuffer_resized: bool,
    outside_frame_reported: bool,
    pruned_at_destroy_count: u64,
    shut_down: bool,

    // Draw state
    clear_color: [f32; 4],
    projection: Mat4,
    ambient: Vec3,
    viewport: Option<ViewportRect>,
    warp: PerspectiveWarp,
}

impl SpriteRenderer {
    /// Build the renderer for `window`.
    ///
    /// Text is disabled when `glyphs` is `None`. Missing shader bytecode or
    /// any failing Vulkan call aborts initialization.
    pub fn init(
        window: &mut dyn RenderWindow,
        config: &RendererConfig,
        shaders: &dyn ShaderSource,
        glyphs: Option<&dyn GlyphSource>,
    ) -> VulkanResult<Self> {
        config
            .validate()
            .map_err(|e| VulkanError::InitializationFailed(e.to_string()))?;
        log::debug!("Creating SpriteRenderer...");

        let context = VulkanContext::new(
            window,
            &config.application_name,
            config.packed_version(),
            config.validation_enabled(),
            config.prefer_low_latency,
        )?;
        let device = context.raw_device();
        let memory_properties = context.physical_device.memory_properties;

        let render_pass = RenderPass::new_sprite_pass(device.clone(), context.swapchain.format().format)?;

        let vertex_code = shaders
            .load(SPRITE_VERTEX)
            .ok_or_else(|| VulkanError::ShaderMissing(SPRITE_VERTEX.to_string()))?;
        let fragment_code = shaders
            .load(SPRITE_FRAGMENT)
            .ok_or_else(|| VulkanError::ShaderMissing(SPRITE_FRAGMENT.to_string()))?;
        let vertex_shader = ShaderModule::from_bytes(device.clone(), &vertex_code)?;
        let fragment_shader = ShaderModule::from_bytes(device.clone(), &fragment_code)?;

        let descriptor_set_layout = DescriptorSetLayoutBuilder::new()
            .add_combined_image_sampler(0, vk::ShaderStageFlags::FRAGMENT)
            .build(&device)?;
        let pipeline = SpritePipeline::new(
            device.clone(),
            render_pass.handle(),
            &vertex_shader,
            &fragment_shader,
            descriptor_set_layout.handle(),
        )?;
        drop(vertex_shader);
        drop(fragment_shader);

        let extent = context.swapchain.extent();
        let framebuffers =
            Framebuffer::for_views(&device, render_pass.handle(), context.swapchain.image_views(), extent)?;

        let command_pool = CommandPool::new(
            device.clone(),
            context.graphics_queue_family(),
            vk::CommandPoolCreateFlags::empty(),
        )?;
        let command_buffers = command_pool.allocate_command_buffers(MAX_FRAMES_IN_FLIGHT as u32)?;

        let vertex_capacity = config.max_sprites_per_frame * 6;
        let frames = command_buffers
            .into_iter()
            .map(|command_buffer| -> VulkanResult<FrameResources> {
                Ok(FrameResources {
                    command_buffer,
                    sync: FrameSync::new(&device)?,
                    vertices: MappedBuffer::new(
                        device.clone(),
                        &memory_properties,
                        vertex_capacity,
                        vk::BufferUsageFlags::VERTEX_BUFFER,
                    )?,
                })
            })
            .collect::<VulkanResult<Vec<_>>>()?;

        let indices = quad_indices(config.max_sprites_per_frame);
        let quad_index_buffer = Buffer::new(
            device.clone(),
            &memory_properties,
            std::mem::size_of_val(indices.as_slice()) as vk::DeviceSize,
            vk::BufferUsageFlags::INDEX_BUFFER,
            HOST_COHERENT,
        )?;
        quad_index_buffer.write_data(&indices)?;

        let uploader = Rc::new(VulkanImageUploader::new(
            context.instance(),
            context.physical_device.device,
            memory_properties,
            device.clone(),
            context.graphics_queue_family(),
            context.graphics_queue(),
        )?);
        let dyn_uploader: Rc<dyn ImageUploader> = uploader.clone();

        let mut white_texture = Texture::from_data(&[255; 4], 1, 1, 4, false, None)
            .map_err(|e| VulkanError::InitializationFailed(format!("White texture: {e}")))?;
        white_texture
            .create_vulkan_texture(&dyn_uploader)
            .map_err(|e| VulkanError::InitializationFailed(format!("White texture upload: {e}")))?;
        let white_resources = white_texture
            .vulkan_resources()
            .copied()
            .ok_or_else(|| VulkanError::InitializationFailed("White texture has no image".to_string()))?;

        let mut texture_cache = TextureCache::new(CachedTexture::from(&white_resources));
        texture_cache.insert(&white_texture);

        let allocator =
            VulkanDescriptorAllocator::new(device.clone(), descriptor_set_layout.handle(), config.descriptor_pool_capacity)?;
        let descriptors = DescriptorCache::new(allocator);

        let glyphs = match glyphs {
            Some(source) => {
                let cache = GlyphCache::build(source, config.font_pixel_size, dyn_uploader, white_resources.view);
                if cache.is_empty() {
                    log::warn!("Font produced no glyphs, text rendering disabled");
                    None
                } else {
                    Some(cache)
                }
            }
            None => {
                log::info!("No font supplied, text rendering disabled");
                None
            }
        };

        let mut warp = config.perspective.to_warp();
        let full = ViewportRect::full(extent);
        warp.set_view(full.x, full.y, full.width, full.height);

        log::info!(
            "SpriteRenderer ready: {}x{} {:?}, {:?}, {} sprites per frame",
            extent.width,
            extent.height,
            context.swapchain.format().format,
            context.swapchain.present_mode(),
            config.max_sprites_per_frame
        );

        Ok(Self {
            frames,
            quad_index_buffer,
            framebuffers,
            descriptors,
            glyphs,
            texture_cache,
            white_texture,
            uploader,
            command_pool,
            pipeline,
            descriptor_set_layout,
            render_pass,
            context,
            batcher: SpriteBatcher::new(config.batch_mode, config.max_sprites_per_frame),
            current_frame: 0,
            active_frame: None,
            framebuffer_resized: false,
            outside_frame_reported: false,
            pruned_at_destroy_count: 0,
            shut_down: false,
            clear_color: config.clear_color,
            projection: orthographic(extent.width as f32, extent.height as f32),
            ambient: Vec3::new(1.0, 1.0, 1.0),
            viewport: None,
            warp,
        })
    }

    /// Release every GPU resource the renderer created.
    ///
    /// Textures still owned by the caller have their images destroyed here
    /// and drop without GPU calls afterwards. Safe to call more than once.
    pub fn shutdown(&mut self) {
        if self.shut_down {
            return;
        }
        log::debug!("Shutting down SpriteRenderer");

        if let Err(e) = self.wait_idle() {
            log::error!("Device wait failed during shutdown: {e}");
        }
        self.active_frame = None;
        self.glyphs = None;
        self.white_texture.destroy_vulkan_texture();
        self.texture_cache.clear();
        self.descriptors.clear();
        self.uploader.release_all();
        self.shut_down = true;
    }

    /// Wait until the GPU has finished all submitted work
    pub fn wait_idle(&self) -> VulkanResult<()> {
        unsafe { self.device().device_wait_idle() }.vk_context("vkDeviceWaitIdle")
    }

    fn device(&self) -> &Device {
        &self.context.device.device
    }

    /// Start a frame. Returns false when nothing should be drawn this frame.
    pub fn begin_frame(&mut self, window: &mut dyn RenderWindow) -> bool {
        if self.shut_down {
            return false;
        }
        if self.active_frame.is_some() {
            log::warn!("begin_frame called twice without end_frame");
            return false;
        }

        let Some(frame) = self.frames.get(self.current_frame) else {
            log::error!("Frame slot {} out of range", self.current_frame);
            return false;
        };

        if let Err(e) = frame.sync.in_flight.wait(u64::MAX) {
            log::error!("Waiting for frame {} failed: {e}", self.current_frame);
            return false;
        }
        let command_buffer = frame.command_buffer;
        let image_available = frame.sync.image_available.handle();
        self.prune_texture_cache();

        let acquired = unsafe {
            self.context.swapchain_loader().acquire_next_image(
                self.context.swapchain.handle(),
                u64::MAX,
                image_available,
                vk::Fence::null(),
            )
        };
        let image_index = match acquired {
            Ok((index, suboptimal)) => {
                if suboptimal {
                    self.framebuffer_resized = true;
                }
                if let Some(frame) = self.frames.get_mut(self.current_frame) {
                    frame.sync.acquire.acquired();
                }
                index
            }
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => {
                log::debug!("Swapchain out of date on acquire, recreating");
                if let Err(e) = self.recreate_swapchain(window) {
                    log::error!("Swapchain recreation failed: {e}");
                }
                return false;
            }
            Err(e) => {
                log::warn!("Failed to acquire swapchain image: {e:?}");
                return false;
            }
        };

        if let Err(e) = self.record_frame_start(command_buffer, image_index) {
            log::error!("Failed to start frame recording: {e}");
            self.recover_acquire(self.current_frame);
            return false;
        }

        self.batcher.begin_frame();
        self.outside_frame_reported = false;
        self.active_frame = Some(ActiveFrame {
            image_index,
            command_buffer,
        });
        true
    }

    fn record_frame_start(&self, command_buffer: vk::CommandBuffer, image_index: u32) -> VulkanResult<()> {
        let device = self.device();
        let framebuffer = self
            .framebuffers
            .get(image_index as usize)
            .ok_or_else(|| VulkanError::InvalidOperation {
                reason: format!("no framebuffer for swapchain image {image_index}"),
            })?;
        let extent = framebuffer.extent();

        unsafe {
            device
                .reset_command_buffer(command_buffer, vk::CommandBufferResetFlags::empty())
                .vk_context("vkResetCommandBuffer")?;
            let begin_info = vk::CommandBufferBeginInfo::builder();
            device
                .begin_command_buffer(command_buffer, &begin_info)
                .vk_context("vkBeginCommandBuffer")?;

            let clear_values = [vk::ClearValue {
                color: vk::ClearColorValue {
                    float32: self.clear_color,
                },
            }];
            let render_area = vk::Rect2D {
                offset: vk::Offset2D { x: 0, y: 0 },
                extent,
            };
            let render_pass_info = vk::RenderPassBeginInfo::builder()
                .render_pass(self.render_pass.handle())
                .framebuffer(framebuffer.handle())
                .render_area(render_area)
                .clear_values(&clear_values);

            device.cmd_begin_render_pass(command_buffer, &render_pass_info, vk::SubpassContents::INLINE);
            device.cmd_bind_pipeline(command_buffer, vk::PipelineBindPoint::GRAPHICS, self.pipeline.handle());

            let viewport = self.viewport.unwrap_or_else(|| ViewportRect::full(extent));
            device.cmd_set_viewport(command_buffer, 0, &[viewport.to_flipped_viewport(extent.height as f32)]);
            device.cmd_set_scissor(command_buffer, 0, &[render_area]);
        }
        Ok(())
    }

    /// Finish, submit and present the frame started by `begin_frame`.
    ///
    /// The frame slot advances even when submission or presentation fails.
    pub fn end_frame(&mut self, window: &mut dyn RenderWindow) {
        let Some(active) = self.active_frame else {
            return;
        };
        self.flush_sprite_batch();
        self.active_frame = None;

        let slot = self.current_frame;
        self.current_frame = (self.current_frame + 1) % MAX_FRAMES_IN_FLIGHT;

        let needs_recreate = match self.submit_and_present(slot, active) {
            Ok(stale) => stale,
            Err(e) => {
                log::error!("Frame {slot} failed: {e}");
                self.recover_acquire(slot);
                false
            }
        };

        if needs_recreate || self.framebuffer_resized {
            self.framebuffer_resized = false;
            if let Err(e) = self.recreate_swapchain(window) {
                log::error!("Swapchain recreation failed: {e}");
            }
        }
    }

    /// Returns true when the swapchain no longer matches the surface.
    fn submit_and_present(&mut self, slot: usize, active: ActiveFrame) -> VulkanResult<bool> {
        let device = self.context.device.device.clone();
        let Some(frame) = self.frames.get_mut(slot) else {
            return Err(VulkanError::InvalidOperation {
                reason: format!("frame slot {slot} out of range"),
            });
        };

        unsafe {
            device.cmd_end_render_pass(active.command_buffer);
            device
                .end_command_buffer(active.command_buffer)
                .vk_context("vkEndCommandBuffer")?;
        }

        let wait_semaphores = [frame.sync.image_available.handle()];
        let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
        let signal_semaphores = [frame.sync.render_finished.handle()];
        let command_buffers = [active.command_buffer];
        let submit_info = vk::SubmitInfo::builder()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores)
            .build();

        frame.sync.in_flight.reset()?;
        let submitted = unsafe {
            device.queue_submit(self.context.graphics_queue(), &[submit_info], frame.sync.in_flight.handle())
        };
        if submitted.is_ok() {
            frame.sync.acquire.submitted();
        }
        if let Err(result) = submitted {
            // The fence is reset and nothing will signal it
            if let Err(e) = frame.sync.replace_fence(&device) {
                log::error!("Could not replace fence for frame {slot}: {e}");
            }
            return Err(VulkanError::Call {
                call: "vkQueueSubmit",
                result,
            });
        }

        let swapchains = [self.context.swapchain.handle()];
        let image_indices = [active.image_index];
        let present_info = vk::PresentInfoKHR::builder()
            .wait_semaphores(&signal_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        let presented = unsafe {
            self.context
                .swapchain_loader()
                .queue_present(self.context.present_queue(), &present_info)
        };
        match presented {
            Ok(suboptimal) => Ok(suboptimal),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(true),
            Err(result) => Err(VulkanError::Call {
                call: "vkQueuePresentKHR",
                result,
            }),
        }
    }

    fn prune_texture_cache(&mut self) {
        let destroyed = self.uploader.destroyed_count();
        if destroyed == self.pruned_at_destroy_count {
            return;
        }
        self.pruned_at_destroy_count = destroyed;
        let live = self.uploader.live_views();
        let textures = self.texture_cache.retain_live(|view| live.contains(&view));
        let sets = self.descriptors.retain_live(|view| live.contains(&view));
        if textures + sets > 0 {
            log::trace!("Pruned {textures} stale texture entries and {sets} descriptor mappings");
        }
    }

    /// Replace a slot's acquire semaphore left signaled by a frame that was
    /// never submitted, so the next acquire does not reuse a signaled
    /// semaphore.
    fn recover_acquire(&mut self, slot: usize) {
        if !self.frames.get(slot).is_some_and(|f| f.sync.acquire.is_pending()) {
            return;
        }
        if let Err(e) = self.wait_idle() {
            log::error!("Waiting before semaphore replacement failed: {e}");
        }
        let device = self.context.device.device.clone();
        if let Some(frame) = self.frames.get_mut(slot) {
            match frame.sync.recover_unwaited_acquire(&device) {
                Ok(true) => log::debug!("Replaced unwaited acquire semaphore for frame {slot}"),
                Ok(false) => {}
                Err(e) => log::error!("Could not replace acquire semaphore for frame {slot}: {e}"),
            }
        }
    }

    /// Rebuild the swapchain, image views and framebuffers for the window's
    /// current size. Blocks while the window is minimized.
    pub fn recreate_swapchain(&mut self, window: &mut dyn RenderWindow) -> VulkanResult<()> {
        let (width, height) = wait_for_nonzero_extent(window);
        self.wait_idle()?;

        self.framebuffers.clear();
        self.context.recreate_swapchain(vk::Extent2D { width, height })?;

        let extent = self.context.swapchain.extent();
        self.framebuffers = Framebuffer::for_views(
            self.device(),
            self.render_pass.handle(),
            self.context.swapchain.image_views(),
            extent,
        )?;

        if self.viewport.is_none() {
            let full = ViewportRect::full(extent);
            self.warp.set_view(full.x, full.y, full.width, full.height);
        }
        log::debug!("Swapchain recreated at {}x{}", extent.width, extent.height);
        Ok(())
    }

    /// Flag that the window was resized; the swapchain is rebuilt after the
    /// next present.
    pub fn notify_resized(&mut self) {
        self.framebuffer_resized = true;
    }

    /// Current swapchain size
    pub fn extent(&self) -> (u32, u32) {
        let extent = self.context.swapchain.extent();
        (extent.width, extent.height)
    }

    /// Draw calls recorded so far this frame
    pub fn draw_call_count(&self) -> u32 {
        self.batcher.draw_call_count()
    }

    /// Record the pending coalesced batch, if any
    pub fn flush_sprite_batch(&mut self) {
        let Some(active) = self.active_frame else {
            return;
        };
        let Some(frame) = self.frames.get(self.current_frame) else {
            log::error!("Frame slot {} out of range", self.current_frame);
            return;
        };
        let mut recorder = VulkanDrawRecorder::new(
            &self.context.device.device,
            active.command_buffer,
            self.pipeline.layout(),
            frame.vertices.handle(),
        );
        self.batcher.flush(&mut recorder);
    }

    /// Switch batching mode, flushing the pending batch first
    pub fn set_batch_mode(&mut self, mode: BatchMode) {
        self.flush_sprite_batch();
        let mut discard = NoopRecorder;
        self.batcher.set_mode(mode, &mut discard);
    }

    /// Upload a texture now instead of on first draw
    pub fn upload_texture(&mut self, texture: &mut Texture) -> bool {
        if self.shut_down {
            return false;
        }
        let uploader = self.image_uploader();
        match texture.create_vulkan_texture(&uploader) {
            Ok(()) => {
                self.texture_cache.insert(texture);
                true
            }
            Err(e) => {
                log::error!("Texture upload failed: {e}");
                false
            }
        }
    }

    /// Free a texture's GPU image now and drop its cache entry. The texture
    /// re-uploads on its next draw.
    pub fn release_texture(&mut self, texture: &mut Texture) {
        texture.destroy_vulkan_texture();
        self.texture_cache.forget(texture.id());
    }

    /// Uploader for textures created outside the renderer
    pub fn image_uploader(&self) -> Rc<dyn ImageUploader> {
        self.uploader.clone()
    }

    /// Replace the projection matrix
    pub fn set_projection(&mut self, projection: Mat4) {
        self.projection = projection;
    }

    /// Orthographic projection over `[0, width] x [0, height]`
    pub fn set_orthographic(&mut self, width: f32, height: f32) {
        self.projection = orthographic(width, height);
    }

    /// Restrict drawing to a rectangle, origin at the bottom-left.
    ///
    /// Takes effect from the next `begin_frame`.
    pub fn set_viewport(&mut self, x: f32, y: f32, width: f32, height: f32) {
        self.viewport = Some(ViewportRect { x, y, width, height });
        self.warp.set_view(x, y, width, height);
    }

    /// Multiply every draw by an ambient colour
    pub fn set_ambient(&mut self, ambient: Vec3) {
        self.ambient = ambient;
    }

    /// Select the perspective warp
    pub fn set_perspective_mode(&mut self, mode: PerspectiveMode) {
        self.warp.mode = mode;
    }

    /// Globe curvature radius in pixels
    pub fn set_globe_radius(&mut self, radius: f32) {
        self.warp.sphere_radius = radius;
    }

    /// Horizon line and the scale applied on it
    pub fn set_vanishing_point(&mut self, horizon_y: f32, horizon_scale: f32) {
        self.warp.horizon_y = horizon_y;
        self.warp.horizon_scale = horizon_scale;
    }

    /// Draw without warping until `resume_perspective`
    pub fn suspend_perspective(&mut self) {
        self.warp.suspended = true;
    }

    /// Undo `suspend_perspective`
    pub fn resume_perspective(&mut self) {
        self.warp.suspended = false;
    }

    /// Current warp parameters
    pub fn perspective(&self) -> &PerspectiveWarp {
        &self.warp
    }

    /// Shared index pattern for four-vertex quads
    pub fn quad_index_buffer(&self) -> vk::Buffer {
        self.quad_index_buffer.handle()
    }

    /// Draw a whole texture
    pub fn draw_sprite(&mut self, texture: &mut Texture, position: Vec2, size: Vec2, rotation: f32) {
        self.draw_sprite_region(texture, position, size, rotation, UvRect::full(), Vec4::new(1.0, 1.0, 1.0, 1.0));
    }

    /// Draw a whole texture with an opacity
    pub fn draw_sprite_alpha(&mut self, texture: &mut Texture, position: Vec2, size: Vec2, rotation: f32, alpha: f32) {
        self.draw_sprite_region(texture, position, size, rotation, UvRect::full(), Vec4::new(1.0, 1.0, 1.0, alpha));
    }

    /// Draw part of a texture with a tint
    pub fn draw_sprite_region(
        &mut self,
        texture: &mut Texture,
        position: Vec2,
        size: Vec2,
        rotation: f32,
        region: UvRect,
        tint: Vec4,
    ) {
        if !self.in_frame() {
            return;
        }
        let uploader = self.image_uploader();
        let resolved = self.texture_cache.resolve(texture, &uploader);
        self.draw_quad(resolved.image_view, position, size, rotation, region, tint, false, false);
    }

    /// Draw cell `index` of a `columns` x `rows` sprite sheet
    pub fn draw_sprite_atlas(
        &mut self,
        texture: &mut Texture,
        position: Vec2,
        size: Vec2,
        rotation: f32,
        columns: u32,
        rows: u32,
        index: u32,
        tint: Vec4,
    ) {
        let Some(cell) = UvRect::atlas_cell(columns, rows, index) else {
            log::warn!("Atlas cell {index} outside {columns}x{rows} grid");
            return;
        };
        self.draw_sprite_region(texture, position, size, rotation, cell, tint);
    }

    /// Draw a solid rectangle
    pub fn draw_colored_rect(&mut self, position: Vec2, size: Vec2, rotation: f32, color: Vec4) {
        if !self.in_frame() {
            return;
        }
        let white = self.texture_cache.white();
        self.draw_quad(white.image_view, position, size, rotation, UvRect::full(), color, true, false);
    }

    /// Draw `text` with its first baseline starting at `position`.
    ///
    /// A black one-pixel outline is drawn under the whole string first. Each
    /// glyph is its own draw call. Does nothing when text is disabled.
    pub fn draw_text(&mut self, text: &str, position: Vec2, color: Vec4) {
        if !self.in_frame() {
            return;
        }
        let Some(glyphs) = self.glyphs.as_ref() else {
            return;
        };

        let placements = layout_text(text, position, glyphs.line_height(), |ch| glyphs.metrics(ch));
        let quads: Vec<_> = placements
            .iter()
            .filter_map(|p| {
                let view = glyphs.get(p.ch)?.image_view?;
                Some((p.position, p.size, view))
            })
            .collect();

        let uv = UvRect::full().flipped_v();
        for draw in outlined_glyph_draws(&quads, color) {
            self.draw_quad(draw.image, draw.position, draw.size, 0.0, uv, draw.tint, false, true);
        }
    }

    fn in_frame(&mut self) -> bool {
        if self.active_frame.is_some() {
            return true;
        }
        if !self.outside_frame_reported {
            log::warn!("Draw call outside begin_frame/end_frame ignored");
            self.outside_frame_reported = true;
        }
        false
    }

    fn draw_quad(
        &mut self,
        image_view: vk::ImageView,
        position: Vec2,
        size: Vec2,
        rotation: f32,
        uv: UvRect,
        tint: Vec4,
        color_only: bool,
        isolated: bool,
    ) -> bool {
        let Some(active) = self.active_frame else {
            return false;
        };
        let descriptor_set = self.descriptors.get_or_create(image_view);
        if descriptor_set == vk::DescriptorSet::null() {
            return false;
        }

        let quad = build_quad(position, size, rotation, uv, &self.warp);
        let key = BatchKey {
            image_view,
            descriptor_set,
            constants: SpritePushConstants::new(&self.projection, tint, self.ambient, color_only),
        };

        let Some(frame) = self.frames.get_mut(self.current_frame) else {
            log::error!("Frame slot {} out of range", self.current_frame);
            return false;
        };
        let vertex_buffer = frame.vertices.handle();
        let mut recorder = VulkanDrawRecorder::new(
            &self.context.device.device,
            active.command_buffer,
            self.pipeline.layout(),
            vertex_buffer,
        );

        let vertices = frame.vertices.as_mut_slice();
        if isolated {
            self.batcher.submit_immediate(vertices, &quad, key, &mut recorder)
        } else {
            self.batcher.submit(vertices, &quad, key, &mut recorder)
        }
    }
}

impl Drop for SpriteRenderer {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Recorder for mode switches with nothing pending
struct NoopRecorder;

impl crate::render::batch::DrawRecorder for NoopRecorder {
    fn push_constants(&mut self, _constants: &SpritePushConstants) {}
    fn bind_descriptor_set(&mut self, _descriptor_set: vk::DescriptorSet) {}
    fn bind_vertex_buffer(&mut self) {}
    fn draw(&mut self, _first_vertex: u32, _vertex_count: u32) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flipped_viewport_starts_at_bottom() {
        let viewport = ViewportRect::full(vk::Extent2D { width: 800, height: 600 }).to_flipped_viewport(600.0);
        assert_eq!(viewport.y, 600.0);
        assert_eq!(viewport.height, -600.0);
        assert_eq!(viewport.width, 800.0);

        let inset = ViewportRect {
            x: 10.0,
            y: 20.0,
            width: 100.0,
            height: 50.0,
        }
        .to_flipped_viewport(600.0);
        assert_eq!((inset.x, inset.y, inset.height), (10.0, 580.0, -50.0));
    }

    #[test]
    fn test_inset_viewport_measured_from_bottom() {
        // 20px above the bottom of a 600px framebuffer covers rows 530..580
        let vp = ViewportRect {
            x: 0.0,
            y: 20.0,
            width: 100.0,
            height: 50.0,
        }
        .to_flipped_viewport(600.0);
        let bottom_row = vp.y;
        let top_row = vp.y + vp.height;
        assert_eq!((top_row, bottom_row), (530.0, 580.0));

        let flush = ViewportRect {
            x: 0.0,
            y: 0.0,
            width: 100.0,
            height: 50.0,
        }
        .to_flipped_viewport(600.0);
        assert_eq!(flush.y, 600.0);
    }

    #[test]
    fn test_quad_indices_pattern() {
        assert_eq!(quad_indices(2), vec![0, 1, 2, 2, 3, 0, 4, 5, 6, 6, 7, 4]);
        assert!(quad_indices(0).is_empty());
    }
}
