//! # Sprite batching
//!
//! CPU side of sprite submission. Quads are built from a position, size,
//! rotation and UV rectangle, warped, written into the current frame's mapped
//! vertex buffer and turned into draw calls through a [`DrawRecorder`].
//!
//! ## Modes
//!
//! - [`BatchMode::Immediate`]: every quad is drawn as soon as it is written
//! - [`BatchMode::Coalesced`]: consecutive quads sharing image view, descriptor
//!   set and push constants extend one draw call, flushed on change or at
//!   frame end
//!
//! Both modes share the vertex cursor. A quad that would pass the buffer's
//! capacity is dropped; nothing is reallocated mid-frame.

use ash::vk;

use crate::foundation::math::{mat4_to_cols, rotate_about, Mat4, Vec2, Vec3, Vec4};
use crate::render::config::BatchMode;
use crate::render::perspective::PerspectiveWarp;

/// Vertices per sprite quad (two triangles, diagonal duplicated)
pub const VERTICES_PER_QUAD: usize = 6;

/// Vertex layout consumed by the sprite pipeline
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SpriteVertex {
    /// World-space position
    pub position: [f32; 2],
    /// Texture coordinate
    pub uv: [f32; 2],
}

unsafe impl bytemuck::Pod for SpriteVertex {}
unsafe impl bytemuck::Zeroable for SpriteVertex {}

/// Per-draw push constant block (160 bytes)
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpritePushConstants {
    /// Projection matrix, column major
    pub projection: [[f32; 4]; 4],    // 64 bytes
    /// Model matrix, identity since vertices are pre-transformed
    pub model: [[f32; 4]; 4],         // 64 bytes
    /// Tint colour, alpha in `.a`
    pub tint: [f32; 4],               // 16 bytes
    /// Ambient colour in rgb, colour-only flag in the last lane
    pub ambient_color_only: [f32; 4], // 16 bytes
}

unsafe impl bytemuck::Pod for SpritePushConstants {}
unsafe impl bytemuck::Zeroable for SpritePushConstants {}

impl SpritePushConstants {
    /// Size of the block as declared in the pipeline layout
    pub const SIZE: u32 = std::mem::size_of::<Self>() as u32;

    /// Build the block for one draw
    pub fn new(projection: &Mat4, tint: Vec4, ambient: Vec3, color_only: bool) -> Self {
        Self {
            projection: mat4_to_cols(projection),
            model: mat4_to_cols(&Mat4::identity()),
            tint: [tint.x, tint.y, tint.z, tint.w],
            ambient_color_only: [ambient.x, ambient.y, ambient.z, if color_only { 1.0 } else { 0.0 }],
        }
    }

    /// True when the draw ignores its texture
    pub fn is_color_only(&self) -> bool {
        self.ambient_color_only[3] != 0.0
    }
}

/// Texture coordinates of a quad's bottom-left (`min`) and top-right (`max`)
/// corners.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UvRect {
    /// UV at the bottom-left corner
    pub min: Vec2,
    /// UV at the top-right corner
    pub max: Vec2,
}

impl UvRect {
    /// The whole texture
    pub fn full() -> Self {
        Self::new(0.0, 0.0, 1.0, 1.0)
    }

    /// Create a rectangle from corner coordinates
    pub fn new(u0: f32, v0: f32, u1: f32, v1: f32) -> Self {
        Self {
            min: Vec2::new(u0, v0),
            max: Vec2::new(u1, v1),
        }
    }

    /// Same rectangle sampled upside down, for images stored top row first
    pub fn flipped_v(self) -> Self {
        Self::new(self.min.x, self.max.y, self.max.x, self.min.y)
    }

    /// Cell `index` of a `columns` x `rows` sprite sheet.
    ///
    /// Cells are counted left to right from the top row of the picture.
    /// Textures are stored bottom row first, so the top row sits at `v = 1`.
    /// Returns `None` for an empty grid or an index past the last cell.
    pub fn atlas_cell(columns: u32, rows: u32, index: u32) -> Option<Self> {
        if columns == 0 || rows == 0 || index >= columns.saturating_mul(rows) {
            return None;
        }
        let col = (index % columns) as f32;
        let row = (index / columns) as f32;
        let cw = 1.0 / columns as f32;
        let ch = 1.0 / rows as f32;
        Some(Self::new(col * cw, 1.0 - (row + 1.0) * ch, (col + 1.0) * cw, 1.0 - row * ch))
    }
}

impl Default for UvRect {
    fn default() -> Self {
        Self::full()
    }
}

/// Build the six vertices of one sprite.
///
/// `position` is the bottom-left corner before rotation; the quad rotates
/// about its own centre by `rotation` radians, then every corner goes through
/// `warp`.
pub fn build_quad(
    position: Vec2,
    size: Vec2,
    rotation: f32,
    uv: UvRect,
    warp: &PerspectiveWarp,
) -> [SpriteVertex; VERTICES_PER_QUAD] {
    let center = position + size * 0.5;
    let local = [
        (Vec2::new(0.0, 0.0), Vec2::new(uv.min.x, uv.min.y)),
        (Vec2::new(size.x, 0.0), Vec2::new(uv.max.x, uv.min.y)),
        (Vec2::new(size.x, size.y), Vec2::new(uv.max.x, uv.max.y)),
        (Vec2::new(0.0, size.y), Vec2::new(uv.min.x, uv.max.y)),
    ];

    let corners = local.map(|(offset, tex)| {
        let mut p = position + offset;
        if rotation != 0.0 {
            p = rotate_about(p, center, rotation);
        }
        let p = warp.apply(p);
        SpriteVertex {
            position: [p.x, p.y],
            uv: [tex.x, tex.y],
        }
    });

    [corners[0], corners[1], corners[2], corners[2], corners[3], corners[0]]
}

/// The command stream a batcher drives. Implemented over a Vulkan command
/// buffer by the renderer and by a recording fake in tests.
pub trait DrawRecorder {
    /// Upload the per-draw push constant block
    fn push_constants(&mut self, constants: &SpritePushConstants);

    /// Bind the descriptor set sampling the draw's texture
    fn bind_descriptor_set(&mut self, descriptor_set: vk::DescriptorSet);

    /// Bind the current frame's vertex buffer
    fn bind_vertex_buffer(&mut self);

    /// Draw `vertex_count` vertices starting at `first_vertex`
    fn draw(&mut self, first_vertex: u32, vertex_count: u32);
}

/// Everything a quad's draw call depends on. Quads with equal keys may share
/// a draw call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BatchKey {
    /// View the draw samples
    pub image_view: vk::ImageView,
    /// Descriptor set bound to `image_view`
    pub descriptor_set: vk::DescriptorSet,
    /// Per-draw constants
    pub constants: SpritePushConstants,
}

#[derive(Debug, Clone, Copy)]
struct ActiveBatch {
    start: usize,
    vertex_count: usize,
    key: BatchKey,
}

/// Vertex cursor, draw counter and pending batch for one frame at a time
#[derive(Debug)]
pub struct SpriteBatcher {
    mode: BatchMode,
    capacity: usize,
    cursor: usize,
    draw_calls: u32,
    dropped: u32,
    overflow_reported: bool,
    active: Option<ActiveBatch>,
}

impl SpriteBatcher {
    /// Create a batcher for buffers holding `max_sprites` quads
    pub fn new(mode: BatchMode, max_sprites: usize) -> Self {
        Self {
            mode,
            capacity: max_sprites * VERTICES_PER_QUAD,
            cursor: 0,
            draw_calls: 0,
            dropped: 0,
            overflow_reported: false,
            active: None,
        }
    }

    /// Reset the cursor and counters. Any pending batch is discarded.
    pub fn begin_frame(&mut self) {
        if self.dropped > 0 {
            log::debug!("Previous frame dropped {} sprites on vertex buffer overflow", self.dropped);
        }
        self.cursor = 0;
        self.draw_calls = 0;
        self.dropped = 0;
        self.overflow_reported = false;
        self.active = None;
    }

    /// Current mode
    pub fn mode(&self) -> BatchMode {
        self.mode
    }

    /// Switch modes, flushing whatever is pending first
    pub fn set_mode(&mut self, mode: BatchMode, recorder: &mut dyn DrawRecorder) {
        self.flush(recorder);
        self.mode = mode;
    }

    /// Vertices written this frame
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Vertex capacity of one frame's buffer
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Draw calls recorded this frame
    pub fn draw_call_count(&self) -> u32 {
        self.draw_calls
    }

    /// Quads dropped this frame for lack of space
    pub fn dropped_count(&self) -> u32 {
        self.dropped
    }

    /// True when a coalesced batch is waiting to be drawn
    pub fn has_pending(&self) -> bool {
        self.active.is_some()
    }

    /// Queue one quad according to the current mode.
    ///
    /// Returns false if the quad was dropped.
    pub fn submit(
        &mut self,
        vertices: &mut [SpriteVertex],
        quad: &[SpriteVertex; VERTICES_PER_QUAD],
        key: BatchKey,
        recorder: &mut dyn DrawRecorder,
    ) -> bool {
        match self.mode {
            BatchMode::Immediate => self.submit_immediate(vertices, quad, key, recorder),
            BatchMode::Coalesced => self.submit_coalesced(vertices, quad, key, recorder),
        }
    }

    /// Draw one quad on its own, regardless of mode. A pending batch is
    /// flushed first so draw order is preserved.
    pub fn submit_immediate(
        &mut self,
        vertices: &mut [SpriteVertex],
        quad: &[SpriteVertex; VERTICES_PER_QUAD],
        key: BatchKey,
        recorder: &mut dyn DrawRecorder,
    ) -> bool {
        self.flush(recorder);
        let Some(start) = self.write(vertices, quad) else {
            return false;
        };
        self.record(recorder, start, VERTICES_PER_QUAD, &key);
        true
    }

    fn submit_coalesced(
        &mut self,
        vertices: &mut [SpriteVertex],
        quad: &[SpriteVertex; VERTICES_PER_QUAD],
        key: BatchKey,
        recorder: &mut dyn DrawRecorder,
    ) -> bool {
        if self.active.is_some_and(|active| active.key != key) {
            self.flush(recorder);
        }
        let Some(start) = self.write(vertices, quad) else {
            return false;
        };
        match self.active.as_mut() {
            Some(active) => active.vertex_count += VERTICES_PER_QUAD,
            None => {
                self.active = Some(ActiveBatch {
                    start,
                    vertex_count: VERTICES_PER_QUAD,
                    key,
                });
            }
        }
        true
    }

    /// Record the pending batch, if any
    pub fn flush(&mut self, recorder: &mut dyn DrawRecorder) {
        if let Some(active) = self.active.take() {
            self.record(recorder, active.start, active.vertex_count, &active.key);
        }
    }

    fn write(&mut self, vertices: &mut [SpriteVertex], quad: &[SpriteVertex; VERTICES_PER_QUAD]) -> Option<usize> {
        let limit = self.capacity.min(vertices.len());
        let start = self.cursor;
        let end = start + VERTICES_PER_QUAD;
        if end > limit {
            self.dropped += 1;
            if !self.overflow_reported {
                log::warn!("Sprite vertex buffer full ({limit} vertices), dropping draws for the rest of the frame");
                self.overflow_reported = true;
            }
            return None;
        }

        vertices[start..end].copy_from_slice(quad);
        self.cursor = end;
        Some(start)
    }

    fn record(&mut self, recorder: &mut dyn DrawRecorder, start: usize, vertex_count: usize, key: &BatchKey) {
        recorder.push_constants(&key.constants);
        recorder.bind_descriptor_set(key.descriptor_set);
        recorder.bind_vertex_buffer();
        recorder.draw(start as u32, vertex_count as u32);
        self.draw_calls += 1;
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::foundation::math::orthographic;
    use crate::render::perspective::PerspectiveMode;
    use approx::assert_relative_eq;
    use ash::vk::Handle;

    #[derive(Debug, Clone, PartialEq)]
    pub(crate) enum Recorded {
        PushConstants(SpritePushConstants),
        BindSet(vk::DescriptorSet),
        BindVertexBuffer,
        Draw { first: u32, count: u32 },
    }

    #[derive(Default)]
    pub(crate) struct RecordingRecorder {
        pub commands: Vec<Recorded>,
    }

    impl RecordingRecorder {
        pub fn draws(&self) -> Vec<(u32, u32)> {
            self.commands
                .iter()
                .filter_map(|c| match c {
                    Recorded::Draw { first, count } => Some((*first, *count)),
                    _ => None,
                })
                .collect()
        }
    }

    impl DrawRecorder for RecordingRecorder {
        fn push_constants(&mut self, constants: &SpritePushConstants) {
            self.commands.push(Recorded::PushConstants(*constants));
        }

        fn bind_descriptor_set(&mut self, descriptor_set: vk::DescriptorSet) {
            self.commands.push(Recorded::BindSet(descriptor_set));
        }

        fn bind_vertex_buffer(&mut self) {
            self.commands.push(Recorded::BindVertexBuffer);
        }

        fn draw(&mut self, first_vertex: u32, vertex_count: u32) {
            self.commands.push(Recorded::Draw {
                first: first_vertex,
                count: vertex_count,
            });
        }
    }

    fn key(texture: u64) -> BatchKey {
        BatchKey {
            image_view: vk::ImageView::from_raw(texture),
            descriptor_set: vk::DescriptorSet::from_raw(texture + 100),
            constants: SpritePushConstants::new(
                &orthographic(800.0, 600.0),
                Vec4::new(1.0, 1.0, 1.0, 1.0),
                Vec3::new(1.0, 1.0, 1.0),
                false,
            ),
        }
    }

    fn quad(x: f32) -> [SpriteVertex; VERTICES_PER_QUAD] {
        build_quad(Vec2::new(x, 0.0), Vec2::new(10.0, 10.0), 0.0, UvRect::full(), &PerspectiveWarp::default())
    }

    #[test]
    fn test_push_constants_are_160_bytes() {
        assert_eq!(SpritePushConstants::SIZE, 160);
        assert_eq!(std::mem::size_of::<SpriteVertex>(), 16);
    }

    #[test]
    fn test_build_quad_emits_two_triangles() {
        let q = build_quad(Vec2::new(5.0, 5.0), Vec2::new(2.0, 4.0), 0.0, UvRect::full(), &PerspectiveWarp::default());
        assert_eq!(q[0].position, [5.0, 5.0]);
        assert_eq!(q[1].position, [7.0, 5.0]);
        assert_eq!(q[2].position, [7.0, 9.0]);
        assert_eq!(q[4].position, [5.0, 9.0]);
        assert_eq!(q[2], q[3]);
        assert_eq!(q[0], q[5]);
        assert_eq!(q[0].uv, [0.0, 0.0]);
        assert_eq!(q[2].uv, [1.0, 1.0]);
    }

    #[test]
    fn test_build_quad_rotates_about_center() {
        let q = build_quad(
            Vec2::new(0.0, 0.0),
            Vec2::new(2.0, 2.0),
            std::f32::consts::PI,
            UvRect::full(),
            &PerspectiveWarp::default(),
        );
        assert_relative_eq!(q[0].position[0], 2.0, epsilon = 1e-5);
        assert_relative_eq!(q[0].position[1], 2.0, epsilon = 1e-5);
        assert_eq!(q[0].uv, [0.0, 0.0]);
    }

    #[test]
    fn test_build_quad_applies_warp() {
        let warp = PerspectiveWarp {
            mode: PerspectiveMode::VanishingPoint,
            horizon_y: 0.0,
            horizon_scale: 0.5,
            view_center: Vec2::new(0.0, 50.0),
            view_height: 100.0,
            ..Default::default()
        };
        let q = build_quad(Vec2::new(10.0, 0.0), Vec2::new(10.0, 10.0), 0.0, UvRect::full(), &warp);
        assert_relative_eq!(q[0].position[0], 5.0);
        assert_relative_eq!(q[0].position[1], 0.0);
    }

    #[test]
    fn test_atlas_cell_counts_from_top_row() {
        let first = UvRect::atlas_cell(4, 2, 0).unwrap();
        assert_relative_eq!(first.min.x, 0.0);
        assert_relative_eq!(first.max.x, 0.25);
        assert_relative_eq!(first.min.y, 0.5);
        assert_relative_eq!(first.max.y, 1.0);

        let last = UvRect::atlas_cell(4, 2, 7).unwrap();
        assert_relative_eq!(last.min.x, 0.75);
        assert_relative_eq!(last.min.y, 0.0);
        assert_relative_eq!(last.max.y, 0.5);

        assert!(UvRect::atlas_cell(4, 2, 8).is_none());
        assert!(UvRect::atlas_cell(0, 2, 0).is_none());
    }

    #[test]
    fn test_same_texture_coalesces_into_one_draw() {
        let n = 25;
        let mut vertices = vec![SpriteVertex::default(); 100 * VERTICES_PER_QUAD];
        let mut batcher = SpriteBatcher::new(BatchMode::Coalesced, 100);
        let mut recorder = RecordingRecorder::default();

        batcher.begin_frame();
        for i in 0..n {
            assert!(batcher.submit(&mut vertices, &quad(i as f32), key(1), &mut recorder));
        }
        assert!(recorder.draws().is_empty());
        batcher.flush(&mut recorder);

        assert_eq!(recorder.draws(), vec![(0, (n * VERTICES_PER_QUAD) as u32)]);
        assert_eq!(batcher.draw_call_count(), 1);
        assert_eq!(vertices[(n - 1) * VERTICES_PER_QUAD], quad((n - 1) as f32)[0]);
    }

    #[test]
    fn test_texture_change_forces_two_flushes() {
        let mut vertices = vec![SpriteVertex::default(); 10 * VERTICES_PER_QUAD];
        let mut batcher = SpriteBatcher::new(BatchMode::Coalesced, 10);
        let mut recorder = RecordingRecorder::default();

        batcher.begin_frame();
        batcher.submit(&mut vertices, &quad(0.0), key(1), &mut recorder);
        batcher.submit(&mut vertices, &quad(1.0), key(1), &mut recorder);
        batcher.submit(&mut vertices, &quad(2.0), key(2), &mut recorder);
        batcher.flush(&mut recorder);

        assert_eq!(recorder.draws(), vec![(0, 12), (12, 6)]);
        assert_eq!(batcher.draw_call_count(), 2);
    }

    #[test]
    fn test_tint_change_breaks_batch() {
        let mut vertices = vec![SpriteVertex::default(); 10 * VERTICES_PER_QUAD];
        let mut batcher = SpriteBatcher::new(BatchMode::Coalesced, 10);
        let mut recorder = RecordingRecorder::default();
        let mut faded = key(1);
        faded.constants.tint[3] = 0.5;

        batcher.begin_frame();
        batcher.submit(&mut vertices, &quad(0.0), key(1), &mut recorder);
        batcher.submit(&mut vertices, &quad(1.0), faded, &mut recorder);
        batcher.flush(&mut recorder);
        assert_eq!(batcher.draw_call_count(), 2);
    }

    #[test]
    fn test_immediate_mode_draws_every_quad() {
        let mut vertices = vec![SpriteVertex::default(); 10 * VERTICES_PER_QUAD];
        let mut batcher = SpriteBatcher::new(BatchMode::Immediate, 10);
        let mut recorder = RecordingRecorder::default();

        batcher.begin_frame();
        for i in 0..3 {
            batcher.submit(&mut vertices, &quad(i as f32), key(1), &mut recorder);
        }
        assert_eq!(recorder.draws(), vec![(0, 6), (6, 6), (12, 6)]);
        assert!(!batcher.has_pending());

        let first_draw: Vec<_> = recorder.commands.iter().take(4).cloned().collect();
        assert_eq!(
            first_draw,
            vec![
                Recorded::PushConstants(key(1).constants),
                Recorded::BindSet(key(1).descriptor_set),
                Recorded::BindVertexBuffer,
                Recorded::Draw { first: 0, count: 6 },
            ]
        );
    }

    #[test]
    fn test_overflow_drops_without_touching_written_vertices() {
        let capacity = 3;
        let mut vertices = vec![SpriteVertex::default(); capacity * VERTICES_PER_QUAD];
        let mut batcher = SpriteBatcher::new(BatchMode::Coalesced, capacity);
        let mut recorder = RecordingRecorder::default();

        batcher.begin_frame();
        for i in 0..capacity {
            assert!(batcher.submit(&mut vertices, &quad(i as f32), key(1), &mut recorder));
        }
        let before = vertices.clone();
        for i in 0..5 {
            assert!(!batcher.submit(&mut vertices, &quad(100.0 + i as f32), key(2), &mut recorder));
            assert!(batcher.cursor() <= batcher.capacity());
        }
        batcher.flush(&mut recorder);

        assert_eq!(vertices, before);
        assert_eq!(batcher.dropped_count(), 5);
        assert_eq!(recorder.draws(), vec![(0, 18)]);
    }

    #[test]
    fn test_isolated_draw_flushes_pending_batch_first() {
        let mut vertices = vec![SpriteVertex::default(); 10 * VERTICES_PER_QUAD];
        let mut batcher = SpriteBatcher::new(BatchMode::Coalesced, 10);
        let mut recorder = RecordingRecorder::default();

        batcher.begin_frame();
        batcher.submit(&mut vertices, &quad(0.0), key(1), &mut recorder);
        batcher.submit_immediate(&mut vertices, &quad(1.0), key(1), &mut recorder);
        assert_eq!(recorder.draws(), vec![(0, 6), (6, 6)]);
    }

    #[test]
    fn test_begin_frame_resets_counters() {
        let mut vertices = vec![SpriteVertex::default(); VERTICES_PER_QUAD];
        let mut batcher = SpriteBatcher::new(BatchMode::Immediate, 1);
        let mut recorder = RecordingRecorder::default();

        batcher.begin_frame();
        batcher.submit(&mut vertices, &quad(0.0), key(1), &mut recorder);
        batcher.submit(&mut vertices, &quad(1.0), key(1), &mut recorder);
        assert_eq!(batcher.dropped_count(), 1);

        batcher.begin_frame();
        assert_eq!(batcher.cursor(), 0);
        assert_eq!(batcher.draw_call_count(), 0);
        assert_eq!(batcher.dropped_count(), 0);
    }
}
