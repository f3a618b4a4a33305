//! Graphics-context generation counter

use std::cell::Cell;
use std::rc::Rc;

/// Generation value that no context ever receives.
pub const UNASSIGNED_GENERATION: u32 = 0;

/// Shared counter identifying the currently live OpenGL context.
///
/// Every OpenGL texture handle is tagged with the generation that was current
/// when it was created. Tearing down or recreating the context advances the
/// epoch, after which older handles are treated as stale and never passed to a
/// delete call. Context pointers are not used for this because drivers reuse
/// them across context creations.
///
/// Clones share the same counter. The type is `!Send`: all texture work happens
/// on the render thread.
#[derive(Debug, Clone)]
pub struct GraphicsContextEpoch {
    generation: Rc<Cell<u32>>,
}

impl GraphicsContextEpoch {
    /// Create a new epoch starting at generation 1
    pub fn new() -> Self {
        Self {
            generation: Rc::new(Cell::new(1)),
        }
    }

    /// Generation of the currently live context
    pub fn current(&self) -> u32 {
        self.generation.get()
    }

    /// Mark the current context as gone. Returns the new generation.
    pub fn advance(&self) -> u32 {
        let mut next = self.generation.get().wrapping_add(1);
        if next == UNASSIGNED_GENERATION {
            next = 1;
        }
        self.generation.set(next);
        log::debug!("OpenGL context generation advanced to {next}");
        next
    }
}

impl Default for GraphicsContextEpoch {
    fn default() -> Self {
        Self::new()
    }
}
