//! Fakes for the texture API seams, shared by unit tests across the crate.

use std::cell::{Cell, RefCell};

use ash::vk::{self, Handle};

use super::gl::GlTextureApi;
use super::vulkan::{ImageResources, ImageUploader};
use crate::render::backends::vulkan::{VulkanError, VulkanResult};

#[derive(Default)]
pub struct FakeGl {
    pub current: Cell<bool>,
    pub next_name: Cell<u32>,
    pub created: RefCell<Vec<u32>>,
    pub deleted: RefCell<Vec<u32>>,
    pub bound: RefCell<Vec<(u32, u32)>>,
    pub unbinds: Cell<u32>,
}

impl FakeGl {
    pub fn current() -> Self {
        let gl = Self::default();
        gl.current.set(true);
        gl
    }
}

impl GlTextureApi for FakeGl {
    fn is_context_current(&self) -> bool {
        self.current.get()
    }

    fn create_texture(&self, _pixels: &[u8], _width: u32, _height: u32, _channels: u8) -> Result<u32, String> {
        let name = self.next_name.get() + 1;
        self.next_name.set(name);
        self.created.borrow_mut().push(name);
        Ok(name)
    }

    fn delete_texture(&self, name: u32) {
        self.deleted.borrow_mut().push(name);
    }

    fn bind_texture(&self, slot: u32, name: u32) {
        self.bound.borrow_mut().push((slot, name));
    }

    fn unbind_texture(&self) {
        self.unbinds.set(self.unbinds.get() + 1);
    }
}

pub struct StubUploader {
    pub alive: Cell<bool>,
    pub fail: Cell<bool>,
    pub next_handle: Cell<u64>,
    pub uploads: RefCell<Vec<(u32, u32, vk::Format)>>,
    pub destroyed: RefCell<Vec<ImageResources>>,
}

impl StubUploader {
    pub fn new() -> Self {
        Self {
            alive: Cell::new(true),
            fail: Cell::new(false),
            next_handle: Cell::new(0x100),
            uploads: RefCell::new(Vec::new()),
            destroyed: RefCell::new(Vec::new()),
        }
    }

    fn handle(&self) -> u64 {
        let next = self.next_handle.get() + 1;
        self.next_handle.set(next);
        next
    }
}

impl ImageUploader for StubUploader {
    fn device_handle(&self) -> vk::Device {
        vk::Device::from_raw(0xD0)
    }

    fn is_alive(&self) -> bool {
        self.alive.get()
    }

    fn upload(&self, pixels: &[u8], width: u32, height: u32, format: vk::Format) -> VulkanResult<ImageResources> {
        if self.fail.get() {
            return Err(VulkanError::Api(vk::Result::ERROR_OUT_OF_DEVICE_MEMORY));
        }
        assert!(!pixels.is_empty());
        self.uploads.borrow_mut().push((width, height, format));
        Ok(ImageResources {
            image: vk::Image::from_raw(self.handle()),
            memory: vk::DeviceMemory::from_raw(self.handle()),
            view: vk::ImageView::from_raw(self.handle()),
            sampler: vk::Sampler::from_raw(self.handle()),
            format,
            width,
            height,
        })
    }

    fn destroy(&self, resources: ImageResources) {
        self.destroyed.borrow_mut().push(resources);
    }
}
