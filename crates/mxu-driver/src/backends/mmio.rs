// SPDX-License-Identifier: AGPL-3.0-only

//! Memory-mapped register window
//!
//! Maps the page containing the accelerator's base address from a memory
//! device file (`/dev/mem`, or a UIO node exposing the block) and performs
//! bounds-checked volatile accesses inside the 0x40-byte register window.
//!
//! Unsafe is confined to `mmap`/`munmap` and the volatile pointer accesses.

use crate::backend::{check_access, BackendType, RegisterInterface};
use crate::error::{MxuError, Result};
use mxu_chip::regs::WINDOW_SIZE;
use mxu_chip::{Access, RegWidth, Register};
use rustix::fs::OFlags;
use rustix::mm::{mmap, munmap, MapFlags, ProtFlags};
use std::fs::{File, OpenOptions};
use std::os::unix::fs::OpenOptionsExt;
use std::os::unix::io::AsFd;
use std::path::{Path, PathBuf};
use std::ptr::NonNull;

/// Memory-mapped accelerator register window
#[derive(Debug)]
pub struct MmioBackend {
    /// Start of the page-aligned mapping
    ptr: NonNull<u8>,
    /// Length of the mapping
    map_len: usize,
    /// Offset of the register window inside the mapping
    window: usize,
    base_address: u64,
    path: PathBuf,
    _file: File,
}

impl MmioBackend {
    /// Map the register window at physical `base_address` through `path`
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - The device file doesn't exist
    /// - `base_address` is not aligned to the widest register (8 bytes)
    /// - It cannot be opened read/write (usually needs root for `/dev/mem`)
    /// - mmap fails
    pub fn open(path: impl AsRef<Path>, base_address: u64) -> Result<Self> {
        let path = path.as_ref();
        let align = RegWidth::W64.bytes() as u64;
        if base_address % align != 0 {
            return Err(MxuError::map_failed(format!(
                "base address {base_address:#x} is not {align}-byte aligned"
            )));
        }
        if !path.exists() {
            return Err(MxuError::device_not_found(path));
        }

        tracing::debug!("Mapping register window {base_address:#x} via {}", path.display());

        // OFlags::SYNC.bits() is a small positive flag value
        #[allow(clippy::cast_possible_wrap)]
        let sync_flag = OFlags::SYNC.bits() as i32;

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .custom_flags(sync_flag)
            .open(path)
            .map_err(|e| MxuError::map_failed(format!("Cannot open {}: {e}", path.display())))?;

        let page = rustix::param::page_size();
        let page_mask = page as u64 - 1;
        let page_base = base_address & !page_mask;
        #[allow(clippy::cast_possible_truncation)] // below one page
        let window = (base_address & page_mask) as usize;
        let map_len = (window + WINDOW_SIZE).div_ceil(page) * page;

        // SAFETY: mmap necessary for MMIO - maps the page holding the register window.
        // Invariants: (1) file is open read/write for the lifetime of the mapping (kept in
        // self._file); (2) map_len is a non-zero multiple of the page size; (3) page_base is
        // page aligned; (4) rustix returns Err instead of MAP_FAILED.
        let addr = unsafe {
            mmap(
                std::ptr::null_mut(),
                map_len,
                ProtFlags::READ | ProtFlags::WRITE,
                MapFlags::SHARED,
                file.as_fd(),
                page_base,
            )
        }
        .map_err(|e| MxuError::map_failed(format!("mmap of {page_base:#x} failed: {e}")))?;

        let ptr = NonNull::new(addr.cast::<u8>())
            .ok_or_else(|| MxuError::map_failed("mmap returned a null pointer"))?;

        tracing::info!(
            "Mapped register window {base_address:#x} ({map_len} bytes at {ptr:p})"
        );

        Ok(Self {
            ptr,
            map_len,
            window,
            base_address,
            path: path.to_path_buf(),
            _file: file,
        })
    }

    /// Physical base address of the register window
    #[must_use]
    pub const fn base_address(&self) -> u64 {
        self.base_address
    }

    /// Device file backing the mapping
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn register_ptr(&self, reg: Register) -> Result<*mut u8> {
        let end = reg.offset() + reg.width().bytes();
        if end > WINDOW_SIZE || self.window + end > self.map_len {
            return Err(MxuError::register_access(
                reg,
                format!("offset outside mapped window (limit {WINDOW_SIZE:#x})"),
            ));
        }
        // SAFETY: window + offset + width <= map_len was checked above, so the
        // resulting pointer stays inside the mapping created in open().
        Ok(unsafe { self.ptr.as_ptr().add(self.window + reg.offset()) })
    }
}

// Register offsets are naturally aligned (checked in mxu-chip tests), the
// mapping is page aligned, and open() rejects a base that is not 8-byte aligned.
#[allow(clippy::cast_ptr_alignment)]
impl RegisterInterface for MmioBackend {
    fn read_u32(&mut self, reg: Register) -> Result<u32> {
        check_access(reg, RegWidth::W32, Access::Read)?;
        let ptr = self.register_ptr(reg)?;
        // SAFETY: read_volatile necessary for MMIO - hardware can change value.
        // ptr is in bounds (register_ptr) and 4-byte aligned.
        let value = unsafe { ptr.cast::<u32>().read_volatile() };
        tracing::trace!("Read u32 {reg} = {value:#x}");
        Ok(value)
    }

    fn write_u32(&mut self, reg: Register, value: u32) -> Result<()> {
        check_access(reg, RegWidth::W32, Access::Write)?;
        let ptr = self.register_ptr(reg)?;
        tracing::trace!("Write u32 {reg} = {value:#x}");
        // SAFETY: write_volatile necessary for MMIO - triggers hardware side effects.
        // ptr is in bounds (register_ptr) and 4-byte aligned.
        unsafe { ptr.cast::<u32>().write_volatile(value) };
        Ok(())
    }

    fn read_u64(&mut self, reg: Register) -> Result<u64> {
        check_access(reg, RegWidth::W64, Access::Read)?;
        let ptr = self.register_ptr(reg)?;
        // SAFETY: read_volatile necessary for MMIO - hardware can change value.
        // ptr is in bounds (register_ptr) and 8-byte aligned.
        let value = unsafe { ptr.cast::<u64>().read_volatile() };
        tracing::trace!("Read u64 {reg} = {value:#x}");
        Ok(value)
    }

    fn write_u64(&mut self, reg: Register, value: u64) -> Result<()> {
        check_access(reg, RegWidth::W64, Access::Write)?;
        let ptr = self.register_ptr(reg)?;
        tracing::trace!("Write u64 {reg} = {value:#x}");
        // SAFETY: write_volatile necessary for MMIO - triggers hardware side effects.
        // ptr is in bounds (register_ptr) and 8-byte aligned.
        unsafe { ptr.cast::<u64>().write_volatile(value) };
        Ok(())
    }

    fn backend_type(&self) -> BackendType {
        BackendType::Mmio
    }
}

impl Drop for MmioBackend {
    fn drop(&mut self) {
        tracing::debug!("Unmapping register window {:#x}", self.base_address);

        // SAFETY: ptr and map_len are exactly what mmap returned/was given in open(),
        // and Drop runs at most once.
        unsafe {
            if let Err(e) = munmap(self.ptr.as_ptr().cast(), self.map_len) {
                tracing::error!("munmap failed during drop: {e}");
            }
        }
    }
}

// SAFETY: MmioBackend owns its mapping exclusively. Moving it to another thread
// doesn't invalidate the mapping (mmap'd memory is process-wide), and every
// access goes through &mut self.
unsafe impl Send for MmioBackend {}
