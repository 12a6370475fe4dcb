//! The file-handle collaborator OSFILE/OSFIND/OSBGET/OSBPUT/OSARGS traps
//! call into.
//!
//! Grounded in `pybeeb/Host/fsbbc.py`'s `FS` (BBC-style load/save/exec
//! attributes on top of an ordinary file) and `pybeeb/Host/hostfs.py`'s
//! `OSFILEhost`/`OSFINDhost`, which delegate every reason code to that `FS`
//! object rather than touching `open`/`read`/`write` directly.

use std::collections::HashMap;
use std::fs;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::PathBuf;

use crate::error::{BbcError, EmuResult};

/// Load/exec/attribute metadata BBC filing systems keep alongside a file's
/// bytes, per `fsbbc.py`'s `.inf` sidecar convention.
#[derive(Debug, Clone, Copy, Default)]
pub struct FileMeta {
    pub load_addr: u32,
    pub exec_addr: u32,
    pub attr: u32,
}

/// A single open file handle, BBC-numbered from 1.
pub struct OpenFile {
    pub handle: fs::File,
    pub path: PathBuf,
    pub extent: u64,
}

/// A host filesystem collaborator, keyed by BBC-style filenames (no
/// directory traversal beyond a single base directory, matching the
/// `fsbbc.py` sandbox).
pub trait FilesystemDevice {
    fn save(&mut self, name: &str, data: &[u8], meta: FileMeta) -> EmuResult<()>;
    fn load(&mut self, name: &str) -> EmuResult<(Vec<u8>, FileMeta)>;
    fn meta(&mut self, name: &str) -> EmuResult<Option<FileMeta>>;
    fn set_meta(&mut self, name: &str, meta: FileMeta) -> EmuResult<()>;
    fn delete(&mut self, name: &str) -> EmuResult<()>;

    /// Opens `name` for the given reason (0 = open for read, per
    /// `OSFINDhost`'s convention inherited from `hostfs.py`), returning a
    /// BBC file handle starting at 1.
    fn open(&mut self, name: &str, for_write: bool) -> EmuResult<u8>;
    fn close(&mut self, handle: u8) -> EmuResult<()>;
    fn bget(&mut self, handle: u8) -> EmuResult<Option<u8>>;
    fn bput(&mut self, handle: u8, byte: u8) -> EmuResult<()>;
    fn ptr(&mut self, handle: u8) -> EmuResult<u32>;
    fn set_ptr(&mut self, handle: u8, ptr: u32) -> EmuResult<()>;
    fn ext(&mut self, handle: u8) -> EmuResult<u32>;
}

/// Real-filesystem-backed [`FilesystemDevice`], rooted at one base
/// directory; load/exec/attr metadata rides alongside each file in a
/// `.inf`-style sidecar, per `fsbbc.py`.
pub struct HostFilesystem {
    root: PathBuf,
    open_files: HashMap<u8, OpenFile>,
    next_handle: u8,
}

impl HostFilesystem {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        HostFilesystem { root: root.into(), open_files: HashMap::new(), next_handle: 1 }
    }

    fn path_for(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    fn meta_path_for(&self, name: &str) -> PathBuf {
        self.root.join(format!("{}.inf", name))
    }

    fn not_found(name: &str) -> crate::error::EmuError {
        crate::error::EmuError::FileNotFound(name.to_string())
    }

    fn allocate_handle(&mut self) -> EmuResult<u8> {
        for _ in 0..255 {
            let candidate = self.next_handle;
            self.next_handle = if self.next_handle == 0xFF { 1 } else { self.next_handle + 1 };
            if !self.open_files.contains_key(&candidate) && candidate != 0 {
                return Ok(candidate);
            }
        }
        Err(crate::error::EmuError::NoFileHandles)
    }

    fn file_mut(&mut self, handle: u8) -> EmuResult<&mut OpenFile> {
        self.open_files.get_mut(&handle).ok_or(crate::error::EmuError::BadFileHandle(handle))
    }
}

impl FilesystemDevice for HostFilesystem {
    fn save(&mut self, name: &str, data: &[u8], meta: FileMeta) -> EmuResult<()> {
        fs::write(self.path_for(name), data)?;
        self.set_meta(name, meta)
    }

    fn load(&mut self, name: &str) -> EmuResult<(Vec<u8>, FileMeta)> {
        let data = fs::read(self.path_for(name)).map_err(|_| Self::not_found(name))?;
        let meta = self.meta(name)?.unwrap_or_default();
        Ok((data, meta))
    }

    fn meta(&mut self, name: &str) -> EmuResult<Option<FileMeta>> {
        let inf = self.meta_path_for(name);
        if !inf.exists() {
            return Ok(if self.path_for(name).exists() { Some(FileMeta::default()) } else { None });
        }
        let text = fs::read_to_string(inf)?;
        let mut fields = text.split_whitespace();
        let load_addr = fields.next().and_then(|s| u32::from_str_radix(s, 16).ok()).unwrap_or(0);
        let exec_addr = fields.next().and_then(|s| u32::from_str_radix(s, 16).ok()).unwrap_or(0);
        let attr = fields.next().and_then(|s| u32::from_str_radix(s, 16).ok()).unwrap_or(0);
        Ok(Some(FileMeta { load_addr, exec_addr, attr }))
    }

    fn set_meta(&mut self, name: &str, meta: FileMeta) -> EmuResult<()> {
        fs::write(
            self.meta_path_for(name),
            format!("{:x} {:x} {:x}\n", meta.load_addr, meta.exec_addr, meta.attr),
        )?;
        Ok(())
    }

    fn delete(&mut self, name: &str) -> EmuResult<()> {
        fs::remove_file(self.path_for(name)).map_err(|_| Self::not_found(name))?;
        let _ = fs::remove_file(self.meta_path_for(name));
        Ok(())
    }

    fn open(&mut self, name: &str, for_write: bool) -> EmuResult<u8> {
        let path = self.path_for(name);
        let handle_file = if for_write {
            fs::OpenOptions::new().read(true).write(true).create(true).open(&path)?
        } else {
            fs::File::open(&path).map_err(|_| Self::not_found(name))?
        };
        let extent = handle_file.metadata()?.len();
        let handle = self.allocate_handle()?;
        self.open_files.insert(handle, OpenFile { handle: handle_file, path, extent });
        Ok(handle)
    }

    fn close(&mut self, handle: u8) -> EmuResult<()> {
        self.open_files.remove(&handle).ok_or(crate::error::EmuError::BadFileHandle(handle))?;
        Ok(())
    }

    fn bget(&mut self, handle: u8) -> EmuResult<Option<u8>> {
        let file = self.file_mut(handle)?;
        let mut buf = [0u8; 1];
        match file.handle.read(&mut buf)? {
            0 => Ok(None),
            _ => Ok(Some(buf[0])),
        }
    }

    fn bput(&mut self, handle: u8, byte: u8) -> EmuResult<()> {
        let file = self.file_mut(handle)?;
        file.handle.write_all(&[byte])?;
        file.extent = file.extent.max(file.handle.stream_position()?);
        Ok(())
    }

    fn ptr(&mut self, handle: u8) -> EmuResult<u32> {
        let file = self.file_mut(handle)?;
        Ok(file.handle.stream_position()? as u32)
    }

    fn set_ptr(&mut self, handle: u8, ptr: u32) -> EmuResult<()> {
        let file = self.file_mut(handle)?;
        file.handle.seek(SeekFrom::Start(ptr as u64))?;
        Ok(())
    }

    fn ext(&mut self, handle: u8) -> EmuResult<u32> {
        let file = self.file_mut(handle)?;
        Ok(file.extent as u32)
    }
}

/// Guest error block BBC filing system errors use, per the `hostfs.py`
/// convention of raising a `BBCError(0xD6, "File not found")`-shaped error.
pub fn file_not_found_error(name: &str) -> BbcError {
    BbcError::new(0xD6, format!("{} not found", name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn save_then_load_round_trips_bytes_and_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let mut fsdev = HostFilesystem::new(dir.path());
        let meta = FileMeta { load_addr: 0x1900, exec_addr: 0x1900, attr: 0 };
        fsdev.save("PROG", b"\xA9\x00\x60", meta).unwrap();

        let (data, loaded_meta) = fsdev.load("PROG").unwrap();
        assert_eq!(data, b"\xA9\x00\x60");
        assert_eq!(loaded_meta.load_addr, 0x1900);
    }

    #[test]
    fn loading_a_missing_file_is_a_file_not_found_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut fsdev = HostFilesystem::new(dir.path());
        assert!(matches!(fsdev.load("NOPE"), Err(crate::error::EmuError::FileNotFound(_))));
    }

    #[test]
    fn bget_bput_and_ptr_behave_like_a_sequential_stream() {
        let dir = tempfile::tempdir().unwrap();
        let mut fsdev = HostFilesystem::new(dir.path());
        fsdev.save("DATA", b"", FileMeta::default()).unwrap();
        let handle = fsdev.open("DATA", true).unwrap();
        fsdev.bput(handle, b'A').unwrap();
        fsdev.bput(handle, b'B').unwrap();
        fsdev.set_ptr(handle, 0).unwrap();
        assert_eq!(fsdev.bget(handle).unwrap(), Some(b'A'));
        assert_eq!(fsdev.bget(handle).unwrap(), Some(b'B'));
        assert_eq!(fsdev.bget(handle).unwrap(), None);
        assert_eq!(fsdev.ext(handle).unwrap(), 2);
        fsdev.close(handle).unwrap();
    }
}
