//! Block-oriented backing store for the swap region (§4.2, §6).
//!
//! Grounded on `disk.c`: 512-byte sectors, seek-then-transfer. The
//! reimplementation fixes the source's unimplemented `write_disk_from_memory`
//! (left as `// TODO: write this`) since the pager needs working writeback
//! to satisfy eviction (§4.2 invariant 2).

pub const SECTOR_SIZE: usize = 512;

/// A seekable, sector-addressed backing store.
pub trait Disk {
    /// Returns `Err(())` on any I/O failure, mirroring `IoHandler`'s
    /// nonzero-return-means-fault convention; the caller maps this to a
    /// `Fault::Disk` rather than aborting the process.
    fn read_sector(&mut self, sector: u64, out: &mut [u8; SECTOR_SIZE]) -> Result<(), ()>;
    fn write_sector(&mut self, sector: u64, data: &[u8; SECTOR_SIZE]) -> Result<(), ()>;
}

/// An in-memory disk, sized for the fixed 2048-sector swap region. Used by
/// tests and by embedders that don't need persistence across runs.
pub struct MemoryDisk {
    sectors: Vec<[u8; SECTOR_SIZE]>,
}

impl MemoryDisk {
    pub fn new(sector_count: usize) -> Self {
        MemoryDisk {
            sectors: vec![[0u8; SECTOR_SIZE]; sector_count],
        }
    }
}

impl Disk for MemoryDisk {
    fn read_sector(&mut self, sector: u64, out: &mut [u8; SECTOR_SIZE]) -> Result<(), ()> {
        let src = self.sectors.get(sector as usize).ok_or(())?;
        out.copy_from_slice(src);
        Ok(())
    }

    fn write_sector(&mut self, sector: u64, data: &[u8; SECTOR_SIZE]) -> Result<(), ()> {
        let dst = self.sectors.get_mut(sector as usize).ok_or(())?;
        *dst = *data;
        Ok(())
    }
}

/// A disk image backed by an open file, seeking to `sector * 512` for every
/// access the way `set_disk_sector`/`read_disk_into_memory` do.
pub struct FileDisk<F> {
    file: F,
}

impl<F> FileDisk<F>
where
    F: std::io::Read + std::io::Write + std::io::Seek,
{
    pub fn new(file: F) -> Self {
        FileDisk { file }
    }
}

impl<F> Disk for FileDisk<F>
where
    F: std::io::Read + std::io::Write + std::io::Seek,
{
    fn read_sector(&mut self, sector: u64, out: &mut [u8; SECTOR_SIZE]) -> Result<(), ()> {
        use std::io::{Seek, SeekFrom};
        self.file
            .seek(SeekFrom::Start(sector * SECTOR_SIZE as u64))
            .map_err(|_| ())?;
        std::io::Read::read_exact(&mut self.file, out).map_err(|_| ())
    }

    fn write_sector(&mut self, sector: u64, data: &[u8; SECTOR_SIZE]) -> Result<(), ()> {
        use std::io::{Seek, SeekFrom};
        self.file
            .seek(SeekFrom::Start(sector * SECTOR_SIZE as u64))
            .map_err(|_| ())?;
        std::io::Write::write_all(&mut self.file, data).map_err(|_| ())
    }
}
