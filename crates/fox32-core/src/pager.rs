use tracing::{debug, trace};

use crate::disk::{Disk, SECTOR_SIZE};
use crate::error::{Fault, VmResult};
use crate::store::ByteStore;

pub const PAGE_SIZE: u32 = 4096;
pub const PAGE_COUNT: usize = 256;
pub const FRAME_COUNT: usize = 32;
pub const SECTORS_PER_PAGE: u64 = 8;

/// Software demand-paging layer (§4.2): maps a 24-bit guest page number to
/// a physical frame inside the byte store, loading pages from the swap
/// region on disk as they're touched and evicting with a clock policy.
pub struct Pager {
    page_table: [u8; PAGE_COUNT],
    page_resident: [u64; 4],
    frame_allocated: u32,
    frame_owner: [Option<u8>; FRAME_COUNT],
    referenced: u32,
    clock_hand: u8,
    disk: Box<dyn Disk>,
    swap_base_sector: u64,
}

fn bit_get(bits: &[u64; 4], index: u8) -> bool {
    bits[(index / 64) as usize] & (1u64 << (index % 64)) != 0
}
fn bit_set(bits: &mut [u64; 4], index: u8, value: bool) {
    let word = &mut bits[(index / 64) as usize];
    let mask = 1u64 << (index % 64);
    if value {
        *word |= mask;
    } else {
        *word &= !mask;
    }
}

impl Pager {
    pub fn new(disk: Box<dyn Disk>, swap_base_sector: u64) -> Self {
        Pager {
            page_table: [0; PAGE_COUNT],
            page_resident: [0; 4],
            frame_allocated: 0,
            frame_owner: [None; FRAME_COUNT],
            referenced: 0,
            clock_hand: 0,
            disk,
            swap_base_sector,
        }
    }

    fn is_resident(&self, page: u8) -> bool {
        bit_get(&self.page_resident, page)
    }

    /// Returns the physical frame backing `page`, loading it from swap if
    /// it isn't resident yet. May evict another frame (§4.2 invariant 1/2).
    pub fn ensure_resident(&mut self, store: &mut ByteStore, page: u8) -> VmResult<u8> {
        if self.is_resident(page) {
            let frame = self.page_table[page as usize];
            self.referenced |= 1 << frame;
            return Ok(frame);
        }
        let frame = self.allocate_frame(store)?;
        trace!(page, frame, "loading page from swap");
        self.load_page(store, page, frame)?;
        self.page_table[page as usize] = frame;
        bit_set(&mut self.page_resident, page, true);
        self.frame_allocated |= 1 << frame;
        self.frame_owner[frame as usize] = Some(page);
        self.referenced |= 1 << frame;
        Ok(frame)
    }

    /// Finds a free frame, evicting a clock-selected victim if none is free.
    fn allocate_frame(&mut self, store: &mut ByteStore) -> VmResult<u8> {
        if self.frame_allocated != u32::MAX {
            for frame in 0..FRAME_COUNT as u8 {
                if self.frame_allocated & (1 << frame) == 0 {
                    return Ok(frame);
                }
            }
        }
        self.evict_one(store)
    }

    /// Second-chance clock sweep over all 32 frames. Converges within two
    /// sweeps: the first pass clears referenced bits as it goes, so any
    /// frame found already clear (including on a second pass) is evicted.
    fn evict_one(&mut self, store: &mut ByteStore) -> VmResult<u8> {
        loop {
            let frame = self.clock_hand;
            self.clock_hand = (self.clock_hand + 1) % FRAME_COUNT as u8;
            if self.referenced & (1 << frame) != 0 {
                self.referenced &= !(1 << frame);
                continue;
            }
            let page = self.frame_owner[frame as usize]
                .expect("allocated frame with no owning page");
            debug!(frame, page, "evicting frame");
            self.flush_frame(store, frame, page)?;
            return Ok(frame);
        }
    }

    fn flush_frame(&mut self, store: &mut ByteStore, frame: u8, page: u8) -> VmResult<()> {
        self.write_back(store, frame, page)?;
        bit_set(&mut self.page_resident, page, false);
        self.frame_allocated &= !(1 << frame);
        self.frame_owner[frame as usize] = None;
        Ok(())
    }

    /// Writes a resident frame back to its swap slot and drops it from
    /// residency without needing a replacement, for explicit `flush(f)`
    /// calls (§4.2) distinct from eviction-driven reuse.
    pub fn flush(&mut self, store: &mut ByteStore, frame: u8) -> VmResult<()> {
        let page = self.frame_owner[frame as usize]
            .ok_or(Fault::Internal("flush of an unallocated frame"))?;
        self.flush_frame(store, frame, page)
    }

    /// Flushes every resident frame. Used by tests exercising §8 property
    /// P2 and by the monitor CLI before a clean shutdown.
    pub fn flush_all(&mut self, store: &mut ByteStore) -> VmResult<()> {
        for frame in 0..FRAME_COUNT as u8 {
            if self.frame_allocated & (1 << frame) != 0 {
                let page = self.frame_owner[frame as usize].unwrap();
                self.flush_frame(store, frame, page)?;
            }
        }
        Ok(())
    }

    fn load_page(&mut self, store: &mut ByteStore, page: u8, frame: u8) -> VmResult<()> {
        let mut sector_buf = [0u8; SECTOR_SIZE];
        let base_sector = self.swap_base_sector + page as u64 * SECTORS_PER_PAGE;
        let frame_base = frame as u32 * PAGE_SIZE;
        for s in 0..SECTORS_PER_PAGE {
            let sector = base_sector + s;
            self.disk
                .read_sector(sector, &mut sector_buf)
                .map_err(|_| Fault::Disk { sector })?;
            for (i, byte) in sector_buf.iter().enumerate() {
                let addr = frame_base + s as u32 * SECTOR_SIZE as u32 + i as u32;
                write_store_byte(store, addr, *byte);
            }
        }
        Ok(())
    }

    fn write_back(&mut self, store: &mut ByteStore, frame: u8, page: u8) -> VmResult<()> {
        let mut sector_buf = [0u8; SECTOR_SIZE];
        let base_sector = self.swap_base_sector + page as u64 * SECTORS_PER_PAGE;
        let frame_base = frame as u32 * PAGE_SIZE;
        for s in 0..SECTORS_PER_PAGE {
            for (i, byte) in sector_buf.iter_mut().enumerate() {
                let addr = frame_base + s as u32 * SECTOR_SIZE as u32 + i as u32;
                *byte = read_store_byte(store, addr);
            }
            let sector = base_sector + s;
            self.disk
                .write_sector(sector, &sector_buf)
                .map_err(|_| Fault::Disk { sector })?;
        }
        Ok(())
    }
}

fn split_bank_offset(addr: u32) -> (usize, u16) {
    if addr > 0xFFFF {
        (1, (addr & 0xFFFF) as u16)
    } else {
        (0, addr as u16)
    }
}

fn read_store_byte(store: &mut ByteStore, addr: u32) -> u8 {
    let (bank, offset) = split_bank_offset(addr);
    store.read(bank, offset)
}

fn write_store_byte(store: &mut ByteStore, addr: u32, value: u8) {
    let (bank, offset) = split_bank_offset(addr);
    store.write(bank, offset, value);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::disk::MemoryDisk;

    fn pager() -> (Pager, ByteStore) {
        (
            Pager::new(Box::new(MemoryDisk::new(2048)), 0),
            ByteStore::new(),
        )
    }

    #[test]
    fn ensure_resident_loads_each_page_once() {
        let (mut pager, mut store) = pager();
        let f0 = pager.ensure_resident(&mut store, 5).unwrap();
        let f1 = pager.ensure_resident(&mut store, 5).unwrap();
        assert_eq!(f0, f1);
    }

    #[test]
    fn eviction_round_trips_through_swap() {
        let (mut pager, mut store) = pager();
        // fill a value into page 0, frame content lives in the byte store
        let frame = pager.ensure_resident(&mut store, 0).unwrap();
        write_store_byte(&mut store, frame as u32 * PAGE_SIZE, 0x42);

        // touch 33 distinct pages to force eviction of page 0's frame
        for p in 1..33u8 {
            pager.ensure_resident(&mut store, p).unwrap();
        }

        let frame_again = pager.ensure_resident(&mut store, 0).unwrap();
        assert_eq!(read_store_byte(&mut store, frame_again as u32 * PAGE_SIZE), 0x42);
    }
}
