use crate::block::{BlockError, BlockOp, BlockSector, BLOCK_SECTOR_SIZE};
use alloc::{vec, vec::Vec};

/// A block device kept entirely in kernel memory.
///
/// Used as a swap disk when no physical disk is attached, and by tests that
/// need independently sized devices.
pub struct RamDisk {
    data: Vec<u8>,
}

impl RamDisk {
    /// Creates a zero-filled disk of `sectors` sectors.
    pub fn new(sectors: BlockSector) -> Self {
        Self {
            data: vec![0; sectors as usize * BLOCK_SECTOR_SIZE],
        }
    }

    /// Number of sectors on the disk.
    #[allow(clippy::cast_possible_truncation)]
    pub fn sectors(&self) -> BlockSector {
        (self.data.len() / BLOCK_SECTOR_SIZE) as BlockSector
    }

    fn range(&self, sector: BlockSector, len: usize) -> Result<core::ops::Range<usize>, BlockError> {
        if len != BLOCK_SECTOR_SIZE {
            return Err(BlockError::BufferInvalid);
        }
        if sector >= self.sectors() {
            return Err(BlockError::SectorOutOfBounds);
        }
        let start = sector as usize * BLOCK_SECTOR_SIZE;
        Ok(start..start + BLOCK_SECTOR_SIZE)
    }
}

impl BlockOp for RamDisk {
    fn read(&mut self, sector: BlockSector, buf: &mut [u8]) -> Result<(), BlockError> {
        let range = self.range(sector, buf.len())?;
        buf.copy_from_slice(&self.data[range]);
        Ok(())
    }

    fn write(&mut self, sector: BlockSector, buf: &[u8]) -> Result<(), BlockError> {
        let range = self.range(sector, buf.len())?;
        self.data[range].copy_from_slice(buf);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sectors_are_independent() {
        let mut disk = RamDisk::new(4);
        assert_eq!(disk.sectors(), 4);

        disk.write(1, &[1; BLOCK_SECTOR_SIZE]).unwrap();
        disk.write(2, &[2; BLOCK_SECTOR_SIZE]).unwrap();

        let mut buf = [0xff; BLOCK_SECTOR_SIZE];
        disk.read(0, &mut buf).unwrap();
        assert!(buf.iter().all(|&b| b == 0));
        disk.read(1, &mut buf).unwrap();
        assert!(buf.iter().all(|&b| b == 1));
        disk.read(2, &mut buf).unwrap();
        assert!(buf.iter().all(|&b| b == 2));
    }

    #[test]
    fn out_of_range() {
        let mut disk = RamDisk::new(2);
        let mut buf = [0; BLOCK_SECTOR_SIZE];
        assert_eq!(disk.read(2, &mut buf), Err(BlockError::SectorOutOfBounds));
        assert_eq!(disk.write(0, &buf[1..]), Err(BlockError::BufferInvalid));
    }
}
