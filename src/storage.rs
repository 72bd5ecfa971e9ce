use crate::common::FatResult;
use std::io::{Read, Seek, SeekFrom, Write};

/// Random-access byte store holding a volume image.
pub trait Storage {
    fn read_at(&mut self, offset: u64, len: usize) -> FatResult<Vec<u8>>;

    fn write_at(&mut self, offset: u64, data: &[u8]) -> FatResult<()>;
}

impl<T: Read + Write + Seek> Storage for T {
    fn read_at(&mut self, offset: u64, len: usize) -> FatResult<Vec<u8>> {
        let mut buf = vec![0u8; len];
        self.seek(SeekFrom::Start(offset))?;
        self.read_exact(&mut buf)?;
        Ok(buf)
    }

    fn write_at(&mut self, offset: u64, data: &[u8]) -> FatResult<()> {
        self.seek(SeekFrom::Start(offset))?;
        self.write_all(data)?;
        Ok(())
    }
}
