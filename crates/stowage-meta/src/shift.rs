//! A stream view that hides a fixed-size prefix of the underlying resource.

use std::io::{self, Read, Seek, SeekFrom, Write};

/// Wraps a seekable resource so that logical offset `0` is underlying offset
/// `shift`. Reads and writes pass straight through; seeks are translated.
///
/// Seeking from the start adds `shift`; seeking from the end subtracts it;
/// seeking from the current position is untranslated. Positions reported
/// back are logical. A seek that would land inside the hidden prefix fails
/// with [`io::ErrorKind::InvalidInput`] and leaves the position unchanged.
#[derive(Debug)]
pub struct ShiftedStream<S> {
    inner: S,
    shift: u64,
}

impl<S: Seek> ShiftedStream<S> {
    /// Wrap `inner` and position it at logical offset `0`.
    pub fn new(mut inner: S, shift: u64) -> io::Result<Self> {
        inner.seek(SeekFrom::Start(shift))?;
        Ok(Self { inner, shift })
    }

    pub fn shift(&self) -> u64 {
        self.shift
    }

    pub fn get_ref(&self) -> &S {
        &self.inner
    }

    pub fn into_inner(self) -> S {
        self.inner
    }

    fn logical(&mut self, physical: u64, restore: u64) -> io::Result<u64> {
        if physical < self.shift {
            self.inner.seek(SeekFrom::Start(restore))?;
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!(
                    "seek to {physical} lands inside the {}-byte header",
                    self.shift
                ),
            ));
        }
        Ok(physical - self.shift)
    }
}

impl<S: Read> Read for ShiftedStream<S> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.inner.read(buf)
    }
}

impl<S: Write> Write for ShiftedStream<S> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.inner.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

impl<S: Seek> Seek for ShiftedStream<S> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let restore = self.inner.stream_position()?;
        let target = match pos {
            SeekFrom::Start(offset) => {
                let physical = offset.checked_add(self.shift).ok_or_else(|| {
                    io::Error::new(io::ErrorKind::InvalidInput, "seek offset overflows")
                })?;
                SeekFrom::Start(physical)
            }
            SeekFrom::End(offset) => {
                let shift = i64::try_from(self.shift).map_err(|_| {
                    io::Error::new(io::ErrorKind::InvalidInput, "shift exceeds i64")
                })?;
                let offset = offset.checked_sub(shift).ok_or_else(|| {
                    io::Error::new(io::ErrorKind::InvalidInput, "seek offset overflows")
                })?;
                SeekFrom::End(offset)
            }
            SeekFrom::Current(offset) => SeekFrom::Current(offset),
        };
        let physical = self.inner.seek(target)?;
        self.logical(physical, restore)
    }
}
