//! Frame source: one period of raw PCM bytes per call.

use std::io::{self, Read};

/// Supplies raw interleaved PCM bytes.
pub trait FrameSource {
    /// Fill `buf` with up to `buf.len()` bytes.
    ///
    /// `Ok(0)` means end of stream. A count below `buf.len()` is a short read and
    /// leaves the rest of `buf` untouched.
    fn fill(&mut self, buf: &mut [u8]) -> io::Result<usize>;
}

/// [`FrameSource`] over any byte reader (stdin in production).
///
/// Keeps reading until the buffer is full or the reader reports end of stream, so
/// pipe chunking does not produce spurious short reads.
pub struct ReaderSource<R> {
    reader: R,
}

impl<R: Read> ReaderSource<R> {
    pub fn new(reader: R) -> Self {
        Self { reader }
    }
}

impl<R: Read> FrameSource for ReaderSource<R> {
    fn fill(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut filled = 0;
        while filled < buf.len() {
            match self.reader.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) if filled > 0 => {
                    tracing::warn!(bytes = filled, error = %e, "read failed mid-period; returning partial data");
                    break;
                }
                Err(e) => return Err(e),
            }
        }
        Ok(filled)
    }
}

/// Source reading from the process's standard input.
pub fn stdin() -> ReaderSource<io::StdinLock<'static>> {
    ReaderSource::new(io::stdin().lock())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    /// Reader that hands out at most `chunk` bytes per call, like a pipe.
    struct Chunked {
        data: Cursor<Vec<u8>>,
        chunk: usize,
        interrupt_next: bool,
    }

    impl Read for Chunked {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if self.interrupt_next {
                self.interrupt_next = false;
                return Err(io::Error::from(io::ErrorKind::Interrupted));
            }
            let n = buf.len().min(self.chunk);
            self.interrupt_next = true;
            self.data.read(&mut buf[..n])
        }
    }

    #[test]
    fn fill_reads_full_period() {
        let mut src = ReaderSource::new(Cursor::new(vec![1u8; 32]));
        let mut buf = [0u8; 16];
        assert_eq!(src.fill(&mut buf).unwrap(), 16);
        assert_eq!(src.fill(&mut buf).unwrap(), 16);
        assert_eq!(src.fill(&mut buf).unwrap(), 0);
    }

    #[test]
    fn fill_reports_short_read_and_keeps_tail() {
        let mut src = ReaderSource::new(Cursor::new(vec![7u8; 5]));
        let mut buf = [9u8; 8];
        assert_eq!(src.fill(&mut buf).unwrap(), 5);
        assert_eq!(buf, [7, 7, 7, 7, 7, 9, 9, 9]);
        assert_eq!(src.fill(&mut buf).unwrap(), 0);
    }

    #[test]
    fn fill_assembles_chunked_reads_and_retries_interrupts() {
        let data: Vec<u8> = (0..20).collect();
        let mut src = ReaderSource::new(Chunked {
            data: Cursor::new(data.clone()),
            chunk: 3,
            interrupt_next: true,
        });
        let mut buf = [0u8; 16];
        assert_eq!(src.fill(&mut buf).unwrap(), 16);
        assert_eq!(&buf[..], &data[..16]);
        assert_eq!(src.fill(&mut buf).unwrap(), 4);
    }

    #[test]
    fn fill_propagates_error_without_data() {
        struct Broken;
        impl Read for Broken {
            fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
                Err(io::Error::other("boom"))
            }
        }
        let mut src = ReaderSource::new(Broken);
        let mut buf = [0u8; 4];
        assert!(src.fill(&mut buf).is_err());
    }

    #[test]
    fn fill_keeps_partial_data_when_read_fails_mid_period() {
        let failing = Cursor::new(vec![5u8; 3]).chain(FailingReader);
        let mut src = ReaderSource::new(failing);
        let mut buf = [0u8; 8];
        assert_eq!(src.fill(&mut buf).unwrap(), 3);
        assert_eq!(&buf[..3], &[5, 5, 5]);
    }

    struct FailingReader;

    impl Read for FailingReader {
        fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
            Err(io::Error::other("pipe broke"))
        }
    }
}
