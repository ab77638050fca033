use std::io::{self, ErrorKind};

/// Bytes provides the ability to read bytes from a reader and push them
/// back if they are not needed, i.e., Peek-and-push. Pushed bytes are provided
/// again, in the order given to `push`, before any more bytes are read.
pub(crate) struct Bytes<R>
where
    R: io::Read,
{
    reader: R,
    num_read: usize,
    // Pushed bytes in reverse stream order, so the next byte is at the end.
    cache: Vec<u8>,
    buf: [u8; 1],
}

impl<R> Bytes<R>
where
    R: io::Read,
{
    pub fn new(reader: R) -> Self {
        Bytes {
            reader,
            num_read: 0,
            cache: Vec::new(),
            buf: [0u8; 1],
        }
    }

    pub fn next(&mut self) -> Result<u8, io::Error> {
        if let Some(b) = self.cache.pop() {
            Ok(b)
        } else {
            let n = self.reader.read(&mut self.buf)?;
            if n == 0 {
                return Err(io::Error::from(ErrorKind::UnexpectedEof));
            }
            self.num_read += 1;
            Ok(self.buf[0])
        }
    }

    /// Fill `buf` completely, first from pushed bytes and then from the reader.
    ///
    /// Returns `Ok(false)` if the reader reached EOF before `buf` could be filled.
    pub fn fill(&mut self, buf: &mut [u8]) -> Result<bool, io::Error> {
        let from_cache = self.cache.len().min(buf.len());
        for dst in buf[..from_cache].iter_mut() {
            // can't fail, we checked the cache length
            *dst = self.cache.pop().unwrap_or_default();
        }

        let rest = &mut buf[from_cache..];
        if rest.is_empty() {
            return Ok(true);
        }
        if let Err(err) = self.reader.read_exact(rest) {
            if err.kind() == ErrorKind::UnexpectedEof {
                return Ok(false);
            }
            return Err(err);
        }
        self.num_read += rest.len();
        Ok(true)
    }

    pub fn push(&mut self, dat: &[u8]) {
        self.cache.extend(dat.iter().rev());
    }

    /// Number of bytes consumed from the stream, not counting pushed back bytes.
    pub fn offset(&self) -> usize {
        self.num_read - self.cache.len()
    }
}
