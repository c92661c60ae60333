//! Counting writer wrapper for tracking bytes written.

use std::io::{Result, Write};

/// A writer wrapper that counts bytes written through it.
#[derive(Debug)]
pub struct CountingWriter<W> {
    inner: W,
    bytes_written: u64,
}

impl<W> CountingWriter<W> {
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            bytes_written: 0,
        }
    }

    #[inline(always)]
    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    pub fn get_ref(&self) -> &W {
        &self.inner
    }
}

impl<W: Write> Write for CountingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> Result<usize> {
        let n = self.inner.write(buf)?;
        self.bytes_written += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> Result<()> {
        self.inner.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counting_writer() {
        let mut writer = CountingWriter::new(Vec::new());

        writer.write_all(b"hello").unwrap();
        assert_eq!(writer.bytes_written(), 5);

        write!(writer, " {}", "world").unwrap();
        assert_eq!(writer.bytes_written(), 11);

        writer.flush().unwrap();
        assert_eq!(writer.get_ref(), b"hello world");
    }
}
