//! Physical driver interfaces consumed by the backends.
//!
//! Platform crates implement these over sysfs/gpiod, an I2C bus or a tty;
//! tests implement them in memory.

use crate::Result;
use detent_core::PinId;
use std::io::{self, ErrorKind, Read};

/// Callback invoked from the driver's interrupt context on every edge.
pub type EdgeHandler = Box<dyn Fn() + Send + Sync>;

/// Host GPIO controller.
pub trait GpioDriver: Send + Sync {
    /// Configure `pin` as an input, optionally with its pull-up enabled.
    fn configure_input(&self, pin: PinId, pull_up: bool) -> Result<()>;

    fn read(&self, pin: PinId) -> Result<bool>;

    /// Install `handler` for both edges of `pin`, replacing any previous one.
    fn watch_edges(&self, pin: PinId, handler: EdgeHandler) -> Result<()>;

    fn unwatch(&self, pin: PinId) -> Result<()>;
}

/// I2C port expander with 8-bit banks.
pub trait PortExpander: Send + Sync {
    /// Bring the chip up: all pins inputs with pull-ups, interrupt on change.
    fn init(&self) -> Result<()>;

    fn read_bank(&self, bank: u8) -> Result<u8>;
}

/// Byte stream from a serial link.
pub trait ByteSource: Send {
    /// Next byte, or `None` when the read timed out or the stream is
    /// exhausted. The caller backs off before reading again.
    fn read_byte(&mut self) -> io::Result<Option<u8>>;

    /// Discard whatever the transport has buffered.
    fn flush(&mut self) -> io::Result<()>;
}

/// [`ByteSource`] over any [`Read`], e.g. a tty opened by the host with a
/// read timeout. `flush` is a no-op since `Read` has no discard operation.
pub struct ReadSource<R> {
    inner: R,
}

impl<R: Read + Send> ReadSource<R> {
    pub fn new(inner: R) -> Self {
        Self { inner }
    }

    pub fn into_inner(self) -> R {
        self.inner
    }
}

impl<R: Read + Send> ByteSource for ReadSource<R> {
    fn read_byte(&mut self) -> io::Result<Option<u8>> {
        let mut byte = [0u8; 1];
        match self.inner.read(&mut byte) {
            Ok(0) => Ok(None),
            Ok(_) => Ok(Some(byte[0])),
            Err(e)
                if matches!(
                    e.kind(),
                    ErrorKind::TimedOut | ErrorKind::WouldBlock | ErrorKind::Interrupted
                ) =>
            {
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_read_source_yields_bytes_then_timeout() {
        let mut source = ReadSource::new(Cursor::new(vec![0xEA, 0x01]));
        assert_eq!(source.read_byte().unwrap(), Some(0xEA));
        assert_eq!(source.read_byte().unwrap(), Some(0x01));
        assert_eq!(source.read_byte().unwrap(), None);
        assert!(source.flush().is_ok());
    }

    struct Failing(ErrorKind);

    impl Read for Failing {
        fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
            Err(io::Error::from(self.0))
        }
    }

    #[test]
    fn test_read_source_maps_timeouts() {
        let mut source = ReadSource::new(Failing(ErrorKind::TimedOut));
        assert_eq!(source.read_byte().unwrap(), None);

        let mut source = ReadSource::new(Failing(ErrorKind::BrokenPipe));
        assert_eq!(
            source.read_byte().unwrap_err().kind(),
            ErrorKind::BrokenPipe
        );
    }
}
