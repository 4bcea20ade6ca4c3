//! Parameter-set capture buffers.
//!
//! Bytes are appended while a capture is open, before the scanner knows
//! where the NAL unit ends. The closing start code therefore lands in the
//! buffer too and is trimmed when the capture closes.

use crate::error::{Error, ParameterSetKind, Result};

/// Initial capacity of each parameter-set buffer.
pub const INITIAL_PARAMETER_SET_CAPACITY: usize = 256;

/// Lifecycle of a [`ParameterSetCapture`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureState {
    /// Nothing captured yet.
    Idle,
    /// Actively appending bytes.
    Open,
    /// Captured and trimmed; further bytes are ignored.
    Closed,
}

/// Growable buffer holding exactly one SPS or PPS payload.
#[derive(Debug)]
pub struct ParameterSetCapture {
    kind: ParameterSetKind,
    state: CaptureState,
    buf: Vec<u8>,
}

impl ParameterSetCapture {
    pub fn new(kind: ParameterSetKind) -> Result<Self> {
        Self::with_capacity(kind, INITIAL_PARAMETER_SET_CAPACITY)
    }

    pub fn with_capacity(kind: ParameterSetKind, capacity: usize) -> Result<Self> {
        let mut buf = Vec::new();
        buf.try_reserve_exact(capacity.max(1))?;
        Ok(Self {
            kind,
            state: CaptureState::Idle,
            buf,
        })
    }

    pub fn kind(&self) -> ParameterSetKind {
        self.kind
    }

    pub fn state(&self) -> CaptureState {
        self.state
    }

    pub fn is_open(&self) -> bool {
        self.state == CaptureState::Open
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    /// Begin capturing a new parameter set, starting with its header byte.
    ///
    /// A second parameter set of the same kind is fatal.
    pub fn open(&mut self, header: u8) -> Result<()> {
        if !self.buf.is_empty() {
            return Err(Error::DuplicateParameterSet(self.kind));
        }
        self.state = CaptureState::Open;
        self.push(header)
    }

    /// Append a byte if the capture is open.
    pub fn push(&mut self, byte: u8) -> Result<()> {
        if self.state != CaptureState::Open {
            return Ok(());
        }
        push_growing(&mut self.buf, byte)
    }

    /// Close the capture, dropping the `trailing` bytes that were appended
    /// after the payload had already ended.
    ///
    /// Returns the retained length. Closing a capture that is not open is a no-op.
    pub fn close(&mut self, trailing: usize) -> usize {
        if self.state == CaptureState::Open {
            let len = self.buf.len().saturating_sub(trailing);
            self.buf.truncate(len);
            self.state = CaptureState::Closed;
        }
        self.buf.len()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }
}

/// Push onto `buf`, doubling its capacity when full.
///
/// Growth is fallible so that an allocation failure surfaces as
/// [`Error::Allocation`] instead of aborting.
pub(crate) fn push_growing<T>(buf: &mut Vec<T>, item: T) -> Result<()> {
    if buf.len() == buf.capacity() {
        buf.try_reserve_exact(buf.capacity().max(1))?;
    }
    buf.push(item);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_push_close_trims_trailing_bytes() {
        let mut capture = ParameterSetCapture::new(ParameterSetKind::Sps).unwrap();
        assert_eq!(capture.state(), CaptureState::Idle);

        capture.open(0x67).unwrap();
        for b in [0x42, 0x00, 0x1E, 0x00, 0x00, 0x00, 0x01] {
            capture.push(b).unwrap();
        }
        assert_eq!(capture.len(), 8);

        assert_eq!(capture.close(4), 4);
        assert_eq!(capture.state(), CaptureState::Closed);
        assert_eq!(capture.as_bytes(), &[0x67, 0x42, 0x00, 0x1E]);
    }

    #[test]
    fn test_push_ignored_unless_open() {
        let mut capture = ParameterSetCapture::new(ParameterSetKind::Pps).unwrap();
        capture.push(0xAA).unwrap();
        assert!(capture.is_empty());

        capture.open(0x68).unwrap();
        capture.close(0);
        capture.push(0xBB).unwrap();
        assert_eq!(capture.as_bytes(), &[0x68]);
    }

    #[test]
    fn test_close_saturates_on_short_capture() {
        let mut capture = ParameterSetCapture::new(ParameterSetKind::Pps).unwrap();
        capture.open(0x68).unwrap();
        assert_eq!(capture.close(4), 0);
        assert!(capture.is_empty());
    }

    #[test]
    fn test_second_open_is_duplicate() {
        let mut capture = ParameterSetCapture::new(ParameterSetKind::Pps).unwrap();
        capture.open(0x68).unwrap();
        capture.push(0xCE).unwrap();
        capture.close(0);

        let err = capture.open(0x68).unwrap_err();
        assert!(matches!(
            err,
            Error::DuplicateParameterSet(ParameterSetKind::Pps)
        ));
    }

    #[test]
    fn test_growth_preserves_contents() {
        let mut capture = ParameterSetCapture::with_capacity(ParameterSetKind::Sps, 2).unwrap();
        capture.open(0x67).unwrap();
        for b in 0..100u8 {
            capture.push(b).unwrap();
        }
        capture.close(0);
        assert_eq!(capture.len(), 101);
        assert_eq!(capture.as_bytes()[0], 0x67);
        assert_eq!(&capture.as_bytes()[1..], (0..100u8).collect::<Vec<_>>().as_slice());
    }

    #[test]
    fn test_push_growing_doubles() {
        let mut buf: Vec<u32> = Vec::with_capacity(4);
        for i in 0..5 {
            push_growing(&mut buf, i).unwrap();
        }
        assert!(buf.capacity() >= buf.len());
        assert_eq!(buf, vec![0, 1, 2, 3, 4]);
    }
}
