//! NAL unit records produced by the scanner.

use std::fmt;

/// Mask selecting `nal_unit_type` from the first NAL header byte.
pub const NAL_TYPE_MASK: u8 = 0x1F;

/// H.264 `nal_unit_type` (low 5 bits of the NAL header byte).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize))]
pub struct NalType(pub u8);

impl NalType {
    pub const NON_IDR: Self = Self(1);
    pub const IDR: Self = Self(5);
    pub const SEI: Self = Self(6);
    pub const SPS: Self = Self(7);
    pub const PPS: Self = Self(8);
    pub const AUD: Self = Self(9);

    /// Classify a NAL header byte.
    pub fn from_header(byte: u8) -> Self {
        Self(byte & NAL_TYPE_MASK)
    }

    pub fn is_sps(self) -> bool {
        self == Self::SPS
    }

    pub fn is_pps(self) -> bool {
        self == Self::PPS
    }

    /// IDR pictures are the only sync samples we emit.
    pub fn is_idr(self) -> bool {
        self == Self::IDR
    }

    /// Short human-readable name.
    pub fn name(self) -> &'static str {
        match self.0 {
            1 => "non-IDR slice",
            2 => "slice data A",
            3 => "slice data B",
            4 => "slice data C",
            5 => "IDR slice",
            6 => "SEI",
            7 => "SPS",
            8 => "PPS",
            9 => "AUD",
            10 => "end of sequence",
            11 => "end of stream",
            12 => "filler",
            _ => "other",
        }
    }
}

impl fmt::Display for NalType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.0, self.name())
    }
}

/// Position of a NAL unit in the logical frame sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameIndex {
    /// The stream's SPS.
    Sps,
    /// The stream's PPS.
    Pps,
    /// Zero-based ordinal among picture NAL units.
    Picture(u32),
}

impl FrameIndex {
    /// Legacy integer encoding: `-1` SPS, `-2` PPS, `>= 0` picture ordinal.
    pub fn as_raw(self) -> i64 {
        match self {
            Self::Sps => -1,
            Self::Pps => -2,
            Self::Picture(n) => n as i64,
        }
    }

    /// Picture ordinal, if this record is a picture.
    pub fn picture(self) -> Option<u32> {
        match self {
            Self::Picture(n) => Some(n),
            _ => None,
        }
    }
}

/// One NAL unit detected in the source stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NalRecord {
    /// Logical frame position.
    pub frame_index: FrameIndex,
    /// Absolute offset of the NAL header byte (first byte after the start code).
    pub byte_offset: u64,
    /// Payload length, excluding the next start code.
    pub byte_size: u64,
    /// Type taken from the header byte.
    pub nal_type: NalType,
}

impl NalRecord {
    /// Whether this record becomes a sample in the container.
    pub fn is_picture(&self) -> bool {
        matches!(self.frame_index, FrameIndex::Picture(_))
    }

    /// Exclusive end offset of the payload.
    pub fn end_offset(&self) -> u64 {
        self.byte_offset + self.byte_size
    }
}
