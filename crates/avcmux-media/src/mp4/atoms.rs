//! MP4 atom type codes and parsed atom headers.

use super::SampleTable;

/// Four-character atom type code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AtomType(pub [u8; 4]);

impl AtomType {
    pub const FTYP: Self = Self(*b"ftyp");
    pub const FREE: Self = Self(*b"free");
    pub const MOOV: Self = Self(*b"moov");
    pub const MDAT: Self = Self(*b"mdat");
    pub const MVHD: Self = Self(*b"mvhd");
    pub const TRAK: Self = Self(*b"trak");
    pub const TKHD: Self = Self(*b"tkhd");
    pub const MDIA: Self = Self(*b"mdia");
    pub const MDHD: Self = Self(*b"mdhd");
    pub const HDLR: Self = Self(*b"hdlr");
    pub const MINF: Self = Self(*b"minf");
    pub const VMHD: Self = Self(*b"vmhd");
    pub const DINF: Self = Self(*b"dinf");
    pub const DREF: Self = Self(*b"dref");
    pub const URL: Self = Self(*b"url ");
    pub const STBL: Self = Self(*b"stbl");
    pub const STSD: Self = Self(*b"stsd");
    pub const AVC1: Self = Self(*b"avc1");
    pub const AVCC: Self = Self(*b"avcC");
    pub const STTS: Self = Self(*b"stts");
    pub const STSS: Self = Self(*b"stss");
    pub const STSC: Self = Self(*b"stsc");
    pub const STSZ: Self = Self(*b"stsz");
    pub const STCO: Self = Self(*b"stco");
    pub const UDTA: Self = Self(*b"udta");
    pub const META: Self = Self(*b"meta");
    pub const ILST: Self = Self(*b"ilst");
    pub const DATA: Self = Self(*b"data");
    /// iTunes-style encoder annotation (`©too`).
    pub const TOO: Self = Self([0xA9, b't', b'o', b'o']);

    // ftyp brands
    pub const ISOM: Self = Self(*b"isom");
    pub const ISO2: Self = Self(*b"iso2");
    pub const MP41: Self = Self(*b"mp41");

    /// Create from bytes.
    pub fn from_bytes(bytes: [u8; 4]) -> Self {
        Self(bytes)
    }

    /// Get the 4-char code as a string.
    pub fn as_str(&self) -> &str {
        std::str::from_utf8(&self.0).unwrap_or("????")
    }
}

impl std::fmt::Display for AtomType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Parsed atom header.
#[derive(Debug, Clone)]
pub struct Atom {
    /// Atom type code.
    pub atom_type: AtomType,
    /// Atom size including header.
    pub size: u64,
    /// File offset where atom data starts (after header).
    pub data_offset: u64,
    /// Size of the header (8 or 16 bytes).
    pub header_size: u8,
}

impl Atom {
    /// Get the data size (size - header).
    pub fn data_size(&self) -> u64 {
        self.size.saturating_sub(self.header_size as u64)
    }

    /// File offset of the atom's size field.
    pub fn start_offset(&self) -> u64 {
        self.data_offset - self.header_size as u64
    }

    /// Exclusive end offset.
    pub fn end_offset(&self) -> u64 {
        self.start_offset().saturating_add(self.size)
    }
}

/// Handler type for a track.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerType {
    Video,
    Audio,
    Unknown([u8; 4]),
}

impl HandlerType {
    pub fn from_bytes(bytes: [u8; 4]) -> Self {
        match &bytes {
            b"vide" => Self::Video,
            b"soun" => Self::Audio,
            _ => Self::Unknown(bytes),
        }
    }

    pub fn is_video(&self) -> bool {
        matches!(self, Self::Video)
    }
}

/// Track information extracted from trak atom.
#[derive(Debug, Clone)]
pub struct TrackInfo {
    /// Track ID.
    pub track_id: u32,
    /// Handler type (video/audio/etc).
    pub handler_type: HandlerType,
    /// Track duration from tkhd, in movie timescale.
    pub header_duration: u64,
    /// Media duration from mdhd, in media timescale.
    pub duration: u64,
    /// Media timescale (ticks per second for this track).
    pub timescale: u32,
    /// Sample table with all sample info.
    pub sample_table: SampleTable,
    /// Sample entry type from stsd (e.g. `avc1`).
    pub sample_entry: Option<AtomType>,
    /// Codec configuration data (avcC payload).
    pub codec_data: Option<Vec<u8>>,
    /// Width from tkhd.
    pub width: Option<u32>,
    /// Height from tkhd.
    pub height: Option<u32>,
}

impl TrackInfo {
    /// Create empty track info.
    pub fn new(track_id: u32) -> Self {
        Self {
            track_id,
            handler_type: HandlerType::Unknown([0; 4]),
            header_duration: 0,
            duration: 0,
            timescale: 1,
            sample_table: SampleTable::default(),
            sample_entry: None,
            codec_data: None,
            width: None,
            height: None,
        }
    }

    /// Get duration in seconds.
    pub fn duration_secs(&self) -> f64 {
        if self.timescale == 0 {
            0.0
        } else {
            self.duration as f64 / self.timescale as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_atom_type_display() {
        assert_eq!(AtomType::STCO.to_string(), "stco");
        assert_eq!(AtomType::URL.as_str(), "url ");
        // 0xA9 is not valid UTF-8 on its own
        assert_eq!(AtomType::TOO.as_str(), "????");
    }

    #[test]
    fn test_atom_offsets() {
        let atom = Atom {
            atom_type: AtomType::MDAT,
            size: 108,
            data_offset: 48,
            header_size: 8,
        };
        assert_eq!(atom.data_size(), 100);
        assert_eq!(atom.start_offset(), 40);
        assert_eq!(atom.end_offset(), 148);
    }

    #[test]
    fn test_track_duration_secs() {
        let mut track = TrackInfo::new(1);
        track.timescale = 30;
        track.duration = 90;
        assert!((track.duration_secs() - 3.0).abs() < f64::EPSILON);
        track.timescale = 0;
        assert_eq!(track.duration_secs(), 0.0);
    }
}
