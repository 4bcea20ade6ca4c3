//! In-memory ISO BMFF box tree and its serializer.
//!
//! Each box follows the standard layout: 4-byte size (big-endian u32),
//! 4-byte type (ASCII), then box-specific content. A box header is written
//! before its children, so sizes are computed bottom-up with [`Mp4Box::size`]
//! and bytes are written top-down with [`Mp4Box::write_to`].

use bytes::{BufMut, Bytes, BytesMut};

use super::AtomType;
use crate::error::{Error, Result};

/// Size of a compact box header (size + type).
pub const BOX_HEADER_LEN: u64 = 8;

/// Size of the version/flags word of a full box.
const FULLBOX_HEADER_LEN: u64 = 4;

/// Pack version and flags into the full box header word.
pub(crate) fn fullbox_header(version: u8, flags: u32) -> u32 {
    ((version as u32) << 24) | (flags & 0x00FF_FFFF)
}

/// Flat sample-table payloads (`stts`, `stss`, `stsc`, `stsz`, `stco`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TableBody {
    /// `stts`: (sample_count, sample_delta) runs.
    TimeToSample(Vec<(u32, u32)>),
    /// `stss`: 1-based sync sample numbers.
    SyncSamples(Vec<u32>),
    /// `stsc`: (first_chunk, samples_per_chunk, sample_description_index).
    SampleToChunk(Vec<(u32, u32, u32)>),
    /// `stsz`: per-sample sizes (no uniform size).
    SampleSizes(Vec<u32>),
    /// `stco`: 32-bit chunk offsets.
    ChunkOffsets(Vec<u32>),
}

impl TableBody {
    pub fn kind(&self) -> AtomType {
        match self {
            Self::TimeToSample(_) => AtomType::STTS,
            Self::SyncSamples(_) => AtomType::STSS,
            Self::SampleToChunk(_) => AtomType::STSC,
            Self::SampleSizes(_) => AtomType::STSZ,
            Self::ChunkOffsets(_) => AtomType::STCO,
        }
    }

    pub fn entry_count(&self) -> usize {
        match self {
            Self::TimeToSample(e) => e.len(),
            Self::SyncSamples(e) => e.len(),
            Self::SampleToChunk(e) => e.len(),
            Self::SampleSizes(e) => e.len(),
            Self::ChunkOffsets(e) => e.len(),
        }
    }

    fn entry_len(&self) -> u64 {
        match self {
            Self::TimeToSample(_) => 8,
            Self::SampleToChunk(_) => 12,
            Self::SyncSamples(_) | Self::SampleSizes(_) | Self::ChunkOffsets(_) => 4,
        }
    }

    fn payload_len(&self) -> u64 {
        // version/flags + entry count, plus the uniform sample size field of stsz
        let fixed = match self {
            Self::SampleSizes(_) => 12,
            _ => 8,
        };
        fixed + self.entry_count() as u64 * self.entry_len()
    }

    fn write_payload(&self, buf: &mut BytesMut) -> Result<()> {
        buf.put_u32(fullbox_header(0, 0));
        if let Self::SampleSizes(_) = self {
            buf.put_u32(0); // sizes differ per sample
        }
        let count = u32::try_from(self.entry_count())
            .map_err(|_| Error::too_large(format!("{} entry count", self.kind())))?;
        buf.put_u32(count);

        match self {
            Self::TimeToSample(entries) => {
                for &(count, delta) in entries {
                    buf.put_u32(count);
                    buf.put_u32(delta);
                }
            }
            Self::SampleToChunk(entries) => {
                for &(first_chunk, per_chunk, description) in entries {
                    buf.put_u32(first_chunk);
                    buf.put_u32(per_chunk);
                    buf.put_u32(description);
                }
            }
            Self::SyncSamples(values) | Self::SampleSizes(values) | Self::ChunkOffsets(values) => {
                for &value in values {
                    buf.put_u32(value);
                }
            }
        }
        Ok(())
    }
}

/// One node of the box tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mp4Box {
    /// `ftyp`
    FileType {
        major_brand: AtomType,
        minor_version: u32,
        compatible_brands: Vec<AtomType>,
    },
    /// `free` with `padding` zero bytes of payload.
    Free { padding: usize },
    /// Pure container: payload is its children.
    Container { kind: AtomType, children: Vec<Mp4Box> },
    /// Full box: version/flags, fixed fields, then children.
    Full {
        kind: AtomType,
        version: u8,
        flags: u32,
        fields: Bytes,
        children: Vec<Mp4Box>,
    },
    /// Box with fixed fields and children but no version/flags (sample entries, `avcC`).
    Plain {
        kind: AtomType,
        fields: Bytes,
        children: Vec<Mp4Box>,
    },
    /// Sample table.
    Table(TableBody),
    /// `mdat` header; the payload is streamed separately.
    MediaData { payload_len: u64 },
}

impl Mp4Box {
    pub fn container(kind: AtomType, children: Vec<Mp4Box>) -> Self {
        Self::Container { kind, children }
    }

    pub fn full(kind: AtomType, version: u8, flags: u32, fields: impl Into<Bytes>) -> Self {
        Self::Full {
            kind,
            version,
            flags,
            fields: fields.into(),
            children: Vec::new(),
        }
    }

    pub fn plain(kind: AtomType, fields: impl Into<Bytes>) -> Self {
        Self::Plain {
            kind,
            fields: fields.into(),
            children: Vec::new(),
        }
    }

    /// Append a child to a `Container`, `Full` or `Plain` box.
    pub fn with_child(mut self, child: Mp4Box) -> Self {
        if let Some(children) = self.children_mut() {
            children.push(child);
        }
        self
    }

    pub fn kind(&self) -> AtomType {
        match self {
            Self::FileType { .. } => AtomType::FTYP,
            Self::Free { .. } => AtomType::FREE,
            Self::Container { kind, .. } | Self::Full { kind, .. } | Self::Plain { kind, .. } => {
                *kind
            }
            Self::Table(table) => table.kind(),
            Self::MediaData { .. } => AtomType::MDAT,
        }
    }

    pub fn children(&self) -> &[Mp4Box] {
        match self {
            Self::Container { children, .. }
            | Self::Full { children, .. }
            | Self::Plain { children, .. } => children,
            _ => &[],
        }
    }

    fn children_mut(&mut self) -> Option<&mut Vec<Mp4Box>> {
        match self {
            Self::Container { children, .. }
            | Self::Full { children, .. }
            | Self::Plain { children, .. } => Some(children),
            _ => None,
        }
    }

    /// Payload length, excluding this box's header.
    pub fn payload_len(&self) -> u64 {
        let children: u64 = self.children().iter().map(Mp4Box::size).sum();
        match self {
            Self::FileType {
                compatible_brands, ..
            } => 8 + 4 * compatible_brands.len() as u64,
            Self::Free { padding } => *padding as u64,
            Self::Container { .. } => children,
            Self::Full { fields, .. } => FULLBOX_HEADER_LEN + fields.len() as u64 + children,
            Self::Plain { fields, .. } => fields.len() as u64 + children,
            Self::Table(table) => table.payload_len(),
            Self::MediaData { payload_len } => *payload_len,
        }
    }

    /// Total size including the header and all descendants.
    pub fn size(&self) -> u64 {
        BOX_HEADER_LEN + self.payload_len()
    }

    /// Depth-first search for the first box of the given type.
    pub fn find(&self, kind: AtomType) -> Option<&Mp4Box> {
        if self.kind() == kind {
            return Some(self);
        }
        self.children().iter().find_map(|c| c.find(kind))
    }

    /// Mutable variant of [`Mp4Box::find`].
    pub fn find_mut(&mut self, kind: AtomType) -> Option<&mut Mp4Box> {
        if self.kind() == kind {
            return Some(self);
        }
        self.children_mut()?
            .iter_mut()
            .find_map(|c| c.find_mut(kind))
    }

    /// Serialize this box (for `mdat`, only its header).
    pub fn write_to(&self, buf: &mut BytesMut) -> Result<()> {
        let size = u32::try_from(self.size())
            .map_err(|_| Error::too_large(format!("{} box of {} bytes", self.kind(), self.size())))?;
        buf.put_u32(size);
        buf.put_slice(&self.kind().0);

        match self {
            Self::FileType {
                major_brand,
                minor_version,
                compatible_brands,
            } => {
                buf.put_slice(&major_brand.0);
                buf.put_u32(*minor_version);
                for brand in compatible_brands {
                    buf.put_slice(&brand.0);
                }
            }
            Self::Free { padding } => buf.put_bytes(0, *padding),
            Self::Container { .. } => {}
            Self::Full {
                version,
                flags,
                fields,
                ..
            } => {
                buf.put_u32(fullbox_header(*version, *flags));
                buf.put_slice(fields);
            }
            Self::Plain { fields, .. } => buf.put_slice(fields),
            Self::Table(table) => table.write_payload(buf)?,
            Self::MediaData { .. } => return Ok(()),
        }

        for child in self.children() {
            child.write_to(buf)?;
        }
        Ok(())
    }

    /// Serialize into a fresh buffer.
    pub fn to_bytes(&self) -> Result<Bytes> {
        let mut buf = BytesMut::with_capacity(self.size().min(1 << 20) as usize);
        self.write_to(&mut buf)?;
        Ok(buf.freeze())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ftyp_layout() {
        let ftyp = Mp4Box::FileType {
            major_brand: AtomType::ISOM,
            minor_version: 0x200,
            compatible_brands: vec![AtomType::ISOM, AtomType::ISO2, AtomType::AVC1, AtomType::MP41],
        };
        let bytes = ftyp.to_bytes().unwrap();
        assert_eq!(ftyp.size(), 32);
        assert_eq!(bytes.len(), 32);
        assert_eq!(&bytes[..8], &[0, 0, 0, 32, b'f', b't', b'y', b'p']);
        assert_eq!(&bytes[8..12], b"isom");
        assert_eq!(&bytes[12..16], &[0, 0, 2, 0]);
        assert_eq!(&bytes[28..32], b"mp41");
    }

    #[test]
    fn test_free_box() {
        let free = Mp4Box::Free { padding: 0 };
        assert_eq!(free.to_bytes().unwrap().as_ref(), &[0, 0, 0, 8, b'f', b'r', b'e', b'e']);
        assert_eq!(Mp4Box::Free { padding: 4 }.size(), 12);
    }

    #[test]
    fn test_table_sizes() {
        assert_eq!(Mp4Box::Table(TableBody::TimeToSample(vec![(10, 1)])).size(), 24);
        assert_eq!(Mp4Box::Table(TableBody::SyncSamples(vec![])).size(), 16);
        assert_eq!(Mp4Box::Table(TableBody::SyncSamples(vec![1, 31])).size(), 24);
        assert_eq!(Mp4Box::Table(TableBody::SampleToChunk(vec![(1, 1, 1)])).size(), 28);
        assert_eq!(Mp4Box::Table(TableBody::SampleSizes(vec![5, 6, 7])).size(), 32);
        assert_eq!(Mp4Box::Table(TableBody::ChunkOffsets(vec![5, 6, 7])).size(), 28);
    }

    #[test]
    fn test_stsz_bytes() {
        let stsz = Mp4Box::Table(TableBody::SampleSizes(vec![5004, 1204]));
        let bytes = stsz.to_bytes().unwrap();
        assert_eq!(bytes.len() as u64, stsz.size());
        assert_eq!(&bytes[4..8], b"stsz");
        assert_eq!(&bytes[8..12], &[0, 0, 0, 0]); // version/flags
        assert_eq!(&bytes[12..16], &[0, 0, 0, 0]); // uniform size
        assert_eq!(&bytes[16..20], &2u32.to_be_bytes());
        assert_eq!(&bytes[20..24], &5004u32.to_be_bytes());
        assert_eq!(&bytes[24..28], &1204u32.to_be_bytes());
    }

    #[test]
    fn test_empty_stss_is_still_emitted() {
        let stss = Mp4Box::Table(TableBody::SyncSamples(vec![]));
        let bytes = stss.to_bytes().unwrap();
        assert_eq!(bytes.as_ref(), &[0, 0, 0, 16, b's', b't', b's', b's', 0, 0, 0, 0, 0, 0, 0, 0]);
    }

    #[test]
    fn test_nested_sizes_are_exact() {
        let url = Mp4Box::full(AtomType::URL, 0, 1, Bytes::new());
        let dref = Mp4Box::full(AtomType::DREF, 0, 0, 1u32.to_be_bytes().to_vec()).with_child(url);
        let dinf = Mp4Box::container(AtomType::DINF, vec![dref]);

        assert_eq!(dinf.size(), 36);
        let bytes = dinf.to_bytes().unwrap();
        assert_eq!(bytes.len(), 36);
        assert_eq!(&bytes[8..12], &28u32.to_be_bytes());
        assert_eq!(&bytes[12..16], b"dref");
        assert_eq!(&bytes[24..28], &12u32.to_be_bytes());
        assert_eq!(&bytes[28..32], b"url ");
        assert_eq!(&bytes[32..36], &[0, 0, 0, 1]);
    }

    #[test]
    fn test_find_mut_replaces_table() {
        let stbl = Mp4Box::container(
            AtomType::STBL,
            vec![
                Mp4Box::Table(TableBody::SampleSizes(vec![10, 20])),
                Mp4Box::Table(TableBody::ChunkOffsets(vec![0, 0])),
            ],
        );
        let mut moov = Mp4Box::container(AtomType::MOOV, vec![stbl]);
        let before = moov.size();

        if let Some(Mp4Box::Table(table)) = moov.find_mut(AtomType::STCO) {
            *table = TableBody::ChunkOffsets(vec![100, 110]);
        }
        assert_eq!(moov.size(), before);
        assert_eq!(
            moov.find(AtomType::STCO),
            Some(&Mp4Box::Table(TableBody::ChunkOffsets(vec![100, 110])))
        );
        assert!(moov.find(AtomType::STSS).is_none());
    }

    #[test]
    fn test_mdat_writes_header_only() {
        let mdat = Mp4Box::MediaData { payload_len: 100 };
        assert_eq!(mdat.size(), 108);
        assert_eq!(mdat.to_bytes().unwrap().as_ref(), &[0, 0, 0, 108, b'm', b'd', b'a', b't']);
    }

    #[test]
    fn test_oversized_box_is_rejected() {
        let mdat = Mp4Box::MediaData {
            payload_len: u32::MAX as u64,
        };
        let err = mdat.to_bytes().unwrap_err();
        assert!(matches!(err, Error::TooLarge(_)));
    }

    #[test]
    fn test_fullbox_header_packing() {
        assert_eq!(fullbox_header(0, 1), 1);
        assert_eq!(fullbox_header(1, 0x0F), 0x0100_000F);
        assert_eq!(fullbox_header(0, 0xFF00_0001), 1);
    }
}
