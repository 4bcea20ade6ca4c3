//! MP4 file reader with atom parsing.

use super::{Atom, AtomType, HandlerType, Mp4File, SampleTableBuilder, TrackInfo};
use crate::error::{Error, Result};
use std::io::{Read, Seek, SeekFrom};

/// Maximum allowed atom data size (64 MB) to prevent OOM on malformed files.
const MAX_ATOM_DATA_SIZE: u64 = 64 * 1024 * 1024;

/// Offset of the first child box inside the `stsd` payload: version/flags,
/// entry count, sample entry header and the 78 bytes of visual sample entry fields.
const AVC1_CHILDREN_OFFSET: usize = 94;

fn be_u32(data: &[u8], offset: usize) -> Option<u32> {
    let bytes = data.get(offset..offset + 4)?;
    Some(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

fn be_u64(data: &[u8], offset: usize) -> Option<u64> {
    let bytes = data.get(offset..offset + 8)?;
    let mut buf = [0u8; 8];
    buf.copy_from_slice(bytes);
    Some(u64::from_be_bytes(buf))
}

/// Entries of a flat full-box table: version/flags, `entry_count`, then
/// `entry_len`-byte entries starting at `first_entry`. Truncated tables yield
/// the entries that are complete.
fn table_entries(data: &[u8], count_offset: usize, entry_len: usize) -> impl Iterator<Item = &[u8]> {
    let count = be_u32(data, count_offset).unwrap_or(0) as usize;
    let first_entry = count_offset + 4;
    data.get(first_entry..)
        .unwrap_or(&[])
        .chunks_exact(entry_len)
        .take(count)
}

/// MP4 file reader.
pub struct Mp4Reader<R> {
    reader: R,
    file_size: u64,
}

impl<R: Read + Seek> Mp4Reader<R> {
    pub fn new(mut reader: R) -> Result<Self> {
        let file_size = reader.seek(SeekFrom::End(0)).map_err(Error::Read)?;
        reader.seek(SeekFrom::Start(0)).map_err(Error::Read)?;
        Ok(Self { reader, file_size })
    }

    /// Parse the whole file.
    pub fn parse(&mut self) -> Result<Mp4File> {
        let mut mp4 = Mp4File {
            major_brand: None,
            duration: 0,
            timescale: 1000,
            video_track: None,
            mdat: None,
            has_faststart: false,
            encoder: None,
            file_size: self.file_size,
        };

        let mut moov_offset = None;
        let atoms = self.read_atoms(0, self.file_size)?;

        for atom in &atoms {
            match atom.atom_type {
                AtomType::FTYP => {
                    let data = self.read_atom_data(atom)?;
                    if let Some(brand) = data.get(0..4) {
                        mp4.major_brand = Some(AtomType::from_bytes([brand[0], brand[1], brand[2], brand[3]]));
                    }
                }
                AtomType::MOOV => {
                    moov_offset = Some(atom.start_offset());
                    self.parse_moov(atom, &mut mp4)?;
                }
                AtomType::MDAT if mp4.mdat.is_none() => {
                    mp4.mdat = Some(atom.clone());
                }
                _ => {}
            }
        }

        if moov_offset.is_none() {
            return Err(Error::invalid_mp4("no moov atom"));
        }

        // Faststart means moov comes before mdat
        mp4.has_faststart = match (moov_offset, &mp4.mdat) {
            (Some(moov), Some(mdat)) => moov < mdat.start_offset(),
            _ => true,
        };

        Ok(mp4)
    }

    /// Read atom headers between `start` and `end`.
    fn read_atoms(&mut self, start: u64, end: u64) -> Result<Vec<Atom>> {
        let mut atoms = Vec::new();
        let mut pos = start;

        while end.saturating_sub(pos) >= 8 {
            self.reader.seek(SeekFrom::Start(pos)).map_err(Error::Read)?;

            let mut header = [0u8; 8];
            if self.reader.read_exact(&mut header).is_err() {
                break;
            }

            let size = u32::from_be_bytes([header[0], header[1], header[2], header[3]]) as u64;
            let atom_type = AtomType::from_bytes([header[4], header[5], header[6], header[7]]);

            let (actual_size, header_size) = match size {
                1 => {
                    // 64-bit extended size
                    let mut ext = [0u8; 8];
                    self.reader.read_exact(&mut ext).map_err(Error::Read)?;
                    (u64::from_be_bytes(ext), 16u8)
                }
                // Atom extends to the end of its parent
                0 => (end - pos, 8u8),
                _ => (size, 8u8),
            };

            if actual_size < header_size as u64 {
                return Err(Error::invalid_mp4(format!(
                    "atom {} at {} has size {} smaller than its header",
                    atom_type, pos, actual_size
                )));
            }
            let atom_end = pos
                .checked_add(actual_size)
                .filter(|e| *e <= end)
                .ok_or_else(|| {
                    Error::invalid_mp4(format!(
                        "atom {} at {} with size {} overruns its parent ending at {}",
                        atom_type, pos, actual_size, end
                    ))
                })?;

            atoms.push(Atom {
                atom_type,
                size: actual_size,
                data_offset: pos + header_size as u64,
                header_size,
            });

            pos = atom_end;
        }

        Ok(atoms)
    }

    fn children(&mut self, atom: &Atom) -> Result<Vec<Atom>> {
        self.read_atoms(atom.data_offset, atom.end_offset())
    }

    /// Read and validate atom data, rejecting oversized atoms.
    fn read_atom_data(&mut self, atom: &Atom) -> Result<Vec<u8>> {
        let size = atom.data_size();
        if size > MAX_ATOM_DATA_SIZE {
            return Err(Error::invalid_mp4(format!(
                "Atom {} data size {} exceeds maximum {}",
                atom.atom_type, size, MAX_ATOM_DATA_SIZE
            )));
        }
        self.reader
            .seek(SeekFrom::Start(atom.data_offset))
            .map_err(Error::Read)?;
        let mut data = vec![0u8; size as usize];
        self.reader.read_exact(&mut data).map_err(Error::Read)?;
        Ok(data)
    }

    fn parse_moov(&mut self, moov: &Atom, mp4: &mut Mp4File) -> Result<()> {
        for child in &self.children(moov)? {
            match child.atom_type {
                AtomType::MVHD => self.parse_mvhd(child, mp4)?,
                AtomType::TRAK => {
                    let track = self.parse_trak(child)?;
                    if track.handler_type.is_video() && mp4.video_track.is_none() {
                        mp4.video_track = Some(track);
                    }
                }
                AtomType::UDTA => mp4.encoder = self.parse_udta(child)?,
                _ => {}
            }
        }
        Ok(())
    }

    /// Parse mvhd (movie header).
    fn parse_mvhd(&mut self, atom: &Atom, mp4: &mut Mp4File) -> Result<()> {
        let data = self.read_atom_data(atom)?;
        match data.first() {
            Some(0) => {
                // 32-bit timestamps
                if let (Some(timescale), Some(duration)) = (be_u32(&data, 12), be_u32(&data, 16)) {
                    mp4.timescale = timescale;
                    mp4.duration = duration as u64;
                }
            }
            Some(_) => {
                if let (Some(timescale), Some(duration)) = (be_u32(&data, 20), be_u64(&data, 24)) {
                    mp4.timescale = timescale;
                    mp4.duration = duration;
                }
            }
            None => {}
        }
        Ok(())
    }

    /// Parse trak (track) atom.
    fn parse_trak(&mut self, trak: &Atom) -> Result<TrackInfo> {
        let mut track = TrackInfo::new(0);
        for child in &self.children(trak)? {
            match child.atom_type {
                AtomType::TKHD => self.parse_tkhd(child, &mut track)?,
                AtomType::MDIA => self.parse_mdia(child, &mut track)?,
                _ => {}
            }
        }
        Ok(track)
    }

    /// Parse tkhd (track header).
    fn parse_tkhd(&mut self, atom: &Atom, track: &mut TrackInfo) -> Result<()> {
        let data = self.read_atom_data(atom)?;

        // (track_id, duration, width) offsets for version 0 and 1
        let (id_at, duration, dims_at) = match data.first() {
            Some(0) => (12, be_u32(&data, 20).map(u64::from), 76),
            Some(_) => (20, be_u64(&data, 28), 88),
            None => return Ok(()),
        };

        if let Some(id) = be_u32(&data, id_at) {
            track.track_id = id;
        }
        if let Some(duration) = duration {
            track.header_duration = duration;
        }
        // Width and height are 16.16 fixed point
        if let (Some(w), Some(h)) = (be_u32(&data, dims_at), be_u32(&data, dims_at + 4)) {
            track.width = Some(w >> 16);
            track.height = Some(h >> 16);
        }
        Ok(())
    }

    /// Parse mdia (media) atom.
    fn parse_mdia(&mut self, mdia: &Atom, track: &mut TrackInfo) -> Result<()> {
        let children = self.children(mdia)?;

        // hdlr first: stsd parsing depends on the handler type
        for child in children.iter().filter(|c| c.atom_type == AtomType::HDLR) {
            self.parse_hdlr(child, track)?;
        }
        for child in &children {
            match child.atom_type {
                AtomType::MDHD => self.parse_mdhd(child, track)?,
                AtomType::MINF => self.parse_minf(child, track)?,
                _ => {}
            }
        }
        Ok(())
    }

    /// Parse mdhd (media header).
    fn parse_mdhd(&mut self, atom: &Atom, track: &mut TrackInfo) -> Result<()> {
        let data = self.read_atom_data(atom)?;
        match data.first() {
            Some(0) => {
                if let (Some(timescale), Some(duration)) = (be_u32(&data, 12), be_u32(&data, 16)) {
                    track.timescale = timescale;
                    track.duration = duration as u64;
                }
            }
            Some(_) => {
                if let (Some(timescale), Some(duration)) = (be_u32(&data, 20), be_u64(&data, 24)) {
                    track.timescale = timescale;
                    track.duration = duration;
                }
            }
            None => {}
        }
        Ok(())
    }

    /// Parse hdlr (handler) atom.
    fn parse_hdlr(&mut self, atom: &Atom, track: &mut TrackInfo) -> Result<()> {
        let data = self.read_atom_data(atom)?;
        if let Some(t) = data.get(8..12) {
            track.handler_type = HandlerType::from_bytes([t[0], t[1], t[2], t[3]]);
        }
        Ok(())
    }

    /// Parse minf (media info) atom.
    fn parse_minf(&mut self, minf: &Atom, track: &mut TrackInfo) -> Result<()> {
        for child in &self.children(minf)? {
            if child.atom_type == AtomType::STBL {
                self.parse_stbl(child, track)?;
            }
        }
        Ok(())
    }

    /// Parse stbl (sample table) atom.
    fn parse_stbl(&mut self, stbl: &Atom, track: &mut TrackInfo) -> Result<()> {
        let mut builder = SampleTableBuilder::new();

        for child in &self.children(stbl)? {
            match child.atom_type {
                AtomType::STSD => self.parse_stsd(child, track)?,
                AtomType::STTS => {
                    let data = self.read_atom_data(child)?;
                    builder.set_stts(
                        table_entries(&data, 4, 8)
                            .map(|e| (be_u32(e, 0).unwrap_or(0), be_u32(e, 4).unwrap_or(0)))
                            .collect(),
                    );
                }
                AtomType::STSS => {
                    let data = self.read_atom_data(child)?;
                    builder.set_sync_samples(
                        table_entries(&data, 4, 4)
                            .map(|e| be_u32(e, 0).unwrap_or(0))
                            .collect(),
                    );
                }
                AtomType::STSC => {
                    let data = self.read_atom_data(child)?;
                    builder.set_stsc(
                        table_entries(&data, 4, 12)
                            .map(|e| {
                                (
                                    be_u32(e, 0).unwrap_or(0),
                                    be_u32(e, 4).unwrap_or(0),
                                    be_u32(e, 8).unwrap_or(0),
                                )
                            })
                            .collect(),
                    );
                }
                AtomType::STSZ => {
                    let data = self.read_atom_data(child)?;
                    let uniform_size = be_u32(&data, 4).unwrap_or(0);
                    let sample_count = be_u32(&data, 8).unwrap_or(0);
                    let sizes = if uniform_size == 0 {
                        table_entries(&data, 8, 4)
                            .map(|e| be_u32(e, 0).unwrap_or(0))
                            .collect()
                    } else {
                        Vec::new()
                    };
                    builder.set_stsz(uniform_size, sample_count, sizes);
                }
                AtomType::STCO => {
                    let data = self.read_atom_data(child)?;
                    builder.set_chunk_offsets(
                        table_entries(&data, 4, 4)
                            .map(|e| be_u32(e, 0).unwrap_or(0) as u64)
                            .collect(),
                    );
                }
                _ => {}
            }
        }

        track.sample_table = builder.build();
        Ok(())
    }

    /// Parse stsd (sample description): sample entry type and avcC payload.
    fn parse_stsd(&mut self, atom: &Atom, track: &mut TrackInfo) -> Result<()> {
        let data = self.read_atom_data(atom)?;

        if let Some(t) = data.get(12..16) {
            track.sample_entry = Some(AtomType::from_bytes([t[0], t[1], t[2], t[3]]));
        }

        if !track.handler_type.is_video() {
            return Ok(());
        }

        // Scan child boxes after the visual sample entry fields
        let mut pos = AVC1_CHILDREN_OFFSET;
        while let Some(box_size) = be_u32(&data, pos) {
            let box_size = box_size as usize;
            if box_size < 8 || pos + box_size > data.len() {
                break;
            }
            if &data[pos + 4..pos + 8] == b"avcC" {
                track.codec_data = Some(data[pos + 8..pos + box_size].to_vec());
                break;
            }
            pos += box_size;
        }
        Ok(())
    }

    /// Parse udta → meta → ilst → ©too → data for the encoder annotation.
    fn parse_udta(&mut self, udta: &Atom) -> Result<Option<String>> {
        let Some(meta) = self
            .children(udta)?
            .into_iter()
            .find(|a| a.atom_type == AtomType::META)
        else {
            return Ok(None);
        };

        // meta is a full box: children start after version/flags
        let meta_body = Atom {
            atom_type: meta.atom_type,
            size: meta.size.saturating_sub(4),
            data_offset: meta.data_offset + 4,
            header_size: meta.header_size,
        };
        let Some(ilst) = self
            .children(&meta_body)?
            .into_iter()
            .find(|a| a.atom_type == AtomType::ILST)
        else {
            return Ok(None);
        };

        for item in self.children(&ilst)? {
            if item.atom_type != AtomType::TOO {
                continue;
            }
            for data_atom in self.children(&item)? {
                if data_atom.atom_type == AtomType::DATA {
                    // version/flags (4) + locale (4), then the text
                    let data = self.read_atom_data(&data_atom)?;
                    let text = data.get(8..).unwrap_or(&[]);
                    return Ok(Some(String::from_utf8_lossy(text).into_owned()));
                }
            }
        }
        Ok(None)
    }
}
