//! Movie box tree construction.
//!
//! Turns a [`ScanResult`] into the complete non-fragmented layout:
//!
//! ```text
//! ftyp
//! free
//! moov
//! ├── mvhd
//! ├── trak
//! │   ├── tkhd
//! │   └── mdia
//! │       ├── mdhd
//! │       ├── hdlr
//! │       └── minf
//! │           ├── vmhd
//! │           ├── dinf → dref → url
//! │           └── stbl
//! │               ├── stsd → avc1 → avcC
//! │               ├── stts
//! │               ├── stss
//! │               ├── stsc
//! │               ├── stsz
//! │               └── stco
//! └── udta → meta → hdlr, ilst → ©too → data
//! mdat
//! ```
//!
//! Every picture NAL unit becomes one sample (and one chunk) in `mdat`,
//! prefixed by its 4-byte big-endian length. `stco` depends on the size of
//! everything before `mdat`, so it is filled in last.

use bytes::{BufMut, Bytes, BytesMut};
use chrono::{DateTime, Utc};
use tracing::debug;

use super::avcc::AvcDecoderConfig;
use super::boxes::{Mp4Box, TableBody, BOX_HEADER_LEN};
use super::AtomType;
use crate::annexb::ScanResult;
use crate::error::{Error, Result};

/// Movie timescale: milliseconds.
pub const MOVIE_TIMESCALE: u32 = 1000;

/// Only one track is ever written.
pub const TRACK_ID: u32 = 1;

/// Length of the AVCC length prefix in front of each sample.
pub const SAMPLE_LENGTH_PREFIX: u32 = 4;

/// Encoder annotation written into `udta` by default.
pub const DEFAULT_ENCODER_NAME: &str = "Lavf53.4.0";

/// Seconds from 1904-01-01 (ISO BMFF epoch) to 1970-01-01.
const ISO_EPOCH_OFFSET: i64 = 2_082_844_800;

/// ISO-639-2 "und", packed as three 5-bit letters.
const LANGUAGE_UNDETERMINED: u16 = 0x55C4;

/// Identity transformation matrix shared by mvhd and tkhd.
const UNITY_MATRIX: [u32; 9] = [0x0001_0000, 0, 0, 0, 0x0001_0000, 0, 0, 0, 0x4000_0000];

/// Geometry and rate supplied by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VideoParams {
    pub width: u32,
    pub height: u32,
    pub frame_rate: u32,
}

impl VideoParams {
    pub fn new(width: u32, height: u32, frame_rate: u32) -> Self {
        Self {
            width,
            height,
            frame_rate,
        }
    }

    /// All values must be positive; dimensions must fit the 16-bit sample entry fields.
    pub fn validate(&self) -> Result<()> {
        if self.width == 0 || self.height == 0 {
            return Err(Error::InvalidParameters(format!(
                "dimensions must be positive, got {}x{}",
                self.width, self.height
            )));
        }
        if self.width > u16::MAX as u32 || self.height > u16::MAX as u32 {
            return Err(Error::InvalidParameters(format!(
                "dimensions {}x{} exceed {}",
                self.width,
                self.height,
                u16::MAX
            )));
        }
        if self.frame_rate == 0 {
            return Err(Error::InvalidParameters(
                "frame rate must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Cosmetic settings that do not depend on the stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MovieOptions {
    /// Written as creation and modification time of mvhd/tkhd/mdhd.
    pub creation_time: DateTime<Utc>,
    /// Text of the `©too` annotation.
    pub encoder_name: String,
}

impl Default for MovieOptions {
    fn default() -> Self {
        Self {
            creation_time: Utc::now(),
            encoder_name: DEFAULT_ENCODER_NAME.to_string(),
        }
    }
}

impl MovieOptions {
    /// Creation time in seconds since 1904, clamped to the 32-bit field.
    pub fn iso_timestamp(&self) -> u32 {
        (self.creation_time.timestamp() + ISO_EPOCH_OFFSET).clamp(0, u32::MAX as i64) as u32
    }
}

/// `1000 * frames / frame_rate`, truncated.
pub fn movie_duration(total_frame_count: u32, frame_rate: u32) -> Result<u32> {
    if frame_rate == 0 {
        return Err(Error::InvalidParameters(
            "frame rate must be positive".to_string(),
        ));
    }
    let ms = MOVIE_TIMESCALE as u64 * total_frame_count as u64 / frame_rate as u64;
    u32::try_from(ms).map_err(|_| Error::too_large(format!("movie duration of {} ms", ms)))
}

/// The complete box layout of one output file.
#[derive(Debug, Clone)]
pub struct MovieLayout {
    pub ftyp: Mp4Box,
    pub free: Mp4Box,
    pub moov: Mp4Box,
    pub mdat: Mp4Box,
    /// `stsz` entries: NAL payload size plus the length prefix.
    pub sample_sizes: Vec<u32>,
    /// `stco` entries: absolute offset of each sample's length prefix.
    pub chunk_offsets: Vec<u32>,
    /// 1-based `stss` entries.
    pub sync_samples: Vec<u32>,
    /// Duration in the movie timescale (ms).
    pub movie_duration: u32,
    /// Duration in the media timescale (one tick per frame).
    pub media_duration: u32,
}

impl MovieLayout {
    /// Bytes before the first sample: ftyp, free, moov and the mdat header.
    pub fn header_len(&self) -> u64 {
        self.ftyp.size() + self.free.size() + self.moov.size() + BOX_HEADER_LEN
    }

    /// Size of the finished file.
    pub fn file_len(&self) -> u64 {
        self.ftyp.size() + self.free.size() + self.moov.size() + self.mdat.size()
    }

    /// Serialize everything up to and including the mdat header.
    pub fn header_bytes(&self) -> Result<Bytes> {
        let mut buf = BytesMut::with_capacity(self.header_len() as usize);
        for b in [&self.ftyp, &self.free, &self.moov, &self.mdat] {
            b.write_to(&mut buf)?;
        }
        Ok(buf.freeze())
    }
}

/// Builds a [`MovieLayout`] from scan results.
pub struct MovieBuilder<'a> {
    scan: &'a ScanResult,
    params: VideoParams,
    options: &'a MovieOptions,
}

impl<'a> MovieBuilder<'a> {
    pub fn new(scan: &'a ScanResult, params: VideoParams, options: &'a MovieOptions) -> Self {
        Self {
            scan,
            params,
            options,
        }
    }

    /// Build the box tree. Sizes are final once this returns.
    pub fn build(&self) -> Result<MovieLayout> {
        self.params.validate()?;

        let total = self.scan.total_frame_count;
        let movie_duration = movie_duration(total, self.params.frame_rate)?;
        let media_duration = total;

        let sample_sizes = self
            .scan
            .pictures()
            .map(|r| {
                r.byte_size
                    .checked_add(SAMPLE_LENGTH_PREFIX as u64)
                    .and_then(|s| u32::try_from(s).ok())
                    .ok_or_else(|| {
                        Error::too_large(format!("NAL unit of {} bytes", r.byte_size))
                    })
            })
            .collect::<Result<Vec<u32>>>()?;
        let sync_samples: Vec<u32> = self.scan.sync_sample_numbers().collect();
        let avcc = AvcDecoderConfig::from_parameter_sets(&self.scan.sps, &self.scan.pps)?;

        let ftyp = Mp4Box::FileType {
            major_brand: AtomType::ISOM,
            minor_version: 0x200,
            compatible_brands: vec![AtomType::ISOM, AtomType::ISO2, AtomType::AVC1, AtomType::MP41],
        };
        let free = Mp4Box::Free { padding: 0 };

        // Offsets are placeholders until the size of moov is known.
        let mut moov = Mp4Box::container(
            AtomType::MOOV,
            vec![
                self.mvhd(movie_duration),
                self.trak(movie_duration, media_duration, &avcc, &sample_sizes, &sync_samples),
                self.udta(),
            ],
        );

        let payload_len: u64 = sample_sizes.iter().map(|&s| s as u64).sum();
        let mdat = Mp4Box::MediaData { payload_len };

        let data_start = ftyp.size() + free.size() + moov.size() + BOX_HEADER_LEN;
        let chunk_offsets = chunk_offsets(data_start, &sample_sizes)?;
        match moov.find_mut(AtomType::STCO) {
            Some(Mp4Box::Table(table)) => *table = TableBody::ChunkOffsets(chunk_offsets.clone()),
            _ => return Err(Error::invalid_mp4("moov has no stco table")),
        }

        debug!(
            "Movie layout: moov {} bytes, mdat {} bytes, {} samples ({} sync), {} ms",
            moov.size(),
            mdat.size(),
            sample_sizes.len(),
            sync_samples.len(),
            movie_duration
        );

        Ok(MovieLayout {
            ftyp,
            free,
            moov,
            mdat,
            sample_sizes,
            chunk_offsets,
            sync_samples,
            movie_duration,
            media_duration,
        })
    }

    fn mvhd(&self, duration: u32) -> Mp4Box {
        let now = self.options.iso_timestamp();
        let mut fields = BytesMut::with_capacity(96);
        fields.put_u32(now); // creation time
        fields.put_u32(now); // modification time
        fields.put_u32(MOVIE_TIMESCALE);
        fields.put_u32(duration);
        fields.put_u32(0x0001_0000); // rate = 1.0
        fields.put_u16(0x0100); // volume = 1.0
        fields.put_bytes(0, 10); // reserved
        put_matrix(&mut fields);
        fields.put_bytes(0, 24); // pre_defined
        fields.put_u32(TRACK_ID + 1); // next track ID
        Mp4Box::full(AtomType::MVHD, 0, 0, fields.freeze())
    }

    fn trak(
        &self,
        movie_duration: u32,
        media_duration: u32,
        avcc: &AvcDecoderConfig,
        sample_sizes: &[u32],
        sync_samples: &[u32],
    ) -> Mp4Box {
        let mdia = Mp4Box::container(
            AtomType::MDIA,
            vec![
                self.mdhd(media_duration),
                video_hdlr(),
                Mp4Box::container(
                    AtomType::MINF,
                    vec![
                        vmhd(),
                        dinf(),
                        self.stbl(avcc, sample_sizes, sync_samples),
                    ],
                ),
            ],
        );
        Mp4Box::container(AtomType::TRAK, vec![self.tkhd(movie_duration), mdia])
    }

    fn tkhd(&self, duration: u32) -> Mp4Box {
        let now = self.options.iso_timestamp();
        let mut fields = BytesMut::with_capacity(80);
        fields.put_u32(now);
        fields.put_u32(now);
        fields.put_u32(TRACK_ID);
        fields.put_u32(0); // reserved
        fields.put_u32(duration);
        fields.put_bytes(0, 8); // reserved
        fields.put_u16(0); // layer
        fields.put_u16(0); // alternate group
        fields.put_u16(0); // volume
        fields.put_u16(0); // reserved
        put_matrix(&mut fields);
        fields.put_u32(self.params.width << 16); // 16.16 fixed point
        fields.put_u32(self.params.height << 16);
        // flags: enabled | in_movie | in_preview | in_poster
        Mp4Box::full(AtomType::TKHD, 0, 0x0F, fields.freeze())
    }

    fn mdhd(&self, duration: u32) -> Mp4Box {
        let now = self.options.iso_timestamp();
        let mut fields = BytesMut::with_capacity(20);
        fields.put_u32(now);
        fields.put_u32(now);
        fields.put_u32(self.params.frame_rate);
        fields.put_u32(duration);
        fields.put_u16(LANGUAGE_UNDETERMINED);
        fields.put_u16(0); // pre_defined
        Mp4Box::full(AtomType::MDHD, 0, 0, fields.freeze())
    }

    fn stbl(&self, avcc: &AvcDecoderConfig, sample_sizes: &[u32], sync_samples: &[u32]) -> Mp4Box {
        let sample_count = sample_sizes.len() as u32;
        Mp4Box::container(
            AtomType::STBL,
            vec![
                self.stsd(avcc),
                Mp4Box::Table(TableBody::TimeToSample(vec![(sample_count, 1)])),
                Mp4Box::Table(TableBody::SyncSamples(sync_samples.to_vec())),
                Mp4Box::Table(TableBody::SampleToChunk(vec![(1, 1, 1)])),
                Mp4Box::Table(TableBody::SampleSizes(sample_sizes.to_vec())),
                Mp4Box::Table(TableBody::ChunkOffsets(vec![0; sample_sizes.len()])),
            ],
        )
    }

    fn stsd(&self, avcc: &AvcDecoderConfig) -> Mp4Box {
        let mut fields = BytesMut::with_capacity(78);
        fields.put_bytes(0, 6); // reserved
        fields.put_u16(1); // data reference index
        fields.put_u16(0); // pre_defined
        fields.put_u16(0); // reserved
        fields.put_bytes(0, 12); // pre_defined
        fields.put_u16(self.params.width as u16);
        fields.put_u16(self.params.height as u16);
        fields.put_u32(0x0048_0000); // 72 dpi
        fields.put_u32(0x0048_0000);
        fields.put_u32(0); // reserved
        fields.put_u16(1); // frame count
        fields.put_bytes(0, 32); // compressor name (empty Pascal string)
        fields.put_u16(0x0018); // depth
        fields.put_i16(-1); // no color table

        let avc1 = Mp4Box::plain(AtomType::AVC1, fields.freeze())
            .with_child(Mp4Box::plain(AtomType::AVCC, avcc.to_bytes()));

        Mp4Box::full(AtomType::STSD, 0, 0, 1u32.to_be_bytes().to_vec()).with_child(avc1)
    }

    fn udta(&self) -> Mp4Box {
        let mut hdlr = BytesMut::with_capacity(21);
        hdlr.put_u32(0); // pre_defined
        hdlr.put_slice(b"mdir");
        hdlr.put_slice(b"appl");
        hdlr.put_u32(0);
        hdlr.put_u32(0);
        hdlr.put_u8(0); // empty name

        let mut data = BytesMut::with_capacity(4 + self.options.encoder_name.len());
        data.put_u32(0); // locale
        data.put_slice(self.options.encoder_name.as_bytes());

        // data flags 1: UTF-8 text
        let annotation = Mp4Box::container(
            AtomType::TOO,
            vec![Mp4Box::full(AtomType::DATA, 0, 1, data.freeze())],
        );
        let meta = Mp4Box::full(AtomType::META, 0, 0, Bytes::new())
            .with_child(Mp4Box::full(AtomType::HDLR, 0, 0, hdlr.freeze()))
            .with_child(Mp4Box::container(AtomType::ILST, vec![annotation]));

        Mp4Box::container(AtomType::UDTA, vec![meta])
    }
}

fn put_matrix(buf: &mut BytesMut) {
    for value in UNITY_MATRIX {
        buf.put_u32(value);
    }
}

fn video_hdlr() -> Mp4Box {
    let mut fields = BytesMut::with_capacity(33);
    fields.put_u32(0); // pre_defined
    fields.put_slice(b"vide");
    fields.put_bytes(0, 12); // reserved
    fields.put_slice(b"VideoHandler\0");
    Mp4Box::full(AtomType::HDLR, 0, 0, fields.freeze())
}

fn vmhd() -> Mp4Box {
    // graphics mode copy, opcolor 0,0,0
    Mp4Box::full(AtomType::VMHD, 0, 1, vec![0u8; 8])
}

fn dinf() -> Mp4Box {
    // flags 1: media data is in this file
    let url = Mp4Box::full(AtomType::URL, 0, 1, Bytes::new());
    let dref = Mp4Box::full(AtomType::DREF, 0, 0, 1u32.to_be_bytes().to_vec()).with_child(url);
    Mp4Box::container(AtomType::DINF, vec![dref])
}

/// Absolute offset of each sample's length prefix, given where the mdat payload starts.
pub fn chunk_offsets(data_start: u64, sample_sizes: &[u32]) -> Result<Vec<u32>> {
    let mut offsets = Vec::with_capacity(sample_sizes.len());
    let mut offset = data_start;
    for &size in sample_sizes {
        let value = u32::try_from(offset)
            .map_err(|_| Error::too_large(format!("sample offset {} exceeds stco range", offset)))?;
        offsets.push(value);
        offset += size as u64;
    }
    Ok(offsets)
}
