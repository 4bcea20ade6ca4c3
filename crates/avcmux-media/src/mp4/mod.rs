//! MP4 container writing and read-back.
//!
//! [`MovieBuilder`] lays out the box tree for a scanned stream and
//! [`Mp4Writer`] streams it to disk. The reader half ([`Mp4File`]) parses a
//! written file back so [`verify_file`] can check it.

mod atoms;
mod avcc;
mod boxes;
mod movie;
mod reader;
mod sample_table;
mod verify;
mod writer;

pub use atoms::{Atom, AtomType, HandlerType, TrackInfo};
pub use avcc::AvcDecoderConfig;
pub use boxes::{Mp4Box, TableBody, BOX_HEADER_LEN};
pub use movie::{
    chunk_offsets, movie_duration, MovieBuilder, MovieLayout, MovieOptions, VideoParams,
    DEFAULT_ENCODER_NAME, MOVIE_TIMESCALE, SAMPLE_LENGTH_PREFIX, TRACK_ID,
};
pub use reader::Mp4Reader;
pub use sample_table::{SampleEntry, SampleTable, SampleTableBuilder};
pub use verify::{verify, verify_file, VerifyReport};
pub use writer::Mp4Writer;

use crate::error::{Error, Result};
use std::fs::File;
use std::io::{BufReader, Read, Seek};
use std::path::Path;

/// Parsed MP4 file.
#[derive(Debug)]
pub struct Mp4File {
    /// Major brand from ftyp.
    pub major_brand: Option<AtomType>,
    /// Duration in movie timescale units.
    pub duration: u64,
    /// Movie timescale (time units per second).
    pub timescale: u32,
    /// First video track.
    pub video_track: Option<TrackInfo>,
    /// First mdat atom.
    pub mdat: Option<Atom>,
    /// Whether moov comes before mdat.
    pub has_faststart: bool,
    /// `©too` annotation from udta, if present.
    pub encoder: Option<String>,
    /// Size of the file in bytes.
    pub file_size: u64,
}

impl Mp4File {
    /// Parse an MP4 file from the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|source| Error::SourceOpen {
            path: path.to_path_buf(),
            source,
        })?;
        let mut reader = BufReader::new(file);
        Self::parse(&mut reader)
    }

    /// Parse an MP4 file from a reader.
    pub fn parse<R: Read + Seek>(reader: &mut R) -> Result<Self> {
        Mp4Reader::new(reader)?.parse()
    }

    /// Duration in seconds.
    pub fn duration_secs(&self) -> f64 {
        if self.timescale == 0 {
            0.0
        } else {
            self.duration as f64 / self.timescale as f64
        }
    }

    /// Video sample table, if available.
    pub fn video_samples(&self) -> Option<&SampleTable> {
        self.video_track.as_ref().map(|t| &t.sample_table)
    }

    /// Decoder configuration of the video track, if it parses.
    pub fn decoder_config(&self) -> Option<Result<AvcDecoderConfig>> {
        let data = self.video_track.as_ref()?.codec_data.as_ref()?;
        Some(AvcDecoderConfig::parse(data))
    }
}
