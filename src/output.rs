//! Destination handling for the convert command.

use std::io::BufWriter;
use std::path::Path;

use avcmux_media::annexb::ScanResult;
use avcmux_media::{create_destination, open_source, ConversionSession, ConversionSummary};

/// Removes a created destination on drop unless committed or kept.
#[derive(Debug)]
pub struct PartialOutput<'a> {
    path: &'a Path,
    keep: bool,
    committed: bool,
}

impl<'a> PartialOutput<'a> {
    /// Guard `path`, which the caller has just created.
    pub fn new(path: &'a Path, keep: bool) -> Self {
        Self {
            path,
            keep,
            committed: false,
        }
    }

    /// The output is complete; leave it in place.
    pub fn commit(mut self) {
        self.committed = true;
    }
}

impl Drop for PartialOutput<'_> {
    fn drop(&mut self) {
        if self.committed {
            return;
        }
        if self.keep {
            tracing::info!("Keeping partial output {:?}", self.path);
            return;
        }
        tracing::debug!("Removing partial output {:?}", self.path);
        if let Err(e) = std::fs::remove_file(self.path) {
            tracing::warn!("Failed to remove partial output {:?}: {}", self.path, e);
        }
    }
}

/// Write the container for `scan` to `output`.
///
/// A destination that existed before the call is only touched once the source
/// has been reopened and the destination created; if writing fails after that
/// point the partial file is removed unless `keep_partial` is set.
pub fn write_output(
    session: &ConversionSession,
    scan: &ScanResult,
    input: &Path,
    output: &Path,
    keep_partial: bool,
) -> avcmux_media::Result<ConversionSummary> {
    let mut source = open_source(input)?;
    let destination = create_destination(output)?;
    let guard = PartialOutput::new(output, keep_partial);

    let summary = session.write(scan, &mut source, BufWriter::new(destination))?;
    guard.commit();
    Ok(summary)
}
