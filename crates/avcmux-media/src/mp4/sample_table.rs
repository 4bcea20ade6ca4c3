//! Sample table resolution for read-back.
//!
//! A written file carries one video track whose tables are:
//! - stts: sample durations
//! - stss: sync samples (keyframes)
//! - stsc: sample-to-chunk mapping
//! - stsz: sample sizes
//! - stco: chunk offsets
//!
//! The raw tables are kept next to the resolved samples so that verification
//! can compare declared counts against what was actually resolved.

use std::collections::HashSet;

/// A resolved sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SampleEntry {
    /// Sample index (0-based).
    pub index: u32,
    /// File offset of the sample (its length prefix, for AVCC samples).
    pub offset: u64,
    /// Sample size in bytes.
    pub size: u32,
    /// Decode timestamp in media timescale.
    pub dts: u64,
    /// Whether this sample is a sync sample.
    pub is_keyframe: bool,
}

/// Resolved sample table of one track.
#[derive(Debug, Clone, Default)]
pub struct SampleTable {
    /// Number of samples declared by stsz.
    pub sample_count: u32,
    /// All resolved samples.
    pub samples: Vec<SampleEntry>,
    /// Sum of stts sample counts.
    pub stts_sample_count: u64,
    /// Sum of stts `count * delta`.
    pub stts_duration: u64,
    /// Number of stco entries.
    pub chunk_count: u32,
    /// Raw stss entries; `None` when the track has no stss box.
    pub sync_samples: Option<Vec<u32>>,
}

impl SampleTable {
    pub fn builder() -> SampleTableBuilder {
        SampleTableBuilder::new()
    }

    pub fn get(&self, index: u32) -> Option<&SampleEntry> {
        self.samples.get(index as usize)
    }

    pub fn iter(&self) -> impl Iterator<Item = &SampleEntry> {
        self.samples.iter()
    }

    /// 0-based indices of sync samples.
    pub fn keyframe_indices(&self) -> Vec<u32> {
        self.samples
            .iter()
            .filter(|s| s.is_keyframe)
            .map(|s| s.index)
            .collect()
    }

    /// Sum of all sample sizes.
    pub fn total_size(&self) -> u64 {
        self.samples.iter().map(|s| s.size as u64).sum()
    }
}

/// Builder for a sample table from raw atom data.
#[derive(Debug, Default)]
pub struct SampleTableBuilder {
    stts_entries: Vec<(u32, u32)>, // (count, delta)
    sync_samples: Option<Vec<u32>>,
    stsc_entries: Vec<(u32, u32, u32)>, // (first_chunk, samples_per_chunk, sample_description_index)
    uniform_size: u32,
    sample_sizes: Vec<u32>,
    sample_count: u32,
    chunk_offsets: Vec<u64>,
}

impl SampleTableBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_stts(&mut self, entries: Vec<(u32, u32)>) {
        self.stts_entries = entries;
    }

    /// Present-but-empty means no sample is a sync sample.
    pub fn set_sync_samples(&mut self, samples: Vec<u32>) {
        self.sync_samples = Some(samples);
    }

    pub fn set_stsc(&mut self, entries: Vec<(u32, u32, u32)>) {
        self.stsc_entries = entries;
    }

    /// `sizes` is empty when `uniform_size` is non-zero.
    pub fn set_stsz(&mut self, uniform_size: u32, sample_count: u32, sizes: Vec<u32>) {
        self.uniform_size = uniform_size;
        self.sample_count = sample_count;
        self.sample_sizes = sizes;
    }

    pub fn set_chunk_offsets(&mut self, offsets: Vec<u64>) {
        self.chunk_offsets = offsets;
    }

    /// Resolve every sample's offset, size, timestamp and sync flag.
    pub fn build(self) -> SampleTable {
        let sample_count = self.sample_count;
        let stts_sample_count = self.stts_entries.iter().map(|&(c, _)| c as u64).sum();
        let stts_duration = self
            .stts_entries
            .iter()
            .map(|&(c, d)| c as u64 * d as u64)
            .sum();

        let chunks = self.resolve_sample_chunks();
        let offsets = self.resolve_offsets(&chunks);
        let dts_values = self.resolve_timestamps();

        // No stss means all samples are sync samples
        let sync_set: Option<HashSet<u32>> = self
            .sync_samples
            .as_ref()
            .map(|s| s.iter().copied().collect());

        let samples = (0..sample_count)
            .map(|i| SampleEntry {
                index: i,
                offset: offsets.get(i as usize).copied().unwrap_or(0),
                size: self.size_of(i as usize),
                dts: dts_values.get(i as usize).copied().unwrap_or(0),
                is_keyframe: sync_set.as_ref().map_or(true, |set| set.contains(&(i + 1))),
            })
            .collect();

        SampleTable {
            sample_count,
            samples,
            stts_sample_count,
            stts_duration,
            chunk_count: self.chunk_offsets.len() as u32,
            sync_samples: self.sync_samples,
        }
    }

    fn size_of(&self, index: usize) -> u32 {
        if self.uniform_size > 0 {
            self.uniform_size
        } else {
            self.sample_sizes.get(index).copied().unwrap_or(0)
        }
    }

    /// 0-based chunk index of every sample.
    fn resolve_sample_chunks(&self) -> Vec<u32> {
        let sample_count = self.sample_count as usize;
        let num_chunks = self.chunk_offsets.len() as u32;
        let mut result = Vec::with_capacity(sample_count);

        for (i, &(first_chunk, samples_per_chunk, _)) in self.stsc_entries.iter().enumerate() {
            let next_first = self
                .stsc_entries
                .get(i + 1)
                .map_or(num_chunks + 1, |e| e.0);

            for chunk in first_chunk.max(1)..next_first.min(num_chunks + 1) {
                for _ in 0..samples_per_chunk {
                    if result.len() >= sample_count {
                        return result;
                    }
                    result.push(chunk - 1);
                }
            }
        }

        // Samples not covered by stsc stay in the last chunk
        let last = result.last().copied().unwrap_or(0);
        result.resize(sample_count, last);
        result
    }

    fn resolve_offsets(&self, sample_chunks: &[u32]) -> Vec<u64> {
        let mut within_chunk = vec![0u64; self.chunk_offsets.len()];
        sample_chunks
            .iter()
            .enumerate()
            .map(|(i, &chunk)| {
                let chunk = chunk as usize;
                let base = self.chunk_offsets.get(chunk).copied().unwrap_or(0);
                let offset = match within_chunk.get_mut(chunk) {
                    Some(acc) => {
                        let offset = base + *acc;
                        *acc += self.size_of(i) as u64;
                        offset
                    }
                    None => base,
                };
                offset
            })
            .collect()
    }

    fn resolve_timestamps(&self) -> Vec<u64> {
        let sample_count = self.sample_count as usize;
        let mut dts_values = Vec::with_capacity(sample_count);
        let mut current = 0u64;
        let mut last_delta = 1u32;

        'entries: for &(count, delta) in &self.stts_entries {
            last_delta = delta;
            for _ in 0..count {
                if dts_values.len() >= sample_count {
                    break 'entries;
                }
                dts_values.push(current);
                current += delta as u64;
            }
        }

        while dts_values.len() < sample_count {
            dts_values.push(current);
            current += last_delta as u64;
        }
        dts_values
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_one_sample_per_chunk() {
        let mut builder = SampleTableBuilder::new();
        builder.set_stts(vec![(3, 1)]);
        builder.set_sync_samples(vec![1]);
        builder.set_stsc(vec![(1, 1, 1)]);
        builder.set_stsz(0, 3, vec![104, 24, 54]);
        builder.set_chunk_offsets(vec![500, 604, 628]);

        let table = builder.build();
        assert_eq!(table.sample_count, 3);
        assert_eq!(table.chunk_count, 3);
        assert_eq!(table.stts_sample_count, 3);
        assert_eq!(table.stts_duration, 3);

        let offsets: Vec<u64> = table.iter().map(|s| s.offset).collect();
        assert_eq!(offsets, vec![500, 604, 628]);
        let dts: Vec<u64> = table.iter().map(|s| s.dts).collect();
        assert_eq!(dts, vec![0, 1, 2]);
        assert_eq!(table.keyframe_indices(), vec![0]);
        assert_eq!(table.total_size(), 182);
    }

    #[test]
    fn test_several_samples_per_chunk() {
        let mut builder = SampleTableBuilder::new();
        builder.set_stts(vec![(3, 1000)]);
        builder.set_stsc(vec![(1, 3, 1)]);
        builder.set_stsz(0, 3, vec![100, 200, 150]);
        builder.set_chunk_offsets(vec![1000]);

        let table = builder.build();
        assert_eq!(table.get(1).unwrap().offset, 1100);
        assert_eq!(table.get(2).unwrap().offset, 1300);
        assert_eq!(table.get(2).unwrap().dts, 2000);
        // no stss: every sample is sync
        assert_eq!(table.keyframe_indices(), vec![0, 1, 2]);
        assert!(table.sync_samples.is_none());
    }

    #[test]
    fn test_empty_stss_means_no_keyframes() {
        let mut builder = SampleTableBuilder::new();
        builder.set_stts(vec![(2, 1)]);
        builder.set_sync_samples(vec![]);
        builder.set_stsc(vec![(1, 1, 1)]);
        builder.set_stsz(0, 2, vec![10, 10]);
        builder.set_chunk_offsets(vec![100, 110]);

        let table = builder.build();
        assert!(table.keyframe_indices().is_empty());
        assert_eq!(table.sync_samples, Some(vec![]));
    }

    #[test]
    fn test_uniform_size() {
        let mut builder = SampleTableBuilder::new();
        builder.set_stts(vec![(4, 1)]);
        builder.set_stsc(vec![(1, 2, 1)]);
        builder.set_stsz(100, 4, vec![]);
        builder.set_chunk_offsets(vec![0, 1000]);

        let table = builder.build();
        let offsets: Vec<u64> = table.iter().map(|s| s.offset).collect();
        assert_eq!(offsets, vec![0, 100, 1000, 1100]);
    }

    #[test]
    fn test_empty_table() {
        let table = SampleTableBuilder::new().build();
        assert_eq!(table.sample_count, 0);
        assert!(table.samples.is_empty());
    }
}
