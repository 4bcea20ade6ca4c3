//! AVC decoder configuration record (`avcC` payload).

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{Error, Result};

/// `configurationVersion` is always 1.
const CONFIGURATION_VERSION: u8 = 1;

/// Reserved bits plus `lengthSizeMinusOne = 3` (4-byte NAL lengths in `mdat`).
const LENGTH_SIZE_BYTE: u8 = 0xFC | 3;

/// Reserved bits plus `numOfSequenceParameterSets = 1`.
const SPS_COUNT_BYTE: u8 = 0xE0 | 1;

/// Decoder configuration carrying exactly one SPS and one PPS.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AvcDecoderConfig {
    pub profile_indication: u8,
    pub profile_compatibility: u8,
    pub level_indication: u8,
    pub sps: Bytes,
    pub pps: Bytes,
}

impl AvcDecoderConfig {
    /// Build from the raw SPS and PPS NAL payloads (header byte included).
    ///
    /// Profile, compatibility and level are SPS bytes 1..=3.
    pub fn from_parameter_sets(sps: &[u8], pps: &[u8]) -> Result<Self> {
        let (profile, compat, level) = match sps.get(1..4) {
            Some(&[p, c, l]) => (p, c, l),
            _ => {
                return Err(Error::InvalidParameterSet(format!(
                    "SPS is {} bytes, need at least 4",
                    sps.len()
                )))
            }
        };
        for (name, set) in [("SPS", sps), ("PPS", pps)] {
            if set.len() > u16::MAX as usize {
                return Err(Error::too_large(format!("{} of {} bytes", name, set.len())));
            }
        }

        Ok(Self {
            profile_indication: profile,
            profile_compatibility: compat,
            level_indication: level,
            sps: Bytes::copy_from_slice(sps),
            pps: Bytes::copy_from_slice(pps),
        })
    }

    /// Serialized length of the record.
    pub fn encoded_len(&self) -> usize {
        6 + 2 + self.sps.len() + 1 + 2 + self.pps.len()
    }

    /// Serialize the record (box payload, without the `avcC` header).
    pub fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.encoded_len());
        buf.put_u8(CONFIGURATION_VERSION);
        buf.put_u8(self.profile_indication);
        buf.put_u8(self.profile_compatibility);
        buf.put_u8(self.level_indication);
        buf.put_u8(LENGTH_SIZE_BYTE);
        buf.put_u8(SPS_COUNT_BYTE);
        buf.put_u16(self.sps.len() as u16);
        buf.put_slice(&self.sps);
        buf.put_u8(1); // numOfPictureParameterSets
        buf.put_u16(self.pps.len() as u16);
        buf.put_slice(&self.pps);
        buf.freeze()
    }

    /// Parse a record with one SPS and one PPS, as produced by [`Self::to_bytes`].
    pub fn parse(data: &[u8]) -> Result<Self> {
        let short = || Error::invalid_mp4(format!("avcC record truncated ({} bytes)", data.len()));

        if data.len() < 8 {
            return Err(short());
        }
        if data[0] != CONFIGURATION_VERSION {
            return Err(Error::invalid_mp4(format!(
                "unsupported avcC version {}",
                data[0]
            )));
        }
        if data[4] & 0x03 != 3 {
            return Err(Error::invalid_mp4("avcC NAL length size is not 4 bytes"));
        }
        if data[5] & 0x1F != 1 {
            return Err(Error::invalid_mp4(format!(
                "expected 1 SPS in avcC, found {}",
                data[5] & 0x1F
            )));
        }

        let sps_len = u16::from_be_bytes([data[6], data[7]]) as usize;
        let sps_end = 8 + sps_len;
        let sps = data.get(8..sps_end).ok_or_else(short)?;

        let pps_count = *data.get(sps_end).ok_or_else(short)?;
        if pps_count != 1 {
            return Err(Error::invalid_mp4(format!(
                "expected 1 PPS in avcC, found {}",
                pps_count
            )));
        }
        let len_bytes = data.get(sps_end + 1..sps_end + 3).ok_or_else(short)?;
        let pps_len = u16::from_be_bytes([len_bytes[0], len_bytes[1]]) as usize;
        let pps = data
            .get(sps_end + 3..sps_end + 3 + pps_len)
            .ok_or_else(short)?;

        Ok(Self {
            profile_indication: data[1],
            profile_compatibility: data[2],
            level_indication: data[3],
            sps: Bytes::copy_from_slice(sps),
            pps: Bytes::copy_from_slice(pps),
        })
    }

    /// RFC 6381 codec string, e.g. `avc1.64001F`.
    pub fn codec_string(&self) -> String {
        format!(
            "avc1.{:02X}{:02X}{:02X}",
            self.profile_indication, self.profile_compatibility, self.level_indication
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SPS: &[u8] = &[0x67, 0x64, 0x00, 0x1F, 0xAC, 0xD9];
    const PPS: &[u8] = &[0x68, 0xEB, 0xE3, 0xCB];

    #[test]
    fn test_avcc_layout() {
        let config = AvcDecoderConfig::from_parameter_sets(SPS, PPS).unwrap();
        let bytes = config.to_bytes();
        assert_eq!(bytes.len(), config.encoded_len());
        assert_eq!(bytes.len(), 11 + SPS.len() + PPS.len());
        assert_eq!(
            &bytes[..8],
            &[0x01, 0x64, 0x00, 0x1F, 0xFF, 0xE1, 0x00, SPS.len() as u8]
        );
        assert_eq!(&bytes[8..14], SPS);
        assert_eq!(&bytes[14..17], &[0x01, 0x00, PPS.len() as u8]);
        assert_eq!(&bytes[17..], PPS);
    }

    #[test]
    fn test_parse_inverts_to_bytes() {
        let config = AvcDecoderConfig::from_parameter_sets(SPS, PPS).unwrap();
        let parsed = AvcDecoderConfig::parse(&config.to_bytes()).unwrap();
        assert_eq!(parsed, config);
        assert_eq!(parsed.codec_string(), "avc1.64001F");
    }

    #[test]
    fn test_short_sps_is_rejected() {
        let err = AvcDecoderConfig::from_parameter_sets(&[0x67, 0x42], PPS).unwrap_err();
        assert!(matches!(err, Error::InvalidParameterSet(_)));
    }

    #[test]
    fn test_parse_truncated_record() {
        let config = AvcDecoderConfig::from_parameter_sets(SPS, PPS).unwrap();
        let bytes = config.to_bytes();
        let err = AvcDecoderConfig::parse(&bytes[..bytes.len() - 1]).unwrap_err();
        assert!(matches!(err, Error::InvalidMp4(_)));
    }
}
