//! Annex-B start code detection.

/// The 4-byte delimiter separating NAL units.
pub const START_CODE: [u8; 4] = [0x00, 0x00, 0x00, 0x01];

/// Length of [`START_CODE`].
pub const START_CODE_LEN: usize = START_CODE.len();

/// Byte-at-a-time matcher for [`START_CODE`].
///
/// The state is the length of the matched prefix (0..=3). The pattern has no
/// self-overlap apart from its run of zeros, so a mismatch either resets to 0
/// or, for an extra zero after three zeros, keeps the state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StartCodeMatcher {
    matched: usize,
}

impl StartCodeMatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Length of the currently matched prefix.
    pub fn matched(&self) -> usize {
        self.matched
    }

    /// Feed one byte. Returns `true` when this byte completes a start code,
    /// in which case the matcher is already reset for the next one.
    pub fn push(&mut self, byte: u8) -> bool {
        if byte == START_CODE[self.matched] {
            self.matched += 1;
            if self.matched == START_CODE_LEN {
                self.matched = 0;
                return true;
            }
        } else if byte != START_CODE[0] {
            self.matched = 0;
        }
        false
    }

    pub fn reset(&mut self) {
        self.matched = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn completions(bytes: &[u8]) -> Vec<usize> {
        let mut matcher = StartCodeMatcher::new();
        bytes
            .iter()
            .enumerate()
            .filter_map(|(i, b)| matcher.push(*b).then_some(i))
            .collect()
    }

    #[test]
    fn test_detects_plain_start_code() {
        assert_eq!(completions(&[0, 0, 0, 1]), vec![3]);
        assert_eq!(completions(&[0xAA, 0, 0, 0, 1, 0x65]), vec![4]);
    }

    #[test]
    fn test_three_byte_start_code_is_not_a_delimiter() {
        assert!(completions(&[0xAA, 0, 0, 1, 0x65]).is_empty());
    }

    #[test]
    fn test_extra_leading_zeros_still_match() {
        assert_eq!(completions(&[0, 0, 0, 0, 0, 1]), vec![5]);
    }

    #[test]
    fn test_mismatch_resets() {
        let mut matcher = StartCodeMatcher::new();
        assert!(!matcher.push(0));
        assert!(!matcher.push(0));
        assert_eq!(matcher.matched(), 2);
        assert!(!matcher.push(0x42));
        assert_eq!(matcher.matched(), 0);
        assert!(!matcher.push(1));
        assert_eq!(matcher.matched(), 0);
    }

    #[test]
    fn test_back_to_back_delimiters() {
        assert_eq!(completions(&[0, 0, 0, 1, 0, 0, 0, 1]), vec![3, 7]);
    }
}
