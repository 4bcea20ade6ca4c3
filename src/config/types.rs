use avcmux_media::mp4::DEFAULT_ENCODER_NAME;
use avcmux_media::VideoParams;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub video: VideoConfig,

    #[serde(default)]
    pub output: OutputConfig,
}

/// Defaults for the conversion parameters the CLI does not override.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct VideoConfig {
    #[serde(default = "default_width")]
    pub width: u32,

    #[serde(default = "default_height")]
    pub height: u32,

    /// Frames per second; every frame lasts exactly one tick of the media timescale
    #[serde(default = "default_frame_rate")]
    pub frame_rate: u32,
}

fn default_width() -> u32 {
    640
}
fn default_height() -> u32 {
    480
}
fn default_frame_rate() -> u32 {
    30
}

impl Default for VideoConfig {
    fn default() -> Self {
        Self {
            width: default_width(),
            height: default_height(),
            frame_rate: default_frame_rate(),
        }
    }
}

impl VideoConfig {
    pub fn params(&self) -> VideoParams {
        VideoParams::new(self.width, self.height, self.frame_rate)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct OutputConfig {
    /// Text of the encoder annotation in udta
    #[serde(default = "default_encoder_name")]
    pub encoder_name: String,

    /// Keep a partially written destination when conversion fails
    #[serde(default)]
    pub keep_partial: bool,
}

fn default_encoder_name() -> String {
    DEFAULT_ENCODER_NAME.to_string()
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            encoder_name: default_encoder_name(),
            keep_partial: false,
        }
    }
}
