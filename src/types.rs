//! Shared types and enums used across seathru.
//! Includes the color `Channel` index, output encodings (`OutputFormat`,
//! `BitDepth`) and how an incoming depth map is interpreted (`DepthEncoding`).
use clap::ValueEnum;
use serde::{Deserialize, Serialize};

/// One of the three color channels of an RGB image.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Serialize, Deserialize)]
pub enum Channel {
    Red,
    Green,
    Blue,
}

impl Channel {
    pub const ALL: [Channel; 3] = [Channel::Red, Channel::Green, Channel::Blue];

    /// Index of the channel along the last axis of an `(rows, cols, 3)` array.
    pub fn index(self) -> usize {
        match self {
            Channel::Red => 0,
            Channel::Green => 1,
            Channel::Blue => 2,
        }
    }
}

impl std::fmt::Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Channel::Red => write!(f, "R"),
            Channel::Green => write!(f, "G"),
            Channel::Blue => write!(f, "B"),
        }
    }
}

#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, ValueEnum, Debug, Serialize, Deserialize)]
pub enum OutputFormat {
    PNG,
    TIFF,
    JPEG, // Lossy, 8-bit only
}

impl OutputFormat {
    pub fn extension(self) -> &'static str {
        match self {
            OutputFormat::PNG => "png",
            OutputFormat::TIFF => "tiff",
            OutputFormat::JPEG => "jpg",
        }
    }
}

#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, ValueEnum, Debug, Serialize, Deserialize)]
pub enum BitDepth {
    U8,
    U16,
}

/// How the values of an input depth map relate to scene distance.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, ValueEnum, Debug, Serialize, Deserialize)]
pub enum DepthEncoding {
    /// Relative inverse depth from a monocular network (large = near). Normalized
    /// and rescaled with the depth offset/scale before use.
    Disparity,
    /// Already in scene units; used as-is.
    Metric,
}

impl std::fmt::Display for DepthEncoding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DepthEncoding::Disparity => write!(f, "Disparity"),
            DepthEncoding::Metric => write!(f, "Metric"),
        }
    }
}
