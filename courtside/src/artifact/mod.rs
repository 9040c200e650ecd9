//! Artifact categories, formats and the filesystem locator.
//!
//! An artifact is the file an analysis stage leaves behind for one match.
//! Its presence on disk doubles as the "this stage has run" marker, so the
//! locator is consulted both before launching work and when serving results.

mod locator;

pub use locator::{ArtifactLocator, Candidate};

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::Error;

/// Which wrist a velocity analysis tracks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Hand {
    Left,
    Right,
}

impl Hand {
    pub fn as_str(self) -> &'static str {
        match self {
            Hand::Left => "left",
            Hand::Right => "right",
        }
    }
}

impl fmt::Display for Hand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Hand {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "left" => Ok(Hand::Left),
            "right" => Ok(Hand::Right),
            other => Err(Error::validation(format!(
                "Invalid hand '{other}', expected 'left' or 'right'"
            ))),
        }
    }
}

/// The 2-D court visualisations produced by the map worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MapKind {
    #[serde(rename = "display2dMap")]
    Display,
    #[serde(rename = "animated2dMap")]
    Animated,
    #[serde(rename = "visualizeHeatmap")]
    Heatmap,
}

impl MapKind {
    /// Name used in routes and passed to the worker as its mode argument.
    pub fn as_str(self) -> &'static str {
        match self {
            MapKind::Display => "display2dMap",
            MapKind::Animated => "animated2dMap",
            MapKind::Heatmap => "visualizeHeatmap",
        }
    }

    pub const ALL: [MapKind; 3] = [MapKind::Display, MapKind::Animated, MapKind::Heatmap];
}

impl fmt::Display for MapKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Logical artifact category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArtifactCategory {
    /// Uploaded source video.
    Video,
    /// Video rendered by the pose worker with keypoints drawn on.
    PoseOutputVideo,
    /// Per-frame keypoint series.
    PoseData,
    /// Joint-angle series derived from pose data.
    AnglesData,
    /// Wrist-velocity chart. The worker writes one chart per match whichever
    /// hand was requested.
    VelocityData,
    /// One of the court map renderings.
    Map(MapKind),
    /// Still image extracted from a temp-storage upload.
    FirstFrame,
    /// Upload waiting in temp storage, keyed by file stem.
    TempVideo,
}

impl ArtifactCategory {
    /// Stable name for logs and job listings.
    pub fn slug(self) -> String {
        match self {
            ArtifactCategory::Video => "video".to_string(),
            ArtifactCategory::PoseOutputVideo => "pose-output-video".to_string(),
            ArtifactCategory::PoseData => "pose-data".to_string(),
            ArtifactCategory::AnglesData => "angles-data".to_string(),
            ArtifactCategory::VelocityData => "velocity-data".to_string(),
            ArtifactCategory::Map(kind) => format!("map-data-{kind}"),
            ArtifactCategory::FirstFrame => "first-frame".to_string(),
            ArtifactCategory::TempVideo => "temp-video".to_string(),
        }
    }
}

impl fmt::Display for ArtifactCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.slug())
    }
}

/// On-disk encoding of an artifact, derived from its extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactFormat {
    Mp4,
    Mov,
    Avi,
    Json,
    MessagePack,
    Csv,
    Png,
    Jpg,
}

impl ArtifactFormat {
    pub fn from_extension(ext: &str) -> Option<Self> {
        Some(match ext.to_ascii_lowercase().as_str() {
            "mp4" => Self::Mp4,
            "mov" => Self::Mov,
            "avi" => Self::Avi,
            "json" => Self::Json,
            "msgpack" => Self::MessagePack,
            "csv" => Self::Csv,
            "png" => Self::Png,
            "jpg" | "jpeg" => Self::Jpg,
            _ => return None,
        })
    }

    pub fn extension(self) -> &'static str {
        match self {
            Self::Mp4 => "mp4",
            Self::Mov => "mov",
            Self::Avi => "avi",
            Self::Json => "json",
            Self::MessagePack => "msgpack",
            Self::Csv => "csv",
            Self::Png => "png",
            Self::Jpg => "jpg",
        }
    }

    pub fn content_type(self) -> &'static str {
        match self {
            Self::Mp4 => "video/mp4",
            Self::Mov => "video/quicktime",
            Self::Avi => "video/x-msvideo",
            Self::Json => "application/json",
            Self::MessagePack => "application/msgpack",
            Self::Csv => "text/csv",
            Self::Png => "image/png",
            Self::Jpg => "image/jpeg",
        }
    }
}

/// A located artifact file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub path: PathBuf,
    pub category: ArtifactCategory,
    pub format: ArtifactFormat,
}
