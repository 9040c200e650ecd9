//! External analysis workers.
//!
//! The numerical work (pose detection, kinematics, map rendering) lives in
//! scripts run by an interpreter. This module only knows how to launch them,
//! feed them input, collect their output and bound how many run at once.

mod runner;

pub use runner::{Invocation, JobHandle, JobRunner, WorkerOutcome};

use std::fmt;

/// The analysis scripts the service knows how to launch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AnalysisScript {
    /// `video_path` -> pose data + pose output video.
    PoseEstimation,
    /// `pose_data_path` -> joint-angle series.
    JointAngles,
    /// `pose_data_path hand` -> wrist velocity chart.
    Velocity,
    /// `map_kind pose_data_path video_path players_json`, court bounds on stdin.
    Maps,
    /// `video_path` -> dominant player colours on stdout.
    PlayerColours,
    /// `temp_video_path` -> first frame as jpeg.
    FirstFrame,
}

impl AnalysisScript {
    /// Script path relative to the configured script directory.
    pub fn relative_path(self) -> &'static str {
        match self {
            AnalysisScript::PoseEstimation => "dev/poseEstimation.py",
            AnalysisScript::JointAngles => "dev/jointangles.py",
            AnalysisScript::Velocity => "dev/velocity.py",
            AnalysisScript::Maps => "dev/2dMaps.py",
            AnalysisScript::PlayerColours => "kmeans/kmeansplayerselection.py",
            AnalysisScript::FirstFrame => "firstFrame.py",
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            AnalysisScript::PoseEstimation => "pose-estimation",
            AnalysisScript::JointAngles => "joint-angles",
            AnalysisScript::Velocity => "velocity",
            AnalysisScript::Maps => "maps",
            AnalysisScript::PlayerColours => "player-colours",
            AnalysisScript::FirstFrame => "first-frame",
        }
    }
}

impl fmt::Display for AnalysisScript {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
