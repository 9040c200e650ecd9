//! Table-driven artifact lookup.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use tracing::trace;

use super::{Artifact, ArtifactCategory, ArtifactFormat, MapKind};
use crate::utils::fs;

const VIDEO_EXTENSIONS: &[&str] = &["mp4", "mov", "avi"];
const DATA_EXTENSIONS: &[&str] = &["json", "msgpack"];

/// One storage directory (relative to the storage root) and the extensions
/// probed inside it, in priority order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub dir: PathBuf,
    pub extensions: Vec<&'static str>,
}

impl Candidate {
    pub fn new(dir: impl Into<PathBuf>, extensions: &[&'static str]) -> Self {
        Self {
            dir: dir.into(),
            extensions: extensions.to_vec(),
        }
    }
}

fn default_candidates(category: ArtifactCategory) -> Vec<Candidate> {
    match category {
        ArtifactCategory::Video => vec![Candidate::new("videos", VIDEO_EXTENSIONS)],
        ArtifactCategory::PoseOutputVideo => {
            vec![Candidate::new("poseOutputVideo", VIDEO_EXTENSIONS)]
        }
        ArtifactCategory::PoseData => vec![Candidate::new("poseEstimationData", DATA_EXTENSIONS)],
        ArtifactCategory::AnglesData => {
            vec![Candidate::new("jointAngleCalculation", DATA_EXTENSIONS)]
        }
        ArtifactCategory::VelocityData => vec![Candidate::new("wristDataChart", &["png"])],
        ArtifactCategory::Map(MapKind::Display) => vec![Candidate::new("2dMap", &["png"])],
        ArtifactCategory::Map(MapKind::Animated) => vec![Candidate::new("2dMapVideo", &["mp4"])],
        ArtifactCategory::Map(MapKind::Heatmap) => vec![Candidate::new("heatmap", &["png"])],
        ArtifactCategory::FirstFrame => vec![Candidate::new("firstFrameExtracts", &["jpg"])],
        ArtifactCategory::TempVideo => vec![Candidate::new("tempstorage", VIDEO_EXTENSIONS)],
    }
}

fn all_categories() -> Vec<ArtifactCategory> {
    let mut categories = vec![
        ArtifactCategory::Video,
        ArtifactCategory::PoseOutputVideo,
        ArtifactCategory::PoseData,
        ArtifactCategory::AnglesData,
        ArtifactCategory::VelocityData,
        ArtifactCategory::FirstFrame,
        ArtifactCategory::TempVideo,
    ];
    categories.extend(MapKind::ALL.map(ArtifactCategory::Map));
    categories
}

/// Resolves `(match id, category)` to the first existing file among the
/// category's candidates.
///
/// Lookups only probe the filesystem; a missing file is `None`, never an
/// error. Candidate order is fixed at construction, so repeated lookups for
/// the same state of the disk always agree.
#[derive(Debug, Clone)]
pub struct ArtifactLocator {
    root: PathBuf,
    table: HashMap<ArtifactCategory, Vec<Candidate>>,
}

impl ArtifactLocator {
    /// Create a locator over `root` with the standard directory layout.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let table = all_categories()
            .into_iter()
            .map(|category| (category, default_candidates(category)))
            .collect();
        Self {
            root: root.into(),
            table,
        }
    }

    /// Replace the candidate list for one category.
    pub fn with_candidates(mut self, category: ArtifactCategory, candidates: Vec<Candidate>) -> Self {
        self.table.insert(category, candidates);
        self
    }

    /// Storage root all candidate directories are relative to.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Every path probed for `stem` in `category`, in lookup order.
    pub fn candidate_paths(&self, stem: &str, category: ArtifactCategory) -> Vec<PathBuf> {
        self.table
            .get(&category)
            .into_iter()
            .flatten()
            .flat_map(|candidate| {
                candidate
                    .extensions
                    .iter()
                    .map(move |ext| self.root.join(&candidate.dir).join(format!("{stem}.{ext}")))
            })
            .collect()
    }

    /// Directory a worker writes `category` artifacts into.
    pub fn output_dir(&self, category: ArtifactCategory) -> Option<PathBuf> {
        self.table
            .get(&category)
            .and_then(|candidates| candidates.first())
            .map(|candidate| self.root.join(&candidate.dir))
    }

    /// Find the artifact for `stem` (usually a match id) in `category`.
    pub async fn locate(&self, stem: &str, category: ArtifactCategory) -> Option<Artifact> {
        for path in self.candidate_paths(stem, category) {
            if !fs::is_file(&path).await {
                continue;
            }
            let Some(format) = path
                .extension()
                .and_then(|ext| ext.to_str())
                .and_then(ArtifactFormat::from_extension)
            else {
                continue;
            };
            trace!(path = %path.display(), %category, "Artifact located");
            return Some(Artifact {
                path,
                category,
                format,
            });
        }
        None
    }

    /// Find an exact `file_name` (stem and extension) in `category`.
    ///
    /// Only candidates that list the file's extension are probed, so two
    /// uploads sharing a stem never stand in for each other.
    pub async fn locate_file(&self, file_name: &str, category: ArtifactCategory) -> Option<Artifact> {
        let ext = Path::new(file_name).extension()?.to_str()?.to_ascii_lowercase();
        let format = ArtifactFormat::from_extension(&ext)?;
        for candidate in self.table.get(&category)? {
            if !candidate.extensions.contains(&ext.as_str()) {
                continue;
            }
            let path = self.root.join(&candidate.dir).join(file_name);
            if fs::is_file(&path).await {
                trace!(path = %path.display(), %category, "Artifact located");
                return Some(Artifact {
                    path,
                    category,
                    format,
                });
            }
        }
        None
    }

    /// Shorthand for `locate(..).is_some()`.
    pub async fn exists(&self, stem: &str, category: ArtifactCategory) -> bool {
        self.locate(stem, category).await.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use tempfile::TempDir;

    fn touch(root: &Path, rel: &str) -> PathBuf {
        let path = root.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, b"data").unwrap();
        path
    }

    #[rstest]
    #[case(ArtifactCategory::Video, "videos/m1.mp4")]
    #[case(ArtifactCategory::Video, "videos/m1.avi")]
    #[case(ArtifactCategory::PoseOutputVideo, "poseOutputVideo/m1.mov")]
    #[case(ArtifactCategory::PoseData, "poseEstimationData/m1.msgpack")]
    #[case(ArtifactCategory::AnglesData, "jointAngleCalculation/m1.json")]
    #[case(ArtifactCategory::VelocityData, "wristDataChart/m1.png")]
    #[case(ArtifactCategory::Map(MapKind::Display), "2dMap/m1.png")]
    #[case(ArtifactCategory::Map(MapKind::Animated), "2dMapVideo/m1.mp4")]
    #[case(ArtifactCategory::Map(MapKind::Heatmap), "heatmap/m1.png")]
    #[tokio::test]
    async fn test_locates_each_category(#[case] category: ArtifactCategory, #[case] rel: &str) {
        let temp = TempDir::new().unwrap();
        let expected = touch(temp.path(), rel);
        let locator = ArtifactLocator::new(temp.path());

        let artifact = locator.locate("m1", category).await.unwrap();
        assert_eq!(artifact.path, expected);
        assert_eq!(artifact.category, category);
    }

    #[tokio::test]
    async fn test_missing_artifact_is_none() {
        let temp = TempDir::new().unwrap();
        let locator = ArtifactLocator::new(temp.path());
        assert!(locator.locate("m1", ArtifactCategory::Video).await.is_none());
        assert!(!locator.exists("m1", ArtifactCategory::PoseData).await);
    }

    #[tokio::test]
    async fn test_first_candidate_wins() {
        let temp = TempDir::new().unwrap();
        touch(temp.path(), "videos/m1.avi");
        let mp4 = touch(temp.path(), "videos/m1.mp4");
        let locator = ArtifactLocator::new(temp.path());

        for _ in 0..3 {
            let artifact = locator.locate("m1", ArtifactCategory::Video).await.unwrap();
            assert_eq!(artifact.path, mp4);
            assert_eq!(artifact.format, ArtifactFormat::Mp4);
        }
    }

    #[tokio::test]
    async fn test_directory_named_like_artifact_is_ignored() {
        let temp = TempDir::new().unwrap();
        std::fs::create_dir_all(temp.path().join("videos/m1.mp4")).unwrap();
        let locator = ArtifactLocator::new(temp.path());
        assert!(locator.locate("m1", ArtifactCategory::Video).await.is_none());
    }

    #[tokio::test]
    async fn test_velocity_chart_is_flat_per_match() {
        let temp = TempDir::new().unwrap();
        touch(temp.path(), "wristDataChart/left/m1.png");
        let locator = ArtifactLocator::new(temp.path());
        assert!(!locator.exists("m1", ArtifactCategory::VelocityData).await);

        let expected = touch(temp.path(), "wristDataChart/m1.png");
        let artifact = locator.locate("m1", ArtifactCategory::VelocityData).await.unwrap();
        assert_eq!(artifact.path, expected);
        assert_eq!(
            locator.output_dir(ArtifactCategory::VelocityData),
            Some(temp.path().join("wristDataChart"))
        );
    }

    #[tokio::test]
    async fn test_locate_file_is_exact() {
        let temp = TempDir::new().unwrap();
        touch(temp.path(), "tempstorage/clip.mp4");
        let mov = touch(temp.path(), "tempstorage/clip.mov");
        let locator = ArtifactLocator::new(temp.path());

        let artifact = locator
            .locate_file("clip.mov", ArtifactCategory::TempVideo)
            .await
            .unwrap();
        assert_eq!(artifact.path, mov);
        assert_eq!(artifact.format, ArtifactFormat::Mov);

        assert!(locator.locate_file("clip.avi", ArtifactCategory::TempVideo).await.is_none());
        assert!(locator.locate_file("clip", ArtifactCategory::TempVideo).await.is_none());
        touch(temp.path(), "tempstorage/clip.png");
        assert!(locator.locate_file("clip.png", ArtifactCategory::TempVideo).await.is_none());
    }

    #[test]
    fn test_candidate_order() {
        let locator = ArtifactLocator::new("/data");
        let paths = locator.candidate_paths("m1", ArtifactCategory::PoseData);
        assert_eq!(
            paths,
            vec![
                PathBuf::from("/data/poseEstimationData/m1.json"),
                PathBuf::from("/data/poseEstimationData/m1.msgpack"),
            ]
        );
    }

    #[tokio::test]
    async fn test_custom_candidates() {
        let temp = TempDir::new().unwrap();
        let expected = touch(temp.path(), "archive/m1.mov");
        let locator = ArtifactLocator::new(temp.path()).with_candidates(
            ArtifactCategory::Video,
            vec![
                Candidate::new("videos", &["mp4"]),
                Candidate::new("archive", &["mov"]),
            ],
        );

        let artifact = locator.locate("m1", ArtifactCategory::Video).await.unwrap();
        assert_eq!(artifact.path, expected);
        assert_eq!(
            locator.output_dir(ArtifactCategory::Video),
            Some(temp.path().join("videos"))
        );
    }
}
