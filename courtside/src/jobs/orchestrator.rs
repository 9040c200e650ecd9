//! Per-analysis orchestration: claim, idempotency check, input resolution,
//! worker launch and completion bookkeeping.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use super::registry::{AlreadyRunning, JobClaim, JobKind, JobRegistry};
use crate::artifact::{ArtifactCategory, ArtifactLocator, MapKind};
use crate::matches::MatchRepository;
use crate::utils::filename::file_stem;
use crate::worker::{AnalysisScript, Invocation, JobRunner, WorkerOutcome};

/// A required input artifact that is not on disk yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MissingInput {
    Video,
    PoseData,
    MatchContext,
}

impl MissingInput {
    pub fn message(self) -> &'static str {
        match self {
            MissingInput::Video => "Video file not found",
            MissingInput::PoseData => "Data file not found",
            MissingInput::MatchContext => "Failed to get match.",
        }
    }
}

/// Result of asking for an analysis.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnalysisOutcome {
    /// The worker ran; its outcome decides the response.
    Ran(WorkerOutcome),
    /// The result artifact already exists; nothing was started.
    AlreadyStored { path: PathBuf },
    /// Another request is running this analysis right now.
    AlreadyRunning,
    /// A prerequisite artifact is missing; nothing was started.
    MissingInput(MissingInput),
}

/// Result of a first-frame extraction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FirstFrameOutcome {
    /// Worker succeeded and the image is at `path`.
    Extracted { path: PathBuf },
    /// The worker did not succeed (or succeeded without writing the image).
    Failed(WorkerOutcome),
    /// The upload is not in temp storage.
    MissingVideo,
    AlreadyRunning,
}

impl JobKind {
    /// Artifact whose presence means this analysis has already run.
    pub fn output_category(self) -> Option<ArtifactCategory> {
        match self {
            JobKind::Pose => Some(ArtifactCategory::PoseData),
            JobKind::Angles => Some(ArtifactCategory::AnglesData),
            JobKind::Velocity(_) => Some(ArtifactCategory::VelocityData),
            JobKind::Map(kind) => Some(ArtifactCategory::Map(kind)),
            JobKind::Players | JobKind::FirstFrame => None,
        }
    }
}

/// Launches analyses at most once per (match, kind).
#[derive(Clone)]
pub struct Orchestrator {
    locator: Arc<ArtifactLocator>,
    runner: Arc<JobRunner>,
    registry: JobRegistry,
    matches: Arc<dyn MatchRepository>,
}

impl Orchestrator {
    pub fn new(
        locator: Arc<ArtifactLocator>,
        runner: Arc<JobRunner>,
        registry: JobRegistry,
        matches: Arc<dyn MatchRepository>,
    ) -> Self {
        Self {
            locator,
            runner,
            registry,
            matches,
        }
    }

    pub fn registry(&self) -> &JobRegistry {
        &self.registry
    }

    pub fn runner(&self) -> &Arc<JobRunner> {
        &self.runner
    }

    pub fn locator(&self) -> &Arc<ArtifactLocator> {
        &self.locator
    }

    /// Run analysis `kind` for `match_id` unless it is done or in progress.
    pub async fn request(&self, match_id: &str, kind: JobKind) -> AnalysisOutcome {
        let claim = match self.registry.claim(match_id, kind) {
            Ok(claim) => claim,
            Err(AlreadyRunning) => {
                info!(match_id, %kind, "Analysis already running");
                return AnalysisOutcome::AlreadyRunning;
            }
        };

        if let Some(category) = kind.output_category()
            && let Some(artifact) = self.locator.locate(match_id, category).await
        {
            info!(match_id, %kind, path = %artifact.path.display(), "Analysis result already stored");
            claim.complete();
            return AnalysisOutcome::AlreadyStored {
                path: artifact.path,
            };
        }

        let invocation = match self.prepare(match_id, kind).await {
            Ok(invocation) => invocation,
            Err(missing) => {
                info!(match_id, %kind, missing = missing.message(), "Analysis input missing");
                return AnalysisOutcome::MissingInput(missing);
            }
        };

        AnalysisOutcome::Ran(self.launch(claim, invocation).await)
    }

    /// Extract the first frame of a temp-storage upload.
    ///
    /// The upload is resolved by its exact file name. Jobs are keyed by stem
    /// since the extracted image is `{stem}.jpg`.
    pub async fn first_frame(&self, file_name: &str) -> FirstFrameOutcome {
        let stem = file_stem(file_name);
        let claim = match self.registry.claim(stem, JobKind::FirstFrame) {
            Ok(claim) => claim,
            Err(AlreadyRunning) => return FirstFrameOutcome::AlreadyRunning,
        };

        let Ok(invocation) = self.prepare(file_name, JobKind::FirstFrame).await else {
            return FirstFrameOutcome::MissingVideo;
        };

        let outcome = self.launch(claim, invocation).await;
        if !outcome.is_success() {
            return FirstFrameOutcome::Failed(outcome);
        }

        match self.locator.locate(stem, ArtifactCategory::FirstFrame).await {
            Some(image) => FirstFrameOutcome::Extracted { path: image.path },
            None => {
                warn!(file_name, "First-frame worker succeeded but wrote no image");
                FirstFrameOutcome::Failed(WorkerOutcome::Failure {
                    code: Some(0),
                    error: "Worker did not produce an image".to_string(),
                })
            }
        }
    }

    /// Resolve inputs and build the worker invocation for `kind`.
    ///
    /// For `FirstFrame` the key is the upload's file name, not a match id.
    async fn prepare(&self, match_id: &str, kind: JobKind) -> Result<Invocation, MissingInput> {
        let invocation = match kind {
            JobKind::Pose => {
                let video = self.require(match_id, ArtifactCategory::Video).await?;
                Invocation::new(AnalysisScript::PoseEstimation).arg(video)
            }
            JobKind::Angles => {
                let data = self.require(match_id, ArtifactCategory::PoseData).await?;
                Invocation::new(AnalysisScript::JointAngles).arg(data)
            }
            JobKind::Velocity(hand) => {
                let data = self.require(match_id, ArtifactCategory::PoseData).await?;
                Invocation::new(AnalysisScript::Velocity)
                    .arg(data)
                    .arg(hand.as_str())
            }
            JobKind::Map(map_kind) => self.prepare_map(match_id, map_kind).await?,
            JobKind::Players => {
                let video = self.require(match_id, ArtifactCategory::Video).await?;
                Invocation::new(AnalysisScript::PlayerColours).arg(video)
            }
            JobKind::FirstFrame => {
                let video = self
                    .locator
                    .locate_file(match_id, ArtifactCategory::TempVideo)
                    .await
                    .ok_or(MissingInput::Video)?;
                Invocation::new(AnalysisScript::FirstFrame).arg(video.path)
            }
        };
        Ok(invocation)
    }

    async fn prepare_map(&self, match_id: &str, kind: MapKind) -> Result<Invocation, MissingInput> {
        let data = self.require(match_id, ArtifactCategory::PoseData).await?;
        let video = self.require(match_id, ArtifactCategory::Video).await?;

        let context = match self.matches.get_context(match_id).await {
            Ok(Some(context)) => context,
            Ok(None) => return Err(MissingInput::MatchContext),
            Err(e) => {
                warn!(match_id, error = %e, "Failed to load match context");
                return Err(MissingInput::MatchContext);
            }
        };

        Ok(Invocation::new(AnalysisScript::Maps)
            .arg(kind.as_str())
            .arg(data)
            .arg(video)
            .arg(context.players.to_string())
            .stdin(context.court_bounds.to_string()))
    }

    async fn require(
        &self,
        match_id: &str,
        category: ArtifactCategory,
    ) -> Result<PathBuf, MissingInput> {
        match self.locator.locate(match_id, category).await {
            Some(artifact) => Ok(artifact.path),
            None => Err(match category {
                ArtifactCategory::PoseData => MissingInput::PoseData,
                _ => MissingInput::Video,
            }),
        }
    }

    /// Start the worker and wait for it.
    ///
    /// Completion is recorded by a detached task, so the registry is updated
    /// even if the caller stops waiting (client disconnect).
    async fn launch(&self, claim: JobClaim, invocation: Invocation) -> WorkerOutcome {
        let handle = self.runner.spawn(invocation);
        let locator = Arc::clone(&self.locator);
        let (tx, rx) = oneshot::channel();

        tokio::spawn(async move {
            let outcome = handle.outcome().await;
            record_completion(&locator, claim, &outcome).await;
            if tx.send(outcome).is_err() {
                debug!("Requester went away before the worker finished");
            }
        });

        rx.await.unwrap_or_else(|_| WorkerOutcome::Failure {
            code: None,
            error: "Worker completion was lost".to_string(),
        })
    }
}

async fn record_completion(locator: &ArtifactLocator, claim: JobClaim, outcome: &WorkerOutcome) {
    let match_id = claim.match_id().to_string();
    let kind = claim.kind();

    match outcome {
        WorkerOutcome::Success { .. } => {
            if let Some(category) = kind.output_category()
                && !locator.exists(&match_id, category).await
            {
                let expected_dir = locator.output_dir(category);
                warn!(match_id, %kind, ?expected_dir, "Worker succeeded but its artifact is missing");
            }
            claim.complete();
        }
        WorkerOutcome::Failure { code, .. } => {
            claim.fail(format!("exit code {}", code.map_or("none".to_string(), |c| c.to_string())));
        }
        WorkerOutcome::StartError { message } => claim.fail(format!("start error: {message}")),
        WorkerOutcome::TimedOut { after, .. } => {
            claim.fail(format!("timed out after {}s", after.as_secs()))
        }
        WorkerOutcome::Cancelled => claim.fail("cancelled"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::Hand;
    use crate::config::WorkerConfig;
    use crate::jobs::JobState;
    use crate::matches::MatchContext;
    use async_trait::async_trait;
    use tempfile::TempDir;

    struct FailingRepository;

    #[async_trait]
    impl MatchRepository for FailingRepository {
        async fn get_context(&self, _match_id: &str) -> crate::Result<Option<MatchContext>> {
            Err(crate::Error::Other("store offline".to_string()))
        }
    }

    fn orchestrator(root: &std::path::Path) -> Orchestrator {
        let locator = Arc::new(ArtifactLocator::new(root));
        let runner = Arc::new(JobRunner::new(&WorkerConfig {
            interpreter: "sh".to_string(),
            script_dir: root.join("scripts"),
            ..WorkerConfig::default()
        }));
        Orchestrator::new(locator, runner, JobRegistry::new(), Arc::new(FailingRepository))
    }

    fn touch(root: &std::path::Path, rel: &str) {
        let path = root.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, b"x").unwrap();
    }

    #[test]
    fn test_output_categories() {
        assert_eq!(JobKind::Pose.output_category(), Some(ArtifactCategory::PoseData));
        assert_eq!(
            JobKind::Map(MapKind::Animated).output_category(),
            Some(ArtifactCategory::Map(MapKind::Animated))
        );
        assert_eq!(JobKind::Players.output_category(), None);
    }

    #[tokio::test]
    async fn test_stored_result_marks_done() {
        let temp = TempDir::new().unwrap();
        touch(temp.path(), "jointAngleCalculation/m1.json");
        let orchestrator = orchestrator(temp.path());

        let outcome = orchestrator.request("m1", JobKind::Angles).await;
        assert!(matches!(outcome, AnalysisOutcome::AlreadyStored { .. }));
        assert_eq!(orchestrator.registry().state("m1", JobKind::Angles), JobState::Done);
        assert_eq!(orchestrator.runner().spawn_count(), 0);
    }

    #[tokio::test]
    async fn test_missing_input_releases_claim() {
        let temp = TempDir::new().unwrap();
        let orchestrator = orchestrator(temp.path());

        let outcome = orchestrator.request("m1", JobKind::Pose).await;
        assert_eq!(outcome, AnalysisOutcome::MissingInput(MissingInput::Video));
        assert_eq!(orchestrator.registry().state("m1", JobKind::Pose), JobState::Unstarted);
    }

    #[tokio::test]
    async fn test_unreadable_match_context_is_missing_input() {
        let temp = TempDir::new().unwrap();
        touch(temp.path(), "videos/m1.mp4");
        touch(temp.path(), "poseEstimationData/m1.msgpack");
        let orchestrator = orchestrator(temp.path());

        let outcome = orchestrator
            .request("m1", JobKind::Map(MapKind::Display))
            .await;
        assert_eq!(outcome, AnalysisOutcome::MissingInput(MissingInput::MatchContext));
        assert_eq!(orchestrator.runner().spawn_count(), 0);
    }

    #[test]
    fn test_velocity_hands_share_one_chart() {
        assert_eq!(
            JobKind::Velocity(Hand::Left).output_category(),
            JobKind::Velocity(Hand::Right).output_category()
        );
    }

    #[tokio::test]
    async fn test_stored_velocity_chart_is_not_rerun() {
        let temp = TempDir::new().unwrap();
        touch(temp.path(), "poseEstimationData/m1.msgpack");
        touch(temp.path(), "wristDataChart/m1.png");
        let orchestrator = orchestrator(temp.path());

        let outcome = orchestrator.request("m1", JobKind::Velocity(Hand::Right)).await;
        assert_eq!(
            outcome,
            AnalysisOutcome::AlreadyStored {
                path: temp.path().join("wristDataChart/m1.png")
            }
        );
        assert_eq!(orchestrator.runner().spawn_count(), 0);
    }

    #[tokio::test]
    async fn test_first_frame_without_upload() {
        let temp = TempDir::new().unwrap();
        let orchestrator = orchestrator(temp.path());
        assert_eq!(
            orchestrator.first_frame("clip.mp4").await,
            FirstFrameOutcome::MissingVideo
        );
        assert_eq!(
            orchestrator.registry().state("clip", JobKind::FirstFrame),
            JobState::Unstarted
        );
    }
}
