use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use strum::{AsRefStr, Display, EnumString};
use uuid::Uuid;

/// Transformation kind run by the remote compute backend.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, EnumString, Display, AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum JobMode {
    VideoSwap,
    PhotoSing,
}

#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    EnumString,
    Display,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum QualityTier {
    Fast,
    #[default]
    Balanced,
    Max,
}

/// Output frame shape.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    EnumString,
    Display,
    AsRefStr,
)]
pub enum AspectRatio {
    #[default]
    #[serde(rename = "9:16")]
    #[strum(serialize = "9:16")]
    Portrait,
    #[serde(rename = "1:1")]
    #[strum(serialize = "1:1")]
    Square,
    #[serde(rename = "4:5")]
    #[strum(serialize = "4:5")]
    Vertical,
}

/// Lifecycle status of a job.
///
/// `Done` and `Failed` are terminal for the current attempt. A failed job can
/// only leave `Failed` through an explicit retry.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, EnumString, Display, AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Processing,
    Done,
    Failed,
    Retry,
}

impl JobStatus {
    /// Statuses whose rows are canonical results for their fingerprint.
    pub const DEDUP_CANDIDATES: [JobStatus; 3] =
        [JobStatus::Queued, JobStatus::Processing, JobStatus::Done];

    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Done | JobStatus::Failed)
    }

    /// Whether the dispatch worker may pick the job up.
    pub fn is_dispatchable(self) -> bool {
        matches!(self, JobStatus::Queued | JobStatus::Retry)
    }

    pub fn can_transition_to(self, next: JobStatus) -> bool {
        use JobStatus::*;
        matches!(
            (self, next),
            (Queued | Retry, Processing)
                | (Queued | Retry, Failed)
                | (Processing, Processing | Done | Failed)
                | (Failed, Retry)
        )
    }
}

/// Observability sub-phase of a job.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    EnumString,
    Display,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum JobStage {
    Queued,
    /// Minting asset references for the remote backend.
    Preprocessing,
    /// Remote compute invoked.
    Generating,
    /// Materializing the remote output.
    Enhancing,
    Packaging,
    Done,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageTiming {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// Media family an input belongs to; drives extension validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, AsRefStr)]
#[strum(serialize_all = "snake_case")]
pub enum MediaClass {
    Video,
    Image,
    Audio,
}

/// Named input slot of a job. Ordering is the fixed fingerprint order.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    EnumString,
    Display,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum InputKind {
    ReferenceVideo,
    SourceImage,
    DrivingAudio,
}

impl InputKind {
    pub const ALL: [InputKind; 3] = [
        InputKind::ReferenceVideo,
        InputKind::SourceImage,
        InputKind::DrivingAudio,
    ];

    pub fn media_class(self) -> MediaClass {
        match self {
            InputKind::ReferenceVideo => MediaClass::Video,
            InputKind::SourceImage => MediaClass::Image,
            InputKind::DrivingAudio => MediaClass::Audio,
        }
    }

    pub fn is_required(self) -> bool {
        !matches!(self, InputKind::DrivingAudio)
    }
}

/// Semantic request parameters, excluding input bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobParams {
    pub mode: JobMode,
    pub quality: QualityTier,
    pub enable_4k: bool,
    pub aspect_ratio: AspectRatio,
}

/// A tracked media transformation job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,
    pub mode: JobMode,
    pub quality: QualityTier,
    pub enable_4k: bool,
    pub aspect_ratio: AspectRatio,
    pub fingerprint: String,
    pub status: JobStatus,
    pub stage: JobStage,
    pub stage_timings: BTreeMap<JobStage, StageTiming>,
    pub inputs: BTreeMap<InputKind, String>,
    pub output_ref: Option<String>,
    pub remote_handle: Option<String>,
    pub request_id: Option<String>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("cannot move job from {from} to {to}")]
pub struct InvalidTransition {
    pub from: JobStatus,
    pub to: JobStatus,
}

impl Job {
    /// Build a freshly queued job.
    pub fn new(
        id: Uuid,
        params: JobParams,
        fingerprint: String,
        inputs: BTreeMap<InputKind, String>,
        now: DateTime<Utc>,
    ) -> Self {
        let mut stage_timings = BTreeMap::new();
        stage_timings.insert(JobStage::Queued, StageTiming { start: now, end: now });

        Self {
            id,
            mode: params.mode,
            quality: params.quality,
            enable_4k: params.enable_4k,
            aspect_ratio: params.aspect_ratio,
            fingerprint,
            status: JobStatus::Queued,
            stage: JobStage::Queued,
            stage_timings,
            inputs,
            output_ref: None,
            remote_handle: None,
            request_id: None,
            error_message: None,
            created_at: now,
            updated_at: now,
            started_at: None,
            finished_at: None,
        }
    }

    pub fn params(&self) -> JobParams {
        JobParams {
            mode: self.mode,
            quality: self.quality,
            enable_4k: self.enable_4k,
            aspect_ratio: self.aspect_ratio,
        }
    }

    /// True once the job has reached `done` with a recorded output.
    pub fn is_completed(&self) -> bool {
        self.status == JobStatus::Done && self.output_ref.is_some()
    }

    /// Move into `stage` under `status`.
    ///
    /// The stage being left gets its end stamped. The entered stage keeps its
    /// first start if it was visited before; its end is always refreshed.
    pub fn enter_stage(
        &mut self,
        stage: JobStage,
        status: JobStatus,
        now: DateTime<Utc>,
    ) -> Result<(), InvalidTransition> {
        if !self.status.can_transition_to(status) {
            return Err(InvalidTransition {
                from: self.status,
                to: status,
            });
        }

        if let Some(previous) = self.stage_timings.get_mut(&self.stage) {
            previous.end = now;
        }
        self.stage_timings
            .entry(stage)
            .and_modify(|timing| timing.end = now)
            .or_insert(StageTiming { start: now, end: now });

        self.stage = stage;
        self.status = status;
        if status == JobStatus::Processing && self.started_at.is_none() {
            self.started_at = Some(now);
        }
        self.updated_at = now;
        Ok(())
    }

    /// Terminal failure for the current attempt.
    pub fn fail(
        &mut self,
        message: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Result<(), InvalidTransition> {
        self.enter_stage(JobStage::Failed, JobStatus::Failed, now)?;
        self.error_message = Some(message.into());
        self.output_ref = None;
        self.finished_at = Some(now);
        Ok(())
    }

    /// Packaging and `done` in one step, recording the output location.
    pub fn complete(
        &mut self,
        output_ref: String,
        now: DateTime<Utc>,
    ) -> Result<(), InvalidTransition> {
        self.enter_stage(JobStage::Packaging, JobStatus::Processing, now)?;
        self.enter_stage(JobStage::Done, JobStatus::Done, now)?;
        self.output_ref = Some(output_ref);
        self.error_message = None;
        self.finished_at = Some(now);
        Ok(())
    }

    /// Re-arm a failed job for another dispatch attempt.
    pub fn arm_retry(&mut self, now: DateTime<Utc>) -> Result<(), InvalidTransition> {
        self.enter_stage(JobStage::Queued, JobStatus::Retry, now)?;
        self.error_message = None;
        self.finished_at = None;
        // The previous attempt's remote job must not be polled for this one.
        self.remote_handle = None;
        self.request_id = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use std::str::FromStr;

    fn params() -> JobParams {
        JobParams {
            mode: JobMode::VideoSwap,
            quality: QualityTier::Balanced,
            enable_4k: false,
            aspect_ratio: AspectRatio::Portrait,
        }
    }

    fn queued_job(now: DateTime<Utc>) -> Job {
        let mut inputs = BTreeMap::new();
        inputs.insert(InputKind::ReferenceVideo, "uploads/a/reference_video.mp4".to_string());
        inputs.insert(InputKind::SourceImage, "uploads/a/source_image.jpg".to_string());
        Job::new(Uuid::new_v4(), params(), "fp".to_string(), inputs, now)
    }

    #[test]
    fn test_new_job_is_queued_with_timing() {
        let now = Utc::now();
        let job = queued_job(now);

        assert_eq!(job.status, JobStatus::Queued);
        assert_eq!(job.stage, JobStage::Queued);
        assert_eq!(job.stage_timings[&JobStage::Queued].start, now);
        assert!(job.output_ref.is_none());
        assert!(job.finished_at.is_none());
        assert!(job.started_at.is_none());
    }

    #[test]
    fn test_reentering_stage_keeps_first_start() {
        let t0 = Utc::now();
        let mut job = queued_job(t0);
        job.enter_stage(JobStage::Preprocessing, JobStatus::Processing, t0 + Duration::seconds(1))
            .unwrap();
        job.enter_stage(JobStage::Generating, JobStatus::Processing, t0 + Duration::seconds(2))
            .unwrap();
        job.enter_stage(JobStage::Preprocessing, JobStatus::Processing, t0 + Duration::seconds(5))
            .unwrap();

        let pre = job.stage_timings[&JobStage::Preprocessing];
        assert_eq!(pre.start, t0 + Duration::seconds(1));
        assert_eq!(pre.end, t0 + Duration::seconds(5));

        // Leaving a stage closes it
        let gen = job.stage_timings[&JobStage::Generating];
        assert_eq!(gen.end, t0 + Duration::seconds(5));
        assert!(gen.end >= gen.start);
        assert_eq!(job.started_at, Some(t0 + Duration::seconds(1)));
    }

    #[test]
    fn test_complete_sets_output_and_finish() {
        let now = Utc::now();
        let mut job = queued_job(now);
        job.enter_stage(JobStage::Enhancing, JobStatus::Processing, now).unwrap();
        job.error_message = Some("stale".to_string());
        job.complete("outputs/x/result.mp4".to_string(), now).unwrap();

        assert!(job.is_completed());
        assert_eq!(job.stage, JobStage::Done);
        assert!(job.error_message.is_none());
        assert_eq!(job.finished_at, Some(now));
        assert!(job.stage_timings.contains_key(&JobStage::Packaging));
    }

    #[test]
    fn test_done_job_cannot_fail() {
        let now = Utc::now();
        let mut job = queued_job(now);
        job.enter_stage(JobStage::Generating, JobStatus::Processing, now).unwrap();
        job.complete("out".to_string(), now).unwrap();

        let err = job.fail("late failure", now).unwrap_err();
        assert_eq!(err.from, JobStatus::Done);
        assert!(job.is_completed());
    }

    #[test]
    fn test_retry_only_from_failed() {
        let now = Utc::now();
        let mut job = queued_job(now);
        assert!(job.arm_retry(now).is_err());

        job.enter_stage(JobStage::Generating, JobStatus::Processing, now).unwrap();
        job.remote_handle = Some("remote-1".to_string());
        job.request_id = Some("req-1".to_string());
        job.fail("gateway timeout", now).unwrap();
        assert_eq!(job.finished_at, Some(now));
        // Failure keeps the diagnostic timing log
        assert!(job.stage_timings.contains_key(&JobStage::Generating));

        job.arm_retry(now).unwrap();
        assert_eq!(job.status, JobStatus::Retry);
        assert_eq!(job.stage, JobStage::Queued);
        assert!(job.error_message.is_none());
        assert!(job.finished_at.is_none());
        assert!(job.remote_handle.is_none());
        assert!(job.request_id.is_none());
        assert!(job.status.is_dispatchable());
    }

    #[test]
    fn test_enum_wire_names() {
        assert_eq!(AspectRatio::from_str("4:5").unwrap(), AspectRatio::Vertical);
        assert_eq!(AspectRatio::Portrait.to_string(), "9:16");
        assert_eq!(JobMode::from_str("photo_sing").unwrap(), JobMode::PhotoSing);
        assert_eq!(JobStage::Preprocessing.as_ref(), "preprocessing");
        assert_eq!(
            serde_json::to_string(&AspectRatio::Square).unwrap(),
            "\"1:1\""
        );
        assert!(QualityTier::from_str("ultra").is_err());
    }
}
