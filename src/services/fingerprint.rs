//! Deduplication fingerprints over request semantics and input content.

use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

use crate::models::job::{InputKind, JobParams};

/// Hex SHA-256 of raw bytes.
pub fn content_hash(content: &[u8]) -> String {
    hex::encode(Sha256::digest(content))
}

/// Hash an ordered list of parts, each terminated by `|`.
pub fn stable_config_hash<S: AsRef<str>>(parts: &[S]) -> String {
    let mut digest = Sha256::new();
    for part in parts {
        digest.update(part.as_ref().as_bytes());
        digest.update(b"|");
    }
    hex::encode(digest.finalize())
}

/// Fingerprint of a submission.
///
/// Inputs are hashed by content in [`InputKind::ALL`] order; an absent input
/// contributes an empty part so slots never shift.
pub fn request_fingerprint<B: AsRef<[u8]>>(
    params: &JobParams,
    inputs: &BTreeMap<InputKind, B>,
) -> String {
    let mut parts = vec![
        params.mode.to_string(),
        params.quality.to_string(),
        params.enable_4k.to_string(),
        params.aspect_ratio.to_string(),
    ];
    parts.extend(InputKind::ALL.iter().map(|kind| {
        inputs
            .get(kind)
            .map(|bytes| content_hash(bytes.as_ref()))
            .unwrap_or_default()
    }));
    stable_config_hash(&parts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::job::{AspectRatio, JobMode, QualityTier};

    fn params() -> JobParams {
        JobParams {
            mode: JobMode::VideoSwap,
            quality: QualityTier::Balanced,
            enable_4k: true,
            aspect_ratio: AspectRatio::Portrait,
        }
    }

    fn inputs() -> BTreeMap<InputKind, Vec<u8>> {
        BTreeMap::from([
            (InputKind::ReferenceVideo, b"video-bytes".to_vec()),
            (InputKind::SourceImage, b"image-bytes".to_vec()),
        ])
    }

    #[test]
    fn test_stable_config_hash() {
        let a = stable_config_hash(&["video_swap", "balanced", "true"]);
        let b = stable_config_hash(&["video_swap", "balanced", "true"]);
        let c = stable_config_hash(&["video_swap", "fast", "true"]);
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn test_fingerprint_is_repeatable() {
        assert_eq!(
            request_fingerprint(&params(), &inputs()),
            request_fingerprint(&params(), &inputs())
        );
    }

    #[test]
    fn test_each_component_changes_fingerprint() {
        let base = request_fingerprint(&params(), &inputs());

        let mut p = params();
        p.mode = JobMode::PhotoSing;
        assert_ne!(base, request_fingerprint(&p, &inputs()));

        let mut p = params();
        p.quality = QualityTier::Max;
        assert_ne!(base, request_fingerprint(&p, &inputs()));

        let mut p = params();
        p.enable_4k = false;
        assert_ne!(base, request_fingerprint(&p, &inputs()));

        let mut p = params();
        p.aspect_ratio = AspectRatio::Square;
        assert_ne!(base, request_fingerprint(&p, &inputs()));

        let mut i = inputs();
        i.insert(InputKind::SourceImage, b"image-bytes!".to_vec());
        assert_ne!(base, request_fingerprint(&params(), &i));

        let mut i = inputs();
        i.insert(InputKind::DrivingAudio, Vec::new());
        assert_ne!(base, request_fingerprint(&params(), &i));
    }

    #[test]
    fn test_swapped_inputs_do_not_collide() {
        let swapped = BTreeMap::from([
            (InputKind::ReferenceVideo, b"image-bytes".to_vec()),
            (InputKind::SourceImage, b"video-bytes".to_vec()),
        ]);
        assert_ne!(
            request_fingerprint(&params(), &inputs()),
            request_fingerprint(&params(), &swapped)
        );
    }
}
