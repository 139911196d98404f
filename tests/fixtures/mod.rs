//! Small media payloads for submission tests

use media_orchestrator::models::job::InputKind;

/// One input file as a client would upload it
#[derive(Debug, Clone, Copy)]
pub struct MediaFixture {
    pub kind: InputKind,
    pub file_name: &'static str,
    pub mime: &'static str,
    pub bytes: &'static [u8],
}

pub const REFERENCE_VIDEO: MediaFixture = MediaFixture {
    kind: InputKind::ReferenceVideo,
    file_name: "dance.mp4",
    mime: "video/mp4",
    bytes: b"\x00\x00\x00\x18ftypmp42\x00\x00\x00\x00mp42isomreference-clip",
};

pub const SOURCE_IMAGE: MediaFixture = MediaFixture {
    kind: InputKind::SourceImage,
    file_name: "face.png",
    mime: "image/png",
    bytes: b"\x89PNG\r\n\x1a\n\x00\x00\x00\rIHDRsource-face",
};

pub const DRIVING_AUDIO: MediaFixture = MediaFixture {
    kind: InputKind::DrivingAudio,
    file_name: "verse.wav",
    mime: "audio/wav",
    bytes: b"RIFF\x24\x00\x00\x00WAVEfmt driving-audio",
};

/// Bytes a finished job's output decodes to
pub const RESULT_VIDEO: &[u8] = b"\x00\x00\x00\x18ftypmp42result-video-bytes";
