pub mod compute;
pub mod fingerprint;
pub mod job_service;
pub mod media_validation;
pub mod queue;
pub mod signing;
pub mod storage;
