use async_trait::async_trait;

use super::{ComputeError, ComputeGateway, RemoteStatus, SubmitReceipt, SubmitRequest};

/// Local development stand-in for the remote backend.
///
/// Accepts every submission and reports it as in progress forever; jobs are
/// completed by posting a signed callback by hand.
#[derive(Debug, Default)]
pub struct MockGateway;

#[async_trait]
impl ComputeGateway for MockGateway {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn submit(&self, request: SubmitRequest<'_>) -> Result<SubmitReceipt, ComputeError> {
        tracing::info!(
            job_id = %request.job.id,
            assets = request.assets.len(),
            callback = request.callback.is_some(),
            "Mock compute accepted job"
        );
        Ok(SubmitReceipt {
            remote_handle: Some(format!("mock-{}", request.job.id)),
            request_id: Some(request.job.id.to_string()),
        })
    }

    async fn get_status(&self, _remote_handle: &str) -> Result<RemoteStatus, ComputeError> {
        Ok(RemoteStatus::new("IN_PROGRESS"))
    }
}
