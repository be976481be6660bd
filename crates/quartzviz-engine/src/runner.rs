use std::sync::Arc;
use std::time::Duration;

use quartzviz_contracts::jobs::{JobEnvelope, JobHandle, JobKind, JobRequest, JobStatus, WorkflowGraph};
use serde_json::json;
use tracing::{debug, info, warn};

use crate::client::{parse_json, status_error, truncate_text, ServiceClient};
use crate::clock::{CancelToken, Clock};
use crate::error::EngineError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollBudget {
    /// Poll at most this many times, sleeping between polls.
    Attempts(u32),
    /// Sleep before every poll; give up once this much time has passed.
    Elapsed(Duration),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    pub budget: PollBudget,
}

impl PollPolicy {
    pub fn workflow() -> Self {
        Self {
            interval: Duration::from_secs(5),
            budget: PollBudget::Attempts(36),
        }
    }

    pub fn pipeline() -> Self {
        Self {
            interval: Duration::from_secs(10),
            budget: PollBudget::Elapsed(Duration::from_secs(300)),
        }
    }

    /// Upper bound on polls, used to scale progress.
    pub fn expected_polls(&self) -> u32 {
        match self.budget {
            PollBudget::Attempts(max) => max.max(1),
            PollBudget::Elapsed(limit) => {
                if self.interval.is_zero() {
                    return 1;
                }
                ((limit.as_millis() / self.interval.as_millis()) as u32).max(1)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollTick {
    pub attempt: u32,
    pub expected: u32,
    pub status: JobStatus,
}

#[derive(Debug, Clone)]
pub struct RemoteImage {
    pub job: JobHandle,
    pub url: String,
    pub bytes: Vec<u8>,
}

pub struct JobRunner {
    client: Arc<ServiceClient>,
    clock: Arc<dyn Clock>,
    workflow_policy: PollPolicy,
    pipeline_policy: PollPolicy,
}

impl JobRunner {
    pub fn new(client: Arc<ServiceClient>, clock: Arc<dyn Clock>) -> Self {
        Self {
            client,
            clock,
            workflow_policy: PollPolicy::workflow(),
            pipeline_policy: PollPolicy::pipeline(),
        }
    }

    pub fn with_policies(mut self, workflow: PollPolicy, pipeline: PollPolicy) -> Self {
        self.workflow_policy = workflow;
        self.pipeline_policy = pipeline;
        self
    }

    pub fn policy_for(&self, kind: JobKind) -> PollPolicy {
        match kind {
            JobKind::Workflow => self.workflow_policy,
            JobKind::Pipeline => self.pipeline_policy,
        }
    }

    /// Asks the service to validate graph parameters without running them.
    pub fn check_params(&self, graph: &WorkflowGraph) -> Result<(), EngineError> {
        let reply = self.client.post_json(
            "/jobs/workflow/params/check",
            &json!({ "params": graph }),
            self.client.timeouts().metadata,
            "parameter check",
        )?;
        if !reply.is_success() {
            return Err(EngineError::ParamsRejected {
                status: reply.status,
                detail: truncate_text(&reply.text(), 512),
            });
        }
        debug!(nodes = graph.len(), "workflow parameters accepted");
        Ok(())
    }

    pub fn submit(&self, request: &JobRequest) -> Result<JobHandle, EngineError> {
        if let Some(graph) = request.graph() {
            self.check_params(graph)?;
        }
        let body = request
            .to_json()
            .map_err(|err| EngineError::Submission(format!("request could not be encoded: {err}")))?;
        let reply = self.client.post_json(
            request.endpoint(),
            &body,
            self.client.timeouts().submission,
            "job submission",
        )?;
        if !reply.is_success() {
            return Err(EngineError::Submission(format!(
                "service answered {}: {}",
                reply.status,
                truncate_text(&reply.text(), 512)
            )));
        }
        let envelope: JobEnvelope = parse_json(&reply, "job submission")
            .map_err(|err| EngineError::Submission(err.to_string()))?;
        let handle = envelope
            .job_handle()
            .ok_or_else(|| EngineError::Submission("response carried no job id".to_string()))?;
        info!(
            job_id = %handle,
            request_id = request.request_id(),
            endpoint = request.endpoint(),
            "job submitted"
        );
        Ok(handle)
    }

    pub fn poll(&self, handle: &JobHandle) -> Result<JobStatus, EngineError> {
        let reply = self.client.get_json(
            &format!("/jobs/{handle}"),
            self.client.timeouts().metadata,
            "job poll",
        )?;
        if !reply.is_success() {
            return Err(status_error("job poll", &reply));
        }
        let envelope: JobEnvelope = parse_json(&reply, "job poll")?;
        envelope.status().ok_or_else(|| EngineError::Transport {
            context: "job poll".to_string(),
            status: Some(reply.status),
            message: format!(
                "response has no job object: {}",
                truncate_text(&reply.text(), 512)
            ),
        })
    }

    /// Polls until a terminal status and returns the result image URLs.
    pub fn wait(
        &self,
        handle: &JobHandle,
        policy: PollPolicy,
        label: &str,
        cancel: &CancelToken,
        observer: &mut dyn FnMut(&PollTick),
    ) -> Result<Vec<String>, EngineError> {
        let started = self.clock.now();
        let expected = policy.expected_polls();
        let mut attempt = 0u32;
        loop {
            if let PollBudget::Elapsed(limit) = policy.budget {
                self.clock.sleep(policy.interval);
                let waited = self.clock.now().duration_since(started);
                if waited > limit {
                    return Err(timeout(label, attempt, waited));
                }
            }
            cancel.check()?;

            attempt += 1;
            let status = self.poll(handle)?;
            info!(job_id = %handle, attempt, status = status.label(), "{label} job status");
            observer(&PollTick {
                attempt,
                expected,
                status: status.clone(),
            });
            match status {
                JobStatus::Success { image_urls } => return Ok(image_urls),
                JobStatus::Failed { reason, code } | JobStatus::Error { reason, code } => {
                    warn!(job_id = %handle, %reason, %code, "{label} job failed");
                    return Err(EngineError::Job { reason, code });
                }
                JobStatus::Pending | JobStatus::Running => {}
            }

            if let PollBudget::Attempts(max) = policy.budget {
                if attempt >= max {
                    let waited = self.clock.now().duration_since(started);
                    return Err(timeout(label, attempt, waited));
                }
                self.clock.sleep(policy.interval);
            }
        }
    }

    /// Waits for a submitted job and downloads its first result image.
    pub fn fetch_result(
        &self,
        handle: &JobHandle,
        kind: JobKind,
        label: &str,
        cancel: &CancelToken,
        observer: &mut dyn FnMut(&PollTick),
    ) -> Result<RemoteImage, EngineError> {
        let urls = self.wait(handle, self.policy_for(kind), label, cancel, observer)?;
        if urls.len() > 1 {
            debug!(job_id = %handle, count = urls.len(), "using the first result image");
        }
        let url = urls.into_iter().next().ok_or_else(|| EngineError::Job {
            reason: "job finished without result images".to_string(),
            code: "EMPTY_RESULT".to_string(),
        })?;
        cancel.check()?;
        let bytes = self.client.download(&url, "result download")?;
        info!(job_id = %handle, bytes = bytes.len(), "result image downloaded");
        Ok(RemoteImage {
            job: handle.clone(),
            url,
            bytes,
        })
    }

    pub fn run_to_completion(
        &self,
        request: &JobRequest,
        label: &str,
        cancel: &CancelToken,
        observer: &mut dyn FnMut(&PollTick),
    ) -> Result<RemoteImage, EngineError> {
        cancel.check()?;
        let handle = self.submit(request)?;
        self.fetch_result(&handle, request.kind(), label, cancel, observer)
    }
}

fn timeout(label: &str, polls: u32, waited: Duration) -> EngineError {
    EngineError::Timeout {
        label: label.to_string(),
        polls,
        waited_secs: waited.as_secs(),
    }
}
