mod graph;
mod pipeline;
mod status;

use serde::{Deserialize, Serialize};

pub use graph::{GraphError, InputValue, NodeId, NodeProperties, NodeRef, NodeSpec, WorkflowGraph};
pub use pipeline::{DiffusionParams, PipelineJob, PromptText, SeedInit, Stage};
pub use status::{
    FailedInfo, ImageRef, JobBody, JobEnvelope, JobHandle, JobStatus, ResourceHandle,
    SuccessInfo, UploadIntent,
};

/// Graph job submitted to `POST /jobs/workflow`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowJob {
    pub request_id: String,
    pub params: WorkflowGraph,
    #[serde(default)]
    pub running_notify_url: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobKind {
    Workflow,
    Pipeline,
}

#[derive(Debug, Clone, PartialEq)]
pub enum JobRequest {
    Workflow(WorkflowJob),
    Pipeline(PipelineJob),
}

impl JobRequest {
    pub fn kind(&self) -> JobKind {
        match self {
            Self::Workflow(_) => JobKind::Workflow,
            Self::Pipeline(_) => JobKind::Pipeline,
        }
    }

    pub fn request_id(&self) -> &str {
        match self {
            Self::Workflow(job) => &job.request_id,
            Self::Pipeline(job) => &job.request_id,
        }
    }

    /// Service path the request is posted to.
    pub fn endpoint(&self) -> &'static str {
        match self {
            Self::Workflow(_) => "/jobs/workflow",
            Self::Pipeline(_) => "/jobs",
        }
    }

    pub fn graph(&self) -> Option<&WorkflowGraph> {
        match self {
            Self::Workflow(job) => Some(&job.params),
            Self::Pipeline(_) => None,
        }
    }

    pub fn to_json(&self) -> serde_json::Result<serde_json::Value> {
        match self {
            Self::Workflow(job) => serde_json::to_value(job),
            Self::Pipeline(job) => serde_json::to_value(job),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn workflow_job_body_uses_camel_case_envelope() -> anyhow::Result<()> {
        let mut graph = WorkflowGraph::new();
        graph.insert("7", NodeSpec::new("PreviewImage"));
        let request = JobRequest::Workflow(WorkflowJob {
            request_id: "workflow_1".to_string(),
            params: graph,
            running_notify_url: String::new(),
        });

        let body = request.to_json()?;
        assert_eq!(body["requestId"], json!("workflow_1"));
        assert_eq!(body["runningNotifyUrl"], json!(""));
        assert_eq!(body["params"]["7"]["classType"], json!("PreviewImage"));
        assert_eq!(request.endpoint(), "/jobs/workflow");
        assert_eq!(request.kind(), JobKind::Workflow);
        Ok(())
    }

    #[test]
    fn pipeline_requests_post_to_jobs() {
        let request = JobRequest::Pipeline(PipelineJob {
            request_id: "r".to_string(),
            stages: Vec::new(),
        });
        assert_eq!(request.endpoint(), "/jobs");
        assert!(request.graph().is_none());
        assert_eq!(request.request_id(), "r");
    }
}
