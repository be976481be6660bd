use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Opaque id of an uploaded asset. Only valid for one workflow submission.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceHandle(String);

impl ResourceHandle {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ResourceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobHandle(String);

impl JobHandle {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Response of `POST /resource/image`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadIntent {
    pub put_url: Option<String>,
    #[serde(default)]
    pub headers: Option<Map<String, Value>>,
    pub resource_id: Option<Value>,
}

impl UploadIntent {
    pub fn put_url(&self) -> Option<&str> {
        self.put_url
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
    }

    pub fn resource_handle(&self) -> Option<ResourceHandle> {
        self.resource_id
            .as_ref()
            .and_then(value_to_text)
            .map(ResourceHandle::new)
    }

    /// Headers the write target expects; `image/jpeg` when the service sends none.
    pub fn write_headers(&self) -> Vec<(String, String)> {
        match &self.headers {
            Some(headers) if !headers.is_empty() => headers
                .iter()
                .filter_map(|(name, value)| value_to_text(value).map(|text| (name.clone(), text)))
                .collect(),
            _ => vec![("Content-Type".to_string(), "image/jpeg".to_string())],
        }
    }
}

/// Envelope shared by job submission and job polling responses.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct JobEnvelope {
    pub job: Option<JobBody>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobBody {
    pub id: Option<Value>,
    pub status: Option<String>,
    pub success_info: Option<SuccessInfo>,
    pub failed_info: Option<FailedInfo>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SuccessInfo {
    #[serde(default)]
    pub images: Vec<ImageRef>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ImageRef {
    pub url: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct FailedInfo {
    pub reason: Option<Value>,
    pub code: Option<Value>,
}

impl JobEnvelope {
    pub fn job_handle(&self) -> Option<JobHandle> {
        self.job
            .as_ref()
            .and_then(|job| job.id.as_ref())
            .and_then(value_to_text)
            .map(JobHandle::new)
    }

    /// `None` when the body has no `job` object at all.
    pub fn status(&self) -> Option<JobStatus> {
        self.job.as_ref().map(JobStatus::from_body)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobStatus {
    Pending,
    Running,
    Success { image_urls: Vec<String> },
    Failed { reason: String, code: String },
    Error { reason: String, code: String },
}

impl JobStatus {
    pub fn from_body(body: &JobBody) -> Self {
        let status = body
            .status
            .as_deref()
            .map(|value| value.trim().to_ascii_uppercase())
            .unwrap_or_default();
        match status.as_str() {
            "SUCCESS" => Self::Success {
                image_urls: body
                    .success_info
                    .as_ref()
                    .map(|info| {
                        info.images
                            .iter()
                            .filter_map(|image| image.url.as_deref())
                            .map(str::trim)
                            .filter(|url| !url.is_empty())
                            .map(str::to_string)
                            .collect()
                    })
                    .unwrap_or_default(),
            },
            "FAILED" | "ERROR" => {
                let info = body.failed_info.clone().unwrap_or_default();
                let reason = info
                    .reason
                    .as_ref()
                    .and_then(value_to_text)
                    .unwrap_or_else(|| "no details".to_string());
                let code = info
                    .code
                    .as_ref()
                    .and_then(value_to_text)
                    .unwrap_or_else(|| "unknown".to_string());
                if status == "FAILED" {
                    Self::Failed { reason, code }
                } else {
                    Self::Error { reason, code }
                }
            }
            "RUNNING" => Self::Running,
            _ => Self::Pending,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Success { .. } | Self::Failed { .. } | Self::Error { .. }
        )
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Running => "RUNNING",
            Self::Success { .. } => "SUCCESS",
            Self::Failed { .. } => "FAILED",
            Self::Error { .. } => "ERROR",
        }
    }
}

fn value_to_text(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text.trim().to_string()).filter(|text| !text.is_empty()),
        Value::Number(number) => Some(number.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn envelope(value: Value) -> JobEnvelope {
        serde_json::from_value(value).expect("valid envelope")
    }

    #[test]
    fn success_collects_image_urls_in_order() {
        let status = envelope(json!({
            "job": {
                "id": "j-1",
                "status": "SUCCESS",
                "successInfo": {"images": [{"url": "https://a/1.png"}, {"url": "https://a/2.png"}]}
            }
        }))
        .status()
        .expect("job status");
        assert_eq!(
            status,
            JobStatus::Success {
                image_urls: vec!["https://a/1.png".to_string(), "https://a/2.png".to_string()]
            }
        );
        assert!(status.is_terminal());
    }

    #[test]
    fn failure_carries_reason_and_numeric_code() {
        let status = envelope(json!({
            "job": {"status": "FAILED", "failedInfo": {"reason": "nsfw", "code": 1302}}
        }))
        .status();
        assert_eq!(
            status,
            Some(JobStatus::Failed {
                reason: "nsfw".to_string(),
                code: "1302".to_string()
            })
        );
    }

    #[test]
    fn error_without_details_uses_placeholders() {
        let status = envelope(json!({"job": {"status": "ERROR"}})).status();
        assert_eq!(
            status,
            Some(JobStatus::Error {
                reason: "no details".to_string(),
                code: "unknown".to_string()
            })
        );
    }

    #[test]
    fn unknown_statuses_are_pending() {
        assert_eq!(
            envelope(json!({"job": {"status": "WAITING"}})).status(),
            Some(JobStatus::Pending)
        );
        assert_eq!(
            envelope(json!({"job": {"status": "running"}})).status(),
            Some(JobStatus::Running)
        );
        assert_eq!(envelope(json!({"data": {}})).status(), None);
        assert!(!JobStatus::Running.is_terminal());
    }

    #[test]
    fn job_handle_accepts_numeric_ids() {
        assert_eq!(
            envelope(json!({"job": {"id": 8123}})).job_handle(),
            Some(JobHandle::new("8123"))
        );
        assert_eq!(envelope(json!({"job": {"id": " "}})).job_handle(), None);
        assert_eq!(envelope(json!({})).job_handle(), None);
    }

    #[test]
    fn upload_intent_defaults_write_headers_to_jpeg() {
        let intent: UploadIntent = serde_json::from_value(json!({
            "putUrl": "https://bucket/put",
            "resourceId": "res-9"
        }))
        .expect("intent");
        assert_eq!(intent.put_url(), Some("https://bucket/put"));
        assert_eq!(intent.resource_handle(), Some(ResourceHandle::new("res-9")));
        assert_eq!(
            intent.write_headers(),
            vec![("Content-Type".to_string(), "image/jpeg".to_string())]
        );
    }
}
