use crate::config::SubmissionConfig;
use crate::error::ApiError;
use anyhow::Context;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

/// Required MIME type for the report file
pub const REPORT_MIME: &str = "application/pdf";

/// Accepted MIME types for the presentation file
pub const PRESENTATION_MIMES: [&str; 2] = [
    "application/vnd.ms-powerpoint",
    "application/vnd.openxmlformats-officedocument.presentationml.presentation",
];

/// A file received from the finalist upload form
#[derive(Debug, Clone)]
pub struct UploadedDocument {
    pub name: String,
    pub mime_type: String,
    pub data: Vec<u8>,
}

/// A fully validated finalist submission
#[derive(Debug)]
pub struct FinalistSubmission {
    pub team_id: String,
    pub team_name: String,
    pub leader_email: String,
    pub leader_mobile: String,
    pub report: UploadedDocument,
    pub presentation: UploadedDocument,
}

/// Public URLs returned by the document-storage endpoint
#[derive(Debug)]
pub struct SubmissionUrls {
    pub report_url: String,
    pub presentation_url: String,
}

/// Check that the report is a PDF within the size limit
pub fn validate_report(file: &UploadedDocument, max_bytes: usize) -> Result<(), ApiError> {
    if file.mime_type != REPORT_MIME {
        return Err(ApiError::Validation("Report must be a PDF file".to_string()));
    }
    check_size(file, max_bytes)
}

/// Check that the presentation is a PPT/PPTX within the size limit
pub fn validate_presentation(file: &UploadedDocument, max_bytes: usize) -> Result<(), ApiError> {
    if !PRESENTATION_MIMES.contains(&file.mime_type.as_str()) {
        return Err(ApiError::Validation(
            "Presentation must be a PPT or PPTX file".to_string(),
        ));
    }
    check_size(file, max_bytes)
}

fn check_size(file: &UploadedDocument, max_bytes: usize) -> Result<(), ApiError> {
    if file.data.len() > max_bytes {
        return Err(ApiError::Validation(format!(
            "File size must not exceed {}MB",
            max_bytes / (1024 * 1024)
        )));
    }
    Ok(())
}

/// Wire format of one file sent to the document-storage endpoint
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct EncodedDocument {
    name: String,
    mime_type: String,
    /// Base64-encoded file contents
    data: String,
}

impl EncodedDocument {
    fn encode(file: &UploadedDocument) -> Self {
        Self {
            name: file.name.clone(),
            mime_type: file.mime_type.clone(),
            data: STANDARD.encode(&file.data),
        }
    }
}

/// JSON body POSTed to the document-storage endpoint
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ForwardPayload<'a> {
    team_id: &'a str,
    team_name: &'a str,
    leader_email: &'a str,
    leader_mobile: &'a str,
    report_file: EncodedDocument,
    presentation_file: EncodedDocument,
}

/// Response body of the document-storage endpoint
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UploadResult {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    report_url: Option<String>,
    #[serde(default)]
    presentation_url: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

/// Forwards finalist uploads to the external document-storage endpoint
///
/// The endpoint performs the durable storage and returns public URLs; this
/// side only validates, base64-encodes and relays.
pub struct DocumentForwarder {
    client: reqwest::Client,
    endpoint_url: Option<String>,
}

impl DocumentForwarder {
    /// Build the forwarder from configuration
    pub fn new(config: &SubmissionConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.upload_timeout_secs))
            .build()
            .context("Failed to build document-storage HTTP client")?;

        if config.endpoint_url.is_none() {
            warn!("Document-storage endpoint not configured, submissions will be rejected");
        }

        Ok(Self {
            client,
            endpoint_url: config.endpoint_url.clone(),
        })
    }

    /// Forward a validated submission and relay the resulting URLs
    #[instrument(skip(self, submission), fields(team_id = %submission.team_id))]
    pub async fn forward(
        &self,
        submission: &FinalistSubmission,
    ) -> Result<SubmissionUrls, ApiError> {
        let endpoint = self.endpoint_url.as_deref().ok_or_else(|| {
            ApiError::Configuration(
                "Document-storage endpoint is not configured".to_string(),
            )
        })?;

        let payload = ForwardPayload {
            team_id: &submission.team_id,
            team_name: &submission.team_name,
            leader_email: &submission.leader_email,
            leader_mobile: &submission.leader_mobile,
            report_file: EncodedDocument::encode(&submission.report),
            presentation_file: EncodedDocument::encode(&submission.presentation),
        };

        let response = self
            .client
            .post(endpoint)
            .json(&payload)
            .send()
            .await
            .map_err(|err| {
                ApiError::Upstream(format!("Document-storage request failed: {}", err))
            })?;

        let status = response.status();
        let result: UploadResult = response.json().await.map_err(|err| {
            ApiError::Upstream(format!("Document-storage response unreadable: {}", err))
        })?;

        if !status.is_success() || !result.success {
            let message = result
                .error
                .unwrap_or_else(|| "Failed to upload files".to_string());
            return Err(ApiError::Upstream(message));
        }

        let (Some(report_url), Some(presentation_url)) =
            (result.report_url, result.presentation_url)
        else {
            return Err(ApiError::Upstream(
                "Document-storage response is missing file URLs".to_string(),
            ));
        };

        metrics::counter!("octwave.submissions.forwarded").increment(1);
        info!(team_id = %submission.team_id, "Submission forwarded");

        Ok(SubmissionUrls {
            report_url,
            presentation_url,
        })
    }
}
