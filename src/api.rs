use crate::config::ApiConfig;
use crate::error::ApiError;
use crate::stats;
use crate::store::{team_id_for, NewRegistration, Registration, RegistrationStore, TeamMember};
use crate::submission::{
    self, DocumentForwarder, FinalistSubmission, SubmissionUrls, UploadedDocument,
};
use axum::extract::multipart::{Field, Multipart};
use axum::extract::{DefaultBodyLimit, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{instrument, warn};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<RegistrationStore>,
    pub forwarder: Arc<DocumentForwarder>,
    /// Per-file upload cap enforced before any upstream call
    pub max_upload_bytes: usize,
}

const MISSING_FIELDS: &str = "Missing required fields";
const MISSING_MEMBER_FIELDS: &str =
    "All team members must have name, email, phone, and year of study";

/// Incoming registration payload, validated by hand so that empty strings
/// fail the same way missing fields do
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    #[serde(default)]
    pub team_name: Option<String>,
    /// Team contact email
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub university: Option<String>,
    #[serde(default)]
    pub members: Option<Vec<MemberInput>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberInput {
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub year_of_study: Option<String>,
    #[serde(default)]
    pub ieee_number: Option<String>,
    #[serde(default)]
    pub kaggle_id: Option<String>,
}

impl RegisterRequest {
    /// Eager boundary validation; nothing is persisted and the counter does
    /// not move until this passes
    pub fn validate(self) -> Result<NewRegistration, ApiError> {
        let team_name = require(self.team_name, MISSING_FIELDS)?;
        let contact_email = require(self.email, MISSING_FIELDS)?;
        let university = require(self.university, MISSING_FIELDS)?;

        let members = self
            .members
            .ok_or_else(|| ApiError::Validation(MISSING_FIELDS.to_string()))?;
        if members.is_empty() {
            return Err(ApiError::Validation(
                "At least one team member is required".to_string(),
            ));
        }

        let members = members
            .into_iter()
            .map(MemberInput::validate)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(NewRegistration {
            team_name,
            university,
            contact_email,
            members,
        })
    }
}

impl MemberInput {
    fn validate(self) -> Result<TeamMember, ApiError> {
        Ok(TeamMember {
            full_name: require(self.full_name, MISSING_MEMBER_FIELDS)?,
            email: require(self.email, MISSING_MEMBER_FIELDS)?,
            phone: require(self.phone, MISSING_MEMBER_FIELDS)?,
            year_of_study: require(self.year_of_study, MISSING_MEMBER_FIELDS)?,
            ieee_number: normalize_optional(self.ieee_number),
            kaggle_id: normalize_optional(self.kaggle_id),
        })
    }
}

fn require(field: Option<String>, message: &str) -> Result<String, ApiError> {
    match field {
        Some(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(ApiError::Validation(message.to_string())),
    }
}

fn normalize_optional(field: Option<String>) -> Option<String> {
    field.filter(|value| !value.trim().is_empty())
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterResponse {
    pub success: bool,
    pub team_id: String,
    pub message: String,
    pub data: RegisteredTeamSummary,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisteredTeamSummary {
    pub team_name: String,
    pub university: String,
    pub member_count: usize,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationQuery {
    pub team_id: Option<String>,
    pub email: Option<String>,
}

#[derive(Debug, Serialize)]
struct RegistrationEnvelope {
    registration: Registration,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct EmailLookupResponse {
    exists: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    team_id: Option<String>,
}

#[derive(Debug, Serialize)]
struct RegistrationList {
    registrations: Vec<Registration>,
    count: usize,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CounterStatus {
    current_counter: u64,
    next_team_id: String,
}

#[derive(Debug, Deserialize)]
pub struct CounterUpdate {
    #[serde(default)]
    pub action: Option<String>,
    #[serde(default)]
    pub value: Option<serde_json::Value>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CounterUpdated {
    message: String,
    next_team_id: String,
}

#[derive(Debug, Deserialize)]
pub struct AdminQuery {
    pub action: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ExportResponse {
    registrations: Vec<Registration>,
    exported_at: String,
    total_count: usize,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SubmitResponse {
    success: bool,
    message: String,
    report_url: String,
    presentation_url: String,
}

/// Create the API router
pub fn create_router(state: AppState, config: &ApiConfig) -> Router {
    let cors = if config.cors_enabled {
        if config.cors_origins.is_empty() {
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any)
        } else {
            let origins: Vec<_> = config
                .cors_origins
                .iter()
                .filter_map(|origin| origin.parse().ok())
                .collect();
            CorsLayer::new()
                .allow_origin(origins)
                .allow_methods(Any)
                .allow_headers(Any)
        }
    } else {
        CorsLayer::new()
    };

    // Room for both uploads plus multipart framing
    let body_limit = state.max_upload_bytes * 2 + 1024 * 1024;

    Router::new()
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        .route("/api/register", post(register_team).get(lookup_registrations))
        .route("/api/team-counter", get(counter_status).post(update_counter))
        .route("/api/admin", get(admin_report))
        .route("/api/submit", post(submit_documents))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Health check endpoint
async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "octwave-api"
    }))
}

/// Readiness check endpoint
async fn readiness_check(State(state): State<AppState>) -> impl IntoResponse {
    match state.store.ping().await {
        Ok(()) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "status": "ready",
                "store": "connected"
            })),
        ),
        Err(err) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(serde_json::json!({
                "status": "not_ready",
                "store": "disconnected",
                "error": err.to_string()
            })),
        ),
    }
}

/// Register a team and allocate its id
#[instrument(skip(state, request))]
async fn register_team(
    State(state): State<AppState>,
    Json(request): Json<RegisterRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let submission = request.validate()?;
    let registration = state.store.create_registration(submission).await?;

    let response = RegisterResponse {
        success: true,
        team_id: registration.id,
        message: "Registration successful!".to_string(),
        data: RegisteredTeamSummary {
            team_name: registration.team_name,
            university: registration.university,
            member_count: registration.members.len(),
        },
    };

    Ok((StatusCode::CREATED, Json(response)))
}

/// Look up registrations by team id, by email, or list all
#[instrument(skip(state))]
async fn lookup_registrations(
    State(state): State<AppState>,
    Query(params): Query<RegistrationQuery>,
) -> Result<Response, ApiError> {
    if let Some(team_id) = params.team_id {
        let registration = state
            .store
            .registration(&team_id)
            .await?
            .ok_or_else(|| ApiError::NotFound("Registration not found".to_string()))?;
        return Ok(Json(RegistrationEnvelope { registration }).into_response());
    }

    if let Some(email) = params.email {
        let team_id = state.store.find_team_by_email(&email).await?;
        return Ok(Json(EmailLookupResponse {
            exists: team_id.is_some(),
            team_id,
        })
        .into_response());
    }

    let registrations = state.store.list_registrations().await?;
    Ok(Json(RegistrationList {
        count: registrations.len(),
        registrations,
    })
    .into_response())
}

/// Current counter value and the id that would be issued next
async fn counter_status(State(state): State<AppState>) -> Result<Json<CounterStatus>, ApiError> {
    let current = state.store.counter().await?;
    Ok(Json(CounterStatus {
        current_counter: current,
        next_team_id: team_id_for(current + 1),
    }))
}

/// Administrative counter reset/set
#[instrument(skip(state, update))]
async fn update_counter(
    State(state): State<AppState>,
    Json(update): Json<CounterUpdate>,
) -> Result<Json<CounterUpdated>, ApiError> {
    match update.action.as_deref() {
        Some("reset") => {
            let existing = state.store.registration_count().await?;
            if existing > 0 {
                warn!(
                    existing,
                    "Counter reset with registrations present, new ids will rely on the collision fallback"
                );
            }
            state.store.set_counter(0).await?;
            Ok(Json(CounterUpdated {
                message: "Counter reset to 0".to_string(),
                next_team_id: team_id_for(1),
            }))
        }
        Some("set") => {
            let value = update
                .value
                .as_ref()
                .and_then(serde_json::Value::as_u64)
                .ok_or_else(|| {
                    ApiError::Validation("Value must be a non-negative number".to_string())
                })?;
            state.store.set_counter(value).await?;
            Ok(Json(CounterUpdated {
                message: format!("Counter set to {}", value),
                next_team_id: team_id_for(value + 1),
            }))
        }
        _ => Err(ApiError::Validation(
            "Invalid action. Use \"reset\" or \"set\"".to_string(),
        )),
    }
}

/// Admin listing and aggregate views
#[instrument(skip(state))]
async fn admin_report(
    State(state): State<AppState>,
    Query(query): Query<AdminQuery>,
) -> Result<Response, ApiError> {
    match query.action.as_deref() {
        Some("stats") => {
            let registrations = state.store.list_registrations().await?;
            Ok(Json(serde_json::json!({
                "stats": stats::compute_stats(&registrations)
            }))
            .into_response())
        }
        Some("universities") => {
            let registrations = state.store.list_registrations().await?;
            Ok(Json(serde_json::json!({
                "universityData": stats::university_breakdown(&registrations)
            }))
            .into_response())
        }
        Some("export-all") => {
            let mut registrations = state.store.list_registrations().await?;
            registrations
                .sort_by_key(|registration| std::cmp::Reverse(registration_millis(registration)));
            Ok(Json(ExportResponse {
                total_count: registrations.len(),
                exported_at: Utc::now().to_rfc3339(),
                registrations,
            })
            .into_response())
        }
        _ => Err(ApiError::Validation("Invalid action".to_string())),
    }
}

fn registration_millis(registration: &Registration) -> i64 {
    DateTime::parse_from_rfc3339(&registration.registration_date)
        .map(|parsed| parsed.timestamp_millis())
        .unwrap_or(0)
}

/// Validate a finalist upload and relay it to document storage
#[instrument(skip(state, multipart))]
async fn submit_documents(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<SubmitResponse>, ApiError> {
    let submission = parse_submission(multipart, state.max_upload_bytes).await?;
    let SubmissionUrls {
        report_url,
        presentation_url,
    } = state.forwarder.forward(&submission).await?;

    Ok(Json(SubmitResponse {
        success: true,
        message: "Submission successful".to_string(),
        report_url,
        presentation_url,
    }))
}

/// Extract and validate the submission form; everything here runs before
/// any upstream network call
async fn parse_submission(
    mut multipart: Multipart,
    max_bytes: usize,
) -> Result<FinalistSubmission, ApiError> {
    let mut team_id = None;
    let mut team_name = None;
    let mut leader_email = None;
    let mut leader_mobile = None;
    let mut report = None;
    let mut presentation = None;

    while let Some(field) = multipart.next_field().await.map_err(|err| {
        ApiError::Validation(format!("Malformed multipart payload: {}", err))
    })? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "teamId" => team_id = read_text(field).await?,
            "teamName" => team_name = read_text(field).await?,
            "leaderEmail" => leader_email = read_text(field).await?,
            "leaderMobile" => leader_mobile = read_text(field).await?,
            "reportFile" => report = Some(read_document(field).await?),
            "presentationFile" => presentation = Some(read_document(field).await?),
            _ => {}
        }
    }

    let (
        Some(team_id),
        Some(team_name),
        Some(leader_email),
        Some(leader_mobile),
        Some(report),
        Some(presentation),
    ) = (
        team_id,
        team_name,
        leader_email,
        leader_mobile,
        report,
        presentation,
    )
    else {
        return Err(ApiError::Validation("All fields are required".to_string()));
    };

    submission::validate_report(&report, max_bytes)?;
    submission::validate_presentation(&presentation, max_bytes)?;

    Ok(FinalistSubmission {
        team_id,
        team_name,
        leader_email,
        leader_mobile,
        report,
        presentation,
    })
}

async fn read_text(field: Field<'_>) -> Result<Option<String>, ApiError> {
    let value = field
        .text()
        .await
        .map_err(|err| ApiError::Validation(format!("Malformed multipart payload: {}", err)))?;
    Ok(Some(value).filter(|value| !value.trim().is_empty()))
}

async fn read_document(field: Field<'_>) -> Result<UploadedDocument, ApiError> {
    let name = field.file_name().unwrap_or_default().to_string();
    let mime_type = field.content_type().unwrap_or_default().to_string();
    let data = field
        .bytes()
        .await
        .map_err(|err| ApiError::Validation(format!("Failed to read uploaded file: {}", err)))?
        .to_vec();

    Ok(UploadedDocument {
        name,
        mime_type,
        data,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn member_input(full_name: &str) -> MemberInput {
        MemberInput {
            full_name: Some(full_name.to_string()),
            email: Some("a@x.com".to_string()),
            phone: Some("0711234567".to_string()),
            year_of_study: Some("2nd Year".to_string()),
            ieee_number: None,
            kaggle_id: None,
        }
    }

    fn valid_request() -> RegisterRequest {
        RegisterRequest {
            team_name: Some("Alpha".to_string()),
            email: Some("lead@x.com".to_string()),
            university: Some("U1".to_string()),
            members: Some(vec![member_input("A")]),
        }
    }

    #[test]
    fn test_valid_request_passes() {
        let registration = valid_request().validate().unwrap();
        assert_eq!(registration.team_name, "Alpha");
        assert_eq!(registration.contact_email, "lead@x.com");
        assert_eq!(registration.members.len(), 1);
    }

    #[test]
    fn test_missing_top_level_field_rejected() {
        for strip in 0..3 {
            let mut request = valid_request();
            match strip {
                0 => request.team_name = None,
                1 => request.email = Some("   ".to_string()),
                2 => request.university = None,
                _ => unreachable!(),
            }
            let err = request.validate().unwrap_err();
            assert!(matches!(err, ApiError::Validation(ref msg) if msg == MISSING_FIELDS));
        }
    }

    #[test]
    fn test_members_must_be_present_and_non_empty() {
        let mut request = valid_request();
        request.members = None;
        assert!(matches!(
            request.validate().unwrap_err(),
            ApiError::Validation(ref msg) if msg == MISSING_FIELDS
        ));

        let mut request = valid_request();
        request.members = Some(vec![]);
        assert!(matches!(
            request.validate().unwrap_err(),
            ApiError::Validation(ref msg) if msg == "At least one team member is required"
        ));
    }

    #[test]
    fn test_member_missing_field_rejected() {
        let mut member = member_input("A");
        member.phone = Some(String::new());

        let mut request = valid_request();
        request.members = Some(vec![member]);

        let err = request.validate().unwrap_err();
        assert!(matches!(err, ApiError::Validation(ref msg) if msg == MISSING_MEMBER_FIELDS));
    }

    #[test]
    fn test_blank_optionals_are_dropped() {
        let mut member = member_input("A");
        member.ieee_number = Some("   ".to_string());
        member.kaggle_id = Some("alpha_k".to_string());

        let mut request = valid_request();
        request.members = Some(vec![member]);

        let registration = request.validate().unwrap();
        assert!(registration.members[0].ieee_number.is_none());
        assert_eq!(registration.members[0].kaggle_id.as_deref(), Some("alpha_k"));
    }

    #[test]
    fn test_more_than_four_members_accepted() {
        // The 4-member cap is enforced by the form, not the persistence path
        let mut request = valid_request();
        request.members = Some((0..6).map(|i| member_input(&format!("M{}", i))).collect());

        assert_eq!(request.validate().unwrap().members.len(), 6);
    }

    #[test]
    fn test_register_request_accepts_camel_case_payload() {
        let request: RegisterRequest = serde_json::from_str(
            r#"{
                "teamName": "Alpha",
                "email": "lead@x.com",
                "university": "U1",
                "members": [{
                    "fullName": "A",
                    "email": "a@x.com",
                    "phone": "0711234567",
                    "yearOfStudy": "2nd Year"
                }]
            }"#,
        )
        .unwrap();

        let registration = request.validate().unwrap();
        assert_eq!(registration.members[0].full_name, "A");
        assert_eq!(registration.members[0].year_of_study, "2nd Year");
    }

    #[test]
    fn test_counter_update_value_parsing() {
        let update: CounterUpdate =
            serde_json::from_str(r#"{"action":"set","value":12}"#).unwrap();
        assert_eq!(
            update.value.as_ref().and_then(serde_json::Value::as_u64),
            Some(12)
        );

        // Negative and fractional values are rejected by the handler
        let update: CounterUpdate =
            serde_json::from_str(r#"{"action":"set","value":-3}"#).unwrap();
        assert_eq!(update.value.as_ref().and_then(serde_json::Value::as_u64), None);

        let update: CounterUpdate =
            serde_json::from_str(r#"{"action":"set","value":1.5}"#).unwrap();
        assert_eq!(update.value.as_ref().and_then(serde_json::Value::as_u64), None);
    }

    #[test]
    fn test_export_sort_key_handles_bad_dates() {
        let registration = Registration {
            id: "OW_1".to_string(),
            team_name: "Alpha".to_string(),
            university: "U1".to_string(),
            contact_email: "lead@x.com".to_string(),
            members: vec![],
            registration_date: "not a date".to_string(),
            status: "registered".to_string(),
        };
        assert_eq!(registration_millis(&registration), 0);
    }
}
