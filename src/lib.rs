//! OctWave Registration API
//!
//! Backend service for the OctWave 2.0 competition platform. It owns team
//! registration with monotonic `OW_<N>` identifier allocation, counter
//! administration, listing/statistics for the organizer dashboard, and the
//! finalist submission flow that relays report/presentation uploads to an
//! external document-storage endpoint.
//!
//! ## Features
//!
//! - **Atomic id allocation**: team ids derive from a Redis counter; the
//!   increment is atomic, so concurrent registrations can never collide
//! - **Single-batch persistence**: the registration record and all of its
//!   lookup indexes are written in one MULTI/EXEC pipeline
//! - **Eager validation**: malformed payloads are rejected before any side
//!   effect, including the counter increment
//! - **Upload proxying**: finalist files are validated (type, size) and
//!   base64-relayed to the storage endpoint, which returns public URLs
//!
//! ## Architecture
//!
//! ```text
//! HTTP API                      Redis                     Document storage
//! ┌───────────────┐            ┌────────────────────┐    ┌───────────────┐
//! │ /api/register │───────────▶│ team:counter       │    │ external      │
//! │ /api/team-    │            │ registration:<id>  │    │ upload        │
//! │     counter   │            │ university:<name>  │    │ endpoint      │
//! │ /api/admin    │            │ email:<addr>       │    └───────────────┘
//! └───────────────┘            │ member_email:<addr>│           ▲
//!         │                    │ registrations:all  │           │
//!         ▼                    └────────────────────┘           │
//! ┌───────────────┐                                             │
//! │ /api/submit   │─────── validate, base64-encode, POST ───────┘
//! └───────────────┘
//! ```

pub mod api;
pub mod config;
pub mod error;
pub mod stats;
pub mod store;
pub mod submission;

pub use api::{create_router, AppState};
pub use config::Config;
pub use error::{ApiError, ErrorResponse};
pub use stats::{compute_stats, university_breakdown, RegistrationStats};
pub use store::{NewRegistration, Registration, RegistrationStore, TeamMember};
pub use submission::{DocumentForwarder, FinalistSubmission, UploadedDocument};
