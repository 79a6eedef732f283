//! Request and query shapes. Responses serialize the model types directly.

use serde::{Deserialize, Deserializer, Serialize};
use ulid::Ulid;

use crate::engine::{AppointmentOverride, AppointmentUpdate, NewSessionNote};
use crate::model::{
    AppointmentFilter, AppointmentStatus, CounselorPatch, CounselorProfile, Ms, SessionNoteFilter,
    SessionNotePatch,
};

use super::error::ApiError;

fn parse_status(raw: Option<&str>) -> Result<Option<AppointmentStatus>, ApiError> {
    raw.map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.parse::<AppointmentStatus>().map_err(ApiError::bad_request))
        .transpose()
}

pub fn parse_id(raw: &str) -> Result<Ulid, ApiError> {
    Ulid::from_string(raw).map_err(|_| ApiError::bad_request(format!("invalid id: {raw}")))
}

#[derive(Debug, Deserialize)]
pub struct BookAppointmentRequest {
    pub counselor_id: Ulid,
    pub start: Ms,
    pub end: Ms,
    #[serde(default)]
    pub notes: Option<String>,
}

/// Filters shared by the student and counselor listings.
#[derive(Debug, Default, Deserialize)]
pub struct AppointmentListQuery {
    pub status: Option<String>,
    pub from: Option<Ms>,
    pub to: Option<Ms>,
}

impl AppointmentListQuery {
    pub fn into_filter(self) -> Result<AppointmentFilter, ApiError> {
        Ok(AppointmentFilter {
            status: parse_status(self.status.as_deref())?,
            from: self.from,
            to: self.to,
            ..Default::default()
        })
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct AdminAppointmentQuery {
    pub status: Option<String>,
    pub counselor_id: Option<Ulid>,
    pub student_id: Option<Ulid>,
    pub from: Option<Ms>,
    pub to: Option<Ms>,
    pub limit: Option<usize>,
}

impl AdminAppointmentQuery {
    pub fn into_filter(self) -> Result<AppointmentFilter, ApiError> {
        Ok(AppointmentFilter {
            student_id: self.student_id,
            counselor_id: self.counselor_id,
            status: parse_status(self.status.as_deref())?,
            from: self.from,
            to: self.to,
            limit: self.limit,
            ..Default::default()
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct SlotsQuery {
    pub start: Ms,
    pub end: Ms,
}

#[derive(Debug, Default, Deserialize)]
pub struct CounselorListQuery {
    pub department: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct UpcomingQuery {
    pub limit: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
pub struct AnalyticsQuery {
    pub from: Option<Ms>,
    pub to: Option<Ms>,
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateAppointmentRequest {
    pub start: Option<Ms>,
    pub end: Option<Ms>,
    pub notes: Option<String>,
}

impl From<UpdateAppointmentRequest> for AppointmentUpdate {
    fn from(req: UpdateAppointmentRequest) -> Self {
        Self {
            start: req.start,
            end: req.end,
            notes: req.notes,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct OverrideAppointmentRequest {
    pub status: Option<String>,
    pub start: Option<Ms>,
    pub end: Option<Ms>,
    pub notes: Option<String>,
}

impl OverrideAppointmentRequest {
    pub fn into_override(self) -> Result<AppointmentOverride, ApiError> {
        Ok(AppointmentOverride {
            status: parse_status(self.status.as_deref())?,
            start: self.start,
            end: self.end,
            notes: self.notes,
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateCounselorRequest {
    /// Callers that already hold a directory id pass it; otherwise one is minted.
    #[serde(default)]
    pub id: Option<Ulid>,
    pub name: String,
    #[serde(default)]
    pub office: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub departments: Vec<String>,
}

impl CreateCounselorRequest {
    pub fn into_parts(self) -> (Ulid, CounselorProfile) {
        let id = self.id.unwrap_or_else(Ulid::new);
        let profile = CounselorProfile {
            name: self.name.trim().to_owned(),
            office: self.office.filter(|o| !o.trim().is_empty()),
            phone: self.phone.filter(|p| !p.trim().is_empty()),
            departments: self.departments,
        };
        (id, profile)
    }
}

pub type UpdateCounselorRequest = CounselorPatch;

/// Present-but-null becomes `Some(None)`; absent stays `None` via `default`.
fn nullable<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

#[derive(Debug, Deserialize)]
pub struct CreateSessionNoteRequest {
    pub appointment_id: Ulid,
    pub notes: String,
    #[serde(default)]
    pub observations: Option<String>,
    #[serde(default)]
    pub recommendations: Option<String>,
    #[serde(default)]
    pub follow_up: Option<Ms>,
}

impl From<CreateSessionNoteRequest> for NewSessionNote {
    fn from(req: CreateSessionNoteRequest) -> Self {
        Self {
            appointment_id: req.appointment_id,
            notes: req.notes,
            observations: req.observations,
            recommendations: req.recommendations,
            follow_up: req.follow_up,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateSessionNoteRequest {
    pub notes: Option<String>,
    pub observations: Option<String>,
    pub recommendations: Option<String>,
    /// `null` clears the follow-up date.
    #[serde(default, deserialize_with = "nullable")]
    pub follow_up: Option<Option<Ms>>,
}

impl From<UpdateSessionNoteRequest> for SessionNotePatch {
    fn from(req: UpdateSessionNoteRequest) -> Self {
        Self {
            notes: req.notes,
            observations: req.observations,
            recommendations: req.recommendations,
            follow_up: req.follow_up,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct SessionNoteQuery {
    pub student_id: Option<Ulid>,
    pub from: Option<Ms>,
    pub to: Option<Ms>,
}

impl SessionNoteQuery {
    pub fn into_filter(self) -> Result<SessionNoteFilter, ApiError> {
        if let (Some(from), Some(to)) = (self.from, self.to)
            && from > to
        {
            return Err(ApiError::bad_request("from must not be after to"));
        }
        Ok(SessionNoteFilter {
            student_id: self.student_id,
            from: self.from,
            to: self.to,
        })
    }
}

#[derive(Debug, Serialize)]
pub struct Deleted {
    pub deleted: Ulid,
}

#[derive(Debug, Serialize)]
pub struct Health {
    pub status: &'static str,
}
