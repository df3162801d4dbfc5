use std::fmt;
use std::sync::Arc;

use serde_json::Value;
use time::Date;

use crate::error::Error;
use crate::http::{ApiRequest, HttpClient, Payload, Transport, parse_body};

use super::payload::{AppealPayload, LeaveRequestPayload};

/// Default path prefix of the admin CRUD endpoints.
pub const ADMIN_PREFIX: &str = "/admin/crud";

const APPLY_LEAVE_PATH: &str = "/apply-leaves/";
const APPLY_APPEAL_PATH: &str = "/apply-appeals/";

/// Backend collections exposed through the CRUD endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Resource {
    Users,
    Students,
    Lecturers,
    Admins,
    Semesters,
    Modules,
    Sessions,
    Attendance,
    Notifications,
    News,
    Events,
    Leaves,
    Appeals,
}

impl Resource {
    pub const ALL: [Self; 13] = [
        Self::Users,
        Self::Students,
        Self::Lecturers,
        Self::Admins,
        Self::Semesters,
        Self::Modules,
        Self::Sessions,
        Self::Attendance,
        Self::Notifications,
        Self::News,
        Self::Events,
        Self::Leaves,
        Self::Appeals,
    ];

    #[must_use]
    pub fn segment(self) -> &'static str {
        match self {
            Self::Users => "users",
            Self::Students => "students",
            Self::Lecturers => "lecturers",
            Self::Admins => "admins",
            Self::Semesters => "semesters",
            Self::Modules => "modules",
            Self::Sessions => "sessions",
            Self::Attendance => "attendance",
            Self::Notifications => "notifications",
            Self::News => "news",
            Self::Events => "events",
            Self::Leaves => "leaves",
            Self::Appeals => "appeals",
        }
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.segment())
    }
}

/// `list/get/add/update/delete` over `/{prefix}/{resource}/[{id}/]`.
pub struct ResourceClient<T> {
    http: Arc<HttpClient<T>>,
    prefix: String,
}

// Manual Clone: avoid derive adding a `T: Clone` bound.
impl<T> Clone for ResourceClient<T> {
    fn clone(&self) -> Self {
        Self {
            http: self.http.clone(),
            prefix: self.prefix.clone(),
        }
    }
}

impl<T: Transport> ResourceClient<T> {
    #[must_use]
    pub fn new(http: Arc<HttpClient<T>>) -> Self {
        Self {
            http,
            prefix: ADMIN_PREFIX.into(),
        }
    }

    #[must_use]
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into().trim_end_matches('/').to_owned();
        self
    }

    #[must_use]
    pub fn collection_path(&self, resource: Resource) -> String {
        format!("{}/{resource}/", self.prefix)
    }

    #[must_use]
    pub fn item_path(&self, resource: Resource, id: impl fmt::Display) -> String {
        format!("{}/{resource}/{id}/", self.prefix)
    }

    /// # Errors
    ///
    /// Any pipeline error.
    pub async fn list(&self, resource: Resource, query: Option<Value>) -> Result<Value, Error> {
        let mut request = ApiRequest::get(self.collection_path(resource));
        if let Some(query) = query {
            request = request.params(query);
        }
        self.json(request).await
    }

    /// # Errors
    ///
    /// Any pipeline error.
    pub async fn get(&self, resource: Resource, id: impl fmt::Display) -> Result<Value, Error> {
        self.json(ApiRequest::get(self.item_path(resource, id))).await
    }

    /// # Errors
    ///
    /// Any pipeline error, including a duplicate-submission rejection.
    pub async fn add(&self, resource: Resource, data: &Value) -> Result<Value, Error> {
        let request = ApiRequest::post(self.collection_path(resource)).json(data)?;
        self.json(request).await
    }

    /// Partial update (`PATCH`).
    ///
    /// # Errors
    ///
    /// Any pipeline error.
    pub async fn update(
        &self,
        resource: Resource,
        id: impl fmt::Display,
        partial: &Value,
    ) -> Result<Value, Error> {
        let request = ApiRequest::patch(self.item_path(resource, id)).json(partial)?;
        self.json(request).await
    }

    /// # Errors
    ///
    /// Any pipeline error.
    pub async fn delete(&self, resource: Resource, id: impl fmt::Display) -> Result<Value, Error> {
        self.json(ApiRequest::delete(self.item_path(resource, id))).await
    }

    /// Leave request on behalf of the signed-in user.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidUserId`] when the session has no user id, or any
    /// validation error of [`LeaveRequestPayload::new`].
    pub fn leave_request(
        &self,
        start_date: Date,
        end_date: Date,
        reason: impl Into<String>,
    ) -> Result<LeaveRequestPayload, Error> {
        LeaveRequestPayload::new(&self.session_user_id(), start_date, end_date, reason)
    }

    /// Appeal on behalf of the signed-in user.
    ///
    /// # Errors
    ///
    /// As [`leave_request`](Self::leave_request).
    pub fn appeal(&self, session_id: u64, reason: impl Into<String>) -> Result<AppealPayload, Error> {
        AppealPayload::new(&self.session_user_id(), session_id, reason)
    }

    /// # Errors
    ///
    /// Any pipeline error.
    pub async fn submit_leave(&self, payload: LeaveRequestPayload) -> Result<Value, Error> {
        tracing::debug!(user_id = %payload.user_id(), "Submitting leave request");
        self.json(ApiRequest::post(APPLY_LEAVE_PATH).body(payload.into_body()))
            .await
    }

    /// # Errors
    ///
    /// Any pipeline error.
    pub async fn submit_appeal(&self, payload: AppealPayload) -> Result<Value, Error> {
        tracing::debug!(user_id = %payload.user_id(), "Submitting appeal");
        self.json(ApiRequest::post(APPLY_APPEAL_PATH).body(payload.into_body()))
            .await
    }

    fn session_user_id(&self) -> Value {
        self.http
            .session()
            .user_id()
            .map_or(Value::Null, |id| Value::from(id.get()))
    }

    async fn json(&self, request: ApiRequest) -> Result<Value, Error> {
        Ok(match self.http.send(request).await? {
            Payload::Json(value) => value,
            Payload::Binary(bytes) => parse_body(&bytes),
        })
    }
}
