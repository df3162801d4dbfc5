//! Validated submission payloads.
//!
//! Every constructor checks the user id before anything else, so an invalid
//! id never reaches the pipeline.

use serde_json::Value;
use time::Date;

use crate::error::Error;
use crate::http::{Body, FormPart};
use crate::types::UserId;

/// A supporting document attached to a submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    pub file_name: String,
    pub mime: String,
    pub bytes: Vec<u8>,
}

impl Document {
    #[must_use]
    pub fn new(file_name: impl Into<String>, mime: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            file_name: file_name.into(),
            mime: mime.into(),
            bytes,
        }
    }

    fn into_part(self) -> FormPart {
        FormPart::File {
            name: "document".into(),
            file_name: self.file_name,
            mime: self.mime,
            bytes: self.bytes,
        }
    }
}

/// A student's leave request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeaveRequestPayload {
    user_id: UserId,
    start_date: Date,
    end_date: Date,
    reason: String,
    description: String,
    document: Option<Document>,
}

impl LeaveRequestPayload {
    /// # Errors
    ///
    /// [`Error::InvalidUserId`] for a null, empty, zero, negative or
    /// non-numeric id; [`Error::Api`] with code 400 for an empty reason or an
    /// end date before the start date.
    pub fn new(
        user_id: &Value,
        start_date: Date,
        end_date: Date,
        reason: impl Into<String>,
    ) -> Result<Self, Error> {
        let user_id = UserId::try_from(user_id)?;
        if end_date < start_date {
            return Err(invalid("End date must not be before start date"));
        }
        Ok(Self {
            user_id,
            start_date,
            end_date,
            reason: required_reason(reason.into())?,
            description: String::new(),
            document: None,
        })
    }

    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into().trim().to_owned();
        self
    }

    #[must_use]
    pub fn with_document(mut self, document: Document) -> Self {
        self.document = Some(document);
        self
    }

    #[must_use]
    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    /// Multipart body as the leave endpoint expects it.
    #[must_use]
    pub fn into_body(self) -> Body {
        let mut parts = vec![
            text("user_id", self.user_id.to_string()),
            text("start_date", api_date(self.start_date)),
            text("end_date", api_date(self.end_date)),
            text("reason", self.reason),
            text("description", self.description),
        ];
        parts.extend(self.document.map(Document::into_part));
        Body::Multipart(parts)
    }
}

/// An attendance appeal against one class session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppealPayload {
    user_id: UserId,
    session_id: u64,
    reason: String,
    description: String,
    document: Option<Document>,
}

impl AppealPayload {
    /// # Errors
    ///
    /// [`Error::InvalidUserId`] for an invalid id; [`Error::Api`] with code
    /// 400 for a zero session id or an empty reason.
    pub fn new(user_id: &Value, session_id: u64, reason: impl Into<String>) -> Result<Self, Error> {
        let user_id = UserId::try_from(user_id)?;
        if session_id == 0 {
            return Err(invalid("A class session is required"));
        }
        Ok(Self {
            user_id,
            session_id,
            reason: required_reason(reason.into())?,
            description: String::new(),
            document: None,
        })
    }

    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into().trim().to_owned();
        self
    }

    #[must_use]
    pub fn with_document(mut self, document: Document) -> Self {
        self.document = Some(document);
        self
    }

    #[must_use]
    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    #[must_use]
    pub fn into_body(self) -> Body {
        let mut parts = vec![
            text("user_id", self.user_id.to_string()),
            text("session_id", self.session_id.to_string()),
            text("reason", self.reason),
            text("description", self.description),
        ];
        parts.extend(self.document.map(Document::into_part));
        Body::Multipart(parts)
    }
}

fn required_reason(reason: String) -> Result<String, Error> {
    let reason = reason.trim();
    if reason.is_empty() {
        return Err(invalid("Please choose a reason"));
    }
    Ok(reason.to_owned())
}

fn invalid(message: &str) -> Error {
    Error::Api {
        code: 400,
        message: message.to_owned(),
    }
}

fn text(name: &str, value: String) -> FormPart {
    FormPart::Text {
        name: name.to_owned(),
        value,
    }
}

/// `YYYY-MM-DD`.
fn api_date(date: Date) -> String {
    format!(
        "{:04}-{:02}-{:02}",
        date.year(),
        u8::from(date.month()),
        date.day()
    )
}
