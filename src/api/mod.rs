//! Typed access to the backend's CRUD collections and submission endpoints.

mod payload;
mod resources;

pub use payload::{AppealPayload, Document, LeaveRequestPayload};
pub use resources::{ADMIN_PREFIX, Resource, ResourceClient};
