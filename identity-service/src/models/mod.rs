pub mod organization;
pub mod service;
pub mod session;
pub mod user;

pub use organization::OrganizationRecord;
pub use service::{ServiceRecord, USER_MANAGEMENT_SERVICE_ID};
pub use session::SessionRecord;
pub use user::{Role, UserRecord};
