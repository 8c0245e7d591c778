pub mod community;
pub mod document;
pub mod identity;
pub mod incident;
pub mod meeting;
pub mod notice;

pub use community::Community;
pub use document::{to_fields, Collection, Document, ListQuery, Record, SortKey};
pub use identity::{Identity, Principal, Profile, Role};
pub use incident::{Incident, IncidentStatus};
pub use meeting::Meeting;
pub use notice::{Post, ServiceContact};
