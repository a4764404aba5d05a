//! Data models for the portal backend.
//!
//! - `User`, `RoleInfo`: accounts and role administration
//! - `PregnancyRecord`, `RiskAssessment`: pregnancy tracking
//! - `MediaItem`, `MediaPage`: the media gallery
//! - `ProfileUpdate` and `merge_json`: settings and profile edits

pub mod media;
pub mod pregnancy;
pub mod settings;
pub mod user;

pub use media::{GalleryQuery, MediaItem, MediaPage};
pub use pregnancy::{
    PregnancyRecord, PregnancyRecordInput, RiskAssessment, RiskAssessmentRequest, RiskLevel,
};
pub use settings::{merge_json, ProfileUpdate};
pub use user::{LoginRequest, LoginResponse, RoleAssignment, RoleInfo, User};
