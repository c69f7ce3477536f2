use async_trait::async_trait;
use uuid::Uuid;

use crate::error::Result;
use crate::models::user::{Role, User};

/// Account directory: who exists, what role they hold, and which doctor a
/// patient is assigned to. Assignment lives on the patient row; a doctor's
/// patient set is derived from it.
#[async_trait]
pub trait Directory: Send + Sync {
    async fn find_user(&self, id: Uuid) -> Result<Option<User>>;

    async fn find_by_external(&self, external_id: &str) -> Result<Option<User>>;

    async fn create_user(
        &self,
        external_id: &str,
        email: &str,
        display_name: &str,
        role: Role,
    ) -> Result<User>;

    async fn update_display_name(&self, user_id: Uuid, display_name: &str) -> Result<User>;

    /// All active doctors, ordered by display name.
    async fn list_doctors(&self) -> Result<Vec<User>>;

    /// Active patients assigned to the given doctor.
    async fn assigned_patients(&self, doctor_id: Uuid) -> Result<Vec<User>>;

    /// The active doctor assigned to the given patient, if any.
    async fn assigned_doctor(&self, patient_id: Uuid) -> Result<Option<User>>;

    /// Active patients with no assigned doctor, newest first.
    async fn unassigned_patients(&self) -> Result<Vec<User>>;

    /// Active accounts, optionally narrowed by role and a case-insensitive
    /// name/email search, newest first.
    async fn list_all(&self, role: Option<Role>, search: Option<&str>) -> Result<Vec<User>>;

    async fn set_role(&self, user_id: Uuid, role: Role) -> Result<User>;

    /// Points the patient at the given doctor, replacing any previous
    /// assignment. Role checks happen in the calling layer.
    async fn assign_doctor(&self, patient_id: Uuid, doctor_id: Uuid) -> Result<User>;

    /// Soft delete: flips `is_active` off, never removes the row.
    async fn deactivate(&self, user_id: Uuid) -> Result<User>;

    /// Best-effort login timestamp; callers ignore the outcome.
    async fn record_login(&self, user_id: Uuid) -> Result<()>;
}

pub mod memory;
pub mod postgres;

pub use memory::MemoryDirectory;
pub use postgres::PgDirectory;
