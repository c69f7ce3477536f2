use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::directory::Directory;
use crate::error::{Error, Result};
use crate::models::user::{Role, User};

/// In-memory directory for tests and local runs.
#[derive(Default)]
pub struct MemoryDirectory {
    users: RwLock<Vec<User>>,
}

impl MemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds a pre-built account, bypassing registration.
    pub async fn insert(&self, user: User) {
        self.users.write().await.push(user);
    }
}

#[async_trait]
impl Directory for MemoryDirectory {
    async fn find_user(&self, id: Uuid) -> Result<Option<User>> {
        let users = self.users.read().await;
        Ok(users.iter().find(|u| u.id == id).cloned())
    }

    async fn find_by_external(&self, external_id: &str) -> Result<Option<User>> {
        let users = self.users.read().await;
        Ok(users.iter().find(|u| u.external_id == external_id).cloned())
    }

    async fn create_user(
        &self,
        external_id: &str,
        email: &str,
        display_name: &str,
        role: Role,
    ) -> Result<User> {
        let now = Utc::now();
        let user = User {
            id: Uuid::new_v4(),
            external_id: external_id.to_string(),
            email: email.to_string(),
            display_name: display_name.to_string(),
            role,
            assigned_doctor: None,
            is_active: true,
            last_login: None,
            created_at: now,
            updated_at: now,
        };
        self.users.write().await.push(user.clone());
        Ok(user)
    }

    async fn update_display_name(&self, user_id: Uuid, display_name: &str) -> Result<User> {
        let mut users = self.users.write().await;
        let user = users
            .iter_mut()
            .find(|u| u.id == user_id)
            .ok_or_else(|| Error::NotFound("User not found".to_string()))?;
        user.display_name = display_name.to_string();
        user.updated_at = Utc::now();
        Ok(user.clone())
    }

    async fn list_doctors(&self) -> Result<Vec<User>> {
        let users = self.users.read().await;
        let mut doctors: Vec<User> = users
            .iter()
            .filter(|u| u.role == Role::Doctor && u.is_active)
            .cloned()
            .collect();
        doctors.sort_by(|a, b| a.display_name.cmp(&b.display_name));
        Ok(doctors)
    }

    async fn assigned_patients(&self, doctor_id: Uuid) -> Result<Vec<User>> {
        let users = self.users.read().await;
        let mut patients: Vec<User> = users
            .iter()
            .filter(|u| {
                u.role == Role::Patient && u.assigned_doctor == Some(doctor_id) && u.is_active
            })
            .cloned()
            .collect();
        patients.sort_by(|a, b| a.display_name.cmp(&b.display_name));
        Ok(patients)
    }

    async fn assigned_doctor(&self, patient_id: Uuid) -> Result<Option<User>> {
        let users = self.users.read().await;
        let doctor_id = users
            .iter()
            .find(|u| u.id == patient_id)
            .and_then(|u| u.assigned_doctor);
        Ok(doctor_id.and_then(|id| {
            users
                .iter()
                .find(|u| u.id == id && u.is_active)
                .cloned()
        }))
    }

    async fn unassigned_patients(&self) -> Result<Vec<User>> {
        let users = self.users.read().await;
        let mut patients: Vec<User> = users
            .iter()
            .filter(|u| u.role == Role::Patient && u.assigned_doctor.is_none() && u.is_active)
            .cloned()
            .collect();
        patients.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(patients)
    }

    async fn list_all(&self, role: Option<Role>, search: Option<&str>) -> Result<Vec<User>> {
        let users = self.users.read().await;
        let needle = search.map(|s| s.to_lowercase());
        let mut matching: Vec<User> = users
            .iter()
            .filter(|u| u.is_active)
            .filter(|u| role.map_or(true, |r| u.role == r))
            .filter(|u| {
                needle.as_ref().map_or(true, |n| {
                    u.display_name.to_lowercase().contains(n)
                        || u.email.to_lowercase().contains(n)
                })
            })
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(matching)
    }

    async fn set_role(&self, user_id: Uuid, role: Role) -> Result<User> {
        let mut users = self.users.write().await;
        let user = users
            .iter_mut()
            .find(|u| u.id == user_id)
            .ok_or_else(|| Error::NotFound("User not found".to_string()))?;
        user.role = role;
        user.updated_at = Utc::now();
        Ok(user.clone())
    }

    async fn assign_doctor(&self, patient_id: Uuid, doctor_id: Uuid) -> Result<User> {
        let mut users = self.users.write().await;
        let patient = users
            .iter_mut()
            .find(|u| u.id == patient_id)
            .ok_or_else(|| Error::NotFound("Patient not found".to_string()))?;
        patient.assigned_doctor = Some(doctor_id);
        patient.updated_at = Utc::now();
        Ok(patient.clone())
    }

    async fn deactivate(&self, user_id: Uuid) -> Result<User> {
        let mut users = self.users.write().await;
        let user = users
            .iter_mut()
            .find(|u| u.id == user_id)
            .ok_or_else(|| Error::NotFound("User not found".to_string()))?;
        user.is_active = false;
        user.updated_at = Utc::now();
        Ok(user.clone())
    }

    async fn record_login(&self, user_id: Uuid) -> Result<()> {
        let mut users = self.users.write().await;
        if let Some(user) = users.iter_mut().find(|u| u.id == user_id) {
            user.last_login = Some(Utc::now());
        }
        Ok(())
    }
}
