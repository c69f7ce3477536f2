use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::directory::Directory;
use crate::error::{Error, Result};
use crate::models::user::{Role, User};

#[derive(Clone)]
pub struct PgDirectory {
    pool: PgPool,
}

impl PgDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Directory for PgDirectory {
    async fn find_user(&self, id: Uuid) -> Result<Option<User>> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    async fn find_by_external(&self, external_id: &str) -> Result<Option<User>> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE external_id = $1")
            .bind(external_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    async fn create_user(
        &self,
        external_id: &str,
        email: &str,
        display_name: &str,
        role: Role,
    ) -> Result<User> {
        let user = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (external_id, email, display_name, role)
            VALUES ($1, $2, $3, $4)
            RETURNING *
            "#,
        )
        .bind(external_id)
        .bind(email)
        .bind(display_name)
        .bind(role)
        .fetch_one(&self.pool)
        .await?;
        Ok(user)
    }

    async fn update_display_name(&self, user_id: Uuid, display_name: &str) -> Result<User> {
        let user = sqlx::query_as::<_, User>(
            r#"
            UPDATE users SET display_name = $2, updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(user_id)
        .bind(display_name)
        .fetch_optional(&self.pool)
        .await?;
        user.ok_or_else(|| Error::NotFound("User not found".to_string()))
    }

    async fn list_doctors(&self) -> Result<Vec<User>> {
        let doctors = sqlx::query_as::<_, User>(
            r#"
            SELECT * FROM users
            WHERE role = 'doctor' AND is_active = TRUE
            ORDER BY display_name
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(doctors)
    }

    async fn assigned_patients(&self, doctor_id: Uuid) -> Result<Vec<User>> {
        let patients = sqlx::query_as::<_, User>(
            r#"
            SELECT * FROM users
            WHERE assigned_doctor = $1 AND role = 'patient' AND is_active = TRUE
            ORDER BY display_name
            "#,
        )
        .bind(doctor_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(patients)
    }

    async fn assigned_doctor(&self, patient_id: Uuid) -> Result<Option<User>> {
        let doctor = sqlx::query_as::<_, User>(
            r#"
            SELECT d.* FROM users d
            JOIN users p ON p.assigned_doctor = d.id
            WHERE p.id = $1 AND d.is_active = TRUE
            "#,
        )
        .bind(patient_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(doctor)
    }

    async fn unassigned_patients(&self) -> Result<Vec<User>> {
        let patients = sqlx::query_as::<_, User>(
            r#"
            SELECT * FROM users
            WHERE role = 'patient' AND assigned_doctor IS NULL AND is_active = TRUE
            ORDER BY created_at DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(patients)
    }

    async fn list_all(&self, role: Option<Role>, search: Option<&str>) -> Result<Vec<User>> {
        let users = sqlx::query_as::<_, User>(
            r#"
            SELECT * FROM users
            WHERE is_active = TRUE
              AND ($1::user_role IS NULL OR role = $1)
              AND ($2::text IS NULL
                   OR display_name ILIKE '%' || $2 || '%'
                   OR email ILIKE '%' || $2 || '%')
            ORDER BY created_at DESC
            "#,
        )
        .bind(role)
        .bind(search)
        .fetch_all(&self.pool)
        .await?;
        Ok(users)
    }

    async fn set_role(&self, user_id: Uuid, role: Role) -> Result<User> {
        let user = sqlx::query_as::<_, User>(
            r#"
            UPDATE users SET role = $2, updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(user_id)
        .bind(role)
        .fetch_optional(&self.pool)
        .await?;
        user.ok_or_else(|| Error::NotFound("User not found".to_string()))
    }

    async fn assign_doctor(&self, patient_id: Uuid, doctor_id: Uuid) -> Result<User> {
        let patient = sqlx::query_as::<_, User>(
            r#"
            UPDATE users SET assigned_doctor = $2, updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(patient_id)
        .bind(doctor_id)
        .fetch_optional(&self.pool)
        .await?;
        patient.ok_or_else(|| Error::NotFound("Patient not found".to_string()))
    }

    async fn deactivate(&self, user_id: Uuid) -> Result<User> {
        let user = sqlx::query_as::<_, User>(
            r#"
            UPDATE users SET is_active = FALSE, updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        user.ok_or_else(|| Error::NotFound("User not found".to_string()))
    }

    async fn record_login(&self, user_id: Uuid) -> Result<()> {
        sqlx::query("UPDATE users SET last_login = NOW() WHERE id = $1")
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
