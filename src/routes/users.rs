use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json},
    Extension,
};
use serde_json::json;
use uuid::Uuid;
use validator::Validate;

use crate::{
    auth::{Claims, Identity},
    dto::user_dto::{
        AssignDoctorPayload, AssignedDoctorResponse, RegisterPayload, RoleUpdatePayload,
        UpdateProfilePayload, UserListQuery,
    },
    error::{Error, Result},
    models::user::{Role, User},
    AppState,
};

/// Creates the directory entry for the authenticated credential. Registering
/// twice returns the existing profile unchanged.
pub async fn register(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<RegisterPayload>,
) -> Result<impl IntoResponse> {
    payload.validate()?;

    if let Some(user) = state.directory.find_by_external(&claims.sub).await? {
        return Ok((
            StatusCode::OK,
            Json(json!({ "message": "User already registered", "user": user })),
        ));
    }

    let display_name = payload
        .display_name
        .filter(|name| !name.trim().is_empty())
        .unwrap_or_else(|| {
            claims
                .email
                .split('@')
                .next()
                .unwrap_or_default()
                .to_string()
        });
    let role = payload.role.unwrap_or(Role::Patient);

    let user = state
        .directory
        .create_user(&claims.sub, &claims.email, &display_name, role)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({ "message": "User registered successfully", "user": user })),
    ))
}

pub async fn me(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<User>> {
    let user = state
        .directory
        .find_by_external(&claims.sub)
        .await?
        .ok_or_else(|| Error::NotFound("User profile not found".to_string()))?;
    Ok(Json(user))
}

/// Display name is the only field a user may change about themselves.
pub async fn update_me(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<UpdateProfilePayload>,
) -> Result<Json<User>> {
    payload.validate()?;

    let user = state
        .directory
        .find_by_external(&claims.sub)
        .await?
        .ok_or_else(|| Error::NotFound("User not found".to_string()))?;
    let updated = state
        .directory
        .update_display_name(user.id, &payload.display_name)
        .await?;
    Ok(Json(updated))
}

pub async fn assigned_doctor(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
) -> Result<Json<AssignedDoctorResponse>> {
    if identity.role != Role::Patient {
        return Err(Error::BadRequest(
            "Only patients can have assigned doctors".to_string(),
        ));
    }

    let doctor = state
        .directory
        .assigned_doctor(identity.user_id)
        .await?
        .ok_or_else(|| Error::NotFound("No doctor assigned yet".to_string()))?;

    let name = doctor.visible_name().to_string();
    Ok(Json(AssignedDoctorResponse {
        id: doctor.id,
        name,
        email: doctor.email,
    }))
}

pub async fn doctors(State(state): State<AppState>) -> Result<Json<Vec<User>>> {
    let doctors = state.directory.list_doctors().await?;
    Ok(Json(doctors))
}

/// The caller's own assigned patients; an admin with none assigned gets an
/// empty list.
pub async fn patients(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
) -> Result<Json<Vec<User>>> {
    let patients = state.directory.assigned_patients(identity.user_id).await?;
    Ok(Json(patients))
}

pub async fn unassigned_patients(State(state): State<AppState>) -> Result<Json<Vec<User>>> {
    let patients = state.directory.unassigned_patients().await?;
    Ok(Json(patients))
}

pub async fn all_users(
    State(state): State<AppState>,
    Query(query): Query<UserListQuery>,
) -> Result<Json<Vec<User>>> {
    // An unknown role value drops the filter rather than erroring.
    let role = query.role.as_deref().and_then(|r| r.parse::<Role>().ok());
    let users = state
        .directory
        .list_all(role, query.search.as_deref())
        .await?;
    Ok(Json(users))
}

pub async fn set_role(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
    Json(payload): Json<RoleUpdatePayload>,
) -> Result<impl IntoResponse> {
    let Ok(role) = payload.role.parse::<Role>() else {
        return Err(Error::BadRequest("Invalid role".to_string()));
    };

    let user = state.directory.set_role(user_id, role).await?;
    Ok(Json(
        json!({ "message": "User role updated successfully", "user": user }),
    ))
}

/// Points a patient at a doctor, replacing any previous assignment. The
/// doctor side may also be an admin account.
pub async fn assign_doctor(
    State(state): State<AppState>,
    Json(payload): Json<AssignDoctorPayload>,
) -> Result<impl IntoResponse> {
    let (Some(patient_id), Some(doctor_id)) = (payload.patient_id, payload.doctor_id) else {
        return Err(Error::BadRequest(
            "patientId and doctorId are required".to_string(),
        ));
    };
    let patient_id = Uuid::parse_str(&patient_id)
        .map_err(|_| Error::NotFound("Patient not found".to_string()))?;
    let doctor_id = Uuid::parse_str(&doctor_id)
        .map_err(|_| Error::NotFound("Doctor not found".to_string()))?;

    let patient = state
        .directory
        .find_user(patient_id)
        .await?
        .filter(|u| u.role == Role::Patient)
        .ok_or_else(|| Error::NotFound("Patient not found".to_string()))?;
    let doctor = state
        .directory
        .find_user(doctor_id)
        .await?
        .filter(|u| matches!(u.role, Role::Doctor | Role::Admin))
        .ok_or_else(|| Error::NotFound("Doctor not found".to_string()))?;

    let patient = state.directory.assign_doctor(patient.id, doctor.id).await?;
    Ok(Json(json!({
        "message": "Doctor assigned successfully",
        "patient": patient,
        "doctor": doctor
    })))
}

pub async fn deactivate(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    let user = state.directory.deactivate(user_id).await?;
    Ok(Json(
        json!({ "message": "User deactivated successfully", "user": user }),
    ))
}
