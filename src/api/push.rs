//! Relay ingress: the hosted side of the push relay protocol.
//!
//! Callers are installations authenticated by the relay auth middleware. Ids
//! arrive already namespaced by the calling installation and are stored as is.

use axum::{extract::State, http::StatusCode, Extension, Json};

use crate::auth::InstallationCaller;
use crate::device::{DeviceKey, PushRegistrationService, Registration};
use crate::error::{AppError, Result};
use crate::notification::{Audience, DeliveryResult, PushNotification};
use crate::relay::{
    InstallationPrefix, PushDeviceRequest, PushRegistrationRequest, PushSendRequest,
    PushUpdateRequest,
};
use crate::server::AppState;

fn authorize(state: &AppState, caller: &InstallationCaller) -> Result<InstallationPrefix> {
    state.gate.check_inbound(Some(caller.installation_id))?;
    Ok(InstallationPrefix::new(caller.installation_id))
}

fn device_keys(prefix: &InstallationPrefix, devices: &[PushDeviceRequest]) -> Result<Vec<DeviceKey>> {
    devices
        .iter()
        .map(|device| {
            prefix.verify(&device.id, "id")?;
            Ok(device.key())
        })
        .collect()
}

/// POST /push/register
pub async fn register(
    State(state): State<AppState>,
    Extension(caller): Extension<InstallationCaller>,
    Json(request): Json<PushRegistrationRequest>,
) -> Result<StatusCode> {
    let prefix = authorize(&state, &caller)?;

    let installation_id = caller.installation_id.to_string();
    if let Some(claimed) = request.installation_id.as_deref() {
        if claimed != installation_id {
            return Err(AppError::Validation(
                "installationId does not match the authenticated installation".to_string(),
            ));
        }
    }

    let registration = Registration {
        push_token: request.push_token,
        device_id: prefix.verify(&request.device_id, "deviceId")?.to_string(),
        user_id: prefix.verify(&request.user_id, "userId")?.to_string(),
        identifier: prefix.verify_opt(request.identifier.as_deref(), "identifier")?,
        device_type: request.device_type,
        installation_id: Some(installation_id),
        organization_ids: request
            .organization_ids
            .iter()
            .map(|id| prefix.verify(id, "organizationIds").map(str::to_string))
            .collect::<Result<Vec<_>>>()?,
    };

    state
        .directory
        .create_or_update_registration(registration)
        .await?;
    Ok(StatusCode::OK)
}

/// POST /push/delete
pub async fn delete_registration(
    State(state): State<AppState>,
    Extension(caller): Extension<InstallationCaller>,
    Json(request): Json<PushDeviceRequest>,
) -> Result<StatusCode> {
    let prefix = authorize(&state, &caller)?;
    prefix.verify(&request.id, "id")?;

    state.directory.delete_registration(&request.key()).await?;
    Ok(StatusCode::OK)
}

/// PUT /push/add-organization
pub async fn add_organization(
    State(state): State<AppState>,
    Extension(caller): Extension<InstallationCaller>,
    Json(request): Json<PushUpdateRequest>,
) -> Result<StatusCode> {
    let prefix = authorize(&state, &caller)?;
    let keys = device_keys(&prefix, &request.devices)?;
    let organization_id = prefix.verify(&request.organization_id, "organizationId")?;

    state
        .directory
        .add_user_registration_organization(&keys, organization_id)
        .await?;
    Ok(StatusCode::OK)
}

/// PUT /push/delete-organization
pub async fn delete_organization(
    State(state): State<AppState>,
    Extension(caller): Extension<InstallationCaller>,
    Json(request): Json<PushUpdateRequest>,
) -> Result<StatusCode> {
    let prefix = authorize(&state, &caller)?;
    let keys = device_keys(&prefix, &request.devices)?;
    let organization_id = prefix.verify(&request.organization_id, "organizationId")?;

    state
        .directory
        .delete_user_registration_organization(&keys, organization_id)
        .await?;
    Ok(StatusCode::OK)
}

/// POST /push/send
///
/// `global` wins over `userId`, which wins over `organizationId`. A global
/// push only reaches devices registered by the calling installation. A request
/// naming no audience is accepted and delivers nothing.
pub async fn send(
    State(state): State<AppState>,
    Extension(caller): Extension<InstallationCaller>,
    Json(request): Json<PushSendRequest>,
) -> Result<Json<DeliveryResult>> {
    let prefix = authorize(&state, &caller)?;

    let user_id = prefix.verify_opt(request.user_id.as_deref(), "userId")?;
    let organization_id = prefix.verify_opt(request.organization_id.as_deref(), "organizationId")?;
    let audience = if request.global {
        Audience::Installation(caller.installation_id.to_string())
    } else if let Some(user_id) = user_id {
        Audience::User(user_id)
    } else if let Some(organization_id) = organization_id {
        Audience::Organization(organization_id)
    } else {
        tracing::debug!(installation_id = %caller.installation_id, "Relay push without audience");
        return Ok(Json(DeliveryResult::default()));
    };

    let mut notification = PushNotification::new(request.push_type, request.payload);
    if let Some(identifier) = prefix.verify_opt(request.identifier.as_deref(), "identifier")? {
        notification = notification.identifier(identifier);
    }
    if let Some(device_id) = prefix.verify_opt(request.device_id.as_deref(), "deviceId")? {
        notification = notification.exclude_device(device_id);
    }
    if let Some(client_type) = request.client_type {
        notification = notification.client_type(client_type);
    }

    let result = state.dispatcher.dispatch(audience, notification).await?;
    Ok(Json(result))
}
