use std::sync::Arc;

use axum::{
    extract::{Multipart, Path, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use chrono::Utc;
use serde_json::{json, Value};
use tokio::sync::Mutex;

use crate::{
    auth::{require_admin, AdminUser},
    error::{AppError, AppResult},
    repository::property_store::{load_property, PgPropertyStore, PROPERTIES_TABLE},
    schemas::{
        validate_input, FieldUpdateInput, RemoveGalleryImageInput, SetKindInput,
        StartWizardInput, WizardIndexPath, WizardPath,
    },
    services::{
        asset_reconciliation::PendingFile,
        audit::write_audit_log,
        property_config::PropertyKind,
        storage::{AssetStorage, UnconfiguredStorage},
        submission::submit_property,
        wizard::{WizardFlow, WizardState},
    },
    state::{AppState, WizardSession},
};

type SessionHandle = Arc<Mutex<WizardSession>>;

pub fn router() -> axum::Router<AppState> {
    axum::Router::new()
        .route("/admin/wizard", axum::routing::post(start_wizard))
        .route(
            "/admin/wizard/{session_id}",
            axum::routing::get(get_wizard).delete(discard_wizard),
        )
        .route(
            "/admin/wizard/{session_id}/kind",
            axum::routing::post(set_kind),
        )
        .route(
            "/admin/wizard/{session_id}/draft",
            axum::routing::patch(update_draft),
        )
        .route(
            "/admin/wizard/{session_id}/next",
            axum::routing::post(next_step),
        )
        .route(
            "/admin/wizard/{session_id}/prev",
            axum::routing::post(prev_step),
        )
        .route(
            "/admin/wizard/{session_id}/configs",
            axum::routing::post(append_config),
        )
        .route(
            "/admin/wizard/{session_id}/configs/{index}",
            axum::routing::patch(update_config).delete(remove_config),
        )
        .route(
            "/admin/wizard/{session_id}/configs/{index}/brochure",
            axum::routing::post(stage_building_brochure),
        )
        .route(
            "/admin/wizard/{session_id}/assets/cover",
            axum::routing::post(stage_cover),
        )
        .route(
            "/admin/wizard/{session_id}/assets/gallery",
            axum::routing::post(stage_gallery_image).delete(remove_gallery_image),
        )
        .route(
            "/admin/wizard/{session_id}/assets/gallery/pending/{index}",
            axum::routing::delete(unstage_gallery_image),
        )
        .route(
            "/admin/wizard/{session_id}/assets/brochure",
            axum::routing::post(stage_brochure),
        )
        .route(
            "/admin/wizard/{session_id}/submit",
            axum::routing::post(submit_wizard),
        )
}

async fn start_wizard(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Option<Json<StartWizardInput>>,
) -> AppResult<impl IntoResponse> {
    let admin = require_admin(&state, &headers).await?;
    let payload = payload.map(|Json(payload)| payload).unwrap_or_default();
    validate_input(&payload)?;

    let wizard = match payload.property_id.as_deref().map(str::trim) {
        Some(property_id) if !property_id.is_empty() => {
            let pool = db_pool(&state)?;
            WizardState::for_edit(load_property(pool, property_id).await?)
        }
        _ => WizardState::for_create(),
    };

    let session_id = uuid::Uuid::new_v4().to_string();
    let view = json!(wizard.view());
    state
        .wizard_sessions
        .insert(
            session_id.clone(),
            Arc::new(Mutex::new(WizardSession {
                owner_user_id: admin.user_id.clone(),
                wizard,
            })),
        )
        .await;

    tracing::info!(
        session_id = %session_id,
        user_id = %admin.user_id,
        property_id = payload.property_id.as_deref().unwrap_or_default(),
        "Wizard session started"
    );
    Ok((
        StatusCode::CREATED,
        Json(json!({ "session_id": session_id, "wizard": view })),
    ))
}

async fn get_wizard(
    State(state): State<AppState>,
    Path(path): Path<WizardPath>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    let admin = require_admin(&state, &headers).await?;
    let handle = session_handle(&state, &path.session_id, &admin).await?;
    let session = handle.lock().await;
    Ok(Json(wizard_response(&path.session_id, &session.wizard)))
}

async fn discard_wizard(
    State(state): State<AppState>,
    Path(path): Path<WizardPath>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    let admin = require_admin(&state, &headers).await?;
    let handle = session_handle(&state, &path.session_id, &admin).await?;
    if handle.lock().await.wizard.is_saving() {
        return Err(AppError::Conflict(
            "This property is already being saved.".to_string(),
        ));
    }
    state.wizard_sessions.invalidate(&path.session_id).await;
    tracing::info!(session_id = %path.session_id, "Wizard session discarded");
    Ok(Json(json!({ "ok": true })))
}

async fn set_kind(
    State(state): State<AppState>,
    Path(path): Path<WizardPath>,
    headers: HeaderMap,
    Json(payload): Json<SetKindInput>,
) -> AppResult<Json<Value>> {
    validate_input(&payload)?;
    let kind = PropertyKind::parse(&payload.kind).ok_or_else(|| {
        AppError::UnprocessableEntity(format!("Unknown property kind '{}'.", payload.kind))
    })?;
    edit_session(&state, &headers, &path.session_id, |wizard| {
        wizard.set_kind(kind)?;
        Ok(())
    })
    .await
}

async fn update_draft(
    State(state): State<AppState>,
    Path(path): Path<WizardPath>,
    headers: HeaderMap,
    Json(payload): Json<FieldUpdateInput>,
) -> AppResult<Json<Value>> {
    validate_input(&payload)?;
    edit_session(&state, &headers, &path.session_id, |wizard| {
        wizard.update_field(payload.field.trim(), &payload.value)?;
        Ok(())
    })
    .await
}

async fn next_step(
    State(state): State<AppState>,
    Path(path): Path<WizardPath>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    edit_session(&state, &headers, &path.session_id, |wizard| {
        wizard.next()?;
        Ok(())
    })
    .await
}

async fn prev_step(
    State(state): State<AppState>,
    Path(path): Path<WizardPath>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    edit_session(&state, &headers, &path.session_id, |wizard| {
        wizard.prev();
        Ok(())
    })
    .await
}

async fn append_config(
    State(state): State<AppState>,
    Path(path): Path<WizardPath>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    edit_session(&state, &headers, &path.session_id, |wizard| {
        let number = wizard.append_sub_unit();
        tracing::debug!(number, "Sub-unit appended");
        Ok(())
    })
    .await
}

async fn remove_config(
    State(state): State<AppState>,
    Path(path): Path<WizardIndexPath>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    edit_session(&state, &headers, &path.session_id, |wizard| {
        wizard.remove_sub_unit(path.index)?;
        Ok(())
    })
    .await
}

async fn update_config(
    State(state): State<AppState>,
    Path(path): Path<WizardIndexPath>,
    headers: HeaderMap,
    Json(payload): Json<FieldUpdateInput>,
) -> AppResult<Json<Value>> {
    validate_input(&payload)?;
    edit_session(&state, &headers, &path.session_id, |wizard| {
        wizard.update_sub_unit(path.index, payload.field.trim(), &payload.value)?;
        Ok(())
    })
    .await
}

async fn stage_cover(
    State(state): State<AppState>,
    Path(path): Path<WizardPath>,
    headers: HeaderMap,
    multipart: Multipart,
) -> AppResult<Json<Value>> {
    let file = read_pending_file(multipart).await?;
    edit_session(&state, &headers, &path.session_id, |wizard| {
        wizard.stage_cover(file)?;
        Ok(())
    })
    .await
}

async fn stage_gallery_image(
    State(state): State<AppState>,
    Path(path): Path<WizardPath>,
    headers: HeaderMap,
    multipart: Multipart,
) -> AppResult<Json<Value>> {
    let file = read_pending_file(multipart).await?;
    edit_session(&state, &headers, &path.session_id, |wizard| {
        wizard.stage_gallery_image(file)?;
        Ok(())
    })
    .await
}

async fn remove_gallery_image(
    State(state): State<AppState>,
    Path(path): Path<WizardPath>,
    headers: HeaderMap,
    Json(payload): Json<RemoveGalleryImageInput>,
) -> AppResult<Json<Value>> {
    validate_input(&payload)?;
    edit_session(&state, &headers, &path.session_id, |wizard| {
        wizard.remove_gallery_image(payload.url.trim())?;
        Ok(())
    })
    .await
}

async fn unstage_gallery_image(
    State(state): State<AppState>,
    Path(path): Path<WizardIndexPath>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    edit_session(&state, &headers, &path.session_id, |wizard| {
        wizard.unstage_gallery_image(path.index)?;
        Ok(())
    })
    .await
}

async fn stage_brochure(
    State(state): State<AppState>,
    Path(path): Path<WizardPath>,
    headers: HeaderMap,
    multipart: Multipart,
) -> AppResult<Json<Value>> {
    let file = read_pending_file(multipart).await?;
    edit_session(&state, &headers, &path.session_id, |wizard| {
        wizard.stage_brochure(file)?;
        Ok(())
    })
    .await
}

async fn stage_building_brochure(
    State(state): State<AppState>,
    Path(path): Path<WizardIndexPath>,
    headers: HeaderMap,
    multipart: Multipart,
) -> AppResult<Json<Value>> {
    let file = read_pending_file(multipart).await?;
    edit_session(&state, &headers, &path.session_id, |wizard| {
        wizard.stage_building_brochure(path.index, file)?;
        Ok(())
    })
    .await
}

async fn submit_wizard(
    State(state): State<AppState>,
    Path(path): Path<WizardPath>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    let admin = require_admin(&state, &headers).await?;
    let pool = db_pool(&state)?.clone();
    let handle = session_handle(&state, &path.session_id, &admin).await?;

    // The lock is held only to flip the saving flag, so a second submit on
    // the same session sees it and is rejected instead of queueing.
    let (flow, record, assets) = {
        let mut session = handle.lock().await;
        let (record, assets) = session.wizard.begin_submit()?;
        (session.wizard.flow(), record, assets)
    };
    let guard = SavingGuard::new(handle);

    let storage: Arc<dyn AssetStorage> = match state.asset_storage.clone() {
        Some(storage) => storage,
        None if assets.pending_upload_count() > 0 => {
            guard.release().await;
            return Err(AppError::ServiceUnavailable(
                "File storage is not configured. Set STORAGE_BUCKET.".to_string(),
            ));
        }
        None => Arc::new(UnconfiguredStorage),
    };

    // Runs detached so a request timeout or a dropped connection cannot
    // interrupt the sequence halfway or strand the saving flag.
    let session_id = path.session_id.clone();
    let task = tokio::spawn(async move {
        let store = PgPropertyStore::new(pool);
        let before_state = match flow {
            WizardFlow::Create => None,
            WizardFlow::Edit => serde_json::to_value(&record).ok(),
        };
        let result = submit_property(
            storage.as_ref(),
            &store,
            flow,
            record,
            &assets,
            Utc::now().timestamp_millis(),
        )
        .await;
        guard.release().await;
        let outcome = result?;

        let action = match flow {
            WizardFlow::Create => "create",
            WizardFlow::Edit => "update",
        };
        write_audit_log(
            state.db_pool.as_ref(),
            Some(&admin.user_id),
            action,
            PROPERTIES_TABLE,
            Some(&outcome.property_id),
            before_state,
            Some(outcome.property.clone()),
        )
        .await;
        state.public_listings_cache.clear().await;
        state.wizard_sessions.invalidate(&session_id).await;
        Ok::<_, AppError>(outcome)
    });

    let outcome = task.await.map_err(|error| {
        tracing::error!(session_id = %path.session_id, error = %error, "Submit task failed");
        AppError::Internal("Submit did not complete.".to_string())
    })??;
    Ok(Json(json!(outcome)))
}

/// Holds a session's saving flag for one submit. Dropping it without
/// `release` still clears the flag.
struct SavingGuard {
    handle: Option<SessionHandle>,
}

impl SavingGuard {
    fn new(handle: SessionHandle) -> Self {
        Self {
            handle: Some(handle),
        }
    }

    async fn release(mut self) {
        if let Some(handle) = self.handle.take() {
            handle.lock().await.wizard.finish_submit();
        }
    }
}

impl Drop for SavingGuard {
    fn drop(&mut self) {
        let Some(handle) = self.handle.take() else {
            return;
        };
        tracing::warn!("Submit abandoned before completion, clearing saving flag");
        if let Ok(mut session) = handle.try_lock() {
            session.wizard.finish_submit();
            return;
        }
        tokio::spawn(async move {
            handle.lock().await.wizard.finish_submit();
        });
    }
}

/// Applies one draft mutation under the session lock and returns the new view.
/// Mutations are refused while a submit is running.
async fn edit_session<F>(
    state: &AppState,
    headers: &HeaderMap,
    session_id: &str,
    mutate: F,
) -> AppResult<Json<Value>>
where
    F: FnOnce(&mut WizardState) -> AppResult<()>,
{
    let admin = require_admin(state, headers).await?;
    let handle = session_handle(state, session_id, &admin).await?;
    let mut session = handle.lock().await;
    if session.wizard.is_saving() {
        return Err(AppError::Conflict(
            "This property is already being saved.".to_string(),
        ));
    }
    mutate(&mut session.wizard)?;
    Ok(Json(wizard_response(session_id, &session.wizard)))
}

async fn session_handle(
    state: &AppState,
    session_id: &str,
    admin: &AdminUser,
) -> AppResult<SessionHandle> {
    let handle = state
        .wizard_sessions
        .get(session_id)
        .await
        .ok_or_else(|| AppError::NotFound("Wizard session not found or expired.".to_string()))?;
    if handle.lock().await.owner_user_id != admin.user_id {
        return Err(AppError::Forbidden(
            "This wizard session belongs to another admin.".to_string(),
        ));
    }
    Ok(handle)
}

fn wizard_response(session_id: &str, wizard: &WizardState) -> Value {
    json!({ "session_id": session_id, "wizard": wizard.view() })
}

/// First file part of a multipart body.
async fn read_pending_file(mut multipart: Multipart) -> AppResult<PendingFile> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|error| AppError::BadRequest(format!("Invalid multipart body: {error}")))?
    {
        let Some(file_name) = field.file_name().map(ToOwned::to_owned) else {
            continue;
        };
        let content_type = field
            .content_type()
            .map(ToOwned::to_owned)
            .unwrap_or_else(|| "application/octet-stream".to_string());
        let bytes = field
            .bytes()
            .await
            .map_err(|error| AppError::BadRequest(format!("Could not read upload: {error}")))?;
        tracing::debug!(file_name = %file_name, size = bytes.len(), "File staged from upload");
        return Ok(PendingFile {
            file_name,
            content_type,
            bytes,
        });
    }
    Err(AppError::BadRequest(
        "Multipart body has no file part.".to_string(),
    ))
}

fn db_pool(state: &AppState) -> AppResult<&sqlx::PgPool> {
    state.db_pool.as_ref().ok_or_else(|| {
        AppError::Dependency("Database is not configured. Set DATABASE_URL.".to_string())
    })
}

#[cfg(test)]
mod tests {
    use super::SavingGuard;
    use crate::{
        services::{
            property_config::{PropertyKind, PropertyRecord},
            wizard::WizardState,
        },
        state::WizardSession,
    };
    use serde_json::json;
    use std::{sync::Arc, time::Duration};
    use tokio::sync::Mutex;

    fn saving_session() -> Arc<Mutex<WizardSession>> {
        let mut record = PropertyRecord::new(PropertyKind::Apartment);
        record.id = Some("p1".to_string());
        let mut wizard = WizardState::for_edit(record);
        wizard.update_field("name", &json!("Godrej Sora")).expect("name");
        wizard.update_field("location", &json!("Sector 53")).expect("location");
        while wizard.next().is_ok() {}
        wizard.begin_submit().expect("submit starts");
        assert!(wizard.is_saving());
        Arc::new(Mutex::new(WizardSession {
            owner_user_id: "u1".to_string(),
            wizard,
        }))
    }

    #[tokio::test]
    async fn abandoned_submit_clears_saving_flag() {
        let handle = saving_session();
        let guard = SavingGuard::new(handle.clone());
        let submit = async move {
            let _guard = guard;
            std::future::pending::<()>().await;
        };

        let timed_out = tokio::time::timeout(Duration::from_millis(10), submit).await;
        assert!(timed_out.is_err());
        assert!(!handle.lock().await.wizard.is_saving());
    }

    #[tokio::test]
    async fn released_guard_clears_saving_flag() {
        let handle = saving_session();
        SavingGuard::new(handle.clone()).release().await;
        assert!(!handle.lock().await.wizard.is_saving());
    }
}
