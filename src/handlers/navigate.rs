use super::Services;
use crate::error::FsError;
use crate::protocol::{Response, Status};
use crate::session::{SessionId, WorkingDirectory};

/// Changes the session's working directory and answers with the new path.
pub async fn cd(svc: &Services, id: SessionId, arg: &str) -> Response {
    let Some(cwd) = svc.cwd_of(id) else {
        return Response::empty(Status::Forbidden);
    };

    let target = match cwd.resolve(arg).await {
        Ok(target) => target,
        Err(e) => {
            tracing::info!(session = %id, "CD failed: {}", e);
            return Response::empty(e.status());
        }
    };

    let shown = target.display_path();
    let updated = svc.registry.with_session(id, |session| {
        if let Some(identity) = session.identity.as_mut() {
            identity.cwd = target;
        }
    });
    if updated.is_none() {
        return Response::empty(Status::InternalError);
    }

    tracing::debug!(session = %id, cwd = %shown, "changed directory");
    Response::message(Status::Ok, shown)
}

/// Lists the non-hidden entries of a directory, directories suffixed with `/`.
pub async fn ls(svc: &Services, id: SessionId, arg: &str) -> Response {
    let Some(cwd) = svc.cwd_of(id) else {
        return Response::empty(Status::Forbidden);
    };

    match list(&cwd, arg).await {
        Ok(lines) => Response::lines(Status::Ok, lines),
        Err(e) => {
            tracing::info!(session = %id, "LS failed: {}", e);
            Response::empty(e.status())
        }
    }
}

/// Reads the whole listing up front so its length is known before anything is sent.
async fn list(cwd: &WorkingDirectory, arg: &str) -> Result<Vec<String>, FsError> {
    let target = cwd.resolve(arg).await?;
    let shown = target.display_path();

    let mut dir = tokio::fs::read_dir(target.real_path())
        .await
        .map_err(|e| FsError::from_io(shown.clone(), e))?;

    let mut entries = Vec::new();
    while let Some(entry) = dir
        .next_entry()
        .await
        .map_err(|e| FsError::from_io(shown.clone(), e))?
    {
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.starts_with('.') {
            continue;
        }
        let is_dir = entry
            .file_type()
            .await
            .map(|kind| kind.is_dir())
            .unwrap_or(false);
        entries.push((name, is_dir));
    }

    entries.sort();
    Ok(entries
        .into_iter()
        .map(|(name, is_dir)| format!("{}{}\r\n", name, if is_dir { "/" } else { "" }))
        .collect())
}
