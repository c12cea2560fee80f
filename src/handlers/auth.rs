use super::{Services, AUTH_FAILED, AUTH_GRANTED, AUTH_REPEATED};
use crate::credentials::parse_credentials;
use crate::error::AuthError;
use crate::protocol::{Response, Status};
use crate::session::{Identity, Privilege, SessionId};

/// Authenticates a session with a `login;password` argument.
///
/// Repeating AUTH on an authenticated session succeeds without changing it.
pub async fn auth(svc: &Services, id: SessionId, arg: &str) -> Response {
    match svc.registry.with_session(id, |session| session.is_authenticated()) {
        Some(true) => {
            tracing::debug!(session = %id, "repeated AUTH");
            return Response::message(Status::Ok, AUTH_REPEATED);
        }
        Some(false) => {}
        None => return Response::empty(Status::InternalError),
    }

    let (login, privilege) = match check(svc, arg).await {
        Ok(granted) => granted,
        Err(e) => {
            tracing::info!(session = %id, "AUTH failed: {}", e);
            return match &e {
                AuthError::Rejected => Response::message(e.status(), AUTH_FAILED),
                _ => Response::empty(e.status()),
            };
        }
    };

    let identity = Identity {
        username: login.to_string(),
        privilege,
        cwd: svc.root.clone(),
    };
    let bound = svc.registry.with_session(id, |session| {
        if session.identity.is_none() {
            session.identity = Some(identity);
        }
    });
    if bound.is_none() {
        return Response::empty(Status::InternalError);
    }

    tracing::info!(session = %id, user = login, privilege = %privilege, "authenticated");
    Response::message(Status::Ok, AUTH_GRANTED)
}

async fn check<'a>(svc: &Services, arg: &'a str) -> Result<(&'a str, Privilege), AuthError> {
    let (login, password) = parse_credentials(arg)?;
    let privilege = svc.credentials.lookup(login, password).await?;
    Ok((login, privilege))
}
