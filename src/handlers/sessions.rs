use super::{Services, KILL_SELF};
use crate::protocol::{Response, Status};
use crate::session::SessionId;

/// Lists every authenticated session followed by a total count.
pub fn who(svc: &Services) -> Response {
    let mut lines = vec!["ID\tUNAME\tMODE\tCWD\n".to_string()];
    let total = svc.registry.find_all(
        |session| session.is_authenticated(),
        |session| {
            if let Some(identity) = &session.identity {
                lines.push(format!(
                    "{}\t{}\t{}\t{}\n",
                    session.id,
                    identity.username,
                    identity.privilege.as_digit(),
                    identity.cwd.display_path()
                ));
            }
        },
    );
    lines.push(format!("TOTAL: {}\n", total));
    Response::lines(Status::Ok, lines)
}

/// What a KILL argument refers to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KillTarget {
    Id(SessionId),
    Username(String),
}

impl KillTarget {
    /// All-digit arguments name a session id, anything else a username.
    pub fn parse(arg: &str) -> Option<KillTarget> {
        if !arg.is_empty() && arg.bytes().all(|b| b.is_ascii_digit()) {
            arg.parse().ok().map(|id| KillTarget::Id(SessionId(id)))
        } else {
            Some(KillTarget::Username(arg.to_string()))
        }
    }
}

/// Destroys the session(s) named by `arg`. Never the caller's own.
pub async fn kill(svc: &Services, id: SessionId, arg: &str) -> Response {
    let own_name = svc.username_of(id);

    let removed = match KillTarget::parse(arg) {
        None => 0,
        Some(KillTarget::Id(target)) if target == id => {
            return Response::message(Status::Forbidden, KILL_SELF);
        }
        Some(KillTarget::Username(name)) if own_name.as_deref() == Some(name.as_str()) => {
            return Response::message(Status::Forbidden, KILL_SELF);
        }
        Some(KillTarget::Id(target)) => {
            usize::from(svc.registry.delete_first_if(|s| s.id == target).await.is_some())
        }
        Some(KillTarget::Username(name)) => {
            svc.registry
                .delete_all_if(|s| s.username() == Some(name.as_str()))
                .await
        }
    };

    if removed == 0 {
        tracing::info!(session = %id, target = arg, "KILL found no session");
        return Response::empty(Status::NotFound);
    }
    tracing::info!(session = %id, target = arg, removed, "killed");
    Response::empty(Status::Ok)
}

/// Accepts LOGOUT only for the caller's own username.
///
/// The transport sends the reply before it tears the session down.
pub fn logout(svc: &Services, id: SessionId, arg: &str) -> Response {
    match svc.username_of(id) {
        Some(name) if name == arg => {
            tracing::info!(session = %id, user = %name, "logout");
            Response::empty(Status::Ok)
        }
        _ => Response::empty(Status::BadRequest),
    }
}
