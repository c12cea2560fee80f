//! Request dispatcher.
//!
//! Gates each request on the caller's privilege and routes it to a handler.
//! A session moves from unauthenticated to authenticated on AUTH and ends on
//! LOGOUT; AUTH is accepted in every state, KILL needs super privilege and
//! everything else needs any privilege at all.

use crate::handlers::{auth, navigate, sessions, Services};
use crate::protocol::{Method, Request, Response, Status};
use crate::session::{Privilege, SessionId};

/// Result of dispatching one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome {
    pub response: Response,
    /// The session asked to end; reply first, then tear it down.
    pub logout: bool,
}

impl Outcome {
    fn reply(response: Response) -> Self {
        Self {
            response,
            logout: false,
        }
    }
}

/// Lowest privilege allowed to invoke `method`.
pub fn required_privilege(method: Method) -> Privilege {
    match method {
        Method::Auth => Privilege::None,
        Method::Kill => Privilege::Super,
        Method::Ls | Method::Cd | Method::Who | Method::Logout => Privilege::Regular,
    }
}

#[derive(Debug, Clone)]
pub struct Dispatcher {
    services: Services,
}

impl Dispatcher {
    pub fn new(services: Services) -> Self {
        Self { services }
    }

    pub fn services(&self) -> &Services {
        &self.services
    }

    pub async fn dispatch(&self, id: SessionId, request: &Request) -> Outcome {
        let privilege = self
            .services
            .registry
            .with_session(id, |session| session.privilege());
        let Some(privilege) = privilege else {
            tracing::warn!(session = %id, "request from a session that is gone");
            return Outcome::reply(Response::empty(Status::InternalError));
        };

        if privilege < required_privilege(request.method) {
            tracing::info!(
                session = %id,
                method = %request.method,
                privilege = %privilege,
                "request forbidden"
            );
            return Outcome::reply(Response::empty(Status::Forbidden));
        }

        tracing::debug!(session = %id, method = %request.method, path = %request.path, "dispatch");
        let svc = &self.services;
        let arg = request.path.as_str();
        match request.method {
            Method::Auth => Outcome::reply(auth::auth(svc, id, arg).await),
            Method::Cd => Outcome::reply(navigate::cd(svc, id, arg).await),
            Method::Ls => Outcome::reply(navigate::ls(svc, id, arg).await),
            Method::Who => Outcome::reply(sessions::who(svc)),
            Method::Kill => Outcome::reply(sessions::kill(svc, id, arg).await),
            Method::Logout => {
                let response = sessions::logout(svc, id, arg);
                let logout = response.status == Status::Ok;
                Outcome { response, logout }
            }
        }
    }
}

#[cfg(test)]
#[path = "tests/dispatcher_tests.rs"]
mod tests;
