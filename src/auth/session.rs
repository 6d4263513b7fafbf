use actix_web::{FromRequest, HttpMessage, HttpRequest, dev::Payload, error::ErrorUnauthorized};
use futures::future::{Ready, ready};

use super::jwt::Claims;
use crate::attendance::AttendanceError;
use crate::model::role::Role;

/// Authenticated caller, placed in request extensions by `auth_middleware`.
#[derive(Debug, Clone, PartialEq)]
pub enum Session {
    /// A user linked to an employee record.
    Employee {
        user_id: u64,
        username: String,
        role: Role,
        employee_id: u64,
    },
    /// A user with no employee record (admins, service accounts).
    Account {
        user_id: u64,
        username: String,
        role: Role,
    },
}

impl Session {
    pub fn from_claims(claims: Claims) -> Option<Self> {
        let role = Role::from_id(claims.role)?;
        Some(match claims.employee_id {
            Some(employee_id) => Session::Employee {
                user_id: claims.user_id,
                username: claims.sub,
                role,
                employee_id,
            },
            None => Session::Account {
                user_id: claims.user_id,
                username: claims.sub,
                role,
            },
        })
    }

    pub fn role(&self) -> Role {
        match self {
            Session::Employee { role, .. } | Session::Account { role, .. } => *role,
        }
    }

    pub fn user_id(&self) -> u64 {
        match self {
            Session::Employee { user_id, .. } | Session::Account { user_id, .. } => *user_id,
        }
    }

    pub fn username(&self) -> &str {
        match self {
            Session::Employee { username, .. } | Session::Account { username, .. } => username,
        }
    }

    /// The caller's own employee id.
    pub fn employee_id(&self) -> Result<u64, AttendanceError> {
        match self {
            Session::Employee { employee_id, .. } => Ok(*employee_id),
            Session::Account { .. } => Err(AttendanceError::NoEmployeeProfile),
        }
    }

    pub fn require_manager(&self) -> Result<(), AttendanceError> {
        if self.role().can_manage_attendance() {
            Ok(())
        } else {
            Err(AttendanceError::Forbidden("HR/Admin only".to_string()))
        }
    }

    /// Narrows a requested employee filter to what the caller may read.
    /// Readers of all attendance keep their filter; everyone else is pinned
    /// to their own id.
    pub fn scope_employee(&self, requested: Option<u64>) -> Result<Option<u64>, AttendanceError> {
        if self.role().can_read_all_attendance() {
            return Ok(requested);
        }
        let own = self.employee_id()?;
        match requested {
            Some(id) if id != own => Err(AttendanceError::Forbidden(
                "employees may only read their own attendance".to_string(),
            )),
            _ => Ok(Some(own)),
        }
    }
}

impl FromRequest for Session {
    type Error = actix_web::Error;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        ready(
            req.extensions()
                .get::<Session>()
                .cloned()
                .ok_or_else(|| ErrorUnauthorized("Missing session")),
        )
    }
}
