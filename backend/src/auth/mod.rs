use async_trait::async_trait;
use axum::{
    extract::{FromRef, FromRequestParts},
    http::{request::Parts, HeaderMap},
};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::error::AppError;
use crate::services::Actor;
use crate::AppState;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, sqlx::Type)]
#[sqlx(type_name = "app_role", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Employee,
    Manager,
    Hr,
    Admin,
}

impl Role {
    pub fn is_hr_or_admin(&self) -> bool {
        matches!(self, Role::Hr | Role::Admin)
    }

    pub fn is_admin(&self) -> bool {
        matches!(self, Role::Admin)
    }

    /// Roles that can be put on an approval stage.
    pub fn can_approve_leave(&self) -> bool {
        !matches!(self, Role::Employee)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,        // employee id
    pub company_id: Uuid, // tenant
    pub role: Role,
    pub exp: i64,
    pub iat: i64,
}

#[derive(Debug, Clone, Copy)]
pub struct AuthUser {
    pub id: Uuid,
    pub company_id: Uuid,
    pub role: Role,
}

impl AuthUser {
    pub fn actor(&self) -> Actor {
        Actor {
            id: self.id,
            company_id: self.company_id,
            role: self.role,
        }
    }

    pub fn require_hr(&self) -> Result<(), AppError> {
        if self.role.is_hr_or_admin() {
            Ok(())
        } else {
            Err(AppError::Forbidden)
        }
    }

    pub fn require_admin(&self) -> Result<(), AppError> {
        if self.role.is_admin() {
            Ok(())
        } else {
            Err(AppError::Forbidden)
        }
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    AppState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let app_state = AppState::from_ref(state);
        let token = extract_bearer_token(&parts.headers).ok_or(AppError::Unauthorized)?;

        let key = DecodingKey::from_secret(app_state.jwt_secret.as_bytes());
        let claims = decode::<Claims>(&token, &key, &Validation::new(Algorithm::HS256))
            .map_err(|e| {
                tracing::warn!("JWT decode failed: {}", e);
                AppError::Unauthorized
            })?
            .claims;

        // The directory is authoritative for activity and role, not the token.
        let employee = app_state
            .stores
            .directory
            .employee(claims.sub)
            .await
            .map_err(|e| AppError::Internal(anyhow::anyhow!("Auth directory check failed: {}", e)))?
            .filter(|e| e.is_active && e.company_id == claims.company_id)
            .ok_or(AppError::Unauthorized)?;

        Ok(AuthUser {
            id: employee.id,
            company_id: employee.company_id,
            role: employee.role,
        })
    }
}

fn extract_bearer_token(headers: &HeaderMap) -> Option<String> {
    let auth = headers.get("Authorization")?.to_str().ok()?;
    let token = auth.strip_prefix("Bearer ")?;
    Some(token.to_string())
}

pub fn create_token(
    employee_id: Uuid,
    company_id: Uuid,
    role: Role,
    secret: &str,
    expiry_hours: u64,
) -> anyhow::Result<String> {
    use jsonwebtoken::{encode, EncodingKey, Header};

    let now = OffsetDateTime::now_utc();
    let exp = now + time::Duration::hours(expiry_hours as i64);

    let claims = Claims {
        sub: employee_id,
        company_id,
        role,
        exp: exp.unix_timestamp(),
        iat: now.unix_timestamp(),
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?;

    Ok(token)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_round_trips_claims() {
        let secret = "test-secret-that-is-long-enough-for-hs256";
        let (id, company) = (Uuid::new_v4(), Uuid::new_v4());
        let token = create_token(id, company, Role::Hr, secret, 1).unwrap();

        let claims = decode::<Claims>(
            &token,
            &DecodingKey::from_secret(secret.as_bytes()),
            &Validation::new(Algorithm::HS256),
        )
        .unwrap()
        .claims;
        assert_eq!(claims.sub, id);
        assert_eq!(claims.company_id, company);
        assert_eq!(claims.role, Role::Hr);
    }

    #[test]
    fn role_capabilities() {
        assert!(Role::Hr.is_hr_or_admin() && Role::Admin.is_hr_or_admin());
        assert!(!Role::Manager.is_hr_or_admin());
        assert!(Role::Manager.can_approve_leave());
        assert!(!Role::Employee.can_approve_leave());
        assert!(Role::Admin.is_admin() && !Role::Hr.is_admin());
    }
}
