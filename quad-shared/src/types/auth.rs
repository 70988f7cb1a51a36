use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Account-level role carried in the access token.
///
/// Campus roles (student, CIO) and the moderator flag live on the social
/// profile, not here. `Admin` is the back-office operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountRole {
    Member,
    Admin,
}

impl std::fmt::Display for AccountRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AccountRole::Member => write!(f, "member"),
            AccountRole::Admin => write!(f, "admin"),
        }
    }
}

impl std::str::FromStr for AccountRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "member" => Ok(AccountRole::Member),
            "admin" => Ok(AccountRole::Admin),
            _ => Err(format!("unknown account role: {s}")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub role: AccountRole,
    pub iat: i64,
    pub exp: i64,
    pub jti: Uuid,
}

impl Claims {
    pub fn new(user_id: Uuid, role: AccountRole, duration_secs: i64) -> Self {
        let now = Utc::now().timestamp();
        Self {
            sub: user_id,
            role,
            iat: now,
            exp: now + duration_secs,
            jti: Uuid::now_v7(),
        }
    }

    pub fn is_expired(&self) -> bool {
        Utc::now().timestamp() > self.exp
    }

    pub fn is_admin(&self) -> bool {
        self.role == AccountRole::Admin
    }
}

/// The acting user resolved from the bearer token.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub id: Uuid,
    pub role: AccountRole,
    pub token_id: Uuid,
}

impl AuthUser {
    pub fn is_admin(&self) -> bool {
        self.role == AccountRole::Admin
    }
}

impl From<Claims> for AuthUser {
    fn from(claims: Claims) -> Self {
        Self {
            id: claims.sub,
            role: claims.role,
            token_id: claims.jti,
        }
    }
}
