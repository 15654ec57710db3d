//! Authentication service for login, token management and user accounts

use bcrypt::{hash, verify, DEFAULT_COST};
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, errors::ErrorKind, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use shared::{normalize_creator_code, validate_password, validate_username, UserRole};
use sqlx::PgPool;
use uuid::Uuid;
use validator::Validate;

use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::middleware::AuthUser;

/// Authentication service
#[derive(Clone)]
pub struct AuthService {
    db: PgPool,
    jwt_secret: String,
    access_token_expiry: i64,
    refresh_token_expiry: i64,
}

/// JWT claims structure
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String, // User ID
    pub username: String,
    pub role: UserRole,
    pub creator_code: Option<String>,
    pub exp: i64,
    pub iat: i64,
}

impl Claims {
    /// Convert verified claims into the request's authenticated user
    pub fn into_auth_user(self) -> AppResult<AuthUser> {
        let user_id = Uuid::parse_str(&self.sub).map_err(|_| AppError::InvalidToken)?;
        let creator_code = self
            .creator_code
            .as_deref()
            .map(normalize_creator_code)
            .transpose()
            .map_err(|_| AppError::InvalidToken)?;

        Ok(AuthUser {
            user_id,
            username: self.username,
            role: self.role,
            creator_code,
        })
    }
}

/// Verify an access token's signature and expiry
pub fn decode_access_token(token: &str, secret: &str) -> AppResult<Claims> {
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map(|data| data.claims)
    .map_err(|e| match e.kind() {
        ErrorKind::ExpiredSignature => AppError::TokenExpired,
        _ => AppError::InvalidToken,
    })
}

/// Authentication tokens
#[derive(Debug, Serialize)]
pub struct AuthTokens {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    pub expires_in: i64,
}

/// User info from database
#[derive(Debug, sqlx::FromRow)]
struct UserRow {
    id: Uuid,
    username: String,
    password_hash: String,
    role: UserRole,
    creator_code: Option<String>,
    is_active: bool,
}

/// User as returned by the API
#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct UserProfile {
    pub id: Uuid,
    pub username: String,
    pub email: Option<String>,
    pub role: UserRole,
    pub creator_code: Option<String>,
    pub is_active: bool,
    pub last_login_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct LoginInput {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct RefreshInput {
    pub refresh_token: String,
}

#[derive(Debug, Deserialize)]
pub struct ChangePasswordInput {
    pub old_password: String,
    pub new_password: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateUserInput {
    pub username: String,
    pub password: String,
    #[validate(email)]
    pub email: Option<String>,
    pub role: Option<UserRole>,
    pub creator_code: Option<String>,
}

const PROFILE_COLUMNS: &str =
    "id, username, email, role, creator_code, is_active, last_login_at, created_at";

/// Hash a token for storage
fn hash_token(token: &str) -> String {
    format!("{:x}", Sha256::digest(token.as_bytes()))
}

fn hash_password(password: &str) -> AppResult<String> {
    hash(password, DEFAULT_COST)
        .map_err(|e| AppError::Internal(format!("Password hashing failed: {}", e)))
}

impl AuthService {
    /// Create a new AuthService instance
    pub fn new(db: PgPool, config: &Config) -> Self {
        Self {
            db,
            jwt_secret: config.jwt.secret.clone(),
            access_token_expiry: config.jwt.access_token_expiry,
            refresh_token_expiry: config.jwt.refresh_token_expiry,
        }
    }

    /// Authenticate user with username and password
    pub async fn login(&self, username: &str, password: &str) -> AppResult<AuthTokens> {
        let user = sqlx::query_as::<_, UserRow>(
            r#"
            SELECT id, username, password_hash, role, creator_code, is_active
            FROM users
            WHERE username = $1
            "#,
        )
        .bind(username.trim())
        .fetch_optional(&self.db)
        .await?
        .ok_or(AppError::InvalidCredentials)?;

        if !user.is_active {
            return Err(AppError::Unauthorized {
                message: "Account is disabled".to_string(),
                message_zh: "账号已停用".to_string(),
            });
        }

        let valid = verify(password, &user.password_hash)
            .map_err(|e| AppError::Internal(format!("Password verification failed: {}", e)))?;

        if !valid {
            tracing::warn!(username = %user.username, "Failed login attempt");
            return Err(AppError::InvalidCredentials);
        }

        sqlx::query("UPDATE users SET last_login_at = NOW() WHERE id = $1")
            .bind(user.id)
            .execute(&self.db)
            .await?;

        let tokens = self.generate_tokens(&user)?;
        self.store_refresh_token(user.id, &tokens.refresh_token).await?;

        tracing::info!(username = %user.username, role = user.role.as_str(), "User logged in");
        Ok(tokens)
    }

    /// Exchange a refresh token for a new token pair. The old refresh token
    /// is revoked.
    pub async fn refresh_token(&self, refresh_token: &str) -> AppResult<AuthTokens> {
        let token_hash = hash_token(refresh_token);

        let mut tx = self.db.begin().await?;

        let user = sqlx::query_as::<_, UserRow>(
            r#"
            SELECT u.id, u.username, u.password_hash, u.role, u.creator_code, u.is_active
            FROM refresh_tokens rt
            JOIN users u ON u.id = rt.user_id
            WHERE rt.token_hash = $1
              AND rt.expires_at > NOW()
              AND rt.revoked_at IS NULL
              AND u.is_active = true
            FOR UPDATE OF rt
            "#,
        )
        .bind(&token_hash)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::Unauthorized {
            message: "Invalid or expired refresh token".to_string(),
            message_zh: "刷新令牌无效或已过期".to_string(),
        })?;

        sqlx::query("UPDATE refresh_tokens SET revoked_at = NOW() WHERE token_hash = $1")
            .bind(&token_hash)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        let tokens = self.generate_tokens(&user)?;
        self.store_refresh_token(user.id, &tokens.refresh_token).await?;

        Ok(tokens)
    }

    /// Change the caller's password and revoke all of their refresh tokens
    pub async fn change_password(&self, user_id: Uuid, input: ChangePasswordInput) -> AppResult<()> {
        validate_password(&input.new_password)
            .map_err(|msg| AppError::validation("new_password", msg, "新密码至少需要 8 个字符"))?;

        let current_hash = sqlx::query_scalar::<_, String>("SELECT password_hash FROM users WHERE id = $1")
            .bind(user_id)
            .fetch_optional(&self.db)
            .await?
            .ok_or_else(|| AppError::NotFound("User".to_string()))?;

        let valid = verify(&input.old_password, &current_hash)
            .map_err(|e| AppError::Internal(format!("Password verification failed: {}", e)))?;
        if !valid {
            return Err(AppError::validation(
                "old_password",
                "Current password is incorrect",
                "当前密码不正确",
            ));
        }

        let new_hash = hash_password(&input.new_password)?;

        let mut tx = self.db.begin().await?;

        sqlx::query("UPDATE users SET password_hash = $2, updated_at = NOW() WHERE id = $1")
            .bind(user_id)
            .bind(&new_hash)
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            "UPDATE refresh_tokens SET revoked_at = NOW() WHERE user_id = $1 AND revoked_at IS NULL",
        )
        .bind(user_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        tracing::info!(%user_id, "Password changed");
        Ok(())
    }

    pub async fn get_user(&self, user_id: Uuid) -> AppResult<UserProfile> {
        sqlx::query_as::<_, UserProfile>(&format!(
            "SELECT {} FROM users WHERE id = $1",
            PROFILE_COLUMNS
        ))
        .bind(user_id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound("User".to_string()))
    }

    pub async fn list_users(&self) -> AppResult<Vec<UserProfile>> {
        let users = sqlx::query_as::<_, UserProfile>(&format!(
            "SELECT {} FROM users ORDER BY username",
            PROFILE_COLUMNS
        ))
        .fetch_all(&self.db)
        .await?;

        Ok(users)
    }

    /// Create a user account
    pub async fn create_user(&self, input: CreateUserInput) -> AppResult<UserProfile> {
        input.validate()?;
        validate_username(&input.username)
            .map_err(|msg| AppError::validation("username", msg, "用户名格式不正确"))?;
        validate_password(&input.password)
            .map_err(|msg| AppError::validation("password", msg, "密码至少需要 8 个字符"))?;

        let creator_code = input
            .creator_code
            .as_deref()
            .map(normalize_creator_code)
            .transpose()
            .map_err(|msg| AppError::validation("creator_code", msg, "创建人代码必须是单个字母"))?;

        let password_hash = hash_password(&input.password)?;

        let user = sqlx::query_as::<_, UserProfile>(&format!(
            r#"
            INSERT INTO users (username, password_hash, email, role, creator_code)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {}
            "#,
            PROFILE_COLUMNS
        ))
        .bind(input.username.trim())
        .bind(&password_hash)
        .bind(&input.email)
        .bind(input.role.unwrap_or_default())
        .bind(creator_code.map(|c| c.to_string()))
        .fetch_one(&self.db)
        .await?;

        tracing::info!(username = %user.username, role = user.role.as_str(), "User created");
        Ok(user)
    }

    /// Create the `admin` account when no users exist and a bootstrap
    /// password is configured. Returns whether an account was created.
    pub async fn bootstrap_admin(&self, config: &Config) -> AppResult<bool> {
        let Some(password) = config.auth.bootstrap_admin_password.as_deref() else {
            return Ok(false);
        };

        let users = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM users")
            .fetch_one(&self.db)
            .await?;
        if users > 0 {
            return Ok(false);
        }

        self.create_user(CreateUserInput {
            username: "admin".to_string(),
            password: password.to_string(),
            email: None,
            role: Some(UserRole::Admin),
            creator_code: Some("A".to_string()),
        })
        .await?;

        tracing::warn!("Bootstrap admin account created; change its password");
        Ok(true)
    }

    /// Generate access and refresh tokens
    fn generate_tokens(&self, user: &UserRow) -> AppResult<AuthTokens> {
        let now = Utc::now();
        let access_exp = now + Duration::seconds(self.access_token_expiry);

        let access_claims = Claims {
            sub: user.id.to_string(),
            username: user.username.clone(),
            role: user.role,
            creator_code: user.creator_code.clone(),
            exp: access_exp.timestamp(),
            iat: now.timestamp(),
        };

        let access_token = encode(
            &Header::default(),
            &access_claims,
            &EncodingKey::from_secret(self.jwt_secret.as_bytes()),
        )
        .map_err(|e| AppError::Internal(format!("Token generation failed: {}", e)))?;

        // Opaque; only its hash is stored
        let refresh_token = format!("{}{}", Uuid::new_v4().simple(), Uuid::new_v4().simple());

        Ok(AuthTokens {
            access_token,
            refresh_token,
            token_type: "Bearer".to_string(),
            expires_in: self.access_token_expiry,
        })
    }

    /// Store refresh token in database
    async fn store_refresh_token(&self, user_id: Uuid, token: &str) -> AppResult<()> {
        let expires_at = Utc::now() + Duration::seconds(self.refresh_token_expiry);

        sqlx::query(
            r#"
            INSERT INTO refresh_tokens (user_id, token_hash, expires_at)
            VALUES ($1, $2, $3)
            "#,
        )
        .bind(user_id)
        .bind(hash_token(token))
        .bind(expires_at)
        .execute(&self.db)
        .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "test-secret";

    fn claims(exp_offset: i64) -> Claims {
        let now = Utc::now().timestamp();
        Claims {
            sub: Uuid::new_v4().to_string(),
            username: "jane".to_string(),
            role: UserRole::Operator,
            creator_code: Some("J".to_string()),
            exp: now + exp_offset,
            iat: now,
        }
    }

    fn sign(claims: &Claims, secret: &str) -> String {
        encode(
            &Header::default(),
            claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap()
    }

    #[test]
    fn test_token_round_trip_into_auth_user() {
        let token = sign(&claims(3600), SECRET);
        let user = decode_access_token(&token, SECRET)
            .unwrap()
            .into_auth_user()
            .unwrap();
        assert_eq!(user.username, "jane");
        assert_eq!(user.role, UserRole::Operator);
        assert_eq!(user.creator_code, Some('J'));
    }

    #[test]
    fn test_expired_token() {
        let token = sign(&claims(-3600), SECRET);
        assert!(matches!(
            decode_access_token(&token, SECRET),
            Err(AppError::TokenExpired)
        ));
    }

    #[test]
    fn test_wrong_secret() {
        let token = sign(&claims(3600), "other");
        assert!(matches!(
            decode_access_token(&token, SECRET),
            Err(AppError::InvalidToken)
        ));
    }

    #[test]
    fn test_token_hash_is_sha256_hex() {
        let hashed = hash_token("abc");
        assert_eq!(hashed.len(), 64);
        assert_eq!(
            hashed,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }
}
