//! Identity service: accounts, password and phone sign-in, ID tokens.

use crate::error::{IdentityError, StoreError};
use crate::phone::normalize_phone;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use rand::Rng;
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

type HmacSha256 = Hmac<Sha256>;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRecord {
    pub uid: String,
    pub email: Option<String>,
    pub display_name: Option<String>,
    #[serde(rename = "photoURL")]
    pub photo_url: Option<String>,
    pub phone_number: Option<String>,
}

#[derive(Clone, Debug)]
pub struct NewUser {
    pub email: String,
    pub password: String,
    pub display_name: Option<String>,
}

/// Fields to overwrite; `None` leaves the stored value alone.
#[derive(Clone, Debug, Default)]
pub struct UserUpdate {
    pub phone_number: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
    pub display_name: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenClaims {
    pub uid: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// Unix seconds.
    pub exp: i64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthSession {
    pub user: UserRecord,
    pub id_token: String,
}

/// Proof that the visual challenge was solved.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CaptchaToken(String);

impl CaptchaToken {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Returned once an SMS code has been dispatched. Only `confirm` consumes it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConfirmationHandle {
    verification_id: String,
}

impl ConfirmationHandle {
    pub fn new(verification_id: impl Into<String>) -> Self {
        Self {
            verification_id: verification_id.into(),
        }
    }

    pub fn verification_id(&self) -> &str {
        &self.verification_id
    }
}

pub trait IdentityService: Send + Sync {
    fn create_user(&self, user: NewUser) -> Result<UserRecord, IdentityError>;
    fn get_user(&self, uid: &str) -> Result<Option<UserRecord>, IdentityError>;
    fn update_user(&self, uid: &str, update: UserUpdate) -> Result<UserRecord, IdentityError>;
    fn verify_id_token(&self, id_token: &str) -> Result<TokenClaims, IdentityError>;
    fn sign_in_with_email_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<AuthSession, IdentityError>;
    fn sign_in_with_phone(
        &self,
        phone_number: &str,
        captcha: &CaptchaToken,
    ) -> Result<ConfirmationHandle, IdentityError>;
    fn confirm(&self, handle: &ConfirmationHandle, code: &str)
        -> Result<AuthSession, IdentityError>;
    fn sign_out(&self, id_token: &str) -> Result<(), IdentityError>;
}

pub trait SmsSender: Send + Sync {
    fn send_code(&self, phone_number: &str, code: &str) -> Result<(), String>;
}

/// Writes codes to the log instead of sending them.
pub struct LoggingSmsSender;

impl SmsSender for LoggingSmsSender {
    fn send_code(&self, phone_number: &str, code: &str) -> Result<(), String> {
        tracing::info!(phone_number, code, "sms verification code");
        Ok(())
    }
}

#[derive(Clone, Debug)]
pub struct IdentityConfig {
    pub token_secret: String,
    pub token_ttl_secs: i64,
    pub code_ttl_secs: i64,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            token_secret: "valueguard-dev-secret".into(),
            token_ttl_secs: 3600,
            code_ttl_secs: 300,
        }
    }
}

/// Wrong guesses allowed against one verification id before it is dropped.
pub const MAX_CODE_ATTEMPTS: u32 = 5;

struct PendingCode {
    phone_number: String,
    code: String,
    expires_at: DateTime<Utc>,
    attempts: u32,
}

pub struct LocalIdentity {
    db_path: Arc<PathBuf>,
    config: IdentityConfig,
    sms: Arc<dyn SmsSender>,
    pending: Mutex<HashMap<String, PendingCode>>,
    revoked: Mutex<HashSet<String>>,
}

const ACCOUNT_COLUMNS: &str = "uid, email, display_name, photo_url, phone_number";

impl LocalIdentity {
    pub fn open(
        path: &str,
        config: IdentityConfig,
        sms: Arc<dyn SmsSender>,
    ) -> Result<Self, IdentityError> {
        let db_path = PathBuf::from(path);
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(StoreError::from)?;
            }
        }

        let conn = Connection::open(&db_path)?;
        conn.execute_batch(
            "
            PRAGMA journal_mode=WAL;
            CREATE TABLE IF NOT EXISTS accounts (
                uid TEXT PRIMARY KEY,
                email TEXT UNIQUE,
                display_name TEXT,
                photo_url TEXT,
                phone_number TEXT UNIQUE,
                password_hash TEXT,
                created_at TEXT NOT NULL
            );
            ",
        )?;

        Ok(Self {
            db_path: Arc::new(db_path),
            config,
            sms,
            pending: Mutex::new(HashMap::new()),
            revoked: Mutex::new(HashSet::new()),
        })
    }

    fn connect(&self) -> Result<Connection, IdentityError> {
        Ok(Connection::open(&*self.db_path)?)
    }

    fn issue_token(&self, user: &UserRecord) -> Result<String, IdentityError> {
        let claims = TokenClaims {
            uid: user.uid.clone(),
            phone_number: user.phone_number.clone(),
            email: user.email.clone(),
            exp: (Utc::now() + Duration::seconds(self.config.token_ttl_secs)).timestamp(),
        };
        let payload = URL_SAFE_NO_PAD
            .encode(serde_json::to_vec(&claims).map_err(StoreError::from)?);
        let signature = URL_SAFE_NO_PAD.encode(self.sign(payload.as_bytes())?);
        Ok(format!("{payload}.{signature}"))
    }

    fn sign(&self, payload: &[u8]) -> Result<Vec<u8>, IdentityError> {
        let mut mac = HmacSha256::new_from_slice(self.config.token_secret.as_bytes())
            .map_err(|_| IdentityError::InvalidToken)?;
        mac.update(payload);
        Ok(mac.finalize().into_bytes().to_vec())
    }

    fn session_for(&self, user: UserRecord) -> Result<AuthSession, IdentityError> {
        let id_token = self.issue_token(&user)?;
        Ok(AuthSession { user, id_token })
    }

    fn ensure_phone_account(&self, phone_number: &str) -> Result<UserRecord, IdentityError> {
        let conn = self.connect()?;
        if let Some(user) = find_account(&conn, "phone_number = ?1", phone_number)? {
            return Ok(user);
        }

        let uid = uuid::Uuid::new_v4().simple().to_string();
        conn.execute(
            "INSERT INTO accounts (uid, phone_number, created_at) VALUES (?1, ?2, ?3)",
            params![uid, phone_number, Utc::now().to_rfc3339()],
        )?;
        tracing::info!(%uid, "created phone account");
        find_account(&conn, "uid = ?1", &uid)?.ok_or(IdentityError::UserNotFound)
    }
}

impl IdentityService for LocalIdentity {
    fn create_user(&self, user: NewUser) -> Result<UserRecord, IdentityError> {
        let email = user.email.trim().to_lowercase();
        let conn = self.connect()?;
        if find_account(&conn, "email = ?1", &email)?.is_some() {
            return Err(IdentityError::EmailTaken);
        }

        let uid = uuid::Uuid::new_v4().simple().to_string();
        conn.execute(
            "INSERT INTO accounts (uid, email, display_name, password_hash, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                uid,
                email,
                user.display_name,
                hash_password(&user.password)?,
                Utc::now().to_rfc3339()
            ],
        )?;
        find_account(&conn, "uid = ?1", &uid)?.ok_or(IdentityError::UserNotFound)
    }

    fn get_user(&self, uid: &str) -> Result<Option<UserRecord>, IdentityError> {
        let conn = self.connect()?;
        find_account(&conn, "uid = ?1", uid)
    }

    fn update_user(&self, uid: &str, update: UserUpdate) -> Result<UserRecord, IdentityError> {
        let conn = self.connect()?;
        if find_account(&conn, "uid = ?1", uid)?.is_none() {
            return Err(IdentityError::UserNotFound);
        }

        if let Some(phone) = update.phone_number.as_deref().map(normalize_phone) {
            if find_account(&conn, "phone_number = ?1", &phone)?.is_some_and(|u| u.uid != uid) {
                return Err(IdentityError::PhoneTaken);
            }
            conn.execute(
                "UPDATE accounts SET phone_number = ?2 WHERE uid = ?1",
                params![uid, phone],
            )?;
        }
        if let Some(email) = update.email.as_deref().map(|e| e.trim().to_lowercase()) {
            if find_account(&conn, "email = ?1", &email)?.is_some_and(|u| u.uid != uid) {
                return Err(IdentityError::EmailTaken);
            }
            conn.execute(
                "UPDATE accounts SET email = ?2 WHERE uid = ?1",
                params![uid, email],
            )?;
        }
        if let Some(password) = update.password.as_deref() {
            conn.execute(
                "UPDATE accounts SET password_hash = ?2 WHERE uid = ?1",
                params![uid, hash_password(password)?],
            )?;
        }
        if let Some(name) = update.display_name.as_deref() {
            conn.execute(
                "UPDATE accounts SET display_name = ?2 WHERE uid = ?1",
                params![uid, name],
            )?;
        }

        find_account(&conn, "uid = ?1", uid)?.ok_or(IdentityError::UserNotFound)
    }

    fn verify_id_token(&self, id_token: &str) -> Result<TokenClaims, IdentityError> {
        let (payload, signature) = id_token
            .split_once('.')
            .ok_or(IdentityError::InvalidToken)?;
        let signature = URL_SAFE_NO_PAD
            .decode(signature)
            .map_err(|_| IdentityError::InvalidToken)?;

        let mut mac = HmacSha256::new_from_slice(self.config.token_secret.as_bytes())
            .map_err(|_| IdentityError::InvalidToken)?;
        mac.update(payload.as_bytes());
        mac.verify_slice(&signature)
            .map_err(|_| IdentityError::InvalidToken)?;

        let raw = URL_SAFE_NO_PAD
            .decode(payload)
            .map_err(|_| IdentityError::InvalidToken)?;
        let claims: TokenClaims =
            serde_json::from_slice(&raw).map_err(|_| IdentityError::InvalidToken)?;

        if claims.exp <= Utc::now().timestamp() {
            return Err(IdentityError::TokenExpired);
        }
        if self
            .revoked
            .lock()
            .map(|r| r.contains(id_token))
            .unwrap_or(false)
        {
            return Err(IdentityError::InvalidToken);
        }
        Ok(claims)
    }

    fn sign_in_with_email_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<AuthSession, IdentityError> {
        let email = email.trim().to_lowercase();
        let conn = self.connect()?;
        let stored = conn
            .query_row(
                "SELECT uid, password_hash FROM accounts WHERE email = ?1",
                params![email],
                |row| Ok((row.get::<_, String>(0)?, row.get::<_, Option<String>>(1)?)),
            )
            .optional()?;

        let Some((uid, Some(stored_hash))) = stored else {
            return Err(IdentityError::InvalidCredentials);
        };
        verify_password(&stored_hash, password)?;

        let user = find_account(&conn, "uid = ?1", &uid)?.ok_or(IdentityError::UserNotFound)?;
        self.session_for(user)
    }

    fn sign_in_with_phone(
        &self,
        phone_number: &str,
        captcha: &CaptchaToken,
    ) -> Result<ConfirmationHandle, IdentityError> {
        if captcha.as_str().trim().is_empty() {
            return Err(IdentityError::CaptchaRejected);
        }
        let phone = normalize_phone(phone_number);
        if !form_schema::is_phone_number(&phone) {
            return Err(IdentityError::InvalidPhoneNumber(phone_number.to_string()));
        }

        let code = format!("{:06}", rand::thread_rng().gen_range(0..1_000_000u32));
        self.sms
            .send_code(&phone, &code)
            .map_err(IdentityError::Sms)?;

        let verification_id = uuid::Uuid::new_v4().simple().to_string();
        if let Ok(mut pending) = self.pending.lock() {
            let now = Utc::now();
            pending.retain(|_, entry| entry.expires_at > now);
            pending.insert(
                verification_id.clone(),
                PendingCode {
                    phone_number: phone,
                    code,
                    expires_at: Utc::now() + Duration::seconds(self.config.code_ttl_secs),
                    attempts: 0,
                },
            );
        }
        Ok(ConfirmationHandle { verification_id })
    }

    fn confirm(
        &self,
        handle: &ConfirmationHandle,
        code: &str,
    ) -> Result<AuthSession, IdentityError> {
        let phone_number = {
            let mut pending = self
                .pending
                .lock()
                .map_err(|_| IdentityError::CodeExpired)?;
            let entry = pending
                .get_mut(&handle.verification_id)
                .ok_or(IdentityError::CodeExpired)?;
            if Utc::now() >= entry.expires_at {
                pending.remove(&handle.verification_id);
                return Err(IdentityError::CodeExpired);
            }
            if entry.code != code.trim() {
                entry.attempts += 1;
                if entry.attempts >= MAX_CODE_ATTEMPTS {
                    pending.remove(&handle.verification_id);
                    tracing::warn!(
                        verification_id = %handle.verification_id,
                        "verification code locked after repeated mismatches"
                    );
                    return Err(IdentityError::TooManyAttempts);
                }
                return Err(IdentityError::CodeMismatch);
            }
            let phone = entry.phone_number.clone();
            pending.remove(&handle.verification_id);
            phone
        };

        let user = self.ensure_phone_account(&phone_number)?;
        self.session_for(user)
    }

    fn sign_out(&self, id_token: &str) -> Result<(), IdentityError> {
        if let Ok(mut revoked) = self.revoked.lock() {
            revoked.insert(id_token.to_string());
        }
        Ok(())
    }
}

fn find_account(
    conn: &Connection,
    clause: &str,
    value: &str,
) -> Result<Option<UserRecord>, IdentityError> {
    let sql = format!("SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE {clause}");
    let user = conn
        .query_row(&sql, params![value], |row| {
            Ok(UserRecord {
                uid: row.get(0)?,
                email: row.get(1)?,
                display_name: row.get(2)?,
                photo_url: row.get(3)?,
                phone_number: row.get(4)?,
            })
        })
        .optional()?;
    Ok(user)
}

/// Argon2id PHC string; the salt travels inside it.
fn hash_password(password: &str) -> Result<String, IdentityError> {
    let bytes: [u8; 16] = rand::thread_rng().gen();
    let salt = SaltString::encode_b64(&bytes)
        .map_err(|err| IdentityError::PasswordHash(err.to_string()))?;
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|err| IdentityError::PasswordHash(err.to_string()))?;
    Ok(hash.to_string())
}

fn verify_password(stored_hash: &str, password: &str) -> Result<(), IdentityError> {
    let parsed = PasswordHash::new(stored_hash)
        .map_err(|err| IdentityError::PasswordHash(err.to_string()))?;
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .map_err(|_| IdentityError::InvalidCredentials)
}
