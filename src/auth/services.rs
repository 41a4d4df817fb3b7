use lazy_static::lazy_static;
use regex::Regex;
use serde_json::Value;
use tracing::{info, warn};

use super::{
    password::{check_password_length, hash_password, verify_password},
    repo_types::{Account, AccountPatch, NewAccount},
};
use crate::{
    config::AdminConfig,
    error::{ApiError, FieldErrors},
    payload::{Payload, UpdateMode, NOT_NULL},
    store::Store,
};

const EMAIL_MAX: usize = 255;
const NAME_MAX: usize = 255;
pub const BAD_CREDENTIALS: &str = "Unable to authenticate with provided credentials";

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

pub(crate) fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Validated input for a new account.
#[derive(Debug, Clone)]
pub struct Registration {
    pub email: String,
    pub password: String,
    pub name: String,
}

fn read_email(payload: &Payload, errors: &mut FieldErrors) -> Option<String> {
    let email = normalize_email(&payload.text("email", EMAIL_MAX, false, errors)?);
    if is_valid_email(&email) {
        Some(email)
    } else {
        errors.add("email", "Enter a valid email address.");
        None
    }
}

// Passwords are taken verbatim, surrounding whitespace included.
fn read_password(payload: &Payload, errors: &mut FieldErrors) -> Option<String> {
    match payload.get("password")? {
        Value::String(s) => match check_password_length(s) {
            Ok(()) => Some(s.clone()),
            Err(message) => {
                errors.add("password", message);
                None
            }
        },
        Value::Null => {
            errors.add("password", NOT_NULL);
            None
        }
        _ => {
            errors.add("password", "Not a valid string.");
            None
        }
    }
}

pub fn parse_registration(payload: &Payload) -> Result<Registration, ApiError> {
    let mut errors = FieldErrors::new();
    for key in ["email", "password", "name"] {
        payload.require(key, &mut errors);
    }
    let email = read_email(payload, &mut errors);
    let password = read_password(payload, &mut errors);
    let name = payload.text("name", NAME_MAX, false, &mut errors);
    match (email, password, name) {
        (Some(email), Some(password), Some(name)) if errors.is_empty() => Ok(Registration {
            email,
            password,
            name,
        }),
        _ => Err(ApiError::Validation(errors)),
    }
}

/// Validated profile changes; the password is still plain text here.
#[derive(Debug, Clone, Default)]
pub struct ProfileUpdate {
    pub email: Option<String>,
    pub name: Option<String>,
    pub password: Option<String>,
}

pub fn parse_profile_update(payload: &Payload, mode: UpdateMode) -> Result<ProfileUpdate, ApiError> {
    let mut errors = FieldErrors::new();
    if mode == UpdateMode::Full {
        for key in ["email", "name"] {
            payload.require(key, &mut errors);
        }
    }
    let update = ProfileUpdate {
        email: read_email(payload, &mut errors),
        name: payload.text("name", NAME_MAX, false, &mut errors),
        password: read_password(payload, &mut errors),
    };
    errors.finish(update)
}

/// Hashes the password and stores the account.
pub async fn create_account(
    store: &dyn Store,
    registration: Registration,
    is_staff: bool,
    is_superuser: bool,
) -> Result<Account, ApiError> {
    let password_hash = hash_password(&registration.password)?;
    let account = store
        .create_account(NewAccount {
            email: registration.email,
            password_hash,
            name: registration.name,
            is_staff,
            is_superuser,
        })
        .await?;
    info!(account_id = %account.id, email = %account.email, is_staff, "account created");
    Ok(account)
}

/// Applies a profile update; a new password goes through the hashing path.
pub async fn update_profile(
    store: &dyn Store,
    account: &Account,
    update: ProfileUpdate,
) -> Result<Account, ApiError> {
    let password_hash = match update.password {
        Some(plain) => Some(hash_password(&plain)?),
        None => None,
    };
    let changed_password = password_hash.is_some();
    let patch = AccountPatch {
        email: update.email,
        name: update.name,
        password_hash,
    };
    let updated = store
        .update_account(account.id, patch)
        .await?
        .ok_or(ApiError::NotFound)?;
    info!(account_id = %updated.id, changed_password, "profile updated");
    Ok(updated)
}

/// Returns the active account matching the credentials, if any.
pub async fn authenticate(
    store: &dyn Store,
    email: &str,
    password: &str,
) -> Result<Option<Account>, ApiError> {
    let email = normalize_email(email);
    let Some(account) = store.find_account_by_email(&email).await? else {
        warn!(email = %email, "login unknown email");
        return Ok(None);
    };
    if !verify_password(password, &account.password_hash)? {
        warn!(account_id = %account.id, "login invalid password");
        return Ok(None);
    }
    if !account.is_active {
        warn!(account_id = %account.id, "login inactive account");
        return Ok(None);
    }
    Ok(Some(account))
}

/// Creates the configured superuser unless an account with that email exists.
pub async fn ensure_superuser(store: &dyn Store, admin: &AdminConfig) -> anyhow::Result<()> {
    let mut payload = serde_json::Map::new();
    payload.insert("email".into(), Value::String(admin.email.clone()));
    payload.insert("password".into(), Value::String(admin.password.clone()));
    payload.insert("name".into(), Value::String("admin".into()));
    let registration = match parse_registration(&Payload::from(payload)) {
        Ok(r) => r,
        Err(e) => anyhow::bail!("invalid admin credentials: {e:?}"),
    };

    if store
        .find_account_by_email(&registration.email)
        .await?
        .is_some()
    {
        info!(email = %registration.email, "superuser already present");
        return Ok(());
    }
    match create_account(store, registration, true, true).await {
        Ok(_) => Ok(()),
        // lost a race with another instance
        Err(ApiError::Validation(errors)) if errors.contains("email") => Ok(()),
        Err(e) => anyhow::bail!("create superuser: {e}"),
    }
}
