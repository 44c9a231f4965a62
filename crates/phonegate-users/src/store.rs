//! User record storage
//!
//! Manages a JSON file mapping phone numbers to user records. All writes
//! use atomic temp-file + rename to prevent corruption on crash. A tokio
//! Mutex serializes concurrent access so the phone-uniqueness invariant
//! holds even for racing duplicate registrations: the second insert sees
//! the first one's record and fails with `DuplicatePhone`.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::{Error, Result};

/// Access level carried in session tokens and checked by the admin gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Admin,
}

impl Role {
    /// Role label for responses and logging.
    pub fn label(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Admin => "admin",
        }
    }
}

/// A registered account.
///
/// `password` is an opaque secret compared by equality; it is persisted in
/// the store file but must never be serialized into an API response — use
/// [`User::public_view`] for anything that leaves the process.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: u64,
    pub phone: String,
    pub password: String,
    pub name: String,
    pub email: Option<String>,
    pub role: Role,
    /// Creation time as unix timestamp in milliseconds
    pub created_at: u64,
}

impl User {
    /// The response-safe projection of a user record (no password).
    pub fn public_view(&self) -> serde_json::Value {
        serde_json::json!({
            "id": self.id,
            "phone": self.phone,
            "name": self.name,
            "email": self.email,
            "role": self.role.label(),
            "created_at": self.created_at,
        })
    }
}

/// Payload for creating a user. The store assigns `id` and `created_at`.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub phone: String,
    pub password: String,
    pub name: String,
    pub email: Option<String>,
    pub role: Role,
}

/// On-disk shape: the record map plus the id sequence.
#[derive(Debug, Serialize, Deserialize)]
struct StoreFile {
    next_id: u64,
    /// Keyed by phone, the unique external identifier.
    users: HashMap<String, User>,
}

impl Default for StoreFile {
    fn default() -> Self {
        Self {
            next_id: 1,
            users: HashMap::new(),
        }
    }
}

/// Thread-safe user file manager.
pub struct UserStore {
    path: PathBuf,
    state: Mutex<StoreFile>,
}

impl UserStore {
    /// Load users from the given file path.
    ///
    /// If the file doesn't exist, creates it with zero users so future
    /// loads don't need the cold-start path.
    pub async fn load(path: PathBuf) -> Result<Self> {
        let state = if path.exists() {
            let contents = tokio::fs::read_to_string(&path)
                .await
                .map_err(|e| Error::Io(format!("reading user file: {e}")))?;
            let state: StoreFile = serde_json::from_str(&contents)
                .map_err(|e| Error::Parse(format!("parsing user file: {e}")))?;
            info!(path = %path.display(), users = state.users.len(), "loaded user store");
            state
        } else {
            info!(path = %path.display(), "user file not found, starting with empty store");
            let state = StoreFile::default();
            write_atomic(&path, &state).await?;
            state
        };

        Ok(Self {
            path,
            state: Mutex::new(state),
        })
    }

    /// Insert a new user, enforcing phone uniqueness.
    ///
    /// Assigns the next id and the creation timestamp, persists, and
    /// returns the stored record. Fails with `DuplicatePhone` if the phone
    /// is already registered.
    pub async fn insert(&self, new: NewUser) -> Result<User> {
        let mut state = self.state.lock().await;
        if state.users.contains_key(&new.phone) {
            return Err(Error::DuplicatePhone(new.phone));
        }

        let user = User {
            id: state.next_id,
            phone: new.phone.clone(),
            password: new.password,
            name: new.name,
            email: new.email,
            role: new.role,
            created_at: now_millis(),
        };
        state.next_id += 1;
        state.users.insert(new.phone, user.clone());
        // A failed persist must not leave a phantom account in memory
        if let Err(e) = write_atomic(&self.path, &state).await {
            state.users.remove(&user.phone);
            state.next_id -= 1;
            return Err(e);
        }
        debug!(phone = %user.phone, id = user.id, "inserted user");
        Ok(user)
    }

    /// Get a clone of the record for a phone number.
    pub async fn get_by_phone(&self, phone: &str) -> Option<User> {
        let state = self.state.lock().await;
        state.users.get(phone).cloned()
    }

    /// Get a clone of the record with the given id.
    pub async fn get_by_id(&self, id: u64) -> Option<User> {
        let state = self.state.lock().await;
        state.users.values().find(|u| u.id == id).cloned()
    }

    /// Replace the stored password for a phone number.
    ///
    /// The only mutation a user record ever sees after creation.
    pub async fn update_password(&self, phone: &str, new_password: String) -> Result<()> {
        let mut state = self.state.lock().await;
        let user = state
            .users
            .get_mut(phone)
            .ok_or_else(|| Error::NotFound(phone.to_string()))?;
        let previous = std::mem::replace(&mut user.password, new_password);
        if let Err(e) = write_atomic(&self.path, &state).await {
            if let Some(user) = state.users.get_mut(phone) {
                user.password = previous;
            }
            return Err(e);
        }
        debug!(phone, "updated password");
        Ok(())
    }

    /// Remove the user with the given id, returning the removed record.
    pub async fn delete(&self, id: u64) -> Result<User> {
        let mut state = self.state.lock().await;
        let phone = state
            .users
            .values()
            .find(|u| u.id == id)
            .map(|u| u.phone.clone())
            .ok_or_else(|| Error::NotFound(id.to_string()))?;
        // The record was just found under this phone; remove cannot miss.
        let removed = state
            .users
            .remove(&phone)
            .ok_or_else(|| Error::NotFound(id.to_string()))?;
        if let Err(e) = write_atomic(&self.path, &state).await {
            state.users.insert(phone, removed);
            return Err(e);
        }
        debug!(phone = %removed.phone, id, "deleted user");
        Ok(removed)
    }

    /// All users, newest first.
    pub async fn list(&self) -> Vec<User> {
        let state = self.state.lock().await;
        let mut users: Vec<User> = state.users.values().cloned().collect();
        users.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        users
    }

    /// Number of registered users.
    pub async fn len(&self) -> usize {
        let state = self.state.lock().await;
        state.users.len()
    }

    /// Whether the store has no users.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Write the store to a file atomically.
///
/// Writes to a temporary file in the same directory, then renames it over
/// the target. Sets file permissions to 0600 (owner read/write only) since
/// the file contains password material.
async fn write_atomic(path: &Path, data: &StoreFile) -> Result<()> {
    let json = serde_json::to_string_pretty(data)
        .map_err(|e| Error::Parse(format!("serializing user file: {e}")))?;

    let dir = path
        .parent()
        .ok_or_else(|| Error::Io("user file path has no parent directory".into()))?;

    let tmp_path = dir.join(format!(".users.tmp.{}", std::process::id()));

    tokio::fs::write(&tmp_path, json.as_bytes())
        .await
        .map_err(|e| Error::Io(format!("writing temp user file: {e}")))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        tokio::fs::set_permissions(&tmp_path, perms)
            .await
            .map_err(|e| Error::Io(format!("setting user file permissions: {e}")))?;
    }

    tokio::fs::rename(&tmp_path, path)
        .await
        .map_err(|e| Error::Io(format!("renaming temp user file: {e}")))?;

    debug!(path = %path.display(), "persisted user store");
    Ok(())
}
