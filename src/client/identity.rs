//! Stable anonymous identity for signed-out shoppers.
//!
//! The anonymous token is persisted locally so a returning visitor keeps their
//! cart. Storage problems never surface to the caller: the resolver keeps
//! working with an in-memory token and logs the failure.

use std::{
    path::{Path, PathBuf},
    sync::Mutex,
};

use anyhow::Context;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::Owner;

#[async_trait]
pub trait IdentityStorage: Send + Sync {
    async fn load(&self) -> anyhow::Result<Option<Uuid>>;
    async fn save(&self, anonymous_id: Uuid) -> anyhow::Result<()>;
    async fn clear(&self) -> anyhow::Result<()>;
}

#[derive(Debug, Serialize, Deserialize)]
struct StoredIdentity {
    anonymous_id: Uuid,
}

/// Keeps the anonymous id in a small JSON file.
#[derive(Debug, Clone)]
pub struct FileIdentityStorage {
    path: PathBuf,
}

impl FileIdentityStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl IdentityStorage for FileIdentityStorage {
    async fn load(&self) -> anyhow::Result<Option<Uuid>> {
        let raw = match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => {
                return Err(err)
                    .with_context(|| format!("reading identity from {}", self.path.display()));
            }
        };
        let stored: StoredIdentity = serde_json::from_str(&raw)
            .with_context(|| format!("parsing identity in {}", self.path.display()))?;
        Ok(Some(stored.anonymous_id))
    }

    async fn save(&self, anonymous_id: Uuid) -> anyhow::Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let raw = serde_json::to_string(&StoredIdentity { anonymous_id })?;
        tokio::fs::write(&self.path, raw)
            .await
            .with_context(|| format!("writing identity to {}", self.path.display()))
    }

    async fn clear(&self) -> anyhow::Result<()> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}

#[derive(Debug, Default)]
pub struct MemoryIdentityStorage {
    value: Mutex<Option<Uuid>>,
}

#[async_trait]
impl IdentityStorage for MemoryIdentityStorage {
    async fn load(&self) -> anyhow::Result<Option<Uuid>> {
        Ok(*self.value.lock().unwrap_or_else(|e| e.into_inner()))
    }

    async fn save(&self, anonymous_id: Uuid) -> anyhow::Result<()> {
        *self.value.lock().unwrap_or_else(|e| e.into_inner()) = Some(anonymous_id);
        Ok(())
    }

    async fn clear(&self) -> anyhow::Result<()> {
        *self.value.lock().unwrap_or_else(|e| e.into_inner()) = None;
        Ok(())
    }
}

/// Both identities involved in a sign-in, handed to cart reconciliation
/// before the anonymous one is dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdentityTransition {
    pub anonymous: Uuid,
    pub user_id: Uuid,
}

impl IdentityTransition {
    pub fn anonymous_owner(&self) -> Owner {
        Owner::Anonymous(self.anonymous)
    }

    pub fn user_owner(&self) -> Owner {
        Owner::User(self.user_id)
    }
}

pub struct SessionIdentityResolver {
    storage: Box<dyn IdentityStorage>,
    anonymous: Option<Uuid>,
    user: Option<Uuid>,
    /// Set once storage failed; the resolver stops touching it afterwards.
    in_memory: bool,
}

impl SessionIdentityResolver {
    pub async fn init(storage: impl IdentityStorage + 'static) -> Self {
        let mut resolver = Self {
            storage: Box::new(storage),
            anonymous: None,
            user: None,
            in_memory: false,
        };

        match resolver.storage.load().await {
            Ok(Some(id)) => resolver.anonymous = Some(id),
            Ok(None) => {
                resolver.fresh_anonymous().await;
            }
            Err(err) => {
                tracing::warn!(error = %err, "identity storage unavailable, using in-memory token");
                resolver.in_memory = true;
                resolver.anonymous = Some(Uuid::new_v4());
            }
        }
        resolver
    }

    pub fn current_owner(&self) -> Owner {
        match (self.user, self.anonymous) {
            (Some(user), _) => Owner::User(user),
            (None, Some(anon)) => Owner::Anonymous(anon),
            // `init` and `sign_out` always leave an anonymous id behind.
            (None, None) => Owner::Anonymous(Uuid::nil()),
        }
    }

    pub fn anonymous_id(&self) -> Option<Uuid> {
        self.anonymous
    }

    pub fn is_persistent(&self) -> bool {
        !self.in_memory
    }

    /// Records the signed-in user and returns both identities. The anonymous
    /// id stays available until [`Self::discard_anonymous`].
    pub fn begin_sign_in(&mut self, user_id: Uuid) -> Option<IdentityTransition> {
        self.user = Some(user_id);
        self.anonymous.map(|anonymous| IdentityTransition {
            anonymous,
            user_id,
        })
    }

    pub async fn discard_anonymous(&mut self) {
        self.anonymous = None;
        if self.in_memory {
            return;
        }
        if let Err(err) = self.storage.clear().await {
            tracing::warn!(error = %err, "failed to clear persisted anonymous id");
        }
    }

    /// Drops the user and starts a fresh anonymous session.
    pub async fn sign_out(&mut self) -> Owner {
        self.user = None;
        let id = self.fresh_anonymous().await;
        Owner::Anonymous(id)
    }

    async fn fresh_anonymous(&mut self) -> Uuid {
        let id = Uuid::new_v4();
        self.anonymous = Some(id);
        if !self.in_memory {
            if let Err(err) = self.storage.save(id).await {
                tracing::warn!(error = %err, "identity storage unavailable, using in-memory token");
                self.in_memory = true;
            }
        }
        id
    }
}
