// Copyright 2025 Newswire Contributors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! API key issuance and verification
//!
//! Raw secrets are returned exactly once at issuance; only the SHA-256
//! digest is retained. Verification compares digests in constant time so
//! lookup timing reveals nothing about stored keys.

use crate::context::{Identity, Permission};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use rand::RngCore;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use subtle::ConstantTimeEq;
use uuid::Uuid;

const KEY_PREFIX: &str = "nw_";
const KEY_SECRET_BYTES: usize = 24;

/// Stored API key record. Never contains the raw secret.
#[derive(Debug, Clone)]
pub struct ApiKeyRecord {
    pub id: String,
    pub label: String,
    pub secret_hash: [u8; 32],
    pub permissions: HashSet<Permission>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub last_used_at: Option<DateTime<Utc>>,
}

/// Key metadata exposed on admin surfaces.
#[derive(Debug, Clone, Serialize)]
pub struct ApiKeyInfo {
    pub id: String,
    pub label: String,
    pub permissions: Vec<&'static str>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub last_used_at: Option<DateTime<Utc>>,
}

/// A freshly issued key. The `secret` field is the only time the raw
/// credential exists outside the caller's hands.
#[derive(Debug, Clone)]
pub struct IssuedKey {
    pub id: String,
    pub secret: String,
}

fn hash_secret(secret: &str) -> [u8; 32] {
    let mut out = [0u8; 32];
    out.copy_from_slice(&Sha256::digest(secret.as_bytes()));
    out
}

/// In-memory API key store shared by all protocol adapters.
#[derive(Default)]
pub struct ApiKeyStore {
    keys: DashMap<String, ApiKeyRecord>,
}

impl ApiKeyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Issue a new key, returning the raw secret once.
    pub fn issue(
        &self,
        label: impl Into<String>,
        permissions: HashSet<Permission>,
    ) -> IssuedKey {
        let mut bytes = [0u8; KEY_SECRET_BYTES];
        rand::thread_rng().fill_bytes(&mut bytes);
        let secret = format!("{KEY_PREFIX}{}", hex_encode(&bytes));
        let id = Uuid::new_v4().to_string();
        let record = ApiKeyRecord {
            id: id.clone(),
            label: label.into(),
            secret_hash: hash_secret(&secret),
            permissions,
            active: true,
            created_at: Utc::now(),
            last_used_at: None,
        };
        self.keys.insert(id.clone(), record);
        IssuedKey { id, secret }
    }

    /// Seed a key with a known secret, for configuration-file credentials.
    pub fn seed(
        &self,
        label: impl Into<String>,
        secret: &str,
        permissions: HashSet<Permission>,
    ) -> String {
        let id = Uuid::new_v4().to_string();
        let record = ApiKeyRecord {
            id: id.clone(),
            label: label.into(),
            secret_hash: hash_secret(secret),
            permissions,
            active: true,
            created_at: Utc::now(),
            last_used_at: None,
        };
        self.keys.insert(id.clone(), record);
        id
    }

    /// Verify a presented secret against every active record.
    ///
    /// The hash comparison runs for each candidate regardless of partial
    /// matches, and updates `last_used_at` on success.
    pub fn verify(&self, presented: &str) -> Option<(Identity, HashSet<Permission>)> {
        let presented_hash = hash_secret(presented);
        for mut entry in self.keys.iter_mut() {
            let record = entry.value_mut();
            if !record.active {
                continue;
            }
            if record.secret_hash.ct_eq(&presented_hash).into() {
                record.last_used_at = Some(Utc::now());
                return Some((
                    Identity::ApiKey {
                        id: record.id.clone(),
                        label: record.label.clone(),
                    },
                    record.permissions.clone(),
                ));
            }
        }
        None
    }

    /// Deactivate a key. Idempotent; returns whether the key existed.
    pub fn revoke(&self, id: &str) -> bool {
        match self.keys.get_mut(id) {
            Some(mut record) => {
                record.active = false;
                true
            }
            None => false,
        }
    }

    /// Metadata for all keys, raw secrets and digests excluded.
    pub fn list(&self) -> Vec<ApiKeyInfo> {
        let mut infos: Vec<ApiKeyInfo> = self
            .keys
            .iter()
            .map(|entry| {
                let r = entry.value();
                let mut perms: Vec<&'static str> =
                    r.permissions.iter().map(Permission::as_str).collect();
                perms.sort_unstable();
                ApiKeyInfo {
                    id: r.id.clone(),
                    label: r.label.clone(),
                    permissions: perms,
                    active: r.active,
                    created_at: r.created_at,
                    last_used_at: r.last_used_at,
                }
            })
            .collect();
        infos.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        infos
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}
