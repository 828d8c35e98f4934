//! Field codec
//!
//! Entities are stored one field per key. Strings are stored verbatim,
//! integers and timestamps as decimal text, statuses by name and composite
//! fields as JSON.

use kiln_core::domain::build::BuildStatus;
use kiln_store::{MetadataStore, StoreError};
use serde::de::DeserializeOwned;
use serde::Serialize;

/// How reads treat missing, unreadable or malformed fields
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DecodeMode {
    /// Any field that cannot be read or decoded takes its zero value
    #[default]
    Lenient,
    /// Absent fields take their zero value; read failures and malformed
    /// values are errors
    Strict,
}

/// Reads the fields stored under one entity path
pub(crate) struct FieldReader<'a> {
    store: &'a dyn MetadataStore,
    base: &'a str,
    mode: DecodeMode,
}

impl<'a> FieldReader<'a> {
    pub fn new(store: &'a dyn MetadataStore, base: &'a str, mode: DecodeMode) -> Self {
        Self { store, base, mode }
    }

    pub fn key(&self, field: &str) -> String {
        field_key(self.base, field)
    }

    /// Raw field value, `None` when the field should take its zero value.
    async fn raw(&self, field: &str) -> Result<Option<String>, StoreError> {
        match self.store.get(&self.key(field)).await {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => match self.mode {
                DecodeMode::Strict => Err(e),
                DecodeMode::Lenient => {
                    tracing::debug!("Reading {} failed, using zero value: {}", self.key(field), e);
                    Ok(None)
                }
            },
        }
    }

    fn malformed<T: Default>(&self, field: &str, value: String) -> Result<T, StoreError> {
        let key = self.key(field);
        match self.mode {
            DecodeMode::Strict => Err(StoreError::InvalidValue { key, value }),
            DecodeMode::Lenient => {
                tracing::debug!("Malformed value at {}: {:?}", key, value);
                Ok(T::default())
            }
        }
    }

    pub async fn string(&self, field: &str) -> Result<String, StoreError> {
        Ok(self.raw(field).await?.unwrap_or_default())
    }

    pub async fn int(&self, field: &str) -> Result<i64, StoreError> {
        match self.raw(field).await? {
            None => Ok(0),
            Some(value) => match decode_int(&value) {
                Some(n) => Ok(n),
                None => self.malformed(field, value),
            },
        }
    }

    /// Non-negative integer that must fit `T`.
    pub async fn unsigned<T>(&self, field: &str) -> Result<T, StoreError>
    where
        T: TryFrom<i64> + Default,
    {
        match self.raw(field).await? {
            None => Ok(T::default()),
            Some(value) => match decode_int(&value).and_then(|n| T::try_from(n).ok()) {
                Some(n) => Ok(n),
                None => self.malformed(field, value),
            },
        }
    }

    pub async fn status(&self, field: &str) -> Result<BuildStatus, StoreError> {
        match self.raw(field).await? {
            None => Ok(BuildStatus::default()),
            Some(value) if value.is_empty() => Ok(BuildStatus::default()),
            Some(value) => match value.parse() {
                Ok(status) => Ok(status),
                Err(_) => self.malformed(field, value),
            },
        }
    }

    pub async fn json<T>(&self, field: &str) -> Result<T, StoreError>
    where
        T: DeserializeOwned + Default,
    {
        match self.raw(field).await? {
            None => Ok(T::default()),
            Some(value) if value.trim().is_empty() => Ok(T::default()),
            Some(value) => match serde_json::from_str(&value) {
                Ok(decoded) => Ok(decoded),
                Err(_) => self.malformed(field, value),
            },
        }
    }
}

pub(crate) fn field_key(base: &str, field: &str) -> String {
    format!("{}/{}", base, field)
}

pub(crate) fn decode_int(value: &str) -> Option<i64> {
    value.trim().parse().ok()
}

pub(crate) fn encode_json<T: Serialize>(key: &str, value: &T) -> Result<String, StoreError> {
    serde_json::to_string(value).map_err(|e| StoreError::InvalidValue {
        key: key.to_string(),
        value: e.to_string(),
    })
}

/// Whether anything is stored below `path`.
///
/// Absence is `false`; any other failure is propagated so a transport error is
/// never mistaken for a missing entity.
pub(crate) async fn dir_exists(store: &dyn MetadataStore, path: &str) -> Result<bool, StoreError> {
    match store.list_dir(path).await {
        Ok(_) => Ok(true),
        Err(e) if e.is_not_found() => Ok(false),
        Err(e) => Err(e),
    }
}
