use crate::CoreError;
use dbsnap_runtime::{SnapshotRecord, ENV_DATABASE, ENV_PASSWORD, ENV_USER};
use serde::{Deserialize, Serialize};
use url::Url;

/// What a caller needs to run a migrated snapshot and connect to it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConnectionParameters {
    /// Canonical snapshot reference (`name:tag`) to run.
    pub address: String,
    pub database: String,
    pub user: String,
    pub password: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,
}

impl ConnectionParameters {
    /// Decode the credentials baked into a published snapshot.
    pub fn from_record(record: &SnapshotRecord, schema: Option<&str>) -> Result<Self, CoreError> {
        let required = |key: &str| {
            record
                .env_value(key)
                .map(str::to_owned)
                .ok_or_else(|| CoreError::MalformedSnapshotMetadata {
                    reference: record.reference.clone(),
                    key: key.to_owned(),
                })
        };
        Ok(Self {
            address: record.reference.clone(),
            database: required(ENV_DATABASE)?,
            user: required(ENV_USER)?,
            password: required(ENV_PASSWORD)?,
            schema: schema.map(str::to_owned),
        })
    }

    /// JDBC URL for a running instance of the snapshot, scoped to the schema.
    pub fn jdbc_url(&self, host: &str, port: u16) -> String {
        let base = format!("jdbc:postgresql://{host}:{port}/{}", self.database);
        with_current_schema(&base, self.schema.as_deref())
    }

    /// libpq connection URI for a running instance of the snapshot.
    pub fn libpq_url(&self, host: &str, port: u16) -> Result<String, CoreError> {
        let invalid = || CoreError::Config(format!("invalid connection host '{host}'"));
        let authority = if host.contains(':') && !host.starts_with('[') {
            format!("[{host}]:{port}")
        } else {
            format!("{host}:{port}")
        };
        let mut url = Url::parse(&format!("postgresql://{authority}")).map_err(|_| invalid())?;
        url.set_username(&self.user).map_err(|()| invalid())?;
        url.set_password(Some(self.password.as_str()))
            .map_err(|()| invalid())?;
        url.path_segments_mut()
            .map_err(|()| invalid())?
            .clear()
            .push(&self.database);
        if let Some(schema) = &self.schema {
            url.query_pairs_mut()
                .append_pair("options", &format!("-csearch_path={schema}"));
        }
        Ok(url.into())
    }
}

/// Append `currentSchema=<schema>` to a JDBC URL.
pub fn with_current_schema(jdbc_url: &str, schema: Option<&str>) -> String {
    match schema {
        None => jdbc_url.to_owned(),
        Some(schema) => {
            let separator = if jdbc_url.contains('?') { '&' } else { '?' };
            format!("{jdbc_url}{separator}currentSchema={schema}")
        }
    }
}
