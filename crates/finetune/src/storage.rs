use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, info};

use crate::error::{FinetuneError, Result};

pub const ACCESS_KEY_ID: &str = "AWS_ACCESS_KEY_ID";
pub const SECRET_ACCESS_KEY: &str = "AWS_SECRET_ACCESS_KEY";
pub const ENDPOINT_URL: &str = "AWS_ENDPOINT_URL";
pub const DEFAULT_REGION: &str = "AWS_DEFAULT_REGION";

/// Remote storage credentials as found in the environment.
#[derive(Clone, Default)]
pub struct StorageEnv {
    access_key_id: Option<String>,
    secret_access_key: Option<String>,
    endpoint_url: Option<String>,
    region: Option<String>,
}

impl StorageEnv {
    /// Reads the credentials through `lookup`. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.is_empty());
        Self {
            access_key_id: get(ACCESS_KEY_ID),
            secret_access_key: get(SECRET_ACCESS_KEY),
            endpoint_url: get(ENDPOINT_URL),
            region: get(DEFAULT_REGION),
        }
    }

    /// Required variables that are not set.
    pub fn missing(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.access_key_id.is_none() {
            missing.push(ACCESS_KEY_ID);
        }
        if self.secret_access_key.is_none() {
            missing.push(SECRET_ACCESS_KEY);
        }
        missing
    }

    pub fn ensure_available(&self) -> Result<()> {
        let missing = self.missing();
        if !missing.is_empty() {
            return Err(FinetuneError::StorageUnavailable { missing });
        }
        debug!(
            "S3 credentials found (endpoint: {}, region: {})",
            self.endpoint_url.as_deref().unwrap_or("default"),
            self.region.as_deref().unwrap_or("default")
        );
        Ok(())
    }
}

impl fmt::Debug for StorageEnv {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let redact = |v: &Option<String>| v.as_ref().map(|_| "<redacted>");
        f.debug_struct("StorageEnv")
            .field("access_key_id", &redact(&self.access_key_id))
            .field("secret_access_key", &redact(&self.secret_access_key))
            .field("endpoint_url", &self.endpoint_url)
            .field("region", &self.region)
            .finish()
    }
}

/// Copies checkpoints into the local mirror of a bucket, where the uploader
/// picks them up.
#[derive(Debug, Clone)]
pub struct CheckpointStager {
    root: PathBuf,
}

impl CheckpointStager {
    pub fn new<P: AsRef<Path>>(cache_dir: P, bucket: &str) -> Self {
        Self {
            root: cache_dir.as_ref().join(bucket).join("checkpoints"),
        }
    }

    /// Stages `file` and returns the staged path.
    pub fn stage(&self, file: &Path) -> Result<PathBuf> {
        let name = file.file_name().ok_or_else(|| FinetuneError::InvalidParameter {
            name: "checkpoint",
            reason: format!("{file:?} has no file name"),
        })?;
        fs::create_dir_all(&self.root).map_err(|source| FinetuneError::Io {
            path: self.root.clone(),
            source,
        })?;
        let target = self.root.join(name);
        fs::copy(file, &target).map_err(|source| FinetuneError::Io {
            path: file.to_path_buf(),
            source,
        })?;
        info!("Staged {:?} for upload at {:?}", file, target);
        Ok(target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(vars: &[(&str, &str)]) -> StorageEnv {
        let vars: HashMap<String, String> = vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        StorageEnv::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn test_credentials_present() {
        let env = env(&[(ACCESS_KEY_ID, "id"), (SECRET_ACCESS_KEY, "secret")]);
        assert!(env.missing().is_empty());
        env.ensure_available().unwrap();
    }

    #[test]
    fn test_missing_and_empty_credentials() {
        let env = env(&[(ACCESS_KEY_ID, ""), (ENDPOINT_URL, "http://localhost:9000")]);
        assert_eq!(env.missing(), vec![ACCESS_KEY_ID, SECRET_ACCESS_KEY]);
        match env.ensure_available() {
            Err(FinetuneError::StorageUnavailable { missing }) => assert_eq!(missing.len(), 2),
            other => panic!("expected StorageUnavailable, got {other:?}"),
        }
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let env = env(&[(ACCESS_KEY_ID, "AKIAEXAMPLE"), (SECRET_ACCESS_KEY, "hunter2")]);
        let printed = format!("{env:?}");
        assert!(!printed.contains("AKIAEXAMPLE"));
        assert!(!printed.contains("hunter2"));
        assert!(printed.contains("<redacted>"));
    }

    #[test]
    fn test_stage_copies_into_bucket_mirror() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("checkpoint_epoch_1.safetensors");
        fs::write(&file, b"weights").unwrap();

        let stager = CheckpointStager::new(dir.path().join("cache"), "my-bucket");
        let staged = stager.stage(&file).unwrap();
        assert_eq!(
            staged,
            dir.path().join("cache/my-bucket/checkpoints/checkpoint_epoch_1.safetensors")
        );
        assert_eq!(fs::read(staged).unwrap(), b"weights");
    }
}
