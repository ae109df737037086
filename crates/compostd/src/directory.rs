//! Service directory lookups (etcd v2 keys API).

use async_trait::async_trait;
use compost_shared::CompostError;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;
use tracing::debug;

/// A leaf key under a directory path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryEntry {
    pub key: String,
    pub value: String,
}

#[async_trait]
pub trait ServiceDirectory: Send + Sync {
    /// Leaf entries under `path`, in directory order. A path that does not
    /// exist yields no entries.
    async fn get(&self, path: &str, recursive: bool, quorum: bool) -> Result<Vec<DirectoryEntry>, CompostError>;
}

#[derive(Debug, Deserialize)]
struct KeysResponse {
    node: Node,
}

#[derive(Debug, Default, Deserialize)]
struct Node {
    #[serde(default)]
    key: String,
    #[serde(default)]
    value: Option<String>,
    #[serde(default)]
    dir: bool,
    #[serde(default)]
    nodes: Vec<Node>,
}

impl Node {
    fn collect_leaves(self, out: &mut Vec<DirectoryEntry>) {
        if !self.dir {
            if let Some(value) = self.value {
                out.push(DirectoryEntry { key: self.key, value });
            }
            return;
        }
        for child in self.nodes {
            child.collect_leaves(out);
        }
    }
}

pub struct EtcdDirectory {
    base_url: String,
    http: reqwest::Client,
}

impl EtcdDirectory {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, CompostError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| CompostError::Directory(format!("client build failed: {}", e)))?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http,
        })
    }
}

#[async_trait]
impl ServiceDirectory for EtcdDirectory {
    async fn get(&self, path: &str, recursive: bool, quorum: bool) -> Result<Vec<DirectoryEntry>, CompostError> {
        let url = format!("{}/v2/keys/{}", self.base_url, path.trim_start_matches('/'));
        let response = self
            .http
            .get(&url)
            .query(&[("recursive", recursive), ("quorum", quorum)])
            .send()
            .await
            .map_err(|e| CompostError::Directory(format!("{}: {}", path, e)))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            debug!(path, "directory key not found");
            return Ok(Vec::new());
        }
        if !response.status().is_success() {
            return Err(CompostError::Directory(format!(
                "HTTP {} from {}",
                response.status(),
                path
            )));
        }

        let body: KeysResponse = response
            .json()
            .await
            .map_err(|e| CompostError::Directory(format!("{}: undecodable response: {}", path, e)))?;

        let mut entries = Vec::new();
        body.node.collect_leaves(&mut entries);
        debug!(path, entries = entries.len(), "directory lookup");
        Ok(entries)
    }
}

/// Directory backed by a map of path to entries
#[derive(Default)]
pub struct FakeDirectory {
    paths: Mutex<HashMap<String, Vec<DirectoryEntry>>>,
    lookups: Mutex<Vec<String>>,
}

impl FakeDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entry(self, path: &str, key: &str, value: &str) -> Self {
        self.paths
            .lock()
            .unwrap()
            .entry(path.to_string())
            .or_default()
            .push(DirectoryEntry {
                key: key.to_string(),
                value: value.to_string(),
            });
        self
    }

    pub fn lookups(&self) -> Vec<String> {
        self.lookups.lock().unwrap().clone()
    }
}

#[async_trait]
impl ServiceDirectory for FakeDirectory {
    async fn get(&self, path: &str, _recursive: bool, _quorum: bool) -> Result<Vec<DirectoryEntry>, CompostError> {
        self.lookups.lock().unwrap().push(path.to_string());
        Ok(self.paths.lock().unwrap().get(path).cloned().unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_leaves_flatten_in_order() {
        let body: KeysResponse = serde_json::from_str(
            r#"{
                "action": "get",
                "node": {
                    "key": "/opsee.co/routes/cust-1",
                    "dir": true,
                    "nodes": [
                        {"key": "/opsee.co/routes/cust-1/b1", "value": "{\"checker\":{}}"},
                        {"key": "/opsee.co/routes/cust-1/old", "dir": true, "nodes": [
                            {"key": "/opsee.co/routes/cust-1/old/b2", "value": "x"}
                        ]}
                    ]
                }
            }"#,
        )
        .unwrap();

        let mut entries = Vec::new();
        body.node.collect_leaves(&mut entries);
        let keys: Vec<_> = entries.iter().map(|e| e.key.as_str()).collect();
        assert_eq!(keys, vec!["/opsee.co/routes/cust-1/b1", "/opsee.co/routes/cust-1/old/b2"]);
    }

    #[test]
    fn test_empty_dir_has_no_leaves() {
        let body: KeysResponse =
            serde_json::from_str(r#"{"node": {"key": "/opsee.co/routes/x", "dir": true}}"#).unwrap();
        let mut entries = Vec::new();
        body.node.collect_leaves(&mut entries);
        assert!(entries.is_empty());
    }

    #[tokio::test]
    async fn test_fake_records_lookups() {
        let dir = FakeDirectory::new().with_entry("/opsee.co/routes/cust-1", "b1", "{}");
        assert_eq!(dir.get("/opsee.co/routes/cust-1", true, true).await.unwrap().len(), 1);
        assert!(dir.get("/opsee.co/routes/other", true, true).await.unwrap().is_empty());
        assert_eq!(dir.lookups().len(), 2);
    }
}
