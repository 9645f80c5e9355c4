//! JSON-document store variant: the shared store is a single HTTP-accessible
//! JSON document, read with GET and replaced with PUT.
use super::lock::StoreLock;
use super::{merge_mine, RetryConfig, RetryError, RetryOutcome, StoreBackend};
use crate::error::GitalongError;
use crate::model::TrackedCommit;
use reqwest::blocking::Client;
use reqwest::StatusCode;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;

/// The JSON-document-backed store.
pub struct JsonStore {
    url: String,
    headers: HashMap<String, String>,
    host: String,
    author: String,
    client: Client,
    retry: RetryConfig,
    lock: Mutex<StoreLock>,
}

impl JsonStore {
    pub fn new(
        lock_dir: PathBuf,
        url: String,
        headers: HashMap<String, String>,
        host: String,
        author: String,
        timeout: Duration,
    ) -> Result<Self, GitalongError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| GitalongError::StoreUnavailable(e.to_string()))?;
        Ok(JsonStore {
            url,
            headers,
            host,
            author,
            client,
            retry: RetryConfig::default(),
            lock: Mutex::new(StoreLock::new(lock_dir.join(".gitalong-json.lock"))),
        })
    }

    /// Resolves `$NAME` header values from the process environment.
    fn resolved_headers(&self) -> HashMap<String, String> {
        self.headers
            .iter()
            .map(|(k, v)| {
                let resolved = if let Some(var) = v.strip_prefix('$') {
                    std::env::var(var).unwrap_or_default()
                } else {
                    v.clone()
                };
                (k.clone(), resolved)
            })
            .collect()
    }

    fn get(&self) -> Result<Vec<TrackedCommit>, RetryOutcome<GitalongError>> {
        let mut req = self.client.get(&self.url);
        for (k, v) in self.resolved_headers() {
            req = req.header(k, v);
        }
        let resp = req.send().map_err(|e| {
            RetryOutcome::Retryable(GitalongError::StoreUnavailable(e.to_string()))
        })?;
        if !resp.status().is_success() {
            return Err(classify_status(resp.status(), "GET"));
        }
        resp.json::<Vec<TrackedCommit>>()
            .map_err(|e| RetryOutcome::Fatal(GitalongError::StoreUnavailable(e.to_string())))
    }

    fn put(&self, records: &[TrackedCommit]) -> Result<(), RetryOutcome<GitalongError>> {
        let mut req = self.client.put(&self.url).json(records);
        for (k, v) in self.resolved_headers() {
            req = req.header(k, v);
        }
        let resp = req.send().map_err(|e| {
            RetryOutcome::Retryable(GitalongError::StoreUnavailable(e.to_string()))
        })?;
        if !resp.status().is_success() {
            return Err(classify_status(resp.status(), "PUT"));
        }
        Ok(())
    }
}

fn classify_status(status: StatusCode, verb: &str) -> RetryOutcome<GitalongError> {
    if status == StatusCode::CONFLICT || status.as_u16() == 423 {
        RetryOutcome::Retryable(GitalongError::StoreUnavailable(format!(
            "{verb} conflict: {status}"
        )))
    } else if status.is_server_error() {
        RetryOutcome::Retryable(GitalongError::StoreUnavailable(format!("{verb} failed: {status}")))
    } else {
        RetryOutcome::Fatal(GitalongError::StoreUnavailable(format!("{verb} failed: {status}")))
    }
}

impl StoreBackend for JsonStore {
    fn snapshot(&self) -> Result<Vec<TrackedCommit>, GitalongError> {
        let result: Result<_, RetryError<GitalongError>> = self.retry.retry(|_| self.get());
        match result {
            Ok(records) => Ok(records),
            Err(RetryError::Fatal(e)) => Err(e),
            Err(RetryError::Exhausted { last, .. }) => Err(last),
        }
    }

    fn commit(&self, mine_new: Vec<TrackedCommit>) -> Result<(), GitalongError> {
        let result: Result<(), RetryError<GitalongError>> = self.retry.retry(|_| {
            let remote = self.get()?;
            let merged = merge_mine(remote, mine_new.clone(), &self.host, &self.author);
            self.put(&merged)
        });
        match result {
            Ok(()) => Ok(()),
            Err(RetryError::Fatal(e)) => Err(e),
            Err(RetryError::Exhausted { attempts, .. }) => Err(GitalongError::StoreConflict { attempts }),
        }
    }

    fn lock(&self) -> Result<(), GitalongError> {
        self.lock.lock().unwrap().lock().map_err(GitalongError::from)
    }

    fn unlock(&self) -> Result<(), GitalongError> {
        self.lock.lock().unwrap().unlock().map_err(GitalongError::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dollar_prefixed_headers_resolve_from_env() {
        std::env::set_var("GITALONG_TEST_TOKEN", "secret123");
        let mut headers = HashMap::new();
        headers.insert("Authorization".to_string(), "$GITALONG_TEST_TOKEN".to_string());
        headers.insert("X-Plain".to_string(), "literal".to_string());
        let store = JsonStore::new(
            std::env::temp_dir(),
            "https://example.invalid/store.json".into(),
            headers,
            "h".into(),
            "a@x.com".into(),
            Duration::from_secs(1),
        )
        .unwrap();
        let resolved = store.resolved_headers();
        assert_eq!(resolved.get("Authorization").unwrap(), "secret123");
        assert_eq!(resolved.get("X-Plain").unwrap(), "literal");
    }
}
