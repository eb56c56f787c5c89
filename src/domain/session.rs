//! Session state: cookie jar and caller identity.
//!
//! One process hosts one caller session, so this is a plain struct rather
//! than a keyed session registry for many concurrent sessions.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use crate::error::{BlockSweepError, Result};

/// Name of the CSRF cookie the upstream expects.
pub const CSRF_COOKIE: &str = "ct0";
/// Name of the session-auth cookie the upstream expects.
pub const AUTH_COOKIE: &str = "auth_token";

/// Cookie jar loaded from a `name = value` mapping file.
#[derive(Debug, Clone)]
pub struct CookieJar {
    cookies: HashMap<String, String>,
}

impl CookieJar {
    pub fn from_map(cookies: HashMap<String, String>) -> Result<Self> {
        if !cookies.contains_key(CSRF_COOKIE) {
            return Err(BlockSweepError::Config(format!(
                "cookie jar missing required CSRF cookie `{CSRF_COOKIE}`"
            )));
        }
        if !cookies.contains_key(AUTH_COOKIE) {
            return Err(BlockSweepError::Config(format!(
                "cookie jar missing required session-auth cookie `{AUTH_COOKIE}`"
            )));
        }
        Ok(Self { cookies })
    }

    pub fn csrf_token(&self) -> &str {
        self.cookies
            .get(CSRF_COOKIE)
            .expect("constructor enforces presence")
    }

    /// `name=value; name2=value2` suitable for a `Cookie` request header.
    pub fn header_value(&self) -> String {
        self.cookies
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join("; ")
    }
}

/// Per-process session state: the cookie jar plus the cached caller id
/// resolved from the first successful call.
#[derive(Debug)]
pub struct SessionState {
    pub jar: CookieJar,
    pub caller_id: Option<String>,
    jar_path: PathBuf,
    jar_loaded_at: SystemTime,
}

impl SessionState {
    pub fn load(jar_path: impl AsRef<Path>) -> Result<Self> {
        let jar_path = jar_path.as_ref().to_path_buf();
        let (jar, loaded_at) = Self::read_jar(&jar_path)?;
        Ok(Self {
            jar,
            caller_id: None,
            jar_path,
            jar_loaded_at: loaded_at,
        })
    }

    fn read_jar(path: &Path) -> Result<(CookieJar, SystemTime)> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            BlockSweepError::Config(format!("failed to read cookie jar {}: {e}", path.display()))
        })?;
        let cookies: HashMap<String, String> = serde_json::from_str(&content).map_err(|e| {
            BlockSweepError::Config(format!("malformed cookie jar {}: {e}", path.display()))
        })?;
        let mtime = std::fs::metadata(path)
            .and_then(|m| m.modified())
            .unwrap_or_else(|_| SystemTime::now());
        Ok((CookieJar::from_map(cookies)?, mtime))
    }

    /// Clear the cached caller id and re-read the cookie jar from disk.
    /// Called once when a call comes back classified as an auth failure;
    /// the jar's mtime is tracked so staleness can be checked independently.
    pub fn recover(&mut self) -> Result<()> {
        self.caller_id = None;
        let (jar, loaded_at) = Self::read_jar(&self.jar_path)?;
        self.jar = jar;
        self.jar_loaded_at = loaded_at;
        Ok(())
    }

    pub fn jar_path(&self) -> &Path {
        &self.jar_path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_jar(dir: &tempfile::TempDir, cookies: &serde_json::Value) -> PathBuf {
        let path = dir.path().join("cookies.json");
        let mut f = std::fs::File::create(&path).unwrap();
        write!(f, "{cookies}").unwrap();
        path
    }

    #[test]
    fn rejects_jar_missing_required_cookies() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_jar(&dir, &serde_json::json!({ "ct0": "abc" }));
        let err = SessionState::load(&path).unwrap_err();
        assert!(matches!(err, BlockSweepError::Config(_)));
    }

    #[test]
    fn loads_valid_jar_and_exposes_csrf_token() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_jar(
            &dir,
            &serde_json::json!({ "ct0": "csrf-value", "auth_token": "auth-value" }),
        );
        let session = SessionState::load(&path).unwrap();
        assert_eq!(session.jar.csrf_token(), "csrf-value");
        assert!(session.jar.header_value().contains("auth_token=auth-value"));
    }

    #[test]
    fn recover_clears_caller_id_and_rereads_jar() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_jar(
            &dir,
            &serde_json::json!({ "ct0": "first", "auth_token": "auth-value" }),
        );
        let mut session = SessionState::load(&path).unwrap();
        session.caller_id = Some("12345".into());

        let mut f = std::fs::File::create(&path).unwrap();
        write!(
            f,
            "{}",
            serde_json::json!({ "ct0": "second", "auth_token": "auth-value" })
        )
        .unwrap();

        session.recover().unwrap();
        assert!(session.caller_id.is_none());
        assert_eq!(session.jar.csrf_token(), "second");
    }
}
