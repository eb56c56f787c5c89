//! Target identifiers and the target-list file contract.

use serde::{Deserialize, Serialize};

/// Which identifier form a target list uses. The whole list is homogeneous.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetFormat {
    ScreenName,
    UserId,
}

impl TargetFormat {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "screen_name" => Some(Self::ScreenName),
            "user_id" => Some(Self::UserId),
            _ => None,
        }
    }
}

/// The on-disk target-list file: `{format, users}`.
#[derive(Debug, Clone, Deserialize)]
pub struct TargetListFile {
    pub format: String,
    pub users: Vec<String>,
}

/// A resolved, homogeneous target list ready for batching.
#[derive(Debug, Clone)]
pub struct TargetList {
    pub format: TargetFormat,
    pub items: Vec<String>,
}

impl TargetList {
    pub fn from_file(raw: TargetListFile) -> Result<Self, String> {
        let format = TargetFormat::parse(&raw.format)
            .ok_or_else(|| format!("unknown target list format: {}", raw.format))?;
        Ok(Self {
            format,
            items: raw.users,
        })
    }

    /// Slice the list into batches of at most `batch_size`.
    pub fn batches(&self, batch_size: usize) -> impl Iterator<Item = &[String]> {
        self.items.chunks(batch_size.max(1))
    }
}
