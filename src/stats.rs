//! Statistics reporter (C7): read-only queries over the outcome store.
//! No side effects, no writes — every method here is a plain aggregation
//! already computed by [`crate::persistence::PersistenceStore::stats`],
//! reshaped into reporting-friendly views plus the error-sample dump.

use crate::domain::outcome::ErrorKind;
use crate::error::Result;
use crate::persistence::{PersistenceStats, PersistenceStore};

const SAMPLES_PER_BUCKET: u32 = 5;

#[derive(Debug, Clone)]
pub struct ErrorKindSample {
    pub kind: ErrorKind,
    pub count: u64,
    pub messages: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct Report {
    pub stats: PersistenceStats,
    pub error_samples: Vec<ErrorKindSample>,
}

pub struct StatisticsReporter<'a> {
    store: &'a PersistenceStore,
}

impl<'a> StatisticsReporter<'a> {
    pub fn new(store: &'a PersistenceStore) -> Self {
        Self { store }
    }

    pub async fn report(&self) -> Result<Report> {
        let stats = self.store.stats().await?;
        let mut error_samples = Vec::new();
        for (kind, count) in &stats.by_error_kind {
            let messages = self.store.sample_error_messages(*kind, SAMPLES_PER_BUCKET).await?;
            error_samples.push(ErrorKindSample { kind: *kind, count: *count, messages });
        }
        Ok(Report { stats, error_samples })
    }

    /// Dedicated dump of recent error messages for one kind, for ad hoc
    /// diagnosis outside the full report.
    pub async fn debug_errors_sample(&self, kind: ErrorKind, limit: u32) -> Result<Vec<String>> {
        self.store.sample_error_messages(kind, limit).await
    }
}
