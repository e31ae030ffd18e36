//! History service: per-user analysis records and trends.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::adapters::StorageError;
use crate::domain::{AnalysisReport, RiskCategory};
use crate::ports::{AssessmentStore, ReportPage};
use crate::GlycofuseError;

/// Number of recent reports the summary averages over.
const SUMMARY_WINDOW: usize = 10;

/// Direction of change between the two most recent analyses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskTrend {
    Improving,
    Worsening,
    Stable,
}

impl RiskTrend {
    /// Compare the latest combined risk with the one before it.
    #[must_use]
    pub fn between(previous: f64, latest: f64) -> Self {
        if latest < previous {
            Self::Improving
        } else if latest > previous {
            Self::Worsening
        } else {
            Self::Stable
        }
    }
}

/// Overview of a user's stored analyses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistorySummary {
    pub total_analyses: usize,
    pub latest_risk: Option<f64>,
    pub latest_category: Option<RiskCategory>,
    /// Mean combined risk over the most recent analyses
    pub average_risk: Option<f64>,
    /// `None` until there are two analyses
    pub risk_trend: Option<RiskTrend>,
}

/// Service for recording and reading analysis history.
pub struct HistoryService<S>
where
    S: AssessmentStore,
{
    store: Arc<S>,
}

impl<S> HistoryService<S>
where
    S: AssessmentStore,
    S::Error: Into<StorageError>,
{
    /// Create a new history service.
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Persist a completed report for a user.
    ///
    /// # Errors
    /// Returns error if the store rejects the write.
    pub fn record(&self, user_id: &str, report: &AnalysisReport) -> crate::Result<()> {
        self.store
            .save_report(user_id, report)
            .map_err(|e| GlycofuseError::Storage(e.into()))?;
        tracing::info!("Recorded analysis {} ({})", report.id, report.assessment.risk_category.as_str());
        Ok(())
    }

    /// Most recent reports, newest first.
    ///
    /// # Errors
    /// Returns error if storage fails.
    pub fn recent(&self, user_id: &str, limit: usize) -> crate::Result<Vec<AnalysisReport>> {
        self.store
            .load_recent(user_id, limit)
            .map_err(|e| GlycofuseError::Storage(e.into()))
    }

    /// One page of reports, newest first.
    ///
    /// # Errors
    /// Returns error if storage fails.
    pub fn page(&self, user_id: &str, offset: usize, limit: usize) -> crate::Result<ReportPage> {
        self.store
            .load_page(user_id, offset, limit)
            .map_err(|e| GlycofuseError::Storage(e.into()))
    }

    /// # Errors
    /// Returns error if storage fails.
    pub fn count(&self, user_id: &str) -> crate::Result<usize> {
        self.store
            .count(user_id)
            .map_err(|e| GlycofuseError::Storage(e.into()))
    }

    /// Fetch one report by id.
    ///
    /// # Errors
    /// Returns `Storage(NotFound)` if no report has this id.
    pub fn get(&self, id: &str) -> crate::Result<AnalysisReport> {
        self.store
            .load_report(id)
            .map_err(|e| GlycofuseError::Storage(e.into()))?
            .ok_or_else(|| GlycofuseError::Storage(StorageError::NotFound(format!("report {id}"))))
    }

    /// Delete one of the user's reports.
    ///
    /// # Errors
    /// Returns `Storage(NotFound)` if the user has no report with this id.
    pub fn delete(&self, user_id: &str, id: &str) -> crate::Result<()> {
        let deleted = self
            .store
            .delete_report(user_id, id)
            .map_err(|e| GlycofuseError::Storage(e.into()))?;
        if deleted {
            Ok(())
        } else {
            Err(GlycofuseError::Storage(StorageError::NotFound(format!("report {id}"))))
        }
    }

    /// Summarize the user's history.
    ///
    /// # Errors
    /// Returns error if storage fails.
    pub fn summary(&self, user_id: &str) -> crate::Result<HistorySummary> {
        let total_analyses = self.count(user_id)?;
        let recent = self.recent(user_id, SUMMARY_WINDOW)?;
        let risks: Vec<f64> = recent.iter().map(|r| r.assessment.combined_risk).collect();

        let average_risk = if risks.is_empty() {
            None
        } else {
            Some(risks.iter().sum::<f64>() / risks.len() as f64)
        };
        let risk_trend = match risks.as_slice() {
            [latest, previous, ..] => Some(RiskTrend::between(*previous, *latest)),
            _ => None,
        };

        Ok(HistorySummary {
            total_analyses,
            latest_risk: risks.first().copied(),
            latest_category: recent.first().map(|r| r.assessment.risk_category),
            average_risk,
            risk_trend,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::sqlite::tests::report;
    use crate::adapters::sqlite::SqliteStore;

    fn service() -> HistoryService<SqliteStore> {
        HistoryService::new(Arc::new(SqliteStore::in_memory().expect("Should create db")))
    }

    #[test]
    fn test_empty_summary() {
        let summary = service().summary("alice").expect("Should summarize");
        assert_eq!(summary.total_analyses, 0);
        assert_eq!(summary.latest_risk, None);
        assert_eq!(summary.risk_trend, None);
    }

    #[test]
    fn test_trend_improving() {
        let history = service();
        history.record("alice", &report(0.62, 0)).expect("Should record");
        history.record("alice", &report(0.41, 10)).expect("Should record");

        let summary = history.summary("alice").expect("Should summarize");
        assert_eq!(summary.total_analyses, 2);
        assert_eq!(summary.latest_risk, Some(0.41));
        assert_eq!(summary.latest_category, Some(RiskCategory::Moderate));
        assert_eq!(summary.risk_trend, Some(RiskTrend::Improving));
        let avg = summary.average_risk.expect("Should average");
        assert!((avg - 0.515).abs() < 1e-9);
    }

    #[test]
    fn test_trend_worsening_and_stable() {
        assert_eq!(RiskTrend::between(0.2, 0.3), RiskTrend::Worsening);
        assert_eq!(RiskTrend::between(0.3, 0.3), RiskTrend::Stable);
        assert_eq!(RiskTrend::between(0.3, 0.2), RiskTrend::Improving);
    }

    #[test]
    fn test_get_and_delete() {
        let history = service();
        let r = report(0.3, 0);
        history.record("alice", &r).expect("Should record");

        assert_eq!(history.get(&r.id).expect("Should find").id, r.id);
        assert!(matches!(
            history.delete("bob", &r.id),
            Err(GlycofuseError::Storage(StorageError::NotFound(_)))
        ));
        history.delete("alice", &r.id).expect("Should delete");
        assert!(history.get(&r.id).is_err());
        assert_eq!(history.count("alice").expect("Should count"), 0);
    }
}
