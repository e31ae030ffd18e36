//! Storage port: Trait for persisting analysis reports.
//!
//! This trait abstracts the storage backend (SQLite) from the application logic.

use crate::domain::AnalysisReport;

/// A page of reports with pagination metadata.
#[derive(Debug, Clone)]
pub struct ReportPage {
    /// Reports in this page, newest first
    pub items: Vec<AnalysisReport>,
    /// Total count of the user's reports
    pub total_count: usize,
    /// Current page offset
    pub offset: usize,
    /// Page size limit
    pub limit: usize,
    /// Whether there are more pages
    pub has_more: bool,
}

impl ReportPage {
    /// Create a new report page.
    #[must_use]
    pub fn new(items: Vec<AnalysisReport>, total_count: usize, offset: usize, limit: usize) -> Self {
        let has_more = offset + items.len() < total_count;
        Self {
            items,
            total_count,
            offset,
            limit,
            has_more,
        }
    }

    /// Get the next page offset.
    #[must_use]
    pub fn next_offset(&self) -> Option<usize> {
        if self.has_more {
            Some(self.offset + self.limit)
        } else {
            None
        }
    }

    /// Get the previous page offset.
    #[must_use]
    pub fn prev_offset(&self) -> Option<usize> {
        if self.offset > 0 {
            Some(self.offset.saturating_sub(self.limit))
        } else {
            None
        }
    }
}

/// Trait for report storage keyed by user and timestamp.
pub trait AssessmentStore: Send + Sync {
    /// Error type for storage operations.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Save a report for a user as one atomic write.
    ///
    /// # Errors
    /// Returns error if the write fails or a report already exists for the
    /// same user and timestamp.
    fn save_report(&self, user_id: &str, report: &AnalysisReport) -> Result<(), Self::Error>;

    /// Load a single report by id.
    ///
    /// # Returns
    /// `None` if no report has this id.
    ///
    /// # Errors
    /// Returns error if storage operation fails.
    fn load_report(&self, id: &str) -> Result<Option<AnalysisReport>, Self::Error>;

    /// Load a user's most recent reports (up to `limit`), newest first.
    ///
    /// # Errors
    /// Returns error if storage operation fails.
    fn load_recent(&self, user_id: &str, limit: usize) -> Result<Vec<AnalysisReport>, Self::Error>;

    /// Load a user's reports with pagination.
    ///
    /// # Arguments
    /// * `offset` - Starting position (0-indexed)
    /// * `limit` - Maximum number of items to return
    ///
    /// # Errors
    /// Returns error if storage operation fails.
    fn load_page(&self, user_id: &str, offset: usize, limit: usize) -> Result<ReportPage, Self::Error>;

    /// Count a user's reports.
    ///
    /// # Errors
    /// Returns error if storage operation fails.
    fn count(&self, user_id: &str) -> Result<usize, Self::Error>;

    /// Delete one of a user's reports. Returns whether a row was removed.
    ///
    /// # Errors
    /// Returns error if storage operation fails.
    fn delete_report(&self, user_id: &str, id: &str) -> Result<bool, Self::Error>;

    /// Delete all of a user's reports.
    ///
    /// # Errors
    /// Returns error if storage operation fails.
    fn clear_user(&self, user_id: &str) -> Result<usize, Self::Error>;
}
