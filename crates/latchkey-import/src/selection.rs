//! Mutable import selection and the skip-list contract.
//!
//! Given an immutable [`ValidationReport`], the [`ImportReconciler`]
//! maintains the user's selection against the fixed original index space:
//! which valid entries stay checked and which detected duplicates are
//! force-imported anyway. From that it derives exactly the skip list the
//! backend's confirm call expects:
//!
//! ```text
//! skip = (valid \ checked) ∪ (duplicates \ forced)
//! ```
//!
//! Unsupported and malformed records never participate — they are not
//! selectable and never appear in the skip list, because the backend does
//! not count them as import candidates in the first place.

use std::collections::BTreeSet;
use std::sync::Arc;

use latchkey_service::classify::ClassifiedError;
use latchkey_service::report::ValidationReport;
use latchkey_service::service::CredentialService;
use latchkey_service::types::ImportOutcome;
use tracing::{debug, warn};

/// Failure modes of [`ImportReconciler::confirm`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfirmError {
    /// The batch has no importable entries selected; the confirm action
    /// is suppressed rather than sent.
    #[error("nothing selected to import")]
    NothingToImport,

    /// The backend rejected the confirm call.
    #[error(transparent)]
    Service(#[from] ClassifiedError),
}

/// Mutable selection state over one validated batch.
///
/// Created alongside the report, destroyed when the batch is confirmed or
/// abandoned. Defaults: every valid entry checked, no duplicate forced.
pub struct ImportReconciler {
    report: ValidationReport,
    valid_indices: BTreeSet<usize>,
    duplicate_indices: BTreeSet<usize>,
    checked_valid: BTreeSet<usize>,
    forced_duplicates: BTreeSet<usize>,
}

impl ImportReconciler {
    pub fn new(report: ValidationReport) -> Self {
        let valid_indices = report.valid_indices();
        let duplicate_indices = report.duplicate_indices();
        Self {
            checked_valid: valid_indices.clone(),
            forced_duplicates: BTreeSet::new(),
            valid_indices,
            duplicate_indices,
            report,
        }
    }

    /// The report this selection runs over.
    pub fn report(&self) -> &ValidationReport {
        &self.report
    }

    /// Flip whether the valid entry at `index` is imported. Indices
    /// outside the valid set are rejected.
    pub fn toggle_valid(&mut self, index: usize) {
        if !self.valid_indices.contains(&index) {
            warn!(index, "toggle on a non-valid index ignored");
            return;
        }
        if !self.checked_valid.remove(&index) {
            self.checked_valid.insert(index);
        }
    }

    /// Flip whether the duplicate at `index` is force-imported. Indices
    /// outside the duplicate set are rejected.
    pub fn toggle_duplicate(&mut self, index: usize) {
        if !self.duplicate_indices.contains(&index) {
            warn!(index, "toggle on a non-duplicate index ignored");
            return;
        }
        if !self.forced_duplicates.remove(&index) {
            self.forced_duplicates.insert(index);
        }
    }

    /// Whether the valid entry at `index` is currently selected.
    pub fn is_checked(&self, index: usize) -> bool {
        self.checked_valid.contains(&index)
    }

    /// Whether the duplicate at `index` is currently force-imported.
    pub fn is_forced(&self, index: usize) -> bool {
        self.forced_duplicates.contains(&index)
    }

    /// Number of entries the confirm call would import.
    pub fn selected_count(&self) -> usize {
        self.checked_valid.len() + self.forced_duplicates.len()
    }

    /// The exact skip list the confirm call expects: unchecked valid
    /// indices plus unforced duplicate indices, in ascending order.
    pub fn skip_indices(&self) -> Vec<usize> {
        self.valid_indices
            .difference(&self.checked_valid)
            .chain(self.duplicate_indices.difference(&self.forced_duplicates))
            .copied()
            .collect::<BTreeSet<usize>>()
            .into_iter()
            .collect()
    }

    /// True when there is nothing to import: either the report has no
    /// candidates at all or the user deselected everything.
    pub fn is_empty_selection(&self) -> bool {
        self.selected_count() == 0
    }

    /// Send the confirm call with the derived skip list. Suppressed when
    /// nothing is selected.
    pub async fn confirm(
        &self,
        service: &Arc<dyn CredentialService>,
        payload: &str,
        password: Option<&str>,
    ) -> Result<ImportOutcome, ConfirmError> {
        if self.is_empty_selection() {
            return Err(ConfirmError::NothingToImport);
        }
        let skip = self.skip_indices();
        debug!(
            selected = self.selected_count(),
            skipped = skip.len(),
            "confirming import batch"
        );
        let outcome = service.confirm_import(payload, password, &skip).await?;
        Ok(outcome)
    }
}
