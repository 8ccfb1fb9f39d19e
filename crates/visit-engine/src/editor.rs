//! Operator edits on a held [`SchedulePreview`].
//!
//! Every edit validates its keys first and is all-or-nothing: if any key is
//! unknown, nothing changes and [`ScheduleError::UnknownOccurrence`] lists the
//! offenders so callers can detect stale state.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::conflict::{ConflictDetector, ConflictKind};
use crate::error::{Result, ScheduleError};
use crate::model::{OccurrenceKey, StaffId};
use crate::preview::SchedulePreview;

/// One edit, as sent by a client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "camelCase")]
pub enum EditRequest {
    Select { keys: Vec<OccurrenceKey> },
    Deselect { keys: Vec<OccurrenceKey> },
    SelectAll,
    DeselectAll,
    Remove { keys: Vec<OccurrenceKey> },
    #[serde(rename_all = "camelCase")]
    ReassignStaff {
        keys: Vec<OccurrenceKey>,
        #[serde(default)]
        staff_id: Option<StaffId>,
    },
    Acknowledge { keys: Vec<OccurrenceKey>, kind: ConflictKind },
    Unacknowledge { keys: Vec<OccurrenceKey>, kind: ConflictKind },
}

/// Applies edits to one preview, re-validating through `detector` when an
/// edit can change which conflicts apply.
pub struct PreviewEditor<'p, 'd, 'a> {
    preview: &'p mut SchedulePreview,
    detector: &'d ConflictDetector<'a>,
}

impl<'p, 'd, 'a> PreviewEditor<'p, 'd, 'a> {
    pub fn new(preview: &'p mut SchedulePreview, detector: &'d ConflictDetector<'a>) -> Self {
        Self { preview, detector }
    }

    pub fn apply(&mut self, request: &EditRequest) -> Result<()> {
        match request {
            EditRequest::Select { keys } => self.select(keys),
            EditRequest::Deselect { keys } => self.deselect(keys),
            EditRequest::SelectAll => {
                self.select_all();
                Ok(())
            }
            EditRequest::DeselectAll => {
                self.deselect_all();
                Ok(())
            }
            EditRequest::Remove { keys } => self.remove(keys),
            EditRequest::ReassignStaff { keys, staff_id } => self.reassign_staff(keys, staff_id.clone()),
            EditRequest::Acknowledge { keys, kind } => self.set_resolved(keys, *kind, true).map(|_| ()),
            EditRequest::Unacknowledge { keys, kind } => self.set_resolved(keys, *kind, false).map(|_| ()),
        }
    }

    pub fn select(&mut self, keys: &[OccurrenceKey]) -> Result<()> {
        self.ensure_known(keys)?;
        self.preview.selected.extend(keys.iter().copied());
        Ok(())
    }

    pub fn deselect(&mut self, keys: &[OccurrenceKey]) -> Result<()> {
        self.ensure_known(keys)?;
        for key in keys {
            self.preview.selected.remove(key);
        }
        Ok(())
    }

    pub fn select_all(&mut self) {
        self.preview.selected = self.preview.occurrences.iter().map(|o| o.key).collect();
    }

    pub fn deselect_all(&mut self) {
        self.preview.selected.clear();
    }

    /// Permanently drop occurrences and their conflicts. Conflicts on the
    /// remaining occurrences are left exactly as they were.
    pub fn remove(&mut self, keys: &[OccurrenceKey]) -> Result<()> {
        self.ensure_known(keys)?;
        let preview = &mut *self.preview;
        preview.occurrences.retain(|o| !keys.contains(&o.key));
        preview.conflicts.retain(|c| !keys.contains(&c.occurrence_key));
        for key in keys {
            preview.selected.remove(key);
        }
        debug!(removed = keys.len(), remaining = preview.occurrences.len(), "removed occurrences");
        Ok(())
    }

    /// Change (or clear, with `None`) the staff on `keys`, then re-derive the
    /// conflicts of exactly those occurrences. Re-derived conflicts start
    /// unresolved; earlier acknowledgements on them are discarded.
    pub fn reassign_staff(&mut self, keys: &[OccurrenceKey], staff: Option<StaffId>) -> Result<()> {
        self.ensure_known(keys)?;
        let preview = &mut *self.preview;

        let mut indices: Vec<usize> = keys.iter().filter_map(|k| preview.position(k)).collect();
        indices.sort_unstable();
        indices.dedup();

        for &i in &indices {
            preview.occurrences[i].staff_id = staff.clone();
        }
        preview.conflicts.retain(|c| !keys.contains(&c.occurrence_key));

        for &i in &indices {
            let planned = preview.units_planned_before(i);
            let fresh = self.detector.check(&preview.occurrences[i], planned);
            preview.conflicts.extend(fresh);
        }
        preview.sort_conflicts();

        debug!(
            reassigned = indices.len(),
            staff = staff.as_ref().map(|s| s.as_str()).unwrap_or("<none>"),
            "reassigned staff"
        );
        Ok(())
    }

    /// Mark conflicts of `kind` on `keys` as acknowledged by the operator.
    /// Returns how many conflicts changed.
    pub fn acknowledge(&mut self, keys: &[OccurrenceKey], kind: ConflictKind) -> Result<usize> {
        self.set_resolved(keys, kind, true)
    }

    /// Withdraw a previous acknowledgement.
    pub fn unacknowledge(&mut self, keys: &[OccurrenceKey], kind: ConflictKind) -> Result<usize> {
        self.set_resolved(keys, kind, false)
    }

    fn set_resolved(&mut self, keys: &[OccurrenceKey], kind: ConflictKind, resolved: bool) -> Result<usize> {
        self.ensure_known(keys)?;
        let mut changed = 0;
        for conflict in self
            .preview
            .conflicts
            .iter_mut()
            .filter(|c| c.kind == kind && keys.contains(&c.occurrence_key))
        {
            if conflict.resolved != resolved {
                conflict.resolved = resolved;
                changed += 1;
            }
        }
        Ok(changed)
    }

    fn ensure_known(&self, keys: &[OccurrenceKey]) -> Result<()> {
        let unknown: Vec<OccurrenceKey> = keys
            .iter()
            .filter(|k| !self.preview.contains(k))
            .copied()
            .collect();
        if unknown.is_empty() {
            Ok(())
        } else {
            Err(ScheduleError::UnknownOccurrence(unknown))
        }
    }
}
