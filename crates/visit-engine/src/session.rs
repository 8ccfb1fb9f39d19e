//! Caller-owned handle over one preview's lifecycle.
//!
//! A session is Open while the operator edits, then ends exactly once:
//! Committed after a successful commit, or Abandoned when discarded. A closed
//! session refuses further edits and commits; a new preview must be built.

use crate::conflict::ConflictDetector;
use crate::editor::{EditRequest, PreviewEditor};
use crate::error::{Result, ScheduleError};
use crate::preview::SchedulePreview;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Open,
    Committed,
    Abandoned,
}

#[derive(Debug)]
pub struct PreviewSession {
    preview: Option<SchedulePreview>,
    status: SessionStatus,
}

impl PreviewSession {
    pub fn new(preview: SchedulePreview) -> Self {
        Self {
            preview: Some(preview),
            status: SessionStatus::Open,
        }
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    pub fn is_open(&self) -> bool {
        self.status == SessionStatus::Open
    }

    pub fn preview(&self) -> Result<&SchedulePreview> {
        match (&self.preview, self.status) {
            (Some(p), SessionStatus::Open) => Ok(p),
            _ => Err(self.closed()),
        }
    }

    pub fn preview_mut(&mut self) -> Result<&mut SchedulePreview> {
        match self.status {
            SessionStatus::Open => {}
            _ => return Err(self.closed()),
        }
        self.preview.as_mut().ok_or(ScheduleError::SessionClosed("no preview"))
    }

    /// Borrow an editor over the held preview.
    pub fn editor<'s, 'd, 'a>(&'s mut self, detector: &'d ConflictDetector<'a>) -> Result<PreviewEditor<'s, 'd, 'a>> {
        Ok(PreviewEditor::new(self.preview_mut()?, detector))
    }

    /// Apply a sequence of edits in order, stopping at the first failure.
    pub fn apply_all(&mut self, detector: &ConflictDetector<'_>, edits: &[EditRequest]) -> Result<()> {
        let mut editor = self.editor(detector)?;
        for edit in edits {
            editor.apply(edit)?;
        }
        Ok(())
    }

    /// Discard the preview without committing anything.
    pub fn abandon(&mut self) -> Result<()> {
        self.preview_mut()?;
        self.preview = None;
        self.status = SessionStatus::Abandoned;
        Ok(())
    }

    /// Tear down after a successful commit.
    #[cfg_attr(not(feature = "commit"), allow(dead_code))]
    pub(crate) fn finish(&mut self) {
        self.preview = None;
        self.status = SessionStatus::Committed;
    }

    fn closed(&self) -> ScheduleError {
        match self.status {
            SessionStatus::Committed => ScheduleError::SessionClosed("already committed"),
            SessionStatus::Abandoned => ScheduleError::SessionClosed("abandoned"),
            SessionStatus::Open => ScheduleError::SessionClosed("no preview"),
        }
    }
}

impl From<SchedulePreview> for PreviewSession {
    fn from(preview: SchedulePreview) -> Self {
        Self::new(preview)
    }
}
