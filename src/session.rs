//! Upload session state machine.

use std::fmt;

use crate::error::{Result, UploadError};
use crate::parts::PartResults;

/// Lifecycle state of one multipart upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    Initiated,
    Uploading,
    Completing,
    Completed,
    Aborting,
    Aborted,
}

impl SessionState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Aborted)
    }

    fn can_transition_to(&self, next: SessionState) -> bool {
        use SessionState::*;
        matches!(
            (self, next),
            (Initiated, Uploading)
                | (Initiated, Aborting)
                | (Uploading, Completing)
                | (Uploading, Aborting)
                | (Completing, Completed)
                | (Completing, Aborting)
                | (Aborting, Aborted)
        )
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Initiated => "initiated",
            Self::Uploading => "uploading",
            Self::Completing => "completing",
            Self::Completed => "completed",
            Self::Aborting => "aborting",
            Self::Aborted => "aborted",
        };
        f.write_str(name)
    }
}

/// Where an upload lands. Fixed for the lifetime of a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadTarget {
    pub bucket: String,
    pub key: String,
    pub content_type: String,
}

/// A multipart upload identified by the store-issued upload id.
#[derive(Debug)]
pub struct UploadSession {
    target: UploadTarget,
    upload_id: String,
    state: SessionState,
    parts: PartResults,
}

impl UploadSession {
    pub fn new(target: UploadTarget, upload_id: impl Into<String>) -> Self {
        Self {
            target,
            upload_id: upload_id.into(),
            state: SessionState::Initiated,
            parts: PartResults::new(),
        }
    }

    pub fn target(&self) -> &UploadTarget {
        &self.target
    }

    pub fn upload_id(&self) -> &str {
        &self.upload_id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn parts(&self) -> &PartResults {
        &self.parts
    }

    /// Records a part ETag. Only valid while uploading.
    pub fn record_part(&mut self, part_number: u32, etag: impl Into<String>) -> Result<()> {
        if self.state != SessionState::Uploading {
            return Err(UploadError::InvalidTransition {
                from: self.state,
                to: SessionState::Uploading,
            });
        }
        self.parts.record(part_number, etag);
        Ok(())
    }

    pub fn transition(&mut self, next: SessionState) -> Result<()> {
        if !self.state.can_transition_to(next) {
            return Err(UploadError::InvalidTransition {
                from: self.state,
                to: next,
            });
        }
        tracing::trace!(
            upload_id = %self.upload_id,
            from = %self.state,
            to = %next,
            "session transition"
        );
        self.state = next;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> UploadSession {
        UploadSession::new(
            UploadTarget {
                bucket: "space".into(),
                key: "video.mp4".into(),
                content_type: "video/mp4".into(),
            },
            "upload-1",
        )
    }

    #[test]
    fn test_happy_path() {
        let mut s = session();
        s.transition(SessionState::Uploading).unwrap();
        s.record_part(1, "\"etag\"").unwrap();
        s.transition(SessionState::Completing).unwrap();
        s.transition(SessionState::Completed).unwrap();
        assert!(s.state().is_terminal());
    }

    #[test]
    fn test_terminal_states_are_final() {
        let mut s = session();
        s.transition(SessionState::Uploading).unwrap();
        s.transition(SessionState::Aborting).unwrap();
        s.transition(SessionState::Aborted).unwrap();

        for next in [
            SessionState::Uploading,
            SessionState::Completing,
            SessionState::Completed,
            SessionState::Aborting,
        ] {
            assert!(matches!(
                s.transition(next),
                Err(UploadError::InvalidTransition { from: SessionState::Aborted, .. })
            ));
        }
    }

    #[test]
    fn test_every_abort_path_reaches_aborted() {
        let paths: [&[SessionState]; 3] = [
            &[],
            &[SessionState::Uploading],
            &[SessionState::Uploading, SessionState::Completing],
        ];
        for path in paths {
            let mut s = session();
            for &state in path {
                s.transition(state).unwrap();
            }
            s.transition(SessionState::Aborting).unwrap();
            s.transition(SessionState::Aborted).unwrap();
            assert_eq!(s.state(), SessionState::Aborted);
        }
    }

    #[test]
    fn test_cannot_complete_after_abort_starts() {
        let mut s = session();
        s.transition(SessionState::Uploading).unwrap();
        s.transition(SessionState::Aborting).unwrap();
        assert!(s.transition(SessionState::Completed).is_err());
    }

    #[test]
    fn test_record_part_outside_uploading() {
        let mut s = session();
        assert!(s.record_part(1, "\"etag\"").is_err());
        assert!(s.parts().is_empty());
    }
}
