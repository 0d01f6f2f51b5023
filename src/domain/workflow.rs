//! Status vocabularies for complaints and petitions.
//!
//! The two workflows are deliberately separate types. Any status may follow any
//! other; who may move a record is decided by the permission table, and
//! concurrent moves are caught by the conditional update in the store.

use crate::domain::models::{ComplaintStatus, PetitionStatus, StatusChange};
use chrono::Utc;
use uuid::Uuid;

impl ComplaintStatus {
    pub const ALL: [ComplaintStatus; 3] = [
        ComplaintStatus::Received,
        ComplaintStatus::InReview,
        ComplaintStatus::Resolved,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ComplaintStatus::Received => "received",
            ComplaintStatus::InReview => "in_review",
            ComplaintStatus::Resolved => "resolved",
        }
    }
}

impl TryFrom<&str> for ComplaintStatus {
    type Error = String;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        ComplaintStatus::ALL
            .into_iter()
            .find(|s| s.as_str() == value.trim())
            .ok_or_else(|| invalid_status(&ComplaintStatus::ALL.map(|s| s.as_str())))
    }
}

impl PetitionStatus {
    pub const ALL: [PetitionStatus; 5] = [
        PetitionStatus::Active,
        PetitionStatus::Assigned,
        PetitionStatus::UnderReview,
        PetitionStatus::Responded,
        PetitionStatus::Closed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PetitionStatus::Active => "active",
            PetitionStatus::Assigned => "assigned",
            PetitionStatus::UnderReview => "under_review",
            PetitionStatus::Responded => "responded",
            PetitionStatus::Closed => "closed",
        }
    }
}

impl TryFrom<&str> for PetitionStatus {
    type Error = String;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        PetitionStatus::ALL
            .into_iter()
            .find(|s| s.as_str() == value.trim())
            .ok_or_else(|| invalid_status(&PetitionStatus::ALL.map(|s| s.as_str())))
    }
}

fn invalid_status(allowed: &[&str]) -> String {
    format!("Invalid status. Allowed: {}", allowed.join(", "))
}

/// A requested move from `from` to `to`, applied only if the record is still in `from`.
#[derive(Debug, Clone)]
pub struct Transition<S> {
    pub from: S,
    pub to: S,
    pub actor: Uuid,
    /// Audit note stored in the history entry.
    pub note: Option<String>,
    /// New assignee, when the transition is an assignment.
    pub assign_to: Option<Uuid>,
    /// Complaints: replaces admin notes. Petitions: appended to the official response.
    pub remark: Option<String>,
    /// When set, the record must still be assigned to this user.
    pub held_by: Option<Uuid>,
}

impl<S: Copy> Transition<S> {
    pub fn new(from: S, to: S, actor: Uuid) -> Self {
        Self {
            from,
            to,
            actor,
            note: None,
            assign_to: None,
            remark: None,
            held_by: None,
        }
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }

    pub fn assigning(mut self, assignee: Uuid) -> Self {
        self.assign_to = Some(assignee);
        self
    }

    pub fn with_remark(mut self, remark: impl Into<String>) -> Self {
        self.remark = Some(remark.into());
        self
    }

    pub fn only_if_assigned_to(mut self, assignee: Option<Uuid>) -> Self {
        self.held_by = assignee;
        self
    }
}

pub fn history_entry(status: &str, actor: Uuid, note: Option<&str>) -> StatusChange {
    StatusChange {
        status: status.to_string(),
        changed_at: Utc::now(),
        changed_by: Some(actor),
        note: note.map(str::to_string),
    }
}

pub fn volunteer_note_line(note: &str) -> String {
    format!("\nVolunteer note: {}", note.trim())
}

pub fn official_response_line(comment: &str) -> String {
    format!("\nAdmin: {}", comment.trim())
}

pub fn response_status(close: bool) -> PetitionStatus {
    if close {
        PetitionStatus::Closed
    } else {
        PetitionStatus::Responded
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn complaint_status_parses_known_values() {
        assert_eq!(ComplaintStatus::try_from("in_review"), Ok(ComplaintStatus::InReview));
        let err = ComplaintStatus::try_from("closed").unwrap_err();
        assert_eq!(err, "Invalid status. Allowed: received, in_review, resolved");
    }

    #[test]
    fn petition_status_rejects_complaint_vocabulary() {
        assert!(PetitionStatus::try_from("resolved").is_err());
        assert_eq!(PetitionStatus::try_from(" under_review "), Ok(PetitionStatus::UnderReview));
    }

    #[test]
    fn respond_closes_only_when_asked() {
        assert_eq!(response_status(true), PetitionStatus::Closed);
        assert_eq!(response_status(false), PetitionStatus::Responded);
    }

    #[test]
    fn transition_builder_keeps_fields() {
        let actor = Uuid::new_v4();
        let assignee = Uuid::new_v4();
        let t = Transition::new(PetitionStatus::Active, PetitionStatus::Assigned, actor)
            .assigning(assignee)
            .with_note("Assigned to volunteer");
        assert_eq!(t.assign_to, Some(assignee));
        assert_eq!(t.note.as_deref(), Some("Assigned to volunteer"));
        assert!(t.remark.is_none());
        assert!(t.held_by.is_none());

        let volunteer = Uuid::new_v4();
        let t = Transition::new(ComplaintStatus::InReview, ComplaintStatus::Resolved, volunteer)
            .only_if_assigned_to(Some(volunteer));
        assert_eq!(t.held_by, Some(volunteer));
    }
}
