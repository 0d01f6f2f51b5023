use crate::domain::models::UserRole;

/// Every role-gated operation exposed by the API.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Action {
    CreateComplaint,
    ListComplaints,
    AssignComplaint,
    UpdateComplaintStatus,
    SubmitSentiment,
    CreatePetition,
    SignPetition,
    AssignPetition,
    VolunteerUpdatePetition,
    RespondPetition,
    UpdatePetitionStatus,
    ViewLocalPetitions,
    CreatePoll,
    ClosePoll,
    VotePoll,
    ListVolunteers,
    ViewAssignedWork,
    ViewReports,
}

const ALL_ROLES: &[UserRole] = &[
    UserRole::Citizen,
    UserRole::Official,
    UserRole::Volunteer,
    UserRole::Admin,
];
const CITIZEN: &[UserRole] = &[UserRole::Citizen];
const STAFF: &[UserRole] = &[UserRole::Official, UserRole::Admin];
const FIELD: &[UserRole] = &[UserRole::Volunteer, UserRole::Official, UserRole::Admin];
const VOLUNTEER: &[UserRole] = &[UserRole::Volunteer];
const ADMIN: &[UserRole] = &[UserRole::Admin];

impl Action {
    pub fn allowed_roles(&self) -> &'static [UserRole] {
        match self {
            Action::CreateComplaint
            | Action::SubmitSentiment
            | Action::VotePoll
            | Action::SignPetition => CITIZEN,
            Action::ListComplaints
            | Action::AssignComplaint
            | Action::AssignPetition
            | Action::RespondPetition
            | Action::ViewLocalPetitions
            | Action::CreatePoll
            | Action::ClosePoll
            | Action::ViewReports => STAFF,
            Action::UpdateComplaintStatus | Action::UpdatePetitionStatus => FIELD,
            Action::VolunteerUpdatePetition | Action::ViewAssignedWork => VOLUNTEER,
            Action::ListVolunteers => ADMIN,
            Action::CreatePetition => ALL_ROLES,
        }
    }

    /// Volunteers may only act on resources assigned to them for these actions.
    pub fn requires_assignment(&self, role: UserRole) -> bool {
        role == UserRole::Volunteer
            && matches!(
                self,
                Action::UpdateComplaintStatus
                    | Action::UpdatePetitionStatus
                    | Action::VolunteerUpdatePetition
            )
    }
}

pub fn permits(role: UserRole, action: Action) -> bool {
    action.allowed_roles().contains(&role)
}
