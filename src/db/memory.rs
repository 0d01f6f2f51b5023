//! In-process store used when no database is configured and by the test suite.

use super::{
    ComplaintFilter, HistorySubject, NewComplaint, NewNotification, NewPetition, NewPoll, NewUser,
    ProfileUpdate, ReportSubject, StatusCount, Store, StoreError, StoreResult,
};
use crate::domain::models::{
    Complaint, ComplaintStatus, Notification, Petition, PetitionStatus, Poll, PollStatus,
    Sentiment, StatusChange, User, UserRole,
};
use crate::domain::workflow::{history_entry, Transition};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use tokio::sync::RwLock;
use uuid::Uuid;

struct ResetToken {
    user_id: Uuid,
    expires_at: DateTime<Utc>,
    used: bool,
}

#[derive(Default)]
struct Tables {
    users: HashMap<Uuid, User>,
    revoked_tokens: HashMap<String, DateTime<Utc>>,
    reset_tokens: HashMap<String, ResetToken>,
    complaints: HashMap<Uuid, Complaint>,
    // (complaint, voter) is the key, so a second insert is a duplicate.
    sentiments: HashMap<(Uuid, Uuid), Sentiment>,
    petitions: HashMap<Uuid, Petition>,
    signatures: HashMap<(Uuid, Uuid), DateTime<Utc>>,
    history: HashMap<(&'static str, Uuid), Vec<StatusChange>>,
    polls: HashMap<Uuid, Poll>,
    poll_votes: HashMap<(Uuid, Uuid), String>,
    notifications: Vec<Notification>,
}

#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn newest_first<T, F>(items: &mut [T], key: F)
where
    F: Fn(&T) -> DateTime<Utc>,
{
    items.sort_by(|a, b| key(b).cmp(&key(a)));
}

fn group_counts<'a, I>(values: I) -> Vec<(String, i64)>
where
    I: Iterator<Item = &'a str>,
{
    let mut grouped: BTreeMap<String, i64> = BTreeMap::new();
    for value in values {
        *grouped.entry(value.to_string()).or_insert(0) += 1;
    }
    grouped.into_iter().collect()
}

#[async_trait]
impl Store for MemoryStore {
    async fn create_user(&self, user: NewUser) -> StoreResult<User> {
        let mut tables = self.tables.write().await;
        if tables.users.values().any(|u| u.email == user.email) {
            return Err(StoreError::Duplicate);
        }
        let now = Utc::now();
        let record = User {
            id: Uuid::new_v4(),
            name: user.name,
            email: user.email,
            password_hash: user.password_hash,
            role: user.role,
            location: user.location,
            latitude: user.latitude,
            longitude: user.longitude,
            created_at: now,
            updated_at: now,
        };
        tables.users.insert(record.id, record.clone());
        Ok(record)
    }

    async fn find_user(&self, id: Uuid) -> StoreResult<Option<User>> {
        Ok(self.tables.read().await.users.get(&id).cloned())
    }

    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        let tables = self.tables.read().await;
        Ok(tables.users.values().find(|u| u.email == email).cloned())
    }

    async fn update_profile(&self, id: Uuid, update: ProfileUpdate) -> StoreResult<User> {
        let mut tables = self.tables.write().await;
        let user = tables.users.get_mut(&id).ok_or(StoreError::NotFound)?;
        if let Some(name) = update.name {
            user.name = name;
        }
        if let Some(location) = update.location {
            user.location = location;
        }
        if let Some((lat, lng)) = update.coordinates {
            user.latitude = Some(lat);
            user.longitude = Some(lng);
        }
        user.updated_at = Utc::now();
        Ok(user.clone())
    }

    async fn set_password_hash(&self, id: Uuid, hash: &str) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        let user = tables.users.get_mut(&id).ok_or(StoreError::NotFound)?;
        user.password_hash = hash.to_string();
        user.updated_at = Utc::now();
        Ok(())
    }

    async fn list_users_by_role(&self, role: UserRole) -> StoreResult<Vec<User>> {
        let tables = self.tables.read().await;
        let mut users: Vec<User> = tables.users.values().filter(|u| u.role == role).cloned().collect();
        newest_first(&mut users, |u| u.created_at);
        Ok(users)
    }

    async fn revoke_token(&self, token_hash: &str, expires_at: DateTime<Utc>) -> StoreResult<()> {
        self.tables
            .write()
            .await
            .revoked_tokens
            .insert(token_hash.to_string(), expires_at);
        Ok(())
    }

    async fn is_token_revoked(&self, token_hash: &str) -> StoreResult<bool> {
        Ok(self.tables.read().await.revoked_tokens.contains_key(token_hash))
    }

    async fn store_reset_token(
        &self,
        user_id: Uuid,
        token_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> StoreResult<()> {
        self.tables.write().await.reset_tokens.insert(
            token_hash.to_string(),
            ResetToken {
                user_id,
                expires_at,
                used: false,
            },
        );
        Ok(())
    }

    async fn consume_reset_token(
        &self,
        token_hash: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<Uuid>> {
        let mut tables = self.tables.write().await;
        match tables.reset_tokens.get_mut(token_hash) {
            Some(token) if !token.used && token.expires_at > now => {
                token.used = true;
                Ok(Some(token.user_id))
            }
            _ => Ok(None),
        }
    }

    async fn purge_expired_tokens(&self, now: DateTime<Utc>) -> StoreResult<u64> {
        let mut tables = self.tables.write().await;
        let before = tables.revoked_tokens.len() + tables.reset_tokens.len();
        tables.revoked_tokens.retain(|_, exp| *exp > now);
        tables.reset_tokens.retain(|_, t| t.expires_at > now && !t.used);
        let after = tables.revoked_tokens.len() + tables.reset_tokens.len();
        Ok((before - after) as u64)
    }

    async fn create_complaint(&self, complaint: NewComplaint) -> StoreResult<Complaint> {
        let mut tables = self.tables.write().await;
        let now = Utc::now();
        let record = Complaint {
            id: Uuid::new_v4(),
            title: complaint.title,
            description: complaint.description,
            category: complaint.category,
            priority: complaint.priority,
            location: complaint.location,
            photo_url: complaint.photo_url,
            created_by: complaint.created_by,
            assigned_to: None,
            status: ComplaintStatus::Received,
            admin_notes: complaint.admin_notes,
            resolved_at: None,
            created_at: now,
            updated_at: now,
        };
        tables.complaints.insert(record.id, record.clone());
        Ok(record)
    }

    async fn find_complaint(&self, id: Uuid) -> StoreResult<Option<Complaint>> {
        Ok(self.tables.read().await.complaints.get(&id).cloned())
    }

    async fn list_complaints(
        &self,
        filter: &ComplaintFilter,
    ) -> StoreResult<(Vec<Complaint>, i64)> {
        let tables = self.tables.read().await;
        let mut matching: Vec<Complaint> = tables
            .complaints
            .values()
            .filter(|c| filter.status.map_or(true, |s| c.status == s))
            .filter(|c| filter.category.map_or(true, |cat| c.category == cat))
            .filter(|c| filter.priority.map_or(true, |p| c.priority == p))
            .filter(|c| filter.assigned_to.map_or(true, |a| c.assigned_to == Some(a)))
            .cloned()
            .collect();
        newest_first(&mut matching, |c| c.created_at);
        let total = matching.len() as i64;
        let page = match filter.limit {
            Some(limit) => matching
                .into_iter()
                .skip(usize::try_from(filter.offset()).unwrap_or(usize::MAX))
                .take(usize::try_from(limit).unwrap_or(0))
                .collect(),
            None => matching,
        };
        Ok((page, total))
    }

    async fn set_complaint_photo(&self, id: Uuid, url: &str) -> StoreResult<Complaint> {
        let mut tables = self.tables.write().await;
        let complaint = tables.complaints.get_mut(&id).ok_or(StoreError::NotFound)?;
        complaint.photo_url = Some(url.to_string());
        complaint.updated_at = Utc::now();
        Ok(complaint.clone())
    }

    async fn transition_complaint(
        &self,
        id: Uuid,
        transition: &Transition<ComplaintStatus>,
    ) -> StoreResult<Complaint> {
        let mut tables = self.tables.write().await;
        let complaint = tables.complaints.get_mut(&id).ok_or(StoreError::NotFound)?;
        if transition.held_by.is_some() && complaint.assigned_to != transition.held_by {
            return Err(StoreError::Reassigned);
        }
        if complaint.status != transition.from {
            return Err(StoreError::StaleStatus);
        }
        let now = Utc::now();
        complaint.status = transition.to;
        if let Some(assignee) = transition.assign_to {
            complaint.assigned_to = Some(assignee);
        }
        if let Some(remark) = &transition.remark {
            complaint.admin_notes = Some(remark.clone());
        }
        if transition.to == ComplaintStatus::Resolved && complaint.resolved_at.is_none() {
            complaint.resolved_at = Some(now);
        }
        complaint.updated_at = now;
        let updated = complaint.clone();
        tables
            .history
            .entry((HistorySubject::Complaint.as_str(), id))
            .or_default()
            .push(history_entry(
                transition.to.as_str(),
                transition.actor,
                transition.note.as_deref(),
            ));
        Ok(updated)
    }

    async fn delete_complaint(&self, id: Uuid) -> StoreResult<bool> {
        let mut tables = self.tables.write().await;
        let removed = tables.complaints.remove(&id).is_some();
        if removed {
            tables.sentiments.retain(|(complaint_id, _), _| *complaint_id != id);
        }
        Ok(removed)
    }

    async fn insert_sentiment(
        &self,
        complaint_id: Uuid,
        user_id: Uuid,
        sentiment: Sentiment,
    ) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        if !tables.complaints.contains_key(&complaint_id) {
            return Err(StoreError::NotFound);
        }
        if tables.sentiments.contains_key(&(complaint_id, user_id)) {
            return Err(StoreError::Duplicate);
        }
        tables.sentiments.insert((complaint_id, user_id), sentiment);
        Ok(())
    }

    async fn sentiment_counts(&self, complaint_id: Uuid) -> StoreResult<Vec<(String, i64)>> {
        let tables = self.tables.read().await;
        Ok(group_counts(
            tables
                .sentiments
                .iter()
                .filter(|((c, _), _)| *c == complaint_id)
                .map(|(_, s)| s.as_str()),
        ))
    }

    async fn create_petition(&self, petition: NewPetition) -> StoreResult<Petition> {
        let mut tables = self.tables.write().await;
        let now = Utc::now();
        let record = Petition {
            id: Uuid::new_v4(),
            creator: petition.creator,
            title: petition.title,
            description: petition.description,
            category: petition.category,
            location: petition.location,
            status: PetitionStatus::Active,
            assigned_to: None,
            official_response: String::new(),
            created_at: now,
            updated_at: now,
        };
        tables.petitions.insert(record.id, record.clone());
        Ok(record)
    }

    async fn find_petition(&self, id: Uuid) -> StoreResult<Option<Petition>> {
        Ok(self.tables.read().await.petitions.get(&id).cloned())
    }

    async fn list_petitions(&self, location: Option<&str>) -> StoreResult<Vec<Petition>> {
        let tables = self.tables.read().await;
        let mut petitions: Vec<Petition> = tables
            .petitions
            .values()
            .filter(|p| location.map_or(true, |loc| p.location == loc))
            .cloned()
            .collect();
        newest_first(&mut petitions, |p| p.created_at);
        Ok(petitions)
    }

    async fn list_petitions_assigned(&self, assignee: Uuid) -> StoreResult<Vec<Petition>> {
        let tables = self.tables.read().await;
        let mut petitions: Vec<Petition> = tables
            .petitions
            .values()
            .filter(|p| p.assigned_to == Some(assignee))
            .cloned()
            .collect();
        newest_first(&mut petitions, |p| p.created_at);
        Ok(petitions)
    }

    async fn transition_petition(
        &self,
        id: Uuid,
        transition: &Transition<PetitionStatus>,
    ) -> StoreResult<Petition> {
        let mut tables = self.tables.write().await;
        let petition = tables.petitions.get_mut(&id).ok_or(StoreError::NotFound)?;
        if transition.held_by.is_some() && petition.assigned_to != transition.held_by {
            return Err(StoreError::Reassigned);
        }
        if petition.status != transition.from {
            return Err(StoreError::StaleStatus);
        }
        petition.status = transition.to;
        if let Some(assignee) = transition.assign_to {
            petition.assigned_to = Some(assignee);
        }
        if let Some(remark) = &transition.remark {
            petition.official_response.push_str(remark);
        }
        petition.updated_at = Utc::now();
        let updated = petition.clone();
        tables
            .history
            .entry((HistorySubject::Petition.as_str(), id))
            .or_default()
            .push(history_entry(
                transition.to.as_str(),
                transition.actor,
                transition.note.as_deref(),
            ));
        Ok(updated)
    }

    async fn delete_petition(&self, id: Uuid) -> StoreResult<bool> {
        let mut tables = self.tables.write().await;
        let removed = tables.petitions.remove(&id).is_some();
        if removed {
            tables.signatures.retain(|(petition_id, _), _| *petition_id != id);
        }
        Ok(removed)
    }

    async fn insert_signature(&self, petition_id: Uuid, user_id: Uuid) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        if !tables.petitions.contains_key(&petition_id) {
            return Err(StoreError::NotFound);
        }
        if tables.signatures.contains_key(&(petition_id, user_id)) {
            return Err(StoreError::Duplicate);
        }
        tables.signatures.insert((petition_id, user_id), Utc::now());
        Ok(())
    }

    async fn signature_count(&self, petition_id: Uuid) -> StoreResult<i64> {
        let tables = self.tables.read().await;
        Ok(tables.signatures.keys().filter(|(p, _)| *p == petition_id).count() as i64)
    }

    async fn status_history(
        &self,
        subject: HistorySubject,
        id: Uuid,
    ) -> StoreResult<Vec<StatusChange>> {
        let tables = self.tables.read().await;
        Ok(tables
            .history
            .get(&(subject.as_str(), id))
            .cloned()
            .unwrap_or_default())
    }

    async fn create_poll(&self, poll: NewPoll) -> StoreResult<Poll> {
        let mut tables = self.tables.write().await;
        let now = Utc::now();
        let record = Poll {
            id: Uuid::new_v4(),
            title: poll.title,
            options: poll.options,
            created_by: poll.created_by,
            target_location: poll.target_location,
            status: poll.status,
            end_date: poll.end_date,
            created_at: now,
            updated_at: now,
        };
        tables.polls.insert(record.id, record.clone());
        Ok(record)
    }

    async fn find_poll(&self, id: Uuid) -> StoreResult<Option<Poll>> {
        Ok(self.tables.read().await.polls.get(&id).cloned())
    }

    async fn list_polls(&self, target_location: Option<&str>) -> StoreResult<Vec<Poll>> {
        let tables = self.tables.read().await;
        let mut polls: Vec<Poll> = tables
            .polls
            .values()
            .filter(|p| target_location.map_or(true, |loc| p.target_location == loc))
            .cloned()
            .collect();
        newest_first(&mut polls, |p| p.created_at);
        Ok(polls)
    }

    async fn set_poll_status(&self, id: Uuid, status: PollStatus) -> StoreResult<Poll> {
        let mut tables = self.tables.write().await;
        let poll = tables.polls.get_mut(&id).ok_or(StoreError::NotFound)?;
        poll.status = status;
        poll.updated_at = Utc::now();
        Ok(poll.clone())
    }

    async fn close_expired_polls(&self, now: DateTime<Utc>) -> StoreResult<u64> {
        let mut tables = self.tables.write().await;
        let mut closed = 0;
        for poll in tables.polls.values_mut() {
            if poll.status == PollStatus::Active && poll.end_date.is_some_and(|end| end <= now) {
                poll.status = PollStatus::Closed;
                poll.updated_at = now;
                closed += 1;
            }
        }
        Ok(closed)
    }

    async fn insert_poll_vote(
        &self,
        poll_id: Uuid,
        user_id: Uuid,
        option: &str,
    ) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        if !tables.polls.contains_key(&poll_id) {
            return Err(StoreError::NotFound);
        }
        if tables.poll_votes.contains_key(&(poll_id, user_id)) {
            return Err(StoreError::Duplicate);
        }
        tables.poll_votes.insert((poll_id, user_id), option.to_string());
        Ok(())
    }

    async fn poll_vote_counts(&self, poll_id: Uuid) -> StoreResult<Vec<(String, i64)>> {
        let tables = self.tables.read().await;
        Ok(group_counts(
            tables
                .poll_votes
                .iter()
                .filter(|((p, _), _)| *p == poll_id)
                .map(|(_, option)| option.as_str()),
        ))
    }

    async fn create_notification(
        &self,
        notification: NewNotification,
    ) -> StoreResult<Notification> {
        let record = Notification {
            id: Uuid::new_v4(),
            user_id: notification.user_id,
            title: notification.title,
            message: notification.message,
            link: notification.link,
            read: false,
            created_at: Utc::now(),
        };
        self.tables.write().await.notifications.push(record.clone());
        Ok(record)
    }

    async fn list_notifications(&self, user_id: Uuid) -> StoreResult<Vec<Notification>> {
        let tables = self.tables.read().await;
        let mut out: Vec<Notification> = tables
            .notifications
            .iter()
            .filter(|n| n.user_id == user_id)
            .cloned()
            .collect();
        newest_first(&mut out, |n| n.created_at);
        Ok(out)
    }

    async fn mark_notification_read(
        &self,
        id: Uuid,
        user_id: Uuid,
    ) -> StoreResult<Option<Notification>> {
        let mut tables = self.tables.write().await;
        Ok(tables
            .notifications
            .iter_mut()
            .find(|n| n.id == id && n.user_id == user_id)
            .map(|n| {
                n.read = true;
                n.clone()
            }))
    }

    async fn status_counts(&self, subject: ReportSubject) -> StoreResult<Vec<StatusCount>> {
        let tables = self.tables.read().await;
        let statuses: Vec<&str> = match subject {
            ReportSubject::Complaints => {
                tables.complaints.values().map(|c| c.status.as_str()).collect()
            }
            ReportSubject::Petitions => {
                tables.petitions.values().map(|p| p.status.as_str()).collect()
            }
            ReportSubject::Polls => tables.polls.values().map(|p| p.status.as_str()).collect(),
        };
        Ok(group_counts(statuses.into_iter())
            .into_iter()
            .map(|(status, total)| StatusCount { status, total })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{ComplaintCategory, GeoLocation, Priority};

    async fn citizen(store: &MemoryStore, email: &str) -> User {
        store
            .create_user(NewUser {
                name: "Asha".into(),
                email: email.into(),
                password_hash: "x".into(),
                role: UserRole::Citizen,
                location: "Pune".into(),
                latitude: None,
                longitude: None,
            })
            .await
            .unwrap()
    }

    async fn complaint(store: &MemoryStore, creator: Uuid) -> Complaint {
        store
            .create_complaint(NewComplaint {
                title: "Broken streetlight".into(),
                description: "Lamp on 5th street has been dark for a week".into(),
                category: ComplaintCategory::Electricity,
                priority: Priority::Medium,
                location: GeoLocation::default(),
                photo_url: None,
                admin_notes: None,
                created_by: creator,
            })
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn duplicate_email_is_rejected() {
        let store = MemoryStore::new();
        citizen(&store, "a@example.com").await;
        let err = store
            .create_user(NewUser {
                name: "Other".into(),
                email: "a@example.com".into(),
                password_hash: "y".into(),
                role: UserRole::Citizen,
                location: "Goa".into(),
                latitude: None,
                longitude: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Duplicate));
    }

    #[tokio::test]
    async fn second_sentiment_is_duplicate_and_counts_unchanged() {
        let store = MemoryStore::new();
        let user = citizen(&store, "b@example.com").await;
        let c = complaint(&store, user.id).await;

        store.insert_sentiment(c.id, user.id, Sentiment::Yes).await.unwrap();
        let err = store.insert_sentiment(c.id, user.id, Sentiment::No).await.unwrap_err();

        assert!(matches!(err, StoreError::Duplicate));
        assert_eq!(store.sentiment_counts(c.id).await.unwrap(), vec![("Yes".to_string(), 1)]);
    }

    #[tokio::test]
    async fn stale_transition_is_refused() {
        let store = MemoryStore::new();
        let user = citizen(&store, "c@example.com").await;
        let c = complaint(&store, user.id).await;

        let first = Transition::new(ComplaintStatus::Received, ComplaintStatus::Resolved, user.id);
        let resolved = store.transition_complaint(c.id, &first).await.unwrap();
        assert!(resolved.resolved_at.is_some());

        let stale = Transition::new(ComplaintStatus::Received, ComplaintStatus::InReview, user.id);
        let err = store.transition_complaint(c.id, &stale).await.unwrap_err();
        assert!(matches!(err, StoreError::StaleStatus));

        let history = store
            .status_history(HistorySubject::Complaint, c.id)
            .await
            .unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].status, "resolved");
    }

    #[tokio::test]
    async fn update_pinned_to_previous_assignee_is_refused() {
        let store = MemoryStore::new();
        let user = citizen(&store, "f@example.com").await;
        let c = complaint(&store, user.id).await;
        let (first, second, official) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());

        let assign = Transition::new(ComplaintStatus::Received, ComplaintStatus::InReview, official)
            .assigning(first);
        store.transition_complaint(c.id, &assign).await.unwrap();
        let reassign = Transition::new(ComplaintStatus::InReview, ComplaintStatus::InReview, official)
            .assigning(second);
        store.transition_complaint(c.id, &reassign).await.unwrap();

        let late = Transition::new(ComplaintStatus::InReview, ComplaintStatus::Resolved, first)
            .only_if_assigned_to(Some(first));
        let err = store.transition_complaint(c.id, &late).await.unwrap_err();
        assert!(matches!(err, StoreError::Reassigned));

        let current = store.find_complaint(c.id).await.unwrap().unwrap();
        assert_eq!(current.status, ComplaintStatus::InReview);
        assert_eq!(current.assigned_to, Some(second));

        let on_time = Transition::new(ComplaintStatus::InReview, ComplaintStatus::Resolved, second)
            .only_if_assigned_to(Some(second));
        assert!(store.transition_complaint(c.id, &on_time).await.is_ok());
    }

    #[tokio::test]
    async fn far_page_is_empty_not_a_panic() {
        let store = MemoryStore::new();
        let user = citizen(&store, "g@example.com").await;
        complaint(&store, user.id).await;

        let filter = ComplaintFilter {
            page: i64::MAX,
            limit: Some(100),
            ..ComplaintFilter::default()
        };
        assert_eq!(filter.offset(), i64::MAX);
        let (page, total) = store.list_complaints(&filter).await.unwrap();
        assert!(page.is_empty());
        assert_eq!(total, 1);
    }

    #[tokio::test]
    async fn reset_tokens_are_single_use() {
        let store = MemoryStore::new();
        let user = citizen(&store, "d@example.com").await;
        let now = Utc::now();
        store
            .store_reset_token(user.id, "hash", now + chrono::Duration::hours(1))
            .await
            .unwrap();

        assert_eq!(store.consume_reset_token("hash", now).await.unwrap(), Some(user.id));
        assert_eq!(store.consume_reset_token("hash", now).await.unwrap(), None);
    }

    #[tokio::test]
    async fn expired_polls_close() {
        let store = MemoryStore::new();
        let user = citizen(&store, "e@example.com").await;
        let poll = store
            .create_poll(NewPoll {
                title: "Should the park open later?".into(),
                options: vec!["Yes".into(), "No".into()],
                created_by: user.id,
                target_location: "Pune".into(),
                status: PollStatus::Active,
                end_date: Some(Utc::now() - chrono::Duration::minutes(1)),
            })
            .await
            .unwrap();

        assert_eq!(store.close_expired_polls(Utc::now()).await.unwrap(), 1);
        let poll = store.find_poll(poll.id).await.unwrap().unwrap();
        assert_eq!(poll.status, PollStatus::Closed);
    }
}
