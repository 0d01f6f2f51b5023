use super::{
    ComplaintFilter, HistorySubject, NewComplaint, NewNotification, NewPetition, NewPoll, NewUser,
    ProfileUpdate, ReportSubject, StatusCount, Store, StoreError, StoreResult,
};
use crate::domain::models::{
    Complaint, ComplaintCategory, ComplaintStatus, GeoLocation, Notification, Petition,
    PetitionStatus, Poll, PollStatus, Priority, Sentiment, StatusChange, User, UserRole,
};
use crate::domain::workflow::Transition;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

const USER_COLUMNS: &str = "id, name, email, password_hash, role, location, latitude, longitude, created_at, updated_at";
const COMPLAINT_COLUMNS: &str = "id, title, description, category, priority, longitude, latitude, address, city, state, pincode, photo_url, created_by, assigned_to, status, admin_notes, resolved_at, created_at, updated_at";
const PETITION_COLUMNS: &str = "id, creator, title, description, category, location, status, assigned_to, official_response, created_at, updated_at";
const POLL_COLUMNS: &str = "id, title, options, created_by, target_location, status, end_date, created_at, updated_at";
const NOTIFICATION_COLUMNS: &str = "id, user_id, title, message, link, read, created_at";

#[derive(Debug, FromRow)]
struct ComplaintRow {
    id: Uuid,
    title: String,
    description: String,
    category: ComplaintCategory,
    priority: Priority,
    longitude: Option<f64>,
    latitude: Option<f64>,
    address: Option<String>,
    city: Option<String>,
    state: Option<String>,
    pincode: Option<String>,
    photo_url: Option<String>,
    created_by: Uuid,
    assigned_to: Option<Uuid>,
    status: ComplaintStatus,
    admin_notes: Option<String>,
    resolved_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<ComplaintRow> for Complaint {
    fn from(row: ComplaintRow) -> Self {
        let coordinates = match (row.longitude, row.latitude) {
            (Some(lng), Some(lat)) => Some([lng, lat]),
            _ => None,
        };
        Complaint {
            id: row.id,
            title: row.title,
            description: row.description,
            category: row.category,
            priority: row.priority,
            location: GeoLocation {
                coordinates,
                address: row.address,
                city: row.city,
                state: row.state,
                pincode: row.pincode,
            },
            photo_url: row.photo_url,
            created_by: row.created_by,
            assigned_to: row.assigned_to,
            status: row.status,
            admin_notes: row.admin_notes,
            resolved_at: row.resolved_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Explains why a conditional status update matched no row.
    async fn transition_miss(&self, table: &str, id: Uuid, held_by: Option<Uuid>) -> StoreError {
        let sql = format!("SELECT assigned_to FROM {table} WHERE id = $1");
        let current = sqlx::query_scalar::<_, Option<Uuid>>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await;
        match current {
            Ok(None) => StoreError::NotFound,
            Ok(Some(assignee)) if held_by.is_some() && assignee != held_by => StoreError::Reassigned,
            Ok(Some(_)) => StoreError::StaleStatus,
            Err(e) => e.into(),
        }
    }
}

fn push_complaint_filters(qb: &mut QueryBuilder<'_, Postgres>, filter: &ComplaintFilter) {
    if let Some(status) = filter.status {
        qb.push(" AND status = ").push_bind(status);
    }
    if let Some(category) = filter.category {
        qb.push(" AND category = ").push_bind(category);
    }
    if let Some(priority) = filter.priority {
        qb.push(" AND priority = ").push_bind(priority);
    }
    if let Some(assignee) = filter.assigned_to {
        qb.push(" AND assigned_to = ").push_bind(assignee);
    }
}

#[async_trait]
impl Store for PgStore {
    async fn create_user(&self, user: NewUser) -> StoreResult<User> {
        let sql = format!(
            r#"
            INSERT INTO users (id, name, email, password_hash, role, location, latitude, longitude)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING {USER_COLUMNS}
            "#
        );
        let created = sqlx::query_as::<_, User>(&sql)
            .bind(Uuid::new_v4())
            .bind(&user.name)
            .bind(&user.email)
            .bind(&user.password_hash)
            .bind(user.role)
            .bind(&user.location)
            .bind(user.latitude)
            .bind(user.longitude)
            .fetch_one(&self.pool)
            .await?;
        Ok(created)
    }

    async fn find_user(&self, id: Uuid) -> StoreResult<Option<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE email = $1");
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    async fn update_profile(&self, id: Uuid, update: ProfileUpdate) -> StoreResult<User> {
        let (lat, lng) = update.coordinates.unzip();
        let sql = format!(
            r#"
            UPDATE users
            SET name = COALESCE($2, name),
                location = COALESCE($3, location),
                latitude = COALESCE($4, latitude),
                longitude = COALESCE($5, longitude),
                updated_at = now()
            WHERE id = $1
            RETURNING {USER_COLUMNS}
            "#
        );
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(id)
            .bind(update.name)
            .bind(update.location)
            .bind(lat)
            .bind(lng)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(StoreError::NotFound)?;
        Ok(user)
    }

    async fn set_password_hash(&self, id: Uuid, hash: &str) -> StoreResult<()> {
        let result = sqlx::query("UPDATE users SET password_hash = $2, updated_at = now() WHERE id = $1")
            .bind(id)
            .bind(hash)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn list_users_by_role(&self, role: UserRole) -> StoreResult<Vec<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE role = $1 ORDER BY created_at DESC");
        let users = sqlx::query_as::<_, User>(&sql)
            .bind(role)
            .fetch_all(&self.pool)
            .await?;
        Ok(users)
    }

    async fn revoke_token(&self, token_hash: &str, expires_at: DateTime<Utc>) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO revoked_tokens (token_hash, expires_at)
            VALUES ($1, $2)
            ON CONFLICT (token_hash) DO NOTHING
            "#,
        )
        .bind(token_hash)
        .bind(expires_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn is_token_revoked(&self, token_hash: &str) -> StoreResult<bool> {
        let revoked: bool =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM revoked_tokens WHERE token_hash = $1)")
                .bind(token_hash)
                .fetch_one(&self.pool)
                .await?;
        Ok(revoked)
    }

    async fn store_reset_token(
        &self,
        user_id: Uuid,
        token_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO password_reset_tokens (token_hash, user_id, expires_at) VALUES ($1, $2, $3)",
        )
        .bind(token_hash)
        .bind(user_id)
        .bind(expires_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn consume_reset_token(
        &self,
        token_hash: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<Uuid>> {
        let user_id: Option<Uuid> = sqlx::query_scalar(
            r#"
            UPDATE password_reset_tokens
            SET used = TRUE
            WHERE token_hash = $1 AND used = FALSE AND expires_at > $2
            RETURNING user_id
            "#,
        )
        .bind(token_hash)
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user_id)
    }

    async fn purge_expired_tokens(&self, now: DateTime<Utc>) -> StoreResult<u64> {
        let revoked = sqlx::query("DELETE FROM revoked_tokens WHERE expires_at <= $1")
            .bind(now)
            .execute(&self.pool)
            .await?;
        let resets = sqlx::query("DELETE FROM password_reset_tokens WHERE expires_at <= $1 OR used")
            .bind(now)
            .execute(&self.pool)
            .await?;
        Ok(revoked.rows_affected() + resets.rows_affected())
    }

    async fn create_complaint(&self, complaint: NewComplaint) -> StoreResult<Complaint> {
        let (lng, lat) = match complaint.location.coordinates {
            Some([lng, lat]) => (Some(lng), Some(lat)),
            None => (None, None),
        };
        let sql = format!(
            r#"
            INSERT INTO complaints (
                id, title, description, category, priority, longitude, latitude,
                address, city, state, pincode, photo_url, admin_notes, created_by
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            RETURNING {COMPLAINT_COLUMNS}
            "#
        );
        let row = sqlx::query_as::<_, ComplaintRow>(&sql)
            .bind(Uuid::new_v4())
            .bind(&complaint.title)
            .bind(&complaint.description)
            .bind(complaint.category)
            .bind(complaint.priority)
            .bind(lng)
            .bind(lat)
            .bind(&complaint.location.address)
            .bind(&complaint.location.city)
            .bind(&complaint.location.state)
            .bind(&complaint.location.pincode)
            .bind(&complaint.photo_url)
            .bind(&complaint.admin_notes)
            .bind(complaint.created_by)
            .fetch_one(&self.pool)
            .await?;
        Ok(row.into())
    }

    async fn find_complaint(&self, id: Uuid) -> StoreResult<Option<Complaint>> {
        let sql = format!("SELECT {COMPLAINT_COLUMNS} FROM complaints WHERE id = $1");
        let row = sqlx::query_as::<_, ComplaintRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(Complaint::from))
    }

    async fn list_complaints(
        &self,
        filter: &ComplaintFilter,
    ) -> StoreResult<(Vec<Complaint>, i64)> {
        let mut count_qb = QueryBuilder::new("SELECT COUNT(*) FROM complaints WHERE TRUE");
        push_complaint_filters(&mut count_qb, filter);
        let total: i64 = count_qb.build_query_scalar::<i64>().fetch_one(&self.pool).await?;

        let mut qb = QueryBuilder::new(format!("SELECT {COMPLAINT_COLUMNS} FROM complaints WHERE TRUE"));
        push_complaint_filters(&mut qb, filter);
        qb.push(" ORDER BY created_at DESC");
        if let Some(limit) = filter.limit {
            qb.push(" LIMIT ").push_bind(limit);
            qb.push(" OFFSET ").push_bind(filter.offset());
        }
        let rows = qb.build_query_as::<ComplaintRow>().fetch_all(&self.pool).await?;
        Ok((rows.into_iter().map(Complaint::from).collect(), total))
    }

    async fn set_complaint_photo(&self, id: Uuid, url: &str) -> StoreResult<Complaint> {
        let sql = format!(
            "UPDATE complaints SET photo_url = $2, updated_at = now() WHERE id = $1 RETURNING {COMPLAINT_COLUMNS}"
        );
        let row = sqlx::query_as::<_, ComplaintRow>(&sql)
            .bind(id)
            .bind(url)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(StoreError::NotFound)?;
        Ok(row.into())
    }

    async fn transition_complaint(
        &self,
        id: Uuid,
        transition: &Transition<ComplaintStatus>,
    ) -> StoreResult<Complaint> {
        let mut tx = self.pool.begin().await?;
        let sql = format!(
            r#"
            UPDATE complaints
            SET status = $3,
                assigned_to = COALESCE($4, assigned_to),
                admin_notes = COALESCE($5, admin_notes),
                resolved_at = CASE
                    WHEN $3 = 'resolved'::complaint_status AND resolved_at IS NULL THEN now()
                    ELSE resolved_at
                END,
                updated_at = now()
            WHERE id = $1 AND status = $2 AND ($6::uuid IS NULL OR assigned_to = $6)
            RETURNING {COMPLAINT_COLUMNS}
            "#
        );
        let row = sqlx::query_as::<_, ComplaintRow>(&sql)
            .bind(id)
            .bind(transition.from)
            .bind(transition.to)
            .bind(transition.assign_to)
            .bind(&transition.remark)
            .bind(transition.held_by)
            .fetch_optional(&mut *tx)
            .await?;

        let Some(row) = row else {
            tx.rollback().await?;
            return Err(self.transition_miss("complaints", id, transition.held_by).await);
        };

        insert_history(
            &mut tx,
            HistorySubject::Complaint,
            id,
            transition.to.as_str(),
            transition.actor,
            transition.note.as_deref(),
        )
        .await?;
        tx.commit().await?;
        Ok(row.into())
    }

    async fn delete_complaint(&self, id: Uuid) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM complaints WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn insert_sentiment(
        &self,
        complaint_id: Uuid,
        user_id: Uuid,
        sentiment: Sentiment,
    ) -> StoreResult<()> {
        sqlx::query("INSERT INTO complaint_votes (complaint_id, user_id, sentiment) VALUES ($1, $2, $3)")
            .bind(complaint_id)
            .bind(user_id)
            .bind(sentiment)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn sentiment_counts(&self, complaint_id: Uuid) -> StoreResult<Vec<(String, i64)>> {
        let rows: Vec<(String, i64)> = sqlx::query_as(
            r#"
            SELECT sentiment::text, COUNT(*)
            FROM complaint_votes
            WHERE complaint_id = $1
            GROUP BY sentiment
            "#,
        )
        .bind(complaint_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn create_petition(&self, petition: NewPetition) -> StoreResult<Petition> {
        let sql = format!(
            r#"
            INSERT INTO petitions (id, creator, title, description, category, location)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {PETITION_COLUMNS}
            "#
        );
        let created = sqlx::query_as::<_, Petition>(&sql)
            .bind(Uuid::new_v4())
            .bind(petition.creator)
            .bind(&petition.title)
            .bind(&petition.description)
            .bind(&petition.category)
            .bind(&petition.location)
            .fetch_one(&self.pool)
            .await?;
        Ok(created)
    }

    async fn find_petition(&self, id: Uuid) -> StoreResult<Option<Petition>> {
        let sql = format!("SELECT {PETITION_COLUMNS} FROM petitions WHERE id = $1");
        let petition = sqlx::query_as::<_, Petition>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(petition)
    }

    async fn list_petitions(&self, location: Option<&str>) -> StoreResult<Vec<Petition>> {
        let sql = format!(
            "SELECT {PETITION_COLUMNS} FROM petitions WHERE ($1::text IS NULL OR location = $1) ORDER BY created_at DESC"
        );
        let petitions = sqlx::query_as::<_, Petition>(&sql)
            .bind(location)
            .fetch_all(&self.pool)
            .await?;
        Ok(petitions)
    }

    async fn list_petitions_assigned(&self, assignee: Uuid) -> StoreResult<Vec<Petition>> {
        let sql = format!(
            "SELECT {PETITION_COLUMNS} FROM petitions WHERE assigned_to = $1 ORDER BY created_at DESC"
        );
        let petitions = sqlx::query_as::<_, Petition>(&sql)
            .bind(assignee)
            .fetch_all(&self.pool)
            .await?;
        Ok(petitions)
    }

    async fn transition_petition(
        &self,
        id: Uuid,
        transition: &Transition<PetitionStatus>,
    ) -> StoreResult<Petition> {
        let mut tx = self.pool.begin().await?;
        let sql = format!(
            r#"
            UPDATE petitions
            SET status = $3,
                assigned_to = COALESCE($4, assigned_to),
                official_response = official_response || COALESCE($5, ''),
                updated_at = now()
            WHERE id = $1 AND status = $2 AND ($6::uuid IS NULL OR assigned_to = $6)
            RETURNING {PETITION_COLUMNS}
            "#
        );
        let petition = sqlx::query_as::<_, Petition>(&sql)
            .bind(id)
            .bind(transition.from)
            .bind(transition.to)
            .bind(transition.assign_to)
            .bind(&transition.remark)
            .bind(transition.held_by)
            .fetch_optional(&mut *tx)
            .await?;

        let Some(petition) = petition else {
            tx.rollback().await?;
            return Err(self.transition_miss("petitions", id, transition.held_by).await);
        };

        insert_history(
            &mut tx,
            HistorySubject::Petition,
            id,
            transition.to.as_str(),
            transition.actor,
            transition.note.as_deref(),
        )
        .await?;
        tx.commit().await?;
        Ok(petition)
    }

    async fn delete_petition(&self, id: Uuid) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM petitions WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn insert_signature(&self, petition_id: Uuid, user_id: Uuid) -> StoreResult<()> {
        sqlx::query("INSERT INTO petition_signatures (petition_id, user_id) VALUES ($1, $2)")
            .bind(petition_id)
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn signature_count(&self, petition_id: Uuid) -> StoreResult<i64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM petition_signatures WHERE petition_id = $1")
                .bind(petition_id)
                .fetch_one(&self.pool)
                .await?;
        Ok(count)
    }

    async fn status_history(
        &self,
        subject: HistorySubject,
        id: Uuid,
    ) -> StoreResult<Vec<StatusChange>> {
        let history = sqlx::query_as::<_, StatusChange>(
            r#"
            SELECT status, changed_at, changed_by, note
            FROM status_history
            WHERE subject_kind = $1 AND subject_id = $2
            ORDER BY changed_at, id
            "#,
        )
        .bind(subject.as_str())
        .bind(id)
        .fetch_all(&self.pool)
        .await?;
        Ok(history)
    }

    async fn create_poll(&self, poll: NewPoll) -> StoreResult<Poll> {
        let sql = format!(
            r#"
            INSERT INTO polls (id, title, options, created_by, target_location, status, end_date)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING {POLL_COLUMNS}
            "#
        );
        let created = sqlx::query_as::<_, Poll>(&sql)
            .bind(Uuid::new_v4())
            .bind(&poll.title)
            .bind(&poll.options)
            .bind(poll.created_by)
            .bind(&poll.target_location)
            .bind(poll.status)
            .bind(poll.end_date)
            .fetch_one(&self.pool)
            .await?;
        Ok(created)
    }

    async fn find_poll(&self, id: Uuid) -> StoreResult<Option<Poll>> {
        let sql = format!("SELECT {POLL_COLUMNS} FROM polls WHERE id = $1");
        let poll = sqlx::query_as::<_, Poll>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(poll)
    }

    async fn list_polls(&self, target_location: Option<&str>) -> StoreResult<Vec<Poll>> {
        let sql = format!(
            "SELECT {POLL_COLUMNS} FROM polls WHERE ($1::text IS NULL OR target_location = $1) ORDER BY created_at DESC"
        );
        let polls = sqlx::query_as::<_, Poll>(&sql)
            .bind(target_location)
            .fetch_all(&self.pool)
            .await?;
        Ok(polls)
    }

    async fn set_poll_status(&self, id: Uuid, status: PollStatus) -> StoreResult<Poll> {
        let sql = format!(
            "UPDATE polls SET status = $2, updated_at = now() WHERE id = $1 RETURNING {POLL_COLUMNS}"
        );
        let poll = sqlx::query_as::<_, Poll>(&sql)
            .bind(id)
            .bind(status)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(StoreError::NotFound)?;
        Ok(poll)
    }

    async fn close_expired_polls(&self, now: DateTime<Utc>) -> StoreResult<u64> {
        let result = sqlx::query(
            r#"
            UPDATE polls
            SET status = 'closed', updated_at = now()
            WHERE status = 'active' AND end_date IS NOT NULL AND end_date <= $1
            "#,
        )
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn insert_poll_vote(
        &self,
        poll_id: Uuid,
        user_id: Uuid,
        option: &str,
    ) -> StoreResult<()> {
        sqlx::query("INSERT INTO poll_votes (poll_id, user_id, selected_option) VALUES ($1, $2, $3)")
            .bind(poll_id)
            .bind(user_id)
            .bind(option)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn poll_vote_counts(&self, poll_id: Uuid) -> StoreResult<Vec<(String, i64)>> {
        let rows: Vec<(String, i64)> = sqlx::query_as(
            r#"
            SELECT selected_option, COUNT(*)
            FROM poll_votes
            WHERE poll_id = $1
            GROUP BY selected_option
            "#,
        )
        .bind(poll_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn create_notification(
        &self,
        notification: NewNotification,
    ) -> StoreResult<Notification> {
        let sql = format!(
            r#"
            INSERT INTO notifications (id, user_id, title, message, link)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {NOTIFICATION_COLUMNS}
            "#
        );
        let created = sqlx::query_as::<_, Notification>(&sql)
            .bind(Uuid::new_v4())
            .bind(notification.user_id)
            .bind(&notification.title)
            .bind(&notification.message)
            .bind(&notification.link)
            .fetch_one(&self.pool)
            .await?;
        Ok(created)
    }

    async fn list_notifications(&self, user_id: Uuid) -> StoreResult<Vec<Notification>> {
        let sql = format!(
            "SELECT {NOTIFICATION_COLUMNS} FROM notifications WHERE user_id = $1 ORDER BY created_at DESC"
        );
        let notifications = sqlx::query_as::<_, Notification>(&sql)
            .bind(user_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(notifications)
    }

    async fn mark_notification_read(
        &self,
        id: Uuid,
        user_id: Uuid,
    ) -> StoreResult<Option<Notification>> {
        let sql = format!(
            "UPDATE notifications SET read = TRUE WHERE id = $1 AND user_id = $2 RETURNING {NOTIFICATION_COLUMNS}"
        );
        let notification = sqlx::query_as::<_, Notification>(&sql)
            .bind(id)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(notification)
    }

    async fn status_counts(&self, subject: ReportSubject) -> StoreResult<Vec<StatusCount>> {
        let table = match subject {
            ReportSubject::Complaints => "complaints",
            ReportSubject::Petitions => "petitions",
            ReportSubject::Polls => "polls",
        };
        let sql = format!(
            "SELECT status::text AS status, COUNT(*) AS total FROM {table} GROUP BY status ORDER BY status::text"
        );
        let counts = sqlx::query_as::<_, StatusCount>(&sql)
            .fetch_all(&self.pool)
            .await?;
        Ok(counts)
    }
}

async fn insert_history(
    tx: &mut sqlx::Transaction<'_, Postgres>,
    subject: HistorySubject,
    id: Uuid,
    status: &str,
    actor: Uuid,
    note: Option<&str>,
) -> StoreResult<()> {
    sqlx::query(
        r#"
        INSERT INTO status_history (subject_kind, subject_id, status, changed_by, note)
        VALUES ($1, $2, $3, $4, $5)
        "#,
    )
    .bind(subject.as_str())
    .bind(id)
    .bind(status)
    .bind(actor)
    .bind(note)
    .execute(&mut **tx)
    .await?;
    Ok(())
}
