use crate::config::AdminSeed;
use crate::db::{NewUser, Store, StoreError};
use crate::domain::models::UserRole;
use crate::web::auth::hash_password;
use crate::web::normalize_email;
use anyhow::Result;

/// Creates the bootstrap admin unless an account with that email already exists.
///
/// Returns `true` when a new admin was inserted.
pub async fn seed_admin(store: &dyn Store, seed: &AdminSeed) -> Result<bool> {
    let email = normalize_email(&seed.email);
    if store.find_user_by_email(&email).await?.is_some() {
        tracing::info!("Admin {} already present, skipping seed", email);
        return Ok(false);
    }

    let result = store
        .create_user(NewUser {
            name: seed.name.trim().to_string(),
            email: email.clone(),
            password_hash: hash_password(&seed.password)?,
            role: UserRole::Admin,
            location: String::new(),
            latitude: None,
            longitude: None,
        })
        .await;

    match result {
        Ok(user) => {
            tracing::info!("Seeded admin {} ({})", email, user.id);
            Ok(true)
        }
        // Another instance won the race.
        Err(StoreError::Duplicate) => Ok(false),
        Err(e) => Err(e.into()),
    }
}
