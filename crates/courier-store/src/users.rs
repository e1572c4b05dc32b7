//! Cache operations for [`UserProfile`] snapshots.

use chrono::{DateTime, Utc};
use rusqlite::params;

use courier_shared::{UserId, UserProfile};

use crate::database::Database;
use crate::error::{Result, StoreError};

impl Database {
    /// Insert-or-replace a user profile snapshot.
    pub fn upsert_user(&self, user: &UserProfile) -> Result<()> {
        if user.id.as_str().is_empty() {
            tracing::warn!("rejecting cache write: empty user id");
            return Err(StoreError::InvalidRecord("id"));
        }

        self.conn().execute(
            "INSERT OR REPLACE INTO users (id, display_name, avatar_url, push_token, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                user.id.as_str(),
                user.display_name,
                user.avatar_url,
                user.push_token,
                user.created_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// Fetch a cached profile, or `None` if the user has never been seen.
    pub fn get_user(&self, id: &UserId) -> Result<Option<UserProfile>> {
        let result = self.conn().query_row(
            "SELECT id, display_name, avatar_url, push_token, created_at
             FROM users WHERE id = ?1",
            params![id.as_str()],
            row_to_user,
        );

        match result {
            Ok(user) => Ok(Some(user)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(StoreError::Sqlite(e)),
        }
    }
}

fn row_to_user(row: &rusqlite::Row<'_>) -> rusqlite::Result<UserProfile> {
    let id: String = row.get(0)?;
    let display_name: Option<String> = row.get(1)?;
    let avatar_url: Option<String> = row.get(2)?;
    let push_token: Option<String> = row.get(3)?;
    let created_str: String = row.get(4)?;

    let created_at: DateTime<Utc> = DateTime::parse_from_rfc3339(&created_str)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(4, rusqlite::types::Type::Text, Box::new(e))
        })?;

    Ok(UserProfile {
        id: UserId::new(id),
        display_name,
        avatar_url,
        push_token,
        created_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_missing_user_is_none() {
        let db = Database::open_in_memory().unwrap();
        assert!(db.get_user(&UserId::new("nobody")).unwrap().is_none());
    }

    #[test]
    fn upsert_and_get_round_trip() {
        let db = Database::open_in_memory().unwrap();
        let user = UserProfile {
            id: UserId::new("u1"),
            display_name: Some("Alice".into()),
            avatar_url: None,
            push_token: Some("tok-1".into()),
            created_at: Utc::now(),
        };
        db.upsert_user(&user).unwrap();

        let got = db.get_user(&UserId::new("u1")).unwrap().unwrap();
        assert_eq!(got.display_name.as_deref(), Some("Alice"));
        assert_eq!(got.push_token.as_deref(), Some("tok-1"));
    }

    #[test]
    fn clear_all_cache_wipes_every_table() {
        let db = Database::open_in_memory().unwrap();
        let user = UserProfile {
            id: UserId::new("u1"),
            display_name: None,
            avatar_url: None,
            push_token: None,
            created_at: Utc::now(),
        };
        db.upsert_user(&user).unwrap();

        db.clear_all_cache().unwrap();
        assert!(db.get_user(&UserId::new("u1")).unwrap().is_none());
    }
}
