use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use rusqlite::{params, Connection, OptionalExtension, Row};
use thiserror::Error;

use crate::calendar::{
    AccessLevel, Calendar, CalendarEventCount, CalendarMembership, CalendarPatch, Category,
    Event, EventStats, NewCategory, NewEvent, NewUser, User, UserRole,
};
use crate::policy::membership::{MembershipDiff, ResolvedMember, UserLookup};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    DatabaseError(#[from] rusqlite::Error),
    #[error("Store connection lock was poisoned")]
    Poisoned,
    #[error("Conflicting write: {0}")]
    Conflict(String),
    #[error("User is the only owner of calendar {calendar_id}")]
    LastOwner { calendar_id: i64 },
    #[error("Failed to prepare database directory: {0}")]
    Io(#[from] std::io::Error),
}

const SCHEMA: &str = "
    PRAGMA foreign_keys = ON;

    CREATE TABLE IF NOT EXISTS users (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        display_name TEXT NOT NULL,
        username TEXT NOT NULL UNIQUE,
        email TEXT NOT NULL UNIQUE,
        email_confirmed INTEGER NOT NULL DEFAULT 0,
        password_hash TEXT NOT NULL,
        role TEXT NOT NULL,
        created_at TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS calendars (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        calendar_name TEXT NOT NULL,
        color TEXT,
        created_at TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS user_calendars (
        user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
        calendar_id INTEGER NOT NULL REFERENCES calendars(id) ON DELETE CASCADE,
        access_level TEXT NOT NULL,
        PRIMARY KEY (user_id, calendar_id)
    );

    CREATE TABLE IF NOT EXISTS categories (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        category_name TEXT NOT NULL,
        color TEXT,
        calendar_id INTEGER NOT NULL REFERENCES calendars(id) ON DELETE CASCADE
    );

    CREATE TABLE IF NOT EXISTS events (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        event_name TEXT NOT NULL,
        description TEXT,
        start_time TEXT NOT NULL,
        end_time TEXT NOT NULL,
        color TEXT,
        calendar_id INTEGER NOT NULL REFERENCES calendars(id) ON DELETE CASCADE,
        category_id INTEGER REFERENCES categories(id) ON DELETE SET NULL
    );

    CREATE TABLE IF NOT EXISTS refresh_tokens (
        token_hash TEXT PRIMARY KEY,
        user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
        expires_at TEXT NOT NULL
    );
";

impl ToSql for AccessLevel {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for AccessLevel {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value
            .as_str()?
            .parse()
            .map_err(|e| FromSqlError::Other(Box::new(e)))
    }
}

impl ToSql for UserRole {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for UserRole {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        UserRole::parse(value.as_str()?).ok_or(FromSqlError::InvalidType)
    }
}

fn classify(err: rusqlite::Error) -> StoreError {
    if let rusqlite::Error::SqliteFailure(failure, message) = &err
        && (failure.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
            || failure.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY)
    {
        return StoreError::Conflict(message.clone().unwrap_or_else(|| failure.to_string()));
    }
    StoreError::DatabaseError(err)
}

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get("id")?,
        display_name: row.get("display_name")?,
        username: row.get("username")?,
        email: row.get("email")?,
        email_confirmed: row.get("email_confirmed")?,
        role: row.get("role")?,
    })
}

fn membership_from_row(row: &Row<'_>) -> rusqlite::Result<CalendarMembership> {
    Ok(CalendarMembership {
        user_id: row.get("user_id")?,
        calendar_id: row.get("calendar_id")?,
        access_level: row.get("access_level")?,
    })
}

fn event_from_row(row: &Row<'_>) -> rusqlite::Result<Event> {
    Ok(Event {
        id: row.get("id")?,
        calendar_id: row.get("calendar_id")?,
        category_id: row.get("category_id")?,
        name: row.get("event_name")?,
        description: row.get("description")?,
        start: row.get("start_time")?,
        end: row.get("end_time")?,
        color: row.get("color")?,
    })
}

fn category_from_row(row: &Row<'_>) -> rusqlite::Result<Category> {
    Ok(Category {
        id: row.get("id")?,
        name: row.get("category_name")?,
        color: row.get("color")?,
        calendar_id: row.get("calendar_id")?,
    })
}

const USER_COLUMNS: &str = "id, display_name, username, email, email_confirmed, role";
const EVENT_COLUMNS: &str =
    "id, event_name, description, start_time, end_time, color, calendar_id, category_id";
const CATEGORY_COLUMNS: &str = "id, category_name, color, calendar_id";

fn members_of(conn: &Connection, calendar_id: i64) -> Result<Vec<CalendarMembership>, StoreError> {
    let mut stmt = conn.prepare(
        "SELECT user_id, calendar_id, access_level FROM user_calendars
         WHERE calendar_id = ?1 ORDER BY rowid",
    )?;
    let members = stmt
        .query_map([calendar_id], membership_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(members)
}

fn load_calendar_with(conn: &Connection, id: i64) -> Result<Option<Calendar>, StoreError> {
    let row = conn
        .query_row(
            "SELECT id, calendar_name, color FROM calendars WHERE id = ?1",
            [id],
            |row| Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?, row.get::<_, Option<String>>(2)?)),
        )
        .optional()?;

    let Some((id, name, color)) = row else {
        return Ok(None);
    };

    Ok(Some(Calendar {
        id,
        name,
        color,
        members: members_of(conn, id)?,
    }))
}

fn load_calendars_by_ids(conn: &Connection, ids: Vec<i64>) -> Result<Vec<Calendar>, StoreError> {
    let mut calendars = Vec::with_capacity(ids.len());
    for id in ids {
        if let Some(calendar) = load_calendar_with(conn, id)? {
            calendars.push(calendar);
        }
    }
    Ok(calendars)
}

/// SQLite-backed persistence. One connection, serialised behind a mutex.
pub struct Store {
    conn: Mutex<Connection>,
}

impl Store {
    pub fn new(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
        }
    }

    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let store = Self::new(Connection::open(path)?);
        store.initialize()?;
        Ok(store)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        let store = Self::new(Connection::open_in_memory()?);
        store.initialize()?;
        Ok(store)
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn.lock().map_err(|_| StoreError::Poisoned)
    }

    pub fn initialize(&self) -> Result<(), StoreError> {
        self.conn()?.execute_batch(SCHEMA)?;
        Ok(())
    }

    pub fn table_exists(&self, table_name: &str) -> bool {
        let Ok(conn) = self.conn() else {
            return false;
        };
        let result: rusqlite::Result<i32> = conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name=?1",
            [table_name],
            |row| row.get(0),
        );
        result.unwrap_or(0) > 0
    }

    /// The caller hashes the password; only the hash reaches the database.
    pub fn create_user(
        &self,
        new_user: &NewUser,
        password_hash: &str,
        role: UserRole,
    ) -> Result<User, StoreError> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO users (display_name, username, email, email_confirmed, password_hash, role, created_at)
             VALUES (?1, ?2, ?3, 0, ?4, ?5, ?6)",
            params![
                &new_user.display_name,
                &new_user.username,
                &new_user.email,
                password_hash,
                role,
                Utc::now(),
            ],
        )
        .map_err(classify)?;

        Ok(User {
            id: conn.last_insert_rowid(),
            display_name: new_user.display_name.clone(),
            username: new_user.username.clone(),
            email: new_user.email.clone(),
            email_confirmed: false,
            role,
        })
    }

    pub fn user_by_id(&self, id: i64) -> Result<Option<User>, StoreError> {
        let conn = self.conn()?;
        let user = conn
            .query_row(
                &format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"),
                [id],
                user_from_row,
            )
            .optional()?;
        Ok(user)
    }

    pub fn user_by_username(&self, username: &str) -> Result<Option<User>, StoreError> {
        let conn = self.conn()?;
        let user = conn
            .query_row(
                &format!("SELECT {USER_COLUMNS} FROM users WHERE username = ?1"),
                [username],
                user_from_row,
            )
            .optional()?;
        Ok(user)
    }

    /// The user registered under `email` together with their password hash.
    pub fn credentials_by_email(&self, email: &str) -> Result<Option<(User, String)>, StoreError> {
        let conn = self.conn()?;
        let credentials = conn
            .query_row(
                &format!("SELECT {USER_COLUMNS}, password_hash FROM users WHERE email = ?1"),
                [email],
                |row| Ok((user_from_row(row)?, row.get("password_hash")?)),
            )
            .optional()?;
        Ok(credentials)
    }

    pub fn all_users(&self) -> Result<Vec<User>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!("SELECT {USER_COLUMNS} FROM users ORDER BY id"))?;
        let users = stmt
            .query_map([], user_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(users)
    }

    /// Overwrites every mutable column. Returns false if the user no longer exists.
    pub fn save_user(&self, user: &User) -> Result<bool, StoreError> {
        let changed = self
            .conn()?
            .execute(
                "UPDATE users SET display_name = ?2, username = ?3, email = ?4, email_confirmed = ?5
                 WHERE id = ?1",
                params![user.id, &user.display_name, &user.username, &user.email, user.email_confirmed],
            )
            .map_err(classify)?;
        Ok(changed > 0)
    }

    /// Memberships cascade with the user, so a user who is the sole owner of a
    /// calendar cannot be deleted. Check and delete share one transaction.
    pub fn delete_user(&self, id: i64) -> Result<bool, StoreError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        let calendar_ids = {
            let mut stmt = tx.prepare("SELECT calendar_id FROM user_calendars WHERE user_id = ?1")?;
            let ids = stmt
                .query_map([id], |row| row.get::<_, i64>(0))?
                .collect::<Result<Vec<_>, _>>()?;
            ids
        };
        for calendar_id in calendar_ids {
            let Some(calendar) = load_calendar_with(&tx, calendar_id)? else {
                continue;
            };
            if calendar.owners().map(|owner| owner.user_id).eq([id]) {
                return Err(StoreError::LastOwner { calendar_id });
            }
        }

        let changed = tx.execute("DELETE FROM users WHERE id = ?1", [id])?;
        tx.commit()?;
        Ok(changed > 0)
    }

    /// Inserts the calendar and all of its members in one transaction.
    pub fn create_calendar_with_members(
        &self,
        name: &str,
        color: Option<&str>,
        members: &[ResolvedMember],
    ) -> Result<Calendar, StoreError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        tx.execute(
            "INSERT INTO calendars (calendar_name, color, created_at) VALUES (?1, ?2, ?3)",
            params![name, color, Utc::now()],
        )?;
        let calendar_id = tx.last_insert_rowid();

        for member in members {
            tx.execute(
                "INSERT INTO user_calendars (user_id, calendar_id, access_level) VALUES (?1, ?2, ?3)",
                params![member.user_id, calendar_id, member.access_level],
            )
            .map_err(classify)?;
        }

        let calendar = load_calendar_with(&tx, calendar_id)?
            .ok_or(StoreError::DatabaseError(rusqlite::Error::QueryReturnedNoRows))?;
        tx.commit()?;

        Ok(calendar)
    }

    pub fn load_calendar(&self, id: i64) -> Result<Option<Calendar>, StoreError> {
        let conn = self.conn()?;
        load_calendar_with(&conn, id)
    }

    pub fn all_calendars(&self) -> Result<Vec<Calendar>, StoreError> {
        let conn = self.conn()?;
        let ids = {
            let mut stmt = conn.prepare("SELECT id FROM calendars ORDER BY id")?;
            let ids = stmt
                .query_map([], |row| row.get::<_, i64>(0))?
                .collect::<Result<Vec<_>, _>>()?;
            ids
        };
        load_calendars_by_ids(&conn, ids)
    }

    pub fn calendars_for_user(&self, user_id: i64) -> Result<Vec<Calendar>, StoreError> {
        let conn = self.conn()?;
        let ids = {
            let mut stmt = conn.prepare(
                "SELECT calendar_id FROM user_calendars WHERE user_id = ?1 ORDER BY calendar_id",
            )?;
            let ids = stmt
                .query_map([user_id], |row| row.get::<_, i64>(0))?
                .collect::<Result<Vec<_>, _>>()?;
            ids
        };
        load_calendars_by_ids(&conn, ids)
    }

    pub fn update_calendar(&self, id: i64, patch: &CalendarPatch) -> Result<Option<Calendar>, StoreError> {
        let conn = self.conn()?;
        let changed = conn.execute(
            "UPDATE calendars SET calendar_name = COALESCE(?2, calendar_name),
                 color = CASE WHEN ?4 THEN ?3 ELSE color END
             WHERE id = ?1",
            params![id, &patch.name, patch.color.clone().flatten(), patch.color.is_some()],
        )?;
        if changed == 0 {
            return Ok(None);
        }
        load_calendar_with(&conn, id)
    }

    /// Members, categories and events go with the calendar.
    pub fn delete_calendar(&self, id: i64) -> Result<bool, StoreError> {
        let changed = self.conn()?.execute("DELETE FROM calendars WHERE id = ?1", [id])?;
        Ok(changed > 0)
    }

    /// Applies a membership diff all-or-nothing. A row that vanished mid-way aborts the whole diff.
    pub fn apply_membership_changes(&self, diff: &MembershipDiff) -> Result<(), StoreError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        for removed in &diff.to_remove {
            let changed = tx.execute(
                "DELETE FROM user_calendars WHERE user_id = ?1 AND calendar_id = ?2",
                params![removed.user_id, removed.calendar_id],
            )?;
            if changed == 0 {
                return Err(StoreError::Conflict(format!(
                    "membership of user {} in calendar {} already removed",
                    removed.user_id, removed.calendar_id
                )));
            }
        }

        for update in &diff.to_update {
            let changed = tx.execute(
                "UPDATE user_calendars SET access_level = ?3
                 WHERE user_id = ?1 AND calendar_id = ?2 AND access_level = ?4",
                params![update.user_id, update.calendar_id, update.to, update.from],
            )?;
            if changed == 0 {
                return Err(StoreError::Conflict(format!(
                    "membership of user {} in calendar {} changed concurrently",
                    update.user_id, update.calendar_id
                )));
            }
        }

        for added in &diff.to_add {
            tx.execute(
                "INSERT INTO user_calendars (user_id, calendar_id, access_level) VALUES (?1, ?2, ?3)",
                params![added.user_id, added.calendar_id, added.access_level],
            )
            .map_err(classify)?;
        }

        tx.commit()?;
        Ok(())
    }

    pub fn create_event(&self, new_event: &NewEvent) -> Result<Event, StoreError> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO events (event_name, description, start_time, end_time, color, calendar_id, category_id)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                &new_event.name,
                &new_event.description,
                new_event.start,
                new_event.end,
                &new_event.color,
                new_event.calendar_id,
                new_event.category_id,
            ],
        )?;

        Ok(Event {
            id: conn.last_insert_rowid(),
            calendar_id: new_event.calendar_id,
            category_id: new_event.category_id,
            name: new_event.name.clone(),
            description: new_event.description.clone(),
            start: new_event.start,
            end: new_event.end,
            color: new_event.color.clone(),
        })
    }

    pub fn event_by_id(&self, id: i64) -> Result<Option<Event>, StoreError> {
        let conn = self.conn()?;
        let event = conn
            .query_row(
                &format!("SELECT {EVENT_COLUMNS} FROM events WHERE id = ?1"),
                [id],
                event_from_row,
            )
            .optional()?;
        Ok(event)
    }

    pub fn events_for_calendar(&self, calendar_id: i64) -> Result<Vec<Event>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {EVENT_COLUMNS} FROM events WHERE calendar_id = ?1 ORDER BY start_time, id"
        ))?;
        let events = stmt
            .query_map([calendar_id], event_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(events)
    }

    pub fn save_event(&self, event: &Event) -> Result<bool, StoreError> {
        let changed = self.conn()?.execute(
            "UPDATE events SET event_name = ?2, description = ?3, start_time = ?4, end_time = ?5,
                 color = ?6, calendar_id = ?7, category_id = ?8
             WHERE id = ?1",
            params![
                event.id,
                &event.name,
                &event.description,
                event.start,
                event.end,
                &event.color,
                event.calendar_id,
                event.category_id,
            ],
        )?;
        Ok(changed > 0)
    }

    pub fn delete_event(&self, id: i64) -> Result<bool, StoreError> {
        let changed = self.conn()?.execute("DELETE FROM events WHERE id = ?1", [id])?;
        Ok(changed > 0)
    }

    pub fn event_stats(&self) -> Result<EventStats, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT calendar_id, COUNT(*) FROM events GROUP BY calendar_id ORDER BY calendar_id",
        )?;
        let per_calendar = stmt
            .query_map([], |row| {
                Ok(CalendarEventCount {
                    calendar_id: row.get(0)?,
                    count: row.get(1)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(EventStats {
            total_events: per_calendar.iter().map(|c| c.count).sum(),
            per_calendar,
        })
    }

    pub fn create_category(&self, new_category: &NewCategory) -> Result<Category, StoreError> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO categories (category_name, color, calendar_id) VALUES (?1, ?2, ?3)",
            params![&new_category.name, &new_category.color, new_category.calendar_id],
        )?;

        Ok(Category {
            id: conn.last_insert_rowid(),
            name: new_category.name.clone(),
            color: new_category.color.clone(),
            calendar_id: new_category.calendar_id,
        })
    }

    pub fn category_by_id(&self, id: i64) -> Result<Option<Category>, StoreError> {
        let conn = self.conn()?;
        let category = conn
            .query_row(
                &format!("SELECT {CATEGORY_COLUMNS} FROM categories WHERE id = ?1"),
                [id],
                category_from_row,
            )
            .optional()?;
        Ok(category)
    }

    pub fn categories_for_calendar(&self, calendar_id: i64) -> Result<Vec<Category>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {CATEGORY_COLUMNS} FROM categories WHERE calendar_id = ?1 ORDER BY id"
        ))?;
        let categories = stmt
            .query_map([calendar_id], category_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(categories)
    }

    pub fn save_category(&self, category: &Category) -> Result<bool, StoreError> {
        let changed = self.conn()?.execute(
            "UPDATE categories SET category_name = ?2, color = ?3 WHERE id = ?1",
            params![category.id, &category.name, &category.color],
        )?;
        Ok(changed > 0)
    }

    pub fn delete_category(&self, id: i64) -> Result<bool, StoreError> {
        let changed = self.conn()?.execute("DELETE FROM categories WHERE id = ?1", [id])?;
        Ok(changed > 0)
    }

    pub fn save_refresh_token(
        &self,
        user_id: i64,
        token_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        self.conn()?
            .execute(
                "INSERT INTO refresh_tokens (token_hash, user_id, expires_at) VALUES (?1, ?2, ?3)",
                params![token_hash, user_id, expires_at],
            )
            .map_err(classify)?;
        Ok(())
    }

    pub fn refresh_token_exists(&self, token_hash: &str) -> Result<bool, StoreError> {
        let conn = self.conn()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM refresh_tokens WHERE token_hash = ?1 AND expires_at > ?2",
            params![token_hash, Utc::now()],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// Swaps one stored refresh token for another. Returns false if the old one was already gone.
    pub fn rotate_refresh_token(
        &self,
        old_hash: &str,
        user_id: i64,
        new_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        let removed = tx.execute("DELETE FROM refresh_tokens WHERE token_hash = ?1", [old_hash])?;
        if removed == 0 {
            return Ok(false);
        }
        tx.execute(
            "INSERT INTO refresh_tokens (token_hash, user_id, expires_at) VALUES (?1, ?2, ?3)",
            params![new_hash, user_id, expires_at],
        )
        .map_err(classify)?;

        tx.commit()?;
        Ok(true)
    }

    pub fn delete_refresh_token(&self, token_hash: &str) -> Result<bool, StoreError> {
        let changed = self
            .conn()?
            .execute("DELETE FROM refresh_tokens WHERE token_hash = ?1", [token_hash])?;
        Ok(changed > 0)
    }
}

#[async_trait]
impl UserLookup for Store {
    async fn find_user_id(&self, username: &str) -> Result<Option<i64>, StoreError> {
        Ok(self.user_by_username(username)?.map(|user| user.id))
    }
}
