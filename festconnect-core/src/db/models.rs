//! Database models
//!
//! Festivals, connections and user profiles, plus the drafts callers hand in.
//! JSON field names are camelCase, matching what the view layer and the
//! legacy store exchange.

use crate::db::schema::{CollectionSchema, ColumnDefinition};
use crate::db::store::{Draft, Record, SqlValue};
use crate::time::{current_year, now};
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use std::fmt;

pub const FESTIVALS: &str = "festivals";
pub const CONNECTIONS: &str = "connections";
pub const USER_PROFILES: &str = "user_profiles";

/// Store-assigned festival handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FestivalId(pub i64);

impl fmt::Display for FestivalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Store-assigned connection handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(pub i64);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Festival {
    pub id: FestivalId,
    pub name: String,
    pub year: i32,
    pub created_at: DateTime<Utc>,
    pub is_active: bool,
}

/// Festival to be created; `year` defaults to the current year
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewFestival {
    pub name: String,
    #[serde(default)]
    pub year: Option<i32>,
    #[serde(default)]
    pub is_active: bool,
}

impl NewFestival {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn active(mut self) -> Self {
        self.is_active = true;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Connection {
    pub id: ConnectionId,
    pub festival_id: FestivalId,
    pub name: String,
    pub whatsapp: Option<String>,
    pub instagram: Option<String>,
    /// Display label, may differ from the owning festival's name
    pub festival: String,
    pub scanned_at: DateTime<Utc>,
    /// Raw scan payload kept for audit
    pub qr_data: String,
}

/// Connection to be recorded
///
/// `festival_id` is stamped by the session from the active festival;
/// the repository refuses drafts without it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewConnection {
    #[serde(default)]
    pub festival_id: Option<FestivalId>,
    pub name: String,
    #[serde(default)]
    pub whatsapp: Option<String>,
    #[serde(default)]
    pub instagram: Option<String>,
    #[serde(default)]
    pub festival: String,
    #[serde(default)]
    pub scanned_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub qr_data: String,
}

/// One profile per festival, keyed by the festival id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub festival_id: FestivalId,
    pub name: String,
    pub festival: String,
    pub whatsapp: Option<String>,
    pub instagram: Option<String>,
    pub updated_at: DateTime<Utc>,
}

/// Profile fields supplied by the caller
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileData {
    pub name: String,
    #[serde(default)]
    pub festival: String,
    #[serde(default)]
    pub whatsapp: Option<String>,
    #[serde(default)]
    pub instagram: Option<String>,
}

/// Contact handles as carried in a scan payload
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContactInfo {
    #[serde(default)]
    pub whatsapp: Option<String>,
    #[serde(default)]
    pub instagram: Option<String>,
}

/// Decoded scan payload handed over by the scanner
///
/// Profile QR codes carry the handles flat (`whatsapp`, `instagram`); older
/// payloads nest them under `contact` or `contactInfo`. Flat handles win.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScannedContact {
    pub name: String,
    #[serde(default)]
    pub whatsapp: Option<String>,
    #[serde(default)]
    pub instagram: Option<String>,
    #[serde(default, alias = "contactInfo")]
    pub contact: ContactInfo,
    #[serde(default)]
    pub festival: Option<String>,
}

impl ScannedContact {
    /// Connection draft keeping `raw` as the audit payload
    pub fn into_new_connection(self, raw: impl Into<String>) -> NewConnection {
        NewConnection {
            festival_id: None,
            name: self.name,
            whatsapp: self.whatsapp.or(self.contact.whatsapp),
            instagram: self.instagram.or(self.contact.instagram),
            festival: self.festival.unwrap_or_default(),
            scanned_at: None,
            qr_data: raw.into(),
        }
    }
}

fn festival_id_column() -> ColumnDefinition {
    ColumnDefinition::new("festival_id", "INTEGER")
        .not_null()
        .references("festivals(id)")
}

fn year_from(value: i64) -> Result<i32> {
    i32::try_from(value).map_err(|_| Error::InvalidInput(format!("year out of range: {}", value)))
}

impl Record for Festival {
    fn schema() -> CollectionSchema {
        CollectionSchema {
            name: FESTIVALS,
            key: "id",
            auto_key: true,
            columns: vec![
                ColumnDefinition::new("id", "INTEGER").auto_increment(),
                ColumnDefinition::new("name", "TEXT").not_null(),
                ColumnDefinition::new("year", "INTEGER").not_null(),
                ColumnDefinition::new("created_at", "TIMESTAMP").not_null(),
                ColumnDefinition::new("is_active", "INTEGER")
                    .not_null()
                    .default("0"),
            ],
            indexes: vec![],
        }
    }

    fn key(&self) -> i64 {
        self.id.0
    }

    fn values(&self) -> Vec<SqlValue> {
        vec![
            self.name.clone().into(),
            i64::from(self.year).into(),
            self.created_at.into(),
            self.is_active.into(),
        ]
    }

    fn from_row(row: &SqliteRow) -> Result<Self> {
        Ok(Self {
            id: FestivalId(row.try_get("id")?),
            name: row.try_get("name")?,
            year: year_from(row.try_get("year")?)?,
            created_at: row.try_get("created_at")?,
            is_active: row.try_get::<i64, _>("is_active")? != 0,
        })
    }
}

/// Defaults are resolved when the draft is written
impl Draft for NewFestival {
    type Record = Festival;

    fn values(&self) -> Vec<SqlValue> {
        vec![
            self.name.clone().into(),
            i64::from(self.year.unwrap_or_else(current_year)).into(),
            now().into(),
            self.is_active.into(),
        ]
    }
}

impl Record for Connection {
    fn schema() -> CollectionSchema {
        CollectionSchema {
            name: CONNECTIONS,
            key: "id",
            auto_key: true,
            columns: vec![
                ColumnDefinition::new("id", "INTEGER").auto_increment(),
                festival_id_column(),
                ColumnDefinition::new("name", "TEXT").not_null(),
                ColumnDefinition::new("whatsapp", "TEXT"),
                ColumnDefinition::new("instagram", "TEXT"),
                ColumnDefinition::new("festival", "TEXT")
                    .not_null()
                    .default("''"),
                ColumnDefinition::new("scanned_at", "TIMESTAMP").not_null(),
                ColumnDefinition::new("qr_data", "TEXT")
                    .not_null()
                    .default("''"),
            ],
            indexes: vec!["festival_id", "scanned_at"],
        }
    }

    fn key(&self) -> i64 {
        self.id.0
    }

    fn values(&self) -> Vec<SqlValue> {
        vec![
            self.festival_id.0.into(),
            self.name.clone().into(),
            self.whatsapp.clone().into(),
            self.instagram.clone().into(),
            self.festival.clone().into(),
            self.scanned_at.into(),
            self.qr_data.clone().into(),
        ]
    }

    fn from_row(row: &SqliteRow) -> Result<Self> {
        Ok(Self {
            id: ConnectionId(row.try_get("id")?),
            festival_id: FestivalId(row.try_get("festival_id")?),
            name: row.try_get("name")?,
            whatsapp: row.try_get("whatsapp")?,
            instagram: row.try_get("instagram")?,
            festival: row.try_get("festival")?,
            scanned_at: row.try_get("scanned_at")?,
            qr_data: row.try_get("qr_data")?,
        })
    }
}

impl Draft for NewConnection {
    type Record = Connection;

    fn values(&self) -> Vec<SqlValue> {
        vec![
            SqlValue::Integer(self.festival_id.map(|id| id.0)),
            self.name.clone().into(),
            self.whatsapp.clone().into(),
            self.instagram.clone().into(),
            self.festival.clone().into(),
            self.scanned_at.unwrap_or_else(now).into(),
            self.qr_data.clone().into(),
        ]
    }
}

impl Record for UserProfile {
    fn schema() -> CollectionSchema {
        CollectionSchema {
            name: USER_PROFILES,
            key: "festival_id",
            auto_key: false,
            columns: vec![
                festival_id_column().primary_key(),
                ColumnDefinition::new("name", "TEXT").not_null(),
                ColumnDefinition::new("festival", "TEXT")
                    .not_null()
                    .default("''"),
                ColumnDefinition::new("whatsapp", "TEXT"),
                ColumnDefinition::new("instagram", "TEXT"),
                ColumnDefinition::new("updated_at", "TIMESTAMP").not_null(),
            ],
            indexes: vec![],
        }
    }

    fn key(&self) -> i64 {
        self.festival_id.0
    }

    fn values(&self) -> Vec<SqlValue> {
        vec![
            self.name.clone().into(),
            self.festival.clone().into(),
            self.whatsapp.clone().into(),
            self.instagram.clone().into(),
            self.updated_at.into(),
        ]
    }

    fn from_row(row: &SqliteRow) -> Result<Self> {
        Ok(Self {
            festival_id: FestivalId(row.try_get("festival_id")?),
            name: row.try_get("name")?,
            festival: row.try_get("festival")?,
            whatsapp: row.try_get("whatsapp")?,
            instagram: row.try_get("instagram")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}
