//! Duplicate detection for scanned contacts
//!
//! A scan is a duplicate when a connection in the same festival already has
//! the same name and the same WhatsApp handle. There is no time window.
//! The check is cooperative: the store does not enforce it.

use crate::db::models::{Connection, NewConnection};

/// Identity of a contact within one festival
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Identity<'a> {
    pub name: &'a str,
    pub whatsapp: Option<&'a str>,
}

impl<'a> From<&'a Connection> for Identity<'a> {
    fn from(c: &'a Connection) -> Self {
        Self {
            name: &c.name,
            whatsapp: c.whatsapp.as_deref(),
        }
    }
}

impl<'a> From<&'a NewConnection> for Identity<'a> {
    fn from(c: &'a NewConnection) -> Self {
        Self {
            name: &c.name,
            whatsapp: c.whatsapp.as_deref(),
        }
    }
}

/// True if `incoming` matches an existing connection's identity
pub fn is_duplicate(incoming: &NewConnection, existing: &[Connection]) -> bool {
    let candidate = Identity::from(incoming);
    existing.iter().any(|c| Identity::from(c) == candidate)
}
