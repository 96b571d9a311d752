//! Interface name resolution.
//!
//! Configured names are user-friendly ("Ethernet", "WLAN") while the listing
//! often shows vendor descriptions, so an exact pass over the raw lines is
//! followed by a case-insensitive pass over the description column.

use crate::errors::{FailoverError, FailoverResult};
use crate::network::{AdminRow, InterfaceQuery, InterfaceRow};
use log::{debug, info};

/// Which pass produced a match
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchKind {
    Exact,
    Fuzzy,
}

/// Find the row for `name` in an interface listing.
pub fn find_row<'r>(rows: &'r [InterfaceRow], name: &str) -> Option<(&'r InterfaceRow, MatchKind)> {
    let name = name.trim();
    if name.is_empty() {
        return None;
    }

    if let Some(row) = rows.iter().find(|row| row.raw.contains(name)) {
        return Some((row, MatchKind::Exact));
    }

    let needle = name.to_lowercase();
    rows.iter()
        .find(|row| row.description.to_lowercase().contains(&needle))
        .map(|row| (row, MatchKind::Fuzzy))
}

/// Find `name` in the administrative state listing, exact pass first.
pub fn find_admin_row<'r>(rows: &'r [AdminRow], name: &str) -> Option<&'r AdminRow> {
    let name = name.trim();
    if name.is_empty() {
        return None;
    }

    if let Some(row) = rows.iter().find(|row| row.name == name || row.raw.contains(name)) {
        return Some(row);
    }

    let needle = name.to_lowercase();
    rows.iter().find(|row| row.name.to_lowercase().contains(&needle))
}

/// Maps interface names to OS indices through the query port
pub struct InterfaceResolver<'a> {
    port: &'a dyn InterfaceQuery,
}

impl<'a> InterfaceResolver<'a> {
    pub fn new(port: &'a dyn InterfaceQuery) -> Self {
        Self { port }
    }

    pub fn resolve(&self, name: &str) -> FailoverResult<u32> {
        let rows = self.port.list_interfaces()?;
        debug!("Resolving '{}' against {} interfaces", name, rows.len());

        match find_row(&rows, name) {
            Some((row, MatchKind::Exact)) => Ok(row.index),
            Some((row, MatchKind::Fuzzy)) => {
                info!(
                    "Interface '{}' partially matched '{}' with index {}",
                    name, row.description, row.index
                );
                Ok(row.index)
            }
            None => Err(FailoverError::InterfaceNotFound(name.to_string())),
        }
    }
}
