//! Connection indicator and schema/table catalog.
//!
//! Probes are asynchronous, so every request takes a ticket. A result whose
//! ticket is no longer current belongs to an older connection string or schema
//! and is dropped instead of being applied.

use crate::error::ConsoleError;
use crate::model::ConnStatus;

/// Discovered schemas and, once one is chosen, its tables.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectionCatalog {
    pub schemas: Vec<String>,
    pub schema: Option<String>,
    pub tables: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeTicket(u64);

#[derive(Debug, Default)]
pub struct ConnectionProbe {
    status: ConnStatus,
    catalog: ConnectionCatalog,
    schema_ticket: u64,
    table_ticket: u64,
}

impl ConnectionProbe {
    pub fn status(&self) -> ConnStatus {
        self.status
    }

    pub fn catalog(&self) -> &ConnectionCatalog {
        &self.catalog
    }

    /// Start a connection test; the previous catalog is discarded now, not on success.
    pub fn begin_test(&mut self) -> ProbeTicket {
        self.schema_ticket += 1;
        self.table_ticket += 1;
        self.catalog = ConnectionCatalog::default();
        ProbeTicket(self.schema_ticket)
    }

    /// Apply a connection test result. Returns false for a stale ticket.
    pub fn finish_test(
        &mut self,
        ticket: ProbeTicket,
        result: &Result<Vec<String>, ConsoleError>,
    ) -> bool {
        if ticket.0 != self.schema_ticket {
            return false;
        }
        match result {
            Ok(schemas) => {
                self.status = ConnStatus::Success;
                self.catalog = ConnectionCatalog {
                    schemas: schemas.clone(),
                    ..Default::default()
                };
            }
            Err(_) => {
                self.status = ConnStatus::Error;
                self.catalog = ConnectionCatalog::default();
            }
        }
        true
    }

    /// Start listing tables for `schema`; tables of the previous schema are dropped now.
    pub fn begin_tables(&mut self, schema: &str) -> ProbeTicket {
        self.table_ticket += 1;
        self.catalog.schema = Some(schema.to_string());
        self.catalog.tables.clear();
        ProbeTicket(self.table_ticket)
    }

    /// Apply a table listing. On error the table set stays empty. Returns false for a stale ticket.
    pub fn finish_tables(
        &mut self,
        ticket: ProbeTicket,
        result: &Result<Vec<String>, ConsoleError>,
    ) -> bool {
        if ticket.0 != self.table_ticket {
            return false;
        }
        self.catalog.tables = match result {
            Ok(tables) => tables.clone(),
            Err(_) => Vec::new(),
        };
        true
    }
}
