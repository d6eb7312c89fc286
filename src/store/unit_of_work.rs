//! Transaction handle shared by every write that must commit atomically.

use diesel::sqlite::SqliteConnection;

/// An open `BEGIN IMMEDIATE` transaction.
///
/// Obtained only through [`super::Store::write`]. Job mutations and
/// notification enqueues both take `&mut UnitOfWork`, so a state change and
/// the event it produces always share one commit.
pub struct UnitOfWork<'c> {
    connection: &'c mut SqliteConnection,
}

impl<'c> UnitOfWork<'c> {
    pub(super) const fn new(connection: &'c mut SqliteConnection) -> Self {
        Self { connection }
    }

    /// Returns the transaction's connection.
    pub(crate) fn connection(&mut self) -> &mut SqliteConnection {
        &mut *self.connection
    }
}
