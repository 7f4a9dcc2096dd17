//! redb table definitions for the binding store.

use redb::TableDefinition;

/// Name of the binding collection inside the database file.
pub const BINDINGS_TABLE_NAME: &str = "DeviceNode";

/// Device bindings keyed by device id; values are the node name bytes.
pub const BINDINGS: TableDefinition<&str, &[u8]> = TableDefinition::new(BINDINGS_TABLE_NAME);
