mod schema;
mod sqlite;

pub use schema::BOOKKEEPING_TABLES;
pub use sqlite::SqliteStore;

use crate::error::Result;
use crate::types::*;

/// Store defines the bookkeeping database interface. Physical collection
/// tables are managed separately through the schema builder, which executes
/// dynamic SQL over the same connection (see [`SqliteStore::connection`]).
pub trait Store: Send + Sync {
    fn initialize(&self) -> Result<()>;

    // Database (namespace) registry
    fn insert_database(&self, name: &str, owner: &str) -> Result<()>;
    fn delete_database(&self, name: &str, owner: &str) -> Result<bool>;
    fn database_exists_any(&self, name: &str) -> Result<bool>;
    fn database_exists_for(&self, name: &str, owner: &str) -> Result<bool>;
    fn list_databases_for(&self, owner: &str) -> Result<Vec<Database>>;
    fn list_all_databases(&self) -> Result<Vec<Database>>;
    /// True if `owner` has a registered database `N` with
    /// `collection LIKE N || '_%'`.
    fn owns_matching_database(&self, collection: &str, owner: &str) -> Result<bool>;

    // Principal operations
    fn create_principal(&self, principal: &Principal) -> Result<()>;
    fn get_principal(&self, name: &str) -> Result<Option<Principal>>;
    fn delete_principal(&self, name: &str) -> Result<bool>;

    // Group membership
    fn add_member(&self, role: &str, member: &str) -> Result<()>;
    fn remove_member(&self, role: &str, member: &str) -> Result<bool>;
    fn list_members(&self, role: &str) -> Result<Vec<String>>;
    fn list_groups_of(&self, member: &str) -> Result<Vec<String>>;

    // Procedure privileges
    fn grant_procedures(&self, principal: &str, procedures: &[&str]) -> Result<()>;
    fn has_procedure_grant(&self, principal: &str, procedure: &str) -> Result<bool>;

    // Collection registry (CRS + physical ownership)
    fn register_collection(&self, name: &str, srid: i32, owner: &str) -> Result<()>;
    fn unregister_collection(&self, name: &str) -> Result<bool>;
    fn get_collection_record(&self, name: &str) -> Result<Option<CollectionRecord>>;
    fn rename_collection_record(&self, old: &str, new: &str) -> Result<()>;

    // Collection grants
    fn upsert_collection_grant(&self, grant: &CollectionGrant) -> Result<()>;
    fn delete_collection_grant(&self, collection: &str, grantee: &str) -> Result<bool>;
    fn delete_grants_for_collection(&self, collection: &str) -> Result<()>;
    fn list_grants_by_grantor(&self, grantor: &str) -> Result<Vec<CollectionGrant>>;
    fn list_grants_on(&self, collection: &str) -> Result<Vec<CollectionGrant>>;
    fn rename_collection_grants(&self, old: &str, new: &str) -> Result<()>;

    // Managed secondary indexes
    fn register_index(&self, index: &CollectionIndex) -> Result<()>;
    fn unregister_index(&self, collection: &str, property: &str)
    -> Result<Option<CollectionIndex>>;
    fn list_indexes_for(&self, collection: &str) -> Result<Vec<CollectionIndex>>;
    fn rename_index_collection(&self, old: &str, new: &str) -> Result<()>;

    // Token operations
    fn create_token(&self, token: &Token) -> Result<()>;
    fn get_token_by_lookup(&self, lookup: &str) -> Result<Option<Token>>;
    fn update_token_last_used(&self, id: &str) -> Result<()>;
    fn has_admin_token(&self) -> Result<bool>;

    // Event log
    fn append_event(&self, event_type: &str, message: &str, username: &str) -> Result<()>;
    fn list_events(
        &self,
        event_type: Option<&str>,
        message_like: Option<&str>,
    ) -> Result<Vec<EventRecord>>;

    // Version
    fn version(&self) -> Result<String>;

    /// Physical user tables, excluding bookkeeping, SQLite internals, and
    /// managed spatial index tables.
    fn list_physical_tables(&self) -> Result<Vec<String>>;
    fn table_exists(&self, name: &str) -> Result<bool>;

    fn close(&self) -> Result<()>;
}
