pub const SCHEMA: &str = r#"
-- Logical databases: namespaces of collections, unique per (name, owner).
-- Creation enforces global name exclusivity on top of this constraint;
-- group-publish inserts additional (name, group) rows deliberately.
CREATE TABLE IF NOT EXISTS databases (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    owner TEXT NOT NULL,
    created_at TEXT DEFAULT (datetime('now')),

    UNIQUE(name, owner)
);

-- Principals: users can log in, groups cannot
CREATE TABLE IF NOT EXISTS principals (
    name TEXT PRIMARY KEY,
    kind TEXT NOT NULL CHECK (kind IN ('user', 'group')),
    password_hash TEXT,          -- argon2id hash, NULL for groups
    created_at TEXT DEFAULT (datetime('now'))
);

-- Group membership (member-of relation, walked transitively)
CREATE TABLE IF NOT EXISTS role_members (
    role_name TEXT NOT NULL REFERENCES principals(name) ON DELETE CASCADE,
    member_name TEXT NOT NULL REFERENCES principals(name) ON DELETE CASCADE,
    granted_at TEXT DEFAULT (datetime('now')),
    PRIMARY KEY (role_name, member_name)
);

-- Execute privileges on management procedures, seeded at registration.
-- New principals start with none (the privilege catch-up step).
CREATE TABLE IF NOT EXISTS procedure_grants (
    principal TEXT NOT NULL REFERENCES principals(name) ON DELETE CASCADE,
    procedure TEXT NOT NULL,
    PRIMARY KEY (principal, procedure)
);

-- CRS and ownership metadata for managed collection tables
CREATE TABLE IF NOT EXISTS collections (
    name TEXT PRIMARY KEY,
    srid INTEGER NOT NULL,
    owner TEXT NOT NULL,
    created_at TEXT DEFAULT (datetime('now'))
);

-- Per-collection read/all grants; grantee 'public' means everyone
CREATE TABLE IF NOT EXISTS collection_grants (
    collection TEXT NOT NULL,
    grantee TEXT NOT NULL,
    grantor TEXT NOT NULL,
    privileges TEXT NOT NULL CHECK (privileges IN ('read', 'all')),
    granted_at TEXT DEFAULT (datetime('now')),
    PRIMARY KEY (collection, grantee)
);

-- Secondary indexes managed through the schema builder
CREATE TABLE IF NOT EXISTS collection_indexes (
    collection TEXT NOT NULL,
    property TEXT NOT NULL,
    index_name TEXT NOT NULL UNIQUE,
    kind TEXT NOT NULL CHECK (kind IN ('standard', 'spatial')),
    PRIMARY KEY (collection, property)
);

-- Tokens are auth credentials; non-admin tokens must belong to a principal
CREATE TABLE IF NOT EXISTS tokens (
    id TEXT PRIMARY KEY,
    token_hash TEXT NOT NULL,          -- argon2id hash with embedded salt
    token_lookup TEXT NOT NULL,        -- first 8 chars of ID for fast lookup
    is_admin INTEGER NOT NULL DEFAULT 0,

    principal TEXT REFERENCES principals(name) ON DELETE CASCADE,

    created_at TEXT DEFAULT (datetime('now')),
    expires_at TEXT,            -- NULL = never
    last_used_at TEXT
);

-- Append-only event log
CREATE TABLE IF NOT EXISTS eventlog (
    event_type TEXT NOT NULL,
    message TEXT NOT NULL,
    username TEXT NOT NULL,
    date TEXT DEFAULT (datetime('now'))
);

-- Schema version written at initialization
CREATE TABLE IF NOT EXISTS version_info (
    version TEXT NOT NULL
);

-- Create indexes
CREATE INDEX IF NOT EXISTS idx_databases_owner ON databases(owner);
CREATE INDEX IF NOT EXISTS idx_role_members_member ON role_members(member_name);
CREATE INDEX IF NOT EXISTS idx_collection_grants_grantor ON collection_grants(grantor);
CREATE INDEX IF NOT EXISTS idx_collection_indexes_collection ON collection_indexes(collection);
CREATE UNIQUE INDEX IF NOT EXISTS idx_tokens_lookup ON tokens(token_lookup);
CREATE INDEX IF NOT EXISTS idx_tokens_principal ON tokens(principal);
CREATE INDEX IF NOT EXISTS idx_eventlog_type ON eventlog(event_type);
"#;

/// Bookkeeping tables that must never be listed or manipulated as
/// collections.
pub const BOOKKEEPING_TABLES: &[&str] = &[
    "databases",
    "principals",
    "role_members",
    "procedure_grants",
    "collections",
    "collection_grants",
    "collection_indexes",
    "tokens",
    "eventlog",
    "version_info",
];
