//! SQL schema for the Agora single-table store.
//!
//! One physical table holds every entity. Secondary indexes are partial
//! indexes over nullable projection columns, so an item appears in an index
//! only when it populates that projection.

/// Full schema DDL; idempotent thanks to `IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA busy_timeout = 5000;

CREATE TABLE IF NOT EXISTS items (
    pk          TEXT NOT NULL,
    sk          TEXT NOT NULL,
    gsi1pk      TEXT,
    gsi1sk      TEXT,
    gsi2pk      TEXT,
    gsi2sk      TEXT,
    item_type   TEXT,              -- copy of attrs.type, for inspection only
    expires_at  INTEGER,           -- epoch seconds; NULL = never
    attrs       TEXT NOT NULL,     -- JSON object
    PRIMARY KEY (pk, sk),
    CHECK (pk <> '' AND sk <> ''),
    CHECK ((gsi1pk IS NULL) = (gsi1sk IS NULL)),
    CHECK ((gsi2pk IS NULL) = (gsi2sk IS NULL))
);

CREATE INDEX IF NOT EXISTS items_gsi1_idx
    ON items(gsi1pk, gsi1sk) WHERE gsi1pk IS NOT NULL;
CREATE INDEX IF NOT EXISTS items_gsi2_idx
    ON items(gsi2pk, gsi2sk) WHERE gsi2pk IS NOT NULL;
CREATE INDEX IF NOT EXISTS items_expiry_idx
    ON items(expires_at) WHERE expires_at IS NOT NULL;

PRAGMA user_version = 1;
";
