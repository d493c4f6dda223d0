//! Schema for the managed-DNS+SQL driver's bookkeeping tables: token
//! ownership, frozen-slug quarantine, and the anchor/sub/TXT/CNAME record
//! rows, in Postgres rather than MySQL since `zvault-storage` already
//! depends on `sqlx` against Postgres.

pub const CREATE_TABLES: &str = r"
CREATE TABLE IF NOT EXISTS token (
    id BIGSERIAL PRIMARY KEY,
    token TEXT NOT NULL,
    fqdn TEXT NOT NULL UNIQUE,
    created_on TIMESTAMPTZ NOT NULL
);

CREATE TABLE IF NOT EXISTS frozen_prefix (
    prefix TEXT PRIMARY KEY,
    created_on TIMESTAMPTZ NOT NULL
);

CREATE TABLE IF NOT EXISTS record_a (
    id BIGSERIAL PRIMARY KEY,
    fqdn TEXT NOT NULL,
    type TEXT NOT NULL DEFAULT 'A',
    content TEXT NOT NULL,
    created_on TIMESTAMPTZ NOT NULL,
    updated_on TIMESTAMPTZ NOT NULL,
    tid BIGINT NOT NULL REFERENCES token(id) ON DELETE CASCADE
);

CREATE TABLE IF NOT EXISTS sub_record_a (
    id BIGSERIAL PRIMARY KEY,
    fqdn TEXT NOT NULL,
    type TEXT NOT NULL DEFAULT 'A',
    content TEXT NOT NULL,
    created_on TIMESTAMPTZ NOT NULL,
    updated_on TIMESTAMPTZ NOT NULL,
    pid BIGINT NOT NULL REFERENCES record_a(id) ON DELETE CASCADE
);

CREATE TABLE IF NOT EXISTS record_txt (
    id BIGSERIAL PRIMARY KEY,
    fqdn TEXT NOT NULL UNIQUE,
    type TEXT NOT NULL DEFAULT 'TXT',
    content TEXT NOT NULL,
    created_on TIMESTAMPTZ NOT NULL,
    updated_on TIMESTAMPTZ NOT NULL,
    tid BIGINT NOT NULL REFERENCES token(id) ON DELETE CASCADE
);

CREATE TABLE IF NOT EXISTS record_cname (
    id BIGSERIAL PRIMARY KEY,
    fqdn TEXT NOT NULL UNIQUE,
    type TEXT NOT NULL DEFAULT 'CNAME',
    content TEXT NOT NULL,
    created_on TIMESTAMPTZ NOT NULL,
    updated_on TIMESTAMPTZ NOT NULL,
    tid BIGINT NOT NULL REFERENCES token(id) ON DELETE CASCADE
);
";

/// Anchor fqdn marker (`empty.<name>`) that keeps a root A row alive for
/// `sub_record_a.pid` to reference even after every host is removed.
#[must_use]
pub fn anchor_fqdn(name: &str) -> String {
    format!("empty.{name}")
}
