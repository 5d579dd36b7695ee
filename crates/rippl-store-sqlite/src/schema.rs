//! SQL schema for the Rippl SQLite store.
//!
//! Executed once at connection startup. `PRAGMA user_version` records the
//! schema revision for future migrations.

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS groups (
    group_id           TEXT PRIMARY KEY,
    name               TEXT NOT NULL,
    impact_coefficient REAL NOT NULL,
    impact_unit        TEXT NOT NULL,
    impact_source      TEXT NOT NULL DEFAULT '',
    bucket_weights     TEXT NOT NULL DEFAULT '{}'   -- JSON object bucket -> weight
);

CREATE TABLE IF NOT EXISTS entities (
    entity_id      TEXT PRIMARY KEY,
    group_id       TEXT NOT NULL REFERENCES groups(group_id),
    title          TEXT NOT NULL,
    status         TEXT NOT NULL DEFAULT 'active',  -- 'active' | 'archived'
    default_bucket TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS memberships (
    user_id   TEXT NOT NULL,
    entity_id TEXT NOT NULL REFERENCES entities(entity_id),
    joined_at TEXT NOT NULL,
    is_active INTEGER NOT NULL DEFAULT 1,
    PRIMARY KEY (user_id, entity_id)
);

-- Actions are strictly append-only.
CREATE TABLE IF NOT EXISTS actions (
    action_id   TEXT PRIMARY KEY,
    entity_id   TEXT NOT NULL REFERENCES entities(entity_id),
    group_id    TEXT NOT NULL,
    user_id     TEXT NOT NULL,
    bucket      TEXT NOT NULL,
    occurred_at TEXT NOT NULL
);

-- One row per entity, guarded by an optimistic version. Never deleted.
CREATE TABLE IF NOT EXISTS summaries (
    entity_id       TEXT PRIMARY KEY,
    participants    INTEGER NOT NULL,
    actions_total   INTEGER NOT NULL,
    impact_lifetime REAL NOT NULL,
    impact_30d      REAL NOT NULL,
    impact_unit     TEXT NOT NULL,
    updated_at      TEXT NOT NULL,
    version         INTEGER NOT NULL CHECK (version > 0)
);

CREATE TABLE IF NOT EXISTS trending_snapshots (
    entity_id            TEXT NOT NULL,
    group_id             TEXT NOT NULL,
    score                REAL NOT NULL,
    rank_score           REAL NOT NULL,
    participants         INTEGER NOT NULL,
    actions_24h          INTEGER NOT NULL,
    actions_1h           INTEGER NOT NULL,
    new_participants_24h INTEGER NOT NULL,
    boost                REAL NOT NULL,
    is_top_ten           INTEGER NOT NULL,
    top_ten_days         INTEGER NOT NULL,
    calculated_at        TEXT NOT NULL,
    PRIMARY KEY (entity_id, calculated_at)
);

CREATE TABLE IF NOT EXISTS impact_indexes (
    entity_id         TEXT PRIMARY KEY,
    group_id          TEXT NOT NULL,
    index_score       REAL NOT NULL,
    median_impact     REAL NOT NULL,
    ripple_impact     REAL NOT NULL,
    participant_count INTEGER NOT NULL,
    eligible_actions  REAL NOT NULL,
    is_visible        INTEGER NOT NULL,
    calculated_at     TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS user_impacts (
    user_id          TEXT PRIMARY KEY,
    total_actions    INTEGER NOT NULL,
    eligible_actions REAL NOT NULL,
    entities_joined  INTEGER NOT NULL,
    lifetime         TEXT NOT NULL,   -- JSON array of GroupImpact
    window_30d       TEXT NOT NULL,   -- JSON array of GroupImpact
    calculated_at    TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS entities_group_idx      ON entities(group_id);
CREATE INDEX IF NOT EXISTS memberships_entity_idx  ON memberships(entity_id, joined_at);
CREATE INDEX IF NOT EXISTS actions_entity_idx      ON actions(entity_id, occurred_at);
CREATE INDEX IF NOT EXISTS actions_user_idx        ON actions(user_id, occurred_at);
CREATE INDEX IF NOT EXISTS snapshots_calculated_idx ON trending_snapshots(calculated_at);

PRAGMA user_version = 1;
";
