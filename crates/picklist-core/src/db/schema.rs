//! SQLite schema for a picklist project store.
//!
//! - `fields` and `bind_values` define list fields and their allowed values;
//!   user- and group-bound values reference `users` / `ugroups`
//! - `field_permissions` grants read/submit/update on a field to a group
//! - `workflows`, `transitions` and `transition_groups` hold per-field
//!   transition rules
//! - `artifacts`, `changesets`, `changeset_values` and
//!   `changeset_value_list` hold the value history
//! - `store_meta` records the schema version
//!
//! Bind value ids start above 100: id 100 is the "None" sentinel and is
//! never a stored row.

/// Migration v1: core tables plus store metadata.
pub const MIGRATION_V1_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS users (
    user_id INTEGER PRIMARY KEY AUTOINCREMENT,
    login TEXT NOT NULL UNIQUE CHECK (length(trim(login)) > 0),
    real_name TEXT,
    created_at_us INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS ugroups (
    ugroup_id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE CHECK (length(trim(name)) > 0),
    created_at_us INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS ugroup_members (
    ugroup_id INTEGER NOT NULL REFERENCES ugroups(ugroup_id) ON DELETE CASCADE,
    user_id INTEGER NOT NULL REFERENCES users(user_id) ON DELETE CASCADE,
    PRIMARY KEY (ugroup_id, user_id)
);

CREATE TABLE IF NOT EXISTS fields (
    field_id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE CHECK (length(trim(name)) > 0),
    label TEXT NOT NULL,
    bind_kind TEXT NOT NULL CHECK (bind_kind IN ('static', 'users', 'ugroups')),
    required INTEGER NOT NULL DEFAULT 0 CHECK (required IN (0, 1)),
    multiple INTEGER NOT NULL DEFAULT 0 CHECK (multiple IN (0, 1)),
    read_only INTEGER NOT NULL DEFAULT 0 CHECK (read_only IN (0, 1)),
    created_at_us INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS bind_values (
    value_id INTEGER PRIMARY KEY AUTOINCREMENT,
    field_id INTEGER NOT NULL REFERENCES fields(field_id) ON DELETE CASCADE,
    label TEXT NOT NULL,
    description TEXT,
    rank INTEGER NOT NULL,
    hidden INTEGER NOT NULL DEFAULT 0 CHECK (hidden IN (0, 1)),
    is_default INTEGER NOT NULL DEFAULT 0 CHECK (is_default IN (0, 1)),
    user_id INTEGER REFERENCES users(user_id) ON DELETE CASCADE,
    ugroup_id INTEGER REFERENCES ugroups(ugroup_id) ON DELETE CASCADE,
    CHECK (value_id <> 100),
    UNIQUE (field_id, label)
);

INSERT INTO sqlite_sequence (name, seq)
SELECT 'bind_values', 100
WHERE NOT EXISTS (SELECT 1 FROM sqlite_sequence WHERE name = 'bind_values');

CREATE TABLE IF NOT EXISTS field_permissions (
    field_id INTEGER NOT NULL REFERENCES fields(field_id) ON DELETE CASCADE,
    ugroup_id INTEGER NOT NULL REFERENCES ugroups(ugroup_id) ON DELETE CASCADE,
    access TEXT NOT NULL CHECK (access IN ('read', 'submit', 'update')),
    PRIMARY KEY (field_id, ugroup_id, access)
);

CREATE TABLE IF NOT EXISTS workflows (
    field_id INTEGER PRIMARY KEY REFERENCES fields(field_id) ON DELETE CASCADE,
    enabled INTEGER NOT NULL DEFAULT 0 CHECK (enabled IN (0, 1))
);

CREATE TABLE IF NOT EXISTS transitions (
    transition_id INTEGER PRIMARY KEY AUTOINCREMENT,
    field_id INTEGER NOT NULL REFERENCES workflows(field_id) ON DELETE CASCADE,
    from_value_id INTEGER REFERENCES bind_values(value_id) ON DELETE CASCADE,
    to_value_id INTEGER NOT NULL REFERENCES bind_values(value_id) ON DELETE CASCADE
);

CREATE TABLE IF NOT EXISTS transition_groups (
    transition_id INTEGER NOT NULL REFERENCES transitions(transition_id) ON DELETE CASCADE,
    ugroup_id INTEGER NOT NULL REFERENCES ugroups(ugroup_id) ON DELETE CASCADE,
    PRIMARY KEY (transition_id, ugroup_id)
);

CREATE TABLE IF NOT EXISTS artifacts (
    artifact_id INTEGER PRIMARY KEY AUTOINCREMENT,
    title TEXT NOT NULL,
    created_by INTEGER NOT NULL REFERENCES users(user_id),
    created_at_us INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS changesets (
    changeset_id INTEGER PRIMARY KEY AUTOINCREMENT,
    artifact_id INTEGER NOT NULL REFERENCES artifacts(artifact_id) ON DELETE CASCADE,
    submitted_by INTEGER NOT NULL REFERENCES users(user_id),
    submitted_on_us INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS changeset_values (
    changeset_value_id INTEGER PRIMARY KEY AUTOINCREMENT,
    changeset_id INTEGER NOT NULL REFERENCES changesets(changeset_id) ON DELETE CASCADE,
    field_id INTEGER NOT NULL REFERENCES fields(field_id) ON DELETE CASCADE,
    has_changed INTEGER NOT NULL CHECK (has_changed IN (0, 1)),
    UNIQUE (changeset_id, field_id)
);

-- value_id is not a foreign key: history keeps ids of values deleted
-- since; readers drop them.
CREATE TABLE IF NOT EXISTS changeset_value_list (
    changeset_value_id INTEGER NOT NULL
        REFERENCES changeset_values(changeset_value_id) ON DELETE CASCADE,
    position INTEGER NOT NULL,
    value_id INTEGER NOT NULL CHECK (value_id <> 100),
    PRIMARY KEY (changeset_value_id, position)
);

CREATE TABLE IF NOT EXISTS store_meta (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    schema_version INTEGER NOT NULL,
    created_at_us INTEGER NOT NULL DEFAULT 0
);

INSERT OR IGNORE INTO store_meta (id, schema_version, created_at_us) VALUES (1, 1, 0);
"#;

/// Migration v2: value decorators and read-path indexes.
pub const MIGRATION_V2_SQL: &str = r#"
ALTER TABLE bind_values ADD COLUMN decorator TEXT;

CREATE INDEX IF NOT EXISTS idx_bind_values_field_rank
    ON bind_values(field_id, rank, value_id);

CREATE INDEX IF NOT EXISTS idx_transitions_field_to
    ON transitions(field_id, to_value_id, from_value_id);

CREATE INDEX IF NOT EXISTS idx_ugroup_members_user
    ON ugroup_members(user_id, ugroup_id);

CREATE INDEX IF NOT EXISTS idx_changesets_artifact
    ON changesets(artifact_id, changeset_id);

CREATE INDEX IF NOT EXISTS idx_changeset_values_field
    ON changeset_values(field_id, changeset_id);

UPDATE store_meta
SET schema_version = 2
WHERE id = 1;
"#;

/// Indexes expected by the value, workflow and history read paths.
pub const REQUIRED_INDEXES: &[&str] = &[
    "idx_bind_values_field_rank",
    "idx_transitions_field_to",
    "idx_ugroup_members_user",
    "idx_changesets_artifact",
    "idx_changeset_values_field",
];
