/// Schema for the profile store.
///
/// `AUTOINCREMENT` keeps ids strictly increasing and never reused, which keyset
/// cursors depend on. SQLite indexes carry the rowid, so every single-column
/// index below also serves the `(column, id)` composite ordering.
///
/// `profiles_fts` is an external-content trigram index over the searchable
/// columns, kept in step with `profiles` by triggers.
pub const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS profiles (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    zone TEXT,
    party_district TEXT,
    constituency TEXT,
    designation TEXT,
    name TEXT,
    whatsapp_number TEXT,
    dob TEXT,
    address TEXT,
    email_id TEXT,

    facebook_id TEXT,
    facebook_followers INTEGER,
    facebook_active_status INTEGER,
    facebook_verified_status INTEGER,

    twitter_id TEXT,
    twitter_followers INTEGER,
    twitter_active_status INTEGER,
    twitter_verified_status INTEGER,

    instagram_id TEXT,
    instagram_followers INTEGER,
    instagram_active_status INTEGER,
    instagram_verified_status INTEGER,

    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

-- Filter columns
CREATE INDEX IF NOT EXISTS ix_profiles_zone ON profiles(zone);
CREATE INDEX IF NOT EXISTS ix_profiles_party_district ON profiles(party_district);
CREATE INDEX IF NOT EXISTS ix_profiles_constituency ON profiles(constituency);
CREATE INDEX IF NOT EXISTS ix_profiles_designation ON profiles(designation);

-- Most common combined filter
CREATE INDEX IF NOT EXISTS ix_profiles_zone_designation ON profiles(zone, designation);

-- Sort columns
CREATE INDEX IF NOT EXISTS ix_profiles_name ON profiles(name);
CREATE INDEX IF NOT EXISTS ix_profiles_fb_followers ON profiles(facebook_followers);
CREATE INDEX IF NOT EXISTS ix_profiles_tw_followers ON profiles(twitter_followers);
CREATE INDEX IF NOT EXISTS ix_profiles_ig_followers ON profiles(instagram_followers);

-- Free-text search
CREATE VIRTUAL TABLE IF NOT EXISTS profiles_fts USING fts5(
    name, constituency, designation, zone, email_id,
    facebook_id, twitter_id, instagram_id,
    content='profiles', content_rowid='id', tokenize='trigram'
);

CREATE TRIGGER IF NOT EXISTS profiles_fts_insert AFTER INSERT ON profiles BEGIN
    INSERT INTO profiles_fts(rowid, name, constituency, designation, zone, email_id,
        facebook_id, twitter_id, instagram_id)
    VALUES (new.id, new.name, new.constituency, new.designation, new.zone, new.email_id,
        new.facebook_id, new.twitter_id, new.instagram_id);
END;

CREATE TRIGGER IF NOT EXISTS profiles_fts_delete AFTER DELETE ON profiles BEGIN
    INSERT INTO profiles_fts(profiles_fts, rowid, name, constituency, designation, zone,
        email_id, facebook_id, twitter_id, instagram_id)
    VALUES ('delete', old.id, old.name, old.constituency, old.designation, old.zone,
        old.email_id, old.facebook_id, old.twitter_id, old.instagram_id);
END;

CREATE TRIGGER IF NOT EXISTS profiles_fts_update AFTER UPDATE ON profiles BEGIN
    INSERT INTO profiles_fts(profiles_fts, rowid, name, constituency, designation, zone,
        email_id, facebook_id, twitter_id, instagram_id)
    VALUES ('delete', old.id, old.name, old.constituency, old.designation, old.zone,
        old.email_id, old.facebook_id, old.twitter_id, old.instagram_id);
    INSERT INTO profiles_fts(rowid, name, constituency, designation, zone, email_id,
        facebook_id, twitter_id, instagram_id)
    VALUES (new.id, new.name, new.constituency, new.designation, new.zone, new.email_id,
        new.facebook_id, new.twitter_id, new.instagram_id);
END;
"#;
