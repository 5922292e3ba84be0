// ── Cookielens Engine: Cookie Store ────────────────────────────────────────
//
// Embedded SQLite database holding everything the classifier knows:
//
//   cookies          — one descriptor per unique cookie name
//   cookie_patterns  — glob → cookie id (cascade delete with the cookie)
//   ai_query_cache   — raw LM reply text, keyed by MD5(name|domain)
//   user_corrections — field-level audit log of manual edits
//   settings         — schema version and misc key/value rows
//
// One connection, shared behind a mutex; statements serialize on it, so
// concurrent readers and writers are both safe. WAL mode keeps readers
// cheap. All schema statements are idempotent (CREATE IF NOT EXISTS).
//
// Name resolution order: exact name first, then the first matching pattern
// in primary-key order.

use log::{info, warn};
use md5::{Digest as _, Md5};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::atoms::classify_types::{
    CookieCategory, Descriptor, DescriptorSource, PrivacyLevel,
};
use crate::atoms::constants::{SCHEMA_VERSION, STORE_DIR_NAME, STORE_FILE_NAME};
use crate::atoms::error::{CoreError, CoreResult};

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS cookies (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL UNIQUE,
        vendor TEXT NOT NULL DEFAULT '',
        category TEXT NOT NULL DEFAULT 'Unknown',
        purpose TEXT NOT NULL DEFAULT '',
        privacy TEXT NOT NULL DEFAULT 'Medium',
        third_party INTEGER NOT NULL DEFAULT 0,
        typical_expiration TEXT NOT NULL DEFAULT '',
        common_domains TEXT NOT NULL DEFAULT '[]',
        notes TEXT NOT NULL DEFAULT '',
        confidence REAL NOT NULL DEFAULT 0.7,
        source TEXT NOT NULL DEFAULT 'ai',
        created_at TEXT NOT NULL DEFAULT (datetime('now')),
        updated_at TEXT NOT NULL DEFAULT (datetime('now'))
    );
    CREATE INDEX IF NOT EXISTS idx_cookies_category ON cookies(category);

    CREATE TABLE IF NOT EXISTS cookie_patterns (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        pattern TEXT NOT NULL UNIQUE,
        like_pattern TEXT NOT NULL,
        cookie_id INTEGER NOT NULL REFERENCES cookies(id) ON DELETE CASCADE
    );

    CREATE TABLE IF NOT EXISTS ai_query_cache (
        query_hash TEXT PRIMARY KEY,
        cookie_name TEXT NOT NULL,
        domain TEXT NOT NULL DEFAULT '',
        response_text TEXT NOT NULL,
        created_at TEXT NOT NULL DEFAULT (datetime('now'))
    );

    CREATE TABLE IF NOT EXISTS user_corrections (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        cookie_name TEXT NOT NULL,
        field TEXT NOT NULL,
        old_value TEXT NOT NULL DEFAULT '',
        new_value TEXT NOT NULL DEFAULT '',
        corrected_at TEXT NOT NULL DEFAULT (datetime('now'))
    );

    CREATE TABLE IF NOT EXISTS settings (
        key TEXT PRIMARY KEY,
        value TEXT NOT NULL
    );
";

/// Descriptor fields a user may edit in place. Everything else changes
/// through a full upsert.
const EDITABLE_FIELDS: &[&str] = &[
    "vendor",
    "category",
    "purpose",
    "privacy",
    "third_party",
    "typical_expiration",
    "notes",
    "confidence",
];

// ── Aggregate statistics ───────────────────────────────────────────────────

#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct StoreStats {
    pub total: u64,
    pub by_category: BTreeMap<String, u64>,
    pub by_privacy: BTreeMap<String, u64>,
    pub third_party: u64,
    pub patterns: u64,
    pub cached_responses: u64,
}

// ── Store ──────────────────────────────────────────────────────────────────

pub struct CookieStore {
    conn: Mutex<Connection>,
}

/// Platform-neutral default database path: `~/.burp-cookie-db/cookies.db`.
pub fn default_store_path() -> PathBuf {
    let home = dirs::home_dir().unwrap_or_default();
    home.join(STORE_DIR_NAME).join(STORE_FILE_NAME)
}

impl CookieStore {
    /// Open (or create) the store at `path`, falling back to the platform
    /// default location when `None`.
    pub fn open(path: Option<&Path>) -> CoreResult<Self> {
        let path = path.map(Path::to_path_buf).unwrap_or_else(default_store_path);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        info!("[store] opening cookie store at {:?}", path);
        let conn = Connection::open(&path)?;
        Self::init(conn)
    }

    /// In-memory store for tests and throwaway sessions.
    pub fn open_in_memory() -> CoreResult<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> CoreResult<Self> {
        // WAL keeps concurrent readers cheap; foreign keys drive the
        // pattern cascade. journal_mode answers with a row, hence the .ok().
        conn.execute_batch("PRAGMA journal_mode=WAL;").ok();
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        conn.execute_batch(SCHEMA)?;
        conn.execute(
            "INSERT INTO settings (key, value) VALUES ('schema_version', ?1)
             ON CONFLICT(key) DO NOTHING",
            params![SCHEMA_VERSION.to_string()],
        )?;
        Ok(CookieStore { conn: Mutex::new(conn) })
    }

    // ── Descriptors ────────────────────────────────────────────────────────

    /// Insert or update the descriptor for its cookie name. Last write of a
    /// given name wins at field granularity; `created_at` survives updates.
    pub fn upsert_descriptor(&self, descriptor: &Descriptor) -> CoreResult<()> {
        let conn = self.conn.lock();
        let domains = serde_json::to_string(&descriptor.common_domains)?;
        conn.execute(
            "INSERT INTO cookies (name, vendor, category, purpose, privacy, third_party,
                                  typical_expiration, common_domains, notes, confidence,
                                  source, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
             ON CONFLICT(name) DO UPDATE SET
                vendor = ?2, category = ?3, purpose = ?4, privacy = ?5, third_party = ?6,
                typical_expiration = ?7, common_domains = ?8, notes = ?9, confidence = ?10,
                source = ?11, updated_at = ?13",
            params![
                descriptor.name,
                descriptor.vendor,
                descriptor.category.as_str(),
                descriptor.purpose,
                descriptor.privacy.as_str(),
                descriptor.third_party as i32,
                descriptor.typical_expiration,
                domains,
                descriptor.notes,
                descriptor.confidence,
                descriptor.source.as_str(),
                descriptor.created_at,
                descriptor.updated_at,
            ],
        )?;
        Ok(())
    }

    /// Exact-name lookup only.
    pub fn lookup_exact(&self, name: &str) -> CoreResult<Option<Descriptor>> {
        let conn = self.conn.lock();
        let result = conn
            .query_row(
                &format!("SELECT {} FROM cookies WHERE name = ?1", DESCRIPTOR_COLUMNS),
                params![name],
                row_to_descriptor,
            )
            .optional()?;
        Ok(result)
    }

    /// Pattern lookup: first glob matching `name`, in primary-key order.
    pub fn lookup_pattern(&self, name: &str) -> CoreResult<Option<Descriptor>> {
        let conn = self.conn.lock();
        let result = conn
            .query_row(
                &format!(
                    "SELECT {} FROM cookies c
                     JOIN cookie_patterns p ON p.cookie_id = c.id
                     WHERE ?1 LIKE p.like_pattern ESCAPE '\\'
                     ORDER BY p.id LIMIT 1",
                    DESCRIPTOR_COLUMNS_QUALIFIED
                ),
                params![name],
                row_to_descriptor,
            )
            .optional()?;
        Ok(result)
    }

    /// Resolution used by the pipeline: exact name, then pattern.
    pub fn lookup(&self, name: &str) -> CoreResult<Option<Descriptor>> {
        if let Some(found) = self.lookup_exact(name)? {
            return Ok(Some(found));
        }
        self.lookup_pattern(name)
    }

    pub fn list_all(&self) -> CoreResult<Vec<Descriptor>> {
        let conn = self.conn.lock();
        let mut stmt =
            conn.prepare(&format!("SELECT {} FROM cookies ORDER BY name", DESCRIPTOR_COLUMNS))?;
        let rows = stmt.query_map([], row_to_descriptor)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    /// Update one editable field in place, recording the old value in the
    /// corrections audit log and re-stamping the descriptor as manual.
    pub fn update_field(&self, name: &str, field: &str, new_value: &str) -> CoreResult<()> {
        if !EDITABLE_FIELDS.contains(&field) {
            return Err(CoreError::Config(format!("field not editable: {}", field)));
        }
        let conn = self.conn.lock();
        let old_value: Option<String> = conn
            .query_row(
                &format!("SELECT CAST({} AS TEXT) FROM cookies WHERE name = ?1", field),
                params![name],
                |row| row.get(0),
            )
            .optional()?;
        let Some(old_value) = old_value else {
            return Err(CoreError::Other(format!("no descriptor for cookie: {}", name)));
        };

        // `field` comes from the whitelist above, never from callers verbatim.
        conn.execute(
            &format!(
                "UPDATE cookies SET {} = ?1, source = 'manual', updated_at = datetime('now')
                 WHERE name = ?2",
                field
            ),
            params![new_value, name],
        )?;
        conn.execute(
            "INSERT INTO user_corrections (cookie_name, field, old_value, new_value)
             VALUES (?1, ?2, ?3, ?4)",
            params![name, field, old_value, new_value],
        )?;
        Ok(())
    }

    pub fn delete_by_name(&self, name: &str) -> CoreResult<()> {
        let conn = self.conn.lock();
        let removed = conn.execute("DELETE FROM cookies WHERE name = ?1", params![name])?;
        if removed == 0 {
            warn!("[store] delete of unknown cookie name: {}", name);
        }
        Ok(())
    }

    // ── Patterns ───────────────────────────────────────────────────────────

    /// Register a glob (with `*` as wildcard) resolving to the descriptor
    /// stored under `cookie_name`.
    pub fn add_pattern(&self, glob: &str, cookie_name: &str) -> CoreResult<()> {
        let conn = self.conn.lock();
        let cookie_id: Option<i64> = conn
            .query_row("SELECT id FROM cookies WHERE name = ?1", params![cookie_name], |row| {
                row.get(0)
            })
            .optional()?;
        let Some(cookie_id) = cookie_id else {
            return Err(CoreError::Other(format!("no descriptor for cookie: {}", cookie_name)));
        };
        conn.execute(
            "INSERT INTO cookie_patterns (pattern, like_pattern, cookie_id)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(pattern) DO UPDATE SET like_pattern = ?2, cookie_id = ?3",
            params![glob, glob_to_like(glob), cookie_id],
        )?;
        Ok(())
    }

    pub fn list_patterns(&self) -> CoreResult<Vec<(String, String)>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT p.pattern, c.name FROM cookie_patterns p
             JOIN cookies c ON c.id = p.cookie_id ORDER BY p.id",
        )?;
        let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    // ── AI query cache ─────────────────────────────────────────────────────

    /// Keep the raw LM reply for audit, keyed by the task identity hash.
    pub fn cache_raw_response(&self, name: &str, domain: &str, raw: &str) -> CoreResult<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO ai_query_cache (query_hash, cookie_name, domain, response_text)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(query_hash) DO UPDATE SET response_text = ?4,
                created_at = datetime('now')",
            params![query_hash(name, domain), name, domain, raw],
        )?;
        Ok(())
    }

    pub fn cached_raw_response(&self, name: &str, domain: &str) -> CoreResult<Option<String>> {
        let conn = self.conn.lock();
        let result = conn
            .query_row(
                "SELECT response_text FROM ai_query_cache WHERE query_hash = ?1",
                params![query_hash(name, domain)],
                |row| row.get(0),
            )
            .optional()?;
        Ok(result)
    }

    // ── Settings ───────────────────────────────────────────────────────────

    pub fn setting_get(&self, key: &str) -> CoreResult<Option<String>> {
        let conn = self.conn.lock();
        let result = conn
            .query_row("SELECT value FROM settings WHERE key = ?1", params![key], |row| row.get(0))
            .optional()?;
        Ok(result)
    }

    pub fn setting_set(&self, key: &str, value: &str) -> CoreResult<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO settings (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = ?2",
            params![key, value],
        )?;
        Ok(())
    }

    // ── Statistics ─────────────────────────────────────────────────────────

    pub fn statistics(&self) -> CoreResult<StoreStats> {
        let conn = self.conn.lock();
        let mut stats = StoreStats::default();
        stats.total = conn.query_row("SELECT COUNT(*) FROM cookies", [], |row| row.get(0))?;
        stats.third_party = conn.query_row(
            "SELECT COUNT(*) FROM cookies WHERE third_party = 1",
            [],
            |row| row.get(0),
        )?;
        stats.patterns =
            conn.query_row("SELECT COUNT(*) FROM cookie_patterns", [], |row| row.get(0))?;
        stats.cached_responses =
            conn.query_row("SELECT COUNT(*) FROM ai_query_cache", [], |row| row.get(0))?;

        let mut stmt =
            conn.prepare("SELECT category, COUNT(*) FROM cookies GROUP BY category")?;
        let rows = stmt.query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, u64>(1)?)))?;
        for row in rows {
            let (category, count) = row?;
            stats.by_category.insert(category, count);
        }

        let mut stmt = conn.prepare("SELECT privacy, COUNT(*) FROM cookies GROUP BY privacy")?;
        let rows = stmt.query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, u64>(1)?)))?;
        for row in rows {
            let (privacy, count) = row?;
            stats.by_privacy.insert(privacy, count);
        }
        Ok(stats)
    }
}

// ── Row mapping & helpers ──────────────────────────────────────────────────

const DESCRIPTOR_COLUMNS: &str = "name, vendor, category, purpose, privacy, third_party, \
     typical_expiration, common_domains, notes, confidence, source, created_at, updated_at";

const DESCRIPTOR_COLUMNS_QUALIFIED: &str =
    "c.name, c.vendor, c.category, c.purpose, c.privacy, c.third_party, \
     c.typical_expiration, c.common_domains, c.notes, c.confidence, c.source, \
     c.created_at, c.updated_at";

fn row_to_descriptor(row: &rusqlite::Row<'_>) -> rusqlite::Result<Descriptor> {
    let category: String = row.get(2)?;
    let privacy: String = row.get(4)?;
    let domains_json: String = row.get(7)?;
    let source: String = row.get(10)?;
    Ok(Descriptor {
        name: row.get(0)?,
        vendor: row.get(1)?,
        category: CookieCategory::parse(&category),
        purpose: row.get(3)?,
        privacy: PrivacyLevel::parse(&privacy),
        third_party: row.get::<_, i32>(5)? != 0,
        typical_expiration: row.get(6)?,
        common_domains: serde_json::from_str(&domains_json).unwrap_or_default(),
        notes: row.get(8)?,
        confidence: row.get(9)?,
        source: DescriptorSource::parse(&source),
        created_at: row.get(11)?,
        updated_at: row.get(12)?,
    })
}

/// Translate a `*`-wildcard glob to a SQL LIKE pattern, escaping the LIKE
/// metacharacters so `_ga_*` matches `_ga_XYZ` but not `Xga-XYZ`.
fn glob_to_like(glob: &str) -> String {
    let mut out = String::with_capacity(glob.len() + 4);
    for ch in glob.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '%' => out.push_str("\\%"),
            '_' => out.push_str("\\_"),
            '*' => out.push('%'),
            other => out.push(other),
        }
    }
    out
}

/// MD5 of `name|domain`, hex-encoded — the audit-cache row key.
fn query_hash(name: &str, domain: &str) -> String {
    let mut hasher = Md5::new();
    hasher.update(name.as_bytes());
    hasher.update(b"|");
    hasher.update(domain.as_bytes());
    let digest = hasher.finalize();
    let mut out = String::with_capacity(32);
    for byte in digest {
        out.push_str(&format!("{:02x}", byte));
    }
    out
}

// ── Tests ──────────────────────────────────────────────────────────────────
