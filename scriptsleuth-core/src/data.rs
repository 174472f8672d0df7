use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, Result, params};
use scriptsleuth_scanner::{CrawlResult, TextPair};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::Path;
use tracing::debug;

pub struct Database {
    conn: Connection,
}

/// Invocation metadata stored next to a crawl result.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordMeta {
    pub batch_uuid: String,
    pub batch_tags: Vec<String>,
    pub url: String,
    pub region: Option<String>,
    pub rank: Option<i64>,
    /// Terms that were searched for, matched or not.
    pub terms: Vec<String>,
    pub domains: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrawlRecord {
    pub id: i64,
    pub url: String,
    pub batch_uuid: String,
    pub region: Option<String>,
    pub rank: Option<i64>,
    pub crawled_at: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InlineMatchRecord {
    pub term: String,
    pub sha256: String,
    pub text: String,
    pub deobfuscated: Option<String>,
    pub suspect_url: Option<String>,
    pub suspect_responded: Option<bool>,
    pub suspect_distance: Option<i64>,
}

/// A remote script row, keyed by the term or domain it matched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteMatchRecord {
    pub key: String,
    pub url: String,
    pub sha256: String,
}

pub fn current_timestamp() -> i64 {
    Utc::now().timestamp()
}

/// Hex SHA-256 of the original script text.
pub fn script_hash(text: &str) -> String {
    hex::encode(Sha256::digest(text.as_bytes()))
}

/// Insert `value` into a `(id, <column> UNIQUE)` table if missing and return
/// its id. Safe against concurrent writers creating the same row.
fn get_or_create(conn: &Connection, table: &str, column: &str, value: &str) -> Result<i64> {
    conn.execute(
        &format!(
            "INSERT INTO {table} ({column}) VALUES (?1) ON CONFLICT({column}) DO NOTHING"
        ),
        params![value],
    )?;
    conn.query_row(
        &format!("SELECT id FROM {table} WHERE {column} = ?1"),
        params![value],
        |row| row.get(0),
    )
}

fn link(conn: &Connection, table: &str, column: &str, batch_id: i64, other_id: i64) -> Result<()> {
    conn.execute(
        &format!(
            "INSERT INTO {table} (batch_id, {column}) VALUES (?1, ?2) ON CONFLICT DO NOTHING"
        ),
        params![batch_id, other_id],
    )?;
    Ok(())
}

fn script_id(conn: &Connection, text: &TextPair) -> Result<i64> {
    let sha256 = script_hash(&text.original);
    conn.execute(
        "INSERT INTO scripts (sha256, text, deobfuscated) VALUES (?1, ?2, ?3)
         ON CONFLICT(sha256) DO NOTHING",
        params![&sha256, &text.original, &text.canonical],
    )?;
    conn.query_row(
        "SELECT id FROM scripts WHERE sha256 = ?1",
        params![&sha256],
        |row| row.get(0),
    )
}

fn batch_id(conn: &Connection, meta: &RecordMeta) -> Result<i64> {
    conn.execute(
        "INSERT INTO batches (uuid, region, created_at) VALUES (?1, ?2, ?3)
         ON CONFLICT(uuid) DO NOTHING",
        params![&meta.batch_uuid, &meta.region, current_timestamp()],
    )?;
    let batch_id: i64 = conn.query_row(
        "SELECT id FROM batches WHERE uuid = ?1",
        params![&meta.batch_uuid],
        |row| row.get(0),
    )?;

    for tag in &meta.batch_tags {
        let tag_id = get_or_create(conn, "tags", "name", tag)?;
        link(conn, "batches_tags", "tag_id", batch_id, tag_id)?;
    }
    for term in &meta.terms {
        let term_id = get_or_create(conn, "terms", "text", term)?;
        link(conn, "batches_terms", "term_id", batch_id, term_id)?;
    }
    for domain in &meta.domains {
        let domain_id = get_or_create(conn, "domains", "name", domain)?;
        link(conn, "batches_domains", "domain_id", batch_id, domain_id)?;
    }

    Ok(batch_id)
}

impl Database {
    pub fn drop(path: &Path) -> std::io::Result<()> {
        fs::remove_file(path)
    }

    pub fn exists(path: &Path) -> bool {
        path.exists()
    }

    pub fn new(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;

        // Several scans may record into the same file at once
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA busy_timeout = 5000;
            PRAGMA temp_store = MEMORY;
            PRAGMA foreign_keys = ON;
            ",
        )?;

        let db = Database { conn };
        db.init_schema()?;
        Ok(db)
    }

    fn init_schema(&self) -> Result<()> {
        self.conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS batches (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    uuid TEXT UNIQUE NOT NULL,
    region TEXT,
    created_at INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS tags (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT UNIQUE NOT NULL
);

CREATE TABLE IF NOT EXISTS terms (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    text TEXT UNIQUE NOT NULL
);

CREATE TABLE IF NOT EXISTS domains (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT UNIQUE NOT NULL
);

CREATE TABLE IF NOT EXISTS batches_tags (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    batch_id INTEGER NOT NULL,
    tag_id INTEGER NOT NULL,
    FOREIGN KEY(batch_id) REFERENCES batches(id) ON DELETE CASCADE,
    FOREIGN KEY(tag_id) REFERENCES tags(id) ON DELETE CASCADE,
    UNIQUE(batch_id, tag_id)
);

CREATE TABLE IF NOT EXISTS batches_terms (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    batch_id INTEGER NOT NULL,
    term_id INTEGER NOT NULL,
    FOREIGN KEY(batch_id) REFERENCES batches(id) ON DELETE CASCADE,
    FOREIGN KEY(term_id) REFERENCES terms(id) ON DELETE CASCADE,
    UNIQUE(batch_id, term_id)
);

CREATE TABLE IF NOT EXISTS batches_domains (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    batch_id INTEGER NOT NULL,
    domain_id INTEGER NOT NULL,
    FOREIGN KEY(batch_id) REFERENCES batches(id) ON DELETE CASCADE,
    FOREIGN KEY(domain_id) REFERENCES domains(id) ON DELETE CASCADE,
    UNIQUE(batch_id, domain_id)
);

-- Script bodies, content addressed
CREATE TABLE IF NOT EXISTS scripts (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    sha256 TEXT UNIQUE NOT NULL,
    text TEXT NOT NULL,
    deobfuscated TEXT
);

CREATE TABLE IF NOT EXISTS crawls (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    url TEXT NOT NULL,
    batch_id INTEGER NOT NULL,
    rank INTEGER,
    crawled_at INTEGER NOT NULL,
    FOREIGN KEY(batch_id) REFERENCES batches(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_crawls_batch ON crawls(batch_id);

CREATE TABLE IF NOT EXISTS inline_scripts_terms (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    term_id INTEGER NOT NULL,
    crawl_id INTEGER NOT NULL,
    script_id INTEGER NOT NULL,

    -- Positional guess at the script defining the term, if one was made
    suspect_url TEXT,
    suspect_responded BOOLEAN,
    suspect_distance INTEGER,

    FOREIGN KEY(term_id) REFERENCES terms(id) ON DELETE CASCADE,
    FOREIGN KEY(crawl_id) REFERENCES crawls(id) ON DELETE CASCADE,
    FOREIGN KEY(script_id) REFERENCES scripts(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_inline_scripts_terms_crawl ON inline_scripts_terms(crawl_id);

CREATE TABLE IF NOT EXISTS remote_scripts_terms (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    term_id INTEGER NOT NULL,
    crawl_id INTEGER NOT NULL,
    script_id INTEGER NOT NULL,
    url TEXT NOT NULL,
    FOREIGN KEY(term_id) REFERENCES terms(id) ON DELETE CASCADE,
    FOREIGN KEY(crawl_id) REFERENCES crawls(id) ON DELETE CASCADE,
    FOREIGN KEY(script_id) REFERENCES scripts(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_remote_scripts_terms_crawl ON remote_scripts_terms(crawl_id);

CREATE TABLE IF NOT EXISTS remote_scripts_domains (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    domain_id INTEGER NOT NULL,
    crawl_id INTEGER NOT NULL,
    script_id INTEGER NOT NULL,
    url TEXT NOT NULL,
    FOREIGN KEY(domain_id) REFERENCES domains(id) ON DELETE CASCADE,
    FOREIGN KEY(crawl_id) REFERENCES crawls(id) ON DELETE CASCADE,
    FOREIGN KEY(script_id) REFERENCES scripts(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_remote_scripts_domains_crawl ON remote_scripts_domains(crawl_id);
            ",
        )?;

        Ok(())
    }

    /// Store one crawl and its matches. Returns the id of the new `crawls`
    /// row. Nothing is written unless every insert succeeds.
    pub fn record(&mut self, result: &CrawlResult, meta: &RecordMeta) -> Result<i64> {
        let tx = self.conn.transaction()?;

        let batch_id = batch_id(&tx, meta)?;
        tx.execute(
            "INSERT INTO crawls (url, batch_id, rank, crawled_at) VALUES (?1, ?2, ?3, ?4)",
            params![&meta.url, batch_id, meta.rank, current_timestamp()],
        )?;
        let crawl_id = tx.last_insert_rowid();
        debug!(
            "Inserted crawl of {} for batch {} as id {}",
            meta.url, meta.batch_uuid, crawl_id
        );

        for finding in result.terms.values() {
            let term_id = get_or_create(&tx, "terms", "text", &finding.term)?;

            for inline in finding.inline_matches() {
                let script_id = script_id(&tx, &inline.text)?;
                let suspect = inline.suspect_script.as_ref();
                tx.execute(
                    "INSERT INTO inline_scripts_terms (
                        term_id, crawl_id, script_id,
                        suspect_url, suspect_responded, suspect_distance
                    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                    params![
                        term_id,
                        crawl_id,
                        script_id,
                        suspect.map(|s| s.url.as_str()),
                        suspect.map(|s| s.responded),
                        suspect.map(|s| s.distance as i64),
                    ],
                )?;
            }

            for remote in finding.remote_matches() {
                let script_id = script_id(&tx, &remote.text)?;
                tx.execute(
                    "INSERT INTO remote_scripts_terms (term_id, crawl_id, script_id, url)
                     VALUES (?1, ?2, ?3, ?4)",
                    params![term_id, crawl_id, script_id, &remote.url],
                )?;
            }
        }

        for finding in result.domains.values() {
            let domain_id = get_or_create(&tx, "domains", "name", &finding.domain)?;
            for (url, text) in &finding.matches {
                let script_id = script_id(&tx, text)?;
                tx.execute(
                    "INSERT INTO remote_scripts_domains (domain_id, crawl_id, script_id, url)
                     VALUES (?1, ?2, ?3, ?4)",
                    params![domain_id, crawl_id, script_id, url],
                )?;
            }
        }

        tx.commit()?;
        debug!("Recorded crawl {} of {}", crawl_id, meta.url);
        Ok(crawl_id)
    }

    // Query methods

    pub fn crawl_count(&self) -> Result<i64> {
        self.conn
            .query_row("SELECT COUNT(*) FROM crawls", [], |row| row.get(0))
    }

    pub fn script_count(&self) -> Result<i64> {
        self.conn
            .query_row("SELECT COUNT(*) FROM scripts", [], |row| row.get(0))
    }

    pub fn get_crawl(&self, crawl_id: i64) -> Result<Option<CrawlRecord>> {
        self.conn
            .query_row(
                "SELECT c.id, c.url, b.uuid, b.region, c.rank, c.crawled_at
                 FROM crawls c
                 JOIN batches b ON c.batch_id = b.id
                 WHERE c.id = ?1",
                params![crawl_id],
                |row| {
                    Ok(CrawlRecord {
                        id: row.get(0)?,
                        url: row.get(1)?,
                        batch_uuid: row.get(2)?,
                        region: row.get(3)?,
                        rank: row.get(4)?,
                        crawled_at: row.get(5)?,
                    })
                },
            )
            .optional()
    }

    pub fn crawls_for_batch(&self, batch_uuid: &str) -> Result<Vec<CrawlRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT c.id, c.url, b.uuid, b.region, c.rank, c.crawled_at
             FROM crawls c
             JOIN batches b ON c.batch_id = b.id
             WHERE b.uuid = ?1
             ORDER BY c.id",
        )?;

        let crawls = stmt
            .query_map(params![batch_uuid], |row| {
                Ok(CrawlRecord {
                    id: row.get(0)?,
                    url: row.get(1)?,
                    batch_uuid: row.get(2)?,
                    region: row.get(3)?,
                    rank: row.get(4)?,
                    crawled_at: row.get(5)?,
                })
            })?
            .collect::<Result<Vec<_>>>()?;

        Ok(crawls)
    }

    pub fn inline_matches_for_crawl(&self, crawl_id: i64) -> Result<Vec<InlineMatchRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT t.text, s.sha256, s.text, s.deobfuscated,
                    i.suspect_url, i.suspect_responded, i.suspect_distance
             FROM inline_scripts_terms i
             JOIN terms t ON i.term_id = t.id
             JOIN scripts s ON i.script_id = s.id
             WHERE i.crawl_id = ?1
             ORDER BY i.id",
        )?;

        let matches = stmt
            .query_map(params![crawl_id], |row| {
                Ok(InlineMatchRecord {
                    term: row.get(0)?,
                    sha256: row.get(1)?,
                    text: row.get(2)?,
                    deobfuscated: row.get(3)?,
                    suspect_url: row.get(4)?,
                    suspect_responded: row.get(5)?,
                    suspect_distance: row.get(6)?,
                })
            })?
            .collect::<Result<Vec<_>>>()?;

        Ok(matches)
    }

    pub fn remote_term_matches_for_crawl(&self, crawl_id: i64) -> Result<Vec<RemoteMatchRecord>> {
        self.remote_matches(
            "SELECT t.text, r.url, s.sha256
             FROM remote_scripts_terms r
             JOIN terms t ON r.term_id = t.id
             JOIN scripts s ON r.script_id = s.id
             WHERE r.crawl_id = ?1
             ORDER BY r.id",
            crawl_id,
        )
    }

    pub fn domain_matches_for_crawl(&self, crawl_id: i64) -> Result<Vec<RemoteMatchRecord>> {
        self.remote_matches(
            "SELECT d.name, r.url, s.sha256
             FROM remote_scripts_domains r
             JOIN domains d ON r.domain_id = d.id
             JOIN scripts s ON r.script_id = s.id
             WHERE r.crawl_id = ?1
             ORDER BY r.id",
            crawl_id,
        )
    }

    fn remote_matches(&self, query: &str, crawl_id: i64) -> Result<Vec<RemoteMatchRecord>> {
        let mut stmt = self.conn.prepare(query)?;
        let matches = stmt
            .query_map(params![crawl_id], |row| {
                Ok(RemoteMatchRecord {
                    key: row.get(0)?,
                    url: row.get(1)?,
                    sha256: row.get(2)?,
                })
            })?
            .collect::<Result<Vec<_>>>()?;

        Ok(matches)
    }

    pub fn tags_for_batch(&self, batch_uuid: &str) -> Result<Vec<String>> {
        let mut stmt = self.conn.prepare(
            "SELECT t.name
             FROM batches_tags bt
             JOIN tags t ON bt.tag_id = t.id
             JOIN batches b ON bt.batch_id = b.id
             WHERE b.uuid = ?1
             ORDER BY t.name",
        )?;

        let tags = stmt
            .query_map(params![batch_uuid], |row| row.get(0))?
            .collect::<Result<Vec<_>>>()?;

        Ok(tags)
    }

    pub fn get_connection(&self) -> &Connection {
        &self.conn
    }
}
