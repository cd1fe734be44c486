use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);")?;

    let version: i64 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |r| r.get(0),
    )?;

    if version < 1 {
        info!("Running migration v1 (initial schema)");
        conn.execute_batch(
            "
            CREATE TABLE users (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                name        TEXT NOT NULL,
                avatar_url  TEXT NOT NULL DEFAULT '',
                status      INTEGER NOT NULL DEFAULT 1,
                deleted_at  TEXT,
                created_at  TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
            );

            CREATE TABLE questions (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                text        TEXT NOT NULL
            );

            CREATE TABLE options (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                question_id INTEGER NOT NULL REFERENCES questions(id),
                text        TEXT NOT NULL
            );

            CREATE INDEX idx_options_question ON options(question_id);

            -- One answer per (user, question)
            CREATE TABLE quiz_answers (
                user_id     INTEGER NOT NULL REFERENCES users(id),
                question_id INTEGER NOT NULL REFERENCES questions(id),
                option_id   INTEGER NOT NULL REFERENCES options(id),
                PRIMARY KEY (user_id, question_id)
            );

            CREATE INDEX idx_quiz_answers_pair ON quiz_answers(question_id, option_id);

            CREATE TABLE connection_requests (
                id                  INTEGER PRIMARY KEY AUTOINCREMENT,
                requesting_user_id  INTEGER NOT NULL REFERENCES users(id),
                requested_user_id   INTEGER NOT NULL REFERENCES users(id),
                status              INTEGER NOT NULL DEFAULT 2,
                created_at          TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
                answered_at         TEXT,
                CHECK (requesting_user_id <> requested_user_id)
            );

            -- At most one pending request per unordered pair
            CREATE UNIQUE INDEX idx_requests_pending_pair ON connection_requests(
                min(requesting_user_id, requested_user_id),
                max(requesting_user_id, requested_user_id)
            ) WHERE status = 2;

            CREATE INDEX idx_requests_requested ON connection_requests(requested_user_id, status);

            CREATE TABLE connections (
                id                      INTEGER PRIMARY KEY AUTOINCREMENT,
                user_a                  INTEGER NOT NULL REFERENCES users(id),
                user_b                  INTEGER NOT NULL REFERENCES users(id),
                connection_request_id   INTEGER NOT NULL REFERENCES connection_requests(id),
                created_at              TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
            );

            -- At most one connection per unordered pair
            CREATE UNIQUE INDEX idx_connections_pair ON connections(
                min(user_a, user_b),
                max(user_a, user_b)
            );

            CREATE TABLE messages (
                id              INTEGER PRIMARY KEY AUTOINCREMENT,
                connection_id   INTEGER NOT NULL REFERENCES connections(id),
                sender_id       INTEGER NOT NULL REFERENCES users(id),
                content         TEXT NOT NULL,
                created_at      TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
                read_at         TEXT
            );

            CREATE INDEX idx_messages_connection ON messages(connection_id, created_at);

            INSERT INTO schema_version (version) VALUES (1);
            ",
        )?;
    }

    info!("Database migrations complete");
    Ok(())
}
