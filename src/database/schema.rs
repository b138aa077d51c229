pub const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS recognition_results (
        id TEXT PRIMARY KEY,
        item_id TEXT NOT NULL,
        timestamp_ticks INTEGER NOT NULL,
        label TEXT NOT NULL,
        confidence REAL NOT NULL,
        bbox TEXT NOT NULL,
        created_at TEXT NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_results_item_ticks
        ON recognition_results(item_id, timestamp_ticks);
";
