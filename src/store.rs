use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use rusqlite::{params, Connection, OpenFlags, OptionalExtension};
use serde::Serialize;

use crate::geo::TileCoord;

#[derive(Debug, Clone, PartialEq)]
pub struct CompressionResult {
    pub data: Vec<u8>,
    pub original_size: usize,
    pub compressed_size: usize,
    pub compression_ratio: f64,
}

/// Gzip a tile payload. Zero-length input compresses to a valid empty stream.
pub fn compress_tile(data: &[u8]) -> Result<CompressionResult> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data).context("compress tile data")?;
    let compressed = encoder.finish().context("finish tile compression")?;
    let ratio = if data.is_empty() {
        1.0
    } else {
        compressed.len() as f64 / data.len() as f64
    };
    Ok(CompressionResult {
        original_size: data.len(),
        compressed_size: compressed.len(),
        compression_ratio: ratio,
        data: compressed,
    })
}

/// Inverse of `compress_tile`. Payloads without the gzip magic pass through
/// unchanged, so uncompressed rows in the compat table read back as-is.
pub fn decompress_tile(data: &[u8]) -> Result<Vec<u8>> {
    if data.starts_with(&[0x1f, 0x8b]) {
        let mut decoder = GzDecoder::new(data);
        let mut decoded = Vec::new();
        decoder
            .read_to_end(&mut decoded)
            .context("decompress tile data")?;
        Ok(decoded)
    } else {
        Ok(data.to_vec())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StorageStats {
    pub total_tiles: u64,
    pub unique_tile_data: u64,
    pub deduplication_ratio: f64,
    pub total_size: u64,
    pub average_compression_ratio: f64,
}

/// Content-addressed tile store over an embedded SQLite database.
///
/// Two write paths share one file: an MBTiles-compatible `tiles` table so the
/// store opens in generic tile viewers, and a `tile_data`/`tile_refs` pair
/// where byte-identical tiles share a single compressed blob.
pub struct TileStore {
    conn: Connection,
    path: PathBuf,
}

impl TileStore {
    /// Create or open the store, initializing the schema. A failure here is
    /// fatal for the whole subsystem and surfaces to the caller.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("failed to open tile store: {}", path.display()))?;
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS metadata (
                name TEXT PRIMARY KEY,
                value TEXT
            );
            CREATE TABLE IF NOT EXISTS tiles (
                zoom_level INTEGER,
                tile_column INTEGER,
                tile_row INTEGER,
                tile_data BLOB,
                PRIMARY KEY (zoom_level, tile_column, tile_row)
            );
            CREATE TABLE IF NOT EXISTS tile_data (
                id INTEGER PRIMARY KEY,
                data BLOB NOT NULL,
                hash TEXT NOT NULL UNIQUE,
                size INTEGER NOT NULL,
                compression_ratio REAL NOT NULL
            );
            CREATE TABLE IF NOT EXISTS tile_refs (
                zoom_level INTEGER,
                tile_column INTEGER,
                tile_row INTEGER,
                data_id INTEGER NOT NULL REFERENCES tile_data(id),
                PRIMARY KEY (zoom_level, tile_column, tile_row)
            );
            ",
        )
        .context("failed to initialize tile store schema")?;
        let store = Self {
            conn,
            path: path.to_path_buf(),
        };
        store.seed_metadata()?;
        Ok(store)
    }

    fn seed_metadata(&self) -> Result<()> {
        let defaults = [
            ("name", "route-tiles"),
            ("type", "baselayer"),
            ("version", "1"),
            ("description", "offline route tile store"),
            ("format", "pbf"),
            ("compression", "gzip"),
        ];
        for (name, value) in defaults {
            self.conn
                .execute(
                    "INSERT OR IGNORE INTO metadata (name, value) VALUES (?1, ?2)",
                    params![name, value],
                )
                .context("seed metadata")?;
        }
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Compat-table write: raw bytes keyed by (z, x, y), replacing any
    /// previous row for the coordinate.
    pub fn store_tile(&mut self, coord: TileCoord, data: &[u8]) -> Result<()> {
        self.conn
            .execute(
                "INSERT OR REPLACE INTO tiles (zoom_level, tile_column, tile_row, tile_data)
                 VALUES (?1, ?2, ?3, ?4)",
                params![coord.zoom, coord.x, coord.y, data],
            )
            .with_context(|| format!("store tile {coord}"))?;
        Ok(())
    }

    /// Deduplicated write: hash the payload, reuse an existing blob when the
    /// digest and byte length both match, otherwise compress and insert a new
    /// one. Either way the coordinate gets a `tile_refs` row pointing at the
    /// blob. Returns the blob's `data_id`.
    pub fn store_tile_deduplicated(&mut self, coord: TileCoord, data: &[u8]) -> Result<i64> {
        let hash = blake3::hash(data).to_hex().to_string();
        let tx = self.conn.transaction().context("begin dedup transaction")?;

        let existing: Option<(i64, i64)> = tx
            .query_row(
                "SELECT id, size FROM tile_data WHERE hash = ?1",
                params![hash],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()
            .context("look up tile hash")?;

        let data_id = match existing {
            Some((id, size)) if size == data.len() as i64 => {
                tracing::debug!(tile = %coord, data_id = id, "dedup hit");
                id
            }
            Some((_, size)) => {
                // Same digest, different length. With a 256-bit digest this is
                // effectively unreachable; refuse to alias rather than corrupt.
                anyhow::bail!(
                    "hash collision for tile {coord}: stored size {size}, incoming {}",
                    data.len()
                );
            }
            None => {
                let compressed = compress_tile(data)?;
                tx.execute(
                    "INSERT INTO tile_data (data, hash, size, compression_ratio)
                     VALUES (?1, ?2, ?3, ?4)",
                    params![
                        compressed.data,
                        hash,
                        data.len() as i64,
                        compressed.compression_ratio
                    ],
                )
                .with_context(|| format!("insert tile data for {coord}"))?;
                tx.last_insert_rowid()
            }
        };

        tx.execute(
            "INSERT OR REPLACE INTO tile_refs (zoom_level, tile_column, tile_row, data_id)
             VALUES (?1, ?2, ?3, ?4)",
            params![coord.zoom, coord.x, coord.y, data_id],
        )
        .with_context(|| format!("insert tile ref for {coord}"))?;

        tx.commit().context("commit dedup transaction")?;
        Ok(data_id)
    }

    pub fn read_tile(&self, coord: TileCoord) -> Result<Option<Vec<u8>>> {
        read_tile_from(&self.conn, coord)
    }

    pub fn storage_stats(&self) -> Result<StorageStats> {
        let total_tiles: u64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM tile_refs", [], |row| {
                row.get::<_, i64>(0).map(|v| v as u64)
            })
            .context("count tile refs")?;
        let unique_tile_data: u64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM tile_data", [], |row| {
                row.get::<_, i64>(0).map(|v| v as u64)
            })
            .context("count unique tile data")?;
        let total_size: u64 = self
            .conn
            .query_row(
                "SELECT COALESCE(SUM(LENGTH(data)), 0) FROM tile_data",
                [],
                |row| row.get::<_, i64>(0).map(|v| v as u64),
            )
            .context("sum tile data size")?;
        let average_compression_ratio: f64 = self
            .conn
            .query_row(
                "SELECT COALESCE(AVG(compression_ratio), 0.0) FROM tile_data",
                [],
                |row| row.get(0),
            )
            .context("average compression ratio")?;

        let deduplication_ratio = if unique_tile_data == 0 {
            1.0
        } else {
            total_tiles as f64 / unique_tile_data as f64
        };
        Ok(StorageStats {
            total_tiles,
            unique_tile_data,
            deduplication_ratio,
            total_size,
            average_compression_ratio,
        })
    }

    /// A fresh read-only connection for concurrent readers (loader workers).
    pub fn reader(&self) -> Result<TileReader> {
        TileReader::open(&self.path)
    }
}

/// Read-only view of a tile store. Each loader worker owns one, so travel-time
/// reads never contend on the planner's write connection.
pub struct TileReader {
    conn: Connection,
}

impl TileReader {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_ONLY)
            .with_context(|| format!("failed to open tile store: {}", path.display()))?;
        conn.execute_batch(
            "
            PRAGMA query_only = ON;
            PRAGMA temp_store = MEMORY;
            PRAGMA cache_size = -20000;
            ",
        )
        .context("failed to apply read pragmas")?;
        Ok(Self { conn })
    }

    /// Decompressed tile payload, or `None` when the store has no row for the
    /// coordinate in either schema. Absence is a normal negative result.
    pub fn read_tile(&self, coord: TileCoord) -> Result<Option<Vec<u8>>> {
        read_tile_from(&self.conn, coord)
    }
}

fn read_tile_from(conn: &Connection, coord: TileCoord) -> Result<Option<Vec<u8>>> {
    let deduped: Option<Vec<u8>> = conn
        .query_row(
            "SELECT d.data FROM tile_refs r
             JOIN tile_data d ON d.id = r.data_id
             WHERE r.zoom_level = ?1 AND r.tile_column = ?2 AND r.tile_row = ?3",
            params![coord.zoom, coord.x, coord.y],
            |row| row.get(0),
        )
        .optional()
        .with_context(|| format!("read deduplicated tile {coord}"))?;
    if let Some(data) = deduped {
        return decompress_tile(&data).map(Some);
    }

    let compat: Option<Vec<u8>> = conn
        .query_row(
            "SELECT tile_data FROM tiles
             WHERE zoom_level = ?1 AND tile_column = ?2 AND tile_row = ?3",
            params![coord.zoom, coord.x, coord.y],
            |row| row.get(0),
        )
        .optional()
        .with_context(|| format!("read compat tile {coord}"))?;
    match compat {
        Some(data) => decompress_tile(&data).map(Some),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compress_round_trips() {
        let payload = b"a tile payload with some repetition repetition repetition".to_vec();
        let result = compress_tile(&payload).expect("compress");
        assert_eq!(result.original_size, payload.len());
        let restored = decompress_tile(&result.data).expect("decompress");
        assert_eq!(restored, payload);
    }

    #[test]
    fn compress_handles_empty_input() {
        let result = compress_tile(&[]).expect("compress empty");
        assert_eq!(result.original_size, 0);
        let restored = decompress_tile(&result.data).expect("decompress empty");
        assert!(restored.is_empty());
    }

    #[test]
    fn decompress_passes_through_plain_bytes() {
        let raw = vec![0u8, 1, 2, 3];
        assert_eq!(decompress_tile(&raw).expect("pass through"), raw);
    }
}
