use route_tiles::geo::TileCoord;
use route_tiles::store::{compress_tile, decompress_tile, TileStore};

#[test]
fn storing_identical_bytes_twice_shares_one_blob() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("route.db");
    let mut store = TileStore::open(&path).expect("open");

    // Two coordinates, identical payload (open ocean tiles look like this).
    let payload = vec![7u8; 4096];
    let id_a = store
        .store_tile_deduplicated(TileCoord::new(10, 1, 1), &payload)
        .expect("store a");
    let id_b = store
        .store_tile_deduplicated(TileCoord::new(10, 2, 1), &payload)
        .expect("store b");
    assert_eq!(id_a, id_b);

    let conn = rusqlite::Connection::open(&path).expect("open raw");
    let data_rows: u64 = conn
        .query_row("SELECT COUNT(*) FROM tile_data", [], |row| {
            row.get::<_, i64>(0).map(|v| v as u64)
        })
        .expect("count data");
    let ref_rows: u64 = conn
        .query_row("SELECT COUNT(*) FROM tile_refs", [], |row| {
            row.get::<_, i64>(0).map(|v| v as u64)
        })
        .expect("count refs");
    assert_eq!(data_rows, 1);
    assert_eq!(ref_rows, 2);

    let stats = store.storage_stats().expect("stats");
    assert_eq!(stats.total_tiles, 2);
    assert_eq!(stats.unique_tile_data, 1);
    assert!((stats.deduplication_ratio - 2.0).abs() < 1e-9);
}

#[test]
fn distinct_payloads_get_distinct_blobs() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut store = TileStore::open(&dir.path().join("route.db")).expect("open");

    store
        .store_tile_deduplicated(TileCoord::new(10, 1, 1), b"ocean")
        .expect("store");
    store
        .store_tile_deduplicated(TileCoord::new(10, 2, 1), b"city")
        .expect("store");

    let stats = store.storage_stats().expect("stats");
    assert_eq!(stats.unique_tile_data, 2);
    assert!((stats.deduplication_ratio - 1.0).abs() < 1e-9);
}

#[test]
fn read_tile_round_trips_through_compression() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut store = TileStore::open(&dir.path().join("route.db")).expect("open");

    let coord = TileCoord::new(14, 4_823, 6_160);
    let payload: Vec<u8> = (0..2048).map(|i| (i % 251) as u8).collect();
    store
        .store_tile_deduplicated(coord, &payload)
        .expect("store");

    let restored = store.read_tile(coord).expect("read").expect("present");
    assert_eq!(restored, payload);
}

#[test]
fn read_falls_back_to_compat_table() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut store = TileStore::open(&dir.path().join("route.db")).expect("open");

    let coord = TileCoord::new(9, 150, 190);
    store.store_tile(coord, b"compat payload").expect("store");

    let restored = store.read_tile(coord).expect("read").expect("present");
    assert_eq!(restored, b"compat payload");
}

#[test]
fn missing_tile_is_a_negative_result_not_an_error() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = TileStore::open(&dir.path().join("route.db")).expect("open");
    let absent = store
        .read_tile(TileCoord::new(12, 1, 2))
        .expect("read should not error");
    assert!(absent.is_none());
}

#[test]
fn restoring_a_coordinate_is_idempotent() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut store = TileStore::open(&dir.path().join("route.db")).expect("open");

    let coord = TileCoord::new(10, 5, 5);
    store.store_tile_deduplicated(coord, b"v1").expect("store");
    store.store_tile_deduplicated(coord, b"v1").expect("restore");

    let stats = store.storage_stats().expect("stats");
    assert_eq!(stats.total_tiles, 1);
    assert_eq!(stats.unique_tile_data, 1);
}

#[test]
fn store_is_mbtiles_compatible() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("route.db");
    let mut store = TileStore::open(&path).expect("open");
    store
        .store_tile(TileCoord::new(0, 0, 0), b"world")
        .expect("store");
    drop(store);

    // A generic MBTiles consumer sees the standard tables.
    let conn = rusqlite::Connection::open(&path).expect("open raw");
    let format: String = conn
        .query_row(
            "SELECT value FROM metadata WHERE name = 'format'",
            [],
            |row| row.get(0),
        )
        .expect("format metadata");
    assert_eq!(format, "pbf");
    let data: Vec<u8> = conn
        .query_row(
            "SELECT tile_data FROM tiles WHERE zoom_level = 0 AND tile_column = 0 AND tile_row = 0",
            [],
            |row| row.get(0),
        )
        .expect("tile row");
    assert_eq!(data, b"world");
}

#[test]
fn codec_round_trips_arbitrary_payloads() {
    for payload in [
        Vec::new(),
        vec![0u8; 1],
        vec![0xff; 10_000],
        (0..255u8).collect::<Vec<_>>(),
    ] {
        let compressed = compress_tile(&payload).expect("compress");
        assert_eq!(
            decompress_tile(&compressed.data).expect("decompress"),
            payload
        );
    }
}
