use std::fs;
use std::path::PathBuf;

use approx::assert_relative_eq;
use motion_match_core::{codec, BakedLibrary, Config, FeatureDatabase, MatchError};
use motion_match_test_fixtures::{configs, libraries, tables};

fn compact() -> Config {
    Config::from_json_str(&configs::json("compact").expect("config fixture")).expect("valid config")
}

fn library() -> BakedLibrary {
    BakedLibrary::from_json_str(&libraries::json("locomotion").expect("library fixture"))
        .expect("parse library")
}

fn scratch_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("motion-match-{}-{name}", std::process::id()));
    let _ = fs::remove_dir_all(&dir);
    dir
}

/// it should reproduce every field of a preprocessed library after a write/read cycle
#[test]
fn persisted_table_reproduces_features() {
    let cfg = compact();
    let lib = library();
    let db = FeatureDatabase::initialize(&cfg, &lib.clip_infos(), &lib).unwrap();
    let mut text = Vec::new();
    db.write_table(&mut text).unwrap();
    let back = FeatureDatabase::load_table(text.as_slice(), &cfg).unwrap();

    assert_eq!(back.len(), db.len());
    assert_eq!(back.clips().len(), 3);
    for (a, b) in db.clips().iter().zip(back.clips()) {
        assert_eq!(a.name, b.name);
        assert_eq!(a.frame_count, b.frame_count);
    }
    for (a, b) in db.poses().iter().zip(back.poses()) {
        assert_eq!((a.clip, a.frame), (b.clip, b.frame));
        assert_relative_eq!(a.root_position, b.root_position, epsilon = 1e-5);
        assert_relative_eq!(a.left_foot_position, b.left_foot_position, epsilon = 1e-5);
        assert_relative_eq!(a.right_foot_position, b.right_foot_position, epsilon = 1e-5);
        assert_relative_eq!(a.root_velocity, b.root_velocity, epsilon = 1e-5);
        assert_relative_eq!(a.left_foot_velocity, b.left_foot_velocity, epsilon = 1e-5);
        assert_relative_eq!(a.right_foot_velocity, b.right_foot_velocity, epsilon = 1e-5);
        let (qa, qb) = (a.root_orientation.unwrap(), b.root_orientation.unwrap());
        assert_relative_eq!(qa.coords, qb.coords, epsilon = 1e-5);
    }
    for (a, b) in db.windows().iter().zip(back.windows()) {
        assert_eq!(a.id, b.id);
        for (pa, pb) in a.points.iter().zip(&b.points) {
            assert_relative_eq!(pa.position, pb.position, epsilon = 1e-5);
            assert_relative_eq!(pa.forward, pb.forward, epsilon = 1e-5);
        }
    }
}

#[test]
fn locomotion_table_decodes() {
    let cfg = Config {
        trajectory_points_to_use: 3,
        frame_step_size: 2,
        ..Config::default()
    };
    let db = FeatureDatabase::load_table_file(tables::path("locomotion").unwrap(), &cfg).unwrap();
    assert_eq!(db.len(), 14);
    let names: Vec<&str> = db.clips().iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, vec!["idle", "walk"]);
    assert_eq!(db.clips()[1].frame_count, 10);
    assert_eq!(db.clips()[1].frame_rate, None);
    // idle: 4 frames, none reach 4 frames ahead; walk: frames 0..=5.
    assert_eq!(db.valid_windows().count(), 6);
}

#[test]
fn trailing_blank_lines_are_ignored() {
    let text = tables::text("trailing_blank").unwrap();
    let set = codec::decode_str(&text, &Config::default().forward()).unwrap();
    assert_eq!(set.len(), 4);
}

/// it should refuse the whole table when any row is malformed
#[test]
fn malformed_tables_yield_no_database() {
    let cfg = Config::default();
    match FeatureDatabase::load_table_file(tables::path("short_row").unwrap(), &cfg) {
        Err(MatchError::MalformedRecord { line, reason }) => {
            assert_eq!(line, 3);
            assert!(reason.contains("expected 24 fields, found 20"), "{reason}");
        }
        other => panic!("expected malformed record, got {other:?}"),
    }
    match FeatureDatabase::load_table_file(tables::path("bad_number").unwrap(), &cfg) {
        Err(err @ MatchError::MalformedRecord { line: 3, .. }) => {
            assert!(err.to_string().contains("FootLeftT.x"), "{err}");
            assert!(!err.is_recoverable());
            assert_eq!(err.category(), "record");
        }
        other => panic!("expected malformed record, got {other:?}"),
    }
}

#[test]
fn missing_table_file_is_an_io_error() {
    let dir = scratch_dir("missing");
    let err = FeatureDatabase::load_table_file(dir.join("nope.csv"), &Config::default()).unwrap_err();
    assert!(matches!(err, MatchError::Io { .. }), "{err:?}");
}

/// it should build and persist on a cache miss, and read the persisted table afterwards
#[test]
fn load_or_build_honours_the_cache() {
    let cfg = compact();
    let lib = library();
    let clips = lib.clip_infos();
    let dir = scratch_dir("cache");
    let table = dir.join("features").join("locomotion.csv");

    let built = FeatureDatabase::load_or_build(&cfg, &clips, &lib, &table, false).unwrap();
    assert!(table.exists());
    assert_eq!(built.len(), 108);

    let loaded = FeatureDatabase::load_or_build(&cfg, &clips, &lib, &table, false).unwrap();
    assert_eq!(loaded.len(), built.len());
    assert_eq!(loaded.clips()[1].frame_rate, Some(30.0));

    // A present table wins over the library unless a rebuild is forced.
    fs::copy(tables::path("locomotion").unwrap(), &table).unwrap();
    let cached = FeatureDatabase::load_or_build(&cfg, &clips, &lib, &table, false).unwrap();
    assert_eq!(cached.len(), 14);
    assert_eq!(cached.clips()[0].frame_rate, Some(30.0));
    assert_eq!(cached.clips()[1].frame_rate, None);

    let rebuilt = FeatureDatabase::load_or_build(&cfg, &clips, &lib, &table, true).unwrap();
    assert_eq!(rebuilt.len(), 108);
    assert_eq!(fs::read_to_string(&table).unwrap().lines().count(), 109);

    fs::remove_dir_all(&dir).unwrap();
}
