mod common;

use ahash::AHashSet;
use news_rec_pipeline::loader;
use news_rec_pipeline::negative_sampler::TestNegatives;
use news_rec_pipeline::pipeline::{artifacts, run_prepare};
use news_rec_pipeline::{PipelineConfig, PipelineError};

use common::{read_lines, write_fixture};

#[test]
fn prepare_writes_every_artifact() {
    let tmp = tempfile::tempdir().unwrap();
    let (behaviors, news) = write_fixture(tmp.path());
    let out = tmp.path().join("out");

    let s = run_prepare(&behaviors, &news, &out, &PipelineConfig::default()).unwrap();

    assert_eq!(s.sessions_loaded, 6);
    assert_eq!(s.sessions_incomplete, 1);
    assert_eq!(s.filter.short_history, 1);
    assert_eq!(s.filter.orphan_sessions, 1);
    assert_eq!(s.filter.kept, 4);
    assert_eq!(s.articles_loaded, 12);
    assert_eq!(s.articles_kept, 11);
    assert_eq!(s.duplicate_ids, 1);
    assert_eq!(s.sessions_remapped, 1);
    assert_eq!(s.users, 3);
    assert_eq!(s.train_pairs, 12);
    assert_eq!(s.test_pairs, 1);

    for name in [
        artifacts::BEHAVIORS,
        artifacts::NEWS,
        artifacts::TRAIN,
        artifacts::TEST,
        artifacts::TRAIN_MATRIX,
        artifacts::TEST_NEGATIVES,
    ] {
        assert!(out.join(name).is_file(), "{name} missing");
    }

    let news_rows = read_lines(&out.join(artifacts::NEWS));
    assert_eq!(news_rows.len(), 12);
    assert!(news_rows.iter().all(|l| !l.starts_with("N2\t")));

    let behavior_rows = read_lines(&out.join(artifacts::BEHAVIORS));
    assert_eq!(behavior_rows[0], "impression_id\tuser_id\ttime\thistory\timpressions");
    assert!(behavior_rows[1].ends_with("\tN1 N3 N4 N5 N6\tN7-1 N1-0"));
}

#[test]
fn cleaned_log_reloads_unchanged() {
    let tmp = tempfile::tempdir().unwrap();
    let (behaviors, news) = write_fixture(tmp.path());
    let out = tmp.path().join("out");
    run_prepare(&behaviors, &news, &out, &PipelineConfig::default()).unwrap();

    let cleaned = loader::load_behaviors(&out.join(artifacts::BEHAVIORS)).unwrap();
    assert_eq!(cleaned.dropped_incomplete, 0);
    let users: Vec<&str> = cleaned.sessions.iter().map(|s| s.user_id.as_str()).collect();
    assert_eq!(users, vec!["U1", "U2", "U1", "U6"]);

    let catalog = loader::load_news(&out.join(artifacts::NEWS)).unwrap();
    let known: AHashSet<&str> = catalog.iter().map(|a| a.article_id.as_str()).collect();
    for s in &cleaned.sessions {
        assert!(s.history.len() >= 5);
        assert!(s.article_ids().all(|id| known.contains(id)));
    }
}

#[test]
fn test_negatives_exclude_training_positives() {
    let tmp = tempfile::tempdir().unwrap();
    let (behaviors, news) = write_fixture(tmp.path());
    let out = tmp.path().join("out");
    let cfg = PipelineConfig {
        exclude_held_out: true,
        ..Default::default()
    };
    run_prepare(&behaviors, &news, &out, &cfg).unwrap();

    let train = loader::load_interactions(&out.join(artifacts::TRAIN)).unwrap();
    let rows = loader::load_test_negatives(&out.join(artifacts::TEST_NEGATIVES)).unwrap();
    assert_eq!(rows.len(), 1);
    let TestNegatives {
        user,
        positive,
        negatives,
    } = &rows[0];
    assert_eq!(negatives.len(), 99);

    let seen: AHashSet<u32> = train
        .iter()
        .filter(|r| r.user_int_id == *user)
        .map(|r| r.article_int_id)
        .collect();
    assert!(!seen.is_empty());
    for j in negatives {
        assert!(!seen.contains(j));
        assert_ne!(j, positive);
    }
}

#[test]
fn same_seed_same_negatives() {
    let tmp = tempfile::tempdir().unwrap();
    let (behaviors, news) = write_fixture(tmp.path());
    let cfg = PipelineConfig::default();
    run_prepare(&behaviors, &news, &tmp.path().join("a"), &cfg).unwrap();
    run_prepare(&behaviors, &news, &tmp.path().join("b"), &cfg).unwrap();

    assert_eq!(
        read_lines(&tmp.path().join("a").join(artifacts::TEST_NEGATIVES)),
        read_lines(&tmp.path().join("b").join(artifacts::TEST_NEGATIVES)),
    );
}

#[test]
fn misnamed_input_is_rejected() {
    let tmp = tempfile::tempdir().unwrap();
    let (behaviors, news) = write_fixture(tmp.path());
    let renamed = tmp.path().join("clicks.tsv");
    std::fs::rename(&behaviors, &renamed).unwrap();

    let err = run_prepare(&renamed, &news, tmp.path(), &PipelineConfig::default()).unwrap_err();
    assert!(matches!(err, PipelineError::Schema { .. }));
}
