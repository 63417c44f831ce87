//! Transform log positions, bounds and notifications.

mod common;

use common::init_tracing;
use strand_runtime::{Error, LogEvent, LogSettings, TransformLog};

fn seeded(ids: &[&str]) -> TransformLog {
    TransformLog::new(LogSettings::new().with_data(ids.iter().copied())).unwrap()
}

// ============================================================================
// Positions
// ============================================================================

#[tokio::test]
async fn before_and_after_partition_the_log() {
    init_tracing();
    let ids = ["a", "b", "c", "d"];
    let log = seeded(&ids);

    for (index, id) in ids.iter().enumerate() {
        let before = log.before(id, 0).await.unwrap();
        let after = log.after(id, 0).await.unwrap();
        assert_eq!(before, ids[..index]);
        assert_eq!(after, ids[index + 1..]);
        assert_eq!(before.len() + 1 + after.len(), ids.len());
    }
}

#[tokio::test]
async fn relative_positions_shift_the_anchor() {
    init_tracing();
    let log = seeded(&["a", "b", "c", "d"]);

    assert_eq!(log.before("c", -1).await.unwrap(), vec!["a"]);
    assert_eq!(log.after("b", 1).await.unwrap(), vec!["d"]);
    assert_eq!(log.after("a", -1).await.unwrap(), vec!["a", "b", "c", "d"]);
    assert_eq!(log.truncate("d", 1).await.unwrap(), vec!["a", "b", "c", "d"]);
    assert!(log.is_empty().await.unwrap());
}

#[tokio::test]
async fn out_of_bounds_positions_fail() {
    init_tracing();
    let log = seeded(&["a", "b", "c"]);

    assert_eq!(log.before("a", -1).await.unwrap_err(), Error::OutOfRange(-1));
    assert_eq!(log.after("c", 1).await.unwrap_err(), Error::OutOfRange(3));
    assert_eq!(log.truncate("c", 2).await.unwrap_err(), Error::OutOfRange(4));
    assert_eq!(log.rollback("a", -2).await.unwrap_err(), Error::OutOfRange(-2));
    assert_eq!(log.before("z", 0).await.unwrap_err(), Error::NotLogged("z".into()));

    // Failed calls leave the log alone
    assert_eq!(log.entries().await.unwrap(), vec!["a", "b", "c"]);
}

#[tokio::test]
async fn rollback_to_before_first_empties() {
    init_tracing();
    let log = seeded(&["a", "b"]);
    assert_eq!(log.rollback("a", -1).await.unwrap(), vec!["a", "b"]);
    assert_eq!(log.head().await.unwrap(), None);
}

#[tokio::test]
async fn duplicate_ids_are_rejected() {
    init_tracing();
    let log = seeded(&["a"]);
    assert_eq!(
        log.append(["b", "a"]).await.unwrap_err(),
        Error::AlreadyLogged("a".into())
    );
    assert_eq!(
        log.append(["c", "c"]).await.unwrap_err(),
        Error::AlreadyLogged("c".into())
    );
    assert_eq!(log.entries().await.unwrap(), vec!["a"]);
}

// ============================================================================
// Events
// ============================================================================

#[tokio::test]
async fn every_mutation_announces_change_first() {
    init_tracing();
    let log = seeded(&[]);
    let mut events = log.subscribe();

    log.append(["a", "b", "c"]).await.unwrap();
    log.truncate("b", 0).await.unwrap();
    log.rollback("b", 0).await.unwrap();
    log.clear().await.unwrap();

    let mut seen = Vec::new();
    while let Ok(event) = events.try_recv() {
        seen.push(event);
    }
    assert_eq!(
        seen,
        vec![
            LogEvent::Change,
            LogEvent::Append(vec!["a".into(), "b".into(), "c".into()]),
            LogEvent::Change,
            LogEvent::Truncate {
                id: "b".into(),
                relative_position: 0,
                removed: vec!["a".into()],
            },
            LogEvent::Change,
            LogEvent::Rollback {
                id: "b".into(),
                relative_position: 0,
                removed: vec!["c".into()],
            },
            LogEvent::Change,
            LogEvent::Clear(vec!["b".into()]),
        ]
    );
}

#[tokio::test]
async fn failed_mutation_is_silent() {
    init_tracing();
    let log = seeded(&["a"]);
    let mut events = log.subscribe();

    assert!(log.truncate("missing", 0).await.is_err());
    assert!(log.append(["a"]).await.is_err());
    assert!(events.try_recv().is_err());
}
