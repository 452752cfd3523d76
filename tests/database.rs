use std::sync::Mutex;

use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use eta_tracker::{
    database::Database,
    detector::{ChangeDetector, IdentityLookup, WatchStore},
    email::{EtaChangeEmail, Mailer},
    errors::Result,
    models::VesselEvent,
    terminals::Terminal,
};

#[derive(Default)]
struct Outbox(Mutex<Vec<(String, EtaChangeEmail)>>);

#[async_trait]
impl Mailer for Outbox {
    async fn send_eta_change(&self, to: &str, email: &EtaChangeEmail) -> Result<()> {
        self.0.lock().unwrap().push((to.to_string(), email.clone()));
        Ok(())
    }
}

fn event(name: &str, eta: &str) -> VesselEvent {
    VesselEvent::new(name, "EUROGATE Hamburg").unwrap().with_eta(eta)
}

async fn add_watch(pool: &PgPool, vessel: &str, email: Option<&str>) -> (Uuid, Uuid) {
    let user_id = Uuid::new_v4();
    sqlx::query("INSERT INTO auth.users (id, email) VALUES ($1, $2)")
        .bind(user_id)
        .bind(email)
        .execute(pool)
        .await
        .expect("Failed to insert user");

    let watch_id: Uuid = sqlx::query_scalar(
        r#"
        INSERT INTO vessel_watches (user_id, vessel_name, vessel_name_normalized, shipment_reference)
        VALUES ($1, $2, upper($2), 'HAM-4711')
        RETURNING id
        "#,
    )
    .bind(user_id)
    .bind(vessel)
    .fetch_one(pool)
    .await
    .expect("Failed to insert watch");

    (user_id, watch_id)
}

#[sqlx::test]
#[ignore = "needs DATABASE_URL"]
async fn test_upsert_vessel_by_normalized_name(pool: PgPool) {
    let db = Database::new(pool.clone()).await.unwrap();

    let first = db.upsert_vessel("Ever  Given").await.unwrap();
    let second = db.upsert_vessel("EVER GIVEN").await.unwrap();
    assert_eq!(first, second);

    let name: String = sqlx::query_scalar("SELECT name FROM vessels WHERE id = $1")
        .bind(first)
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(name, "EVER GIVEN");
}

#[sqlx::test]
#[ignore = "needs DATABASE_URL"]
async fn test_sync_events_is_idempotent(pool: PgPool) {
    let db = Database::new(pool.clone()).await.unwrap();
    let events = vec![
        event("EVER GIVEN", "13.02.2026 05:30"),
        event("CMA CGM MARCO POLO", ""),
    ];

    assert_eq!(db.sync_events(&events, Terminal::Eurogate).await, 1);
    assert_eq!(db.sync_events(&events, Terminal::Eurogate).await, 1);

    let rows: i64 = sqlx::query_scalar("SELECT count(*) FROM schedule_events")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(rows, 1);

    let observed = db.latest_eta("EVER GIVEN").await.unwrap().unwrap();
    assert_eq!(observed.eta.as_deref(), Some("2026-02-13T05:30:00+01:00"));
    assert!(db.latest_eta("CMA CGM MARCO POLO").await.unwrap().is_none());
}

#[sqlx::test]
#[ignore = "needs DATABASE_URL"]
async fn test_sync_all_counts_per_terminal(pool: PgPool) {
    let db = Database::new(pool).await.unwrap();
    let summary = db
        .sync_all(
            &[event("EVER GIVEN", "13.02.2026 05:30")],
            &[
                event("HMM ALGECIRAS", "14.02.2026 11:00"),
                event("MSC OSCAR", "15.02.2026"),
            ],
        )
        .await;

    assert!(summary.ok);
    assert_eq!(summary.eurogate_synced, 1);
    assert_eq!(summary.hhla_synced, 2);
    assert_eq!(summary.total_synced, 3);
}

#[sqlx::test]
#[ignore = "needs DATABASE_URL"]
async fn test_detects_and_records_eta_change(pool: PgPool) {
    let db = Database::new(pool.clone()).await.unwrap();
    let (user_id, watch_id) = add_watch(&pool, "EVER GIVEN", Some("planner@example.com")).await;
    assert_eq!(
        db.email_for_user(user_id).await.unwrap().as_deref(),
        Some("planner@example.com")
    );

    db.sync_events(&[event("EVER GIVEN", "13.02.2026 05:30")], Terminal::Eurogate)
        .await;
    let outbox = Outbox::default();
    let summary = ChangeDetector::new(&db, &db, &outbox).run().await.unwrap();
    assert_eq!(summary.changed, 1);
    assert_eq!(summary.notified, 1);

    let watches = db.active_watches().await.unwrap();
    assert_eq!(watches[0].id, watch_id);
    assert_eq!(
        watches[0].last_known_eta.as_deref(),
        Some("2026-02-13T05:30:00+01:00")
    );

    // Unchanged schedule, no new notification
    let summary = ChangeDetector::new(&db, &db, &outbox).run().await.unwrap();
    assert_eq!(summary.changed, 0);

    db.sync_events(&[event("EVER GIVEN", "16.02.2026 07:00")], Terminal::Eurogate)
        .await;
    ChangeDetector::new(&db, &db, &outbox).run().await.unwrap();

    let (delay, sent): (i32, bool) = sqlx::query_as(
        "SELECT delay_days, notification_sent FROM eta_change_notifications ORDER BY created_at DESC LIMIT 1",
    )
    .fetch_one(&pool)
    .await
    .unwrap();
    assert_eq!(delay, 3);
    assert!(sent);

    let sent = outbox.0.lock().unwrap();
    assert_eq!(sent.len(), 2);
    assert_eq!(sent[1].0, "planner@example.com");
    assert_eq!(sent[1].1.shipment_reference.as_deref(), Some("HAM-4711"));
}

#[sqlx::test]
#[ignore = "needs DATABASE_URL"]
async fn test_missing_address_still_advances_watch(pool: PgPool) {
    let db = Database::new(pool.clone()).await.unwrap();
    add_watch(&pool, "MSC OSCAR", None).await;
    db.sync_events(&[event("MSC OSCAR", "14.02.2026 08:00")], Terminal::Hhla)
        .await;

    let outbox = Outbox::default();
    let summary = ChangeDetector::new(&db, &db, &outbox).run().await.unwrap();
    assert_eq!(summary.changed, 1);
    assert_eq!(summary.notified, 0);
    assert!(outbox.0.lock().unwrap().is_empty());

    let sent: bool = sqlx::query_scalar("SELECT notification_sent FROM eta_change_notifications")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert!(!sent);
    assert!(db.active_watches().await.unwrap()[0].last_known_eta.is_some());
}
