//! Watchlist ETA change detection.
//!
//! Each active watch is compared against the newest ETA the datastore holds
//! for its vessel. A change is persisted as a [`ChangeNotification`], mailed
//! to the watch owner, and the watch is advanced to the new ETA whether or
//! not the mail went out. Watches are processed one after the other; a
//! cycle must not run concurrently with itself.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::{
    email::{EtaChangeEmail, Mailer},
    errors::Result,
    models::{ChangeNotification, NotificationId, ObservedEta, Watch},
    timestamps::delay_days,
};

/// Persistent watch state and notification log
#[async_trait]
pub trait WatchStore: Send + Sync {
    /// Watches with notifications enabled
    async fn active_watches(&self) -> Result<Vec<Watch>>;

    /// Newest observed ETA for a normalized vessel name, `None` when the
    /// vessel has no schedule row at all.
    async fn latest_eta(&self, vessel_name_normalized: &str) -> Result<Option<ObservedEta>>;

    async fn insert_notification(&self, notification: &ChangeNotification) -> Result<NotificationId>;

    async fn mark_notification_sent(&self, id: NotificationId, sent_at: DateTime<Utc>) -> Result<()>;

    /// Advance a watch to `eta`
    async fn record_eta(&self, watch_id: Uuid, eta: Option<&str>, notified_at: DateTime<Utc>) -> Result<()>;
}

/// Resolves a watch owner's contact address
#[async_trait]
pub trait IdentityLookup: Send + Sync {
    async fn email_for_user(&self, user_id: Uuid) -> Result<Option<String>>;
}

/// What happened to one watch in a cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchOutcome {
    /// No schedule row for the vessel yet
    NoSchedule,
    Unchanged,
    /// State advanced; `delivered` tells whether the owner was mailed
    Changed { delivered: bool },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct WatchlistSummary {
    pub checked: usize,
    /// Watches whose ETA change was recorded
    pub changed: usize,
    /// Changes whose email was delivered
    pub notified: usize,
    pub errors: usize,
}

pub struct ChangeDetector<'a> {
    store: &'a dyn WatchStore,
    identity: &'a dyn IdentityLookup,
    mailer: &'a dyn Mailer,
}

impl<'a> ChangeDetector<'a> {
    pub fn new(store: &'a dyn WatchStore, identity: &'a dyn IdentityLookup, mailer: &'a dyn Mailer) -> Self {
        Self {
            store,
            identity,
            mailer,
        }
    }

    /// Run one detection cycle over every active watch.
    ///
    /// Only a failure to list the watches is returned as an error; per-watch
    /// failures are logged and counted.
    pub async fn run(&self) -> Result<WatchlistSummary> {
        info!("[watchlist] Checking for ETA changes on watched vessels...");
        let watches = self.store.active_watches().await?;
        if watches.is_empty() {
            info!("[watchlist] No active watches found");
            return Ok(WatchlistSummary::default());
        }
        info!("[watchlist] Found {} active watch(es)", watches.len());

        let mut summary = WatchlistSummary::default();
        for watch in watches.iter().filter(|w| w.notification_enabled) {
            summary.checked += 1;
            match self.check_watch(watch).await {
                Ok(WatchOutcome::Changed { delivered }) => {
                    summary.changed += 1;
                    if delivered {
                        summary.notified += 1;
                    }
                }
                Ok(WatchOutcome::NoSchedule) | Ok(WatchOutcome::Unchanged) => {}
                Err(e) => {
                    error!("[watchlist] Error checking {}: {}", watch.vessel_name, e);
                    summary.errors += 1;
                }
            }
        }

        info!(
            "[watchlist] Done - checked {}, changed {}, notified {}, errors {}",
            summary.checked, summary.changed, summary.notified, summary.errors
        );
        Ok(summary)
    }

    /// Compare one watch against the newest observation and act on a change.
    pub async fn check_watch(&self, watch: &Watch) -> Result<WatchOutcome> {
        let Some(observed) = self.store.latest_eta(&watch.vessel_name_normalized).await? else {
            debug!("[watchlist] No schedule data for {}", watch.vessel_name);
            return Ok(WatchOutcome::NoSchedule);
        };

        if observed.eta == watch.last_known_eta {
            return Ok(WatchOutcome::Unchanged);
        }

        let old_eta = watch.last_known_eta.clone();
        let new_eta = observed.eta;
        let delay = delay_days(old_eta.as_deref(), new_eta.as_deref());
        info!(
            "[watchlist] ETA changed for {}: {} -> {} ({:+} days)",
            watch.vessel_name,
            old_eta.as_deref().unwrap_or("none"),
            new_eta.as_deref().unwrap_or("none"),
            delay
        );

        let notification = ChangeNotification {
            watch_id: watch.id,
            vessel_name: watch.vessel_name.clone(),
            shipment_reference: watch.shipment_reference.clone(),
            old_eta,
            new_eta,
            delay_days: delay,
            notification_sent: false,
            sent_at: None,
        };
        let notification_id = self.store.insert_notification(&notification).await?;

        let delivered = self.deliver(watch, notification_id, &notification).await;

        self.store
            .record_eta(watch.id, notification.new_eta.as_deref(), Utc::now())
            .await?;

        Ok(WatchOutcome::Changed { delivered })
    }

    /// Mail the owner; every failure here is logged and swallowed.
    async fn deliver(&self, watch: &Watch, id: NotificationId, notification: &ChangeNotification) -> bool {
        let recipient = match self.identity.email_for_user(watch.user_id).await {
            Ok(Some(address)) => address,
            Ok(None) => {
                warn!("[watchlist] No email address for owner of {}", watch.vessel_name);
                return false;
            }
            Err(e) => {
                warn!("[watchlist] Owner lookup failed for {}: {}", watch.vessel_name, e);
                return false;
            }
        };

        let email = EtaChangeEmail {
            vessel_name: notification.vessel_name.clone(),
            shipment_reference: notification.shipment_reference.clone(),
            old_eta: notification.old_eta.clone(),
            new_eta: notification.new_eta.clone(),
            delay_days: notification.delay_days,
        };
        if let Err(e) = self.mailer.send_eta_change(&recipient, &email).await {
            warn!("[watchlist] Email failed for {}: {}", recipient, e);
            return false;
        }

        if let Err(e) = self.store.mark_notification_sent(id, Utc::now()).await {
            warn!("[watchlist] Could not mark notification {} as sent: {}", id, e);
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use std::collections::{HashMap, HashSet};
    use std::sync::Mutex;

    use super::*;
    use crate::errors::EtaTrackerError;

    #[derive(Default)]
    struct MemoryStore {
        watches: Mutex<Vec<Watch>>,
        latest: HashMap<String, Option<String>>,
        failing_lookups: HashSet<String>,
        notifications: Mutex<Vec<(NotificationId, ChangeNotification)>>,
    }

    impl MemoryStore {
        fn with_watch(mut self, watch: Watch) -> Self {
            self.watches.get_mut().unwrap().push(watch);
            self
        }

        fn with_eta(mut self, name: &str, eta: Option<&str>) -> Self {
            self.latest.insert(name.to_string(), eta.map(str::to_string));
            self
        }

        fn watch(&self, id: Uuid) -> Watch {
            self.watches.lock().unwrap().iter().find(|w| w.id == id).unwrap().clone()
        }

        fn notifications(&self) -> Vec<ChangeNotification> {
            self.notifications.lock().unwrap().iter().map(|(_, n)| n.clone()).collect()
        }
    }

    #[async_trait]
    impl WatchStore for MemoryStore {
        async fn active_watches(&self) -> Result<Vec<Watch>> {
            Ok(self.watches.lock().unwrap().clone())
        }

        async fn latest_eta(&self, name: &str) -> Result<Option<ObservedEta>> {
            if self.failing_lookups.contains(name) {
                return Err(EtaTrackerError::InvalidTimestamp("lookup failed".to_string()));
            }
            Ok(self.latest.get(name).map(|eta| ObservedEta { eta: eta.clone() }))
        }

        async fn insert_notification(&self, notification: &ChangeNotification) -> Result<NotificationId> {
            let id = Uuid::new_v4();
            self.notifications.lock().unwrap().push((id, notification.clone()));
            Ok(id)
        }

        async fn mark_notification_sent(&self, id: NotificationId, sent_at: DateTime<Utc>) -> Result<()> {
            let mut notifications = self.notifications.lock().unwrap();
            let (_, notification) = notifications.iter_mut().find(|(nid, _)| *nid == id).unwrap();
            notification.notification_sent = true;
            notification.sent_at = Some(sent_at);
            Ok(())
        }

        async fn record_eta(&self, watch_id: Uuid, eta: Option<&str>, _notified_at: DateTime<Utc>) -> Result<()> {
            let mut watches = self.watches.lock().unwrap();
            let watch = watches.iter_mut().find(|w| w.id == watch_id).unwrap();
            watch.last_known_eta = eta.map(str::to_string);
            Ok(())
        }
    }

    struct Directory(Option<String>);

    #[async_trait]
    impl IdentityLookup for Directory {
        async fn email_for_user(&self, _user_id: Uuid) -> Result<Option<String>> {
            Ok(self.0.clone())
        }
    }

    #[derive(Default)]
    struct RecordingMailer {
        fail: bool,
        sent: Mutex<Vec<(String, EtaChangeEmail)>>,
    }

    #[async_trait]
    impl Mailer for RecordingMailer {
        async fn send_eta_change(&self, to: &str, email: &EtaChangeEmail) -> Result<()> {
            if self.fail {
                return Err(EtaTrackerError::Mail("connection refused".to_string()));
            }
            self.sent.lock().unwrap().push((to.to_string(), email.clone()));
            Ok(())
        }
    }

    fn watch(name: &str, last_known_eta: Option<&str>) -> Watch {
        Watch {
            id: Uuid::new_v4(),
            vessel_name: name.to_string(),
            vessel_name_normalized: name.to_string(),
            last_known_eta: last_known_eta.map(str::to_string),
            notification_enabled: true,
            shipment_reference: Some("SHP-1".to_string()),
            user_id: Uuid::new_v4(),
        }
    }

    fn owner() -> Directory {
        Directory(Some("owner@example.com".to_string()))
    }

    #[tokio::test]
    async fn first_observation_notifies() {
        let w = watch("EVER GIVEN", None);
        let store = MemoryStore::default()
            .with_watch(w.clone())
            .with_eta("EVER GIVEN", Some("2026-02-13T05:30:00+01:00"));
        let mailer = RecordingMailer::default();

        let summary = ChangeDetector::new(&store, &owner(), &mailer).run().await.unwrap();

        assert_eq!(
            summary,
            WatchlistSummary {
                checked: 1,
                changed: 1,
                notified: 1,
                errors: 0
            }
        );
        let notifications = store.notifications();
        assert_eq!(notifications.len(), 1);
        assert_eq!(notifications[0].old_eta, None);
        assert_eq!(notifications[0].delay_days, 0);
        assert!(notifications[0].notification_sent);
        assert!(notifications[0].sent_at.is_some());
        assert_eq!(
            store.watch(w.id).last_known_eta.as_deref(),
            Some("2026-02-13T05:30:00+01:00")
        );
        assert_eq!(mailer.sent.lock().unwrap()[0].0, "owner@example.com");
    }

    #[tokio::test]
    async fn unchanged_eta_is_a_no_op() {
        let eta = "2026-02-13T05:30:00+01:00";
        let w = watch("EVER GIVEN", Some(eta));
        let store = MemoryStore::default()
            .with_watch(w.clone())
            .with_eta("EVER GIVEN", Some(eta));
        let mailer = RecordingMailer::default();

        let summary = ChangeDetector::new(&store, &owner(), &mailer).run().await.unwrap();

        assert_eq!(summary.checked, 1);
        assert_eq!(summary.changed, 0);
        assert!(store.notifications().is_empty());
        assert_eq!(store.watch(w.id), w);
    }

    #[tokio::test]
    async fn delay_is_computed_in_days() {
        let w = watch("MSC OSCAR", Some("2026-02-10T00:00:00+01:00"));
        let store = MemoryStore::default()
            .with_watch(w)
            .with_eta("MSC OSCAR", Some("2026-02-13T00:00:00+01:00"));
        let mailer = RecordingMailer::default();

        ChangeDetector::new(&store, &owner(), &mailer).run().await.unwrap();

        assert_eq!(store.notifications()[0].delay_days, 3);
        let sent = mailer.sent.lock().unwrap();
        assert_eq!(sent[0].1.delay_days, 3);
        assert_eq!(sent[0].1.shipment_reference.as_deref(), Some("SHP-1"));
    }

    #[tokio::test]
    async fn failing_watch_does_not_stop_the_cycle() {
        let broken = watch("BROKEN", None);
        let fine = watch("EVER GIVEN", None);
        let mut store = MemoryStore::default()
            .with_watch(broken)
            .with_watch(fine.clone())
            .with_eta("EVER GIVEN", Some("2026-02-13T05:30:00+01:00"));
        store.failing_lookups.insert("BROKEN".to_string());
        let mailer = RecordingMailer::default();

        let summary = ChangeDetector::new(&store, &owner(), &mailer).run().await.unwrap();

        assert_eq!(summary.checked, 2);
        assert_eq!(summary.errors, 1);
        assert_eq!(summary.notified, 1);
        assert!(store.watch(fine.id).last_known_eta.is_some());
    }

    #[tokio::test]
    async fn failed_email_still_advances_the_watch() {
        let w = watch("EVER GIVEN", Some("2026-02-10T00:00:00+01:00"));
        let store = MemoryStore::default()
            .with_watch(w.clone())
            .with_eta("EVER GIVEN", Some("2026-02-13T00:00:00+01:00"));
        let mailer = RecordingMailer {
            fail: true,
            ..Default::default()
        };
        let owner = owner();
        let detector = ChangeDetector::new(&store, &owner, &mailer);

        let summary = detector.run().await.unwrap();
        assert_eq!(summary.changed, 1);
        assert_eq!(summary.notified, 0);
        assert_eq!(summary.errors, 0);
        assert!(!store.notifications()[0].notification_sent);
        assert_eq!(
            store.watch(w.id).last_known_eta.as_deref(),
            Some("2026-02-13T00:00:00+01:00")
        );

        // The next cycle does not alert again
        let again = detector.run().await.unwrap();
        assert_eq!(again.changed, 0);
        assert_eq!(store.notifications().len(), 1);
    }

    #[tokio::test]
    async fn missing_owner_address_still_advances_the_watch() {
        let w = watch("EVER GIVEN", None);
        let store = MemoryStore::default()
            .with_watch(w.clone())
            .with_eta("EVER GIVEN", Some("2026-02-13T05:30:00+01:00"));
        let mailer = RecordingMailer::default();

        let summary = ChangeDetector::new(&store, &Directory(None), &mailer).run().await.unwrap();

        assert_eq!(summary.changed, 1);
        assert_eq!(summary.notified, 0);
        assert!(mailer.sent.lock().unwrap().is_empty());
        assert!(store.watch(w.id).last_known_eta.is_some());
    }

    #[tokio::test]
    async fn no_schedule_row_means_no_action() {
        let w = watch("GHOST SHIP", Some("2026-02-10T00:00:00+01:00"));
        let store = MemoryStore::default().with_watch(w.clone());
        let mailer = RecordingMailer::default();

        let outcome = ChangeDetector::new(&store, &owner(), &mailer)
            .check_watch(&w)
            .await
            .unwrap();

        assert_eq!(outcome, WatchOutcome::NoSchedule);
        assert_eq!(store.watch(w.id), w);
    }

    #[tokio::test]
    async fn eta_disappearing_is_a_change() {
        let w = watch("EVER GIVEN", Some("2026-02-10T00:00:00+01:00"));
        let store = MemoryStore::default()
            .with_watch(w.clone())
            .with_eta("EVER GIVEN", None);
        let mailer = RecordingMailer::default();

        let outcome = ChangeDetector::new(&store, &owner(), &mailer)
            .check_watch(&w)
            .await
            .unwrap();

        assert_eq!(outcome, WatchOutcome::Changed { delivered: true });
        assert_eq!(store.notifications()[0].new_eta, None);
        assert_eq!(store.watch(w.id).last_known_eta, None);
    }

    #[tokio::test]
    async fn disabled_watches_are_skipped() {
        let mut w = watch("EVER GIVEN", None);
        w.notification_enabled = false;
        let store = MemoryStore::default()
            .with_watch(w)
            .with_eta("EVER GIVEN", Some("2026-02-13T05:30:00+01:00"));
        let mailer = RecordingMailer::default();

        let summary = ChangeDetector::new(&store, &owner(), &mailer).run().await.unwrap();
        assert_eq!(summary.checked, 0);
        assert!(store.notifications().is_empty());
    }
}
