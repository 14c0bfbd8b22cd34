//! Background reminder dispatcher.
//!
//! Spawns a thread that periodically asks the notification center for due
//! reminders and hands each one to a sink (the shell emits it to the
//! frontend). Shuts down on `shutdown()` or when the handle is dropped.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use super::DeliveredNotification;

/// Default poll interval.
pub const POLL_INTERVAL: Duration = Duration::from_secs(20);

/// Sleep granularity for shutdown responsiveness.
const SLEEP_GRANULARITY: Duration = Duration::from_millis(250);

pub struct DispatcherHandle {
    shutdown: Arc<AtomicBool>,
    handle: Option<std::thread::JoinHandle<()>>,
}

impl DispatcherHandle {
    /// Request shutdown. A poll already in progress completes.
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::Relaxed);
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }
}

impl Drop for DispatcherHandle {
    fn drop(&mut self) {
        self.shutdown();
        if let Some(h) = self.handle.take() {
            let _ = h.join();
        }
    }
}

/// Start polling `poll` every `interval`, forwarding results to `sink`.
pub fn start_dispatcher<P, S>(interval: Duration, poll: P, sink: S) -> DispatcherHandle
where
    P: Fn() -> Vec<DeliveredNotification> + Send + 'static,
    S: Fn(DeliveredNotification) + Send + 'static,
{
    let shutdown = Arc::new(AtomicBool::new(false));
    let flag = shutdown.clone();

    let handle = std::thread::spawn(move || {
        tracing::info!(interval_ms = interval.as_millis() as u64, "Reminder dispatcher started");
        dispatch_loop(interval, &flag, &poll, &sink);
        tracing::info!("Reminder dispatcher shutting down");
    });

    DispatcherHandle {
        shutdown,
        handle: Some(handle),
    }
}

fn dispatch_loop<P, S>(interval: Duration, shutdown: &AtomicBool, poll: &P, sink: &S)
where
    P: Fn() -> Vec<DeliveredNotification>,
    S: Fn(DeliveredNotification),
{
    while !shutdown.load(Ordering::Relaxed) {
        let delivered = poll();
        if !delivered.is_empty() {
            tracing::debug!(count = delivered.len(), "Delivering reminders");
        }
        for notification in delivered {
            sink(notification);
        }

        let mut slept = Duration::ZERO;
        while slept < interval {
            if shutdown.load(Ordering::Relaxed) {
                return;
            }
            let step = SLEEP_GRANULARITY.min(interval - slept);
            std::thread::sleep(step);
            slept += step;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notifications::{NotificationContent, NotificationData};
    use chrono::NaiveDate;
    use std::sync::atomic::AtomicUsize;
    use std::sync::mpsc;

    fn delivered(identifier: &str) -> DeliveredNotification {
        DeliveredNotification {
            identifier: identifier.into(),
            content: NotificationContent {
                title: "Medication Reminder".into(),
                body: "Time to take your X.".into(),
                sound: true,
                auto_dismiss: false,
                category_identifier: "medication-reminder".into(),
                data: NotificationData {
                    id: "rx".into(),
                    notification_id: identifier.into(),
                    intended_taken_time: None,
                    snoozed_since: None,
                },
            },
            fired_at: NaiveDate::from_ymd_opt(2024, 1, 1)
                .unwrap()
                .and_hms_opt(8, 0, 0)
                .unwrap(),
        }
    }

    #[test]
    fn forwards_polled_notifications_to_sink() {
        let (tx, rx) = mpsc::channel();
        let polls = Arc::new(AtomicUsize::new(0));
        let counter = polls.clone();

        let handle = start_dispatcher(
            Duration::from_millis(10),
            move || {
                if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                    vec![delivered("rx_8_0")]
                } else {
                    Vec::new()
                }
            },
            move |n| {
                let _ = tx.send(n.identifier);
            },
        );

        let got = rx.recv_timeout(Duration::from_secs(2)).unwrap();
        assert_eq!(got, "rx_8_0");
        drop(handle);
        assert!(polls.load(Ordering::SeqCst) >= 1);
    }

    #[test]
    fn shutdown_stops_the_thread() {
        let handle = start_dispatcher(Duration::from_secs(60), Vec::new, |_| {});
        handle.shutdown();
        // Drop joins; a 60s interval would hang here if shutdown were ignored.
        drop(handle);
    }

    #[test]
    fn shutdown_flag_sets_atomic() {
        let handle = DispatcherHandle {
            shutdown: Arc::new(AtomicBool::new(false)),
            handle: None,
        };
        assert!(!handle.is_running());
        handle.shutdown();
        assert!(handle.shutdown.load(Ordering::Relaxed));
    }
}
