use std::collections::{BTreeMap, HashMap};

use chrono::{Duration, NaiveDateTime};

use super::{
    ActionButton, DeliveredNotification, NotificationCenter, NotificationError,
    NotificationRequest, NotificationTrigger, PermissionStatus,
};

struct Pending {
    request: NotificationRequest,
    next_fire: NaiveDateTime,
}

/// In-process notification center.
///
/// Keeps pending requests with their next fire time and the notifications
/// currently shown. Nothing survives a restart; callers reschedule on startup.
pub struct LocalNotificationCenter {
    permission: PermissionStatus,
    pending: BTreeMap<String, Pending>,
    presented: Vec<DeliveredNotification>,
    categories: HashMap<String, Vec<ActionButton>>,
}

impl LocalNotificationCenter {
    pub fn new() -> Self {
        Self::with_permission(PermissionStatus::Granted)
    }

    pub fn with_permission(permission: PermissionStatus) -> Self {
        Self {
            permission,
            pending: BTreeMap::new(),
            presented: Vec::new(),
            categories: HashMap::new(),
        }
    }

    pub fn set_permission(&mut self, permission: PermissionStatus) {
        self.permission = permission;
    }

    pub fn next_fire(&self, identifier: &str) -> Option<NaiveDateTime> {
        self.pending.get(identifier).map(|p| p.next_fire)
    }

    pub fn pending_request(&self, identifier: &str) -> Option<&NotificationRequest> {
        self.pending.get(identifier).map(|p| &p.request)
    }

    pub fn presented(&self) -> &[DeliveredNotification] {
        &self.presented
    }

    pub fn category(&self, name: &str) -> Option<&[ActionButton]> {
        self.categories.get(name).map(Vec::as_slice)
    }
}

impl Default for LocalNotificationCenter {
    fn default() -> Self {
        Self::new()
    }
}

/// First fire time strictly after `now`.
fn first_fire(trigger: &NotificationTrigger, now: NaiveDateTime) -> NaiveDateTime {
    match trigger {
        NotificationTrigger::Daily { hour, minute } => {
            let today = now
                .date()
                .and_hms_opt(*hour, *minute, 0)
                .unwrap_or(now);
            if today > now {
                today
            } else {
                today + Duration::days(1)
            }
        }
        NotificationTrigger::After { seconds } => i64::try_from(*seconds)
            .ok()
            .and_then(Duration::try_seconds)
            .and_then(|delay| now.checked_add_signed(delay))
            .unwrap_or(NaiveDateTime::MAX),
    }
}

impl NotificationCenter for LocalNotificationCenter {
    fn permission(&self) -> PermissionStatus {
        self.permission
    }

    fn request_permission(&mut self) -> PermissionStatus {
        if self.permission == PermissionStatus::Undetermined {
            self.permission = PermissionStatus::Granted;
        }
        self.permission
    }

    fn set_category(
        &mut self,
        category: &str,
        actions: &[ActionButton],
    ) -> Result<(), NotificationError> {
        self.categories.insert(category.to_string(), actions.to_vec());
        Ok(())
    }

    fn schedule(
        &mut self,
        request: NotificationRequest,
        now: NaiveDateTime,
    ) -> Result<(), NotificationError> {
        if self.permission != PermissionStatus::Granted {
            return Err(NotificationError::PermissionDenied);
        }
        if let NotificationTrigger::Daily { hour, minute } = request.trigger {
            if hour > 23 || minute > 59 {
                return Err(NotificationError::Platform(format!(
                    "invalid daily trigger {hour}:{minute:02}"
                )));
            }
        }
        let next_fire = first_fire(&request.trigger, now);
        self.pending
            .insert(request.identifier.clone(), Pending { request, next_fire });
        Ok(())
    }

    fn scheduled_identifiers(&self) -> Vec<String> {
        self.pending.keys().cloned().collect()
    }

    fn cancel(&mut self, identifier: &str) -> Result<(), NotificationError> {
        self.pending.remove(identifier);
        Ok(())
    }

    fn cancel_all(&mut self) -> Result<(), NotificationError> {
        self.pending.clear();
        Ok(())
    }

    fn dismiss(&mut self, identifier: &str) -> Result<(), NotificationError> {
        self.presented.retain(|n| n.identifier != identifier);
        Ok(())
    }

    /// Daily requests fire once even if several days were missed, then re-arm.
    fn take_due(&mut self, now: NaiveDateTime) -> Vec<DeliveredNotification> {
        let mut fired = Vec::new();
        let mut finished = Vec::new();

        for (identifier, pending) in self.pending.iter_mut() {
            if pending.next_fire > now {
                continue;
            }
            fired.push(DeliveredNotification {
                identifier: identifier.clone(),
                content: pending.request.content.clone(),
                fired_at: pending.next_fire,
            });
            match pending.request.trigger {
                NotificationTrigger::Daily { .. } => {
                    while pending.next_fire <= now {
                        pending.next_fire += Duration::days(1);
                    }
                }
                NotificationTrigger::After { .. } => finished.push(identifier.clone()),
            }
        }

        for identifier in finished {
            self.pending.remove(&identifier);
        }
        for delivered in &fired {
            self.presented.retain(|n| n.identifier != delivered.identifier);
            self.presented.push(delivered.clone());
        }
        fired
    }
}
