//! User preferences in the `Settings` namespace.

use crate::models::{
    FrequencyPattern, MealSlot, ModelError, ReminderTime, SettingsState, MIN_SNOOZE_MINUTES,
};
use crate::storage::SharedUserData;

pub const NAMESPACE: &str = "Settings";

pub struct SettingsStore {
    data: SharedUserData,
    current: SettingsState,
    ready: bool,
}

impl SettingsStore {
    pub fn new(data: SharedUserData) -> Self {
        Self {
            data,
            current: SettingsState::default(),
            ready: false,
        }
    }

    /// Load once; stored keys are merged over the defaults.
    pub fn initialize(&mut self) {
        if self.ready {
            return;
        }
        match self.data.lock() {
            Ok(mut data) => {
                self.current = data.try_get(NAMESPACE, SettingsState::default());
            }
            Err(_) => tracing::error!("User data lock poisoned, using default settings"),
        }
        self.ready = true;
        tracing::debug!(settings = ?self.current, "Settings loaded");
    }

    pub fn is_ready(&self) -> bool {
        self.ready
    }

    pub fn current(&self) -> &SettingsState {
        &self.current
    }

    pub fn snapshot(&self) -> SettingsState {
        self.current.clone()
    }

    /// Returns the interval actually stored (never below the floor).
    pub fn set_snooze_minutes(&mut self, minutes: u32) -> u32 {
        let applied = minutes.max(MIN_SNOOZE_MINUTES);
        if applied != minutes {
            tracing::debug!(requested = minutes, applied, "Snooze interval raised to floor");
        }
        self.current.snooze_time = applied;
        self.persist();
        applied
    }

    pub fn set_notifications_enabled(&mut self, enabled: bool) {
        self.current.notifications_enabled = enabled;
        self.persist();
    }

    pub fn set_meal_time(&mut self, slot: MealSlot, time: ReminderTime) -> Result<(), ModelError> {
        self.current.set_meal_time(slot, time)?;
        tracing::debug!(slot = slot.as_str(), "Meal time changed");
        self.persist();
        Ok(())
    }

    pub fn reminder_times_for(&self, frequency: &str) -> Vec<ReminderTime> {
        self.current
            .reminder_times_for(&FrequencyPattern::parse_or_lenient(frequency))
    }

    fn persist(&self) {
        let mut data = match self.data.lock() {
            Ok(data) => data,
            Err(_) => {
                tracing::error!("User data lock poisoned, settings not saved");
                return;
            }
        };
        if let Err(e) = data.set(NAMESPACE, &self.current).and_then(|_| data.save()) {
            tracing::error!(error = %e, "Failed to persist settings");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::UserDataStore;

    fn store() -> (tempfile::TempDir, SettingsStore) {
        let dir = tempfile::tempdir().unwrap();
        let data = UserDataStore::shared(dir.path().join("userData.json"));
        let mut store = SettingsStore::new(data);
        store.initialize();
        (dir, store)
    }

    #[test]
    fn starts_from_defaults() {
        let (_dir, store) = store();
        assert!(store.is_ready());
        assert_eq!(store.current(), &SettingsState::default());
    }

    #[test]
    fn snooze_floor_is_enforced() {
        let (_dir, mut store) = store();
        assert_eq!(store.set_snooze_minutes(2), 5);
        assert_eq!(store.set_snooze_minutes(15), 15);
        assert_eq!(store.current().snooze_time, 15);
    }

    #[test]
    fn changes_survive_reload() {
        let (dir, mut store) = store();
        store.set_notifications_enabled(false);
        store.set_meal_time(MealSlot::Lunch, ReminderTime::new(12, 30, "Lunch").unwrap())
            .unwrap();

        let mut reloaded =
            SettingsStore::new(UserDataStore::shared(dir.path().join("userData.json")));
        reloaded.initialize();
        assert!(!reloaded.current().notifications_enabled);
        assert_eq!(reloaded.current().lunch_time.minutes, 30);
        assert_eq!(reloaded.current().snooze_time, 5);
    }

    #[test]
    fn partial_stored_settings_merge_with_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("userData.json");
        std::fs::write(&path, r#"{"Settings": {"snoozeTime": 20}}"#).unwrap();

        let mut store = SettingsStore::new(UserDataStore::shared(path));
        store.initialize();
        assert_eq!(store.current().snooze_time, 20);
        assert!(store.current().notifications_enabled);
        assert_eq!(store.current().breakfast_time.hours, 8);
    }

    #[test]
    fn frequency_uses_current_meal_times() {
        let (_dir, mut store) = store();
        store.set_meal_time(MealSlot::Dinner, ReminderTime::new(19, 45, "Dinner").unwrap())
            .unwrap();
        let times = store.reminder_times_for("1-0-1");
        assert_eq!(times.len(), 2);
        assert_eq!((times[0].hours, times[0].minutes), (8, 0));
        assert_eq!((times[1].hours, times[1].minutes), (19, 45));
    }
}
