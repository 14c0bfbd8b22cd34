use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::PrescriptionRecord;

/// Macro to generate a snake_case serde enum with an `as_str` matching its wire name
macro_rules! str_enum {
    ($name:ident { $($variant:ident => $s:literal),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $s),+
                }
            }
        }
    };
}

str_enum!(PrescriptionStatus {
    Upcoming => "upcoming",
    Active => "active",
    Expired => "expired",
    Archived => "archived",
});

impl PrescriptionStatus {
    /// The single place a record's lifecycle state is derived.
    ///
    /// Archiving wins over dates; expiry and start are compared by day.
    pub fn of(record: &PrescriptionRecord, today: NaiveDate) -> Self {
        if record.archived {
            Self::Archived
        } else if record.is_expired(today) {
            Self::Expired
        } else if record.start_at.date() > today {
            Self::Upcoming
        } else {
            Self::Active
        }
    }

    /// Whether reminders should exist for a record in this state.
    pub fn wants_reminders(&self) -> bool {
        matches!(self, Self::Upcoming | Self::Active)
    }
}

str_enum!(MealSlot {
    Breakfast => "breakfast",
    Lunch => "lunch",
    Dinner => "dinner",
});

impl MealSlot {
    /// Positional order used by the `b-l-d` frequency pattern.
    pub const ORDER: [MealSlot; 3] = [MealSlot::Breakfast, MealSlot::Lunch, MealSlot::Dinner];
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDateTime;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, d).unwrap()
    }

    fn record(start: u32, end: u32) -> PrescriptionRecord {
        let start_at: NaiveDateTime = day(start).and_hms_opt(9, 0, 0).unwrap();
        let mut r = PrescriptionRecord::new("Metformin", start_at);
        r.end_at = day(end).and_hms_opt(9, 0, 0).unwrap();
        r
    }

    #[test]
    fn as_str_matches_wire_name() {
        for (variant, s) in [
            (PrescriptionStatus::Upcoming, "upcoming"),
            (PrescriptionStatus::Active, "active"),
            (PrescriptionStatus::Expired, "expired"),
            (PrescriptionStatus::Archived, "archived"),
        ] {
            assert_eq!(variant.as_str(), s);
            assert_eq!(serde_json::to_value(variant).unwrap(), s);
            let parsed: PrescriptionStatus = serde_json::from_value(s.into()).unwrap();
            assert_eq!(parsed, variant);
        }
        assert_eq!(MealSlot::Dinner.as_str(), "dinner");
    }

    #[test]
    fn unknown_status_is_rejected() {
        assert!(serde_json::from_str::<PrescriptionStatus>("\"paused\"").is_err());
    }

    #[test]
    fn status_derivation_covers_every_state() {
        assert_eq!(PrescriptionStatus::of(&record(10, 12), day(9)), PrescriptionStatus::Upcoming);
        assert_eq!(PrescriptionStatus::of(&record(10, 12), day(10)), PrescriptionStatus::Active);
        assert_eq!(PrescriptionStatus::of(&record(10, 12), day(12)), PrescriptionStatus::Active);
        assert_eq!(PrescriptionStatus::of(&record(10, 12), day(13)), PrescriptionStatus::Expired);

        let mut archived = record(10, 12);
        archived.archived = true;
        assert_eq!(PrescriptionStatus::of(&archived, day(11)), PrescriptionStatus::Archived);
        assert_eq!(PrescriptionStatus::of(&archived, day(20)), PrescriptionStatus::Archived);
    }

    #[test]
    fn only_live_states_want_reminders() {
        assert!(PrescriptionStatus::Upcoming.wants_reminders());
        assert!(PrescriptionStatus::Active.wants_reminders());
        assert!(!PrescriptionStatus::Expired.wants_reminders());
        assert!(!PrescriptionStatus::Archived.wants_reminders());
    }

    #[test]
    fn status_serializes_snake_case() {
        let json = serde_json::to_string(&PrescriptionStatus::Expired).unwrap();
        assert_eq!(json, "\"expired\"");
    }
}
