//! User notification and privacy settings

use serde::{Deserialize, Serialize};

/// Per-user settings flags
///
/// A user without a settings row gets these defaults; the row is created on
/// first update.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserSettings {
    pub email_notifications: bool,
    pub weather_alerts: bool,
    pub weekly_digest: bool,
    pub data_sharing: bool,
}

impl Default for UserSettings {
    fn default() -> Self {
        Self {
            email_notifications: true,
            weather_alerts: true,
            weekly_digest: false,
            data_sharing: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings() {
        let settings = UserSettings::default();
        assert!(settings.email_notifications);
        assert!(settings.weather_alerts);
        assert!(!settings.weekly_digest);
        assert!(!settings.data_sharing);
    }
}
