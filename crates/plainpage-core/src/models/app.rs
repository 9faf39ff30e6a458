use serde::{Deserialize, Serialize};

/// Title used when the server does not report one
const DEFAULT_APP_TITLE: &str = "PlainPage";

/// Server metadata returned by `GET /app`.
///
/// `version` and `git_sha` are only reported to logged-in users.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppInfo {
    #[serde(default)]
    pub app_title: String,
    #[serde(default)]
    pub setup_mode: bool,
    #[serde(default)]
    pub allow_register: bool,
    #[serde(default)]
    pub allow_admin: bool,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub git_sha: Option<String>,
}

impl AppInfo {
    pub fn title(&self) -> &str {
        if self.app_title.is_empty() {
            DEFAULT_APP_TITLE
        } else {
            &self.app_title
        }
    }

    /// Registration is open while the server is in setup mode, too
    pub fn allows_registration(&self) -> bool {
        self.allow_register || self.setup_mode
    }

    pub fn version_display(&self) -> String {
        match (&self.version, &self.git_sha) {
            (Some(v), Some(sha)) if !sha.is_empty() => {
                let short: String = sha.chars().take(7).collect();
                format!("{} ({})", v, short)
            }
            (Some(v), _) => v.clone(),
            _ => "unknown".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_anonymous_app_info() {
        let json = r#"{"appTitle":"","setupMode":true,"allowRegister":false,"allowAdmin":false}"#;
        let info: AppInfo = serde_json::from_str(json).expect("Failed to parse app info");
        assert_eq!(info.title(), "PlainPage");
        assert!(info.allows_registration());
        assert_eq!(info.version_display(), "unknown");
    }

    #[test]
    fn test_version_display_shortens_sha() {
        let info = AppInfo {
            app_title: "Team Wiki".to_string(),
            version: Some("1.4.0".to_string()),
            git_sha: Some("0123456789abcdef".to_string()),
            ..AppInfo::default()
        };
        assert_eq!(info.title(), "Team Wiki");
        assert!(!info.allows_registration());
        assert_eq!(info.version_display(), "1.4.0 (0123456)");
    }
}
