pub const DEFAULT_BASE_URL: &str = "https://mytotalconnectcomfort.com";

/// Portal paths the client targets. The schedule endpoints are optional
/// because their paths vary between portal versions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointConfig {
    pub base_url: String,
    pub login_path: String,
    pub check_data_session_path: String,
    pub submit_control_changes_path: String,
    pub get_schedule_path: Option<String>,
    pub submit_schedule_path: Option<String>,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            login_path: "/portal/".to_string(),
            check_data_session_path: "/portal/Device/CheckDataSession/{device_id}".to_string(),
            submit_control_changes_path: "/portal/Device/SubmitControlScreenChanges".to_string(),
            get_schedule_path: None,
            submit_schedule_path: None,
        }
    }
}

impl EndpointConfig {
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }

    fn url_for(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    pub fn login_url(&self) -> String {
        self.url_for(&self.login_path)
    }

    pub fn check_data_session_url(&self, device_id: &str) -> String {
        self.url_for(&self.check_data_session_path.replace("{device_id}", device_id))
    }

    pub fn submit_control_changes_url(&self) -> String {
        self.url_for(&self.submit_control_changes_path)
    }

    pub fn get_schedule_url(&self, device_id: &str) -> Option<String> {
        self.get_schedule_path
            .as_ref()
            .map(|p| self.url_for(&p.replace("{device_id}", device_id)))
    }

    pub fn submit_schedule_url(&self) -> Option<String> {
        self.submit_schedule_path.as_ref().map(|p| self.url_for(p))
    }
}
