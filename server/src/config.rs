const DEFAULT_REPORT_TITLE: &str = "Dashboard Operativo - Sprint 4";

#[derive(Clone, Debug)]
pub struct AppConfig {
    /// Title stamped on every dashboard payload.
    pub report_title: String,
}

impl AppConfig {
    pub fn load() -> Self {
        let report_title =
            std::env::var("REPORT_TITLE").unwrap_or_else(|_| DEFAULT_REPORT_TITLE.into());
        Self { report_title }
    }
}
