use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct SettingsUpdateRequest {
    pub maintenance_mode: Option<bool>,
    pub maintenance_message: Option<String>,
    pub soft_close_seconds: Option<i32>,
}
