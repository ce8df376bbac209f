use serde::Deserialize;

use crate::assistant::AskRequest;
use crate::prompt::GENERAL_REGION;

pub const WS_APP_PROTOCOL: &str = "sahayak.v1";

#[derive(Debug, Deserialize, Default)]
pub struct WsIncomingMessage {
    #[serde(rename = "type")]
    pub msg_type: Option<String>,
    pub message: Option<String>,
    #[serde(default)]
    pub history: String,
    pub language: Option<String>,
    pub state: Option<String>,
    #[serde(rename = "userName")]
    pub user_name: Option<String>,
    pub role: Option<String>,
    #[serde(rename = "detailLevel")]
    pub detail_level: Option<String>,
}

impl WsIncomingMessage {
    pub fn to_ask_request(&self) -> AskRequest {
        let mut request = AskRequest::new(self.message.clone().unwrap_or_default());
        request.history = self.history.clone();
        if let Some(language) = &self.language {
            request.language = language.clone();
        }
        request.state = self
            .state
            .clone()
            .unwrap_or_else(|| GENERAL_REGION.to_string());
        if let Some(user_name) = &self.user_name {
            request.user_name = user_name.clone();
        }
        if let Some(role) = &self.role {
            request.role = role.clone();
        }
        if let Some(detail_level) = &self.detail_level {
            request.detail_level = detail_level.clone();
        }
        request
    }
}
