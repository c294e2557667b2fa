use serde::Deserialize;
use serde_json::Value as Json;
use validator::Validate;

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateAutomationDto {
    #[validate(length(min = 1, max = 200))]
    pub name: String,
    pub trigger: Json,
    pub steps: Json,
    #[serde(default)]
    pub settings: Json,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateAutomationDto {
    #[validate(length(min = 1, max = 200))]
    pub name: Option<String>,
    pub trigger: Option<Json>,
    pub steps: Option<Json>,
    pub settings: Option<Json>,
}
