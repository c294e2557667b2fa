use entity::enums::{CampaignScheduleKind, CampaignStatus};
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;
use validator::Validate;

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateCampaignDto {
    #[validate(length(min = 1, max = 200))]
    pub name: String,

    pub selectors: Json,

    pub template_id: Option<i32>,
    pub inline_html: Option<String>,

    #[validate(length(min = 1, max = 500))]
    pub subject: String,
    #[validate(length(min = 1, max = 200))]
    pub from_name: String,
    #[validate(email)]
    pub from_email: String,
    pub reply_to: Option<String>,

    pub schedule_kind: CampaignScheduleKind,
    pub scheduled_at: Option<chrono::DateTime<chrono::Utc>>,
    pub timezone: Option<String>,

    #[serde(default = "default_true")]
    pub track_opens: bool,
    #[serde(default = "default_true")]
    pub track_clicks: bool,

    pub ab_test: Option<Json>,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateCampaignDto {
    #[validate(length(min = 1, max = 200))]
    pub name: Option<String>,
    pub selectors: Option<Json>,
    pub template_id: Option<i32>,
    pub inline_html: Option<String>,
    pub subject: Option<String>,
    pub from_name: Option<String>,
    #[validate(email)]
    pub from_email: Option<String>,
    pub reply_to: Option<String>,
    pub scheduled_at: Option<chrono::DateTime<chrono::Utc>>,
    pub timezone: Option<String>,
    pub track_opens: Option<bool>,
    pub track_clicks: Option<bool>,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CancelCampaignDto {
    pub reason: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CampaignStatusDto {
    pub id: i32,
    pub status: CampaignStatus,
}
