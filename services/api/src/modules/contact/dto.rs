use entity::enums::ContactStatus;
use serde::Deserialize;
use serde_json::Value as Json;
use validator::Validate;

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateContactDto {
    #[validate(email)]
    pub email: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    #[serde(default)]
    pub profile: Json,
    #[serde(default)]
    pub tags: Vec<String>,
    pub list_ids: Option<Vec<i32>>,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateContactDto {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub profile: Option<Json>,
    pub tags: Option<Vec<String>>,
    pub status: Option<ContactStatus>,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UnsubscribeContactDto {
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SetListMembershipDto {
    pub list_ids: Vec<i32>,
}
