use std::collections::BTreeMap;

use serde::Deserialize;
use validator::Validate;

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateTemplateDto {
    #[validate(length(min = 1, max = 200))]
    pub name: String,
    #[validate(length(min = 1, max = 500))]
    pub subject: String,
    #[validate(length(min = 1))]
    pub html: String,
    pub text: Option<String>,
    /// `variable path -> declared default value`; applied to the paths
    /// extracted from `subject`/`html` on save, empty for any path not
    /// listed here.
    #[serde(default)]
    pub variable_defaults: BTreeMap<String, String>,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateTemplateDto {
    #[validate(length(min = 1, max = 200))]
    pub name: Option<String>,
    pub subject: Option<String>,
    pub html: Option<String>,
    pub text: Option<String>,
    #[serde(default)]
    pub variable_defaults: BTreeMap<String, String>,
}
