pub mod config;
pub mod constants;
pub mod db;
pub mod dto;
pub mod error;
pub mod tracer;
pub mod value;

use convert_case::{Case, Casing};
use strum::{Display, EnumIter, IntoEnumIterator};

/// All the permissions available for the campaign platform's control plane.
///
/// Authentication/authorization is handled by an external collaborator;
/// this enum only names the permission strings that collaborator is
/// expected to attach to a request so route handlers can check them.
#[derive(Debug, EnumIter, Display, Clone, PartialEq, Eq)]
pub enum Permission {
    CreateCampaign,
    UpdateCampaign,
    DeleteCampaign,
    SendCampaign,

    CreateContact,
    UpdateContact,
    DeleteContact,

    CreateTemplate,
    UpdateTemplate,
    DeleteTemplate,

    CreateAutomation,
    UpdateAutomation,
    DeleteAutomation,

    UpdateOrganization,
}

impl Permission {
    pub fn to_string_vec() -> Vec<String> {
        Permission::iter()
            .map(|e| e.to_string().to_case(Case::ScreamingSnake))
            .collect::<Vec<_>>()
    }
}
