use serde::{Deserialize, Deserializer};
use utoipa::IntoParams;
use validator::Validate;

fn default_page() -> u64 {
    1
}

fn default_page_size() -> u64 {
    20
}

#[derive(Deserialize, IntoParams, Validate)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct Pagination {
    #[serde(default = "default_page")]
    #[validate(range(min = 1, max = 99999))]
    pub page: u64,

    #[serde(default = "default_page_size")]
    #[validate(range(min = 1, max = 100))]
    pub page_size: u64,
}

impl Pagination {
    pub fn offset(&self) -> u64 {
        (self.page - 1) * self.page_size
    }
}

/// Simple enum to order a query by ascending or descending order.
#[derive(Debug)]
pub enum AscOrDescOrder {
    Asc,
    Desc,
}

impl Default for AscOrDescOrder {
    fn default() -> Self {
        Self::Desc
    }
}

impl<'de> Deserialize<'de> for AscOrDescOrder {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = <String>::deserialize(deserializer)?;

        Ok(match s.to_lowercase().as_str() {
            "asc" | "ascending" => AscOrDescOrder::Asc,
            "desc" | "descending" => AscOrDescOrder::Desc,
            _ => AscOrDescOrder::default(),
        })
    }
}
