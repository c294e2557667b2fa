//! Stable error-code strings for `CoreError::code`. Kept as plain statics,
//! same texture as the teacher's own `error_codes.rs` — one constant per
//! code, no enum, so a new code never needs a match arm anywhere else.

pub static NO_TOKEN: &str = "NO_TOKEN";
pub static TOKEN_EXPIRED: &str = "TOKEN_EXPIRED";
pub static INVALID_TOKEN: &str = "INVALID_TOKEN";
pub static EMAIL_EXISTS: &str = "EMAIL_EXISTS";
pub static INVALID_CREDENTIALS: &str = "INVALID_CREDENTIALS";
pub static EMAIL_NOT_VERIFIED: &str = "EMAIL_NOT_VERIFIED";
pub static RATE_LIMITED: &str = "RATE_LIMITED";
pub static AUTH_RATE_LIMITED: &str = "AUTH_RATE_LIMITED";
pub static EMAIL_RATE_LIMITED: &str = "EMAIL_RATE_LIMITED";
pub static IP_BLOCKED: &str = "IP_BLOCKED";
pub static VALIDATION_ERROR: &str = "VALIDATION_ERROR";
pub static DUPLICATE_VALUE: &str = "DUPLICATE_VALUE";
pub static INVALID_ID: &str = "INVALID_ID";
pub static USER_NOT_FOUND: &str = "USER_NOT_FOUND";
pub static NOT_FOUND: &str = "NOT_FOUND";
pub static MISSING_PERMISSIONS: &str = "MISSING_PERMISSIONS";

/// a campaign action was requested from a state that doesn't permit it,
/// e.g. `send` on a campaign that's already `sending`
pub static INVALID_CAMPAIGN_STATE: &str = "INVALID_CAMPAIGN_STATE";

/// a campaign/contact/template/automation edit was rejected because the
/// entity is not in an editable state
pub static NOT_EDITABLE: &str = "NOT_EDITABLE";
