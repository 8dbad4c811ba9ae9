//! Constants describing the monitored speaker family and how it advertises itself.

/// DNS-SD service type every Cast device announces.
pub const CAST_SERVICE: &str = "_googlecast._tcp.local";

/// Model prefix (TXT key `md`) of the speakers we care about.
pub const MODEL_PREFIX: &str = "HK Citation";

pub const TXT_MODEL: &str = "md";
pub const TXT_FRIENDLY_NAME: &str = "fn";
pub const TXT_IDENTIFIER: &str = "id";

/// Returns `true` if the advertised model belongs to the monitored family.
pub fn is_supported_model(model: &str) -> bool {
    model.starts_with(MODEL_PREFIX)
}
