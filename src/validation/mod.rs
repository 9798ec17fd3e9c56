mod field_rules;
mod reference_validator;
mod rules;
mod validator;


pub use field_rules::{FieldValue, MIX_AND_LOCATION_TYPES};
pub use rules::{Rule, RuleContext, RuleId, default_rules};
pub use validator::SemanticValidator;
