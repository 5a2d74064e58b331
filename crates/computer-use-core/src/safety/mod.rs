//! Safety validation gating every side-effecting action

pub mod keys;
pub mod rules;
pub mod validator;

pub use keys::{is_dangerous_combo, normalize_key};
pub use rules::{RuleCategory, SafetyRule, Severity};
pub use validator::{
    SafetyConfig, SafetyValidator, SafetyVerdict, fold_compat, parse_button, parse_direction,
};
