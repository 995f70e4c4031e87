//! Rule subsystem
//!
//! - `model`: rule parameters as declared in descriptors
//! - `standard`: the built-in check catalog
//! - `registry`: compilation of a type's rules, with every static check
//! - `compiled`: the immutable result shared by validations

mod compiled;
mod model;
mod registry;
mod standard;

pub use compiled::{
    CheckFn, CompiledField, CompiledMessage, CompiledRules, ExpressionRule, MessageRule,
    RuleContext, RuleKind, RuleSummary, StandardRule,
};
pub use model::{
    BoolRules, BytesRules, CustomRule, DurationRules, EnumRules, FieldRules, MapRules,
    MessageRules, NumericRules, OneofRule, RepeatedRules, StringRules, TimestampRules,
};
pub use registry::RuleRegistry;
pub use standard::NumericParam;
