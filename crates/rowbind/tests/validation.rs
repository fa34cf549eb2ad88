//! Model validation through schema bindings.

mod common;

use std::sync::Arc;

use common::connection;
use rowbind::prelude::*;
use rowbind_core::{ValidationErrorKind, ValidationRequest};

fn not_reserved(value: &Value) -> std::result::Result<(), String> {
    match value.as_str() {
        Some("root" | "admin") => Err("handle is reserved".to_string()),
        _ => Ok(()),
    }
}

fn accounts() -> Arc<Registry> {
    let registry = Arc::new(Registry::new());
    registry.register("account", |meta: &mut MetaBuilder| {
        meta.field(Field::auto("id").primary())
            .field(Field::string("handle").unique())
            .field(Field::string("email"))
            .field(Field::integer("age"))
            .label("handle", "Handle")
            .filter("handle", Filter::Trim)
            .filter("handle", Filter::Lowercase)
            .rule("handle", Rule::Required)
            .rule("handle", Rule::MaxLength(12))
            .callback("handle", Callback::new("not_reserved", not_reserved))
            .filter("email", Filter::Trim)
            .rule("email", Rule::Email)
            .rule("age", Rule::Min(13.0))
            .validate("rename", &["handle"]);
    });
    registry
}

#[test]
fn valid_model_yields_filtered_data() {
    let (_, conn) = connection();
    let registry = accounts();
    let mut account = registry.model("account", conn).unwrap();
    account
        .values([("handle", "  Mulder "), ("email", " fox@fbi.gov ")])
        .unwrap();
    account.set("age", 35).unwrap();

    let result = account.validate(None, &RuleValidator);
    assert!(result.is_valid(), "{:?}", result.errors());
    assert_eq!(result.data().get_by_name("handle"), Some(&Value::from("mulder")));
    assert_eq!(
        result.data().get_by_name("email"),
        Some(&Value::from("fox@fbi.gov"))
    );

    // Validation never writes back to the model.
    assert_eq!(account.peek("handle"), Some(&Value::from("  Mulder ")));
}

#[test]
fn every_failing_rule_is_reported_in_order() {
    let (_, conn) = connection();
    let registry = accounts();
    let mut account = registry.model("account", conn).unwrap();
    account
        .values([("handle", "   "), ("email", "not-an-address")])
        .unwrap();
    account.set("age", 9).unwrap();

    let result = account.validate(None, &RuleValidator);
    assert!(!result.is_valid());

    let errors = result.errors();
    let handle: Vec<_> = errors.for_field("handle").collect();
    assert_eq!(handle.len(), 1);
    assert_eq!(handle[0].kind, ValidationErrorKind::Required);
    assert_eq!(handle[0].message, "Handle is required");

    assert_eq!(
        errors.for_field("email").next().map(|e| e.kind),
        Some(ValidationErrorKind::Pattern)
    );
    assert_eq!(
        errors.for_field("age").next().map(|e| e.kind),
        Some(ValidationErrorKind::Min)
    );
    assert!(matches!(result.into_result(), Err(Error::Validation(_))));
}

#[test]
fn callbacks_reject_values_the_rules_accept() {
    let (_, conn) = connection();
    let registry = accounts();
    let mut account = registry.model("account", conn).unwrap();
    account.set("handle", "ROOT").unwrap();

    let result = account.validate(None, &RuleValidator);
    let error = result.errors().for_field("handle").next().cloned().unwrap();
    assert_eq!(error.kind, ValidationErrorKind::Custom);
    assert_eq!(error.message, "handle is reserved");
}

#[test]
fn contexts_limit_the_checked_attributes() {
    let (_, conn) = connection();
    let registry = accounts();
    let mut account = registry.model("account", conn).unwrap();
    account.set("handle", "skinner").unwrap();
    account.set("email", "nope").unwrap();

    assert!(!account.validate(None, &RuleValidator).is_valid());
    assert!(account.validate(Some("rename"), &RuleValidator).is_valid());

    // An undeclared context checks everything bound.
    assert!(!account.validate(Some("signup"), &RuleValidator).is_valid());
}

#[test]
fn custom_validators_see_the_model_type() {
    struct Deny;

    impl Validator for Deny {
        fn validate(&self, request: ValidationRequest<'_>) -> Validation {
            let mut errors = rowbind_core::ValidationError::new();
            errors.add(
                request.model,
                ValidationErrorKind::Custom,
                format!("{} is frozen", request.model),
            );
            Validation::new(request.data, errors)
        }
    }

    let (_, conn) = connection();
    let registry = accounts();
    let account = registry.model("account", conn).unwrap();
    let result = account.validate(Some("create"), &Deny);
    assert_eq!(result.errors().errors[0].message, "account is frozen");
}
