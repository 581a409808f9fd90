use pretty_assertions::assert_eq;
use serde_json::json;
use std::cell::Cell;
use std::rc::Rc;
use tessera_model::{
    AttributeSchema, Cardinality, CatalogSchema, EntitySchema, EntitySchemaBuilder,
    EntitySchemaMutation, EvolutionMode, Price, PriceInnerRecordHandling, ReferenceSchema,
    SchemaError, SchemaResult, ValueType,
};
use tessera_mutation::{
    EntityExistence, EntityRemoveMutation, EntityUpsertMutation, LocalMutation,
    SchemaEvolvingMutation, SkipToken, evolve_schema,
};
use tessera_types::{PriceKey, ReferenceKey};

fn catalog() -> CatalogSchema {
    CatalogSchema::new("shop")
}

fn upsert(primary_key: Option<i32>, mutations: Vec<LocalMutation>) -> EntityUpsertMutation {
    EntityUpsertMutation::new("product", primary_key, EntityExistence::MayExist, mutations)
}

// ── Skip-token dedup ─────────────────────────────────────────────

struct CountingMutation {
    token: SkipToken,
    calls: Rc<Cell<usize>>,
}

impl SchemaEvolvingMutation for CountingMutation {
    fn skip_token(&self, _catalog: &CatalogSchema, _schema: &EntitySchema) -> Option<SkipToken> {
        Some(self.token.clone())
    }

    fn verify_or_evolve(
        &self,
        _catalog: &CatalogSchema,
        builder: &mut EntitySchemaBuilder<'_>,
    ) -> SchemaResult<()> {
        self.calls.set(self.calls.get() + 1);
        builder.apply(EntitySchemaMutation::SetWithPrice(true))
    }
}

#[test]
fn shared_skip_token_is_checked_once() {
    let calls = Rc::new(Cell::new(0));
    let mutations: Vec<_> = (0..5)
        .map(|_| CountingMutation {
            token: SkipToken::Price {
                currency: "EUR".into(),
            },
            calls: Rc::clone(&calls),
        })
        .collect();

    let schema = EntitySchema::new("product");
    let diff = evolve_schema(&catalog(), &schema, &mutations).unwrap().unwrap();

    assert_eq!(calls.get(), 1);
    assert_eq!(diff.mutations, vec![EntitySchemaMutation::SetWithPrice(true)]);
}

#[test]
fn distinct_skip_tokens_are_each_checked() {
    let calls = Rc::new(Cell::new(0));
    let mutations: Vec<_> = ["EUR", "CZK", "EUR"]
        .into_iter()
        .map(|currency| CountingMutation {
            token: SkipToken::Price {
                currency: currency.into(),
            },
            calls: Rc::clone(&calls),
        })
        .collect();

    evolve_schema(&catalog(), &EntitySchema::new("product"), &mutations).unwrap();
    assert_eq!(calls.get(), 2);
}

#[test]
fn many_prices_in_one_currency_evolve_once() {
    let mutations: Vec<_> = (1..=50)
        .map(|id| {
            let key = PriceKey::new(id, "basic", "EUR");
            LocalMutation::upsert_price(key, Price::indexed(10.0, 21.0))
        })
        .collect();
    let diff = upsert(Some(1), mutations)
        .verify_or_evolve_schema(&catalog(), &EntitySchema::new("product"), false)
        .unwrap()
        .unwrap();
    assert_eq!(
        diff.mutations,
        vec![
            EntitySchemaMutation::SetWithPrice(true),
            EntitySchemaMutation::AllowCurrency("EUR".into()),
        ]
    );
}

// ── Per-kind evolution ───────────────────────────────────────────

#[test]
fn fitting_schema_needs_no_mutation() {
    let schema = EntitySchema::new("product")
        .with_attribute(AttributeSchema::new("code", ValueType::String));
    let result = upsert(Some(1), vec![LocalMutation::upsert_attribute("code", json!("A"))])
        .verify_or_evolve_schema(&catalog(), &schema, false)
        .unwrap();
    assert_eq!(result, None);
}

#[test]
fn unknown_attribute_is_created_with_inferred_type() {
    let result = upsert(Some(1), vec![LocalMutation::upsert_attribute("stock", json!(5))])
        .verify_or_evolve_schema(&catalog(), &EntitySchema::new("product"), false)
        .unwrap()
        .unwrap();
    assert_eq!(
        result.mutations,
        vec![EntitySchemaMutation::CreateAttributeSchema(AttributeSchema::new(
            "stock",
            ValueType::Integer
        ))]
    );
}

#[test]
fn global_attribute_is_adopted_even_on_strict_schema() {
    let global = AttributeSchema::new("code", ValueType::String).non_nullable();
    let catalog = CatalogSchema::new("shop").with_global_attribute(global.clone());
    let schema = EntitySchema::new("product").strict();
    let result = upsert(Some(1), vec![LocalMutation::upsert_attribute("code", json!("A"))])
        .verify_or_evolve_schema(&catalog, &schema, false)
        .unwrap()
        .unwrap();
    assert_eq!(result.mutations, vec![EntitySchemaMutation::UseGlobalAttributeSchema(global)]);
}

#[test]
fn strict_schema_rejects_new_attribute() {
    let err = upsert(Some(1), vec![LocalMutation::upsert_attribute("code", json!("A"))])
        .verify_or_evolve_schema(&catalog(), &EntitySchema::new("product").strict(), false)
        .unwrap_err();
    assert!(matches!(
        err,
        SchemaError::EvolutionNotAllowed {
            mode: EvolutionMode::AddingAttributes,
            ..
        }
    ));
}

#[test]
fn removal_class_units_never_touch_the_schema() {
    let schema = EntitySchema::new("product").strict();
    let brand = ReferenceKey::new("brand", 3);
    let units = [
        LocalMutation::remove_parent(),
        LocalMutation::remove_attribute("code"),
        LocalMutation::remove_associated_data("description"),
        LocalMutation::set_price_inner_record_handling(PriceInnerRecordHandling::LowestPrice),
        LocalMutation::remove_price(PriceKey::new(1, "basic", "EUR")),
        LocalMutation::remove_reference("brand", 3),
        LocalMutation::remove_reference_attribute(brand, "order"),
    ];
    let mut builder = EntitySchemaBuilder::new(&schema);
    for unit in &units {
        assert_eq!(unit.skip_token(&catalog(), &schema), None);
        unit.verify_or_evolve(&catalog(), &mut builder).unwrap();
    }
    assert!(!builder.is_dirty());
}

#[test]
fn type_mismatch_is_always_a_violation() {
    let schema = EntitySchema::new("product")
        .with_attribute(AttributeSchema::new("code", ValueType::String));
    let err = upsert(Some(1), vec![LocalMutation::upsert_attribute("code", json!(42))])
        .verify_or_evolve_schema(&catalog(), &schema, false)
        .unwrap_err();
    assert!(matches!(
        err,
        SchemaError::TypeMismatch {
            expected: ValueType::String,
            actual: ValueType::Integer,
            ..
        }
    ));
}

#[test]
fn reference_and_its_attribute_evolve_in_order() {
    let brand = ReferenceKey::new("brand", 3);
    let result = upsert(
        Some(1),
        vec![
            LocalMutation::upsert_reference_attribute(brand.clone(), "order", json!(1)),
            LocalMutation::insert_reference("brand", 3, "brand"),
        ],
    )
    .verify_or_evolve_schema(&catalog(), &EntitySchema::new("product"), false)
    .unwrap()
    .unwrap();
    assert_eq!(
        result.mutations,
        vec![
            EntitySchemaMutation::CreateReferenceSchema(ReferenceSchema::new(
                "brand",
                "brand",
                Cardinality::ZeroOrMore
            )),
            EntitySchemaMutation::CreateReferenceAttributeSchema {
                reference_name: "brand".into(),
                attribute: AttributeSchema::new("order", ValueType::Integer),
            },
        ]
    );
}

#[test]
fn reference_to_different_type_is_rejected() {
    let schema = EntitySchema::new("product")
        .with_reference(ReferenceSchema::new("brand", "brand", Cardinality::ZeroOrOne));
    let err = upsert(Some(1), vec![LocalMutation::insert_reference("brand", 3, "manufacturer")])
        .verify_or_evolve_schema(&catalog(), &schema, false)
        .unwrap_err();
    assert!(matches!(err, SchemaError::ReferencedTypeMismatch { .. }));
}

#[test]
fn parent_enables_hierarchy() {
    let result = upsert(Some(2), vec![LocalMutation::set_parent(1)])
        .verify_or_evolve_schema(&catalog(), &EntitySchema::new("category"), false)
        .unwrap()
        .unwrap();
    assert_eq!(result.mutations, vec![EntitySchemaMutation::SetWithHierarchy(true)]);
}

#[test]
fn removals_never_evolve_schema() {
    let strict = EntitySchema::new("product").strict();
    let result = upsert(
        Some(1),
        vec![
            LocalMutation::remove_attribute("code"),
            LocalMutation::remove_reference("brand", 1),
            LocalMutation::remove_price(PriceKey::new(1, "basic", "EUR")),
        ],
    )
    .verify_or_evolve_schema(&catalog(), &strict, false)
    .unwrap();
    assert_eq!(result, None);

    let remove = EntityRemoveMutation::new("product", 1);
    assert_eq!(remove.verify_or_evolve_schema(&catalog(), &strict, true).unwrap(), None);
}

// ── Primary-key generation mode ──────────────────────────────────

#[test]
fn missing_key_on_empty_collection_enables_generated_keys() {
    let schema = EntitySchema::new("product");
    let result = upsert(None, vec![LocalMutation::upsert_attribute("code", json!("A"))])
        .verify_or_evolve_schema(&catalog(), &schema, true)
        .unwrap()
        .unwrap();
    assert_eq!(result.mutations[0], EntitySchemaMutation::SetWithGeneratedPrimaryKey(true));
    assert_eq!(result.mutations.len(), 2);
}

#[test]
fn supplied_key_on_empty_collection_disables_generated_keys() {
    let schema = EntitySchema::new("product").with_generated_primary_key(true);
    let result = upsert(Some(5), vec![])
        .verify_or_evolve_schema(&catalog(), &schema, true)
        .unwrap()
        .unwrap();
    assert_eq!(result.mutations, vec![EntitySchemaMutation::SetWithGeneratedPrimaryKey(false)]);
}

#[test]
fn key_mismatch_on_non_empty_collection_is_ignored() {
    let schema = EntitySchema::new("product");
    let result = upsert(None, vec![])
        .verify_or_evolve_schema(&catalog(), &schema, false)
        .unwrap();
    assert_eq!(result, None);
}

#[test]
fn key_mismatch_without_evolution_fails() {
    let schema = EntitySchema::new("product").strict();
    let err = upsert(None, vec![])
        .verify_or_evolve_schema(&catalog(), &schema, true)
        .unwrap_err();
    assert!(matches!(
        err,
        SchemaError::EvolutionNotAllowed {
            mode: EvolutionMode::AdaptPrimaryKeyGeneration,
            ..
        }
    ));
}
