use pretty_assertions::assert_eq;
use serde_json::json;
use std::borrow::Cow;
use tessera_model::{Entity, EntitySchema, Price, PriceInnerRecordHandling};
use tessera_mutation::{
    EntityExistence, EntityMutation, EntityRemoveMutation, EntityUpsertMutation, LocalMutation,
    MutationError, MutationKind, removal_mutations,
};
use tessera_types::{
    AssociatedDataKey, AttributeKey, DecisiveClock, DecisiveTimestamp, PriceKey, ReferenceKey,
};

fn schema() -> EntitySchema {
    EntitySchema::new("product")
}

fn create(primary_key: i32, mutations: Vec<LocalMutation>) -> Entity {
    let expects = EntityExistence::MustNotExist;
    EntityUpsertMutation::new("product", Some(primary_key), expects, mutations)
        .mutate(&schema(), None)
        .unwrap()
}

fn rich_product() -> Entity {
    create(
        1,
        vec![
            LocalMutation::set_parent(100),
            LocalMutation::insert_reference("brand", 3, "brand"),
            LocalMutation::insert_reference("category", 8, "category"),
            LocalMutation::upsert_attribute("code", json!("A")),
            LocalMutation::upsert_attribute("name", json!("Chair")),
            LocalMutation::upsert_attribute("ean", json!("123")),
            LocalMutation::upsert_associated_data("description", json!("A fine chair")),
            LocalMutation::set_price_inner_record_handling(PriceInnerRecordHandling::LowestPrice),
            LocalMutation::upsert_price(
                PriceKey::new(1, "basic", "EUR"),
                Price::indexed(100.0, 21.0),
            ),
            LocalMutation::upsert_price(PriceKey::new(2, "vip", "EUR"), Price::indexed(90.0, 21.0)),
        ],
    )
}

// ── Upsert ───────────────────────────────────────────────────────

#[test]
fn upsert_on_absent_entity_creates_version_one() {
    let entity = create(7, vec![LocalMutation::upsert_attribute("code", json!("A"))]);
    assert_eq!(entity.primary_key(), Some(7));
    assert_eq!(entity.version(), 1);
    assert_eq!(entity.attribute("code"), Some(&json!("A")));
}

#[test]
fn upsert_increments_version_once_regardless_of_unit_count() {
    let entity = rich_product();
    let updated = EntityUpsertMutation::new(
        "product",
        Some(1),
        EntityExistence::MustExist,
        [
            LocalMutation::upsert_attribute("code", json!("B")),
            LocalMutation::upsert_attribute("stock", json!(5)),
            LocalMutation::remove_attribute("ean"),
            LocalMutation::remove_reference("category", 8),
        ],
    )
    .mutate(&schema(), Some(&entity))
    .unwrap();
    assert_eq!(updated.version(), entity.version() + 1);
    assert_eq!(updated.attribute("ean"), None);
    assert_eq!(updated.references().count(), 1);
}

#[test]
fn accepted_units_are_stamped_and_sorted() {
    let mut clock = DecisiveClock::starting_after(DecisiveTimestamp::new(10, 0));
    let mutation = EntityUpsertMutation::with_clock(
        "product",
        Some(1),
        EntityExistence::MayExist,
        [
            LocalMutation::upsert_attribute("name", json!("Chair")),
            LocalMutation::remove_attribute("code"),
        ],
        &mut clock,
    );
    let units = mutation.local_mutations();
    assert_eq!(units[0].kind(), MutationKind::RemoveAttribute);
    assert_eq!(units[1].kind(), MutationKind::UpsertAttribute);
    assert!(units.iter().all(|it| it.decisive_timestamp().is_some()));
    assert!(units[0].decisive_timestamp() > units[1].decisive_timestamp());
}

#[test]
fn later_unit_with_same_identity_replaces_earlier() {
    let mutation = EntityUpsertMutation::new(
        "product",
        Some(1),
        EntityExistence::MayExist,
        [
            LocalMutation::upsert_attribute("code", json!("A")),
            LocalMutation::upsert_attribute("code", json!("B")),
        ],
    );
    assert_eq!(mutation.local_mutations().len(), 1);
    let entity = mutation.mutate(&schema(), None).unwrap();
    assert_eq!(entity.attribute("code"), Some(&json!("B")));
}

#[test]
fn later_timestamp_wins_over_input_position() {
    let mutation = EntityUpsertMutation::new(
        "product",
        Some(1),
        EntityExistence::MayExist,
        [
            LocalMutation::upsert_attribute("code", json!("A"))
                .with_decisive_timestamp(DecisiveTimestamp::new(20, 0)),
            LocalMutation::upsert_attribute("code", json!("B"))
                .with_decisive_timestamp(DecisiveTimestamp::new(10, 0)),
        ],
    );
    assert_eq!(mutation.local_mutations().len(), 1);
    let entity = mutation.mutate(&schema(), None).unwrap();
    assert_eq!(entity.attribute("code"), Some(&json!("A")));
}

/// Serializes an upsert and writes its change-units back in reverse order.
fn reversed_on_disk(mutation: &EntityUpsertMutation) -> EntityUpsertMutation {
    let mut value = serde_json::to_value(mutation).unwrap();
    value["local_mutations"].as_array_mut().unwrap().reverse();
    serde_json::from_value(value).unwrap()
}

#[test]
fn deserialized_units_are_applied_in_order() {
    let entity = create(1, vec![LocalMutation::upsert_attribute("code", json!("A"))]);
    let mutation = EntityUpsertMutation::new(
        "product",
        Some(1),
        EntityExistence::MustExist,
        [
            LocalMutation::upsert_attribute("code", json!("B")),
            LocalMutation::remove_attribute("code"),
        ],
    );
    let parsed = reversed_on_disk(&mutation);
    assert_eq!(parsed.local_mutations()[0].kind(), MutationKind::UpsertAttribute);

    let ordered = parsed.ordered_mutations();
    assert_eq!(ordered.as_ref(), mutation.local_mutations());
    assert_eq!(ordered[0].kind(), MutationKind::RemoveAttribute);

    let updated = parsed.mutate(&schema(), Some(&entity)).unwrap();
    assert_eq!(updated.attribute("code"), Some(&json!("B")));
}

#[test]
fn deserialized_duplicates_are_collapsed() {
    let json = json!({
        "entity_type": "product",
        "primary_key": 1,
        "expects": "MAY_EXIST",
        "local_mutations": [
            { "change": { "kind": "upsert_attribute", "key": "code", "value": "A" } },
            { "change": { "kind": "upsert_attribute", "key": "code", "value": "B" } },
        ],
    });
    let parsed: EntityUpsertMutation = serde_json::from_value(json).unwrap();
    assert_eq!(parsed.local_mutations().len(), 2);
    assert_eq!(parsed.ordered_mutations().len(), 1);

    let entity = parsed.mutate(&schema(), None).unwrap();
    assert_eq!(entity.attribute("code"), Some(&json!("B")));
}

#[test]
fn accepted_units_are_borrowed_when_already_ordered() {
    let mutation = EntityUpsertMutation::new(
        "product",
        Some(1),
        EntityExistence::MayExist,
        [
            LocalMutation::upsert_attribute("name", json!("Chair")),
            LocalMutation::remove_attribute("code"),
        ],
    );
    assert!(matches!(mutation.ordered_mutations(), Cow::Borrowed(_)));
}

#[test]
fn failing_unit_aborts_the_fold() {
    let entity = create(1, vec![LocalMutation::upsert_attribute("code", json!("A"))]);
    let result = EntityUpsertMutation::new(
        "product",
        Some(1),
        EntityExistence::MustExist,
        [LocalMutation::remove_attribute("missing")],
    )
    .mutate(&schema(), Some(&entity));
    assert!(matches!(result, Err(MutationError::Model(_))));
}

// ── Removal synthesis ────────────────────────────────────────────

#[test]
fn teardown_counts_every_live_part() {
    let entity = rich_product();
    let teardown = removal_mutations(&entity);
    // parent + 2 references + 3 attributes + 1 associated data + handling + 2 prices
    assert_eq!(teardown.len(), 1 + 2 + 3 + 1 + 1 + 2);

    let kinds: Vec<_> = teardown.iter().map(LocalMutation::kind).collect();
    assert_eq!(kinds[0], MutationKind::RemoveParent);
    assert_eq!(kinds[1], MutationKind::RemoveReference);
    assert_eq!(kinds[3], MutationKind::RemoveAttribute);
    assert_eq!(kinds[6], MutationKind::RemoveAssociatedData);
    assert_eq!(kinds[7], MutationKind::SetPriceInnerRecordHandling);
    assert_eq!(kinds[8], MutationKind::RemovePrice);
}

#[test]
fn teardown_without_parent_skips_parent_removal() {
    let entity = create(1, vec![LocalMutation::upsert_attribute("code", json!("A"))]);
    let teardown = removal_mutations(&entity);
    assert_eq!(teardown.len(), 2);
    assert_eq!(teardown[0].kind(), MutationKind::RemoveAttribute);
}

#[test]
fn teardown_skips_already_removed_values() {
    let entity = rich_product();
    let entity = EntityUpsertMutation::new(
        "product",
        Some(1),
        EntityExistence::MustExist,
        [LocalMutation::remove_attribute("ean")],
    )
    .mutate(&schema(), Some(&entity))
    .unwrap();
    assert_eq!(removal_mutations(&entity).len(), 9);
}

#[test]
fn removal_tombstones_all_existing_data() {
    let entity = rich_product();
    let removed = EntityRemoveMutation::new("product", 1)
        .mutate(&schema(), Some(&entity))
        .unwrap();

    assert!(removed.is_dropped());
    assert_eq!(removed.version(), entity.version() + 1);
    assert_eq!(removed.parent(), None);
    assert_eq!(removed.references().count(), 0);
    assert_eq!(removed.attributes().count(), 0);
    assert_eq!(removed.associated_data_values().count(), 0);
    assert_eq!(removed.prices().count(), 0);
    assert_eq!(removed.price_inner_record_handling(), PriceInnerRecordHandling::None);

    for name in ["code", "name", "ean"] {
        assert!(removed.attribute_value(&AttributeKey::new(name)).unwrap().is_dropped());
    }
    assert!(
        removed
            .associated_data_value(&AssociatedDataKey::new("description"))
            .unwrap()
            .is_dropped()
    );
    assert!(removed.price_value(&PriceKey::new(2, "vip", "EUR")).unwrap().is_dropped());
    assert!(removed.parent_including_dropped().unwrap().is_dropped());
}

// ── Idempotent removal ───────────────────────────────────────────

#[test]
fn removing_a_removed_entity_is_a_no_op() {
    let entity = rich_product();
    let remove = EntityRemoveMutation::new("product", 1);
    let removed = remove.mutate(&schema(), Some(&entity)).unwrap();

    let again = remove.mutate(&schema(), Some(&removed)).unwrap();
    assert_eq!(again, removed);
    let once_more = remove.mutate(&schema(), Some(&again)).unwrap();
    assert_eq!(once_more, removed);
    assert!(remove.local_mutations(&removed).is_empty());
}

#[test]
fn removing_an_absent_entity_is_an_error() {
    let result = EntityRemoveMutation::new("product", 42).mutate(&schema(), None);
    assert!(matches!(
        result,
        Err(MutationError::RemovedEntityMissing { primary_key: 42, .. })
    ));
}

#[test]
fn remove_expects_may_exist() {
    let remove: EntityMutation = EntityRemoveMutation::new("product", 1).into();
    assert_eq!(remove.expects(), EntityExistence::MayExist);
    assert!(remove.stored_local_mutations().is_empty());
}

// ── End to end ───────────────────────────────────────────────────

#[test]
fn remove_product_with_code_and_reference() {
    let entity = create(
        7,
        vec![
            LocalMutation::upsert_attribute("code", json!("A")),
            LocalMutation::insert_reference("brand", 3, "brand"),
        ],
    );
    assert_eq!(removal_mutations(&entity).len(), 3);

    let removed = EntityMutation::from(EntityRemoveMutation::new("product", 7))
        .mutate(&schema(), Some(&entity))
        .unwrap();

    assert_eq!(removed.version(), entity.version() + 1);
    assert!(
        removed
            .reference_value(&ReferenceKey::new("brand", 3))
            .unwrap()
            .is_dropped()
    );
    assert!(removed.attribute_value(&AttributeKey::new("code")).unwrap().is_dropped());
    assert_eq!(removed.price_inner_record_handling(), PriceInnerRecordHandling::None);
}

// ── Serde ────────────────────────────────────────────────────────

#[test]
fn entity_mutation_serde_roundtrip() {
    let mutation: EntityMutation = EntityUpsertMutation::new(
        "product",
        Some(7),
        EntityExistence::MayExist,
        [
            LocalMutation::upsert_attribute("code", json!("A")),
            LocalMutation::upsert_price(
                PriceKey::new(1, "basic", "EUR"),
                Price::indexed(10.0, 21.0),
            ),
        ],
    )
    .into();
    let json = serde_json::to_string(&mutation).unwrap();
    let parsed: EntityMutation = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed, mutation);
}
