use pretty_assertions::assert_eq;
use serde_json::json;
use std::cell::Cell;
use tessera_cdc::{
    AcceptAll, CaptureArea, CaptureBody, CaptureCriteria, CaptureRequest, CdcError,
    ChangeCapture, CommittedTransaction, ContentMode, Operation, StreamDirection, ToCapture,
    TraversalContext, capture_stream,
};
use tessera_model::{CatalogSchema, Price};
use tessera_mutation::{
    Catalog, EntityExistence, EntityMutation, EntityRemoveMutation, EntityUpsertMutation,
    LocalMutation, MutationOrigin,
};
use tessera_types::{ContainerKind, PriceKey};

fn product_upsert() -> EntityMutation {
    EntityUpsertMutation::new(
        "product",
        Some(7),
        EntityExistence::MayExist,
        [
            LocalMutation::remove_attribute("ean"),
            LocalMutation::upsert_attribute("code", json!("A")),
            LocalMutation::upsert_price(
                PriceKey::new(1, "basic", "EUR"),
                Price::indexed(10.0, 21.0),
            ),
        ],
    )
    .into()
}

fn empty_upsert(primary_key: i32) -> EntityMutation {
    EntityUpsertMutation::new("product", Some(primary_key), EntityExistence::MayExist, []).into()
}

fn render(
    mutation: &EntityMutation,
    direction: StreamDirection,
    content: ContentMode,
) -> Vec<ChangeCapture> {
    let mut context = TraversalContext::new(direction);
    context.set_version(5, 1);
    mutation.to_capture(&mut context, &AcceptAll, content)
}

fn bodies(captures: &[ChangeCapture]) -> Vec<&CaptureBody> {
    captures.iter().filter_map(|it| it.body.as_ref()).collect()
}

// ── Entity mutation composition ──────────────────────────────────

#[test]
fn entity_event_brackets_units_on_the_read_side() {
    let mutation = product_upsert();
    let forward = render(&mutation, StreamDirection::Forward, ContentMode::Body);
    let reverse = render(&mutation, StreamDirection::Reverse, ContentMode::Body);

    assert_eq!(forward.len(), 4);
    assert_eq!(forward[0].container_kind, ContainerKind::Entity);
    assert_eq!(forward[0].body, Some(CaptureBody::Entity(mutation.clone())));
    let units = mutation.stored_local_mutations();
    for (capture, unit) in forward[1..].iter().zip(units) {
        assert_eq!(capture.body, Some(CaptureBody::Local(unit.clone())));
    }

    let mut reversed = forward.clone();
    reversed.reverse();
    assert_eq!(reverse, reversed);
}

#[test]
fn unit_captures_carry_entity_and_operation() {
    let captures = render(&product_upsert(), StreamDirection::Forward, ContentMode::Header);
    assert!(captures.iter().all(|it| it.entity_type.as_deref() == Some("product")));
    assert!(captures.iter().all(|it| it.entity_primary_key == Some(7)));
    assert!(captures.iter().all(|it| it.index == 1 && it.version == 5));

    let operations: Vec<_> = captures.iter().map(|it| it.operation).collect();
    assert_eq!(
        operations,
        vec![Operation::Upsert, Operation::Remove, Operation::Upsert, Operation::Upsert]
    );
    assert_eq!(captures[3].container_kind, ContainerKind::Price);
}

#[test]
fn header_mode_omits_bodies() {
    let captures = render(&product_upsert(), StreamDirection::Forward, ContentMode::Header);
    assert_eq!(captures.len(), 4);
    assert!(bodies(&captures).is_empty());
}

#[test]
fn predicate_sees_header_only() {
    let tested = Cell::new(0);
    let predicate = |capture: &ChangeCapture| {
        tested.set(tested.get() + 1);
        assert!(capture.body.is_none());
        capture.container_kind != ContainerKind::Attribute
    };
    let mut context = TraversalContext::new(StreamDirection::Forward);
    let captures = product_upsert().to_capture(&mut context, &predicate, ContentMode::Body);

    assert_eq!(tested.get(), 4);
    assert_eq!(captures.len(), 2);
    assert_eq!(bodies(&captures).len(), 2);
}

#[test]
fn removal_renders_entity_event_only() {
    let remove: EntityMutation = EntityRemoveMutation::new("product", 7).into();
    let captures = render(&remove, StreamDirection::Forward, ContentMode::Header);
    assert_eq!(captures.len(), 1);
    assert_eq!(captures[0].operation, Operation::Remove);
    assert_eq!(captures[0].container_kind, ContainerKind::Entity);
}

// ── Transactions ─────────────────────────────────────────────────

fn transaction(
    version: u64,
    mutations: impl IntoIterator<Item = EntityMutation>,
) -> CommittedTransaction {
    let mut transaction = CommittedTransaction::new(version);
    for mutation in mutations {
        transaction.push(mutation);
    }
    transaction
}

fn positions(captures: &[ChangeCapture]) -> Vec<(u64, u32, Operation)> {
    captures.iter().map(|it| (it.version, it.index, it.operation)).collect()
}

#[test]
fn transaction_header_leads_forward_and_closes_reverse() {
    let mutations: [EntityMutation; 2] = [
        EntityUpsertMutation::new("product", Some(1), EntityExistence::MayExist, [
            LocalMutation::upsert_attribute("code", json!("A")),
        ])
        .into(),
        EntityRemoveMutation::new("product", 2).into(),
    ];
    let transactions = [transaction(3, mutations)];
    let request = CaptureRequest::default();

    let forward = capture_stream(&transactions, &request, StreamDirection::Forward).unwrap();
    assert_eq!(
        positions(&forward),
        vec![
            (3, 0, Operation::Transaction),
            (3, 1, Operation::Upsert),
            (3, 1, Operation::Upsert),
            (3, 2, Operation::Remove),
        ]
    );
    assert_eq!(forward[0].area, CaptureArea::Infrastructure);

    let reverse = capture_stream(&transactions, &request, StreamDirection::Reverse).unwrap();
    let mut expected = positions(&forward);
    expected.reverse();
    assert_eq!(positions(&reverse), expected);
}

#[test]
fn header_body_carries_transaction_metadata() {
    let transactions = [transaction(3, [empty_upsert(1), empty_upsert(2)])];
    let request = CaptureRequest {
        content: ContentMode::Body,
        ..CaptureRequest::default()
    };
    let captures = capture_stream(&transactions, &request, StreamDirection::Forward).unwrap();
    let Some(CaptureBody::Transaction(header)) = &captures[0].body else {
        panic!("expected a transaction header");
    };
    assert_eq!(header.version, 3);
    assert_eq!(header.mutation_count, 2);
    assert_eq!(header.transaction_id, transactions[0].header().transaction_id);
}

fn versioned_log() -> Vec<CommittedTransaction> {
    [99, 100, 101]
        .into_iter()
        .map(|version| transaction(version, (1..=10).map(empty_upsert)))
        .collect()
}

fn since(version: u64, index: u32) -> CaptureRequest {
    CaptureRequest {
        since_version: Some(version),
        since_index: Some(index),
        ..CaptureRequest::default()
    }
}

#[test]
fn forward_stream_starts_at_since_position() {
    let captures =
        capture_stream(&versioned_log(), &since(100, 5), StreamDirection::Forward).unwrap();
    let seen = positions(&captures);

    assert!(seen.iter().all(|(version, _, _)| *version >= 100));
    assert_eq!(seen.first(), Some(&(100, 5, Operation::Upsert)));
    assert_eq!(seen.iter().filter(|(version, _, _)| *version == 100).count(), 6);
    assert_eq!(seen.iter().filter(|(version, _, _)| *version == 101).count(), 11);
}

#[test]
fn reverse_stream_ends_at_since_position() {
    let captures =
        capture_stream(&versioned_log(), &since(100, 5), StreamDirection::Reverse).unwrap();
    let seen = positions(&captures);

    assert!(seen.iter().all(|(version, _, _)| *version <= 100));
    assert_eq!(seen.first(), Some(&(100, 5, Operation::Upsert)));
    assert_eq!(seen.iter().filter(|(version, _, _)| *version == 100).count(), 6);
    assert_eq!(seen.iter().filter(|(version, _, _)| *version == 99).count(), 11);
}

#[test]
fn since_version_alone_starts_at_header() {
    let request = CaptureRequest {
        since_version: Some(101),
        ..CaptureRequest::default()
    };
    let captures = capture_stream(&versioned_log(), &request, StreamDirection::Forward).unwrap();
    assert_eq!(captures.len(), 11);
    assert_eq!(captures[0].operation, Operation::Transaction);
}

#[test]
fn index_without_version_is_rejected() {
    let request = CaptureRequest {
        since_index: Some(3),
        ..CaptureRequest::default()
    };
    let err = capture_stream(&versioned_log(), &request, StreamDirection::Forward).unwrap_err();
    assert_eq!(err, CdcError::IndexWithoutVersion(3));
}

// ── Criteria ─────────────────────────────────────────────────────

fn catalog_log() -> Vec<CommittedTransaction> {
    let mut catalog = Catalog::new(CatalogSchema::new("shop"));
    let mut transaction = CommittedTransaction::new(1);
    let product: EntityMutation = EntityUpsertMutation::new(
        "product",
        Some(7),
        EntityExistence::MustNotExist,
        [
            LocalMutation::upsert_attribute("code", json!("A")),
            LocalMutation::upsert_price(
                PriceKey::new(1, "basic", "EUR"),
                Price::indexed(10.0, 21.0),
            ),
        ],
    )
    .into();
    for mutation in [
        product,
        EntityUpsertMutation::new("brand", Some(3), EntityExistence::MayExist, [
            LocalMutation::upsert_attribute("name", json!("Acme")),
        ])
        .into(),
    ] {
        let applied = catalog.apply(mutation, MutationOrigin::Client).unwrap();
        transaction.record(&applied);
    }

    let mut removal = CommittedTransaction::new(2);
    let remove: EntityMutation = EntityRemoveMutation::new("brand", 3).into();
    let applied = catalog.apply(remove, MutationOrigin::Client).unwrap();
    removal.record(&applied);
    vec![transaction, removal]
}

fn matching(criteria: CaptureCriteria) -> Vec<ChangeCapture> {
    let request = CaptureRequest {
        criteria: vec![criteria],
        ..CaptureRequest::default()
    };
    capture_stream(&catalog_log(), &request, StreamDirection::Forward).unwrap()
}

#[test]
fn recorded_transaction_includes_schema_changes() {
    let log = catalog_log();
    assert_eq!(log[0].mutations().len(), 4);
    assert_eq!(log[1].mutations().len(), 1);
}

#[test]
fn recorded_generated_key_insert_carries_assigned_key() {
    let mut catalog = Catalog::new(CatalogSchema::new("shop"));
    let mut transaction = CommittedTransaction::new(1);
    let insert = EntityUpsertMutation::new("product", None, EntityExistence::MustNotExist, [
        LocalMutation::upsert_attribute("code", json!("A")),
    ]);
    let applied = catalog.apply(insert.into(), MutationOrigin::Client).unwrap();
    transaction.record(&applied);

    let request = CaptureRequest {
        criteria: vec![CaptureCriteria::area(CaptureArea::Data).with_entity_type("product")],
        ..CaptureRequest::default()
    };
    let captures = capture_stream(&[transaction], &request, StreamDirection::Forward).unwrap();
    assert!(!captures.is_empty());
    assert!(captures.iter().all(|it| it.entity_primary_key == Some(1)));
}

#[test]
fn schema_area_criteria() {
    let captures = matching(CaptureCriteria::area(CaptureArea::Schema));
    assert_eq!(captures.len(), 2);
    assert!(captures.iter().all(|it| it.area == CaptureArea::Schema));
    assert_eq!(captures[0].entity_type.as_deref(), Some("product"));
}

#[test]
fn entity_type_and_operation_criteria() {
    let captures = matching(
        CaptureCriteria::area(CaptureArea::Data)
            .with_entity_type("brand")
            .with_operation(Operation::Remove),
    );
    assert_eq!(captures.len(), 1);
    assert_eq!(captures[0].entity_primary_key, Some(3));
    assert_eq!(captures[0].version, 2);
}

#[test]
fn container_kind_criteria() {
    let captures = matching(CaptureCriteria::default().with_container_kind(ContainerKind::Price));
    assert_eq!(captures.len(), 1);
    assert_eq!(captures[0].entity_type.as_deref(), Some("product"));
}

#[test]
fn any_criteria_may_match() {
    let request = CaptureRequest {
        criteria: vec![
            CaptureCriteria::default()
                .with_primary_key(7)
                .with_container_kind(ContainerKind::Entity),
            CaptureCriteria::area(CaptureArea::Infrastructure),
        ],
        ..CaptureRequest::default()
    };
    let captures = capture_stream(&catalog_log(), &request, StreamDirection::Forward).unwrap();
    let operations: Vec<_> = captures.iter().map(|it| it.operation).collect();
    assert_eq!(
        operations,
        vec![Operation::Transaction, Operation::Upsert, Operation::Transaction]
    );
}

#[test]
fn capture_serde_roundtrip() {
    let captures = render(&product_upsert(), StreamDirection::Forward, ContentMode::Body);
    let json = serde_json::to_string(&captures).unwrap();
    let parsed: Vec<ChangeCapture> = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed, captures);
}
