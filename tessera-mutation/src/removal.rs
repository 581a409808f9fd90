//! Teardown synthesis for entity removal.

use crate::local::{LocalChange, LocalMutation};
use tessera_model::{Entity, PriceInnerRecordHandling};

/// Computes the change-units that tombstone every live part of `entity`.
///
/// Always regenerated from the given snapshot so that data written earlier in
/// the same logical write is included. Order: parent, references, attributes,
/// associated data, price inner record handling reset, prices.
#[must_use]
pub fn removal_mutations(entity: &Entity) -> Vec<LocalMutation> {
    let parent = entity.parent().map(|_| LocalMutation::remove_parent());
    let references = entity
        .references()
        .map(|(key, _)| LocalMutation::from(LocalChange::RemoveReference { key: key.clone() }));
    let attributes = entity
        .attributes()
        .map(|(key, _)| LocalMutation::from(LocalChange::RemoveAttribute { key: key.clone() }));
    let associated_data = entity
        .associated_data_values()
        .map(|(key, _)| {
            LocalMutation::from(LocalChange::RemoveAssociatedData { key: key.clone() })
        });
    let handling = LocalMutation::set_price_inner_record_handling(PriceInnerRecordHandling::None);
    let prices = entity
        .prices()
        .map(|(key, _)| LocalMutation::from(LocalChange::RemovePrice { key: key.clone() }));

    parent
        .into_iter()
        .chain(references)
        .chain(attributes)
        .chain(associated_data)
        .chain(std::iter::once(handling))
        .chain(prices)
        .collect()
}
