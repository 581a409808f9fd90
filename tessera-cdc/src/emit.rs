//! Rendering of mutations into capture sequences.

use crate::capture::{
    CaptureArea, CaptureBody, ChangeCapture, ContentMode, Operation, TransactionMutation,
};
use crate::context::{StreamDirection, TraversalContext};
use crate::predicate::CapturePredicate;
use tessera_model::ModifyEntitySchemaMutation;
use tessera_mutation::{EntityMutation, LocalMutation};
use tessera_types::ContainerKind;

/// A mutation that can be rendered as change-data-capture events.
pub trait ToCapture {
    /// Renders the captures the predicate accepts, in traversal order.
    fn to_capture(
        &self,
        context: &mut TraversalContext,
        predicate: &dyn CapturePredicate,
        content: ContentMode,
    ) -> Vec<ChangeCapture>;
}

fn header(
    context: &TraversalContext,
    area: CaptureArea,
    operation: Operation,
    container_kind: ContainerKind,
) -> ChangeCapture {
    ChangeCapture {
        version: context.version(),
        index: context.index(),
        area,
        entity_type: context.entity_type().map(str::to_string),
        entity_primary_key: context.primary_key(),
        operation,
        container_kind,
        body: None,
    }
}

fn emit(
    capture: ChangeCapture,
    predicate: &dyn CapturePredicate,
    content: ContentMode,
    body: impl FnOnce() -> CaptureBody,
) -> Option<ChangeCapture> {
    predicate
        .test(&capture)
        .then(|| capture.with_content(content, body))
}

impl ToCapture for LocalMutation {
    fn to_capture(
        &self,
        context: &mut TraversalContext,
        predicate: &dyn CapturePredicate,
        content: ContentMode,
    ) -> Vec<ChangeCapture> {
        let operation = if self.is_removal() {
            Operation::Remove
        } else {
            Operation::Upsert
        };
        let capture = header(context, CaptureArea::Data, operation, self.container_kind());
        emit(capture, predicate, content, || CaptureBody::Local(self.clone()))
            .into_iter()
            .collect()
    }
}

impl ToCapture for EntityMutation {
    /// The entity event brackets its change-unit events on the side the
    /// stream is read from: `[entity, u1..un]` forward, `[un..u1, entity]`
    /// in reverse.
    fn to_capture(
        &self,
        context: &mut TraversalContext,
        predicate: &dyn CapturePredicate,
        content: ContentMode,
    ) -> Vec<ChangeCapture> {
        context.advance();
        context.set_entity(self.entity_type(), self.primary_key());

        let operation = if self.is_removal() {
            Operation::Remove
        } else {
            Operation::Upsert
        };
        let entity = emit(
            header(context, CaptureArea::Data, operation, ContainerKind::Entity),
            predicate,
            content,
            || CaptureBody::Entity(self.clone()),
        );
        let locals = self.stored_local_mutations();

        let mut captures = Vec::with_capacity(locals.len() + 1);
        match context.direction() {
            StreamDirection::Forward => {
                captures.extend(entity);
                for local in locals {
                    captures.extend(local.to_capture(context, predicate, content));
                }
            }
            StreamDirection::Reverse => {
                for local in locals.iter().rev() {
                    captures.extend(local.to_capture(context, predicate, content));
                }
                captures.extend(entity);
            }
        }
        captures
    }
}

impl ToCapture for ModifyEntitySchemaMutation {
    fn to_capture(
        &self,
        context: &mut TraversalContext,
        predicate: &dyn CapturePredicate,
        content: ContentMode,
    ) -> Vec<ChangeCapture> {
        context.advance();
        context.set_entity(self.entity_type.clone(), None);
        let capture =
            header(context, CaptureArea::Schema, Operation::Upsert, ContainerKind::Entity);
        emit(capture, predicate, content, || CaptureBody::Schema(self.clone()))
            .into_iter()
            .collect()
    }
}

impl ToCapture for TransactionMutation {
    /// Rendered at the current position; the caller places the context on
    /// the header index first.
    fn to_capture(
        &self,
        context: &mut TraversalContext,
        predicate: &dyn CapturePredicate,
        content: ContentMode,
    ) -> Vec<ChangeCapture> {
        let capture = header(
            context,
            CaptureArea::Infrastructure,
            Operation::Transaction,
            ContainerKind::Entity,
        );
        emit(capture, predicate, content, || CaptureBody::Transaction(self.clone()))
            .into_iter()
            .collect()
    }
}
