//! Product lifecycle saga.
//!
//! Creating or deleting a product with an image spans two services that
//! share no database: the product store owns the row and its status, the
//! image service owns the binary. This crate keeps them consistent:
//!
//! - [`SagaInitiator`] publishes an intent and waits, bounded by a timeout
//!   and a cancellation token, for the completion carrying its correlation id
//! - [`SagaCoordinator`] drives the product store through guarded
//!   transitions, waits for the image service with its own timeout and
//!   compensates on failure
//! - [`Reconciler`] repairs rows left in `pending` or `deleting` by sagas
//!   that never finished
//!
//! Replies are matched to requests through a [`CompletionRegistry`] keyed by
//! correlation id.

pub mod coordinator;
pub mod error;
pub mod initiator;
pub mod reconciler;
pub mod registry;
pub mod state;

pub use coordinator::{CoordinatorConfig, SagaCoordinator, SagaRecord};
pub use error::{InitiatorError, Result, SagaError};
pub use initiator::{CreateProductRequest, InitiatorConfig, SagaInitiator, SagaOutcome};
pub use reconciler::{ReconcileReport, Reconciler, ReconcilerConfig};
pub use registry::{CompletionRegistry, Pending};
pub use state::SagaState;
