//! Sequences: ordered, replayable chains of mediators.

use tracing::{debug, error};

use super::mediator::{Mediator, MediatorError};
use super::Position;
use crate::mediation::MediationContext;
use crate::message::MessageContext;

/// An ordered list of mediators.
///
/// A sequence is a stateless template; all per-message state lives in the
/// [`MessageContext`] passed through it. Named sequences are top-level
/// artifacts; anonymous ones (empty `name`) fill the in/fault slots of a
/// resource.
#[derive(Debug, Clone, Default)]
pub struct Sequence {
    pub name: String,
    pub mediators: Vec<Mediator>,
    pub position: Position,
}

impl Sequence {
    /// Execute the chain in declaration order.
    ///
    /// A mediator error is logged with its source position and stops the
    /// chain; the sequence succeeds iff every mediator asked to continue.
    pub async fn execute(&self, msg: &mut MessageContext, ctx: &MediationContext) -> bool {
        for mediator in &self.mediators {
            match mediator.execute(msg, ctx).await {
                Ok(true) => {}
                Ok(false) => return false,
                Err(MediatorError::Cancelled) => {
                    debug!(
                        target: "flowgate::mediation",
                        position = %mediator.position(),
                        "mediator cancelled, stopping chain"
                    );
                    return false;
                }
                Err(err) => {
                    error!(
                        target: "flowgate::mediation",
                        position = %mediator.position(),
                        error = %err,
                        "mediator failed"
                    );
                    return false;
                }
            }
        }
        true
    }
}
