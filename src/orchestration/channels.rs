//! # Callback Channels
//!
//! Strongly-typed wrappers around the mpsc channel that carries child
//! completions back into the orchestrator. Collaborators that finish work on
//! the orchestrator's behalf hold a [`CallbackSender`]; the orchestrator
//! drains the matching [`CallbackReceiver`] in its callback listener.

use crate::services::{ChildOutcome, ServiceTaskCallback};
use tokio::sync::mpsc;

/// A child's terminal outcome addressed to a removal task
#[derive(Debug, Clone, PartialEq)]
pub struct CallbackDelivery {
    pub callback: ServiceTaskCallback,
    pub outcome: ChildOutcome,
}

#[derive(Debug, Clone)]
pub struct CallbackSender(pub(crate) mpsc::Sender<CallbackDelivery>);

#[derive(Debug)]
pub struct CallbackReceiver(pub(crate) mpsc::Receiver<CallbackDelivery>);

impl CallbackSender {
    pub async fn send(
        &self,
        callback: ServiceTaskCallback,
        outcome: ChildOutcome,
    ) -> Result<(), mpsc::error::SendError<CallbackDelivery>> {
        self.0.send(CallbackDelivery { callback, outcome }).await
    }

    pub fn is_closed(&self) -> bool {
        self.0.is_closed()
    }
}

impl CallbackReceiver {
    pub async fn recv(&mut self) -> Option<CallbackDelivery> {
        self.0.recv().await
    }
}

pub struct ChannelFactory;

impl ChannelFactory {
    pub fn callback_channel(buffer_size: usize) -> (CallbackSender, CallbackReceiver) {
        let (tx, rx) = mpsc::channel(buffer_size.max(1));
        (CallbackSender(tx), CallbackReceiver(rx))
    }
}
