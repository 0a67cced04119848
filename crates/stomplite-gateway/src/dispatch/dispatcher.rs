//! Command -> handler callback routing with fault containment.

use std::future::Future;
use std::panic::AssertUnwindSafe;

use futures_util::FutureExt;

use stomplite_core::error::{Result, StompError};
use stomplite_core::{Command, Frame};

use super::handler::StompServerHandler;

/// Route a post-CONNECT command frame to the matching handler callback.
///
/// Handler panics are caught and reported as [`StompError::Handler`].
pub async fn dispatch(handler: &dyn StompServerHandler, frame: Frame) -> Result<()> {
    let command = frame.command;
    let call = async move {
        match command {
            Command::Send => handler.send(frame).await,
            Command::Subscribe => handler.subscribe(frame).await,
            Command::Unsubscribe => handler.unsubscribe(frame).await,
            Command::Begin => handler.begin(frame).await,
            Command::Abort => handler.abort(frame).await,
            Command::Commit => handler.commit(frame).await,
            Command::Ack => handler.ack(frame).await,
            Command::Nack => handler.nack(frame).await,
            other => Err(StompError::Internal(format!(
                "{other} is not routed to the handler"
            ))),
        }
    };
    guarded(command.as_str(), call).await
}

/// Await a handler future, turning a panic into an error.
pub(crate) async fn guarded<T, F>(what: &str, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match AssertUnwindSafe(fut).catch_unwind().await {
        Ok(res) => res,
        Err(_) => Err(StompError::Handler(format!("{what} callback panicked"))),
    }
}

/// Run a synchronous handler notification, turning a panic into an error.
pub(crate) fn guarded_sync(what: &str, f: impl FnOnce()) -> Result<()> {
    std::panic::catch_unwind(AssertUnwindSafe(f))
        .map_err(|_| StompError::Handler(format!("{what} callback panicked")))
}
