//! Dispatch rules from a command to the peer

use crate::transport::{Command, ReplySender, TransportPeer};
use tokio::sync::oneshot;

/// Hand one command to the peer.
///
/// Unconfirmed logs are fire-and-forget messages; everything else is a call.
/// A stream or query filter without an origin is scoped to `user`.
pub(crate) fn dispatch(
    peer: &dyn TransportPeer,
    user: &str,
    command: Command,
    reply: Option<ReplySender>,
) {
    let command = with_origin(command, user);
    match (command, reply) {
        (command @ Command::Log(_), None) => peer.send(command),
        (command, Some(reply)) => peer.call(command, reply),
        (command, None) => {
            // Nobody waits for the result
            let (reply, _) = oneshot::channel();
            peer.call(command, reply);
        }
    }
}

fn with_origin(command: Command, user: &str) -> Command {
    match command {
        Command::SetStream(mut set) => {
            set.filter.origin.get_or_insert_with(|| user.to_string());
            Command::SetStream(set)
        }
        Command::Query(mut request) => {
            request.query.origin.get_or_insert_with(|| user.to_string());
            Command::Query(request)
        }
        other => other,
    }
}
