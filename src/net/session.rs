//! Session participant registry and authority tracking.
//!
//! Exactly one participant is the authority at any time; its simulation
//! state is ground truth. The actual wire transport is an external
//! collaborator: encoded messages accumulate in an outbox the transport
//! drains, and inbound messages are handed to the game loop by the host.

use hashbrown::HashMap;
use tracing::{info, warn};
use uuid::Uuid;

use crate::net::protocol::ServerMessage;
use crate::net::replication::Target;

/// A connected human participant
#[derive(Debug, Clone)]
pub struct Participant {
    pub actor_id: i32,
    pub name: String,
    pub session_token: Vec<u8>,
}

/// Per-process session state
pub struct Session {
    participants: HashMap<i32, Participant>,
    next_actor_id: i32,
    authority: Option<i32>,
    local_actor: i32,
    capacity: usize,
    outbox: Vec<(Target, ServerMessage)>,
}

impl Session {
    /// Create a session hosted by this process; the local participant
    /// gets actor id 1 and starts as the authority.
    pub fn host(local_name: &str, capacity: usize) -> Self {
        let mut participants = HashMap::new();
        participants.insert(
            1,
            Participant {
                actor_id: 1,
                name: local_name.to_string(),
                session_token: Uuid::new_v4().as_bytes().to_vec(),
            },
        );
        Self {
            participants,
            next_actor_id: 2,
            authority: Some(1),
            local_actor: 1,
            capacity: capacity.max(1),
            outbox: Vec::new(),
        }
    }

    /// Create the session view of a non-hosting participant. The local
    /// actor id and the current authority come from the join handshake.
    pub fn replica(local_actor: i32, authority: i32, capacity: usize) -> Self {
        Self {
            participants: HashMap::new(),
            next_actor_id: 1,
            authority: Some(authority),
            local_actor,
            capacity: capacity.max(1),
            outbox: Vec::new(),
        }
    }

    /// Adopt a newly announced authority (from `AuthorityChanged`)
    pub fn set_authority(&mut self, actor_id: i32) {
        self.authority = Some(actor_id);
    }

    /// Admit a participant, assign an actor id and a session token, and
    /// queue the acceptance. Full sessions reject.
    pub fn try_join(&mut self, name: &str) -> Result<i32, String> {
        if self.participants.len() >= self.capacity {
            return Err(format!(
                "Session at capacity ({} participants). Please try again later.",
                self.participants.len()
            ));
        }

        let actor_id = self.next_actor_id;
        self.next_actor_id += 1;

        let session_token = Uuid::new_v4().as_bytes().to_vec();
        self.participants.insert(
            actor_id,
            Participant {
                actor_id,
                name: name.to_string(),
                session_token: session_token.clone(),
            },
        );
        info!("Participant {} ({}) joined the session", name, actor_id);

        self.send(
            Target::Actor(actor_id),
            ServerMessage::JoinAccepted {
                actor_id,
                session_token,
            },
        );
        Ok(actor_id)
    }

    /// Remove a participant. If the authority left, the lowest surviving
    /// actor id is promoted so every participant agrees on the successor
    /// without negotiation. Returns the removed participant and the newly
    /// promoted authority, if promotion happened.
    pub fn leave(&mut self, actor_id: i32) -> (Option<Participant>, Option<i32>) {
        let removed = self.participants.remove(&actor_id);
        if removed.is_none() {
            warn!("Leave for unknown participant {}", actor_id);
            return (None, None);
        }

        let mut promoted = None;
        if self.authority == Some(actor_id) {
            promoted = self.promote_successor();
        }
        (removed, promoted)
    }

    fn promote_successor(&mut self) -> Option<i32> {
        let successor = self.participants.keys().min().copied();
        self.authority = successor;
        match successor {
            Some(actor_id) => {
                info!("Authority handed to participant {}", actor_id);
                self.send(
                    Target::Everyone,
                    ServerMessage::AuthorityChanged { actor_id },
                );
            }
            None => warn!("Session has no participants left to promote"),
        }
        successor
    }

    pub fn authority(&self) -> Option<i32> {
        self.authority
    }

    pub fn local_actor(&self) -> i32 {
        self.local_actor
    }

    /// Whether this process is currently the authority
    pub fn is_authority(&self) -> bool {
        self.authority == Some(self.local_actor)
    }

    pub fn participant(&self, actor_id: i32) -> Option<&Participant> {
        self.participants.get(&actor_id)
    }

    pub fn participant_count(&self) -> usize {
        self.participants.len()
    }

    pub fn participants(&self) -> impl Iterator<Item = &Participant> {
        self.participants.values()
    }

    /// Queue a message for the transport layer
    pub fn send(&mut self, target: Target, message: ServerMessage) {
        self.outbox.push((target, message));
    }

    /// Hand queued messages to the transport layer
    pub fn drain_outbox(&mut self) -> Vec<(Target, ServerMessage)> {
        std::mem::take(&mut self.outbox)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_host_is_authority() {
        let session = Session::host("Host", 8);
        assert_eq!(session.local_actor(), 1);
        assert!(session.is_authority());
        assert_eq!(session.participant_count(), 1);
    }

    #[test]
    fn test_join_assigns_sequential_ids() {
        let mut session = Session::host("Host", 8);
        let a = session.try_join("Alice").unwrap();
        let b = session.try_join("Bob").unwrap();
        assert_eq!(a, 2);
        assert_eq!(b, 3);
    }

    #[test]
    fn test_join_tokens_are_unique() {
        let mut session = Session::host("Host", 8);
        let a = session.try_join("Alice").unwrap();
        let b = session.try_join("Bob").unwrap();
        let token_a = session.participant(a).unwrap().session_token.clone();
        let token_b = session.participant(b).unwrap().session_token.clone();
        assert_ne!(token_a, token_b);
    }

    #[test]
    fn test_full_session_rejects() {
        let mut session = Session::host("Host", 2);
        session.try_join("Alice").unwrap();
        assert!(session.try_join("Late").is_err());
    }

    #[test]
    fn test_join_queues_acceptance() {
        let mut session = Session::host("Host", 8);
        session.drain_outbox();
        let actor = session.try_join("Alice").unwrap();

        let outbox = session.drain_outbox();
        assert_eq!(outbox.len(), 1);
        match &outbox[0] {
            (Target::Actor(to), ServerMessage::JoinAccepted { actor_id, .. }) => {
                assert_eq!(*to, actor);
                assert_eq!(*actor_id, actor);
            }
            other => panic!("unexpected message {other:?}"),
        }
    }

    #[test]
    fn test_authority_promotion_on_leave() {
        let mut session = Session::host("Host", 8);
        let alice = session.try_join("Alice").unwrap();
        let bob = session.try_join("Bob").unwrap();
        session.drain_outbox();

        let (removed, promoted) = session.leave(1);
        assert!(removed.is_some());
        // Lowest surviving id wins
        assert_eq!(promoted, Some(alice));
        assert_eq!(session.authority(), Some(alice));
        assert!(!session.is_authority());

        let outbox = session.drain_outbox();
        assert!(outbox.iter().any(|(target, msg)| matches!(
            (target, msg),
            (Target::Everyone, ServerMessage::AuthorityChanged { actor_id }) if *actor_id == alice
        )));

        let (_, promoted) = session.leave(alice);
        assert_eq!(promoted, Some(bob));
    }

    #[test]
    fn test_non_authority_leave_does_not_promote() {
        let mut session = Session::host("Host", 8);
        let alice = session.try_join("Alice").unwrap();
        let (removed, promoted) = session.leave(alice);
        assert!(removed.is_some());
        assert_eq!(promoted, None);
        assert!(session.is_authority());
    }

    #[test]
    fn test_unknown_leave_is_harmless() {
        let mut session = Session::host("Host", 8);
        let (removed, promoted) = session.leave(42);
        assert!(removed.is_none());
        assert_eq!(promoted, None);
    }
}
