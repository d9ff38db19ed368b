// Copyright 2026 Hypermesh Foundation. All rights reserved.
// APFlow Wireless Balancing Engine - External Commands

//! Commands from outside the engine, queued between ticks.
//!
//! A command is validated when submitted and again when the queue is drained
//! at the next tick boundary, since an earlier command in the same batch may
//! have invalidated it (a user removed twice, say). The queue is FIFO.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::config::CampusConfig;
use crate::types::{ApId, Band, Position, UserId};

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CommandError {
    #[error("unknown user {0}")]
    UnknownUser(UserId),

    #[error("unknown access point {0}")]
    UnknownAccessPoint(ApId),

    #[error("position {0} is outside the campus")]
    OutOfBounds(Position),

    #[error("airtime demand {0} must be positive and finite")]
    InvalidDemand(f64),

    #[error("engine is not accepting commands")]
    NotAccepting,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Command {
    #[serde(rename_all = "camelCase")]
    AddUser {
        position: Position,
        #[serde(default)]
        airtime_demand: Option<f64>,
    },
    RemoveUser {
        id: UserId,
    },
    SetBand {
        ap: ApId,
        band: Band,
    },
    Relocate {
        id: UserId,
        position: Position,
    },
}

impl Command {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::AddUser { .. } => "add-user",
            Self::RemoveUser { .. } => "remove-user",
            Self::SetBand { .. } => "set-band",
            Self::Relocate { .. } => "relocate",
        }
    }

    /// Check the command against the model as the caller currently sees it.
    pub fn validate(
        &self,
        campus: &CampusConfig,
        user_known: impl Fn(UserId) -> bool,
        ap_known: impl Fn(ApId) -> bool,
    ) -> Result<(), CommandError> {
        match *self {
            Self::AddUser { position, airtime_demand } => {
                if !campus.contains(&position) {
                    return Err(CommandError::OutOfBounds(position));
                }
                match airtime_demand {
                    Some(d) if !(d.is_finite() && d > 0.0) => Err(CommandError::InvalidDemand(d)),
                    _ => Ok(()),
                }
            }
            Self::RemoveUser { id } if !user_known(id) => Err(CommandError::UnknownUser(id)),
            Self::RemoveUser { .. } => Ok(()),
            Self::SetBand { ap, .. } if !ap_known(ap) => Err(CommandError::UnknownAccessPoint(ap)),
            Self::SetBand { .. } => Ok(()),
            Self::Relocate { id, .. } if !user_known(id) => Err(CommandError::UnknownUser(id)),
            Self::Relocate { position, .. } if !campus.contains(&position) => {
                Err(CommandError::OutOfBounds(position))
            }
            Self::Relocate { .. } => Ok(()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PendingCommand {
    pub sequence: u64,
    pub command: Command,
    /// Id handed out at submit time for an `AddUser`.
    pub reserved_user: Option<UserId>,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub struct CommandReceipt {
    pub sequence: u64,
    pub user: Option<UserId>,
}

#[derive(Debug, Clone, Default)]
pub struct CommandQueue {
    pending: VecDeque<PendingCommand>,
    next_sequence: u64,
}

impl CommandQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enqueue(&mut self, command: Command, reserved_user: Option<UserId>) -> CommandReceipt {
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        self.pending.push_back(PendingCommand { sequence, command, reserved_user });
        CommandReceipt { sequence, user: reserved_user }
    }

    /// Take everything queued so far, oldest first.
    pub fn drain(&mut self) -> Vec<PendingCommand> {
        self.pending.drain(..).collect()
    }

    /// Whether a queued `AddUser` holds `id`.
    pub fn reserves(&self, id: UserId) -> bool {
        self.pending.iter().any(|p| p.reserved_user == Some(id))
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn clear(&mut self) {
        self.pending.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn campus() -> CampusConfig {
        CampusConfig { width: 100.0, height: 100.0, min_floor: 1, max_floor: 2 }
    }

    #[test]
    fn validation_names_the_problem() {
        let c = campus();
        let users = |id: UserId| id == 1;
        let aps = |id: ApId| id == 10;

        let add = Command::AddUser { position: Position::new(1, 50.0, 50.0), airtime_demand: None };
        assert_eq!(add.validate(&c, users, aps), Ok(()));

        let outside = Command::AddUser { position: Position::new(3, 50.0, 50.0), airtime_demand: None };
        assert!(matches!(outside.validate(&c, users, aps), Err(CommandError::OutOfBounds(_))));

        let greedy = Command::AddUser { position: Position::new(1, 5.0, 5.0), airtime_demand: Some(0.0) };
        assert_eq!(greedy.validate(&c, users, aps), Err(CommandError::InvalidDemand(0.0)));

        assert_eq!(Command::RemoveUser { id: 2 }.validate(&c, users, aps), Err(CommandError::UnknownUser(2)));
        assert_eq!(
            Command::SetBand { ap: 11, band: Band::Ghz6 }.validate(&c, users, aps),
            Err(CommandError::UnknownAccessPoint(11))
        );
        let relocate = Command::Relocate { id: 1, position: Position::new(1, -1.0, 0.0) };
        assert!(matches!(relocate.validate(&c, users, aps), Err(CommandError::OutOfBounds(_))));
    }

    #[test]
    fn queue_is_fifo_with_sequences() {
        let mut queue = CommandQueue::new();
        let a = queue.enqueue(Command::RemoveUser { id: 1 }, None);
        let b = queue.enqueue(
            Command::AddUser { position: Position::new(1, 1.0, 1.0), airtime_demand: None },
            Some(7),
        );
        assert_eq!((a.sequence, b.sequence), (0, 1));
        assert_eq!(b.user, Some(7));
        assert!(queue.reserves(7));

        let drained = queue.drain();
        assert!(queue.is_empty());
        assert_eq!(drained.iter().map(|p| p.sequence).collect::<Vec<_>>(), vec![0, 1]);
        assert_eq!(queue.enqueue(Command::RemoveUser { id: 2 }, None).sequence, 2);
    }

    #[test]
    fn commands_round_trip_through_json() {
        let json = r#"{"type": "setBand", "ap": 3, "band": "6"}"#;
        let cmd: Command = serde_json::from_str(json).expect("test: parse");
        assert_eq!(cmd, Command::SetBand { ap: 3, band: Band::Ghz6 });
        assert_eq!(cmd.kind(), "set-band");
    }
}
