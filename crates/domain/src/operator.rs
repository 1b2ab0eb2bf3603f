//! Peer operators ("mogs") keyed by username.

use serde::{Deserialize, Serialize};

use tacsync_core::Coordinate;

use crate::model::Change;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PeerOperator {
    pub username: String,
    #[serde(default)]
    pub call_sign: String,
    #[serde(default)]
    pub ready: bool,
    #[serde(default)]
    pub connected: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coordinates: Option<Coordinate>,
}

/// Partial operator record as carried by operator events.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct OperatorUpdate {
    pub username: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub call_sign: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ready: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connected: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coordinates: Option<Coordinate>,
}

impl OperatorUpdate {
    fn into_operator(self) -> PeerOperator {
        PeerOperator {
            username: self.username,
            call_sign: self.call_sign.unwrap_or_default(),
            ready: self.ready.unwrap_or(false),
            connected: self.connected.unwrap_or(true),
            coordinates: self.coordinates,
        }
    }
}

impl PeerOperator {
    fn merge(&mut self, update: &OperatorUpdate) {
        if let Some(call_sign) = &update.call_sign {
            self.call_sign = call_sign.clone();
        }
        if let Some(ready) = update.ready {
            self.ready = ready;
        }
        if let Some(connected) = update.connected {
            self.connected = connected;
        }
        if update.coordinates.is_some() {
            self.coordinates = update.coordinates;
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum OperatorEvent {
    Entered(OperatorUpdate),
    Updated(OperatorUpdate),
    Disconnected(OperatorUpdate),
    Quit(OperatorUpdate),
}

/// Fold one operator event into the collection.
///
/// `updated` forces `connected = true` and `disconnected` forces it to
/// `false`, whatever the payload says. Updates for an unknown username
/// create the entry.
pub fn reduce(mut operators: Vec<PeerOperator>, event: &OperatorEvent) -> (Vec<PeerOperator>, Change) {
    let change = match event {
        OperatorEvent::Entered(update) => upsert(&mut operators, update, None),
        OperatorEvent::Updated(update) => upsert(&mut operators, update, Some(true)),
        OperatorEvent::Disconnected(update) => upsert(&mut operators, update, Some(false)),
        OperatorEvent::Quit(update) => {
            let before = operators.len();
            operators.retain(|o| o.username != update.username);
            if operators.len() < before {
                Change::Removed
            } else {
                Change::Unchanged
            }
        }
    };
    (operators, change)
}

fn upsert(operators: &mut Vec<PeerOperator>, update: &OperatorUpdate, connected: Option<bool>) -> Change {
    let mut update = update.clone();
    if connected.is_some() {
        update.connected = connected;
    }
    match operators.iter_mut().find(|o| o.username == update.username) {
        Some(existing) => {
            let before = existing.clone();
            existing.merge(&update);
            if *existing == before {
                Change::Unchanged
            } else {
                Change::Updated
            }
        }
        None => {
            operators.push(update.into_operator());
            Change::Inserted
        }
    }
}
