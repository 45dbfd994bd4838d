//! WebSocket subscription channel names.
//!
//! Clients subscribe to `workflow:{id}`, `execution:{id}` or `org:{id}`.
//! Events are fanned out to every connection subscribed to one of the
//! channels an event maps to (see [`channels_for_event`]).

use std::fmt;

use crate::error::CoreError;
use crate::types::DbId;

const PREFIX_WORKFLOW: &str = "workflow";
const PREFIX_EXECUTION: &str = "execution";
const PREFIX_ORG: &str = "org";

/// A parsed subscription channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    Workflow(DbId),
    Execution(DbId),
    Organization(DbId),
}

impl Channel {
    /// Parse a `prefix:id` channel string.
    pub fn parse(raw: &str) -> Result<Self, CoreError> {
        let (prefix, id) = raw
            .split_once(':')
            .ok_or_else(|| CoreError::Validation(format!("Invalid channel '{raw}'")))?;
        let id: DbId = id
            .parse()
            .map_err(|_| CoreError::Validation(format!("Invalid channel id in '{raw}'")))?;
        if id <= 0 {
            return Err(CoreError::Validation(format!("Invalid channel id in '{raw}'")));
        }
        match prefix {
            PREFIX_WORKFLOW => Ok(Self::Workflow(id)),
            PREFIX_EXECUTION => Ok(Self::Execution(id)),
            PREFIX_ORG => Ok(Self::Organization(id)),
            other => Err(CoreError::Validation(format!(
                "Unknown channel prefix '{other}'"
            ))),
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Workflow(id) => write!(f, "{PREFIX_WORKFLOW}:{id}"),
            Self::Execution(id) => write!(f, "{PREFIX_EXECUTION}:{id}"),
            Self::Organization(id) => write!(f, "{PREFIX_ORG}:{id}"),
        }
    }
}

/// Channels an event touching the given entities should be delivered on.
pub fn channels_for_event(
    organization_id: Option<DbId>,
    workflow_id: Option<DbId>,
    execution_id: Option<DbId>,
) -> Vec<Channel> {
    let mut out = Vec::with_capacity(3);
    if let Some(id) = organization_id {
        out.push(Channel::Organization(id));
    }
    if let Some(id) = workflow_id {
        out.push(Channel::Workflow(id));
    }
    if let Some(id) = execution_id {
        out.push(Channel::Execution(id));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn parse_and_display_round_trip() {
        for raw in ["workflow:12", "execution:7", "org:3"] {
            let ch = Channel::parse(raw).expect("valid channel");
            assert_eq!(ch.to_string(), raw);
        }
    }

    #[test]
    fn rejects_malformed_channels() {
        assert_matches!(Channel::parse("workflow"), Err(CoreError::Validation(_)));
        assert_matches!(Channel::parse("workflow:abc"), Err(CoreError::Validation(_)));
        assert_matches!(Channel::parse("workflow:0"), Err(CoreError::Validation(_)));
        assert_matches!(Channel::parse("billing:1"), Err(CoreError::Validation(_)));
    }

    #[test]
    fn event_channels_skip_missing_entities() {
        let chans = channels_for_event(Some(1), None, Some(9));
        assert_eq!(chans, vec![Channel::Organization(1), Channel::Execution(9)]);
    }
}
