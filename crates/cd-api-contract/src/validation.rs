//! Validation helpers applied at the channel boundary

use crate::error::ApiContractError;
use crate::events::ChannelEvent;
use crate::types::CrewSummary;
use validator::Validate;

/// Validate a crew summary
pub fn validate_crew_summary(crew: &CrewSummary) -> Result<(), ApiContractError> {
    crew.validate()?;

    if crew.id.trim().is_empty() {
        return Err(ApiContractError::invalid_payload(
            "crew",
            "Crew id cannot be blank",
        ));
    }

    Ok(())
}

/// Validate a parsed channel event before it is handed to the reconciler
pub fn validate_channel_event(event: &ChannelEvent) -> Result<(), ApiContractError> {
    match event {
        ChannelEvent::CrewLog(log) => log.validate()?,
        ChannelEvent::CrewsUpdated(crews) => {
            for crew in crews {
                validate_crew_summary(crew)?;
            }
        }
        ChannelEvent::CrewUpdated(crew) => validate_crew_summary(crew)?,
        ChannelEvent::CrewStarted(payload)
        | ChannelEvent::CrewStartAck(payload)
        | ChannelEvent::CrewStopped(payload)
        | ChannelEvent::StopRequested(payload) => payload.validate()?,
        ChannelEvent::CrewError(payload) => payload.validate()?,
        ChannelEvent::ActivityHistory(_) | ChannelEvent::ServerError(_) => {
            // History records are checked per kind when replayed
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_crew_summary_valid() {
        let crew = CrewSummary::with_id("research_crew");
        assert!(validate_crew_summary(&crew).is_ok());
    }

    #[test]
    fn test_validate_crew_summary_blank_id() {
        let crew = CrewSummary::with_id("   ");
        assert!(validate_crew_summary(&crew).is_err());
    }

    #[test]
    fn test_catalog_event_with_one_bad_crew_rejected() {
        let event = ChannelEvent::CrewsUpdated(vec![
            CrewSummary::with_id("ok"),
            CrewSummary::with_id(""),
        ]);
        assert!(validate_channel_event(&event).is_err());
    }
}
