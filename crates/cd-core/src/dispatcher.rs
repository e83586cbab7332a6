//! Start/stop command dispatch with optimistic run-state
//!
//! The dispatcher only ever marks a crew pending. Confirmation arrives later
//! through the reconciler. A command the transport refuses rolls its mark
//! back and surfaces the classified error.

use std::sync::Arc;

use cd_api_contract::ChannelCommand;
use cd_client_api::ChannelTransport;
use serde_json::{Map, Value};
use tracing::{info, warn};

use crate::error::{CoreError, Result};
use crate::inputs::resolve_inputs;
use crate::model::Model;
use crate::run_state::RunState;

pub struct CommandDispatcher<T: ChannelTransport + ?Sized> {
    transport: Arc<T>,
}

impl<T: ChannelTransport + ?Sized> Clone for CommandDispatcher<T> {
    fn clone(&self) -> Self {
        Self {
            transport: Arc::clone(&self.transport),
        }
    }
}

impl<T: ChannelTransport + ?Sized> CommandDispatcher<T> {
    pub fn new(transport: Arc<T>) -> Self {
        Self { transport }
    }

    /// Validate inputs against the crew's schema and emit `startCrew`
    ///
    /// Nothing is sent and no state changes when validation fails.
    pub async fn start(
        &self,
        model: &mut Model,
        crew_id: &str,
        inputs: &Map<String, Value>,
    ) -> Result<ChannelCommand> {
        let crew = model
            .catalog()
            .get(crew_id)
            .ok_or_else(|| CoreError::UnknownCrew(crew_id.to_string()))?;

        match model.state_of(crew_id) {
            state @ (RunState::Running | RunState::PendingStart) => {
                return Err(CoreError::InvalidState {
                    crew_id: crew_id.to_string(),
                    state: state.to_string(),
                });
            }
            RunState::Idle | RunState::PendingStop => {}
        }

        let resolved = resolve_inputs(&crew.inputs, inputs).map_err(CoreError::validation)?;
        let command = ChannelCommand::StartCrew {
            crew_id: crew_id.to_string(),
            inputs: resolved,
        };

        let marks = model.run_state().marks(crew_id);
        model.run_state_mut().mark_pending_start(crew_id);
        model.clear_error();

        if let Err(error) = self.transport.send(&command).await {
            warn!(crew_id, %error, "start command failed");
            model.run_state_mut().restore(crew_id, marks);
            let error = CoreError::from(error);
            model.surface_error(error.clone());
            return Err(error);
        }

        info!(crew_id, "start command sent");
        Ok(command)
    }

    /// Emit `stopCrew`; stop is never validated locally
    pub async fn stop(&self, model: &mut Model, crew_id: &str) -> Result<ChannelCommand> {
        let command = ChannelCommand::StopCrew {
            crew_id: crew_id.to_string(),
        };

        let marks = model.run_state().marks(crew_id);
        model.run_state_mut().mark_pending_stop(crew_id);

        if let Err(error) = self.transport.send(&command).await {
            warn!(crew_id, %error, "stop command failed");
            model.run_state_mut().restore(crew_id, marks);
            let error = CoreError::from(error);
            model.surface_error(error.clone());
            return Err(error);
        }

        info!(crew_id, "stop command sent");
        Ok(command)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cd_api_contract::{ChannelEvent, CrewLifecyclePayload, CrewSummary, InputParam};
    use cd_client_api::ClientApiError;
    use cd_rest_client_mock::MockChannel;
    use serde_json::json;
    use std::collections::BTreeMap;

    fn model_with_schema() -> Model {
        let mut summary = CrewSummary::with_id("j1");
        summary.inputs = Some(BTreeMap::from([(
            "topic".to_string(),
            InputParam {
                param_type: Some("str".into()),
                required: true,
                ..Default::default()
            },
        )]));
        let mut model = Model::default();
        model.apply_catalog_snapshot(vec![summary]);
        model
    }

    fn inputs(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn test_start_marks_pending_and_sends_once() {
        let channel = Arc::new(MockChannel::new());
        let dispatcher = CommandDispatcher::new(channel.clone());
        let mut model = model_with_schema();

        let command = dispatcher
            .start(&mut model, "j1", &inputs(json!({"topic": "AI"})))
            .await
            .unwrap();

        assert_eq!(model.state_of("j1"), RunState::PendingStart);
        assert_eq!(channel.sent(), vec![command]);
        assert_eq!(
            serde_json::to_value(&channel.sent()[0]).unwrap()["data"],
            json!({"crew_id": "j1", "inputs": {"topic": "AI"}})
        );

        model.apply_event(ChannelEvent::CrewStarted(CrewLifecyclePayload::new("j1")));
        assert_eq!(model.state_of("j1"), RunState::Running);
        assert!(model.run_state().pending_start().is_empty());
    }

    #[tokio::test]
    async fn test_invalid_inputs_have_no_effect() {
        let channel = Arc::new(MockChannel::new());
        let dispatcher = CommandDispatcher::new(channel.clone());
        let mut model = model_with_schema();

        let err = dispatcher.start(&mut model, "j1", &Map::new()).await.unwrap_err();

        assert_eq!(err.to_string(), "Invalid inputs: topic is required");
        assert_eq!(model.state_of("j1"), RunState::Idle);
        assert!(channel.sent().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_and_running_crews_rejected() {
        let channel = Arc::new(MockChannel::new());
        let dispatcher = CommandDispatcher::new(channel.clone());
        let mut model = model_with_schema();

        let err = dispatcher.start(&mut model, "ghost", &Map::new()).await.unwrap_err();
        assert_eq!(err, CoreError::UnknownCrew("ghost".into()));

        model.apply_event(ChannelEvent::CrewStarted(CrewLifecyclePayload::new("j1")));
        let err = dispatcher
            .start(&mut model, "j1", &inputs(json!({"topic": "AI"})))
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::InvalidState { .. }));
        assert!(channel.sent().is_empty());
    }

    #[tokio::test]
    async fn test_send_failure_rolls_back_mark() {
        let channel = Arc::new(MockChannel::new());
        channel.fail_sends(Some(ClientApiError::network(
            "http://localhost:8001/api/crews/j1/start",
            "connection refused",
        )));
        let dispatcher = CommandDispatcher::new(channel.clone());
        let mut model = model_with_schema();

        let err = dispatcher
            .start(&mut model, "j1", &inputs(json!({"topic": "AI"})))
            .await
            .unwrap_err();

        assert!(err.is_network());
        assert_eq!(model.state_of("j1"), RunState::Idle);
        assert_eq!(model.last_error(), Some(&err));
    }

    #[tokio::test]
    async fn test_stop_marks_pending_stop() {
        let channel = Arc::new(MockChannel::new());
        let dispatcher = CommandDispatcher::new(channel.clone());
        let mut model = model_with_schema();
        model.apply_event(ChannelEvent::CrewStarted(CrewLifecyclePayload::new("j1")));

        dispatcher.stop(&mut model, "j1").await.unwrap();
        assert_eq!(model.state_of("j1"), RunState::PendingStop);

        model.apply_event(ChannelEvent::CrewStopped(CrewLifecyclePayload::new("j1")));
        assert_eq!(model.state_of("j1"), RunState::Idle);
        assert_eq!(channel.sent().len(), 1);
    }

    #[tokio::test]
    async fn test_stop_failure_restores_running() {
        let channel = Arc::new(MockChannel::new());
        channel.fail_sends(Some(ClientApiError::Application("Crew not running".into())));
        let dispatcher = CommandDispatcher::new(channel.clone());
        let mut model = model_with_schema();
        model.apply_event(ChannelEvent::CrewStarted(CrewLifecyclePayload::new("j1")));

        assert!(dispatcher.stop(&mut model, "j1").await.is_err());
        assert_eq!(model.state_of("j1"), RunState::Running);
    }
}
