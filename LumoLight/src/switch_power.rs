//! Handler du service SwitchPower.
//!
//! L'état du commutateur (statut effectif et cible demandée) appartient au
//! handler, derrière un mutex : jamais de globals partagés. `SetTarget` ne
//! change que la cible ; le statut ne bouge que quand le "matériel" le
//! signale via [`SwitchPowerHandler::set_status`], ce qui déclenche alors
//! une notification d'événement.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use lumoupnp::{
    ActionArgs, ActionResults, EventingManager, HandlerError, RequestContext, ServiceHandler,
};
use tracing::{debug, info};

/// Clé du service telle que dérivée de son URN.
pub const SERVICE_KEY: &str = "SwitchPower";

#[derive(Debug, Clone, Copy, Default)]
struct SwitchState {
    status: bool,
    target: bool,
}

/// Handler SwitchPower : deux booléens sous mutex, notifications sur
/// changement de statut.
pub struct SwitchPowerHandler {
    state: Mutex<SwitchState>,
    eventing: Arc<EventingManager>,
}

fn bool_num(b: bool) -> &'static str {
    if b { "1" } else { "0" }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim() {
        "1" | "true" | "yes" => Some(true),
        "0" | "false" | "no" => Some(false),
        _ => None,
    }
}

impl SwitchPowerHandler {
    pub fn new(eventing: Arc<EventingManager>) -> Self {
        Self {
            state: Mutex::new(SwitchState::default()),
            eventing,
        }
    }

    /// Simule l'actionneur : aligne le statut effectif sur la cible.
    pub fn apply_target(&self) {
        let target = self.state.lock().unwrap().target;
        self.set_status(target);
    }

    /// Signale le statut effectif du commutateur (côté "matériel").
    ///
    /// Notifie les abonnés si le statut a réellement changé.
    pub fn set_status(&self, status: bool) {
        let old = {
            let mut state = self.state.lock().unwrap();
            std::mem::replace(&mut state.status, status)
        };
        if old != status {
            info!("💡 Switch status changed: {} -> {}", old, status);
            self.eventing.notify(
                SERVICE_KEY,
                &[("Status".to_string(), bool_num(status).to_string())],
            );
        }
    }

    fn snapshot(&self) -> SwitchState {
        *self.state.lock().unwrap()
    }
}

#[async_trait]
impl ServiceHandler for SwitchPowerHandler {
    async fn handle(
        &self,
        action: &str,
        args: &ActionArgs,
        _ctx: &RequestContext,
    ) -> Result<ActionResults, HandlerError> {
        match action {
            "GetStatus" => {
                let status = self.snapshot().status;
                debug!("GetStatus returning {}", bool_num(status));
                Ok(vec![(
                    "ResultStatus".to_string(),
                    bool_num(status).to_string(),
                )])
            }
            "GetTarget" => {
                let target = self.snapshot().target;
                debug!("GetTarget returning {}", bool_num(target));
                Ok(vec![(
                    "RetTargetValue".to_string(),
                    bool_num(target).to_string(),
                )])
            }
            "SetTarget" => {
                // Certains control points écrivent l'argument en minuscule.
                let raw = args
                    .get("NewTargetValue")
                    .or_else(|| args.get("newTargetValue"))
                    .ok_or_else(|| {
                        HandlerError::InvalidArgumentValue("missing NewTargetValue".to_string())
                    })?;
                let target = parse_bool(raw).ok_or_else(|| {
                    HandlerError::InvalidArgumentValue(format!("not a boolean: {:?}", raw))
                })?;

                info!("SetTarget: {}", bool_num(target));
                self.state.lock().unwrap().target = target;
                Ok(vec![])
            }
            _ => Err(HandlerError::InvalidAction(action.to_string())),
        }
    }

    async fn evented_state(&self) -> Option<ActionResults> {
        Some(vec![(
            "Status".to_string(),
            bool_num(self.snapshot().status).to_string(),
        )])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(pairs: &[(&str, &str)]) -> ActionArgs {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn handler() -> SwitchPowerHandler {
        SwitchPowerHandler::new(Arc::new(EventingManager::new()))
    }

    #[tokio::test]
    async fn test_initial_state_is_off() {
        let handler = handler();
        let ctx = RequestContext::default();

        let results = handler.handle("GetStatus", &args(&[]), &ctx).await.unwrap();
        assert_eq!(results, vec![("ResultStatus".to_string(), "0".to_string())]);

        let results = handler.handle("GetTarget", &args(&[]), &ctx).await.unwrap();
        assert_eq!(results, vec![("RetTargetValue".to_string(), "0".to_string())]);
    }

    #[tokio::test]
    async fn test_set_target_does_not_touch_status() {
        let handler = handler();
        let ctx = RequestContext::default();

        handler
            .handle("SetTarget", &args(&[("NewTargetValue", "true")]), &ctx)
            .await
            .unwrap();

        let results = handler.handle("GetTarget", &args(&[]), &ctx).await.unwrap();
        assert_eq!(results, vec![("RetTargetValue".to_string(), "1".to_string())]);

        // Le statut reste la valeur en cache, indépendante de la cible.
        let results = handler.handle("GetStatus", &args(&[]), &ctx).await.unwrap();
        assert_eq!(results, vec![("ResultStatus".to_string(), "0".to_string())]);
    }

    #[tokio::test]
    async fn test_lowercase_argument_name_is_accepted() {
        let handler = handler();
        let ctx = RequestContext::default();

        handler
            .handle("SetTarget", &args(&[("newTargetValue", "1")]), &ctx)
            .await
            .unwrap();

        let results = handler.handle("GetTarget", &args(&[]), &ctx).await.unwrap();
        assert_eq!(results, vec![("RetTargetValue".to_string(), "1".to_string())]);
    }

    #[tokio::test]
    async fn test_invalid_target_value_is_rejected() {
        let handler = handler();
        let err = handler
            .handle(
                "SetTarget",
                &args(&[("NewTargetValue", "maybe")]),
                &RequestContext::default(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, HandlerError::InvalidArgumentValue(_)));
    }

    #[tokio::test]
    async fn test_unknown_action_is_rejected() {
        let handler = handler();
        let err = handler
            .handle("Dim", &args(&[]), &RequestContext::default())
            .await
            .unwrap_err();
        assert!(matches!(err, HandlerError::InvalidAction(_)));
    }

    #[tokio::test]
    async fn test_concurrent_set_target_never_corrupts_state() {
        let handler = Arc::new(handler());
        let mut tasks = Vec::new();

        for i in 0..100 {
            let handler = Arc::clone(&handler);
            tasks.push(tokio::spawn(async move {
                let value = if i % 2 == 0 { "1" } else { "0" };
                handler
                    .handle(
                        "SetTarget",
                        &args(&[("NewTargetValue", value)]),
                        &RequestContext::default(),
                    )
                    .await
                    .unwrap();
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        let results = handler
            .handle("GetTarget", &args(&[]), &RequestContext::default())
            .await
            .unwrap();
        let value = &results[0].1;
        assert!(value == "0" || value == "1");
    }

    #[tokio::test]
    async fn test_apply_target_moves_status() {
        let handler = handler();
        let ctx = RequestContext::default();

        handler
            .handle("SetTarget", &args(&[("NewTargetValue", "1")]), &ctx)
            .await
            .unwrap();
        handler.apply_target();

        let results = handler.handle("GetStatus", &args(&[]), &ctx).await.unwrap();
        assert_eq!(results, vec![("ResultStatus".to_string(), "1".to_string())]);
    }

    #[tokio::test]
    async fn test_evented_state_reports_status() {
        let handler = handler();
        assert_eq!(
            handler.evented_state().await,
            Some(vec![("Status".to_string(), "0".to_string())])
        );
    }
}
